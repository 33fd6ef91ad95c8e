//! Process-local store. Each session buffers its writes and applies them on commit; a commit
//! fails when another session committed to one of the same rows first.

use crate::config::{PrimaryKey, ResourceSchema};
use crate::query::{Filter, FilterOp, QueryPlan, SortDirection, SortKey};
use crate::store::{ConstraintKind, Entity, Page, Persistence, PersistenceError, PersistenceSession};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<String, Entity>,
    /// Not transactional, like a database sequence.
    sequence: i64,
}

type Tables = Arc<RwLock<HashMap<String, Table>>>;

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Tables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed row count for a storage table.
    pub fn count(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|t| t.get(table).map(|t| t.rows.len()).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn PersistenceSession>, PersistenceError> {
        Ok(Box::new(MemorySession {
            tables: self.tables.clone(),
            pending: HashMap::new(),
        }))
    }
}

/// A row written by the session. `base` is the committed row when the session first touched it.
#[derive(Debug)]
struct Pending {
    base: Option<Entity>,
    /// `None` once deleted.
    value: Option<Entity>,
}

/// Uncommitted writes, by table then row key. Dropping the session discards them.
pub struct MemorySession {
    tables: Tables,
    pending: HashMap<String, BTreeMap<String, Pending>>,
}

fn key_string(key: &PrimaryKey) -> String {
    Value::Array(key.values().cloned().collect()).to_string()
}

fn poisoned<T>(_: T) -> PersistenceError {
    PersistenceError::Backend("memory store lock poisoned".into())
}

impl MemorySession {
    fn committed(&self, table: &str, key: &str) -> Result<Option<Entity>, PersistenceError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.get(table).and_then(|t| t.rows.get(key)).cloned())
    }

    /// The row as this session sees it: its own writes over the committed state.
    fn current(&self, table: &str, key: &str) -> Result<Option<Entity>, PersistenceError> {
        match self.pending.get(table).and_then(|rows| rows.get(key)) {
            Some(p) => Ok(p.value.clone()),
            None => self.committed(table, key),
        }
    }

    fn stage(&mut self, table: &str, key: String, value: Option<Entity>) -> Result<(), PersistenceError> {
        let touched = self.pending.get(table).map(|rows| rows.contains_key(&key)).unwrap_or(false);
        let base = if touched { None } else { self.committed(table, &key)? };
        self.pending
            .entry(table.to_string())
            .or_default()
            .entry(key)
            .or_insert(Pending { base, value: None })
            .value = value;
        Ok(())
    }

    fn next_sequence(&self, table: &str) -> Result<i64, PersistenceError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let t = tables.entry(table.to_string()).or_default();
        t.sequence += 1;
        Ok(t.sequence)
    }
}

#[async_trait]
impl PersistenceSession for MemorySession {
    async fn execute(&mut self, schema: &ResourceSchema, plan: QueryPlan) -> Result<Page, PersistenceError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut visible: BTreeMap<&String, &Entity> = tables
            .get(&schema.table)
            .map(|t| t.rows.iter().collect())
            .unwrap_or_default();
        if let Some(rows) = self.pending.get(&schema.table) {
            for (key, p) in rows {
                match &p.value {
                    Some(row) => visible.insert(key, row),
                    None => visible.remove(key),
                };
            }
        }
        let mut rows: Vec<&Entity> = visible
            .into_values()
            .filter(|row| plan.filters.iter().all(|f| matches(row, f)))
            .collect();
        let total_count = rows.len() as u64;
        rows.sort_by(|a, b| compare_rows(a, b, &plan.sort));
        let rows = rows
            .into_iter()
            .skip(plan.pagination.offset as usize)
            .take(plan.pagination.limit as usize)
            .cloned()
            .collect();
        Ok(Page { rows, total_count })
    }

    async fn get(&mut self, schema: &ResourceSchema, key: &PrimaryKey) -> Result<Option<Entity>, PersistenceError> {
        self.current(&schema.table, &key_string(key))
    }

    async fn create(&mut self, schema: &ResourceSchema, mut payload: Entity) -> Result<Entity, PersistenceError> {
        for f in schema.fields() {
            let missing = payload.get(&f.name).map(Value::is_null).unwrap_or(true);
            if missing && f.default.as_ref().map(|d| d.is_sequence()).unwrap_or(false) {
                let next = self.next_sequence(&schema.table)?;
                payload.insert(f.name.clone(), Value::Number(next.into()));
            }
            payload.entry(f.name.clone()).or_insert(Value::Null);
        }
        let key = schema.key_of(&payload).ok_or_else(|| PersistenceError::Constraint {
            kind: ConstraintKind::NotNull,
            detail: format!("{}: primary key missing", schema.table),
        })?;
        let key = key_string(&key);
        if self.current(&schema.table, &key)?.is_some() {
            return Err(PersistenceError::Constraint {
                kind: ConstraintKind::Unique,
                detail: format!("{}: duplicate key {}", schema.table, key),
            });
        }
        self.stage(&schema.table, key, Some(payload.clone()))?;
        Ok(payload)
    }

    async fn update(
        &mut self,
        schema: &ResourceSchema,
        key: &PrimaryKey,
        partial: Entity,
    ) -> Result<Entity, PersistenceError> {
        let key = key_string(key);
        let mut row = self.current(&schema.table, &key)?.ok_or(PersistenceError::NotFound)?;
        for (k, v) in partial {
            if !schema.is_primary_key(&k) {
                row.insert(k, v);
            }
        }
        self.stage(&schema.table, key, Some(row.clone()))?;
        Ok(row)
    }

    async fn delete(&mut self, schema: &ResourceSchema, key: &PrimaryKey) -> Result<bool, PersistenceError> {
        let key = key_string(key);
        if self.current(&schema.table, &key)?.is_none() {
            return Ok(false);
        }
        self.stage(&schema.table, key, None)?;
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        let MemorySession { tables: shared, pending } = *self;
        let mut tables = shared.write().map_err(poisoned)?;
        for (table, rows) in &pending {
            for (key, p) in rows {
                let now = tables.get(table).and_then(|t| t.rows.get(key));
                if now != p.base.as_ref() {
                    return Err(PersistenceError::Backend(format!(
                        "{}: row {} was changed by a concurrent session",
                        table, key
                    )));
                }
            }
        }
        for (table, rows) in pending {
            let t = tables.entry(table).or_default();
            for (key, p) in rows {
                match p.value {
                    Some(row) => t.rows.insert(key, row),
                    None => t.rows.remove(&key),
                };
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        let writes: usize = self.pending.values().map(BTreeMap::len).sum();
        if writes > 0 {
            tracing::debug!(writes, "discarding memory session writes");
        }
        Ok(())
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => *s == n.to_string(),
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64()?.partial_cmp(&m.as_f64()?),
        (Value::String(s), Value::String(t)) => Some(s.cmp(t)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Null never matches, as in SQL.
fn matches(row: &Entity, filter: &Filter) -> bool {
    let v = match row.get(&filter.field) {
        Some(v) if !v.is_null() => v,
        _ => return false,
    };
    let target = &filter.value;
    match filter.op {
        FilterOp::Eq => loose_eq(v, target),
        FilterOp::Ne => !loose_eq(v, target),
        FilterOp::Gt => compare_values(v, target) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(compare_values(v, target), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => compare_values(v, target) == Some(Ordering::Less),
        FilterOp::Lte => matches!(compare_values(v, target), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Contains => match (v.as_str(), target.as_str()) {
            (Some(s), Some(needle)) => s.contains(needle),
            _ => false,
        },
        FilterOp::In => target
            .as_array()
            .map(|items| items.iter().any(|t| loose_eq(v, t)))
            .unwrap_or(false),
    }
}

/// Nulls sort last ascending and first descending.
fn compare_rows(a: &Entity, b: &Entity, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let x = a.get(&key.field).filter(|v| !v.is_null());
        let y = b.get(&key.field).filter(|v| !v.is_null());
        let ord = match (x, y) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        };
        let ord = match key.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
