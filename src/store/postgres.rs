//! PostgreSQL store. Each session is one sqlx transaction.

use crate::config::{PrimaryKey, ResourceSchema, Settings};
use crate::query::QueryPlan;
use crate::service::validation::format_datetime;
use crate::sql::{self, PgBindValue, QueryBuf};
use crate::store::{ConstraintKind, Entity, Page, Persistence, PersistenceError, PersistenceSession};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    /// Postgres schema (namespace) the resource tables live in.
    pg_schema: String,
}

impl PgStore {
    pub fn new(pool: PgPool, pg_schema: impl Into<String>) -> Self {
        Self {
            pool,
            pg_schema: pg_schema.into(),
        }
    }

    /// Connect using `DATABASE_URL` from settings.
    pub async fn connect(settings: &Settings) -> Result<Self, PersistenceError> {
        let url = settings
            .database_url
            .as_deref()
            .ok_or_else(|| PersistenceError::Backend("DATABASE_URL is not set".into()))?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(map_db_error)?;
        Ok(Self::new(pool, settings.pg_schema.clone()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Persistence for PgStore {
    async fn begin(&self) -> Result<Box<dyn PersistenceSession>, PersistenceError> {
        let tx = self.pool.begin().await.map_err(map_db_error)?;
        Ok(Box::new(PgSession {
            tx,
            pg_schema: self.pg_schema.clone(),
        }))
    }
}

/// Dropping an uncommitted sqlx transaction rolls it back.
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
    pg_schema: String,
}

impl PgSession {
    async fn fetch_optional(&mut self, q: &QueryBuf) -> Result<Option<Entity>, PersistenceError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(&mut *self.tx).await.map_err(map_db_error)?;
        Ok(row.map(|r| row_to_json(&r)))
    }

    async fn fetch_all(&mut self, q: &QueryBuf) -> Result<Vec<Entity>, PersistenceError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&mut *self.tx).await.map_err(map_db_error)?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn fetch_count(&mut self, q: &QueryBuf) -> Result<u64, PersistenceError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let n = query.fetch_one(&mut *self.tx).await.map_err(map_db_error)?;
        Ok(n.max(0) as u64)
    }
}

#[async_trait]
impl PersistenceSession for PgSession {
    async fn execute(&mut self, schema: &ResourceSchema, plan: QueryPlan) -> Result<Page, PersistenceError> {
        let total_count = self.fetch_count(&sql::count(schema, &self.pg_schema, &plan.filters)).await?;
        let rows = if plan.pagination.limit == 0 {
            Vec::new()
        } else {
            self.fetch_all(&sql::select_page(schema, &self.pg_schema, &plan)).await?
        };
        Ok(Page { rows, total_count })
    }

    async fn get(&mut self, schema: &ResourceSchema, key: &PrimaryKey) -> Result<Option<Entity>, PersistenceError> {
        let q = sql::select_by_key(schema, &self.pg_schema, key);
        self.fetch_optional(&q).await
    }

    async fn create(&mut self, schema: &ResourceSchema, payload: Entity) -> Result<Entity, PersistenceError> {
        let q = sql::insert(schema, &self.pg_schema, &payload);
        self.fetch_optional(&q).await?.ok_or_else(|| {
            PersistenceError::Backend(format!("insert into {} returned no row", schema.table))
        })
    }

    async fn update(
        &mut self,
        schema: &ResourceSchema,
        key: &PrimaryKey,
        partial: Entity,
    ) -> Result<Entity, PersistenceError> {
        let q = sql::update(schema, &self.pg_schema, key, &partial);
        self.fetch_optional(&q).await?.ok_or(PersistenceError::NotFound)
    }

    async fn delete(&mut self, schema: &ResourceSchema, key: &PrimaryKey) -> Result<bool, PersistenceError> {
        let q = sql::delete(schema, &self.pg_schema, key);
        Ok(self.fetch_optional(&q).await?.is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        self.tx.commit().await.map_err(map_db_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        self.tx.rollback().await.map_err(map_db_error)
    }
}

/// Constraint violations keep their class; everything else is a backend failure.
fn map_db_error(e: sqlx::Error) -> PersistenceError {
    match &e {
        sqlx::Error::RowNotFound => PersistenceError::NotFound,
        sqlx::Error::Database(db) => {
            let code = db.code();
            let kind = if db.is_unique_violation() {
                ConstraintKind::Unique
            } else if db.is_foreign_key_violation() {
                ConstraintKind::ForeignKey
            } else if db.is_check_violation() {
                ConstraintKind::Check
            } else if code.as_deref() == Some("23502") {
                ConstraintKind::NotNull
            } else if code.as_deref().map(|c| c.starts_with("22")).unwrap_or(false) {
                // data exceptions: malformed uuid text, numeric overflow
                ConstraintKind::Check
            } else {
                return PersistenceError::Backend(e.to_string());
            };
            PersistenceError::Constraint {
                kind,
                detail: db.message().to_string(),
            }
        }
        _ => PersistenceError::Backend(e.to_string()),
    }
}

fn row_to_json(row: &PgRow) -> Entity {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Entity::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(format_datetime(d));
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(format_datetime(d.and_utc()));
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
