//! Raw resource declarations as written by integrators (JSON files or builder calls).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Semantic field types understood by the deriver, compiler and stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    Identifier,
    Enumeration,
    #[serde(alias = "nested_reference")]
    Reference,
}

impl FieldType {
    /// Types that support range operators.
    pub fn is_ordered(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float | FieldType::Datetime)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Datetime => "datetime",
            FieldType::Identifier => "identifier",
            FieldType::Enumeration => "enumeration",
            FieldType::Reference => "reference",
        }
    }
}

/// One of {list, read, create, update, delete}.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    List,
    Read,
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::List,
        OperationKind::Read,
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::List => "list",
            OperationKind::Read => "read",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
    Uuid,
    Now,
    /// Assigned by the persistence collaborator on insert.
    Sequence,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum DefaultConfig {
    Literal(Value),
    Generate(Generator),
}

impl<'de> Deserialize<'de> for DefaultConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = Value::deserialize(deserializer)?;
        if let Value::Object(obj) = &v {
            if let Some(gen) = obj.get("generate") {
                if obj.len() != 1 {
                    return Err(serde::de::Error::custom(
                        "a generated default must only contain the \"generate\" key",
                    ));
                }
                let generator = Generator::deserialize(gen.clone()).map_err(|e| {
                    serde::de::Error::custom(format!("unknown default generator: {}", e))
                })?;
                return Ok(DefaultConfig::Generate(generator));
            }
        }
        Ok(DefaultConfig::Literal(v))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKeyConfig {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKeyConfig {
    pub fn names(&self) -> Vec<String> {
        match self {
            PrimaryKeyConfig::Single(s) => vec![s.clone()],
            PrimaryKeyConfig::Composite(v) => v.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FieldType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<DefaultConfig>,
    #[serde(default)]
    pub filterable: bool,
    #[serde(default)]
    pub sortable: bool,
    /// Unset means "derive from primary-key membership and default".
    #[serde(default)]
    pub writable_on_create: Option<bool>,
    #[serde(default)]
    pub writable_on_update: Option<bool>,
    #[serde(default)]
    pub exposed_on_read: Option<bool>,
    /// Enumeration variants.
    #[serde(default)]
    pub values: Vec<String>,
    /// Target resource for reference fields.
    #[serde(default)]
    pub references: Option<String>,
    #[serde(default)]
    pub validation: ValidationRule,
    /// SQL cast used when binding values (e.g. "sample.order_status").
    #[serde(default)]
    pub storage_type: Option<String>,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>, type_: FieldType) -> Self {
        FieldConfig {
            name: name.into(),
            type_,
            nullable: false,
            default: None,
            filterable: false,
            sortable: false,
            writable_on_create: None,
            writable_on_update: None,
            exposed_on_read: None,
            values: Vec::new(),
            references: None,
            validation: ValidationRule::default(),
            storage_type: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(DefaultConfig::Literal(value));
        self
    }

    pub fn generated(mut self, generator: Generator) -> Self {
        self.default = Some(DefaultConfig::Generate(generator));
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable_on_create = Some(false);
        self.writable_on_update = Some(false);
        self
    }

    pub fn create_only(mut self) -> Self {
        self.writable_on_update = Some(false);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.exposed_on_read = Some(false);
        self
    }

    pub fn variants<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn references(mut self, target: impl Into<String>) -> Self {
        self.references = Some(target.into());
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.validation = rule;
        self
    }
}

/// A full resource declaration, as loaded from a JSON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    /// Storage name; defaults to `name`.
    #[serde(default)]
    pub table: Option<String>,
    pub fields: Vec<FieldConfig>,
    pub primary_key: PrimaryKeyConfig,
    /// Field name -> referenced resource name. Reference fields may also declare `references`.
    #[serde(default)]
    pub relations: BTreeMap<String, String>,
    /// Operations to bind; all five when unset.
    #[serde(default)]
    pub operations: Option<Vec<OperationKind>>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Operation -> roles allowed to perform it. Operations not listed are open.
    #[serde(default)]
    pub roles: HashMap<OperationKind, Vec<String>>,
}
