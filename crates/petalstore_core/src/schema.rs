//! Collection and index declarations.

use crate::error::{CoreError, CoreResult};
use petalstore_codec::Value;
use std::fmt;

/// Declaration of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    /// Name used to query the index.
    pub name: String,
    /// Dotted path of the indexed field.
    pub key_path: String,
    /// Whether two records may share an indexed value.
    pub unique: bool,
}

impl IndexSchema {
    /// Declares a non-unique index called `name` over `key_path`.
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            unique: false,
        }
    }

    /// Declares a non-unique index named after the field it indexes.
    pub fn on(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(field.clone(), field)
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::map([
            ("name", Value::from(self.name.as_str())),
            ("keyPath", Value::from(self.key_path.as_str())),
            ("unique", Value::Bool(self.unique)),
        ])
    }

    pub(crate) fn from_value(value: &Value) -> CoreResult<Self> {
        Ok(Self {
            name: text_field(value, "name")?,
            key_path: text_field(value, "keyPath")?,
            unique: value.get("unique").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

/// Declaration of a collection: its name, primary key path and indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    /// Collection name, unique within a database.
    pub name: String,
    /// Dotted path of the primary key field.
    pub key_path: String,
    /// Secondary indexes.
    pub indexes: Vec<IndexSchema>,
}

impl CollectionSchema {
    /// Declares a collection keyed by `id` with no indexes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: "id".to_string(),
            indexes: Vec::new(),
        }
    }

    /// Sets the primary key path.
    #[must_use]
    pub fn with_key_path(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = key_path.into();
        self
    }

    /// Adds a secondary index.
    #[must_use]
    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    /// Returns the index declared under `name`.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Checks names and key paths are non-empty and index names distinct.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::invalid_operation("collection name is empty"));
        }
        if !valid_key_path(&self.key_path) {
            return Err(CoreError::invalid_operation(format!(
                "collection {} has invalid key path {:?}",
                self.name, self.key_path
            )));
        }
        for (i, index) in self.indexes.iter().enumerate() {
            if index.name.is_empty() || !valid_key_path(&index.key_path) {
                return Err(CoreError::invalid_operation(format!(
                    "collection {} declares an index with an empty name or invalid key path",
                    self.name
                )));
            }
            if self.indexes[..i].iter().any(|prior| prior.name == index.name) {
                return Err(CoreError::IndexExists {
                    collection: self.name.clone(),
                    index: index.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::map([
            ("name", Value::from(self.name.as_str())),
            ("keyPath", Value::from(self.key_path.as_str())),
            (
                "indexes",
                Value::Array(self.indexes.iter().map(IndexSchema::to_value).collect()),
            ),
        ])
    }

    pub(crate) fn from_value(value: &Value) -> CoreResult<Self> {
        let indexes = match value.get("indexes") {
            Some(Value::Array(items)) => items
                .iter()
                .map(IndexSchema::from_value)
                .collect::<CoreResult<Vec<_>>>()?,
            None => Vec::new(),
            Some(other) => {
                return Err(CoreError::invalid_operation(format!(
                    "schema indexes must be an array, got {}",
                    other.type_name()
                )))
            }
        };

        Ok(Self {
            name: text_field(value, "name")?,
            key_path: text_field(value, "keyPath")?,
            indexes,
        })
    }
}

/// One schema change applied by an upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    /// A new collection with its initial indexes.
    CreateCollection(CollectionSchema),
    /// A new index on an existing collection.
    CreateIndex {
        /// Collection the index is added to.
        collection: String,
        /// The index declaration.
        index: IndexSchema,
    },
}

impl SchemaChange {
    pub(crate) fn to_value(&self) -> Value {
        match self {
            Self::CreateCollection(schema) => Value::map([
                ("op", Value::from("createCollection")),
                ("schema", schema.to_value()),
            ]),
            Self::CreateIndex { collection, index } => Value::map([
                ("op", Value::from("createIndex")),
                ("collection", Value::from(collection.as_str())),
                ("index", index.to_value()),
            ]),
        }
    }

    pub(crate) fn from_value(value: &Value) -> CoreResult<Self> {
        let nested = |field: &str| {
            value
                .get(field)
                .ok_or_else(|| CoreError::invalid_operation(format!("schema field {field} missing")))
        };

        match text_field(value, "op")?.as_str() {
            "createCollection" => Ok(Self::CreateCollection(CollectionSchema::from_value(
                nested("schema")?,
            )?)),
            "createIndex" => Ok(Self::CreateIndex {
                collection: text_field(value, "collection")?,
                index: IndexSchema::from_value(nested("index")?)?,
            }),
            other => Err(CoreError::invalid_operation(format!(
                "unknown schema change {other:?}"
            ))),
        }
    }
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateCollection(schema) => write!(f, "create collection {}", schema.name),
            Self::CreateIndex { collection, index } if index.unique => {
                write!(f, "create unique index {}.{}", collection, index.name)
            }
            Self::CreateIndex { collection, index } => {
                write!(f, "create index {}.{}", collection, index.name)
            }
        }
    }
}

fn valid_key_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(|segment| !segment.is_empty())
}

fn text_field(value: &Value, field: &str) -> CoreResult<String> {
    value
        .get(field)
        .and_then(Value::as_text)
        .map(str::to_string)
        .ok_or_else(|| CoreError::invalid_operation(format!("schema field {field} missing")))
}
