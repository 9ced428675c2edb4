// ============================================================================
// Entity Base Layer
// ============================================================================
//
// Generic create / read / paginated read / update / delete, written once and
// shared by every persisted type:
// - `schema`: per-entity attribute whitelist and table layout
// - `crud`: session-level operations for composing several steps in one scope
// - `repository`: one scope per operation with the isolation level and retry
//   budget each operation needs
//
// ============================================================================

pub mod crud;
pub mod repository;
pub mod schema;

pub use repository::{Repository, page_window};
pub use schema::{EntitySchema, FieldSpec, Setter};

use crate::core::{PersistError, Result, Row, Value};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Attribute name to value, as supplied by callers for create and update.
pub type Fields = BTreeMap<String, Value>;

/// A persisted record with a string identifier and an optimistic version.
pub trait Entity: Clone + Send + Sync + Sized + 'static {
    fn schema() -> &'static EntitySchema<Self>;

    /// Fresh instance with `id`, version 1 and defaults for every optional
    /// attribute.
    fn blank(id: String) -> Self;

    fn id(&self) -> &str;

    fn version(&self) -> i64;

    fn set_version(&mut self, version: i64);

    /// Called on every update. Entities with an `updated_at` refresh it here.
    fn touch(&mut self, _now: DateTime<Utc>) {}

    fn to_row(&self) -> Row;

    fn from_row(row: &Row) -> Result<Self>;
}

/// Target of an update or delete: a loaded entity (its version is the one the
/// caller saw) or a bare identifier.
#[derive(Debug, Clone)]
pub enum EntityRef<T> {
    Id(String),
    Entity(T),
}

impl<T: Entity> EntityRef<T> {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Entity(entity) => entity.id(),
        }
    }
}

impl<T> From<&str> for EntityRef<T> {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl<T> From<String> for EntityRef<T> {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

/// Builds a [`Fields`] map from `name => value` pairs.
#[macro_export]
macro_rules! fields {
    () => {
        $crate::entity::Fields::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::entity::Fields::new();
        $(fields.insert(::std::string::String::from($name), $crate::core::Value::from($value));)+
        fields
    }};
}

static NULL: Value = Value::Null;

/// Typed column access for `Entity::from_row` implementations.
pub struct RowReader<'a> {
    entity: &'static str,
    row: &'a Row,
}

impl<'a> RowReader<'a> {
    pub fn new(entity: &'static str, row: &'a Row) -> Self {
        Self { entity, row }
    }

    fn mismatch(&self, column: &str, expected: &str, found: &Value) -> PersistError {
        PersistError::persistence(format!(
            "{}.{}: expected {}, found {}",
            self.entity,
            column,
            expected,
            found.type_name()
        ))
    }

    fn value(&self, column: &str) -> &'a Value {
        self.row.get(column).unwrap_or(&NULL)
    }

    pub fn text(&self, column: &str) -> Result<String> {
        let value = self.value(column);
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.mismatch(column, "TEXT", value))
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>> {
        match self.value(column) {
            Value::Null => Ok(None),
            _ => self.text(column).map(Some),
        }
    }

    pub fn integer(&self, column: &str) -> Result<i64> {
        let value = self.value(column);
        value
            .as_i64()
            .ok_or_else(|| self.mismatch(column, "INTEGER", value))
    }

    pub fn boolean(&self, column: &str) -> Result<bool> {
        let value = self.value(column);
        value
            .as_bool()
            .ok_or_else(|| self.mismatch(column, "BOOLEAN", value))
    }

    pub fn timestamp(&self, column: &str) -> Result<DateTime<Utc>> {
        let value = self.value(column);
        value
            .as_timestamp()
            .ok_or_else(|| self.mismatch(column, "TIMESTAMP", value))
    }

    pub fn opt_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>> {
        match self.value(column) {
            Value::Null => Ok(None),
            _ => self.timestamp(column).map(Some),
        }
    }
}
