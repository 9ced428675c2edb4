use super::{StoreError, StoreResult};
use crate::core::{Column, ForeignKey, Row, Value};

/// Shape of a stored table: typed columns, a text primary key, unique columns
/// and foreign keys.
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    primary_key: String,
    columns: Vec<Column>,
    unique: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            columns: Vec::new(),
            unique: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn unique(mut self, column: impl Into<String>) -> Self {
        self.unique.push(column.into());
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    pub fn unique_columns(&self) -> &[String] {
        &self.unique
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Checks the schema itself: the primary key and every constrained column
    /// must be declared.
    pub fn validate(&self) -> StoreResult<()> {
        let constrained = std::iter::once(&self.primary_key)
            .chain(self.unique.iter())
            .chain(self.foreign_keys.iter().map(|fk| &fk.column));
        for column in constrained {
            if self.get_column(column).is_none() {
                return Err(StoreError::ColumnNotFound(column.clone(), self.name.clone()));
            }
        }
        Ok(())
    }

    /// Validates a full row against the column definitions and returns its
    /// primary key.
    pub fn validate_row(&self, row: &Row) -> StoreResult<String> {
        for name in row.keys() {
            if self.get_column(name).is_none() {
                return Err(StoreError::ColumnNotFound(name.clone(), self.name.clone()));
            }
        }
        for column in &self.columns {
            column.validate(&self.name, row.get(&column.name).unwrap_or(&Value::Null))?;
        }
        self.key_of(row)
    }

    pub fn key_of(&self, row: &Row) -> StoreResult<String> {
        match row.get(&self.primary_key) {
            Some(Value::Text(key)) => Ok(key.clone()),
            _ => Err(StoreError::ConstraintViolation(format!(
                "Primary key '{}.{}' must be non-null text",
                self.name, self.primary_key
            ))),
        }
    }
}
