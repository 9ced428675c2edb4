use super::{DataType, Value};
use crate::storage::StoreError;
use std::collections::BTreeMap;

/// A stored record keyed by column name.
pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn validate(&self, table: &str, value: &Value) -> Result<(), StoreError> {
        if value.is_null() {
            if !self.nullable {
                return Err(StoreError::ConstraintViolation(format!(
                    "Column '{}.{}' cannot be NULL",
                    table, self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(StoreError::ConstraintViolation(format!(
                "Column '{}.{}' expects type {}, got {}",
                table,
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

/// `column` references the primary key of `ref_table`. Deleting a referenced
/// row is restricted.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub column: String,
    pub ref_table: String,
}

impl ForeignKey {
    pub fn new(column: impl Into<String>, ref_table: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ref_table: ref_table.into(),
        }
    }
}
