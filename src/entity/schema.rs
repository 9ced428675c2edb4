use super::Fields;
use crate::core::{Column, DataType, ForeignKey, PersistError, Result, Value};
use crate::storage::{Filter, TableSchema};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Writes one attribute onto an entity. The value already passed the
/// schema's type check.
pub type Setter<T> = fn(&mut T, Value) -> std::result::Result<(), String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Presence {
    /// Must be supplied on create, never NULL.
    Required,
    /// Defaults on create, never NULL.
    Optional,
    /// Defaults on create, may be NULL.
    Nullable,
}

pub struct FieldSpec<T> {
    data_type: DataType,
    presence: Presence,
    setter: Setter<T>,
}

impl<T> FieldSpec<T> {
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }

    pub fn is_nullable(&self) -> bool {
        self.presence == Presence::Nullable
    }
}

/// Per-entity descriptor: table layout plus the whitelist of attributes that
/// callers may set, each with its type and setter.
pub struct EntitySchema<T> {
    entity: &'static str,
    table: &'static str,
    primary_key: &'static str,
    version_column: &'static str,
    fields: BTreeMap<&'static str, FieldSpec<T>>,
    /// Columns maintained by the entity itself (timestamps); readable and
    /// filterable, never settable.
    system_columns: Vec<(&'static str, DataType)>,
    unique: Vec<&'static str>,
    foreign_keys: Vec<(&'static str, &'static str)>,
}

impl<T> EntitySchema<T> {
    pub fn new(entity: &'static str, table: &'static str) -> Self {
        Self {
            entity,
            table,
            primary_key: "id",
            version_column: "version",
            fields: BTreeMap::new(),
            system_columns: Vec::new(),
            unique: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn required(self, name: &'static str, data_type: DataType, setter: Setter<T>) -> Self {
        self.field(name, data_type, Presence::Required, setter)
    }

    pub fn optional(self, name: &'static str, data_type: DataType, setter: Setter<T>) -> Self {
        self.field(name, data_type, Presence::Optional, setter)
    }

    pub fn nullable(self, name: &'static str, data_type: DataType, setter: Setter<T>) -> Self {
        self.field(name, data_type, Presence::Nullable, setter)
    }

    fn field(
        mut self,
        name: &'static str,
        data_type: DataType,
        presence: Presence,
        setter: Setter<T>,
    ) -> Self {
        self.fields.insert(
            name,
            FieldSpec {
                data_type,
                presence,
                setter,
            },
        );
        self
    }

    pub fn system_column(mut self, name: &'static str, data_type: DataType) -> Self {
        self.system_columns.push((name, data_type));
        self
    }

    pub fn unique(mut self, column: &'static str) -> Self {
        self.unique.push(column);
        self
    }

    pub fn references(mut self, column: &'static str, table: &'static str) -> Self {
        self.foreign_keys.push((column, table));
        self
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn primary_key(&self) -> &'static str {
        self.primary_key
    }

    pub fn version_column(&self) -> &'static str {
        self.version_column
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec<T>> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.keys().copied()
    }

    /// Any column a filter may name: the key, the version, settable
    /// attributes and system columns.
    pub fn has_column(&self, name: &str) -> bool {
        name == self.primary_key
            || name == self.version_column
            || self.fields.contains_key(name)
            || self.system_columns.iter().any(|(column, _)| *column == name)
    }

    pub fn table_schema(&self) -> TableSchema {
        let mut schema = TableSchema::new(self.table, self.primary_key)
            .column(Column::new(self.primary_key, DataType::Text).not_null())
            .column(Column::new(self.version_column, DataType::Integer).not_null());

        for (name, spec) in &self.fields {
            let column = Column::new(*name, spec.data_type);
            schema = schema.column(if spec.is_nullable() {
                column
            } else {
                column.not_null()
            });
        }
        for (name, data_type) in &self.system_columns {
            schema = schema.column(Column::new(*name, *data_type).not_null());
        }
        for column in &self.unique {
            schema = schema.unique(*column);
        }
        for (column, table) in &self.foreign_keys {
            schema = schema.foreign_key(ForeignKey::new(*column, *table));
        }
        schema
    }

    /// Whitelist and type check. With `creating`, every required attribute
    /// must be present as well.
    pub fn check_fields(&self, fields: &Fields, creating: bool) -> Result<()> {
        for (name, value) in fields {
            let spec = self
                .fields
                .get(name.as_str())
                .ok_or_else(|| PersistError::UnknownAttribute {
                    entity: self.entity,
                    attribute: name.clone(),
                })?;

            if value.is_null() && !spec.is_nullable() {
                return Err(self.invalid(name, "cannot be NULL".to_string()));
            }
            if !spec.data_type.is_compatible(value) {
                return Err(self.invalid(
                    name,
                    format!("expected {}, got {}", spec.data_type, value.type_name()),
                ));
            }
        }

        if creating {
            if let Some((missing, _)) = self
                .fields
                .iter()
                .find(|(name, spec)| spec.is_required() && !fields.contains_key(**name))
            {
                return Err(PersistError::MissingAttribute {
                    entity: self.entity,
                    attribute: *missing,
                });
            }
        }
        Ok(())
    }

    pub fn check_filters(&self, filters: &[Filter]) -> Result<()> {
        match filters.iter().find(|filter| !self.has_column(&filter.column)) {
            Some(filter) => Err(PersistError::UnknownAttribute {
                entity: self.entity,
                attribute: filter.column.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Runs the setters for `fields` on `target`. Call [`Self::check_fields`]
    /// first.
    pub fn apply(&self, target: &mut T, fields: Fields) -> Result<()> {
        for (name, value) in fields {
            let spec = self
                .fields
                .get(name.as_str())
                .ok_or_else(|| PersistError::UnknownAttribute {
                    entity: self.entity,
                    attribute: name.clone(),
                })?;
            (spec.setter)(target, value).map_err(|reason| self.invalid(&name, reason))?;
        }
        Ok(())
    }

    fn invalid(&self, attribute: &str, reason: String) -> PersistError {
        PersistError::InvalidValue {
            entity: self.entity,
            attribute: attribute.to_string(),
            reason,
        }
    }
}

pub fn into_text(value: Value) -> std::result::Result<String, String> {
    match value {
        Value::Text(text) => Ok(text),
        other => Err(format!("expected TEXT, got {}", other.type_name())),
    }
}

pub fn into_opt_text(value: Value) -> std::result::Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        other => into_text(other).map(Some),
    }
}

pub fn into_bool(value: Value) -> std::result::Result<bool, String> {
    value
        .as_bool()
        .ok_or_else(|| format!("expected BOOLEAN, got {}", value.type_name()))
}

pub fn into_timestamp(value: Value) -> std::result::Result<DateTime<Utc>, String> {
    value
        .as_timestamp()
        .ok_or_else(|| format!("expected TIMESTAMP, got {}", value.type_name()))
}

pub fn into_opt_timestamp(value: Value) -> std::result::Result<Option<DateTime<Utc>>, String> {
    match value {
        Value::Null => Ok(None),
        other => into_timestamp(other).map(Some),
    }
}
