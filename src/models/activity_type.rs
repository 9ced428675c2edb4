use crate::core::{DataType, Result, Row, Value};
use crate::entity::schema::into_text;
use crate::entity::{Entity, EntitySchema, RowReader};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::Serialize;

/// Type assigned to activities created without one.
pub const GENERAL_TYPE_NAME: &str = "General";
pub const GENERAL_TYPE_COLOR: &str = "#F6F6F6";
/// Color of a type created on the fly without an explicit color.
pub const DEFAULT_TYPE_COLOR: &str = "#FFFFFF";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityType {
    pub id: String,
    pub version: i64,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

lazy_static! {
    static ref SCHEMA: EntitySchema<ActivityType> =
        EntitySchema::<ActivityType>::new("ActivityType", "activity_types")
            .required("name", DataType::Text, |t, v| {
                t.name = into_text(v)?;
                Ok(())
            })
            .optional("color", DataType::Text, |t, v| {
                t.color = into_text(v)?;
                Ok(())
            })
            .system_column("created_at", DataType::Timestamp)
            .system_column("updated_at", DataType::Timestamp)
            .unique("name");
}

impl Entity for ActivityType {
    fn schema() -> &'static EntitySchema<Self> {
        &SCHEMA
    }

    fn blank(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            version: 1,
            name: String::new(),
            color: DEFAULT_TYPE_COLOR.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::from(&self.id));
        row.insert("version".into(), Value::from(self.version));
        row.insert("name".into(), Value::from(&self.name));
        row.insert("color".into(), Value::from(&self.color));
        row.insert("created_at".into(), Value::from(self.created_at));
        row.insert("updated_at".into(), Value::from(self.updated_at));
        row
    }

    fn from_row(row: &Row) -> Result<Self> {
        let r = RowReader::new("ActivityType", row);
        Ok(Self {
            id: r.text("id")?,
            version: r.integer("version")?,
            name: r.text("name")?,
            color: r.text("color")?,
            created_at: r.timestamp("created_at")?,
            updated_at: r.timestamp("updated_at")?,
        })
    }
}
