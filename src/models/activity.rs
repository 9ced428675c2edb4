use crate::core::{DataType, Result, Row, Value};
use crate::entity::schema::{into_opt_text, into_text, into_timestamp};
use crate::entity::{Entity, EntitySchema, RowReader};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::Serialize;

/// Something a user did, owned by that user and tagged with one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    pub id: String,
    pub version: i64,
    pub title: String,
    pub description: Option<String>,
    pub activity_date: DateTime<Utc>,
    pub user_id: String,
    pub type_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

lazy_static! {
    static ref SCHEMA: EntitySchema<Activity> = EntitySchema::<Activity>::new("Activity", "activities")
        .required("title", DataType::Text, |a, v| {
            a.title = into_text(v)?;
            Ok(())
        })
        .nullable("description", DataType::Text, |a, v| {
            a.description = into_opt_text(v)?;
            Ok(())
        })
        .required("activity_date", DataType::Timestamp, |a, v| {
            a.activity_date = into_timestamp(v)?;
            Ok(())
        })
        .required("user_id", DataType::Text, |a, v| {
            a.user_id = into_text(v)?;
            Ok(())
        })
        .nullable("type_id", DataType::Text, |a, v| {
            a.type_id = into_opt_text(v)?;
            Ok(())
        })
        .system_column("created_at", DataType::Timestamp)
        .system_column("updated_at", DataType::Timestamp)
        .references("user_id", "users")
        .references("type_id", "activity_types");
}

impl Entity for Activity {
    fn schema() -> &'static EntitySchema<Self> {
        &SCHEMA
    }

    fn blank(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            version: 1,
            title: String::new(),
            description: None,
            activity_date: now,
            user_id: String::new(),
            type_id: None,
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
        row.insert("title".into(), Value::from(&self.title));
        row.insert("description".into(), Value::from(self.description.clone()));
        row.insert("activity_date".into(), Value::from(self.activity_date));
        row.insert("user_id".into(), Value::from(&self.user_id));
        row.insert("type_id".into(), Value::from(self.type_id.clone()));
        row.insert("created_at".into(), Value::from(self.created_at));
        row.insert("updated_at".into(), Value::from(self.updated_at));
        row
    }

    fn from_row(row: &Row) -> Result<Self> {
        let r = RowReader::new("Activity", row);
        Ok(Self {
            id: r.text("id")?,
            version: r.integer("version")?,
            title: r.text("title")?,
            description: r.opt_text("description")?,
            activity_date: r.timestamp("activity_date")?,
            user_id: r.text("user_id")?,
            type_id: r.opt_text("type_id")?,
            created_at: r.timestamp("created_at")?,
            updated_at: r.timestamp("updated_at")?,
        })
    }
}
