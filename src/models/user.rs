use crate::core::{DataType, Result, Row, Value};
use crate::entity::schema::{into_bool, into_opt_timestamp, into_text};
use crate::entity::{Entity, EntitySchema, RowReader};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub version: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

lazy_static! {
    static ref SCHEMA: EntitySchema<User> = EntitySchema::<User>::new("User", "users")
        .required("username", DataType::Text, |u, v| {
            u.username = into_text(v)?;
            Ok(())
        })
        .required("email", DataType::Text, |u, v| {
            u.email = into_text(v)?;
            Ok(())
        })
        .required("hashed_password", DataType::Text, |u, v| {
            u.hashed_password = into_text(v)?;
            Ok(())
        })
        .optional("is_active", DataType::Boolean, |u, v| {
            u.is_active = into_bool(v)?;
            Ok(())
        })
        .optional("is_staff", DataType::Boolean, |u, v| {
            u.is_staff = into_bool(v)?;
            Ok(())
        })
        .nullable("last_login", DataType::Timestamp, |u, v| {
            u.last_login = into_opt_timestamp(v)?;
            Ok(())
        })
        .system_column("created_at", DataType::Timestamp)
        .system_column("updated_at", DataType::Timestamp)
        .unique("username")
        .unique("email");
}

impl Entity for User {
    fn schema() -> &'static EntitySchema<Self> {
        &SCHEMA
    }

    fn blank(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            version: 1,
            username: String::new(),
            email: String::new(),
            hashed_password: String::new(),
            is_active: true,
            is_staff: false,
            last_login: Some(now),
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
        row.insert("username".into(), Value::from(&self.username));
        row.insert("email".into(), Value::from(&self.email));
        row.insert("hashed_password".into(), Value::from(&self.hashed_password));
        row.insert("is_active".into(), Value::from(self.is_active));
        row.insert("is_staff".into(), Value::from(self.is_staff));
        row.insert("last_login".into(), Value::from(self.last_login));
        row.insert("created_at".into(), Value::from(self.created_at));
        row.insert("updated_at".into(), Value::from(self.updated_at));
        row
    }

    fn from_row(row: &Row) -> Result<Self> {
        let r = RowReader::new("User", row);
        Ok(Self {
            id: r.text("id")?,
            version: r.integer("version")?,
            username: r.text("username")?,
            email: r.text("email")?,
            hashed_password: r.text("hashed_password")?,
            is_active: r.boolean("is_active")?,
            is_staff: r.boolean("is_staff")?,
            last_login: r.opt_timestamp("last_login")?,
            created_at: r.timestamp("created_at")?,
            updated_at: r.timestamp("updated_at")?,
        })
    }
}
