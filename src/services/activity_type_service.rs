use super::{ServiceError, ServiceResult};
use crate::core::{PersistError, Result};
use crate::entity::{Fields, Repository};
use crate::fields;
use crate::models::{ActivityType, DEFAULT_TYPE_COLOR, GENERAL_TYPE_COLOR, GENERAL_TYPE_NAME};
use crate::storage::Filter;
use crate::transaction::{ScopeOptions, Session};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

lazy_static! {
    static ref COLOR_PATTERN: Regex = Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid color regex");
}

fn validate_name(name: &str) -> ServiceResult<()> {
    if name.trim().is_empty() {
        return Err(ServiceError::validation("activity type name cannot be empty"));
    }
    Ok(())
}

fn validate_color(color: &str) -> ServiceResult<()> {
    if !COLOR_PATTERN.is_match(color) {
        return Err(ServiceError::validation(format!(
            "'{}' is not a #RRGGBB color",
            color
        )));
    }
    Ok(())
}

fn already_exists_on_integrity(name: &str) -> impl FnOnce(PersistError) -> ServiceError + '_ {
    move |err| match err {
        PersistError::IntegrityViolation(_) => {
            ServiceError::AlreadyExists(format!("activity type '{}'", name))
        }
        other => other.into(),
    }
}

/// Finds the type called `name` or inserts it with `color`, inside the
/// caller's scope.
pub async fn get_or_create(session: &Session, name: &str, color: &str) -> Result<ActivityType> {
    if let Some(existing) = session
        .find_one_by::<ActivityType>(&[Filter::eq("name", name)])
        .await?
    {
        return Ok(existing);
    }

    let created = session
        .create_entity::<ActivityType>(fields! { "name" => name, "color" => color })
        .await?;
    info!(type_id = %created.id, name, color, "activity type created");
    Ok(created)
}

#[derive(Clone)]
pub struct ActivityTypeService {
    types: Repository<ActivityType>,
}

impl ActivityTypeService {
    pub fn new(types: Repository<ActivityType>) -> Self {
        Self { types }
    }

    pub async fn create_activity_type(&self, name: &str, color: &str) -> ServiceResult<ActivityType> {
        validate_name(name)?;
        validate_color(color)?;

        if self.get_by_name(name).await?.is_some() {
            return Err(ServiceError::AlreadyExists(format!("activity type '{}'", name)));
        }

        let created = self
            .types
            .create(fields! { "name" => name, "color" => color })
            .await
            .map_err(already_exists_on_integrity(name))?;
        info!(type_id = %created.id, name, "activity type created");
        Ok(created)
    }

    pub async fn update_activity_type(
        &self,
        type_id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> ServiceResult<ActivityType> {
        let mut fields = Fields::new();
        if let Some(name) = name {
            validate_name(name)?;
            fields.insert("name".into(), name.into());
        }
        if let Some(color) = color {
            validate_color(color)?;
            fields.insert("color".into(), color.into());
        }

        let updated = self.types.update(type_id, fields).await;
        match name {
            Some(name) => updated.map_err(already_exists_on_integrity(name)),
            None => Ok(updated?),
        }
    }

    pub async fn delete_activity_type(&self, type_id: &str) -> ServiceResult<()> {
        Ok(self.types.delete(type_id).await?)
    }

    pub async fn get_activity_type(&self, type_id: &str) -> ServiceResult<ActivityType> {
        Ok(self.types.read_by_id(type_id).await?)
    }

    pub async fn get_by_name(&self, name: &str) -> ServiceResult<Option<ActivityType>> {
        Ok(self
            .types
            .find_one_by(vec![Filter::eq("name", name)])
            .await?)
    }

    pub async fn list_activity_types(
        &self,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> ServiceResult<(Vec<ActivityType>, u64)> {
        Ok(self.types.read_all(page, page_size, Vec::new()).await?)
    }

    /// The type an activity should carry: `name` (created with `color`, or
    /// white, when missing) or the shared "General" type.
    ///
    /// Runs in its own scope. When a concurrent scope creates the same type
    /// first, the unique name rejects this insert and the winner's row is read
    /// back instead.
    pub async fn resolve(&self, name: Option<&str>, color: Option<&str>) -> ServiceResult<ActivityType> {
        let (name, color) = match name {
            Some(name) => {
                validate_name(name)?;
                (name, color.unwrap_or(DEFAULT_TYPE_COLOR))
            }
            None => (GENERAL_TYPE_NAME, GENERAL_TYPE_COLOR),
        };
        validate_color(color)?;

        let resolved = self
            .types
            .manager()
            .run(ScopeOptions::repeatable_read(), |session| async move {
                get_or_create(&session, name, color).await
            })
            .await;

        match resolved {
            Ok(activity_type) => Ok(activity_type),
            Err(PersistError::IntegrityViolation(reason)) => {
                debug!(name, %reason, "activity type created concurrently, reading winner");
                self.get_by_name(name).await?.ok_or_else(|| {
                    PersistError::NotFound {
                        entity: "ActivityType",
                        key: "name",
                        id: name.to_string(),
                    }
                    .into()
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}
