use super::{ActivityTypeService, ServiceError, ServiceResult};
use crate::entity::{EntityRef, Fields, Repository};
use crate::fields;
use crate::models::{Activity, ActivityType, User};
use crate::storage::Filter;
use crate::transaction::{ScopeOptions, Session};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Input for a new activity. Without `type_name` the activity is filed under
/// the shared "General" type.
#[derive(Debug, Clone, Default)]
pub struct NewActivity {
    pub title: String,
    pub description: Option<String>,
    pub activity_date: Option<DateTime<Utc>>,
    pub type_name: Option<String>,
    pub type_color: Option<String>,
}

impl NewActivity {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn activity_date(mut self, date: DateTime<Utc>) -> Self {
        self.activity_date = Some(date);
        self
    }

    pub fn activity_type(mut self, name: impl Into<String>, color: Option<&str>) -> Self {
        self.type_name = Some(name.into());
        self.type_color = color.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActivityPatch {
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub activity_date: Option<DateTime<Utc>>,
    pub type_name: Option<String>,
    pub type_color: Option<String>,
}

fn validate_title(title: &str) -> ServiceResult<()> {
    if title.trim().is_empty() {
        return Err(ServiceError::validation("activity title cannot be empty"));
    }
    Ok(())
}

/// Reads the activity inside `session` and fails unless `user_id` owns it.
async fn owned_activity(session: &Session, user_id: &str, activity_id: &str) -> ServiceResult<Activity> {
    let activity = session.read_entity::<Activity>(activity_id).await?;
    if activity.user_id != user_id {
        return Err(ServiceError::forbidden(format!(
            "activity {} does not belong to user {}",
            activity_id, user_id
        )));
    }
    Ok(activity)
}

#[derive(Clone)]
pub struct ActivityService {
    activities: Repository<Activity>,
    users: Repository<User>,
    types: ActivityTypeService,
}

impl ActivityService {
    pub fn new(
        activities: Repository<Activity>,
        users: Repository<User>,
        types: ActivityTypeService,
    ) -> Self {
        Self {
            activities,
            users,
            types,
        }
    }

    pub async fn create_activity(&self, user_id: &str, new: NewActivity) -> ServiceResult<Activity> {
        validate_title(&new.title)?;
        let owner = self.users.read_by_id(user_id).await?;
        let activity_type = self
            .types
            .resolve(new.type_name.as_deref(), new.type_color.as_deref())
            .await?;

        let activity = self
            .activities
            .create(fields! {
                "title" => new.title,
                "description" => new.description,
                "activity_date" => new.activity_date.unwrap_or_else(Utc::now),
                "user_id" => owner.id,
                "type_id" => activity_type.id,
            })
            .await?;
        debug!(activity_id = %activity.id, user_id, "activity created");
        Ok(activity)
    }

    pub async fn get_activity(&self, user_id: &str, activity_id: &str) -> ServiceResult<Activity> {
        self.activities
            .manager()
            .run(ScopeOptions::read_committed().retries(1), |session| async move {
                owned_activity(&session, user_id, activity_id).await
            })
            .await
    }

    /// Page of the user's activities plus how many they own in total.
    pub async fn list_user_activities(
        &self,
        user_id: &str,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> ServiceResult<(Vec<Activity>, u64)> {
        Ok(self
            .activities
            .read_all(page, page_size, vec![Filter::eq("user_id", user_id)])
            .await?)
    }

    /// Applies `patch` if `user_id` owns the activity. A new type is resolved
    /// in its own scope before the update scope opens.
    pub async fn update_activity(
        &self,
        user_id: &str,
        activity_id: &str,
        patch: ActivityPatch,
    ) -> ServiceResult<Activity> {
        let mut fields = Fields::new();
        if let Some(title) = patch.title {
            validate_title(&title)?;
            fields.insert("title".into(), title.into());
        }
        if let Some(description) = patch.description {
            fields.insert("description".into(), description.into());
        }
        if let Some(date) = patch.activity_date {
            fields.insert("activity_date".into(), date.into());
        }
        if let Some(name) = patch.type_name.as_deref() {
            let activity_type = self
                .types
                .resolve(Some(name), patch.type_color.as_deref())
                .await?;
            fields.insert("type_id".into(), activity_type.id.into());
        }

        self.activities
            .manager()
            .run(ScopeOptions::repeatable_read(), |session| {
                let fields = fields.clone();
                async move {
                    let current = owned_activity(&session, user_id, activity_id).await?;
                    Ok(session
                        .update_entity(&EntityRef::Entity(current), &fields)
                        .await?)
                }
            })
            .await
    }

    pub async fn delete_activity(&self, user_id: &str, activity_id: &str) -> ServiceResult<()> {
        self.activities
            .manager()
            .run(ScopeOptions::repeatable_read(), |session| async move {
                let current = owned_activity(&session, user_id, activity_id).await?;
                Ok(session.delete_entity(&EntityRef::Entity(current)).await?)
            })
            .await
    }

    /// The type the activity is filed under, if it still has one.
    pub async fn activity_type_of(&self, activity: &Activity) -> ServiceResult<Option<ActivityType>> {
        match activity.type_id.as_deref() {
            Some(type_id) => Ok(Some(self.types.get_activity_type(type_id).await?)),
            None => Ok(None),
        }
    }
}
