// Domain services: users, activity types and activities, built on the entity
// base layer.

pub mod activity_service;
pub mod activity_type_service;
pub mod error;
pub mod user_service;

pub use activity_service::{ActivityPatch, ActivityService, NewActivity};
pub use activity_type_service::{ActivityTypeService, get_or_create};
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use user_service::{NewUser, UserService, UserUpdate};
