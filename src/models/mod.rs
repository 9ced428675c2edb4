pub mod activity;
pub mod activity_type;
pub mod user;

pub use activity::Activity;
pub use activity_type::{ActivityType, DEFAULT_TYPE_COLOR, GENERAL_TYPE_COLOR, GENERAL_TYPE_NAME};
pub use user::User;
