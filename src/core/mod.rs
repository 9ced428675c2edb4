pub mod error;
pub mod types;
pub mod value;

pub use error::{ErrorClass, PersistError, Result};
pub use types::{Column, ForeignKey, Row};
pub use value::{DataType, Value};
