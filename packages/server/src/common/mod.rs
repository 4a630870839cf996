// Common types and utilities shared across the application

pub mod entity_ids;
pub mod error;
pub mod id;

pub use entity_ids::*;
pub use error::{CoreError, Result};
pub use id::{Id, V4, V7};
