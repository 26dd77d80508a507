pub mod error;
pub mod model;

pub use error::{HuddleError, MediaError, Result};
pub use model::*;
