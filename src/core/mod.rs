pub mod config;
pub mod error;
pub mod types;

pub use config::WarfareConfig;
pub use error::{ErrorCategory, Result, WarfareError};
