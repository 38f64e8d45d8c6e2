pub mod config;
pub mod error;

pub use config::HarnessConfig;
pub use error::CoreError;
