//! Configuration module

pub mod cli;
pub mod settings;
pub mod store;

pub use cli::CliArgs;
pub use settings::{RetrySettings, Settings};
pub use store::ConfigStore;
