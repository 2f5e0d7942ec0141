//! Core business logic module

pub mod agent;
pub mod classifier;
pub mod error;
pub mod manual;
pub mod probe;
pub mod scheduler;
pub mod submitter;
pub mod types;
