//! Network change events

pub mod bus;
mod watcher;

pub use bus::{Subscription, WakeBus, WakeReason};
