pub mod activity;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod ping;
pub mod sweep;
pub mod tracker;
pub mod types;

pub use error::{PresenceError, Result};
pub use tracker::PresenceTracker;
