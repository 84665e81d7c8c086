//! Termpulse - shell activity watcher
//!
//! Tails a structured shell activity log, classifies noteworthy events
//! (finished builds, test runs, completed tasks, AI assistant output,
//! terminal escape-sequence notifications), filters noise and duplicates,
//! and publishes the survivors as notification events.

pub mod bus;
pub mod cache;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod parser;
pub mod pipeline;
pub mod reduce;
pub mod session;
pub mod sinks;
pub mod tail;
pub mod throttle;
pub mod watch;

pub use error::{Result, TermpulseError};
