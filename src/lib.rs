//! Roster agent — hosts an agent process: supervised tasks, live activity
//! and flow-local execution context.

pub mod activity;
pub mod agent;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod server;
pub mod tasks;

pub use error::{Error, Result};
