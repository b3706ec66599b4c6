// src/logs/mod.rs

//! Structured execution history.
//!
//! - [`entry`]: the persisted [`LogEntry`] record.
//! - [`logger`]: [`ScriptLogger`], one script's bounded memory window plus
//!   append-only file.
//! - [`legacy`]: decoder for the older block-delimited text format.
//! - [`query`]: [`LogQuery`] filter criteria.
//! - [`manager`]: [`LogManager`], the registry that queries and clears
//!   across scripts.

pub mod entry;
pub mod legacy;
pub mod logger;
pub mod manager;
pub mod query;

pub use entry::LogEntry;
pub use logger::ScriptLogger;
pub use manager::LogManager;
pub use query::LogQuery;
