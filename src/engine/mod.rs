// src/engine/mod.rs

//! Scheduling engine.
//!
//! This module ties together:
//! - [`runner`]: one [`ScriptRunner`] per scheduled script, ticking on its
//!   own interval and executing strictly one run at a time
//! - [`manager`]: the [`ScriptManager`] that owns the declared script set and
//!   the live runners, and applies add / remove / update / start / stop
//! - [`changes`]: field-level config diffs and the [`UpdateReport`] returned
//!   by live updates
//!
//! There is no global scheduler loop. Each runner is its own task and is
//! coordinated only through cancellation tokens, so a hung script can stall
//! nothing but itself.

pub mod changes;
pub mod manager;
pub mod runner;

pub use changes::{ConfigChange, UpdateOutcome, UpdateReport, detect_changes};
pub use manager::ScriptManager;
pub use runner::{PendingChange, RunnerExit, ScriptRunner};
