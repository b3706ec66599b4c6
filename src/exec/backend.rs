// src/exec/backend.rs

//! Pluggable executor abstraction.
//!
//! Runners talk to a `ScriptExecutor` instead of spawning processes
//! themselves. This makes it easy to swap in a fake executor in tests while
//! keeping the production implementation in [`ProcessExecutor`].

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use crate::exec::{ExecContext, ExecutionResult, LogHandler, ProcessExecutor};

/// Trait abstracting how a single script execution is carried out.
///
/// Implementations must honour the same contract as
/// [`ProcessExecutor::execute_with_streaming`]: call `on_start`/`on_end`
/// around the run, stream lines through the handler, and fold every failure
/// into the returned [`ExecutionResult`].
pub trait ScriptExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        ctx: &'a ExecContext,
        script_path: &'a Path,
        args: &'a [String],
        handler: Arc<dyn LogHandler>,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult> + Send + 'a>>;
}

impl ScriptExecutor for ProcessExecutor {
    fn execute<'a>(
        &'a self,
        ctx: &'a ExecContext,
        script_path: &'a Path,
        args: &'a [String],
        handler: Arc<dyn LogHandler>,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult> + Send + 'a>> {
        Box::pin(self.execute_with_streaming(ctx, script_path, args, handler))
    }
}
