// src/engine/manager.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ScriptConfig, ServiceConfig, save_to_path, validate_script};
use crate::engine::changes::{UpdateOutcome, UpdateReport, detect_changes};
use crate::engine::runner::{RunnerExit, ScriptRunner};
use crate::errors::{Result, ScriptdError};
use crate::events::EventBroadcaster;
use crate::exec::{ExecContext, ExecutionResult, ScriptExecutor};
use crate::logs::LogManager;

/// How long stop operations wait for runners to acknowledge cancellation.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the declared script set and the live runners scheduling them.
///
/// Declared state (`ServiceConfig.scripts`, including `enabled`) and live
/// state (which names have a runner) are tracked separately: enabling a
/// script does not start it, and stopping one does not disable it.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ScriptManager {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<ManagerState>,
    executor: Arc<dyn ScriptExecutor>,
    logs: Arc<LogManager>,
    events: EventBroadcaster,
    /// Parent of every runner token; cancelled by [`ScriptManager::shutdown`].
    shutdown: CancellationToken,
    config_path: Option<PathBuf>,
    stop_timeout: Duration,
    next_generation: AtomicU64,
}

struct ManagerState {
    config: ServiceConfig,
    live: HashMap<String, LiveRunner>,
}

/// A scheduled script. `generation` distinguishes successive start/stop
/// cycles of the same name so a late supervisor never evicts a newer entry.
struct LiveRunner {
    runner: Arc<ScriptRunner>,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ScriptManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptManager")
            .field("running", &self.get_running_scripts())
            .field("config_path", &self.inner.config_path)
            .finish_non_exhaustive()
    }
}

impl ScriptManager {
    pub fn new(
        config: ServiceConfig,
        executor: Arc<dyn ScriptExecutor>,
        logs: Arc<LogManager>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ManagerState {
                    config,
                    live: HashMap::new(),
                }),
                executor,
                logs,
                events,
                shutdown: CancellationToken::new(),
                config_path: None,
                stop_timeout: DEFAULT_STOP_TIMEOUT,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Remember where the config came from so [`ScriptManager::save_config`]
    /// can write it back.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.configure(|inner| inner.config_path = Some(path));
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.configure(|inner| inner.stop_timeout = timeout);
        self
    }

    /// Builder options only apply before the manager has been cloned.
    fn configure(&mut self, apply: impl FnOnce(&mut Inner)) {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => apply(inner),
            None => warn!("manager already shared; builder option ignored"),
        }
    }

    pub fn logs(&self) -> &Arc<LogManager> {
        &self.inner.logs
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.inner.events
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.inner.config_path.as_deref()
    }

    // ---------------------------------------------------------------------
    // Declared configuration
    // ---------------------------------------------------------------------

    /// Declare a new script. Zero interval / max_log_lines get defaults.
    pub fn add_script(&self, config: ScriptConfig) -> Result<()> {
        let config = config.with_defaults();
        validate_script(&config)?;

        let mut state = self.lock();
        if state.config.contains(&config.name) {
            return Err(ScriptdError::DuplicateName(config.name));
        }
        info!(script = %config.name, path = %config.path.display(), "script added");
        state.config.scripts.push(config);
        Ok(())
    }

    /// Stop the script if it is live, then drop it from the declared set.
    pub async fn remove_script(&self, name: &str) -> Result<()> {
        let live = {
            let mut state = self.lock();
            if !state.config.contains(name) {
                return Err(ScriptdError::NotFound(name.to_string()));
            }
            state.live.remove(name)
        };
        if let Some(live) = live {
            self.join_stopped(name, live).await;
        }

        // A start that slipped in during the stop wait is torn down too.
        let late = {
            let mut state = self.lock();
            state.config.scripts.retain(|s| s.name != name);
            state.live.remove(name)
        };
        if let Some(live) = late {
            self.join_stopped(name, live).await;
        }
        info!(script = %name, "script removed");
        Ok(())
    }

    pub fn enable_script(&self, name: &str) -> Result<()> {
        self.set_enabled(name, true)
    }

    pub fn disable_script(&self, name: &str) -> Result<()> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut state = self.lock();
        let script = state
            .config
            .find_mut(name)
            .ok_or_else(|| ScriptdError::NotFound(name.to_string()))?;
        script.enabled = enabled;
        debug!(script = %name, enabled, "declared state changed");
        Ok(())
    }

    /// Replace a script's config, restarting its runner if it is live.
    pub fn update_script(&self, name: &str, config: ScriptConfig) -> Result<()> {
        self.update_script_with_immediate_application(name, config)
            .map(|_| ())
    }

    /// Replace a script's config and apply it to the live runner.
    ///
    /// An idle runner is restarted right away with the new config. A runner
    /// that is mid-execution finishes that run first, so reconfiguration
    /// never aborts a run in progress. Switching `enabled` off retires the
    /// runner instead of restarting it.
    pub fn update_script_with_immediate_application(
        &self,
        name: &str,
        mut config: ScriptConfig,
    ) -> Result<UpdateReport> {
        config.name = name.to_string();
        let config = config.with_defaults();
        validate_script(&config)?;

        let mut state = self.lock();
        let slot = state
            .config
            .find_mut(name)
            .ok_or_else(|| ScriptdError::NotFound(name.to_string()))?;
        let old = std::mem::replace(slot, config.clone());
        let changes = detect_changes(&old, &config);
        let restart = changes.iter().any(|c| c.requires_restart);

        let outcome = match state.live.get(name) {
            _ if changes.is_empty() => UpdateOutcome::Unchanged,
            None => UpdateOutcome::NotRunning,
            Some(live) => {
                // A change already queued means this one lands with it, later.
                let busy = live.runner.is_executing() || live.runner.has_pending();
                let retire = old.enabled && !config.enabled;
                if retire {
                    live.runner.set_retire_pending();
                } else if restart {
                    live.runner.set_restart_pending(config.clone());
                }
                match (busy, retire) {
                    (true, _) => UpdateOutcome::Deferred,
                    (false, true) => UpdateOutcome::Retiring,
                    (false, false) => UpdateOutcome::Restarting,
                }
            }
        };
        let report = UpdateReport::new(name, changes, outcome);
        drop(state);

        if let Some(logger) = self.inner.logs.find_logger(name) {
            logger.set_max_entries(config.max_log_lines);
        }

        info!(
            script = %name,
            changes = report.changes.len(),
            ?outcome,
            applied = report.applied,
            scheduled = report.scheduled,
            "script updated"
        );
        Ok(report)
    }

    /// Snapshot of the declared scripts.
    pub fn get_scripts(&self) -> Vec<ScriptConfig> {
        self.lock().config.scripts.clone()
    }

    pub fn get_script(&self, name: &str) -> Option<ScriptConfig> {
        self.lock().config.find(name).cloned()
    }

    /// Snapshot of the whole service config.
    pub fn get_config(&self) -> ServiceConfig {
        self.lock().config.clone()
    }

    /// Write the declared config back to the path it was loaded from.
    pub fn save_config(&self) -> Result<()> {
        let path = self.inner.config_path.as_ref().ok_or_else(|| {
            ScriptdError::Validation("config path not set; cannot save configuration".to_string())
        })?;
        let config = self.get_config();
        save_to_path(path, &config)
    }

    // ---------------------------------------------------------------------
    // Live lifecycle
    // ---------------------------------------------------------------------

    /// Start scheduling a declared script. Must be called from within a
    /// Tokio runtime.
    pub fn start_script(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        let config = state
            .config
            .find(name)
            .cloned()
            .ok_or_else(|| ScriptdError::NotFound(name.to_string()))?;
        if state.live.contains_key(name) {
            return Err(ScriptdError::AlreadyRunning(name.to_string()));
        }

        let runner = Arc::new(self.new_runner(config));
        let Some(token) = runner.begin(&self.inner.shutdown) else {
            return Err(ScriptdError::AlreadyRunning(name.to_string()));
        };
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        let handle = tokio::spawn(supervise(
            self.clone(),
            name.to_string(),
            Arc::clone(&runner),
            token,
            generation,
        ));

        state.live.insert(
            name.to_string(),
            LiveRunner {
                runner,
                generation,
                handle: Some(handle),
            },
        );
        info!(script = %name, generation, "script scheduled");
        Ok(())
    }

    /// Stop a live script and wait (bounded) for it to acknowledge.
    pub async fn stop_script(&self, name: &str) -> Result<()> {
        let live = self
            .lock()
            .live
            .remove(name)
            .ok_or_else(|| ScriptdError::NotRunning(name.to_string()))?;
        self.join_stopped(name, live).await;
        Ok(())
    }

    /// Start every enabled script that is not already live. Returns how
    /// many were started.
    pub fn start_all_enabled(&self) -> Result<usize> {
        let names: Vec<String> = {
            let state = self.lock();
            state
                .config
                .enabled_scripts()
                .filter(|s| !state.live.contains_key(&s.name))
                .map(|s| s.name.clone())
                .collect()
        };

        let mut started = 0;
        for name in names {
            match self.start_script(&name) {
                Ok(()) => started += 1,
                // Raced with another start; already scheduled is fine here.
                Err(ScriptdError::AlreadyRunning(_)) => {}
                Err(e) => return Err(e),
            }
        }
        info!(started, "enabled scripts started");
        Ok(started)
    }

    /// Stop every live runner and return once all of them have acknowledged
    /// or the stop timeout has elapsed.
    pub async fn stop_all(&self) {
        let live: Vec<(String, LiveRunner)> = self.lock().live.drain().collect();
        if live.is_empty() {
            return;
        }

        for (_, entry) in &live {
            entry.runner.stop();
        }

        let deadline = Instant::now() + self.inner.stop_timeout;
        let count = live.len();
        for (name, mut entry) in live {
            if let Some(handle) = entry.handle.take() {
                await_stop(&name, handle, deadline).await;
            }
        }
        info!(count, "all scripts stopped");
    }

    /// Cancel the shared parent token and stop every runner. Runners started
    /// afterwards exit immediately.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.stop_all().await;
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Execute a declared script once, outside its schedule.
    ///
    /// Uses a throwaway runner, so nothing is left registered afterwards.
    /// The entry is logged and events are published as for a scheduled run.
    /// A non-zero exit, timeout or infrastructure failure is returned as
    /// [`ScriptdError::Execution`].
    pub async fn run_script_once(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<ExecutionResult> {
        let config = self
            .get_script(name)
            .ok_or_else(|| ScriptdError::NotFound(name.to_string()))?;

        let runner = self.new_runner(config);
        let ctx = ExecContext::new(cancel.child_token());
        let result = runner.run_once(&ctx, &[]).await;
        result.check()?;
        Ok(result)
    }

    /// Names of scripts with a live runner, sorted.
    pub fn get_running_scripts(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().live.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_script_running(&self, name: &str) -> bool {
        self.lock().live.contains_key(name)
    }

    /// True while the live runner for `name` has an execution in flight.
    pub fn is_script_executing(&self, name: &str) -> bool {
        self.lock()
            .live
            .get(name)
            .is_some_and(|live| live.runner.is_executing())
    }

    fn new_runner(&self, config: ScriptConfig) -> ScriptRunner {
        ScriptRunner::new(
            config,
            Arc::clone(&self.inner.executor),
            Arc::clone(&self.inner.logs),
            self.inner.events.clone(),
        )
    }

    async fn join_stopped(&self, name: &str, mut live: LiveRunner) {
        live.runner.stop();
        if let Some(handle) = live.handle.take() {
            let deadline = Instant::now() + self.inner.stop_timeout;
            await_stop(name, handle, deadline).await;
        }
        info!(script = %name, "script stopped");
    }

    /// Replace the live runner of `name` with a fresh one, unless the entry
    /// was stopped or replaced meanwhile.
    ///
    /// The new runner is built from the declared config read under the
    /// lock, not from `requested`: an update that reached the old runner
    /// after it had already taken its pending change is still picked up. If
    /// such an update disabled a script that `requested` had enabled, the
    /// entry is retired instead.
    fn swap_runner(
        &self,
        name: &str,
        generation: u64,
        requested: &ScriptConfig,
    ) -> Option<(Arc<ScriptRunner>, CancellationToken)> {
        let mut state = self.lock();
        if !state
            .live
            .get(name)
            .is_some_and(|live| live.generation == generation)
        {
            return None;
        }

        let config = match state.config.find(name) {
            Some(declared) if requested.enabled && !declared.enabled => None,
            Some(declared) => Some(declared.clone()),
            None => None,
        };
        let Some(config) = config else {
            state.live.remove(name);
            info!(script = %name, "script disabled or removed before restart; runner retired");
            return None;
        };

        let next = Arc::new(self.new_runner(config));
        let token = next.begin(&self.inner.shutdown)?;
        let live = state.live.get_mut(name)?;
        live.runner = Arc::clone(&next);
        Some((next, token))
    }

    fn deregister(&self, name: &str, generation: u64, exit: &RunnerExit) {
        let mut state = self.lock();
        if state
            .live
            .get(name)
            .is_some_and(|live| live.generation == generation)
        {
            state.live.remove(name);
            debug!(script = %name, ?exit, "runner deregistered");
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn await_stop(name: &str, mut handle: JoinHandle<()>, deadline: Instant) {
    match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(script = %name, error = %e, "runner task failed"),
        Err(_) => {
            warn!(script = %name, "runner did not stop in time; aborting");
            handle.abort();
        }
    }
}

/// Drive one live script across restarts until it stops or retires.
async fn supervise(
    manager: ScriptManager,
    name: String,
    mut runner: Arc<ScriptRunner>,
    mut token: CancellationToken,
    generation: u64,
) {
    loop {
        let exit = runner.run_loop(token).await;
        match exit {
            RunnerExit::Restart(config) => {
                let Some((next, next_token)) = manager.swap_runner(&name, generation, &config)
                else {
                    debug!(script = %name, "restart dropped; script no longer scheduled");
                    return;
                };
                info!(script = %name, "runner restarted with new configuration");
                runner = next;
                token = next_token;
            }
            exit => {
                manager.deregister(&name, generation, &exit);
                return;
            }
        }
    }
}
