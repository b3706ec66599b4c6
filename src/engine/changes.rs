// src/engine/changes.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ScriptConfig;
use crate::types::ChangeField;

/// One field that differs between two versions of a script's config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChange {
    pub field: ChangeField,
    pub old_value: Value,
    pub new_value: Value,
    pub requires_restart: bool,
    /// Whether the live runner picked the change up right away. Filled in
    /// by [`UpdateReport::new`].
    #[serde(default)]
    pub applied: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

impl ConfigChange {
    fn new(field: ChangeField, old_value: impl Into<Value>, new_value: impl Into<Value>) -> Self {
        Self {
            field,
            old_value: old_value.into(),
            new_value: new_value.into(),
            requires_restart: requires_restart(field),
            applied: false,
            reason: String::new(),
        }
    }
}

/// Every tracked field currently needs a runner restart to take effect.
pub fn requires_restart(field: ChangeField) -> bool {
    match field {
        ChangeField::Path
        | ChangeField::Interval
        | ChangeField::Enabled
        | ChangeField::MaxLogLines
        | ChangeField::Timeout => true,
    }
}

/// Field-level diff of `old` against `new`, in a fixed field order.
pub fn detect_changes(old: &ScriptConfig, new: &ScriptConfig) -> Vec<ConfigChange> {
    let mut changes = Vec::new();

    if old.path != new.path {
        changes.push(ConfigChange::new(
            ChangeField::Path,
            old.path.display().to_string(),
            new.path.display().to_string(),
        ));
    }
    if old.interval != new.interval {
        changes.push(ConfigChange::new(ChangeField::Interval, old.interval, new.interval));
    }
    if old.enabled != new.enabled {
        changes.push(ConfigChange::new(ChangeField::Enabled, old.enabled, new.enabled));
    }
    if old.max_log_lines != new.max_log_lines {
        changes.push(ConfigChange::new(
            ChangeField::MaxLogLines,
            old.max_log_lines,
            new.max_log_lines,
        ));
    }
    if old.timeout != new.timeout {
        changes.push(ConfigChange::new(ChangeField::Timeout, old.timeout, new.timeout));
    }

    changes
}

/// How the live side took an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Nothing differed.
    Unchanged,
    /// No runner is live; the declared config is all there is to change.
    NotRunning,
    /// The idle runner restarts with the new config right away.
    Restarting,
    /// The idle runner retires because the script was disabled.
    Retiring,
    /// The runner is executing or already has a change queued; this one
    /// takes effect once it is idle.
    Deferred,
}

impl UpdateOutcome {
    pub fn reason(self) -> &'static str {
        match self {
            UpdateOutcome::Unchanged => "unchanged",
            UpdateOutcome::NotRunning => "script not running, configuration updated",
            UpdateOutcome::Restarting => "runner restarting with the new configuration",
            UpdateOutcome::Retiring => "script disabled, runner retiring",
            UpdateOutcome::Deferred => "runner busy, change applied after the current execution",
        }
    }
}

/// What an update did to the declared config and to the live runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub script_name: String,
    pub changes: Vec<ConfigChange>,
    /// The new config is in effect, or will be as soon as the idle runner
    /// picks it up.
    pub applied: bool,
    /// The runner was busy; the change waits for it to be idle.
    pub scheduled: bool,
}

impl UpdateReport {
    /// Stamp every change with `outcome` and derive the overall flags.
    pub fn new(
        script_name: impl Into<String>,
        mut changes: Vec<ConfigChange>,
        outcome: UpdateOutcome,
    ) -> Self {
        let deferred = outcome == UpdateOutcome::Deferred;
        for change in &mut changes {
            change.applied = !deferred;
            change.reason = outcome.reason().to_string();
        }
        Self {
            script_name: script_name.into(),
            changes,
            applied: !deferred,
            scheduled: deferred,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn requires_restart(&self) -> bool {
        self.changes.iter().any(|c| c.requires_restart)
    }

    pub fn message(&self) -> String {
        if self.scheduled {
            format!(
                "Script {} updated (changes scheduled after the current execution)",
                self.script_name
            )
        } else {
            format!("Script {} updated", self.script_name)
        }
    }
}
