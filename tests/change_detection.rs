// tests/change_detection.rs

use serde_json::json;

use scriptd::engine::{UpdateOutcome, UpdateReport, detect_changes};
use scriptd::types::ChangeField;
use scriptd_test_utils::builders::ScriptConfigBuilder;

#[test]
fn identical_configs_have_no_changes() {
    let cfg = ScriptConfigBuilder::new("job", "./job.sh").interval(60).build();
    assert!(detect_changes(&cfg, &cfg.clone()).is_empty());
}

#[test]
fn every_field_is_reported_in_order() {
    let old = ScriptConfigBuilder::new("job", "./job.sh")
        .interval(60)
        .max_log_lines(100)
        .timeout(0)
        .build();
    let new = ScriptConfigBuilder::new("job", "./job-v2.sh")
        .interval(5)
        .disabled()
        .max_log_lines(10)
        .timeout(30)
        .build();

    let changes = detect_changes(&old, &new);
    let fields: Vec<ChangeField> = changes.iter().map(|c| c.field).collect();
    assert_eq!(
        fields,
        vec![
            ChangeField::Path,
            ChangeField::Interval,
            ChangeField::Enabled,
            ChangeField::MaxLogLines,
            ChangeField::Timeout,
        ]
    );
    assert!(changes.iter().all(|c| c.requires_restart));

    assert_eq!(changes[0].old_value, json!("./job.sh"));
    assert_eq!(changes[0].new_value, json!("./job-v2.sh"));
    assert_eq!(changes[1].old_value, json!(60));
    assert_eq!(changes[1].new_value, json!(5));
    assert_eq!(changes[2].new_value, json!(false));
}

#[test]
fn single_field_change() {
    let old = ScriptConfigBuilder::new("job", "./job.sh").timeout(10).build();
    let new = ScriptConfigBuilder::new("job", "./job.sh").timeout(20).build();

    let changes = detect_changes(&old, &new);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].field, ChangeField::Timeout);
}

#[test]
fn report_message_reflects_scheduling() {
    let old = ScriptConfigBuilder::new("job", "./job.sh").interval(60).build();
    let new = ScriptConfigBuilder::new("job", "./job.sh").interval(30).build();

    let mut report = UpdateReport {
        script_name: "job".to_string(),
        changes: detect_changes(&old, &new),
        applied: true,
        scheduled: false,
    };
    assert!(!report.is_noop());
    assert!(report.requires_restart());
    assert_eq!(report.message(), "Script job updated");

    report.applied = false;
    report.scheduled = true;
    assert_eq!(
        report.message(),
        "Script job updated (changes scheduled after the current execution)"
    );
}

#[test]
fn report_serializes_with_snake_case_fields() {
    let old = ScriptConfigBuilder::new("job", "./job.sh").max_log_lines(100).build();
    let new = ScriptConfigBuilder::new("job", "./job.sh").max_log_lines(50).build();
    let report = UpdateReport {
        script_name: "job".to_string(),
        changes: detect_changes(&old, &new),
        applied: true,
        scheduled: false,
    };

    let value = serde_json::to_value(&report).expect("serialize report");
    assert_eq!(value["changes"][0]["field"], "max_log_lines");
    assert_eq!(value["changes"][0]["old_value"], 100);
    assert_eq!(value["changes"][0]["requires_restart"], true);
}

#[test]
fn outcome_stamps_every_change() {
    let old = ScriptConfigBuilder::new("job", "./job.sh").interval(60).timeout(0).build();
    let new = ScriptConfigBuilder::new("job", "./job.sh").interval(30).timeout(5).build();

    let deferred = UpdateReport::new("job", detect_changes(&old, &new), UpdateOutcome::Deferred);
    assert!(deferred.scheduled);
    assert!(!deferred.applied);
    assert!(deferred.changes.iter().all(|c| !c.applied));
    assert!(
        deferred
            .changes
            .iter()
            .all(|c| c.reason == UpdateOutcome::Deferred.reason())
    );

    let idle = UpdateReport::new("job", detect_changes(&old, &new), UpdateOutcome::NotRunning);
    assert!(idle.applied && !idle.scheduled);
    assert!(idle.changes.iter().all(|c| c.applied));
    assert_eq!(idle.message(), "Script job updated");

    let value = serde_json::to_value(&idle).expect("serialize report");
    assert_eq!(value["changes"][0]["applied"], true);
    assert_eq!(
        value["changes"][0]["reason"],
        "script not running, configuration updated"
    );
}
