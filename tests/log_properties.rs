// tests/log_properties.rs

use proptest::prelude::*;

use scriptd::logs::{LogEntry, LogManager, LogQuery, ScriptLogger};
use scriptd_test_utils::builders::LogEntryBuilder;

// Output text as scripts produce it after trimming: printable, possibly
// multi-line, never surrounded by whitespace.
fn output_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 :{}\"\\[\\]\n]{0,40}".prop_map(|s| s.trim().to_string())
}

fn entry_strategy() -> impl Strategy<Value = LogEntry> {
    (
        0i64..100_000,
        -1i32..256,
        output_strategy(),
        output_strategy(),
        0u64..60_000,
    )
        .prop_map(|(offset, code, out, err, ms)| {
            LogEntryBuilder::new("prop", offset)
                .exit_code(code)
                .stdout(&out)
                .stderr(&err)
                .duration_ms(ms)
                .build()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn reload_reproduces_the_window(
        entries in proptest::collection::vec(entry_strategy(), 0..20),
        window in 1usize..25,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let logger = ScriptLogger::new("prop", dir.path(), window);
        for entry in &entries {
            logger.add_entry(entry.clone()).unwrap();
        }

        let expected: Vec<LogEntry> = entries
            .iter()
            .skip(entries.len().saturating_sub(window))
            .cloned()
            .collect();
        prop_assert_eq!(logger.entries(), expected.clone());

        let reloaded = ScriptLogger::new("prop", dir.path(), window);
        prop_assert_eq!(reloaded.entries(), expected);
    }

    #[test]
    fn limited_query_is_the_newest_suffix(
        entries in proptest::collection::vec(entry_strategy(), 0..30),
        limit in 1usize..40,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let manager = LogManager::new(dir.path());
        let logger = manager.get_logger("prop");
        for entry in &entries {
            logger.add_entry(entry.clone()).unwrap();
        }

        let all = manager.query_logs(&LogQuery::all());
        let limited = manager.query_logs(&LogQuery::all().with_limit(limit));

        prop_assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        prop_assert_eq!(limited.len(), all.len().min(limit));
        prop_assert_eq!(&limited[..], &all[all.len() - limited.len()..]);
    }
}
