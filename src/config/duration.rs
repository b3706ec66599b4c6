// src/config/duration.rs

use std::time::Duration;

/// Parse a simple duration string like `"30s"`, `"5m"`, `"2h"` or a bare
/// number of seconds (`"3600"`).
///
/// Sub-second units are rejected: intervals and timeouts are whole seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }
    if s.starts_with('-') {
        return Err(format!("negative duration not allowed: {s}"));
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .unwrap_or(s.len());

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs = match unit.as_str() {
        "" | "s" => Some(value),
        "m" => value.checked_mul(60),
        "h" => value.checked_mul(60 * 60),
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected s, m, or h",
                unit
            ));
        }
    };

    secs.map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
