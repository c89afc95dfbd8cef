//! Grammar for human-friendly duration and size flags.
//!
//! Durations: `<number><unit>` where unit is one of `ms`, `s`, `m`, `h`; a
//! bare number (no unit) is interpreted as seconds, matching the historical
//! plain-float behavior of `-connect-timeout`/`-keepalive-time`/`-max-time`.
//!
//! Sizes: `<number>[B|KB|MB|GB]`, case-insensitive, 1024-based; a bare number
//! (no unit) is interpreted as bytes, matching the historical plain-int
//! behavior of `-max-msg-sz`.

/// Parse a duration string into seconds. Used as a clap `value_parser` for
/// flags that store `Option<f64>` seconds internally.
pub fn parse_duration_secs(input: &str) -> Result<f64, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration must not be empty".into());
    }

    let (number_part, unit) = split_suffix(s, &["ms", "s", "m", "h"]);
    let value: f64 = number_part
        .parse()
        .map_err(|_| format!("invalid duration {input:?}: not a number"))?;
    if value < 0.0 {
        return Err(format!("invalid duration {input:?}: must not be negative"));
    }

    let secs = match unit {
        "ms" => value / 1000.0,
        "s" | "" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("invalid duration unit {other:?} in {input:?}")),
    };
    Ok(secs)
}

/// Parse a size string into bytes. Used as a clap `value_parser` for flags
/// that store `Option<i32>` bytes internally.
pub fn parse_size_bytes(input: &str) -> Result<i32, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("size must not be empty".into());
    }

    let (number_part, unit) = split_suffix_ci(s, &["gb", "mb", "kb", "b"]);
    let value: f64 = number_part
        .parse()
        .map_err(|_| format!("invalid size {input:?}: not a number"))?;
    if value < 0.0 {
        return Err(format!("invalid size {input:?}: must not be negative"));
    }

    let multiplier: f64 = match unit.as_str() {
        "b" | "" => 1.0,
        "kb" => 1024.0,
        "mb" => 1024.0 * 1024.0,
        "gb" => 1024.0 * 1024.0 * 1024.0,
        other => return Err(format!("invalid size unit {other:?} in {input:?}")),
    };

    let bytes = value * multiplier;
    if bytes > i32::MAX as f64 {
        return Err(format!("size {input:?} is too large"));
    }
    Ok(bytes as i32)
}

/// Split a trailing unit suffix (case-sensitive) from a numeric prefix,
/// preferring the longest matching suffix so "ms" isn't mistaken for "s".
fn split_suffix<'a>(s: &'a str, units: &[&str]) -> (&'a str, &'a str) {
    let mut candidates: Vec<&str> = units.to_vec();
    candidates.sort_by_key(|u| std::cmp::Reverse(u.len()));
    for unit in candidates {
        if let Some(prefix) = s.strip_suffix(unit) {
            return (prefix, unit);
        }
    }
    (s, "")
}

/// Case-insensitive variant of `split_suffix`, normalizing the matched unit
/// to lowercase for the caller.
fn split_suffix_ci(s: &str, units: &[&str]) -> (&str, String) {
    let lower = s.to_ascii_lowercase();
    let mut candidates: Vec<&str> = units.to_vec();
    candidates.sort_by_key(|u| std::cmp::Reverse(u.len()));
    for unit in candidates {
        if lower.ends_with(unit) {
            let split_at = s.len() - unit.len();
            return (&s[..split_at], unit.to_string());
        }
    }
    (s, String::new())
}
