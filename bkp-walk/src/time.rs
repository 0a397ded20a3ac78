use chrono::{NaiveDateTime, TimeZone, Utc};

/// Formats a microsecond-precision Unix timestamp as `YYYY-MM-DD
/// HH:MM:SS.ffffff`, the precision the backup engine compares mtimes at to
/// decide whether a file is unchanged.
pub fn format_us(micros: i64) -> String {
    let secs = micros.div_euclid(1_000_000);
    let remainder_us = micros.rem_euclid(1_000_000);
    let dt = Utc
        .timestamp_opt(secs, (remainder_us * 1_000) as u32)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap());
    dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Inverse of [`format_us`], used by the restore engine to turn a recorded
/// `Node` timestamp back into a microsecond Unix timestamp it can apply to
/// a file. Returns `None` on malformed input rather than panicking.
pub fn parse_us(formatted: &str) -> Option<i64> {
    let dt = NaiveDateTime::parse_from_str(formatted, "%Y-%m-%d %H:%M:%S%.6f").ok()?;
    Some(dt.and_utc().timestamp_micros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_microsecond_precision() {
        // 2026-01-02 03:04:05.123456 UTC
        let dt = chrono::Utc
            .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
            .unwrap()
            .timestamp();
        let micros = dt * 1_000_000 + 123_456;
        assert_eq!(format_us(micros), "2026-01-02 03:04:05.123456");
    }

    #[test]
    fn parse_us_round_trips_format_us() {
        let micros = 1_767_322_245_123_456;
        assert_eq!(parse_us(&format_us(micros)), Some(micros));
    }
}
