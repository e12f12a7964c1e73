// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for duration parsing (Go-style duration format)

#[cfg(test)]
mod tests {
    use super::super::{format_duration, parse_duration};
    use std::time::Duration;

    // ========================================================================
    // Valid Duration Parsing Tests
    // ========================================================================

    #[test]
    fn test_parse_duration_single_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("48h").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_duration("1w").unwrap(), Duration::from_secs(604_800));
    }

    #[test]
    fn test_parse_duration_compound() {
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            Duration::from_secs(5400),
            "1h30m should be 5400 seconds"
        );
        assert_eq!(
            parse_duration("720h0m0s").unwrap(),
            Duration::from_secs(2_592_000),
            "Go formatted 30 days should parse"
        );
    }

    #[test]
    fn test_parse_duration_zero() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    // ========================================================================
    // Invalid Duration Tests
    // ========================================================================

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err(), "empty string");
        assert!(parse_duration("10").is_err(), "missing unit");
        assert!(parse_duration("10x").is_err(), "unknown unit");
        assert!(parse_duration("h").is_err(), "unit without value");
        assert!(parse_duration("-5h").is_err(), "negative value");
        assert!(parse_duration("1.5h").is_err(), "fractional value");
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert!(parse_duration("99999999999999999999h").is_err());
        assert!(parse_duration("18446744073709551615w").is_err());
    }

    // ========================================================================
    // Formatting Tests
    // ========================================================================

    #[test]
    fn test_format_duration_matches_go() {
        assert_eq!(format_duration(Duration::from_secs(172_800)), "48h0m0s");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m0s");
        assert_eq!(format_duration(Duration::from_secs(1800)), "30m0s");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_format_then_parse_is_stable() {
        let d = Duration::from_secs(10 * 365 * 86_400);
        assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
    }
}
