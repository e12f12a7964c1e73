// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Duration parsing for Go-style duration strings.
//!
//! Certificate overrides on the `CDI` resource use the Go duration format
//! (e.g. `"48h"`, `"1h30m"`, `"720h0m0s"`). This module converts them to and from
//! `std::time::Duration`. Day (`d`) and week (`w`) units are accepted as a convenience.

use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::constants::{SECONDS_PER_DAY, SECONDS_PER_HOUR};

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_WEEK: u64 = 7 * SECONDS_PER_DAY;

/// Parse a Go-style duration string into a Rust `Duration`.
///
/// Supported units: `ms`, `s`, `m`, `h`, `d`, `w`. Units may be combined
/// (`"1h30m"`). A bare `"0"` is accepted and yields a zero duration.
///
/// # Examples
///
/// ```
/// use cdi_operator::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86400));
/// assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
/// assert_eq!(parse_duration("48h0m0s").unwrap(), Duration::from_secs(172_800));
///
/// assert!(parse_duration("").is_err());
/// assert!(parse_duration("10").is_err());  // Missing unit
/// assert!(parse_duration("10x").is_err()); // Invalid unit
/// ```
///
/// # Errors
///
/// Returns an error if the format is invalid (missing unit, non-numeric value,
/// unknown unit) or the value overflows.
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    if duration_str.is_empty() {
        bail!("Duration string cannot be empty");
    }
    if duration_str == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_millis: u64 = 0;
    let mut rest = duration_str;

    while !rest.is_empty() {
        let split_pos = rest
            .chars()
            .position(|c| !c.is_ascii_digit())
            .context("Duration must end with a unit (ms, s, m, h, d or w)")?;
        if split_pos == 0 {
            bail!("Duration '{duration_str}' has a unit without a value");
        }
        let (value_str, tail) = rest.split_at(split_pos);
        let unit_len = tail
            .chars()
            .position(|c| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);

        let value: u64 = value_str
            .parse()
            .context("Duration value must be a positive integer")?;

        let millis_per_unit = match unit {
            "ms" => 1,
            "s" => 1000,
            "m" => SECONDS_PER_MINUTE * 1000,
            "h" => SECONDS_PER_HOUR * 1000,
            "d" => SECONDS_PER_DAY * 1000,
            "w" => SECONDS_PER_WEEK * 1000,
            _ => bail!(
                "Unsupported duration unit '{unit}'. Use 'ms', 's', 'm', 'h', 'd' or 'w'"
            ),
        };

        let millis = value
            .checked_mul(millis_per_unit)
            .context("Duration value too large (overflow)")?;
        total_millis = total_millis
            .checked_add(millis)
            .context("Duration value too large (overflow)")?;
        rest = next;
    }

    Ok(Duration::from_millis(total_millis))
}

/// Format a `Duration` the way Go prints it (`"48h0m0s"`, `"30m0s"`, `"45s"`).
///
/// Sub-second precision is dropped.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }
    let hours = secs / SECONDS_PER_HOUR;
    let minutes = (secs % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let seconds = secs % SECONDS_PER_MINUTE;

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod duration_tests;
