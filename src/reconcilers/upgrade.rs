// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Upgrade detection.
//!
//! An upgrade starts when the running operator is strictly newer than the
//! version the installation last reached. Versions may carry a leading `v`.
//! An unparseable observed version counts as older than anything, so a `devel`
//! build is always upgraded away from. An operator whose own version does not
//! parse never starts an upgrade.

use crate::errors::{OperatorError, Result};
use semver::Version;
use std::cmp::Ordering;

fn parse(version: &str) -> Option<Version> {
    Version::parse(version.strip_prefix('v').unwrap_or(version)).ok()
}

/// Whether moving from `observed` to `target` is an upgrade.
///
/// # Errors
///
/// Returns [`OperatorError::Downgrade`] when `target` is older than `observed`.
/// Nothing must be reconciled in that case.
pub fn should_take_update_path(target: &str, observed: &str) -> Result<bool> {
    if observed.is_empty() || target == observed {
        return Ok(false);
    }
    let Some(target_version) = parse(target) else {
        return Ok(false);
    };
    let Some(observed_version) = parse(observed) else {
        return Ok(true);
    };

    match target_version.cmp(&observed_version) {
        Ordering::Greater => Ok(true),
        Ordering::Equal => Ok(false),
        Ordering::Less => Err(OperatorError::Downgrade {
            observed: observed.to_string(),
            target: target.to_string(),
        }),
    }
}

#[cfg(test)]
#[path = "upgrade_tests.rs"]
mod upgrade_tests;
