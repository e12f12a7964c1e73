// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `upgrade.rs`

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_fresh_install_is_not_an_upgrade() {
        assert!(!should_take_update_path("v1.5.0", "").unwrap());
    }

    #[test]
    fn test_same_version_is_not_an_upgrade() {
        assert!(!should_take_update_path("v1.5.0", "v1.5.0").unwrap());
        // Only the prefix differs.
        assert!(!should_take_update_path("v1.5.0", "1.5.0").unwrap());
    }

    #[test]
    fn test_newer_target_is_an_upgrade() {
        assert!(should_take_update_path("v1.10.0", "v1.9.5").unwrap());
        assert!(should_take_update_path("1.9.5", "1.9.4").unwrap());
    }

    #[test]
    fn test_older_target_is_refused() {
        let err = should_take_update_path("1.9.5", "1.10.0").unwrap_err();
        assert!(matches!(
            err,
            OperatorError::Downgrade { ref observed, ref target }
                if observed == "1.10.0" && target == "1.9.5"
        ));
    }

    #[test]
    fn test_unparseable_observed_is_upgraded() {
        assert!(should_take_update_path("1.9.5", "devel").unwrap());
    }

    #[test]
    fn test_unparseable_target_never_upgrades() {
        assert!(!should_take_update_path("", "invalid").unwrap());
        assert!(!should_take_update_path("latest", "1.0.0").unwrap());
    }

    #[test]
    fn test_prerelease_ordering() {
        assert!(should_take_update_path("v1.5.0", "v1.5.0-rc.1").unwrap());
    }
}
