// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

#[cfg(test)]
mod tests {
    use super::super::{default_backoff, is_retryable_error, retry_api_call};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(
            kube::error::ErrorResponse {
                status: Some(kube::core::response::StatusSummary::Failure),
                message: format!("{reason} returned"),
                reason: reason.to_string(),
                code,
                metadata: None,
                details: None,
            }
            .boxed(),
        )
    }

    #[test]
    fn test_backoff_configuration() {
        let backoff = default_backoff();

        assert_eq!(backoff.initial_interval, Duration::from_millis(100));
        assert_eq!(backoff.max_interval, Duration::from_secs(5));
        assert_eq!(backoff.max_elapsed_time, Some(Duration::from_secs(30)));

        #[allow(clippy::float_cmp)]
        {
            assert_eq!(backoff.multiplier, 2.0);
            assert_eq!(backoff.randomization_factor, 0.1);
        }
    }

    #[test]
    fn test_429_and_5xx_are_retryable() {
        assert!(is_retryable_error(&api_error(429, "TooManyRequests")));
        assert!(is_retryable_error(&api_error(500, "InternalError")));
        assert!(is_retryable_error(&api_error(503, "ServiceUnavailable")));
        assert!(is_retryable_error(&api_error(599, "ServerError")));
    }

    #[test]
    fn test_4xx_not_retryable() {
        for code in [400, 401, 403, 404, 409, 422] {
            assert!(
                !is_retryable_error(&api_error(code, "ClientError")),
                "HTTP {code} should not be retryable"
            );
        }
    }

    #[test]
    fn test_service_errors_retryable() {
        let service_error: Box<dyn std::error::Error + Send + Sync> = Box::new(
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Connection failed"),
        );
        assert!(is_retryable_error(&kube::Error::Service(service_error)));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut backoff = default_backoff();
        backoff.randomization_factor = 0.0;

        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(400)));

        for _ in 0..10 {
            backoff.next_backoff();
        }
        assert_eq!(backoff.current_interval, Duration::from_secs(5));

        backoff.reset();
        assert_eq!(backoff.current_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut backoff = default_backoff();
        for _ in 0..50 {
            backoff.reset();
            let d = backoff.next_backoff().unwrap();
            assert!(d >= Duration::from_millis(90) && d <= Duration::from_millis(110));
        }
    }

    #[tokio::test]
    async fn test_permanent_error_is_returned_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), kube::Error> = retry_api_call(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(api_error(404, "NotFound")) }
            },
            "get missing",
        )
        .await;

        assert!(matches!(result, Err(kube::Error::Api(ae)) if ae.code == 404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_api_call(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(api_error(503, "ServiceUnavailable"))
                    } else {
                        Ok(n)
                    }
                }
            },
            "flaky get",
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
