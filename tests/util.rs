//! Retry helper and reference-shortening tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tienda::util::{retry_with_backoff, shorten_reference, RetryPolicy};

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    }
}

#[tokio::test]
async fn test_retry_recovers_from_transient_failures() {
    let attempts = AtomicUsize::new(0);

    let result: Result<usize, &str> = retry_with_backoff(&fast_policy(), |_| true, || {
        let n = attempts.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err("transient")
            } else {
                Ok(n)
            }
        }
    })
    .await;

    assert_eq!(result, Ok(2));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_exhausts_attempts() {
    let attempts = AtomicUsize::new(0);

    let result: Result<(), &str> = retry_with_backoff(&fast_policy(), |_| true, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err("still down") }
    })
    .await;

    assert_eq!(result, Err("still down"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3, "Attempts are bounded");
}

#[tokio::test]
async fn test_retry_stops_on_non_retryable_error() {
    let attempts = AtomicUsize::new(0);

    let result: Result<(), &str> = retry_with_backoff(&fast_policy(), |_| false, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err("hard failure") }
    })
    .await;

    assert_eq!(result, Err("hard failure"));
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "Non-retryable errors fail fast");
}

#[test]
fn test_shorten_reference_passes_short_ids_through() {
    assert_eq!(shorten_reference("order-123", 45), "order-123");

    let uuid = "550e8400-e29b-41d4-a716-446655440000";
    assert_eq!(shorten_reference(uuid, 45), uuid);
}

#[test]
fn test_shorten_reference_caps_long_ids() {
    let long_id = "a".repeat(100);
    let shortened = shorten_reference(&long_id, 45);

    assert_eq!(shortened.len(), 45);
    assert_eq!(shortened, shorten_reference(&long_id, 45), "Shortening is deterministic");
}

#[test]
fn test_shorten_reference_distinguishes_long_ids_with_common_prefix() {
    let base = "a".repeat(60);
    let first = shorten_reference(&format!("{}x", base), 45);
    let second = shorten_reference(&format!("{}y", base), 45);

    assert_ne!(first, second, "Ids differing past the cap must shorten differently");
}
