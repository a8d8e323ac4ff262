//! Property tests for failure classification and retry backoff.

use flowsmith::cache::RequestFingerprint;
use flowsmith::classify::{classify, classify_status, ErrorCategory};
use flowsmith::client::RetryPolicy;
use proptest::prelude::*;
use std::time::Duration;

fn plain_message() -> impl Strategy<Value = String> {
    "[A-Za-z ]{0,24}".prop_filter("no network or timeout signature", |m| {
        let lowered = m.to_lowercase();
        !["network", "fetch", "dns", "timeout", "timed out", "deadline", "connection"]
            .iter()
            .any(|sig| lowered.contains(sig))
    })
}

proptest! {
    #[test]
    fn server_statuses_are_retryable_server_errors(status in 500u16..600, message in plain_message()) {
        let info = classify(&message, Some(status));
        prop_assert_eq!(info.category, ErrorCategory::Server);
        prop_assert!(info.retryable);
        prop_assert!(!info.message.is_empty());
    }

    #[test]
    fn client_statuses_carry_a_kind_and_action(status in 400u16..500, message in plain_message()) {
        let info = classify(&message, Some(status));
        prop_assert_eq!(info.category, ErrorCategory::Client);
        prop_assert!(info.client_kind.is_some());
        prop_assert!(info.user_action.is_some());
    }

    #[test]
    fn network_signatures_win_over_status(
        prefix in "[a-z ]{0,10}",
        status in proptest::option::of(100u16..600),
    ) {
        let info = classify(&format!("{}network error", prefix), status);
        prop_assert_eq!(info.category, ErrorCategory::Network);
        prop_assert!(info.retryable);
    }

    #[test]
    fn status_without_body_never_has_empty_message(status in 400u16..600) {
        let info = classify_status(status, "");
        prop_assert!(!info.message.trim().is_empty());
    }

    #[test]
    fn backoff_never_decreases(base_ms in 1u64..5_000, attempt in 0u32..20) {
        let policy = RetryPolicy::new(Duration::from_secs(30))
            .with_base_delay(Duration::from_millis(base_ms));
        prop_assert!(policy.backoff(attempt + 1) >= policy.backoff(attempt));
    }

    #[test]
    fn backoff_respects_cap(base_ms in 1u64..5_000, cap_ms in 1u64..10_000, attempt in 0u32..40) {
        let cap = Duration::from_millis(cap_ms);
        let policy = RetryPolicy::new(Duration::from_secs(30))
            .with_base_delay(Duration::from_millis(base_ms))
            .with_max_delay(Some(cap));
        prop_assert!(policy.backoff(attempt) <= cap);
    }

    #[test]
    fn fingerprint_ignores_case_and_spacing(words in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
        let tidy = words.join(" ");
        let messy = format!("  {}  ", words.join("   ").to_uppercase());
        prop_assert_eq!(RequestFingerprint::of(&tidy), RequestFingerprint::of(&messy));
    }
}
