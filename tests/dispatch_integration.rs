//! Dispatch engine integration tests
//!
//! These tests exercise the dispatcher, the message builder and the result
//! aggregator together through the public API, with the provider selected
//! the same way the binary selects it.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use push_relay_service::config::{NotificationStyleConfig, ProviderConfig};
use push_relay_service::notification::{
    DataPayload, NotificationDispatcher, Priority, TargetSet, MESSAGE_INDEX_KEY,
};
use push_relay_service::provider::{create_provider, MemoryProvider, ProviderError};

fn tokens(values: &[&str]) -> TargetSet {
    TargetSet::new(values.iter().map(|t| t.to_string()).collect()).unwrap()
}

fn data() -> DataPayload {
    let mut data = DataPayload::new();
    data.insert("symbol", "AAPL");
    data
}

fn dispatcher_with(provider: MemoryProvider) -> (NotificationDispatcher, Arc<MemoryProvider>) {
    let provider = Arc::new(provider);
    let dispatcher =
        NotificationDispatcher::new(provider.clone(), NotificationStyleConfig::default());
    (dispatcher, provider)
}

// =============================================================================
// Provider Factory Tests
// =============================================================================

mod factory_tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_from_config() {
        let settings = ProviderConfig {
            backend: "memory".to_string(),
            ..Default::default()
        };
        let provider = assert_ok!(create_provider(&settings));
        let dispatcher = NotificationDispatcher::new(provider, NotificationStyleConfig::default());

        assert_eq!(dispatcher.provider_name(), "memory");
        assert_ok!(
            dispatcher
                .send_data_message("tok", data(), Priority::High)
                .await
        );
    }

    #[test]
    fn test_fcm_backend_requires_credentials() {
        let settings = ProviderConfig {
            backend: "fcm".to_string(),
            ..Default::default()
        };
        let err = create_provider(&settings).err().unwrap();
        assert!(matches!(err, ProviderError::Authentication(_)));
    }
}

// =============================================================================
// Repeated Dispatch Tests
// =============================================================================

mod repeated_dispatch_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_batches_run_concurrently() {
        let (dispatcher, provider) =
            dispatcher_with(MemoryProvider::new().with_latency(Duration::from_millis(100)));
        let started = Instant::now();

        let report = assert_ok!(
            dispatcher
                .send_multiple_data_messages(
                    tokens(&["A", "B"]),
                    data(),
                    NonZeroU32::new(5).unwrap(),
                    Priority::High,
                )
                .await
        );

        assert_eq!(report.batch_count(), 5);
        // Five sequential calls would take 500ms
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(provider.multicasts().await.len(), 5);
    }

    #[tokio::test]
    async fn test_report_batches_in_index_order() {
        let (dispatcher, provider) = dispatcher_with(MemoryProvider::new());

        let report = assert_ok!(
            dispatcher
                .send_multiple_data_messages(
                    tokens(&["A", "B", "C"]),
                    data(),
                    NonZeroU32::new(4).unwrap(),
                    Priority::High,
                )
                .await
        );

        assert_eq!(report.total_success_count + report.total_failure_count, 4 * 3);
        assert!(report.failed_tokens.is_empty());

        let mut indices: Vec<u32> = provider
            .multicasts()
            .await
            .iter()
            .map(|m| m.data.get(MESSAGE_INDEX_KEY).unwrap().parse().unwrap())
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![1, 2, 3, 4]);

        // Caller data survives next to the injected keys
        for message in provider.multicasts().await {
            assert_eq!(message.data.get("symbol"), Some("AAPL"));
        }
    }

    #[tokio::test]
    async fn test_failure_drops_partial_results() {
        let (dispatcher, _) = dispatcher_with(MemoryProvider::new().with_outage_from_multicast(3));

        let err = assert_err!(
            dispatcher
                .send_multiple_data_messages(
                    tokens(&["A"]),
                    data(),
                    NonZeroU32::new(3).unwrap(),
                    Priority::High,
                )
                .await
        );

        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert_eq!(dispatcher.stats().provider_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_batches_wait_between_but_not_after() {
        let (dispatcher, provider) = dispatcher_with(MemoryProvider::new());
        let started = Instant::now();

        assert_ok!(
            dispatcher
                .send_multiple_data_messages_with_interval(
                    tokens(&["A"]),
                    data(),
                    NonZeroU32::new(3).unwrap(),
                    Duration::from_millis(50),
                    Priority::Normal,
                )
                .await
        );

        let starts = provider.call_starts().await;
        assert!(starts[1] - starts[0] >= Duration::from_millis(50));
        assert!(starts[2] - starts[1] >= Duration::from_millis(50));
        // Two pauses, nothing after the third batch
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_failed_tokens_deduplicated_across_batches() {
        let (dispatcher, _) =
            dispatcher_with(MemoryProvider::new().with_unregistered_tokens(["B", "D"]));

        let report = assert_ok!(
            dispatcher
                .send_multiple_data_messages_with_interval(
                    tokens(&["A", "B", "C", "D"]),
                    data(),
                    NonZeroU32::new(3).unwrap(),
                    Duration::ZERO,
                    Priority::High,
                )
                .await
        );

        assert_eq!(report.total_failure_count, 6);
        assert_eq!(
            report.failed_tokens.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["B", "D"]
        );
    }
}
