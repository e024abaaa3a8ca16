use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::config::NotificationStyleConfig;
use crate::provider::{
    BatchResult, MessagingProvider, MulticastMessage, ProviderError, TopicManagementResult,
};

use super::{
    AggregateReport, DataPayload, MessageBuilder, NotificationContent, Priority, TargetSet, Topic,
    MESSAGE_INDEX_KEY, TIMESTAMP_KEY,
};

/// Statistics for the notification dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Single-device sends, visible or data-only
    pub device_sends: AtomicU64,
    /// Multicast batches handed to the provider
    pub multicast_batches: AtomicU64,
    /// Topic sends
    pub topic_sends: AtomicU64,
    /// Subscribe and unsubscribe calls
    pub topic_management_calls: AtomicU64,
    /// Per-target deliveries reported by the provider
    pub total_delivered: AtomicU64,
    /// Per-target failures reported by the provider
    pub total_failed: AtomicU64,
    /// Calls that failed as a whole
    pub provider_errors: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            device_sends: self.device_sends.load(Ordering::Relaxed),
            multicast_batches: self.multicast_batches.load(Ordering::Relaxed),
            topic_sends: self.topic_sends.load(Ordering::Relaxed),
            topic_management_calls: self.topic_management_calls.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            provider_errors: self.provider_errors.load(Ordering::Relaxed),
        }
    }

    fn record_batch(&self, batch: &BatchResult) {
        self.multicast_batches.fetch_add(1, Ordering::Relaxed);
        self.total_delivered
            .fetch_add(batch.success_count as u64, Ordering::Relaxed);
        self.total_failed
            .fetch_add(batch.failure_count as u64, Ordering::Relaxed);
    }

    fn record_single<T>(&self, result: &Result<T, ProviderError>) {
        match result {
            Ok(_) => self.total_delivered.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.provider_errors.fetch_add(1, Ordering::Relaxed),
        };
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherStatsSnapshot {
    pub device_sends: u64,
    pub multicast_batches: u64,
    pub topic_sends: u64,
    pub topic_management_calls: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub provider_errors: u64,
}

/// Turns validated requests into provider calls.
///
/// The provider is injected at construction, so the same dispatcher runs
/// against FCM in production and against the in-memory provider in tests.
pub struct NotificationDispatcher {
    provider: Arc<dyn MessagingProvider>,
    style: NotificationStyleConfig,
    stats: DispatcherStats,
}

impl NotificationDispatcher {
    pub fn new(provider: Arc<dyn MessagingProvider>, style: NotificationStyleConfig) -> Self {
        Self {
            provider,
            style,
            stats: DispatcherStats::default(),
        }
    }

    /// Name of the underlying provider backend
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Send a visible notification to one device; returns the message ID
    #[tracing::instrument(name = "dispatcher.send_to_device", skip_all)]
    pub async fn send_to_device(
        &self,
        token: &str,
        content: NotificationContent,
        data: DataPayload,
    ) -> Result<String, ProviderError> {
        let message = MessageBuilder::notification(content, &self.style)
            .data(data)
            .to_token(token);

        let result = self.provider.send(&message).await;
        self.stats.device_sends.fetch_add(1, Ordering::Relaxed);
        self.stats.record_single(&result);

        match &result {
            Ok(message_id) => {
                tracing::info!(message_id = %message_id, "Notification sent to device")
            }
            Err(e) => tracing::error!(error = %e, code = e.code(), "Failed to send notification"),
        }
        result
    }

    /// Send a visible notification to up to 500 devices in one multicast
    #[tracing::instrument(
        name = "dispatcher.send_to_multiple",
        skip_all,
        fields(token_count = tokens.len())
    )]
    pub async fn send_to_multiple(
        &self,
        tokens: TargetSet,
        content: NotificationContent,
        data: DataPayload,
    ) -> Result<BatchResult, ProviderError> {
        let message = MessageBuilder::notification(content, &self.style)
            .data(data)
            .to_tokens(tokens);

        let batch = self.multicast(&message).await?;

        if batch.failure_count > 0 {
            let failed: Vec<&str> = batch
                .failed_indices()
                .filter_map(|i| message.tokens.get(i))
                .collect();
            tracing::warn!(failed_tokens = ?failed, "Some tokens failed to receive the notification");
        }

        tracing::info!(
            success_count = batch.success_count,
            failure_count = batch.failure_count,
            "Multicast notification sent"
        );
        Ok(batch)
    }

    /// Send a visible notification to every subscriber of a topic
    #[tracing::instrument(name = "dispatcher.send_to_topic", skip_all, fields(topic = %topic))]
    pub async fn send_to_topic(
        &self,
        topic: &Topic,
        content: NotificationContent,
        data: DataPayload,
    ) -> Result<String, ProviderError> {
        let message = MessageBuilder::notification(content, &self.style)
            .data(data)
            .to_topic(topic);

        let result = self.provider.send(&message).await;
        self.stats.topic_sends.fetch_add(1, Ordering::Relaxed);
        self.stats.record_single(&result);

        match &result {
            Ok(message_id) => {
                tracing::info!(message_id = %message_id, "Notification sent to topic")
            }
            Err(e) => tracing::error!(error = %e, code = e.code(), "Failed to send to topic"),
        }
        result
    }

    #[tracing::instrument(
        name = "dispatcher.subscribe_to_topic",
        skip_all,
        fields(topic = %topic, token_count = tokens.len())
    )]
    pub async fn subscribe_to_topic(
        &self,
        tokens: &TargetSet,
        topic: &Topic,
    ) -> Result<TopicManagementResult, ProviderError> {
        self.stats
            .topic_management_calls
            .fetch_add(1, Ordering::Relaxed);
        let result = self
            .provider
            .subscribe_to_topic(tokens.as_slice(), &topic.path())
            .await;
        self.log_topic_management("subscribe", &result);
        result
    }

    #[tracing::instrument(
        name = "dispatcher.unsubscribe_from_topic",
        skip_all,
        fields(topic = %topic, token_count = tokens.len())
    )]
    pub async fn unsubscribe_from_topic(
        &self,
        tokens: &TargetSet,
        topic: &Topic,
    ) -> Result<TopicManagementResult, ProviderError> {
        self.stats
            .topic_management_calls
            .fetch_add(1, Ordering::Relaxed);
        let result = self
            .provider
            .unsubscribe_from_topic(tokens.as_slice(), &topic.path())
            .await;
        self.log_topic_management("unsubscribe", &result);
        result
    }

    /// Send a silent data message to one device; returns the message ID
    #[tracing::instrument(name = "dispatcher.send_data_message", skip_all, fields(priority = ?priority))]
    pub async fn send_data_message(
        &self,
        token: &str,
        data: DataPayload,
        priority: Priority,
    ) -> Result<String, ProviderError> {
        let message = MessageBuilder::silent(priority).data(data).to_token(token);

        let result = self.provider.send(&message).await;
        self.stats.device_sends.fetch_add(1, Ordering::Relaxed);
        self.stats.record_single(&result);

        match &result {
            Ok(message_id) => tracing::info!(message_id = %message_id, "Data message sent"),
            Err(e) => tracing::error!(error = %e, code = e.code(), "Failed to send data message"),
        }
        result
    }

    /// Send `count` silent data multicasts to the same tokens, concurrently.
    ///
    /// Batch `i` (1-based) carries `messageIndex = i`. Results are folded in
    /// index order regardless of completion order. The first failing batch
    /// fails the whole operation and aborts the batches still in flight.
    #[tracing::instrument(
        name = "dispatcher.send_multiple_data_messages",
        skip_all,
        fields(token_count = tokens.len(), count = count.get())
    )]
    pub async fn send_multiple_data_messages(
        &self,
        tokens: TargetSet,
        data: DataPayload,
        count: NonZeroU32,
        priority: Priority,
    ) -> Result<AggregateReport, ProviderError> {
        let mut tasks = JoinSet::new();

        for index in 1..=count.get() {
            let provider = Arc::clone(&self.provider);
            let message = MessageBuilder::silent(priority)
                .data(data.clone())
                .data_entry(MESSAGE_INDEX_KEY, index.to_string())
                .to_tokens(tokens.clone());

            tasks.spawn(async move { (index, provider.send_multicast(&message).await) });
        }

        let mut batches = Vec::with_capacity(count.get() as usize);
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| {
                self.stats.provider_errors.fetch_add(1, Ordering::Relaxed);
                ProviderError::Internal(format!("batch task failed: {}", e))
            })?;

            match result.and_then(|batch| batch.verify(tokens.len()).map(|()| batch)) {
                Ok(batch) => {
                    self.stats.record_batch(&batch);
                    batches.push((index, batch));
                }
                Err(e) => {
                    self.stats.provider_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        batch = index,
                        completed = batches.len(),
                        error = %e,
                        "Batch failed, aborting remaining batches"
                    );
                    // Dropping the set aborts the batches still in flight
                    return Err(e);
                }
            }
        }

        batches.sort_by_key(|(index, _)| *index);
        let report =
            AggregateReport::from_batches(batches.into_iter().map(|(_, batch)| batch), &tokens)?;

        self.log_report(&report);
        Ok(report)
    }

    /// Send `count` silent data multicasts one after another, waiting
    /// `interval` between consecutive batches.
    ///
    /// Batch `i` carries `messageIndex = i` and the ISO-8601 time it was
    /// built at. There is no wait after the last batch. On failure the
    /// remaining batches are not sent.
    #[tracing::instrument(
        name = "dispatcher.send_multiple_data_messages_with_interval",
        skip_all,
        fields(token_count = tokens.len(), count = count.get(), interval_ms = interval.as_millis() as u64)
    )]
    pub async fn send_multiple_data_messages_with_interval(
        &self,
        tokens: TargetSet,
        data: DataPayload,
        count: NonZeroU32,
        interval: Duration,
        priority: Priority,
    ) -> Result<AggregateReport, ProviderError> {
        let mut report = AggregateReport::new();

        for index in 1..=count.get() {
            if index > 1 {
                tokio::time::sleep(interval).await;
            }

            let message = MessageBuilder::silent(priority)
                .data(data.clone())
                .data_entry(MESSAGE_INDEX_KEY, index.to_string())
                .data_entry(
                    TIMESTAMP_KEY,
                    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                )
                .to_tokens(tokens.clone());

            let batch = match self.multicast(&message).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!(
                        batch = index,
                        completed = report.batch_count(),
                        error = %e,
                        "Batch failed, remaining batches not sent"
                    );
                    return Err(e);
                }
            };

            tracing::debug!(
                batch = index,
                success_count = batch.success_count,
                failure_count = batch.failure_count,
                "Batch sent"
            );
            report = report.fold(batch, &tokens)?;
        }

        self.log_report(&report);
        Ok(report)
    }

    async fn multicast(&self, message: &MulticastMessage) -> Result<BatchResult, ProviderError> {
        let result = self
            .provider
            .send_multicast(message)
            .await
            .and_then(|batch| batch.verify(message.tokens.len()).map(|()| batch));

        match result {
            Ok(batch) => {
                self.stats.record_batch(&batch);
                Ok(batch)
            }
            Err(e) => {
                self.stats.provider_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, code = e.code(), "Multicast failed");
                Err(e)
            }
        }
    }

    fn log_topic_management(&self, action: &str, result: &Result<TopicManagementResult, ProviderError>) {
        match result {
            Ok(outcome) => tracing::info!(
                action = action,
                success_count = outcome.success_count,
                failure_count = outcome.failure_count,
                "Topic membership updated"
            ),
            Err(e) => {
                self.stats.provider_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(action = action, error = %e, "Topic membership update failed")
            }
        }
    }

    fn log_report(&self, report: &AggregateReport) {
        if !report.failed_tokens.is_empty() {
            tracing::warn!(
                failed_tokens = ?report.failed_tokens,
                "Some tokens failed in at least one batch"
            );
        }
        tracing::info!(
            batches = report.batch_count(),
            total_success_count = report.total_success_count,
            total_failure_count = report.total_failure_count,
            "Repeated data messages sent"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::provider::{
        Message, MemoryProvider, MessageTarget, RecordedCall, SendOutcome,
    };

    /// Answers every multicast with a single delivered outcome, whatever the
    /// number of tokens
    struct SingleOutcomeProvider;

    #[async_trait]
    impl MessagingProvider for SingleOutcomeProvider {
        fn name(&self) -> &'static str {
            "single-outcome"
        }

        async fn send(&self, _message: &Message) -> Result<String, ProviderError> {
            Ok("m".to_string())
        }

        async fn send_multicast(&self, _message: &MulticastMessage) -> Result<BatchResult, ProviderError> {
            Ok(BatchResult::from_outcomes(vec![SendOutcome::delivered("m")]))
        }

        async fn subscribe_to_topic(
            &self,
            _tokens: &[String],
            _topic: &str,
        ) -> Result<TopicManagementResult, ProviderError> {
            Ok(TopicManagementResult::default())
        }

        async fn unsubscribe_from_topic(
            &self,
            _tokens: &[String],
            _topic: &str,
        ) -> Result<TopicManagementResult, ProviderError> {
            Ok(TopicManagementResult::default())
        }
    }

    fn short_batch_dispatcher() -> NotificationDispatcher {
        NotificationDispatcher::new(Arc::new(SingleOutcomeProvider), NotificationStyleConfig::default())
    }

    fn tokens(values: &[&str]) -> TargetSet {
        TargetSet::new(values.iter().map(|t| t.to_string()).collect()).unwrap()
    }

    fn content() -> NotificationContent {
        NotificationContent::new("Title", "Body", None).unwrap()
    }

    fn dispatcher(provider: MemoryProvider) -> (NotificationDispatcher, Arc<MemoryProvider>) {
        let provider = Arc::new(provider);
        let dispatcher =
            NotificationDispatcher::new(provider.clone(), NotificationStyleConfig::default());
        (dispatcher, provider)
    }

    fn count(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_send_to_device_returns_message_id() {
        let (dispatcher, provider) = dispatcher(MemoryProvider::new().with_message_id_prefix("msg-"));

        let id = dispatcher
            .send_to_device("tok", content(), DataPayload::new())
            .await
            .unwrap();

        assert_eq!(id, "msg-1");
        assert_eq!(provider.call_count().await, 1);
        assert_eq!(dispatcher.stats().device_sends, 1);
    }

    #[tokio::test]
    async fn test_send_to_device_propagates_provider_error() {
        let (dispatcher, _) = dispatcher(MemoryProvider::new().with_invalid_tokens(["bad"]));

        let err = dispatcher
            .send_to_device("bad", content(), DataPayload::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidRegistrationToken(_)));
        assert_eq!(dispatcher.stats().provider_errors, 1);
    }

    #[tokio::test]
    async fn test_send_to_multiple_reports_per_token() {
        let (dispatcher, _) = dispatcher(MemoryProvider::new().with_unregistered_tokens(["b"]));

        let batch = dispatcher
            .send_to_multiple(tokens(&["a", "b", "c"]), content(), DataPayload::new())
            .await
            .unwrap();

        assert_eq!(batch.success_count, 2);
        assert_eq!(batch.failure_count, 1);
        assert!(!batch.responses[1].success);
    }

    #[tokio::test]
    async fn test_topic_operations_use_topic_path() {
        let (dispatcher, provider) = dispatcher(MemoryProvider::new());
        let topic = Topic::new("news").unwrap();

        dispatcher
            .send_to_topic(&topic, content(), DataPayload::new())
            .await
            .unwrap();
        dispatcher
            .subscribe_to_topic(&tokens(&["a"]), &topic)
            .await
            .unwrap();
        dispatcher
            .unsubscribe_from_topic(&tokens(&["a"]), &topic)
            .await
            .unwrap();

        let calls = provider.calls().await;
        assert!(matches!(&calls[0], RecordedCall::Send(m) if m.target == MessageTarget::Topic("news".into())));
        assert!(matches!(&calls[1], RecordedCall::Subscribe { topic, .. } if topic == "/topics/news"));
        assert!(matches!(&calls[2], RecordedCall::Unsubscribe { topic, .. } if topic == "/topics/news"));
    }

    #[tokio::test]
    async fn test_data_message_is_silent() {
        let (dispatcher, provider) = dispatcher(MemoryProvider::new());
        let mut data = DataPayload::new();
        data.insert("k", "v");

        dispatcher
            .send_data_message("tok", data, Priority::Normal)
            .await
            .unwrap();

        match &provider.calls().await[0] {
            RecordedCall::Send(message) => {
                assert!(message.notification.is_none());
                assert_eq!(message.data.get("k"), Some("v"));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeated_data_messages_aggregate() {
        let (dispatcher, provider) = dispatcher(MemoryProvider::new().with_unregistered_tokens(["B"]));
        let mut data = DataPayload::new();
        data.insert("k", "v");

        let report = dispatcher
            .send_multiple_data_messages(tokens(&["A", "B", "C"]), data, count(2), Priority::High)
            .await
            .unwrap();

        assert_eq!(report.total_success_count, 4);
        assert_eq!(report.total_failure_count, 2);
        assert_eq!(report.failed_tokens.iter().collect::<Vec<_>>(), vec!["B"]);
        assert_eq!(report.batch_count(), 2);

        let mut indices: Vec<String> = provider
            .multicasts()
            .await
            .iter()
            .map(|m| m.data.get(MESSAGE_INDEX_KEY).unwrap().to_string())
            .collect();
        indices.sort();
        assert_eq!(indices, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_repeated_data_messages_fail_on_outage() {
        let (dispatcher, _) = dispatcher(MemoryProvider::new().with_outage_from_multicast(1));

        let err = dispatcher
            .send_multiple_data_messages(tokens(&["A"]), DataPayload::new(), count(3), Priority::High)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_batches_are_spaced() {
        let (dispatcher, provider) = dispatcher(MemoryProvider::new());
        let started = tokio::time::Instant::now();

        let report = dispatcher
            .send_multiple_data_messages_with_interval(
                tokens(&["A", "B"]),
                DataPayload::new(),
                count(3),
                Duration::from_millis(50),
                Priority::High,
            )
            .await
            .unwrap();

        assert_eq!(report.batch_count(), 3);
        let starts = provider.call_starts().await;
        assert!(starts[1] - starts[0] >= Duration::from_millis(50));
        assert!(starts[2] - starts[0] >= Duration::from_millis(100));
        // No wait after the last batch
        assert!(started.elapsed() < Duration::from_millis(150));

        for (i, message) in provider.multicasts().await.iter().enumerate() {
            assert_eq!(message.data.get(MESSAGE_INDEX_KEY), Some((i + 1).to_string().as_str()));
            assert!(message.data.get(TIMESTAMP_KEY).is_some());
        }
    }

    #[tokio::test]
    async fn test_interval_batches_stop_after_failure() {
        let (dispatcher, provider) = dispatcher(MemoryProvider::new().with_outage_from_multicast(2));

        let result = dispatcher
            .send_multiple_data_messages_with_interval(
                tokens(&["A"]),
                DataPayload::new(),
                count(5),
                Duration::ZERO,
                Priority::High,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(provider.multicasts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_send_to_multiple_rejects_short_batch() {
        let dispatcher = short_batch_dispatcher();

        let err = dispatcher
            .send_to_multiple(tokens(&["A", "B", "C"]), content(), DataPayload::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::MalformedResponse(_)));
        assert_eq!(dispatcher.stats().provider_errors, 1);
        assert_eq!(dispatcher.stats().total_delivered, 0);
    }

    #[tokio::test]
    async fn test_repeated_dispatch_rejects_short_batch() {
        let dispatcher = short_batch_dispatcher();

        let err = dispatcher
            .send_multiple_data_messages(tokens(&["A", "B"]), DataPayload::new(), count(2), Priority::High)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));

        let err = dispatcher
            .send_multiple_data_messages_with_interval(
                tokens(&["A", "B"]),
                DataPayload::new(),
                count(2),
                Duration::ZERO,
                Priority::High,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
        assert_eq!(dispatcher.stats().multicast_batches, 0);
    }
}
