//! In-memory messaging provider.
//!
//! Nothing leaves the process: every call is answered locally and, unless
//! recording is switched off, kept for inspection. Tokens can be marked as
//! unregistered or invalid, calls can be slowed down, and an outage can be
//! simulated from the N-th multicast onwards.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{
    BatchResult, Message, MessagingProvider, MulticastMessage, ProviderError, SendOutcome,
    TopicManagementError, TopicManagementResult,
};

/// A call received by the [`MemoryProvider`]
#[derive(Debug, Clone)]
pub enum RecordedCall {
    Send(Message),
    Multicast(MulticastMessage),
    Subscribe { tokens: Vec<String>, topic: String },
    Unsubscribe { tokens: Vec<String>, topic: String },
}

pub struct MemoryProvider {
    message_id_prefix: String,
    unregistered_tokens: HashSet<String>,
    invalid_tokens: HashSet<String>,
    /// 1-based multicast call number from which multicasts fail outright
    outage_from_multicast: Option<usize>,
    latency: Duration,
    /// Keep received calls for inspection
    recording: bool,
    calls: Mutex<Vec<(Instant, RecordedCall)>>,
    next_message_id: AtomicU64,
    multicast_calls: AtomicUsize,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            message_id_prefix: "projects/memory/messages/".to_string(),
            unregistered_tokens: HashSet::new(),
            invalid_tokens: HashSet::new(),
            outage_from_multicast: None,
            latency: Duration::ZERO,
            recording: true,
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicU64::new(1),
            multicast_calls: AtomicUsize::new(0),
        }
    }

    /// Message IDs are `<prefix><n>`, counting from 1
    pub fn with_message_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.message_id_prefix = prefix.into();
        self
    }

    /// Tokens reported as no longer registered
    pub fn with_unregistered_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unregistered_tokens
            .extend(tokens.into_iter().map(Into::into));
        self
    }

    /// Tokens reported as malformed
    pub fn with_invalid_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalid_tokens.extend(tokens.into_iter().map(Into::into));
        self
    }

    /// Delay applied to every call before it completes
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the `call_number`-th multicast (1-based) and every one after it
    pub fn with_outage_from_multicast(mut self, call_number: usize) -> Self {
        self.outage_from_multicast = Some(call_number);
        self
    }

    /// Answer calls without keeping them; the accessors below stay empty
    pub fn without_recording(mut self) -> Self {
        self.recording = false;
        self
    }

    /// All calls received so far, in arrival order
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Start time of every call, in arrival order
    pub async fn call_starts(&self) -> Vec<Instant> {
        self.calls.lock().await.iter().map(|(at, _)| *at).collect()
    }

    /// Multicast messages received so far, in arrival order
    pub async fn multicasts(&self) -> Vec<MulticastMessage> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|(_, call)| match call {
                RecordedCall::Multicast(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    async fn record(&self, call: RecordedCall) {
        if !self.recording {
            return;
        }
        self.calls.lock().await.push((Instant::now(), call));
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn next_message_id(&self) -> String {
        let n = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.message_id_prefix, n)
    }

    fn check_token(&self, token: &str) -> Result<(), ProviderError> {
        if self.invalid_tokens.contains(token) {
            return Err(ProviderError::InvalidRegistrationToken(
                "The registration token is not a valid FCM registration token".to_string(),
            ));
        }
        if self.unregistered_tokens.contains(token) {
            return Err(ProviderError::RegistrationTokenNotRegistered(
                "Requested entity was not found.".to_string(),
            ));
        }
        Ok(())
    }

    fn manage_topic(&self, tokens: &[String]) -> TopicManagementResult {
        let errors: Vec<_> = tokens
            .iter()
            .enumerate()
            .filter_map(|(index, token)| {
                self.check_token(token).err().map(|err| TopicManagementError {
                    index,
                    reason: err.code().to_string(),
                })
            })
            .collect();

        TopicManagementResult {
            success_count: tokens.len() - errors.len(),
            failure_count: errors.len(),
            errors,
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagingProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn send(&self, message: &Message) -> Result<String, ProviderError> {
        self.record(RecordedCall::Send(message.clone())).await;
        self.simulate_latency().await;

        if let super::MessageTarget::Token(token) = &message.target {
            self.check_token(token)?;
        }

        let message_id = self.next_message_id();
        tracing::debug!(message_id = %message_id, "Memory provider accepted message");
        Ok(message_id)
    }

    async fn send_multicast(&self, message: &MulticastMessage) -> Result<BatchResult, ProviderError> {
        let call_number = self.multicast_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(RecordedCall::Multicast(message.clone())).await;
        self.simulate_latency().await;

        if matches!(self.outage_from_multicast, Some(from) if call_number >= from) {
            return Err(ProviderError::Unavailable(format!(
                "simulated outage on multicast call {}",
                call_number
            )));
        }

        let responses = message
            .tokens
            .iter()
            .map(|token| match self.check_token(token) {
                Ok(()) => SendOutcome::delivered(self.next_message_id()),
                Err(err) => SendOutcome::failed(&err),
            })
            .collect();

        Ok(BatchResult::from_outcomes(responses))
    }

    async fn subscribe_to_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResult, ProviderError> {
        self.record(RecordedCall::Subscribe {
            tokens: tokens.to_vec(),
            topic: topic.to_string(),
        })
        .await;
        self.simulate_latency().await;

        Ok(self.manage_topic(tokens))
    }

    async fn unsubscribe_from_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResult, ProviderError> {
        self.record(RecordedCall::Unsubscribe {
            tokens: tokens.to_vec(),
            topic: topic.to_string(),
        })
        .await;
        self.simulate_latency().await;

        Ok(self.manage_topic(tokens))
    }
}
