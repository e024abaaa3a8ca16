//! Messaging provider abstraction.
//!
//! # Backends
//!
//! - `FcmClient`: Firebase Cloud Messaging over the HTTP v1 API (default)
//! - `MemoryProvider`: in-process backend that records every call; used by
//!   tests and for running the service without Firebase credentials
//!
//! Use `create_provider()` to build the backend selected in configuration.

mod error;
pub mod fcm;
mod memory;
mod message;
mod response;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ProviderConfig;

pub use error::ProviderError;
pub use fcm::{FcmClient, ServiceAccountKey};
pub use memory::{MemoryProvider, RecordedCall};
pub use message::{
    AndroidConfig, AndroidNotification, AndroidPriority, ApnsConfig, ApnsPayload, Aps, Message,
    MessageTarget, MulticastMessage,
};
pub use response::{BatchResult, OutcomeError, SendOutcome, TopicManagementError, TopicManagementResult};

/// Send and topic-management primitives of a push messaging service.
///
/// # Thread Safety
///
/// Implementations are shared across request handlers and spawned batch
/// tasks, so they must be `Send + Sync` and safe to call concurrently.
///
/// # Error Handling
///
/// A returned `Err` means the whole call failed. For `send_multicast`, a
/// failure affecting only some targets is reported inside the
/// [`BatchResult`] instead.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &'static str;

    /// Send one message; returns the provider-assigned message ID.
    async fn send(&self, message: &Message) -> Result<String, ProviderError>;

    /// Send one message to every token of the multicast.
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<BatchResult, ProviderError>;

    async fn subscribe_to_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResult, ProviderError>;

    async fn unsubscribe_from_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResult, ProviderError>;
}

/// Create a messaging provider based on configuration.
///
/// - `"memory"`: Returns a `MemoryProvider` that keeps no call history
/// - `"fcm"` (default): Returns an `FcmClient`; fails if no service account
///   credentials are configured
///
/// # Example
///
/// ```rust,ignore
/// let provider = create_provider(&settings.provider)?;
/// ```
pub fn create_provider(settings: &ProviderConfig) -> Result<Arc<dyn MessagingProvider>, ProviderError> {
    match settings.backend.as_str() {
        "memory" => {
            tracing::warn!(
                backend = "memory",
                "Using in-memory messaging provider, notifications will not leave this process"
            );
            Ok(Arc::new(MemoryProvider::new().without_recording()))
        }
        "fcm" => {
            let key = ServiceAccountKey::from_settings(settings)?;
            tracing::info!(
                backend = "fcm",
                project_id = %key.project_id,
                client_email = %key.client_email,
                "Creating FCM messaging provider"
            );
            Ok(Arc::new(FcmClient::new(key, settings)?))
        }
        other => {
            tracing::warn!(
                backend = %other,
                "Unknown provider backend, falling back to fcm"
            );
            let key = ServiceAccountKey::from_settings(settings)?;
            Ok(Arc::new(FcmClient::new(key, settings)?))
        }
    }
}
