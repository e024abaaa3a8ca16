//! Firebase Cloud Messaging backend (HTTP v1 API).
//!
//! - Single sends go to `POST /v1/projects/{project}/messages:send`
//! - Multicasts are fanned out as single sends with bounded concurrency;
//!   per-token failures end up in the [`BatchResult`], only a failure to
//!   obtain an access token fails the whole call
//! - Topic management uses the Instance ID `batchAdd` / `batchRemove` API

mod auth;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::ProviderConfig;

use super::{
    BatchResult, Message, MessagingProvider, MulticastMessage, ProviderError, SendOutcome,
    TopicManagementError, TopicManagementResult,
};

pub use auth::{AccessTokenProvider, ServiceAccountKey};

const TOPIC_PREFIX: &str = "/topics/";

#[derive(Serialize)]
struct SendRequest<'a> {
    message: &'a Message,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Serialize)]
struct TopicManagementRequest<'a> {
    to: String,
    registration_tokens: &'a [String],
}

#[derive(Deserialize)]
struct TopicManagementResponse {
    #[serde(default)]
    results: Vec<TopicManagementEntry>,
}

#[derive(Deserialize)]
struct TopicManagementEntry {
    error: Option<String>,
}

/// Google API error envelope
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "@type")]
    type_url: Option<String>,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

#[derive(Clone, Copy)]
enum TopicAction {
    Subscribe,
    Unsubscribe,
}

impl TopicAction {
    fn endpoint(&self) -> &'static str {
        match self {
            TopicAction::Subscribe => "batchAdd",
            TopicAction::Unsubscribe => "batchRemove",
        }
    }
}

pub struct FcmClient {
    http: reqwest::Client,
    send_url: String,
    iid_endpoint: String,
    auth: AccessTokenProvider,
    max_concurrent_sends: usize,
    /// Shared by every call on this client, so concurrent multicasts
    /// together never exceed `max_concurrent_sends` in-flight sends
    send_permits: Semaphore,
}

impl FcmClient {
    pub fn new(key: ServiceAccountKey, settings: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;

        let auth = AccessTokenProvider::new(http.clone(), &key, settings.token_uri.clone())?;
        let max_concurrent_sends = settings.max_concurrent_sends.max(1);

        Ok(Self {
            http,
            send_url: send_url(&settings.fcm_endpoint, &key.project_id),
            iid_endpoint: settings.iid_endpoint.trim_end_matches('/').to_string(),
            auth,
            max_concurrent_sends,
            send_permits: Semaphore::new(max_concurrent_sends),
        })
    }

    async fn send_with_token(&self, access_token: &str, message: &Message) -> Result<String, ProviderError> {
        let _permit = self
            .send_permits
            .acquire()
            .await
            .map_err(|_| ProviderError::Internal("send limiter closed".to_string()))?;

        let response = self
            .http
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&SendRequest { message })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(error_from_response(status, &body));
        }

        let parsed: SendResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(format!("send response: {}", e)))?;
        Ok(parsed.name)
    }

    async fn manage_topic(
        &self,
        action: TopicAction,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResult, ProviderError> {
        let access_token = self.auth.access_token().await?;
        let url = format!("{}/iid/v1:{}", self.iid_endpoint, action.endpoint());

        let response = self
            .http
            .post(&url)
            .bearer_auth(&access_token)
            .header("access_token_auth", "true")
            .json(&TopicManagementRequest {
                to: topic_path(topic),
                registration_tokens: tokens,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(error_from_response(status, &body));
        }

        let parsed: TopicManagementResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(format!("topic response: {}", e)))?;
        topic_result(parsed, tokens.len())
    }
}

#[async_trait]
impl MessagingProvider for FcmClient {
    fn name(&self) -> &'static str {
        "fcm"
    }

    #[tracing::instrument(name = "fcm.send", skip_all)]
    async fn send(&self, message: &Message) -> Result<String, ProviderError> {
        let access_token = self.auth.access_token().await?;
        self.send_with_token(&access_token, message).await
    }

    #[tracing::instrument(
        name = "fcm.send_multicast",
        skip_all,
        fields(token_count = message.tokens.len())
    )]
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<BatchResult, ProviderError> {
        let access_token = self.auth.access_token().await?;

        let singles: Vec<Message> = message
            .tokens
            .iter()
            .map(|token| message.message_for(token))
            .collect();

        // `buffered` keeps results in token order while bounding in-flight sends
        let access_token = access_token.as_str();
        let responses: Vec<SendOutcome> = stream::iter(singles)
            .map(move |single| async move {
                SendOutcome::from(self.send_with_token(access_token, &single).await)
            })
            .buffered(self.max_concurrent_sends)
            .collect()
            .await;

        Ok(BatchResult::from_outcomes(responses))
    }

    #[tracing::instrument(name = "fcm.subscribe", skip(self, tokens), fields(token_count = tokens.len()))]
    async fn subscribe_to_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResult, ProviderError> {
        self.manage_topic(TopicAction::Subscribe, tokens, topic).await
    }

    #[tracing::instrument(name = "fcm.unsubscribe", skip(self, tokens), fields(token_count = tokens.len()))]
    async fn unsubscribe_from_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResult, ProviderError> {
        self.manage_topic(TopicAction::Unsubscribe, tokens, topic).await
    }
}

fn send_url(endpoint: &str, project_id: &str) -> String {
    format!(
        "{}/v1/projects/{}/messages:send",
        endpoint.trim_end_matches('/'),
        project_id
    )
}

fn topic_path(topic: &str) -> String {
    if topic.starts_with(TOPIC_PREFIX) {
        topic.to_string()
    } else {
        format!("{}{}", TOPIC_PREFIX, topic)
    }
}

fn topic_result(
    response: TopicManagementResponse,
    token_count: usize,
) -> Result<TopicManagementResult, ProviderError> {
    if response.results.len() != token_count {
        return Err(ProviderError::MalformedResponse(format!(
            "expected {} topic results, got {}",
            token_count,
            response.results.len()
        )));
    }

    let errors: Vec<_> = response
        .results
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            entry.error.map(|error| TopicManagementError {
                index,
                reason: topic_error_code(&error).to_string(),
            })
        })
        .collect();

    Ok(TopicManagementResult {
        success_count: token_count - errors.len(),
        failure_count: errors.len(),
        errors,
    })
}

fn topic_error_code(error: &str) -> &'static str {
    match error {
        "NOT_FOUND" => "messaging/registration-token-not-registered",
        "INVALID_ARGUMENT" => "messaging/invalid-argument",
        "TOO_MANY_TOPICS" | "RESOURCE_EXHAUSTED" => "messaging/too-many-topics",
        "INTERNAL" => "messaging/internal-error",
        _ => "messaging/unknown-error",
    }
}

/// Map an error response of the FCM API onto a [`ProviderError`].
///
/// The FCM-specific `errorCode` detail wins over the generic RPC status; when
/// the body is not a Google error envelope the HTTP status decides.
fn error_from_response(status: StatusCode, body: &str) -> ProviderError {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return error_from_status(status, body);
    };

    let error = envelope.error;
    let fcm_code = error
        .details
        .iter()
        .find(|d| {
            d.type_url
                .as_deref()
                .is_some_and(|t| t.ends_with("google.firebase.fcm.v1.FcmError"))
        })
        .and_then(|d| d.error_code.clone());

    let message = error.message;
    match fcm_code.or(error.status).as_deref() {
        Some("UNREGISTERED") | Some("NOT_FOUND") => ProviderError::RegistrationTokenNotRegistered(message),
        Some("INVALID_ARGUMENT") if message.to_lowercase().contains("registration token") => {
            ProviderError::InvalidRegistrationToken(message)
        }
        Some("INVALID_ARGUMENT") => ProviderError::InvalidArgument(message),
        Some("SENDER_ID_MISMATCH") => ProviderError::MismatchedCredential(message),
        Some("QUOTA_EXCEEDED") | Some("RESOURCE_EXHAUSTED") => ProviderError::QuotaExceeded(message),
        Some("UNAVAILABLE") => ProviderError::Unavailable(message),
        Some("THIRD_PARTY_AUTH_ERROR") | Some("UNAUTHENTICATED") | Some("PERMISSION_DENIED") => {
            ProviderError::Authentication(message)
        }
        Some("INTERNAL") => ProviderError::Internal(message),
        _ => error_from_status(status, &message),
    }
}

fn error_from_status(status: StatusCode, detail: &str) -> ProviderError {
    let message = format!("HTTP {}: {}", status.as_u16(), detail);
    match status {
        StatusCode::BAD_REQUEST => ProviderError::InvalidArgument(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Authentication(message),
        StatusCode::NOT_FOUND => ProviderError::RegistrationTokenNotRegistered(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::QuotaExceeded(message),
        StatusCode::INTERNAL_SERVER_ERROR => ProviderError::Internal(message),
        StatusCode::SERVICE_UNAVAILABLE => ProviderError::Unavailable(message),
        _ => ProviderError::Unknown(message),
    }
}
