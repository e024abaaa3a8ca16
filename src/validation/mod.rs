//! Request payload validation.
//!
//! Every check runs before the messaging provider is contacted, so malformed
//! input never costs a provider call. Each validator turns loosely-typed
//! request input into the corresponding domain value or a [`ValidationError`]
//! naming the violated constraint.

use std::num::NonZeroU32;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::config::DispatchConfig;
use crate::notification::{
    DataPayload, NotificationContent, Priority, TargetSet, Topic, MAX_BODY_CHARS, MAX_TARGETS,
    MAX_TITLE_CHARS,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Notification payload is required")]
    NotificationRequired,

    #[error("Notification title and body are required")]
    NotificationFieldsRequired,

    #[error("Notification title must be {} characters or less", MAX_TITLE_CHARS)]
    TitleTooLong,

    #[error("Notification body must be {} characters or less", MAX_BODY_CHARS)]
    BodyTooLong,

    #[error("Tokens array is required and must not be empty")]
    TokensRequired,

    #[error("Maximum {} tokens allowed per request", MAX_TARGETS)]
    TooManyTokens,

    #[error("All tokens must be non-empty strings")]
    MalformedToken,

    #[error("FCM token is required")]
    TokenRequired,

    #[error("Topic is required")]
    TopicRequired,

    #[error("Topic name must match [a-zA-Z0-9-_.~%]+")]
    InvalidTopic,

    #[error("Data payload is required")]
    DataRequired,

    #[error("Data payload key \"{0}\" is reserved")]
    ReservedDataKey(String),

    #[error("count must be between 1 and {max}")]
    InvalidCount { max: u32 },

    #[error("interval must be at most {max} milliseconds")]
    InvalidInterval { max: u64 },

    #[error("priority must be \"high\" or \"normal\"")]
    InvalidPriority,
}

/// Notification section of a request body, as sent by callers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationInput {
    pub title: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
}

pub fn validate_notification(
    input: Option<&NotificationInput>,
) -> Result<NotificationContent, ValidationError> {
    let input = input.ok_or(ValidationError::NotificationRequired)?;

    match (input.title.as_deref(), input.body.as_deref()) {
        (Some(title), Some(body)) => NotificationContent::new(title, body, input.image_url.clone()),
        _ => Err(ValidationError::NotificationFieldsRequired),
    }
}

/// Validate a token list given as raw JSON.
///
/// Kept untyped so that a non-array value or a non-string element is reported
/// with the token constraint rather than a generic body parsing error.
pub fn validate_tokens(value: Option<&serde_json::Value>) -> Result<TargetSet, ValidationError> {
    let items = match value {
        Some(serde_json::Value::Array(items)) => items,
        _ => return Err(ValidationError::TokensRequired),
    };

    if items.is_empty() {
        return Err(ValidationError::TokensRequired);
    }
    if items.len() > MAX_TARGETS {
        return Err(ValidationError::TooManyTokens);
    }

    let tokens = items
        .iter()
        .map(|item| match item {
            serde_json::Value::String(token) => Ok(token.clone()),
            _ => Err(ValidationError::MalformedToken),
        })
        .collect::<Result<Vec<_>, _>>()?;

    TargetSet::new(tokens)
}

pub fn validate_token(token: Option<&str>) -> Result<String, ValidationError> {
    match token {
        Some(token) if !token.trim().is_empty() => Ok(token.to_string()),
        _ => Err(ValidationError::TokenRequired),
    }
}

pub fn validate_topic(topic: Option<&str>) -> Result<Topic, ValidationError> {
    Topic::new(topic.ok_or(ValidationError::TopicRequired)?)
}

/// Data payload for data-only sends: required and non-empty
pub fn validate_data(
    data: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Result<DataPayload, ValidationError> {
    match data {
        Some(map) if !map.is_empty() => DataPayload::from_json(map),
        _ => Err(ValidationError::DataRequired),
    }
}

/// Optional data attached to a visible notification
pub fn validate_optional_data(
    data: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Result<DataPayload, ValidationError> {
    data.map(DataPayload::from_json)
        .transpose()
        .map(Option::unwrap_or_default)
}

pub fn validate_priority(priority: Option<&str>) -> Result<Priority, ValidationError> {
    match priority {
        None => Ok(Priority::default()),
        Some(value) => Priority::parse(value).ok_or(ValidationError::InvalidPriority),
    }
}

/// Number of repeated batches; absent means one
pub fn validate_count(count: Option<u64>, config: &DispatchConfig) -> Result<NonZeroU32, ValidationError> {
    let invalid = ValidationError::InvalidCount {
        max: config.max_repeat_count,
    };

    let count = count.unwrap_or(1);
    if count > u64::from(config.max_repeat_count) {
        return Err(invalid);
    }
    u32::try_from(count)
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or(invalid)
}

/// Pause between paced batches; absent means the configured default
pub fn validate_interval(
    interval_ms: Option<u64>,
    config: &DispatchConfig,
) -> Result<Duration, ValidationError> {
    let interval_ms = interval_ms.unwrap_or(config.default_interval_ms);
    if interval_ms > config.max_interval_ms {
        return Err(ValidationError::InvalidInterval {
            max: config.max_interval_ms,
        });
    }
    Ok(Duration::from_millis(interval_ms))
}
