//! Request and response bodies for the notification endpoints.
//!
//! Request fields are kept loosely typed (`Option`, raw JSON for token
//! arrays) so that missing or malformed fields reach the validators and are
//! reported with their specific message instead of a generic body error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::notification::AggregateReport;
use crate::provider::{BatchResult, SendOutcome, TopicManagementError, TopicManagementResult};
use crate::validation::NotificationInput;

/// Request to send a visible notification to one device
#[derive(Debug, Default, Deserialize)]
pub struct SendToDeviceRequest {
    pub token: Option<String>,
    pub notification: Option<NotificationInput>,
    pub data: Option<Map<String, Value>>,
}

/// Request to send a visible notification to several devices
#[derive(Debug, Default, Deserialize)]
pub struct SendToMultipleRequest {
    pub tokens: Option<Value>,
    pub notification: Option<NotificationInput>,
    pub data: Option<Map<String, Value>>,
}

/// Request to send a visible notification to a topic
#[derive(Debug, Default, Deserialize)]
pub struct SendToTopicRequest {
    pub topic: Option<String>,
    pub notification: Option<NotificationInput>,
    pub data: Option<Map<String, Value>>,
}

/// Request to subscribe or unsubscribe devices
#[derive(Debug, Default, Deserialize)]
pub struct TopicMembershipRequest {
    pub tokens: Option<Value>,
    pub topic: Option<String>,
}

/// Request to send a silent data message to one device
#[derive(Debug, Default, Deserialize)]
pub struct SendDataMessageRequest {
    pub token: Option<String>,
    pub data: Option<Map<String, Value>>,
    pub priority: Option<String>,
}

/// Request to send repeated silent data messages
#[derive(Debug, Default, Deserialize)]
pub struct SendMultipleDataMessagesRequest {
    pub tokens: Option<Value>,
    pub data: Option<Map<String, Value>>,
    pub count: Option<u64>,
    /// Milliseconds between batches; only used by the paced endpoint
    pub interval: Option<u64>,
    pub priority: Option<String>,
}

/// Response carrying a single provider message ID
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageIdResponse {
    pub success: bool,
    pub message_id: String,
    pub message: String,
}

impl MessageIdResponse {
    pub fn new(message_id: String, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MulticastResponse {
    pub success: bool,
    pub success_count: usize,
    pub failure_count: usize,
    pub responses: Vec<SendOutcome>,
    pub message: String,
}

impl From<BatchResult> for MulticastResponse {
    fn from(batch: BatchResult) -> Self {
        Self {
            success: true,
            message: format!("{} notifications sent successfully", batch.success_count),
            success_count: batch.success_count,
            failure_count: batch.failure_count,
            responses: batch.responses,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicMembershipResponse {
    pub success: bool,
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<TopicManagementError>,
    pub message: String,
}

impl TopicMembershipResponse {
    /// `verb` completes "<n> tokens ... topic successfully"
    pub fn new(result: TopicManagementResult, verb: &str) -> Self {
        Self {
            success: true,
            message: format!("{} tokens {} topic successfully", result.success_count, verb),
            success_count: result.success_count,
            failure_count: result.failure_count,
            errors: result.errors,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatedDataMessagesResponse {
    pub success: bool,
    /// Raw batch results, in batch order
    pub messages: Vec<BatchResult>,
    pub total_success_count: usize,
    pub total_failure_count: usize,
    pub failed_tokens: Vec<String>,
    pub failure_codes: std::collections::BTreeMap<String, usize>,
    pub message: String,
}

impl From<AggregateReport> for RepeatedDataMessagesResponse {
    fn from(report: AggregateReport) -> Self {
        Self {
            success: true,
            messages: report.batches,
            total_success_count: report.total_success_count,
            total_failure_count: report.total_failure_count,
            failed_tokens: report.failed_tokens.into_iter().collect(),
            failure_codes: report.failure_codes,
            message: "Multiple data messages sent successfully".to_string(),
        }
    }
}
