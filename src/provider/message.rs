//! Provider-facing message representation.
//!
//! Field names and nesting follow the FCM HTTP v1 `Message` resource so that a
//! [`Message`] can be serialized straight into a `messages:send` request.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::notification::{DataPayload, NotificationContent, TargetSet};

/// Where a single message is delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageTarget {
    Token(String),
    Topic(String),
}

/// A message addressed to exactly one token or topic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    #[serde(flatten)]
    pub target: MessageTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationContent>,
    #[serde(skip_serializing_if = "DataPayload::is_empty")]
    pub data: DataPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android: Option<AndroidConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apns: Option<ApnsConfig>,
}

/// A message addressed to up to 500 device tokens
#[derive(Debug, Clone, PartialEq)]
pub struct MulticastMessage {
    pub tokens: TargetSet,
    pub notification: Option<NotificationContent>,
    pub data: DataPayload,
    pub android: Option<AndroidConfig>,
    pub apns: Option<ApnsConfig>,
}

impl MulticastMessage {
    /// The single-token message sent to `token` when the multicast is fanned out
    pub fn message_for(&self, token: &str) -> Message {
        Message {
            target: MessageTarget::Token(token.to_string()),
            notification: self.notification.clone(),
            data: self.data.clone(),
            android: self.android.clone(),
            apns: self.apns.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AndroidPriority {
    High,
    Normal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AndroidConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<AndroidPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<AndroidNotification>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AndroidNotification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApnsConfig {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub payload: ApnsPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Aps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    #[serde(rename = "content-available", skip_serializing_if = "Option::is_none")]
    pub content_available: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_message_serialization() {
        let mut data = DataPayload::new();
        data.insert("k", "v");

        let message = Message {
            target: MessageTarget::Token("tok".into()),
            notification: Some(NotificationContent::new("Hi", "there", None).unwrap()),
            data,
            android: None,
            apns: Some(ApnsConfig {
                headers: BTreeMap::new(),
                payload: ApnsPayload {
                    aps: Aps {
                        badge: Some(1),
                        content_available: None,
                    },
                },
            }),
        };

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "token": "tok",
                "notification": {"title": "Hi", "body": "there"},
                "data": {"k": "v"},
                "apns": {"payload": {"aps": {"badge": 1}}}
            })
        );
    }

    #[test]
    fn test_topic_message_serialization() {
        let message = Message {
            target: MessageTarget::Topic("news".into()),
            notification: None,
            data: DataPayload::new(),
            android: Some(AndroidConfig {
                priority: Some(AndroidPriority::High),
                notification: None,
            }),
            apns: None,
        };

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"topic": "news", "android": {"priority": "high"}})
        );
    }

    #[test]
    fn test_multicast_fan_out_message() {
        let multicast = MulticastMessage {
            tokens: TargetSet::new(vec!["a".into(), "b".into()]).unwrap(),
            notification: None,
            data: DataPayload::new(),
            android: None,
            apns: None,
        };

        let message = multicast.message_for("b");
        assert_eq!(message.target, MessageTarget::Token("b".into()));
    }
}
