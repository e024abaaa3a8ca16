//! Provider message construction.

use std::collections::BTreeMap;

use crate::config::NotificationStyleConfig;
use crate::provider::{
    AndroidConfig, AndroidNotification, AndroidPriority, ApnsConfig, ApnsPayload, Aps, Message,
    MessageTarget, MulticastMessage,
};

use super::{DataPayload, NotificationContent, Priority, TargetSet, Topic};

/// How a message is presented on the device
#[derive(Debug, Clone)]
enum Delivery {
    /// Visible notification, decorated with the platform style hints
    Visible {
        content: NotificationContent,
        style: NotificationStyleConfig,
    },
    /// Data-only message that wakes the app in the background
    Silent { priority: Priority },
}

/// Builder for provider messages.
///
/// Platform delivery hints are derived from the kind of message: visible
/// notifications get the Android icon/color and the APNs badge, silent data
/// messages get Android priority, the `apns-priority` header and
/// `content-available`.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    delivery: Delivery,
    data: DataPayload,
}

impl MessageBuilder {
    /// Start a visible notification
    pub fn notification(content: NotificationContent, style: &NotificationStyleConfig) -> Self {
        Self {
            delivery: Delivery::Visible {
                content,
                style: style.clone(),
            },
            data: DataPayload::new(),
        }
    }

    /// Start a silent, data-only message
    pub fn silent(priority: Priority) -> Self {
        Self {
            delivery: Delivery::Silent { priority },
            data: DataPayload::new(),
        }
    }

    /// Set the data payload
    pub fn data(mut self, data: DataPayload) -> Self {
        self.data = data;
        self
    }

    /// Set a single data key, overwriting any caller value
    pub fn data_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key, value);
        self
    }

    /// Build a message addressed to one device token
    pub fn to_token(self, token: impl Into<String>) -> Message {
        self.build(MessageTarget::Token(token.into()))
    }

    /// Build a message addressed to a topic
    pub fn to_topic(self, topic: &Topic) -> Message {
        self.build(MessageTarget::Topic(topic.name().to_string()))
    }

    /// Build a multicast addressed to every token of the set
    pub fn to_tokens(self, tokens: TargetSet) -> MulticastMessage {
        let (notification, android, apns) = self.parts();
        MulticastMessage {
            tokens,
            notification,
            data: self.data,
            android,
            apns,
        }
    }

    fn build(self, target: MessageTarget) -> Message {
        let (notification, android, apns) = self.parts();
        Message {
            target,
            notification,
            data: self.data,
            android,
            apns,
        }
    }

    fn parts(&self) -> (Option<NotificationContent>, Option<AndroidConfig>, Option<ApnsConfig>) {
        match &self.delivery {
            Delivery::Visible { content, style } => {
                let android = (style.android_icon.is_some() || style.android_color.is_some())
                    .then(|| AndroidConfig {
                        priority: None,
                        notification: Some(AndroidNotification {
                            icon: style.android_icon.clone(),
                            color: style.android_color.clone(),
                        }),
                    });

                let apns = style.apns_badge.map(|badge| ApnsConfig {
                    headers: BTreeMap::new(),
                    payload: ApnsPayload {
                        aps: Aps {
                            badge: Some(badge),
                            content_available: None,
                        },
                    },
                });

                (Some(content.clone()), android, apns)
            }
            Delivery::Silent { priority } => {
                let android = AndroidConfig {
                    priority: Some(match priority {
                        Priority::High => AndroidPriority::High,
                        Priority::Normal => AndroidPriority::Normal,
                    }),
                    notification: None,
                };

                let apns = ApnsConfig {
                    headers: BTreeMap::from([(
                        "apns-priority".to_string(),
                        priority.apns_priority().to_string(),
                    )]),
                    payload: ApnsPayload {
                        aps: Aps {
                            badge: None,
                            content_available: Some(1),
                        },
                    },
                };

                (None, Some(android), Some(apns))
            }
        }
    }
}
