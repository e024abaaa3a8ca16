//! HTTP notification endpoints
//!
//! This module provides the endpoints under `/api/notifications`:
//! - Visible notifications to a device, several devices, or a topic
//! - Topic subscription management
//! - Silent data messages, single or repeated (concurrent or paced)

mod handlers;
mod models;

pub use handlers::{
    send_data_message, send_multiple_data_messages, send_multiple_data_messages_with_interval,
    send_to_device, send_to_multiple, send_to_topic, subscribe_to_topic, unsubscribe_from_topic,
};

pub use models::{
    MessageIdResponse, MulticastResponse, RepeatedDataMessagesResponse, SendDataMessageRequest,
    SendMultipleDataMessagesRequest, SendToDeviceRequest, SendToMultipleRequest,
    SendToTopicRequest, TopicMembershipRequest, TopicMembershipResponse,
};
