use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, index, stats};
use super::notifications::{
    send_data_message, send_multiple_data_messages, send_multiple_data_messages_with_interval,
    send_to_device, send_to_multiple, send_to_topic, subscribe_to_topic, unsubscribe_from_topic,
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Discovery, health & stats
        .route("/", get(index))
        .route("/health", get(health))
        .route("/stats", get(stats))
        // Notification endpoints
        .nest(
            "/api/notifications",
            Router::new()
                // Visible notifications
                .route("/send-to-device", post(send_to_device))
                .route("/send-to-multiple", post(send_to_multiple))
                .route("/send-to-topic", post(send_to_topic))
                // Topic membership
                .route("/subscribe-to-topic", post(subscribe_to_topic))
                .route("/unsubscribe-from-topic", post(unsubscribe_from_topic))
                // Silent data messages
                .route("/send-data-message", post(send_data_message))
                .route(
                    "/send-multiple-data-messages",
                    post(send_multiple_data_messages),
                )
                .route(
                    "/send-multiple-data-messages-with-interval",
                    post(send_multiple_data_messages_with_interval),
                ),
        )
}
