//! Health check, service discovery and statistics endpoints.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::notification::DispatcherStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Seconds since the service started
    pub uptime: f64,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub success: bool,
    pub message: String,
    pub version: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub provider: String,
    pub stats: DispatcherStatsSnapshot,
}

const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/health", "Service health"),
    ("GET", "/stats", "Dispatch statistics"),
    ("POST", "/api/notifications/send-to-device", "Send a notification to one device"),
    ("POST", "/api/notifications/send-to-multiple", "Send a notification to up to 500 devices"),
    ("POST", "/api/notifications/send-to-topic", "Send a notification to a topic"),
    ("POST", "/api/notifications/subscribe-to-topic", "Subscribe devices to a topic"),
    ("POST", "/api/notifications/unsubscribe-from-topic", "Unsubscribe devices from a topic"),
    ("POST", "/api/notifications/send-data-message", "Send a silent data message to one device"),
    (
        "POST",
        "/api/notifications/send-multiple-data-messages",
        "Send repeated data messages concurrently",
    ),
    (
        "POST",
        "/api/notifications/send-multiple-data-messages-with-interval",
        "Send repeated data messages with a pause between batches",
    ),
];

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "Push relay service is running".to_string(),
        timestamp: Utc::now(),
        uptime: state.start_time.elapsed().as_secs_f64(),
    })
}

pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        success: true,
        message: "Push relay service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: ENDPOINTS
            .iter()
            .map(|&(method, path, description)| EndpointInfo {
                method,
                path,
                description,
            })
            .collect(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        success: true,
        provider: state.dispatcher.provider_name().to_string(),
        stats: state.dispatcher.stats(),
    })
}
