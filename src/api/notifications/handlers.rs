//! HTTP notification handlers

use std::future::Future;

use axum::{extract::State, Json};
use tracing::Instrument;

use crate::api::extract::ApiJson;
use crate::error::{AppError, Result};
use crate::notification::AggregateReport;
use crate::provider::ProviderError;
use crate::server::AppState;
use crate::validation::{
    validate_count, validate_data, validate_interval, validate_notification,
    validate_optional_data, validate_priority, validate_token, validate_tokens, validate_topic,
};

use super::models::{
    MessageIdResponse, MulticastResponse, RepeatedDataMessagesResponse, SendDataMessageRequest,
    SendMultipleDataMessagesRequest, SendToDeviceRequest, SendToMultipleRequest,
    SendToTopicRequest, TopicMembershipRequest, TopicMembershipResponse,
};

/// Send a notification to a single device
#[tracing::instrument(name = "http.send_to_device", skip_all)]
pub async fn send_to_device(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SendToDeviceRequest>,
) -> Result<Json<MessageIdResponse>> {
    let content = validate_notification(request.notification.as_ref())?;
    let token = validate_token(request.token.as_deref())?;
    let data = validate_optional_data(request.data.as_ref())?;

    let message_id = state
        .dispatcher
        .send_to_device(&token, content, data)
        .await?;

    Ok(Json(MessageIdResponse::new(
        message_id,
        "Notification sent successfully",
    )))
}

/// Send a notification to several devices in one multicast
#[tracing::instrument(name = "http.send_to_multiple", skip_all)]
pub async fn send_to_multiple(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SendToMultipleRequest>,
) -> Result<Json<MulticastResponse>> {
    let content = validate_notification(request.notification.as_ref())?;
    let tokens = validate_tokens(request.tokens.as_ref())?;
    let data = validate_optional_data(request.data.as_ref())?;

    let batch = state
        .dispatcher
        .send_to_multiple(tokens, content, data)
        .await?;

    Ok(Json(batch.into()))
}

/// Send a notification to every subscriber of a topic
#[tracing::instrument(name = "http.send_to_topic", skip_all)]
pub async fn send_to_topic(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SendToTopicRequest>,
) -> Result<Json<MessageIdResponse>> {
    let content = validate_notification(request.notification.as_ref())?;
    let topic = validate_topic(request.topic.as_deref())?;
    let data = validate_optional_data(request.data.as_ref())?;

    let message_id = state
        .dispatcher
        .send_to_topic(&topic, content, data)
        .await?;

    Ok(Json(MessageIdResponse::new(
        message_id,
        "Notification sent to topic successfully",
    )))
}

#[tracing::instrument(name = "http.subscribe_to_topic", skip_all)]
pub async fn subscribe_to_topic(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TopicMembershipRequest>,
) -> Result<Json<TopicMembershipResponse>> {
    let tokens = validate_tokens(request.tokens.as_ref())?;
    let topic = validate_topic(request.topic.as_deref())?;

    let result = state.dispatcher.subscribe_to_topic(&tokens, &topic).await?;

    Ok(Json(TopicMembershipResponse::new(result, "subscribed to")))
}

#[tracing::instrument(name = "http.unsubscribe_from_topic", skip_all)]
pub async fn unsubscribe_from_topic(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TopicMembershipRequest>,
) -> Result<Json<TopicMembershipResponse>> {
    let tokens = validate_tokens(request.tokens.as_ref())?;
    let topic = validate_topic(request.topic.as_deref())?;

    let result = state
        .dispatcher
        .unsubscribe_from_topic(&tokens, &topic)
        .await?;

    Ok(Json(TopicMembershipResponse::new(result, "unsubscribed from")))
}

/// Send a silent data message to a single device
#[tracing::instrument(name = "http.send_data_message", skip_all)]
pub async fn send_data_message(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SendDataMessageRequest>,
) -> Result<Json<MessageIdResponse>> {
    let token = validate_token(request.token.as_deref())?;
    let data = validate_data(request.data.as_ref())?;
    let priority = validate_priority(request.priority.as_deref())?;

    let message_id = state
        .dispatcher
        .send_data_message(&token, data, priority)
        .await?;

    Ok(Json(MessageIdResponse::new(
        message_id,
        "Data message sent successfully",
    )))
}

/// Send `count` silent data batches to the same devices, concurrently
#[tracing::instrument(name = "http.send_multiple_data_messages", skip_all)]
pub async fn send_multiple_data_messages(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SendMultipleDataMessagesRequest>,
) -> Result<Json<RepeatedDataMessagesResponse>> {
    let tokens = validate_tokens(request.tokens.as_ref())?;
    let data = validate_data(request.data.as_ref())?;
    let count = validate_count(request.count, &state.settings.dispatch)?;
    let priority = validate_priority(request.priority.as_deref())?;

    let dispatcher = state.dispatcher.clone();
    let report = run_to_completion(async move {
        dispatcher
            .send_multiple_data_messages(tokens, data, count, priority)
            .await
    })
    .await?;

    Ok(Json(report.into()))
}

/// Send `count` silent data batches one after another, `interval` ms apart
#[tracing::instrument(name = "http.send_multiple_data_messages_with_interval", skip_all)]
pub async fn send_multiple_data_messages_with_interval(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SendMultipleDataMessagesRequest>,
) -> Result<Json<RepeatedDataMessagesResponse>> {
    let tokens = validate_tokens(request.tokens.as_ref())?;
    let data = validate_data(request.data.as_ref())?;
    let count = validate_count(request.count, &state.settings.dispatch)?;
    let interval = validate_interval(request.interval, &state.settings.dispatch)?;
    let priority = validate_priority(request.priority.as_deref())?;

    let dispatcher = state.dispatcher.clone();
    let report = run_to_completion(async move {
        dispatcher
            .send_multiple_data_messages_with_interval(tokens, data, count, interval, priority)
            .await
    })
    .await?;

    Ok(Json(report.into()))
}

/// Run a repeated dispatch on its own task.
///
/// Axum drops the handler future when the client disconnects. A dispatch that
/// has started still runs to the end.
async fn run_to_completion<F>(dispatch: F) -> Result<AggregateReport>
where
    F: Future<Output = std::result::Result<AggregateReport, ProviderError>> + Send + 'static,
{
    let report = tokio::spawn(dispatch.in_current_span())
        .await
        .map_err(|e| AppError::Internal(format!("dispatch task failed: {}", e)))??;
    Ok(report)
}
