use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::ApiState;
use crate::error::AppError;
use crate::queue::publish_json;
use crate::services::CallbackEnvelope;

/// Accepts a gateway callback as-is and queues it for correlation.
pub async fn receive_callback(
    State(state): State<ApiState>,
    Path(transaction_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("callback body is empty".to_string()));
    }

    let envelope = CallbackEnvelope {
        transaction_id,
        payload: body.to_vec(),
    };
    publish_json(state.bus.as_ref(), &state.callback_topic, &envelope).await?;

    tracing::info!("Queued callback for transaction {}", envelope.transaction_id);
    Ok(StatusCode::ACCEPTED)
}
