use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{error, info, instrument};

use crate::{error::AppError, state::AppState};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(handle_webhook))
}

/// `Bytes` keeps the body exactly as received; signatures cover those bytes.
#[instrument(skip_all)]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    // Present but not visible ASCII cannot be a valid signature.
    let signature = headers
        .get(SIGNATURE_HEADER)
        .map(|v| v.to_str())
        .transpose()
        .map_err(|_| AppError::SignatureInvalid)?;

    let event = state.verifier.verify(&body, signature)?;
    info!(event_id = %event.event_id, event_type = %event.kind.as_str(), "webhook verified");

    state.dispatcher.dispatch(&event).await.map_err(|e| {
        // A 5xx makes Stripe redeliver the event.
        error!(event_id = %event.event_id, error = %e, "webhook handler failed");
        e
    })?;

    Ok(Json(json!({ "received": true })))
}
