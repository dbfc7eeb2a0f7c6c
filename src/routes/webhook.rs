use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::app_state::AppState;
use crate::models::chat::Update;

/// Header carrying the secret registered with `setWebhook`.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// POST /telegram/webhook — inbound chat updates.
pub async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    if let Some(expected) = state.webhook_secret.as_deref() {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            tracing::warn!(
                update_id = update.update_id,
                "Webhook call with missing or wrong secret"
            );
            return StatusCode::UNAUTHORIZED;
        }
    }

    dispatch(&state, update).await
}

/// POST /load-test — same handling as the webhook, without the secret.
pub async fn load_test(State(state): State<AppState>, Json(update): Json<Update>) -> StatusCode {
    if !state.enable_load_test {
        return StatusCode::NOT_FOUND;
    }
    dispatch(&state, update).await
}

async fn dispatch(state: &AppState, update: Update) -> StatusCode {
    let Some(message) = update.message else {
        tracing::debug!(update_id = update.update_id, "Ignoring update without a message");
        return StatusCode::OK;
    };

    // The handler has already replied to the user, success or not. A non-2xx
    // here would only make the chat platform resend the same update.
    let _ = state.handler.handle(message.into()).await;
    StatusCode::OK
}
