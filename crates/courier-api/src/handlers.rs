use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use courier_types::api::{Claims, SendMessageRequest};

use crate::AppState;
use crate::relay::RelayError;

fn status_for(err: RelayError) -> StatusCode {
    match err {
        RelayError::EmptyMessage => StatusCode::BAD_REQUEST,
        RelayError::Internal(e) => {
            error!("relay error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// GET /partners — conversation partners with unseen counts and online flags.
pub async fn list_partners(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let partners = state.relay.partners(claims.sub).await.map_err(status_for)?;
    Ok(Json(partners))
}

/// GET /conversations/{peer_id} — full history with a partner, oldest first.
/// Side effect: everything the peer sent the caller is marked seen.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let messages = state
        .relay
        .fetch_conversation(claims.sub, peer_id)
        .await
        .map_err(status_for)?;

    Ok(Json(messages))
}

/// POST /messages/{peer_id} — submit a message to a partner. The message is
/// persisted first; delivery to a live receiver is best effort and never
/// affects the response.
pub async fn send_message(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let message = state
        .relay
        .submit(claims.sub, peer_id, req.text, req.image_ref)
        .await
        .map_err(status_for)?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// PUT /messages/{message_id}/seen — explicit single-message seen transition,
/// used when a push arrives for the already-selected conversation. Idempotent.
pub async fn mark_seen(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    state.relay.mark_seen(message_id).await.map_err(status_for)?;
    Ok(StatusCode::NO_CONTENT)
}
