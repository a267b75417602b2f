use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, warn};

use tandem_types::api::Claims;
use tandem_types::store::StoreError;

use crate::auth::AppState;

/// Channel history rendered in the caller's current language.
///
/// Only durable members of the ride may read it; live presence is irrelevant.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let is_member = tokio::time::timeout(
        state.store_timeout,
        state.members.is_member(&channel_id, &claims.sub),
    )
    .await
    .map_err(|_| {
        error!("Membership lookup for {} in {} timed out", claims.sub, channel_id);
        StatusCode::SERVICE_UNAVAILABLE
    })?
    .map_err(|e| {
        error!("Membership lookup for {} in {} failed: {}", claims.sub, channel_id, e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    if !is_member {
        warn!("{} requested history of {} without membership", claims.sub, channel_id);
        return Err(StatusCode::FORBIDDEN);
    }

    let messages = state
        .history
        .get_history(&channel_id, &claims.sub)
        .await
        .map_err(|e| {
            error!("History of {} unavailable: {}", channel_id, e);
            match e {
                StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            }
        })?;

    Ok(Json(messages))
}

pub async fn health() -> &'static str {
    "ok"
}
