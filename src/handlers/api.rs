use axum::extract::{Path, Query, State};
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::info;

use crate::error::AppError;
use crate::middleware::Auth;
use crate::models::{ContextCount, CreateItem, EditContent, Item, ListParams};
use crate::AppState;

pub async fn list_all_items(
    _auth: Auth,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Item>>, AppError> {
    let mut items = state.store.list()?;
    if let Some(filter) = params.context.as_deref().filter(|f| !f.is_empty()) {
        items.retain(|item| item.context.as_deref() == Some(filter));
    }
    info!(count = items.len(), "Listed items");
    Ok(Json(items))
}

pub async fn create_new_item(
    _auth: Auth,
    State(state): State<AppState>,
    Json(req): Json<CreateItem>,
) -> Result<(StatusCode, Json<Item>), AppError> {
    let item = state.store.create(&req.text, req.notes, req.context)?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn edit_item_content(
    _auth: Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<EditContent>,
) -> Result<Json<Item>, AppError> {
    let item = state
        .store
        .edit_content(&id, &req.text, req.notes, req.context)?;
    Ok(Json(item))
}

pub async fn toggle_done(
    _auth: Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Item>, AppError> {
    Ok(Json(state.store.toggle_done(&id)?))
}

pub async fn toggle_pinned(
    _auth: Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Item>, AppError> {
    Ok(Json(state.store.toggle_pinned(&id)?))
}

pub async fn toggle_deleted(
    _auth: Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Item>, AppError> {
    Ok(Json(state.store.toggle_deleted(&id)?))
}

pub async fn undo_delete(
    _auth: Auth,
    State(state): State<AppState>,
) -> Result<Json<Item>, AppError> {
    match state.store.undo_delete()? {
        Some(item) => Ok(Json(item)),
        None => Err(AppError::NotFound),
    }
}

/// The item currently offered for undo, or null. Drives the UI's undo
/// notification.
pub async fn deleted_slot(
    _auth: Auth,
    State(state): State<AppState>,
) -> Json<Option<Item>> {
    Json(state.store.deleted_item())
}

pub async fn clean_slate(
    _auth: Auth,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let hidden = state.store.clean_slate()?;
    Ok(Json(json!({ "hidden": hidden })))
}

pub async fn undo_clean_slate(
    _auth: Auth,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let restored = state.store.undo_clean_slate()?;
    Ok(Json(json!({ "restored": restored })))
}

pub async fn self_destruct(
    _auth: Auth,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state.store.self_destruct()?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn context_summary(
    _auth: Auth,
    State(state): State<AppState>,
) -> Result<Json<Vec<ContextCount>>, AppError> {
    Ok(Json(state.store.context_summary()?))
}

pub async fn sync_log(
    _auth: Auth,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    Ok(Json(json!({
        "entries": state.sync_log.entries(),
        "last_success": state.sync_log.last_success(),
        "last_failure": state.sync_log.last_failure(),
    })))
}

/// Manual sync. Waits for the cycle so the UI can refresh afterwards;
/// transient failures still come back as success (they live in the log),
/// only data-shape bugs surface.
pub async fn trigger_sync(
    _auth: Auth,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.engine.sync().await?;
    Ok(Json(json!({ "success": true })))
}
