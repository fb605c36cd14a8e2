use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use serde_json::json;
use tracing::info;

use crate::auth::{generate_session_id, verify_password};
use crate::db::{create_session, delete_session};
use crate::error::AppError;
use crate::middleware::Auth;
use crate::models::{LoginRequest, Provider, Session, SetTokenRequest};
use crate::AppState;

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, impl IntoResponse), AppError> {
    if !verify_password(&req.password, &state.password_hash) {
        return Err(AppError::Unauthorized);
    }

    let session_id = generate_session_id();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let expires_at = now + 7 * 24 * 60 * 60;

    let session = Session {
        id: session_id.clone(),
        created_at: now,
        expires_at,
    };

    create_session(&state.db, &session)?;
    info!("User logged in");

    let cookie = Cookie::build(("session", session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::days(7));

    Ok((jar.add(cookie), Json(json!({ "success": true }))))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, impl IntoResponse), AppError> {
    if let Some(session_cookie) = jar.get("session") {
        delete_session(&state.db, session_cookie.value())?;
    }
    info!("User logged out");

    let cookie = Cookie::build(("session", ""))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(0));

    Ok((jar.remove(cookie), Json(json!({ "success": true }))))
}

/// Providers offered by the remote service's OpenID support. The redirect
/// dance itself happens in the browser; we only relay the list.
pub async fn sync_providers(
    _auth: Auth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Provider>>, AppError> {
    let info = state.remote.server_info().await?;
    let providers = info
        .capabilities
        .openid
        .map(|openid| openid.providers)
        .unwrap_or_default();
    Ok(Json(providers))
}

/// The browser posts the access token it got back from the OpenID
/// redirect. Setting it re-enables sync, so kick one off right away.
pub async fn set_sync_token(
    _auth: Auth,
    State(state): State<AppState>,
    Json(req): Json<SetTokenRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.access_token.trim().is_empty() {
        return Err(AppError::BadRequest("Access token cannot be empty"));
    }
    state.session.set(req.access_token);
    state.sync.trigger();
    Ok(Json(json!({ "success": true })))
}

pub async fn clear_sync_token(
    _auth: Auth,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state.session.clear();
    info!("Backup logout");
    Ok(StatusCode::NO_CONTENT)
}
