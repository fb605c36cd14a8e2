use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::warn;

use crate::db::{get_session, DbPool};
use crate::error::AppError;
use crate::AppState;

/// Represents an authenticated request (via the app's session cookie).
pub struct Auth;

impl FromRequestParts<AppState> for Auth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if check_session(parts, &state.db) {
            return Ok(Auth);
        }

        warn!("Unauthorized API access attempt");
        Err(AppError::Unauthorized)
    }
}

fn check_session(parts: &Parts, db: &DbPool) -> bool {
    let cookies = parts
        .headers
        .get_all("cookie")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|s| {
            let mut parts = s.trim().splitn(2, '=');
            Some((parts.next()?, parts.next()?))
        });

    for (name, value) in cookies {
        if name == "session" {
            if let Ok(Some(session)) = get_session(db, value) {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap()
                    .as_secs() as i64;
                if session.expires_at > now {
                    return true;
                }
            }
        }
    }
    false
}
