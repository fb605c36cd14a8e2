pub mod auth;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod session;
pub mod store;
pub mod sync;
pub mod synclog;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use db::DbPool;
use session::SessionHolder;
use store::TodoStore;
use sync::{RemoteClient, SyncEngine, SyncHandle};
use synclog::SyncLog;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub store: Arc<TodoStore>,
    pub session: SessionHolder,
    pub sync_log: SyncLog,
    pub sync: SyncHandle,
    pub engine: Arc<SyncEngine>,
    pub remote: RemoteClient,
    pub password_hash: Arc<String>,
    pub base_path: Arc<String>,
}

/// Wires the store, session holder, sync log and engine together and
/// spawns the background sync loop. Must run inside a tokio runtime.
pub fn build_state(
    db: DbPool,
    password_hash: Arc<String>,
    base_path: Arc<String>,
    remote_url: &str,
) -> AppState {
    let session = SessionHolder::new();
    let sync_log = SyncLog::new();
    let remote = RemoteClient::new(remote_url);
    let engine = Arc::new(SyncEngine::new(
        db.clone(),
        remote.clone(),
        session.clone(),
        sync_log.clone(),
    ));
    let sync = sync::spawn(engine.clone());
    let store = Arc::new(TodoStore::new(db.clone(), sync.clone()));

    AppState {
        db,
        store,
        session,
        sync_log,
        sync,
        engine,
        remote,
        password_hash,
        base_path,
    }
}

pub fn create_app(state: AppState) -> Router {
    let base_path = state.base_path.clone();

    let app_routes = Router::new()
        .route("/api/login", post(handlers::auth::login))
        .route("/api/logout", post(handlers::auth::logout))
        .route("/api/items", get(handlers::api::list_all_items))
        .route("/api/items", post(handlers::api::create_new_item))
        .route("/api/items", delete(handlers::api::self_destruct))
        .route("/api/items/undo-delete", get(handlers::api::deleted_slot))
        .route("/api/items/undo-delete", post(handlers::api::undo_delete))
        .route("/api/items/clean-slate", post(handlers::api::clean_slate))
        .route(
            "/api/items/undo-clean-slate",
            post(handlers::api::undo_clean_slate),
        )
        .route("/api/items/{id}", put(handlers::api::edit_item_content))
        .route("/api/items/{id}/done", post(handlers::api::toggle_done))
        .route("/api/items/{id}/pinned", post(handlers::api::toggle_pinned))
        .route(
            "/api/items/{id}/deleted",
            post(handlers::api::toggle_deleted),
        )
        .route("/api/contexts", get(handlers::api::context_summary))
        .route("/api/synclog", get(handlers::api::sync_log))
        .route("/api/sync", post(handlers::api::trigger_sync))
        .route("/api/sync/providers", get(handlers::auth::sync_providers))
        .route("/api/sync/token", put(handlers::auth::set_sync_token))
        .route("/api/sync/token", delete(handlers::auth::clear_sync_token))
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::compression::CompressionLayer::new()),
        )
        .with_state(state);

    tracing::info!("base_path: {base_path:?}");

    if base_path.is_empty() {
        app_routes
    } else {
        Router::new().nest(&*base_path, app_routes)
    }
}
