use std::{net::Ipv4Addr, sync::Arc};

use tracing::info;

use workon::{auth, build_state, create_app, db};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("WORKON_PORT")
        .expect("WORKON_PORT to be set")
        .parse()
        .expect("port number");

    let password = std::env::var("WORKON_PASSWORD").expect("WORKON_PASSWORD to be set");

    let remote_url =
        std::env::var("WORKON_REMOTE_URL").expect("WORKON_REMOTE_URL to be set");

    let db_path = std::env::var("WORKON_DB").unwrap_or_else(|_| "workon.db".to_string());

    let base_path = std::env::var("WORKON_BASE_PATH")
        .ok()
        .map(|path| {
            let path = path.trim_end_matches('/');
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            }
        })
        .unwrap_or_default();

    let password_hash = Arc::new(auth::hash_password(&password));
    let db = db::init_db(&db_path).expect("initializing database");
    let _ = db::cleanup_expired_sessions(&db);

    let state = build_state(db, password_hash, Arc::new(base_path), &remote_url);
    let app = create_app(state);
    let addr = (Ipv4Addr::UNSPECIFIED, port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind port");

    info!("running on {addr:?}");

    axum::serve(listener, app).await.expect("failed serving");
}
