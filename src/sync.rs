use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::db::{self, DbPool};
use crate::error::AppError;
use crate::models::{now_ms, ResolveRequest, ServerInfo, SyncConflict, SyncRequest, SyncResponse};
use crate::session::SessionHolder;
use crate::synclog::SyncLog;

/// The background loop fires at this cadence.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(10);
/// The loop skips a tick when a sync already ran this recently.
pub const QUIET_PERIOD_MS: i64 = 2_000;

#[derive(Debug)]
pub enum SyncError {
    /// Network or server trouble; the periodic loop will try again.
    Transient(String),
    /// The remote rejected our token.
    Auth,
    /// We sent something the server considers malformed. A bug, not a
    /// condition to retry.
    DataShape(String),
    /// The remote dataset was reset out-of-band.
    Flushed,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Transient(msg) => write!(f, "sync failed: {msg}"),
            SyncError::Auth => write!(f, "access token rejected"),
            SyncError::DataShape(msg) => write!(f, "malformed sync payload: {msg}"),
            SyncError::Flushed => write!(f, "remote collection was flushed"),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Auth => AppError::Unauthorized,
            other => AppError::Upstream(other.to_string()),
        }
    }
}

fn db_err(err: AppError) -> SyncError {
    SyncError::Transient(match err {
        AppError::Database(msg) => msg,
        other => format!("{other:?}"),
    })
}

/// Messages from the store to the background loop.
pub enum SyncMessage {
    Sync,
    Destroy,
}

/// Cheap cloneable handle used by mutation paths to kick the engine
/// without waiting on it.
#[derive(Clone)]
pub struct SyncHandle {
    tx: UnboundedSender<SyncMessage>,
}

impl SyncHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(SyncMessage::Sync);
    }

    pub fn destroy(&self) {
        let _ = self.tx.send(SyncMessage::Destroy);
    }
}

/// HTTP client for the remote collection service.
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn server_info(&self) -> Result<ServerInfo, SyncError> {
        let resp = self
            .http
            .get(format!("{}/v1/", self.base_url))
            .send()
            .await
            .map_err(transport_err)?;
        decode(check(resp).await?).await
    }

    pub async fn sync(&self, token: &str, req: &SyncRequest) -> Result<SyncResponse, SyncError> {
        let resp = self
            .http
            .post(format!("{}/v1/sync", self.base_url))
            .bearer_auth(token)
            .json(req)
            .send()
            .await
            .map_err(transport_err)?;
        decode(check(resp).await?).await
    }

    pub async fn resolve(&self, token: &str, req: &ResolveRequest) -> Result<(), SyncError> {
        let resp = self
            .http
            .post(format!("{}/v1/sync/resolve", self.base_url))
            .bearer_auth(token)
            .json(req)
            .send()
            .await
            .map_err(transport_err)?;
        check(resp).await?;
        Ok(())
    }

    pub async fn clear(&self, token: &str) -> Result<(), SyncError> {
        let resp = self
            .http
            .delete(format!("{}/v1/sync", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_err)?;
        check(resp).await?;
        Ok(())
    }
}

fn transport_err(err: reqwest::Error) -> SyncError {
    SyncError::Transient(err.to_string())
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED => SyncError::Auth,
        StatusCode::GONE => SyncError::Flushed,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => SyncError::DataShape(body),
        _ => SyncError::Transient(format!("{status}: {body}")),
    })
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, SyncError> {
    // A 200 we cannot parse is a schema violation on either side.
    resp.json::<T>()
        .await
        .map_err(|err| SyncError::DataShape(err.to_string()))
}

struct CycleOutcome {
    conflicts: Vec<String>,
    detail: serde_json::Value,
}

/// Reconciles the local collection against the remote service. Never blocks
/// local mutations; outcomes land in the sync log and, for auth failures,
/// in the session holder.
pub struct SyncEngine {
    db: DbPool,
    remote: RemoteClient,
    session: SessionHolder,
    log: SyncLog,
    in_flight: tokio::sync::Mutex<()>,
}

impl SyncEngine {
    pub fn new(db: DbPool, remote: RemoteClient, session: SessionHolder, log: SyncLog) -> Self {
        Self {
            db,
            remote,
            session,
            log,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// One sync cycle. Concurrent calls collapse into the one in flight.
    /// Only data-shape failures propagate; everything else is recorded in
    /// the log and swallowed, because the caller's local write has already
    /// succeeded.
    pub async fn sync(&self) -> Result<(), SyncError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("sync already in flight");
            return Ok(());
        };
        if self.session.get().is_none() {
            debug!("no access token, skipping sync");
            return Ok(());
        }

        match self.cycle().await {
            Ok(outcome) => {
                info!(conflicts = outcome.conflicts.len(), "sync ok");
                self.log.record(true, outcome.conflicts, outcome.detail);
                Ok(())
            }
            Err(err) => {
                match &err {
                    SyncError::Auth => {
                        warn!("access token rejected by remote, clearing session");
                        self.session.clear();
                    }
                    SyncError::DataShape(msg) => {
                        error!(%msg, "sync payload rejected as malformed");
                    }
                    _ => warn!(error = %err, "sync failed"),
                }
                self.log
                    .record(false, Vec::new(), json!({ "error": err.to_string() }));
                match err {
                    SyncError::DataShape(_) => Err(err),
                    _ => Ok(()),
                }
            }
        }
    }

    async fn cycle(&self) -> Result<CycleOutcome, SyncError> {
        match self.attempt().await {
            Ok(resp) if resp.conflicts.is_empty() => Ok(CycleOutcome {
                conflicts: Vec::new(),
                detail: serde_json::to_value(&resp).unwrap_or_default(),
            }),
            Ok(resp) => {
                let resolved = self.resolve_conflicts(&resp.conflicts).await?;
                // One retry after resolution; a second failure is final.
                let second = self.attempt().await?;
                Ok(CycleOutcome {
                    conflicts: resolved,
                    detail: serde_json::to_value(&second).unwrap_or_default(),
                })
            }
            Err(SyncError::Flushed) => {
                warn!("remote collection was flushed, resetting local sync state");
                db::reset_sync_state(&self.db).map_err(db_err)?;
                let resp = self.attempt().await?;
                let resolved = self.resolve_conflicts(&resp.conflicts).await?;
                Ok(CycleOutcome {
                    conflicts: resolved,
                    detail: serde_json::to_value(&resp).unwrap_or_default(),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// One push/pull round trip: push the dirty set with the cursor, apply
    /// server acks and remote changes, advance the cursor.
    async fn attempt(&self) -> Result<SyncResponse, SyncError> {
        // Read the token at the point of use; a concurrent 401 may have
        // cleared it since the cycle started.
        let token = self.session.get().ok_or(SyncError::Auth)?;
        let since = db::last_sync(&self.db).map_err(db_err)?;
        let changes = db::dirty_items(&self.db).map_err(db_err)?;
        debug!(pushing = changes.len(), ?since, "sync round trip");

        let resp = self.remote.sync(&token, &SyncRequest { since, changes }).await?;

        for record in &resp.published {
            db::mark_synced(&self.db, &record.id, record.last_modified).map_err(db_err)?;
        }
        for record in &resp.changes {
            db::import_item(&self.db, record).map_err(db_err)?;
        }
        db::set_last_sync(&self.db, resp.last_modified).map_err(db_err)?;
        Ok(resp)
    }

    /// Remote-wins: the remote copy overwrites the local one, and the
    /// resolution is reported back. Visible to the user via the log entry.
    async fn resolve_conflicts(&self, conflicts: &[SyncConflict]) -> Result<Vec<String>, SyncError> {
        let mut resolved = Vec::with_capacity(conflicts.len());
        for conflict in conflicts {
            let token = self.session.get().ok_or(SyncError::Auth)?;
            db::import_item(&self.db, &conflict.remote).map_err(db_err)?;
            self.remote
                .resolve(
                    &token,
                    &ResolveRequest {
                        id: conflict.remote.id.clone(),
                        resolution: "remote".to_string(),
                        record: conflict.remote.clone(),
                    },
                )
                .await?;
            info!(id = %conflict.remote.id, "conflict resolved remote-wins");
            resolved.push(conflict.remote.id.clone());
        }
        Ok(resolved)
    }

    /// Wipes the remote collection (self-destruct). Local state is already
    /// gone by the time this runs.
    pub async fn destroy_remote(&self) -> Result<(), SyncError> {
        let Some(token) = self.session.get() else {
            debug!("no access token, skipping remote wipe");
            return Ok(());
        };
        match self.remote.clear(&token).await {
            Ok(()) => {
                info!("remote collection cleared");
                Ok(())
            }
            Err(SyncError::Auth) => {
                warn!("access token rejected during remote wipe, clearing session");
                self.session.clear();
                Err(SyncError::Auth)
            }
            Err(err) => Err(err),
        }
    }

    fn recently_attempted(&self) -> bool {
        self.log
            .last_attempt()
            .is_some_and(|at| now_ms() - at < QUIET_PERIOD_MS)
    }

    /// Background loop: drains mutation triggers and fires the periodic
    /// sync, skipping ticks that land inside the quiet period. Ends when
    /// every `SyncHandle` is dropped.
    pub async fn run(self: Arc<Self>, mut rx: UnboundedReceiver<SyncMessage>) {
        let mut ticker = tokio::time::interval(SYNC_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(SyncMessage::Sync) => {
                        let _ = self.sync().await;
                    }
                    Some(SyncMessage::Destroy) => {
                        if let Err(err) = self.destroy_remote().await {
                            warn!(error = %err, "remote wipe failed");
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if self.recently_attempted() {
                        continue;
                    }
                    let _ = self.sync().await;
                }
            }
        }
        debug!("sync loop stopped");
    }
}

/// Spawns the background loop and returns the handle mutations use to
/// trigger it.
pub fn spawn(engine: Arc<SyncEngine>) -> SyncHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(engine.run(rx));
    SyncHandle { tx }
}
