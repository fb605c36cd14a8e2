use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::auth::generate_record_id;
use crate::db::{self, DbPool};
use crate::error::AppError;
use crate::models::{now_ms, ContextCount, Item};
use crate::sync::SyncHandle;

/// How long an undo-delete stays offered before the slot auto-clears.
const UNDO_WINDOW: Duration = Duration::from_secs(10);

/// Authoritative local state for all items. Every mutation persists locally
/// first and then kicks the sync engine; the local write never waits on the
/// network.
pub struct TodoStore {
    db: DbPool,
    sync: SyncHandle,
    undo: Arc<Mutex<UndoSlot>>,
    clean_slate_batch: Mutex<Option<i64>>,
}

/// Single-slot undo buffer. A second delete before the window elapses
/// overwrites the slot and restarts the timer.
#[derive(Default)]
struct UndoSlot {
    item: Option<Item>,
    timer: Option<JoinHandle<()>>,
}

impl TodoStore {
    pub fn new(db: DbPool, sync: SyncHandle) -> Self {
        Self {
            db,
            sync,
            undo: Arc::new(Mutex::new(UndoSlot::default())),
            clean_slate_batch: Mutex::new(None),
        }
    }

    /// Everything persisted, newest first. Callers filter `deleted` (and
    /// `hidden`/`done`) for display.
    pub fn list(&self) -> Result<Vec<Item>, AppError> {
        db::list_items(&self.db)
    }

    pub fn create(
        &self,
        text: &str,
        notes: Option<String>,
        context: Option<String>,
    ) -> Result<Item, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("Text cannot be empty"));
        }

        let now = now_ms();
        let item = Item {
            id: generate_record_id(),
            text: text.to_string(),
            notes,
            context,
            created: now,
            modified: now,
            done: None,
            deleted: None,
            hidden: None,
            pinned: None,
            last_modified: None,
        };
        db::insert_item(&self.db, &item)?;
        info!(id = %item.id, text = %item.text, "Created item");
        self.sync.trigger();
        Ok(item)
    }

    /// Persists the full record. The caller is responsible for bumping
    /// `modified` when content fields changed.
    pub fn update(&self, item: &Item) -> Result<(), AppError> {
        if !db::update_item(&self.db, item)? {
            return Err(AppError::NotFound);
        }
        self.sync.trigger();
        Ok(())
    }

    pub fn edit_content(
        &self,
        id: &str,
        text: &str,
        notes: Option<String>,
        context: Option<String>,
    ) -> Result<Item, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("Text cannot be empty"));
        }

        let mut item = db::get_item(&self.db, id)?.ok_or(AppError::NotFound)?;
        item.text = text.to_string();
        item.notes = notes;
        item.context = context;
        item.modified = now_ms();
        self.update(&item)?;
        info!(id = %item.id, "Edited item");
        Ok(item)
    }

    /// Flips `done` between unset and now. Does not touch `modified`.
    pub fn toggle_done(&self, id: &str) -> Result<Item, AppError> {
        let mut item = db::get_item(&self.db, id)?.ok_or(AppError::NotFound)?;
        item.done = match item.done {
            Some(_) => None,
            None => Some(now_ms()),
        };
        self.update(&item)?;
        info!(id = %item.id, done = item.done.is_some(), "Toggled done");
        Ok(item)
    }

    pub fn toggle_pinned(&self, id: &str) -> Result<Item, AppError> {
        let mut item = db::get_item(&self.db, id)?.ok_or(AppError::NotFound)?;
        item.pinned = match item.pinned {
            Some(_) => None,
            None => Some(now_ms()),
        };
        self.update(&item)?;
        info!(id = %item.id, pinned = item.pinned.is_some(), "Toggled pinned");
        Ok(item)
    }

    /// Soft delete is a toggle, so undo is the same call again. Deleting
    /// arms the undo slot; un-deleting a buffered item disarms it.
    pub fn toggle_deleted(&self, id: &str) -> Result<Item, AppError> {
        let mut item = db::get_item(&self.db, id)?.ok_or(AppError::NotFound)?;
        item.deleted = match item.deleted {
            Some(_) => None,
            None => Some(now_ms()),
        };
        self.update(&item)?;
        info!(id = %item.id, deleted = item.deleted.is_some(), "Toggled deleted");

        let mut slot = self.undo.lock().unwrap();
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        if item.deleted.is_some() {
            slot.item = Some(item.clone());
            let undo = Arc::clone(&self.undo);
            slot.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(UNDO_WINDOW).await;
                let mut slot = undo.lock().unwrap();
                slot.item = None;
                slot.timer = None;
            }));
        } else {
            let _ = slot.item.take_if(|buffered| buffered.id == item.id);
        }

        Ok(item)
    }

    /// Restores the buffered deleted item, if the window has not elapsed.
    pub fn undo_delete(&self) -> Result<Option<Item>, AppError> {
        let buffered = {
            let mut slot = self.undo.lock().unwrap();
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
            slot.item.take()
        };
        match buffered {
            Some(item) => self.toggle_deleted(&item.id).map(Some),
            None => Ok(None),
        }
    }

    pub fn deleted_item(&self) -> Option<Item> {
        self.undo.lock().unwrap().item.clone()
    }

    /// Hides every visible, unpinned item as one undoable batch.
    pub fn clean_slate(&self) -> Result<usize, AppError> {
        let batch = now_ms();
        let hidden = db::hide_unpinned(&self.db, batch)?;
        *self.clean_slate_batch.lock().unwrap() = Some(batch);
        info!(hidden, "Clean slate");
        self.sync.trigger();
        Ok(hidden)
    }

    /// Un-hides the last clean-slate batch. With no tracked batch this
    /// un-hides every hidden item.
    pub fn undo_clean_slate(&self) -> Result<usize, AppError> {
        let batch = self.clean_slate_batch.lock().unwrap().take();
        let restored = db::unhide(&self.db, batch)?;
        info!(restored, "Undo clean slate");
        self.sync.trigger();
        Ok(restored)
    }

    /// Clears all items locally and asks the engine to wipe the remote
    /// collection. Irreversible.
    pub fn self_destruct(&self) -> Result<(), AppError> {
        db::clear_items(&self.db)?;
        {
            let mut slot = self.undo.lock().unwrap();
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
            slot.item = None;
        }
        *self.clean_slate_batch.lock().unwrap() = None;
        info!("Deleted all items");
        self.sync.destroy();
        Ok(())
    }

    pub fn context_summary(&self) -> Result<Vec<ContextCount>, AppError> {
        db::context_summary(&self.db)
    }
}
