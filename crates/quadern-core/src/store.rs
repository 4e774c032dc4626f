//! The note store: persistence plus section-index maintenance.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::QuadernConfig;
use crate::event::StoreEvent;
use crate::id::IdGenerator;
use crate::note::{Note, NoteEdit, NoteId};
use crate::section::{CourseCoordinates, SectionInfo};
use crate::state::{IndexIssue, StoreState, SCHEMA_VERSION};
use crate::storage::{KeyValueStorage, StorageError};

/// Errors from [`NoteStore::try_save`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Reads and writes the notebook under one storage key and keeps the
/// section index consistent.
///
/// The state itself is owned by the caller and passed to every operation.
/// Mutations only touch memory; nothing is persisted until [`save`].
///
/// [`save`]: NoteStore::save
pub struct NoteStore<S> {
    storage: S,
    key: String,
    legacy_key: String,
    app_version: String,
    copy_suffix: String,
    clock: Box<dyn Clock>,
    ids: IdGenerator,
    subscribers: Mutex<Vec<Sender<StoreEvent>>>,
}

impl<S: KeyValueStorage> NoteStore<S> {
    /// Store with default configuration and the system clock.
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, &QuadernConfig::default())
    }

    pub fn with_config(storage: S, config: &QuadernConfig) -> Self {
        Self {
            storage,
            key: config.storage.key.clone(),
            legacy_key: config.storage.legacy_key.clone(),
            app_version: config.notes.app_version.clone(),
            copy_suffix: config.notes.copy_suffix.clone(),
            clock: Box::new(SystemClock),
            ids: IdGenerator::new(config.notes.id_prefix.clone(), config.notes.id_strategy),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn legacy_key(&self) -> &str {
        &self.legacy_key
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        // Dropped receivers unsubscribe.
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// A fresh notebook stamped with the store's clock and app version.
    pub fn default_state(&self) -> StoreState {
        StoreState::new(self.now(), &self.app_version)
    }

    /// Read the persisted notebook.
    ///
    /// Falls back to a fresh default state when the key is absent, empty,
    /// unreadable or does not hold a JSON object shaped like a notebook.
    /// Never writes.
    pub fn load(&self) -> StoreState {
        let raw = match self.storage.get_item(&self.key) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => {
                debug!(key = %self.key, "no notebook stored, starting fresh");
                return self.default_state();
            }
            Err(e) => return self.recover(format!("read failed: {}", e)),
        };

        match Self::parse_state(&raw) {
            Ok(state) => {
                debug!(key = %self.key, notes = state.notes.len(), "notebook loaded");
                self.emit(StoreEvent::Loaded {
                    notes: state.notes.len(),
                });
                state
            }
            Err(reason) => self.recover(reason),
        }
    }

    fn parse_state(raw: &str) -> Result<StoreState, String> {
        let value: Value = serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))?;
        if !value.is_object() {
            return Err("stored value is not an object".to_string());
        }
        serde_json::from_value(value).map_err(|e| format!("unexpected shape: {}", e))
    }

    fn recover(&self, reason: String) -> StoreState {
        warn!(key = %self.key, %reason, "discarding stored notebook, using defaults");
        self.emit(StoreEvent::LoadRecovered { reason });
        self.default_state()
    }

    /// Persist the whole notebook, stamping `meta.updatedAt`.
    ///
    /// Write failures are logged and reported as [`StoreEvent::SaveFailed`]
    /// but never returned. Use [`try_save`](NoteStore::try_save) to handle them.
    pub fn save(&self, state: &mut StoreState) {
        if let Err(e) = self.try_save(state) {
            warn!(key = %self.key, error = %e, "failed to save notebook");
            self.emit(StoreEvent::SaveFailed {
                reason: e.to_string(),
            });
        }
    }

    /// Like [`save`](NoteStore::save) but returns the error. On success
    /// returns the number of bytes written.
    pub fn try_save(&self, state: &mut StoreState) -> Result<usize, StoreError> {
        state.schema_version = SCHEMA_VERSION;
        state.meta.updated_at = Some(self.now());
        let json = serde_json::to_string(state)?;
        self.storage.set_item(&self.key, &json)?;
        debug!(key = %self.key, bytes = json.len(), "notebook saved");
        self.emit(StoreEvent::Saved { bytes: json.len() });
        Ok(json.len())
    }

    fn fresh_id(&self, state: &StoreState) -> NoteId {
        self.ids
            .next(self.now(), |candidate| state.notes.by_id.contains_key(candidate))
    }

    /// Insert or replace a note and index it under its section.
    ///
    /// An empty id is replaced by a fresh one. A note that moved to another
    /// section is removed from its old index list. Returns the stored note.
    pub fn upsert_note(&self, state: &mut StoreState, mut note: Note) -> Note {
        if note.is_new() {
            note.id = self.fresh_id(state);
        }
        let id = note.id.clone();
        let relocated_from = state.notes.put(note.clone());

        debug!(id = %id, section = %note.section_key(), ?relocated_from, "note upserted");
        self.emit(StoreEvent::NoteUpserted { id, relocated_from });
        note
    }

    /// Remove a note. Unknown ids are a no-op and return `None`.
    pub fn delete_note(&self, state: &mut StoreState, id: &str) -> Option<Note> {
        let note = state.notes.remove(id)?;
        debug!(id = %id, section = %note.section_key(), "note deleted");
        self.emit(StoreEvent::NoteDeleted { id: id.to_string() });
        Some(note)
    }

    /// Notes of a section in index order.
    pub fn notes_for_section(&self, state: &StoreState, page_url: &str, section_id: &str) -> Vec<Note> {
        state
            .notes
            .for_section(page_url, section_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn count_for_section(&self, state: &StoreState, page_url: &str, section_id: &str) -> usize {
        state.notes.count_for_section(page_url, section_id)
    }

    /// Apply an editor change to a stored note. `None` for unknown ids.
    pub fn update_note(&self, state: &mut StoreState, id: &str, edit: &NoteEdit) -> Option<Note> {
        let now = self.now();
        let note = state.notes.by_id.get_mut(id)?;
        edit.apply(note, now);
        let note = note.clone();

        debug!(id = %id, "note edited");
        self.emit(StoreEvent::NoteUpserted {
            id: id.to_string(),
            relocated_from: None,
        });
        Some(note)
    }

    /// Copy a note into the same section under a new id, with the copy
    /// suffix appended to its title.
    pub fn duplicate_note(&self, state: &mut StoreState, id: &str) -> Option<Note> {
        let mut copy = state.notes.get(id)?.clone();
        copy.id = NoteId::new();
        copy.note_title.push_str(&self.copy_suffix);
        copy.stamp_created(self.now());
        Some(self.upsert_note(state, copy))
    }

    /// Create and store an empty note for a section.
    pub fn create_note_for_section(
        &self,
        state: &mut StoreState,
        section: &SectionInfo,
        coords: CourseCoordinates,
    ) -> Note {
        let note = Note::for_section(section, coords, self.now());
        self.upsert_note(state, note)
    }

    pub fn check_index(&self, state: &StoreState) -> Vec<IndexIssue> {
        state.notes.check()
    }

    /// Repair the section index. Returns the number of issues fixed.
    pub fn rebuild_index(&self, state: &mut StoreState) -> usize {
        let fixed = state.notes.rebuild_index();
        if fixed > 0 {
            warn!(fixed, "section index rebuilt");
        }
        fixed
    }
}
