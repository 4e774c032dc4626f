//! quadern-core: notes anchored to sections of a static documentation site.
//!
//! The whole notebook is one JSON document under one key of a
//! [`KeyValueStorage`] (a browser's `localStorage`, a directory of files,
//! or memory). [`NoteStore`] loads and saves it and keeps the section
//! index (`"{pageUrl}#{sectionId}"` → note ids) consistent with the notes.
//!
//! ```
//! use quadern_core::{MemoryStorage, Note, NoteStore};
//!
//! let store = NoteStore::new(MemoryStorage::new());
//! let mut state = store.load();
//! let note = store.upsert_note(&mut state, Note::new("/u1/", "intro"));
//! store.save(&mut state);
//!
//! let reloaded = store.load();
//! assert_eq!(store.notes_for_section(&reloaded, "/u1/", "intro"), vec![note]);
//! ```

pub mod clock;
pub mod config;
pub mod event;
pub mod export;
pub mod id;
pub mod import;
pub mod note;
pub mod search;
pub mod section;
pub mod state;
pub mod stats;
pub mod storage;
pub mod store;
pub mod wire;

pub use clock::*;
pub use config::*;
pub use event::*;
pub use export::*;
pub use id::*;
pub use import::*;
pub use note::*;
pub use search::*;
pub use section::*;
pub use state::*;
pub use stats::*;
pub use storage::*;
pub use store::*;
