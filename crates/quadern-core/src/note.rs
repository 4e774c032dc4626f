use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::wire;

/// Note identifier. Empty means "not stored yet".
pub type NoteId = String;

/// Key of the section index: `"{page_url}#{section_id}"`.
pub fn section_key(page_url: &str, section_id: &str) -> String {
    format!("{}#{}", page_url, section_id)
}

/// A reader's note anchored to one section of one page.
///
/// `section_title`, `unitat` and `bloc` are copied from the section metadata
/// when the note is created. They are a frozen snapshot: renaming a heading
/// on the site does not update existing notes.
///
/// Field names on the wire are camelCase (`pageUrl`, `noteTitle`, ...).
/// Unknown fields are kept in `extra` so they survive a save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Note {
    #[serde(deserialize_with = "wire::text")]
    pub id: NoteId,
    #[serde(deserialize_with = "wire::text")]
    pub page_url: String,
    #[serde(deserialize_with = "wire::text")]
    pub section_id: String,
    #[serde(deserialize_with = "wire::text")]
    pub section_title: String,
    #[serde(with = "wire::coordinate", skip_serializing_if = "Option::is_none")]
    pub unitat: Option<u32>,
    #[serde(with = "wire::coordinate", skip_serializing_if = "Option::is_none")]
    pub bloc: Option<u32>,
    #[serde(deserialize_with = "wire::text")]
    pub note_title: String,
    #[serde(deserialize_with = "wire::text")]
    pub content: String,
    #[serde(deserialize_with = "wire::tags")]
    pub tags: Vec<String>,
    #[serde(with = "wire::timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(with = "wire::timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Note {
    /// An unsaved, empty note for a section.
    pub fn new(page_url: impl Into<String>, section_id: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            section_id: section_id.into(),
            ..Self::default()
        }
    }

    /// True until the store has assigned an id.
    pub fn is_new(&self) -> bool {
        self.id.is_empty()
    }

    pub fn section_key(&self) -> String {
        section_key(&self.page_url, &self.section_id)
    }

    /// Most recent edit, falling back to creation time.
    pub fn last_edit(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }

    /// Title to show in lists: note title, else section title, else section id.
    pub fn display_title(&self) -> &str {
        [&self.note_title, &self.section_title, &self.section_id]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Stamp both timestamps for a freshly created note.
    pub fn stamp_created(&mut self, now: DateTime<Utc>) {
        self.created_at = Some(now);
        self.updated_at = Some(now);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }
}

/// Changes typed into the note editor. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteEdit {
    pub title: Option<String>,
    /// Comma-separated, as typed in the tag field.
    pub tags: Option<String>,
    pub content: Option<String>,
}

impl NoteEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.tags.is_none() && self.content.is_none()
    }

    /// Apply the edit and stamp `updated_at`.
    pub fn apply(&self, note: &mut Note, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            note.note_title = title.trim().to_string();
        }
        if let Some(tags) = &self.tags {
            note.tags = quadern_tags::parse_tag_list(tags);
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
        note.touch(now);
    }
}
