//! The persisted notebook state and its section index.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::note::{section_key, Note, NoteId};
use crate::wire;

/// Current shape of the persisted object. Older versions are not migrated.
pub const SCHEMA_VERSION: u32 = 1;

/// Version recorded in `meta.appVersion` of new states.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything stored under the storage key.
///
/// `course`, `user`, `ui`, `progress` and `filters` belong to the UI layer;
/// the store carries them through unchanged. Unknown top-level keys are
/// kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreState {
    #[serde(deserialize_with = "read_schema_version")]
    pub schema_version: u32,
    #[serde(deserialize_with = "wire::or_default")]
    pub meta: Meta,
    pub course: Value,
    pub user: Value,
    pub ui: Value,
    pub progress: Value,
    pub filters: Value,
    #[serde(deserialize_with = "wire::or_default")]
    pub notes: NotesTable,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Bookkeeping, stamped on every save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Meta {
    #[serde(with = "wire::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(with = "wire::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "wire::text")]
    pub app_version: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoreState {
    /// A fresh notebook with the overlay's default UI state.
    pub fn new(now: DateTime<Utc>, app_version: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            meta: Meta {
                created_at: Some(now),
                updated_at: Some(now),
                app_version: app_version.to_string(),
                extra: Map::new(),
            },
            course: json!({ "id": "", "title": "" }),
            user: json!({ "theme": "light", "language": "ca", "lastView": "study", "mode": "study" }),
            ui: json!({
                "explorer": { "openUnits": [], "openBlocs": {} },
                "notesPanel": { "open": false, "sectionId": "", "noteId": "" }
            }),
            progress: json!({ "lastVisited": null, "readPositions": {}, "sections": {} }),
            filters: json!({ "q": "", "tags": [] }),
            notes: NotesTable::default(),
            extra: Map::new(),
        }
    }
}

fn read_schema_version<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(wire::unsigned_from_value(&Value::deserialize(deserializer)?)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(SCHEMA_VERSION))
}

impl Default for StoreState {
    fn default() -> Self {
        Self::new(wire::truncate_millis(Utc::now()), APP_VERSION)
    }
}

/// Cached aggregate counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    pub total: usize,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Notes by id plus the section index.
///
/// Invariant: every note in `by_id` appears exactly once in
/// `by_section[section_key(note)]`. Index lists keep insertion order.
///
/// Reading is lenient: entries of the wrong shape are dropped one by one
/// and an unreadable counter is recomputed from `by_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawNotesTable")]
pub struct NotesTable {
    pub by_id: BTreeMap<NoteId, Note>,
    pub by_section: BTreeMap<String, Vec<NoteId>>,
    pub counters: Counters,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawNotesTable {
    by_id: Value,
    by_section: Value,
    counters: Value,
}

impl From<RawNotesTable> for NotesTable {
    fn from(raw: RawNotesTable) -> Self {
        let by_id: BTreeMap<NoteId, Note> = match raw.by_id {
            Value::Object(entries) => entries
                .into_iter()
                .filter_map(|(id, value)| serde_json::from_value(value).ok().map(|note| (id, note)))
                .collect(),
            _ => BTreeMap::new(),
        };

        let by_section = match raw.by_section {
            Value::Object(entries) => entries
                .into_iter()
                .map(|(key, ids)| {
                    let ids = match ids {
                        Value::Array(items) => items
                            .into_iter()
                            .filter_map(|id| match id {
                                Value::String(id) => Some(id),
                                _ => None,
                            })
                            .collect(),
                        _ => Vec::new(),
                    };
                    (key, ids)
                })
                .collect(),
            _ => BTreeMap::new(),
        };

        let (total, extra) = match raw.counters {
            Value::Object(mut fields) => {
                let total = fields
                    .remove("total")
                    .as_ref()
                    .and_then(wire::unsigned_from_value)
                    .and_then(|n| usize::try_from(n).ok());
                (total, fields)
            }
            _ => (None, Map::new()),
        };

        let counters = Counters {
            total: total.unwrap_or(by_id.len()),
            extra,
        };
        Self {
            by_id,
            by_section,
            counters,
        }
    }
}

/// A violation of the section-index invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexIssue {
    /// Index lists an id that is not in `by_id`
    Dangling { key: String, id: NoteId },
    /// Note is missing from its own section list
    Missing { key: String, id: NoteId },
    /// Id appears more than once in a list
    Duplicate { key: String, id: NoteId },
    /// Note is listed under a section it no longer belongs to
    Misplaced { key: String, id: NoteId },
    /// `counters.total` disagrees with `by_id`
    CounterDrift { cached: usize, actual: usize },
}

impl std::fmt::Display for IndexIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexIssue::Dangling { key, id } => write!(f, "{}: unknown note {}", key, id),
            IndexIssue::Missing { key, id } => write!(f, "{}: note {} not indexed", key, id),
            IndexIssue::Duplicate { key, id } => write!(f, "{}: note {} listed twice", key, id),
            IndexIssue::Misplaced { key, id } => {
                write!(f, "{}: note {} belongs to another section", key, id)
            }
            IndexIssue::CounterDrift { cached, actual } => {
                write!(f, "counter says {} notes, found {}", cached, actual)
            }
        }
    }
}

impl NotesTable {
    pub fn get(&self, id: &str) -> Option<&Note> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.by_id.values()
    }

    /// Store a note that already has an id and index it.
    ///
    /// If a note with the same id was indexed under another section, that
    /// entry is moved. Returns the old section key in that case.
    /// Timestamps are cut to the millisecond precision of the wire format.
    pub fn put(&mut self, mut note: Note) -> Option<String> {
        note.created_at = note.created_at.map(wire::truncate_millis);
        note.updated_at = note.updated_at.map(wire::truncate_millis);
        let key = note.section_key();
        let relocated_from = self
            .by_id
            .get(&note.id)
            .map(Note::section_key)
            .filter(|old| *old != key);

        if let Some(old) = &relocated_from {
            if let Some(ids) = self.by_section.get_mut(old) {
                ids.retain(|id| *id != note.id);
            }
        }

        let ids = self.by_section.entry(key).or_default();
        if !ids.contains(&note.id) {
            ids.push(note.id.clone());
        }
        self.by_id.insert(note.id.clone(), note);
        self.recount();
        relocated_from
    }

    /// Remove a note and its index entry. The section list stays, possibly empty.
    pub fn remove(&mut self, id: &str) -> Option<Note> {
        let note = self.by_id.remove(id)?;
        if let Some(ids) = self.by_section.get_mut(&note.section_key()) {
            ids.retain(|x| x != id);
        }
        self.recount();
        Some(note)
    }

    /// Notes of a section in index order. Dangling ids are skipped.
    pub fn for_section(&self, page_url: &str, section_id: &str) -> Vec<&Note> {
        self.by_section
            .get(&section_key(page_url, section_id))
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    /// Number of notes `for_section` would return.
    pub fn count_for_section(&self, page_url: &str, section_id: &str) -> usize {
        self.by_section
            .get(&section_key(page_url, section_id))
            .map(|ids| ids.iter().filter(|id| self.by_id.contains_key(*id)).count())
            .unwrap_or(0)
    }

    pub fn recount(&mut self) {
        self.counters.total = self.by_id.len();
    }

    /// Report every invariant violation without changing anything.
    pub fn check(&self) -> Vec<IndexIssue> {
        let mut issues = Vec::new();

        for (key, ids) in &self.by_section {
            let mut seen: Vec<&NoteId> = Vec::with_capacity(ids.len());
            for id in ids {
                if seen.contains(&id) {
                    issues.push(IndexIssue::Duplicate { key: key.clone(), id: id.clone() });
                    continue;
                }
                seen.push(id);
                match self.by_id.get(id) {
                    None => issues.push(IndexIssue::Dangling { key: key.clone(), id: id.clone() }),
                    Some(note) if note.section_key() != *key => {
                        issues.push(IndexIssue::Misplaced { key: key.clone(), id: id.clone() })
                    }
                    Some(_) => {}
                }
            }
        }

        for (id, note) in &self.by_id {
            let key = note.section_key();
            let indexed = self
                .by_section
                .get(&key)
                .map(|ids| ids.contains(id))
                .unwrap_or(false);
            if !indexed {
                issues.push(IndexIssue::Missing { key, id: id.clone() });
            }
        }

        if self.counters.total != self.by_id.len() {
            issues.push(IndexIssue::CounterDrift {
                cached: self.counters.total,
                actual: self.by_id.len(),
            });
        }
        issues
    }

    /// Rebuild the section index from `by_id`.
    ///
    /// Correctly placed ids keep their relative order; notes that were not
    /// indexed are appended in id order. Returns the number of issues fixed.
    pub fn rebuild_index(&mut self) -> usize {
        let fixed = self.check().len();
        if fixed == 0 {
            return 0;
        }

        let mut rebuilt: BTreeMap<String, Vec<NoteId>> = BTreeMap::new();
        for (key, ids) in &self.by_section {
            let kept = rebuilt.entry(key.clone()).or_default();
            for id in ids {
                let belongs = self
                    .by_id
                    .get(id)
                    .map(|note| note.section_key() == *key)
                    .unwrap_or(false);
                if belongs && !kept.contains(id) {
                    kept.push(id.clone());
                }
            }
        }
        for (id, note) in &self.by_id {
            let ids = rebuilt.entry(note.section_key()).or_default();
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }

        self.by_section = rebuilt;
        self.recount();
        fixed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn note(id: &str, page: &str, section: &str) -> Note {
        Note {
            id: id.to_string(),
            ..Note::new(page, section)
        }
    }

    #[test]
    fn default_state_shape() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let value = serde_json::to_value(StoreState::new(now, "0.1.0")).unwrap();
        assert_eq!(value["schemaVersion"], 1);
        assert_eq!(value["meta"]["appVersion"], "0.1.0");
        assert_eq!(value["meta"]["createdAt"], "2024-01-01T00:00:00.000Z");
        assert_eq!(value["user"]["language"], "ca");
        assert_eq!(value["ui"]["notesPanel"]["open"], false);
        assert_eq!(value["notes"]["byId"], json!({}));
        assert_eq!(value["notes"]["bySection"], json!({}));
        assert_eq!(value["notes"]["counters"]["total"], 0);
    }

    #[test]
    fn partial_state_fills_defaults() {
        let state: StoreState =
            serde_json::from_value(json!({ "notes": { "byId": {}, "bySection": {} }, "extraKey": 5 }))
                .unwrap();
        assert_eq!(state.schema_version, SCHEMA_VERSION);
        assert_eq!(state.filters, json!({ "q": "", "tags": [] }));
        assert_eq!(state.extra.get("extraKey"), Some(&json!(5)));
    }

    #[test]
    fn put_indexes_once() {
        let mut table = NotesTable::default();
        assert_eq!(table.put(note("a", "/u1", "s1")), None);
        assert_eq!(table.put(note("a", "/u1", "s1")), None);
        assert_eq!(table.by_section["/u1#s1"], vec!["a".to_string()]);
        assert_eq!(table.counters.total, 1);
    }

    #[test]
    fn put_relocates() {
        let mut table = NotesTable::default();
        table.put(note("a", "/u1", "s1"));
        let moved = table.put(note("a", "/u1", "s2"));
        assert_eq!(moved, Some("/u1#s1".to_string()));
        assert!(table.for_section("/u1", "s1").is_empty());
        assert_eq!(table.for_section("/u1", "s2").len(), 1);
        assert!(table.check().is_empty());
    }

    #[test]
    fn remove_keeps_empty_list() {
        let mut table = NotesTable::default();
        table.put(note("a", "/u1", "s1"));
        assert!(table.remove("a").is_some());
        assert_eq!(table.by_section.get("/u1#s1"), Some(&Vec::new()));
        assert_eq!(table.counters.total, 0);
        assert!(table.remove("a").is_none());
    }

    #[test]
    fn put_cuts_timestamps_to_millis() {
        let mut table = NotesTable::default();
        let precise = Utc.timestamp_nanos(1_700_000_000_123_456_789);
        table.put(Note {
            created_at: Some(precise),
            updated_at: Some(precise),
            ..note("a", "/u1", "s1")
        });
        let stored = table.get("a").unwrap();
        assert_eq!(stored.created_at, Some(wire::truncate_millis(precise)));
        assert_eq!(stored.updated_at.unwrap().timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn odd_top_level_fields_keep_notes() {
        let state: StoreState = serde_json::from_value(json!({
            "schemaVersion": "1",
            "meta": "broken",
            "notes": {
                "byId": {
                    "a": { "id": "a", "pageUrl": "/u1", "sectionId": "s1", "content": "precious" },
                    "b": "not a note"
                },
                "bySection": { "/u1#s1": ["a", 7, null], "/u2#s1": "a" },
                "counters": { "total": "many", "byUnit": 3 }
            }
        }))
        .unwrap();

        assert_eq!(state.schema_version, SCHEMA_VERSION);
        assert_eq!(state.meta, Meta::default());
        assert_eq!(state.notes.get("a").map(|n| n.content.as_str()), Some("precious"));
        assert!(state.notes.get("b").is_none());
        assert_eq!(state.notes.by_section["/u1#s1"], vec!["a".to_string()]);
        assert!(state.notes.by_section["/u2#s1"].is_empty());
        assert_eq!(state.notes.counters.total, 1);
        assert_eq!(state.notes.counters.extra.get("byUnit"), Some(&json!(3)));
        assert!(state.notes.check().is_empty());
    }

    #[test]
    fn readable_counter_is_kept_as_stored() {
        let table: NotesTable = serde_json::from_value(json!({
            "byId": {},
            "bySection": {},
            "counters": { "total": 4 }
        }))
        .unwrap();
        assert_eq!(table.counters.total, 4);
        assert_eq!(table.check(), vec![IndexIssue::CounterDrift { cached: 4, actual: 0 }]);

        let state: StoreState = serde_json::from_value(json!({ "notes": 12 })).unwrap();
        assert!(state.notes.is_empty());
    }

    #[test]
    fn for_section_skips_dangling() {
        let mut table = NotesTable::default();
        table.put(note("a", "/u1", "s1"));
        table.by_section.get_mut("/u1#s1").unwrap().insert(0, "ghost".into());
        let ids: Vec<&str> = table.for_section("/u1", "s1").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(table.count_for_section("/u1", "s1"), 1);
        assert_eq!(table.count_for_section("/u1", "nope"), 0);
    }

    #[test]
    fn check_reports_each_kind() {
        let mut table = NotesTable::default();
        table.put(note("a", "/u1", "s1"));
        table.put(note("b", "/u1", "s1"));
        table.by_id.insert("c".into(), note("c", "/u2", "s1"));
        let list = table.by_section.get_mut("/u1#s1").unwrap();
        list.push("a".into());
        list.push("ghost".into());
        table.by_section.insert("/u9#old".into(), vec!["b".into()]);

        let issues = table.check();
        assert!(issues.contains(&IndexIssue::Duplicate { key: "/u1#s1".into(), id: "a".into() }));
        assert!(issues.contains(&IndexIssue::Dangling { key: "/u1#s1".into(), id: "ghost".into() }));
        assert!(issues.contains(&IndexIssue::Misplaced { key: "/u9#old".into(), id: "b".into() }));
        assert!(issues.contains(&IndexIssue::Missing { key: "/u2#s1".into(), id: "c".into() }));
        assert!(issues.contains(&IndexIssue::CounterDrift { cached: 2, actual: 3 }));
    }

    #[test]
    fn rebuild_repairs_and_keeps_order() {
        let mut table = NotesTable::default();
        table.put(note("b", "/u1", "s1"));
        table.put(note("a", "/u1", "s1"));
        table.by_section.get_mut("/u1#s1").unwrap().push("ghost".into());
        table.by_id.insert("c".into(), note("c", "/u1", "s1"));

        assert!(table.rebuild_index() > 0);
        assert!(table.check().is_empty());
        assert_eq!(
            table.by_section["/u1#s1"],
            vec!["b".to_string(), "a".to_string(), "c".to_string()]
        );
        assert_eq!(table.rebuild_index(), 0);
    }
}
