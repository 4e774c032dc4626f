//! Import of exported, backed-up and legacy notebooks.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::note::Note;
use crate::state::StoreState;
use crate::storage::KeyValueStorage;
use crate::store::NoteStore;

/// Old field names and the fields they map onto.
const LEGACY_ALIASES: [(&str, &str); 5] = [
    ("title", "noteTitle"),
    ("unit", "unitat"),
    ("section", "sectionId"),
    ("created", "createdAt"),
    ("updated", "updatedAt"),
];

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unrecognized import format: {0}")]
    UnrecognizedShape(String),
}

/// Where imported notes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportSource {
    /// `{metadata, notes: [...]}` written by the JSON export
    ExportDocument,
    /// A whole persisted notebook
    StoreState,
    /// A bare array or `{notes: [...]}`, the legacy layouts
    NoteList,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedImport {
    pub source: ImportSource,
    pub notes: Vec<Note>,
    /// Entries dropped because they were not usable notes
    pub skipped: usize,
}

/// Recognize an import payload and extract its notes.
///
/// Entries without an id are skipped. Legacy lists additionally drop notes
/// that have neither a title nor content.
pub fn parse_import(json: &str) -> Result<ParsedImport, ImportError> {
    let value: Value = serde_json::from_str(json)?;

    let (source, entries) = match value {
        Value::Array(entries) => (ImportSource::NoteList, entries),
        Value::Object(mut root) => match root.remove("notes") {
            Some(Value::Array(entries)) if root.contains_key("metadata") => {
                (ImportSource::ExportDocument, entries)
            }
            Some(Value::Array(entries)) => (ImportSource::NoteList, entries),
            Some(Value::Object(mut table)) => match table.remove("byId") {
                Some(Value::Object(by_id)) => {
                    (ImportSource::StoreState, by_id.into_iter().map(|(_, v)| v).collect())
                }
                _ => {
                    return Err(ImportError::UnrecognizedShape(
                        "notes object without byId".to_string(),
                    ))
                }
            },
            _ => {
                return Err(ImportError::UnrecognizedShape(
                    "object without a notes list".to_string(),
                ))
            }
        },
        other => {
            return Err(ImportError::UnrecognizedShape(format!(
                "expected an array or object, got {}",
                kind_of(&other)
            )))
        }
    };

    let total = entries.len();
    let notes: Vec<Note> = entries
        .into_iter()
        .filter_map(|entry| note_from_value(entry, source))
        .collect();
    let skipped = total - notes.len();
    if skipped > 0 {
        debug!(skipped, ?source, "import entries skipped");
    }
    Ok(ParsedImport {
        source,
        notes,
        skipped,
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn note_from_value(value: Value, source: ImportSource) -> Option<Note> {
    let Value::Object(mut fields) = value else {
        return None;
    };
    apply_legacy_aliases(&mut fields);

    let note: Note = serde_json::from_value(Value::Object(fields)).ok()?;
    if note.id.trim().is_empty() {
        return None;
    }
    if source == ImportSource::NoteList
        && note.note_title.trim().is_empty()
        && note.content.trim().is_empty()
    {
        return None;
    }
    Some(note)
}

/// Move legacy keys onto current names. A current field that is already
/// present wins and the legacy key is dropped.
fn apply_legacy_aliases(fields: &mut Map<String, Value>) {
    for (legacy, current) in LEGACY_ALIASES {
        if let Some(value) = fields.remove(legacy) {
            let missing = fields.get(current).map_or(true, Value::is_null);
            if missing {
                fields.insert(current.to_string(), value);
            }
        }
    }
}

/// What to do when an imported id already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportPolicy {
    /// Replace the stored note
    #[default]
    Overwrite,
    /// Keep the stored note and add the imported one under a fresh id
    KeepBoth,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Added under their own id
    pub imported: usize,
    /// Replaced a stored note with the same id
    pub replaced: usize,
    /// Added under a fresh id because theirs was taken
    pub reassigned: usize,
    /// Entries that were not usable notes
    pub skipped: usize,
}

impl ImportReport {
    pub fn stored(&self) -> usize {
        self.imported + self.replaced + self.reassigned
    }
}

impl<S: KeyValueStorage> NoteStore<S> {
    /// Upsert imported notes into `state`. Nothing is saved.
    pub fn import_notes(
        &self,
        state: &mut StoreState,
        parsed: ParsedImport,
        policy: ImportPolicy,
    ) -> ImportReport {
        let mut report = ImportReport {
            skipped: parsed.skipped,
            ..ImportReport::default()
        };

        for mut note in parsed.notes {
            if !state.notes.by_id.contains_key(&note.id) {
                report.imported += 1;
            } else if policy == ImportPolicy::Overwrite {
                report.replaced += 1;
            } else {
                note.id.clear();
                report.reassigned += 1;
            }
            self.upsert_note(state, note);
        }

        debug!(?report, "import finished");
        report
    }

    /// Notes stored under the legacy key. Unreadable or absent data gives
    /// an empty list.
    pub fn load_legacy(&self) -> ParsedImport {
        let empty = ParsedImport {
            source: ImportSource::NoteList,
            notes: Vec::new(),
            skipped: 0,
        };

        let raw = match self.storage().get_item(self.legacy_key()) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => return empty,
            Err(e) => {
                warn!(key = %self.legacy_key(), error = %e, "failed to read legacy notes");
                return empty;
            }
        };

        match parse_import(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(key = %self.legacy_key(), error = %e, "ignoring unreadable legacy notes");
                empty
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    #[test]
    fn legacy_array_with_aliases() {
        let raw = json!([
            { "id": "n_1", "title": "Vell", "unit": "2", "section": "intro", "created": "2023-01-01T00:00:00.000Z" },
            { "id": "n_2", "pageUrl": "/u1/", "sectionId": "s1", "content": "<p>x</p>" },
            { "id": "n_3" },
            { "title": "sense id" },
            "brossa"
        ])
        .to_string();
        let parsed = parse_import(&raw).unwrap();
        assert_eq!(parsed.source, ImportSource::NoteList);
        assert_eq!(parsed.skipped, 3);

        let old = &parsed.notes[0];
        assert_eq!(old.note_title, "Vell");
        assert_eq!(old.unitat, Some(2));
        assert_eq!(old.section_id, "intro");
        assert!(old.created_at.is_some());
        assert!(old.extra.is_empty());
    }

    #[test]
    fn legacy_container() {
        let raw = json!({ "version": 2, "notes": [{ "id": "n_1", "content": "a" }] }).to_string();
        let parsed = parse_import(&raw).unwrap();
        assert_eq!(parsed.source, ImportSource::NoteList);
        assert_eq!(parsed.notes.len(), 1);
    }

    #[test]
    fn current_name_wins_over_alias() {
        let raw = json!([{ "id": "n_1", "title": "vell", "noteTitle": "nou" }]).to_string();
        assert_eq!(parse_import(&raw).unwrap().notes[0].note_title, "nou");
    }

    #[test]
    fn export_document_keeps_empty_notes() {
        let raw = json!({
            "metadata": { "version": "2.0" },
            "notes": [{ "id": "n_1", "noteTitle": "", "content": "" }]
        })
        .to_string();
        let parsed = parse_import(&raw).unwrap();
        assert_eq!(parsed.source, ImportSource::ExportDocument);
        assert_eq!(parsed.notes.len(), 1);
    }

    #[test]
    fn full_state() {
        let raw = json!({
            "schemaVersion": 1,
            "notes": { "byId": { "n_1": { "id": "n_1", "pageUrl": "/p", "sectionId": "s" } }, "bySection": {} }
        })
        .to_string();
        let parsed = parse_import(&raw).unwrap();
        assert_eq!(parsed.source, ImportSource::StoreState);
        assert_eq!(parsed.notes[0].section_key(), "/p#s");
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(matches!(parse_import("nope"), Err(ImportError::Parse(_))));
        assert!(matches!(parse_import("42"), Err(ImportError::UnrecognizedShape(_))));
        assert!(matches!(parse_import("{\"a\":1}"), Err(ImportError::UnrecognizedShape(_))));
        assert!(matches!(
            parse_import("{\"notes\":{\"x\":1}}"),
            Err(ImportError::UnrecognizedShape(_))
        ));
    }

    fn store() -> NoteStore<MemoryStorage> {
        NoteStore::new(MemoryStorage::new()).with_clock(FixedClock::at_millis(1_700_000_000_000))
    }

    fn list(notes: serde_json::Value) -> ParsedImport {
        parse_import(&notes.to_string()).unwrap()
    }

    #[test]
    fn overwrite_replaces_and_relocates() {
        let store = store();
        let mut state = store.load();
        store.upsert_note(
            &mut state,
            Note {
                id: "n_1".into(),
                content: "vell".into(),
                ..Note::new("/p", "a")
            },
        );

        let parsed = list(json!([
            { "id": "n_1", "pageUrl": "/p", "sectionId": "b", "content": "nou" },
            { "id": "n_2", "pageUrl": "/p", "sectionId": "a", "content": "altre" }
        ]));
        let report = store.import_notes(&mut state, parsed, ImportPolicy::Overwrite);

        assert_eq!(report, ImportReport { imported: 1, replaced: 1, reassigned: 0, skipped: 0 });
        assert_eq!(state.notes.get("n_1").unwrap().content, "nou");
        assert_eq!(store.count_for_section(&state, "/p", "a"), 1);
        assert_eq!(store.count_for_section(&state, "/p", "b"), 1);
        assert!(state.notes.check().is_empty());
    }

    #[test]
    fn keep_both_assigns_fresh_id() {
        let store = store();
        let mut state = store.load();
        store.upsert_note(
            &mut state,
            Note {
                id: "n_1".into(),
                content: "vell".into(),
                ..Note::new("/p", "a")
            },
        );

        let parsed = list(json!([{ "id": "n_1", "pageUrl": "/p", "sectionId": "a", "content": "nou" }]));
        let report = store.import_notes(&mut state, parsed, ImportPolicy::KeepBoth);

        assert_eq!(report.reassigned, 1);
        assert_eq!(report.stored(), 1);
        assert_eq!(state.notes.len(), 2);
        assert_eq!(state.notes.get("n_1").unwrap().content, "vell");
        assert!(state.notes.get("n_1700000000000").is_some());
    }

    #[test]
    fn legacy_key_is_read() {
        let store = store();
        assert!(store.load_legacy().notes.is_empty());

        store
            .storage()
            .set_item("notes-v1", &json!({ "notes": [{ "id": "n_9", "content": "x" }] }).to_string())
            .unwrap();
        assert_eq!(store.load_legacy().notes.len(), 1);

        store.storage().set_item("notes-v1", "{trencat").unwrap();
        assert!(store.load_legacy().notes.is_empty());
    }
}
