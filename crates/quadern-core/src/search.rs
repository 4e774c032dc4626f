//! Note search and list formatting.

use std::cmp::Reverse;

use lazy_static::lazy_static;
use quadern_tags::{parse_tag_path, TagQuery};
use regex::Regex;
use serde_json::Value;

use crate::note::Note;
use crate::state::StoreState;

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref MD_HEADING: Regex = Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+").unwrap();
    static ref MD_BOLD: Regex = Regex::new(r"\*\*(.*?)\*\*").unwrap();
    static ref MD_ITALIC: Regex = Regex::new(r"\*(.*?)\*").unwrap();
    static ref MD_CODE: Regex = Regex::new(r"`(.*?)`").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Shown instead of a preview when a note has no text.
pub const EMPTY_PREVIEW: &str = "Sense contingut";

/// Criteria for [`search`]. Every set criterion must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteFilter {
    /// Case-insensitive substring of title, content and tags. Empty matches all.
    pub text: String,
    pub tags: Option<TagQuery>,
    pub unitat: Option<u32>,
    pub bloc: Option<u32>,
    pub page_url: Option<String>,
}

impl NoteFilter {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Filter saved by the UI in `state.filters` (`{q, tags}`).
    ///
    /// `tags` is a list of tags that must all be present.
    pub fn from_persisted(filters: &Value) -> Self {
        let text = filters
            .get("q")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let required: Vec<TagQuery> = filters
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .filter_map(parse_tag_path)
                    .map(TagQuery::Has)
                    .collect()
            })
            .unwrap_or_default();

        let tags = match required.len() {
            0 => None,
            1 => required.into_iter().next(),
            _ => Some(TagQuery::All(required)),
        };

        Self {
            text,
            tags,
            ..Self::default()
        }
    }

    pub fn matches(&self, note: &Note) -> bool {
        if let Some(unitat) = self.unitat {
            if note.unitat != Some(unitat) {
                return false;
            }
        }
        if let Some(bloc) = self.bloc {
            if note.bloc != Some(bloc) {
                return false;
            }
        }
        if let Some(page_url) = &self.page_url {
            if note.page_url != *page_url {
                return false;
            }
        }
        if let Some(query) = &self.tags {
            if !query.matches(&note.tags) {
                return false;
            }
        }
        let needle = self.text.trim().to_lowercase();
        needle.is_empty() || searchable_text(note).contains(&needle)
    }
}

fn searchable_text(note: &Note) -> String {
    format!("{} {} {}", note.note_title, note.content, note.tags.join(" ")).to_lowercase()
}

/// Notes matching `filter`, most recently edited first, ties by id.
pub fn search<'a>(state: &'a StoreState, filter: &NoteFilter) -> Vec<&'a Note> {
    let mut found: Vec<&Note> = state.notes.iter().filter(|n| filter.matches(n)).collect();
    found.sort_by(|a, b| {
        Reverse(a.last_edit())
            .cmp(&Reverse(b.last_edit()))
            .then_with(|| a.id.cmp(&b.id))
    });
    found
}

/// Plain-text preview of note content.
///
/// HTML tags and markdown markers are removed and whitespace collapsed.
/// Longer text is cut at `max_chars` characters and ends in `...`.
pub fn content_preview(content: &str, max_chars: usize) -> String {
    let text = HTML_TAG.replace_all(content, " ");
    let text = MD_HEADING.replace_all(&text, "");
    let text = MD_BOLD.replace_all(&text, "$1");
    let text = MD_ITALIC.replace_all(&text, "$1");
    let text = MD_CODE.replace_all(&text, "$1");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = text.trim();

    if text.is_empty() {
        return EMPTY_PREVIEW.to_string();
    }
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Course location label: `U1 - B2`, `Unitat 1`, or empty.
pub fn format_location(note: &Note) -> String {
    match (note.unitat, note.bloc) {
        (Some(u), Some(b)) => format!("U{} - B{}", u, b),
        (Some(u), None) => format!("Unitat {}", u),
        _ => String::new(),
    }
}
