//! JSON and Markdown export of the notebook.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::note::Note;
use crate::search::format_location;
use crate::state::StoreState;
use crate::stats::CourseOutline;
use crate::wire::format_iso;

/// Version written into `metadata.version` of JSON exports.
pub const EXPORT_VERSION: &str = "2.0";

const UNTITLED: &str = "Nota sense títol";

lazy_static! {
    static ref PRE: Regex = Regex::new(r"(?s)<pre(?:\s[^>]*)?>(.*?)</pre>").unwrap();
    static ref P_OPEN: Regex = Regex::new(r"<p(?:\s[^>]*)?>").unwrap();
    static ref P_CLOSE: Regex = Regex::new(r"</p>").unwrap();
    static ref BR: Regex = Regex::new(r"<br\s*/?>").unwrap();
    static ref STRONG: Regex = Regex::new(r"<strong(?:\s[^>]*)?>(.*?)</strong>").unwrap();
    static ref EM: Regex = Regex::new(r"<em(?:\s[^>]*)?>(.*?)</em>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What to include in an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    pub include_timestamps: bool,
    /// Page, section and course coordinates
    pub include_metadata: bool,
    /// Markdown only: nest notes under unit, bloc and section headings
    pub group_by_structure: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_timestamps: true,
            include_metadata: true,
            group_by_structure: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub export_date: String,
    pub version: String,
    pub total_notes: usize,
}

/// `{metadata: {...}, notes: [...]}`, pretty-printed. Notes are in id order.
pub fn export_json(
    state: &StoreState,
    options: &ExportOptions,
    now: DateTime<Utc>,
) -> Result<String, ExportError> {
    let notes: Vec<Value> = state.notes.iter().map(|n| exported_note(n, options)).collect();
    let metadata = ExportMetadata {
        export_date: format_iso(&now),
        version: EXPORT_VERSION.to_string(),
        total_notes: notes.len(),
    };

    let mut doc = Map::new();
    doc.insert("metadata".into(), serde_json::to_value(metadata)?);
    doc.insert("notes".into(), Value::Array(notes));
    Ok(serde_json::to_string_pretty(&doc)?)
}

fn exported_note(note: &Note, options: &ExportOptions) -> Value {
    let mut out = Map::new();
    out.insert("id".into(), note.id.clone().into());
    out.insert("noteTitle".into(), note.note_title.clone().into());
    out.insert("content".into(), note.content.clone().into());
    out.insert("tags".into(), note.tags.clone().into());

    if options.include_metadata {
        out.insert("pageUrl".into(), note.page_url.clone().into());
        out.insert("sectionId".into(), note.section_id.clone().into());
        out.insert("sectionTitle".into(), note.section_title.clone().into());
        if let Some(unitat) = note.unitat {
            out.insert("unitat".into(), unitat.into());
        }
        if let Some(bloc) = note.bloc {
            out.insert("bloc".into(), bloc.into());
        }
    }

    if options.include_timestamps {
        if let Some(created) = &note.created_at {
            out.insert("createdAt".into(), format_iso(created).into());
        }
        if let Some(updated) = &note.updated_at {
            out.insert("updatedAt".into(), format_iso(updated).into());
        }
    }
    Value::Object(out)
}

/// Markdown document of every note.
pub fn export_markdown(state: &StoreState, options: &ExportOptions, now: DateTime<Utc>) -> String {
    let mut md = String::from("# Quadern de Notes\n\n");
    md.push_str(&format!("Exportat el {}\n", now.format("%Y-%m-%d")));
    md.push_str(&format!("Total de notes: {}\n\n---\n\n", state.notes.len()));

    if options.group_by_structure {
        for unit in CourseOutline::build(state).units {
            md.push_str(&format!("## {}\n\n", unit.label));
            for bloc in unit.blocs {
                md.push_str(&format!("### {}\n\n", bloc.label));
                for section in bloc.sections {
                    md.push_str(&format!("#### {}\n\n", section.title));
                    for note in section.notes.iter().filter_map(|id| state.notes.get(id)) {
                        md.push_str(&format!("**{}**\n\n", title_of(note)));
                        md.push_str(&format!("{}\n\n", html_to_markdown(&note.content)));
                        if options.include_timestamps {
                            if let Some(created) = note.created_at {
                                md.push_str(&format!("*Creat: {}*\n\n", created.format("%Y-%m-%d")));
                            }
                        }
                        md.push_str("---\n\n");
                    }
                }
            }
        }
    } else {
        for note in state.notes.iter() {
            md.push_str(&format!("## {}\n\n", title_of(note)));
            md.push_str(&format!("{}\n\n", html_to_markdown(&note.content)));
            if options.include_metadata {
                let section = if note.section_title.is_empty() {
                    &note.section_id
                } else {
                    &note.section_title
                };
                let location = format_location(note);
                if location.is_empty() {
                    md.push_str(&format!("**Ubicació:** {}\n\n", section));
                } else {
                    md.push_str(&format!("**Ubicació:** {} - {}\n\n", location, section));
                }
            }
            if options.include_timestamps {
                if let Some(created) = note.created_at {
                    md.push_str(&format!("**Creat:** {}\n\n", created.format("%Y-%m-%d")));
                }
            }
            md.push_str("---\n\n");
        }
    }
    md
}

fn title_of(note: &Note) -> &str {
    if note.note_title.trim().is_empty() {
        UNTITLED
    } else {
        &note.note_title
    }
}

/// Convert the editor's simple HTML to Markdown. Unknown tags are dropped.
pub fn html_to_markdown(html: &str) -> String {
    let text = PRE.replace_all(html, |caps: &Captures| {
        let code = ANY_TAG.replace_all(&caps[1], "");
        format!("\n```\n{}\n```\n\n", code.trim_matches('\n'))
    });
    let text = P_OPEN.replace_all(&text, "");
    let text = P_CLOSE.replace_all(&text, "\n\n");
    let text = BR.replace_all(&text, "\n");
    let text = STRONG.replace_all(&text, "**$1**");
    let text = EM.replace_all(&text, "*$1*");
    let text = ANY_TAG.replace_all(&text, "");
    text.trim().to_string()
}
