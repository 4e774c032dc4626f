//! Dashboard statistics and the course outline.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use lazy_static::lazy_static;
use quadern_tags::{collect_usage, parse_tag_path, TagUsage};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::note::{Note, NoteId};
use crate::search::{search, NoteFilter};
use crate::state::StoreState;

/// Aggregate numbers shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteStats {
    pub total: usize,
    /// Sections with at least one note
    pub sections_with_notes: usize,
    pub tagged_notes: usize,
    pub distinct_tags: usize,
    pub by_unit: BTreeMap<u32, usize>,
    pub without_unit: usize,
    pub last_edit: Option<DateTime<Utc>>,
    /// Size of the serialized notes table
    pub storage_bytes: usize,
}

impl NoteStats {
    pub fn compute(state: &StoreState) -> Self {
        let mut stats = NoteStats {
            total: state.notes.len(),
            ..Self::default()
        };

        for note in state.notes.iter() {
            if !note.tags.is_empty() {
                stats.tagged_notes += 1;
            }
            match note.unitat {
                Some(u) => *stats.by_unit.entry(u).or_default() += 1,
                None => stats.without_unit += 1,
            }
            stats.last_edit = stats.last_edit.max(note.last_edit());
        }

        stats.sections_with_notes = state
            .notes
            .by_section
            .values()
            .filter(|ids| ids.iter().any(|id| state.notes.by_id.contains_key(id)))
            .count();
        stats.distinct_tags = tag_usage(state).len();
        stats.storage_bytes = serde_json::to_string(&state.notes)
            .map(|s| s.len())
            .unwrap_or(0);
        stats
    }
}

/// Tag usage across all notes, most used first.
pub fn tag_usage(state: &StoreState) -> Vec<TagUsage> {
    collect_usage(state.notes.iter().map(|n| (n.tags.as_slice(), n.last_edit())))
}

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    // `#` must start a word, so `C#` and `&#39;` are not tags
    static ref HASHTAG: Regex = Regex::new(r"(?:^|[^\w&#/])#(\w+)").unwrap();
}

/// A tag and how often it occurs, for the dashboard tag cloud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularTag {
    pub tag: String,
    pub count: usize,
}

/// `#hashtags` written inside a note's content, lowercased, without the `#`.
pub fn content_hashtags(content: &str) -> Vec<String> {
    let text = HTML_TAG.replace_all(content, " ");
    HASHTAG
        .captures_iter(&text)
        .map(|caps| caps[1].to_lowercase())
        .collect()
}

/// The `limit` most frequent tags, lowercased.
///
/// Counts every entry of the `tags` field plus every `#hashtag` in the
/// content. Ties are broken alphabetically.
pub fn popular_tags(state: &StoreState, limit: usize) -> Vec<PopularTag> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for note in state.notes.iter() {
        let field = note
            .tags
            .iter()
            .filter_map(|raw| parse_tag_path(raw))
            .map(|tag| tag.to_lowercase());
        for tag in field.chain(content_hashtags(&note.content)) {
            *counts.entry(tag).or_default() += 1;
        }
    }

    let mut popular: Vec<PopularTag> = counts
        .into_iter()
        .map(|(tag, count)| PopularTag { tag, count })
        .collect();
    popular.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    popular.truncate(limit);
    popular
}

/// Notes created on one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDay {
    pub date: NaiveDate,
    /// Catalan weekday abbreviation (`Dl`, `Dt`, ...)
    pub label: String,
    pub count: usize,
}

const WEEKDAYS: [&str; 7] = ["Dg", "Dl", "Dt", "Dc", "Dj", "Dv", "Ds"];

/// Notes per day for the `days` days ending today, oldest first.
///
/// A note counts on the day of `createdAt`, or of `updatedAt` when it has no
/// creation time. Notes with neither are not counted.
pub fn activity(state: &StoreState, now: DateTime<Utc>, days: usize) -> Vec<ActivityDay> {
    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    for note in state.notes.iter() {
        if let Some(at) = note.created_at.or(note.updated_at) {
            *per_day.entry(at.date_naive()).or_default() += 1;
        }
    }

    let today = now.date_naive();
    (0..days)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back as i64);
            ActivityDay {
                date,
                label: WEEKDAYS[date.weekday().num_days_from_sunday() as usize].to_string(),
                count: per_day.get(&date).copied().unwrap_or(0),
            }
        })
        .collect()
}

/// `512 B`, `1.5 KB`, `2.0 MB`.
pub fn format_storage_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * 1024;
    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// The `limit` most recently edited notes.
pub fn recent_notes(state: &StoreState, limit: usize) -> Vec<&Note> {
    let mut notes = search(state, &NoteFilter::default());
    notes.truncate(limit);
    notes
}

/// Catalan relative time: `Ara mateix`, `Fa 5 minuts`, `Fa 3 hores`,
/// `Fa 2 dies`, then the plain date after a week.
pub fn format_relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - then;
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "Ara mateix".to_string()
    } else if minutes < 60 {
        format!("Fa {} minuts", minutes)
    } else if hours < 24 {
        format!("Fa {} hores", hours)
    } else if days < 7 {
        format!("Fa {} dies", days)
    } else {
        then.format("%Y-%m-%d").to_string()
    }
}

/// Notes arranged as unit → bloc → section.
///
/// Units and blocs are in numeric order with missing coordinates last;
/// sections are in section-key order; notes keep index order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CourseOutline {
    pub units: Vec<UnitOutline>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitOutline {
    pub unitat: Option<u32>,
    pub label: String,
    pub blocs: Vec<BlocOutline>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlocOutline {
    pub bloc: Option<u32>,
    pub label: String,
    pub sections: Vec<SectionOutline>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionOutline {
    pub page_url: String,
    pub section_id: String,
    pub title: String,
    pub notes: Vec<NoteId>,
}

/// Sort key putting `None` after every number.
fn slot(coordinate: Option<u32>) -> (bool, u32) {
    (coordinate.is_none(), coordinate.unwrap_or(0))
}

fn label(name: &str, coordinate: Option<u32>) -> String {
    match coordinate {
        Some(n) => format!("{} {}", name, n),
        None => format!("{} ?", name),
    }
}

type SectionMap<'a> = BTreeMap<String, Vec<&'a Note>>;

impl CourseOutline {
    pub fn build(state: &StoreState) -> Self {
        let mut tree: BTreeMap<(bool, u32), BTreeMap<(bool, u32), SectionMap<'_>>> = BTreeMap::new();

        for (key, ids) in &state.notes.by_section {
            for id in ids {
                let Some(note) = state.notes.get(id) else {
                    continue;
                };
                if note.section_key() != *key {
                    continue;
                }
                tree.entry(slot(note.unitat))
                    .or_default()
                    .entry(slot(note.bloc))
                    .or_default()
                    .entry(key.clone())
                    .or_default()
                    .push(note);
            }
        }

        let unslot = |(missing, n): (bool, u32)| if missing { None } else { Some(n) };
        let units = tree
            .into_iter()
            .map(|(u, blocs)| UnitOutline {
                unitat: unslot(u),
                label: label("Unitat", unslot(u)),
                blocs: blocs
                    .into_iter()
                    .map(|(b, sections)| BlocOutline {
                        bloc: unslot(b),
                        label: label("Bloc", unslot(b)),
                        sections: sections.into_values().map(section_outline).collect(),
                    })
                    .collect(),
            })
            .collect();

        CourseOutline { units }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Total notes in the outline.
    pub fn note_count(&self) -> usize {
        self.units
            .iter()
            .flat_map(|u| &u.blocs)
            .flat_map(|b| &b.sections)
            .map(|s| s.notes.len())
            .sum()
    }
}

// Callers guarantee `notes` is non-empty.
fn section_outline(notes: Vec<&Note>) -> SectionOutline {
    let first = notes[0];
    let title = if first.section_title.trim().is_empty() {
        first.section_id.clone()
    } else {
        first.section_title.clone()
    };
    SectionOutline {
        page_url: first.page_url.clone(),
        section_id: first.section_id.clone(),
        title,
        notes: notes.iter().map(|n| n.id.clone()).collect(),
    }
}
