//! Section metadata supplied by the page discovery layer.
//!
//! Discovery (scraping headings out of rendered pages) lives outside this
//! crate. Notes only keep the section id and a snapshot of its title.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::note::Note;

/// A heading-anchored region of a documentation page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionInfo {
    pub id: String,
    pub title: String,
    pub page_url: String,
    pub order: u32,
}

/// Course-structure coordinates of a page (`page-unitat` / `page-bloc` metadata).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseCoordinates {
    pub unitat: Option<u32>,
    pub bloc: Option<u32>,
}

/// Source of section metadata.
pub trait SectionProvider {
    fn section(&self, page_url: &str, section_id: &str) -> Option<SectionInfo>;

    /// Sections of a page in document order.
    fn sections(&self, page_url: &str) -> Vec<SectionInfo>;
}

/// Section metadata held in memory, e.g. loaded from a site map.
#[derive(Debug, Clone, Default)]
pub struct StaticSections {
    by_page: HashMap<String, Vec<SectionInfo>>,
}

impl StaticSections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a section (matched by page and id).
    pub fn insert(&mut self, section: SectionInfo) {
        let sections = self.by_page.entry(section.page_url.clone()).or_default();
        sections.retain(|s| s.id != section.id);
        sections.push(section);
        sections.sort_by_key(|s| s.order);
    }
}

impl SectionProvider for StaticSections {
    fn section(&self, page_url: &str, section_id: &str) -> Option<SectionInfo> {
        self.by_page
            .get(page_url)?
            .iter()
            .find(|s| s.id == section_id)
            .cloned()
    }

    fn sections(&self, page_url: &str) -> Vec<SectionInfo> {
        self.by_page.get(page_url).cloned().unwrap_or_default()
    }
}

/// Page URL as the overlay computes it: site base path followed by the location path.
pub fn page_url(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') && path.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    } else {
        format!("{}{}", base_url, path)
    }
}

impl Note {
    /// An unsaved note carrying a snapshot of the section's metadata.
    pub fn for_section(section: &SectionInfo, coords: CourseCoordinates, now: DateTime<Utc>) -> Self {
        let mut note = Note::new(section.page_url.clone(), section.id.clone());
        note.section_title = section.title.clone();
        note.unitat = coords.unitat;
        note.bloc = coords.bloc;
        note.stamp_created(now);
        note
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn section(page: &str, id: &str, order: u32) -> SectionInfo {
        SectionInfo {
            id: id.to_string(),
            title: format!("Títol {}", id),
            page_url: page.to_string(),
            order,
        }
    }

    #[test]
    fn static_sections_are_ordered() {
        let mut sections = StaticSections::new();
        sections.insert(section("/u1", "b", 2));
        sections.insert(section("/u1", "a", 1));
        let ids: Vec<String> = sections.sections("/u1").into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(sections.sections("/u2").is_empty());
    }

    #[test]
    fn insert_replaces_same_id() {
        let mut sections = StaticSections::new();
        sections.insert(section("/u1", "a", 1));
        let mut renamed = section("/u1", "a", 1);
        renamed.title = "Nou".into();
        sections.insert(renamed);
        assert_eq!(sections.sections("/u1").len(), 1);
        assert_eq!(sections.section("/u1", "a").unwrap().title, "Nou");
    }

    #[test]
    fn page_url_joins_base() {
        assert_eq!(page_url("/curs", "/u1/b1/"), "/curs/u1/b1/");
        assert_eq!(page_url("/curs/", "/u1/"), "/curs/u1/");
        assert_eq!(page_url("", "/u1/"), "/u1/");
    }

    #[test]
    fn note_snapshots_section() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let coords = CourseCoordinates { unitat: Some(1), bloc: Some(2) };
        let note = Note::for_section(&section("/u1", "intro", 1), coords, now);
        assert!(note.is_new());
        assert_eq!(note.section_key(), "/u1#intro");
        assert_eq!(note.section_title, "Títol intro");
        assert_eq!(note.unitat, Some(1));
        assert_eq!(note.bloc, Some(2));
        assert_eq!(note.created_at, Some(now));
    }
}
