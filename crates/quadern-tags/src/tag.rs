//! Tag usage records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parse::parse_tag_path;

/// A tag as it is used across a set of notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagUsage {
    pub path: String,
    pub leaf: String,
    pub depth: u32,
    /// Number of notes carrying the tag (a note counts once).
    pub use_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl TagUsage {
    /// Create an unused tag from an already normalized path.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            leaf: path.rsplit('/').next().unwrap_or(path).to_string(),
            depth: path.matches('/').count() as u32,
            use_count: 0,
            last_used_at: None,
        }
    }

    /// Parent path (`tema 1` for `tema 1/repàs`).
    pub fn parent_path(&self) -> Option<&str> {
        self.path.rfind('/').map(|i| &self.path[..i])
    }

    /// True when `other` lies strictly below this tag.
    pub fn is_ancestor_of(&self, other: &str) -> bool {
        is_below(other, &self.path)
    }

    /// Count one more note using the tag at `at`.
    pub fn record_use(&mut self, at: Option<DateTime<Utc>>) {
        self.use_count += 1;
        if at > self.last_used_at {
            self.last_used_at = at;
        }
    }
}

/// True when `path` is a strict descendant of `ancestor`.
pub(crate) fn is_below(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Aggregate tag usage over `(tags, last edit)` pairs, one pair per note.
///
/// Tags are normalized with [`parse_tag_path`] and compared ignoring case;
/// the first spelling seen is kept. A tag repeated on the same note counts
/// once. Sorted by use count (descending), then path.
pub fn collect_usage<'a, I>(tagged: I) -> Vec<TagUsage>
where
    I: IntoIterator<Item = (&'a [String], Option<DateTime<Utc>>)>,
{
    let mut by_path: HashMap<String, TagUsage> = HashMap::new();

    for (tags, edited_at) in tagged {
        let mut seen: Vec<String> = Vec::with_capacity(tags.len());
        for raw in tags {
            let Some(path) = parse_tag_path(raw) else {
                continue;
            };
            let folded = path.to_lowercase();
            if seen.contains(&folded) {
                continue;
            }
            by_path
                .entry(folded.clone())
                .or_insert_with(|| TagUsage::new(&path))
                .record_use(edited_at);
            seen.push(folded);
        }
    }

    let mut usage: Vec<TagUsage> = by_path.into_values().collect();
    usage.sort_by(|a, b| b.use_count.cmp(&a.use_count).then_with(|| a.path.cmp(&b.path)));
    usage
}
