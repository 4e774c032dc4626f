//! Tag suggestions for the editor's tag field.
//!
//! Ranking: recency, then shallow depth, then frequency, then alphabetical.

use chrono::{DateTime, Utc};

use crate::tag::TagUsage;

/// An autocomplete suggestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub path: String,
    pub use_count: u32,
    pub score: f64,
}

/// Autocomplete over the tags already used in the notebook.
pub struct AutocompleteEngine {
    tags: Vec<TagUsage>,
}

impl AutocompleteEngine {
    pub fn new(tags: Vec<TagUsage>) -> Self {
        Self { tags }
    }

    /// Replace the known tags, e.g. after notes were edited.
    pub fn update(&mut self, tags: Vec<TagUsage>) {
        self.tags = tags;
    }

    /// Suggest tags whose path or leaf starts with `prefix` (case-insensitive).
    ///
    /// Only the text after the last comma is used, so the whole tag field
    /// can be passed as typed.
    pub fn complete(&self, prefix: &str, limit: usize, now: DateTime<Utc>) -> Vec<Suggestion> {
        let needle = prefix.rsplit(',').next().unwrap_or(prefix).trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut suggestions: Vec<Suggestion> = self
            .tags
            .iter()
            .filter(|t| {
                t.path.to_lowercase().starts_with(&needle)
                    || t.leaf.to_lowercase().starts_with(&needle)
            })
            .map(|t| Suggestion {
                path: t.path.clone(),
                use_count: t.use_count,
                score: score(t, now),
            })
            .collect();

        suggestions.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
        });
        suggestions.truncate(limit);
        suggestions
    }
}

/// Recency is worth up to 50 points, shallowness up to 20, frequency up to 30.
fn score(tag: &TagUsage, now: DateTime<Utc>) -> f64 {
    let recency = match tag.last_used_at.map(|t| (now - t).num_days()) {
        Some(days) if days < 7 => 50.0,
        Some(days) if days < 30 => 25.0,
        _ => 0.0,
    };
    let shallowness = (20.0 - tag.depth as f64 * 5.0).max(0.0);
    let frequency = if tag.use_count > 0 {
        (tag.use_count as f64).ln().min(3.4) * (30.0 / 3.4)
    } else {
        0.0
    };
    recency + shallowness + frequency
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn usage(path: &str, use_count: u32, days_ago: Option<i64>) -> TagUsage {
        TagUsage {
            use_count,
            last_used_at: days_ago.map(|d| now() - Duration::days(d)),
            ..TagUsage::new(path)
        }
    }

    fn engine() -> AutocompleteEngine {
        AutocompleteEngine::new(vec![
            usage("examen", 8, Some(1)),
            usage("examen/final", 3, Some(40)),
            usage("exercicis", 1, None),
            usage("tema 1/resum", 2, Some(2)),
        ])
    }

    #[test]
    fn prefix_ranks_recent_root_first() {
        let results = engine().complete("ex", 10, now());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].path, "examen");
    }

    #[test]
    fn leaf_prefix_matches() {
        let results = engine().complete("res", 10, now());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "tema 1/resum");
    }

    #[test]
    fn uses_last_comma_segment() {
        let results = engine().complete("examen, exe", 10, now());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "exercicis");
    }

    #[test]
    fn limit_and_empty_prefix() {
        assert_eq!(engine().complete("e", 2, now()).len(), 2);
        assert!(engine().complete("  ", 10, now()).is_empty());
        assert!(engine().complete("examen,", 10, now()).is_empty());
    }

    #[test]
    fn update_replaces_tags() {
        let mut engine = engine();
        engine.update(vec![usage("lectura", 1, None)]);
        assert!(engine.complete("ex", 10, now()).is_empty());
        assert_eq!(engine.complete("lec", 10, now()).len(), 1);
    }
}
