//! Tag query expressions for filtering notes.

use serde::{Deserialize, Serialize};

use crate::parse::parse_tag_path;
use crate::tag::is_below;

/// A query over the tags of one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagQuery {
    /// Note has this tag or one below it
    Has(String),
    /// Note has neither this tag nor one below it
    Not(String),
    /// Every query must match
    All(Vec<TagQuery>),
    /// At least one query must match
    Any(Vec<TagQuery>),
}

/// Parse a tag filter.
///
/// Syntax:
/// - `tags:examen`: has tag (or a descendant such as `examen/final`)
/// - `-tags:examen`: does not have tag
/// - `tags:a+b`: has both
/// - `tags:a|b`: has either; `+` binds tighter, so `a+b|c` is `(a and b) or c`
///
/// Returns `None` for anything else, including empty operands.
pub fn parse_tag_query(input: &str) -> Option<TagQuery> {
    let input = input.trim();

    if let Some(rest) = input.strip_prefix("-tags:") {
        return parse_tag_path(rest).map(TagQuery::Not);
    }

    let rest = input.strip_prefix("tags:")?;
    let mut alternatives = Vec::new();
    for alternative in rest.split('|') {
        let mut required = Vec::new();
        for operand in alternative.split('+') {
            required.push(TagQuery::Has(parse_tag_path(operand)?));
        }
        alternatives.push(collapse(required, TagQuery::All));
    }
    Some(collapse(alternatives, TagQuery::Any))
}

fn collapse(mut parts: Vec<TagQuery>, wrap: fn(Vec<TagQuery>) -> TagQuery) -> TagQuery {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        wrap(parts)
    }
}

impl TagQuery {
    /// Test a note's tags. Comparison ignores case.
    pub fn matches(&self, tags: &[String]) -> bool {
        match self {
            TagQuery::Has(path) => has_tag(tags, path),
            TagQuery::Not(path) => !has_tag(tags, path),
            TagQuery::All(queries) => queries.iter().all(|q| q.matches(tags)),
            TagQuery::Any(queries) => queries.iter().any(|q| q.matches(tags)),
        }
    }
}

fn has_tag(tags: &[String], path: &str) -> bool {
    let wanted = path.to_lowercase();
    tags.iter().filter_map(|t| parse_tag_path(t)).any(|t| {
        let t = t.to_lowercase();
        t == wanted || is_below(&t, &wanted)
    })
}
