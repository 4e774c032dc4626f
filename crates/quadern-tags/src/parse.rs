//! Tag input parsing.

/// Normalize a single tag.
///
/// - Trims whitespace, also around each `/` segment
/// - Replaces backslashes with forward slashes
/// - Drops empty segments (leading, trailing or doubled slashes)
///
/// # Examples
/// ```
/// use quadern_tags::parse_tag_path;
/// assert_eq!(parse_tag_path("  tema 1 / repàs "), Some("tema 1/repàs".to_string()));
/// assert_eq!(parse_tag_path("tema\\examen"), Some("tema/examen".to_string()));
/// assert_eq!(parse_tag_path(" / "), None);
/// ```
pub fn parse_tag_path(input: &str) -> Option<String> {
    let joined = input
        .replace('\\', "/")
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Parse the comma-separated tag field of the note editor.
///
/// Order is kept and duplicates are not removed; empty entries are skipped.
///
/// ```
/// use quadern_tags::parse_tag_list;
/// assert_eq!(parse_tag_list("examen, ,tema 1"), vec!["examen", "tema 1"]);
/// ```
pub fn parse_tag_list(input: &str) -> Vec<String> {
    input.split(',').filter_map(parse_tag_path).collect()
}

/// Render tags back into the editor's comma-separated form.
pub fn format_tag_list(tags: &[String]) -> String {
    tags.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_trimmed_per_segment() {
        assert_eq!(parse_tag_path(" a /  b "), Some("a/b".to_string()));
    }

    #[test]
    fn path_collapses_slashes() {
        assert_eq!(parse_tag_path("//a///b/"), Some("a/b".to_string()));
    }

    #[test]
    fn path_keeps_inner_spaces() {
        assert_eq!(parse_tag_path("tema 1"), Some("tema 1".to_string()));
    }

    #[test]
    fn empty_path() {
        assert_eq!(parse_tag_path(""), None);
        assert_eq!(parse_tag_path("   "), None);
        assert_eq!(parse_tag_path("\\/"), None);
    }

    #[test]
    fn list_keeps_order_and_duplicates() {
        assert_eq!(
            parse_tag_list("b, a, b"),
            vec!["b".to_string(), "a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn list_of_nothing() {
        assert!(parse_tag_list("").is_empty());
        assert!(parse_tag_list(" , ,, ").is_empty());
    }

    #[test]
    fn list_formats_back() {
        let tags = parse_tag_list("examen,  repàs");
        assert_eq!(format_tag_list(&tags), "examen, repàs");
    }
}
