use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // A tag starts at the beginning of the text or after whitespace.  The
        // character after `#` may not be `#` or a space, so markdown headings
        // (`# Title`, `## Section`) never match.
        Regex::new(r"(?:^|\s)#([\p{L}\p{N}_][\p{L}\p{N}_/-]*)").expect("static tag regex")
    })
}

/// Collect the `#tags` used in a markdown document, without the leading `#`.
///
/// Purely numeric tokens (`#1`, `#2024`) are not tags in Obsidian and are
/// skipped.  Trailing `/` and `-` are trimmed so `#tag/` reads as `tag`.
pub fn extract_tags(content: &str) -> BTreeSet<String> {
    tag_pattern()
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches(['/', '-']).to_string())
        .filter(|tag| !tag.is_empty() && !tag.chars().all(|ch| ch.is_ascii_digit()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(content: &str) -> Vec<String> {
        extract_tags(content).into_iter().collect()
    }

    #[test]
    fn finds_inline_tags() {
        assert_eq!(tags("Content with #tag1 and #tag2"), vec!["tag1", "tag2"]);
    }

    #[test]
    fn tag_at_start_of_text_and_line() {
        assert_eq!(tags("#first word\n#second"), vec!["first", "second"]);
    }

    #[test]
    fn headings_are_not_tags() {
        assert!(tags("# Title\n\n## Section\n### Deeper").is_empty());
    }

    #[test]
    fn url_fragments_are_not_tags() {
        assert!(tags("see https://example.com/page#anchor").is_empty());
    }

    #[test]
    fn nested_and_dashed_tags() {
        assert_eq!(
            tags("#project/scribe #to-read #to-read"),
            vec!["project/scribe", "to-read"]
        );
    }

    #[test]
    fn numeric_only_tokens_are_skipped() {
        assert_eq!(tags("issue #42 and #2024 but #y2024"), vec!["y2024"]);
    }

    #[test]
    fn trailing_punctuation_is_not_part_of_tag() {
        assert_eq!(tags("tagged #rust, #tokio."), vec!["rust", "tokio"]);
    }
}
