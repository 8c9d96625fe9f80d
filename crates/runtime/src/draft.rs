//! Markdown rendering of a drafted note.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use scribe_vault::slugify;

use crate::entry::Entry;
use crate::review::Note;

/// An entry, the note drafted from it and the note's current content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedNote {
    pub original_entry: Entry,
    pub note: Note,
    pub content: String,
}

/// File name stem for the draft: title, else link, slugified.
pub fn draft_name(entry: &Entry) -> String {
    slugify(entry.display_name().unwrap_or("untitled"))
}

/// Render `entry` as an Obsidian note with YAML front matter.  String values
/// in the front matter are emitted as double-quoted scalars.
pub fn render_draft(entry: &Entry, source_note: &str, created_at: DateTime<Utc>) -> String {
    let mut out = String::from("---\n");
    out.push_str(&format!("title: {}\n", yaml_opt(entry.title.as_deref())));
    out.push_str(&format!("link: {}\n", yaml_opt(entry.link.as_deref())));
    out.push_str(&format!(
        "tags: [{}]\n",
        entry.tags.iter().map(|tag| yaml_str(tag)).collect::<Vec<_>>().join(", ")
    ));
    out.push_str(&format!("source: {}\n", yaml_str(source_note)));
    out.push_str(&format!(
        "created_at: {}\n",
        yaml_str(&created_at.to_rfc3339_opts(SecondsFormat::Secs, true))
    ));
    out.push_str("---\n\n");

    out.push_str(&format!("# {}\n", entry.display_name().unwrap_or("Untitled")));

    if let Some(description) = &entry.description {
        out.push_str(&format!("\n{description}\n"));
    }
    if let Some(link) = &entry.link {
        out.push_str(&format!("\nLink: {link}\n"));
    }
    if let Some(todo) = &entry.todo {
        out.push_str(&format!("\n## Todo\n\n- [ ] {todo}\n"));
    }
    if !entry.tags.is_empty() {
        let tags = entry
            .tags
            .iter()
            .map(|tag| format!("#{}", tag.replace(char::is_whitespace, "-")))
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&format!("\nTags: {tags}\n"));
    }
    out
}

// A JSON string literal is a valid YAML double-quoted scalar.
fn yaml_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value.replace('"', "'")))
}

fn yaml_opt(value: Option<&str>) -> String {
    value.map(yaml_str).unwrap_or_else(|| "null".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap()
    }

    fn full_entry() -> Entry {
        Entry {
            title: Some("Test 1".into()),
            link: Some("https://www.test1.com".into()),
            description: Some("A first test.".into()),
            tags: vec!["test".into(), "rust lang".into()],
            todo: Some("Read it".into()),
        }
    }

    #[test]
    fn renders_front_matter_and_body() {
        let rendered = render_draft(&full_entry(), "Daily/2024-01-01.md", at());
        let expected = "---\n\
            title: \"Test 1\"\n\
            link: \"https://www.test1.com\"\n\
            tags: [\"test\", \"rust lang\"]\n\
            source: \"Daily/2024-01-01.md\"\n\
            created_at: \"2024-01-01T09:30:00Z\"\n\
            ---\n\n\
            # Test 1\n\n\
            A first test.\n\n\
            Link: https://www.test1.com\n\n\
            ## Todo\n\n\
            - [ ] Read it\n\n\
            Tags: #test #rust-lang\n";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn link_only_entry_uses_link_as_heading() {
        let entry = Entry {
            link: Some("https://www.test3.com".into()),
            ..Entry::default()
        };
        let rendered = render_draft(&entry, "Daily/x.md", at());
        assert!(rendered.contains("title: null\n"));
        assert!(rendered.contains("tags: []\n"));
        assert!(rendered.contains("# https://www.test3.com\n"));
        assert!(!rendered.contains("## Todo"));
        assert!(!rendered.contains("Tags:"));
    }

    #[test]
    fn quotes_are_escaped_in_front_matter() {
        let entry = Entry {
            title: Some("Say \"hi\": now".into()),
            ..Entry::default()
        };
        let rendered = render_draft(&entry, "Daily/x.md", at());
        assert!(rendered.contains("title: \"Say \\\"hi\\\": now\"\n"));
    }

    #[test]
    fn draft_name_prefers_title_then_link() {
        assert_eq!(draft_name(&full_entry()), "test-1");
        let link_only = Entry {
            link: Some("https://www.test3.com".into()),
            ..Entry::default()
        };
        assert_eq!(draft_name(&link_only), "https-www-test3-com");
        assert_eq!(draft_name(&Entry::default()), "untitled");
    }
}
