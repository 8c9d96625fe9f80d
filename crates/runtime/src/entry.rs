//! The structured form of one journal item and its wire representation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item pulled out of a daily note.
///
/// Every field is individually optional; construction validates nothing.
/// Whether an entry is worth keeping is decided by [`Entry::is_valid`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Entry {
    pub title: Option<String>,
    /// URL or vault-internal `[[link]]`.
    pub link: Option<String>,
    pub description: Option<String>,
    /// In order of appearance; duplicates are kept.
    pub tags: Vec<String>,
    pub todo: Option<String>,
}

impl Entry {
    /// An entry needs at least a title or a link to become a note.
    pub fn is_valid(&self) -> bool {
        self.title.is_some() || self.link.is_some()
    }

    /// Title, falling back to the link.
    pub fn display_name(&self) -> Option<&str> {
        self.title.as_deref().or(self.link.as_deref())
    }
}

/// Free-function form of [`Entry::is_valid`], handy as a filter predicate.
pub fn is_valid(entry: &Entry) -> bool {
    entry.is_valid()
}

// ── Wire format ──────────────────────────────────────────────────────────────

/// A single entry as the model returns it.  Absent keys, explicit `null` and
/// blank strings are all accepted and all mean "not present".
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename = "Entry")]
pub(crate) struct WireEntry {
    /// The title of the entry (optional, null if not present)
    #[serde(default)]
    title: Option<String>,
    /// URL or markdown link related to the entry (optional, null if not present)
    #[serde(default)]
    link: Option<String>,
    /// Brief description of the entry (optional, null if not present)
    #[serde(default)]
    description: Option<String>,
    /// Tags associated with the entry, without the leading '#' (default: empty list)
    #[serde(default)]
    tags: Option<Vec<String>>,
    /// Todo item related to the entry (optional, null if not present)
    #[serde(default)]
    todo: Option<String>,
}

/// Entries in order of appearance in the note.
#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct ExtractionResponse {
    entries: Vec<WireEntry>,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

impl From<WireEntry> for Entry {
    fn from(wire: WireEntry) -> Self {
        let tags = wire
            .tags
            .unwrap_or_default()
            .into_iter()
            .map(|tag| tag.trim().trim_start_matches('#').trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();

        Self {
            title: present(wire.title),
            link: present(wire.link),
            description: present(wire.description),
            tags,
            todo: present(wire.todo),
        }
    }
}

/// JSON Schema sent to the backend alongside the extraction prompt.
pub(crate) fn response_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(ExtractionResponse)).unwrap_or_default()
}

/// Decode a backend reply.  Accepts the `{"entries": [...]}` object and, as
/// an equivalent form, a bare top-level array of entries.
pub(crate) fn parse_entries(value: Value) -> Result<Vec<Entry>, serde_json::Error> {
    let wire = if value.is_array() {
        serde_json::from_value::<Vec<WireEntry>>(value)?
    } else {
        serde_json::from_value::<ExtractionResponse>(value)?.entries
    };
    Ok(wire.into_iter().map(Entry::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(title: Option<&str>, link: Option<&str>) -> Entry {
        Entry {
            title: title.map(str::to_string),
            link: link.map(str::to_string),
            ..Entry::default()
        }
    }

    #[test]
    fn validity_requires_title_or_link() {
        for (title, link) in [
            (None, None),
            (Some("t"), None),
            (None, Some("https://l")),
            (Some("t"), Some("https://l")),
        ] {
            let e = entry(title, link);
            assert_eq!(e.is_valid(), title.is_some() || link.is_some());
            assert_eq!(is_valid(&e), e.is_valid());
        }
    }

    #[test]
    fn description_alone_is_invalid() {
        let e = Entry {
            description: Some("only words".into()),
            tags: vec!["x".into()],
            todo: Some("do it".into()),
            ..Entry::default()
        };
        assert!(!e.is_valid());
    }

    #[test]
    fn display_name_prefers_title() {
        assert_eq!(entry(Some("T"), Some("L")).display_name(), Some("T"));
        assert_eq!(entry(None, Some("L")).display_name(), Some("L"));
        assert_eq!(entry(None, None).display_name(), None);
    }

    #[test]
    fn equality_is_structural() {
        let mut a = entry(Some("T"), None);
        let b = a.clone();
        assert_eq!(a, b);
        a.tags.push("x".into());
        assert_ne!(a, b);
    }

    #[test]
    fn omitted_null_and_blank_fields_are_equivalent() {
        let omitted = parse_entries(json!({"entries": [{"title": "A"}]})).unwrap();
        let nulls = parse_entries(json!({"entries": [{
            "title": "A", "link": null, "description": null, "tags": null, "todo": null
        }]}))
        .unwrap();
        let blanks = parse_entries(json!({"entries": [{
            "title": "A", "link": "", "description": "  ", "tags": [], "todo": ""
        }]}))
        .unwrap();

        assert_eq!(omitted, nulls);
        assert_eq!(omitted, blanks);
        assert_eq!(omitted[0], entry(Some("A"), None));
    }

    #[test]
    fn tags_lose_hash_prefix_and_blanks() {
        let raw = json!({"entries": [{"link": "x", "tags": ["#rust", " tokio ", "", "#"]}]});
        let parsed = parse_entries(raw).unwrap();
        assert_eq!(parsed[0].tags, vec!["rust", "tokio"]);
    }

    #[test]
    fn bare_array_is_accepted_and_order_kept() {
        let parsed = parse_entries(json!([{"title": "1"}, {"title": "2"}, {"link": "3"}])).unwrap();
        let names: Vec<_> = parsed.iter().filter_map(Entry::display_name).collect();
        assert_eq!(names, vec!["1", "2", "3"]);
    }

    #[test]
    fn invalid_entries_are_still_returned() {
        let parsed = parse_entries(json!({"entries": [{"description": "orphan"}]})).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(!parsed[0].is_valid());
    }

    #[test]
    fn wrong_shapes_are_errors() {
        assert!(parse_entries(json!({"items": []})).is_err());
        assert!(parse_entries(json!({"entries": [{"tags": "not-a-list"}]})).is_err());
        assert!(parse_entries(json!("text")).is_err());
    }

    #[test]
    fn schema_describes_every_field() {
        let schema = response_schema();
        let text = schema.to_string();
        assert!(schema.get("properties").and_then(|p| p.get("entries")).is_some());
        for field in ["title", "link", "description", "tags", "todo"] {
            assert!(text.contains(&format!("\"{field}\"")), "schema missing {field}");
        }
    }

    #[test]
    fn entry_serde_roundtrip_tolerates_missing_tags() {
        let e: Entry = serde_json::from_value(json!({"title": "x"})).unwrap();
        assert!(e.tags.is_empty());
        let back: Entry = serde_json::from_str(&serde_json::to_string(&e).unwrap()).unwrap();
        assert_eq!(back, e);
    }
}
