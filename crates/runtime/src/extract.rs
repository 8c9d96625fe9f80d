//! The extraction service: raw note text in, ordered entries out.
//!
//! Extraction fails soft.  Whatever goes wrong on the backend side (transport
//! errors, non-JSON replies, replies that do not match the entry schema) is
//! logged and turned into an empty result; callers never see an error.

use std::sync::Arc;

use scraper::{ElementRef, Html, Node};
use serde_json::Value;

use scribe_llm::StructuredBackend;

use crate::entry::{Entry, parse_entries, response_schema};
use crate::prompt_builder::build_extraction_prompt;

pub struct EntryExtractor {
    backend: Arc<dyn StructuredBackend>,
    schema: Value,
}

impl EntryExtractor {
    pub fn new(backend: Arc<dyn StructuredBackend>) -> Self {
        Self {
            backend,
            schema: response_schema(),
        }
    }

    /// Schema sent with every request.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// All entries the backend found, in order of appearance, invalid ones
    /// included.  Empty on any failure.
    pub async fn extract(&self, note_text: &str) -> Vec<Entry> {
        self.extract_with_feedback(note_text, &[]).await
    }

    /// As [`extract`](Self::extract), with reviewer feedback folded into the
    /// prompt for a revision round.
    pub async fn extract_with_feedback(&self, note_text: &str, feedback: &[String]) -> Vec<Entry> {
        let text = normalize_note_text(note_text);
        if text.trim().is_empty() {
            tracing::debug!("empty note text, skipping extraction");
            return Vec::new();
        }

        let prompt = build_extraction_prompt(&text, feedback);
        let value = match self.backend.generate_structured(&prompt, &self.schema).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("extraction backend failed: {err:#}");
                return Vec::new();
            }
        };

        match parse_entries(value) {
            Ok(entries) => {
                tracing::info!(
                    entries = entries.len(),
                    revision = !feedback.is_empty(),
                    "entries extracted"
                );
                entries
            }
            Err(err) => {
                tracing::warn!("extraction reply did not match the entry schema: {err}");
                Vec::new()
            }
        }
    }
}

// ── HTML normalization ───────────────────────────────────────────────────────

const HTML_MARKERS: &[&str] = &["<p>", "<p ", "<div", "<li", "<br", "<ul", "<a href", "<h1", "<h2"];

/// Notes pasted from the web sometimes arrive as HTML.  Markdown passes
/// through untouched.
pub fn looks_like_html(text: &str) -> bool {
    let lower = text.trim_start().to_ascii_lowercase();
    lower.starts_with("<!doctype")
        || lower.starts_with("<html")
        || HTML_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Convert HTML note content to plain markdown-ish text: block elements
/// become lines, list items become `- ` bullets, headings keep their level
/// and anchors become `[label](href)`.  Non-HTML input is returned as-is.
pub fn normalize_note_text(text: &str) -> String {
    if !looks_like_html(text) {
        return text.to_string();
    }

    let fragment = Html::parse_fragment(text);
    let mut out = String::new();
    render_element(fragment.root_element(), &mut out);

    let mut lines: Vec<String> = Vec::new();
    for line in out.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && lines.last().map(|prev| prev.is_empty()).unwrap_or(true) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().map(|line| line.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

fn render_element(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if matches!(name, "script" | "style" | "head" | "title") {
        return;
    }

    let heading_level = match name {
        "h1" => 1,
        "h2" => 2,
        "h3" => 3,
        "h4" => 4,
        "h5" => 5,
        "h6" => 6,
        _ => 0,
    };
    let block = heading_level > 0
        || matches!(
            name,
            "p"
                | "div"
                | "br"
                | "li"
                | "ul"
                | "ol"
                | "tr"
                | "blockquote"
                | "pre"
                | "section"
                | "article"
        );

    if block {
        out.push('\n');
    }
    if name == "li" {
        out.push_str("- ");
    }
    if heading_level > 0 {
        out.push_str(&"#".repeat(heading_level));
        out.push(' ');
    }

    let start = out.len();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    render_element(child_element, out);
                }
            }
            _ => {}
        }
    }

    if name == "a" {
        if let Some(href) = element.value().attr("href") {
            let label = out[start..].split_whitespace().collect::<Vec<_>>().join(" ");
            out.truncate(start);
            if label.is_empty() || label == href {
                out.push_str(href);
            } else {
                out.push_str(&format!("[{label}]({href})"));
            }
        }
    }

    if block {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use serde_json::json;

    /// Replays canned replies and records every prompt it receives.
    struct CannedBackend {
        reply: Mutex<Option<Result<Value>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedBackend {
        fn new(reply: Result<Value>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StructuredBackend for CannedBackend {
        async fn generate_structured(&self, prompt: &str, _schema: &Value) -> Result<Value> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(anyhow!("no reply left")))
        }
    }

    #[tokio::test]
    async fn returns_parsed_entries_including_invalid_ones() {
        let backend = CannedBackend::new(Ok(json!({"entries": [
            {"title": "Test 1", "link": "https://www.test1.com", "tags": ["test"]},
            {"description": "no title or link"}
        ]})));
        let extractor = EntryExtractor::new(backend.clone());

        let entries = extractor.extract("- Test 1 https://www.test1.com #test").await;

        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_valid());
        assert!(!entries[1].is_valid());
        assert_eq!(backend.prompts().len(), 1);
    }

    #[tokio::test]
    async fn backend_error_yields_empty_result() {
        let backend = CannedBackend::new(Err(anyhow!("connection refused")));
        let extractor = EntryExtractor::new(backend);
        assert!(extractor.extract("some note").await.is_empty());
    }

    #[tokio::test]
    async fn malformed_reply_yields_empty_result() {
        for reply in [json!("just text"), json!({"entries": "nope"}), json!({"other": []})] {
            let extractor = EntryExtractor::new(CannedBackend::new(Ok(reply)));
            assert!(extractor.extract("some note").await.is_empty());
        }
    }

    #[tokio::test]
    async fn blank_input_skips_backend() {
        let backend = CannedBackend::new(Ok(json!({"entries": [{"title": "x"}]})));
        let extractor = EntryExtractor::new(backend.clone());
        assert!(extractor.extract("   \n\t").await.is_empty());
        assert!(backend.prompts().is_empty());
    }

    #[tokio::test]
    async fn feedback_reaches_the_prompt() {
        let backend = CannedBackend::new(Ok(json!({"entries": []})));
        let extractor = EntryExtractor::new(backend.clone());
        let feedback = vec!["Add the link".to_string()];

        extractor.extract_with_feedback("draft body", &feedback).await;

        let prompts = backend.prompts();
        assert!(prompts[0].contains("- Add the link"));
        assert!(prompts[0].contains("draft body"));
    }

    #[tokio::test]
    async fn html_is_normalized_before_prompting() {
        let backend = CannedBackend::new(Ok(json!({"entries": []})));
        let extractor = EntryExtractor::new(backend.clone());

        extractor
            .extract("<ul><li><a href=\"https://www.test1.com\">Test 1</a> first</li></ul>")
            .await;

        let prompt = &backend.prompts()[0];
        assert!(prompt.contains("- [Test 1](https://www.test1.com) first"));
        assert!(!prompt.contains("<li>"));
    }

    #[test]
    fn schema_is_an_object_schema() {
        let extractor = EntryExtractor::new(CannedBackend::new(Ok(Value::Null)));
        assert_eq!(extractor.schema()["type"], "object");
    }

    // ── normalize_note_text ────────────────────────────────────────────────

    #[test]
    fn markdown_passes_through() {
        let md = "# 2024-01-01\n\n- Test 1 <https://www.test1.com> #test";
        assert!(!looks_like_html("- plain <https://autolink.dev>"));
        assert_eq!(normalize_note_text(md), md);
    }

    #[test]
    fn html_blocks_become_lines() {
        let html = "<h2>Links</h2><p>First   para</p><div>Second<br>line</div><script>x()</script>";
        assert_eq!(
            normalize_note_text(html),
            "## Links\n\nFirst para\n\nSecond\n\nline"
        );
    }

    #[test]
    fn anchor_without_label_keeps_href() {
        let html = "<p><a href=\"https://x.dev\"></a></p>";
        assert_eq!(normalize_note_text(html), "https://x.dev");
    }
}
