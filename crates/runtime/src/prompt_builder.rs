//! Prompt assembly for the extraction call.
//!
//! The prompt carries three blocks: the field contract, the note text, and
//! (on revision rounds) the reviewer's feedback.

// ─── public entry point ──────────────────────────────────────────────────────

/// Field-by-field contract mirrored from the JSON Schema, phrased for the
/// model.  Kept next to the prompt so the wording stays in one place.
const FIELD_CONTRACT: &[(&str, &str)] = &[
    ("title", "string or null. Short title of the entry. Null if the entry has none."),
    ("link", "string or null. URL or [[wiki link]] exactly as written. Null if absent."),
    ("description", "string or null. One or two sentences describing the entry. Null if absent."),
    ("tags", "array of strings. Tags without the leading '#'. Empty array if there are none."),
    ("todo", "string or null. Follow-up action the author noted for this entry. Null if absent."),
];

/// Assemble the extraction prompt for `note_text`, appending `feedback`
/// lines when a reviewer asked for a revision.
pub fn build_extraction_prompt(note_text: &str, feedback: &[String]) -> String {
    format!(
        "Extract entries from the following daily note content. Each entry should have at \
         least a title or a link, and may include a description, tags, and an optional todo item.\n\
         List entries in the order they appear in the note. Do not invent entries or fields \
         that are not in the note.\n\n\
         Respond with a single JSON object of the form {{\"entries\": [ ... ]}} where each \
         entry has these fields:\n{fields}{feedback}\n\n\
         DAILY NOTE CONTENT:\n{note}",
        fields = build_field_block(),
        feedback = build_feedback_block(feedback),
        note = note_text.trim(),
    )
}

// ─── block builders ──────────────────────────────────────────────────────────

fn build_field_block() -> String {
    FIELD_CONTRACT
        .iter()
        .map(|(name, rule)| format!("- {name}: {rule}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_feedback_block(feedback: &[String]) -> String {
    let items = feedback
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| format!("- {line}"))
        .collect::<Vec<_>>();
    if items.is_empty() {
        return String::new();
    }
    format!(
        "\n\nREVIEWER FEEDBACK (a previous draft was sent back; apply every point):\n{}",
        items.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_note_and_every_field() {
        let prompt = build_extraction_prompt("- [Test 1](https://www.test1.com)", &[]);
        assert!(prompt.contains("DAILY NOTE CONTENT:\n- [Test 1](https://www.test1.com)"));
        for (field, _) in FIELD_CONTRACT {
            assert!(prompt.contains(&format!("- {field}: ")));
        }
        assert!(!prompt.contains("REVIEWER FEEDBACK"));
    }

    #[test]
    fn feedback_is_appended_when_present() {
        let feedback = vec!["Use the page title".to_string(), "  ".to_string()];
        let prompt = build_extraction_prompt("note", &feedback);
        assert!(prompt.contains("REVIEWER FEEDBACK"));
        assert!(prompt.contains("- Use the page title"));
        assert!(!prompt.contains("- \n"));
    }

    #[test]
    fn blank_feedback_adds_nothing() {
        let prompt = build_extraction_prompt("note", &[String::new()]);
        assert!(!prompt.contains("REVIEWER FEEDBACK"));
    }
}
