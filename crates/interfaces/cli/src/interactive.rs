use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};

use anyhow::{Result, bail};
use async_trait::async_trait;

use scribe_runtime::{NoteReview, PendingReview, ReviewOutcome, Reviewer};
use scribe_vault::select_daily_notes;

/// Numbered menu of daily notes; reads a comma-separated selection.
pub(crate) fn prompt_selection(
    notes: &[String],
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Vec<String>> {
    if notes.is_empty() {
        writeln!(output, "no daily notes found")?;
        return Ok(Vec::new());
    }

    writeln!(output, "── daily notes ──────────────────────────────────────")?;
    for (index, note) in notes.iter().enumerate() {
        writeln!(output, "{:>3}. {note}", index + 1)?;
    }
    write!(output, "select notes (e.g. 1,3): ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(select_daily_notes(notes, &line))
}

/// Shows each draft and asks for approve / reject / revise.
pub(crate) struct TerminalReviewer<R, W> {
    input: R,
    output: W,
}

impl TerminalReviewer<BufReader<Stdin>, Stdout> {
    pub(crate) fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalReviewer<R, W> {
    pub(crate) fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            bail!("review input closed");
        }
        Ok(line.trim().to_string())
    }

    fn ask(&mut self, pending: &PendingReview) -> Result<NoteReview> {
        writeln!(self.output)?;
        writeln!(self.output, "── review: {} ──", pending.note.location())?;
        if pending.note.revisions() > 0 {
            writeln!(self.output, "(revision {})", pending.note.revisions())?;
        }
        writeln!(self.output, "{}", pending.content.trim_end())?;

        loop {
            write!(self.output, "[a]pprove / [r]eject / re[v]ise: ")?;
            self.output.flush()?;
            let choice = self.read_line()?.to_ascii_lowercase();
            let outcome = match choice.as_str() {
                "a" | "approve" => ReviewOutcome::Approved,
                "r" | "reject" => ReviewOutcome::Rejected,
                "v" | "revise" => ReviewOutcome::RevisionNeeded,
                _ => {
                    writeln!(self.output, "please answer a, r or v")?;
                    continue;
                }
            };

            let feedback = if outcome == ReviewOutcome::RevisionNeeded {
                write!(self.output, "feedback: ")?;
                self.output.flush()?;
                self.read_line()?
            } else {
                String::new()
            };
            return Ok(NoteReview::new(&pending.note, outcome, feedback));
        }
    }
}

#[async_trait]
impl<R, W> Reviewer for TerminalReviewer<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    async fn review(&mut self, pending: &PendingReview) -> Result<NoteReview> {
        self.ask(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use scribe_runtime::Note;

    fn pending() -> PendingReview {
        let mut note = Note::new("ObsidianBoy/New/test-1.md");
        note.queue_for_review().unwrap();
        PendingReview {
            note,
            content: "# Test 1\n".to_string(),
        }
    }

    #[tokio::test]
    async fn approve_and_reject() {
        let cases = [
            ("a\n", ReviewOutcome::Approved),
            ("reject\n", ReviewOutcome::Rejected),
        ];
        for (answer, expected) in cases {
            let mut reviewer = TerminalReviewer::new(Cursor::new(answer), Vec::new());
            let review = reviewer.review(&pending()).await.unwrap();
            assert_eq!(review.result(), expected);
            assert_eq!(review.note_id(), "ObsidianBoy/New/test-1.md");
        }
    }

    #[tokio::test]
    async fn revise_reads_feedback_and_reprompts_on_garbage() {
        let input = Cursor::new("maybe\nv\nadd the link\n");
        let mut reviewer = TerminalReviewer::new(input, Vec::new());
        let review = reviewer.review(&pending()).await.unwrap();
        assert_eq!(review.result(), ReviewOutcome::RevisionNeeded);
        assert_eq!(review.feedback(), "add the link");

        let shown = String::from_utf8(reviewer.output).unwrap();
        assert!(shown.contains("# Test 1"));
        assert!(shown.contains("please answer a, r or v"));
    }

    #[tokio::test]
    async fn closed_input_is_an_error() {
        let mut reviewer = TerminalReviewer::new(Cursor::new(""), Vec::new());
        assert!(reviewer.review(&pending()).await.is_err());
    }

    #[test]
    fn selection_menu_lists_and_parses() {
        let notes = vec!["Daily/2024-01-03.md".to_string(), "Daily/2024-01-02.md".to_string()];
        let mut output = Vec::new();
        let picked = prompt_selection(&notes, &mut Cursor::new("2, 9, 1\n"), &mut output).unwrap();
        assert_eq!(picked, vec!["Daily/2024-01-02.md", "Daily/2024-01-03.md"]);
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("  1. Daily/2024-01-03.md"));
    }
}
