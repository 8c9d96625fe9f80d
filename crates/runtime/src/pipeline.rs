//! The orchestrator: one daily note in, reviewed notes out.
//!
//! A cycle reads the daily note, extracts entries, drafts one note per valid
//! entry and drives every draft through review until it is approved,
//! rejected or parked after running out of revision rounds.  A failure on
//! one draft halts that draft only; a failure before drafting halts the
//! cycle; [`Pipeline::run`] always moves on to the next daily note.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use scribe_config::AppConfig;
use scribe_llm::StructuredBackend;
use scribe_vault::{KnowledgeStore, StoreError, Vault, VaultError};

use crate::draft::{ProcessedNote, draft_name, render_draft};
use crate::entry::Entry;
use crate::extract::EntryExtractor;
use crate::review::{
    Note, NoteStatus, PendingReview, ReviewEffect, ReviewError, ReviewQueue, Reviewer,
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error("reviewer failed: {0:#}")]
    Reviewer(anyhow::Error),
}

/// Outcome of one daily note.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub source: String,
    /// Entries returned by extraction, valid or not.
    pub extracted: usize,
    /// Entries dropped for having neither title nor link.
    pub dropped: usize,
    pub approved: usize,
    pub rejected: usize,
    /// Drafts moved aside after exhausting their revision rounds.
    pub parked: usize,
    /// Approved and parked notes in their final location.
    pub processed: Vec<ProcessedNote>,
    /// Drafts that halted, as `"<draft>: <error>"`.
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedNote {
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub cycles: Vec<CycleReport>,
    pub failed: Vec<FailedNote>,
}

impl RunReport {
    pub fn approved(&self) -> usize {
        self.cycles.iter().map(|cycle| cycle.approved).sum()
    }

    pub fn rejected(&self) -> usize {
        self.cycles.iter().map(|cycle| cycle.rejected).sum()
    }

    pub fn parked(&self) -> usize {
        self.cycles.iter().map(|cycle| cycle.parked).sum()
    }
}

pub fn draft_key(draft_id: &str) -> String {
    format!("draft/{draft_id}")
}

/// Record of a note that left review, keyed by its final location.
pub fn note_key(note_id: &str) -> String {
    format!("note/{note_id}")
}

pub fn extraction_key(daily_id: &str) -> String {
    format!("extraction/{daily_id}")
}

pub struct Pipeline {
    extractor: EntryExtractor,
    vault: Arc<dyn Vault>,
    store: Arc<dyn KnowledgeStore>,
    notes_dir: String,
    revision_dir: String,
    max_revisions: usize,
}

impl Pipeline {
    pub fn new(
        config: &AppConfig,
        backend: Arc<dyn StructuredBackend>,
        vault: Arc<dyn Vault>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            extractor: EntryExtractor::new(backend),
            vault,
            store,
            notes_dir: config.vault.notes_dir.clone(),
            revision_dir: config.vault.revision_dir.clone(),
            max_revisions: config.review.max_revisions,
        }
    }

    pub fn extractor(&self) -> &EntryExtractor {
        &self.extractor
    }

    /// Read and extract one daily note, recording the extraction result in
    /// the knowledge store.  Returns every entry, invalid ones included.
    pub async fn extract_daily_note(
        &self,
        daily_id: &str,
    ) -> Result<Vec<Entry>, PipelineError> {
        let text = self.vault.read_note(daily_id)?;
        let entries = self.extractor.extract(&text).await;

        let serialized = serde_json::to_string_pretty(&entries).map_err(StoreError::from)?;
        self.store.store(&extraction_key(daily_id), &serialized)?;
        Ok(entries)
    }

    /// Entries recorded by the last extraction of `daily_id`.
    pub fn stored_extraction(&self, daily_id: &str) -> Result<Vec<Entry>, PipelineError> {
        let raw = self.store.retrieve(&extraction_key(daily_id))?;
        Ok(serde_json::from_str(&raw).map_err(StoreError::from)?)
    }

    /// Run one full cycle for `daily_id`.
    pub async fn process_daily_note(
        &self,
        daily_id: &str,
        reviewer: &mut dyn Reviewer,
    ) -> Result<CycleReport, PipelineError> {
        tracing::info!(note = %daily_id, "processing daily note");
        let mut report = CycleReport {
            source: daily_id.to_string(),
            ..CycleReport::default()
        };

        let entries = self.extract_daily_note(daily_id).await?;
        report.extracted = entries.len();
        let (valid, invalid): (Vec<Entry>, Vec<Entry>) =
            entries.into_iter().partition(Entry::is_valid);
        report.dropped = invalid.len();
        if report.dropped > 0 {
            tracing::debug!(
                note = %daily_id,
                dropped = report.dropped,
                "dropped entries without title or link"
            );
        }

        let mut queue = ReviewQueue::new();
        let mut sources: HashMap<String, Entry> = HashMap::new();
        for entry in valid {
            match self.draft_entry(&entry, daily_id) {
                Ok(pending) => {
                    sources.insert(pending.note.location().to_string(), entry);
                    queue.push(pending);
                }
                Err(err) => self.halt(&mut report, entry.display_name().unwrap_or("entry"), &err),
            }
        }

        while let Some(pending) = queue.front().cloned() {
            let draft_id = pending.note.location().to_string();
            if let Err(err) = self
                .review_front(&mut queue, pending, &mut sources, reviewer, &mut report)
                .await
            {
                queue.remove(&draft_id);
                sources.remove(&draft_id);
                self.halt(&mut report, &draft_id, &err);
            }
        }

        tracing::info!(
            note = %daily_id,
            approved = report.approved,
            rejected = report.rejected,
            parked = report.parked,
            failures = report.failures.len(),
            "daily note processed"
        );
        Ok(report)
    }

    /// Process each daily note in turn.  A note whose cycle fails is
    /// recorded and skipped.
    pub async fn run(&self, daily_ids: &[String], reviewer: &mut dyn Reviewer) -> RunReport {
        let mut report = RunReport::default();
        for daily_id in daily_ids {
            match self.process_daily_note(daily_id, reviewer).await {
                Ok(cycle) => report.cycles.push(cycle),
                Err(err) => {
                    tracing::error!(note = %daily_id, "daily note halted: {err}");
                    report.failed.push(FailedNote {
                        source: daily_id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }

    // ── steps ────────────────────────────────────────────────────────────────

    /// NEW draft on disk and in the store, queued for review.
    fn draft_entry(&self, entry: &Entry, daily_id: &str) -> Result<PendingReview, PipelineError> {
        let content = render_draft(entry, daily_id, Utc::now());
        let draft_id = self.vault.write_draft(&draft_name(entry), &content)?;
        if let Err(err) = self.store.store(&draft_key(&draft_id), &content) {
            // An unrecorded draft would never be reviewed.
            if let Err(cleanup) = self.vault.delete(&draft_id) {
                tracing::warn!(draft = %draft_id, "could not remove unrecorded draft: {cleanup}");
            }
            return Err(err.into());
        }

        let mut note = Note::new(draft_id);
        note.queue_for_review()?;
        Ok(PendingReview { note, content })
    }

    async fn review_front(
        &self,
        queue: &mut ReviewQueue,
        pending: PendingReview,
        sources: &mut HashMap<String, Entry>,
        reviewer: &mut dyn Reviewer,
        report: &mut CycleReport,
    ) -> Result<(), PipelineError> {
        let review = reviewer.review(&pending).await.map_err(PipelineError::Reviewer)?;
        if review.note_id() != pending.note.location() {
            return Err(ReviewError::NoteMismatch {
                expected: pending.note.location().to_string(),
                found: review.note_id().to_string(),
            }
            .into());
        }

        let (mut item, effect) = queue.submit(review)?;
        let draft_id = item.note.location().to_string();
        match effect {
            ReviewEffect::Commit => {
                let new_id = self.vault.move_note(&draft_id, &self.notes_dir)?;
                tracing::info!(draft = %draft_id, note = %new_id, "note approved");
                item.note.relocate(new_id);
                self.finish(item, &draft_id, sources, report)?;
                report.approved += 1;
            }
            ReviewEffect::Discard => {
                self.vault.delete(&draft_id)?;
                self.store.remove(&draft_key(&draft_id))?;
                sources.remove(&draft_id);
                tracing::info!(draft = %draft_id, "note rejected, draft deleted");
                report.rejected += 1;
            }
            ReviewEffect::Revise { .. } if item.note.revisions() >= self.max_revisions => {
                let new_id = self.vault.move_note(&draft_id, &self.revision_dir)?;
                tracing::warn!(
                    draft = %draft_id,
                    parked = %new_id,
                    revisions = item.note.revisions(),
                    "revision budget exhausted, draft parked"
                );
                item.note.relocate(new_id);
                self.finish(item, &draft_id, sources, report)?;
                report.parked += 1;
            }
            ReviewEffect::Revise { .. } => {
                self.regenerate(&mut item, sources, &report.source).await?;
                queue.push(item);
            }
        }
        Ok(())
    }

    /// REVISION_NEEDED → IN_REVIEW: re-extract from the current draft with
    /// all feedback so far and replace the draft with the first valid entry.
    async fn regenerate(
        &self,
        item: &mut PendingReview,
        sources: &mut HashMap<String, Entry>,
        daily_id: &str,
    ) -> Result<(), PipelineError> {
        let draft_id = item.note.location().to_string();
        let current = self.store.retrieve(&draft_key(&draft_id))?;

        let regenerated = self
            .extractor
            .extract_with_feedback(&current, item.note.feedback())
            .await
            .into_iter()
            .find(Entry::is_valid);

        match regenerated {
            Some(entry) => {
                let content = render_draft(&entry, daily_id, Utc::now());
                self.vault.update(&draft_id, &content)?;
                self.store.store(&draft_key(&draft_id), &content)?;
                sources.insert(draft_id.clone(), entry);
                item.content = content;
            }
            None => {
                tracing::warn!(
                    draft = %draft_id,
                    "regeneration produced no valid entry, keeping draft"
                );
                item.content = current;
            }
        }

        item.note.regenerated()?;
        tracing::info!(draft = %draft_id, round = item.note.revisions(), "draft regenerated");
        Ok(())
    }

    /// Re-key the draft record under the note's final location and report it.
    fn finish(
        &self,
        item: PendingReview,
        draft_id: &str,
        sources: &mut HashMap<String, Entry>,
        report: &mut CycleReport,
    ) -> Result<(), PipelineError> {
        let original_entry = sources.remove(draft_id).unwrap_or_default();
        self.store.store(&note_key(item.note.location()), &item.content)?;
        self.store.remove(&draft_key(draft_id))?;
        report.processed.push(ProcessedNote {
            original_entry,
            note: item.note,
            content: item.content,
        });
        Ok(())
    }

    fn halt(&self, report: &mut CycleReport, draft: &str, err: &PipelineError) {
        tracing::error!(note = %report.source, draft = %draft, "draft halted: {err}");
        report.failures.push(format!("{draft}: {err}"));
    }
}

/// Processed notes that ended the cycle in `status`.
pub fn count_by_status(report: &CycleReport, status: NoteStatus) -> usize {
    report
        .processed
        .iter()
        .filter(|processed| processed.note.status() == status)
        .count()
}
