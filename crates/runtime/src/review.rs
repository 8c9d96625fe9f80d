//! Review lifecycle of a drafted note and the boundary where verdicts enter.
//!
//! ```text
//! NEW ──queued──▶ IN_REVIEW ──approve──▶ APPROVED
//!                    ▲   │ ──reject───▶ REJECTED
//!        regenerated │   └──revise───▶ REVISION_NEEDED
//!                    └────────────────────────┘
//! ```
//!
//! APPROVED and REJECTED are terminal.  Every event outside the table is an
//! [`ReviewError::InvalidTransition`].

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoteStatus {
    New,
    InReview,
    Approved,
    Rejected,
    RevisionNeeded,
}

impl NoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::InReview => "IN_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::RevisionNeeded => "REVISION_NEEDED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The statuses a reviewer may hand down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewOutcome {
    Approved,
    Rejected,
    RevisionNeeded,
}

impl ReviewOutcome {
    pub fn status(self) -> NoteStatus {
        match self {
            Self::Approved => NoteStatus::Approved,
            Self::Rejected => NoteStatus::Rejected,
            Self::RevisionNeeded => NoteStatus::RevisionNeeded,
        }
    }
}

impl TryFrom<NoteStatus> for ReviewOutcome {
    type Error = ReviewError;

    fn try_from(status: NoteStatus) -> Result<Self, Self::Error> {
        match status {
            NoteStatus::Approved => Ok(Self::Approved),
            NoteStatus::Rejected => Ok(Self::Rejected),
            NoteStatus::RevisionNeeded => Ok(Self::RevisionNeeded),
            other => Err(ReviewError::NotAVerdict { status: other }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEvent {
    Queued,
    Verdict(ReviewOutcome),
    Regenerated,
}

impl fmt::Display for ReviewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => f.write_str("queue for review"),
            Self::Verdict(outcome) => write!(f, "apply verdict {}", outcome.status()),
            Self::Regenerated => f.write_str("content regenerated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("cannot {event} while note is {from}")]
    InvalidTransition { from: NoteStatus, event: ReviewEvent },
    #[error("review for '{found}' does not match pending note '{expected}'")]
    NoteMismatch { expected: String, found: String },
    #[error("{status} is not a review verdict")]
    NotAVerdict { status: NoteStatus },
}

// ── Note ─────────────────────────────────────────────────────────────────────

/// A drafted note moving through review.  Status only changes through the
/// transition methods below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    location: String,
    status: NoteStatus,
    feedback: Vec<String>,
    revisions: usize,
}

/// What the caller must do to the draft after a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewEffect {
    /// Move the draft into its permanent place.
    Commit,
    /// Delete the draft.
    Discard,
    /// Regenerate the draft; the feedback is already attached to the note.
    Revise { feedback: String },
}

impl Note {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            status: NoteStatus::New,
            feedback: Vec::new(),
            revisions: 0,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn status(&self) -> NoteStatus {
        self.status
    }

    /// All revision feedback received so far, oldest first.
    pub fn feedback(&self) -> &[String] {
        &self.feedback
    }

    /// Completed regeneration rounds.
    pub fn revisions(&self) -> usize {
        self.revisions
    }

    fn transition(
        &mut self,
        expected: NoteStatus,
        event: ReviewEvent,
        to: NoteStatus,
    ) -> Result<(), ReviewError> {
        if self.status != expected {
            return Err(ReviewError::InvalidTransition {
                from: self.status,
                event,
            });
        }
        tracing::debug!(note = %self.location, from = %self.status, to = %to, "note transition");
        self.status = to;
        Ok(())
    }

    /// NEW → IN_REVIEW.
    pub fn queue_for_review(&mut self) -> Result<(), ReviewError> {
        self.transition(NoteStatus::New, ReviewEvent::Queued, NoteStatus::InReview)
    }

    /// IN_REVIEW → verdict.  Consumes the review.
    pub fn apply_review(&mut self, review: NoteReview) -> Result<ReviewEffect, ReviewError> {
        let event = ReviewEvent::Verdict(review.result);
        if self.status != NoteStatus::InReview {
            return Err(ReviewError::InvalidTransition {
                from: self.status,
                event,
            });
        }
        if review.note_id != self.location {
            return Err(ReviewError::NoteMismatch {
                expected: self.location.clone(),
                found: review.note_id,
            });
        }

        self.transition(NoteStatus::InReview, event, review.result.status())?;
        Ok(match review.result {
            ReviewOutcome::Approved => ReviewEffect::Commit,
            ReviewOutcome::Rejected => ReviewEffect::Discard,
            ReviewOutcome::RevisionNeeded => {
                let feedback = review.feedback.trim().to_string();
                if !feedback.is_empty() {
                    self.feedback.push(feedback.clone());
                }
                ReviewEffect::Revise { feedback }
            }
        })
    }

    /// REVISION_NEEDED → IN_REVIEW once the draft content was replaced.
    pub fn regenerated(&mut self) -> Result<(), ReviewError> {
        self.transition(
            NoteStatus::RevisionNeeded,
            ReviewEvent::Regenerated,
            NoteStatus::InReview,
        )?;
        self.revisions += 1;
        Ok(())
    }

    pub(crate) fn relocate(&mut self, location: String) {
        self.location = location;
    }
}

/// One reviewer verdict, keyed by note identifier.  Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteReview {
    note_id: String,
    result: ReviewOutcome,
    feedback: String,
}

impl NoteReview {
    pub fn new(note: &Note, result: ReviewOutcome, feedback: impl Into<String>) -> Self {
        Self::for_id(note.location(), result, feedback)
    }

    pub fn for_id(
        note_id: impl Into<String>,
        result: ReviewOutcome,
        feedback: impl Into<String>,
    ) -> Self {
        Self {
            note_id: note_id.into(),
            result,
            feedback: feedback.into(),
        }
    }

    pub fn approve(note: &Note) -> Self {
        Self::new(note, ReviewOutcome::Approved, "")
    }

    pub fn reject(note: &Note) -> Self {
        Self::new(note, ReviewOutcome::Rejected, "")
    }

    pub fn revise(note: &Note, feedback: impl Into<String>) -> Self {
        Self::new(note, ReviewOutcome::RevisionNeeded, feedback)
    }

    pub fn note_id(&self) -> &str {
        &self.note_id
    }

    pub fn result(&self) -> ReviewOutcome {
        self.result
    }

    pub fn feedback(&self) -> &str {
        &self.feedback
    }
}

// ── Review boundary ──────────────────────────────────────────────────────────

/// A note awaiting a verdict together with the draft text to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReview {
    pub note: Note,
    pub content: String,
}

/// FIFO of notes awaiting review.
#[derive(Debug, Default)]
pub struct ReviewQueue {
    pending: VecDeque<PendingReview>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pending: PendingReview) {
        self.pending.push_back(pending);
    }

    pub fn front(&self) -> Option<&PendingReview> {
        self.pending.front()
    }

    pub fn pop(&mut self) -> Option<PendingReview> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingReview> {
        self.pending.iter()
    }

    /// Take a note out of the queue without a verdict.
    pub fn remove(&mut self, note_id: &str) -> Option<PendingReview> {
        let index = self.position(note_id)?;
        self.pending.remove(index)
    }

    /// Apply `review` to the pending note it names.  On success the note
    /// leaves the queue and is returned with the effect to carry out; on
    /// failure the queue is unchanged.
    pub fn submit(
        &mut self,
        review: NoteReview,
    ) -> Result<(PendingReview, ReviewEffect), ReviewError> {
        let taken = self
            .position(review.note_id())
            .and_then(|index| Some((index, self.pending.remove(index)?)));
        let Some((index, mut pending)) = taken else {
            return Err(ReviewError::NoteMismatch {
                expected: self
                    .pending
                    .iter()
                    .map(|pending| pending.note.location())
                    .collect::<Vec<_>>()
                    .join(", "),
                found: review.note_id,
            });
        };

        match pending.note.apply_review(review) {
            Ok(effect) => Ok((pending, effect)),
            Err(err) => {
                self.pending.insert(index, pending);
                Err(err)
            }
        }
    }

    fn position(&self, note_id: &str) -> Option<usize> {
        self.pending
            .iter()
            .position(|pending| pending.note.location() == note_id)
    }
}

/// Source of verdicts: a person at a terminal, a script, a test.
#[async_trait]
pub trait Reviewer: Send {
    async fn review(&mut self, pending: &PendingReview) -> anyhow::Result<NoteReview>;
}

/// Hands out verdicts from a fixed script, then from an optional fallback.
/// Used for `--auto-approve` and in tests.
#[derive(Debug, Default)]
pub struct ScriptedReviewer {
    script: VecDeque<(ReviewOutcome, String)>,
    fallback: Option<ReviewOutcome>,
    seen: Vec<PendingReview>,
}

impl ScriptedReviewer {
    pub fn new<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = (ReviewOutcome, S)>,
        S: Into<String>,
    {
        Self {
            script: script
                .into_iter()
                .map(|(outcome, feedback)| (outcome, feedback.into()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn approve_all() -> Self {
        Self::default().with_fallback(ReviewOutcome::Approved)
    }

    pub fn with_fallback(mut self, outcome: ReviewOutcome) -> Self {
        self.fallback = Some(outcome);
        self
    }

    /// Every item this reviewer was shown, in order.
    pub fn seen(&self) -> &[PendingReview] {
        &self.seen
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    async fn review(&mut self, pending: &PendingReview) -> anyhow::Result<NoteReview> {
        self.seen.push(pending.clone());
        let (outcome, feedback) = match self.script.pop_front() {
            Some(step) => step,
            None => match self.fallback {
                Some(outcome) => (outcome, String::new()),
                None => anyhow::bail!("review script exhausted at {}", pending.note.location()),
            },
        };
        Ok(NoteReview::new(&pending.note, outcome, feedback))
    }
}
