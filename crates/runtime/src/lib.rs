pub mod draft;
pub mod entry;
pub mod extract;
pub mod pipeline;
pub mod prompt_builder;
pub mod review;

pub use draft::{ProcessedNote, draft_name, render_draft};
pub use entry::{Entry, is_valid};
pub use extract::{EntryExtractor, normalize_note_text};
pub use pipeline::{
    CycleReport, FailedNote, Pipeline, PipelineError, RunReport, count_by_status, draft_key,
    extraction_key, note_key,
};
pub use review::{
    Note, NoteReview, NoteStatus, PendingReview, ReviewEffect, ReviewError, ReviewEvent,
    ReviewOutcome, ReviewQueue, Reviewer, ScriptedReviewer,
};
