use std::collections::BTreeMap;

use thiserror::Error;

/// Per-field validation messages, keyed by the camelCase field name used in
/// persisted records. Empty map means the form is submittable.
pub type ValidationErrors = BTreeMap<String, String>;

/// Preconditions that block a submission before field validation runs.
/// All gating errors are recoverable; none clear form state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatingError {
    #[error("Checking verification status. Please wait a moment.")]
    VerificationPending,
    #[error("Please sign in and verify your account before submitting.")]
    NotVerified,
    #[error("A registration has already been submitted for this account.")]
    AlreadySubmitted,
}

/// Everything that can stop a submission attempt. Upload failures abort
/// before any record is written, so a failed upload never leaves an
/// orphaned record behind.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Gating(#[from] GatingError),
    #[error("Please correct the highlighted fields.")]
    Validation(ValidationErrors),
    #[error("{0}")]
    Upload(String),
    #[error("{0}")]
    Persistence(String),
    #[error("Unable to generate the registration PDF: {0}")]
    Render(String),
    #[error("A submission is already in progress.")]
    InFlight,
}

/// Auth provider failure; the provider's message is surfaced verbatim.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct AuthError(pub String);

/// Document store failure; surfaced verbatim.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Blob store failure. `NotFound` is distinguishable so deletes can treat
/// a missing object as already-deleted.
#[derive(Debug, Clone, Error)]
pub enum BlobError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Backend(String),
}
