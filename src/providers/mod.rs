//! Trait seams for the three external collaborators: the auth provider,
//! the document store, and the blob store. Everything the crate does with
//! the outside world goes through these.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

use crate::{
    error::{AuthError, BlobError, StoreError},
    models::{
        application::{ApplicationRecord, RecordPatch, StudentPhoto, SubmissionPayload},
        form::PhotoUpload,
        identity::{Identity, UserProfile},
    },
};

/// Live view of the current session; `None` means signed out. Providers
/// that fail to resolve a session deliver `None` rather than an error.
pub type SessionStream = BoxStream<'static, Option<Identity>>;

/// Live snapshots of all application records, ordered by creation time
/// descending.
pub type RecordStream = BoxStream<'static, Result<Vec<ApplicationRecord>, StoreError>>;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Delivers the current identity-or-none on every change, starting with
    /// the present state.
    fn observe_session(&self) -> SessionStream;

    async fn sign_in(&self) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn send_verification(&self, identity: &Identity) -> Result<(), AuthError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persists a submission and returns the new record id.
    async fn create_record(&self, payload: &SubmissionPayload) -> Result<String, StoreError>;

    /// The prior record for this identity, if any. At most one exists.
    async fn get_record_by_owner(
        &self,
        owner_uid: &str,
    ) -> Result<Option<ApplicationRecord>, StoreError>;

    fn listen_to_records(&self) -> RecordStream;

    async fn update_record(&self, id: &str, patch: &RecordPatch) -> Result<(), StoreError>;

    async fn delete_record(&self, id: &str) -> Result<(), StoreError>;

    async fn get_user_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Creates the profile on first sign-in, otherwise returns the stored one.
    async fn ensure_user_profile(&self, identity: &Identity) -> Result<UserProfile, StoreError>;
}

/// What the blob store hands back after an upload. Deployments either host
/// the file and return a URL, or inline the encoded bytes.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub url: Option<String>,
    pub data: Option<String>,
    pub path: String,
    pub content_type: String,
    pub size: u64,
}

impl StoredBlob {
    pub fn into_student_photo(self, file_name: String, uploaded_at: DateTime<Utc>) -> StudentPhoto {
        StudentPhoto {
            url: self.url,
            data: self.data,
            path: self.path,
            file_name,
            content_type: self.content_type,
            size: self.size,
            uploaded_at,
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, file: &PhotoUpload, path: &str) -> Result<StoredBlob, BlobError>;

    /// Deleting a missing object returns `BlobError::NotFound`; callers
    /// treat that as already-deleted.
    async fn delete(&self, path: &str) -> Result<(), BlobError>;
}
