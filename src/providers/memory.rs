//! In-process provider implementations. They back the flow tests and any
//! demo wiring that does not have real cloud services behind it.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use uuid::Uuid;

use crate::{
    error::{AuthError, BlobError, StoreError},
    models::{
        application::{ApplicationRecord, ApplicationStatus, RecordPatch, SubmissionPayload},
        form::PhotoUpload,
        identity::{Identity, UserProfile},
    },
};

use super::{AuthProvider, BlobStore, DocumentStore, RecordStream, SessionStream, StoredBlob};

/// Auth provider with a fixed identity that is "signed in" on demand.
pub struct StaticAuthProvider {
    identity: Identity,
    session: watch::Sender<Option<Identity>>,
    pub verification_sends: AtomicUsize,
}

impl StaticAuthProvider {
    pub fn new(identity: Identity) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            identity,
            session,
            verification_sends: AtomicUsize::new(0),
        }
    }

    pub fn signed_in(identity: Identity) -> Self {
        let provider = Self::new(identity.clone());
        provider.session.send_replace(Some(identity));
        provider
    }

    pub fn current(&self) -> Option<Identity> {
        self.session.borrow().clone()
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    fn observe_session(&self) -> SessionStream {
        WatchStream::new(self.session.subscribe()).boxed()
    }

    async fn sign_in(&self) -> Result<Identity, AuthError> {
        self.session.send_replace(Some(self.identity.clone()));
        Ok(self.identity.clone())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.session.send_replace(None);
        Ok(())
    }

    async fn send_verification(&self, _identity: &Identity) -> Result<(), AuthError> {
        self.verification_sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct StoreInner {
    records: Vec<ApplicationRecord>,
    profiles: HashMap<String, UserProfile>,
}

/// Document store over a mutex and a watch channel. Snapshots are kept in
/// creation-time-descending order, newest first.
pub struct MemoryDocumentStore {
    inner: Mutex<StoreInner>,
    snapshots: watch::Sender<Vec<ApplicationRecord>>,
    pub creates: AtomicUsize,
    pub fail_creates: AtomicBool,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        let (snapshots, _) = watch::channel(Vec::new());
        Self {
            inner: Mutex::new(StoreInner::default()),
            snapshots,
            creates: AtomicUsize::new(0),
            fail_creates: AtomicBool::new(false),
        }
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, profile: UserProfile) -> Self {
        self.inner
            .lock()
            .expect("store poisoned")
            .profiles
            .insert(profile.uid.clone(), profile);
        self
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().expect("store poisoned").records.len()
    }

    // send_replace keeps the channel's stored value current even while no
    // listener is subscribed yet; plain send drops the value in that case.
    fn publish(&self, inner: &mut StoreInner) {
        inner
            .records
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.snapshots.send_replace(inner.records.clone());
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create_record(&self, payload: &SubmissionPayload) -> Result<String, StoreError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError("document store unavailable".into()));
        }
        let id = Uuid::new_v4().to_string();
        let record = ApplicationRecord {
            id: id.clone(),
            submission: payload.clone(),
            status: ApplicationStatus::Submitted,
            status_updated_at: Some(Utc::now()),
            status_updated_by: None,
            admin_notes: None,
            notes_updated_at: None,
            notes_updated_by: None,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.records.push(record);
        self.publish(&mut inner);
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn get_record_by_owner(
        &self,
        owner_uid: &str,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        Ok(inner
            .records
            .iter()
            .find(|r| {
                r.submission
                    .auth
                    .as_ref()
                    .map(|a| a.auth_uid == owner_uid)
                    .unwrap_or(false)
            })
            .cloned())
    }

    fn listen_to_records(&self) -> RecordStream {
        WatchStream::new(self.snapshots.subscribe())
            .map(Ok)
            .boxed()
    }

    async fn update_record(&self, id: &str, patch: &RecordPatch) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError(format!("no record with id {id}")))?;
        match patch {
            RecordPatch::Status { status, updated_at, updated_by } => {
                record.status = *status;
                record.status_updated_at = Some(*updated_at);
                record.status_updated_by = Some(updated_by.clone());
            }
            RecordPatch::Notes { notes, updated_at, updated_by } => {
                record.admin_notes = Some(notes.clone());
                record.notes_updated_at = Some(*updated_at);
                record.notes_updated_by = Some(updated_by.clone());
            }
        }
        self.publish(&mut inner);
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.records.retain(|r| r.id != id);
        self.publish(&mut inner);
        Ok(())
    }

    async fn get_user_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        Ok(inner.profiles.get(uid).cloned())
    }

    async fn ensure_user_profile(&self, identity: &Identity) -> Result<UserProfile, StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        if let Some(existing) = inner.profiles.get(&identity.uid) {
            return Ok(existing.clone());
        }
        let profile = UserProfile::from_identity(identity, Utc::now());
        inner.profiles.insert(identity.uid.clone(), profile.clone());
        Ok(profile)
    }
}

/// Blob store keeping uploads in a map. `inline` controls whether uploads
/// come back as data URLs or as fake hosted URLs.
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, (String, u64)>>,
    inline: bool,
    pub uploads: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_uploads: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            inline: false,
            uploads: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_uploads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inlining() -> Self {
        Self {
            inline: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().expect("blobs poisoned").contains_key(path)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, file: &PhotoUpload, path: &str) -> Result<StoredBlob, BlobError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BlobError::Backend("blob store unavailable".into()));
        }
        let mut objects = self.objects.lock().expect("blobs poisoned");
        objects.insert(path.to_string(), (file.content_type.clone(), file.size()));
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let (url, data) = if self.inline {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&file.bytes);
            (None, Some(format!("data:{};base64,{encoded}", file.content_type)))
        } else {
            (Some(format!("memory://{path}")), None)
        };
        Ok(StoredBlob {
            url,
            data,
            path: path.to_string(),
            content_type: file.content_type.clone(),
            size: file.size(),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::Backend("blob store unavailable".into()));
        }
        let mut objects = self.objects.lock().expect("blobs poisoned");
        if objects.remove(path).is_none() {
            return Err(BlobError::NotFound(path.to_string()));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::application::StudentPhoto;
    use bytes::Bytes;

    fn identity() -> Identity {
        Identity {
            uid: "uid-1".into(),
            email: Some("test@example.com".into()),
            display_name: Some("Test User".into()),
            phone_number: None,
            photo_url: None,
            email_verified: true,
            provider_ids: vec!["password".into()],
        }
    }

    fn payload() -> SubmissionPayload {
        serde_json::from_value(serde_json::json!({
            "firstName": "Ana", "lastName": "Test", "fullName": "Ana Test",
            "dob": "2009-09-01", "gender": "female", "genderLabel": "Female",
            "address": "1 Main St", "phone": "8685550100",
            "email": "ana@example.com", "school": "",
            "courses": [], "schedule": "weekday-evening",
            "scheduleLabel": "Weekday evenings (5:30pm - 8:30pm)",
            "emergencyName": "Pat", "emergencyPhone": "8685550101",
            "guardianName": "Pat", "signatureTyped": "Ana",
            "signatureDrawn": null, "age": 16, "isMinor": true,
            "submittedAt": "2026-08-23T16:05:00Z",
            "studentPhoto": StudentPhoto::default(),
        }))
        .expect("payload fixture")
    }

    #[tokio::test]
    async fn late_listener_sees_records_created_before_subscribing() {
        let store = MemoryDocumentStore::new();
        store.create_record(&payload()).await.unwrap();
        // First subscription happens after the write.
        let snapshot = store.listen_to_records().next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].submission.full_name, "Ana Test");
    }

    #[tokio::test]
    async fn signed_in_state_survives_until_first_observer() {
        let provider = StaticAuthProvider::signed_in(identity());
        assert_eq!(provider.current().unwrap().uid, "uid-1");
        let first = provider.observe_session().next().await.unwrap();
        assert_eq!(first.unwrap().uid, "uid-1");

        provider.sign_out().await.unwrap();
        assert!(provider.current().is_none());
    }

    #[tokio::test]
    async fn ensure_profile_is_idempotent() {
        let store = MemoryDocumentStore::new();
        let first = store.ensure_user_profile(&identity()).await.unwrap();
        let second = store.ensure_user_profile(&identity()).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(store.get_user_profile("uid-1").await.unwrap().unwrap().uid, "uid-1");
    }

    #[tokio::test]
    async fn blob_delete_distinguishes_not_found() {
        let blobs = MemoryBlobStore::new();
        let file = PhotoUpload::new("p.png", "image/png", Bytes::from_static(b"x"));
        blobs.upload(&file, "applications/u/one").await.unwrap();
        assert!(blobs.delete("applications/u/one").await.is_ok());
        assert!(matches!(
            blobs.delete("applications/u/one").await,
            Err(BlobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn inlining_store_returns_data_url() {
        let blobs = MemoryBlobStore::inlining();
        let file = PhotoUpload::new("p.png", "image/png", Bytes::from_static(b"abc"));
        let stored = blobs.upload(&file, "applications/u/p").await.unwrap();
        assert!(stored.url.is_none());
        assert!(stored.data.unwrap().starts_with("data:image/png;base64,"));
    }
}
