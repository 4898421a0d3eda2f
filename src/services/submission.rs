//! The registration flow: one session per signed-in (or guest) visitor,
//! holding the draft form, the gating state, and the submit state machine.
//! Submission order is fixed: gate, validate, upload photo, write record,
//! render PDF. A failed upload aborts before any record is written.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::{
    config::InstitutionConfig,
    error::{GatingError, SubmitError, ValidationErrors},
    models::{
        application::{ApplicationRecord, ApplicationStatus, DownloadFile, SubmissionPayload},
        form::{PhotoUpload, RegistrationForm},
        identity::Identity,
    },
    providers::{AuthProvider, BlobStore, DocumentStore},
    services::{
        payload::{build_payload, pdf_file_name, photo_storage_path},
        pdf::generate_registration_pdf,
        validation::{sanitize_digits, sanitize_name, validate, validate_photo},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting,
    Success,
    Error,
}

/// Current phase plus the user-facing message for it.
#[derive(Debug, Clone)]
pub struct SubmissionStatus {
    pub state: SubmissionState,
    pub message: Option<String>,
}

impl SubmissionStatus {
    fn idle() -> Self {
        Self { state: SubmissionState::Idle, message: None }
    }
}

/// Outcome of a successful submission: the persisted record id and the
/// rendered PDF offered as a download.
#[derive(Debug)]
pub struct CompletedSubmission {
    pub record_id: String,
    pub file: DownloadFile,
}

pub struct RegistrationSession {
    config: InstitutionConfig,
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,

    form: RegistrationForm,
    photo: Option<PhotoUpload>,
    errors: ValidationErrors,
    status: SubmissionStatus,

    identity: Option<Identity>,
    /// True until the first session snapshot arrives.
    auth_loading: bool,
    auth_error: Option<String>,
    /// Guards sign-in/sign-out/resend against double clicks.
    auth_action: bool,
    verification_sent: bool,

    existing: Option<ApplicationRecord>,
    existing_loading: bool,

    /// Last successfully persisted payload, kept for PDF re-download.
    last_payload: Option<SubmissionPayload>,

    /// Cleared by `close()`; state writes after an await are skipped once
    /// the owner has torn the session down.
    alive: bool,
}

impl RegistrationSession {
    pub fn new(
        config: InstitutionConfig,
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            config,
            auth,
            store,
            blobs,
            form: RegistrationForm::default(),
            photo: None,
            errors: ValidationErrors::new(),
            status: SubmissionStatus::idle(),
            identity: None,
            auth_loading: true,
            auth_error: None,
            auth_action: false,
            verification_sent: false,
            existing: None,
            existing_loading: false,
            last_payload: None,
            alive: true,
        }
    }

    pub fn form(&self) -> &RegistrationForm {
        &self.form
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn status(&self) -> &SubmissionStatus {
        &self.status
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn auth_loading(&self) -> bool {
        self.auth_loading
    }

    pub fn auth_error(&self) -> Option<&str> {
        self.auth_error.as_deref()
    }

    pub fn verification_sent(&self) -> bool {
        self.verification_sent
    }

    /// A prior submission exists for this account; the form is read-only.
    pub fn is_locked(&self) -> bool {
        self.existing.is_some()
    }

    pub fn existing_record(&self) -> Option<&ApplicationRecord> {
        self.existing.as_ref()
    }

    pub fn close(&mut self) {
        self.alive = false;
    }

    /// Feeds one snapshot from `AuthProvider::observe_session` into the
    /// session: resolves the profile and the prior submission for the new
    /// identity, or clears both on sign-out.
    pub async fn handle_session_change(&mut self, identity: Option<Identity>) {
        self.auth_loading = false;
        self.verification_sent = false;
        self.identity = identity.clone();

        let Some(identity) = identity else {
            self.existing = None;
            self.existing_loading = false;
            return;
        };

        if let Err(err) = self.store.ensure_user_profile(&identity).await {
            warn!("profile bootstrap failed for {}: {err}", identity.uid);
        }

        self.existing_loading = true;
        let existing = self.store.get_record_by_owner(&identity.uid).await;
        if !self.alive {
            return;
        }
        self.existing_loading = false;
        match existing {
            Ok(record) => self.existing = record,
            Err(err) => {
                warn!("existing-record lookup failed for {}: {err}", identity.uid);
                self.existing = None;
            }
        }
    }

    fn clear_field_error(&mut self, field: &str) {
        self.errors.remove(field);
    }

    pub fn set_first_name(&mut self, value: &str) {
        self.form.first_name = sanitize_name(value);
        self.clear_field_error("firstName");
    }

    pub fn set_last_name(&mut self, value: &str) {
        self.form.last_name = sanitize_name(value);
        self.clear_field_error("lastName");
    }

    pub fn set_dob(&mut self, dob: Option<NaiveDate>) {
        self.form.dob = dob;
        self.clear_field_error("dob");
    }

    pub fn set_gender(&mut self, value: &str) {
        self.form.gender = value.to_string();
        self.clear_field_error("gender");
    }

    pub fn set_address(&mut self, value: &str) {
        self.form.address = value.to_string();
        self.clear_field_error("address");
    }

    pub fn set_phone(&mut self, value: &str) {
        self.form.phone = sanitize_digits(value, self.config.max_phone_digits);
        self.clear_field_error("phone");
    }

    pub fn set_email(&mut self, value: &str) {
        self.form.email = value.to_string();
        self.clear_field_error("email");
    }

    pub fn set_school(&mut self, value: &str) {
        self.form.school = value.to_string();
        self.clear_field_error("school");
    }

    pub fn toggle_course(&mut self, course_id: &str) {
        self.form.toggle_course(course_id);
        self.clear_field_error("courses");
    }

    pub fn set_schedule(&mut self, value: &str) {
        self.form.schedule = value.to_string();
        self.clear_field_error("schedule");
    }

    pub fn set_emergency_name(&mut self, value: &str) {
        self.form.emergency_name = sanitize_name(value);
        self.clear_field_error("emergencyName");
    }

    pub fn set_emergency_phone(&mut self, value: &str) {
        self.form.emergency_phone = sanitize_digits(value, self.config.max_phone_digits);
        self.clear_field_error("emergencyPhone");
    }

    pub fn set_guardian_name(&mut self, value: &str) {
        self.form.guardian_name = sanitize_name(value);
        self.clear_field_error("guardianName");
    }

    pub fn set_signature_typed(&mut self, value: &str) {
        self.form.signature_typed = value.to_string();
        self.clear_field_error("signatureTyped");
    }

    pub fn set_signature_drawn(&mut self, data_url: Option<String>) {
        self.form.signature_drawn = data_url;
    }

    /// Validates and stores the chosen photo. An invalid file is rejected
    /// outright; it never replaces a previously accepted one.
    pub fn attach_photo(&mut self, photo: PhotoUpload) {
        match validate_photo(Some(&photo), &self.config) {
            Some(message) => {
                self.errors.insert("studentPhoto".into(), message);
            }
            None => {
                self.photo = Some(photo);
                self.clear_field_error("studentPhoto");
            }
        }
    }

    pub fn clear_photo(&mut self) {
        self.photo = None;
        self.clear_field_error("studentPhoto");
    }

    pub async fn sign_in(&mut self) {
        if self.auth_action {
            return;
        }
        self.auth_action = true;
        self.auth_error = None;
        let result = self.auth.sign_in().await;
        if self.alive {
            self.auth_action = false;
            if let Err(err) = result {
                self.auth_error = Some(err.to_string());
            }
        }
    }

    pub async fn sign_out(&mut self) {
        if self.auth_action {
            return;
        }
        self.auth_action = true;
        let result = self.auth.sign_out().await;
        if self.alive {
            self.auth_action = false;
            if let Err(err) = result {
                self.auth_error = Some(err.to_string());
            }
        }
    }

    pub async fn resend_verification(&mut self) {
        if self.auth_action {
            return;
        }
        let Some(identity) = self.identity.clone() else {
            return;
        };
        self.auth_action = true;
        self.auth_error = None;
        let result = self.auth.send_verification(&identity).await;
        if self.alive {
            self.auth_action = false;
            match result {
                Ok(()) => self.verification_sent = true,
                Err(err) => self.auth_error = Some(err.to_string()),
            }
        }
    }

    fn set_status(&mut self, state: SubmissionState, message: impl Into<String>) {
        if self.alive {
            self.status = SubmissionStatus { state, message: Some(message.into()) };
        }
    }

    fn gate(&self) -> Result<&Identity, GatingError> {
        if self.auth_loading || self.existing_loading {
            return Err(GatingError::VerificationPending);
        }
        let identity = self
            .identity
            .as_ref()
            .filter(|id| id.is_verified())
            .ok_or(GatingError::NotVerified)?;
        if self.existing.is_some() {
            return Err(GatingError::AlreadySubmitted);
        }
        Ok(identity)
    }

    /// Runs one submission attempt. On success the draft is cleared, the
    /// session locks against resubmission, and the rendered PDF comes back
    /// as a download.
    pub async fn submit(&mut self, now: DateTime<Utc>) -> Result<CompletedSubmission, SubmitError> {
        if self.status.state == SubmissionState::Submitting {
            return Err(SubmitError::InFlight);
        }

        let identity = match self.gate() {
            Ok(identity) => identity.clone(),
            Err(gating) => {
                self.set_status(SubmissionState::Error, gating.to_string());
                return Err(gating.into());
            }
        };

        let errors = validate(&self.form, self.photo.as_ref(), &self.config, now.date_naive());
        if !errors.is_empty() {
            self.errors = errors.clone();
            let failure = SubmitError::Validation(errors);
            self.set_status(SubmissionState::Error, failure.to_string());
            return Err(failure);
        }
        self.errors.clear();

        // validate() flags a missing date of birth, so this branch is only
        // reachable if the draft mutates between check and build.
        let Some(dob) = self.form.dob else {
            let mut errors = ValidationErrors::new();
            errors.insert("dob".into(), "Date of birth is required.".into());
            self.errors = errors.clone();
            let failure = SubmitError::Validation(errors);
            self.set_status(SubmissionState::Error, failure.to_string());
            return Err(failure);
        };

        self.set_status(SubmissionState::Submitting, "Processing student photo...");

        let mut payload = build_payload(&self.form, dob, Some(&identity), &self.config, now);

        // Gating plus validation guarantee the photo is present here.
        let photo = self.photo.clone().ok_or_else(|| {
            SubmitError::Upload("Student photo is required.".into())
        })?;
        let path = photo_storage_path(
            &photo.file_name,
            &payload.full_name,
            Some(&identity.uid),
            now,
        );
        let stored = match self.blobs.upload(&photo, &path).await {
            Ok(stored) => stored,
            Err(err) => {
                let failure = SubmitError::Upload(err.to_string());
                self.set_status(SubmissionState::Error, failure.to_string());
                return Err(failure);
            }
        };
        payload.student_photo = stored.into_student_photo(photo.file_name.clone(), now);

        self.set_status(SubmissionState::Submitting, "Submitting registration...");

        let record_id = match self.store.create_record(&payload).await {
            Ok(id) => id,
            Err(err) => {
                let failure = SubmitError::Persistence(err.to_string());
                self.set_status(SubmissionState::Error, failure.to_string());
                return Err(failure);
            }
        };

        if self.alive {
            self.existing = Some(ApplicationRecord {
                id: record_id.clone(),
                submission: payload.clone(),
                status: ApplicationStatus::Submitted,
                status_updated_at: Some(now),
                status_updated_by: None,
                admin_notes: None,
                notes_updated_at: None,
                notes_updated_by: None,
                created_at: now,
            });
            self.last_payload = Some(payload.clone());
        }

        let pdf = generate_registration_pdf(&self.config, &payload, now.date_naive())
            .await
            .map_err(|err| {
                let failure = SubmitError::Render(err.to_string());
                self.set_status(SubmissionState::Error, failure.to_string());
                failure
            })?;

        let file = DownloadFile {
            file_name: pdf_file_name(&self.config, &payload.full_name),
            content_type: "application/pdf".into(),
            bytes: pdf,
        };

        if self.alive {
            self.form = RegistrationForm::default();
            self.photo = None;
        }
        self.set_status(
            SubmissionState::Success,
            "Registration submitted. Your PDF form has been downloaded.",
        );
        info!(%record_id, "registration submitted");

        Ok(CompletedSubmission { record_id, file })
    }

    /// Re-renders the PDF for the already-submitted payload. `None` when
    /// nothing has been submitted in or before this session.
    pub async fn download_pdf_again(
        &self,
        today: NaiveDate,
    ) -> Result<Option<DownloadFile>, SubmitError> {
        let payload = self
            .last_payload
            .as_ref()
            .or(self.existing.as_ref().map(|record| &record.submission));
        let Some(payload) = payload else {
            return Ok(None);
        };
        let pdf = generate_registration_pdf(&self.config, payload, today)
            .await
            .map_err(|err| SubmitError::Render(err.to_string()))?;
        Ok(Some(DownloadFile {
            file_name: pdf_file_name(&self.config, &payload.full_name),
            content_type: "application/pdf".into(),
            bytes: pdf,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::{MemoryBlobStore, MemoryDocumentStore, StaticAuthProvider};
    use bytes::Bytes;
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 23, 16, 5, 0).unwrap()
    }

    fn verified_identity() -> Identity {
        Identity {
            uid: "uid-7".into(),
            email: Some("marisol@example.com".into()),
            display_name: Some("Marisol De la Cruz".into()),
            phone_number: None,
            photo_url: None,
            email_verified: true,
            provider_ids: vec!["password".into()],
        }
    }

    fn unverified_identity() -> Identity {
        Identity {
            email_verified: false,
            ..verified_identity()
        }
    }

    struct Harness {
        auth: Arc<StaticAuthProvider>,
        store: Arc<MemoryDocumentStore>,
        blobs: Arc<MemoryBlobStore>,
        session: RegistrationSession,
    }

    fn harness(identity: Identity) -> Harness {
        let auth = Arc::new(StaticAuthProvider::signed_in(identity));
        let store = Arc::new(MemoryDocumentStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let session = RegistrationSession::new(
            InstitutionConfig::default(),
            auth.clone(),
            store.clone(),
            blobs.clone(),
        );
        Harness { auth, store, blobs, session }
    }

    fn fill_valid_form(session: &mut RegistrationSession) {
        session.set_first_name("Marisol");
        session.set_last_name("De la Cruz");
        session.set_dob(NaiveDate::from_ymd_opt(2009, 9, 1));
        session.set_gender("female");
        session.set_address("14 Harbour View Rd, Apt #2");
        session.set_phone("(868) 555-0148");
        session.set_email("marisol@example.com");
        session.toggle_course("cnc-machining");
        session.set_schedule("weekday-evening");
        session.set_emergency_name("Rosa De la Cruz");
        session.set_emergency_phone("868-555-0149");
        session.set_guardian_name("Rosa De la Cruz");
        session.set_signature_typed("M. De la Cruz");
        session.attach_photo(PhotoUpload::new(
            "headshot.png",
            "image/png",
            Bytes::from_static(&[0u8; 64]),
        ));
    }

    #[tokio::test]
    async fn submit_before_first_session_snapshot_is_deferred() {
        let mut h = harness(verified_identity());
        fill_valid_form(&mut h.session);
        let err = h.session.submit(now()).await.unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Gating(GatingError::VerificationPending)
        ));
        assert_eq!(h.store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unverified_account_cannot_submit() {
        let mut h = harness(unverified_identity());
        h.session.handle_session_change(Some(unverified_identity())).await;
        fill_valid_form(&mut h.session);
        let err = h.session.submit(now()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Gating(GatingError::NotVerified)));
        assert_eq!(
            err.to_string(),
            "Please sign in and verify your account before submitting."
        );
        assert_eq!(h.store.creates.load(Ordering::SeqCst), 0);
        assert_eq!(h.blobs.uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn verified_submission_uploads_persists_and_renders() {
        let mut h = harness(verified_identity());
        h.session.handle_session_change(Some(verified_identity())).await;
        fill_valid_form(&mut h.session);

        let done = h.session.submit(now()).await.unwrap();
        assert_eq!(h.blobs.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.record_count(), 1);
        assert_eq!(
            done.file.file_name,
            "next-gen-registration-marisol-de-la-cruz.pdf"
        );
        assert_eq!(done.file.content_type, "application/pdf");
        assert!(done.file.bytes.starts_with(b"%PDF"));
        assert_eq!(h.session.status().state, SubmissionState::Success);
        assert!(h.session.is_locked());
        // Draft is cleared after success.
        assert!(h.session.form().first_name.is_empty());
    }

    #[tokio::test]
    async fn second_submission_is_blocked() {
        let mut h = harness(verified_identity());
        h.session.handle_session_change(Some(verified_identity())).await;
        fill_valid_form(&mut h.session);
        h.session.submit(now()).await.unwrap();

        fill_valid_form(&mut h.session);
        let err = h.session.submit(now()).await.unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Gating(GatingError::AlreadySubmitted)
        ));
        assert_eq!(h.store.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn existing_record_locks_session_on_sign_in() {
        let h = harness(verified_identity());
        let mut first = h.session;
        first.handle_session_change(Some(verified_identity())).await;
        fill_valid_form(&mut first);
        first.submit(now()).await.unwrap();

        let mut second = RegistrationSession::new(
            InstitutionConfig::default(),
            h.auth.clone(),
            h.store.clone(),
            h.blobs.clone(),
        );
        second.handle_session_change(Some(verified_identity())).await;
        assert!(second.is_locked());
        let again = second
            .download_pdf_again(now().date_naive())
            .await
            .unwrap()
            .unwrap();
        assert!(again.bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn failed_upload_leaves_no_record() {
        let mut h = harness(verified_identity());
        h.blobs.fail_uploads.store(true, Ordering::SeqCst);
        h.session.handle_session_change(Some(verified_identity())).await;
        fill_valid_form(&mut h.session);

        let err = h.session.submit(now()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Upload(_)));
        assert_eq!(h.store.creates.load(Ordering::SeqCst), 0);
        assert!(!h.session.is_locked());
        assert_eq!(h.session.status().state, SubmissionState::Error);
    }

    #[tokio::test]
    async fn failed_create_surfaces_persistence_error() {
        let mut h = harness(verified_identity());
        h.store.fail_creates.store(true, Ordering::SeqCst);
        h.session.handle_session_change(Some(verified_identity())).await;
        fill_valid_form(&mut h.session);

        let err = h.session.submit(now()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Persistence(_)));
        assert_eq!(h.blobs.uploads.load(Ordering::SeqCst), 1);
        assert!(!h.session.is_locked());
    }

    #[tokio::test]
    async fn invalid_form_reports_field_errors() {
        let mut h = harness(verified_identity());
        h.session.handle_session_change(Some(verified_identity())).await;

        let err = h.session.submit(now()).await.unwrap_err();
        assert_eq!(err.to_string(), "Please correct the highlighted fields.");
        assert!(h.session.errors().contains_key("firstName"));
        assert!(h.session.errors().contains_key("studentPhoto"));
        assert_eq!(h.store.creates.load(Ordering::SeqCst), 0);

        // Editing the offending field clears its error.
        h.session.set_first_name("Marisol");
        assert!(!h.session.errors().contains_key("firstName"));
    }

    #[tokio::test]
    async fn phone_input_is_sanitized_at_entry() {
        let mut h = harness(verified_identity());
        h.session.set_phone("+1 (868) 555-0148 ext. 22");
        assert_eq!(h.session.form().phone, "1868555014822");
        h.session.set_phone("12345678901234567890");
        assert_eq!(h.session.form().phone.len(), 15);
    }

    #[tokio::test]
    async fn rejected_photo_keeps_previous_one() {
        let mut h = harness(verified_identity());
        h.session.attach_photo(PhotoUpload::new(
            "ok.png",
            "image/png",
            Bytes::from_static(&[0u8; 16]),
        ));
        assert!(h.session.errors().get("studentPhoto").is_none());

        h.session.attach_photo(PhotoUpload::new(
            "bad.gif",
            "image/gif",
            Bytes::from_static(&[0u8; 16]),
        ));
        assert_eq!(
            h.session.errors().get("studentPhoto").unwrap(),
            "Upload a PNG, JPG, or WebP image file."
        );
        assert!(h.session.photo.is_some());
    }

    #[tokio::test]
    async fn resend_verification_reaches_provider_once() {
        let mut h = harness(unverified_identity());
        h.session.handle_session_change(Some(unverified_identity())).await;
        h.session.resend_verification().await;
        assert!(h.session.verification_sent());
        assert_eq!(h.auth.verification_sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sign_out_clears_lock_state() {
        let mut h = harness(verified_identity());
        h.session.handle_session_change(Some(verified_identity())).await;
        fill_valid_form(&mut h.session);
        h.session.submit(now()).await.unwrap();
        assert!(h.session.is_locked());

        h.session.handle_session_change(None).await;
        assert!(!h.session.is_locked());
        assert!(h.session.identity().is_none());
    }
}
