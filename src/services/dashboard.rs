//! Admin dashboard logic: role gating, live record snapshots, filtering and
//! stats, per-row review actions, and the CSV/PDF downloads. Rendering is
//! the embedder's job; this session only owns the state.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{info, warn};

use crate::{
    config::InstitutionConfig,
    error::{BlobError, StoreError},
    models::{
        application::{ApplicationRecord, ApplicationStatus, DownloadFile, RecordPatch},
        identity::{AdminActor, Identity},
    },
    providers::{AuthProvider, BlobStore, DocumentStore},
    services::{
        export::render_csv,
        payload::{csv_file_name, pdf_file_name},
        pdf::generate_registration_pdf,
    },
};

/// Whether the signed-in account may see the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    Checking,
    SignedOut,
    Denied,
    Granted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinorFilter {
    #[default]
    All,
    MinorsOnly,
    AdultsOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateRangeFilter {
    #[default]
    All,
    /// Records created within the last N days.
    Days(u32),
}

/// Filter panel state. All filters are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct ApplicationFilters {
    pub search: String,
    pub course: Option<String>,
    pub schedule: Option<String>,
    pub status: Option<ApplicationStatus>,
    pub minor: MinorFilter,
    pub date_range: DateRangeFilter,
}

impl ApplicationFilters {
    fn matches(&self, record: &ApplicationRecord, now: DateTime<Utc>) -> bool {
        let s = &record.submission;

        let needle = self.search.trim().to_lowercase();
        if !needle.is_empty() {
            let haystacks = [
                s.full_name.as_str(),
                s.email.as_str(),
                s.phone.as_str(),
                s.school.as_str(),
                s.guardian_name.as_str(),
            ];
            if !haystacks
                .iter()
                .any(|h| h.to_lowercase().contains(&needle))
            {
                return false;
            }
        }

        if let Some(course) = &self.course {
            if !s.courses.iter().any(|c| &c.id == course) {
                return false;
            }
        }
        if let Some(schedule) = &self.schedule {
            if &s.schedule != schedule {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        match self.minor {
            MinorFilter::All => {}
            MinorFilter::MinorsOnly if !s.is_minor => return false,
            MinorFilter::AdultsOnly if s.is_minor => return false,
            _ => {}
        }
        if let DateRangeFilter::Days(days) = self.date_range {
            if record.created_at < now - Duration::days(days as i64) {
                return false;
            }
        }
        true
    }
}

/// Aggregate counters shown above the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub minors: usize,
}

pub struct DashboardSession {
    config: InstitutionConfig,
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,

    identity: Option<Identity>,
    access: AccessState,

    records: Vec<ApplicationRecord>,
    records_loaded: bool,
    data_error: Option<String>,

    pub filters: ApplicationFilters,
    /// Unsaved notes text per record id, surviving snapshot refreshes.
    notes_drafts: HashMap<String, String>,

    updating_ids: HashSet<String>,
    saving_ids: HashSet<String>,
    deleting_ids: HashSet<String>,

    alive: bool,
}

impl DashboardSession {
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
            identity: None,
            access: AccessState::Checking,
            records: Vec::new(),
            records_loaded: false,
            data_error: None,
            filters: ApplicationFilters::default(),
            notes_drafts: HashMap::new(),
            updating_ids: HashSet::new(),
            saving_ids: HashSet::new(),
            deleting_ids: HashSet::new(),
            alive: true,
        }
    }

    pub fn access(&self) -> AccessState {
        self.access
    }

    pub fn records(&self) -> &[ApplicationRecord] {
        &self.records
    }

    pub fn records_loaded(&self) -> bool {
        self.records_loaded
    }

    pub fn data_error(&self) -> Option<&str> {
        self.data_error.as_deref()
    }

    pub fn is_row_busy(&self, id: &str) -> bool {
        self.updating_ids.contains(id)
            || self.saving_ids.contains(id)
            || self.deleting_ids.contains(id)
    }

    pub fn close(&mut self) {
        self.alive = false;
    }

    pub async fn sign_out(&mut self) {
        if let Err(err) = self.auth.sign_out().await {
            warn!("sign-out failed: {err}");
        }
    }

    /// Resolves the profile role for a new session snapshot. Only a stored
    /// profile with the admin role opens the dashboard; a missing profile
    /// or a lookup failure denies access.
    pub async fn handle_session_change(&mut self, identity: Option<Identity>) {
        self.identity = identity.clone();
        let Some(identity) = identity else {
            self.access = AccessState::SignedOut;
            self.records.clear();
            self.records_loaded = false;
            return;
        };
        self.access = AccessState::Checking;
        let profile = self.store.get_user_profile(&identity.uid).await;
        if !self.alive {
            return;
        }
        self.access = match profile {
            Ok(Some(profile)) if profile.is_admin() => AccessState::Granted,
            Ok(_) => AccessState::Denied,
            Err(err) => {
                warn!("profile lookup failed for {}: {err}", identity.uid);
                AccessState::Denied
            }
        };
    }

    /// Feeds one snapshot from `DocumentStore::listen_to_records`. Drafted
    /// notes survive the refresh; drafts for deleted records drop.
    pub fn apply_snapshot(&mut self, snapshot: Result<Vec<ApplicationRecord>, StoreError>) {
        match snapshot {
            Ok(records) => {
                self.notes_drafts
                    .retain(|id, _| records.iter().any(|r| &r.id == id));
                self.records = records;
                self.records_loaded = true;
                self.data_error = None;
            }
            Err(err) => {
                self.data_error = Some(err.to_string());
            }
        }
    }

    pub fn filtered(&self, now: DateTime<Utc>) -> Vec<&ApplicationRecord> {
        self.records
            .iter()
            .filter(|record| self.filters.matches(record, now))
            .collect()
    }

    pub fn stats(&self) -> DashboardStats {
        let total = self.records.len();
        let approved = self
            .records
            .iter()
            .filter(|r| r.status == ApplicationStatus::Approved)
            .count();
        let rejected = self
            .records
            .iter()
            .filter(|r| r.status == ApplicationStatus::Rejected)
            .count();
        let minors = self
            .records
            .iter()
            .filter(|r| r.submission.is_minor)
            .count();
        DashboardStats {
            total,
            pending: total - approved - rejected,
            approved,
            rejected,
            minors,
        }
    }

    pub fn note_draft(&self, id: &str) -> Option<&str> {
        self.notes_drafts.get(id).map(String::as_str)
    }

    pub fn set_note_draft(&mut self, id: &str, text: &str) {
        self.notes_drafts.insert(id.to_string(), text.to_string());
    }

    fn actor(&self) -> Option<AdminActor> {
        self.identity.as_ref().map(AdminActor::from_identity)
    }

    /// Sets the review status on one record. Errors land in `data_error`
    /// and leave the table untouched; the next snapshot reconciles.
    pub async fn update_status(
        &mut self,
        id: &str,
        status: ApplicationStatus,
        now: DateTime<Utc>,
    ) {
        let Some(actor) = self.actor() else {
            return;
        };
        if !self.updating_ids.insert(id.to_string()) {
            return;
        }
        let patch = RecordPatch::Status { status, updated_at: now, updated_by: actor };
        let result = self.store.update_record(id, &patch).await;
        if !self.alive {
            return;
        }
        self.updating_ids.remove(id);
        if let Err(err) = result {
            self.data_error = Some(err.to_string());
        }
    }

    /// Persists the drafted notes for one record.
    pub async fn save_notes(&mut self, id: &str, now: DateTime<Utc>) {
        let Some(actor) = self.actor() else {
            return;
        };
        let Some(notes) = self.notes_drafts.get(id).cloned() else {
            return;
        };
        if !self.saving_ids.insert(id.to_string()) {
            return;
        }
        let patch = RecordPatch::Notes { notes, updated_at: now, updated_by: actor };
        let result = self.store.update_record(id, &patch).await;
        if !self.alive {
            return;
        }
        self.saving_ids.remove(id);
        match result {
            Ok(()) => {
                self.notes_drafts.remove(id);
            }
            Err(err) => self.data_error = Some(err.to_string()),
        }
    }

    /// Deletes a record and its stored photo. A photo that is already gone
    /// does not block the record delete, but a backend failure aborts the
    /// cascade so the blob is not orphaned by a half-done delete.
    pub async fn delete(&mut self, id: &str) {
        if !self.deleting_ids.insert(id.to_string()) {
            return;
        }
        let photo_path = self
            .records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.submission.student_photo.path.clone())
            .unwrap_or_default();

        if !photo_path.is_empty() {
            match self.blobs.delete(&photo_path).await {
                Ok(()) | Err(BlobError::NotFound(_)) => {}
                Err(err) => {
                    warn!("photo delete failed for {photo_path}: {err}");
                    if self.alive {
                        self.deleting_ids.remove(id);
                        self.data_error = Some(err.to_string());
                    }
                    return;
                }
            }
        }

        let result = self.store.delete_record(id).await;
        if !self.alive {
            return;
        }
        self.deleting_ids.remove(id);
        match result {
            Ok(()) => {
                info!(id, "application deleted");
                self.records.retain(|r| r.id != id);
                self.notes_drafts.remove(id);
            }
            Err(err) => self.data_error = Some(err.to_string()),
        }
    }

    /// CSV of the currently filtered rows; `None` when nothing matches.
    pub fn export_csv(&self, now: DateTime<Utc>) -> anyhow::Result<Option<DownloadFile>> {
        let rows = self.filtered(now);
        if rows.is_empty() {
            return Ok(None);
        }
        let bytes = render_csv(rows.into_iter(), &self.config)?;
        Ok(Some(DownloadFile {
            file_name: csv_file_name(&self.config, now.date_naive()),
            content_type: "text/csv".into(),
            bytes,
        }))
    }

    /// Regenerates the registration PDF for one record.
    pub async fn download_pdf(
        &self,
        record: &ApplicationRecord,
        today: NaiveDate,
    ) -> anyhow::Result<DownloadFile> {
        let bytes = generate_registration_pdf(&self.config, &record.submission, today).await?;
        Ok(DownloadFile {
            file_name: pdf_file_name(&self.config, &record.submission.full_name),
            content_type: "application/pdf".into(),
            bytes,
        })
    }
}
