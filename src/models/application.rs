use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::identity::AdminActor;

/// Review status assigned by admissions staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Submitted,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selected course resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSelection {
    pub id: String,
    pub title: String,
}

/// Descriptor of the uploaded student photo. Depending on deployment the
/// blob store hands back a remote URL or inlined encoded data; the PDF
/// renderer accepts either.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPhoto {
    pub url: Option<String>,
    /// Inlined image as a data URL or bare base64, when no URL exists.
    pub data: Option<String>,
    pub path: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl StudentPhoto {
    /// Preferred source for rendering: inlined data wins over the URL,
    /// mirroring how the record was displayed originally.
    pub fn source(&self) -> Option<&str> {
        self.data.as_deref().or(self.url.as_deref())
    }
}

/// Auth metadata attached to a submission when an identity is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthMeta {
    pub auth_uid: String,
    pub auth_email: String,
    pub auth_provider: String,
    pub auth_verified: bool,
}

/// Normalized, immutable submission. Built once per attempt, persisted as
/// the application record body, and the sole input to PDF regeneration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub dob: NaiveDate,
    pub gender: String,
    pub gender_label: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub school: String,
    pub courses: Vec<CourseSelection>,
    pub schedule: String,
    pub schedule_label: String,
    pub emergency_name: String,
    pub emergency_phone: String,
    pub guardian_name: String,
    pub signature_typed: String,
    pub signature_drawn: Option<String>,
    pub age: i32,
    pub is_minor: bool,
    pub submitted_at: DateTime<Utc>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthMeta>,
    pub student_photo: StudentPhoto,
}

/// A persisted application plus admin-assigned review fields. Owned by the
/// document store; mutated only through admin actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    pub id: String,
    #[serde(flatten)]
    pub submission: SubmissionPayload,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub status_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status_updated_by: Option<AdminActor>,
    #[serde(default)]
    pub admin_notes: Option<String>,
    #[serde(default)]
    pub notes_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes_updated_by: Option<AdminActor>,
    pub created_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn display_name(&self) -> &str {
        if self.submission.full_name.trim().is_empty() {
            "this account"
        } else {
            &self.submission.full_name
        }
    }
}

/// Typed patch applied by `DocumentStore::update_record`. Each admin action
/// touches only its own fields.
#[derive(Debug, Clone)]
pub enum RecordPatch {
    Status {
        status: ApplicationStatus,
        updated_at: DateTime<Utc>,
        updated_by: AdminActor,
    },
    Notes {
        notes: String,
        updated_at: DateTime<Utc>,
        updated_by: AdminActor,
    },
}

/// An outbound file offered to the user as a download.
#[derive(Debug, Clone)]
pub struct DownloadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}
