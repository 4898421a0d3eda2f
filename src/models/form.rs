use bytes::Bytes;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Mutable registration draft owned by the UI session. Field values hold
/// whatever the user has typed so far; sanitization happens at input time
/// in the session, validation at submit time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<NaiveDate>,
    pub gender: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub school: String,
    /// Selected course ids in click order; payload construction resolves
    /// them to catalog order.
    pub courses: Vec<String>,
    pub schedule: String,
    pub emergency_name: String,
    pub emergency_phone: String,
    pub guardian_name: String,
    pub signature_typed: String,
    /// Drawn signature as a PNG data URL captured from the signature pad.
    pub signature_drawn: Option<String>,
}

impl RegistrationForm {
    pub fn toggle_course(&mut self, course_id: &str) {
        if let Some(pos) = self.courses.iter().position(|id| id == course_id) {
            self.courses.remove(pos);
        } else {
            self.courses.push(course_id.to_string());
        }
    }
}

/// A photo file held in memory before upload (the UI's draft copy).
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl PhotoUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_course_adds_and_removes() {
        let mut form = RegistrationForm::default();
        form.toggle_course("electronics");
        form.toggle_course("cnc-machining");
        assert_eq!(form.courses, vec!["electronics", "cnc-machining"]);
        form.toggle_course("electronics");
        assert_eq!(form.courses, vec!["cnc-machining"]);
    }
}
