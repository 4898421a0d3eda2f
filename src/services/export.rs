//! CSV export of application records for the admin dashboard. Column order
//! is fixed and every cell is quoted, so the file opens the same way in
//! every spreadsheet tool.

use anyhow::Context;
use csv::{QuoteStyle, WriterBuilder};

use crate::{config::InstitutionConfig, models::application::ApplicationRecord};

use super::payload::format_timestamp;

const HEADERS: [&str; 21] = [
    "id",
    "submittedAt",
    "fullName",
    "firstName",
    "lastName",
    "dob",
    "gender",
    "address",
    "phone",
    "email",
    "school",
    "schedule",
    "courses",
    "emergencyName",
    "emergencyPhone",
    "guardianName",
    "status",
    "studentPhotoUrl",
    "studentPhotoType",
    "studentPhotoSize",
    "adminNotes",
];

/// Serializes the given records in their given order.
pub fn render_csv<'a>(
    records: impl IntoIterator<Item = &'a ApplicationRecord>,
    config: &InstitutionConfig,
) -> anyhow::Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.write_record(HEADERS).context("csv header")?;

    for record in records {
        let s = &record.submission;
        let courses = s
            .courses
            .iter()
            .map(|c| c.title.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let gender: &str = match config.gender_label(&s.gender) {
            Some(label) => label,
            None => &s.gender,
        };
        let schedule: &str = match config.schedule_label(&s.schedule) {
            Some(label) => label,
            None => &s.schedule,
        };
        writer
            .write_record([
                record.id.as_str(),
                &format_timestamp(record.created_at),
                &s.full_name,
                &s.first_name,
                &s.last_name,
                &s.dob.to_string(),
                gender,
                &s.address,
                &s.phone,
                &s.email,
                &s.school,
                schedule,
                &courses,
                &s.emergency_name,
                &s.emergency_phone,
                &s.guardian_name,
                record.status.as_str(),
                s.student_photo.source().unwrap_or_default(),
                &s.student_photo.content_type,
                &s.student_photo.size.to_string(),
                record.admin_notes.as_deref().unwrap_or_default(),
            ])
            .context("csv row")?;
    }

    writer.into_inner().context("csv flush")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::application::{
        ApplicationStatus, CourseSelection, StudentPhoto, SubmissionPayload,
    };
    use chrono::{NaiveDate, TimeZone, Utc};

    fn record(id: &str, first: &str, last: &str) -> ApplicationRecord {
        let created = Utc.with_ymd_and_hms(2026, 8, 23, 16, 5, 0).unwrap();
        ApplicationRecord {
            id: id.into(),
            submission: SubmissionPayload {
                first_name: first.into(),
                last_name: last.into(),
                full_name: format!("{first} {last}"),
                dob: NaiveDate::from_ymd_opt(2009, 9, 1).unwrap(),
                gender: "female".into(),
                gender_label: "Female".into(),
                address: "14 Harbour View Rd, \"The Annex\"".into(),
                phone: "8685550148".into(),
                email: "m@example.com".into(),
                school: String::new(),
                courses: vec![
                    CourseSelection { id: "cnc-machining".into(), title: "CNC Machining".into() },
                    CourseSelection { id: "electronics".into(), title: "Electronics".into() },
                ],
                schedule: "weekday-evening".into(),
                schedule_label: "Weekday evenings (5:30pm - 8:30pm)".into(),
                emergency_name: "Rosa".into(),
                emergency_phone: "8685550149".into(),
                guardian_name: "Rosa".into(),
                signature_typed: "M.".into(),
                signature_drawn: None,
                age: 16,
                is_minor: true,
                submitted_at: created,
                auth: None,
                student_photo: StudentPhoto {
                    url: Some("https://blobs.example/p.png".into()),
                    content_type: "image/png".into(),
                    size: 2048,
                    ..StudentPhoto::default()
                },
            },
            status: ApplicationStatus::Submitted,
            status_updated_at: None,
            status_updated_by: None,
            admin_notes: Some("called home".into()),
            notes_updated_at: None,
            notes_updated_by: None,
            created_at: created,
        }
    }

    #[test]
    fn header_row_and_quoting() {
        let config = InstitutionConfig::default();
        let records = [record("a1", "Marisol", "De la Cruz"), record("a2", "Kai", "Persad")];
        let bytes = render_csv(records.iter(), &config).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("\"id\",\"submittedAt\",\"fullName\""));
        assert_eq!(header.matches(',').count(), 20);

        let first = lines.next().unwrap();
        assert!(first.contains("\"a1\""));
        assert!(first.contains("\"Marisol De la Cruz\""));
        assert!(first.contains("\"CNC Machining, Electronics\""));
        assert!(first.contains("\"Aug 23, 2026, 4:05 PM\""));
        // Embedded quotes double per RFC 4180.
        assert!(first.contains("\"\"The Annex\"\""));
        assert!(lines.next().is_some());
        assert!(lines.next().is_none());
    }

    #[test]
    fn inlined_photo_exports_its_data_source() {
        let config = InstitutionConfig::default();
        let mut rec = record("a1", "Kai", "Persad");
        rec.submission.student_photo.url = None;
        rec.submission.student_photo.data = Some("data:image/png;base64,AAAA".into());
        let text =
            String::from_utf8(render_csv(std::iter::once(&rec), &config).unwrap()).unwrap();
        assert!(text.contains("\"data:image/png;base64,AAAA\""));
    }

    #[test]
    fn unknown_codes_fall_back_to_raw_values() {
        let config = InstitutionConfig::default();
        let mut rec = record("a1", "Kai", "Persad");
        rec.submission.gender = "other".into();
        rec.submission.schedule = "someday".into();
        let text =
            String::from_utf8(render_csv(std::iter::once(&rec), &config).unwrap()).unwrap();
        assert!(text.contains("\"other\""));
        assert!(text.contains("\"someday\""));
    }
}
