//! Submission payload construction plus the slug/filename helpers shared by
//! the PDF download, the blob storage path, and the CSV export.

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    config::InstitutionConfig,
    models::{
        application::{AuthMeta, CourseSelection, StudentPhoto, SubmissionPayload},
        form::RegistrationForm,
        identity::Identity,
    },
    services::validation::{age_on, is_minor},
};

/// Builds the normalized payload from a validated draft. The caller passes
/// the checked date of birth separately so this stays total over its
/// inputs. Courses come back in catalog order regardless of click order;
/// gender/schedule codes resolve to display labels with explicit
/// fallbacks. The photo descriptor is filled in after the blob upload.
pub fn build_payload(
    form: &RegistrationForm,
    dob: NaiveDate,
    identity: Option<&Identity>,
    config: &InstitutionConfig,
    now: DateTime<Utc>,
) -> SubmissionPayload {
    let first_name = form.first_name.trim().to_string();
    let last_name = form.last_name.trim().to_string();
    let full_name = [first_name.as_str(), last_name.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    let courses = config
        .courses
        .iter()
        .filter(|course| form.courses.iter().any(|id| id == course.id))
        .map(|course| CourseSelection {
            id: course.id.to_string(),
            title: course.title.to_string(),
        })
        .collect();

    let today = now.date_naive();
    let age = age_on(dob, today);

    let auth = identity.map(|user| AuthMeta {
        auth_uid: user.uid.clone(),
        auth_email: user.email.clone().unwrap_or_default(),
        auth_provider: user.primary_provider().to_string(),
        auth_verified: user.is_verified(),
    });

    SubmissionPayload {
        first_name,
        last_name,
        full_name,
        dob,
        gender: form.gender.clone(),
        gender_label: config
            .gender_label(&form.gender)
            .unwrap_or("Not specified")
            .to_string(),
        address: form.address.trim().to_string(),
        phone: form.phone.trim().to_string(),
        email: form.email.trim().to_string(),
        school: form.school.trim().to_string(),
        courses,
        schedule: form.schedule.clone(),
        schedule_label: config
            .schedule_label(&form.schedule)
            .unwrap_or("Not selected")
            .to_string(),
        emergency_name: form.emergency_name.trim().to_string(),
        emergency_phone: form.emergency_phone.trim().to_string(),
        guardian_name: form.guardian_name.trim().to_string(),
        signature_typed: form.signature_typed.trim().to_string(),
        signature_drawn: form.signature_drawn.clone(),
        age,
        is_minor: is_minor(dob, today, config.adult_age),
        submitted_at: now,
        auth,
        student_photo: StudentPhoto::default(),
    }
}

/// Lowercased, space-to-hyphen form of the applicant's name; "student" when
/// the name is empty.
pub fn applicant_slug(full_name: &str) -> String {
    let trimmed = full_name.trim();
    if trimmed.is_empty() {
        return "student".into();
    }
    trimmed
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Filesystem-safe derivation used in blob paths: non-alphanumerics collapse
/// to hyphens, leading/trailing hyphens drop.
fn storage_slug(value: &str, keep_dots: bool) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_hyphen = true;
    for c in value.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || (keep_dots && c == '.') {
            out.push(c);
            last_hyphen = false;
        } else if !last_hyphen {
            out.push('-');
            last_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Blob path for an uploaded student photo:
/// `applications/<uid>/<millis>-<name-slug>-<file-slug>`.
pub fn photo_storage_path(
    file_name: &str,
    applicant_name: &str,
    auth_uid: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let name_slug = {
        let slug = storage_slug(applicant_name, false);
        if slug.is_empty() { "student".into() } else { slug }
    };
    let file_slug = {
        let slug = storage_slug(file_name, true);
        if slug.is_empty() { "photo".into() } else { slug }
    };
    let uid_segment = auth_uid.filter(|uid| !uid.is_empty()).unwrap_or("guest");
    format!(
        "applications/{uid_segment}/{}-{name_slug}-{file_slug}",
        now.timestamp_millis()
    )
}

pub fn pdf_file_name(config: &InstitutionConfig, full_name: &str) -> String {
    format!("{}-registration-{}.pdf", config.slug, applicant_slug(full_name))
}

pub fn csv_file_name(config: &InstitutionConfig, date: NaiveDate) -> String {
    format!("{}-applications-{}.csv", config.slug, date.format("%Y-%m-%d"))
}

/// "Aug 23, 2026", the short en-US date used on the PDF and in exports.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}

/// "Aug 23, 2026, 4:05 PM", timestamps shown on the dashboard and in CSV.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%b %-d, %Y, %-I:%M %p").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> InstitutionConfig {
        InstitutionConfig::default()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 23, 16, 5, 0).unwrap()
    }

    fn form() -> RegistrationForm {
        RegistrationForm {
            first_name: "  Marisol ".into(),
            last_name: " De la Cruz ".into(),
            dob: NaiveDate::from_ymd_opt(2009, 9, 1),
            gender: "female".into(),
            address: " 14 Harbour View Rd ".into(),
            phone: "8685550148".into(),
            email: "marisol@example.com".into(),
            school: String::new(),
            courses: vec!["csec-electrical".into(), "cnc-machining".into()],
            schedule: "weekday-evening".into(),
            emergency_name: "Rosa De la Cruz".into(),
            emergency_phone: "8685550149".into(),
            guardian_name: "Rosa De la Cruz".into(),
            signature_typed: "M. De la Cruz".into(),
            signature_drawn: None,
        }
    }

    fn build(draft: &RegistrationForm) -> SubmissionPayload {
        build_payload(draft, draft.dob.unwrap(), None, &config(), now())
    }

    #[test]
    fn courses_resolve_in_catalog_order() {
        // Selection order is csec-electrical first, but the catalog lists
        // cnc-machining before csec-electrical.
        let payload = build(&form());
        let ids: Vec<_> = payload.courses.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["cnc-machining", "csec-electrical"]);
        assert_eq!(payload.courses[0].title, "CNC Machining");
    }

    #[test]
    fn payload_normalizes_and_derives() {
        let payload = build(&form());
        assert_eq!(payload.first_name, "Marisol");
        assert_eq!(payload.full_name, "Marisol De la Cruz");
        assert_eq!(payload.address, "14 Harbour View Rd");
        assert_eq!(payload.age, 16);
        assert!(payload.is_minor);
        assert_eq!(payload.gender_label, "Female");
        assert_eq!(payload.schedule_label, "Weekday evenings (5:30pm - 8:30pm)");
        assert!(payload.auth.is_none());
    }

    #[test]
    fn unknown_codes_fall_back_to_placeholders() {
        let mut draft = form();
        draft.gender = "unlisted".into();
        draft.schedule = "someday".into();
        let payload = build(&draft);
        assert_eq!(payload.gender_label, "Not specified");
        assert_eq!(payload.schedule_label, "Not selected");
    }

    #[test]
    fn minor_flag_flips_at_eighteen() {
        let mut draft = form();
        draft.dob = NaiveDate::from_ymd_opt(2008, 8, 23);
        let payload = build(&draft);
        assert_eq!(payload.age, 18);
        assert!(!payload.is_minor);

        draft.dob = NaiveDate::from_ymd_opt(2008, 8, 24);
        let payload = build(&draft);
        assert_eq!(payload.age, 17);
        assert!(payload.is_minor);
    }

    #[test]
    fn applicant_slug_rules() {
        assert_eq!(applicant_slug("Marisol De la Cruz"), "marisol-de-la-cruz");
        assert_eq!(applicant_slug("  Ada   Lovelace  "), "ada-lovelace");
        assert_eq!(applicant_slug("   "), "student");
        assert_eq!(
            pdf_file_name(&config(), "Marisol De la Cruz"),
            "next-gen-registration-marisol-de-la-cruz.pdf"
        );
        assert_eq!(pdf_file_name(&config(), ""), "next-gen-registration-student.pdf");
    }

    #[test]
    fn storage_path_is_filesystem_safe() {
        let path = photo_storage_path("My Photo (1).PNG", "Marisol De la Cruz", Some("uid-9"), now());
        assert_eq!(
            path,
            format!(
                "applications/uid-9/{}-marisol-de-la-cruz-my-photo-1-.png",
                now().timestamp_millis()
            )
        );
        let guest = photo_storage_path("", "", None, now());
        assert!(guest.starts_with("applications/guest/"));
        assert!(guest.ends_with("-student-photo"));
    }

    #[test]
    fn csv_file_name_uses_iso_date() {
        assert_eq!(
            csv_file_name(&config(), NaiveDate::from_ymd_opt(2026, 8, 23).unwrap()),
            "next-gen-applications-2026-08-23.csv"
        );
    }
}
