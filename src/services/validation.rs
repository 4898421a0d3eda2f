//! Pure field validation and input sanitization. Everything here is a
//! function of the form draft, the injected config, and "today".

use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    config::InstitutionConfig,
    error::ValidationErrors,
    models::form::{PhotoUpload, RegistrationForm},
};

lazy_static! {
    // Character classes only; the "must contain a letter (or digit)"
    // requirement is checked separately because the regex crate has no
    // lookahead.
    static ref NAME_CHARSET: Regex = Regex::new(r"^[\p{L}\p{M}'’ -]+$").expect("static regex");
    static ref ADDRESS_CHARSET: Regex =
        Regex::new(r"^[\p{L}\p{M}0-9\s.,#'’/-]+$").expect("static regex");
    static ref SCHOOL_CHARSET: Regex =
        Regex::new(r"^[\p{L}\p{M}0-9\s.&'’(),/-]+$").expect("static regex");
    static ref SIGNATURE_CHARSET: Regex =
        Regex::new(r"^[\p{L}\p{M}.'’ -]+$").expect("static regex");
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex");
    static ref DIGITS_ONLY: Regex = Regex::new(r"^[0-9]+$").expect("static regex");
}

fn has_letter(value: &str) -> bool {
    value.chars().any(|c| c.is_alphabetic())
}

fn has_letter_or_digit(value: &str) -> bool {
    value.chars().any(|c| c.is_alphanumeric())
}

pub fn is_valid_name(value: &str) -> bool {
    NAME_CHARSET.is_match(value) && has_letter(value)
}

pub fn is_valid_address(value: &str) -> bool {
    ADDRESS_CHARSET.is_match(value) && has_letter_or_digit(value)
}

pub fn is_valid_school(value: &str) -> bool {
    SCHOOL_CHARSET.is_match(value) && has_letter_or_digit(value)
}

pub fn is_valid_signature(value: &str) -> bool {
    SIGNATURE_CHARSET.is_match(value) && has_letter(value)
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value)
}

/// Strips non-digits and caps the result. Applied at input time, so phone
/// fields never hold anything validation would reject for shape.
pub fn sanitize_digits(raw: &str, max_digits: usize) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit())
        .take(max_digits)
        .collect()
}

/// Drops characters outside the name charset as the user types.
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .filter(|&c| {
            c.is_alphabetic()
                || unicode_combining(c)
                || matches!(c, '\'' | '’' | ' ' | '-')
        })
        .collect()
}

fn unicode_combining(c: char) -> bool {
    // Combining marks land in these blocks for the scripts the form accepts.
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' | '\u{20D0}'..='\u{20FF}')
}

/// Calendar-aware integer age: year difference minus one if the month/day
/// has not come around yet.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}

pub fn is_minor(dob: NaiveDate, today: NaiveDate, adult_age: i32) -> bool {
    age_on(dob, today) < adult_age
}

/// Photo checks shared by input-time handling and submit-time validation.
pub fn validate_photo(
    photo: Option<&PhotoUpload>,
    config: &InstitutionConfig,
) -> Option<String> {
    let Some(photo) = photo else {
        return Some("Student photo is required.".into());
    };
    if !config.photo_type_allowed(&photo.content_type) {
        return Some("Upload a PNG, JPG, or WebP image file.".into());
    }
    if photo.size() > config.max_photo_bytes {
        return Some("Image must be 512KB or smaller.".into());
    }
    None
}

/// Validates a draft once gating has passed. Returns one message per
/// offending field, keyed by the camelCase field name.
pub fn validate(
    form: &RegistrationForm,
    photo: Option<&PhotoUpload>,
    config: &InstitutionConfig,
    today: NaiveDate,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    let first_name = form.first_name.trim();
    let last_name = form.last_name.trim();
    let address = form.address.trim();
    let school = form.school.trim();
    let signature_typed = form.signature_typed.trim();
    let emergency_name = form.emergency_name.trim();
    let guardian_name = form.guardian_name.trim();

    if first_name.is_empty() {
        errors.insert("firstName".into(), "First name is required.".into());
    } else if !is_valid_name(first_name) {
        errors.insert(
            "firstName".into(),
            "Use letters, spaces, hyphens, and apostrophes only.".into(),
        );
    }

    if last_name.is_empty() {
        errors.insert("lastName".into(), "Last name is required.".into());
    } else if !is_valid_name(last_name) {
        errors.insert(
            "lastName".into(),
            "Use letters, spaces, hyphens, and apostrophes only.".into(),
        );
    }

    match form.dob {
        None => {
            errors.insert("dob".into(), "Date of birth is required.".into());
        }
        Some(dob) if age_on(dob, today) < config.min_age => {
            errors.insert(
                "dob".into(),
                format!("Student must be at least {} years old.", config.min_age),
            );
        }
        Some(_) => {}
    }

    if form.gender.is_empty() {
        errors.insert("gender".into(), "Gender is required.".into());
    } else if !config.allowed_gender_values.contains(&form.gender.as_str()) {
        errors.insert(
            "gender".into(),
            "Please select either Female or Male.".into(),
        );
    }

    if address.is_empty() {
        errors.insert("address".into(), "Address is required.".into());
    } else if !is_valid_address(address) {
        errors.insert(
            "address".into(),
            "Use letters, numbers, spaces, and common punctuation only.".into(),
        );
    }

    if form.phone.trim().is_empty() {
        errors.insert("phone".into(), "Phone number is required.".into());
    } else if !DIGITS_ONLY.is_match(&form.phone) {
        errors.insert("phone".into(), "Phone number can only contain numbers.".into());
    }

    if form.email.trim().is_empty() {
        errors.insert("email".into(), "Email address is required.".into());
    } else if !is_valid_email(&form.email) {
        errors.insert("email".into(), "Enter a valid email address.".into());
    }

    if form.courses.is_empty() {
        errors.insert("courses".into(), "Select at least one course.".into());
    }
    if form.schedule.is_empty() {
        errors.insert("schedule".into(), "Choose a preferred schedule.".into());
    }

    if let Some(message) = validate_photo(photo, config) {
        errors.insert("studentPhoto".into(), message);
    }

    if !school.is_empty() && !is_valid_school(school) {
        errors.insert(
            "school".into(),
            "Use letters, numbers, and common punctuation only.".into(),
        );
    }

    if emergency_name.is_empty() {
        errors.insert(
            "emergencyName".into(),
            "Emergency contact name is required.".into(),
        );
    } else if !is_valid_name(emergency_name) {
        errors.insert(
            "emergencyName".into(),
            "Use letters, spaces, hyphens, and apostrophes only.".into(),
        );
    }

    if form.emergency_phone.trim().is_empty() {
        errors.insert(
            "emergencyPhone".into(),
            "Emergency contact phone is required.".into(),
        );
    } else if !DIGITS_ONLY.is_match(&form.emergency_phone) {
        errors.insert(
            "emergencyPhone".into(),
            "Emergency contact phone can only contain numbers.".into(),
        );
    }

    let requires_guardian = form
        .dob
        .map(|dob| is_minor(dob, today, config.adult_age))
        .unwrap_or(false);
    if requires_guardian && guardian_name.is_empty() {
        errors.insert(
            "guardianName".into(),
            "Guardian name is required for minors.".into(),
        );
    } else if !guardian_name.is_empty() && !is_valid_name(guardian_name) {
        errors.insert(
            "guardianName".into(),
            "Use letters, spaces, hyphens, and apostrophes only.".into(),
        );
    }

    if !signature_typed.is_empty() && !is_valid_signature(signature_typed) {
        errors.insert(
            "signatureTyped".into(),
            "Use letters, spaces, periods, hyphens, and apostrophes only.".into(),
        );
    }

    errors
}
