use mime::Mime;

/// A course offered in the fixed catalog.
#[derive(Debug, Clone)]
pub struct Course {
    pub id: &'static str,
    pub title: &'static str,
    pub summary: &'static str,
    pub level: &'static str,
    pub duration: &'static str,
    pub track: &'static str,
    pub highlights: &'static [&'static str],
}

/// A value/label pair for enumerated form fields (schedules, genders).
#[derive(Debug, Clone)]
pub struct ChoiceOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// Immutable institution-wide configuration injected into the validator,
/// the PDF renderer, and both sessions. Tests vary policy (minimum age,
/// photo limits) here without touching logic.
#[derive(Debug, Clone)]
pub struct InstitutionConfig {
    pub name: String,
    pub subtitle: String,
    pub tagline: String,
    pub slug: String,
    pub disclaimer: String,
    pub min_age: i32,
    pub adult_age: i32,
    pub max_phone_digits: usize,
    pub max_photo_bytes: u64,
    pub allowed_photo_types: Vec<Mime>,
    pub courses: Vec<Course>,
    pub schedule_options: Vec<ChoiceOption>,
    pub gender_options: Vec<ChoiceOption>,
    pub allowed_gender_values: Vec<&'static str>,
    pub applications_collection: String,
    pub users_collection: String,
}

impl InstitutionConfig {
    pub fn course(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    pub fn schedule_label(&self, value: &str) -> Option<&'static str> {
        self.schedule_options
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label)
    }

    pub fn gender_label(&self, value: &str) -> Option<&'static str> {
        self.gender_options
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label)
    }

    pub fn photo_type_allowed(&self, content_type: &str) -> bool {
        match content_type.parse::<Mime>() {
            Ok(mime) => self
                .allowed_photo_types
                .iter()
                .any(|allowed| allowed.essence_str() == mime.essence_str()),
            Err(_) => false,
        }
    }
}

impl Default for InstitutionConfig {
    fn default() -> Self {
        Self {
            name: "NEXT-GEN ACADEMY".into(),
            subtitle: "Student Registration Form".into(),
            tagline: "Powered by GENR8-3D Ltd".into(),
            slug: "next-gen".into(),
            disclaimer: "This form confirms enrollment interest for NEXT-GEN ACADEMY \
                         and will be reviewed by admissions staff."
                .into(),
            min_age: 15,
            adult_age: 18,
            max_phone_digits: 15,
            max_photo_bytes: 512 * 1024,
            allowed_photo_types: vec![
                mime::IMAGE_PNG,
                mime::IMAGE_JPEG,
                "image/webp".parse().expect("static mime"),
            ],
            courses: vec![
                Course {
                    id: "cnc-machining",
                    title: "CNC Machining",
                    summary: "Program precision parts and master CNC workflows from CAD to production.",
                    level: "Core",
                    duration: "8 weeks",
                    track: "Manufacturing",
                    highlights: &["G-code fundamentals", "Toolpath strategies", "Material setup & fixturing"],
                },
                Course {
                    id: "electronics",
                    title: "Electronics",
                    summary: "Build circuits, troubleshoot systems, and work confidently with microcontrollers.",
                    level: "Core",
                    duration: "6 weeks",
                    track: "Electrical",
                    highlights: &["Circuit design", "Soldering labs", "Arduino & sensor projects"],
                },
                Course {
                    id: "3d-printing",
                    title: "3D Printing & Design",
                    summary: "Design, model, and fabricate components for rapid prototyping and product design.",
                    level: "Core",
                    duration: "6 weeks",
                    track: "Fabrication",
                    highlights: &["CAD modeling", "Print calibration", "Iterative prototyping"],
                },
                Course {
                    id: "game-creation",
                    title: "Video Game Creation",
                    summary: "Plan, design, and build interactive game experiences with storytelling and code.",
                    level: "Creative",
                    duration: "5 weeks",
                    track: "Digital",
                    highlights: &["Game design basics", "Level building", "Team showcase project"],
                },
                Course {
                    id: "csec-electrical",
                    title: "CSEC Electrical",
                    summary: "Prepare for CSEC exams with practical electrical theory and lab-driven revision.",
                    level: "Prep",
                    duration: "10 weeks",
                    track: "Certification",
                    highlights: &["Exam-focused labs", "Electrical theory", "Safety standards"],
                },
            ],
            schedule_options: vec![
                ChoiceOption { value: "weekday-morning", label: "Weekday mornings (8:00am - 12:00pm)" },
                ChoiceOption { value: "weekday-afternoon", label: "Weekday afternoons (1:00pm - 5:00pm)" },
                ChoiceOption { value: "weekday-evening", label: "Weekday evenings (5:30pm - 8:30pm)" },
                ChoiceOption { value: "weekend-morning", label: "Saturday mornings (9:00am - 1:00pm)" },
            ],
            gender_options: vec![
                ChoiceOption { value: "female", label: "Female" },
                ChoiceOption { value: "male", label: "Male" },
                ChoiceOption { value: "non-binary", label: "Non-binary" },
                ChoiceOption { value: "prefer-not", label: "Prefer not to say" },
            ],
            allowed_gender_values: vec!["female", "male"],
            applications_collection: "application".into(),
            users_collection: "users".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookups() {
        let config = InstitutionConfig::default();
        assert_eq!(config.course("electronics").unwrap().title, "Electronics");
        assert!(config.course("underwater-basket-weaving").is_none());
        assert_eq!(
            config.schedule_label("weekend-morning").unwrap(),
            "Saturday mornings (9:00am - 1:00pm)"
        );
        assert_eq!(config.gender_label("prefer-not").unwrap(), "Prefer not to say");
    }

    #[test]
    fn photo_types() {
        let config = InstitutionConfig::default();
        assert!(config.photo_type_allowed("image/png"));
        assert!(config.photo_type_allowed("image/jpeg"));
        assert!(config.photo_type_allowed("image/webp"));
        assert!(!config.photo_type_allowed("image/gif"));
        assert!(!config.photo_type_allowed("not a mime"));
    }
}
