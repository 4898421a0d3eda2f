use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated session delivered by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
    pub email_verified: bool,
    /// Provider ids in sign-in order, e.g. "password", "google.com".
    pub provider_ids: Vec<String>,
}

impl Identity {
    pub fn has_third_party_provider(&self) -> bool {
        self.provider_ids.iter().any(|p| p != "password")
    }

    /// Verified means: email verified, OR signed in via a third-party
    /// identity provider, OR phone-verified.
    pub fn is_verified(&self) -> bool {
        self.email_verified || self.has_third_party_provider() || self.phone_number.is_some()
    }

    pub fn primary_provider(&self) -> &str {
        self.provider_ids.first().map(String::as_str).unwrap_or("unknown")
    }
}

/// Profile record kept in the document store, created on first sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub phone_number: String,
    pub photo_url: String,
    pub provider_id: String,
    #[serde(default)]
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn from_identity(identity: &Identity, created_at: DateTime<Utc>) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: identity.email.clone().unwrap_or_default(),
            display_name: identity.display_name.clone().unwrap_or_default(),
            phone_number: identity.phone_number.clone().unwrap_or_default(),
            photo_url: identity.photo_url.clone().unwrap_or_default(),
            provider_id: identity.primary_provider().to_string(),
            role: None,
            created_at,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .map(|r| r.eq_ignore_ascii_case("admin"))
            .unwrap_or(false)
    }
}

/// Who performed an admin action; stored alongside status/notes updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminActor {
    pub uid: String,
    pub email: String,
    pub display_name: String,
}

impl AdminActor {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: identity.email.clone().unwrap_or_default(),
            display_name: identity.display_name.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_identity() -> Identity {
        Identity {
            uid: "u1".into(),
            email: Some("kai@example.com".into()),
            display_name: None,
            phone_number: None,
            photo_url: None,
            email_verified: false,
            provider_ids: vec!["password".into()],
        }
    }

    #[test]
    fn verification_rules() {
        let mut id = base_identity();
        assert!(!id.is_verified());

        id.email_verified = true;
        assert!(id.is_verified());

        let mut id = base_identity();
        id.provider_ids = vec!["google.com".into()];
        assert!(id.has_third_party_provider());
        assert!(id.is_verified());

        let mut id = base_identity();
        id.phone_number = Some("8685550148".into());
        assert!(id.is_verified());
    }

    #[test]
    fn admin_role_is_case_insensitive() {
        let mut profile = UserProfile::from_identity(&base_identity(), Utc::now());
        assert!(!profile.is_admin());
        profile.role = Some("Admin".into());
        assert!(profile.is_admin());
        profile.role = Some("parent".into());
        assert!(!profile.is_admin());
    }
}
