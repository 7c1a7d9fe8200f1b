#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{validate_token, ContractViolation, Validate};
use crate::record::EncodedImage;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for SubjectId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("subject_id", &self.0, 128)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub subject_id: SubjectId,
    pub email: String,
}

impl AuthSession {
    pub fn new(subject_id: SubjectId, email: impl Into<String>) -> Self {
        Self {
            subject_id,
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Company,
}

impl UserRole {
    /// The role a subject is left with when nothing better can be
    /// established. Lowest privilege.
    pub const FALLBACK: UserRole = UserRole::Company;
}

/// Report branding carried on the user profile; every field optional in
/// practice (empty string / None means "not configured yet").
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompanyBranding {
    pub name: String,
    pub phone: String,
    pub website: String,
    pub logo: Option<EncodedImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    pub role: UserRole,
    pub company: Option<CompanyBranding>,
    pub created_at: String,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            email: String::new(),
            role: UserRole::FALLBACK,
            company: None,
            created_at: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_auth_01_subject_id_rejects_empty_and_non_ascii() {
        assert!(SubjectId::new("uid_3aF9").is_ok());
        assert!(SubjectId::new("").is_err());
        assert!(SubjectId::new("uid_\u{e9}").is_err());
    }

    #[test]
    fn at_auth_02_default_profile_is_lowest_privilege() {
        assert_eq!(UserProfile::default().role, UserRole::Company);
    }
}
