#![forbid(unsafe_code)]

use wetcheck_contracts::auth::{CompanyBranding, SubjectId, UserProfile, UserRole};
use wetcheck_contracts::stored::USERS_COLLECTION;

use crate::docstore::{DocumentStore, FieldFilter, StorageError};

const FIELD_ROLE: &str = "role";

pub struct ProfileRepo;

impl ProfileRepo {
    pub fn fetch<S: DocumentStore>(
        store: &S,
        subject: &SubjectId,
    ) -> Result<Option<UserProfile>, StorageError> {
        match store.get_by_id(USERS_COLLECTION, subject.as_str())? {
            None => Ok(None),
            Some(doc) => serde_json::from_value(doc)
                .map(Some)
                .map_err(|e| StorageError::Encoding {
                    detail: e.to_string(),
                }),
        }
    }

    pub fn create<S: DocumentStore>(
        store: &mut S,
        subject: &SubjectId,
        profile: &UserProfile,
    ) -> Result<(), StorageError> {
        let doc = serde_json::to_value(profile).map_err(|e| StorageError::Encoding {
            detail: e.to_string(),
        })?;
        store.put(USERS_COLLECTION, subject.as_str(), doc)
    }

    pub fn any_admin_exists<S: DocumentStore>(store: &S) -> Result<bool, StorageError> {
        let filters = [FieldFilter::equals(FIELD_ROLE, "admin")];
        let rows = store.query(USERS_COLLECTION, &filters, None)?;
        Ok(!rows.is_empty())
    }

    /// Read-modify-write; an absent profile gets a fresh lowest-privilege
    /// one so branding setup never depends on bootstrap ordering.
    pub fn update_company<S: DocumentStore>(
        store: &mut S,
        subject: &SubjectId,
        company: CompanyBranding,
    ) -> Result<UserProfile, StorageError> {
        let mut profile = Self::fetch(store, subject)?.unwrap_or(UserProfile {
            role: UserRole::FALLBACK,
            ..UserProfile::default()
        });
        profile.company = Some(company);
        Self::create(store, subject, &profile)?;
        Ok(profile)
    }
}
