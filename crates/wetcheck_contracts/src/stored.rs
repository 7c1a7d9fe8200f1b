#![forbid(unsafe_code)]

use crate::auth::SubjectId;
use crate::common::{validate_token, ContractViolation, Validate};
use crate::record::PropertyType;

// Collections and field names of the durable document contract. These are
// load-bearing for data written by earlier deployments; renaming any of
// them is a migration, not a refactor.
pub const INSPECTIONS_COLLECTION: &str = "inspections";
pub const USERS_COLLECTION: &str = "users";

pub const FIELD_USER_ID: &str = "userId";
pub const FIELD_CUSTOMER_NAME: &str = "customerName";
pub const FIELD_ADDRESS: &str = "address";
pub const FIELD_PROPERTY_TYPE: &str = "propertyType";
pub const FIELD_SAVED_AT: &str = "savedAt";
pub const FIELD_STEP: &str = "step";
pub const FIELD_DATA: &str = "data";

pub const UNNAMED_CUSTOMER: &str = "Unnamed";
pub const NO_ADDRESS: &str = "No address";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InspectionId(String);

impl InspectionId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for InspectionId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("inspection_id", &self.0, 64)
    }
}

/// Read-side view produced by the persistence adapter on every write and
/// by the list query; consumed by the saved-inspections list and the
/// resume flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedInspectionSummary {
    pub id: InspectionId,
    pub owner_id: SubjectId,
    pub customer_display_name: String,
    pub address_display_string: String,
    pub property_type: PropertyType,
    pub saved_at: String,
    pub last_completed_step: u8,
}
