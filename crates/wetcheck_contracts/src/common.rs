#![forbid(unsafe_code)]

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReasonCodeId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
        got: f64,
    },
    NotFinite {
        field: &'static str,
    },
}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

/// UTC wall-clock timestamp in the durable `savedAt` representation
/// (ISO-8601, e.g. `2025-06-14T19:02:11.000Z`). Callers supply it
/// explicitly; nothing in the contracts layer reads a clock.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct IsoUtcTimestamp(String);

impl IsoUtcTimestamp {
    pub fn new(ts: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(ts.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for IsoUtcTimestamp {
    fn validate(&self) -> Result<(), ContractViolation> {
        let s = self.0.as_str();
        if s.len() < 20 || s.len() > 35 {
            return Err(ContractViolation::InvalidValue {
                field: "iso_utc_timestamp",
                reason: "must be an ISO-8601 UTC instant",
            });
        }
        let bytes = s.as_bytes();
        let date_ok = bytes[4] == b'-' && bytes[7] == b'-' && bytes[10] == b'T';
        let clock_ok = bytes[13] == b':' && bytes[16] == b':';
        if !date_ok || !clock_ok || !s.ends_with('Z') {
            return Err(ContractViolation::InvalidValue {
                field: "iso_utc_timestamp",
                reason: "must match YYYY-MM-DDThh:mm:ss[.fff]Z",
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | ':' | '.' | 'T' | 'Z'))
        {
            return Err(ContractViolation::InvalidValue {
                field: "iso_utc_timestamp",
                reason: "must contain only ISO-8601 characters",
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_token(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if value.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if value.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds max length",
        });
    }
    if !value.is_ascii() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be ASCII",
        });
    }
    Ok(())
}
