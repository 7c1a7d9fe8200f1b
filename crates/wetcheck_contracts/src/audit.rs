#![forbid(unsafe_code)]

use crate::common::{ContractViolation, IsoUtcTimestamp, ReasonCodeId, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AuditEventId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditSeverity {
    Info,
    Warn,
    Error,
}

/// One structured event bound for the append-only ledger. Silent failure
/// paths (background autosave, geocode enrichment, discarded late async
/// results, profile fallback) record here instead of surfacing to the
/// user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEventInput {
    pub at: IsoUtcTimestamp,
    pub severity: AuditSeverity,
    pub source: &'static str,
    pub reason_code: ReasonCodeId,
    pub detail: Option<String>,
}

impl AuditEventInput {
    pub fn v1(
        at: IsoUtcTimestamp,
        severity: AuditSeverity,
        source: &'static str,
        reason_code: ReasonCodeId,
        detail: Option<String>,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            at,
            severity,
            source,
            reason_code,
            detail,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for AuditEventInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.at.validate()?;
        if self.source.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "audit_event_input.source",
                reason: "must not be empty",
            });
        }
        if let Some(detail) = &self.detail {
            if detail.len() > 512 {
                return Err(ContractViolation::InvalidValue {
                    field: "audit_event_input.detail",
                    reason: "must be <= 512 chars",
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub input: AuditEventInput,
}
