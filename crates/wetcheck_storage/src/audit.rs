#![forbid(unsafe_code)]

use wetcheck_contracts::audit::{AuditEvent, AuditEventId, AuditEventInput, AuditSeverity};
use wetcheck_contracts::Validate;

use crate::docstore::StorageError;

/// Append-only event ledger. Rows are never rewritten or removed; this is
/// the structured log the silent failure paths write to.
#[derive(Debug, Clone, Default)]
pub struct AuditLedger {
    next_id: u64,
    rows: Vec<AuditEvent>,
}

impl AuditLedger {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    pub fn append(&mut self, input: AuditEventInput) -> Result<AuditEventId, StorageError> {
        input.validate()?;
        self.next_id += 1;
        let id = AuditEventId(self.next_id);
        self.rows.push(AuditEvent { id, input });
        Ok(id)
    }

    pub fn rows(&self) -> &[AuditEvent] {
        &self.rows
    }

    pub fn rows_with_severity(&self, severity: AuditSeverity) -> Vec<&AuditEvent> {
        self.rows
            .iter()
            .filter(|row| row.input.severity == severity)
            .collect()
    }
}
