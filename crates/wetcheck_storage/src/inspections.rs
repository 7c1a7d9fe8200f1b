#![forbid(unsafe_code)]

use serde_json::Value;
use sha2::{Digest, Sha256};

use wetcheck_contracts::auth::SubjectId;
use wetcheck_contracts::record::{
    new_backflow_device, new_controller, new_zone, ClientInfo, InspectionRecord, PropertyType,
    DEFAULT_ZONE_COUNT, MAX_BACKFLOW_DEVICES, MAX_CONTROLLERS, MAX_ZONES,
};
use wetcheck_contracts::stored::{
    InspectionId, SavedInspectionSummary, FIELD_ADDRESS, FIELD_CUSTOMER_NAME, FIELD_DATA,
    FIELD_PROPERTY_TYPE, FIELD_SAVED_AT, FIELD_STEP, FIELD_USER_ID, INSPECTIONS_COLLECTION,
    NO_ADDRESS, UNNAMED_CUSTOMER,
};
use wetcheck_contracts::{ContractViolation, IsoUtcTimestamp, Validate};

use crate::docstore::{DocumentStore, FieldFilter, Ordering, StorageError};

pub const LAST_STEP_INDEX: u8 = 4;

/// Deep copy with every image-bearing field nulled. Pure and total; the
/// result is what keeps a stored document under the per-document size
/// ceiling no matter how many photos the session holds.
pub fn strip_binary_content(record: &InspectionRecord) -> InspectionRecord {
    let mut copy = record.clone();
    copy.client.location_image = None;
    copy.system.pump_location_image = None;
    for controller in &mut copy.controllers {
        controller.location_image = None;
    }
    for zone in &mut copy.zones {
        zone.before_images.clear();
        zone.after_images.clear();
        zone.location_image = None;
    }
    copy
}

/// The shape that actually gets persisted: stripped of binary content and
/// truncated to the active zone prefix. Inactive pre-allocated zones are
/// session-local scratch state and never leave memory.
pub fn storage_projection(record: &InspectionRecord) -> InspectionRecord {
    let mut projection = strip_binary_content(record);
    let active = projection.active_zone_count.clamp(1, projection.zones.len().max(1));
    projection.zones.truncate(active);
    projection.active_zone_count = projection.zones.len();
    projection
}

/// Stable 20-hex-char identifier derived from owner, wall-clock instant
/// and a per-session nonce; generated exactly once per record.
pub fn allocate_inspection_id(
    owner: &SubjectId,
    saved_at: &IsoUtcTimestamp,
    nonce: u64,
) -> Result<InspectionId, ContractViolation> {
    let mut hasher = Sha256::new();
    hasher.update(owner.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(saved_at.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(nonce.to_be_bytes());
    let digest = hasher.finalize();
    let mut id = String::with_capacity(20);
    for byte in digest.iter().take(10) {
        id.push_str(&format!("{byte:02x}"));
    }
    InspectionId::new(id)
}

/// Everything the adapter needs to perform one durable write, assembled by
/// the wizard's `begin_save` and consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveTicket {
    pub inspection_id: InspectionId,
    pub owner_id: SubjectId,
    pub saved_at: IsoUtcTimestamp,
    pub last_completed_step: u8,
    pub projection: InspectionRecord,
}

impl SaveTicket {
    pub fn v1(
        inspection_id: InspectionId,
        owner_id: SubjectId,
        saved_at: IsoUtcTimestamp,
        last_completed_step: u8,
        projection: InspectionRecord,
    ) -> Result<Self, ContractViolation> {
        let ticket = Self {
            inspection_id,
            owner_id,
            saved_at,
            last_completed_step,
            projection,
        };
        ticket.validate()?;
        Ok(ticket)
    }
}

impl Validate for SaveTicket {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.inspection_id.validate()?;
        self.owner_id.validate()?;
        self.saved_at.validate()?;
        if self.last_completed_step > LAST_STEP_INDEX {
            return Err(ContractViolation::InvalidValue {
                field: "save_ticket.last_completed_step",
                reason: "must be within 0..=4",
            });
        }
        self.projection.validate()
    }
}

/// A reconstructed inspection as read back from the store. The record is
/// image-free by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredInspection {
    pub id: InspectionId,
    pub owner_id: SubjectId,
    pub saved_at: String,
    pub last_completed_step: u8,
    pub record: InspectionRecord,
}

pub fn customer_display_name(client: &ClientInfo) -> String {
    let name = client.name.trim();
    if name.is_empty() {
        UNNAMED_CUSTOMER.to_string()
    } else {
        name.to_string()
    }
}

pub fn address_display_string(client: &ClientInfo) -> String {
    let parts: Vec<&str> = [client.address.trim(), client.city.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        NO_ADDRESS.to_string()
    } else {
        parts.join(", ")
    }
}

pub struct InspectionRepo;

impl InspectionRepo {
    pub fn write<S: DocumentStore>(
        store: &mut S,
        ticket: &SaveTicket,
    ) -> Result<SavedInspectionSummary, StorageError> {
        let data = serde_json::to_value(&ticket.projection).map_err(|e| StorageError::Encoding {
            detail: e.to_string(),
        })?;
        let property_type =
            serde_json::to_value(ticket.projection.property_type).map_err(|e| {
                StorageError::Encoding {
                    detail: e.to_string(),
                }
            })?;
        let customer = customer_display_name(&ticket.projection.client);
        let address = address_display_string(&ticket.projection.client);

        let mut doc = serde_json::Map::new();
        doc.insert(FIELD_USER_ID.into(), Value::from(ticket.owner_id.as_str()));
        doc.insert(FIELD_CUSTOMER_NAME.into(), Value::from(customer.clone()));
        doc.insert(FIELD_ADDRESS.into(), Value::from(address.clone()));
        doc.insert(FIELD_PROPERTY_TYPE.into(), property_type);
        doc.insert(
            FIELD_SAVED_AT.into(),
            Value::from(ticket.saved_at.as_str()),
        );
        doc.insert(FIELD_STEP.into(), Value::from(ticket.last_completed_step));
        doc.insert(FIELD_DATA.into(), data);

        store.put(
            INSPECTIONS_COLLECTION,
            ticket.inspection_id.as_str(),
            Value::Object(doc),
        )?;

        Ok(SavedInspectionSummary {
            id: ticket.inspection_id.clone(),
            owner_id: ticket.owner_id.clone(),
            customer_display_name: customer,
            address_display_string: address,
            property_type: ticket.projection.property_type,
            saved_at: ticket.saved_at.as_str().to_string(),
            last_completed_step: ticket.last_completed_step,
        })
    }

    /// Newest first. When the backend cannot serve the ordered query (a
    /// missing index), falls back to the unordered query plus an
    /// in-memory sort on the same key; a document with no `savedAt`
    /// sorts last.
    pub fn list<S: DocumentStore>(
        store: &S,
        owner: &SubjectId,
    ) -> Result<Vec<SavedInspectionSummary>, StorageError> {
        let filters = [FieldFilter::equals(FIELD_USER_ID, owner.as_str())];
        let ordering = Ordering::descending(FIELD_SAVED_AT);
        let rows = match store.query(INSPECTIONS_COLLECTION, &filters, Some(&ordering)) {
            Ok(rows) => rows,
            Err(StorageError::OrderedQueryUnsupported { .. }) => {
                let mut rows = store.query(INSPECTIONS_COLLECTION, &filters, None)?;
                rows.sort_by(|(_, a), (_, b)| saved_at_of(b).cmp(&saved_at_of(a)));
                rows
            }
            Err(other) => return Err(other),
        };
        Ok(rows
            .into_iter()
            .filter_map(|(id, doc)| summary_from_doc(id, &doc, owner))
            .collect())
    }

    pub fn load<S: DocumentStore>(
        store: &S,
        id: &InspectionId,
    ) -> Result<StoredInspection, StorageError> {
        let doc = store
            .get_by_id(INSPECTIONS_COLLECTION, id.as_str())?
            .ok_or_else(|| StorageError::NotFound {
                collection: INSPECTIONS_COLLECTION.to_string(),
                id: id.as_str().to_string(),
            })?;

        let owner_raw = doc
            .get(FIELD_USER_ID)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let owner_id = SubjectId::new(owner_raw)?;

        let mut record: InspectionRecord = match doc.get(FIELD_DATA) {
            Some(data) => serde_json::from_value(data.clone()).map_err(|e| {
                StorageError::Encoding {
                    detail: e.to_string(),
                }
            })?,
            None => InspectionRecord::default(),
        };
        normalize_loaded(&mut record);

        let last_completed_step = doc
            .get(FIELD_STEP)
            .and_then(Value::as_u64)
            .map(|s| s.min(LAST_STEP_INDEX as u64) as u8)
            .unwrap_or(0);
        let saved_at = doc
            .get(FIELD_SAVED_AT)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(StoredInspection {
            id: id.clone(),
            owner_id,
            saved_at,
            last_completed_step,
            record,
        })
    }

    /// Idempotent: deleting an id the store no longer has is fine.
    pub fn delete<S: DocumentStore>(store: &mut S, id: &InspectionId) -> Result<(), StorageError> {
        match store.delete_by_id(INSPECTIONS_COLLECTION, id.as_str()) {
            Ok(()) | Err(StorageError::NotFound { .. }) => Ok(()),
            Err(other) => Err(other),
        }
    }
}

fn saved_at_of(doc: &Value) -> String {
    doc.get(FIELD_SAVED_AT)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn summary_from_doc(
    id: String,
    doc: &Value,
    queried_owner: &SubjectId,
) -> Option<SavedInspectionSummary> {
    let id = InspectionId::new(id).ok()?;
    let owner_id = doc
        .get(FIELD_USER_ID)
        .and_then(Value::as_str)
        .and_then(|s| SubjectId::new(s).ok())
        .unwrap_or_else(|| queried_owner.clone());
    let property_type = doc
        .get(FIELD_PROPERTY_TYPE)
        .cloned()
        .and_then(|v| serde_json::from_value::<PropertyType>(v).ok())
        .unwrap_or_default();
    Some(SavedInspectionSummary {
        id,
        owner_id,
        customer_display_name: doc
            .get(FIELD_CUSTOMER_NAME)
            .and_then(Value::as_str)
            .unwrap_or(UNNAMED_CUSTOMER)
            .to_string(),
        address_display_string: doc
            .get(FIELD_ADDRESS)
            .and_then(Value::as_str)
            .unwrap_or(NO_ADDRESS)
            .to_string(),
        property_type,
        saved_at: saved_at_of(doc),
        last_completed_step: doc
            .get(FIELD_STEP)
            .and_then(Value::as_u64)
            .map(|s| s.min(LAST_STEP_INDEX as u64) as u8)
            .unwrap_or(0),
    })
}

/// The stored sequence is advisory; the in-memory invariants are not.
/// Ids re-derive dense from position, zone storage pads up to the stored
/// active count, and images rehydrate to their empty defaults.
fn normalize_loaded(record: &mut InspectionRecord) {
    *record = strip_binary_content(record);

    record.controllers.truncate(MAX_CONTROLLERS);
    if record.controllers.is_empty() {
        record.controllers.push(new_controller(1));
    }
    for (i, controller) in record.controllers.iter_mut().enumerate() {
        controller.id = i as u32 + 1;
    }

    record.backflow_devices.truncate(MAX_BACKFLOW_DEVICES);
    if record.backflow_devices.is_empty() {
        record.backflow_devices.push(new_backflow_device(1));
    }
    for (i, device) in record.backflow_devices.iter_mut().enumerate() {
        device.id = i as u32 + 1;
    }

    record.zones.truncate(MAX_ZONES);
    if record.zones.is_empty() {
        record
            .zones
            .extend((1..=DEFAULT_ZONE_COUNT as u32).map(new_zone));
    }
    let active = if record.active_zone_count == 0 {
        record.zones.len()
    } else {
        record.active_zone_count.min(MAX_ZONES)
    };
    while record.zones.len() < active {
        record.zones.push(new_zone(record.zones.len() as u32 + 1));
    }
    for (i, zone) in record.zones.iter_mut().enumerate() {
        zone.id = i as u32 + 1;
        if zone.controller_id == 0 {
            zone.controller_id = 1;
        }
    }
    record.active_zone_count = active;
}
