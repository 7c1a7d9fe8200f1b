#![forbid(unsafe_code)]

use serde_json::json;
use wetcheck_contracts::auth::SubjectId;
use wetcheck_contracts::record::{
    new_zone, EncodedImage, GeoPoint, InspectionRecord, MaterialLine, PropertyType,
};
use wetcheck_contracts::stored::InspectionId;
use wetcheck_contracts::IsoUtcTimestamp;
use wetcheck_storage::docstore::{DocumentStore, MemoryDocumentStore};
use wetcheck_storage::inspections::{
    allocate_inspection_id, storage_projection, strip_binary_content, InspectionRepo, SaveTicket,
};

fn owner() -> SubjectId {
    SubjectId::new("uid_tech_1").unwrap()
}

fn ts(s: &str) -> IsoUtcTimestamp {
    IsoUtcTimestamp::new(s).unwrap()
}

fn photo() -> EncodedImage {
    EncodedImage::new("image/jpeg", "/9j/4AAQSkZJRg==", 800, 600).unwrap()
}

fn populated_record() -> InspectionRecord {
    let mut r = InspectionRecord::new_default(PropertyType::Residential);
    r.client.name = "Jane Doe".to_string();
    r.client.address = "12 Palm Ave".to_string();
    r.client.city = "Tampa, FL".to_string();
    r.client.date = "2025-06-14".to_string();
    r.client.location_image = Some(photo());
    r.system.pump_location_image = Some(photo());
    r.system.static_psi = "60".to_string();
    r.controllers[0].make = "Hunter Pro-C".to_string();
    r.controllers[0].location_image = Some(photo());
    r.zones[0].ok = true;
    r.zones[0].geolocation = Some(GeoPoint::new(27.95, -82.45).unwrap());
    r.zones[1].leak = true;
    r.zones[1].notes = "lateral seep at head 3".to_string();
    r.zones[1].before_images.push(photo());
    r.zones[1].after_images.push(photo());
    r.zones[1].location_image = Some(photo());
    r.zones[1].materials.push(MaterialLine {
        part: "Electric Valve 1\"".to_string(),
        qty: 2,
    });
    r
}

fn ticket_for(record: &InspectionRecord, saved_at: &str, nonce: u64) -> SaveTicket {
    let saved_at = ts(saved_at);
    let id = allocate_inspection_id(&owner(), &saved_at, nonce).unwrap();
    SaveTicket::v1(id, owner(), saved_at, 4, storage_projection(record)).unwrap()
}

#[test]
fn at_inspections_db_01_strip_is_idempotent_and_total() {
    let record = populated_record();
    let once = strip_binary_content(&record);
    assert!(once.client.location_image.is_none());
    assert!(once.system.pump_location_image.is_none());
    assert!(once.controllers[0].location_image.is_none());
    assert!(once.zones[1].before_images.is_empty());
    assert!(once.zones[1].after_images.is_empty());
    assert!(once.zones[1].location_image.is_none());
    // Non-image fields survive untouched.
    assert_eq!(once.zones[1].notes, record.zones[1].notes);
    assert_eq!(once.zones[0].geolocation, record.zones[0].geolocation);

    let twice = strip_binary_content(&once);
    assert_eq!(twice, once);
}

#[test]
fn at_inspections_db_02_round_trip_preserves_non_image_fields() {
    let mut store = MemoryDocumentStore::new_in_memory();
    let record = populated_record();
    let ticket = ticket_for(&record, "2025-06-14T19:02:11.000Z", 1);
    InspectionRepo::write(&mut store, &ticket).unwrap();

    let loaded = InspectionRepo::load(&store, &ticket.inspection_id).unwrap();
    assert_eq!(loaded.owner_id, owner());
    assert_eq!(loaded.saved_at, "2025-06-14T19:02:11.000Z");
    assert_eq!(loaded.last_completed_step, 4);
    // Everything but images reproduces exactly; images rehydrate empty.
    assert_eq!(loaded.record, strip_binary_content(&record));
}

#[test]
fn at_inspections_db_03_projection_persists_only_the_active_prefix() {
    let mut record = populated_record();
    record.zones.extend((7..=10).map(new_zone));
    record.zones[8].notes = "inactive scratch zone".to_string();
    record.active_zone_count = 6;

    let projection = storage_projection(&record);
    assert_eq!(projection.zones.len(), 6);
    assert_eq!(projection.active_zone_count, 6);
}

#[test]
fn at_inspections_db_04_load_pads_short_zone_storage_to_active_count() {
    let mut store = MemoryDocumentStore::new_in_memory();
    // A document whose zone sequence is shorter than its active count and
    // whose ids are garbage; the adapter must not trust either.
    let doc = json!({
        "userId": "uid_tech_1",
        "customerName": "Jane Doe",
        "address": "12 Palm Ave",
        "propertyType": "residential",
        "savedAt": "2025-06-14T19:02:11.000Z",
        "step": 2,
        "data": {
            "propertyType": "residential",
            "activeZoneCount": 5,
            "zones": [
                {"id": 9, "type": "Rotors", "notes": "kept"},
                {"id": 9, "type": "Sprays"}
            ],
            "controllers": [{"id": 7, "make": "Hunter"}],
            "backflowDevices": []
        }
    });
    store.put("inspections", "fedcba9876543210fedc", doc).unwrap();

    let id = InspectionId::new("fedcba9876543210fedc").unwrap();
    let loaded = InspectionRepo::load(&store, &id).unwrap();
    let r = &loaded.record;
    assert_eq!(r.active_zone_count, 5);
    assert_eq!(r.zones.len(), 5);
    assert_eq!(
        r.zones.iter().map(|z| z.id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );
    assert_eq!(r.zones[0].notes, "kept");
    assert_eq!(r.controllers[0].id, 1);
    assert_eq!(r.backflow_devices.len(), 1);
    assert_eq!(r.backflow_devices[0].id, 1);
}

#[test]
fn at_inspections_db_05_list_orders_newest_first() {
    let mut store = MemoryDocumentStore::new_in_memory();
    let older = ticket_for(&populated_record(), "2025-06-01T08:00:00.000Z", 1);
    let newer = ticket_for(&populated_record(), "2025-06-14T08:00:00.000Z", 2);
    InspectionRepo::write(&mut store, &older).unwrap();
    InspectionRepo::write(&mut store, &newer).unwrap();

    let list = InspectionRepo::list(&store, &owner()).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id, newer.inspection_id);
    assert_eq!(list[1].id, older.inspection_id);
    assert_eq!(list[0].customer_display_name, "Jane Doe");
    assert_eq!(list[0].address_display_string, "12 Palm Ave, Tampa, FL");
}

#[test]
fn at_inspections_db_06_list_falls_back_when_index_is_missing() {
    let mut store = MemoryDocumentStore::new_in_memory().without_ordered_queries();
    let older = ticket_for(&populated_record(), "2025-06-01T08:00:00.000Z", 1);
    let newer = ticket_for(&populated_record(), "2025-06-14T08:00:00.000Z", 2);
    InspectionRepo::write(&mut store, &older).unwrap();
    InspectionRepo::write(&mut store, &newer).unwrap();
    // A legacy document with no savedAt at all must sort last.
    store
        .put(
            "inspections",
            "0123456789abcdef0123",
            json!({"userId": "uid_tech_1", "customerName": "Legacy"}),
        )
        .unwrap();

    let list = InspectionRepo::list(&store, &owner()).unwrap();
    assert_eq!(list.len(), 3);
    assert_eq!(list[0].id, newer.inspection_id);
    assert_eq!(list[1].id, older.inspection_id);
    assert_eq!(list[2].customer_display_name, "Legacy");
    assert_eq!(list[2].saved_at, "");
}

#[test]
fn at_inspections_db_07_display_fallbacks_for_blank_client() {
    let mut store = MemoryDocumentStore::new_in_memory();
    let record = InspectionRecord::new_default(PropertyType::Commercial);
    let ticket = ticket_for(&record, "2025-06-14T08:00:00.000Z", 3);
    let summary = InspectionRepo::write(&mut store, &ticket).unwrap();
    assert_eq!(summary.customer_display_name, "Unnamed");
    assert_eq!(summary.address_display_string, "No address");
    assert_eq!(summary.property_type, PropertyType::Commercial);
}

#[test]
fn at_inspections_db_08_delete_is_idempotent() {
    let mut store = MemoryDocumentStore::new_in_memory();
    let ticket = ticket_for(&populated_record(), "2025-06-14T08:00:00.000Z", 4);
    InspectionRepo::write(&mut store, &ticket).unwrap();

    InspectionRepo::delete(&mut store, &ticket.inspection_id).unwrap();
    InspectionRepo::delete(&mut store, &ticket.inspection_id).unwrap();
    assert!(InspectionRepo::load(&store, &ticket.inspection_id).is_err());
}

#[test]
fn at_inspections_db_09_id_allocation_is_stable_and_distinct() {
    let a = allocate_inspection_id(&owner(), &ts("2025-06-14T08:00:00.000Z"), 1).unwrap();
    let b = allocate_inspection_id(&owner(), &ts("2025-06-14T08:00:00.000Z"), 1).unwrap();
    let c = allocate_inspection_id(&owner(), &ts("2025-06-14T08:00:00.000Z"), 2).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.as_str().len(), 20);
}
