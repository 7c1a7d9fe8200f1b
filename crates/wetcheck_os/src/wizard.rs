#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use wetcheck_contracts::audit::{AuditEventInput, AuditSeverity};
use wetcheck_contracts::auth::SubjectId;
use wetcheck_contracts::record::{
    new_backflow_device, new_controller, new_zone, EncodedImage, GeoPoint, InspectionRecord,
    MaterialLine, ObservationKey, Priority, PropertyType, Zone, DEFAULT_ZONE_COUNT,
    MAX_BACKFLOW_DEVICES, MAX_CONTROLLERS, MAX_ZONES, ZONE_GROW_STEP,
};
use wetcheck_contracts::stored::{InspectionId, SavedInspectionSummary};
use wetcheck_contracts::{ContractViolation, IsoUtcTimestamp, ReasonCodeId};
use wetcheck_engines::geocode::{GeocodeError, NominatimReverseGeocoder, ReverseGeocodeOk};
use wetcheck_storage::audit::AuditLedger;
use wetcheck_storage::docstore::StorageError;
use wetcheck_storage::inspections::{
    allocate_inspection_id, storage_projection, SaveTicket, StoredInspection,
};

pub mod reason_codes {
    use wetcheck_contracts::ReasonCodeId;

    // Wizard ledger rows, 0x575A = "WZ".
    pub const WIZ_INFO_STALE_LOCATION_DISCARDED: ReasonCodeId = ReasonCodeId(0x575A_0001);
    pub const WIZ_INFO_LOCATION_TARGET_GONE: ReasonCodeId = ReasonCodeId(0x575A_0002);
    pub const WIZ_INFO_STALE_SAVE_DISCARDED: ReasonCodeId = ReasonCodeId(0x575A_0003);
    pub const WIZ_INFO_GEOCODE_ENRICHMENT_SKIPPED: ReasonCodeId = ReasonCodeId(0x575A_0004);
    pub const WIZ_WARN_SILENT_SAVE_FAILED: ReasonCodeId = ReasonCodeId(0x575A_00F1);
}

pub const STEP_TITLES: [&str; 5] = ["Client", "System", "Zones", "Review", "Summary"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardStep {
    Client,
    System,
    Zones,
    Review,
    Summary,
}

impl WizardStep {
    pub fn index(self) -> usize {
        match self {
            WizardStep::Client => 0,
            WizardStep::System => 1,
            WizardStep::Zones => 2,
            WizardStep::Review => 3,
            WizardStep::Summary => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(WizardStep::Client),
            1 => Some(WizardStep::System),
            2 => Some(WizardStep::Zones),
            3 => Some(WizardStep::Review),
            4 => Some(WizardStep::Summary),
            _ => None,
        }
    }

    pub fn title(self) -> &'static str {
        STEP_TITLES[self.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardPhase {
    PropertySelection,
    Step(WizardStep),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WizardConfig {
    pub max_zones: usize,
    pub max_controllers: usize,
    pub max_backflow_devices: usize,
    pub initial_zone_count: usize,
    pub zone_grow_step: usize,
}

impl WizardConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_zones: MAX_ZONES,
            max_controllers: MAX_CONTROLLERS,
            max_backflow_devices: MAX_BACKFLOW_DEVICES,
            initial_zone_count: DEFAULT_ZONE_COUNT,
            zone_grow_step: ZONE_GROW_STEP,
        }
    }

    pub fn new(
        max_zones: usize,
        max_controllers: usize,
        max_backflow_devices: usize,
        initial_zone_count: usize,
        zone_grow_step: usize,
    ) -> Result<Self, ContractViolation> {
        if max_zones == 0 || max_zones > MAX_ZONES {
            return Err(ContractViolation::InvalidValue {
                field: "wizard_config.max_zones",
                reason: "must be within 1..=120",
            });
        }
        if max_controllers == 0 || max_controllers > MAX_CONTROLLERS {
            return Err(ContractViolation::InvalidValue {
                field: "wizard_config.max_controllers",
                reason: "must be within 1..=10",
            });
        }
        if max_backflow_devices == 0 || max_backflow_devices > MAX_BACKFLOW_DEVICES {
            return Err(ContractViolation::InvalidValue {
                field: "wizard_config.max_backflow_devices",
                reason: "must be within 1..=6",
            });
        }
        if initial_zone_count == 0 || initial_zone_count > max_zones {
            return Err(ContractViolation::InvalidValue {
                field: "wizard_config.initial_zone_count",
                reason: "must be within 1..=max_zones",
            });
        }
        if zone_grow_step == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "wizard_config.zone_grow_step",
                reason: "must be > 0",
            });
        }
        Ok(Self {
            max_zones,
            max_controllers,
            max_backflow_devices,
            initial_zone_count,
            zone_grow_step,
        })
    }
}

// field updaters
// One variant per leaf attribute; applying one replaces exactly that
// field. No cross-field validation happens here: this is a data-capture
// surface, not a form validator. Geolocation never appears here; it is
// only ever written by a resolved location request.

#[derive(Debug, Clone, PartialEq)]
pub enum ClientField {
    Name(String),
    Address(String),
    City(String),
    Phone(String),
    Email(String),
    Manager(String),
    Date(String),
    WorkOrder(String),
    PropertySubType(String),
    BuildingName(String),
    NumBuildings(String),
    IrrigatedAcreage(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SystemField {
    TotalZones(String),
    ActiveZones(String),
    WaterSource(String),
    MeterSize(String),
    StaticPsi(String),
    WorkingPsi(String),
    FlowRate(String),
    RainSensor(String),
    PumpStation(String),
    MainlineSize(String),
    MainlineMaterial(String),
    MasterValve(String),
    FlowSensor(String),
    Poc(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ZoneField {
    Kind(String),
    HeadType(String),
    Heads(String),
    Psi(String),
    Ok(bool),
    Leak(bool),
    Broken(bool),
    Clogged(bool),
    Misaligned(bool),
    Notes(String),
    Area(String),
    ControllerId(u32),
    Materials(Vec<MaterialLine>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerField {
    Make(String),
    Kind(String),
    Location(String),
    ZoneFrom(String),
    ZoneTo(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackflowField {
    Kind(String),
    Condition(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoSlot {
    Before,
    After,
}

// async operation surface

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocateTarget {
    Client,
    Pump,
    Zone(u32),
    Controller(u32),
}

impl LocateTarget {
    pub fn key(self) -> String {
        match self {
            LocateTarget::Client => "client".to_string(),
            LocateTarget::Pump => "pump".to_string(),
            LocateTarget::Zone(id) => format!("zone-{id}"),
            LocateTarget::Controller(id) => format!("ctrl-{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeolocationError {
    AlreadyInProgress { key: String },
    Denied,
    Timeout,
    Unsupported,
}

impl GeolocationError {
    /// Text for the blocking alert explicit location requests raise.
    pub fn message(&self) -> String {
        match self {
            GeolocationError::AlreadyInProgress { key } => {
                format!("Location request already running for {key}")
            }
            GeolocationError::Denied => "Location error: permission denied".to_string(),
            GeolocationError::Timeout => "Location error: request timed out".to_string(),
            GeolocationError::Unsupported => "Geolocation not supported".to_string(),
        }
    }
}

/// Token for one in-flight device location acquisition. Carries the
/// generation at launch so a result that arrives after the record was
/// reset can be recognized and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRequest {
    target: LocateTarget,
    generation: u64,
}

impl LocationRequest {
    pub fn target(&self) -> LocateTarget {
        self.target
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationOutcome {
    Applied {
        target: LocateTarget,
        /// Set for the client target: the shell should run reverse
        /// geocoding and feed the result to `apply_client_enrichment`.
        enrich_client_address: bool,
    },
    /// Platform denial or timeout; the field stays unset and the shell
    /// shows a blocking alert. Not retried automatically.
    Failed(GeolocationError),
    DiscardedStale,
    DiscardedTargetGone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceError {
    pub detail: String,
}

impl From<StorageError> for PersistenceError {
    fn from(err: StorageError) -> Self {
        Self {
            detail: format!("{err:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// User pressed save: success and failure both surface a notice.
    Explicit,
    /// Summary autosave: failures are ledger rows only.
    Silent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingSave {
    pub ticket: SaveTicket,
    mode: SaveMode,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveBegin {
    Started(PendingSave),
    /// A save is already outstanding; this request is dropped, not queued.
    Coalesced,
    /// No property type chosen yet, so there is nothing worth writing.
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Auto-dismissing banner content; display timing belongs to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveCompletion {
    Saved {
        summary: SavedInspectionSummary,
        notice: Option<UserNotice>,
    },
    Failed {
        notice: Option<UserNotice>,
    },
    DiscardedStale,
}

// computed views

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneStats {
    pub ok_count: usize,
    pub issue_count: usize,
    pub pending_count: i64,
    pub progress_percent: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    None,
    Area,
    Controller,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneGroup {
    pub label: Option<String>,
    /// Indices into `record().zones`, original order preserved.
    pub zone_indices: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepChange {
    pub step: WizardStep,
    /// True exactly once per distinct arrival at the Summary step.
    pub autosave_due: bool,
}

pub trait ReverseGeocodeEngine {
    fn reverse(&self, point: GeoPoint) -> Result<ReverseGeocodeOk, GeocodeError>;
}

impl ReverseGeocodeEngine for NominatimReverseGeocoder {
    fn reverse(&self, point: GeoPoint) -> Result<ReverseGeocodeOk, GeocodeError> {
        NominatimReverseGeocoder::reverse(self, point)
    }
}

/// The five-step inspection wizard. Owns the full-fidelity record for the
/// duration of the editing session; everything it hands to persistence is
/// a stripped projection. All mutation is synchronous and atomic at the
/// field level; the only suspension points are modeled as begin/resolve
/// pairs (`request_device_location`/`resolve_device_location`,
/// `begin_save`/`complete_save`).
#[derive(Debug)]
pub struct InspectionWizard {
    config: WizardConfig,
    record: InspectionRecord,
    phase: WizardPhase,
    inspection_id: Option<InspectionId>,
    autosave_armed: bool,
    save_in_flight: bool,
    locating: BTreeSet<String>,
    generation: u64,
    save_nonce: u64,
}

impl InspectionWizard {
    pub fn new(config: WizardConfig) -> Self {
        Self {
            config,
            record: InspectionRecord::new_default(PropertyType::Residential),
            phase: WizardPhase::PropertySelection,
            inspection_id: None,
            autosave_armed: false,
            save_in_flight: false,
            locating: BTreeSet::new(),
            generation: 0,
            save_nonce: 0,
        }
    }

    pub fn record(&self) -> &InspectionRecord {
        &self.record
    }

    pub fn phase(&self) -> WizardPhase {
        self.phase
    }

    pub fn current_step(&self) -> Option<WizardStep> {
        match self.phase {
            WizardPhase::PropertySelection => None,
            WizardPhase::Step(step) => Some(step),
        }
    }

    pub fn inspection_id(&self) -> Option<&InspectionId> {
        self.inspection_id.as_ref()
    }

    pub fn is_save_in_flight(&self) -> bool {
        self.save_in_flight
    }

    pub fn is_locating(&self, target: LocateTarget) -> bool {
        self.locating.contains(&target.key())
    }

    // lifecycle

    /// Selecting the type the record already has (while editing) is a
    /// silent no-op; anything else rebuilds the record from defaults and
    /// lands on the first step as a brand-new inspection.
    pub fn set_property_type(&mut self, property_type: PropertyType) {
        if matches!(self.phase, WizardPhase::Step(_))
            && self.record.property_type == property_type
        {
            return;
        }
        self.record = self.fresh_record(property_type);
        self.phase = WizardPhase::Step(WizardStep::Client);
        self.inspection_id = None;
        self.autosave_armed = false;
        self.locating.clear();
        self.generation += 1;
    }

    /// Back to the property selector with everything cleared. An
    /// outstanding save may still complete afterwards; its result is
    /// recognized as stale and discarded.
    pub fn reset_for_new_inspection(&mut self) {
        self.record = self.fresh_record(PropertyType::Residential);
        self.phase = WizardPhase::PropertySelection;
        self.inspection_id = None;
        self.autosave_armed = false;
        self.locating.clear();
        self.generation += 1;
    }

    /// Adopt a loaded projection and resume at its last completed step.
    pub fn load_saved(&mut self, stored: StoredInspection) -> StepChange {
        self.record = stored.record;
        self.inspection_id = Some(stored.id);
        self.autosave_armed = false;
        self.locating.clear();
        self.generation += 1;
        let step = WizardStep::from_index(stored.last_completed_step as usize)
            .unwrap_or(WizardStep::Client);
        self.arrive(step)
    }

    fn fresh_record(&self, property_type: PropertyType) -> InspectionRecord {
        let mut record = InspectionRecord::new_default(property_type);
        if self.config.initial_zone_count != record.zones.len() {
            record.zones = (1..=self.config.initial_zone_count as u32)
                .map(new_zone)
                .collect();
            record.active_zone_count = self.config.initial_zone_count;
        }
        record
    }

    // navigation

    pub fn go_to(&mut self, index: usize) -> Option<StepChange> {
        if !matches!(self.phase, WizardPhase::Step(_)) {
            return None;
        }
        WizardStep::from_index(index).map(|step| self.arrive(step))
    }

    pub fn advance(&mut self, delta: i32) -> Option<StepChange> {
        let current = self.current_step()?.index() as i32;
        let next = current + delta;
        if !(0..=4).contains(&next) {
            return None;
        }
        self.go_to(next as usize)
    }

    fn arrive(&mut self, step: WizardStep) -> StepChange {
        self.phase = WizardPhase::Step(step);
        let autosave_due = if step == WizardStep::Summary {
            let due = !self.autosave_armed;
            self.autosave_armed = true;
            due
        } else {
            // Leaving the terminal step re-arms the latch for next time.
            self.autosave_armed = false;
            false
        };
        StepChange { step, autosave_due }
    }

    // field updaters

    pub fn update_client(&mut self, field: ClientField) {
        let client = &mut self.record.client;
        match field {
            ClientField::Name(v) => client.name = v,
            ClientField::Address(v) => client.address = v,
            ClientField::City(v) => client.city = v,
            ClientField::Phone(v) => client.phone = v,
            ClientField::Email(v) => client.email = v,
            ClientField::Manager(v) => client.manager = v,
            ClientField::Date(v) => client.date = v,
            ClientField::WorkOrder(v) => client.work_order = v,
            ClientField::PropertySubType(v) => client.property_sub_type = v,
            ClientField::BuildingName(v) => client.building_name = v,
            ClientField::NumBuildings(v) => client.num_buildings = v,
            ClientField::IrrigatedAcreage(v) => client.irrigated_acreage = v,
        }
    }

    pub fn update_system(&mut self, field: SystemField) {
        let system = &mut self.record.system;
        match field {
            SystemField::TotalZones(v) => system.total_zones = v,
            SystemField::ActiveZones(v) => system.active_zones = v,
            SystemField::WaterSource(v) => system.water_source = v,
            SystemField::MeterSize(v) => system.meter_size = v,
            SystemField::StaticPsi(v) => system.static_psi = v,
            SystemField::WorkingPsi(v) => system.working_psi = v,
            SystemField::FlowRate(v) => system.flow_rate = v,
            SystemField::RainSensor(v) => system.rain_sensor = v,
            SystemField::PumpStation(v) => system.pump_station = v,
            SystemField::MainlineSize(v) => system.mainline_size = v,
            SystemField::MainlineMaterial(v) => system.mainline_material = v,
            SystemField::MasterValve(v) => system.master_valve = v,
            SystemField::FlowSensor(v) => system.flow_sensor = v,
            SystemField::Poc(v) => system.poc = v,
        }
    }

    /// Out-of-range indices are ignored; inactive pre-allocated zones are
    /// fair game (their data survives shrink/grow cycles).
    pub fn update_zone(&mut self, index: usize, field: ZoneField) {
        let Some(zone) = self.record.zones.get_mut(index) else {
            return;
        };
        match field {
            ZoneField::Kind(v) => zone.kind = v,
            ZoneField::HeadType(v) => zone.head_type = v,
            ZoneField::Heads(v) => zone.heads = v,
            ZoneField::Psi(v) => zone.psi = v,
            ZoneField::Ok(v) => zone.ok = v,
            ZoneField::Leak(v) => zone.leak = v,
            ZoneField::Broken(v) => zone.broken = v,
            ZoneField::Clogged(v) => zone.clogged = v,
            ZoneField::Misaligned(v) => zone.misaligned = v,
            ZoneField::Notes(v) => zone.notes = v,
            ZoneField::Area(v) => zone.area = v,
            ZoneField::ControllerId(v) => zone.controller_id = v,
            ZoneField::Materials(v) => zone.materials = v,
        }
    }

    pub fn update_controller(&mut self, index: usize, field: ControllerField) {
        let Some(controller) = self.record.controllers.get_mut(index) else {
            return;
        };
        match field {
            ControllerField::Make(v) => controller.make = v,
            ControllerField::Kind(v) => controller.kind = v,
            ControllerField::Location(v) => controller.location = v,
            ControllerField::ZoneFrom(v) => controller.zone_from = v,
            ControllerField::ZoneTo(v) => controller.zone_to = v,
        }
    }

    pub fn update_backflow_device(&mut self, index: usize, field: BackflowField) {
        let Some(device) = self.record.backflow_devices.get_mut(index) else {
            return;
        };
        match field {
            BackflowField::Kind(v) => device.kind = v,
            BackflowField::Condition(v) => device.condition = v,
        }
    }

    pub fn toggle_observation(&mut self, key: ObservationKey) {
        self.record.observations.toggle(key);
    }

    pub fn set_recommendations(&mut self, text: String) {
        self.record.recommendations = text;
    }

    pub fn set_priority(&mut self, priority: Priority) {
        self.record.priority = priority;
    }

    pub fn set_estimated_cost(&mut self, text: String) {
        self.record.estimated_cost = text;
    }

    pub fn set_estimated_time(&mut self, text: String) {
        self.record.estimated_time = text;
    }

    pub fn set_technician_name(&mut self, text: String) {
        self.record.technician_name = text;
    }

    // zones / controllers / backflow devices

    /// Clamped to [1, max]. Grows the backing array on demand and never
    /// truncates it: shrinking then growing again must not lose per-zone
    /// data already entered.
    pub fn set_active_zone_count(&mut self, count: usize) {
        let count = count.clamp(1, self.config.max_zones);
        while self.record.zones.len() < count {
            let id = self.record.zones.len() as u32 + 1;
            self.record.zones.push(new_zone(id));
        }
        self.record.active_zone_count = count;
    }

    pub fn add_more_zones(&mut self) {
        self.set_active_zone_count(self.record.active_zone_count + self.config.zone_grow_step);
    }

    pub fn add_controller(&mut self) -> bool {
        if self.record.controllers.len() >= self.config.max_controllers {
            return false;
        }
        let id = self.record.controllers.len() as u32 + 1;
        self.record.controllers.push(new_controller(id));
        true
    }

    /// Refused (no-op) when only one controller remains. Renumbers the
    /// survivors dense; zone references are left alone and readers
    /// tolerate the dangling ids.
    pub fn remove_controller(&mut self, index: usize) -> bool {
        if self.record.controllers.len() <= 1 || index >= self.record.controllers.len() {
            return false;
        }
        self.record.controllers.remove(index);
        for (i, controller) in self.record.controllers.iter_mut().enumerate() {
            controller.id = i as u32 + 1;
        }
        true
    }

    pub fn add_backflow_device(&mut self) -> bool {
        if self.record.backflow_devices.len() >= self.config.max_backflow_devices {
            return false;
        }
        let id = self.record.backflow_devices.len() as u32 + 1;
        self.record.backflow_devices.push(new_backflow_device(id));
        true
    }

    pub fn remove_backflow_device(&mut self, index: usize) -> bool {
        if self.record.backflow_devices.len() <= 1 || index >= self.record.backflow_devices.len() {
            return false;
        }
        self.record.backflow_devices.remove(index);
        for (i, device) in self.record.backflow_devices.iter_mut().enumerate() {
            device.id = i as u32 + 1;
        }
        true
    }

    // photos

    pub fn attach_zone_photo(&mut self, index: usize, slot: PhotoSlot, image: EncodedImage) {
        let Some(zone) = self.record.zones.get_mut(index) else {
            return;
        };
        match slot {
            PhotoSlot::Before => zone.before_images.push(image),
            PhotoSlot::After => zone.after_images.push(image),
        }
    }

    pub fn remove_zone_photo(&mut self, index: usize, slot: PhotoSlot, photo_index: usize) {
        let Some(zone) = self.record.zones.get_mut(index) else {
            return;
        };
        let images = match slot {
            PhotoSlot::Before => &mut zone.before_images,
            PhotoSlot::After => &mut zone.after_images,
        };
        if photo_index < images.len() {
            images.remove(photo_index);
        }
    }

    pub fn set_location_image(&mut self, target: LocateTarget, image: Option<EncodedImage>) {
        match target {
            LocateTarget::Client => self.record.client.location_image = image,
            LocateTarget::Pump => self.record.system.pump_location_image = image,
            LocateTarget::Zone(id) => {
                if let Some(zone) = self.record.zones.get_mut(id.saturating_sub(1) as usize) {
                    zone.location_image = image;
                }
            }
            LocateTarget::Controller(id) => {
                if let Some(controller) =
                    self.record.controllers.get_mut(id.saturating_sub(1) as usize)
                {
                    controller.location_image = image;
                }
            }
        }
    }

    // geolocation (single-flight per target key)

    pub fn request_device_location(
        &mut self,
        target: LocateTarget,
    ) -> Result<LocationRequest, GeolocationError> {
        let key = target.key();
        if self.locating.contains(&key) {
            return Err(GeolocationError::AlreadyInProgress { key });
        }
        self.locating.insert(key);
        Ok(LocationRequest {
            target,
            generation: self.generation,
        })
    }

    pub fn resolve_device_location(
        &mut self,
        ledger: &mut AuditLedger,
        now: &IsoUtcTimestamp,
        request: LocationRequest,
        result: Result<GeoPoint, GeolocationError>,
    ) -> Result<LocationOutcome, StorageError> {
        self.locating.remove(&request.target.key());
        let point = match result {
            Ok(point) => point,
            Err(err) => return Ok(LocationOutcome::Failed(err)),
        };
        if request.generation != self.generation {
            self.log(
                ledger,
                now,
                AuditSeverity::Info,
                reason_codes::WIZ_INFO_STALE_LOCATION_DISCARDED,
                format!("late location for {} after reset", request.target.key()),
            )?;
            return Ok(LocationOutcome::DiscardedStale);
        }
        let applied = match request.target {
            LocateTarget::Client => {
                self.record.client.geolocation = Some(point);
                true
            }
            LocateTarget::Pump => {
                self.record.system.pump_geolocation = Some(point);
                true
            }
            LocateTarget::Zone(id) => {
                match self.record.zones.get_mut(id.saturating_sub(1) as usize) {
                    Some(zone) => {
                        zone.geolocation = Some(point);
                        true
                    }
                    None => false,
                }
            }
            LocateTarget::Controller(id) => {
                match self.record.controllers.get_mut(id.saturating_sub(1) as usize) {
                    Some(controller) => {
                        controller.geolocation = Some(point);
                        true
                    }
                    None => false,
                }
            }
        };
        if !applied {
            self.log(
                ledger,
                now,
                AuditSeverity::Info,
                reason_codes::WIZ_INFO_LOCATION_TARGET_GONE,
                format!("location target {} no longer exists", request.target.key()),
            )?;
            return Ok(LocationOutcome::DiscardedTargetGone);
        }
        Ok(LocationOutcome::Applied {
            target: request.target,
            enrich_client_address: request.target == LocateTarget::Client,
        })
    }

    /// Best-effort address enrichment after a client location fix. A
    /// geocoder failure is swallowed into the ledger; the coordinates
    /// already written are never rolled back.
    pub fn apply_client_enrichment<E: ReverseGeocodeEngine>(
        &mut self,
        ledger: &mut AuditLedger,
        now: &IsoUtcTimestamp,
        engine: &E,
    ) -> Result<(), StorageError> {
        let Some(point) = self.record.client.geolocation else {
            return Ok(());
        };
        match engine.reverse(point) {
            Ok(enrichment) => {
                self.enrich_client_address(&enrichment);
                Ok(())
            }
            Err(err) => self.log(
                ledger,
                now,
                AuditSeverity::Info,
                reason_codes::WIZ_INFO_GEOCODE_ENRICHMENT_SKIPPED,
                format!("reverse geocode skipped: {:?} ({})", err.kind, err.detail),
            ),
        }
    }

    pub fn enrich_client_address(&mut self, enrichment: &ReverseGeocodeOk) {
        if !enrichment.street.is_empty() {
            self.record.client.address = enrichment.street.clone();
        }
        if !enrichment.locality.is_empty() {
            self.record.client.city = enrichment.locality.clone();
        }
    }

    // persistence (single-flight, coalescing)

    /// Prepare one durable write. While a previous write is outstanding
    /// further requests coalesce into it; nothing is queued.
    pub fn begin_save(
        &mut self,
        mode: SaveMode,
        owner: &SubjectId,
        saved_at: IsoUtcTimestamp,
    ) -> Result<SaveBegin, ContractViolation> {
        if self.save_in_flight {
            return Ok(SaveBegin::Coalesced);
        }
        let WizardPhase::Step(step) = self.phase else {
            return Ok(SaveBegin::NotApplicable);
        };
        let inspection_id = match &self.inspection_id {
            Some(id) => id.clone(),
            None => {
                self.save_nonce += 1;
                allocate_inspection_id(owner, &saved_at, self.save_nonce)?
            }
        };
        let ticket = SaveTicket::v1(
            inspection_id,
            owner.clone(),
            saved_at,
            step.index() as u8,
            storage_projection(&self.record),
        )?;
        self.save_in_flight = true;
        Ok(SaveBegin::Started(PendingSave {
            ticket,
            mode,
            generation: self.generation,
        }))
    }

    pub fn complete_save(
        &mut self,
        ledger: &mut AuditLedger,
        pending: PendingSave,
        result: Result<SavedInspectionSummary, PersistenceError>,
    ) -> Result<SaveCompletion, StorageError> {
        self.save_in_flight = false;
        let now = pending.ticket.saved_at.clone();
        if pending.generation != self.generation {
            self.log(
                ledger,
                &now,
                AuditSeverity::Info,
                reason_codes::WIZ_INFO_STALE_SAVE_DISCARDED,
                format!(
                    "save completion for {} ignored after reset",
                    pending.ticket.inspection_id.as_str()
                ),
            )?;
            return Ok(SaveCompletion::DiscardedStale);
        }
        match result {
            Ok(summary) => {
                self.inspection_id = Some(summary.id.clone());
                let notice = match pending.mode {
                    SaveMode::Explicit => Some(UserNotice {
                        kind: NoticeKind::Success,
                        message: "Inspection saved successfully".to_string(),
                    }),
                    SaveMode::Silent => None,
                };
                Ok(SaveCompletion::Saved { summary, notice })
            }
            Err(err) => match pending.mode {
                SaveMode::Explicit => Ok(SaveCompletion::Failed {
                    notice: Some(UserNotice {
                        kind: NoticeKind::Error,
                        message: format!("Error saving: {}", err.detail),
                    }),
                }),
                SaveMode::Silent => {
                    self.log(
                        ledger,
                        &now,
                        AuditSeverity::Warn,
                        reason_codes::WIZ_WARN_SILENT_SAVE_FAILED,
                        format!("background autosave failed: {}", err.detail),
                    )?;
                    Ok(SaveCompletion::Failed { notice: None })
                }
            },
        }
    }

    // computed

    pub fn active_zones(&self) -> &[Zone] {
        let end = self.record.active_zone_count.min(self.record.zones.len());
        &self.record.zones[..end]
    }

    pub fn zone_stats(&self) -> ZoneStats {
        let active = self.active_zones();
        let ok_count = active.iter().filter(|z| z.ok).count();
        let issue_count = active
            .iter()
            .filter(|z| z.leak || z.broken || z.clogged || z.misaligned)
            .count();
        let total = self.record.active_zone_count;
        let pending_count = total as i64 - ok_count as i64 - issue_count as i64;
        let progress_percent = if total == 0 {
            0
        } else {
            (((ok_count + issue_count) as f64 / total as f64) * 100.0).round() as u32
        };
        ZoneStats {
            ok_count,
            issue_count,
            pending_count,
            progress_percent,
        }
    }

    /// Partition of the active zones, group order by first appearance,
    /// zone order preserved inside each group.
    pub fn grouped_zones(&self, group_by: GroupBy) -> Vec<ZoneGroup> {
        let active_len = self.record.active_zone_count.min(self.record.zones.len());
        if group_by == GroupBy::None {
            return vec![ZoneGroup {
                label: None,
                zone_indices: (0..active_len).collect(),
            }];
        }
        let mut groups: Vec<ZoneGroup> = Vec::new();
        for (index, zone) in self.record.zones[..active_len].iter().enumerate() {
            let label = if group_by == GroupBy::Area {
                if zone.area.is_empty() {
                    "Unassigned".to_string()
                } else {
                    zone.area.clone()
                }
            } else {
                format!("Controller {}", zone.controller_id.max(1))
            };
            match groups
                .iter_mut()
                .find(|g| g.label.as_deref() == Some(label.as_str()))
            {
                Some(group) => group.zone_indices.push(index),
                None => groups.push(ZoneGroup {
                    label: Some(label),
                    zone_indices: vec![index],
                }),
            }
        }
        groups
    }

    fn log(
        &self,
        ledger: &mut AuditLedger,
        now: &IsoUtcTimestamp,
        severity: AuditSeverity,
        code: ReasonCodeId,
        detail: String,
    ) -> Result<(), StorageError> {
        let input = AuditEventInput::v1(now.clone(), severity, "wizard", code, Some(detail))?;
        ledger.append(input)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wetcheck_storage::docstore::MemoryDocumentStore;
    use wetcheck_storage::inspections::InspectionRepo;

    fn ts() -> IsoUtcTimestamp {
        IsoUtcTimestamp::new("2025-06-14T08:00:00.000Z").unwrap()
    }

    fn owner() -> SubjectId {
        SubjectId::new("uid_tech_1").unwrap()
    }

    fn started_wizard() -> InspectionWizard {
        let mut w = InspectionWizard::new(WizardConfig::mvp_v1());
        w.set_property_type(PropertyType::Residential);
        w
    }

    fn begin(w: &mut InspectionWizard, mode: SaveMode) -> PendingSave {
        match w.begin_save(mode, &owner(), ts()).unwrap() {
            SaveBegin::Started(p) => p,
            other => panic!("expected Started, got {other:?}"),
        }
    }

    #[test]
    fn at_wizard_01_property_selection_resets_and_repeat_is_silent() {
        let mut w = InspectionWizard::new(WizardConfig::mvp_v1());
        assert_eq!(w.phase(), WizardPhase::PropertySelection);

        w.set_property_type(PropertyType::Commercial);
        assert_eq!(w.phase(), WizardPhase::Step(WizardStep::Client));
        w.update_client(ClientField::Name("Bayshore HOA".to_string()));

        // Same type again: nothing happens.
        w.set_property_type(PropertyType::Commercial);
        assert_eq!(w.record().client.name, "Bayshore HOA");

        // Different type: full reset back to step 0 defaults.
        w.set_property_type(PropertyType::Residential);
        assert_eq!(w.record().client.name, "");
        assert_eq!(w.phase(), WizardPhase::Step(WizardStep::Client));
        assert_eq!(w.record().property_type, PropertyType::Residential);
    }

    #[test]
    fn at_wizard_02_zone_shrink_then_grow_preserves_entered_data() {
        let mut w = started_wizard();
        w.set_active_zone_count(8);
        w.update_zone(2, ZoneField::Notes("zone three notes".to_string()));
        w.update_zone(7, ZoneField::Notes("zone eight notes".to_string()));

        w.set_active_zone_count(3);
        assert_eq!(w.active_zones().len(), 3);
        // Backing array intact beyond the active count.
        assert_eq!(w.record().zones.len(), 8);

        w.set_active_zone_count(12);
        assert_eq!(w.record().zones[2].notes, "zone three notes");
        assert_eq!(w.record().zones[7].notes, "zone eight notes");
        assert_eq!(w.record().zones.len(), 12);
        assert_eq!(
            w.record().zones.iter().map(|z| z.id).collect::<Vec<_>>(),
            (1..=12).collect::<Vec<_>>()
        );
    }

    #[test]
    fn at_wizard_03_zone_count_clamps_to_bounds() {
        let mut w = started_wizard();
        w.set_active_zone_count(0);
        assert_eq!(w.record().active_zone_count, 1);
        w.set_active_zone_count(500);
        assert_eq!(w.record().active_zone_count, MAX_ZONES);
        assert_eq!(w.record().zones.len(), MAX_ZONES);
    }

    #[test]
    fn at_wizard_04_controller_ids_stay_dense_and_floor_is_refused() {
        let mut w = started_wizard();
        assert!(w.add_controller());
        assert!(w.add_controller());
        w.update_controller(1, ControllerField::Make("Hunter Pro-C".to_string()));

        assert!(w.remove_controller(0));
        let ids: Vec<u32> = w.record().controllers.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(w.record().controllers[0].make, "Hunter Pro-C");

        assert!(w.remove_controller(1));
        assert!(!w.remove_controller(0));
        assert_eq!(w.record().controllers.len(), 1);
    }

    #[test]
    fn at_wizard_05_collection_caps_are_enforced() {
        let mut w = started_wizard();
        for _ in 0..20 {
            w.add_controller();
        }
        assert_eq!(w.record().controllers.len(), MAX_CONTROLLERS);
        for _ in 0..20 {
            w.add_backflow_device();
        }
        assert_eq!(w.record().backflow_devices.len(), MAX_BACKFLOW_DEVICES);
    }

    #[test]
    fn at_wizard_06_progress_arithmetic() {
        let mut w = started_wizard();
        w.set_active_zone_count(10);
        for i in 0..6 {
            w.update_zone(i, ZoneField::Ok(true));
        }
        w.update_zone(6, ZoneField::Leak(true));

        let stats = w.zone_stats();
        assert_eq!(stats.ok_count, 6);
        assert_eq!(stats.issue_count, 1);
        assert_eq!(stats.pending_count, 3);
        assert_eq!(stats.progress_percent, 70);
    }

    #[test]
    fn at_wizard_07_grouping_preserves_order_and_defaults() {
        let mut w = started_wizard();
        w.set_active_zone_count(5);
        w.update_zone(0, ZoneField::Area("Front Lawn".to_string()));
        w.update_zone(2, ZoneField::Area("Front Lawn".to_string()));
        w.update_zone(3, ZoneField::Area("Beds".to_string()));
        w.update_zone(4, ZoneField::ControllerId(2));

        let by_area = w.grouped_zones(GroupBy::Area);
        let labels: Vec<&str> = by_area.iter().filter_map(|g| g.label.as_deref()).collect();
        assert_eq!(labels, vec!["Front Lawn", "Unassigned", "Beds"]);
        assert_eq!(by_area[0].zone_indices, vec![0, 2]);
        assert_eq!(by_area[1].zone_indices, vec![1, 4]);

        let by_controller = w.grouped_zones(GroupBy::Controller);
        let labels: Vec<&str> = by_controller
            .iter()
            .filter_map(|g| g.label.as_deref())
            .collect();
        assert_eq!(labels, vec!["Controller 1", "Controller 2"]);

        let flat = w.grouped_zones(GroupBy::None);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].zone_indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn at_wizard_08_location_requests_are_single_flight_per_key() {
        let mut w = started_wizard();
        let mut ledger = AuditLedger::new_in_memory();

        let client_req = w.request_device_location(LocateTarget::Client).unwrap();
        // Second request for the same key is rejected, not raced.
        let dup = w.request_device_location(LocateTarget::Client);
        assert!(matches!(
            dup,
            Err(GeolocationError::AlreadyInProgress { .. })
        ));
        // A different key proceeds independently.
        let pump_req = w.request_device_location(LocateTarget::Pump).unwrap();
        assert!(w.is_locating(LocateTarget::Client));
        assert!(w.is_locating(LocateTarget::Pump));

        let point = GeoPoint::new(27.9506, -82.4572).unwrap();
        let outcome = w
            .resolve_device_location(&mut ledger, &ts(), client_req, Ok(point))
            .unwrap();
        assert_eq!(
            outcome,
            LocationOutcome::Applied {
                target: LocateTarget::Client,
                enrich_client_address: true,
            }
        );
        assert_eq!(w.record().client.geolocation, Some(point));
        assert!(!w.is_locating(LocateTarget::Client));

        let outcome = w
            .resolve_device_location(&mut ledger, &ts(), pump_req, Ok(point))
            .unwrap();
        assert!(matches!(outcome, LocationOutcome::Applied { .. }));
        assert_eq!(w.record().system.pump_geolocation, Some(point));
    }

    #[test]
    fn at_wizard_09_location_failure_leaves_field_unset_and_clears_flight() {
        let mut w = started_wizard();
        let mut ledger = AuditLedger::new_in_memory();
        let req = w.request_device_location(LocateTarget::Zone(2)).unwrap();

        let outcome = w
            .resolve_device_location(&mut ledger, &ts(), req, Err(GeolocationError::Timeout))
            .unwrap();
        assert_eq!(outcome, LocationOutcome::Failed(GeolocationError::Timeout));
        assert_eq!(w.record().zones[1].geolocation, None);
        // The key is free again for a retry initiated by the user.
        assert!(w.request_device_location(LocateTarget::Zone(2)).is_ok());
    }

    #[test]
    fn at_wizard_10_stale_location_result_is_discarded_after_reset() {
        let mut w = started_wizard();
        let mut ledger = AuditLedger::new_in_memory();
        let req = w.request_device_location(LocateTarget::Client).unwrap();

        w.reset_for_new_inspection();
        w.set_property_type(PropertyType::Residential);

        let point = GeoPoint::new(27.9506, -82.4572).unwrap();
        let outcome = w
            .resolve_device_location(&mut ledger, &ts(), req, Ok(point))
            .unwrap();
        assert_eq!(outcome, LocationOutcome::DiscardedStale);
        assert_eq!(w.record().client.geolocation, None);
        assert_eq!(ledger.rows().len(), 1);
    }

    #[test]
    fn at_wizard_11_location_for_removed_controller_is_discarded() {
        let mut w = started_wizard();
        let mut ledger = AuditLedger::new_in_memory();
        w.add_controller();
        let req = w.request_device_location(LocateTarget::Controller(2)).unwrap();
        w.remove_controller(1);

        let point = GeoPoint::new(27.9506, -82.4572).unwrap();
        let outcome = w
            .resolve_device_location(&mut ledger, &ts(), req, Ok(point))
            .unwrap();
        assert_eq!(outcome, LocationOutcome::DiscardedTargetGone);
    }

    #[test]
    fn at_wizard_12_autosave_fires_once_per_summary_visit() {
        let mut w = started_wizard();
        let change = w.go_to(4).unwrap();
        assert!(change.autosave_due);

        // Re-entering the same step (step indicator tap) does not refire.
        let change = w.go_to(4).unwrap();
        assert!(!change.autosave_due);

        // Navigating away and coming back re-arms the latch.
        w.advance(-1).unwrap();
        let change = w.advance(1).unwrap();
        assert!(change.autosave_due);
    }

    #[test]
    fn at_wizard_13_advance_is_clamped_to_step_range() {
        let mut w = started_wizard();
        assert!(w.advance(-1).is_none());
        assert_eq!(w.current_step(), Some(WizardStep::Client));
        w.go_to(4).unwrap();
        assert!(w.advance(1).is_none());
        assert_eq!(w.current_step(), Some(WizardStep::Summary));
    }

    #[test]
    fn at_wizard_14_save_is_single_flight_and_coalesces() {
        let mut w = started_wizard();
        let mut ledger = AuditLedger::new_in_memory();
        let mut store = MemoryDocumentStore::new_in_memory();
        w.update_client(ClientField::Name("Jane Doe".to_string()));

        let pending = begin(&mut w, SaveMode::Explicit);
        // Second save before the first resolves: coalesced, no new write.
        assert_eq!(
            w.begin_save(SaveMode::Explicit, &owner(), ts()).unwrap(),
            SaveBegin::Coalesced
        );

        let summary = InspectionRepo::write(&mut store, &pending.ticket).unwrap();
        assert_eq!(store.document_count("inspections"), 1);

        let completion = w
            .complete_save(&mut ledger, pending, Ok(summary))
            .unwrap();
        match completion {
            SaveCompletion::Saved { notice, .. } => {
                assert_eq!(
                    notice.unwrap().message,
                    "Inspection saved successfully"
                );
            }
            other => panic!("expected Saved, got {other:?}"),
        }
        assert!(w.inspection_id().is_some());

        // The next save reuses the stable id instead of allocating.
        let second = begin(&mut w, SaveMode::Explicit);
        assert_eq!(Some(&second.ticket.inspection_id), w.inspection_id());
    }

    #[test]
    fn at_wizard_15_silent_save_failure_is_ledger_only() {
        let mut w = started_wizard();
        let mut ledger = AuditLedger::new_in_memory();

        let pending = begin(&mut w, SaveMode::Silent);
        let completion = w
            .complete_save(
                &mut ledger,
                pending,
                Err(PersistenceError {
                    detail: "store unreachable".to_string(),
                }),
            )
            .unwrap();
        assert_eq!(completion, SaveCompletion::Failed { notice: None });
        assert_eq!(ledger.rows_with_severity(AuditSeverity::Warn).len(), 1);

        // Explicit failures do surface.
        let pending = begin(&mut w, SaveMode::Explicit);
        let completion = w
            .complete_save(
                &mut ledger,
                pending,
                Err(PersistenceError {
                    detail: "store unreachable".to_string(),
                }),
            )
            .unwrap();
        match completion {
            SaveCompletion::Failed { notice: Some(n) } => {
                assert_eq!(n.kind, NoticeKind::Error);
                assert!(n.message.starts_with("Error saving:"));
            }
            other => panic!("expected surfaced failure, got {other:?}"),
        }
    }

    #[test]
    fn at_wizard_16_stale_save_completion_is_discarded() {
        let mut w = started_wizard();
        let mut ledger = AuditLedger::new_in_memory();
        let mut store = MemoryDocumentStore::new_in_memory();

        let pending = begin(&mut w, SaveMode::Explicit);
        let summary = InspectionRepo::write(&mut store, &pending.ticket).unwrap();

        w.reset_for_new_inspection();
        let completion = w
            .complete_save(&mut ledger, pending, Ok(summary))
            .unwrap();
        assert_eq!(completion, SaveCompletion::DiscardedStale);
        assert!(w.inspection_id().is_none());
        // The flag is clear, so the next record can save normally.
        assert!(!w.is_save_in_flight());
    }

    #[test]
    fn at_wizard_17_save_before_property_selection_is_not_applicable() {
        let mut w = InspectionWizard::new(WizardConfig::mvp_v1());
        assert_eq!(
            w.begin_save(SaveMode::Silent, &owner(), ts()).unwrap(),
            SaveBegin::NotApplicable
        );
    }

    #[test]
    fn at_wizard_18_enrichment_only_overwrites_with_nonempty_parts() {
        let mut w = started_wizard();
        w.update_client(ClientField::Address("typed by hand".to_string()));
        w.enrich_client_address(&ReverseGeocodeOk {
            street: String::new(),
            locality: "Tampa, Florida, 33606".to_string(),
        });
        assert_eq!(w.record().client.address, "typed by hand");
        assert_eq!(w.record().client.city, "Tampa, Florida, 33606");

        w.enrich_client_address(&ReverseGeocodeOk {
            street: "12 Palm Avenue".to_string(),
            locality: String::new(),
        });
        assert_eq!(w.record().client.address, "12 Palm Avenue");
        assert_eq!(w.record().client.city, "Tampa, Florida, 33606");
    }

    #[test]
    fn at_wizard_19_geocode_failure_is_swallowed_and_coords_kept() {
        struct FailingGeocoder;
        impl ReverseGeocodeEngine for FailingGeocoder {
            fn reverse(&self, _point: GeoPoint) -> Result<ReverseGeocodeOk, GeocodeError> {
                Err(GeocodeError {
                    provider: "nominatim",
                    kind: wetcheck_engines::geocode::GeocodeErrorKind::Timeout,
                    detail: "timed out".to_string(),
                })
            }
        }

        let mut w = started_wizard();
        let mut ledger = AuditLedger::new_in_memory();
        let req = w.request_device_location(LocateTarget::Client).unwrap();
        let point = GeoPoint::new(27.9506, -82.4572).unwrap();
        w.resolve_device_location(&mut ledger, &ts(), req, Ok(point))
            .unwrap();

        w.apply_client_enrichment(&mut ledger, &ts(), &FailingGeocoder)
            .unwrap();
        assert_eq!(w.record().client.geolocation, Some(point));
        assert_eq!(w.record().client.address, "");
        assert_eq!(ledger.rows().len(), 1);
    }

    #[test]
    fn at_wizard_20_load_saved_resumes_at_stored_step() {
        let mut w = started_wizard();
        let mut store = MemoryDocumentStore::new_in_memory();
        w.update_client(ClientField::Name("Jane Doe".to_string()));
        w.go_to(2).unwrap();

        let pending = begin(&mut w, SaveMode::Explicit);
        let summary = InspectionRepo::write(&mut store, &pending.ticket).unwrap();
        let mut ledger = AuditLedger::new_in_memory();
        w.complete_save(&mut ledger, pending, Ok(summary.clone()))
            .unwrap();

        let mut resumed = InspectionWizard::new(WizardConfig::mvp_v1());
        let stored = InspectionRepo::load(&store, &summary.id).unwrap();
        let change = resumed.load_saved(stored);
        assert_eq!(change.step, WizardStep::Zones);
        assert!(!change.autosave_due);
        assert_eq!(resumed.record().client.name, "Jane Doe");
        assert_eq!(resumed.inspection_id(), Some(&summary.id));
    }
}
