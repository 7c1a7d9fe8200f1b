#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{ContractViolation, SchemaVersion, Validate};

pub const RECORD_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const MAX_ZONES: usize = 120;
pub const MAX_CONTROLLERS: usize = 10;
pub const MAX_BACKFLOW_DEVICES: usize = 6;
pub const DEFAULT_ZONE_COUNT: usize = 6;
pub const ZONE_GROW_STEP: usize = 4;

// Catalog strings feed UI dropdowns and report labels; free-text entry is
// still allowed everywhere, so these are advisory, not validated against.
pub const ZONE_TYPES: &[&str] = &["Rotors", "Sprays", "Drip", "Bubblers", "MP Rotator", "Mixed"];
pub const HEAD_TYPES: &[&str] = &[
    "Hunter",
    "Rain Bird",
    "Toro",
    "Irritrol",
    "K-Rain",
    "Weathermatic",
    "Other",
];
pub const BACKFLOW_TYPES: &[&str] = &["PVB", "RPZ", "DCV", "None"];
pub const CONTROLLER_TYPES: &[&str] = &[
    "Conventional",
    "Smart/WiFi",
    "2-Wire Decoder",
    "Battery",
    "Central Control",
];
pub const PROPERTY_SUBTYPES: &[&str] = &[
    "HOA / Condo",
    "Office Building",
    "Retail / Shopping Center",
    "Restaurant",
    "Municipal / Park",
    "School / Campus",
    "Sports Field",
    "Industrial",
    "Other",
];
pub const MAINLINE_SIZES: &[&str] = &["1\"", "1.5\"", "2\"", "3\"", "4\"", "6\""];
pub const MAINLINE_MATERIALS: &[&str] = &["PVC", "Copper", "Poly", "Galvanized"];
pub const WATER_SOURCES: &[&str] = &[
    "City Water",
    "Well",
    "Reclaim/Recycled",
    "Canal",
    "Lake/Pond",
    "River",
    "Rainwater Harvest",
    "Mixed",
    "Other",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[default]
    Residential,
    Commercial,
}

impl PropertyType {
    pub fn label(self) -> &'static str {
        match self {
            PropertyType::Residential => "Residential",
            PropertyType::Commercial => "Commercial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, ContractViolation> {
        let p = Self { lat, lng };
        p.validate()?;
        Ok(p)
    }
}

impl Validate for GeoPoint {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.lat.is_finite() {
            return Err(ContractViolation::NotFinite { field: "geo_point.lat" });
        }
        if !self.lng.is_finite() {
            return Err(ContractViolation::NotFinite { field: "geo_point.lng" });
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(ContractViolation::InvalidRange {
                field: "geo_point.lat",
                min: -90.0,
                max: 90.0,
                got: self.lat,
            });
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(ContractViolation::InvalidRange {
                field: "geo_point.lng",
                min: -180.0,
                max: 180.0,
                got: self.lng,
            });
        }
        Ok(())
    }
}

/// A normalized still image as produced by the capture pipeline: already
/// bounded in resolution and encoded, ready for data-URI transport or
/// direct embedding in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedImage {
    pub media_type: String,
    pub base64_data: String,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn new(
        media_type: impl Into<String>,
        base64_data: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Result<Self, ContractViolation> {
        let img = Self {
            media_type: media_type.into(),
            base64_data: base64_data.into(),
            width,
            height,
        };
        img.validate()?;
        Ok(img)
    }
}

impl Validate for EncodedImage {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.media_type.starts_with("image/") {
            return Err(ContractViolation::InvalidValue {
                field: "encoded_image.media_type",
                reason: "must be an image/* media type",
            });
        }
        if self.base64_data.is_empty() || !self.base64_data.is_ascii() {
            return Err(ContractViolation::InvalidValue {
                field: "encoded_image.base64_data",
                reason: "must be non-empty base64",
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "encoded_image.dimensions",
                reason: "must be non-zero",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub address: String,
    pub city: String,
    pub phone: String,
    pub email: String,
    pub manager: String,
    pub date: String,
    pub work_order: String,
    // Commercial-only; retained verbatim when the property type toggles.
    pub property_sub_type: String,
    pub building_name: String,
    pub num_buildings: String,
    pub irrigated_acreage: String,
    pub geolocation: Option<GeoPoint>,
    pub location_image: Option<EncodedImage>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemInfo {
    pub total_zones: String,
    pub active_zones: String,
    pub water_source: String,
    pub meter_size: String,
    pub static_psi: String,
    pub working_psi: String,
    pub flow_rate: String,
    pub rain_sensor: String,
    pub pump_station: String,
    // Commercial-only; retained verbatim when the property type toggles.
    pub mainline_size: String,
    pub mainline_material: String,
    pub master_valve: String,
    pub flow_sensor: String,
    pub poc: String,
    pub pump_geolocation: Option<GeoPoint>,
    pub pump_location_image: Option<EncodedImage>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Controller {
    pub id: u32,
    pub make: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: String,
    pub zone_from: String,
    pub zone_to: String,
    pub geolocation: Option<GeoPoint>,
    pub location_image: Option<EncodedImage>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackflowDevice {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaterialLine {
    pub part: String,
    pub qty: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Zone {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub head_type: String,
    pub heads: String,
    pub psi: String,
    pub ok: bool,
    pub leak: bool,
    pub broken: bool,
    pub clogged: bool,
    pub misaligned: bool,
    pub notes: String,
    pub area: String,
    pub controller_id: u32,
    pub before_images: Vec<EncodedImage>,
    pub after_images: Vec<EncodedImage>,
    pub geolocation: Option<GeoPoint>,
    pub location_image: Option<EncodedImage>,
    pub materials: Vec<MaterialLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationKey {
    MainLineLeak,
    LateralLeak,
    ValveBoxFlooded,
    Overspray,
    DrySpots,
    CoverageIssues,
    Erosion,
    DrainageIssues,
    CodeViolations,
    TimerIssues,
    WaterWaste,
    RootDamage,
}

impl ObservationKey {
    /// Fixed display/report order: the six universal flags, then the six
    /// commercial-only flags.
    pub const ALL: [ObservationKey; 12] = [
        ObservationKey::MainLineLeak,
        ObservationKey::LateralLeak,
        ObservationKey::ValveBoxFlooded,
        ObservationKey::Overspray,
        ObservationKey::DrySpots,
        ObservationKey::CoverageIssues,
        ObservationKey::Erosion,
        ObservationKey::DrainageIssues,
        ObservationKey::CodeViolations,
        ObservationKey::TimerIssues,
        ObservationKey::WaterWaste,
        ObservationKey::RootDamage,
    ];

    pub fn is_commercial_only(self) -> bool {
        matches!(
            self,
            ObservationKey::Erosion
                | ObservationKey::DrainageIssues
                | ObservationKey::CodeViolations
                | ObservationKey::TimerIssues
                | ObservationKey::WaterWaste
                | ObservationKey::RootDamage
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ObservationKey::MainLineLeak => "Main Line Leak",
            ObservationKey::LateralLeak => "Lateral Line Leak",
            ObservationKey::ValveBoxFlooded => "Valve Box Flooded",
            ObservationKey::Overspray => "Overspray",
            ObservationKey::DrySpots => "Dry Spots",
            ObservationKey::CoverageIssues => "Coverage Issues",
            ObservationKey::Erosion => "Erosion",
            ObservationKey::DrainageIssues => "Drainage Issues",
            ObservationKey::CodeViolations => "Code Violations",
            ObservationKey::TimerIssues => "Timer Programming Issues",
            ObservationKey::WaterWaste => "Water Waste",
            ObservationKey::RootDamage => "Tree Root Damage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Observations {
    pub main_line_leak: bool,
    pub lateral_leak: bool,
    pub valve_box_flooded: bool,
    pub overspray: bool,
    pub dry_spots: bool,
    pub coverage_issues: bool,
    pub erosion: bool,
    pub drainage_issues: bool,
    pub code_violations: bool,
    pub timer_issues: bool,
    pub water_waste: bool,
    pub root_damage: bool,
}

impl Observations {
    pub fn is_set(&self, key: ObservationKey) -> bool {
        match key {
            ObservationKey::MainLineLeak => self.main_line_leak,
            ObservationKey::LateralLeak => self.lateral_leak,
            ObservationKey::ValveBoxFlooded => self.valve_box_flooded,
            ObservationKey::Overspray => self.overspray,
            ObservationKey::DrySpots => self.dry_spots,
            ObservationKey::CoverageIssues => self.coverage_issues,
            ObservationKey::Erosion => self.erosion,
            ObservationKey::DrainageIssues => self.drainage_issues,
            ObservationKey::CodeViolations => self.code_violations,
            ObservationKey::TimerIssues => self.timer_issues,
            ObservationKey::WaterWaste => self.water_waste,
            ObservationKey::RootDamage => self.root_damage,
        }
    }

    pub fn set(&mut self, key: ObservationKey, value: bool) {
        let slot = match key {
            ObservationKey::MainLineLeak => &mut self.main_line_leak,
            ObservationKey::LateralLeak => &mut self.lateral_leak,
            ObservationKey::ValveBoxFlooded => &mut self.valve_box_flooded,
            ObservationKey::Overspray => &mut self.overspray,
            ObservationKey::DrySpots => &mut self.dry_spots,
            ObservationKey::CoverageIssues => &mut self.coverage_issues,
            ObservationKey::Erosion => &mut self.erosion,
            ObservationKey::DrainageIssues => &mut self.drainage_issues,
            ObservationKey::CodeViolations => &mut self.code_violations,
            ObservationKey::TimerIssues => &mut self.timer_issues,
            ObservationKey::WaterWaste => &mut self.water_waste,
            ObservationKey::RootDamage => &mut self.root_damage,
        };
        *slot = value;
    }

    pub fn toggle(&mut self, key: ObservationKey) {
        let current = self.is_set(key);
        self.set(key, !current);
    }

    /// Flags currently set, in the fixed `ObservationKey::ALL` order,
    /// restricted to the flags that apply to the given property type.
    pub fn set_keys(&self, property_type: PropertyType) -> Vec<ObservationKey> {
        ObservationKey::ALL
            .into_iter()
            .filter(|k| property_type == PropertyType::Commercial || !k.is_commercial_only())
            .filter(|k| self.is_set(*k))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    #[default]
    Unset,
    Immediate,
    High,
    Routine,
    Upgrade,
}

// Persisted as its display label; the empty string is the unset state and
// unrecognized legacy text degrades to unset instead of failing a load.
impl Serialize for Priority {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label().unwrap_or(""))
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "Immediate / Safety" => Priority::Immediate,
            "High Priority" => Priority::High,
            "Routine" => Priority::Routine,
            "Upgrade" => Priority::Upgrade,
            _ => Priority::Unset,
        })
    }
}

impl Priority {
    pub const CHOICES: [Priority; 4] = [
        Priority::Immediate,
        Priority::High,
        Priority::Routine,
        Priority::Upgrade,
    ];

    pub fn label(self) -> Option<&'static str> {
        match self {
            Priority::Unset => None,
            Priority::Immediate => Some("Immediate / Safety"),
            Priority::High => Some("High Priority"),
            Priority::Routine => Some("Routine"),
            Priority::Upgrade => Some("Upgrade"),
        }
    }
}

/// Root aggregate for one inspection. Owned exclusively by the wizard
/// while editing; the persistence adapter only ever sees a stripped
/// projection of it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InspectionRecord {
    pub property_type: PropertyType,
    pub client: ClientInfo,
    pub system: SystemInfo,
    pub controllers: Vec<Controller>,
    pub backflow_devices: Vec<BackflowDevice>,
    pub zones: Vec<Zone>,
    pub active_zone_count: usize,
    pub observations: Observations,
    pub recommendations: String,
    pub priority: Priority,
    pub estimated_cost: String,
    pub estimated_time: String,
    pub technician_name: String,
}

pub fn new_zone(id: u32) -> Zone {
    Zone {
        id,
        controller_id: 1,
        ..Zone::default()
    }
}

pub fn new_controller(id: u32) -> Controller {
    Controller {
        id,
        ..Controller::default()
    }
}

pub fn new_backflow_device(id: u32) -> BackflowDevice {
    BackflowDevice {
        id,
        ..BackflowDevice::default()
    }
}

impl InspectionRecord {
    /// A freshly started inspection: one controller, one backflow device,
    /// six pre-allocated active zones.
    pub fn new_default(property_type: PropertyType) -> Self {
        Self {
            property_type,
            controllers: vec![new_controller(1)],
            backflow_devices: vec![new_backflow_device(1)],
            zones: (1..=DEFAULT_ZONE_COUNT as u32).map(new_zone).collect(),
            active_zone_count: DEFAULT_ZONE_COUNT,
            ..Self::default()
        }
    }
}

impl Validate for InspectionRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.controllers.is_empty() || self.controllers.len() > MAX_CONTROLLERS {
            return Err(ContractViolation::InvalidValue {
                field: "inspection_record.controllers",
                reason: "cardinality must be within 1..=10",
            });
        }
        if self.backflow_devices.is_empty() || self.backflow_devices.len() > MAX_BACKFLOW_DEVICES {
            return Err(ContractViolation::InvalidValue {
                field: "inspection_record.backflow_devices",
                reason: "cardinality must be within 1..=6",
            });
        }
        if self.zones.is_empty() || self.zones.len() > MAX_ZONES {
            return Err(ContractViolation::InvalidValue {
                field: "inspection_record.zones",
                reason: "cardinality must be within 1..=120",
            });
        }
        if self.active_zone_count == 0 || self.active_zone_count > self.zones.len() {
            return Err(ContractViolation::InvalidValue {
                field: "inspection_record.active_zone_count",
                reason: "must be within 1..=zones.len()",
            });
        }
        for (i, c) in self.controllers.iter().enumerate() {
            if c.id != i as u32 + 1 {
                return Err(ContractViolation::InvalidValue {
                    field: "inspection_record.controllers",
                    reason: "ids must be dense 1..=N in order",
                });
            }
        }
        for (i, b) in self.backflow_devices.iter().enumerate() {
            if b.id != i as u32 + 1 {
                return Err(ContractViolation::InvalidValue {
                    field: "inspection_record.backflow_devices",
                    reason: "ids must be dense 1..=N in order",
                });
            }
        }
        for (i, z) in self.zones.iter().enumerate() {
            if z.id != i as u32 + 1 {
                return Err(ContractViolation::InvalidValue {
                    field: "inspection_record.zones",
                    reason: "ids must be dense 1..=N in order",
                });
            }
            if let Some(p) = &z.geolocation {
                p.validate()?;
            }
        }
        if let Some(p) = &self.client.geolocation {
            p.validate()?;
        }
        if let Some(p) = &self.system.pump_geolocation {
            p.validate()?;
        }
        Ok(())
    }
}
