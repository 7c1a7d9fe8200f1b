#![forbid(unsafe_code)]

use std::fmt::Write as _;

use wetcheck_contracts::auth::CompanyBranding;
use wetcheck_contracts::record::{EncodedImage, InspectionRecord, PropertyType, Zone};

/// Branding block stamped onto both report artifacts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportBranding {
    pub company_name: String,
    pub website: String,
    pub phone: String,
    pub logo: Option<EncodedImage>,
}

impl ReportBranding {
    pub fn from_profile(company: Option<&CompanyBranding>) -> Self {
        let fallback_name = "Wet Check App";
        match company {
            Some(c) => Self {
                company_name: if c.name.is_empty() {
                    fallback_name.to_string()
                } else {
                    c.name.clone()
                },
                website: c.website.clone(),
                phone: c.phone.clone(),
                logo: c.logo.clone(),
            },
            None => Self {
                company_name: fallback_name.to_string(),
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneStatus {
    Ok,
    Issues(Vec<&'static str>),
    Unchecked,
}

/// Status display contract: OK wins outright; otherwise the true issue
/// flags joined in the fixed leak, broken, clogged, misaligned order;
/// otherwise a placeholder.
pub fn zone_status(zone: &Zone) -> ZoneStatus {
    if zone.ok {
        return ZoneStatus::Ok;
    }
    let mut issues = Vec::new();
    if zone.leak {
        issues.push("LEAK");
    }
    if zone.broken {
        issues.push("BROKEN");
    }
    if zone.clogged {
        issues.push("CLOGGED");
    }
    if zone.misaligned {
        issues.push("MISALIGNED");
    }
    if issues.is_empty() {
        ZoneStatus::Unchecked
    } else {
        ZoneStatus::Issues(issues)
    }
}

pub fn zone_status_text(zone: &Zone) -> String {
    match zone_status(zone) {
        ZoneStatus::Ok => "OK".to_string(),
        ZoneStatus::Issues(issues) => issues.join(", "),
        ZoneStatus::Unchecked => "—".to_string(),
    }
}

pub fn active_zones(record: &InspectionRecord) -> &[Zone] {
    let end = record.active_zone_count.min(record.zones.len());
    &record.zones[..end]
}

/// Part name -> total quantity across every active zone, summed (never
/// listed per zone). Lines with an empty part name are ignored; a zero
/// quantity counts as one, matching how the capture form treats a blank
/// quantity box.
pub fn aggregate_materials(record: &InspectionRecord) -> Vec<(String, u32)> {
    let mut totals: Vec<(String, u32)> = Vec::new();
    for zone in active_zones(record) {
        for line in zone.materials.iter().filter(|m| !m.part.is_empty()) {
            let qty = line.qty.max(1);
            match totals.iter_mut().find(|(part, _)| part == &line.part) {
                Some((_, total)) => *total += qty,
                None => totals.push((line.part.clone(), qty)),
            }
        }
    }
    totals
}

/// `{CommWetCheck|WetCheck}_{sanitized client name or "report"}_{date}.{ext}`
pub fn suggested_file_name(record: &InspectionRecord, ext: &str) -> String {
    let prefix = match record.property_type {
        PropertyType::Commercial => "CommWetCheck",
        PropertyType::Residential => "WetCheck",
    };
    let name = if record.client.name.trim().is_empty() {
        "report".to_string()
    } else {
        collapse_whitespace(&record.client.name)
    };
    format!("{prefix}_{name}_{date}.{ext}", date = record.client.date)
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_run = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_run {
                out.push('_');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

fn or_na(s: &str) -> &str {
    if s.is_empty() {
        "N/A"
    } else {
        s
    }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "—"
    } else {
        s
    }
}

fn maps_url(lat: f64, lng: f64) -> String {
    format!("https://maps.google.com/?q={lat},{lng}")
}

const BANNER: &str = "═══════════════════════";

/// The plain-text report: a pure function of the full in-memory record.
pub fn render_text(record: &InspectionRecord, branding: &ReportBranding) -> String {
    let commercial = record.property_type == PropertyType::Commercial;
    let client = &record.client;
    let system = &record.system;
    let mut out = String::new();

    let type_label = if commercial { "COMMERCIAL" } else { "RESIDENTIAL" };
    let _ = writeln!(out, "{BANNER}");
    let _ = writeln!(out, "{}", branding.company_name);
    let _ = writeln!(out, "  {type_label} WET CHECK REPORT");
    let _ = writeln!(out, "{BANNER}");
    out.push('\n');

    let _ = writeln!(out, "📋 CLIENT INFO");
    let _ = writeln!(out, "Client: {}", client.name);
    let _ = writeln!(out, "Address: {}, {}", client.address, client.city);
    if let Some(p) = client.geolocation {
        let _ = writeln!(
            out,
            "Location: {:.6}, {:.6} | {}",
            p.lat,
            p.lng,
            maps_url(p.lat, p.lng)
        );
    }
    let _ = writeln!(out, "Phone: {}", client.phone);
    let _ = writeln!(out, "Date: {}", client.date);
    let _ = writeln!(out, "Work Order: {}", client.work_order);
    if commercial {
        let _ = writeln!(out, "Property Type: {}", client.property_sub_type);
        let _ = writeln!(out, "Building/Complex: {}", client.building_name);
        let _ = writeln!(out, "Buildings/Areas: {}", client.num_buildings);
        let _ = writeln!(out, "Irrigated Acreage: {}", client.irrigated_acreage);
    }
    out.push('\n');

    let _ = writeln!(out, "⚙️ SYSTEM OVERVIEW");
    let _ = writeln!(out, "Controllers:");
    for c in &record.controllers {
        let loc = c
            .geolocation
            .map(|p| format!(" | 📍 {}", maps_url(p.lat, p.lng)))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  Controller {}: {} ({}) — {} — Zones {}-{}{loc}",
            c.id,
            or_na(&c.make),
            or_na(&c.kind),
            or_na(&c.location),
            if c.zone_from.is_empty() { "?" } else { &c.zone_from },
            if c.zone_to.is_empty() { "?" } else { &c.zone_to },
        );
    }
    let _ = writeln!(out, "Water Source: {}", system.water_source);
    let _ = writeln!(
        out,
        "Static PSI: {} | Working PSI: {}",
        system.static_psi, system.working_psi
    );
    let _ = writeln!(out, "Flow: {} GPM", system.flow_rate);
    let _ = writeln!(out, "Backflow Devices:");
    for b in &record.backflow_devices {
        let _ = writeln!(
            out,
            "  Backflow {}: {} — {}",
            b.id,
            or_na(&b.kind),
            or_na(&b.condition)
        );
    }
    let _ = writeln!(out, "Rain Sensor: {}", system.rain_sensor);
    let _ = writeln!(out, "Pump: {}", system.pump_station);
    if commercial {
        let _ = writeln!(
            out,
            "Mainline: {} {}",
            system.mainline_size, system.mainline_material
        );
        let _ = writeln!(out, "Master Valve: {}", system.master_valve);
        let _ = writeln!(out, "Flow Sensor: {}", system.flow_sensor);
        let _ = writeln!(out, "Points of Connection: {}", system.poc);
    }
    out.push('\n');

    let _ = writeln!(out, "💧 ZONE-BY-ZONE CHECK");
    for zone in active_zones(record) {
        let status = match zone_status(zone) {
            ZoneStatus::Ok => "✅ OK".to_string(),
            ZoneStatus::Issues(issues) => format!("⚠️ {}", issues.join(", ")),
            ZoneStatus::Unchecked => "—".to_string(),
        };
        let area = if zone.area.is_empty() {
            String::new()
        } else {
            format!(" [{}]", zone.area)
        };
        let ctrl = if commercial {
            format!(" (Ctrl {})", zone.controller_id.max(1))
        } else {
            String::new()
        };
        let notes = if zone.notes.is_empty() {
            String::new()
        } else {
            format!(" | {}", zone.notes)
        };
        let loc = zone
            .geolocation
            .map(|p| format!(" | 📍 {}", maps_url(p.lat, p.lng)))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "Zone {}{area}{ctrl}: {} | {} | {} heads | {} PSI | {status}{notes}{loc}",
            zone.id,
            or_na(&zone.kind),
            or_na(&zone.head_type),
            or_dash(&zone.heads),
            or_dash(&zone.psi),
        );
    }

    let materials = aggregate_materials(record);
    if !materials.is_empty() {
        out.push('\n');
        let _ = writeln!(out, "🔧 MATERIALS NEEDED (TOTAL)");
        for (part, qty) in &materials {
            let _ = writeln!(out, "  {qty}x {part}");
        }
    }

    out.push('\n');
    let _ = writeln!(out, "🔍 OBSERVATIONS");
    let set_keys = record.observations.set_keys(record.property_type);
    if set_keys.is_empty() {
        let _ = writeln!(out, "No issues noted");
    } else {
        for key in set_keys {
            let _ = writeln!(out, "• {}", key.label());
        }
    }

    out.push('\n');
    let _ = writeln!(out, "📝 RECOMMENDATIONS");
    let _ = writeln!(out, "{}", or_na(&record.recommendations));
    out.push('\n');
    let _ = writeln!(
        out,
        "⚡ PRIORITY: {}",
        record.priority.label().unwrap_or("N/A")
    );
    let _ = writeln!(out, "💰 Est. Cost: {}", or_na(&record.estimated_cost));
    let _ = writeln!(out, "⏱️ Est. Time: {}", or_na(&record.estimated_time));
    out.push('\n');
    let _ = writeln!(out, "Technician: {}", record.technician_name);
    out.push('\n');
    let _ = writeln!(out, "{BANNER}");
    let footer = if branding.phone.is_empty() {
        branding.website.clone()
    } else {
        format!("{} | {}", branding.website, branding.phone)
    };
    let _ = writeln!(out, "{footer}");
    let _ = writeln!(out, "Hablamos Español");
    let _ = writeln!(out, "{BANNER}");

    out
}
