#![forbid(unsafe_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

use wetcheck_contracts::record::{EncodedImage, InspectionRecord, PropertyType};
use wetcheck_engines::image::decode_payload;

use crate::report::{
    active_zones, aggregate_materials, suggested_file_name, zone_status_text, ReportBranding,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    Render { detail: String },
}

// US letter, point units.
const PAGE_W: f32 = 612.0;
const PAGE_H: f32 = 792.0;
const MARGIN: f32 = 46.0;
const CONTENT_W: f32 = PAGE_W - MARGIN * 2.0;
const FOOTER_RESERVE: f32 = 64.0;
const TOP_MARGIN: f32 = 56.0;

const GREEN: (f32, f32, f32) = (0.102, 0.227, 0.361);
const LIGHT_GREEN: (f32, f32, f32) = (0.176, 0.427, 0.659);
const RED: (f32, f32, f32) = (0.827, 0.184, 0.184);
const GRAY: (f32, f32, f32) = (0.392, 0.392, 0.392);
const LIGHT_BG: (f32, f32, f32) = (0.910, 0.941, 0.973);
const WHITE: (f32, f32, f32) = (1.0, 1.0, 1.0);
const INK: (f32, f32, f32) = (0.118, 0.118, 0.118);

const LOCATION_IMG_W: f32 = 142.0;
const LOCATION_IMG_H: f32 = 108.0;
const PHOTO_W: f32 = 198.0;
const PHOTO_H: f32 = 147.0;

/// Render the paginated inspection document. A pure function of the full
/// in-memory record and the branding block; identical inputs produce
/// identical bytes.
pub fn render_document(
    record: &InspectionRecord,
    branding: &ReportBranding,
) -> Result<ReportArtifact, ReportError> {
    let mut composer = Composer::new();
    let commercial = record.property_type == PropertyType::Commercial;

    composer.header_band(record, branding);
    composer.client_section(record, commercial);
    composer.controllers_section(record);
    composer.system_section(record, commercial);
    composer.backflow_section(record);
    composer.zone_table_section(record, commercial);
    composer.zone_notes_section(record);
    composer.zone_locations_section(record);
    composer.zone_photos_section(record);
    composer.materials_section(record);
    composer.observations_section(record);
    composer.recommendations_section(record);
    composer.priority_box(record);
    composer.technician_section(record);

    let bytes = composer.finish(branding)?;
    Ok(ReportArtifact {
        bytes,
        file_name: suggested_file_name(record, "pdf"),
    })
}

#[derive(Default)]
struct PageBuild {
    ops: Vec<Operation>,
    xobjects: Dictionary,
}

struct Composer {
    doc: Document,
    done: Vec<PageBuild>,
    current: PageBuild,
    y: f32,
    image_seq: usize,
}

impl Composer {
    fn new() -> Self {
        Self {
            doc: Document::with_version("1.5"),
            done: Vec::new(),
            current: PageBuild::default(),
            y: TOP_MARGIN,
            image_seq: 0,
        }
    }

    fn push(&mut self, op: Operation) {
        self.current.ops.push(op);
    }

    fn ensure_space(&mut self, needed: f32) {
        if self.y + needed > PAGE_H - FOOTER_RESERVE {
            self.done.push(std::mem::take(&mut self.current));
            self.y = TOP_MARGIN;
        }
    }

    // primitives

    fn fill_rect(&mut self, x: f32, y_top: f32, w: f32, h: f32, color: (f32, f32, f32)) {
        let y = PAGE_H - y_top - h;
        self.push(Operation::new(
            "rg",
            vec![color.0.into(), color.1.into(), color.2.into()],
        ));
        self.push(Operation::new(
            "re",
            vec![x.into(), y.into(), w.into(), h.into()],
        ));
        self.push(Operation::new("f", vec![]));
    }

    fn stroke_rect(&mut self, x: f32, y_top: f32, w: f32, h: f32, color: (f32, f32, f32)) {
        let y = PAGE_H - y_top - h;
        self.push(Operation::new(
            "RG",
            vec![color.0.into(), color.1.into(), color.2.into()],
        ));
        self.push(Operation::new("w", vec![0.8f32.into()]));
        self.push(Operation::new(
            "re",
            vec![x.into(), y.into(), w.into(), h.into()],
        ));
        self.push(Operation::new("S", vec![]));
    }

    fn hline(&mut self, x1: f32, x2: f32, y_top: f32, width: f32, color: (f32, f32, f32)) {
        let y = PAGE_H - y_top;
        self.push(Operation::new(
            "RG",
            vec![color.0.into(), color.1.into(), color.2.into()],
        ));
        self.push(Operation::new("w", vec![width.into()]));
        self.push(Operation::new("m", vec![x1.into(), y.into()]));
        self.push(Operation::new("l", vec![x2.into(), y.into()]));
        self.push(Operation::new("S", vec![]));
    }

    fn text_at(
        &mut self,
        x: f32,
        baseline_top: f32,
        size: f32,
        bold: bool,
        color: (f32, f32, f32),
        text: &str,
    ) {
        let y = PAGE_H - baseline_top;
        let font = if bold { "F2" } else { "F1" };
        self.push(Operation::new("BT", vec![]));
        self.push(Operation::new(
            "Tf",
            vec![Object::Name(font.as_bytes().to_vec()), size.into()],
        ));
        self.push(Operation::new(
            "rg",
            vec![color.0.into(), color.1.into(), color.2.into()],
        ));
        self.push(Operation::new("Td", vec![x.into(), y.into()]));
        self.push(Operation::new(
            "Tj",
            vec![Object::string_literal(pdf_text(text))],
        ));
        self.push(Operation::new("ET", vec![]));
    }

    fn text_centered(
        &mut self,
        center_x: f32,
        baseline_top: f32,
        size: f32,
        bold: bool,
        color: (f32, f32, f32),
        text: &str,
    ) {
        // Helvetica averages just over half an em per glyph; close enough
        // for headings and footers.
        let width = text.chars().count() as f32 * size * 0.52;
        self.text_at(center_x - width / 2.0, baseline_top, size, bold, color, text);
    }

    /// Embed a normalized still as a DCTDecode XObject. Anything that is
    /// not a decodable JPEG is skipped silently; a missing photo must
    /// never abort an otherwise-complete report.
    fn image(&mut self, image: &EncodedImage, x: f32, w: f32, h: f32) -> bool {
        if image.media_type != "image/jpeg" {
            return false;
        }
        let Ok(bytes) = decode_payload(image) else {
            return false;
        };
        if bytes.len() < 2 || bytes[0] != 0xff || bytes[1] != 0xd8 {
            return false;
        }
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            bytes,
        );
        let id = self.doc.add_object(stream);
        self.image_seq += 1;
        let name = format!("Im{}", self.image_seq);
        self.current.xobjects.set(name.as_bytes(), id);

        let y = PAGE_H - self.y - h;
        self.push(Operation::new("q", vec![]));
        self.push(Operation::new(
            "cm",
            vec![
                w.into(),
                0.into(),
                0.into(),
                h.into(),
                x.into(),
                y.into(),
            ],
        ));
        self.push(Operation::new(
            "Do",
            vec![Object::Name(name.into_bytes())],
        ));
        self.push(Operation::new("Q", vec![]));
        true
    }

    // layout helpers

    fn section_title(&mut self, title: &str) {
        self.ensure_space(46.0);
        self.y += 8.0;
        self.fill_rect(MARGIN, self.y, 8.0, 18.0, GREEN);
        self.text_at(MARGIN + 15.0, self.y + 15.0, 12.0, true, GREEN, title);
        self.y += 32.0;
    }

    fn info_grid(&mut self, rows: &[Vec<(&str, String)>]) {
        for row in rows {
            self.ensure_space(34.0);
            let col_w = CONTENT_W / row.len() as f32;
            for (i, (label, value)) in row.iter().enumerate() {
                let x = MARGIN + i as f32 * col_w;
                self.text_at(x, self.y + 8.0, 8.0, true, GRAY, label);
                let value = if value.is_empty() { "-" } else { value.as_str() };
                self.text_at(x, self.y + 21.0, 10.0, false, INK, value);
            }
            self.y += 32.0;
        }
    }

    fn table(
        &mut self,
        headers: &[&str],
        width_fractions: &[f32],
        rows: &[Vec<String>],
        status_column: Option<usize>,
    ) {
        let head_h = 20.0;
        let row_h = 18.0;
        let widths: Vec<f32> = width_fractions.iter().map(|f| f * CONTENT_W).collect();

        self.ensure_space(head_h + row_h * 2.0);
        self.fill_rect(MARGIN, self.y, CONTENT_W, head_h, GREEN);
        let mut x = MARGIN;
        for (header, w) in headers.iter().zip(&widths) {
            self.text_at(x + 4.0, self.y + 14.0, 8.0, true, WHITE, header);
            x += w;
        }
        self.y += head_h;

        for (index, row) in rows.iter().enumerate() {
            self.ensure_space(row_h);
            if index % 2 == 1 {
                self.fill_rect(MARGIN, self.y, CONTENT_W, row_h, LIGHT_BG);
            }
            let mut x = MARGIN;
            for (col, (cell, w)) in row.iter().zip(&widths).enumerate() {
                let (color, bold) = match status_column {
                    Some(status_col) if status_col == col => match cell.as_str() {
                        "OK" => (GREEN, true),
                        "—" => (GRAY, false),
                        _ => (RED, true),
                    },
                    _ => (INK, false),
                };
                self.text_at(x + 4.0, self.y + 13.0, 8.0, bold, color, cell);
                x += w;
            }
            self.y += row_h;
            self.hline(MARGIN, MARGIN + CONTENT_W, self.y, 0.3, GRAY);
        }
        self.y += 8.0;
    }

    fn location_line(&mut self, prefix: &str, lat: f64, lng: f64) {
        self.ensure_space(16.0);
        self.text_at(
            MARGIN,
            self.y + 9.0,
            8.0,
            false,
            GRAY,
            &format!("{prefix}: {lat:.6}, {lng:.6}"),
        );
        self.text_at(MARGIN + 220.0, self.y + 9.0, 8.0, false, LIGHT_GREEN, "View on Maps");
        self.y += 14.0;
    }

    fn location_image(&mut self, image: &EncodedImage) {
        self.ensure_space(LOCATION_IMG_H + 10.0);
        if self.image(image, MARGIN, LOCATION_IMG_W, LOCATION_IMG_H) {
            self.y += LOCATION_IMG_H + 10.0;
        }
    }

    fn paragraph(&mut self, text: &str) {
        for line in wrap_text(text, 96) {
            self.ensure_space(16.0);
            self.text_at(MARGIN, self.y + 10.0, 10.0, false, INK, &line);
            self.y += 15.0;
        }
    }

    // sections (fixed order)

    fn header_band(&mut self, record: &InspectionRecord, branding: &ReportBranding) {
        self.fill_rect(0.0, 0.0, PAGE_W, 96.0, GREEN);
        self.fill_rect(0.0, 96.0, PAGE_W, 8.0, LIGHT_GREEN);
        self.text_centered(PAGE_W / 2.0, 40.0, 18.0, true, WHITE, &branding.company_name);
        let subtitle = format!(
            "{} Wet Check Inspection Report",
            record.property_type.label()
        );
        self.text_centered(PAGE_W / 2.0, 64.0, 11.0, false, WHITE, &subtitle);
        if record.property_type == PropertyType::Commercial
            && !record.client.property_sub_type.is_empty()
        {
            self.text_centered(
                PAGE_W / 2.0,
                84.0,
                9.0,
                false,
                WHITE,
                &record.client.property_sub_type,
            );
        }
        self.y = 130.0;
    }

    fn client_section(&mut self, record: &InspectionRecord, commercial: bool) {
        self.section_title("CLIENT INFORMATION");
        let c = &record.client;
        let mut rows = vec![
            vec![
                ("Client Name", c.name.clone()),
                ("Date", c.date.clone()),
                ("Work Order", c.work_order.clone()),
            ],
            vec![
                ("Property Address", c.address.clone()),
                ("City / Zip", c.city.clone()),
                ("Phone", c.phone.clone()),
            ],
            vec![
                ("Email", c.email.clone()),
                ("Property Manager", c.manager.clone()),
            ],
        ];
        if commercial {
            rows.push(vec![
                ("Complex / Building", c.building_name.clone()),
                ("# Buildings / Areas", c.num_buildings.clone()),
                ("Irrigated Acreage", c.irrigated_acreage.clone()),
            ]);
        }
        self.info_grid(&rows);

        if let Some(p) = c.geolocation {
            self.location_line("Location", p.lat, p.lng);
            if let Some(image) = &c.location_image {
                self.location_image(image);
            }
        }
    }

    fn controllers_section(&mut self, record: &InspectionRecord) {
        self.section_title("CONTROLLERS");
        let rows: Vec<Vec<String>> = record
            .controllers
            .iter()
            .map(|c| {
                let zones = if c.zone_from.is_empty() || c.zone_to.is_empty() {
                    "—".to_string()
                } else {
                    format!("{}-{}", c.zone_from, c.zone_to)
                };
                vec![
                    c.id.to_string(),
                    dash_if_empty(&c.make),
                    dash_if_empty(&c.kind),
                    dash_if_empty(&c.location),
                    zones,
                ]
            })
            .collect();
        self.table(
            &["#", "Make / Model", "Type", "Location", "Zones"],
            &[0.06, 0.30, 0.22, 0.28, 0.14],
            &rows,
            None,
        );

        for c in &record.controllers {
            if let Some(p) = c.geolocation {
                self.location_line(&format!("Controller {}", c.id), p.lat, p.lng);
                if let Some(image) = &c.location_image {
                    self.location_image(image);
                }
            }
        }
    }

    fn system_section(&mut self, record: &InspectionRecord, commercial: bool) {
        self.section_title("SYSTEM OVERVIEW");
        let s = &record.system;
        let mut rows = vec![
            vec![
                ("Water Source", s.water_source.clone()),
                ("Meter Size", s.meter_size.clone()),
                ("Flow Rate (GPM)", s.flow_rate.clone()),
            ],
            vec![
                ("Static PSI", s.static_psi.clone()),
                ("Working PSI", s.working_psi.clone()),
            ],
            vec![
                ("Rain Sensor", s.rain_sensor.clone()),
                ("Pump Station", s.pump_station.clone()),
            ],
        ];
        if commercial {
            rows.push(vec![
                ("Mainline Size", s.mainline_size.clone()),
                ("Mainline Material", s.mainline_material.clone()),
                ("Master Valve", s.master_valve.clone()),
            ]);
            rows.push(vec![
                ("Flow Sensor", s.flow_sensor.clone()),
                ("Points of Connection", s.poc.clone()),
            ]);
        }
        self.info_grid(&rows);

        if let Some(p) = s.pump_geolocation {
            self.location_line("Pump", p.lat, p.lng);
            if let Some(image) = &s.pump_location_image {
                self.location_image(image);
            }
        }
    }

    fn backflow_section(&mut self, record: &InspectionRecord) {
        if record.backflow_devices.is_empty() {
            return;
        }
        self.section_title("BACKFLOW DEVICES");
        let rows: Vec<Vec<String>> = record
            .backflow_devices
            .iter()
            .map(|b| {
                vec![
                    b.id.to_string(),
                    dash_if_empty(&b.kind),
                    dash_if_empty(&b.condition),
                ]
            })
            .collect();
        self.table(
            &["#", "Type", "Condition"],
            &[0.08, 0.46, 0.46],
            &rows,
            None,
        );
    }

    fn zone_table_section(&mut self, record: &InspectionRecord, commercial: bool) {
        self.section_title("ZONE-BY-ZONE INSPECTION RESULTS");
        let zones = active_zones(record);
        let (headers, widths): (&[&str], &[f32]) = if commercial {
            (
                &["Zone", "Area", "Ctrl", "Type", "Brand", "Heads", "PSI", "Status"],
                &[0.08, 0.15, 0.06, 0.14, 0.14, 0.09, 0.09, 0.25],
            )
        } else {
            (
                &["Zone", "Type", "Head Brand", "Heads", "PSI", "Status"],
                &[0.09, 0.20, 0.20, 0.11, 0.11, 0.29],
            )
        };
        let rows: Vec<Vec<String>> = zones
            .iter()
            .map(|z| {
                let status = zone_status_text(z);
                if commercial {
                    vec![
                        z.id.to_string(),
                        dash_if_empty(&z.area),
                        z.controller_id.max(1).to_string(),
                        dash_if_empty(&z.kind),
                        dash_if_empty(&z.head_type),
                        dash_if_empty(&z.heads),
                        dash_if_empty(&z.psi),
                        status,
                    ]
                } else {
                    vec![
                        z.id.to_string(),
                        dash_if_empty(&z.kind),
                        dash_if_empty(&z.head_type),
                        dash_if_empty(&z.heads),
                        dash_if_empty(&z.psi),
                        status,
                    ]
                }
            })
            .collect();
        let status_col = if commercial { 7 } else { 5 };
        self.table(headers, widths, &rows, Some(status_col));
    }

    fn zone_notes_section(&mut self, record: &InspectionRecord) {
        let noted: Vec<_> = active_zones(record)
            .iter()
            .filter(|z| !z.notes.is_empty())
            .collect();
        if noted.is_empty() {
            return;
        }
        self.ensure_space(24.0);
        self.text_at(MARGIN, self.y + 10.0, 9.0, true, GRAY, "Zone Notes:");
        self.y += 16.0;
        for zone in noted {
            self.ensure_space(16.0);
            let prefix = zone_prefix(zone.id, &zone.area);
            self.text_at(
                MARGIN + 5.0,
                self.y + 10.0,
                9.0,
                false,
                INK,
                &format!("{prefix}: {}", zone.notes),
            );
            self.y += 15.0;
        }
        self.y += 4.0;
    }

    fn zone_locations_section(&mut self, record: &InspectionRecord) {
        let located: Vec<_> = active_zones(record)
            .iter()
            .filter(|z| z.geolocation.is_some())
            .collect();
        if located.is_empty() {
            return;
        }
        self.ensure_space(24.0);
        self.text_at(MARGIN, self.y + 10.0, 9.0, true, GRAY, "Zone Locations:");
        self.y += 16.0;
        for zone in located {
            let Some(p) = zone.geolocation else { continue };
            self.location_line(&zone_prefix(zone.id, &zone.area), p.lat, p.lng);
            if let Some(image) = &zone.location_image {
                self.location_image(image);
            }
        }
        self.y += 4.0;
    }

    fn zone_photos_section(&mut self, record: &InspectionRecord) {
        let with_photos: Vec<_> = active_zones(record)
            .iter()
            .filter(|z| !z.before_images.is_empty() || !z.after_images.is_empty())
            .collect();
        if with_photos.is_empty() {
            return;
        }
        self.section_title("ZONE PHOTOS");
        for zone in with_photos {
            self.ensure_space(30.0);
            self.text_at(
                MARGIN,
                self.y + 11.0,
                10.0,
                true,
                GREEN,
                &zone_prefix(zone.id, &zone.area),
            );
            self.y += 18.0;

            let labeled: Vec<(String, &EncodedImage)> = zone
                .before_images
                .iter()
                .enumerate()
                .map(|(i, img)| (photo_label("Before", i, zone.before_images.len()), img))
                .chain(
                    zone.after_images
                        .iter()
                        .enumerate()
                        .map(|(i, img)| (photo_label("After", i, zone.after_images.len()), img)),
                )
                .collect();

            for pair in labeled.chunks(2) {
                self.ensure_space(PHOTO_H + 26.0);
                let mut drew_any = false;
                for (slot, (label, img)) in pair.iter().enumerate() {
                    let x = MARGIN + slot as f32 * (PHOTO_W + 16.0);
                    self.text_centered(x + PHOTO_W / 2.0, self.y + 8.0, 8.0, false, GRAY, label);
                    if self.draw_photo(img, x) {
                        drew_any = true;
                    }
                }
                self.y += if drew_any { PHOTO_H + 24.0 } else { 14.0 };
            }
        }
    }

    fn draw_photo(&mut self, image: &EncodedImage, x: f32) -> bool {
        let saved_y = self.y;
        self.y += 12.0;
        let drawn = self.image(image, x, PHOTO_W, PHOTO_H);
        self.y = saved_y;
        drawn
    }

    fn materials_section(&mut self, record: &InspectionRecord) {
        let materials = aggregate_materials(record);
        if materials.is_empty() {
            return;
        }
        self.section_title("MATERIALS NEEDED");
        let rows: Vec<Vec<String>> = materials
            .into_iter()
            .map(|(part, qty)| vec![qty.to_string(), part])
            .collect();
        self.table(&["Qty", "Part / Fitting"], &[0.10, 0.90], &rows, None);
    }

    fn observations_section(&mut self, record: &InspectionRecord) {
        self.section_title("GENERAL OBSERVATIONS");
        let set_keys = record.observations.set_keys(record.property_type);
        if set_keys.is_empty() {
            self.ensure_space(18.0);
            self.text_at(MARGIN, self.y + 10.0, 10.0, false, GRAY, "No issues noted.");
            self.y += 18.0;
            return;
        }
        for key in set_keys {
            self.ensure_space(18.0);
            self.fill_rect(MARGIN + 2.0, self.y + 3.0, 5.0, 5.0, RED);
            self.text_at(MARGIN + 14.0, self.y + 8.0, 10.0, false, INK, key.label());
            self.y += 17.0;
        }
        self.y += 4.0;
    }

    fn recommendations_section(&mut self, record: &InspectionRecord) {
        self.section_title("RECOMMENDATIONS");
        if record.recommendations.is_empty() {
            self.ensure_space(18.0);
            self.text_at(MARGIN, self.y + 10.0, 10.0, false, GRAY, "None.");
            self.y += 18.0;
        } else {
            self.paragraph(&record.recommendations);
        }
        self.y += 8.0;
    }

    fn priority_box(&mut self, record: &InspectionRecord) {
        self.ensure_space(80.0);
        let box_h = 56.0;
        self.fill_rect(MARGIN, self.y, CONTENT_W, box_h, LIGHT_BG);
        self.stroke_rect(MARGIN, self.y, CONTENT_W, box_h, GREEN);

        let col_w = CONTENT_W / 3.0;
        let labels = ["Priority", "Est. Cost", "Est. Time"];
        let values = [
            record.priority.label().unwrap_or("—").to_string(),
            dash_if_empty(&record.estimated_cost),
            dash_if_empty(&record.estimated_time),
        ];
        for (i, (label, value)) in labels.iter().zip(&values).enumerate() {
            let x = MARGIN + i as f32 * col_w + 14.0;
            self.text_at(x, self.y + 17.0, 8.0, true, GRAY, label);
            self.text_at(x, self.y + 38.0, 11.0, true, GREEN, value);
        }
        self.y += box_h + 24.0;
    }

    fn technician_section(&mut self, record: &InspectionRecord) {
        self.ensure_space(50.0);
        self.text_at(MARGIN, self.y + 8.0, 8.0, true, GRAY, "Technician");
        self.text_at(
            MARGIN,
            self.y + 26.0,
            12.0,
            false,
            INK,
            &dash_if_empty(&record.technician_name),
        );
        self.hline(MARGIN + 226.0, MARGIN + 424.0, self.y + 26.0, 0.6, GRAY);
        self.text_at(MARGIN + 226.0, self.y + 38.0, 8.0, false, GRAY, "Signature");
        self.y += 50.0;
    }

    // assembly

    fn finish(mut self, branding: &ReportBranding) -> Result<Vec<u8>, ReportError> {
        let mut pages = std::mem::take(&mut self.done);
        pages.push(std::mem::take(&mut self.current));
        let total = pages.len();
        let footer_text = {
            let parts: Vec<&str> = [branding.website.as_str(), branding.phone.as_str()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .chain(std::iter::once("Hablamos Espanol"))
                .collect();
            parts.join(" | ")
        };

        for (index, page) in pages.iter_mut().enumerate() {
            append_footer(page, index + 1, total, &footer_text);
        }

        let pages_id = self.doc.new_object_id();
        let font_regular = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let font_bold = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });

        let mut kids: Vec<Object> = Vec::with_capacity(total);
        for page in pages {
            let content = Content {
                operations: page.ops,
            };
            let encoded = content.encode().map_err(|e| ReportError::Render {
                detail: e.to_string(),
            })?;
            let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));

            let mut fonts = Dictionary::new();
            fonts.set("F1", font_regular);
            fonts.set("F2", font_bold);
            let mut resources = Dictionary::new();
            resources.set("Font", fonts);
            resources.set("XObject", page.xobjects);

            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), PAGE_W.into(), PAGE_H.into()],
                "Contents" => content_id,
                "Resources" => resources,
            });
            kids.push(page_id.into());
        }

        self.doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => total as i64,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.doc
            .save_to(&mut bytes)
            .map_err(|e| ReportError::Render {
                detail: e.to_string(),
            })?;
        Ok(bytes)
    }
}

fn append_footer(page: &mut PageBuild, number: usize, total: usize, footer_text: &str) {
    let y: f32 = 44.0;
    let mut ops = Vec::new();
    ops.push(Operation::new(
        "RG",
        vec![GREEN.0.into(), GREEN.1.into(), GREEN.2.into()],
    ));
    ops.push(Operation::new("w", vec![1.2f32.into()]));
    ops.push(Operation::new("m", vec![MARGIN.into(), (y + 14.0).into()]));
    ops.push(Operation::new(
        "l",
        vec![(PAGE_W - MARGIN).into(), (y + 14.0).into()],
    ));
    ops.push(Operation::new("S", vec![]));

    let center_text = |x: f32, text: &str| -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 8.into()]),
            Operation::new("rg", vec![GRAY.0.into(), GRAY.1.into(), GRAY.2.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(pdf_text(text))]),
            Operation::new("ET", vec![]),
        ]
    };
    let footer_w = footer_text.chars().count() as f32 * 8.0 * 0.52;
    ops.extend(center_text(PAGE_W / 2.0 - footer_w / 2.0, footer_text));
    let page_label = format!("Page {number} of {total}");
    let label_w = page_label.chars().count() as f32 * 8.0 * 0.52;
    ops.extend(center_text(PAGE_W - MARGIN - label_w, &page_label));

    page.ops.extend(ops);
}

fn dash_if_empty(s: &str) -> String {
    if s.is_empty() {
        "—".to_string()
    } else {
        s.to_string()
    }
}

fn zone_prefix(id: u32, area: &str) -> String {
    if area.is_empty() {
        format!("Zone {id}")
    } else {
        format!("Zone {id} [{area}]")
    }
}

fn photo_label(kind: &str, index: usize, total: usize) -> String {
    if total > 1 {
        format!("{kind} {}", index + 1)
    } else {
        kind.to_string()
    }
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw_line in text.lines() {
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            if current.is_empty() {
                current = word.to_string();
            } else if current.chars().count() + 1 + word.chars().count() <= max_chars {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(current);
                current = word.to_string();
            }
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// The base fonts are WinAnsi; anything outside printable ASCII is
/// approximated rather than emitted as mojibake.
fn pdf_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '—' | '–' => '-',
            '’' | '‘' => '\'',
            '“' | '”' => '"',
            'ñ' => 'n',
            'é' => 'e',
            'á' => 'a',
            'í' => 'i',
            'ó' => 'o',
            'ú' => 'u',
            c if (' '..='~').contains(&c) => c,
            _ => '?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wetcheck_contracts::record::{GeoPoint, InspectionRecord, MaterialLine};
    use wetcheck_engines::image::encode_payload;

    fn branding() -> ReportBranding {
        ReportBranding {
            company_name: "Suncoast Irrigation".to_string(),
            website: "www.suncoast-irrigation.example".to_string(),
            phone: "(813) 555-0142".to_string(),
            logo: None,
        }
    }

    fn jpeg_fixture() -> EncodedImage {
        // Minimal JFIF header; enough to pass the magic check.
        encode_payload(
            "image/jpeg",
            &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46, 0x49, 0x46],
            800,
            600,
        )
        .unwrap()
    }

    fn populated_record() -> InspectionRecord {
        let mut r = InspectionRecord::new_default(PropertyType::Commercial);
        r.client.name = "Bayshore HOA".to_string();
        r.client.date = "2025-06-14".to_string();
        r.client.property_sub_type = "HOA / Condo".to_string();
        r.client.geolocation = Some(GeoPoint::new(27.9506, -82.4572).unwrap());
        r.zones[0].ok = true;
        r.zones[0].geolocation = Some(GeoPoint::new(27.9510, -82.4580).unwrap());
        r.zones[1].leak = true;
        r.zones[1].notes = "lateral seep".to_string();
        r.zones[1].materials.push(MaterialLine {
            part: "Electric Valve 1\"".to_string(),
            qty: 2,
        });
        r.zones[1].before_images.push(jpeg_fixture());
        r.zones[1].after_images.push(jpeg_fixture());
        r.observations.main_line_leak = true;
        r.technician_name = "C. Alvarez".to_string();
        r
    }

    #[test]
    fn at_pdf_01_renders_all_sections_in_order() {
        let artifact = render_document(&populated_record(), &branding()).unwrap();
        assert!(artifact.bytes.starts_with(b"%PDF-1.5"));
        assert_eq!(artifact.file_name, "CommWetCheck_Bayshore_HOA_2025-06-14.pdf");

        // Uncompressed content streams keep the text visible, so the
        // section order is checkable directly on the bytes.
        let text = String::from_utf8_lossy(&artifact.bytes).to_string();
        let sections = [
            "CLIENT INFORMATION",
            "CONTROLLERS",
            "SYSTEM OVERVIEW",
            "BACKFLOW DEVICES",
            "ZONE-BY-ZONE INSPECTION RESULTS",
            "Zone Notes:",
            "Zone Locations:",
            "ZONE PHOTOS",
            "MATERIALS NEEDED",
            "GENERAL OBSERVATIONS",
            "RECOMMENDATIONS",
            "Technician",
        ];
        let mut last = 0;
        for section in sections {
            let at = text[last..]
                .find(section)
                .unwrap_or_else(|| panic!("section {section} missing or out of order"));
            last += at;
        }
        assert!(text.contains("Page 1 of"));
    }

    #[test]
    fn at_pdf_02_render_is_deterministic() {
        let a = render_document(&populated_record(), &branding()).unwrap();
        let b = render_document(&populated_record(), &branding()).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn at_pdf_03_undecodable_images_are_skipped_silently() {
        let mut record = populated_record();
        // A PNG payload and a corrupt base64 blob both embed nothing.
        record.zones[0].before_images.push(
            EncodedImage::new("image/png", "iVBORw0KGgo=", 400, 300).unwrap(),
        );
        record.client.location_image =
            Some(EncodedImage::new("image/jpeg", "#broken#", 800, 600).unwrap());

        let artifact = render_document(&record, &branding()).unwrap();
        let text = String::from_utf8_lossy(&artifact.bytes).to_string();
        // The two decodable JPEG photos embed; the others are skipped.
        assert!(text.contains("/Im1"));
        assert!(text.contains("/Im2"));
        assert!(!text.contains("/Im3"));
    }

    #[test]
    fn at_pdf_04_many_zones_paginate_with_footer_on_every_page() {
        let mut record = populated_record();
        record.zones = (1..=80).map(wetcheck_contracts::record::new_zone).collect();
        record.active_zone_count = 80;
        let artifact = render_document(&record, &branding()).unwrap();
        let text = String::from_utf8_lossy(&artifact.bytes).to_string();
        assert!(text.contains("Page 1 of"));
        assert!(text.contains("Page 2 of"));
        // Every page carries the footer banner.
        let banners = text.matches("Hablamos Espanol").count();
        let page_labels = text.matches("Page 1 of").count()
            + text.matches("Page 2 of").count()
            + text.matches("Page 3 of").count()
            + text.matches("Page 4 of").count()
            + text.matches("Page 5 of").count();
        assert_eq!(banners, page_labels);
    }

    #[test]
    fn at_pdf_05_status_placeholder_is_ansi_safe() {
        let record = InspectionRecord::new_default(PropertyType::Residential);
        let artifact = render_document(&record, &branding()).unwrap();
        let text = String::from_utf8_lossy(&artifact.bytes).to_string();
        // The em-dash placeholder is transliterated for the base fonts.
        assert!(!text.contains('\u{2014}'));
    }
}
