use crate::fetcher::IncidentRecord;
use anyhow::Result;
use chrono::Utc;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use serde_json::json;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const TOP_MM: f32 = 280.0;
const BOTTOM_MM: f32 = 20.0;
const LEFT_MM: f32 = 10.0;
const LINE_STEP_MM: f32 = 7.0;
const FONT_SIZE: f32 = 12.0;
const MAX_VALUE_CHARS: usize = 200;

/// Line-per-row PDF writer. Layout is deliberately minimal; these documents
/// exist to be text-extracted, not read by humans.
struct PdfWriter {
    doc: PdfDocumentReference,
    font: IndirectFontRef,
    layer: PdfLayerReference,
    y: f32,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
        let font = doc.add_builtin_font(BuiltinFont::Helvetica)?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            font,
            layer,
            y: TOP_MM,
        })
    }

    fn line(&mut self, text: &str) {
        if self.y < BOTTOM_MM {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP_MM;
        }
        self.layer
            .use_text(text, FONT_SIZE, Mm(LEFT_MM), Mm(self.y), &self.font);
        self.y -= LINE_STEP_MM;
    }

    fn save(self, path: &Path) -> Result<()> {
        self.doc.save(&mut BufWriter::new(File::create(path)?))?;
        Ok(())
    }
}

/// One PDF per incident plus a combined summary. Returns all created paths,
/// summary last.
pub fn render_incident_pdfs(records: &[IncidentRecord], out_dir: &Path) -> Result<Vec<PathBuf>> {
    info!("Creating incident PDFs in directory {}", out_dir.display());
    fs::create_dir_all(out_dir)?;

    let generated_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let mut pdf_files = Vec::new();

    let mut summary = PdfWriter::new("Traffic Incident Summary")?;
    summary.line("Traffic Incident Summary");
    summary.line(&format!("Generated: {}", generated_at));
    summary.line("");

    for record in records {
        summary.line(&format!("Incident: {}", record.issue_reported));
        summary.line(&format!("Location: {}", record.address));
        summary.line(&format!("Status: {}", record.status));
        if let Some(published) = record.published_date {
            summary.line(&format!("Time: {}", published.format("%Y-%m-%d %H:%M:%S")));
        }
        summary.line("-------------------------");

        let mut pdf = PdfWriter::new(&format!("Traffic Incident {}", record.report_id))?;
        pdf.line(&format!("Traffic Incident: {}", record.report_id));
        pdf.line(&format!("Generated: {}", generated_at));
        pdf.line("");

        for (key, value) in &record.fields {
            pdf.line(&format!(
                "{}: {}",
                title_case(key),
                truncate(value, MAX_VALUE_CHARS)
            ));
        }

        if let Some((lat, lon)) = &record.coordinates {
            pdf.line(&format!("Coordinates: {}, {}", lat, lon));
        }

        let path = out_dir.join(format!("incident_{}.pdf", record.report_id));
        pdf.save(&path)?;
        pdf_files.push(path);
    }

    let summary_path = out_dir.join("all_incidents_summary.pdf");
    summary.save(&summary_path)?;
    pdf_files.push(summary_path);

    info!("Created {} PDF files", pdf_files.len());
    Ok(pdf_files)
}

/// Sidecar describing the dataset and carrying every record.
pub fn write_metadata_json(
    records: &[IncidentRecord],
    api_url: &str,
    out_dir: &Path,
) -> Result<PathBuf> {
    info!("Creating metadata JSON file");
    fs::create_dir_all(out_dir)?;

    let metadata = json!({
        "dataset_info": {
            "name": "Austin Traffic Incidents",
            "source": api_url,
            "record_count": records.len(),
            "generated_at": Utc::now().to_rfc3339(),
            "incident_types": incident_types(records),
        },
        "incidents": records.iter().map(record_json).collect::<Vec<_>>(),
    });

    let path = out_dir.join("traffic_incidents_metadata.json");
    serde_json::to_writer_pretty(BufWriter::new(File::create(&path)?), &metadata)?;

    info!("Created metadata JSON at {}", path.display());
    Ok(path)
}

fn incident_types(records: &[IncidentRecord]) -> Vec<String> {
    let mut seen = Vec::new();
    for record in records {
        if !seen.contains(&record.issue_reported) {
            seen.push(record.issue_reported.clone());
        }
    }
    seen
}

fn record_json(record: &IncidentRecord) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, value) in &record.fields {
        map.insert(key.clone(), json!(value));
    }
    match record.incident_age_hours {
        Some(age) => map.insert("incident_age_hours".to_string(), json!(age)),
        None => map.insert("incident_age_hours".to_string(), json!("N/A")),
    };
    serde_json::Value::Object(map)
}

fn title_case(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() > max_chars {
        let head: String = value.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{preprocess_at, RawIncident};
    use chrono::Utc;

    fn sample_records() -> Vec<IncidentRecord> {
        let raw: Vec<RawIncident> = serde_json::from_str(
            r#"[
                {
                    "traffic_report_id": "R1",
                    "published_date": "2024-03-01T10:00:00.000",
                    "issue_reported": "Crash Urgent",
                    "address": "100 Congress Ave",
                    "status": "ACTIVE",
                    "latitude": "30.26",
                    "longitude": "-97.74"
                },
                {
                    "traffic_report_id": "R2",
                    "issue_reported": "Crash Urgent",
                    "address": "E 6th St"
                }
            ]"#,
        )
        .unwrap();
        preprocess_at(raw, Utc::now())
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("traffic_rag_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn title_case_rewrites_snake_keys() {
        assert_eq!(title_case("issue_reported"), "Issue Reported");
        assert_eq!(title_case("status"), "Status");
    }

    #[test]
    fn truncate_caps_long_values_with_ellipsis() {
        let long = "x".repeat(300);
        let out = truncate(&long, 200);
        assert_eq!(out.chars().count(), 200);
        assert!(out.ends_with("..."));
        assert_eq!(truncate("short", 200), "short");
    }

    #[test]
    fn incident_types_are_deduplicated() {
        let records = sample_records();
        assert_eq!(incident_types(&records), vec!["Crash Urgent"]);
    }

    #[test]
    fn record_json_carries_age_or_na() {
        let records = sample_records();
        let with_date = record_json(&records[0]);
        assert!(with_date["incident_age_hours"].is_number());
        let without_date = record_json(&records[1]);
        assert_eq!(without_date["incident_age_hours"], "N/A");
    }

    #[test]
    fn renders_one_pdf_per_incident_plus_summary() {
        let dir = scratch_dir("render");
        let records = sample_records();

        let files = render_incident_pdfs(&records, &dir).unwrap();
        assert_eq!(files.len(), 3);
        assert!(dir.join("incident_R1.pdf").is_file());
        assert!(dir.join("incident_R2.pdf").is_file());
        assert!(dir.join("all_incidents_summary.pdf").is_file());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn metadata_sidecar_describes_dataset() {
        let dir = scratch_dir("metadata");
        let records = sample_records();

        let path = write_metadata_json(&records, "https://example.org/api.json", &dir).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(parsed["dataset_info"]["record_count"], 2);
        assert_eq!(parsed["dataset_info"]["source"], "https://example.org/api.json");
        assert_eq!(parsed["incidents"].as_array().unwrap().len(), 2);

        let _ = fs::remove_dir_all(&dir);
    }
}
