use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

/// Geometry blobs are useless as text and bloat the rendered output.
const SKIPPED_FIELDS: [&str; 2] = ["shape", "location"];
const MISSING: &str = "N/A";

/// One record as returned by the incident API. The upstream schema drifts,
/// so every field is optional and unknown keys land in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawIncident {
    pub traffic_report_id: Option<String>,
    pub published_date: Option<String>,
    pub issue_reported: Option<String>,
    pub address: Option<String>,
    pub status: Option<String>,
    pub status_date: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A normalized incident ready for rendering and indexing.
#[derive(Debug, Clone)]
pub struct IncidentRecord {
    pub report_id: String,
    pub issue_reported: String,
    pub address: String,
    pub status: String,
    pub published_date: Option<DateTime<Utc>>,
    pub incident_age_hours: Option<f64>,
    pub coordinates: Option<(String, String)>,
    /// Ordered key/value listing of every surviving field, missing values
    /// filled with `N/A`.
    pub fields: Vec<(String, String)>,
}

pub async fn fetch_incidents(
    client: &Client,
    api_url: &str,
    limit: usize,
) -> Result<Vec<RawIncident>> {
    info!("Fetching traffic data with limit {}", limit);

    let response = client
        .get(api_url)
        .query(&[
            ("$limit", limit.to_string()),
            ("$order", "published_date DESC".to_string()),
        ])
        .send()
        .await?
        .error_for_status()?;

    let data: Vec<RawIncident> = response.json().await?;
    info!("Successfully fetched {} traffic incidents", data.len());
    Ok(data)
}

pub fn preprocess(raw: Vec<RawIncident>) -> Vec<IncidentRecord> {
    preprocess_at(raw, Utc::now())
}

pub fn preprocess_at(raw: Vec<RawIncident>, now: DateTime<Utc>) -> Vec<IncidentRecord> {
    info!("Preprocessing {} traffic incidents", raw.len());

    raw.into_iter()
        .enumerate()
        .map(|(idx, incident)| {
            let report_id = incident
                .traffic_report_id
                .clone()
                .unwrap_or_else(|| format!("unknown_{}", idx));

            let published_date = incident
                .published_date
                .as_deref()
                .and_then(parse_timestamp);
            let incident_age_hours =
                published_date.map(|published| (now - published).num_seconds() as f64 / 3600.0);

            let coordinates = match (&incident.latitude, &incident.longitude) {
                (Some(lat), Some(lon)) => Some((lat.clone(), lon.clone())),
                _ => None,
            };

            let or_missing = |value: &Option<String>| -> String {
                value.clone().unwrap_or_else(|| MISSING.to_string())
            };

            let mut fields = vec![
                ("traffic_report_id".to_string(), report_id.clone()),
                (
                    "published_date".to_string(),
                    or_missing(&incident.published_date),
                ),
                (
                    "issue_reported".to_string(),
                    or_missing(&incident.issue_reported),
                ),
                ("address".to_string(), or_missing(&incident.address)),
                ("status".to_string(), or_missing(&incident.status)),
                ("status_date".to_string(), or_missing(&incident.status_date)),
                ("latitude".to_string(), or_missing(&incident.latitude)),
                ("longitude".to_string(), or_missing(&incident.longitude)),
            ];

            for (key, value) in &incident.extra {
                if SKIPPED_FIELDS.contains(&key.as_str()) {
                    continue;
                }
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => MISSING.to_string(),
                    other => other.to_string(),
                };
                fields.push((key.clone(), rendered));
            }

            IncidentRecord {
                report_id,
                issue_reported: or_missing(&incident.issue_reported),
                address: or_missing(&incident.address),
                status: or_missing(&incident.status),
                published_date,
                incident_age_hours,
                coordinates,
                fields,
            }
        })
        .collect()
}

/// The API serves RFC 3339 timestamps in some fields and zone-less Socrata
/// floating timestamps in others; both are treated as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_json() -> &'static str {
        r#"[
            {
                "traffic_report_id": "A1B2C3",
                "published_date": "2024-03-01T10:00:00.000",
                "issue_reported": "Crash Urgent",
                "address": "100 Congress Ave",
                "status": "ACTIVE",
                "latitude": "30.26",
                "longitude": "-97.74",
                "agency": "AUSTIN PD",
                "location": {"type": "Point", "coordinates": [-97.74, 30.26]}
            },
            {
                "issue_reported": "Stalled Vehicle"
            }
        ]"#
    }

    #[test]
    fn deserializes_loose_records() {
        let raw: Vec<RawIncident> = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].traffic_report_id.as_deref(), Some("A1B2C3"));
        assert!(raw[0].extra.contains_key("agency"));
        assert!(raw[1].traffic_report_id.is_none());
    }

    #[test]
    fn preprocess_fills_missing_values_and_ids() {
        let raw: Vec<RawIncident> = serde_json::from_str(sample_json()).unwrap();
        let records = preprocess_at(raw, Utc::now());

        assert_eq!(records[0].report_id, "A1B2C3");
        assert_eq!(records[1].report_id, "unknown_1");
        assert_eq!(records[1].address, "N/A");
        assert_eq!(records[1].status, "N/A");
    }

    #[test]
    fn preprocess_skips_geometry_fields() {
        let raw: Vec<RawIncident> = serde_json::from_str(sample_json()).unwrap();
        let records = preprocess_at(raw, Utc::now());

        assert!(records[0].fields.iter().all(|(k, _)| k != "location"));
        assert!(records[0].fields.iter().any(|(k, _)| k == "agency"));
    }

    #[test]
    fn incident_age_is_derived_from_published_date() {
        let raw: Vec<RawIncident> = serde_json::from_str(sample_json()).unwrap();
        let published = parse_timestamp("2024-03-01T10:00:00.000").unwrap();
        let records = preprocess_at(raw, published + Duration::hours(2));

        let age = records[0].incident_age_hours.unwrap();
        assert!((age - 2.0).abs() < 1e-9);
        assert!(records[1].incident_age_hours.is_none());
    }

    #[test]
    fn parses_both_timestamp_shapes() {
        assert!(parse_timestamp("2024-03-01T10:00:00.000").is_some());
        assert!(parse_timestamp("2024-03-01T10:00:00+00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn coordinates_require_both_halves() {
        let raw: Vec<RawIncident> = serde_json::from_str(sample_json()).unwrap();
        let records = preprocess_at(raw, Utc::now());
        assert!(records[0].coordinates.is_some());
        assert!(records[1].coordinates.is_none());
    }
}
