use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::error::{CoreError, StoreError};
use crate::models::{Sample, Session};
use crate::store::{SampleStore, SessionRegistry};

pub const CSV_HEADER: [&str; 5] = [
    "Timestamp",
    "Test Type",
    "Force Value (N)",
    "Angle Value (°)",
    "Data Quality",
];

pub const HISTORY_CSV_HEADER: [&str; 8] = [
    "Session ID",
    "Session Start",
    "Session End",
    "Duration (s)",
    "Data Timestamp",
    "Test Type",
    "Force (N)",
    "Angle (°)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(CoreError::UnsupportedFormat(other.to_string())),
        }
    }
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

pub fn samples_to_csv(samples: &[Sample]) -> Result<String, CoreError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(CSV_HEADER)?;
    for s in samples {
        wtr.write_record([
            s.timestamp.to_rfc3339(),
            s.test_type.label().to_string(),
            opt(s.force_value),
            opt(s.angle_value),
            s.data_quality.to_string(),
        ])?;
    }
    into_string(wtr)
}

/// Eksporterer øktens samples i valgt format (tidsordnet).
pub fn export_samples(samples: &[Sample], format: ExportFormat) -> Result<String, CoreError> {
    let mut sorted = samples.to_vec();
    sorted.sort_by_key(|s| s.timestamp);
    match format {
        ExportFormat::Csv => samples_to_csv(&sorted),
        ExportFormat::Json => serde_json::to_string_pretty(&sorted)
            .map_err(|e| CoreError::from(StoreError::from(e))),
    }
}

fn into_string(wtr: csv::Writer<Vec<u8>>) -> Result<String, CoreError> {
    let bytes = wtr
        .into_inner()
        .map_err(|e| CoreError::Csv(csv::Error::from(e.into_error())))?;
    String::from_utf8(bytes).map_err(|e| CoreError::Parse {
        path: "csv".into(),
        message: e.to_string(),
    })
}

/// Én blokk per økt; en økt uten samples gir én rad med tomme sample-kolonner.
pub fn history_to_csv(history: &[(Session, Vec<Sample>)]) -> Result<String, CoreError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(HISTORY_CSV_HEADER)?;
    for (session, samples) in history {
        let session_cols = [
            session.session_id.clone(),
            session.start_time.to_rfc3339(),
            session.end_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
            session.duration_secs.map(|d| d.to_string()).unwrap_or_default(),
        ];
        if samples.is_empty() {
            let mut rec = session_cols.to_vec();
            rec.extend(std::iter::repeat(String::new()).take(4));
            wtr.write_record(&rec)?;
            continue;
        }
        for s in samples {
            let mut rec = session_cols.to_vec();
            rec.extend([
                s.timestamp.to_rfc3339(),
                s.test_type.label().to_string(),
                opt(s.force_value),
                opt(s.angle_value),
            ]);
            wtr.write_record(&rec)?;
        }
    }
    into_string(wtr)
}

/// Brukerens økter startet innenfor de siste `days` dagene, nyeste økt først,
/// samples i tidsrekkefølge innen hver økt.
pub fn export_user_history(
    registry: &dyn SessionRegistry,
    store: &dyn SampleStore,
    user_id: &str,
    days: i64,
    now: DateTime<Utc>,
) -> Result<String, CoreError> {
    let since = now - Duration::days(days);
    let mut sessions: Vec<Session> = registry
        .sessions_for_user(user_id)
        .into_iter()
        .filter(|s| s.start_time >= since)
        .collect();
    sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));

    let mut history = Vec::with_capacity(sessions.len());
    for session in sessions {
        let samples = store.read_samples(&session.session_id)?;
        history.push((session, samples));
    }
    log::debug!("historikk for {user_id}: {} økter siste {days} dager", history.len());
    history_to_csv(&history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn csv_has_header_and_blank_missing_channels() {
        let t0 = Utc.with_ymd_and_hms(2025, 7, 5, 10, 0, 0).unwrap();
        let out = samples_to_csv(&[Sample::force(t0, 42.5)]).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Timestamp,Test Type,Force Value (N),Angle Value (°),Data Quality"
        );
        assert_eq!(lines.next().unwrap(), "2025-07-05T10:00:00+00:00,force test,42.5,,1");
    }

    #[test]
    fn unknown_format_is_an_error() {
        assert!(matches!(
            "xlsx".parse::<ExportFormat>(),
            Err(CoreError::UnsupportedFormat(f)) if f == "xlsx"
        ));
    }
}
