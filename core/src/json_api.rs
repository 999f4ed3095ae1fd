//! JSON inn / JSON ut – felles for Python-bindingene og binæren.
//!
//! Inngangen tolereres både som en bar liste og som `{"samples": [...]}`
//! (`{"rows": [...]}` for historikk). Parsefeil peker på stien som feilet.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use serde_path_to_error as spte;

use crate::analyzer::analyze_samples;
use crate::comparison::compare_sessions;
use crate::config::AnalysisConfig;
use crate::error::{CoreError, StoreError};
use crate::models::{Sample, SampleRow};
use crate::score::performance_score;

fn parse_list<T: DeserializeOwned>(json: &str, wrapper_key: &str) -> Result<Vec<T>, CoreError> {
    let mut de = serde_json::Deserializer::from_str(json);
    let value: Value = spte::deserialize(&mut de).map_err(|e| CoreError::Parse {
        path: e.path().to_string(),
        message: e.inner().to_string(),
    })?;

    // OBJECT først, ellers bar liste
    let (value, prefix) = match value {
        Value::Object(mut map) if map.contains_key(wrapper_key) => (
            map.remove(wrapper_key).unwrap_or(Value::Null),
            wrapper_key.to_string(),
        ),
        other => (other, String::new()),
    };

    spte::deserialize(value).map_err(|e| {
        let inner = e.path().to_string();
        let path = match (prefix.is_empty(), inner == ".") {
            (true, _) => inner,
            (false, true) => prefix.clone(),
            (false, false) => format!("{prefix}{inner}"),
        };
        CoreError::Parse { path, message: e.inner().to_string() }
    })
}

fn validate_all<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Result<(), CoreError> {
    for (i, s) in samples.into_iter().enumerate() {
        s.validate().map_err(|e| match e {
            StoreError::InvalidSample(reason) => {
                StoreError::InvalidSample(format!("[{i}]: {reason}"))
            }
            other => other,
        })?;
    }
    Ok(())
}

pub fn parse_samples(json: &str) -> Result<Vec<Sample>, CoreError> {
    let samples: Vec<Sample> = parse_list(json, "samples")?;
    validate_all(&samples)?;
    Ok(samples)
}

pub fn parse_rows(json: &str) -> Result<Vec<SampleRow>, CoreError> {
    let rows: Vec<SampleRow> = parse_list(json, "rows")?;
    validate_all(rows.iter().map(|r| &r.sample))?;
    Ok(rows)
}

fn to_json<T: Serialize>(v: &T) -> Result<String, CoreError> {
    serde_json::to_string(v).map_err(|e| StoreError::from(e).into())
}

/// Full analyse av et sample-sett (uten persistens).
pub fn analyze_samples_json(session_id: &str, samples_json: &str) -> Result<String, CoreError> {
    let samples = parse_samples(samples_json)?;
    let report = analyze_samples(session_id, &samples, &AnalysisConfig::default(), Utc::now());
    to_json(&report)
}

/// Historisk sammenligning over ferdig filtrerte rader.
pub fn compare_history_json(user_id: &str, days: u32, rows_json: &str) -> Result<String, CoreError> {
    let rows = parse_rows(rows_json)?;
    to_json(&compare_sessions(user_id, days, &rows))
}

pub fn performance_score_json(samples_json: &str) -> Result<String, CoreError> {
    let samples = parse_samples(samples_json)?;
    to_json(&performance_score(&samples, &AnalysisConfig::default()))
}
