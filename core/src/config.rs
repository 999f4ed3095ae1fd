use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_path_to_error as spte;

use crate::error::ConfigError;

/// Terskler og referanseverdier for analysepipelinen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Overall-trend krever flere rader enn dette.
    pub trend_min_rows: usize,
    pub cluster_min_samples: usize,
    pub max_clusters: usize,
    pub kmeans_seed: u64,
    pub kmeans_n_init: usize,
    pub kmeans_max_iter: usize,
    pub force_reference_n: f64,
    pub angle_reference_deg: f64,
    pub baseline_force_threshold_n: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            trend_min_rows: 10,
            cluster_min_samples: 16,
            max_clusters: 5,
            kmeans_seed: 42,
            kmeans_n_init: 10,
            kmeans_max_iter: 300,
            force_reference_n: 300.0,
            angle_reference_deg: 90.0,
            baseline_force_threshold_n: 10.0,
        }
    }
}

/// Hva innsamlingen gjør når sensoren feiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Bytt til simulert måling (logges og telles).
    Simulate,
    /// Tell som feil; stopp etter max_consecutive_errors.
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub interval_ms: u64,
    pub duration_secs: u64,
    pub max_consecutive_errors: u32,
    pub fallback: FallbackPolicy,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            duration_secs: 60,
            max_consecutive_errors: 10,
            fallback: FallbackPolicy::Simulate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// ESP32 i AP-modus
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.4.1:80".to_string(),
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub base_url: String,
    pub model: String,
    /// Navnet på miljøvariabelen med API-nøkkelen (nøkkelen lagres aldri i config).
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            api_key_env: "REHAB_ADVISOR_API_KEY".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub analysis_log_path: String,
    pub profile_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            analysis_log_path: "analysis_results.jsonl".to_string(),
            profile_dir: "profiles".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CoreConfig {
    pub analysis: AnalysisConfig,
    pub collector: CollectorConfig,
    pub device: DeviceConfig,
    pub advisor: AdvisorConfig,
    pub storage: StorageConfig,
}

/// Parser config-JSON; feilmeldingen peker på stien som feilet.
pub fn parse_config(json: &str) -> Result<CoreConfig, ConfigError> {
    let mut de = serde_json::Deserializer::from_str(json);
    spte::deserialize(&mut de).map_err(|e| ConfigError::Parse {
        path: e.path().to_string(),
        message: e.inner().to_string(),
    })
}

/// Leser config fra disk. Mangler filen, brukes default.
pub fn load_config(path: impl AsRef<Path>) -> Result<CoreConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        log::warn!("fant ikke config på {}, bruker default", path.display());
        return Ok(CoreConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let cfg = parse_config(&contents)?;
    log::info!("config lastet fra {}", path.display());
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg = parse_config(r#"{"collector": {"interval_ms": 500, "fallback": "stop"}}"#).unwrap();
        assert_eq!(cfg.collector.interval_ms, 500);
        assert_eq!(cfg.collector.fallback, FallbackPolicy::Stop);
        assert_eq!(cfg.collector.max_consecutive_errors, 10);
        assert_eq!(cfg.analysis.cluster_min_samples, 16);
    }

    #[test]
    fn parse_error_names_path() {
        let err = parse_config(r#"{"analysis": {"max_clusters": "fem"}}"#).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, "analysis.max_clusters"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
