use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::advisor::Recommendation;
use crate::error::StoreError;
use crate::models::UserProfile;
use crate::types::AnalysisRecord;

/// Leser inn brukerprofil fra disk (JSON).
/// Hvis filen ikke finnes, returneres en default-profil.
pub fn load_profile(path: impl AsRef<Path>) -> Result<UserProfile, StoreError> {
    let path = path.as_ref();
    if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        let profile: UserProfile = serde_json::from_str(&contents)?;
        log::info!(
            "profil lastet fra {} (stage={:?})",
            path.display(),
            profile.rehabilitation_stage
        );
        Ok(profile)
    } else {
        log::warn!("fant ikke profil på {}, returnerer default", path.display());
        Ok(UserProfile::default())
    }
}

/// Lagrer profil til disk som JSON (pretty-print).
pub fn save_profile(profile: &UserProfile, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(profile)?;
    std::fs::write(path, json)?;
    log::info!("profil lagret til {}", path.display());
    Ok(())
}

/// Mottaker for analyseresultater (append-only revisjonsspor).
pub trait AnalysisSink: Send + Sync {
    fn save_analysis(&self, record: &AnalysisRecord) -> Result<(), StoreError>;
}

/// Mottaker for genererte anbefalinger.
pub trait RecommendationSink: Send + Sync {
    fn save_recommendation(&self, recommendation: &Recommendation) -> Result<(), StoreError>;
}

/// Append-only JSONL-fil. Hele linjen skrives i ett kall under lås,
/// så samtidige skrivere ikke fletter delvise linjer.
#[derive(Debug)]
struct JsonlFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlFile {
    fn new(path: PathBuf) -> Self {
        Self { path, lock: Mutex::new(()) }
    }

    fn append<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        // serialiser før vi åpner filen – feiler dette, er ingenting skrevet
        let mut line = serde_json::to_string(value)?;
        line.push('\n');

        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn read_where<T, F>(&self, keep: F) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let value: T = serde_json::from_str(&line)?;
            if keep(&value) {
                out.push(value);
            }
        }
        Ok(out)
    }
}

/// Én JSON-linje per analyse.
#[derive(Debug)]
pub struct JsonlAnalysisStore {
    file: JsonlFile,
}

impl JsonlAnalysisStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { file: JsonlFile::new(path.into()) }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Alle lagrede rader for en økt, eldste først.
    pub fn load_records(&self, session_id: &str) -> Result<Vec<AnalysisRecord>, StoreError> {
        self.file.read_where(|r: &AnalysisRecord| r.session_id == session_id)
    }
}

impl AnalysisSink for JsonlAnalysisStore {
    fn save_analysis(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        self.file.append(record)?;
        log::info!(
            "analyse lagret: {} - {}",
            record.session_id,
            record.analysis_type.as_str()
        );
        Ok(())
    }
}

/// Én JSON-linje per anbefaling.
#[derive(Debug)]
pub struct JsonlRecommendationStore {
    file: JsonlFile,
}

impl JsonlRecommendationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { file: JsonlFile::new(path.into()) }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn load_for_session(&self, session_id: &str) -> Result<Vec<Recommendation>, StoreError> {
        self.file
            .read_where(|r: &Recommendation| r.session_id.as_deref() == Some(session_id))
    }

    pub fn load_for_user(&self, user_id: &str) -> Result<Vec<Recommendation>, StoreError> {
        self.file
            .read_where(|r: &Recommendation| r.user_id.as_deref() == Some(user_id))
    }
}

impl RecommendationSink for JsonlRecommendationStore {
    fn save_recommendation(&self, recommendation: &Recommendation) -> Result<(), StoreError> {
        self.file.append(recommendation)?;
        log::info!("anbefaling lagret: {:?}", recommendation.kind);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAnalysisStore {
    records: Mutex<Vec<AnalysisRecord>>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AnalysisRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl AnalysisSink for InMemoryAnalysisStore {
    fn save_analysis(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRecommendationStore {
    recommendations: Mutex<Vec<Recommendation>>,
}

impl InMemoryRecommendationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.recommendations.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl RecommendationSink for InMemoryRecommendationStore {
    fn save_recommendation(&self, recommendation: &Recommendation) -> Result<(), StoreError> {
        let mut all = self.recommendations.lock().map_err(|_| StoreError::Poisoned)?;
        all.push(recommendation.clone());
        Ok(())
    }
}
