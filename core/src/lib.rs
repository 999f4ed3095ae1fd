pub mod advisor;
pub mod analyzer;
pub mod calibration;
pub mod cluster;
pub mod collector;
pub mod comparison;
pub mod config;
pub mod device;
pub mod error;
pub mod export;
pub mod json_api;
pub mod metrics;
pub mod models;
pub mod progress;
pub mod score;
pub mod session;
pub mod stats;
pub mod storage;
pub mod store;
pub mod trend;
pub mod types;

#[cfg(feature = "python")]
mod py;

pub use analyzer::{analyze_samples, Analyzer};
pub use config::{load_config, AnalysisConfig, CoreConfig};
pub use error::{AdvisorError, ConfigError, CoreError, DeviceError, StoreError};
pub use models::{Sample, SampleRow, Session, SessionStatus, TestType, UserProfile};
pub use session::SessionManager;
pub use store::{InMemorySampleStore, InMemorySessionRegistry, SampleStore, SessionRegistry};
pub use types::{AnalysisReport, ComprehensiveAnalysis, Grade, Insufficient, Outcome};
