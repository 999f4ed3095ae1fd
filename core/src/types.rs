use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::TestType;

/// Eksplisitt markør i stedet for feil eller oppdiktede tall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum Insufficient {
    EmptyInput,
    InsufficientData { required: usize, found: usize },
    InsufficientHistory { required: usize, found: usize },
    SessionNotFound { session_id: String },
    /// Beregningen ga ikke noe meningsfullt svar (f.eks. KMeans uten konvergens).
    Degenerate { reason: String },
}

/// Seksjon som enten er beregnet eller markert som utilgjengelig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    Ready(T),
    Missing(Insufficient),
}

impl<T> Outcome<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Outcome::Ready(v) => Some(v),
            Outcome::Missing(_) => None,
        }
    }

    pub fn missing(&self) -> Option<&Insufficient> {
        match self {
            Outcome::Ready(_) => None,
            Outcome::Missing(m) => Some(m),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready(_))
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Statistikk
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub std: f64, // utvalgs-std (n-1), 0 for én verdi
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TypeStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<ChannelStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<ChannelStats>,
}

pub type StatisticalAnalysis = BTreeMap<TestType, TypeStatistics>;

// ──────────────────────────────────────────────────────────────────────────────
// Trend
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTrend {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub duration_minutes: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_force: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_force: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_angle: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub change: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OverallTrends {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_improvement: Option<Improvement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_improvement: Option<Improvement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeTrend {
    pub session_trends: Vec<SessionTrend>,
    /// Kun med når typen har flere enn terskelen antall rader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_trends: Option<OverallTrends>,
}

pub type TrendAnalysis = BTreeMap<TestType, TypeTrend>;

// ──────────────────────────────────────────────────────────────────────────────
// Klynger
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub n_clusters: usize,
    /// Silhuett i [-1, 1]; 0 når ingen k ga mer enn én ikke-tom klynge.
    pub validity_score: f64,
    /// Sentre i standardisert feature-rom.
    pub cluster_centers: Vec<Vec<f64>>,
    /// Én etikett per sample av typen, i samme rekkefølge; None for rader uten alle features.
    pub cluster_labels: Vec<Option<usize>>,
    pub features: Vec<String>,
}

pub type ClusteringAnalysis = BTreeMap<TestType, Outcome<ClusterReport>>;

// ──────────────────────────────────────────────────────────────────────────────
// Score
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    /// A ≥ 90, B ≥ 80, C ≥ 70, ellers D.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Grade::A
        } else if score >= 80.0 {
            Grade::B
        } else if score >= 70.0 {
            Grade::C
        } else {
            Grade::D
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedComponents {
    pub angle_component: f64,
    pub force_component: f64,
    /// Første vinkel med kraft over terskel; None når ingen sample kvalifiserer.
    pub baseline_angle: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeScore {
    /// Referanseformelen slik den står (FORCE gir brøk, ANGLE prosent).
    pub raw: f64,
    /// Normalisert til 0–100 og klemt.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<CombinedComponents>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerformanceScore {
    pub scores: BTreeMap<TestType, TypeScore>,
    pub overall_score: Option<f64>,
    pub grade: Option<Grade>,
}

// ──────────────────────────────────────────────────────────────────────────────
// Sammenligning over tid
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChannelValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_value: Option<f64>,
}

impl ChannelValues {
    pub fn is_empty(&self) -> bool {
        self.angle_value.is_none() && self.force_value.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionComparison {
    pub session_id: String,
    pub date: NaiveDate,
    pub first_timestamp: DateTime<Utc>,
    pub duration_minutes: f64,
    pub values: BTreeMap<TestType, ChannelValues>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub user_id: String,
    pub analysis_period_days: u32,
    pub total_sessions: usize,
    pub session_statistics: Vec<SessionComparison>,
    /// Første økt minus siste økt, per type som begge rapporterer.
    pub improvements: BTreeMap<TestType, ChannelValues>,
}

// ──────────────────────────────────────────────────────────────────────────────
// Samlet analyse
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSummary {
    pub total_records: usize,
    pub test_types: Vec<TestType>,
    pub time_range: TimeRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveAnalysis {
    pub session_id: String,
    pub data_summary: DataSummary,
    pub statistical_analysis: Outcome<StatisticalAnalysis>,
    pub trend_analysis: Outcome<TrendAnalysis>,
    pub clustering_analysis: Outcome<ClusteringAnalysis>,
    pub performance_score: Outcome<PerformanceScore>,
    pub analysis_timestamp: DateTime<Utc>,
}

impl ComprehensiveAnalysis {
    pub fn overall_score(&self) -> Option<f64> {
        self.performance_score.ready().and_then(|p| p.overall_score)
    }

    pub fn grade(&self) -> Option<Grade> {
        self.performance_score.ready().and_then(|p| p.grade)
    }
}

/// Toppnivå: full analyse, eller markør når økten ikke har data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisReport {
    Complete(Box<ComprehensiveAnalysis>),
    Empty {
        session_id: String,
        #[serde(flatten)]
        marker: Insufficient,
    },
}

impl AnalysisReport {
    pub fn complete(&self) -> Option<&ComprehensiveAnalysis> {
        match self {
            AnalysisReport::Complete(a) => Some(a),
            AnalysisReport::Empty { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Comprehensive,
    Statistical,
    Trend,
    Clustering,
    Comparison,
}

impl AnalysisKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisKind::Comprehensive => "comprehensive",
            AnalysisKind::Statistical => "statistical",
            AnalysisKind::Trend => "trend",
            AnalysisKind::Clustering => "clustering",
            AnalysisKind::Comparison => "comparison",
        }
    }
}

/// Persistert revisjonsrad (append-only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub session_id: String,
    pub analysis_type: AnalysisKind,
    pub results: serde_json::Value,
    pub overall_score: Option<f64>,
    pub grade: Option<Grade>,
    pub created_at: DateTime<Utc>,
}
