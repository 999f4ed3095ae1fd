use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cluster::cluster_by_type;
use crate::comparison::{compare_sessions, within_window};
use crate::config::AnalysisConfig;
use crate::error::{CoreError, StoreError};
use crate::metrics;
use crate::models::{Sample, TestType};
use crate::score::performance_score;
use crate::stats::summarize;
use crate::storage::AnalysisSink;
use crate::store::{user_rows, SampleStore, SessionRegistry};
use crate::trend::analyze_session_trends;
use crate::types::{
    AnalysisKind, AnalysisRecord, AnalysisReport, ClusteringAnalysis, ComparisonReport,
    ComprehensiveAnalysis, DataSummary, Insufficient, Outcome, PerformanceScore,
    StatisticalAnalysis, TimeRange, TrendAnalysis,
};

fn data_summary(sorted: &[Sample]) -> Option<DataSummary> {
    let start = sorted.first()?.timestamp;
    let end = sorted.last()?.timestamp;

    // rekkefølge = første forekomst i tid
    let mut test_types: Vec<TestType> = Vec::new();
    for s in sorted {
        if !test_types.contains(&s.test_type) {
            test_types.push(s.test_type);
        }
    }

    Some(DataSummary {
        total_records: sorted.len(),
        test_types,
        time_range: TimeRange {
            start,
            end,
            duration_minutes: (end - start).num_milliseconds() as f64 / 60_000.0,
        },
    })
}

/// Ren analyse av et sample-sett: ingen I/O, ingen persistens.
/// Tom økt gir markør på toppnivå, aldri delvise tallseksjoner.
pub fn analyze_samples(
    session_id: &str,
    samples: &[Sample],
    cfg: &AnalysisConfig,
    now: DateTime<Utc>,
) -> AnalysisReport {
    let mut sorted = samples.to_vec();
    sorted.sort_by_key(|s| s.timestamp);

    let Some(data_summary) = data_summary(&sorted) else {
        return AnalysisReport::Empty {
            session_id: session_id.to_string(),
            marker: Insufficient::EmptyInput,
        };
    };

    // 1️⃣ Statistikk  2️⃣ Trend  3️⃣ Klynger  4️⃣ Score – søsken kjører uavhengig av hverandres markører
    AnalysisReport::Complete(Box::new(ComprehensiveAnalysis {
        session_id: session_id.to_string(),
        data_summary,
        statistical_analysis: summarize(&sorted),
        trend_analysis: analyze_session_trends(session_id, &sorted, cfg),
        clustering_analysis: cluster_by_type(&sorted, cfg),
        performance_score: performance_score(&sorted, cfg),
        analysis_timestamp: now,
    }))
}

/// Bygger revisjonsraden. Feiler serialiseringen, skrives ingenting.
pub fn analysis_record(
    analysis: &ComprehensiveAnalysis,
    created_at: DateTime<Utc>,
) -> Result<AnalysisRecord, StoreError> {
    Ok(AnalysisRecord {
        session_id: analysis.session_id.clone(),
        analysis_type: AnalysisKind::Comprehensive,
        results: serde_json::to_value(analysis)?,
        overall_score: analysis.overall_score(),
        grade: analysis.grade(),
        created_at,
    })
}

/// Best-effort lagring av en ferdig analyse. Feil logges og telles, aldri propageres.
pub fn persist_analysis(sink: &dyn AnalysisSink, analysis: &ComprehensiveAnalysis) -> bool {
    match analysis_record(analysis, Utc::now()).and_then(|r| sink.save_analysis(&r)) {
        Ok(()) => true,
        Err(e) => {
            metrics::inc_persist_failure();
            log::error!("kunne ikke lagre analyse for {}: {e}", analysis.session_id);
            false
        }
    }
}

/// Analysetjenesten: leser fra lageret, kjører pipelinen og persisterer best-effort.
pub struct Analyzer {
    cfg: AnalysisConfig,
    registry: Arc<dyn SessionRegistry>,
    store: Arc<dyn SampleStore>,
    sink: Option<Arc<dyn AnalysisSink>>,
}

impl Analyzer {
    pub fn new(
        cfg: AnalysisConfig,
        registry: Arc<dyn SessionRegistry>,
        store: Arc<dyn SampleStore>,
    ) -> Self {
        Self { cfg, registry, store, sink: None }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AnalysisSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.cfg
    }

    fn load(&self, session_id: &str) -> Result<Vec<Sample>, CoreError> {
        if !self.registry.session_exists(session_id) {
            metrics::inc_analysis("not_found");
            return Err(StoreError::SessionNotFound(session_id.to_string()).into());
        }
        if let Some(session) = self.registry.get_session(session_id) {
            if session.is_active() {
                log::warn!("analyserer {session_id} mens økten fortsatt er aktiv");
            }
        }
        Ok(self.store.read_samples(session_id)?)
    }

    /// Full analyse av en økt. Eneste feil ut er ukjent økt (eller ødelagt lager);
    /// alt annet kommer som markører i rapporten.
    pub fn comprehensive_analysis(&self, session_id: &str) -> Result<AnalysisReport, CoreError> {
        let samples = self.load(session_id)?;
        let report = analyze_samples(session_id, &samples, &self.cfg, Utc::now());

        match &report {
            AnalysisReport::Complete(analysis) => {
                metrics::inc_analysis("complete");
                log::info!(
                    "analyse {}: {} rader, score={:?}, grade={:?}",
                    session_id,
                    analysis.data_summary.total_records,
                    analysis.overall_score(),
                    analysis.grade()
                );
                self.persist(analysis);
            }
            AnalysisReport::Empty { .. } => {
                metrics::inc_analysis("empty");
                log::info!("analyse {session_id}: ingen samples");
            }
        }
        Ok(report)
    }

    /// Persistensfeil logges og telles, men resultatet går uendret tilbake til kalleren.
    fn persist(&self, analysis: &ComprehensiveAnalysis) {
        if let Some(sink) = &self.sink {
            persist_analysis(sink.as_ref(), analysis);
        }
    }

    pub fn statistical_analysis(
        &self,
        session_id: &str,
    ) -> Result<Outcome<StatisticalAnalysis>, CoreError> {
        Ok(summarize(&self.load(session_id)?))
    }

    pub fn trend_analysis(&self, session_id: &str) -> Result<Outcome<TrendAnalysis>, CoreError> {
        let samples = self.load(session_id)?;
        Ok(analyze_session_trends(session_id, &samples, &self.cfg))
    }

    pub fn clustering_analysis(
        &self,
        session_id: &str,
    ) -> Result<Outcome<ClusteringAnalysis>, CoreError> {
        Ok(cluster_by_type(&self.load(session_id)?, &self.cfg))
    }

    pub fn performance_score(
        &self,
        session_id: &str,
    ) -> Result<Outcome<PerformanceScore>, CoreError> {
        Ok(performance_score(&self.load(session_id)?, &self.cfg))
    }

    /// Historisk sammenligning for brukerens økter innenfor de siste `days` dagene.
    pub fn comparison_for_user(
        &self,
        user_id: &str,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Outcome<ComparisonReport>, CoreError> {
        let rows = user_rows(self.registry.as_ref(), self.store.as_ref(), user_id)?;
        let rows = within_window(rows, days, now);
        let report = compare_sessions(user_id, days, &rows);
        if let Outcome::Missing(m) = &report {
            log::info!("sammenligning for {user_id} ({days} dager): {m:?}");
        }
        Ok(report)
    }
}
