use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use rehabtech_core::analyzer::{analyze_samples, persist_analysis, Analyzer};
use rehabtech_core::config::AnalysisConfig;
use rehabtech_core::error::{CoreError, StoreError};
use rehabtech_core::metrics;
use rehabtech_core::models::{Sample, TestType};
use rehabtech_core::session::SessionManager;
use rehabtech_core::storage::{AnalysisSink, InMemoryAnalysisStore, JsonlAnalysisStore};
use rehabtech_core::store::{InMemorySampleStore, InMemorySessionRegistry, SampleStore};
use rehabtech_core::types::{AnalysisKind, AnalysisRecord, AnalysisReport, Grade, Insufficient};

struct FailingSink;

impl AnalysisSink for FailingSink {
    fn save_analysis(&self, _record: &AnalysisRecord) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
    }
}

fn linear_force(n: usize) -> Vec<Sample> {
    let t0 = Utc.with_ymd_and_hms(2025, 7, 5, 10, 0, 0).unwrap();
    (0..n)
        .map(|i| Sample::force(t0 + Duration::seconds(i as i64 * 3), 20.0 + i as f64 * 40.0 / 19.0))
        .collect()
}

fn setup() -> (SessionManager, Arc<InMemorySessionRegistry>, Arc<InMemorySampleStore>) {
    let registry = Arc::new(InMemorySessionRegistry::new());
    let store = Arc::new(InMemorySampleStore::new());
    let manager = SessionManager::new(registry.clone(), store.clone());
    (manager, registry, store)
}

#[test]
fn twenty_force_samples_end_to_end() {
    let report = analyze_samples("s20", &linear_force(20), &AnalysisConfig::default(), Utc::now());
    let a = report.complete().expect("full analyse");

    assert_eq!(a.data_summary.total_records, 20);
    assert_eq!(a.data_summary.test_types, vec![TestType::Force]);
    assert!((a.data_summary.time_range.duration_minutes - 57.0 / 60.0).abs() < 1e-9);

    let stats = a.statistical_analysis.ready().unwrap();
    let force = stats[&TestType::Force].force.as_ref().unwrap();
    assert_eq!(force.min, 20.0);
    assert_eq!(force.max, 60.0);
    assert_eq!(force.count, 20);

    let trend = a.trend_analysis.ready().unwrap();
    let imp = trend[&TestType::Force]
        .overall_trends
        .as_ref()
        .and_then(|o| o.force_improvement.as_ref())
        .expect("force_improvement");
    assert!(imp.change > 0.0);
    // andre halvdel − første halvdel = 10 · 40/19 ≈ 21
    assert!((imp.change - 400.0 / 19.0).abs() < 1e-9);

    let clusters = a.clustering_analysis.ready().unwrap();
    let c = clusters[&TestType::Force].ready().expect("20 ≥ 16 punkter");
    assert!(c.n_clusters >= 1 && c.n_clusters <= 5);
    assert!((-1.0..=1.0).contains(&c.validity_score));

    let score = a.performance_score.ready().unwrap();
    assert!((score.scores[&TestType::Force].raw - 0.8).abs() < 1e-9);
    assert_eq!(a.grade(), Some(Grade::B));
}

#[test]
fn result_contains_exactly_the_types_present() {
    let t0 = Utc.with_ymd_and_hms(2025, 7, 5, 10, 0, 0).unwrap();
    let samples = vec![Sample::angle(t0, 40.0), Sample::combined(t0 + Duration::seconds(1), 15.0, 70.0)];
    let report = analyze_samples("mix", &samples, &AnalysisConfig::default(), Utc::now());
    let a = report.complete().unwrap();

    let expected = [TestType::Angle, TestType::ForceAndAngle];
    let stat_keys: Vec<TestType> = a.statistical_analysis.ready().unwrap().keys().copied().collect();
    let trend_keys: Vec<TestType> = a.trend_analysis.ready().unwrap().keys().copied().collect();
    let score_keys: Vec<TestType> = a.performance_score.ready().unwrap().scores.keys().copied().collect();
    assert_eq!(stat_keys, expected);
    assert_eq!(trend_keys, expected);
    assert_eq!(score_keys, expected);
}

#[test]
fn empty_session_gives_top_level_marker() {
    let (manager, registry, store) = setup();
    let id = manager.open_session("u1", &[TestType::Force]).unwrap();
    let sink = Arc::new(InMemoryAnalysisStore::new());
    let analyzer = Analyzer::new(AnalysisConfig::default(), registry, store).with_sink(sink.clone());

    let report = analyzer.comprehensive_analysis(&id).unwrap();
    match &report {
        AnalysisReport::Empty { session_id, marker } => {
            assert_eq!(session_id, &id);
            assert_eq!(marker, &Insufficient::EmptyInput);
        }
        other => panic!("forventet markør, fikk {other:?}"),
    }

    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(v["error"], "empty_input");
    assert!(v.get("statistical_analysis").is_none());
    assert!(sink.records().is_empty());
}

#[test]
fn unknown_session_is_the_only_error() {
    let (_manager, registry, store) = setup();
    let analyzer = Analyzer::new(AnalysisConfig::default(), registry, store);
    match analyzer.comprehensive_analysis("finnes_ikke") {
        Err(CoreError::Store(StoreError::SessionNotFound(id))) => assert_eq!(id, "finnes_ikke"),
        other => panic!("forventet SessionNotFound, fikk {other:?}"),
    }
}

#[test]
fn persisted_record_matches_returned_result() {
    let (manager, registry, store) = setup();
    let id = manager.open_session("u1", &[TestType::Force]).unwrap();
    for s in linear_force(20) {
        store.append_sample(&id, s).unwrap();
    }
    manager.stop_session(&id, None).unwrap();

    let sink = Arc::new(InMemoryAnalysisStore::new());
    let analyzer = Analyzer::new(AnalysisConfig::default(), registry, store).with_sink(sink.clone());
    let report = analyzer.comprehensive_analysis(&id).unwrap();
    let a = report.complete().unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].session_id, id);
    assert_eq!(records[0].analysis_type, AnalysisKind::Comprehensive);
    assert_eq!(records[0].grade, a.grade());
    assert_eq!(records[0].results, serde_json::to_value(a).unwrap());
}

#[test]
fn persistence_failure_still_returns_result() {
    let (manager, registry, store) = setup();
    let id = manager.open_session("u1", &[TestType::Force]).unwrap();
    for s in linear_force(12) {
        store.append_sample(&id, s).unwrap();
    }

    let analyzer = Analyzer::new(AnalysisConfig::default(), registry, store).with_sink(Arc::new(FailingSink));
    let report = analyzer.comprehensive_analysis(&id).expect("persistensfeil skal svelges");
    assert_eq!(report.complete().unwrap().data_summary.total_records, 12);
}

#[test]
fn standalone_persist_counts_failures_like_the_analyzer() {
    let m = metrics::global().expect("metrics-registeret");
    let report = analyze_samples("cli", &linear_force(12), &AnalysisConfig::default(), Utc::now());
    let analysis = report.complete().unwrap();

    let before = m.analysis_persist_failures_total.get();
    assert!(!persist_analysis(&FailingSink, analysis));
    assert!(m.analysis_persist_failures_total.get() > before);

    let dir = tempfile::tempdir().unwrap();
    let store = JsonlAnalysisStore::new(dir.path().join("analyses.jsonl"));
    assert!(persist_analysis(&store, analysis));
    assert_eq!(store.load_records("cli").unwrap().len(), 1);
}

#[test]
fn comparison_for_user_uses_window() {
    let (manager, registry, store) = setup();
    let now = Utc::now();

    let old = manager.open_session("u1", &[TestType::Force]).unwrap();
    store.append_sample(&old, Sample::force(now - Duration::days(60), 10.0)).unwrap();
    let first = manager.open_session("u1", &[TestType::Force]).unwrap();
    store.append_sample(&first, Sample::force(now - Duration::days(10), 30.0)).unwrap();
    let last = manager.open_session("u1", &[TestType::Force]).unwrap();
    store.append_sample(&last, Sample::force(now - Duration::days(1), 45.0)).unwrap();
    let other = manager.open_session("u2", &[TestType::Force]).unwrap();
    store.append_sample(&other, Sample::force(now - Duration::days(2), 99.0)).unwrap();

    let analyzer = Analyzer::new(AnalysisConfig::default(), registry, store);
    let out = analyzer.comparison_for_user("u1", 30, now).unwrap();
    let report = out.ready().expect("to økter i vinduet");
    assert_eq!(report.total_sessions, 2);
    assert_eq!(report.improvements[&TestType::Force].force_value, Some(30.0 - 45.0));

    let narrow = analyzer.comparison_for_user("u1", 5, now).unwrap();
    assert!(!narrow.is_ready());
}
