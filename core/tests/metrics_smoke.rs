use std::sync::Arc;

use chrono::Utc;

use rehabtech_core::analyzer::Analyzer;
use rehabtech_core::config::AnalysisConfig;
use rehabtech_core::metrics;
use rehabtech_core::models::{Sample, TestType};
use rehabtech_core::session::SessionManager;
use rehabtech_core::store::{InMemorySampleStore, InMemorySessionRegistry, SampleStore};

#[test]
fn analysis_outcomes_are_counted() {
    let m = metrics::global().expect("metrics-registeret");
    let before = m.analyses_total.with_label_values(&["not_found"]).get();

    let registry = Arc::new(InMemorySessionRegistry::new());
    let store = Arc::new(InMemorySampleStore::new());
    let manager = SessionManager::new(registry.clone(), store.clone());
    let id = manager.open_session("u1", &[TestType::Force]).unwrap();
    store.append_sample(&id, Sample::force(Utc::now(), 12.0)).unwrap();

    let analyzer = Analyzer::new(AnalysisConfig::default(), registry, store);
    assert!(analyzer.comprehensive_analysis(&id).is_ok());
    assert!(analyzer.comprehensive_analysis("ukjent").is_err());

    assert!(m.analyses_total.with_label_values(&["not_found"]).get() > before);
    assert!(m.analyses_total.with_label_values(&["complete"]).get() >= 1);

    let text = m.render();
    assert!(text.contains("rehabtech_analyses_total"));
    assert!(text.contains("outcome=\"complete\""));
}
