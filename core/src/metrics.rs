use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Prosessvide tellere for analyse, persistens og innsamling.
pub struct Metrics {
    pub registry: Registry,
    pub analyses_total: IntCounterVec,
    pub analysis_persist_failures_total: IntCounter,
    pub samples_collected_total: IntCounter,
    pub collector_errors_total: IntCounter,
    pub simulated_fallbacks_total: IntCounter,
    pub advisor_fallbacks_total: IntCounter,
    pub recommendation_persist_failures_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("rehabtech".into()), None)?;

        let analyses_total = IntCounterVec::new(
            Opts::new("analyses_total", "Comprehensive analyses by outcome"),
            &["outcome"],
        )?;
        let analysis_persist_failures_total = IntCounter::new(
            "analysis_persist_failures_total",
            "Analysis results that could not be persisted",
        )?;
        let samples_collected_total =
            IntCounter::new("samples_collected_total", "Samples appended by collectors")?;
        let collector_errors_total =
            IntCounter::new("collector_errors_total", "Device read or append errors in collectors")?;
        let simulated_fallbacks_total = IntCounter::new(
            "simulated_fallbacks_total",
            "Device errors replaced by simulated readings",
        )?;
        let advisor_fallbacks_total = IntCounter::new(
            "advisor_fallbacks_total",
            "Recommendations served by the template fallback",
        )?;
        let recommendation_persist_failures_total = IntCounter::new(
            "recommendation_persist_failures_total",
            "Recommendations that could not be persisted",
        )?;

        registry.register(Box::new(analyses_total.clone()))?;
        registry.register(Box::new(analysis_persist_failures_total.clone()))?;
        registry.register(Box::new(samples_collected_total.clone()))?;
        registry.register(Box::new(collector_errors_total.clone()))?;
        registry.register(Box::new(simulated_fallbacks_total.clone()))?;
        registry.register(Box::new(advisor_fallbacks_total.clone()))?;
        registry.register(Box::new(recommendation_persist_failures_total.clone()))?;

        Ok(Self {
            registry,
            analyses_total,
            analysis_persist_failures_total,
            samples_collected_total,
            collector_errors_total,
            simulated_fallbacks_total,
            advisor_fallbacks_total,
            recommendation_persist_failures_total,
        })
    }

    /// Prometheus tekstformat.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            log::warn!("kunne ikke kode metrics: {e}");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

static GLOBAL: Lazy<Option<Metrics>> = Lazy::new(|| match Metrics::new() {
    Ok(m) => Some(m),
    Err(e) => {
        log::error!("metrics-registeret kunne ikke opprettes: {e}");
        None
    }
});

/// Globale tellere; None bare hvis registreringen feilet ved oppstart.
pub fn global() -> Option<&'static Metrics> {
    GLOBAL.as_ref()
}

pub(crate) fn inc_analysis(outcome: &str) {
    if let Some(m) = global() {
        m.analyses_total.with_label_values(&[outcome]).inc();
    }
}

pub(crate) fn inc_persist_failure() {
    if let Some(m) = global() {
        m.analysis_persist_failures_total.inc();
    }
}

pub(crate) fn inc_sample_collected() {
    if let Some(m) = global() {
        m.samples_collected_total.inc();
    }
}

pub(crate) fn inc_collector_error() {
    if let Some(m) = global() {
        m.collector_errors_total.inc();
    }
}

pub(crate) fn inc_simulated_fallback() {
    if let Some(m) = global() {
        m.simulated_fallbacks_total.inc();
    }
}

pub(crate) fn inc_advisor_fallback() {
    if let Some(m) = global() {
        m.advisor_fallbacks_total.inc();
    }
}

pub(crate) fn inc_recommendation_persist_failure() {
    if let Some(m) = global() {
        m.recommendation_persist_failures_total.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_contains_prefixed_counters() {
        let m = Metrics::new().unwrap();
        m.analyses_total.with_label_values(&["complete"]).inc();
        m.samples_collected_total.inc();
        let text = m.render();
        assert!(text.contains("rehabtech_analyses_total"));
        assert!(text.contains("rehabtech_samples_collected_total 1"));
    }
}
