use std::collections::BTreeMap;

use crate::config::AnalysisConfig;
use crate::models::{Sample, SampleRow, TestType};
use crate::stats::{angle_values, force_values, mean, min_max};
use crate::types::{
    Improvement, Insufficient, Outcome, OverallTrends, SessionTrend, TrendAnalysis, TypeTrend,
};

/// Trend for én økt (alle rader tilhører samme session_id).
pub fn analyze_session_trends(
    session_id: &str,
    samples: &[Sample],
    cfg: &AnalysisConfig,
) -> Outcome<TrendAnalysis> {
    let rows: Vec<SampleRow> = samples
        .iter()
        .cloned()
        .map(|s| SampleRow::new(session_id, s))
        .collect();
    analyze_trends(&rows, cfg)
}

/// Trend per testtype over (potensielt) flere økter.
pub fn analyze_trends(rows: &[SampleRow], cfg: &AnalysisConfig) -> Outcome<TrendAnalysis> {
    if rows.is_empty() {
        return Outcome::Missing(Insufficient::EmptyInput);
    }

    let mut by_type: BTreeMap<TestType, Vec<&SampleRow>> = BTreeMap::new();
    for r in rows {
        by_type.entry(r.sample.test_type).or_default().push(r);
    }

    let trends = by_type
        .into_iter()
        .map(|(test_type, mut typed)| {
            // sorter defensivt – stol ikke på innsettingsrekkefølgen
            typed.sort_by_key(|r| r.sample.timestamp);
            (test_type, type_trend(test_type, &typed, cfg))
        })
        .collect();

    Outcome::Ready(trends)
}

fn type_trend(test_type: TestType, sorted: &[&SampleRow], cfg: &AnalysisConfig) -> TypeTrend {
    let overall_trends = if sorted.len() > cfg.trend_min_rows {
        Some(overall_trend(test_type, sorted))
    } else {
        None
    };

    TypeTrend {
        session_trends: session_trends(test_type, sorted),
        overall_trends,
    }
}

fn session_trends(test_type: TestType, sorted: &[&SampleRow]) -> Vec<SessionTrend> {
    // behold rekkefølgen økter først dukker opp i (tidsordnet)
    let mut order: Vec<&str> = Vec::new();
    let mut grouped: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
    for r in sorted {
        let id = r.session_id.as_str();
        if !grouped.contains_key(id) {
            order.push(id);
        }
        grouped.entry(id).or_default().push(&r.sample);
    }

    order
        .into_iter()
        .filter_map(|id| {
            let samples = grouped.get(id)?;
            let first = samples.first()?.timestamp;
            let last = samples.last()?.timestamp;

            let mut trend = SessionTrend {
                session_id: id.to_string(),
                timestamp: first,
                duration_minutes: (last - first).num_milliseconds() as f64 / 60_000.0,
                avg_force: None,
                max_force: None,
                avg_angle: None,
                max_angle: None,
            };
            if test_type.uses_force() {
                let f = force_values(samples.iter().copied());
                trend.avg_force = mean(&f);
                trend.max_force = min_max(&f).map(|(_, max)| max);
            }
            if test_type.uses_angle() {
                let a = angle_values(samples.iter().copied());
                trend.avg_angle = mean(&a);
                trend.max_angle = min_max(&a).map(|(_, max)| max);
            }
            Some(trend)
        })
        .collect()
}

/// Del i to like deler ved midtpunktet og sammenlign snittene per kanal.
fn overall_trend(test_type: TestType, sorted: &[&SampleRow]) -> OverallTrends {
    let mid = sorted.len() / 2;
    let (a, b) = sorted.split_at(mid);
    let first: Vec<&Sample> = a.iter().map(|r| &r.sample).collect();
    let second: Vec<&Sample> = b.iter().map(|r| &r.sample).collect();

    let mut out = OverallTrends::default();
    if test_type.uses_force() {
        out.force_improvement = improvement(
            &force_values(first.iter().copied()),
            &force_values(second.iter().copied()),
        );
    }
    if test_type.uses_angle() {
        out.angle_improvement = improvement(
            &angle_values(first.iter().copied()),
            &angle_values(second.iter().copied()),
        );
    }
    out
}

/// change = snitt(andre halvdel) − snitt(første halvdel); prosent 0 når første snitt er 0.
fn improvement(first: &[f64], second: &[f64]) -> Option<Improvement> {
    let m1 = mean(first)?;
    let m2 = mean(second)?;
    let change = m2 - m1;
    let percentage = if m1 == 0.0 { 0.0 } else { change / m1 * 100.0 };
    Some(Improvement { change, percentage })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improvement_zero_baseline_gives_zero_percentage() {
        let imp = improvement(&[0.0, 0.0], &[5.0, 5.0]).unwrap();
        assert_eq!(imp.change, 5.0);
        assert_eq!(imp.percentage, 0.0);
    }

    #[test]
    fn improvement_needs_both_halves() {
        assert!(improvement(&[], &[1.0]).is_none());
    }
}
