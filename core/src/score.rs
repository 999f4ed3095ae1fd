use std::collections::BTreeMap;

use crate::config::AnalysisConfig;
use crate::models::{Sample, TestType};
use crate::stats::{angle_values, force_values, group_by_type, mean, min_max};
use crate::types::{CombinedComponents, Grade, Insufficient, Outcome, PerformanceScore, TypeScore};

#[inline]
fn clamp_score(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Bevegelsesutslag relativt til 90°-referansen (prosent).
pub fn score_angle(samples: &[&Sample], cfg: &AnalysisConfig) -> Option<TypeScore> {
    let (min, max) = min_max(&angle_values(samples.iter().copied()))?;
    let raw = (max - min) / cfg.angle_reference_deg * 100.0;
    Some(TypeScore { raw, score: clamp_score(raw), components: None })
}

/// (300 − maks kraft) / 300 – brøk, skaleres ×100 for karakteren.
pub fn score_force(samples: &[&Sample], cfg: &AnalysisConfig) -> Option<TypeScore> {
    let raw = force_fraction(samples, cfg)?;
    Some(TypeScore { raw, score: clamp_score(raw * 100.0), components: None })
}

fn force_fraction(samples: &[&Sample], cfg: &AnalysisConfig) -> Option<f64> {
    let (_, max) = min_max(&force_values(samples.iter().copied()))?;
    Some((cfg.force_reference_n - max) / cfg.force_reference_n)
}

/// Kombinert test: vinkel relativt til baseline (første vinkel med kraft over terskel)
/// og kraftscore, snitt av de to. Ingen baseline eller maks == min gir vinkelkomponent 0.
pub fn score_combined(samples: &[&Sample], cfg: &AnalysisConfig) -> Option<TypeScore> {
    let angle_range = min_max(&angle_values(samples.iter().copied()));
    let force_raw = force_fraction(samples, cfg);
    if angle_range.is_none() && force_raw.is_none() {
        return None;
    }

    let baseline_angle = samples
        .iter()
        .filter(|s| s.force_value.is_some_and(|f| f > cfg.baseline_force_threshold_n))
        .filter(|s| s.angle_value.is_some())
        .min_by_key(|s| s.timestamp)
        .and_then(|s| s.angle_value);

    let angle_component = match (angle_range, baseline_angle) {
        (Some((min, max)), Some(base)) if max > min => (max - base) / (max - min) * 100.0,
        _ => 0.0,
    };
    let force_component = force_raw.map(|r| clamp_score(r * 100.0)).unwrap_or(0.0);

    if baseline_angle.is_none() {
        log::debug!("ingen sample med kraft > {} N – vinkelkomponent faller tilbake til 0", cfg.baseline_force_threshold_n);
    }

    Some(TypeScore {
        raw: (angle_component + force_raw.unwrap_or(0.0)) / 2.0,
        score: (clamp_score(angle_component) + force_component) / 2.0,
        components: Some(CombinedComponents {
            angle_component,
            force_component,
            baseline_angle,
        }),
    })
}

/// Score per testtype og samlet karakter. Typer uten brukbare kanaler hoppes over.
pub fn performance_score(samples: &[Sample], cfg: &AnalysisConfig) -> Outcome<PerformanceScore> {
    if samples.is_empty() {
        return Outcome::Missing(Insufficient::EmptyInput);
    }

    let mut scores = BTreeMap::new();
    for (test_type, group) in group_by_type(samples) {
        let scored = match test_type {
            TestType::Angle => score_angle(&group, cfg),
            TestType::Force => score_force(&group, cfg),
            TestType::ForceAndAngle => score_combined(&group, cfg),
        };
        match scored {
            Some(s) => {
                scores.insert(test_type, s);
            }
            None => log::debug!("score hoppet over for {test_type}: ingen kanalverdier"),
        }
    }

    let normalized: Vec<f64> = scores.values().map(|s: &TypeScore| s.score).collect();
    let overall_score = mean(&normalized);

    Outcome::Ready(PerformanceScore {
        scores,
        overall_score,
        grade: overall_score.map(Grade::from_score),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn grade_boundaries() {
        assert_eq!(Grade::from_score(90.0), Grade::A);
        assert_eq!(Grade::from_score(89.99), Grade::B);
        assert_eq!(Grade::from_score(70.0), Grade::C);
        assert_eq!(Grade::from_score(12.0), Grade::D);
    }

    #[test]
    fn combined_baseline_uses_earliest_qualifying_sample() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let samples = vec![
            Sample::combined(t0 + Duration::seconds(2), 30.0, 60.0),
            Sample::combined(t0, 5.0, 20.0), // under terskel
            Sample::combined(t0 + Duration::seconds(1), 15.0, 40.0),
        ];
        let refs: Vec<&Sample> = samples.iter().collect();
        let s = score_combined(&refs, &AnalysisConfig::default()).unwrap();
        let c = s.components.unwrap();
        assert_eq!(c.baseline_angle, Some(40.0));
        // (60 - 40) / (60 - 20) * 100 = 50
        assert!((c.angle_component - 50.0).abs() < 1e-9);
        assert!((c.force_component - 90.0).abs() < 1e-9);
        assert!((s.score - 70.0).abs() < 1e-9);
    }

    #[test]
    fn force_score_clamps_above_reference() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let samples = vec![Sample::force(t0, 450.0)];
        let refs: Vec<&Sample> = samples.iter().collect();
        let s = score_force(&refs, &AnalysisConfig::default()).unwrap();
        assert!((s.raw + 0.5).abs() < 1e-9);
        assert_eq!(s.score, 0.0);
    }
}
