use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use crate::models::{Sample, TestType};
use crate::types::{ChannelStats, Insufficient, Outcome, StatisticalAnalysis, TypeStatistics};

// --- RoundTo trait (offentlig, brukt i score og eksport) ---
pub trait RoundTo {
    fn round_to(self, dp: u32) -> f64;
}

impl RoundTo for f64 {
    #[inline]
    fn round_to(self, dp: u32) -> f64 {
        if dp == 0 {
            return self.round();
        }
        let factor = 10_f64.powi(dp as i32);
        (self * factor).round() / factor
    }
}

#[inline]
pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().copied().sum::<f64>() / xs.len() as f64)
    }
}

/// Utvalgs-standardavvik (n-1). Én verdi gir 0.0 i stedet for NaN.
pub fn sample_std(xs: &[f64]) -> Option<f64> {
    let m = mean(xs)?;
    if xs.len() < 2 {
        return Some(0.0);
    }
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    Some(var.sqrt())
}

/// Robust median for sammendragsverdi
pub fn median(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    let mut sorted: Vec<OrderedFloat<f64>> = xs.iter().copied().map(OrderedFloat).collect();
    sorted.sort();
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2].0)
    } else {
        Some((sorted[n / 2 - 1].0 + sorted[n / 2].0) / 2.0)
    }
}

pub fn min_max(xs: &[f64]) -> Option<(f64, f64)> {
    let min = xs.iter().copied().map(OrderedFloat).min()?;
    let max = xs.iter().copied().map(OrderedFloat).max()?;
    Some((min.0, max.0))
}

pub fn channel_stats(xs: &[f64]) -> Option<ChannelStats> {
    let (min, max) = min_max(xs)?;
    Some(ChannelStats {
        mean: mean(xs)?,
        std: sample_std(xs)?,
        min,
        max,
        median: median(xs)?,
        count: xs.len(),
    })
}

pub(crate) fn force_values<'a, I>(samples: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a Sample>,
{
    samples.into_iter().filter_map(|s| s.force_value).collect()
}

pub(crate) fn angle_values<'a, I>(samples: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a Sample>,
{
    samples.into_iter().filter_map(|s| s.angle_value).collect()
}

/// Grupper samples per testtype (stabil rekkefølge innen gruppen).
pub fn group_by_type(samples: &[Sample]) -> BTreeMap<TestType, Vec<&Sample>> {
    let mut groups: BTreeMap<TestType, Vec<&Sample>> = BTreeMap::new();
    for s in samples {
        groups.entry(s.test_type).or_default().push(s);
    }
    groups
}

/// Deskriptiv statistikk per testtype, kun over ikke-null verdier.
/// En kanal som er helt tom for typen utelates.
pub fn summarize(samples: &[Sample]) -> Outcome<StatisticalAnalysis> {
    if samples.is_empty() {
        return Outcome::Missing(Insufficient::EmptyInput);
    }

    let analysis = group_by_type(samples)
        .into_iter()
        .map(|(test_type, group)| {
            let stats = TypeStatistics {
                force: channel_stats(&force_values(group.iter().copied())),
                angle: channel_stats(&angle_values(group.iter().copied())),
            };
            (test_type, stats)
        })
        .collect();

    Outcome::Ready(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn sample_std_matches_n_minus_one() {
        // 2,4,4,4,5,5,7,9 → populasjons-std 2.0, utvalgs-std ≈ 2.138
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let s = sample_std(&xs).unwrap();
        assert!((s - 2.13809).abs() < 1e-4, "got {s}");
        assert_eq!(sample_std(&[5.0]), Some(0.0));
    }

    #[test]
    fn round_to_dp() {
        assert_eq!(1.23456_f64.round_to(2), 1.23);
        assert_eq!(2.5_f64.round_to(0), 3.0);
    }
}
