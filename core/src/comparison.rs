use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{Sample, SampleRow, TestType};
use crate::stats::{angle_values, force_values, min_max};
use crate::types::{ChannelValues, ComparisonReport, Insufficient, Outcome, SessionComparison};

pub const MIN_SESSIONS: usize = 2;

/// Behold rader innenfor de siste `days` dagene regnet fra `now`.
pub fn within_window(rows: Vec<SampleRow>, days: u32, now: DateTime<Utc>) -> Vec<SampleRow> {
    let since = now - Duration::days(i64::from(days));
    rows.into_iter().filter(|r| r.sample.timestamp >= since).collect()
}

/// Sammendragsverdi per type for én økt:
/// ANGLE = minste vinkel, FORCE = største kraft, kombinert = første vinkel med kraft > 0 og største kraft.
fn session_values(test_type: TestType, sorted: &[&Sample]) -> ChannelValues {
    let max_force = min_max(&force_values(sorted.iter().copied())).map(|(_, max)| max);
    match test_type {
        TestType::Angle => ChannelValues {
            angle_value: min_max(&angle_values(sorted.iter().copied())).map(|(min, _)| min),
            force_value: None,
        },
        TestType::Force => ChannelValues { angle_value: None, force_value: max_force },
        TestType::ForceAndAngle => ChannelValues {
            angle_value: sorted
                .iter()
                .filter(|s| s.force_value.is_some_and(|f| f > 0.0))
                .find_map(|s| s.angle_value),
            force_value: max_force,
        },
    }
}

fn summarize_session(session_id: &str, mut samples: Vec<&Sample>) -> Option<SessionComparison> {
    samples.sort_by_key(|s| s.timestamp);
    let first = samples.first()?.timestamp;
    let last = samples.last()?.timestamp;

    let mut by_type: BTreeMap<TestType, Vec<&Sample>> = BTreeMap::new();
    for s in samples.iter().copied() {
        by_type.entry(s.test_type).or_default().push(s);
    }
    let values = by_type
        .into_iter()
        .map(|(t, group)| (t, session_values(t, &group)))
        .filter(|(_, v)| !v.is_empty())
        .collect();

    Some(SessionComparison {
        session_id: session_id.to_string(),
        date: first.date_naive(),
        first_timestamp: first,
        duration_minutes: (last - first).num_milliseconds() as f64 / 60_000.0,
        values,
    })
}

fn delta(first: Option<f64>, last: Option<f64>) -> Option<f64> {
    Some(first? - last?)
}

/// Historisk sammenligning: første økt minus siste økt per type begge rapporterer.
pub fn compare_sessions(user_id: &str, days: u32, rows: &[SampleRow]) -> Outcome<ComparisonReport> {
    let mut sessions: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
    for r in rows {
        sessions.entry(r.session_id.as_str()).or_default().push(&r.sample);
    }

    if sessions.len() < MIN_SESSIONS {
        return Outcome::Missing(Insufficient::InsufficientHistory {
            required: MIN_SESSIONS,
            found: sessions.len(),
        });
    }

    let total_sessions = sessions.len();
    let mut stats: Vec<SessionComparison> = sessions
        .into_iter()
        .filter_map(|(id, samples)| summarize_session(id, samples))
        .collect();
    stats.sort_by(|a, b| {
        a.first_timestamp
            .cmp(&b.first_timestamp)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });

    let mut improvements = BTreeMap::new();
    if let (Some(first), Some(last)) = (stats.first(), stats.last()) {
        for (test_type, fv) in &first.values {
            let Some(lv) = last.values.get(test_type) else {
                continue;
            };
            let d = ChannelValues {
                angle_value: delta(fv.angle_value, lv.angle_value),
                force_value: delta(fv.force_value, lv.force_value),
            };
            if !d.is_empty() {
                improvements.insert(*test_type, d);
            }
        }
    }

    Outcome::Ready(ComparisonReport {
        user_id: user_id.to_string(),
        analysis_period_days: days,
        total_sessions,
        session_statistics: stats,
        improvements,
    })
}
