use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use rehabtech_core::models::{Sample, TestType};
use rehabtech_core::stats::summarize;
use rehabtech_core::types::{Insufficient, Outcome};

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 5, 16, 0, 0).unwrap()
}

#[test]
fn empty_input_is_marker_not_error() {
    assert_eq!(summarize(&[]), Outcome::Missing(Insufficient::EmptyInput));
}

#[test]
fn only_present_types_and_channels_are_reported() {
    let mut partial = Sample::combined(t0() + Duration::seconds(2), 30.0, 0.0);
    partial.angle_value = None;
    let samples = vec![
        Sample::force(t0(), 20.0),
        Sample::force(t0() + Duration::seconds(1), 40.0),
        partial,
    ];

    let stats = summarize(&samples);
    let stats = stats.ready().expect("statistikk");
    assert_eq!(stats.len(), 2);
    assert!(!stats.contains_key(&TestType::Angle));

    let force = stats[&TestType::Force].force.as_ref().unwrap();
    assert_eq!(force.count, 2);
    assert_eq!(force.mean, 30.0);
    assert_eq!(force.median, 30.0);
    assert!(stats[&TestType::Force].angle.is_none());

    // kombinert type uten vinkelverdier: vinkelkanalen utelates
    let combined = &stats[&TestType::ForceAndAngle];
    assert_eq!(combined.force.as_ref().unwrap().std, 0.0);
    assert!(combined.angle.is_none());
}

proptest! {
    #[test]
    fn mean_within_min_max_and_count_matches(values in prop::collection::vec(prop::option::of(-500.0f64..500.0), 1..60)) {
        let samples: Vec<Sample> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut s = Sample::force(t0() + Duration::seconds(i as i64), 0.0);
                s.force_value = *v;
                s
            })
            .collect();

        let non_null = values.iter().filter(|v| v.is_some()).count();
        let out = summarize(&samples);
        let stats = out.ready().unwrap();
        match stats[&TestType::Force].force.as_ref() {
            Some(f) => {
                prop_assert_eq!(f.count, non_null);
                prop_assert!(f.mean >= f.min - 1e-9 && f.mean <= f.max + 1e-9);
                prop_assert!(f.median >= f.min && f.median <= f.max);
                prop_assert!(f.std >= 0.0);
            }
            None => prop_assert_eq!(non_null, 0),
        }
    }
}
