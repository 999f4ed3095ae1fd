use chrono::{Duration, TimeZone, Utc};

use rehabtech_core::config::AnalysisConfig;
use rehabtech_core::models::{Sample, SampleRow, TestType};
use rehabtech_core::trend::{analyze_session_trends, analyze_trends};

fn force_series(n: usize) -> Vec<Sample> {
    let t0 = Utc.with_ymd_and_hms(2025, 7, 5, 10, 0, 0).unwrap();
    (0..n)
        .map(|i| Sample::force(t0 + Duration::seconds(i as i64), 20.0 + i as f64))
        .collect()
}

#[test]
fn overall_block_absent_at_ten_rows_present_at_eleven() {
    let cfg = AnalysisConfig::default();

    let ten = analyze_session_trends("s1", &force_series(10), &cfg);
    let ten = ten.ready().unwrap();
    assert!(ten[&TestType::Force].overall_trends.is_none());
    assert_eq!(ten[&TestType::Force].session_trends.len(), 1);

    let eleven = analyze_session_trends("s1", &force_series(11), &cfg);
    let eleven = eleven.ready().unwrap();
    let overall = eleven[&TestType::Force].overall_trends.as_ref().expect("overall");
    // 11 rader: første halvdel 20..=24 (snitt 22), andre 25..=30 (snitt 27.5)
    let imp = overall.force_improvement.as_ref().unwrap();
    assert!((imp.change - 5.5).abs() < 1e-9, "change {}", imp.change);
    assert!(overall.angle_improvement.is_none());
}

#[test]
fn rows_are_sorted_before_splitting() {
    let cfg = AnalysisConfig::default();
    let mut samples = force_series(12);
    samples.reverse();
    let out = analyze_session_trends("s1", &samples, &cfg);
    let imp = out.ready().unwrap()[&TestType::Force]
        .overall_trends
        .as_ref()
        .unwrap()
        .force_improvement
        .clone()
        .unwrap();
    assert!(imp.change > 0.0);
}

#[test]
fn session_trends_follow_first_appearance() {
    let cfg = AnalysisConfig::default();
    let t0 = Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap();
    let rows = vec![
        SampleRow::new("b", Sample::angle(t0 + Duration::days(1), 40.0)),
        SampleRow::new("a", Sample::angle(t0, 30.0)),
        SampleRow::new("a", Sample::angle(t0 + Duration::minutes(3), 50.0)),
    ];
    let out = analyze_trends(&rows, &cfg);
    let trends = &out.ready().unwrap()[&TestType::Angle].session_trends;
    assert_eq!(trends[0].session_id, "a");
    assert_eq!(trends[1].session_id, "b");
    assert_eq!(trends[0].avg_angle, Some(40.0));
    assert_eq!(trends[0].max_angle, Some(50.0));
    assert!((trends[0].duration_minutes - 3.0).abs() < 1e-9);
    assert!(trends[0].avg_force.is_none());
}
