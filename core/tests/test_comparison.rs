use chrono::{Duration, TimeZone, Utc};

use rehabtech_core::comparison::{compare_sessions, MIN_SESSIONS};
use rehabtech_core::models::{Sample, SampleRow, TestType};
use rehabtech_core::types::{Insufficient, Outcome};

fn day(d: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap() + Duration::days(d)
}

#[test]
fn single_session_is_insufficient_history() {
    let rows = vec![
        SampleRow::new("s1", Sample::force(day(0), 30.0)),
        SampleRow::new("s1", Sample::force(day(0) + Duration::seconds(5), 35.0)),
    ];
    assert_eq!(
        compare_sessions("u1", 30, &rows),
        Outcome::Missing(Insufficient::InsufficientHistory { required: MIN_SESSIONS, found: 1 })
    );
}

#[test]
fn improvements_only_for_types_in_first_and_last() {
    let rows = vec![
        // siste økt (lagt inn først – rekkefølgen skal ikke spille noen rolle)
        SampleRow::new("late", Sample::force(day(5), 48.0)),
        SampleRow::new("late", Sample::angle(day(5) + Duration::seconds(1), 22.0)),
        SampleRow::new("early", Sample::force(day(0), 30.0)),
        SampleRow::new("early", Sample::force(day(0) + Duration::minutes(2), 40.0)),
        SampleRow::new("mid", Sample::combined(day(2), 12.0, 50.0)),
    ];

    let out = compare_sessions("u1", 30, &rows);
    let report = out.ready().expect("sammenligning");
    assert_eq!(report.total_sessions, 3);

    let ids: Vec<&str> = report.session_statistics.iter().map(|s| s.session_id.as_str()).collect();
    assert_eq!(ids, vec!["early", "mid", "late"]);
    assert!((report.session_statistics[0].duration_minutes - 2.0).abs() < 1e-9);

    // bare FORCE finnes i både første og siste økt
    assert_eq!(report.improvements.len(), 1);
    let force = &report.improvements[&TestType::Force];
    assert_eq!(force.force_value, Some(40.0 - 48.0));
    assert!(force.angle_value.is_none());
}

#[test]
fn angle_summary_is_minimum() {
    let rows = vec![
        SampleRow::new("a", Sample::angle(day(0), 60.0)),
        SampleRow::new("a", Sample::angle(day(0) + Duration::seconds(1), 45.0)),
        SampleRow::new("b", Sample::angle(day(3), 30.0)),
        SampleRow::new("b", Sample::angle(day(3) + Duration::seconds(1), 38.0)),
    ];
    let out = compare_sessions("u1", 7, &rows);
    let report = out.ready().unwrap();
    assert_eq!(report.session_statistics[0].values[&TestType::Angle].angle_value, Some(45.0));
    // første minus siste: 45 − 30 = 15 (vinkelen gikk ned)
    assert_eq!(report.improvements[&TestType::Angle].angle_value, Some(15.0));
    assert_eq!(report.analysis_period_days, 7);
}
