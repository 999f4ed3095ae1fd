use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::models::{Session, SessionStatus};
use crate::stats::mean;

/// Brukes når brukeren ikke har noen analyserte økter ennå.
pub const DEFAULT_REHAB_SCORE: u32 = 75;

/// Sammenhengende treningsdager bakover fra i dag. En økt i går teller
/// fortsatt som løpende rekke selv om det ikke er trent i dag ennå.
pub fn training_streak(dates: &[NaiveDate], today: NaiveDate) -> u32 {
    let distinct: BTreeSet<NaiveDate> = dates.iter().copied().filter(|d| *d <= today).collect();

    let mut day = if distinct.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };
    let mut streak = 0;
    while distinct.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub total_sessions: usize,
    pub current_streak: u32,
    /// 5 økter siste 7 dager = 100 %
    pub weekly_progress: u32,
    pub rehab_score: u32,
}

pub fn user_stats(sessions: &[Session], recent_scores: &[f64], today: NaiveDate) -> UserStats {
    let completed_dates: Vec<NaiveDate> = sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Completed)
        .map(|s| s.start_time.date_naive())
        .collect();

    let week_start = today - Duration::days(7);
    let weekly = sessions
        .iter()
        .filter(|s| s.start_time.date_naive() >= week_start)
        .count();

    let finite: Vec<f64> = recent_scores.iter().copied().filter(|s| s.is_finite()).collect();
    let rehab_score = mean(&finite)
        .map(|m| m.clamp(0.0, 100.0) as u32)
        .unwrap_or(DEFAULT_REHAB_SCORE);

    UserStats {
        total_sessions: sessions.len(),
        current_streak: training_streak(&completed_dates, today),
        weekly_progress: (weekly as u32).saturating_mul(20).min(100),
        rehab_score,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionBrief {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub session_count: usize,
    pub total_duration_minutes: f64,
    pub sessions: Vec<SessionBrief>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklySummary {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub total_sessions: usize,
    pub total_duration_hours: f64,
    pub average_session_duration_minutes: f64,
    /// økter per dag
    pub training_frequency: f64,
}

fn duration_secs(s: &Session) -> f64 {
    s.duration_secs.unwrap_or(0).max(0) as f64
}

/// Øktene som startet på `date`, nyeste først.
pub fn daily_summary(sessions: &[Session], date: NaiveDate) -> DailySummary {
    let mut todays: Vec<&Session> = sessions
        .iter()
        .filter(|s| s.start_time.date_naive() == date)
        .collect();
    todays.sort_by(|a, b| b.start_time.cmp(&a.start_time));

    let total_secs: f64 = todays.iter().map(|s| duration_secs(s)).sum();
    DailySummary {
        date,
        session_count: todays.len(),
        total_duration_minutes: total_secs / 60.0,
        sessions: todays
            .iter()
            .map(|s| SessionBrief {
                session_id: s.session_id.clone(),
                start_time: s.start_time,
                end_time: s.end_time,
                duration_minutes: duration_secs(s) / 60.0,
            })
            .collect(),
    }
}

/// Siste 7 dager til og med `today`.
pub fn weekly_summary(sessions: &[Session], today: NaiveDate) -> WeeklySummary {
    let week_start = today - Duration::days(7);
    let week: Vec<&Session> = sessions
        .iter()
        .filter(|s| {
            let d = s.start_time.date_naive();
            d >= week_start && d <= today
        })
        .collect();

    let total_secs: f64 = week.iter().map(|s| duration_secs(s)).sum();
    let n = week.len();
    WeeklySummary {
        week_start,
        week_end: today,
        total_sessions: n,
        total_duration_hours: total_secs / 3600.0,
        average_session_duration_minutes: if n == 0 { 0.0 } else { total_secs / n as f64 / 60.0 },
        training_frequency: n as f64 / 7.0,
    }
}
