use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ureq::Agent;

use crate::config::AdvisorConfig;
use crate::error::AdvisorError;
use crate::metrics;
use crate::models::{TestType, UserProfile};
use crate::progress::{DailySummary, WeeklySummary};
use crate::storage::RecommendationSink;
use crate::types::{
    ChannelStats, ClusterReport, ComparisonReport, ComprehensiveAnalysis, Grade, Outcome,
};

const SYSTEM_PROMPT: &str = "You are a professional rehabilitation training expert who analyses \
rehabilitation data and gives professional, actionable advice.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    AnalysisBased,
    ComparisonBased,
    DailyReport,
    WeeklySummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Remote,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub text: String,
    pub source: RecommendationSource,
    pub generated_at: DateTime<Utc>,
}

/// Ren transformasjon fra analyse til tekst.
pub trait RecommendationGenerator: Send + Sync {
    fn source(&self) -> RecommendationSource;

    fn advise_session(
        &self,
        analysis: &ComprehensiveAnalysis,
        profile: &UserProfile,
    ) -> Result<String, AdvisorError>;

    fn advise_comparison(
        &self,
        comparison: &ComparisonReport,
        profile: &UserProfile,
    ) -> Result<String, AdvisorError>;

    fn advise_daily(&self, day: &DailySummary, profile: &UserProfile) -> Result<String, AdvisorError>;

    fn advise_weekly(&self, week: &WeeklySummary, profile: &UserProfile) -> Result<String, AdvisorError>;
}

/// Hva det skal gis råd om.
#[derive(Debug, Clone, Copy)]
pub enum AdviceSubject<'a> {
    Session(&'a ComprehensiveAnalysis),
    Comparison(&'a ComparisonReport),
    Daily(&'a DailySummary),
    Weekly(&'a WeeklySummary),
}

impl AdviceSubject<'_> {
    fn kind(&self) -> RecommendationKind {
        match self {
            AdviceSubject::Session(_) => RecommendationKind::AnalysisBased,
            AdviceSubject::Comparison(_) => RecommendationKind::ComparisonBased,
            AdviceSubject::Daily(_) => RecommendationKind::DailyReport,
            AdviceSubject::Weekly(_) => RecommendationKind::WeeklySummary,
        }
    }

    fn ask(
        &self,
        generator: &dyn RecommendationGenerator,
        profile: &UserProfile,
    ) -> Result<String, AdvisorError> {
        match self {
            AdviceSubject::Session(a) => generator.advise_session(a, profile),
            AdviceSubject::Comparison(c) => generator.advise_comparison(c, profile),
            AdviceSubject::Daily(d) => generator.advise_daily(d, profile),
            AdviceSubject::Weekly(w) => generator.advise_weekly(w, profile),
        }
    }
}

/// Feiler aldri: primærfeil logges, telles og erstattes av fallback-generatoren.
pub fn recommend_with_fallback(
    primary: &dyn RecommendationGenerator,
    fallback: &dyn RecommendationGenerator,
    subject: AdviceSubject<'_>,
    profile: &UserProfile,
) -> Recommendation {
    let (text, source) = match subject.ask(primary, profile) {
        Ok(text) => (text, primary.source()),
        Err(e) => {
            log::warn!("anbefaling fra {:?} feilet: {e} – bruker fallback", primary.source());
            metrics::inc_advisor_fallback();
            match subject.ask(fallback, profile) {
                Ok(text) => (text, fallback.source()),
                Err(e) => {
                    log::error!("fallback-anbefaling feilet også: {e}");
                    (
                        "No recommendation could be generated for this data. Continue the \
                         current plan and review it with your therapist."
                            .to_string(),
                        fallback.source(),
                    )
                }
            }
        }
    };

    let (session_id, user_id) = match subject {
        AdviceSubject::Session(a) => (Some(a.session_id.clone()), None),
        AdviceSubject::Comparison(c) => (None, Some(c.user_id.clone())),
        AdviceSubject::Daily(_) | AdviceSubject::Weekly(_) => (None, None),
    };

    Recommendation {
        kind: subject.kind(),
        session_id,
        user_id,
        text,
        source,
        generated_at: Utc::now(),
    }
}

/// Som `recommend_with_fallback`, men lagrer anbefalingen. Lagringsfeil logges
/// og telles; anbefalingen returneres uansett.
pub fn recommend_and_save(
    primary: &dyn RecommendationGenerator,
    fallback: &dyn RecommendationGenerator,
    subject: AdviceSubject<'_>,
    profile: &UserProfile,
    sink: &dyn RecommendationSink,
) -> Recommendation {
    let rec = recommend_with_fallback(primary, fallback, subject, profile);
    if let Err(e) = sink.save_recommendation(&rec) {
        metrics::inc_recommendation_persist_failure();
        log::error!("kunne ikke lagre anbefaling ({:?}): {e}", rec.kind);
    }
    rec
}

// ──────────────────────────────────────────────────────────────────────────────
// Prompt
// ──────────────────────────────────────────────────────────────────────────────

fn pretty<T: Serialize>(v: &T) -> String {
    serde_json::to_string_pretty(v).unwrap_or_else(|_| "{}".to_string())
}

fn profile_block(profile: &UserProfile) -> String {
    let unknown = "unknown".to_string();
    let mut out = String::new();
    let _ = writeln!(out, "Age: {}", profile.age.map(|a| a.to_string()).unwrap_or_else(|| unknown.clone()));
    let _ = writeln!(out, "Sex: {}", profile.sex.as_ref().unwrap_or(&unknown));
    let _ = writeln!(
        out,
        "Weight: {}",
        profile.weight_kg.map(|w| format!("{w:.1} kg")).unwrap_or_else(|| unknown.clone())
    );
    let _ = writeln!(
        out,
        "Rehabilitation Stage: {}",
        profile.rehabilitation_stage.as_ref().unwrap_or(&unknown)
    );
    let _ = writeln!(out, "Main Problems: {}", profile.main_problems.as_ref().unwrap_or(&unknown));
    out
}

pub fn analysis_prompt(analysis: &ComprehensiveAnalysis, profile: &UserProfile) -> String {
    let summary = &analysis.data_summary;
    let types: Vec<&str> = summary.test_types.iter().map(|t| t.label()).collect();
    let grade = analysis.grade().map(|g| format!("{g:?}")).unwrap_or_else(|| "N/A".into());

    format!(
        "## Patient information\n{profile}\n\
         ## Base information\n\
         - Training duration: {duration:.1} minutes\n\
         - Data records: {records}\n\
         - Test types: {types}\n\n\
         ## Performance score\n\
         - Overall performance: {score:.1}/100\n\
         - Grade: {grade}\n\n\
         ## Statistical analysis\n{stats}\n\n\
         ## Trend analysis\n{trend}\n\n\
         ## Cluster analysis\n{cluster}\n\n\
         ## Please provide\n\
         1. Training performance evaluation (overall, strengths, areas to improve)\n\
         2. Specific training suggestions for force and angle work and for intensity\n\
         3. Training plan optimisation (next session parameters, frequency, progression)\n\
         4. Precautions and risk warnings\n\
         5. Rehabilitation progress estimate\n\
         Reply in professional but understandable English so the advice is actionable.\n",
        profile = profile_block(profile),
        duration = summary.time_range.duration_minutes,
        records = summary.total_records,
        types = types.join(", "),
        score = analysis.overall_score().unwrap_or(0.0),
        grade = grade,
        stats = pretty(&analysis.statistical_analysis),
        trend = pretty(&analysis.trend_analysis),
        cluster = pretty(&analysis.clustering_analysis),
    )
}

pub fn comparison_prompt(comparison: &ComparisonReport, profile: &UserProfile) -> String {
    let recent: Vec<_> = comparison.session_statistics.iter().take(5).collect();
    format!(
        "You are a professional physiotherapist. Assess the rehabilitation progress from the \
         patient's historical training data and give follow-up recommendations.\n\n\
         ## Patient information\n{profile}\n\
         ## Overall situation\n\
         - Analysis timeframe: {days} days\n\
         - Total training sessions: {total}\n\n\
         ## Improvements (first session minus last session)\n{improvements}\n\n\
         ## Session details\n{sessions}\n\n\
         ## Please provide\n\
         1. Rehabilitation progress assessment\n\
         2. Training effect analysis (what improved, what needs work)\n\
         3. Personalised suggestions\n\
         4. Future training plan\n\
         5. Encouragement\n\
         Please answer in warm, motivating and professional English.\n",
        profile = profile_block(profile),
        days = comparison.analysis_period_days,
        total = comparison.total_sessions,
        improvements = pretty(&comparison.improvements),
        sessions = pretty(&recent),
    )
}

pub fn daily_prompt(day: &DailySummary, profile: &UserProfile) -> String {
    format!(
        "As a rehabilitation training expert, give a brief daily report and recommendations \
         based on the patient's training today.\n\n\
         ## Patient information\n{profile}\n\
         ## Today's training ({date})\n\
         - Training sessions: {count}\n\
         - Total training duration: {minutes:.1} minutes\n\n\
         ## Please provide\n\
         1. Brief evaluation of today's training (under 50 words)\n\
         2. Training suggestions for tomorrow (under 50 words)\n\
         3. Words of motivation (under 30 words)\n\
         Keep the tone concise, professional and warm.\n",
        profile = profile_block(profile),
        date = day.date,
        count = day.session_count,
        minutes = day.total_duration_minutes,
    )
}

pub fn weekly_prompt(week: &WeeklySummary, profile: &UserProfile) -> String {
    format!(
        "As a rehabilitation training expert, give a weekly summary and next week's \
         recommendations based on the patient's training this week.\n\n\
         ## Patient information\n{profile}\n\
         ## This week ({start} to {end})\n\
         - Training sessions: {total}\n\
         - Total duration: {hours:.1} hours\n\
         - Average session duration: {avg:.1} minutes\n\
         - Training frequency: {freq:.1} sessions/day\n\n\
         ## Please provide\n\
         1. Summary of this week's training performance (within 100 words)\n\
         2. Suggestions for next week's training plan (within 100 words)\n\
         3. Long-term rehabilitation recommendations (within 80 words)\n\
         Maintain a professional and encouraging tone.\n",
        profile = profile_block(profile),
        start = week.week_start,
        end = week.week_end,
        total = week.total_sessions,
        hours = week.total_duration_hours,
        avg = week.average_session_duration_minutes,
        freq = week.training_frequency,
    )
}

// Faste svar når det ikke finnes data; fjerntjenesten spørres ikke da.
const NO_TRAINING_TODAY: &str =
    "No training recorded today. A moderate rehabilitation session keeps the training streak going.";
const NO_TRAINING_THIS_WEEK: &str =
    "No training recorded this week. Set up a regular plan and train 3-4 times a week.";

// ──────────────────────────────────────────────────────────────────────────────
// Malbasert generator
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateAdvisor;

fn grade_evaluation(grade: Option<Grade>) -> &'static str {
    match grade {
        Some(Grade::A) => "Excellent session: performance is well above target. Keep the current plan and progress the load gradually.",
        Some(Grade::B) => "Good session with steady performance. Small increases in load or range of motion are appropriate.",
        Some(Grade::C) => "Acceptable session. Focus on consistent, controlled repetitions before increasing intensity.",
        Some(Grade::D) => "Performance is below target. Reduce intensity, prioritise controlled movement and contact your therapist if pain persists.",
        None => "There is not enough scored data to grade this session.",
    }
}

fn force_hint(test_type: TestType, s: &ChannelStats) -> String {
    let cv = if s.mean > 0.0 { s.std / s.mean } else { 0.0 };
    if cv > 0.3 {
        format!(
            "{}: force varied considerably (mean {:.1} N, variation {:.0}%). Aim for steadier contractions.",
            test_type.label(),
            s.mean,
            cv * 100.0
        )
    } else {
        format!(
            "{}: force output was steady (mean {:.1} N, peak {:.1} N).",
            test_type.label(),
            s.mean,
            s.max
        )
    }
}

fn angle_hint(test_type: TestType, s: &ChannelStats) -> String {
    let range = s.max - s.min;
    if range < 30.0 {
        format!(
            "{}: range of motion was limited ({range:.1}°). Add gentle mobility work before loading.",
            test_type.label()
        )
    } else {
        format!("{}: range of motion reached {range:.1}°.", test_type.label())
    }
}

fn cluster_hint(test_type: TestType, report: &ClusterReport) -> Option<String> {
    (report.n_clusters >= 2 && report.validity_score > 0.5).then(|| {
        format!(
            "{}: {} distinct performance phases were detected (silhouette {:.2}); watch for fatigue between phases.",
            test_type.label(),
            report.n_clusters,
            report.validity_score
        )
    })
}

impl RecommendationGenerator for TemplateAdvisor {
    fn source(&self) -> RecommendationSource {
        RecommendationSource::Template
    }

    fn advise_session(
        &self,
        analysis: &ComprehensiveAnalysis,
        profile: &UserProfile,
    ) -> Result<String, AdvisorError> {
        let mut out = String::new();
        let _ = writeln!(out, "Session {}", analysis.session_id);
        if let Some(stage) = &profile.rehabilitation_stage {
            let _ = writeln!(out, "Rehabilitation stage: {stage}");
        }
        let score = analysis
            .overall_score()
            .map(|s| format!("{s:.1}/100"))
            .unwrap_or_else(|| "n/a".into());
        let _ = writeln!(out, "\n1. Evaluation (score {score})");
        let _ = writeln!(out, "{}", grade_evaluation(analysis.grade()));

        let _ = writeln!(out, "\n2. Training suggestions");
        if let Outcome::Ready(stats) = &analysis.statistical_analysis {
            for (test_type, ts) in stats {
                if let Some(f) = &ts.force {
                    let _ = writeln!(out, "- {}", force_hint(*test_type, f));
                }
                if let Some(a) = &ts.angle {
                    let _ = writeln!(out, "- {}", angle_hint(*test_type, a));
                }
            }
        }

        if let Outcome::Ready(trends) = &analysis.trend_analysis {
            for (test_type, trend) in trends {
                let Some(overall) = &trend.overall_trends else {
                    continue;
                };
                if let Some(f) = &overall.force_improvement {
                    let remark = if f.change >= 0.0 {
                        format!("force rose by {:.1} N ({:.1}%) through the session", f.change, f.percentage)
                    } else {
                        format!(
                            "force dropped by {:.1} N ({:.1}%), a sign of fatigue; plan longer rests",
                            -f.change, -f.percentage
                        )
                    };
                    let _ = writeln!(out, "- {}: {remark}.", test_type.label());
                }
                if let Some(a) = &overall.angle_improvement {
                    let _ = writeln!(
                        out,
                        "- {}: angle changed by {:+.1}° ({:+.1}%) from the first to the second half.",
                        test_type.label(),
                        a.change,
                        a.percentage
                    );
                }
            }
        }

        if let Outcome::Ready(clusters) = &analysis.clustering_analysis {
            for (test_type, c) in clusters {
                if let Some(hint) = c.ready().and_then(|r| cluster_hint(*test_type, r)) {
                    let _ = writeln!(out, "- {hint}");
                }
            }
        }

        let _ = writeln!(out, "\n3. Precautions");
        let _ = writeln!(
            out,
            "Warm up before each session and stop the exercise if you feel sharp pain or swelling."
        );
        Ok(out)
    }

    fn advise_comparison(
        &self,
        comparison: &ComparisonReport,
        profile: &UserProfile,
    ) -> Result<String, AdvisorError> {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Progress over the last {} days ({} sessions)",
            comparison.analysis_period_days, comparison.total_sessions
        );
        if let Some(stage) = &profile.rehabilitation_stage {
            let _ = writeln!(out, "Rehabilitation stage: {stage}");
        }

        if comparison.improvements.is_empty() {
            let _ = writeln!(
                out,
                "- The first and last sessions share no test type, so no direct comparison is possible yet."
            );
        }
        for (test_type, delta) in &comparison.improvements {
            // delta = første − siste: negativ kraft-delta betyr økt kraft
            if let Some(f) = delta.force_value {
                let text = if f < 0.0 {
                    format!("peak force improved by {:.1} N", -f)
                } else if f > 0.0 {
                    format!("peak force is {f:.1} N lower than in the first session")
                } else {
                    "peak force is unchanged".to_string()
                };
                let _ = writeln!(out, "- {}: {text}.", test_type.label());
            }
            if let Some(a) = delta.angle_value {
                let text = if a > 0.0 {
                    format!("angle decreased by {a:.1}°")
                } else if a < 0.0 {
                    format!("angle increased by {:.1}°", -a)
                } else {
                    "angle is unchanged".to_string()
                };
                let _ = writeln!(out, "- {}: {text}.", test_type.label());
            }
        }
        let _ = writeln!(
            out,
            "\nKeep training 3-4 times a week and raise intensity in small steps. Every session counts!"
        );
        Ok(out)
    }

    fn advise_daily(&self, day: &DailySummary, _profile: &UserProfile) -> Result<String, AdvisorError> {
        if day.session_count == 0 {
            return Ok(NO_TRAINING_TODAY.to_string());
        }
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Daily report {}: {} session(s), {:.1} minutes in total.",
            day.date, day.session_count, day.total_duration_minutes
        );
        let tomorrow = if day.total_duration_minutes > 60.0 {
            "That was a long training day; keep tomorrow light and focus on recovery."
        } else if day.total_duration_minutes < 10.0 {
            "Today was short; aim for a full 15-30 minute session tomorrow."
        } else {
            "Good training volume; repeat a similar session tomorrow."
        };
        let _ = writeln!(out, "{tomorrow}");
        let _ = writeln!(out, "Every session brings you closer to your goal.");
        Ok(out)
    }

    fn advise_weekly(&self, week: &WeeklySummary, _profile: &UserProfile) -> Result<String, AdvisorError> {
        if week.total_sessions == 0 {
            return Ok(NO_TRAINING_THIS_WEEK.to_string());
        }
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Weekly summary {} to {}: {} session(s), {:.1} hours, {:.1} minutes per session on average.",
            week.week_start,
            week.week_end,
            week.total_sessions,
            week.total_duration_hours,
            week.average_session_duration_minutes
        );
        let plan = if week.total_sessions < 3 {
            "Training was infrequent; plan 3-4 sessions next week."
        } else if week.total_sessions > 7 {
            "Training was very frequent; schedule at least one rest day next week."
        } else {
            "Training frequency is on target; keep the rhythm and progress the load gradually."
        };
        let _ = writeln!(out, "{plan}");
        let _ = writeln!(
            out,
            "Long term: consistency matters more than intensity. Review progress with your therapist monthly."
        );
        Ok(out)
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// OpenAI-kompatibel tjeneste
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking klient mot `POST {base_url}/chat/completions`.
pub struct RemoteAdvisor {
    agent: Agent,
    cfg: AdvisorConfig,
    api_key: String,
}

impl RemoteAdvisor {
    pub fn new(cfg: AdvisorConfig, api_key: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build();
        Self { agent, cfg, api_key: api_key.into() }
    }

    /// Leser nøkkelen fra miljøvariabelen config peker på.
    pub fn from_env(cfg: AdvisorConfig) -> Result<Self, AdvisorError> {
        let key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AdvisorError::MissingApiKey(cfg.api_key_env.clone()))?;
        Ok(Self::new(cfg, key))
    }

    fn chat(&self, prompt: &str) -> Result<String, AdvisorError> {
        let url = format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'));
        let req = ChatRequest {
            model: &self.cfg.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: self.cfg.max_tokens,
            temperature: self.cfg.temperature,
        };

        let resp = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(&req)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => AdvisorError::Unavailable(format!("status {code}")),
                ureq::Error::Transport(t) => AdvisorError::Unavailable(t.to_string()),
            })?;
        let body: ChatResponse = resp
            .into_json()
            .map_err(|e| AdvisorError::Unavailable(format!("ugyldig svar: {e}")))?;

        body.choices
            .into_iter()
            .find_map(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AdvisorError::EmptyAnswer)
    }
}

impl RecommendationGenerator for RemoteAdvisor {
    fn source(&self) -> RecommendationSource {
        RecommendationSource::Remote
    }

    fn advise_session(
        &self,
        analysis: &ComprehensiveAnalysis,
        profile: &UserProfile,
    ) -> Result<String, AdvisorError> {
        log::debug!("ber {} om råd for {}", self.cfg.model, analysis.session_id);
        self.chat(&analysis_prompt(analysis, profile))
    }

    fn advise_comparison(
        &self,
        comparison: &ComparisonReport,
        profile: &UserProfile,
    ) -> Result<String, AdvisorError> {
        self.chat(&comparison_prompt(comparison, profile))
    }

    fn advise_daily(&self, day: &DailySummary, profile: &UserProfile) -> Result<String, AdvisorError> {
        if day.session_count == 0 {
            return Ok(NO_TRAINING_TODAY.to_string());
        }
        self.chat(&daily_prompt(day, profile))
    }

    fn advise_weekly(&self, week: &WeeklySummary, profile: &UserProfile) -> Result<String, AdvisorError> {
        if week.total_sessions == 0 {
            return Ok(NO_TRAINING_THIS_WEEK.to_string());
        }
        self.chat(&weekly_prompt(week, profile))
    }
}
