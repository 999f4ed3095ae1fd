use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StoreError;

/// Testtype – bestemmer hvilke kanaler (kraft/vinkel) en sample skal fylle.
/// Tar også imot de gamle etikettene fra sensorappen ("force test" osv).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestType {
    #[serde(alias = "force test", alias = "force")]
    Force,
    #[serde(alias = "angle test", alias = "angle")]
    Angle,
    #[serde(alias = "force and angle test", alias = "force angle test")]
    ForceAndAngle,
}

impl TestType {
    pub const ALL: [TestType; 3] = [TestType::Force, TestType::Angle, TestType::ForceAndAngle];

    #[inline]
    pub fn uses_force(self) -> bool {
        matches!(self, TestType::Force | TestType::ForceAndAngle)
    }

    #[inline]
    pub fn uses_angle(self) -> bool {
        matches!(self, TestType::Angle | TestType::ForceAndAngle)
    }

    /// (kraft, vinkel) – hvilke kanaler typen fyller.
    pub fn channels(self) -> (bool, bool) {
        (self.uses_force(), self.uses_angle())
    }

    /// Kanonisk navn (samme som serde-formen).
    pub fn as_str(self) -> &'static str {
        match self {
            TestType::Force => "FORCE",
            TestType::Angle => "ANGLE",
            TestType::ForceAndAngle => "FORCE_AND_ANGLE",
        }
    }

    /// Lesbar etikett brukt i eksport og prompt.
    pub fn label(self) -> &'static str {
        match self {
            TestType::Force => "force test",
            TestType::Angle => "angle test",
            TestType::ForceAndAngle => "force and angle test",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "force" | "force test" => Ok(TestType::Force),
            "angle" | "angle test" => Ok(TestType::Angle),
            "force and angle" | "force and angle test" | "force angle test" => {
                Ok(TestType::ForceAndAngle)
            }
            other => Err(format!("ukjent testtype: {other}")),
        }
    }
}

fn default_quality() -> f64 {
    1.0
}

/// RFC 3339, eller naiv `YYYY-MM-DD HH:MM:SS[.ffffff]` (gamle SQLite-rader) tolket som UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("ugyldig tidsstempel: {raw:?}"))
}

fn deserialize_timestamp<'de, D>(de: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(de)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// Én tidsstemplet måling. Uforanderlig når den først er skrevet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub test_type: TestType,
    #[serde(default, alias = "force")]
    pub force_value: Option<f64>, // N
    #[serde(default, alias = "angle")]
    pub angle_value: Option<f64>, // grader
    #[serde(default = "default_quality")]
    pub data_quality: f64, // 0–1
}

impl Sample {
    pub fn force(timestamp: DateTime<Utc>, force_n: f64) -> Self {
        Self {
            timestamp,
            test_type: TestType::Force,
            force_value: Some(force_n),
            angle_value: None,
            data_quality: 1.0,
        }
    }

    pub fn angle(timestamp: DateTime<Utc>, angle_deg: f64) -> Self {
        Self {
            timestamp,
            test_type: TestType::Angle,
            force_value: None,
            angle_value: Some(angle_deg),
            data_quality: 1.0,
        }
    }

    pub fn combined(timestamp: DateTime<Utc>, force_n: f64, angle_deg: f64) -> Self {
        Self {
            timestamp,
            test_type: TestType::ForceAndAngle,
            force_value: Some(force_n),
            angle_value: Some(angle_deg),
            data_quality: 1.0,
        }
    }

    /// Sjekker kanal-invarianten: ingen kanal utenfor testtypen, endelige verdier
    /// og kvalitet i [0, 1]. Manglende kanaler er lov (analysen hopper over dem).
    pub fn validate(&self) -> Result<(), StoreError> {
        let invalid = |reason: &str| StoreError::InvalidSample(reason.to_string());

        if self.force_value.is_some() && !self.test_type.uses_force() {
            return Err(invalid("force_value satt på en ren vinkeltest"));
        }
        if self.angle_value.is_some() && !self.test_type.uses_angle() {
            return Err(invalid("angle_value satt på en ren krafttest"));
        }
        if self.force_value.is_some_and(|f| !f.is_finite()) {
            return Err(invalid("force_value er ikke endelig"));
        }
        if self.angle_value.is_some_and(|a| !a.is_finite()) {
            return Err(invalid("angle_value er ikke endelig"));
        }
        if !(0.0..=1.0).contains(&self.data_quality) {
            return Err(invalid("data_quality utenfor [0, 1]"));
        }
        Ok(())
    }
}

/// Rad på tvers av økter (historikk): sample + hvilken økt den tilhører.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub session_id: String,
    #[serde(flatten)]
    pub sample: Sample,
}

impl SampleRow {
    pub fn new(session_id: impl Into<String>, sample: Sample) -> Self {
        Self { session_id: session_id.into(), sample }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
}

/// Treningsøkt. Opprettes ved start, lukkes én gang (end_time/status/varighet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub status: SessionStatus,
    pub test_types: BTreeSet<TestType>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Brukerprofil som sendes videre til anbefalingsgeneratoren.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default, alias = "gender")]
    pub sex: Option<String>,
    #[serde(default, alias = "weight")]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub rehabilitation_stage: Option<String>,
    #[serde(default, alias = "main_issues")]
    pub main_problems: Option<String>,
}
