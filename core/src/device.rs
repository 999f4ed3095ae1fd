use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use ureq::Agent;

use crate::config::DeviceConfig;
use crate::error::DeviceError;
use crate::models::{Sample, TestType};

/// Én avlesning fra sensoren, før den knyttes til en økt.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub force: Option<f64>, // N
    pub angle: Option<f64>, // grader
    pub quality: f64,
}

impl Reading {
    /// Bygger en sample og fjerner kanaler testtypen ikke bruker.
    pub fn into_sample(self, timestamp: DateTime<Utc>, test_type: TestType) -> Sample {
        let (uses_force, uses_angle) = test_type.channels();
        Sample {
            timestamp,
            test_type,
            force_value: self.force.filter(|_| uses_force),
            angle_value: self.angle.filter(|_| uses_angle),
            data_quality: self.quality.clamp(0.0, 1.0),
        }
    }
}

/// Kilde for målinger. Kalleren bestemmer hva som skjer ved feil.
pub trait SensorDevice: Send {
    fn read(&mut self, test_type: TestType) -> Result<Reading, DeviceError>;

    fn name(&self) -> &str;
}

impl<D: SensorDevice + ?Sized> SensorDevice for Box<D> {
    fn read(&mut self, test_type: TestType) -> Result<Reading, DeviceError> {
        (**self).read(test_type)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// ESP32 over HTTP
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct DevicePayload {
    #[serde(default)]
    angle: Option<f64>,
    #[serde(default)]
    yaw: Option<f64>,
    #[serde(default)]
    force: Option<f64>,
}

/// yaw foretrekkes framfor angle (firmware sender begge; yaw er filtrert).
fn reading_from_payload(p: DevicePayload, test_type: TestType) -> Result<Reading, DeviceError> {
    let (uses_force, uses_angle) = test_type.channels();
    let force = p.force.filter(|f| uses_force && f.is_finite());
    let angle = p.yaw.or(p.angle).filter(|a| uses_angle && a.is_finite());
    if force.is_none() && angle.is_none() {
        return Err(DeviceError::NoChannels(test_type));
    }
    Ok(Reading { force, angle, quality: 1.0 })
}

/// Blocking klient mot sensorens `/data`-endepunkt.
pub struct HttpSensorDevice {
    agent: Agent,
    base_url: String,
}

impl HttpSensorDevice {
    pub fn new(cfg: &DeviceConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build();
        Self {
            agent,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn fetch(&self) -> Result<DevicePayload, DeviceError> {
        let url = format!("{}/data", self.base_url);
        let resp = self.agent.get(&url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => DeviceError::Status(code),
            ureq::Error::Transport(t) => DeviceError::Unreachable(t.to_string()),
        })?;
        resp.into_json::<DevicePayload>()
            .map_err(|e| DeviceError::Malformed(e.to_string()))
    }

    /// Én lesing for å se om sensoren svarer.
    pub fn check_reachable(&self) -> Result<(), DeviceError> {
        let payload = self.fetch()?;
        log::info!(
            "sensor {} svarer (force={:?}, yaw={:?}, angle={:?})",
            self.base_url,
            payload.force,
            payload.yaw,
            payload.angle
        );
        Ok(())
    }
}

impl SensorDevice for HttpSensorDevice {
    fn read(&mut self, test_type: TestType) -> Result<Reading, DeviceError> {
        reading_from_payload(self.fetch()?, test_type)
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Simulert sensor
// ──────────────────────────────────────────────────────────────────────────────

/// Seedet simulator: kraft ≈ 50 N ± 20 N med tretthet og støy,
/// vinkel 90° ± 30° med skjelving, kvalitet i [0.85, 1].
pub struct SimulatedSensorDevice {
    rng: StdRng,
    tick: u64,
}

impl SimulatedSensorDevice {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), tick: 0 }
    }

    fn next_force(&mut self, t: f64) -> f64 {
        let contraction = 20.0 * (t * 0.5).sin();
        let fatigue = (1.0 - t * 0.002).max(0.6);
        let noise = self.rng.gen_range(-2.0..2.0);
        ((50.0 + contraction) * fatigue + noise).max(0.0)
    }

    fn next_angle(&mut self, t: f64) -> f64 {
        let rom = 30.0 * (t * 0.3).sin();
        let tremor = self.rng.gen_range(-1.5..1.5);
        (90.0 + rom + tremor).clamp(0.0, 180.0)
    }

    /// Fyll et helt sett samples (brukt av CLI og tester).
    pub fn samples(
        &mut self,
        test_type: TestType,
        count: usize,
        start: DateTime<Utc>,
        interval: chrono::Duration,
    ) -> Vec<Sample> {
        (0..count)
            .filter_map(|i| {
                let ts = start + interval * i as i32;
                self.read(test_type).ok().map(|r| r.into_sample(ts, test_type))
            })
            .collect()
    }
}

impl SensorDevice for SimulatedSensorDevice {
    fn read(&mut self, test_type: TestType) -> Result<Reading, DeviceError> {
        let t = self.tick as f64;
        self.tick += 1;
        let (uses_force, uses_angle) = test_type.channels();
        let force = uses_force.then(|| self.next_force(t));
        let angle = uses_angle.then(|| self.next_angle(t));
        let quality = self.rng.gen_range(0.85..=1.0);
        Ok(Reading { force, angle, quality })
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
