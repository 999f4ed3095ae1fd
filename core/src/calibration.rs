// core/src/calibration.rs
use serde::Serialize;

use crate::device::{Reading, SensorDevice};
use crate::models::TestType;
use crate::stats::mean;

// Referanseverdier kalibreringen skalerer mot
const FORCE_TARGET_N: f64 = 50.0;
const ANGLE_TARGET_DEG: f64 = 90.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationResult {
    pub force_factor: Option<f64>, // None når vinduet ikke hadde kraftverdier
    pub angle_factor: Option<f64>,
    pub readings_used: usize,
    pub calibrated: bool,
    pub reason: Option<String>,
}

impl CalibrationResult {
    fn uncalibrated(readings_used: usize, reason: &str) -> Self {
        Self {
            force_factor: None,
            angle_factor: None,
            readings_used,
            calibrated: false,
            reason: Some(reason.into()),
        }
    }

    /// Skalerer en avlesning; kanaler uten faktor står urørt.
    pub fn apply(&self, reading: Reading) -> Reading {
        Reading {
            force: reading.force.map(|f| f * self.force_factor.unwrap_or(1.0)),
            angle: reading.angle.map(|a| a * self.angle_factor.unwrap_or(1.0)),
            quality: reading.quality,
        }
    }
}

fn factor(values: &[f64], target: f64) -> Option<f64> {
    let m = mean(values)?;
    Some(if m == 0.0 { 1.0 } else { target / m })
}

/// Baseline-forhold fra et kalibreringsvindu: 50 / snitt(kraft), 90 / snitt(vinkel).
pub fn calibration_factors(readings: &[Reading]) -> CalibrationResult {
    if readings.is_empty() {
        return CalibrationResult::uncalibrated(0, "no_readings");
    }

    // 0-verdier regnes som "ikke målt"
    let forces: Vec<f64> = readings.iter().filter_map(|r| r.force).filter(|f| *f != 0.0).collect();
    let angles: Vec<f64> = readings.iter().filter_map(|r| r.angle).filter(|a| *a != 0.0).collect();

    let force_factor = factor(&forces, FORCE_TARGET_N);
    let angle_factor = factor(&angles, ANGLE_TARGET_DEG);
    if force_factor.is_none() && angle_factor.is_none() {
        return CalibrationResult::uncalibrated(readings.len(), "no_channel_values");
    }

    CalibrationResult {
        force_factor,
        angle_factor,
        readings_used: readings.len(),
        calibrated: true,
        reason: None,
    }
}

/// Leser `reads` ganger fra sensoren og beregner faktorer av det som kom inn.
pub fn calibrate_device(
    device: &mut dyn SensorDevice,
    test_type: TestType,
    reads: usize,
) -> CalibrationResult {
    let mut readings = Vec::with_capacity(reads);
    let mut failures = 0usize;
    for _ in 0..reads {
        match device.read(test_type) {
            Ok(r) => readings.push(r),
            Err(e) => {
                failures += 1;
                log::debug!("kalibrering {}: lesing feilet: {e}", device.name());
            }
        }
    }

    let result = calibration_factors(&readings);
    log::info!(
        "kalibrering {} ({test_type}): {} ok, {} feil, force={:?}, angle={:?}",
        device.name(),
        readings.len(),
        failures,
        result.force_factor,
        result.angle_factor
    );
    result
}
