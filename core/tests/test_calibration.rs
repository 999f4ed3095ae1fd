use rehabtech_core::calibration::{calibrate_device, calibration_factors};
use rehabtech_core::device::{Reading, SensorDevice, SimulatedSensorDevice};
use rehabtech_core::error::DeviceError;
use rehabtech_core::models::TestType;

fn reading(force: Option<f64>, angle: Option<f64>) -> Reading {
    Reading { force, angle, quality: 1.0 }
}

#[test]
fn factors_scale_to_reference_values() {
    let r = calibration_factors(&[
        reading(Some(20.0), Some(40.0)),
        reading(Some(30.0), Some(50.0)),
        reading(Some(0.0), Some(0.0)), // ikke målt
    ]);
    assert!(r.calibrated);
    assert_eq!(r.readings_used, 3);
    assert_eq!(r.force_factor, Some(2.0));
    assert_eq!(r.angle_factor, Some(2.0));

    let scaled = r.apply(reading(Some(25.0), None));
    assert_eq!(scaled.force, Some(50.0));
    assert!(scaled.angle.is_none());
}

#[test]
fn missing_channels_are_reported() {
    let empty = calibration_factors(&[]);
    assert!(!empty.calibrated);
    assert_eq!(empty.reason.as_deref(), Some("no_readings"));

    let zeros = calibration_factors(&[reading(Some(0.0), None), reading(None, Some(0.0))]);
    assert!(!zeros.calibrated);
    assert_eq!(zeros.reason.as_deref(), Some("no_channel_values"));
    // ukalibrert resultat lar avlesninger stå urørt
    assert_eq!(zeros.apply(reading(Some(7.0), Some(8.0))), reading(Some(7.0), Some(8.0)));
}

struct Flaky {
    calls: usize,
}

impl SensorDevice for Flaky {
    fn read(&mut self, _test_type: TestType) -> Result<Reading, DeviceError> {
        self.calls += 1;
        if self.calls % 2 == 0 {
            Err(DeviceError::Status(503))
        } else {
            Ok(reading(Some(25.0), Some(45.0)))
        }
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[test]
fn device_calibration_skips_failed_reads() {
    let mut dev = Flaky { calls: 0 };
    let r = calibrate_device(&mut dev, TestType::ForceAndAngle, 10);
    assert_eq!(dev.calls, 10);
    assert_eq!(r.readings_used, 5);
    assert_eq!(r.force_factor, Some(2.0));
    assert_eq!(r.angle_factor, Some(2.0));
}

#[test]
fn simulated_device_calibrates() {
    let mut dev = SimulatedSensorDevice::new(3);
    let r = calibrate_device(&mut dev, TestType::Force, 20);
    assert!(r.calibrated);
    assert!(r.force_factor.is_some_and(|f| f.is_finite() && f > 0.0));
    assert!(r.angle_factor.is_none());
}
