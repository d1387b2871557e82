//! Sensor sources: real BME280 hardware and a simulated generator.

use rand::Rng;
use thiserror::Error;

use enviropub_common::Reading;

use crate::config::I2cConfig;

/// Errors from a sensor source.
#[derive(Debug, Error)]
pub enum SensorError {
    /// Detection failed at startup. Fatal; the loop never starts.
    #[error(
        "Unable to detect BME280 sensor on {bus} @ 0x{address:02x}: {message}. \
         Make sure it is connected correctly, or enable simulated data"
    )]
    NotDetected {
        bus: String,
        address: u8,
        message: String,
    },

    /// A bus read failed after successful detection.
    #[error("Sensor read failed: {0}")]
    Read(String),

    /// Hardware access is only implemented for Linux I2C.
    #[error("Hardware sensor support is only available on Linux; use simulated data")]
    Unsupported,
}

/// A source of environmental readings.
///
/// `sample` takes one reading per call and never retries internally; it
/// blocks only as long as the underlying bus I/O does.
pub trait SensorSource: Send {
    fn sample(&mut self) -> Result<Reading, SensorError>;
}

/// Detect the hardware sensor described by `config`.
///
/// Opens the I2C bus and loads the chip's calibration parameters. Any
/// failure here is fatal to the caller; there is no fallback to
/// simulated data.
#[cfg(target_os = "linux")]
pub fn detect(config: &I2cConfig) -> Result<Box<dyn SensorSource>, SensorError> {
    Ok(Box::new(hardware::Bme280Sensor::detect(
        &config.bus,
        config.address,
    )?))
}

#[cfg(not(target_os = "linux"))]
pub fn detect(_config: &I2cConfig) -> Result<Box<dyn SensorSource>, SensorError> {
    Err(SensorError::Unsupported)
}

/// Bounds for simulated readings: (min, max) temperature in °C and
/// relative humidity in percent.
pub const SIMULATED_TEMPERATURE_RANGE: (f64, f64) = (20.0, 30.0);
pub const SIMULATED_HUMIDITY_RANGE: (f64, f64) = (40.0, 60.0);

/// Generates plausible pseudo-random readings.
///
/// Each call is independent; there is no drift model and no memory of
/// prior readings. Sampling never fails.
#[derive(Debug, Default)]
pub struct SimulatedSensor;

impl SimulatedSensor {
    pub fn new() -> Self {
        Self
    }
}

impl SensorSource for SimulatedSensor {
    fn sample(&mut self) -> Result<Reading, SensorError> {
        let mut rng = rand::rng();
        let (t_min, t_max) = SIMULATED_TEMPERATURE_RANGE;
        let (h_min, h_max) = SIMULATED_HUMIDITY_RANGE;

        Ok(Reading::new(
            rng.random_range(t_min..t_max),
            rng.random_range(h_min..h_max),
        ))
    }
}

#[cfg(target_os = "linux")]
mod hardware {
    use bme280::i2c::BME280;
    use linux_embedded_hal::{Delay, I2cdev};

    use enviropub_common::Reading;

    use super::{SensorError, SensorSource};

    /// The physical BME280 on a Linux I2C bus.
    pub struct Bme280Sensor {
        driver: BME280<I2cdev>,
        delay: Delay,
        bus: String,
        address: u8,
    }

    impl Bme280Sensor {
        /// Open the bus and initialize the chip, loading its calibration
        /// parameters.
        pub fn detect(bus: &str, address: u8) -> Result<Self, SensorError> {
            let i2c = I2cdev::new(bus).map_err(|e| SensorError::NotDetected {
                bus: bus.to_string(),
                address,
                message: e.to_string(),
            })?;

            let mut driver = BME280::new(i2c, address);
            let mut delay = Delay;

            driver
                .init(&mut delay)
                .map_err(|e| SensorError::NotDetected {
                    bus: bus.to_string(),
                    address,
                    message: format!("{:?}", e),
                })?;

            Ok(Self {
                driver,
                delay,
                bus: bus.to_string(),
                address,
            })
        }
    }

    impl SensorSource for Bme280Sensor {
        fn sample(&mut self) -> Result<Reading, SensorError> {
            let measurements = self.driver.measure(&mut self.delay).map_err(|e| {
                SensorError::Read(format!(
                    "BME280 on {} @ 0x{:02x}: {:?}",
                    self.bus, self.address, e
                ))
            })?;

            Ok(Reading::new(
                f64::from(measurements.temperature),
                f64::from(measurements.humidity),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_values_in_bounds() {
        let mut sensor = SimulatedSensor::new();
        let (t_min, t_max) = SIMULATED_TEMPERATURE_RANGE;
        let (h_min, h_max) = SIMULATED_HUMIDITY_RANGE;

        for _ in 0..10_000 {
            let reading = sensor.sample().expect("simulated sampling never fails");
            assert!(reading.temperature >= t_min && reading.temperature < t_max);
            assert!(reading.humidity >= h_min && reading.humidity < h_max);
        }
    }

    #[test]
    fn test_simulated_values_vary() {
        let mut sensor = SimulatedSensor::new();
        let first = sensor.sample().unwrap();

        // 100 independent draws from a continuous range; a repeat of the
        // exact first pair means the generator is not advancing.
        let repeats = (0..100)
            .filter(|_| sensor.sample().unwrap() == first)
            .count();
        assert_eq!(repeats, 0);
    }
}
