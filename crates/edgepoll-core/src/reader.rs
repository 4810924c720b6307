//! Simulated sensor reader.
//!
//! Stands in for a hardware driver on machines without the sensor bus. Raw
//! values are drawn uniformly from a fixed ADC range and converted to a
//! voltage against a reference, rounded to two decimals.

use std::ops::RangeInclusive;

use async_trait::async_trait;

use edgepoll_types::Reading;

use crate::error::{Error, Result};
use crate::traits::SensorReader;

/// Default raw value range.
pub const DEFAULT_RAW_RANGE: RangeInclusive<i64> = 14_000..=16_000;
/// Default reference voltage.
pub const DEFAULT_REFERENCE_VOLTAGE: f64 = 3.3;
/// Default ADC full-scale count.
pub const DEFAULT_FULL_SCALE: f64 = 20_000.0;

/// A [`SensorReader`] that produces random values.
#[derive(Debug, Clone)]
pub struct SimulatedReader {
    raw_range: RangeInclusive<i64>,
    reference_voltage: f64,
    full_scale: f64,
}

impl Default for SimulatedReader {
    fn default() -> Self {
        Self {
            raw_range: DEFAULT_RAW_RANGE,
            reference_voltage: DEFAULT_REFERENCE_VOLTAGE,
            full_scale: DEFAULT_FULL_SCALE,
        }
    }
}

impl SimulatedReader {
    /// Create a reader with the default range and scaling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the raw value range.
    #[must_use]
    pub fn raw_range(mut self, range: RangeInclusive<i64>) -> Self {
        self.raw_range = range;
        self
    }

    /// Set the reference voltage and ADC full-scale count.
    #[must_use]
    pub fn scaling(mut self, reference_voltage: f64, full_scale: f64) -> Self {
        self.reference_voltage = reference_voltage;
        self.full_scale = full_scale;
        self
    }

    /// Convert a raw count to volts, rounded to two decimals.
    #[must_use]
    pub fn voltage_for(&self, raw_value: i64) -> f64 {
        let volts = self.reference_voltage * raw_value as f64 / self.full_scale;
        (volts * 100.0).round() / 100.0
    }
}

#[async_trait]
impl SensorReader for SimulatedReader {
    async fn read(&self, _sensor_type: &str, sensor_id: &str) -> Result<Reading> {
        if self.raw_range.is_empty() || self.full_scale == 0.0 {
            return Err(Error::sensor_read(sensor_id, "simulator misconfigured"));
        }
        let raw_value = rand::random_range(self.raw_range.clone());
        Ok(Reading::new(sensor_id, raw_value, self.voltage_for(raw_value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voltage_conversion() {
        let reader = SimulatedReader::new();
        assert_eq!(reader.voltage_for(14_000), 2.31);
        assert_eq!(reader.voltage_for(15_200), 2.51);
        assert_eq!(reader.voltage_for(16_000), 2.64);
        assert_eq!(reader.voltage_for(0), 0.0);
    }

    #[tokio::test]
    async fn test_reading_within_range() {
        let reader = SimulatedReader::new();
        for _ in 0..100 {
            let reading = reader.read("turbidity", "Sensor1").await.unwrap();
            assert_eq!(reading.sensor_id, "Sensor1");
            assert!(DEFAULT_RAW_RANGE.contains(&reading.raw_value));
            assert_eq!(reading.voltage, reader.voltage_for(reading.raw_value));
        }
    }

    #[tokio::test]
    async fn test_fixed_range() {
        let reader = SimulatedReader::new().raw_range(10_000..=10_000);
        let reading = reader.read("turbidity", "Sensor2").await.unwrap();
        assert_eq!(reading.raw_value, 10_000);
        assert_eq!(reading.voltage, 1.65);
    }

    #[tokio::test]
    #[allow(clippy::reversed_empty_ranges)]
    async fn test_empty_range_is_read_error() {
        let reader = SimulatedReader::new().raw_range(5..=1);
        let err = reader.read("turbidity", "Sensor1").await.unwrap_err();
        assert!(matches!(err, Error::SensorRead { .. }));
    }
}
