//! Analog acquisition and the measurement-correction pipeline.
//!
//! The pipeline is a strict sequence of pure conversions: channel voltages
//! to temperature and differential signal, signal to concentration, then a
//! two-part temperature correction and the reference-instrument fit. No
//! step validates its input; every function is total over the values the
//! front end can produce.

use core::future::Future;

use crate::calibration::{AdcCalibration, OzoneCalibration};
use crate::measurement::Measurement;

/// Logical analog lines of the sensor front end.
///
/// Which physical input a role is wired to is the firmware's decision; the
/// pipeline only ever names the role.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelRole {
    /// Working electrode of the ozone cell.
    OzoneSignal,
    /// Reference electrode, carries the common-mode drift of the cell.
    Reference,
    /// Analog temperature sensor output.
    Temperature,
}

/// Hardware boundary: one digitized sample from the line bound to a role.
pub trait RawSampler {
    /// Read one raw code in the sampler's native range.
    fn read_raw(&mut self, channel: ChannelRole) -> impl Future<Output = u16>;
}

/// Converts raw sampler codes into bias-corrected voltages.
pub struct AnalogReader<S> {
    sampler: S,
    calibration: AdcCalibration,
}

impl<S: RawSampler> AnalogReader<S> {
    pub fn new(sampler: S, calibration: AdcCalibration) -> Self {
        Self {
            sampler,
            calibration,
        }
    }

    /// Voltage currently present on `channel`.
    pub async fn read_voltage(&mut self, channel: ChannelRole) -> f64 {
        let code = self.sampler.read_raw(channel).await;
        self.calibration.code_to_volts(code)
    }
}

/// Native transfer of the temperature line [°C/V].
const DEGREES_PER_VOLT: f64 = 12.5;
/// Baseline drift appears only above this temperature [°C].
const ZERO_SHIFT_THRESHOLD: f64 = 30.0;
/// Baseline drift per degree above the threshold [ppm/°C].
const ZERO_SHIFT_SLOPE: f64 = 0.0066;
/// Sensitivity drift is referenced to this temperature [°C].
const SPAN_REFERENCE: f64 = 20.0;
/// Sensitivity drift per degree of distance from the reference [1/°C].
const SPAN_SLOPE: f64 = 0.003;
/// Fixed-point scale, applied exactly once after all corrections.
const TRANSPORT_SCALE: f64 = 10.0;

/// Derives calibrated, temperature-corrected measurements from the analog
/// front end.
pub struct OzoneSensor<S> {
    reader: AnalogReader<S>,
    calibration: OzoneCalibration,
}

impl<S: RawSampler> OzoneSensor<S> {
    pub fn new(reader: AnalogReader<S>, calibration: OzoneCalibration) -> Self {
        Self {
            reader,
            calibration,
        }
    }

    /// Run one full acquisition pass.
    ///
    /// Reads all three channels, corrects the concentration with the
    /// unrounded temperature and assembles the transmittable record.
    pub async fn acquire(&mut self) -> Measurement {
        let temperature = self.read_temperature().await;
        let signal = self.read_signal().await;
        let concentration = self.concentration(signal);
        let corrected = self.correct(temperature, concentration) * TRANSPORT_SCALE;

        Measurement {
            temperature: libm::round(temperature) as i16,
            corrected_ozone: corrected,
        }
    }

    /// Temperature in °C, unrounded.
    async fn read_temperature(&mut self) -> f64 {
        let volts = self.reader.read_voltage(ChannelRole::Temperature).await;
        volts * DEGREES_PER_VOLT * self.calibration.temperature_factor
    }

    /// Differential cell voltage; subtracting the reference line cancels
    /// drift common to both electrodes.
    async fn read_signal(&mut self) -> f64 {
        let signal = self.reader.read_voltage(ChannelRole::OzoneSignal).await;
        let reference = self.reader.read_voltage(ChannelRole::Reference).await;
        libm::fabs(signal - reference)
    }

    /// Concentration [ppm] for the cell's response curve.
    fn concentration(&self, signal: f64) -> f64 {
        libm::fabs(signal / self.calibration.response())
    }

    /// Two-part temperature correction followed by the reference-instrument
    /// fit.
    fn correct(&self, temperature: f64, concentration: f64) -> f64 {
        let corrected = (concentration - zero_shift(temperature)) * span_factor(temperature);
        libm::fabs(self.calibration.slope * corrected * self.calibration.intercept)
    }
}

/// Additive baseline correction; exactly zero at and below the threshold.
fn zero_shift(temperature: f64) -> f64 {
    if temperature > ZERO_SHIFT_THRESHOLD {
        (temperature - ZERO_SHIFT_THRESHOLD) * ZERO_SHIFT_SLOPE
    } else {
        0.0
    }
}

/// Multiplicative sensitivity correction around the reference temperature.
fn span_factor(temperature: f64) -> f64 {
    1.0 + (temperature - SPAN_REFERENCE) * SPAN_SLOPE
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    /// 10 mV per code and no bias, so test codes read directly as voltages:
    /// code 165 is 1.65 V.
    const TEST_ADC: AdcCalibration = AdcCalibration::new(3.3, 330, 0.0);

    struct FixedSampler {
        ozone: u16,
        reference: u16,
        temperature: u16,
    }

    impl RawSampler for FixedSampler {
        async fn read_raw(&mut self, channel: ChannelRole) -> u16 {
            match channel {
                ChannelRole::OzoneSignal => self.ozone,
                ChannelRole::Reference => self.reference,
                ChannelRole::Temperature => self.temperature,
            }
        }
    }

    fn sensor(ozone: u16, reference: u16, temperature: u16) -> OzoneSensor<FixedSampler> {
        let sampler = FixedSampler {
            ozone,
            reference,
            temperature,
        };
        OzoneSensor::new(
            AnalogReader::new(sampler, TEST_ADC),
            OzoneCalibration::DEFAULT,
        )
    }

    #[test]
    fn acquire_reproduces_the_reference_scenario() {
        // 1.65 V on the cell, 1.60 V reference, 0.40 V on the temperature
        // line: 6.92 °C, 0.05 V differential, 39.28 ppm x 10 after
        // correction and fit.
        let mut sensor = sensor(165, 160, 40);
        let measurement = block_on(sensor.acquire());

        assert_eq!(measurement.temperature, 7);
        assert!((measurement.corrected_ozone - 39.28).abs() < 0.01);
    }

    #[test]
    fn equal_cell_voltages_measure_exactly_zero() {
        // With no baseline shift below 30 °C the zero signal survives the
        // span factor and the fit untouched.
        let mut sensor = sensor(200, 200, 40);
        let measurement = block_on(sensor.acquire());

        assert_eq!(measurement.corrected_ozone, 0.0);
    }

    #[test]
    fn correction_follows_the_unrounded_temperature() {
        // 1.76 V on the temperature line is 30.43 °C: stored as 30, but the
        // zero shift must see the 0.43 °C above the threshold. Correcting
        // with the rounded 30 °C would give 42.112 instead.
        let mut sensor = sensor(165, 160, 176);
        let measurement = block_on(sensor.acquire());

        assert_eq!(measurement.temperature, 30);
        assert!((measurement.corrected_ozone - 42.12245).abs() < 1e-3);
    }

    #[test]
    fn swapped_cell_lines_measure_the_same_concentration() {
        let mut forward = sensor(165, 160, 40);
        let mut swapped = sensor(160, 165, 40);

        let a = block_on(forward.acquire());
        let b = block_on(swapped.acquire());
        assert_eq!(a, b);
    }

    #[test]
    fn corrected_concentration_is_never_negative() {
        // Zero concentration well above the threshold: the zero shift alone
        // would drive the corrected value below zero.
        let mut sensor = sensor(200, 200, 250);
        let measurement = block_on(sensor.acquire());

        assert!(measurement.corrected_ozone >= 0.0);
    }

    #[test]
    fn zero_shift_is_dead_below_the_threshold() {
        assert_eq!(zero_shift(10.0), 0.0);
        assert_eq!(zero_shift(30.0), 0.0);
        assert!((zero_shift(35.0) - 0.033).abs() < 1e-12);
    }

    #[test]
    fn span_factor_is_unity_at_the_reference_temperature() {
        assert_eq!(span_factor(20.0), 1.0);
        assert!(span_factor(10.0) < 1.0);
        assert!(span_factor(30.0) > 1.0);
    }

    #[test]
    fn out_of_range_codes_are_converted_not_clamped() {
        let sampler = FixedSampler {
            ozone: 660,
            reference: 0,
            temperature: 0,
        };
        let mut reader = AnalogReader::new(sampler, TEST_ADC);

        let volts = block_on(reader.read_voltage(ChannelRole::OzoneSignal));
        assert!((volts - 6.6).abs() < 1e-9);
    }
}
