//! Calibration parameters for the analog front end and the ozone cell.
//!
//! The deployed constants were determined once, against a reference
//! instrument for the cell and from the sampler's measured offset for the
//! front end. They are injected where the pipeline is constructed so a
//! device can carry its own set.

/// Transfer calibration of the analog sampler.
///
/// Maps a raw code in `0..=max_code` onto the supply-referenced voltage
/// range and compensates the sampler's offset error.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug)]
pub struct AdcCalibration {
    /// Voltage corresponding to the highest raw code [V].
    pub full_scale: f64,
    /// Highest code the sampler returns (10-bit by default).
    pub max_code: u16,
    /// Offset error added to every converted voltage [V].
    pub bias: f64,
}

impl AdcCalibration {
    /// Factory calibration of the deployed front end.
    pub const DEFAULT: Self = Self {
        full_scale: 3.3,
        max_code: 1023,
        bias: -0.025,
    };

    pub const fn new(full_scale: f64, max_code: u16, bias: f64) -> Self {
        Self {
            full_scale,
            max_code,
            bias,
        }
    }

    /// Convert a raw sampler code to volts.
    ///
    /// Codes outside `0..=max_code` are converted like any other; the
    /// sampler is trusted to stay in range.
    #[inline]
    pub fn code_to_volts(&self, code: u16) -> f64 {
        code as f64 * self.full_scale / self.max_code as f64 + self.bias
    }
}

impl Default for AdcCalibration {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Per-cell calibration of the electrochemical ozone sensor.
///
/// Sensitivity and gain come from the manufacturer data of the deployed
/// cell, slope and intercept from the reference-instrument comparison of
/// the batch.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug)]
pub struct OzoneCalibration {
    /// Cell sensitivity [nA/ppm].
    pub sensitivity: f64,
    /// Transimpedance gain of the measurement electrode [kV/A].
    pub gain: f64,
    /// Nominal-vs-measured reference mismatch on the temperature line.
    pub temperature_factor: f64,
    /// Slope of the reference-instrument fit.
    pub slope: f64,
    /// Intercept factor of the reference-instrument fit.
    pub intercept: f64,
}

impl OzoneCalibration {
    /// Calibration of the deployed sensor batch.
    pub const DEFAULT: Self = Self {
        sensitivity: -35.35,
        gain: 499.0,
        temperature_factor: 26.10 / 18.87,
        slope: 0.598082,
        intercept: 2.411722,
    };

    /// Cell response [V/ppm]: the divisor turning the differential cell
    /// voltage into a concentration.
    #[inline]
    pub fn response(&self) -> f64 {
        self.sensitivity * self.gain * 1e-6
    }
}

impl Default for OzoneCalibration {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_linearly_onto_the_supply_range() {
        let cal = AdcCalibration::DEFAULT;
        // code 0 carries only the offset error, the top code lands on the
        // supply rail plus the same offset
        assert!((cal.code_to_volts(0) - -0.025).abs() < 1e-9);
        assert!((cal.code_to_volts(1023) - 3.275).abs() < 1e-9);
    }

    #[test]
    fn response_is_the_sensitivity_gain_product() {
        let cal = OzoneCalibration::DEFAULT;
        assert!((cal.response() - -0.01763965).abs() < 1e-12);
    }
}
