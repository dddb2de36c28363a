/// A complete reading produced by one acquisition pass.
///
/// Built as a unit by the correction engine and handed unmodified to the
/// beacon transport, which packs both fields into the advertisement. Never
/// updated in place; every pass constructs a fresh value.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Default, Clone, Copy)]
pub struct Measurement {
    /// Ambient temperature [°C], rounded to the nearest degree.
    pub temperature: i16,
    /// Temperature-corrected ozone concentration [ppm], scaled by 10 so one
    /// decimal digit survives the integer transport slot.
    pub corrected_ozone: f64,
}
