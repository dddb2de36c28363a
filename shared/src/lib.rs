#![cfg_attr(not(test), no_std)]

//! Hardware-independent half of the ozone beacon node: the measurement
//! entity, calibration parameters, the acquisition/correction pipeline and
//! the advertising payload encoding. Everything here is unit-tested on the
//! host; the firmware crate only contributes the SAADC binding and the
//! radio.

pub mod beacon;
pub mod calibration;
pub mod measurement;
pub mod sensing;

pub use calibration::{AdcCalibration, OzoneCalibration};
pub use measurement::Measurement;
pub use sensing::{AnalogReader, ChannelRole, OzoneSensor, RawSampler};
