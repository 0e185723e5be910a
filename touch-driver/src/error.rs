//! Error definitions for the touch drivers.

use embedded_hal::{digital, i2c};

/// Errors reported by the touch drivers and the dispatcher.
///
/// Hardware errors are reduced to their `embedded-hal` error kinds so that a
/// single error type can cover the capacitive bus, the resistive ADC lines and
/// the reset pins at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    /// The controller did not acknowledge, or the bus itself failed.
    Bus(i2c::ErrorKind),
    /// A reset, pen or ADC line could not be driven or sampled.
    Pin(digital::ErrorKind),
    /// The controller answered with an ID outside the accepted set.
    Probe,
    /// Calibration parameters could not be written to the byte store.
    Storage,
    /// Drawing the calibration targets failed.
    Display,
    /// Calibration was requested for a panel that reports screen coordinates.
    Unsupported,
    /// None of the candidate controllers for this display answered.
    NoController,
}

impl Error {
    pub(crate) fn bus<E: i2c::Error>(error: E) -> Self {
        Self::Bus(error.kind())
    }

    pub(crate) fn pin<E: digital::Error>(error: E) -> Self {
        Self::Pin(error.kind())
    }
}

/// Low level interface error that wraps the I2C error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct DeviceError<I2c>(pub I2c);

impl<I2c> From<I2c> for DeviceError<I2c> {
    fn from(value: I2c) -> Self {
        Self(value)
    }
}

impl<E: i2c::Error> From<DeviceError<E>> for Error {
    fn from(value: DeviceError<E>) -> Self {
        Self::bus(value.0)
    }
}
