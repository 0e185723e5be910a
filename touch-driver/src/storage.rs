//! Persistence of resistive calibration parameters in a byte-addressable
//! store.
//!
//! The record is 13 bytes at [`CALIBRATION_BASE`]: both scale factors as
//! little-endian `f32`, both centers as little-endian `i16`, then
//! [`MARKER`]. A record without the marker is treated as absent.

use core::fmt::Debug;

use crate::Calibration;

pub const CALIBRATION_BASE: u16 = 40;
pub const MARKER: u8 = 0x0A;
pub const RECORD_LEN: usize = 13;

const PARAMS_LEN: usize = RECORD_LEN - 1;

/// Non-volatile memory addressed by byte.
pub trait ByteStore {
    type Error: Debug;

    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), Self::Error>;

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error>;
}

impl<T: ByteStore + ?Sized> ByteStore for &mut T {
    type Error = T::Error;

    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), Self::Error> {
        T::read(self, address, buffer)
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error> {
        T::write(self, address, data)
    }
}

fn encode(calibration: &Calibration) -> [u8; PARAMS_LEN] {
    let mut bytes = [0u8; PARAMS_LEN];
    bytes[0..4].copy_from_slice(&calibration.x_scale.to_le_bytes());
    bytes[4..8].copy_from_slice(&calibration.y_scale.to_le_bytes());
    bytes[8..10].copy_from_slice(&calibration.x_center.to_le_bytes());
    bytes[10..12].copy_from_slice(&calibration.y_center.to_le_bytes());
    bytes
}

fn decode(bytes: &[u8; PARAMS_LEN]) -> Calibration {
    let [a, b, c, d, e, f, g, h, i, j, k, l] = *bytes;
    Calibration {
        x_scale: f32::from_le_bytes([a, b, c, d]),
        y_scale: f32::from_le_bytes([e, f, g, h]),
        x_center: i16::from_le_bytes([i, j]),
        y_center: i16::from_le_bytes([k, l]),
    }
}

/// Reads and writes the calibration record.
#[derive(Debug)]
pub struct CalibrationStore<S> {
    store: S,
}

impl<S: ByteStore> CalibrationStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn release(self) -> S {
        self.store
    }

    /// Writes the parameters, then the marker.
    pub fn save(&mut self, calibration: &Calibration) -> Result<(), S::Error> {
        self.store.write(CALIBRATION_BASE, &encode(calibration))?;
        self.store
            .write(CALIBRATION_BASE + PARAMS_LEN as u16, &[MARKER])
    }

    /// Returns the stored parameters, or `None` if the marker is missing.
    pub fn load(&mut self) -> Result<Option<Calibration>, S::Error> {
        let mut record = [0u8; RECORD_LEN];
        self.store.read(CALIBRATION_BASE, &mut record)?;

        if record[PARAMS_LEN] != MARKER {
            return Ok(None);
        }

        let mut params = [0u8; PARAMS_LEN];
        params.copy_from_slice(&record[..PARAMS_LEN]);
        Ok(Some(decode(&params)))
    }
}
