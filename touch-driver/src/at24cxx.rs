//! AT24C01 .. AT24C256 serial EEPROMs.
//!
//! Parts up to the 24C16 take a single address byte and carry address bits
//! 8..10 in the low bits of the device address. Larger parts take a two-byte
//! big-endian cell address.

use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};

use crate::storage::ByteStore;

/// Device address with A2..A0 strapped low.
pub const ADDRESS: SevenBitAddress = 0x50;

/// Written to the last cell by [`At24cxx::check`].
pub const CHECK_PATTERN: u8 = 0x55;

/// Internal write cycle time.
const WRITE_CYCLE_MS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Model {
    At24c01,
    At24c02,
    At24c04,
    At24c08,
    At24c16,
    At24c32,
    At24c64,
    At24c128,
    At24c256,
}

impl Model {
    /// Highest cell address.
    pub const fn last_address(self) -> u16 {
        match self {
            Model::At24c01 => 127,
            Model::At24c02 => 255,
            Model::At24c04 => 511,
            Model::At24c08 => 1023,
            Model::At24c16 => 2047,
            Model::At24c32 => 4095,
            Model::At24c64 => 8191,
            Model::At24c128 => 16383,
            Model::At24c256 => 32767,
        }
    }

    const fn wide_address(self) -> bool {
        self.last_address() > Model::At24c16.last_address()
    }
}

pub struct At24cxx<I2C, D> {
    i2c: I2C,
    delay: D,
    model: Model,
}

impl<I2C, D> At24cxx<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D, model: Model) -> Self {
        Self { i2c, delay, model }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// Device address and cell address bytes for `address`.
    fn locate(&self, address: u16) -> (SevenBitAddress, [u8; 2], usize) {
        let [high, low] = address.to_be_bytes();
        if self.model.wide_address() {
            (ADDRESS, [high, low], 2)
        } else {
            (ADDRESS | (high & 0x07), [low, 0], 1)
        }
    }

    pub fn read_byte(&mut self, address: u16) -> Result<u8, I2C::Error> {
        let (device, cell, len) = self.locate(address);
        let mut data = [0u8];
        self.i2c.write_read(device, &cell[..len], &mut data)?;
        Ok(data[0])
    }

    /// Writes one cell and waits out the write cycle.
    pub fn write_byte(&mut self, address: u16, data: u8) -> Result<(), I2C::Error> {
        let (device, cell, len) = self.locate(address);
        let mut frame = [0u8; 3];
        frame[..len].copy_from_slice(&cell[..len]);
        frame[len] = data;
        self.i2c.write(device, &frame[..=len])?;
        self.delay.delay_ms(WRITE_CYCLE_MS);
        Ok(())
    }

    pub fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), I2C::Error> {
        for (offset, byte) in buffer.iter_mut().enumerate() {
            *byte = self.read_byte(address.wrapping_add(offset as u16))?;
        }
        Ok(())
    }

    pub fn write(&mut self, address: u16, data: &[u8]) -> Result<(), I2C::Error> {
        for (offset, &byte) in data.iter().enumerate() {
            self.write_byte(address.wrapping_add(offset as u16), byte)?;
        }
        Ok(())
    }

    /// Checks that the chip answers and holds data.
    ///
    /// The last cell carries [`CHECK_PATTERN`]. On a fresh chip it is written
    /// once and read back, so routine boots never wear the cell.
    pub fn check(&mut self) -> Result<bool, I2C::Error> {
        let last = self.model.last_address();
        if self.read_byte(last)? == CHECK_PATTERN {
            return Ok(true);
        }

        self.write_byte(last, CHECK_PATTERN)?;
        let ok = self.read_byte(last)? == CHECK_PATTERN;

        if !ok {
            #[cfg(feature = "defmt-03")]
            defmt::warn!("EEPROM check failed");
        }

        Ok(ok)
    }
}

impl<I2C, D> ByteStore for At24cxx<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    type Error = I2C::Error;

    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), Self::Error> {
        At24cxx::read(self, address, buffer)
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error> {
        At24cxx::write(self, address, data)
    }
}
