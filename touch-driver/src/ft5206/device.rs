use embedded_hal::i2c::{self, Operation, SevenBitAddress};

use crate::error::DeviceError;

device_driver::create_device! {
  device_name: Device,
  dsl: {
    config {
      type RegisterAddressType = u8;
    }
    /// Device mode. 0 is normal operation.
    register DeviceMode {
      const ADDRESS = 0x00;
      const SIZE_BITS = 8;

      value: uint = 0..8,
    },
    /// Number of touch points
    register TdStatus {
      type Access = RO;
      const ADDRESS = 0x02;
      const SIZE_BITS = 8;

      touch_count: uint = 0..4,
    },
    /// One contact record. The event flag sits in the top nibble of the first
    /// byte, with `8` meaning contact. Each axis is 12 bits.
    register TouchPoint {
      type Access = RO;
      type ByteOrder = BE;
      const ADDRESS = 0x03;
      const SIZE_BITS = 32;
      const REPEAT = {
        count: 5,
        stride: 6,
      };

      event: uint = 28..32,
      first: uint = 16..28,
      touch_id: uint = 12..16,
      second: uint = 0..12,
    },
    /// Touch detection threshold. Lower values are more sensitive.
    register ThGroup {
      const ADDRESS = 0x80;
      const SIZE_BITS = 8;

      value: uint = 0..8,
    },
    /// Report period in active mode. Between 12 and 14.
    register PeriodActive {
      const ADDRESS = 0x88;
      const SIZE_BITS = 8;

      value: uint = 0..8,
    },
    /// Firmware library version
    register LibVersion {
      type Access = RO;
      type ByteOrder = BE;
      const ADDRESS = 0xA1;
      const SIZE_BITS = 16;

      value: uint = 0..16,
    },
    /// Interrupt mode. 0 polls, 1 triggers.
    register GMode {
      const ADDRESS = 0xA4;
      const SIZE_BITS = 8;

      value: uint = 0..8,
    },
  }
}

#[derive(Debug)]
pub(crate) struct DeviceInterface<I2C> {
    device_address: SevenBitAddress,
    i2c: I2C,
}

impl<I2C> DeviceInterface<I2C> {
    pub(crate) const fn new(i2c: I2C, device_address: SevenBitAddress) -> Self {
        Self {
            i2c,
            device_address,
        }
    }
}

impl<BUS: i2c::I2c> device_driver::RegisterInterface for DeviceInterface<BUS> {
    type Error = DeviceError<BUS::Error>;

    type AddressType = u8;

    fn write_register(
        &mut self,
        address: Self::AddressType,
        _size_bits: u32,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        self.i2c.transaction(
            self.device_address,
            &mut [Operation::Write(&[address]), Operation::Write(data)],
        )?;
        Ok(())
    }

    fn read_register(
        &mut self,
        address: Self::AddressType,
        _size_bits: u32,
        data: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.i2c.write_read(self.device_address, &[address], data)?;
        Ok(())
    }
}
