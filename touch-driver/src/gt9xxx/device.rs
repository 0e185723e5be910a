use embedded_hal::i2c::{self, Operation, SevenBitAddress};

use crate::error::DeviceError;

device_driver::create_device! {
  device_name: Device,
  dsl: {
    config {
      type RegisterAddressType = u16;
    }
    /// Command register. Write `0x02` for a soft reset and `0x00` to go back
    /// to coordinate reporting.
    register Control {
      const ADDRESS = 0x8040;
      const SIZE_BITS = 8;

      value: uint = 0..8,
    },
    /// Product ID as four ASCII bytes, NUL padded: "911", "9147", ...
    register ProductId {
      type Access = RO;
      type ByteOrder = LE;
      const ADDRESS = 0x8140;
      const SIZE_BITS = 32;

      value: uint = 0..32,
    },
    /// Coordinate report status. The host writes 0 after consuming a report.
    register Status {
      const ADDRESS = 0x814E;
      const SIZE_BITS = 8;

      /// Coordinates are ready to be read
      buffer_ready: bool = 7,
      large_detect: bool = 6,
      proximity_valid: bool = 5,
      have_key: bool = 4,
      /// Number of contacts in the report
      touch_count: uint = 0..4,
    },
    /// One contact record: X then Y, little endian. The chip keeps a track ID
    /// in the byte before each record and a size word after it; neither is
    /// read.
    register TouchPoint {
      type Access = RO;
      type ByteOrder = LE;
      const ADDRESS = 0x8150;
      const SIZE_BITS = 32;
      const REPEAT = {
        count: 10,
        stride: 8,
      };

      first: uint = 0..16,
      second: uint = 16..32,
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

    type AddressType = u16;

    fn write_register(
        &mut self,
        address: Self::AddressType,
        _size_bits: u32,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        self.i2c.transaction(
            self.device_address,
            &mut [
                Operation::Write(&address.to_be_bytes()),
                Operation::Write(data),
            ],
        )?;
        Ok(())
    }

    fn read_register(
        &mut self,
        address: Self::AddressType,
        _size_bits: u32,
        data: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.i2c
            .write_read(self.device_address, &address.to_be_bytes(), data)?;
        Ok(())
    }
}
