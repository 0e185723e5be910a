//! Goodix GT911 / GT9147 / GT1158 / GT9271 capacitive controllers.
//!
//! Registers are 16-bit addresses sent big-endian, and the chip answers at
//! 7-bit address `0x14` once reset has been released with INT low.

use embedded_hal::{delay::DelayNs, digital::OutputPin, i2c::I2c, i2c::SevenBitAddress};

use crate::{
    capacitive::{self, Tracker},
    error::Error,
    PanelInfo, Point, TouchState,
};

pub mod device;
use device::{Device, DeviceInterface};

pub const ADDRESS: SevenBitAddress = 0x14;

/// Contacts tracked unless the chip identifies as a GT9271.
pub const DEFAULT_POINTS: usize = 5;
pub const GT9271_POINTS: usize = 10;

const ACCEPTED_IDS: [&[u8]; 4] = [b"911", b"9147", b"1158", b"9271"];
const TEN_POINT_ID: &[u8] = b"9271";

/// Displays whose touch glass is mounted rotated against the usual layout.
const ROTATED_GLASS_PANELS: [u16; 3] = [0x5510, 0x9806, 0x7796];

const SOFT_RESET: u8 = 0x02;
const RUN: u8 = 0x00;

pub struct Gt9xxx<I2C, RST> {
    i2c: I2C,
    reset_pin: RST,
    capacity: usize,
    tracker: Tracker,
}

impl<I2C, RST> Gt9xxx<I2C, RST>
where
    I2C: I2c,
    RST: OutputPin,
{
    pub fn new(i2c: I2C, reset_pin: RST) -> Self {
        Self {
            i2c,
            reset_pin,
            capacity: DEFAULT_POINTS,
            tracker: Tracker::new(),
        }
    }

    fn device(&mut self) -> Device<DeviceInterface<&mut I2C>> {
        Device::new(DeviceInterface::new(&mut self.i2c, ADDRESS))
    }

    /// Hands back the bus and the reset pin.
    pub fn release(self) -> (I2C, RST) {
        (self.i2c, self.reset_pin)
    }

    /// Number of simultaneous contacts this chip reports.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Writes `data` starting at register `address`.
    pub fn write_registers(&mut self, address: u16, data: &[u8]) -> Result<(), Error> {
        let mut interface = DeviceInterface::new(&mut self.i2c, ADDRESS);
        device_driver::RegisterInterface::write_register(
            &mut interface,
            address,
            (data.len() * 8) as u32,
            data,
        )
        .map_err(Error::from)
    }

    /// Reads `buffer.len()` bytes starting at register `address`.
    pub fn read_registers(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), Error> {
        let mut interface = DeviceInterface::new(&mut self.i2c, ADDRESS);
        let bits = (buffer.len() * 8) as u32;
        device_driver::RegisterInterface::read_register(&mut interface, address, bits, buffer)
            .map_err(Error::from)
    }

    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error> {
        self.reset_pin.set_low().map_err(Error::pin)?;
        delay.delay_ms(10);
        self.reset_pin.set_high().map_err(Error::pin)?;
        delay.delay_ms(10);
        Ok(())
    }

    /// Raw product ID bytes.
    pub fn product_id(&mut self) -> Result<[u8; 4], Error> {
        let id = self.device().product_id().read()?.value();
        Ok(id.to_le_bytes())
    }

    /// Resets the chip, checks its product ID and starts coordinate reporting.
    ///
    /// Returns [`Error::Probe`] for an unknown ID. Nothing is written to the
    /// chip in that case.
    pub fn init(&mut self, delay: &mut impl DelayNs) -> Result<(), Error> {
        self.capacity = DEFAULT_POINTS;
        self.tracker = Tracker::new();

        self.reset(delay)?;
        delay.delay_ms(100);

        let raw = self.product_id()?;
        let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let id = &raw[..len];

        if !ACCEPTED_IDS.contains(&id) {
            #[cfg(feature = "defmt-03")]
            defmt::warn!("GT9xxx probe failed, ID {=[u8]:x}", &raw[..]);
            return Err(Error::Probe);
        }

        #[cfg(feature = "defmt-03")]
        defmt::info!("CTP ID: {=[u8]:a}", id);

        if id == TEN_POINT_ID {
            self.capacity = GT9271_POINTS;
        }

        self.device().control().write(|reg| reg.set_value(SOFT_RESET))?;
        delay.delay_ms(10);
        self.device().control().write(|reg| reg.set_value(RUN))?;

        Ok(())
    }

    /// Polls the chip and updates `state`.
    ///
    /// Returns `true` when this call decoded a valid set of contacts. A bus
    /// error leaves `state` as it was.
    pub fn scan(&mut self, state: &mut TouchState, panel: &PanelInfo) -> Result<bool, Error> {
        let result = self.poll(state, panel);
        self.tracker.settle();
        result
    }

    fn poll(&mut self, state: &mut TouchState, panel: &PanelInfo) -> Result<bool, Error> {
        if !self.tracker.due() {
            return Ok(false);
        }

        let status = self.device().status().read()?;
        let count = status.touch_count() as usize;
        let ready = status.buffer_ready();

        if ready && count <= self.capacity {
            self.device().status().write(|reg| reg.set_touch_count(0))?;
        }

        if count == 0 || count > self.capacity {
            if ready && count == 0 {
                capacitive::release(state);
            }
            return Ok(false);
        }

        let mut contacts = [(0, 0); GT9271_POINTS];
        for (slot, contact) in contacts.iter_mut().enumerate().take(count) {
            let record = self.device().touch_point(slot).read()?;
            *contact = decode(record.first(), record.second(), panel);
        }

        let saved = capacitive::begin(state, count, self.capacity);
        state.points[..count].copy_from_slice(&contacts[..count]);
        let touched = capacitive::validate(
            state,
            &mut self.tracker,
            count,
            self.capacity,
            saved,
            panel,
        );
        if !touched {
            capacitive::release(state);
        }

        Ok(touched)
    }
}

/// Maps one contact record to screen coordinates.
fn decode(first: u16, second: u16, panel: &PanelInfo) -> Point {
    let rotated = ROTATED_GLASS_PANELS.contains(&panel.id);
    if rotated == panel.landscape {
        (panel.width.wrapping_sub(second), first)
    } else {
        (first, second)
    }
}
