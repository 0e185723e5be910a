//! FocalTech FT5206 capacitive controller, also covering the CST340 that
//! ships on the same 7" panels.

use embedded_hal::{delay::DelayNs, digital::OutputPin, i2c::I2c, i2c::SevenBitAddress};

use crate::{
    capacitive::{self, Tracker},
    error::Error,
    PanelInfo, Point, TouchState,
};

pub mod device;
use device::{Device, DeviceInterface};

pub const ADDRESS: SevenBitAddress = 0x38;

pub const MAX_POINTS: usize = 5;

const TOUCH_THRESHOLD: u8 = 22;
const ACTIVE_PERIOD: u8 = 12;
const CONTACT_EVENT: u8 = 0x8;

pub struct Ft5206<I2C, RST> {
    i2c: I2C,
    reset_pin: RST,
    tracker: Tracker,
}

/// Whether `version` is a firmware library the driver knows. `0x0000` is
/// what the CST340 reports.
pub fn is_supported_version(version: u16) -> bool {
    let [_, low] = version.to_be_bytes();
    version == 0x3003 || low == 0x01 || low == 0x02 || version == 0x0000
}

impl<I2C, RST> Ft5206<I2C, RST>
where
    I2C: I2c,
    RST: OutputPin,
{
    pub fn new(i2c: I2C, reset_pin: RST) -> Self {
        Self {
            i2c,
            reset_pin,
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

    pub fn write_registers(&mut self, address: u8, data: &[u8]) -> Result<(), Error> {
        let mut interface = DeviceInterface::new(&mut self.i2c, ADDRESS);
        let bits = (data.len() * 8) as u32;
        device_driver::RegisterInterface::write_register(&mut interface, address, bits, data)
            .map_err(Error::from)
    }

    pub fn read_registers(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Error> {
        let mut interface = DeviceInterface::new(&mut self.i2c, ADDRESS);
        let bits = (buffer.len() * 8) as u32;
        device_driver::RegisterInterface::read_register(&mut interface, address, bits, buffer)
            .map_err(Error::from)
    }

    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error> {
        self.reset_pin.set_low().map_err(Error::pin)?;
        delay.delay_ms(20);
        self.reset_pin.set_high().map_err(Error::pin)?;
        delay.delay_ms(50);
        Ok(())
    }

    /// Resets the chip, configures polled reporting and checks the library
    /// version.
    pub fn init(&mut self, delay: &mut impl DelayNs) -> Result<(), Error> {
        self.tracker = Tracker::new();
        self.reset(delay)?;

        let mut ft = self.device();
        ft.device_mode().write(|reg| reg.set_value(0))?;
        ft.g_mode().write(|reg| reg.set_value(0))?;
        ft.th_group().write(|reg| reg.set_value(TOUCH_THRESHOLD))?;
        ft.period_active().write(|reg| reg.set_value(ACTIVE_PERIOD))?;

        let version = ft.lib_version().read()?.value();
        if !is_supported_version(version) {
            #[cfg(feature = "defmt-03")]
            defmt::warn!("FT5206 probe failed, version {=u16:#x}", version);
            return Err(Error::Probe);
        }

        #[cfg(feature = "defmt-03")]
        defmt::info!("CTP ID: {=u16:x}", version);

        Ok(())
    }

    /// Polls the chip and updates `state`.
    ///
    /// Returns `true` when this call decoded a valid set of contacts. A bus
    /// error leaves `state` as it was.
    pub fn scan(
        &mut self,
        state: &mut TouchState,
        panel: &PanelInfo,
        delay: &mut impl DelayNs,
    ) -> Result<bool, Error> {
        let result = self.poll(state, panel, delay);
        self.tracker.settle();
        result
    }

    fn poll(
        &mut self,
        state: &mut TouchState,
        panel: &PanelInfo,
        delay: &mut impl DelayNs,
    ) -> Result<bool, Error> {
        // A skipped poll reads as zero contacts.
        if !self.tracker.due() {
            capacitive::release(state);
            return Ok(false);
        }

        let count = self.device().td_status().read()?.touch_count() as usize;
        if count == 0 || count > MAX_POINTS {
            if count == 0 {
                capacitive::release(state);
            }
            return Ok(false);
        }

        delay.delay_ms(4);
        let mut contacts = [(0, 0); MAX_POINTS];
        for (slot, contact) in contacts.iter_mut().enumerate().take(count) {
            let record = self.device().touch_point(slot).read()?;
            if record.event() == CONTACT_EVENT {
                *contact = decode(record.first(), record.second(), panel);
            }
        }

        let saved = capacitive::begin(state, count, MAX_POINTS);
        state.points[..count].copy_from_slice(&contacts[..count]);
        let touched = state.points[0] != (0, 0)
            && capacitive::validate(
                state,
                &mut self.tracker,
                count,
                MAX_POINTS,
                saved,
                panel,
            );
        self.tracker.rearm();
        if !touched {
            capacitive::release(state);
        }

        Ok(touched)
    }
}

fn decode(first: u16, second: u16, panel: &PanelInfo) -> Point {
    if panel.landscape {
        (second, first)
    } else {
        (panel.width.wrapping_sub(first), second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NO_TOUCH, PRESSED, PRESS_EDGE};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    const PANEL: PanelInfo = PanelInfo {
        id: 0x1963,
        width: 800,
        height: 480,
        landscape: true,
    };

    fn register_write(register: u8, value: u8) -> Vec<Transaction> {
        vec![
            Transaction::transaction_start(ADDRESS),
            Transaction::write(ADDRESS, vec![register]),
            Transaction::write(ADDRESS, vec![value]),
            Transaction::transaction_end(ADDRESS),
        ]
    }

    fn init_expectations(version: [u8; 2]) -> Vec<Transaction> {
        let mut expectations = Vec::new();
        expectations.extend(register_write(0x00, 0));
        expectations.extend(register_write(0xA4, 0));
        expectations.extend(register_write(0x80, TOUCH_THRESHOLD));
        expectations.extend(register_write(0x88, ACTIVE_PERIOD));
        expectations.push(Transaction::write_read(
            ADDRESS,
            vec![0xA1],
            version.to_vec(),
        ));
        expectations
    }

    fn point_read(slot: u8, event: u8, first: u16, second: u16) -> Transaction {
        let raw = ((event as u32) << 28) | ((first as u32) << 16) | second as u32;
        Transaction::write_read(ADDRESS, vec![0x03 + slot * 6], raw.to_be_bytes().to_vec())
    }

    #[test]
    fn version_whitelist() {
        assert!(is_supported_version(0x3003));
        assert!(is_supported_version(0x0001));
        assert!(is_supported_version(0x1202));
        assert!(is_supported_version(0x0000));
        assert!(!is_supported_version(0x3004));
        assert!(!is_supported_version(0xFFFF));
    }

    #[test]
    fn init_configures_and_probes() {
        let mut i2c = I2cMock::new(&init_expectations([0x30, 0x03]));
        let mut rst = PinMock::new(&[
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High),
        ]);

        let mut ft = Ft5206::new(&mut i2c, &mut rst);
        ft.init(&mut NoopDelay::new()).unwrap();

        i2c.done();
        rst.done();
    }

    #[test]
    fn init_rejects_unknown_version() {
        let mut i2c = I2cMock::new(&init_expectations([0xFF, 0xFF]));
        let mut rst = PinMock::new(&[
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High),
        ]);

        let mut ft = Ft5206::new(&mut i2c, &mut rst);

        assert_eq!(ft.init(&mut NoopDelay::new()), Err(Error::Probe));

        i2c.done();
        rst.done();
    }

    #[test]
    fn raw_register_access() {
        let mut expectations = register_write(0x80, 30);
        expectations.push(Transaction::write_read(ADDRESS, vec![0x80], vec![30]));
        let mut i2c = I2cMock::new(&expectations);
        let mut rst = PinMock::new(&[]);

        let mut ft = Ft5206::new(&mut i2c, &mut rst);
        ft.write_registers(0x80, &[30]).unwrap();
        let mut threshold = [0u8];
        ft.read_registers(0x80, &mut threshold).unwrap();

        assert_eq!(threshold, [30]);

        i2c.done();
        rst.done();
    }

    #[test]
    fn landscape_contacts_swap_axes() {
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(ADDRESS, vec![0x02], vec![0x02]),
            point_read(0, CONTACT_EVENT, 300, 500),
            point_read(1, CONTACT_EVENT, 100, 200),
        ]);
        let mut rst = PinMock::new(&[]);
        let mut state = TouchState::new();

        let mut ft = Ft5206::new(&mut i2c, &mut rst);

        assert_eq!(ft.scan(&mut state, &PANEL, &mut NoopDelay::new()), Ok(true));
        assert_eq!(state.primary(), (500, 300));
        assert_eq!(state.point(1), Some((200, 100)));
        assert_eq!(state.status(), PRESSED | PRESS_EDGE | 0b11);

        i2c.done();
        rst.done();
    }

    #[test]
    fn portrait_contact_mirrors_x() {
        let panel = PanelInfo {
            width: 480,
            height: 800,
            landscape: false,
            ..PANEL
        };
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(ADDRESS, vec![0x02], vec![0x01]),
            point_read(0, CONTACT_EVENT, 80, 600),
        ]);
        let mut rst = PinMock::new(&[]);
        let mut state = TouchState::new();

        let mut ft = Ft5206::new(&mut i2c, &mut rst);

        assert_eq!(ft.scan(&mut state, &panel, &mut NoopDelay::new()), Ok(true));
        assert_eq!(state.primary(), (400, 600));

        i2c.done();
        rst.done();
    }

    #[test]
    fn non_contact_primary_counts_as_release() {
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(ADDRESS, vec![0x02], vec![0x01]),
            point_read(0, 0x4, 300, 500),
        ]);
        let mut rst = PinMock::new(&[]);
        let mut state = TouchState::new();

        let mut ft = Ft5206::new(&mut i2c, &mut rst);

        assert_eq!(ft.scan(&mut state, &PANEL, &mut NoopDelay::new()), Ok(false));
        assert!(!state.is_pressed());
        assert!(state.press_edge());

        i2c.done();
        rst.done();
    }

    #[test]
    fn idle_scans_are_throttled_and_release() {
        let expectations: Vec<_> = (0..11)
            .map(|_| Transaction::write_read(ADDRESS, vec![0x02], vec![0x00]))
            .collect();
        let mut i2c = I2cMock::new(&expectations);
        let mut rst = PinMock::new(&[]);
        let mut state = TouchState::new();

        let mut ft = Ft5206::new(&mut i2c, &mut rst);
        for _ in 0..20 {
            assert_eq!(ft.scan(&mut state, &PANEL, &mut NoopDelay::new()), Ok(false));
        }

        assert_eq!(state.primary(), NO_TOUCH);

        i2c.done();
        rst.done();
    }

    #[test]
    fn bus_error_during_point_read_leaves_state_untouched() {
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(ADDRESS, vec![0x02], vec![0x02]),
            point_read(0, CONTACT_EVENT, 300, 500),
            Transaction::write_read(ADDRESS, vec![0x09], vec![0; 4]).with_error(ErrorKind::Other),
        ]);
        let mut rst = PinMock::new(&[]);
        let mut state = TouchState::new();
        state.points[0] = (40, 50);

        let mut ft = Ft5206::new(&mut i2c, &mut rst);

        assert_eq!(
            ft.scan(&mut state, &PANEL, &mut NoopDelay::new()),
            Err(Error::Bus(ErrorKind::Other))
        );
        assert_eq!(state.status(), 0);
        assert_eq!(state.primary(), (40, 50));
        assert_eq!(state.point(MAX_POINTS - 1), Some((0, 0)));

        i2c.done();
        rst.done();
    }
}
