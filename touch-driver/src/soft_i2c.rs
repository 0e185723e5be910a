//! Bit-banged two-wire bus.
//!
//! Both lines are open-drain with pull-ups: writing a `1` releases the line,
//! so SDA can be sampled without switching its direction. Every transition is
//! followed by a [`BIT_DELAY_US`] settling delay, giving a clock well below
//! 100 kHz.
//!
//! The board carries two of these buses, one for the capacitive touch
//! controller and one for the EEPROM. Each is a separate [`SoftI2c`] with its
//! own pins; they share no state.

use embedded_hal::{
    delay::DelayNs,
    digital::{self, InputPin, OutputPin, PinState},
    i2c::{self, ErrorKind, NoAcknowledgeSource, Operation, SevenBitAddress},
};

/// Settling delay after every line transition.
pub const BIT_DELAY_US: u32 = 2;

/// Number of delays spent waiting for a slave to pull SDA low before the
/// transfer is abandoned. Bounds a hung peripheral to roughly 1 ms per byte.
pub const ACK_POLL_LIMIT: u16 = 250;

/// Bit-banged bus errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error<E> {
    /// A GPIO operation failed.
    Pin(E),
    /// No acknowledge within [`ACK_POLL_LIMIT`] polls. A stop condition has
    /// already been sent.
    Nack,
}

impl<E> From<E> for Error<E> {
    fn from(value: E) -> Self {
        Self::Pin(value)
    }
}

impl<E: core::fmt::Debug> i2c::Error for Error<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Pin(_) => ErrorKind::Other,
            Error::Nack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
        }
    }
}

/// Software two-wire master on a pair of open-drain GPIOs.
#[derive(Debug)]
pub struct SoftI2c<SCL, SDA, D> {
    scl: SCL,
    sda: SDA,
    delay: D,
}

impl<SCL, SDA, D, E> SoftI2c<SCL, SDA, D>
where
    SCL: OutputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    D: DelayNs,
{
    pub fn new(scl: SCL, sda: SDA, delay: D) -> Self {
        Self { scl, sda, delay }
    }

    /// Releases both lines so every device on the bus goes idle.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        self.stop()
    }

    /// Hands back the pins and the delay.
    pub fn release(self) -> (SCL, SDA, D) {
        (self.scl, self.sda, self.delay)
    }

    fn settle(&mut self) {
        self.delay.delay_us(BIT_DELAY_US);
    }

    /// START: SDA falls while SCL is high, then SCL is held low.
    pub fn start(&mut self) -> Result<(), Error<E>> {
        self.sda.set_high()?;
        self.scl.set_high()?;
        self.settle();
        self.sda.set_low()?;
        self.settle();
        self.scl.set_low()?;
        self.settle();
        Ok(())
    }

    /// STOP: SDA rises while SCL is high.
    pub fn stop(&mut self) -> Result<(), Error<E>> {
        self.sda.set_low()?;
        self.settle();
        self.scl.set_high()?;
        self.settle();
        self.sda.set_high()?;
        self.settle();
        Ok(())
    }

    /// Releases SDA, raises SCL and waits for the slave to pull SDA low.
    ///
    /// The line is sampled once more than it is waited on: after
    /// [`ACK_POLL_LIMIT`] delays the next high sample sends a stop condition
    /// and reports [`Error::Nack`].
    pub fn wait_ack(&mut self) -> Result<(), Error<E>> {
        let mut polls: u16 = 0;
        let mut acked = true;

        self.sda.set_high()?;
        self.settle();
        self.scl.set_high()?;
        self.settle();

        while self.sda.is_high()? {
            polls += 1;
            if polls > ACK_POLL_LIMIT {
                self.stop()?;
                acked = false;
                break;
            }
            self.settle();
        }

        self.scl.set_low()?;
        self.settle();

        if acked {
            Ok(())
        } else {
            Err(Error::Nack)
        }
    }

    /// Drives SDA low across one clock.
    pub fn ack(&mut self) -> Result<(), Error<E>> {
        self.sda.set_low()?;
        self.settle();
        self.scl.set_high()?;
        self.settle();
        self.scl.set_low()?;
        self.settle();
        self.sda.set_high()?;
        self.settle();
        Ok(())
    }

    /// Leaves SDA high across one clock.
    pub fn nack(&mut self) -> Result<(), Error<E>> {
        self.sda.set_high()?;
        self.settle();
        self.scl.set_high()?;
        self.settle();
        self.scl.set_low()?;
        self.settle();
        Ok(())
    }

    /// Clocks out `data` MSB first and releases SDA afterwards. The caller
    /// collects the acknowledge with [`wait_ack`](Self::wait_ack).
    pub fn write_byte(&mut self, mut data: u8) -> Result<(), Error<E>> {
        for _ in 0..8 {
            self.sda.set_state(PinState::from(data & 0x80 != 0))?;
            self.settle();
            self.scl.set_high()?;
            self.settle();
            self.scl.set_low()?;
            data <<= 1;
        }
        self.sda.set_high()?;
        Ok(())
    }

    /// Clocks in one byte MSB first, sampling while SCL is high, then answers
    /// with an ACK (more bytes wanted) or a NACK (last byte).
    pub fn read_byte(&mut self, ack: bool) -> Result<u8, Error<E>> {
        let mut received = 0u8;
        for _ in 0..8 {
            received <<= 1;
            self.scl.set_high()?;
            self.settle();
            if self.sda.is_high()? {
                received |= 1;
            }
            self.scl.set_low()?;
            self.settle();
        }

        if ack {
            self.ack()?;
        } else {
            self.nack()?;
        }
        Ok(received)
    }

    fn address(&mut self, address: SevenBitAddress, read: bool) -> Result<(), Error<E>> {
        self.start()?;
        self.write_byte((address << 1) | read as u8)?;
        self.wait_ack()
    }
}

impl<SCL, SDA, D, E> i2c::ErrorType for SoftI2c<SCL, SDA, D>
where
    SCL: OutputPin<Error = E>,
    E: digital::Error,
{
    type Error = Error<E>;
}

impl<SCL, SDA, D, E> i2c::I2c for SoftI2c<SCL, SDA, D>
where
    SCL: OutputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    D: DelayNs,
    E: digital::Error,
{
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut reading: Option<bool> = None;

        for index in 0..operations.len() {
            let next_is_read = matches!(operations.get(index + 1), Some(Operation::Read(_)));

            match &mut operations[index] {
                Operation::Write(bytes) => {
                    if reading != Some(false) {
                        self.address(address, false)?;
                        reading = Some(false);
                    }
                    for &byte in bytes.iter() {
                        self.write_byte(byte)?;
                        self.wait_ack()?;
                    }
                }
                Operation::Read(buffer) => {
                    if reading != Some(true) {
                        self.address(address, true)?;
                        reading = Some(true);
                    }
                    let last = buffer.len().saturating_sub(1);
                    for (i, byte) in buffer.iter_mut().enumerate() {
                        *byte = self.read_byte(i < last || next_is_read)?;
                    }
                }
            }
        }

        self.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::I2c;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};
    use std::{cell::RefCell, collections::VecDeque, convert::Infallible, rc::Rc};

    #[derive(Debug, Default, PartialEq)]
    enum Phase {
        #[default]
        Idle,
        Receive,
        ReceiveAck,
        Transmit,
        TransmitAck,
    }

    /// A slave device that follows the clock edges it sees on the wire.
    #[derive(Debug, Default)]
    struct Slave {
        acks: bool,
        phase: Phase,
        bits: u8,
        shift: u8,
        expect_address: bool,
        reading: bool,
        master_acked: bool,
        outgoing: u8,
        received: Vec<u8>,
        responses: VecDeque<u8>,
        starts: usize,
        stops: usize,
    }

    impl Slave {
        fn on_start(&mut self) {
            self.starts += 1;
            self.phase = Phase::Receive;
            self.bits = 0;
            self.shift = 0;
            self.expect_address = true;
            self.reading = false;
        }

        fn on_stop(&mut self) {
            self.stops += 1;
            self.phase = Phase::Idle;
        }

        fn on_rise(&mut self, line: bool) {
            match self.phase {
                Phase::Receive => {
                    self.shift = (self.shift << 1) | line as u8;
                    self.bits += 1;
                }
                Phase::Transmit => self.bits += 1,
                Phase::TransmitAck => self.master_acked = !line,
                Phase::Idle | Phase::ReceiveAck => {}
            }
        }

        fn drive(&self) -> bool {
            (self.outgoing >> (7 - self.bits)) & 1 == 0
        }

        fn load(&mut self) -> bool {
            self.outgoing = self.responses.pop_front().unwrap_or(0xFF);
            self.bits = 0;
            self.phase = Phase::Transmit;
            self.drive()
        }

        /// Returns whether the slave pulls SDA low for the next bit.
        fn on_fall(&mut self) -> bool {
            match self.phase {
                Phase::Receive if self.bits == 8 => {
                    self.received.push(self.shift);
                    if self.expect_address {
                        self.expect_address = false;
                        self.reading = self.shift & 1 == 1;
                    }
                    self.phase = Phase::ReceiveAck;
                    self.acks
                }
                Phase::ReceiveAck => {
                    self.bits = 0;
                    self.shift = 0;
                    if self.reading {
                        self.load()
                    } else {
                        self.phase = Phase::Receive;
                        false
                    }
                }
                Phase::Transmit if self.bits == 8 => {
                    self.phase = Phase::TransmitAck;
                    false
                }
                Phase::Transmit => self.drive(),
                Phase::TransmitAck if self.master_acked => self.load(),
                Phase::TransmitAck => {
                    self.phase = Phase::Idle;
                    false
                }
                Phase::Receive | Phase::Idle => false,
            }
        }
    }

    #[derive(Debug)]
    struct Wire {
        scl: bool,
        sda: bool,
        pulled: bool,
        samples: usize,
        slave: Slave,
    }

    impl Wire {
        fn line(&self) -> bool {
            self.sda && !self.pulled
        }

        fn set_scl(&mut self, high: bool) {
            if high == self.scl {
                return;
            }
            self.scl = high;
            if high {
                let line = self.line();
                self.slave.on_rise(line);
            } else {
                self.pulled = self.slave.on_fall();
            }
        }

        fn set_sda(&mut self, high: bool) {
            let before = self.line();
            self.sda = high;
            let after = self.line();
            if self.scl && before && !after {
                self.slave.on_start();
            } else if self.scl && !before && after {
                self.slave.on_stop();
            }
        }
    }

    type Shared = Rc<RefCell<Wire>>;

    struct Scl(Shared);
    struct Sda(Shared);

    impl digital::ErrorType for Scl {
        type Error = Infallible;
    }

    impl digital::ErrorType for Sda {
        type Error = Infallible;
    }

    impl OutputPin for Scl {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().set_scl(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().set_scl(true);
            Ok(())
        }
    }

    impl OutputPin for Sda {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().set_sda(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().set_sda(true);
            Ok(())
        }
    }

    impl InputPin for Sda {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            let mut wire = self.0.borrow_mut();
            wire.samples += 1;
            Ok(wire.line())
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|high| !high)
        }
    }

    fn bus(slave: Slave) -> (SoftI2c<Scl, Sda, NoopDelay>, Shared) {
        let wire = Rc::new(RefCell::new(Wire {
            scl: true,
            sda: true,
            pulled: false,
            samples: 0,
            slave,
        }));
        let i2c = SoftI2c::new(Scl(wire.clone()), Sda(wire.clone()), NoopDelay::new());
        (i2c, wire)
    }

    fn acking() -> Slave {
        Slave {
            acks: true,
            ..Slave::default()
        }
    }

    #[test]
    fn start_and_stop_sequences() {
        let mut scl = PinMock::new(&[
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High),
        ]);
        let mut sda = PinMock::new(&[
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High),
        ]);

        let mut i2c = SoftI2c::new(&mut scl, &mut sda, NoopDelay::new());
        i2c.start().unwrap();
        i2c.stop().unwrap();

        scl.done();
        sda.done();
    }

    #[test]
    fn every_byte_is_acknowledged_by_a_listening_slave() {
        for byte in 0..=255u8 {
            let (mut i2c, wire) = bus(acking());

            i2c.start().unwrap();
            i2c.write_byte(byte).unwrap();
            assert_eq!(i2c.wait_ack(), Ok(()));

            assert_eq!(wire.borrow().slave.received, vec![byte]);
        }
    }

    #[test]
    fn silent_slave_times_out_after_bounded_polls() {
        let (mut i2c, wire) = bus(Slave::default());

        i2c.start().unwrap();
        i2c.write_byte(0x28).unwrap();
        assert_eq!(i2c.wait_ack(), Err(Error::Nack));

        let wire = wire.borrow();
        assert_eq!(wire.samples, ACK_POLL_LIMIT as usize + 1);
        assert_eq!(wire.slave.stops, 1);
    }

    #[test]
    fn read_byte_acks_all_but_the_last() {
        let (mut i2c, wire) = bus(Slave {
            responses: VecDeque::from(vec![0xA5, 0x3C]),
            ..acking()
        });

        i2c.start().unwrap();
        i2c.write_byte(0x29).unwrap();
        i2c.wait_ack().unwrap();
        assert_eq!(i2c.read_byte(true), Ok(0xA5));
        assert_eq!(i2c.read_byte(false), Ok(0x3C));
        i2c.stop().unwrap();

        let wire = wire.borrow();
        assert_eq!(wire.slave.phase, Phase::Idle);
        assert!(wire.slave.responses.is_empty());
    }

    #[test]
    fn write_read_uses_a_repeated_start() {
        let (mut i2c, wire) = bus(Slave {
            responses: VecDeque::from(vec![b'9', b'1', b'1', 0]),
            ..acking()
        });

        let mut id = [0u8; 4];
        i2c.write_read(0x14, &[0x81, 0x40], &mut id).unwrap();

        assert_eq!(&id, b"911\0");
        let wire = wire.borrow();
        assert_eq!(wire.slave.received, vec![0x28, 0x81, 0x40, 0x29]);
        assert_eq!(wire.slave.starts, 2);
        assert_eq!(wire.slave.stops, 1);
    }

    #[test]
    fn transaction_aborts_on_missing_device() {
        let (mut i2c, wire) = bus(Slave::default());

        let result = i2c.write(0x38, &[0x00, 0x00]);

        assert_eq!(result, Err(Error::Nack));
        assert_eq!(wire.borrow().slave.received, vec![0x70]);
    }
}
