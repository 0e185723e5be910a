//! Resistive panels read through an ADS7846 / XPT2046 style ADC.
//!
//! Every axis reading is the trimmed mean of [`SAMPLE_COUNT`] conversions,
//! and a position is only accepted when two full readings agree within
//! [`ERR_RANGE`].

use embedded_hal::digital::{self, InputPin};

use crate::{
    error::Error, PanelInfo, Point, ScanMode, TouchState, FIRST_PRESS_SLOT, NO_TOUCH, PRESSED,
    PRESS_EDGE,
};

pub mod adc;
pub mod calibration;

pub use adc::AdcBus;
pub use calibration::Calibration;

/// Command converting the X plate, 12 bit, differential.
pub const READ_X: u8 = 0xD0;
/// Command converting the Y plate.
pub const READ_Y: u8 = 0x90;

pub const SAMPLE_COUNT: usize = 5;
/// Samples dropped at each end after sorting.
pub const TRIM_COUNT: usize = 1;
/// Largest difference between two readings that still counts as agreement,
/// exclusive.
pub const ERR_RANGE: u16 = 50;

const _: () = assert!(SAMPLE_COUNT > 2 * TRIM_COUNT);

/// One touch ADC conversion.
pub trait Adc {
    type Error: digital::Error;

    /// Sends `command` and returns the 12-bit result.
    fn convert(&mut self, command: u8) -> Result<u16, Self::Error>;
}

impl<T: Adc + ?Sized> Adc for &mut T {
    type Error = T::Error;

    fn convert(&mut self, command: u8) -> Result<u16, Self::Error> {
        T::convert(self, command)
    }
}

/// Trimmed mean: sort, drop [`TRIM_COUNT`] from each end, average the rest.
pub fn filter(mut samples: [u16; SAMPLE_COUNT]) -> u16 {
    samples.sort_unstable();
    let kept = &samples[TRIM_COUNT..SAMPLE_COUNT - TRIM_COUNT];
    let sum: u32 = kept.iter().map(|&s| s as u32).sum();
    (sum / kept.len() as u32) as u16
}

/// Midpoint of two readings, if they lie within [`ERR_RANGE`] on both axes.
pub fn agree(first: Point, second: Point) -> Option<Point> {
    if first.0.abs_diff(second.0) < ERR_RANGE && first.1.abs_diff(second.1) < ERR_RANGE {
        let mid = |a: u16, b: u16| ((a as u32 + b as u32) / 2) as u16;
        Some((mid(first.0, second.0), mid(first.1, second.1)))
    } else {
        None
    }
}

pub struct Resistive<ADC, PEN> {
    adc: ADC,
    pen: PEN,
}

impl<ADC, PEN> Resistive<ADC, PEN>
where
    ADC: Adc,
    PEN: InputPin,
{
    /// `pen` is the active-low pen interrupt line.
    pub fn new(adc: ADC, pen: PEN) -> Self {
        Self { adc, pen }
    }

    pub fn release(self) -> (ADC, PEN) {
        (self.adc, self.pen)
    }

    pub fn read_axis(&mut self, command: u8) -> Result<u16, Error> {
        let mut samples = [0u16; SAMPLE_COUNT];
        for sample in samples.iter_mut() {
            *sample = self.adc.convert(command).map_err(Error::pin)?;
        }
        Ok(filter(samples))
    }

    /// Filtered ADC pair. In landscape the plates are read the other way
    /// round so that the pair follows the screen axes.
    pub fn read_raw(&mut self, landscape: bool) -> Result<Point, Error> {
        let (x_command, y_command) = if landscape {
            (READ_Y, READ_X)
        } else {
            (READ_X, READ_Y)
        };
        let x = self.read_axis(x_command)?;
        let y = self.read_axis(y_command)?;
        Ok((x, y))
    }

    /// Two filtered readings, accepted only if they agree.
    pub fn read_xy(&mut self, landscape: bool) -> Result<Option<Point>, Error> {
        let first = self.read_raw(landscape)?;
        let second = self.read_raw(landscape)?;
        Ok(agree(first, second))
    }

    /// Throw-away conversion that wakes the ADC after power up.
    pub fn prime(&mut self, landscape: bool) -> Result<Point, Error> {
        self.read_raw(landscape)
    }

    pub fn is_touched(&mut self) -> Result<bool, Error> {
        self.pen.is_low().map_err(Error::pin)
    }

    /// Samples the panel and updates slot 0 and the press flags.
    ///
    /// A reading whose two halves disagree leaves slot 0 unchanged. Returns
    /// whether the pen is down.
    pub fn scan(
        &mut self,
        state: &mut TouchState,
        mode: ScanMode,
        panel: &PanelInfo,
    ) -> Result<bool, Error> {
        if self.is_touched()? {
            if let Some(raw) = self.read_xy(panel.landscape)? {
                state.points[0] = match (mode, state.calibration) {
                    (ScanMode::Screen, Some(calibration)) => {
                        calibration.to_screen(raw, panel.width, panel.height)
                    }
                    _ => raw,
                };
            }

            if state.status & PRESSED == 0 {
                state.status = PRESSED | PRESS_EDGE;
                state.points[FIRST_PRESS_SLOT] = state.points[0];
            }
        } else if state.status & PRESSED != 0 {
            state.status &= !PRESSED;
        } else {
            state.points[FIRST_PRESS_SLOT] = (0, 0);
            state.points[0] = NO_TOUCH;
        }

        Ok(state.status & PRESSED != 0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};
    use std::{cell::RefCell, collections::VecDeque, convert::Infallible, rc::Rc};

    /// A finger on the panel: the pen line and the conversions it produces.
    #[derive(Debug, Default)]
    pub(crate) struct Finger {
        pub(crate) down: bool,
        /// Per-conversion results, consumed in order. Once empty, `steady`
        /// is returned.
        pub(crate) queued: VecDeque<u16>,
        pub(crate) steady: Point,
        pub(crate) commands: Vec<u8>,
    }

    pub(crate) type SharedFinger = Rc<RefCell<Finger>>;

    pub(crate) struct FakeAdc(pub(crate) SharedFinger);
    pub(crate) struct FakePen(pub(crate) SharedFinger);

    impl Adc for FakeAdc {
        type Error = Infallible;

        fn convert(&mut self, command: u8) -> Result<u16, Infallible> {
            let mut finger = self.0.borrow_mut();
            finger.commands.push(command);
            if let Some(value) = finger.queued.pop_front() {
                return Ok(value);
            }
            Ok(if command == READ_X {
                finger.steady.0
            } else {
                finger.steady.1
            })
        }
    }

    impl digital::ErrorType for FakePen {
        type Error = Infallible;
    }

    impl InputPin for FakePen {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0.borrow().down)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(self.0.borrow().down)
        }
    }

    pub(crate) fn finger() -> (SharedFinger, Resistive<FakeAdc, FakePen>) {
        let finger = SharedFinger::default();
        let driver = Resistive::new(FakeAdc(finger.clone()), FakePen(finger.clone()));
        (finger, driver)
    }

    const PANEL: PanelInfo = PanelInfo {
        id: 0x9341,
        width: 240,
        height: 320,
        landscape: false,
    };

    #[test]
    fn filter_averages_middle_samples() {
        assert_eq!(filter([10, 4000, 20, 15, 18]), 17);
        assert_eq!(filter([4095, 4095, 4095, 4095, 4095]), 4095);
    }

    #[test]
    fn readings_within_tolerance_are_averaged() {
        assert_eq!(agree((100, 200), (130, 220)), Some((115, 210)));
        assert_eq!(agree((100, 200), (149, 200)), Some((124, 200)));
    }

    #[test]
    fn readings_outside_tolerance_are_rejected() {
        assert_eq!(agree((100, 200), (200, 200)), None);
        assert_eq!(agree((100, 200), (150, 200)), None);
        assert_eq!(agree((100, 200), (100, 150)), None);
    }

    #[test]
    fn landscape_swaps_adc_channels() {
        let (finger, mut driver) = finger();

        driver.read_raw(true).unwrap();

        let commands = finger.borrow().commands.clone();
        assert_eq!(&commands[..5], &[READ_Y; 5]);
        assert_eq!(&commands[5..], &[READ_X; 5]);
    }

    #[test]
    fn disagreeing_readings_leave_point_unchanged() {
        let (finger, mut driver) = finger();
        {
            let mut finger = finger.borrow_mut();
            finger.down = true;
            finger.queued = [1000, 1000, 1000, 1000, 1000, 2000, 2000, 2000, 2000, 2000]
                .into_iter()
                .collect();
            finger.steady = (1500, 2000);
        }
        let mut state = TouchState::new();
        state.points[0] = (7, 7);

        assert_eq!(driver.scan(&mut state, ScanMode::Raw, &PANEL), Ok(true));
        assert_eq!(state.primary(), (7, 7));
        assert_eq!(state.first_press(), (7, 7));
    }

    #[test]
    fn press_and_release_cycle() {
        let (finger, mut driver) = finger();
        let mut state = TouchState::new();
        state.set_calibration(Calibration {
            x_scale: 15.0,
            y_scale: 10.0,
            x_center: 1800,
            y_center: 1900,
        });

        finger.borrow_mut().down = true;
        finger.borrow_mut().steady = (2100, 2400);
        assert_eq!(driver.scan(&mut state, ScanMode::Screen, &PANEL), Ok(true));
        assert_eq!(state.primary(), (140, 210));
        assert_eq!(state.first_press(), (140, 210));
        assert_eq!(state.status(), PRESSED | PRESS_EDGE);

        finger.borrow_mut().steady = (2250, 2400);
        assert_eq!(driver.scan(&mut state, ScanMode::Screen, &PANEL), Ok(true));
        assert_eq!(state.primary(), (150, 210));
        assert_eq!(state.first_press(), (140, 210));

        finger.borrow_mut().down = false;
        assert_eq!(driver.scan(&mut state, ScanMode::Screen, &PANEL), Ok(false));
        assert_eq!(state.status(), PRESS_EDGE);
        assert_eq!(state.primary(), (150, 210));

        assert_eq!(driver.scan(&mut state, ScanMode::Screen, &PANEL), Ok(false));
        assert_eq!(state.primary(), NO_TOUCH);
        assert_eq!(state.first_press(), (0, 0));
    }

    #[test]
    fn pen_line_is_active_low() {
        let mut pen = PinMock::new(&[
            PinTransaction::get(State::Low),
            PinTransaction::get(State::High),
        ]);
        let mut driver = Resistive::new(FakeAdc(SharedFinger::default()), &mut pen);

        assert_eq!(driver.is_touched(), Ok(true));
        assert_eq!(driver.is_touched(), Ok(false));

        pen.done();
    }
}
