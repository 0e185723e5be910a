//! Runtime binding of one touch controller to the attached display.
//!
//! The display controller ID decides which touch controllers are worth
//! probing, and in which order. The first one that answers is bound and
//! stays bound until [`Touchscreen::release`].

use embedded_graphics::{pixelcolor::Rgb565, prelude::DrawTarget};
use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    i2c::I2c,
};

use crate::{
    error::Error,
    ft5206::Ft5206,
    gt9xxx::Gt9xxx,
    resistive::{calibration, Adc, Resistive},
    storage::{ByteStore, CalibrationStore},
    Panel, PanelInfo, ScanMode, TouchState, TouchType, MAX_POINTS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Family {
    /// ADS7846 / XPT2046 style ADC.
    Resistive,
    /// FT5206 and compatibles.
    Ft5206,
    /// GT911 / GT9147 / GT1158 / GT9271.
    Gt9xxx,
}

impl Family {
    pub fn is_capacitive(self) -> bool {
        self != Family::Resistive
    }
}

/// Controllers to probe for a display, in probing order.
pub fn candidates(display_id: u16) -> &'static [Family] {
    match display_id {
        // 3.5" boards ship with either a resistive glass or a GT9xxx.
        0x7796 => &[Family::Gt9xxx, Family::Resistive],
        0x5510 | 0x9806 | 0x4342 | 0x4384 | 0x1018 => &[Family::Gt9xxx],
        0x1963 | 0x7084 | 0x7016 => &[Family::Ft5206, Family::Gt9xxx],
        _ => &[Family::Resistive],
    }
}

/// Everything a touch controller can be wired to.
///
/// The capacitive controllers share the two-wire bus and reset line. The
/// resistive controller uses the ADC and the pen interrupt line.
pub struct TouchWiring<I2C, RST, ADC, PEN> {
    pub i2c: I2C,
    pub reset: RST,
    pub adc: ADC,
    pub pen: PEN,
}

enum Bound<I2C, RST, ADC, PEN> {
    Resistive {
        driver: Resistive<ADC, PEN>,
        i2c: I2C,
        reset: RST,
    },
    Ft5206 {
        driver: Ft5206<I2C, RST>,
        adc: ADC,
        pen: PEN,
    },
    Gt9xxx {
        driver: Gt9xxx<I2C, RST>,
        adc: ADC,
        pen: PEN,
    },
}

/// A touch panel bound to one controller.
pub struct Touchscreen<I2C, RST, ADC, PEN, S> {
    bound: Bound<I2C, RST, ADC, PEN>,
    store: CalibrationStore<S>,
    panel: PanelInfo,
}

impl<I2C, RST, ADC, PEN, S> Touchscreen<I2C, RST, ADC, PEN, S>
where
    I2C: I2c,
    RST: OutputPin,
    ADC: Adc,
    PEN: InputPin,
    S: ByteStore,
{
    /// Probes the controllers that go with `display` and binds the first
    /// one that answers.
    ///
    /// `state` is reset and tagged with the orientation and family. A
    /// resistive panel loads its calibration from `store`, or runs
    /// [`calibration::adjust`] on `display` if none is stored. The returned
    /// flag is `true` when that calibration was performed now.
    ///
    /// Returns [`Error::NoController`] if every candidate fails.
    pub fn init<D>(
        mut wiring: TouchWiring<I2C, RST, ADC, PEN>,
        mut store: CalibrationStore<S>,
        display: &mut D,
        state: &mut TouchState,
        delay: &mut impl DelayNs,
    ) -> Result<(Self, bool), Error>
    where
        D: Panel + DrawTarget<Color = Rgb565>,
    {
        let panel = PanelInfo::of(display);
        state.points = [(0, 0); MAX_POINTS];
        state.status = 0;

        for &family in candidates(panel.id) {
            match bind(family, wiring, &mut store, display, state, delay) {
                Ok((bound, calibrated)) => {
                    #[cfg(feature = "defmt-03")]
                    defmt::info!("display {=u16:#x}: bound {}", panel.id, family);

                    state.touch_type = TouchType::new(panel.landscape, family.is_capacitive());
                    let touchscreen = Self {
                        bound,
                        store,
                        panel,
                    };
                    return Ok((touchscreen, calibrated));
                }
                Err((_error, parts)) => {
                    #[cfg(feature = "defmt-03")]
                    defmt::warn!("{} not found: {}", family, _error);
                    wiring = parts;
                }
            }
        }

        Err(Error::NoController)
    }

    pub fn family(&self) -> Family {
        match self.bound {
            Bound::Resistive { .. } => Family::Resistive,
            Bound::Ft5206 { .. } => Family::Ft5206,
            Bound::Gt9xxx { .. } => Family::Gt9xxx,
        }
    }

    pub fn panel(&self) -> PanelInfo {
        self.panel
    }

    /// Polls the bound controller.
    ///
    /// `mode` only affects the resistive controller. Returns whether a
    /// touch is present.
    pub fn scan(
        &mut self,
        state: &mut TouchState,
        mode: ScanMode,
        delay: &mut impl DelayNs,
    ) -> Result<bool, Error> {
        match &mut self.bound {
            Bound::Resistive { driver, .. } => driver.scan(state, mode, &self.panel),
            Bound::Ft5206 { driver, .. } => driver.scan(state, &self.panel, delay),
            Bound::Gt9xxx { driver, .. } => driver.scan(state, &self.panel),
        }
    }

    /// Recalibrates a resistive panel. Capacitive panels need no
    /// calibration and return [`Error::Unsupported`].
    pub fn adjust<D>(
        &mut self,
        state: &mut TouchState,
        display: &mut D,
        delay: &mut impl DelayNs,
    ) -> Result<bool, Error>
    where
        D: Panel + DrawTarget<Color = Rgb565>,
    {
        match &mut self.bound {
            Bound::Resistive { driver, .. } => {
                calibration::adjust(driver, state, display, &mut self.store, delay)
            }
            _ => Err(Error::Unsupported),
        }
    }

    /// Unbinds the controller and hands back the wiring and the store.
    pub fn release(self) -> (TouchWiring<I2C, RST, ADC, PEN>, CalibrationStore<S>) {
        let wiring = match self.bound {
            Bound::Resistive { driver, i2c, reset } => {
                let (adc, pen) = driver.release();
                TouchWiring { i2c, reset, adc, pen }
            }
            Bound::Ft5206 { driver, adc, pen } => {
                let (i2c, reset) = driver.release();
                TouchWiring { i2c, reset, adc, pen }
            }
            Bound::Gt9xxx { driver, adc, pen } => {
                let (i2c, reset) = driver.release();
                TouchWiring { i2c, reset, adc, pen }
            }
        };
        (wiring, self.store)
    }
}

type Probe<I2C, RST, ADC, PEN> =
    Result<(Bound<I2C, RST, ADC, PEN>, bool), (Error, TouchWiring<I2C, RST, ADC, PEN>)>;

/// Tries one controller family. On failure the wiring comes back untouched
/// for the next candidate.
fn bind<I2C, RST, ADC, PEN, S, D>(
    family: Family,
    wiring: TouchWiring<I2C, RST, ADC, PEN>,
    store: &mut CalibrationStore<S>,
    display: &mut D,
    state: &mut TouchState,
    delay: &mut impl DelayNs,
) -> Probe<I2C, RST, ADC, PEN>
where
    I2C: I2c,
    RST: OutputPin,
    ADC: Adc,
    PEN: InputPin,
    S: ByteStore,
    D: Panel + DrawTarget<Color = Rgb565>,
{
    let TouchWiring {
        i2c,
        reset,
        adc,
        pen,
    } = wiring;

    match family {
        Family::Gt9xxx => {
            let mut driver = Gt9xxx::new(i2c, reset);
            match driver.init(delay) {
                Ok(()) => Ok((Bound::Gt9xxx { driver, adc, pen }, false)),
                Err(error) => {
                    let (i2c, reset) = driver.release();
                    Err((error, TouchWiring { i2c, reset, adc, pen }))
                }
            }
        }
        Family::Ft5206 => {
            let mut driver = Ft5206::new(i2c, reset);
            match driver.init(delay) {
                Ok(()) => Ok((Bound::Ft5206 { driver, adc, pen }, false)),
                Err(error) => {
                    let (i2c, reset) = driver.release();
                    Err((error, TouchWiring { i2c, reset, adc, pen }))
                }
            }
        }
        Family::Resistive => {
            let mut driver = Resistive::new(adc, pen);
            match calibrate(&mut driver, store, display, state, delay) {
                Ok(calibrated) => Ok((Bound::Resistive { driver, i2c, reset }, calibrated)),
                Err(error) => {
                    let (adc, pen) = driver.release();
                    Err((error, TouchWiring { i2c, reset, adc, pen }))
                }
            }
        }
    }
}

/// Primes the ADC, then restores the stored calibration or runs a new one.
fn calibrate<ADC, PEN, S, D>(
    driver: &mut Resistive<ADC, PEN>,
    store: &mut CalibrationStore<S>,
    display: &mut D,
    state: &mut TouchState,
    delay: &mut impl DelayNs,
) -> Result<bool, Error>
where
    ADC: Adc,
    PEN: InputPin,
    S: ByteStore,
    D: Panel + DrawTarget<Color = Rgb565>,
{
    driver.prime(display.is_landscape())?;

    match store.load() {
        Ok(Some(stored)) => {
            #[cfg(feature = "defmt-03")]
            defmt::info!("calibration loaded: {}", stored);
            state.calibration = Some(stored);
            return Ok(false);
        }
        Ok(None) => {}
        Err(_e) => {
            #[cfg(feature = "defmt-03")]
            defmt::warn!("calibration load failed: {}", defmt::Debug2Format(&_e));
        }
    }

    match calibration::adjust(driver, state, display, store, delay) {
        // The new calibration is in use even though it will not survive a reboot.
        Err(Error::Storage) => {
            #[cfg(feature = "defmt-03")]
            defmt::warn!("calibration not saved");
            Ok(true)
        }
        result => result,
    }
}
