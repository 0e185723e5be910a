//! Five-point calibration of a resistive panel.
//!
//! The user taps crosshairs near the four corners and in the middle. The two
//! horizontal and two vertical spans between corner taps must agree to within
//! five percent, which catches mis-taps and a non-linear panel. The result is
//! a scale per axis plus the raw reading at the screen center.

use embedded_graphics::{pixelcolor::Rgb565, prelude::DrawTarget};
use embedded_hal::{delay::DelayNs, digital::InputPin};

use super::{Adc, Resistive};
use crate::{
    error::Error,
    storage::{ByteStore, CalibrationStore},
    ui, Panel, PanelInfo, Point, ScanMode, TouchState, PRESSED, PRESS_EDGE,
};

/// Distance of the corner targets from the screen edges.
pub const MARGIN: u16 = 20;
/// Largest meaningful span between two raw readings.
pub const ADC_MAX: i32 = 4095;
/// Accepted range for the ratio of two spans across the same axis.
pub const RATIO_WINDOW: core::ops::RangeInclusive<f64> = 0.95..=1.05;

/// Polls of [`POLL_MS`] without a tap before calibration gives up.
const IDLE_POLLS: u16 = 1000;
const POLL_MS: u32 = 10;
const SUCCESS_MS: u32 = 1000;
const SUCCESS_TEXT: &str = "Touch Screen Adjust OK!";
const SUCCESS_AT: Point = (35, 110);

/// Linear map from raw ADC readings to screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Calibration {
    /// Raw units per pixel. Negative when the axis runs backwards.
    pub x_scale: f32,
    pub y_scale: f32,
    /// Raw reading at the screen center.
    pub x_center: i16,
    pub y_center: i16,
}

impl Calibration {
    /// `screen = (raw - center) / scale + dimension / 2`, saturating at the
    /// panel origin.
    pub fn to_screen(&self, (x, y): Point, width: u16, height: u16) -> Point {
        let map = |raw: u16, center: i16, scale: f32, dimension: u16| {
            let offset = (raw as i32 - center as i32) as i16;
            (offset as f32 / scale + (dimension / 2) as f32) as u16
        };
        (
            map(x, self.x_center, self.x_scale, width),
            map(y, self.y_center, self.y_scale, height),
        )
    }

    /// Derives a calibration from the five taps, in target order.
    pub fn solve(samples: &[Point; 5], width: u16, height: u16) -> Result<Self, Spans> {
        let spans = Spans::measure(samples);
        if !spans.acceptable() {
            return Err(spans);
        }

        let x_span = 2 * (width as i32 - 2 * MARGIN as i32);
        let y_span = 2 * (height as i32 - 2 * MARGIN as i32);
        let (x_center, y_center) = samples[4];

        Ok(Self {
            x_scale: (spans.s1 + spans.s3) as f32 / x_span as f32,
            y_scale: (spans.s2 + spans.s4) as f32 / y_span as f32,
            x_center: x_center as i16,
            y_center: y_center as i16,
        })
    }
}

/// Raw spans between corner taps.
///
/// `s1` and `s3` run along X across the top and bottom, `s2` and `s4` along Y
/// down the right and left.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Spans {
    pub s1: i32,
    pub s2: i32,
    pub s3: i32,
    pub s4: i32,
}

impl Spans {
    pub fn measure(samples: &[Point; 5]) -> Self {
        let x = |i: usize| samples[i].0 as i32;
        let y = |i: usize| samples[i].1 as i32;
        Self {
            s1: x(1) - x(0),
            s3: x(3) - x(2),
            s2: y(3) - y(1),
            s4: y(2) - y(0),
        }
    }

    /// `|s1 / s3|`
    pub fn x_ratio(&self) -> f64 {
        (self.s1 as f64 / self.s3 as f64).abs()
    }

    /// `|s2 / s4|`
    pub fn y_ratio(&self) -> f64 {
        (self.s2 as f64 / self.s4 as f64).abs()
    }

    pub fn acceptable(&self) -> bool {
        let spans = [self.s1, self.s2, self.s3, self.s4];
        if spans.iter().any(|&s| s == 0 || s.abs() > ADC_MAX) {
            return false;
        }
        RATIO_WINDOW.contains(&self.x_ratio()) && RATIO_WINDOW.contains(&self.y_ratio())
    }
}

/// Screen positions of the five targets.
pub fn targets(width: u16, height: u16) -> [Point; 5] {
    [
        (MARGIN, MARGIN),
        (width.saturating_sub(MARGIN), MARGIN),
        (MARGIN, height.saturating_sub(MARGIN)),
        (width.saturating_sub(MARGIN), height.saturating_sub(MARGIN)),
        (width / 2, height / 2),
    ]
}

/// Runs the interactive calibration.
///
/// Blocks until five accepted taps or until [`IDLE_POLLS`] polls pass
/// without a tap. A rejected set restarts at the first target. On success the
/// result goes into `state` and then into `store`, and `Ok(true)` is returned.
/// On timeout whatever `store` holds is loaded and `Ok(false)` is returned.
///
/// If saving fails the new calibration is still in `state` and
/// [`Error::Storage`] is returned.
pub fn adjust<ADC, PEN, D, S>(
    driver: &mut Resistive<ADC, PEN>,
    state: &mut TouchState,
    display: &mut D,
    store: &mut CalibrationStore<S>,
    delay: &mut impl DelayNs,
) -> Result<bool, Error>
where
    ADC: Adc,
    PEN: InputPin,
    D: Panel + DrawTarget<Color = Rgb565>,
    S: ByteStore,
{
    let panel = PanelInfo::of(display);
    let targets = targets(panel.width, panel.height);
    let draw = |display: &mut D, target: Point, color: Rgb565| {
        ui::draw_target(display, target, color).map_err(|_| Error::Display)
    };

    display.clear(ui::BACKGROUND).map_err(|_| Error::Display)?;
    ui::draw_prompt(display).map_err(|_| Error::Display)?;
    draw(display, targets[0], ui::FOREGROUND)?;

    state.status = 0;
    let mut samples = [(0, 0); 5];
    let mut taken = 0;
    let mut idle: u16 = 0;

    loop {
        driver.scan(state, ScanMode::Raw, &panel)?;

        if state.status & (PRESSED | PRESS_EDGE) == PRESS_EDGE {
            idle = 0;
            state.status &= !PRESS_EDGE;
            samples[taken] = state.points[0];
            taken += 1;

            match taken {
                1..=3 => {
                    draw(display, targets[taken - 1], ui::BACKGROUND)?;
                    draw(display, targets[taken], ui::FOREGROUND)?;
                }
                4 => {
                    display.clear(ui::BACKGROUND).map_err(|_| Error::Display)?;
                    draw(display, targets[4], ui::FOREGROUND)?;
                }
                _ => match Calibration::solve(&samples, panel.width, panel.height) {
                    Err(spans) => {
                        #[cfg(feature = "defmt-03")]
                        defmt::warn!(
                            "calibration rejected, px {} py {}",
                            spans.x_ratio(),
                            spans.y_ratio()
                        );
                        taken = 0;
                        draw(display, targets[4], ui::BACKGROUND)?;
                        draw(display, targets[0], ui::FOREGROUND)?;
                        ui::draw_calibration_info(
                            display,
                            &samples,
                            spans.x_ratio(),
                            spans.y_ratio(),
                        )
                        .map_err(|_| Error::Display)?;
                        continue;
                    }
                    Ok(calibration) => {
                        #[cfg(feature = "defmt-03")]
                        defmt::info!("calibration accepted: {}", calibration);
                        state.calibration = Some(calibration);

                        display.clear(ui::BACKGROUND).map_err(|_| Error::Display)?;
                        ui::draw_text(display, SUCCESS_AT, SUCCESS_TEXT, ui::HIGHLIGHT)
                            .map_err(|_| Error::Display)?;
                        delay.delay_ms(SUCCESS_MS);

                        let saved = store.save(&calibration);
                        display.clear(ui::BACKGROUND).map_err(|_| Error::Display)?;
                        return saved.map(|()| true).map_err(|_e| {
                            #[cfg(feature = "defmt-03")]
                            defmt::error!(
                                "calibration save failed: {}",
                                defmt::Debug2Format(&_e)
                            );
                            Error::Storage
                        });
                    }
                },
            }
        }

        delay.delay_ms(POLL_MS);
        idle += 1;
        if idle > IDLE_POLLS {
            match store.load() {
                Ok(Some(stored)) => state.calibration = Some(stored),
                Ok(None) => {}
                Err(_e) => {
                    #[cfg(feature = "defmt-03")]
                    defmt::warn!("calibration load failed: {}", defmt::Debug2Format(&_e));
                }
            }
            #[cfg(feature = "defmt-03")]
            defmt::warn!("calibration timed out");
            return Ok(false);
        }
    }
}
