//! Touch input for small LCD boards.
//!
//! One [`touch::Touchscreen`] binds at runtime to whichever controller the
//! attached display carries: a resistive ADS7846/XPT2046-style ADC with
//! five-point calibration, or an FT5206 / GT9xxx capacitive controller on a
//! bit-banged two-wire bus. Every driver reports into one shared
//! [`TouchState`] owned by the application.
#![cfg_attr(not(test), no_std)]

pub mod at24cxx;
mod capacitive;
pub mod error;
pub mod ft5206;
pub mod gt9xxx;
pub mod resistive;
pub mod soft_i2c;
pub mod storage;
pub mod touch;
pub mod ui;

pub use error::Error;
pub use resistive::calibration::Calibration;
pub use touch::{Family, Touchscreen, TouchWiring};

pub type Point = (u16, u16);

/// Status bit: a contact is currently down.
pub const PRESSED: u16 = 0x8000;
/// Status bit: a press was seen and has not been consumed yet.
pub const PRESS_EDGE: u16 = 0x4000;
/// Per-contact active flags, one bit per slot.
pub const POINT_MASK: u16 = 0x03FF;

/// Number of point slots in [`TouchState`].
pub const MAX_POINTS: usize = 10;

/// Slot holding the coordinates where the current resistive press started.
pub const FIRST_PRESS_SLOT: usize = MAX_POINTS - 1;

/// Coordinates reported for slot 0 while nothing has touched the panel.
pub const NO_TOUCH: Point = (0xFFFF, 0xFFFF);

/// How the resistive driver reports slot 0. Capacitive drivers always report
/// screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ScanMode {
    /// Calibrated screen coordinates.
    Screen,
    /// Filtered ADC readings, as used by the calibration procedure.
    Raw,
}

/// Orientation and controller-family flags fixed at bind time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct TouchType(u8);

impl TouchType {
    pub const LANDSCAPE: u8 = 0x01;
    pub const CAPACITIVE: u8 = 0x80;

    pub const fn new(landscape: bool, capacitive: bool) -> Self {
        let mut bits = 0;
        if landscape {
            bits |= Self::LANDSCAPE;
        }
        if capacitive {
            bits |= Self::CAPACITIVE;
        }
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_landscape(self) -> bool {
        self.0 & Self::LANDSCAPE != 0
    }

    pub const fn is_capacitive(self) -> bool {
        self.0 & Self::CAPACITIVE != 0
    }
}

/// Touch data shared between the bound driver and the application.
///
/// Slot meaning depends on the bound family. Capacitive drivers fill slots
/// `0..n` with the `n` current contacts and flag each in the low status bits;
/// the last slot of the chip's range is used as scratch during a scan. The
/// resistive driver only fills slot 0 and [`FIRST_PRESS_SLOT`].
#[derive(Debug, Clone, PartialEq)]
pub struct TouchState {
    pub(crate) points: [Point; MAX_POINTS],
    pub(crate) status: u16,
    pub(crate) calibration: Option<Calibration>,
    pub(crate) touch_type: TouchType,
}

impl Default for TouchState {
    fn default() -> Self {
        Self::new()
    }
}

impl TouchState {
    pub const fn new() -> Self {
        Self {
            points: [(0, 0); MAX_POINTS],
            status: 0,
            calibration: None,
            touch_type: TouchType(0),
        }
    }

    pub fn points(&self) -> &[Point; MAX_POINTS] {
        &self.points
    }

    pub fn point(&self, slot: usize) -> Option<Point> {
        self.points.get(slot).copied()
    }

    /// Primary contact.
    pub fn primary(&self) -> Point {
        self.points[0]
    }

    /// Where the current resistive press started.
    pub fn first_press(&self) -> Point {
        self.points[FIRST_PRESS_SLOT]
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_pressed(&self) -> bool {
        self.status & PRESSED != 0
    }

    pub fn press_edge(&self) -> bool {
        self.status & PRESS_EDGE != 0
    }

    /// Clears the press edge, returning whether it was set.
    pub fn take_press_edge(&mut self) -> bool {
        let edge = self.press_edge();
        self.status &= !PRESS_EDGE;
        edge
    }

    /// Whether a capacitive contact occupies `slot`.
    pub fn is_active(&self, slot: usize) -> bool {
        slot < MAX_POINTS && self.status & (1 << slot) != 0
    }

    /// Slots flagged active by the last capacitive scan.
    pub fn contacts(&self) -> impl Iterator<Item = (usize, Point)> + '_ {
        self.points
            .iter()
            .copied()
            .enumerate()
            .filter(|&(slot, _)| self.is_active(slot))
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = Some(calibration);
    }

    pub fn touch_type(&self) -> TouchType {
        self.touch_type
    }
}

/// Identity and geometry of the attached display.
pub trait Panel {
    /// Controller ID read from the display driver IC.
    fn id(&self) -> u16;
    fn width(&self) -> u16;
    fn height(&self) -> u16;
    fn is_landscape(&self) -> bool;
}

/// Snapshot of a [`Panel`] kept by the drivers after binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct PanelInfo {
    pub id: u16,
    pub width: u16,
    pub height: u16,
    pub landscape: bool,
}

impl PanelInfo {
    pub fn of<P: Panel + ?Sized>(panel: &P) -> Self {
        Self {
            id: panel.id(),
            width: panel.width(),
            height: panel.height(),
            landscape: panel.is_landscape(),
        }
    }
}
