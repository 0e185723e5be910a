//! Multi-contact bookkeeping shared by the capacitive drivers.

use crate::{PanelInfo, TouchState, NO_TOUCH, POINT_MASK, PRESSED, PRESS_EDGE};

/// Calls after the last touch during which every scan reads the controller.
const BURST: u8 = 10;
/// Idle polls read the controller once per this many scans.
const IDLE_PERIOD: u8 = 10;
const WRAP_ABOVE: u8 = 240;

/// Idle-time throttle for register polling.
///
/// A fresh tracker reads on the first ten scans, then only every tenth one
/// until a touch re-arms it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Tracker {
    tick: u8,
}

impl Tracker {
    pub(crate) const fn new() -> Self {
        Self { tick: 0 }
    }

    /// Advances the counter and reports whether this scan reads the chip.
    pub(crate) fn due(&mut self) -> bool {
        self.tick = self.tick.wrapping_add(1);
        self.tick % IDLE_PERIOD == 0 || self.tick < BURST
    }

    pub(crate) fn rearm(&mut self) {
        self.tick = 0;
    }

    /// End-of-scan bookkeeping.
    pub(crate) fn settle(&mut self) {
        if self.tick > WRAP_ABOVE {
            self.tick = BURST;
        }
    }
}

/// Marks `count` contacts down and parks slot 0 in the scratch slot.
/// Returns the status to restore if the report turns out corrupt.
pub(crate) fn begin(state: &mut TouchState, count: usize, capacity: usize) -> u16 {
    let saved = state.status;
    let flags = !(0xFFFFu16 << count) & POINT_MASK;
    state.status = flags | PRESSED | PRESS_EDGE;
    state.points[capacity - 1] = state.points[0];
    saved
}

/// Checks the primary contact against the panel bounds.
///
/// An out-of-range primary is replaced by the second contact when there is
/// one. A lone corrupt contact rolls slot 0 and the status back and the scan
/// counts as no touch.
pub(crate) fn validate(
    state: &mut TouchState,
    tracker: &mut Tracker,
    count: usize,
    capacity: usize,
    saved: u16,
    panel: &PanelInfo,
) -> bool {
    let (x, y) = state.points[0];
    if x <= panel.width && y <= panel.height {
        tracker.rearm();
        return true;
    }

    if count > 1 {
        state.points[0] = state.points[1];
        tracker.rearm();
        true
    } else {
        state.points[0] = state.points[capacity - 1];
        state.status = saved;
        false
    }
}

/// Handles a scan that reported no contact.
pub(crate) fn release(state: &mut TouchState) {
    if state.status & PRESSED != 0 {
        state.status &= !PRESSED;
    } else {
        state.points[0] = NO_TOUCH;
        state.status &= 0xE000;
    }
}
