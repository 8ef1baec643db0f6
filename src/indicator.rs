//! Activity LED schedule.
//!
//! Normally the LED gives a short heartbeat flash every [`HEARTBEAT_TICKS`] loop
//! iterations.  `device?` starts a hold-off, during which the LED is held off for
//! [`HOLD_OFF_TICKS`] ticks of [`HOLD_OFF_TICK_MS`] so the host can tell which adapter
//! answered.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use embedded_hal::delay::DelayNs;

use crate::io::StatusLed;

/// Loop iterations per heartbeat
pub const HEARTBEAT_TICKS: u8 = 30;
/// Loop iterations the heartbeat LED stays lit
pub const HEARTBEAT_ON_TICKS: u8 = 2;
/// Length of the hold-off, in ticks
pub const HOLD_OFF_TICKS: u8 = 20;
/// Extra delay added to each loop iteration during hold-off
pub const HOLD_OFF_TICK_MS: u32 = 20;

#[derive(Debug, Default)]
pub struct Indicator {
    hold_off: u8,
    heartbeat: u8,
}

impl Indicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the hold-off.
    pub fn hold_off(&mut self) {
        self.hold_off = HOLD_OFF_TICKS;
    }

    pub fn holding_off(&self) -> bool {
        self.hold_off > 0
    }

    /// Advance the schedule by one loop iteration.
    pub fn tick<L: StatusLed, D: DelayNs>(&mut self, led: &mut L, delay: &mut D) {
        if self.holding_off() {
            if self.hold_off == HOLD_OFF_TICKS {
                led.set(false);
            }
            self.hold_off -= 1;
            delay.delay_ms(HOLD_OFF_TICK_MS);
            return;
        }

        if self.heartbeat == 0 {
            led.set(true);
            self.heartbeat = HEARTBEAT_TICKS;
        } else {
            self.heartbeat -= 1;
            if self.heartbeat == HEARTBEAT_TICKS - HEARTBEAT_ON_TICKS {
                led.set(false);
            }
        }
    }
}
