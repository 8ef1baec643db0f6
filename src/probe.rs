//! Bit-banged I2C address probe.
//!
//! Some I2C drivers report a NAK ambiguously, so device presence is tested by driving
//! the bus by hand: start condition, 7-bit address plus read bit, sample the ACK bit,
//! release the bus.  The pins are then handed back to the I2C peripheral.
//!
//! The bit sequence is written against [`ProbeLines`], so it can be driven by a
//! simulated bus in tests.  [`GpioLines`] implements it on top of [`Gpio`] and
//! [`DelayNs`].

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use embedded_hal::delay::DelayNs;

use crate::board::init_i2c;
use crate::config::BridgeConfig;
use crate::io::{Direction, Gpio, I2cBus};

/// One of the two bus lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Sda,
    Scl,
}

/// Result of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// A device pulled SDA low during the ACK bit
    Ack,
    /// Nothing answered
    Nak,
}

/// Open-drain control of the bus lines.
pub trait ProbeLines {
    /// Stop driving the line, letting the pull-up take it high.
    fn release(&mut self, line: Line);

    /// Drive the line low.
    fn pull_low(&mut self, line: Line);

    /// Sample the line.
    fn is_high(&mut self, line: Line) -> bool;

    /// Wait for the line to settle after a transition.
    fn settle(&mut self);
}

/// Probe for a device at the 7-bit address `addr`.
///
/// The caller owns the lines, and is responsible for putting them back into
/// peripheral mode afterwards.  See [`try_address()`].
pub fn probe_address<L: ProbeLines>(lines: &mut L, addr: u8) -> Presence {
    lines.release(Line::Sda);
    lines.release(Line::Scl);

    // Start: SDA falls while SCL is high
    lines.pull_low(Line::Sda);
    lines.settle();
    lines.pull_low(Line::Scl);
    lines.settle();

    let header = (addr << 1) | 1;
    for bit in (0..8).rev() {
        if header & (1 << bit) != 0 {
            lines.release(Line::Sda);
        } else {
            lines.pull_low(Line::Sda);
        }
        lines.settle();
        clock_pulse(lines);
    }

    // ACK bit: the target holds SDA low while SCL is high
    lines.release(Line::Sda);
    lines.settle();
    lines.release(Line::Scl);
    lines.settle();
    let nak = lines.is_high(Line::Sda);
    lines.pull_low(Line::Scl);
    lines.settle();

    // Release the bus
    lines.release(Line::Scl);
    lines.settle();
    lines.release(Line::Sda);
    lines.settle();

    if nak { Presence::Nak } else { Presence::Ack }
}

fn clock_pulse<L: ProbeLines>(lines: &mut L) {
    lines.release(Line::Scl);
    lines.settle();
    lines.pull_low(Line::Scl);
    lines.settle();
}

/// [`ProbeLines`] over software controlled GPIO pins.
pub struct GpioLines<'a, G: Gpio, D: DelayNs> {
    gpio: &'a mut G,
    delay: &'a mut D,
    sda: u8,
    scl: u8,
    settle_us: u32,
}

impl<'a, G: Gpio, D: DelayNs> GpioLines<'a, G, D> {
    /// Take the SDA and SCL pins away from the I2C peripheral.
    pub fn new(gpio: &'a mut G, delay: &'a mut D, sda: u8, scl: u8, settle_us: u32) -> Self {
        gpio.init(sda);
        gpio.init(scl);
        Self {
            gpio,
            delay,
            sda,
            scl,
            settle_us,
        }
    }

    fn pin(&self, line: Line) -> u8 {
        match line {
            Line::Sda => self.sda,
            Line::Scl => self.scl,
        }
    }
}

impl<G: Gpio, D: DelayNs> ProbeLines for GpioLines<'_, G, D> {
    fn release(&mut self, line: Line) {
        let pin = self.pin(line);
        self.gpio.set_direction(pin, Direction::Input);
        self.gpio.pull_up(pin);
    }

    fn pull_low(&mut self, line: Line) {
        let pin = self.pin(line);
        self.gpio.set_direction(pin, Direction::Output);
        self.gpio.put(pin, false);
    }

    fn is_high(&mut self, line: Line) -> bool {
        let pin = self.pin(line);
        self.gpio.get(pin)
    }

    fn settle(&mut self) {
        self.delay.delay_us(self.settle_us);
    }
}

/// Probe for a device at `addr` using the configured bus pins.
///
/// The pins are always returned to the I2C peripheral, with pull-ups enabled,
/// before returning.
pub fn try_address<I: I2cBus, G: Gpio, D: DelayNs>(
    i2c: &mut I,
    gpio: &mut G,
    delay: &mut D,
    config: &BridgeConfig,
    addr: u8,
) -> Presence {
    let pins = &config.pins;
    let presence = {
        let mut lines = GpioLines::new(gpio, delay, pins.sda, pins.scl, config.bit_settle_us);
        probe_address(&mut lines, addr)
    };
    init_i2c(i2c, gpio, config);
    debug!("Probe of {addr:#04X}: {presence:?}");
    presence
}
