//! Board level helpers - host pin access rules and the board address straps.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::config::{BridgeConfig, PinMap};
use crate::io::{Direction, Gpio, I2cBus, PinFunction};
use crate::{Error, Result};

/// Check that the host may access `pin`.
///
/// Pins must be in `0..=max_gpio`, and not one of the I2C or address strap
/// pins.  Takes a signed value as the host may send a negative number.
pub fn check_pin(pins: &PinMap, pin: i32) -> Result<u8> {
    if pin < 0 || pin > pins.max_gpio as i32 {
        return Err(Error::InvalidPin);
    }
    let pin = pin as u8;
    if pins.is_reserved(pin) {
        return Err(Error::InvalidPin);
    }
    Ok(pin)
}

/// Read the board number from the address straps.
///
/// Each strap is pulled up, and fitting a strap pulls it to ground, so the
/// board number is inverted:
///
/// | A2 | A1 | A0 | Board |
/// |----|----|----|-------|
/// | 0  | 0  | 0  | 7     |
/// | 0  | 0  | 1  | 6     |
/// | .. | .. | .. | ..    |
/// | 1  | 1  | 1  | 0     |
pub fn read_board_address<G: Gpio>(gpio: &mut G, pins: &PinMap) -> u8 {
    let mut raw = 0u8;
    for pin in pins.addr_straps.iter() {
        gpio.init(*pin);
        gpio.set_direction(*pin, Direction::Input);
        gpio.pull_up(*pin);
    }
    for (bit, pin) in pins.addr_straps.iter().enumerate() {
        if gpio.get(*pin) {
            raw |= 1 << bit;
        }
    }
    let addr = 0x07 - raw;
    debug!("Board address straps {raw:#05b}, board {addr}");
    addr
}

/// Initialize the I2C peripheral and hand it the bus pins, with pull-ups.
pub fn init_i2c<I: I2cBus, G: Gpio>(i2c: &mut I, gpio: &mut G, config: &BridgeConfig) {
    let pins = &config.pins;
    i2c.init(config.i2c_frequency_hz);
    gpio.set_function(pins.sda, PinFunction::I2c);
    gpio.set_function(pins.scl, PinFunction::I2c);
    gpio.pull_up(pins.sda);
    gpio.pull_up(pins.scl);
}
