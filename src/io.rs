//! Hardware capability traits.
//!
//! The bridge never touches hardware directly.  The board support code provides
//! implementations of these traits, typically thin wrappers around the vendor HAL.
//!
//! # Possible implementations
//!
//! - On the target: USB CDC or UART for [`Serial`], the I2C peripheral for [`I2cBus`],
//!   the SIO block for [`Gpio`].
//! - For host testing: scripted byte streams and recording buses.
//!
//! Busy waits use [`DelayNs`] from `embedded-hal`, so the HAL's timer can be passed in
//! directly.
//!
//! # Pin numbers
//!
//! Pins are identified by their GPIO number as printed in the MCU datasheet, for example
//! `14` for GP14 on an RP2040.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use embedded_hal::delay::DelayNs;

/// Character stream to and from the host.
pub trait Serial {
    /// Read a single byte, waiting at most `timeout_us` microseconds.
    ///
    /// Returns `None` if no byte arrived before the timeout.  A timeout is
    /// not an error - it just means there is nothing to do yet.
    fn read_byte(&mut self, timeout_us: u32) -> Option<u8>;

    /// Write a single byte.
    fn write_byte(&mut self, byte: u8);

    /// Write a sequence of bytes.
    fn write_bytes(&mut self, data: &[u8]) {
        for byte in data {
            self.write_byte(*byte);
        }
    }
}

/// Blocking I2C controller.
pub trait I2cBus {
    /// The error type returned by bus transactions.
    ///
    /// The bridge does not distinguish between driver errors - any error is
    /// reported to the host as a protocol error.
    type Error: core::fmt::Debug;

    /// (Re)initialize the peripheral at the given bus frequency.
    fn init(&mut self, frequency_hz: u32);

    /// Write `data` to the 7-bit address `addr`.
    ///
    /// If `nostop` is set the bus is not released at the end of the transfer,
    /// and the next transaction begins with a repeated start.
    ///
    /// Returns the number of bytes written.
    fn write(&mut self, addr: u8, data: &[u8], nostop: bool) -> Result<usize, Self::Error>;

    /// Read `buf.len()` bytes from the 7-bit address `addr`.
    ///
    /// `nostop` has the same meaning as for [`Self::write()`].
    ///
    /// Returns the number of bytes read.
    fn read(&mut self, addr: u8, buf: &mut [u8], nostop: bool) -> Result<usize, Self::Error>;
}

/// GPIO pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Function a pin is connected to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinFunction {
    /// Software controlled GPIO
    Gpio,
    /// I2C peripheral
    I2c,
}

/// GPIO access.
pub trait Gpio {
    /// Reset the pin to a software controlled input, output level low.
    fn init(&mut self, pin: u8);

    /// Connect the pin to a peripheral function.
    fn set_function(&mut self, pin: u8, function: PinFunction);

    fn set_direction(&mut self, pin: u8, direction: Direction);

    /// Enable the internal pull-up resistor.
    fn pull_up(&mut self, pin: u8);

    /// Set the output level.  Only has an effect on the pad if the pin is an
    /// output.
    fn put(&mut self, pin: u8, high: bool);

    /// Read the level on the pad.
    fn get(&mut self, pin: u8) -> bool;

    /// Read back the level last written with [`Self::put()`].
    fn out_level(&mut self, pin: u8) -> bool;
}

/// Activity LED.
pub trait StatusLed {
    fn set(&mut self, on: bool);
}

/// The hardware driven by the command dispatcher.
pub struct Peripherals<S: Serial, I: I2cBus, G: Gpio, D: DelayNs> {
    pub serial: S,
    pub i2c: I,
    pub gpio: G,
    pub delay: D,
}

impl<S: Serial, I: I2cBus, G: Gpio, D: DelayNs> Peripherals<S, I, G, D> {
    pub fn new(serial: S, i2c: I, gpio: G, delay: D) -> Self {
        Self {
            serial,
            i2c,
            gpio,
            delay,
        }
    }
}
