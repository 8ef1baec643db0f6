//! Serial to I2C bridge protocol engine for microcontrollers.
//!
//! A host talks to the device over a character stream (typically USB CDC or a UART) using
//! line-oriented text commands.  The device turns those commands into I2C bus
//! transactions, GPIO operations and bus-presence probes, and replies either with
//! human-readable text or with a compact machine-to-machine (M2M) acknowledgement
//! protocol.
//!
//! `no_std`, no allocator required.
//!
//! ## Architecture
//!
//! Input flows through a fixed pipeline, driven by a single cooperative loop:
//!
//! ```text
//! Framer -> Tokens -> Dispatcher -> (Responder | mem helpers | bit-bang probe) -> Serial
//! ```
//!
//! - [`framer`] accumulates input bytes into a carriage-return terminated ASCII line, or
//!   into a binary frame terminated by [`framer::BIN_MAGIC`].
//! - [`command`] splits completed lines into tokens and parses each token into a typed
//!   [`command::Command`].
//! - [`dispatch`] owns the token-level state machine, including the multi-line byte
//!   collection used by `send`, `send+hold` and `writemem`.
//! - [`responder`] renders byte buffers as hex dumps, or as a flow-controlled M2M stream
//!   with a continue/abort handshake every chunk.
//! - [`probe`] implements a software-timed I2C address probe, used to test for device
//!   presence without relying on the peripheral driver's NAK reporting.
//! - [`mem`] provides register-addressed read and write helpers.
//!
//! [`bridge::Bridge`] ties all of these together, and owns the [`session::Session`] - the
//! only mutable protocol state in the system.
//!
//! ## Hardware
//!
//! The crate does not touch hardware directly.  The board support code provides
//! implementations of the traits in [`io`]:
//! - [`io::Serial`] - byte read with timeout, byte/string write
//! - [`io::I2cBus`] - blocking I2C read/write, with optional "no stop" (repeated start)
//! - [`io::Gpio`] - pin direction, pull-up, level, and pin function selection
//! - `embedded_hal::delay::DelayNs` - microsecond/millisecond busy waits
//! - [`io::StatusLed`] - the activity LED
//!
//! ## Getting Started
//!
//! ```rust,ignore
//! use easy_i2c_bridge::{bridge::Bridge, config::BridgeConfig};
//!
//! let mut bridge = Bridge::new(serial, i2c, gpio, delay, led, BridgeConfig::default());
//! bridge.start();
//! loop {
//!     bridge.poll();
//! }
//! ```
//!
//! ## Protocol
//!
//! Commands are space separated and the line is terminated with a carriage return, for
//! example `addr:0x20 bytes:2 send AB CD`.  See [`command::Command`] for the full
//! vocabulary.
//!
//! In M2M mode (`m2m_resp:1`) replies use a single character alphabet:
//! - `.` - ok
//! - `&` - continue/request more
//! - `X` - error or abort
//! - `~` - protocol (bus) error, for example a NAK

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod bridge;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod framer;
pub mod indicator;
pub mod io;
pub mod mem;
pub mod probe;
pub mod responder;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

/// M2M response character: ok
pub const M2M_OK: u8 = b'.';
/// M2M response character: continue, or more data expected
pub const M2M_CONTINUE: u8 = b'&';
/// M2M response character: error, or abort
pub const M2M_ERROR: u8 = b'X';
/// M2M response character: protocol (bus) error
pub const M2M_PROTOCOL_ERROR: u8 = b'~';

/// Bridge errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Token is not a known command
    UnknownCommand,
    /// Command recognised, but its arguments are malformed or missing
    Syntax,
    /// Token longer than the tokenizer accepts
    TokenTooLong,
    /// Payload token is not exactly two hex digits
    InvalidByte,
    /// `send`/`recv`/`writemem` without a prior non-zero `bytes:N`
    NoBytesExpected,
    /// Pin number out of range or reserved
    InvalidPin,
    /// Numeric argument out of range
    InvalidValue,
    /// Payload too large for the transfer buffer
    PayloadTooLarge,
    /// I2C transaction failed (no ACK, bus fault)
    Bus,
    /// Timed out waiting for the host during a bulk transfer
    Timeout,
    /// Unexpected handshake character during a bulk transfer
    Handshake,
    /// Input line exceeded the line buffer
    Overflow,
}

/// Error taxonomy, used to decide how an error is reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed command or missing arguments
    Syntax,
    /// Argument out of range, no hardware touched
    Validation,
    /// I2C bus failure
    Protocol,
    /// Host side failure during a bulk transfer
    Transport,
}

impl Error {
    /// Which class of error this is
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::UnknownCommand | Error::Syntax | Error::TokenTooLong | Error::InvalidByte => {
                ErrorClass::Syntax
            }
            Error::NoBytesExpected
            | Error::InvalidPin
            | Error::InvalidValue
            | Error::PayloadTooLarge
            | Error::Overflow => ErrorClass::Validation,
            Error::Bus => ErrorClass::Protocol,
            Error::Timeout | Error::Handshake => ErrorClass::Transport,
        }
    }

    /// The single character sent to the host for this error in M2M mode
    pub fn m2m_char(&self) -> u8 {
        match self.class() {
            ErrorClass::Protocol => M2M_PROTOCOL_ERROR,
            _ => M2M_ERROR,
        }
    }
}

/// Type to represent the result of a bridge operation
pub type Result<T> = core::result::Result<T, Error>;
