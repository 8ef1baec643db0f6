//! Session state - everything the protocol remembers between tokens and lines.
//!
//! There is exactly one session, created at startup and living for the device's
//! uptime.  It is owned by [`crate::bridge::Bridge`] and only touched from its poll loop.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use heapless::Vec;

use crate::framer::{Echo, FramingMode};
use crate::{Error, Result};

/// Size of the transfer buffer
pub const BUFFER_CAPACITY: usize = 256;

/// What the dispatcher is doing with payload byte tokens
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Tokens are commands
    #[default]
    Idle,
    /// Collecting bytes for `send` / `send+hold`
    CollectingForSend,
    /// Collecting bytes for `writemem`
    CollectingForWriteMem,
}

/// Target of a pending `writemem`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemWrite {
    /// Explicit device address, or `None` to use the session's current address
    pub dev: Option<u8>,
    /// Register address, written before the payload
    pub reg: u8,
}

/// Protocol state
#[derive(Debug)]
pub struct Session {
    /// Current 7-bit I2C target address
    pub i2c_addr: u8,
    /// Payload length set by `bytes:N`
    pub expected: usize,
    /// Payload collected so far.  Its length is the fill cursor.
    pub buffer: Vec<u8, BUFFER_CAPACITY>,
    pub mode: TransferMode,
    /// Only set while in [`TransferMode::CollectingForWriteMem`]
    pub mem_write: Option<MemWrite>,
    /// Keep the bus for a repeated start after the next send
    pub repeated_start: bool,
    /// Reply with the M2M single character protocol
    pub m2m: bool,
    pub echo: bool,
    pub framing: FramingMode,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            i2c_addr: 0x00,
            expected: 0,
            buffer: Vec::new(),
            mode: TransferMode::Idle,
            mem_write: None,
            repeated_start: false,
            m2m: false,
            echo: true,
            framing: FramingMode::Ascii,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current echo settings, for the framer
    pub fn echo(&self) -> Echo {
        Echo {
            enabled: self.echo,
            m2m: self.m2m,
        }
    }

    /// Whether a write is collecting payload bytes
    pub fn collecting(&self) -> bool {
        self.mode != TransferMode::Idle
    }

    /// Payload bytes still expected
    pub fn remaining(&self) -> usize {
        self.expected.saturating_sub(self.buffer.len())
    }

    /// Set the expected payload length.  A transfer still collecting bytes is
    /// abandoned, as its bytes were counted against the old length.
    pub fn expect(&mut self, len: usize) -> Result<()> {
        if len > BUFFER_CAPACITY {
            return Err(Error::PayloadTooLarge);
        }
        self.reset_transfer();
        self.expected = len;
        Ok(())
    }

    /// Start collecting payload bytes for a plain write.
    pub fn begin_send(&mut self, hold: bool) -> Result<()> {
        if self.expected == 0 {
            return Err(Error::NoBytesExpected);
        }
        self.buffer.clear();
        self.mode = TransferMode::CollectingForSend;
        self.mem_write = None;
        self.repeated_start = hold;
        debug!(
            "Collecting {} bytes for {:#04X}, hold {hold}",
            self.expected, self.i2c_addr
        );
        Ok(())
    }

    /// Start collecting payload bytes for a register write.  The register
    /// byte shares the transaction, so at most 255 payload bytes fit.
    pub fn begin_write_mem(&mut self, target: MemWrite) -> Result<()> {
        if self.expected == 0 {
            return Err(Error::NoBytesExpected);
        }
        if self.expected > BUFFER_CAPACITY - 1 {
            return Err(Error::PayloadTooLarge);
        }
        self.buffer.clear();
        self.mode = TransferMode::CollectingForWriteMem;
        self.mem_write = Some(target);
        self.repeated_start = false;
        debug!(
            "Collecting {} bytes for register {:#04X}",
            self.expected, target.reg
        );
        Ok(())
    }

    /// Append a payload byte.
    ///
    /// Returns `true` once the expected number of bytes has been collected.
    pub fn push_byte(&mut self, byte: u8) -> Result<bool> {
        if self.buffer.len() >= self.expected {
            return Err(Error::PayloadTooLarge);
        }
        self.buffer.push(byte).map_err(|_| Error::PayloadTooLarge)?;
        trace!("Byte {byte:#04X}, {} remaining", self.remaining());
        Ok(self.buffer.len() == self.expected)
    }

    /// Device address a completed transfer should go to
    pub fn target_addr(&self) -> u8 {
        match self.mem_write {
            Some(MemWrite { dev: Some(dev), .. }) => dev,
            _ => self.i2c_addr,
        }
    }

    /// Back to idle after a completed write.  The expected count is consumed.
    pub fn finish_transfer(&mut self) {
        self.buffer.clear();
        self.expected = 0;
        self.mode = TransferMode::Idle;
        self.mem_write = None;
        self.repeated_start = false;
    }

    /// Drop any transfer in progress, as `device?` does.
    pub fn reset_transfer(&mut self) {
        if self.collecting() {
            debug!("Abandoning transfer, {} bytes collected", self.buffer.len());
        }
        self.finish_transfer();
    }
}
