//! Byte/line framer.
//!
//! Accumulates input bytes, one per call to [`Framer::push()`], into complete units:
//! - [`FramingMode::Ascii`] - a line terminated by carriage return.  Backspace and
//!   delete edit the line.  A space is appended to each completed line, so every token
//!   on it is delimiter terminated.
//! - [`FramingMode::Binary`] - a frame terminated by the 8 byte [`BIN_MAGIC`] sequence.
//!   There is no length prefix or escaping, so a payload containing the magic sequence
//!   ends the frame early.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use heapless::Vec;

use crate::config::OverflowPolicy;
use crate::io::Serial;
use crate::{Error, Result};

/// Backing storage for lines and frames
pub const LINE_CAPACITY: usize = 305;

/// An ASCII line reaching this length without a terminator overflows
pub const LINE_LIMIT: usize = 300;

/// Binary frame trailer
pub const BIN_MAGIC: [u8; 8] = [0xBA, 0xDC, 0x0F, 0xFE, 0xE0, 0x0F, 0xF0, 0x0D];

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7F;
const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// How input bytes are grouped
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    #[default]
    Ascii,
    Binary,
}

/// Local echo settings, taken from the session on each byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Echo {
    pub enabled: bool,
    pub m2m: bool,
}

impl Echo {
    // Typed characters and newlines are only echoed to humans
    fn chars(&self) -> bool {
        self.enabled && !self.m2m
    }
}

/// Line buffer, holding at most one line or frame
#[derive(Debug, Default)]
pub struct Framer {
    buf: Vec<u8, LINE_CAPACITY>,
    policy: OverflowPolicy,
    // The last unit is kept readable until the next byte arrives
    complete: bool,
}

impl Framer {
    pub fn new(policy: OverflowPolicy) -> Self {
        Self {
            buf: Vec::new(),
            policy,
            complete: false,
        }
    }

    /// Feed in one byte.
    ///
    /// Returns `Ok(Some(len))` when a line or frame is complete, after which
    /// [`Self::frame()`] returns it, until the next byte is pushed.
    ///
    /// Returns [`Error::Overflow`] if the buffer overflowed and the policy is
    /// [`OverflowPolicy::Report`].  The partial line is dropped in either case.
    pub fn push<S: Serial>(
        &mut self,
        byte: u8,
        mode: FramingMode,
        echo: Echo,
        serial: &mut S,
    ) -> Result<Option<usize>> {
        if self.complete {
            self.buf.clear();
            self.complete = false;
        }

        match mode {
            FramingMode::Ascii => self.push_ascii(byte, echo, serial),
            FramingMode::Binary => self.push_binary(byte),
        }
    }

    /// The most recently completed line or frame, `len` as returned by
    /// [`Self::push()`].
    pub fn frame(&self, len: usize) -> &[u8] {
        &self.buf[..len.min(self.buf.len())]
    }

    /// Number of bytes currently buffered
    pub fn len(&self) -> usize {
        if self.complete { 0 } else { self.buf.len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push_ascii<S: Serial>(
        &mut self,
        byte: u8,
        echo: Echo,
        serial: &mut S,
    ) -> Result<Option<usize>> {
        match byte {
            BACKSPACE | DELETE => {
                if self.buf.pop().is_some() && echo.enabled {
                    serial.write_bytes(&[BACKSPACE, b' ', BACKSPACE]);
                }
                Ok(None)
            }
            CR => {
                // Always fits - the line is reset before it reaches capacity
                let _ = self.buf.push(b' ');
                self.complete = true;
                if echo.chars() {
                    serial.write_bytes(b"\r\n");
                }
                trace!("Line complete, {} bytes", self.buf.len());
                Ok(Some(self.buf.len()))
            }
            // Hosts sending CRLF would otherwise start every line with LF
            LF => Ok(None),
            _ => {
                let _ = self.buf.push(byte);
                if echo.chars() {
                    serial.write_byte(byte);
                }
                if self.buf.len() >= LINE_LIMIT {
                    self.overflow()
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn push_binary(&mut self, byte: u8) -> Result<Option<usize>> {
        if self.buf.push(byte).is_err() {
            return self.overflow();
        }
        if self.buf.len() >= BIN_MAGIC.len() && self.buf.ends_with(&BIN_MAGIC) {
            self.complete = true;
            let len = self.buf.len() - BIN_MAGIC.len();
            trace!("Binary frame complete, {len} bytes");
            return Ok(Some(len));
        }
        Ok(None)
    }

    fn overflow(&mut self) -> Result<Option<usize>> {
        debug!("Line buffer overflow, discarding {} bytes", self.buf.len());
        self.buf.clear();
        match self.policy {
            OverflowPolicy::Discard => Ok(None),
            OverflowPolicy::Report => Err(Error::Overflow),
        }
    }
}
