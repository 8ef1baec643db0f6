//! Output to the host - text replies, hex dumps, and M2M bulk transfers.
//!
//! Every reply has two renderings, chosen by whether M2M responses are enabled:
//! - Human: coloured text lines, and 16 byte per row hex/ASCII dumps.
//! - M2M: single characters from the `.` `&` `X` `~` alphabet, and flow-controlled
//!   bulk transfers.
//!
//! A bulk transfer sends the buffer in chunks.  After each full chunk the device sends
//! `&` and waits for the host to answer `&` (continue) or `X` (abort).  This lets a
//! constrained host apply backpressure at fixed checkpoints.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use core::fmt::{self, Write};

use crate::io::Serial;
use crate::{Error, M2M_CONTINUE, M2M_ERROR, M2M_OK, Result};

/// Line ending used for human readable replies
pub const EOL: &str = "\r\n";

/// Bytes per dump row
const DUMP_ROW: usize = 16;

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// ANSI colours used in human readable replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    Red,
    Green,
    Blue,
    Cyan,
    Reset,
}

impl Colour {
    fn code(&self) -> &'static str {
        match self {
            Colour::Red => "\x1b[31m",
            Colour::Green => "\x1b[32m",
            Colour::Blue => "\x1b[34m",
            Colour::Cyan => "\x1b[36m",
            Colour::Reset => "\x1b[0m",
        }
    }
}

/// [`fmt::Write`] adapter for a [`Serial`]
pub struct SerialWriter<'a, S: Serial>(pub &'a mut S);

impl<S: Serial> Write for SerialWriter<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Reply to a single command, in either human or M2M form.
pub struct Reply<'a, S: Serial> {
    serial: &'a mut S,
    m2m: bool,
}

impl<'a, S: Serial> Reply<'a, S> {
    pub fn new(serial: &'a mut S, m2m: bool) -> Self {
        Self { serial, m2m }
    }

    pub fn m2m(&self) -> bool {
        self.m2m
    }

    /// Success.  `.` in M2M mode, otherwise `text` in blue.
    pub fn ok(&mut self, text: fmt::Arguments<'_>) {
        if self.m2m {
            self.serial.write_byte(M2M_OK);
        } else {
            self.line(Colour::Blue, text);
        }
    }

    /// Success with nothing to say to humans.  `.` in M2M mode only.
    pub fn ack(&mut self) {
        if self.m2m {
            self.serial.write_byte(M2M_OK);
        }
    }

    /// More input expected.  `&` in M2M mode, otherwise `text` in blue.
    pub fn more(&mut self, text: fmt::Arguments<'_>) {
        if self.m2m {
            self.serial.write_byte(M2M_CONTINUE);
        } else {
            self.line(Colour::Blue, text);
        }
    }

    /// Informational text, only shown to humans.
    pub fn info(&mut self, text: fmt::Arguments<'_>) {
        if !self.m2m {
            self.line(Colour::Blue, text);
        }
    }

    /// Failure.  The error's M2M character, otherwise `text` in red.
    pub fn error(&mut self, err: Error, text: fmt::Arguments<'_>) {
        debug!("Reply error {err:?}");
        if self.m2m {
            self.serial.write_byte(err.m2m_char());
        } else {
            self.line(Colour::Red, text);
        }
    }

    /// Uncoloured text, shown in both modes.
    pub fn plain(&mut self, text: fmt::Arguments<'_>) {
        let _ = SerialWriter(&mut *self.serial).write_fmt(text);
        let _ = SerialWriter(&mut *self.serial).write_str(EOL);
    }

    /// A raw byte, shown in both modes.
    pub fn raw(&mut self, byte: u8) {
        self.serial.write_byte(byte);
    }

    /// Hex dump of `data`, only shown to humans.
    pub fn dump(&mut self, data: &[u8]) {
        if !self.m2m {
            hex_dump(&mut *self.serial, data);
        }
    }

    /// Render `data` as a hex dump, or in M2M mode as a bulk transfer.
    pub fn buffer(&mut self, data: &[u8], encoding: Encoding, timeout_us: u32) {
        if self.m2m {
            if let Err(e) = send_m2m(&mut *self.serial, data, encoding, timeout_us) {
                warn!("Bulk transfer of {} bytes failed: {e:?}", data.len());
            }
        } else {
            hex_dump(&mut *self.serial, data);
        }
    }

    fn line(&mut self, colour: Colour, text: fmt::Arguments<'_>) {
        let mut w = SerialWriter(&mut *self.serial);
        let _ = w.write_str(colour.code());
        let _ = w.write_fmt(text);
        let _ = w.write_str(EOL);
        let _ = w.write_str(Colour::Reset.code());
    }
}

/// Write `data` as rows of 16 bytes, each row as hex then ASCII.
///
/// ```text
/// 000: 41 42 43 00 -- .. : ABC.
/// ```
///
/// Non-printable bytes are shown as `.` in the ASCII column.
pub fn hex_dump<S: Serial>(serial: &mut S, data: &[u8]) {
    let mut w = SerialWriter(serial);
    for (row, chunk) in data.chunks(DUMP_ROW).enumerate() {
        let _ = write!(w, "{}{:03}: {}", Colour::Blue.code(), row * DUMP_ROW, Colour::Cyan.code());
        for col in 0..DUMP_ROW {
            match chunk.get(col) {
                Some(byte) => {
                    let _ = write!(w, "{byte:02X} ");
                }
                None => {
                    let _ = w.write_str("   ");
                }
            }
        }
        let _ = write!(w, "{}: {}", Colour::Blue.code(), Colour::Green.code());
        for col in 0..DUMP_ROW {
            let c = match chunk.get(col) {
                Some(byte) if (32..=126).contains(byte) => *byte as char,
                Some(_) => '.',
                None => ' ',
            };
            let _ = w.write_char(c);
        }
        let _ = w.write_str(EOL);
    }
    let _ = w.write_str(Colour::Reset.code());
}

/// How bytes are sent in an M2M bulk transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Two hex digits and a space per byte, handshake every 16 bytes
    Ascii,
    /// Raw bytes, handshake every 64 bytes
    Binary,
}

impl Encoding {
    /// Bytes between handshakes
    pub fn chunk_size(&self) -> usize {
        match self {
            Encoding::Ascii => 16,
            Encoding::Binary => 64,
        }
    }
}

/// How an M2M bulk transfer finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// All bytes sent, `.` sent
    Complete,
    /// The host answered a handshake with `X`, `.` sent
    Aborted,
}

/// Send `data` as a flow-controlled M2M bulk transfer.
///
/// After every full chunk `&` is sent and the host has `timeout_us` to answer.
/// If the host times out or answers with anything other than `&` or `X`, `X` is
/// sent and [`Error::Timeout`] or [`Error::Handshake`] is returned.
pub fn send_m2m<S: Serial>(
    serial: &mut S,
    data: &[u8],
    encoding: Encoding,
    timeout_us: u32,
) -> Result<Outcome> {
    let chunk_size = encoding.chunk_size();
    for (ii, byte) in data.iter().enumerate() {
        match encoding {
            Encoding::Ascii => serial.write_bytes(&[
                HEX[(byte >> 4) as usize],
                HEX[(byte & 0x0F) as usize],
                b' ',
            ]),
            Encoding::Binary => serial.write_byte(*byte),
        }

        if ii % chunk_size == chunk_size - 1 {
            serial.write_byte(M2M_CONTINUE);
            match serial.read_byte(timeout_us) {
                Some(M2M_CONTINUE) => trace!("Host continue after {} bytes", ii + 1),
                Some(M2M_ERROR) => {
                    debug!("Host aborted transfer after {} bytes", ii + 1);
                    serial.write_byte(M2M_OK);
                    return Ok(Outcome::Aborted);
                }
                other => {
                    serial.write_byte(M2M_ERROR);
                    return Err(match other {
                        None => Error::Timeout,
                        Some(_) => Error::Handshake,
                    });
                }
            }
        }
    }
    serial.write_byte(M2M_OK);
    Ok(Outcome::Complete)
}
