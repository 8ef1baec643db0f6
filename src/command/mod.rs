//! Command grammar - tokenizing lines and parsing tokens into [`Command`]s.
//!
//! Lines are split on spaces into tokens of at most [`MAX_TOKEN_LEN`] bytes.  Each
//! token is either a command, or, while a write is collecting data, a payload byte
//! written as exactly two hex digits.
//!
//! Numeric arguments are hex with a `0x` prefix, or bare decimal.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

mod parse;

pub use parse::{parse_payload_byte, parse_token};

use crate::{Error, Result};

/// Longest token accepted
pub const MAX_TOKEN_LEN: usize = 19;

/// A parsed command token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `device?` - report the adapter identity, and reset transfer state
    Identify,
    /// `bin` - switch input to magic-delimited binary frames
    Binary,
    /// `bytes:<N>` - expected payload length for the next send, recv or writemem
    Bytes(usize),
    /// `addr:<addr>` - set the current I2C address
    Addr(u8),
    /// `tryaddr:<addr>` - bit-bang probe for a device
    TryAddr(u8),
    /// `send` / `send+hold` - collect payload bytes and write them.  `hold`
    /// keeps the bus for a repeated start.
    Send { hold: bool },
    /// `recv` - read `bytes:N` bytes from the current address
    Recv,
    /// `readmem:<dev>,<reg>,<len>` / `readmem:<reg>,<len>`
    ReadMem { dev: Option<u8>, reg: u8, len: usize },
    /// `writemem:<dev>,<reg>` / `writemem:<reg>` - collect payload bytes and
    /// write them after the register address
    WriteMem { dev: Option<u8>, reg: u8 },
    /// `iowrite:<pin>,<0|1>`
    IoWrite { pin: i32, high: bool },
    /// `ioread:<pin>[,pullup]`
    IoRead { pin: i32, pullup: bool },
    /// `getiolvl:<pin>` - read back the last output level
    GetIoLevel { pin: i32 },
    /// `m2m_resp:<0|1>`
    M2mResponses(bool),
    /// `noecho`
    NoEcho,
}

/// Iterator over the space separated tokens of a line.
///
/// Empty tokens, from repeated spaces, are skipped.  Tokens longer than
/// [`MAX_TOKEN_LEN`] are returned as [`Error::TokenTooLong`].
pub struct Tokens<'a> {
    rest: &'a [u8],
}

impl<'a> Tokens<'a> {
    pub fn new(line: &'a [u8]) -> Self {
        Self { rest: line }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.rest.is_empty() {
                return None;
            }
            let end = self
                .rest
                .iter()
                .position(|b| *b == b' ')
                .unwrap_or(self.rest.len());
            let token = &self.rest[..end];
            self.rest = self.rest.get(end + 1..).unwrap_or(&[]);
            if token.is_empty() {
                continue;
            }
            if token.len() > MAX_TOKEN_LEN {
                return Some(Err(Error::TokenTooLong));
            }
            return Some(Ok(token));
        }
    }
}
