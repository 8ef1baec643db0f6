//! Command dispatcher - the token level protocol state machine.
//!
//! Each completed line is split into tokens and fed to [`Dispatcher::dispatch()`] one at
//! a time, until a token reports [`TokenResult::LineComplete`].  If the tokens run out
//! first, the end of the line is signalled, which reports how many payload bytes are
//! still expected by a write in progress.
//!
//! Writes (`send`, `send+hold`, `writemem`) collect their payload from the tokens that
//! follow, possibly spread over several lines:
//!
//! ```text
//!  Idle --send/send+hold--> CollectingForSend -----+
//!   ^                                              | N bytes collected:
//!   +--writemem-----------> CollectingForWriteMem -+ write, back to Idle
//! ```
//!
//! Setup commands (`addr:`, `bytes:`, `noecho`) let the rest of the line run, so a whole
//! write fits on one line.  In M2M mode their `.` is held back, and the next reply on the
//! line replaces it: `addr:0x20 bytes:2 send AB CD` answers with a single `.`, or `~` if
//! the device NAKs.  If nothing else replies, the `.` is sent at the end of the line.
//!
//! Commands are recognised in every state, so `device?` can be used to abandon a
//! transfer.  A malformed payload token is reported, but leaves the transfer
//! pending at the same position, so the host can resend the byte.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use embedded_hal::delay::DelayNs;

use crate::board::check_pin;
use crate::command::{Command, Tokens, parse_payload_byte, parse_token};
use crate::config::BridgeConfig;
use crate::framer::FramingMode;
use crate::io::{Direction, Gpio, I2cBus, Peripherals, Serial};
use crate::mem::{read_register, write_register};
use crate::probe::{Presence, try_address};
use crate::responder::{Encoding, Reply};
use crate::session::{BUFFER_CAPACITY, MemWrite, Session, TransferMode};
use crate::{Error, M2M_OK, Result};

/// Result of dispatching a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenResult {
    /// Nothing to dispatch
    Error,
    /// More tokens, on this line or the next, are expected
    Continue,
    /// Stop processing this line
    LineComplete,
}

/// Protocol state machine.
pub struct Dispatcher {
    session: Session,
    config: BridgeConfig,
    board_addr: u8,
    hold_off_requested: bool,
    // M2M ack owed by a setup command, taken over by the next reply
    ack_pending: bool,
}

impl Dispatcher {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            session: Session::new(),
            config,
            board_addr: 0,
            hold_off_requested: false,
            ack_pending: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Set the board number reported by `device?`.
    pub fn set_board_addr(&mut self, addr: u8) {
        self.board_addr = addr;
    }

    /// Whether `device?` has asked for the LED hold-off since the last call.
    pub fn take_hold_off_request(&mut self) -> bool {
        core::mem::take(&mut self.hold_off_requested)
    }

    /// Dispatch every token on a line.
    pub fn process_line<S, I, G, D>(
        &mut self,
        hw: &mut Peripherals<S, I, G, D>,
        line: &[u8],
    ) -> TokenResult
    where
        S: Serial,
        I: I2cBus,
        G: Gpio,
        D: DelayNs,
    {
        if line.is_empty() {
            return TokenResult::Error;
        }

        let mut completed = false;
        for token in Tokens::new(line) {
            let result = match token {
                Ok(token) => self.dispatch(hw, token),
                Err(e) => {
                    self.reply(&mut hw.serial)
                        .error(e, format_args!("Token too long"));
                    TokenResult::LineComplete
                }
            };
            if result == TokenResult::LineComplete {
                completed = true;
                break;
            }
        }

        if !completed {
            self.end_of_line(&mut hw.serial);
        }
        if core::mem::take(&mut self.ack_pending) {
            hw.serial.write_byte(M2M_OK);
        }
        TokenResult::LineComplete
    }

    /// Dispatch a single token.
    pub fn dispatch<S, I, G, D>(
        &mut self,
        hw: &mut Peripherals<S, I, G, D>,
        token: &[u8],
    ) -> TokenResult
    where
        S: Serial,
        I: I2cBus,
        G: Gpio,
        D: DelayNs,
    {
        trace!("Token {:?}", Printable(token));
        match parse_token(token) {
            Ok(command) => self.execute(hw, command),
            Err(Error::UnknownCommand) if self.session.collecting() => {
                self.collect_byte(hw, token)
            }
            Err(e) => {
                let mut reply = self.reply(&mut hw.serial);
                match e {
                    Error::UnknownCommand => {
                        reply.error(e, format_args!("Unknown command: {}", Printable(token)))
                    }
                    Error::InvalidValue => {
                        reply.error(e, format_args!("Value out of range: {}", Printable(token)))
                    }
                    _ => reply.error(e, format_args!("Invalid syntax: {}", Printable(token))),
                }
                TokenResult::LineComplete
            }
        }
    }

    /// Signal the end of a line.  Reports the payload bytes still expected, if
    /// a write is collecting.
    pub fn end_of_line<S: Serial>(&mut self, serial: &mut S) -> TokenResult {
        if self.session.collecting() {
            let remaining = self.session.remaining();
            self.reply(serial)
                .more(format_args!("Remaining bytes expected: {remaining}"));
        }
        TokenResult::LineComplete
    }

    fn execute<S, I, G, D>(
        &mut self,
        hw: &mut Peripherals<S, I, G, D>,
        command: Command,
    ) -> TokenResult
    where
        S: Serial,
        I: I2cBus,
        G: Gpio,
        D: DelayNs,
    {
        debug!("Command {command:?}");
        match command {
            Command::Identify => {
                let identity = self.config.identity;
                let board = self.board_addr;
                self.reply(&mut hw.serial)
                    .plain(format_args!("{identity}_{board}"));
                self.session.reset_transfer();
                self.hold_off_requested = true;
            }
            Command::Binary => {
                self.session.framing = FramingMode::Binary;
                self.reply(&mut hw.serial)
                    .ok(format_args!("Switching to binary mode"));
            }
            // Setup commands leave the rest of the line to be processed, so a
            // whole write fits on one line
            Command::Bytes(len) => match self.session.expect(len) {
                Ok(()) => {
                    self.setup_ok(&mut hw.serial, format_args!("Expecting {len} bytes"));
                    return TokenResult::Continue;
                }
                Err(e) => self
                    .reply(&mut hw.serial)
                    .error(e, format_args!("Too many bytes, maximum {BUFFER_CAPACITY}")),
            },
            Command::Addr(addr) => {
                self.session.i2c_addr = addr;
                self.setup_ok(&mut hw.serial, format_args!("I2C address set to 0x{addr:02X}"));
                return TokenResult::Continue;
            }
            Command::TryAddr(addr) => {
                let presence = try_address(
                    &mut hw.i2c,
                    &mut hw.gpio,
                    &mut hw.delay,
                    &self.config,
                    addr,
                );
                let mut reply = self.reply(&mut hw.serial);
                match presence {
                    Presence::Ack => reply.ok(format_args!("Device found at address 0x{addr:02X}")),
                    Presence::Nak => reply.error(
                        Error::Bus,
                        format_args!("Protocol error! Does the I2C device exist?"),
                    ),
                }
            }
            Command::Send { hold } => {
                if let Err(e) = self.session.begin_send(hold) {
                    self.reply(&mut hw.serial)
                        .error(e, format_args!("No bytes expected"));
                    return TokenResult::LineComplete;
                }
                return TokenResult::Continue;
            }
            Command::WriteMem { dev, reg } => {
                match self.session.begin_write_mem(MemWrite { dev, reg }) {
                    Ok(()) => return TokenResult::Continue,
                    Err(Error::NoBytesExpected) => self
                        .reply(&mut hw.serial)
                        .error(Error::NoBytesExpected, format_args!("No bytes expected")),
                    Err(e) => self.reply(&mut hw.serial).error(
                        e,
                        format_args!("Too many bytes for writemem, maximum {}", BUFFER_CAPACITY - 1),
                    ),
                }
            }
            Command::Recv => self.recv(hw),
            Command::ReadMem { dev, reg, len } => self.read_mem(hw, dev, reg, len),
            Command::IoWrite { pin, high } => match check_pin(&self.config.pins, pin) {
                Ok(pin) => {
                    hw.gpio.init(pin);
                    hw.gpio.set_direction(pin, Direction::Output);
                    hw.gpio.put(pin, high);
                    self.reply(&mut hw.serial)
                        .ok(format_args!("Port {pin} set to output {}", high as u8));
                }
                Err(e) => self.invalid_pin(&mut hw.serial, e),
            },
            Command::IoRead { pin, pullup } => match check_pin(&self.config.pins, pin) {
                Ok(pin) => {
                    hw.gpio.init(pin);
                    hw.gpio.set_direction(pin, Direction::Input);
                    if pullup {
                        hw.gpio.pull_up(pin);
                    }
                    let level = hw.gpio.get(pin) as u8;
                    self.report_level(
                        &mut hw.serial,
                        level,
                        format_args!("Port {pin} read input as {level}"),
                    );
                }
                Err(e) => self.invalid_pin(&mut hw.serial, e),
            },
            Command::GetIoLevel { pin } => match check_pin(&self.config.pins, pin) {
                Ok(pin) => {
                    let level = hw.gpio.out_level(pin) as u8;
                    self.report_level(
                        &mut hw.serial,
                        level,
                        format_args!("Port {pin} out level was {level}"),
                    );
                }
                Err(e) => self.invalid_pin(&mut hw.serial, e),
            },
            Command::M2mResponses(on) => {
                self.session.m2m = on;
                self.reply(&mut hw.serial)
                    .ok(format_args!("M2M response off"));
            }
            Command::NoEcho => {
                self.session.echo = false;
                self.setup_ok(&mut hw.serial, format_args!("Echo off"));
                return TokenResult::Continue;
            }
        }
        TokenResult::LineComplete
    }

    fn collect_byte<S, I, G, D>(
        &mut self,
        hw: &mut Peripherals<S, I, G, D>,
        token: &[u8],
    ) -> TokenResult
    where
        S: Serial,
        I: I2cBus,
        G: Gpio,
        D: DelayNs,
    {
        let result = parse_payload_byte(token).and_then(|byte| self.session.push_byte(byte));
        match result {
            Ok(false) => TokenResult::Continue,
            Ok(true) => {
                self.complete_transfer(hw);
                TokenResult::LineComplete
            }
            Err(e) => {
                warn!("Invalid byte, {} still expected", self.session.remaining());
                self.reply(&mut hw.serial)
                    .error(e, format_args!("Invalid byte: {}", Printable(token)));
                TokenResult::LineComplete
            }
        }
    }

    // All expected payload bytes have arrived - perform the write
    fn complete_transfer<S, I, G, D>(&mut self, hw: &mut Peripherals<S, I, G, D>)
    where
        S: Serial,
        I: I2cBus,
        G: Gpio,
        D: DelayNs,
    {
        let m2m = self.session.m2m;
        let data = self.session.buffer.as_slice();
        let len = data.len();

        let result = match (self.session.mode, self.session.mem_write) {
            (TransferMode::CollectingForWriteMem, Some(MemWrite { reg, .. })) => {
                let dev = self.session.target_addr();
                let mut reply = Reply::new(&mut hw.serial, m2m);
                reply.info(format_args!(
                    "Writemem: dev=0x{dev:02X} reg=0x{reg:02X} len={len}"
                ));
                reply.dump(data);
                write_register(&mut hw.i2c, dev, reg, data)
            }
            _ => {
                let dev = self.session.i2c_addr;
                let nostop = self.session.repeated_start;
                let mut reply = Reply::new(&mut hw.serial, m2m);
                reply.info(format_args!("Sending {len} bytes"));
                reply.dump(data);
                i2c_write(&mut hw.i2c, dev, data, nostop)
            }
        };
        self.session.finish_transfer();

        let mut reply = self.reply(&mut hw.serial);
        match result {
            Ok(()) => reply.ack(),
            Err(e) => reply.error(
                e,
                format_args!("Protocol error sending bytes! Does the I2C device exist?"),
            ),
        }
    }

    fn recv<S, I, G, D>(&mut self, hw: &mut Peripherals<S, I, G, D>)
    where
        S: Serial,
        I: I2cBus,
        G: Gpio,
        D: DelayNs,
    {
        let len = self.session.expected;
        if len == 0 {
            self.reply(&mut hw.serial)
                .error(Error::NoBytesExpected, format_args!("No bytes expected"));
            return;
        }

        let dev = self.session.i2c_addr;
        let mut buf = [0u8; BUFFER_CAPACITY];
        let result = hw
            .i2c
            .read(dev, &mut buf[..len], false)
            .map(|_| ())
            .map_err(|e| {
                warn!("Read of {len} bytes from {dev:#04X} failed: {e:?}");
                Error::Bus
            });
        self.render_read(
            &mut hw.serial,
            result,
            &buf[..len],
            format_args!("Protocol error reading bytes! Does the I2C device exist?"),
        );
    }

    fn read_mem<S, I, G, D>(
        &mut self,
        hw: &mut Peripherals<S, I, G, D>,
        dev: Option<u8>,
        reg: u8,
        len: usize,
    ) where
        S: Serial,
        I: I2cBus,
        G: Gpio,
        D: DelayNs,
    {
        let dev = dev.unwrap_or(self.session.i2c_addr);
        let len = len.min(BUFFER_CAPACITY);
        let mut buf = [0u8; BUFFER_CAPACITY];
        let result = read_register(&mut hw.i2c, dev, reg, &mut buf[..len]);
        self.render_read(
            &mut hw.serial,
            result,
            &buf[..len],
            format_args!("Protocol error reading bytes from mem!"),
        );
    }

    fn render_read<S: Serial>(
        &mut self,
        serial: &mut S,
        result: Result<()>,
        data: &[u8],
        failure: core::fmt::Arguments<'_>,
    ) {
        let mut reply = self.reply(serial);
        match result {
            Ok(()) => reply.buffer(data, self.encoding(), self.config.handshake_timeout_us),
            Err(e) => reply.error(e, failure),
        }
    }

    fn report_level<S: Serial>(&mut self, serial: &mut S, level: u8, text: core::fmt::Arguments<'_>) {
        let mut reply = self.reply(serial);
        if reply.m2m() {
            reply.raw(b'0' + level);
        }
        reply.ok(text);
    }

    fn invalid_pin<S: Serial>(&mut self, serial: &mut S, e: Error) {
        self.reply(serial)
            .error(e, format_args!("Error, invalid IO port or value"));
    }

    fn encoding(&self) -> Encoding {
        match self.session.framing {
            FramingMode::Ascii => Encoding::Ascii,
            FramingMode::Binary => Encoding::Binary,
        }
    }

    // Every reply made through here takes over a pending setup ack
    fn reply<'a, S: Serial>(&mut self, serial: &'a mut S) -> Reply<'a, S> {
        self.ack_pending = false;
        Reply::new(serial, self.session.m2m)
    }

    // Acknowledge a command that lets the line continue
    fn setup_ok<S: Serial>(&mut self, serial: &mut S, text: core::fmt::Arguments<'_>) {
        if self.session.m2m {
            self.ack_pending = true;
        } else {
            self.reply(serial).ok(text);
        }
    }
}

fn i2c_write<I: I2cBus>(i2c: &mut I, dev: u8, data: &[u8], nostop: bool) -> Result<()> {
    i2c.write(dev, data, nostop).map_err(|e| {
        warn!("Write of {} bytes to {dev:#04X} failed: {e:?}", data.len());
        Error::Bus
    })?;
    Ok(())
}

// Shows a token as text, falling back to a placeholder for non UTF-8 input
struct Printable<'a>(&'a [u8]);

impl core::fmt::Display for Printable<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match core::str::from_utf8(self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => f.write_str("<binary>"),
        }
    }
}

impl core::fmt::Debug for Printable<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "\"{self}\"")
    }
}
