//! The bridge - startup and the cooperative poll loop.
//!
//! There are no threads and no interrupt driven protocol logic.  Each call to
//! [`Bridge::poll()`]:
//! 1. waits up to [`BridgeConfig::poll_timeout_us`] for one input byte
//! 2. if that byte completes a line or frame, processes it to completion, including any
//!    I2C transactions and M2M bulk transfer handshakes
//! 3. advances the LED schedule
//!
//! All protocol state lives in the [`Dispatcher`], owned by the bridge, so no locking is
//! required.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::board::{init_i2c, read_board_address};
use crate::config::BridgeConfig;
use crate::dispatch::{Dispatcher, TokenResult};
use crate::framer::{FramingMode, Framer, LINE_CAPACITY};
use crate::indicator::Indicator;
use crate::io::{Gpio, I2cBus, Peripherals, Serial, StatusLed};
use crate::responder::{Reply, hex_dump};
use crate::session::Session;

/// Delay at the end of each poll loop iteration
const LOOP_DELAY_MS: u32 = 1;

/// Serial to I2C bridge.
///
/// Example usage:
///
/// ```rust,ignore
/// let mut bridge = Bridge::new(usb_serial, i2c1, sio, timer, led, BridgeConfig::default());
/// bridge.start();
/// loop {
///     bridge.poll();
/// }
/// ```
pub struct Bridge<S, I, G, D, L>
where
    S: Serial,
    I: I2cBus,
    G: Gpio,
    D: DelayNs,
    L: StatusLed,
{
    hw: Peripherals<S, I, G, D>,
    led: L,
    framer: Framer,
    dispatcher: Dispatcher,
    indicator: Indicator,
}

impl<S, I, G, D, L> Bridge<S, I, G, D, L>
where
    S: Serial,
    I: I2cBus,
    G: Gpio,
    D: DelayNs,
    L: StatusLed,
{
    pub fn new(serial: S, i2c: I, gpio: G, delay: D, led: L, config: BridgeConfig) -> Self {
        Self {
            hw: Peripherals::new(serial, i2c, gpio, delay),
            led,
            framer: Framer::new(config.overflow_policy),
            dispatcher: Dispatcher::new(config),
            indicator: Indicator::new(),
        }
    }

    /// Power-up sequence.  Reads the board address straps, gives the host time
    /// to enumerate, then brings up the I2C peripheral.
    pub fn start(&mut self) {
        let config = *self.dispatcher.config();

        self.hw.delay.delay_ms(config.strap_delay_ms);
        let board = read_board_address(&mut self.hw.gpio, &config.pins);
        self.dispatcher.set_board_addr(board);

        self.hw.delay.delay_ms(config.startup_delay_ms);
        self.led.set(false);
        init_i2c(&mut self.hw.i2c, &mut self.hw.gpio, &config);

        info!(
            "Bridge {}_{board} started, I2C at {} Hz",
            config.identity, config.i2c_frequency_hz
        );
    }

    /// Run one iteration of the poll loop.
    pub fn poll(&mut self) {
        let timeout = self.dispatcher.config().poll_timeout_us;
        if let Some(byte) = self.hw.serial.read_byte(timeout) {
            self.receive(byte);
        }

        if self.dispatcher.take_hold_off_request() {
            self.indicator.hold_off();
        }
        self.indicator.tick(&mut self.led, &mut self.hw.delay);
        self.hw.delay.delay_ms(LOOP_DELAY_MS);
    }

    /// Handle one input byte, processing the line if it completes one.
    pub fn receive(&mut self, byte: u8) -> Option<TokenResult> {
        let session = self.dispatcher.session();
        let (framing, echo, m2m) = (session.framing, session.echo(), session.m2m);

        match self
            .framer
            .push(byte, framing, echo, &mut self.hw.serial)
        {
            Ok(Some(len)) => {
                // Copied out, as processing may take a while and needs the whole bridge
                let line: Vec<u8, LINE_CAPACITY> =
                    Vec::from_slice(self.framer.frame(len)).unwrap_or_default();
                if framing == FramingMode::Binary && !m2m {
                    hex_dump(&mut self.hw.serial, &line);
                }
                let result = self.dispatcher.process_line(&mut self.hw, &line);
                if result == TokenResult::Error {
                    debug!("Empty {framing:?} frame ignored");
                }
                Some(result)
            }
            Ok(None) => None,
            Err(e) => {
                Reply::new(&mut self.hw.serial, m2m)
                    .error(e, format_args!("Line too long, discarded"));
                None
            }
        }
    }

    pub fn session(&self) -> &Session {
        self.dispatcher.session()
    }

    pub fn peripherals(&mut self) -> &mut Peripherals<S, I, G, D> {
        &mut self.hw
    }

    pub fn led(&mut self) -> &mut L {
        &mut self.led
    }

    /// Tear down the bridge, returning the hardware.
    pub fn release(self) -> (Peripherals<S, I, G, D>, L) {
        (self.hw, self.led)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::framer::{BIN_MAGIC, LINE_LIMIT};
    use crate::io::PinFunction;
    use crate::testing::{MockDelay, MockGpio, MockI2c, MockLed, MockSerial, Transaction};

    type TestBridge = Bridge<MockSerial, MockI2c, MockGpio, MockDelay, MockLed>;

    fn bridge_with(config: BridgeConfig, gpio: MockGpio) -> TestBridge {
        let mut i2c = MockI2c::default();
        i2c.add_device(0x20, &[0u8; 16]);
        Bridge::new(
            MockSerial::default(),
            i2c,
            gpio,
            MockDelay::default(),
            MockLed::default(),
            config,
        )
    }

    fn bridge() -> TestBridge {
        bridge_with(BridgeConfig::default(), MockGpio::default())
    }

    fn type_in(bridge: &mut TestBridge, input: &[u8]) -> Option<TokenResult> {
        let mut last = None;
        for byte in input {
            last = bridge.receive(*byte);
        }
        last
    }

    fn serial(bridge: &mut TestBridge) -> &mut MockSerial {
        &mut bridge.peripherals().serial
    }

    #[test_log::test]
    fn start_reads_board_address() {
        let mut gpio = MockGpio::default();
        gpio.force_low(2);
        let mut bridge = bridge_with(BridgeConfig::default(), gpio);
        bridge.start();

        assert_eq!(bridge.led().changes, 1);
        assert!(!bridge.led().on);
        let hw = bridge.peripherals();
        assert_eq!(hw.i2c.init_count(), 1);
        assert_eq!(hw.i2c.frequency(), Some(100_000));
        assert_eq!(hw.gpio.function(14), PinFunction::I2c);
        assert_eq!(hw.gpio.function(15), PinFunction::I2c);
        assert!(hw.gpio.is_pulled_up(2));
        assert_eq!(hw.delay.total_us(), (100 + 3000) * 1000);

        type_in(&mut bridge, b"device?\r");
        assert_eq!(serial(&mut bridge).output_text(), "device?\r\neasy_adapter_1\r\n");
    }

    #[test]
    fn line_is_echoed_then_executed() {
        let mut bridge = bridge();
        let result = type_in(&mut bridge, b"addr:0x20 bytes:2 send AB CD\r");

        assert_eq!(result, Some(TokenResult::LineComplete));
        let (hw, _) = bridge.release();
        assert_eq!(hw.i2c.log(), [Transaction::write(0x20, &[0xAB, 0xCD], false)]);
        let out = hw.serial.output_text_plain();
        assert!(out.starts_with("addr:0x20 bytes:2 send AB CD\r\n"), "{out}");
        assert!(out.contains("Sending 2 bytes\r\n"), "{out}");
    }

    #[test]
    fn crlf_hosts() {
        let mut bridge = bridge();
        type_in(&mut bridge, b"addr:0x20\r\naddr:0x21\r\n");
        assert_eq!(bridge.session().i2c_addr, 0x21);
    }

    #[test]
    fn m2m_mode_is_silent() {
        let mut bridge = bridge();
        type_in(&mut bridge, b"m2m_resp:1\r");
        // Echo was still on while the command was typed
        assert_eq!(serial(&mut bridge).output(), b"m2m_resp:1\r\n.");

        serial(&mut bridge).clear_output();
        type_in(&mut bridge, b"addr:0x20 bytes:2 send AB CD\r");
        assert_eq!(serial(&mut bridge).output(), b".");

        serial(&mut bridge).clear_output();
        type_in(&mut bridge, b"addr:0x20 bytes:3 send AB\r");
        assert_eq!(serial(&mut bridge).output(), b"&");
    }

    #[test]
    fn noecho() {
        let mut bridge = bridge();
        type_in(&mut bridge, b"noecho\r");
        assert!(!bridge.session().echo);

        serial(&mut bridge).clear_output();
        type_in(&mut bridge, b"addr:0x2F\x080\r");
        assert_eq!(bridge.session().i2c_addr, 0x20);
        assert_eq!(
            serial(&mut bridge).output_text_plain(),
            "I2C address set to 0x20\r\n"
        );
    }

    #[test]
    fn backspace_edits_line() {
        let mut bridge = bridge();
        type_in(&mut bridge, b"addr:0x2F\x7F0\r");
        assert_eq!(bridge.session().i2c_addr, 0x20);
        assert!(serial(&mut bridge).output_text().starts_with("addr:0x2F\x08 \x080\r\n"));
    }

    #[test]
    fn binary_frame() {
        let mut bridge = bridge();
        type_in(&mut bridge, b"bin\r");
        assert_eq!(bridge.session().framing, FramingMode::Binary);

        serial(&mut bridge).clear_output();
        let frame = b"addr:0x20 bytes:1 send 7F";
        assert_eq!(type_in(&mut bridge, frame), None);
        let result = type_in(&mut bridge, &BIN_MAGIC);

        assert_eq!(result, Some(TokenResult::LineComplete));
        let out = serial(&mut bridge).output_text_plain();
        // The frame is shown as received, then executed
        assert!(out.starts_with("000: 61 64 64 72 3A "), "{out}");
        assert!(out.contains("016: 31 20 73 65 6E 64 20 37 46 "), "{out}");
        assert!(out.contains("Sending 1 bytes"), "{out}");
        assert_eq!(
            bridge.peripherals().i2c.log(),
            [Transaction::write(0x20, &[0x7F], false)]
        );
    }

    #[test]
    fn binary_frame_m2m() {
        let mut bridge = bridge();
        type_in(&mut bridge, b"m2m_resp:1\r");
        type_in(&mut bridge, b"bin\r");

        serial(&mut bridge).clear_output();
        type_in(&mut bridge, b"addr:0x20 bytes:2 recv");
        type_in(&mut bridge, &BIN_MAGIC);
        assert_eq!(serial(&mut bridge).output(), b"\x00\x00.");
    }

    #[test]
    fn overflow_discards_silently() {
        let mut bridge = bridge();
        for _ in 0..LINE_LIMIT {
            assert_eq!(bridge.receive(b'a'), None);
        }
        assert!(!serial(&mut bridge).output_text().contains("Line too long"));

        type_in(&mut bridge, b"addr:0x20\r");
        assert_eq!(bridge.session().i2c_addr, 0x20);
    }

    #[test]
    fn overflow_reported() {
        let config = BridgeConfig {
            overflow_policy: OverflowPolicy::Report,
            ..Default::default()
        };
        let mut bridge = bridge_with(config, MockGpio::default());
        for _ in 0..LINE_LIMIT {
            bridge.receive(b'a');
        }
        assert!(
            serial(&mut bridge)
                .output_text_plain()
                .ends_with("Line too long, discarded\r\n")
        );

        type_in(&mut bridge, b"m2m_resp:1\r");
        serial(&mut bridge).clear_output();
        for _ in 0..LINE_LIMIT {
            bridge.receive(b'a');
        }
        assert_eq!(serial(&mut bridge).output(), b"X");
    }

    #[test_log::test]
    fn poll_runs_commands_and_led() {
        let mut bridge = bridge();
        serial(&mut bridge).push_input(b"device?\r");

        for _ in 0..b"device?\r".len() {
            bridge.poll();
        }

        let timeout = BridgeConfig::default().poll_timeout_us;
        assert_eq!(serial(&mut bridge).reads_with_timeout(timeout), 8);
        assert!(serial(&mut bridge).output_text().ends_with("easy_adapter_0\r\n"));
        // device? starts the LED hold-off
        assert!(!bridge.led().on);
        assert_eq!(bridge.peripherals().delay.total_us(), 8 * 1000 + 20 * 1000);
    }

    #[test]
    fn poll_without_input() {
        let mut bridge = bridge();
        bridge.poll();
        assert!(bridge.led().on);
        assert!(serial(&mut bridge).output().is_empty());
    }
}
