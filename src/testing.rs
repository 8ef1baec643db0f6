//! Simulated hardware for unit tests.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use std::collections::{BTreeMap, VecDeque};
use std::string::String;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;

use crate::io::{Direction, Gpio, I2cBus, PinFunction, Serial, StatusLed};

/// Serial port with scripted input, recording everything written.
#[derive(Debug, Default)]
pub struct MockSerial {
    input: VecDeque<u8>,
    output: Vec<u8>,
    read_timeouts: Vec<u32>,
}

impl MockSerial {
    pub fn with_input(input: &[u8]) -> Self {
        let mut serial = Self::default();
        serial.push_input(input);
        serial
    }

    pub fn push_input(&mut self, input: &[u8]) {
        self.input.extend(input);
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Output with ANSI colour sequences removed
    pub fn output_text_plain(&self) -> String {
        let text = self.output_text();
        let mut plain = String::new();
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                for c in chars.by_ref() {
                    if c == 'm' {
                        break;
                    }
                }
            } else {
                plain.push(c);
            }
        }
        plain
    }

    /// Number of reads made with the given timeout
    pub fn reads_with_timeout(&self, timeout_us: u32) -> usize {
        self.read_timeouts
            .iter()
            .filter(|t| **t == timeout_us)
            .count()
    }

    pub fn pending_input(&self) -> usize {
        self.input.len()
    }
}

impl Serial for MockSerial {
    fn read_byte(&mut self, timeout_us: u32) -> Option<u8> {
        self.read_timeouts.push(timeout_us);
        self.input.pop_front()
    }

    fn write_byte(&mut self, byte: u8) {
        self.output.push(byte);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Write(Vec<u8>),
    Read(usize),
}

/// A recorded I2C transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub addr: u8,
    pub op: Op,
    pub nostop: bool,
}

impl Transaction {
    pub fn write(addr: u8, data: &[u8], nostop: bool) -> Self {
        Self {
            addr,
            op: Op::Write(data.to_vec()),
            nostop,
        }
    }

    pub fn read(addr: u8, len: usize, nostop: bool) -> Self {
        Self {
            addr,
            op: Op::Read(len),
            nostop,
        }
    }
}

#[derive(Debug)]
pub struct MockI2cError;

// Register addressed memory device - the first byte written sets the pointer
#[derive(Debug)]
struct Device {
    memory: Vec<u8>,
    pointer: usize,
}

/// I2C bus with memory-like devices, recording every transaction.
#[derive(Debug, Default)]
pub struct MockI2c {
    devices: BTreeMap<u8, Device>,
    log: Vec<Transaction>,
    inits: usize,
    frequency: Option<u32>,
}

impl MockI2c {
    pub fn add_device(&mut self, addr: u8, memory: &[u8]) {
        self.devices.insert(
            addr,
            Device {
                memory: memory.to_vec(),
                pointer: 0,
            },
        );
    }

    pub fn memory(&self, addr: u8) -> &[u8] {
        &self.devices[&addr].memory
    }

    pub fn log(&self) -> &[Transaction] {
        &self.log
    }

    pub fn init_count(&self) -> usize {
        self.inits
    }

    pub fn frequency(&self) -> Option<u32> {
        self.frequency
    }
}

impl I2cBus for MockI2c {
    type Error = MockI2cError;

    fn init(&mut self, frequency_hz: u32) {
        self.inits += 1;
        self.frequency = Some(frequency_hz);
    }

    fn write(&mut self, addr: u8, data: &[u8], nostop: bool) -> Result<usize, Self::Error> {
        self.log.push(Transaction::write(addr, data, nostop));
        let device = self.devices.get_mut(&addr).ok_or(MockI2cError)?;
        if let Some((pointer, rest)) = data.split_first() {
            device.pointer = *pointer as usize;
            for byte in rest {
                let len = device.memory.len();
                device.memory[device.pointer % len] = *byte;
                device.pointer += 1;
            }
        }
        Ok(data.len())
    }

    fn read(&mut self, addr: u8, buf: &mut [u8], nostop: bool) -> Result<usize, Self::Error> {
        self.log.push(Transaction::read(addr, buf.len(), nostop));
        let device = self.devices.get_mut(&addr).ok_or(MockI2cError)?;
        for byte in buf.iter_mut() {
            *byte = device.memory[device.pointer % device.memory.len()];
            device.pointer += 1;
        }
        Ok(buf.len())
    }
}

#[derive(Debug, Clone, Copy)]
struct PinState {
    function: PinFunction,
    direction: Direction,
    out: bool,
    pulled_up: bool,
    forced_low: bool,
}

impl Default for PinState {
    fn default() -> Self {
        Self {
            function: PinFunction::Gpio,
            direction: Direction::Input,
            out: false,
            pulled_up: false,
            forced_low: false,
        }
    }
}

// Bit level model of an I2C target, watching the SDA and SCL pads
#[derive(Debug, Default)]
struct Target {
    sda: u8,
    scl: u8,
    addr: u8,
    prev_sda: bool,
    prev_scl: bool,
    active: bool,
    bits: u8,
    count: u8,
    acking: bool,
    header: Option<u8>,
    starts: usize,
}

const PIN_COUNT: usize = 32;

/// GPIO block.  Undriven pads read high.  Optionally has an I2C target
/// attached to two of the pins, which ACKs its address.
#[derive(Debug)]
pub struct MockGpio {
    pins: [PinState; PIN_COUNT],
    target: Option<Target>,
    calls: usize,
}

impl Default for MockGpio {
    fn default() -> Self {
        Self {
            pins: [PinState::default(); PIN_COUNT],
            target: None,
            calls: 0,
        }
    }
}

impl MockGpio {
    pub fn with_i2c_target(sda: u8, scl: u8, addr: u8) -> Self {
        let mut gpio = Self::default();
        gpio.target = Some(Target {
            sda,
            scl,
            addr,
            prev_sda: true,
            prev_scl: true,
            ..Default::default()
        });
        gpio
    }

    /// Hold a pad low externally, as a fitted strap or a grounded input would
    pub fn force_low(&mut self, pin: u8) {
        self.pins[pin as usize].forced_low = true;
    }

    pub fn is_pulled_up(&self, pin: u8) -> bool {
        self.pins[pin as usize].pulled_up
    }

    pub fn function(&self, pin: u8) -> PinFunction {
        self.pins[pin as usize].function
    }

    pub fn direction(&self, pin: u8) -> Direction {
        self.pins[pin as usize].direction
    }

    /// Number of calls made through the [`Gpio`] trait
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Address byte the target last received
    pub fn target_header(&self) -> Option<u8> {
        self.target.as_ref().and_then(|t| t.header)
    }

    pub fn target_starts(&self) -> usize {
        self.target.as_ref().map_or(0, |t| t.starts)
    }

    fn level(&self, pin: u8) -> bool {
        let state = &self.pins[pin as usize];
        if state.forced_low {
            return false;
        }
        if let Some(target) = &self.target {
            if target.acking && pin == target.sda {
                return false;
            }
        }
        match state.direction {
            Direction::Output => state.out,
            Direction::Input => true,
        }
    }

    fn update_target(&mut self) {
        let Some((sda_pin, scl_pin)) = self.target.as_ref().map(|t| (t.sda, t.scl)) else {
            return;
        };
        let sda = self.level(sda_pin);
        let scl = self.level(scl_pin);
        let Some(t) = self.target.as_mut() else {
            return;
        };

        if scl && t.prev_scl {
            if t.prev_sda && !sda {
                t.active = true;
                t.bits = 0;
                t.count = 0;
                t.acking = false;
                t.starts += 1;
            } else if !t.prev_sda && sda {
                t.active = false;
                t.acking = false;
            }
        } else if t.active && scl && !t.prev_scl {
            if t.count < 8 {
                t.bits = (t.bits << 1) | sda as u8;
                t.count += 1;
                if t.count == 8 {
                    t.header = Some(t.bits);
                }
            }
        } else if t.active && !scl && t.prev_scl {
            if t.count == 8 {
                if t.bits >> 1 == t.addr {
                    t.acking = true;
                    t.count = 9;
                } else {
                    t.active = false;
                }
            } else if t.count == 9 {
                t.acking = false;
                t.active = false;
            }
        }

        t.prev_sda = sda && !t.acking;
        t.prev_scl = scl;
    }
}

impl Gpio for MockGpio {
    fn init(&mut self, pin: u8) {
        self.calls += 1;
        let state = &mut self.pins[pin as usize];
        state.function = PinFunction::Gpio;
        state.direction = Direction::Input;
        state.out = false;
        self.update_target();
    }

    fn set_function(&mut self, pin: u8, function: PinFunction) {
        self.calls += 1;
        self.pins[pin as usize].function = function;
    }

    fn set_direction(&mut self, pin: u8, direction: Direction) {
        self.calls += 1;
        self.pins[pin as usize].direction = direction;
        self.update_target();
    }

    fn pull_up(&mut self, pin: u8) {
        self.calls += 1;
        self.pins[pin as usize].pulled_up = true;
    }

    fn put(&mut self, pin: u8, high: bool) {
        self.calls += 1;
        self.pins[pin as usize].out = high;
        self.update_target();
    }

    fn get(&mut self, pin: u8) -> bool {
        self.calls += 1;
        self.level(pin)
    }

    fn out_level(&mut self, pin: u8) -> bool {
        self.calls += 1;
        self.pins[pin as usize].out
    }
}

/// Delay that only counts
#[derive(Debug, Default)]
pub struct MockDelay {
    total_ns: u64,
}

impl MockDelay {
    pub fn total_us(&self) -> u64 {
        self.total_ns / 1000
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
    }
}

#[derive(Debug, Default)]
pub struct MockLed {
    pub on: bool,
    /// Number of calls to [`StatusLed::set()`]
    pub changes: usize,
}

impl StatusLed for MockLed {
    fn set(&mut self, on: bool) {
        self.on = on;
        self.changes += 1;
    }
}
