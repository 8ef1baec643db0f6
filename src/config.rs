//! Bridge configuration.
//!
//! [`BridgeConfig::default()`] reproduces the standard easy adapter board: I2C1 on GP14
//! (SDA) and GP15 (SCL), board address straps on GP2-GP4.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

/// What to do when an input line does not fit in the line buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Silently drop the partial line and start again.  Nothing is reported to
    /// the host.
    #[default]
    Discard,
    /// Drop the partial line and report [`crate::Error::Overflow`] to the host.
    Report,
}

/// Pin assignments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    /// I2C data line
    pub sda: u8,
    /// I2C clock line
    pub scl: u8,
    /// Board address straps, least significant bit first
    pub addr_straps: [u8; 3],
    /// Highest GPIO number the host may access
    pub max_gpio: u8,
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            sda: 14,
            scl: 15,
            addr_straps: [2, 3, 4],
            max_gpio: 28,
        }
    }
}

impl PinMap {
    /// Whether the pin is used by the bridge itself, and so may not be
    /// accessed by the host.
    pub fn is_reserved(&self, pin: u8) -> bool {
        pin == self.sda || pin == self.scl || self.addr_straps.contains(&pin)
    }
}

/// Bridge configuration
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    pub pins: PinMap,
    /// I2C bus frequency
    pub i2c_frequency_hz: u32,
    /// How long each poll of the loop waits for an input byte
    pub poll_timeout_us: u32,
    /// How long the bulk transfer waits for the host's handshake character
    pub handshake_timeout_us: u32,
    /// Settle time for each bit transition when bit-banging an address probe
    pub bit_settle_us: u32,
    /// Delay after power-up before reading the board address straps
    pub strap_delay_ms: u32,
    /// Delay after reading the straps, giving the host time to enumerate
    pub startup_delay_ms: u32,
    /// Prefix of the `device?` response.  The board number is appended.
    pub identity: &'static str,
    /// Line buffer overflow handling
    pub overflow_policy: OverflowPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pins: PinMap::default(),
            i2c_frequency_hz: 100_000,
            poll_timeout_us: 1_000,
            handshake_timeout_us: 1_000_000,
            bit_settle_us: 5,
            strap_delay_ms: 100,
            startup_delay_ms: 3_000,
            identity: "easy_adapter",
            overflow_policy: OverflowPolicy::Discard,
        }
    }
}
