//! Register-addressed memory access, built on [`I2cBus`].

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use heapless::Vec;

use crate::io::I2cBus;
use crate::session::BUFFER_CAPACITY;
use crate::{Error, Result};

/// Most payload bytes a register write can carry, after the register byte
pub const MAX_WRITE_PAYLOAD: usize = BUFFER_CAPACITY - 1;

/// Read `buf.len()` bytes starting at register `reg`.
///
/// Writes the register address without releasing the bus, then reads with a
/// repeated start, releasing the bus at the end.
pub fn read_register<I: I2cBus>(i2c: &mut I, dev: u8, reg: u8, buf: &mut [u8]) -> Result<()> {
    i2c.write(dev, &[reg], true).map_err(|e| {
        warn!("Register {reg:#04X} select on {dev:#04X} failed: {e:?}");
        Error::Bus
    })?;
    i2c.read(dev, buf, false).map_err(|e| {
        warn!("Read of {} bytes from {dev:#04X} failed: {e:?}", buf.len());
        Error::Bus
    })?;
    Ok(())
}

/// Write `data` starting at register `reg`, as a single transaction.
pub fn write_register<I: I2cBus>(i2c: &mut I, dev: u8, reg: u8, data: &[u8]) -> Result<()> {
    if data.len() > MAX_WRITE_PAYLOAD {
        return Err(Error::PayloadTooLarge);
    }
    let mut tx: Vec<u8, BUFFER_CAPACITY> = Vec::new();
    tx.push(reg).map_err(|_| Error::PayloadTooLarge)?;
    tx.extend_from_slice(data)
        .map_err(|_| Error::PayloadTooLarge)?;
    i2c.write(dev, &tx, false).map_err(|e| {
        warn!("Register {reg:#04X} write to {dev:#04X} failed: {e:?}");
        Error::Bus
    })?;
    Ok(())
}
