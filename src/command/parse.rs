//! Token parser.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use heapless::Vec;

use crate::command::Command;
use crate::session::BUFFER_CAPACITY;
use crate::{Error, Result};

const MAX_ARGS: usize = 3;
const MAX_I2C_ADDR: i32 = 0x7F;

/// Parse a command token.
///
/// Returns [`Error::UnknownCommand`] if the token is not a command at all,
/// [`Error::Syntax`] if it names a command but the arguments are malformed, and
/// [`Error::InvalidValue`] if an argument is out of range.
pub fn parse_token(token: &[u8]) -> Result<Command> {
    let token = core::str::from_utf8(token).map_err(|_| Error::UnknownCommand)?;
    let (name, args) = match token.split_once(':') {
        Some((name, args)) => (name, Some(args)),
        None => (token, None),
    };

    match (name, args) {
        ("device?", None) => Ok(Command::Identify),
        ("bin", None) => Ok(Command::Binary),
        ("send", None) => Ok(Command::Send { hold: false }),
        ("send+hold", None) => Ok(Command::Send { hold: true }),
        ("recv", None) => Ok(Command::Recv),
        ("noecho", None) => Ok(Command::NoEcho),
        ("bytes", Some(args)) => {
            let [n] = split_args::<1>(args)?;
            Ok(Command::Bytes(in_range(n, 0, BUFFER_CAPACITY as i32)? as usize))
        }
        ("addr", Some(args)) => {
            let [addr] = split_args::<1>(args)?;
            Ok(Command::Addr(i2c_addr(addr)?))
        }
        ("tryaddr", Some(args)) => {
            let [addr] = split_args::<1>(args)?;
            Ok(Command::TryAddr(i2c_addr(addr)?))
        }
        ("readmem", Some(args)) => parse_readmem(args),
        ("writemem", Some(args)) => parse_writemem(args),
        ("iowrite", Some(args)) => {
            let [pin, level] = split_args::<2>(args)?;
            let high = match parse_int(level)? {
                0 => false,
                1 => true,
                _ => return Err(Error::InvalidValue),
            };
            Ok(Command::IoWrite {
                pin: parse_int(pin)?,
                high,
            })
        }
        ("ioread", Some(args)) => {
            let mut args = args.splitn(2, ',');
            let pin = parse_int(args.next().unwrap_or_default())?;
            let pullup = match args.next() {
                None => false,
                Some("pullup") => true,
                Some(_) => return Err(Error::Syntax),
            };
            Ok(Command::IoRead { pin, pullup })
        }
        ("getiolvl", Some(args)) => {
            let [pin] = split_args::<1>(args)?;
            Ok(Command::GetIoLevel {
                pin: parse_int(pin)?,
            })
        }
        ("m2m_resp", Some("1")) => Ok(Command::M2mResponses(true)),
        ("m2m_resp", Some("0")) => Ok(Command::M2mResponses(false)),
        (
            "device?" | "bin" | "send" | "send+hold" | "recv" | "noecho" | "bytes" | "addr"
            | "tryaddr" | "readmem" | "writemem" | "iowrite" | "ioread" | "getiolvl"
            | "m2m_resp",
            _,
        ) => Err(Error::Syntax),
        _ => Err(Error::UnknownCommand),
    }
}

/// Parse a payload byte, which must be exactly two hex digits.
pub fn parse_payload_byte(token: &[u8]) -> Result<u8> {
    if token.len() != 2 || !token.iter().all(u8::is_ascii_hexdigit) {
        return Err(Error::InvalidByte);
    }
    let digits = core::str::from_utf8(token).map_err(|_| Error::InvalidByte)?;
    u8::from_str_radix(digits, 16).map_err(|_| Error::InvalidByte)
}

// readmem:<dev>,<reg>,<len> or readmem:<reg>,<len>
fn parse_readmem(args: &str) -> Result<Command> {
    let args = split_vec(args)?;
    let (dev, reg, len) = match args.as_slice() {
        [dev, reg, len] => (Some(i2c_addr(dev)?), *reg, *len),
        [reg, len] => (None, *reg, *len),
        _ => return Err(Error::Syntax),
    };
    Ok(Command::ReadMem {
        dev,
        reg: in_range(reg, 0, 0xFF)? as u8,
        len: in_range(len, 1, BUFFER_CAPACITY as i32)? as usize,
    })
}

// writemem:<dev>,<reg> or writemem:<reg>
fn parse_writemem(args: &str) -> Result<Command> {
    let args = split_vec(args)?;
    let (dev, reg) = match args.as_slice() {
        [dev, reg] => (Some(i2c_addr(dev)?), *reg),
        [reg] => (None, *reg),
        _ => return Err(Error::Syntax),
    };
    Ok(Command::WriteMem {
        dev,
        reg: in_range(reg, 0, 0xFF)? as u8,
    })
}

fn split_vec(args: &str) -> Result<Vec<&str, MAX_ARGS>> {
    let mut out = Vec::new();
    for arg in args.split(',') {
        out.push(arg).map_err(|_| Error::Syntax)?;
    }
    Ok(out)
}

fn split_args<const N: usize>(args: &str) -> Result<[&str; N]> {
    let args = split_vec(args)?;
    args.as_slice().try_into().map_err(|_| Error::Syntax)
}

fn i2c_addr(s: &str) -> Result<u8> {
    Ok(in_range(s, 0, MAX_I2C_ADDR)? as u8)
}

fn in_range(s: &str, min: i32, max: i32) -> Result<i32> {
    let value = parse_int(s)?;
    if value < min || value > max {
        Err(Error::InvalidValue)
    } else {
        Ok(value)
    }
}

/// Parse `0x` prefixed hex, or decimal, with an optional leading `-`.
fn parse_int(s: &str) -> Result<i32> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (body, radix) = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None => (digits, 10),
    };
    // from_str_radix accepts its own sign, which has already been taken
    if body.starts_with(['+', '-']) {
        return Err(Error::Syntax);
    }
    let value = i32::from_str_radix(body, radix).map_err(|_| Error::Syntax)?;
    Ok(if negative { -value } else { value })
}
