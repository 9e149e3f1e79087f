// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Serial bootloader (SBL) transport framing.
//!
//! Commands go out as `[len][checksum][cmd][data...]` where `len` counts the
//! whole packet and the checksum is the 8-bit sum of `cmd` and `data`. The
//! target answers every packet with a two byte ACK or NACK, and responses
//! carrying data use the same header without the command byte.

use crate::{fcs, Error};

/// Header of a response: length and checksum.
pub const HDR_LEN: usize = 2;
/// Header of a command: length, checksum and command byte.
pub const CMD_HDR_LEN: usize = HDR_LEN + 1;

pub const ACK: [u8; 2] = [0x00, 0xCC];
pub const NACK: [u8; 2] = [0x00, 0x33];
/// Sent once after reset so the target can lock onto the baudrate.
pub const AUTOBAUD: [u8; 2] = [0x55, 0x55];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ack {
    Ack,
    Nack,
}

impl Ack {
    pub fn to_bytes(self) -> [u8; 2] {
        match self {
            Self::Ack => ACK,
            Self::Nack => NACK,
        }
    }
}

/// Classifies a two byte acknowledgement.
pub fn classify_ack(rsp: [u8; 2]) -> Result<Ack, Error> {
    match rsp {
        ACK => Ok(Ack::Ack),
        NACK => Ok(Ack::Nack),
        _ => Err(Error::InvalidPacket),
    }
}

pub fn checksum(cmd: u8, data: &[u8]) -> u8 {
    fcs::sum(cmd, data)
}

/// Writes a command packet to `out`.
pub fn encode_command(cmd: u8, data: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    let len = CMD_HDR_LEN + data.len();
    if len > u8::MAX as usize {
        return Err(Error::Oversize);
    }
    if out.len() < len {
        return Err(Error::BufferTooSmall);
    }
    out[0] = len as u8;
    out[1] = checksum(cmd, data);
    out[2] = cmd;
    out[CMD_HDR_LEN..len].copy_from_slice(data);
    Ok(len)
}

/// Number of data bytes announced by a response header.
pub fn response_len(header: [u8; HDR_LEN]) -> Result<usize, Error> {
    (header[0] as usize).checked_sub(HDR_LEN).ok_or(Error::InvalidPacket)
}

/// Checks a response against its header and returns the data.
pub fn parse_response(header: [u8; HDR_LEN], data: &[u8]) -> Result<&[u8], Error> {
    let len = response_len(header)?;
    let data = data.get(..len).ok_or(Error::IncompletePacket)?;
    if checksum(0, data) != header[1] {
        return Err(Error::BadChecksum);
    }
    Ok(data)
}
