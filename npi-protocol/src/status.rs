// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

/// Status codes exchanged with the host, e.g. as the first payload byte of
/// a synchronous response.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    Success = 0,
    RoutingFull = 1,
    SubsystemNotFound = 2,
    IncompletePacket = 3,
    InvalidPacket = 4,
    Busy = 5,
    TxMsgOversize = 6,
    TaskFailure = 7,
    TaskInvalidParams = 8,
}

impl TryFrom<u8> for Status {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Success,
            1 => Self::RoutingFull,
            2 => Self::SubsystemNotFound,
            3 => Self::IncompletePacket,
            4 => Self::InvalidPacket,
            5 => Self::Busy,
            6 => Self::TxMsgOversize,
            7 => Self::TaskFailure,
            8 => Self::TaskInvalidParams,
            _ => return Err(Error::InvalidPacket),
        })
    }
}

impl From<Result<(), Error>> for Status {
    fn from(result: Result<(), Error>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(e) => e.status(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No free slot left in a routing table.
    RoutingFull,
    /// Nothing registered under the requested subsystem id.
    SubsystemNotFound,
    /// Input ended before a complete frame was seen.
    IncompletePacket,
    /// Framing is present but malformed.
    InvalidPacket,
    /// The transport or a queue cannot take the message right now.
    Busy,
    /// Message does not fit in the transport buffer.
    Oversize,
    TaskFailure,
    InvalidParams,
    /// Caller supplied output buffer is too small for the encoding.
    BufferTooSmall,
    /// CMD0 type bits do not name a known message type.
    InvalidMsgType(u8),
    BadChecksum,
}

impl Error {
    /// Wire status reported for this error.
    pub fn status(&self) -> Status {
        match self {
            Self::RoutingFull => Status::RoutingFull,
            Self::SubsystemNotFound => Status::SubsystemNotFound,
            Self::IncompletePacket => Status::IncompletePacket,
            Self::InvalidPacket | Self::InvalidMsgType(_) | Self::BadChecksum => Status::InvalidPacket,
            Self::Busy => Status::Busy,
            Self::Oversize | Self::BufferTooSmall => Status::TxMsgOversize,
            Self::TaskFailure => Status::TaskFailure,
            Self::InvalidParams => Status::TaskInvalidParams,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RoutingFull => write!(f, "routing table full"),
            Self::SubsystemNotFound => write!(f, "subsystem not found"),
            Self::IncompletePacket => write!(f, "incomplete packet"),
            Self::InvalidPacket => write!(f, "invalid packet"),
            Self::Busy => write!(f, "busy"),
            Self::Oversize => write!(f, "message too large for transport buffer"),
            Self::TaskFailure => write!(f, "task failure"),
            Self::InvalidParams => write!(f, "invalid parameters"),
            Self::BufferTooSmall => write!(f, "output buffer too small"),
            Self::InvalidMsgType(t) => write!(f, "invalid message type {t}"),
            Self::BadChecksum => write!(f, "checksum mismatch"),
        }
    }
}
