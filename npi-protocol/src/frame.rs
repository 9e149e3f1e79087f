// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! NPI RPC frames.
//!
//! The unframed body shared by every NPI transport is
//! `[LEN_LSB][LEN_MSB][CMD0][CMD1][payload...]` where `LEN` counts payload
//! bytes only. CMD0 packs the message type in bits 7..5 and the subsystem id
//! in bits 4..0.

use crate::Error;
use consts::{NPI_MSG_HDR_LENGTH, NPI_TL_BUF_SIZE};
use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Largest payload a single NPI frame can carry.
pub const MAX_NPI_PAYLOAD: usize = NPI_TL_BUF_SIZE - NPI_MSG_HDR_LENGTH;

const CMD0_TYPE_MASK: u8 = 0xE0;
const CMD0_SS_MASK: u8 = 0x1F;
const CMD0_TYPE_SHIFT: u8 = 5;

/// RPC subsystem identifiers carried in CMD0.
pub mod subsystem {
    /// Reserved, never routed.
    pub const RES0: u8 = 0;
    pub const SYS: u8 = 1;
    pub const MAC: u8 = 2;
    pub const NWK: u8 = 3;
    pub const AF: u8 = 4;
    pub const ZDO: u8 = 5;
    pub const SAPI: u8 = 6;
    pub const UTIL: u8 = 7;
    pub const DBG: u8 = 8;
    pub const APP: u8 = 9;
    pub const RCAF: u8 = 10;
    pub const RCN: u8 = 11;
    pub const RCN_CLIENT: u8 = 12;
    pub const BOOT: u8 = 13;
    pub const ZIPTEST: u8 = 14;
    pub const DEBUG: u8 = 15;
    pub const PERIPHERALS: u8 = 16;
    pub const NFC: u8 = 17;
    pub const PB_NWK_MGR: u8 = 18;
    pub const PB_GW: u8 = 19;
    pub const PB_OTA_MGR: u8 = 20;
    pub const BLE_SNP: u8 = 21;
    pub const BLE_HCI: u8 = 22;
    pub const SRV_CTRL: u8 = 31;
    /// Highest id representable in CMD0.
    pub const MAX: u8 = 31;
}

/// Message class, bits 7..5 of CMD0.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum MsgType {
    Poll = 0,
    SyncReq = 1,
    Async = 2,
    SyncRsp = 3,
}

impl TryFrom<u8> for MsgType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Poll),
            1 => Ok(Self::SyncReq),
            2 => Ok(Self::Async),
            3 => Ok(Self::SyncRsp),
            t => Err(Error::InvalidMsgType(t)),
        }
    }
}

/// One NPI message without its transport framing.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NpiFrame {
    pub cmd0: u8,
    pub cmd1: u8,
    pub payload: Vec<u8, MAX_NPI_PAYLOAD>,
}

impl NpiFrame {
    pub fn new(msg_type: MsgType, subsystem: u8, cmd1: u8, payload: &[u8]) -> Result<Self, Error> {
        if subsystem > subsystem::MAX {
            return Err(Error::InvalidParams);
        }
        let payload = Vec::from_slice(payload).map_err(|_| Error::Oversize)?;
        let mut frame = Self { cmd0: 0, cmd1, payload };
        frame.set_msg_type(msg_type);
        frame.set_subsystem(subsystem);
        Ok(frame)
    }

    pub fn msg_type(&self) -> Result<MsgType, Error> {
        MsgType::try_from((self.cmd0 & CMD0_TYPE_MASK) >> CMD0_TYPE_SHIFT)
    }

    pub fn set_msg_type(&mut self, msg_type: MsgType) {
        self.cmd0 = (self.cmd0 & !CMD0_TYPE_MASK) | (((msg_type as u8) & 0x03) << CMD0_TYPE_SHIFT);
    }

    pub fn subsystem(&self) -> u8 {
        self.cmd0 & CMD0_SS_MASK
    }

    pub fn set_subsystem(&mut self, subsystem: u8) {
        self.cmd0 = (self.cmd0 & !CMD0_SS_MASK) | (subsystem & CMD0_SS_MASK);
    }

    /// Length of the encoded body.
    pub fn body_len(&self) -> usize {
        NPI_MSG_HDR_LENGTH + self.payload.len()
    }

    /// Writes `[LEN_LSB][LEN_MSB][CMD0][CMD1][payload]` into `out`.
    pub fn encode_body(&self, out: &mut [u8]) -> Result<usize, Error> {
        let len = self.body_len();
        if out.len() < len {
            return Err(Error::BufferTooSmall);
        }
        let [lsb, msb] = (self.payload.len() as u16).to_le_bytes();
        out[..NPI_MSG_HDR_LENGTH].copy_from_slice(&[lsb, msb, self.cmd0, self.cmd1]);
        out[NPI_MSG_HDR_LENGTH..len].copy_from_slice(&self.payload);
        Ok(len)
    }

    /// Parses a complete body. Trailing bytes beyond the declared length are
    /// rejected.
    pub fn decode_body(body: &[u8]) -> Result<Self, Error> {
        if body.len() < NPI_MSG_HDR_LENGTH {
            return Err(Error::IncompletePacket);
        }
        let len = u16::from_le_bytes([body[0], body[1]]) as usize;
        match (NPI_MSG_HDR_LENGTH + len).cmp(&body.len()) {
            core::cmp::Ordering::Greater => return Err(Error::IncompletePacket),
            core::cmp::Ordering::Less => return Err(Error::InvalidPacket),
            core::cmp::Ordering::Equal => {}
        }
        let payload = Vec::from_slice(&body[NPI_MSG_HDR_LENGTH..]).map_err(|_| Error::Oversize)?;
        Ok(Self {
            cmd0: body[2],
            cmd1: body[3],
            payload,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BodyState {
    LenLsb,
    LenMsb,
    Cmd0,
    Cmd1,
    Payload,
    Flush(usize),
}

/// Outcome of [`BodyReader::feed`].
#[derive(Debug, Eq, PartialEq)]
pub enum BodyFeed<'b> {
    /// All input consumed, no frame finished.
    Consumed,
    /// A frame finished; `remaining` still has to be fed.
    Frame { frame: NpiFrame, remaining: &'b [u8] },
    /// A frame declared a payload larger than [`MAX_NPI_PAYLOAD`] and has
    /// been skipped.
    Oversize(&'b [u8]),
}

/// Re-entrant reader for a stream of concatenated NPI bodies.
///
/// The transports deliver bodies without SOF and FCS, already validated,
/// so this only has to find the boundaries again.
#[derive(Debug)]
pub struct BodyReader {
    state: BodyState,
    len: usize,
    frame: NpiFrame,
}

impl Default for BodyReader {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyReader {
    pub const fn new() -> Self {
        Self {
            state: BodyState::LenLsb,
            len: 0,
            frame: NpiFrame {
                cmd0: 0,
                cmd1: 0,
                payload: Vec::new(),
            },
        }
    }

    /// True between frames.
    pub fn is_idle(&self) -> bool {
        self.state == BodyState::LenLsb
    }

    pub fn reset(&mut self) {
        self.state = BodyState::LenLsb;
        self.frame.payload.clear();
    }

    pub fn feed<'b>(&mut self, mut input: &'b [u8]) -> BodyFeed<'b> {
        while let Some((&byte, rest)) = input.split_first() {
            match self.state {
                BodyState::LenLsb => {
                    self.len = byte as usize;
                    self.state = BodyState::LenMsb;
                }
                BodyState::LenMsb => {
                    self.len |= (byte as usize) << 8;
                    self.state = BodyState::Cmd0;
                }
                BodyState::Cmd0 => {
                    self.frame.cmd0 = byte;
                    self.state = BodyState::Cmd1;
                }
                BodyState::Cmd1 => {
                    self.frame.cmd1 = byte;
                    self.frame.payload.clear();
                    if self.len > MAX_NPI_PAYLOAD {
                        self.state = BodyState::Flush(self.len);
                        input = rest;
                        continue;
                    }
                    if self.len == 0 {
                        return self.finish(rest);
                    }
                    self.state = BodyState::Payload;
                }
                BodyState::Payload => {
                    let want = self.len - self.frame.payload.len();
                    let take = want.min(input.len());
                    // Capacity was checked against `len` when the header ended.
                    let _ = self.frame.payload.extend_from_slice(&input[..take]);
                    input = &input[take..];
                    if self.frame.payload.len() == self.len {
                        return self.finish(input);
                    }
                    continue;
                }
                BodyState::Flush(remaining) => {
                    let take = remaining.min(input.len());
                    input = &input[take..];
                    if remaining == take {
                        self.state = BodyState::LenLsb;
                        return BodyFeed::Oversize(input);
                    }
                    self.state = BodyState::Flush(remaining - take);
                    continue;
                }
            }
            input = rest;
        }
        BodyFeed::Consumed
    }

    fn finish<'b>(&mut self, remaining: &'b [u8]) -> BodyFeed<'b> {
        self.state = BodyState::LenLsb;
        let frame = core::mem::replace(
            &mut self.frame,
            NpiFrame {
                cmd0: 0,
                cmd1: 0,
                payload: Vec::new(),
            },
        );
        BodyFeed::Frame { frame, remaining }
    }
}
