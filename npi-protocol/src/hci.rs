// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! HCI over NPI, used when the network processor runs a bare controller.
//!
//! Commands: `[type][opcode lsb][opcode msb][len][params...]`.
//! Data: `[type][handle lsb][handle msb][len lsb][len msb][payload...]`.
//!
//! There is no start marker or checksum; a byte that does not name a known
//! packet type is skipped so the stream can find its footing again.

use crate::Error;
use consts::NPI_TL_BUF_SIZE;
use heapless::Vec;

/// Command header: type, two opcode bytes and the length.
pub const CMD_HDR_LEN: usize = 4;
/// Data header: type, two handle bytes and two length bytes.
pub const DATA_HDR_LEN: usize = 5;

/// Largest command packet, header included.
pub const MAX_CMD_PACKET: usize = CMD_HDR_LEN + 255;

const VENDOR_SPECIFIC_OGF: u16 = 0x3F;
/// Command subgroup of the vendor opcodes that go to the link layer as is.
const CSG_LINK_LAYER: u16 = 0;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    Command = 0x01,
    Acl = 0x02,
    Sco = 0x03,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Command),
            0x02 => Ok(Self::Acl),
            0x03 => Ok(Self::Sco),
            _ => Err(Error::InvalidPacket),
        }
    }
}

/// How the controller should treat a completed packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HciEvent {
    /// Standard host to controller command.
    Command,
    /// Vendor extension command, OGF bits stripped from the opcode.
    ExtCommand,
    /// Host to controller ACL or SCO data.
    Data,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HciPacket {
    /// `bytes` is the command header followed by the parameters.
    Command { event: HciEvent, bytes: Vec<u8, MAX_CMD_PACKET> },
    Data {
        pkt_type: PacketType,
        conn_handle: u16,
        pb_flag: u8,
        payload: Vec<u8, NPI_TL_BUF_SIZE>,
    },
}

impl HciPacket {
    pub fn event(&self) -> HciEvent {
        match self {
            Self::Command { event, .. } => *event,
            Self::Data { .. } => HciEvent::Data,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Command { bytes, .. } => bytes.len(),
            Self::Data { payload, .. } => DATA_HDR_LEN + payload.len(),
        }
    }

    /// Writes the wire form. Commands keep any opcode masking applied on
    /// reception.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, Error> {
        let len = self.encoded_len();
        if out.len() < len {
            return Err(Error::BufferTooSmall);
        }
        match self {
            Self::Command { bytes, .. } => out[..len].copy_from_slice(bytes),
            Self::Data {
                pkt_type,
                conn_handle,
                pb_flag,
                payload,
            } => {
                let handle = (conn_handle & 0x0FFF) | ((*pb_flag as u16 & 0x03) << 12);
                let [h_lsb, h_msb] = handle.to_le_bytes();
                let [l_lsb, l_msb] = (payload.len() as u16).to_le_bytes();
                out[..DATA_HDR_LEN].copy_from_slice(&[*pkt_type as u8, h_lsb, h_msb, l_lsb, l_msb]);
                out[DATA_HDR_LEN..len].copy_from_slice(payload);
            }
        }
        Ok(len)
    }
}

/// True for vendor opcodes that must be tagged as extension commands.
pub fn is_ext_opcode(opcode: u16) -> bool {
    (opcode >> 10) == VENDOR_SPECIFIC_OGF && ((opcode >> 7) & 0x07) != CSG_LINK_LAYER
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseState {
    PacketType,
    CmdOpcodeLsb,
    CmdOpcodeMsb,
    CmdLength,
    CmdData,
    DataHandleLsb,
    DataHandleMsb,
    DataLengthLsb,
    DataLengthMsb,
    DataData,
    Flush(usize),
}

/// Outcome of [`HciParser::feed`].
#[derive(Debug, Eq, PartialEq)]
pub enum HciFeed<'b> {
    Consumed,
    Packet { packet: HciPacket, remaining: &'b [u8] },
    /// An oversized packet has been discarded in full.
    Flushed(&'b [u8]),
}

#[derive(Debug)]
pub struct HciParser {
    state: ParseState,
    max_len: usize,
    pkt_type: PacketType,
    opcode: u16,
    handle: u16,
    len: usize,
    cmd: Vec<u8, MAX_CMD_PACKET>,
    data: Vec<u8, NPI_TL_BUF_SIZE>,
}

impl Default for HciParser {
    fn default() -> Self {
        Self::new(NPI_TL_BUF_SIZE)
    }
}

impl HciParser {
    /// Packets declaring more than `max_len` payload bytes are flushed.
    /// `max_len` is capped at the receive buffer size.
    pub const fn new(max_len: usize) -> Self {
        Self {
            state: ParseState::PacketType,
            max_len: if max_len < NPI_TL_BUF_SIZE { max_len } else { NPI_TL_BUF_SIZE },
            pkt_type: PacketType::Command,
            opcode: 0,
            handle: 0,
            len: 0,
            cmd: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn feed<'b>(&mut self, mut input: &'b [u8]) -> HciFeed<'b> {
        while let Some((&byte, rest)) = input.split_first() {
            match self.state {
                ParseState::PacketType => match PacketType::try_from(byte) {
                    Ok(PacketType::Command) => {
                        self.pkt_type = PacketType::Command;
                        self.state = ParseState::CmdOpcodeLsb;
                    }
                    Ok(pkt_type) => {
                        self.pkt_type = pkt_type;
                        self.state = ParseState::DataHandleLsb;
                    }
                    Err(_) => {}
                },
                ParseState::CmdOpcodeLsb => {
                    self.opcode = byte as u16;
                    self.state = ParseState::CmdOpcodeMsb;
                }
                ParseState::CmdOpcodeMsb => {
                    self.opcode |= (byte as u16) << 8;
                    self.state = ParseState::CmdLength;
                }
                ParseState::CmdLength => {
                    self.len = byte as usize;
                    if self.len > self.max_len {
                        self.state = ParseState::Flush(self.len);
                    } else {
                        let [lsb, msb] = self.opcode.to_le_bytes();
                        self.cmd.clear();
                        // Header always fits.
                        let _ = self.cmd.extend_from_slice(&[PacketType::Command as u8, lsb, msb, byte]);
                        if self.len == 0 {
                            return self.finish_command(rest);
                        }
                        self.state = ParseState::CmdData;
                    }
                }
                ParseState::CmdData => {
                    let want = CMD_HDR_LEN + self.len - self.cmd.len();
                    let take = want.min(input.len());
                    let _ = self.cmd.extend_from_slice(&input[..take]);
                    input = &input[take..];
                    if take == want {
                        return self.finish_command(input);
                    }
                    continue;
                }
                ParseState::DataHandleLsb => {
                    self.handle = byte as u16;
                    self.state = ParseState::DataHandleMsb;
                }
                ParseState::DataHandleMsb => {
                    self.handle |= (byte as u16) << 8;
                    self.state = ParseState::DataLengthLsb;
                }
                ParseState::DataLengthLsb => {
                    self.len = byte as usize;
                    self.state = ParseState::DataLengthMsb;
                }
                ParseState::DataLengthMsb => {
                    self.len |= (byte as usize) << 8;
                    self.data.clear();
                    if self.len > self.max_len {
                        self.state = ParseState::Flush(self.len);
                    } else if self.len == 0 {
                        return self.finish_data(rest);
                    } else {
                        self.state = ParseState::DataData;
                    }
                }
                ParseState::DataData => {
                    let want = self.len - self.data.len();
                    let take = want.min(input.len());
                    let _ = self.data.extend_from_slice(&input[..take]);
                    input = &input[take..];
                    if take == want {
                        return self.finish_data(input);
                    }
                    continue;
                }
                ParseState::Flush(remaining) => {
                    let take = remaining.min(input.len());
                    input = &input[take..];
                    if take == remaining {
                        self.state = ParseState::PacketType;
                        return HciFeed::Flushed(input);
                    }
                    self.state = ParseState::Flush(remaining - take);
                    continue;
                }
            }
            input = rest;
        }
        HciFeed::Consumed
    }

    fn finish_command<'b>(&mut self, remaining: &'b [u8]) -> HciFeed<'b> {
        self.state = ParseState::PacketType;
        let mut bytes = core::mem::take(&mut self.cmd);
        let event = if is_ext_opcode(self.opcode) {
            bytes[2] &= 0x03;
            HciEvent::ExtCommand
        } else {
            HciEvent::Command
        };
        HciFeed::Packet {
            packet: HciPacket::Command { event, bytes },
            remaining,
        }
    }

    fn finish_data<'b>(&mut self, remaining: &'b [u8]) -> HciFeed<'b> {
        self.state = ParseState::PacketType;
        HciFeed::Packet {
            packet: HciPacket::Data {
                pkt_type: self.pkt_type,
                conn_handle: self.handle & 0x0FFF,
                pb_flag: ((self.handle & 0x3000) >> 12) as u8,
                payload: core::mem::take(&mut self.data),
            },
            remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec as StdVec;

    fn parse_all(parser: &mut HciParser, mut input: &[u8], out: &mut StdVec<HciPacket>) -> usize {
        let mut flushed = 0;
        while !input.is_empty() {
            input = match parser.feed(input) {
                HciFeed::Consumed => break,
                HciFeed::Packet { packet, remaining } => {
                    out.push(packet);
                    remaining
                }
                HciFeed::Flushed(remaining) => {
                    flushed += 1;
                    remaining
                }
            };
        }
        flushed
    }

    #[test]
    fn standard_command() {
        // HCI_Reset
        let bytes = [0x01, 0x03, 0x0C, 0x00];
        let mut parser = HciParser::default();
        let mut out = StdVec::new();
        parse_all(&mut parser, &bytes, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].event(), HciEvent::Command);
        let HciPacket::Command { bytes: got, .. } = &out[0] else {
            panic!("expected a command");
        };
        assert_eq!(&got[..], &bytes);
        assert_eq!(parser.state(), ParseState::PacketType);
    }

    #[test]
    fn vendor_command_strips_ogf() {
        // OGF 0x3F, CSG 2 (0xFD00)
        let bytes = [0x01, 0x00, 0xFD, 0x02, 0xAA, 0xBB];
        let mut out = StdVec::new();
        parse_all(&mut HciParser::default(), &bytes, &mut out);
        let HciPacket::Command { event, bytes: got } = &out[0] else {
            panic!("expected a command");
        };
        assert_eq!(*event, HciEvent::ExtCommand);
        assert_eq!(&got[..], &[0x01, 0x00, 0x01, 0x02, 0xAA, 0xBB]);
    }

    #[test]
    fn link_layer_vendor_command_keeps_opcode() {
        // OGF 0x3F, CSG 0 (0xFC01)
        let bytes = [0x01, 0x01, 0xFC, 0x01, 0x05];
        let mut out = StdVec::new();
        parse_all(&mut HciParser::default(), &bytes, &mut out);
        let HciPacket::Command { event, bytes: got } = &out[0] else {
            panic!("expected a command");
        };
        assert_eq!(*event, HciEvent::Command);
        assert_eq!(&got[..], &bytes);
    }

    #[test]
    fn acl_data_splits_handle() {
        let bytes = [0x02, 0x41, 0x20, 0x03, 0x00, 1, 2, 3];
        let mut out = StdVec::new();
        parse_all(&mut HciParser::default(), &bytes, &mut out);
        assert_eq!(out.len(), 1);
        let HciPacket::Data {
            pkt_type,
            conn_handle,
            pb_flag,
            payload,
        } = &out[0]
        else {
            panic!("expected data");
        };
        assert_eq!(*pkt_type, PacketType::Acl);
        assert_eq!(*conn_handle, 0x041);
        assert_eq!(*pb_flag, 2);
        assert_eq!(&payload[..], &[1, 2, 3]);

        let mut wire = [0u8; 16];
        let n = out[0].encode(&mut wire).unwrap();
        assert_eq!(&wire[..n], &bytes);
    }

    #[test]
    fn zero_length_packets_complete_at_header() {
        let mut parser = HciParser::default();
        match parser.feed(&[0x03, 0x01, 0x00, 0x00, 0x00, 0xEE]) {
            HciFeed::Packet { packet, remaining } => {
                assert_eq!(packet.event(), HciEvent::Data);
                assert_eq!(remaining, &[0xEE]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn junk_type_bytes_are_skipped() {
        let bytes = [0x00, 0x7F, 0x04, 0x01, 0x03, 0x0C, 0x00];
        let mut out = StdVec::new();
        parse_all(&mut HciParser::default(), &bytes, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn oversize_declaration_flushes_exact_count() {
        for len in [11usize, 40, 255] {
            let mut stream = std::vec![0x01, 0x01, 0x10, len as u8];
            // Flushed bytes look like packet starts and must not be parsed.
            stream.extend(core::iter::repeat(0x01).take(len));
            stream.extend_from_slice(&[0x01, 0x03, 0x0C, 0x00]);

            for chunk in [1, 4, stream.len()] {
                let mut parser = HciParser::new(10);
                let mut out = StdVec::new();
                let mut flushed = 0;
                for piece in stream.chunks(chunk) {
                    flushed += parse_all(&mut parser, piece, &mut out);
                }
                assert_eq!(flushed, 1, "len {len} chunk {chunk}");
                assert_eq!(out.len(), 1);
                assert_eq!(parser.state(), ParseState::PacketType);
            }
        }
    }

    #[test]
    fn data_oversize_uses_sixteen_bit_length() {
        let len = NPI_TL_BUF_SIZE + 1;
        let mut stream = std::vec![0x02, 0x01, 0x00, len as u8, (len >> 8) as u8];
        stream.extend(core::iter::repeat(0xAB).take(len));
        let mut parser = HciParser::default();
        let mut out = StdVec::new();
        assert_eq!(parse_all(&mut parser, &stream, &mut out), 1);
        assert!(out.is_empty());
        assert_eq!(parser.state(), ParseState::PacketType);
    }

    #[test]
    fn chunking_does_not_change_packets() {
        let mut stream = StdVec::new();
        stream.extend_from_slice(&[0x01, 0x03, 0x0C, 0x00]);
        stream.extend_from_slice(&[0x02, 0x01, 0x10, 0x05, 0x00, 9, 8, 7, 6, 5]);
        stream.extend_from_slice(&[0x01, 0x02, 0xFE, 0x03, 0x01, 0x02, 0x03]);
        stream.extend_from_slice(&[0x99]);
        stream.extend_from_slice(&[0x03, 0x02, 0x00, 0x01, 0x00, 0x42]);

        let mut whole = StdVec::new();
        parse_all(&mut HciParser::default(), &stream, &mut whole);
        assert_eq!(whole.len(), 4);

        for chunk in 1..stream.len() {
            let mut parser = HciParser::default();
            let mut out = StdVec::new();
            for piece in stream.chunks(chunk) {
                parse_all(&mut parser, piece, &mut out);
            }
            assert_eq!(out, whole, "chunk size {chunk}");
        }
    }
}
