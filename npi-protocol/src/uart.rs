// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! UART framing: `[SOF][LEN_LSB][LEN_MSB][CMD0][CMD1][payload...][FCS]`.
//!
//! FCS is the XOR of every byte from `LEN_LSB` through the end of the
//! payload. Everything between SOF and FCS is the NPI body.

use crate::{fcs, Error, NpiFrame};
use consts::{NPI_MSG_HDR_LENGTH, NPI_SOF};
use heapless::Vec;

/// Bytes a frame adds around its body: SOF and FCS.
pub const FRAMING_OVERHEAD: usize = 2;

/// Frames an already encoded body.
pub fn frame_body(body: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    let len = body.len() + FRAMING_OVERHEAD;
    if out.len() < len {
        return Err(Error::BufferTooSmall);
    }
    out[0] = NPI_SOF;
    out[1..=body.len()].copy_from_slice(body);
    out[len - 1] = fcs::xor(body);
    Ok(len)
}

/// Encodes `frame` with its UART framing.
pub fn encode(frame: &NpiFrame, out: &mut [u8]) -> Result<usize, Error> {
    if out.len() < frame.body_len() + FRAMING_OVERHEAD {
        return Err(Error::BufferTooSmall);
    }
    let body_len = frame.encode_body(&mut out[1..])?;
    out[0] = NPI_SOF;
    out[body_len + 1] = fcs::xor(&out[1..=body_len]);
    Ok(body_len + FRAMING_OVERHEAD)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadState {
    Sof,
    LenLsb,
    LenMsb,
    Cmd0,
    Cmd1,
    Payload,
    Fcs,
    /// Skipping the payload and FCS of a frame that does not fit.
    Ignore(usize),
}

/// Outcome of [`FrameReader::feed`].
#[derive(Debug, Eq, PartialEq)]
pub enum FeedResult<'a, 'b> {
    /// Consumed all input, no frame finished.
    Consumed,
    /// A valid frame finished. `body` is `[LEN][CMD0][CMD1][payload]`.
    Success { body: &'a [u8], remaining: &'b [u8] },
    /// A frame finished with a bad FCS and was dropped.
    BadChecksum(&'b [u8]),
    /// A frame declared more payload than the reader holds and was skipped.
    Oversize(&'b [u8]),
}

/// Re-entrant UART frame reader holding up to `N` body bytes.
///
/// Bytes may be fed in chunks of any size; the frames produced do not
/// depend on how the stream was split.
#[derive(Debug)]
pub struct FrameReader<const N: usize> {
    state: ReadState,
    len: usize,
    body: Vec<u8, N>,
}

impl<const N: usize> Default for FrameReader<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameReader<N> {
    pub const fn new() -> Self {
        Self {
            state: ReadState::Sof,
            len: 0,
            body: Vec::new(),
        }
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Drops any partially read frame.
    pub fn reset(&mut self) {
        self.state = ReadState::Sof;
        self.body.clear();
    }

    pub fn feed<'a, 'b>(&'a mut self, mut input: &'b [u8]) -> FeedResult<'a, 'b> {
        while let Some((&byte, rest)) = input.split_first() {
            match self.state {
                ReadState::Sof => {
                    if byte == NPI_SOF {
                        self.body.clear();
                        self.state = ReadState::LenLsb;
                    }
                }
                ReadState::LenLsb => {
                    self.len = byte as usize;
                    self.push(byte);
                    self.state = ReadState::LenMsb;
                }
                ReadState::LenMsb => {
                    self.len |= (byte as usize) << 8;
                    self.push(byte);
                    self.state = ReadState::Cmd0;
                }
                ReadState::Cmd0 => {
                    self.push(byte);
                    self.state = ReadState::Cmd1;
                }
                ReadState::Cmd1 => {
                    self.push(byte);
                    self.state = if self.len + NPI_MSG_HDR_LENGTH > N {
                        ReadState::Ignore(self.len + 1)
                    } else if self.len == 0 {
                        ReadState::Fcs
                    } else {
                        ReadState::Payload
                    };
                }
                ReadState::Payload => {
                    let want = NPI_MSG_HDR_LENGTH + self.len - self.body.len();
                    let take = want.min(input.len());
                    // Fits: the length was checked against N in Cmd1.
                    let _ = self.body.extend_from_slice(&input[..take]);
                    input = &input[take..];
                    if take == want {
                        self.state = ReadState::Fcs;
                    }
                    continue;
                }
                ReadState::Fcs => {
                    self.state = ReadState::Sof;
                    if fcs::xor(&self.body) == byte {
                        return FeedResult::Success {
                            body: &self.body,
                            remaining: rest,
                        };
                    }
                    return FeedResult::BadChecksum(rest);
                }
                ReadState::Ignore(remaining) => {
                    let take = remaining.min(input.len());
                    input = &input[take..];
                    if take == remaining {
                        self.state = ReadState::Sof;
                        return FeedResult::Oversize(input);
                    }
                    self.state = ReadState::Ignore(remaining - take);
                    continue;
                }
            }
            input = rest;
        }
        FeedResult::Consumed
    }

    fn push(&mut self, byte: u8) {
        // The header is four bytes and N always covers it.
        let _ = self.body.push(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{subsystem, MsgType};
    use consts::NPI_TL_BUF_SIZE;
    use std::vec::Vec as StdVec;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Frame(StdVec<u8>),
        Bad,
        Oversize,
    }

    fn run<const N: usize>(reader: &mut FrameReader<N>, mut input: &[u8], seen: &mut StdVec<Seen>) {
        while !input.is_empty() {
            input = match reader.feed(input) {
                FeedResult::Consumed => break,
                FeedResult::Success { body, remaining } => {
                    seen.push(Seen::Frame(body.to_vec()));
                    remaining
                }
                FeedResult::BadChecksum(remaining) => {
                    seen.push(Seen::Bad);
                    remaining
                }
                FeedResult::Oversize(remaining) => {
                    seen.push(Seen::Oversize);
                    remaining
                }
            };
        }
    }

    fn wire(frame: &NpiFrame) -> StdVec<u8> {
        let mut buf = [0u8; NPI_TL_BUF_SIZE + FRAMING_OVERHEAD];
        let n = encode(frame, &mut buf).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn ten_byte_message() {
        let payload = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let frame = NpiFrame::new(MsgType::Async, subsystem::BLE_SNP, 0x05, &payload).unwrap();
        let bytes = wire(&frame);
        assert_eq!(bytes[..3], [NPI_SOF, 10, 0]);
        assert_eq!(bytes.len(), 10 + 6);

        let mut reader = FrameReader::<NPI_TL_BUF_SIZE>::new();
        let mut seen = StdVec::new();
        run(&mut reader, &bytes, &mut seen);
        assert_eq!(seen.len(), 1);
        let Seen::Frame(body) = &seen[0] else {
            panic!("expected a frame, got {seen:?}");
        };
        let decoded = NpiFrame::decode_body(body).unwrap();
        assert_eq!(&decoded.payload[..], &payload);
        assert_eq!(decoded, frame);
        assert_eq!(reader.state(), ReadState::Sof);
    }

    #[test]
    fn frame_body_matches_encode() {
        let frame = NpiFrame::new(MsgType::SyncReq, subsystem::SYS, 0x02, &[0x33]).unwrap();
        let mut body = [0u8; 16];
        let n = frame.encode_body(&mut body).unwrap();
        let mut out = [0u8; 16];
        let m = frame_body(&body[..n], &mut out).unwrap();
        assert_eq!(out[..m], wire(&frame)[..]);
    }

    #[test]
    fn chunking_does_not_change_frames() {
        let mut stream = StdVec::new();
        stream.extend_from_slice(&[0x00, 0x13]); // line noise before the first SOF
        for (i, len) in [0usize, 1, 17, 200].into_iter().enumerate() {
            let payload: StdVec<u8> = (0..len).map(|b| b as u8 ^ 0xFE).collect();
            let frame = NpiFrame::new(MsgType::Async, i as u8 + 1, i as u8, &payload).unwrap();
            stream.extend(wire(&frame));
        }
        let mut corrupt = wire(&NpiFrame::new(MsgType::Async, 2, 2, &[1, 2, 3]).unwrap());
        *corrupt.last_mut().unwrap() ^= 0xFF;
        stream.extend(corrupt);
        stream.extend(wire(&NpiFrame::new(MsgType::SyncRsp, 3, 3, &[]).unwrap()));

        let mut expected = StdVec::new();
        run(&mut FrameReader::<NPI_TL_BUF_SIZE>::new(), &stream, &mut expected);
        assert_eq!(expected.iter().filter(|s| matches!(s, Seen::Frame(_))).count(), 5);
        assert_eq!(expected.iter().filter(|s| **s == Seen::Bad).count(), 1);

        for chunk in [1, 2, 5, 64, 255] {
            let mut reader = FrameReader::<NPI_TL_BUF_SIZE>::new();
            let mut seen = StdVec::new();
            for piece in stream.chunks(chunk) {
                run(&mut reader, piece, &mut seen);
            }
            assert_eq!(seen, expected, "chunk size {chunk}");
        }
    }

    #[test]
    fn corrupted_fcs_is_dropped() {
        let mut bytes = wire(&NpiFrame::new(MsgType::Async, 1, 1, &[0xAA; 8]).unwrap());
        let last = bytes.len() - 1;
        bytes[last] = bytes[last].wrapping_add(1);

        let mut seen = StdVec::new();
        run(&mut FrameReader::<NPI_TL_BUF_SIZE>::new(), &bytes, &mut seen);
        assert_eq!(seen, [Seen::Bad]);
    }

    #[test]
    fn oversize_skips_exactly_declared_bytes() {
        // Reader holds 16 body bytes, i.e. 12 payload bytes.
        let len = 30usize;
        let mut stream = std::vec![NPI_SOF, len as u8, 0, 0x41, 0x01];
        // Payload full of SOF markers must not restart framing.
        stream.extend(core::iter::repeat(NPI_SOF).take(len));
        stream.push(0x00); // FCS slot
        let small = NpiFrame::new(MsgType::Async, 1, 9, &[7, 7]).unwrap();
        stream.extend(wire(&small));

        for chunk in [1, 3, stream.len()] {
            let mut reader = FrameReader::<16>::new();
            let mut seen = StdVec::new();
            for piece in stream.chunks(chunk) {
                run(&mut reader, piece, &mut seen);
            }
            assert_eq!(seen.len(), 2, "chunk size {chunk}");
            assert_eq!(seen[0], Seen::Oversize);
            let Seen::Frame(body) = &seen[1] else {
                panic!("expected a frame");
            };
            assert_eq!(NpiFrame::decode_body(body).unwrap(), small);
        }
    }

    #[test]
    fn reset_drops_partial_frame() {
        let bytes = wire(&NpiFrame::new(MsgType::Async, 1, 1, &[1, 2, 3, 4]).unwrap());
        let mut reader = FrameReader::<NPI_TL_BUF_SIZE>::new();
        assert_eq!(reader.feed(&bytes[..4]), FeedResult::Consumed);
        assert_eq!(reader.state(), ReadState::Cmd1);
        reader.reset();
        let mut seen = StdVec::new();
        run(&mut reader, &bytes, &mut seen);
        assert_eq!(seen.len(), 1);
    }
}
