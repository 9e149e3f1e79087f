// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! SPI framing: `[0x00][SOF][LEN][payload...][FCS]` padded to the fixed
//! exchange size.
//!
//! Every SPI transaction is a full-duplex exchange of the whole buffer. The
//! leading zero is required by the SPI engine; the receiver accepts the SOF
//! with or without it. FCS is the XOR of `LEN` and the payload.

use crate::{fcs, Error};
use consts::{NPI_SOF, NPI_SPI_HDR_LEN, NPI_SPI_PAYLOAD_SIZE};

const PAD: u8 = 0x00;

/// Largest payload that fits an exchange buffer of `buf_len` bytes.
pub const fn max_payload(buf_len: usize) -> usize {
    let room = buf_len.saturating_sub(NPI_SPI_HDR_LEN);
    if room < NPI_SPI_PAYLOAD_SIZE {
        room
    } else {
        NPI_SPI_PAYLOAD_SIZE
    }
}

/// Fills the whole of `out` with a framed `payload` followed by zeros and
/// returns the number of meaningful bytes.
pub fn encode(payload: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    if out.len() < NPI_SPI_HDR_LEN {
        return Err(Error::BufferTooSmall);
    }
    if payload.len() > max_payload(out.len()) {
        return Err(Error::Oversize);
    }
    let len = payload.len();
    out.fill(0);
    out[0] = PAD;
    out[1] = NPI_SOF;
    out[2] = len as u8;
    out[3..3 + len].copy_from_slice(payload);
    out[3 + len] = fcs::xor(&out[2..3 + len]);
    Ok(len + NPI_SPI_HDR_LEN)
}

/// Extracts the payload of a received exchange buffer, `None` when the SOF
/// is missing, the length overruns the buffer or the FCS does not match.
pub fn decode(rx: &[u8]) -> Option<&[u8]> {
    let start = match rx {
        [NPI_SOF, ..] => 0,
        [PAD, NPI_SOF, ..] => 1,
        _ => return None,
    };
    let frame = &rx[start..];
    let len = *frame.get(1)? as usize;
    let fcs_at = len + 2;
    let received = *frame.get(fcs_at)?;
    if fcs::xor(&frame[1..fcs_at]) != received {
        return None;
    }
    Some(&frame[2..fcs_at])
}
