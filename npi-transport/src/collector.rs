// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Frame collectors turn the bytes parked in the receive ring back into
//! messages. Which one runs depends on what the link carries.

use npi_protocol::frame::{BodyFeed, BodyReader};
use npi_protocol::hci::HciFeed;
use npi_protocol::HciParser;

use crate::frame::Frame;
use crate::rxbuf::RxBuf;

const CHUNK: usize = 64;

pub trait FrameCollector {
    /// Drains `rx`, handing every complete frame to `sink`. A partial frame
    /// stays in the collector until more bytes arrive. Stops early once
    /// `sink` returns false; the bytes after that frame stay put for the
    /// next call.
    fn collect<const N: usize>(&mut self, rx: &RxBuf<N>, sink: &mut dyn FnMut(Frame) -> bool);
}

/// Bytes taken out of the ring and not fed to a parser yet.
#[derive(Debug)]
struct Staging {
    buf: [u8; CHUNK],
    start: usize,
    end: usize,
}

impl Default for Staging {
    fn default() -> Self {
        Self::new()
    }
}

impl Staging {
    const fn new() -> Self {
        Self {
            buf: [0; CHUNK],
            start: 0,
            end: 0,
        }
    }

    /// Unfed bytes, refilled from `rx` once the last chunk is used up.
    fn pending<const N: usize>(&mut self, rx: &RxBuf<N>) -> &[u8] {
        if self.start == self.end {
            self.start = 0;
            self.end = rx.read(&mut self.buf);
        }
        &self.buf[self.start..self.end]
    }

    /// Everything but the last `remaining` pending bytes has been fed.
    fn keep(&mut self, remaining: usize) {
        self.start = self.end - remaining;
    }
}

/// NPI bodies, `[LEN_LSB][LEN_MSB][CMD0][CMD1][payload]`, as delivered by
/// the UART and SPI transports.
#[derive(Debug, Default)]
pub struct NpiCollector {
    reader: BodyReader,
    staging: Staging,
}

impl NpiCollector {
    pub const fn new() -> Self {
        Self {
            reader: BodyReader::new(),
            staging: Staging::new(),
        }
    }
}

impl FrameCollector for NpiCollector {
    fn collect<const N: usize>(&mut self, rx: &RxBuf<N>, sink: &mut dyn FnMut(Frame) -> bool) {
        loop {
            let data = self.staging.pending(rx);
            if data.is_empty() {
                break;
            }
            let (frame, remaining) = match self.reader.feed(data) {
                BodyFeed::Consumed => (None, 0),
                BodyFeed::Frame { frame, remaining } => (Some(frame), remaining.len()),
                BodyFeed::Oversize(remaining) => {
                    warn!("npi: oversized frame flushed");
                    (None, remaining.len())
                }
            };
            self.staging.keep(remaining);
            if let Some(frame) = frame {
                if !sink(Frame::Npi(frame)) {
                    break;
                }
            }
        }
    }
}

/// HCI commands and data packets from the host.
#[derive(Debug, Default)]
pub struct HciCollector {
    parser: HciParser,
    staging: Staging,
}

impl HciCollector {
    pub const fn new(max_len: usize) -> Self {
        Self {
            parser: HciParser::new(max_len),
            staging: Staging::new(),
        }
    }
}

impl FrameCollector for HciCollector {
    fn collect<const N: usize>(&mut self, rx: &RxBuf<N>, sink: &mut dyn FnMut(Frame) -> bool) {
        loop {
            let data = self.staging.pending(rx);
            if data.is_empty() {
                break;
            }
            let (packet, remaining) = match self.parser.feed(data) {
                HciFeed::Consumed => (None, 0),
                HciFeed::Packet { packet, remaining } => (Some(packet), remaining.len()),
                HciFeed::Flushed(remaining) => {
                    warn!("hci: oversized packet flushed");
                    (None, remaining.len())
                }
            };
            self.staging.keep(remaining);
            if let Some(packet) = packet {
                if !sink(Frame::Hci(packet)) {
                    break;
                }
            }
        }
    }
}
