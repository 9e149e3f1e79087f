// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! NPI over a tokio serial port.

use consts::NPI_TL_BUF_SIZE;
use npi_protocol::uart::{self, FeedResult, FrameReader};
use npi_protocol::NpiFrame;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::Error;

/// Something the decoder pulled out of the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Frame(NpiFrame),
    /// Framing was fine but the body did not parse.
    Malformed(npi_protocol::Error),
    BadChecksum,
    Oversize,
}

/// Byte stream to frame decoder. Input may be split anywhere.
#[derive(Default)]
pub struct FrameStream {
    reader: FrameReader<NPI_TL_BUF_SIZE>,
    pending: Vec<u8>,
}

impl FrameStream {
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete item, if the buffered bytes hold one.
    pub fn next_item(&mut self) -> Option<Received> {
        let (item, left) = match self.reader.feed(&self.pending) {
            FeedResult::Consumed => {
                self.pending.clear();
                return None;
            }
            FeedResult::Success { body, remaining } => {
                let item = match NpiFrame::decode_body(body) {
                    Ok(frame) => Received::Frame(frame),
                    Err(e) => Received::Malformed(e),
                };
                (item, remaining.len())
            }
            FeedResult::BadChecksum(remaining) => (Received::BadChecksum, remaining.len()),
            FeedResult::Oversize(remaining) => (Received::Oversize, remaining.len()),
        };
        let used = self.pending.len() - left;
        self.pending.drain(..used);
        Some(item)
    }
}

pub struct SerialLink {
    serial: SerialStream,
    stream: FrameStream,
}

impl SerialLink {
    pub fn open(port: &str, baudrate: u32) -> Result<Self, Error> {
        let serial = tokio_serial::new(port, baudrate).open_native_async()?;
        log::info!("opened {port} at {baudrate} baud");
        Ok(Self {
            serial,
            stream: FrameStream::default(),
        })
    }

    pub async fn send(&mut self, frame: &NpiFrame) -> Result<(), Error> {
        let mut buf = [0u8; NPI_TL_BUF_SIZE + uart::FRAMING_OVERHEAD];
        let len = uart::encode(frame, &mut buf)?;
        log::debug!(">> {}", hex::encode(&buf[..len]));
        self.write_raw(&buf[..len]).await
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.serial.write_all(bytes).await?;
        self.serial.flush().await?;
        Ok(())
    }

    /// Reads exactly `buf.len()` bytes, bypassing the frame decoder.
    pub async fn read_raw(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.serial.read_exact(buf).await?;
        Ok(())
    }

    /// Waits for the next decoded item. Cancel safe: bytes already read stay
    /// buffered.
    pub async fn recv(&mut self) -> Result<Received, Error> {
        loop {
            if let Some(item) = self.stream.next_item() {
                return Ok(item);
            }
            let mut buf = [0u8; 256];
            let n = self.serial.read(&mut buf).await?;
            if n == 0 {
                return Err(Error::PortClosed);
            }
            log::trace!("<< {}", hex::encode(&buf[..n]));
            self.stream.push(&buf[..n]);
        }
    }
}
