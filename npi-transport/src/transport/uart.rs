// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::{NPI_TL_BUF_SIZE, NPI_UART_MAX_TRANSFER};
use heapless::Vec;
use npi_protocol::uart::{self, FeedResult, FrameReader, FRAMING_OVERHEAD};

use super::{Done, DriverEvent, Transport, UartPort};

const TX_BUF_SIZE: usize = NPI_TL_BUF_SIZE + FRAMING_OVERHEAD;

/// UART transport.
///
/// Without power saving a read is always armed and every completed frame
/// is reported on its own. With power saving the link runs in
/// transactions bounded by the remote ready line: the read half ends on
/// the first frame or when the line drops, the write half once the queued
/// frame is fully out, and a single completion covers both.
pub struct UartTransport<P> {
    port: P,
    power_saving: bool,
    max_transfer: usize,

    reader: FrameReader<NPI_TL_BUF_SIZE>,
    rx_active: bool,
    stop_requested: bool,
    /// Body received during the current transaction.
    rx_body: Vec<u8, NPI_TL_BUF_SIZE>,
    rx_valid: bool,

    tx: Vec<u8, TX_BUF_SIZE>,
    tx_sent: usize,
    tx_in_flight: bool,
    /// Framed, waiting for the remote side or partially sent.
    tx_pending: bool,
    /// Bytes sent by the transaction's write half, once it finished.
    tx_done: Option<usize>,
}

impl<P: UartPort> UartTransport<P> {
    pub fn new(port: P) -> Self {
        Self::with_max_transfer(port, NPI_UART_MAX_TRANSFER)
    }

    /// Writes are split into DMA transfers of at most `max_transfer` bytes.
    pub fn with_max_transfer(port: P, max_transfer: usize) -> Self {
        Self {
            port,
            power_saving: false,
            max_transfer: max_transfer.max(1),
            reader: FrameReader::new(),
            rx_active: false,
            stop_requested: false,
            rx_body: Vec::new(),
            rx_valid: false,
            tx: Vec::new(),
            tx_sent: 0,
            tx_in_flight: false,
            tx_pending: false,
            tx_done: None,
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    fn start_fragment(&mut self) -> bool {
        let end = (self.tx_sent + self.max_transfer).min(self.tx.len());
        match self.port.start_write(&self.tx[self.tx_sent..end]) {
            Ok(()) => {
                self.tx_in_flight = true;
                true
            }
            Err(e) => {
                warn!("uart: write refused {:?}", e);
                false
            }
        }
    }

    fn finish_write(&mut self) -> usize {
        let sent = self.tx_sent;
        self.tx.clear();
        self.tx_sent = 0;
        self.tx_in_flight = false;
        self.tx_pending = false;
        sent
    }

    /// Reports the transaction once both halves are idle.
    fn maybe_complete(&mut self, done: Done<'_>) {
        if self.rx_active || self.tx_pending || self.tx_in_flight {
            return;
        }
        let body: &[u8] = if self.rx_valid { &self.rx_body } else { &[] };
        done(body, self.tx_done.take());
        self.rx_body.clear();
        self.rx_valid = false;
    }

    fn on_read(&mut self, mut data: &[u8], done: Done<'_>) {
        self.rx_active = false;
        let cancelled = data.is_empty() || self.stop_requested;
        loop {
            match self.reader.feed(data) {
                FeedResult::Consumed => break,
                FeedResult::Success { body, remaining } => {
                    if self.power_saving {
                        if self.rx_valid {
                            warn!("uart: second frame in one transaction dropped");
                        } else {
                            self.rx_body.clear();
                            // Reader and body buffers have the same capacity.
                            let _ = self.rx_body.extend_from_slice(body);
                            self.rx_valid = true;
                        }
                    } else {
                        done(body, None);
                    }
                    data = remaining;
                }
                FeedResult::BadChecksum(remaining) => {
                    warn!("uart: bad FCS, frame dropped");
                    if !self.power_saving {
                        done(&[], None);
                    }
                    data = remaining;
                }
                FeedResult::Oversize(remaining) => {
                    warn!("uart: oversized frame dropped");
                    if !self.power_saving {
                        done(&[], None);
                    }
                    data = remaining;
                }
            }
        }

        if !self.power_saving {
            self.read();
            return;
        }
        if self.rx_valid || cancelled {
            if !self.rx_valid {
                self.reader.reset();
            }
            self.stop_requested = false;
            self.maybe_complete(done);
        } else {
            self.read();
        }
    }

    fn on_write(&mut self, written: usize, done: Done<'_>) {
        self.tx_in_flight = false;
        self.tx_sent = (self.tx_sent + written).min(self.tx.len());
        if self.tx_sent < self.tx.len() && written > 0 && self.start_fragment() {
            return;
        }
        if self.tx_sent < self.tx.len() {
            warn!("uart: write aborted after {} of {} bytes", self.tx_sent, self.tx.len());
        }
        let sent = self.finish_write();
        if self.power_saving {
            self.tx_done = Some(sent);
            self.maybe_complete(done);
        } else {
            done(&[], Some(sent));
        }
    }
}

impl<P: UartPort> Transport for UartTransport<P> {
    fn max_body(&self) -> usize {
        NPI_TL_BUF_SIZE
    }

    fn open(&mut self, power_saving: bool) {
        self.power_saving = power_saving;
        self.reader.reset();
        if !power_saving {
            self.read();
        }
    }

    fn close(&mut self) {
        if self.rx_active {
            self.port.cancel_read();
        }
        self.rx_active = false;
        self.stop_requested = false;
        self.reader.reset();
        self.rx_body.clear();
        self.rx_valid = false;
        self.finish_write();
        self.tx_done = None;
    }

    fn read(&mut self) {
        if self.rx_active {
            return;
        }
        match self.port.start_read() {
            Ok(()) => self.rx_active = true,
            Err(e) => warn!("uart: read refused {:?}", e),
        }
    }

    fn write(&mut self, body: &[u8]) -> usize {
        if self.tx_pending || self.tx_in_flight {
            return 0;
        }
        if self.tx.resize_default(TX_BUF_SIZE).is_err() {
            return 0;
        }
        let len = match uart::frame_body(body, &mut self.tx) {
            Ok(len) => len,
            Err(e) => {
                warn!("uart: cannot frame {} byte body: {}", body.len(), e);
                self.tx.clear();
                return 0;
            }
        };
        self.tx.truncate(len);
        self.tx_sent = 0;

        if self.power_saving {
            // Sent once the remote side says it is ready.
            self.tx_pending = true;
            self.read();
            return len;
        }
        if self.start_fragment() {
            len
        } else {
            self.finish_write();
            0
        }
    }

    fn stop_transfer(&mut self, _done: Done<'_>) {
        // The cancelled read completes through the driver.
        if self.rx_active {
            self.stop_requested = true;
            self.port.cancel_read();
        }
    }

    fn handle_remote_ready(&mut self, done: Done<'_>) {
        self.read();
        if self.tx_pending && !self.tx_in_flight && self.tx_sent == 0 && !self.start_fragment() {
            self.tx_done = Some(self.finish_write());
            self.maybe_complete(done);
        }
    }

    fn driver_event(&mut self, event: DriverEvent<'_>, done: Done<'_>) {
        match event {
            DriverEvent::ReadDone(data) => self.on_read(data, done),
            DriverEvent::WriteDone(written) => self.on_write(written, done),
            DriverEvent::TransferDone(_) => debug!("uart: ignoring SPI completion"),
        }
    }
}
