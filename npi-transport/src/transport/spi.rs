// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::NPI_TL_BUF_SIZE;
use npi_protocol::spi;

use super::{Done, DriverEvent, SpiPort, Transport};

/// SPI slave transport.
///
/// Every exchange is `NPI_TL_BUF_SIZE` bytes long. A read is an exchange
/// with an all zero transmit buffer; a write replaces any armed read.
pub struct SpiTransport<P> {
    port: P,
    power_saving: bool,
    tx: [u8; NPI_TL_BUF_SIZE],
    /// Framed length of the pending write, 0 when none.
    tx_len: usize,
    rx_active: bool,
}

impl<P: SpiPort> SpiTransport<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            power_saving: false,
            tx: [0; NPI_TL_BUF_SIZE],
            tx_len: 0,
            rx_active: false,
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}

impl<P: SpiPort> Transport for SpiTransport<P> {
    fn max_body(&self) -> usize {
        spi::max_payload(NPI_TL_BUF_SIZE)
    }

    fn open(&mut self, power_saving: bool) {
        self.power_saving = power_saving;
        if !power_saving {
            self.read();
        }
    }

    fn close(&mut self) {
        if self.rx_active || self.tx_len > 0 {
            self.port.cancel();
        }
        self.rx_active = false;
        self.tx_len = 0;
    }

    fn read(&mut self) {
        if self.rx_active || self.tx_len > 0 {
            return;
        }
        self.tx.fill(0);
        match self.port.start_transfer(&self.tx) {
            Ok(()) => self.rx_active = true,
            Err(e) => warn!("spi: read refused {:?}", e),
        }
    }

    fn write(&mut self, body: &[u8]) -> usize {
        if self.tx_len > 0 {
            return 0;
        }
        if self.rx_active {
            self.port.cancel();
            self.rx_active = false;
        }
        self.tx.fill(0);
        let len = match spi::encode(body, &mut self.tx) {
            Ok(len) => len,
            Err(e) => {
                warn!("spi: cannot frame {} byte body: {}", body.len(), e);
                return 0;
            }
        };
        match self.port.start_transfer(&self.tx) {
            Ok(()) => {
                self.tx_len = len;
                len
            }
            Err(e) => {
                warn!("spi: write refused {:?}", e);
                self.tx_len = 0;
                if !self.power_saving {
                    self.read();
                }
                0
            }
        }
    }

    fn stop_transfer(&mut self, done: Done<'_>) {
        // An exchange the master never clocked.
        if self.rx_active && self.tx_len == 0 {
            self.port.cancel();
            self.rx_active = false;
            done(&[], None);
        }
    }

    fn handle_remote_ready(&mut self, _done: Done<'_>) {
        if self.tx_len == 0 && !self.rx_active {
            self.read();
        }
    }

    fn driver_event(&mut self, event: DriverEvent<'_>, done: Done<'_>) {
        let DriverEvent::TransferDone(rx) = event else {
            debug!("spi: ignoring UART completion");
            return;
        };
        let sent = (self.tx_len > 0).then_some(self.tx_len);
        self.tx_len = 0;
        self.rx_active = false;
        let body = spi::decode(rx).unwrap_or(&[]);
        done(body, sent);
        if !self.power_saving {
            self.read();
        }
    }
}
