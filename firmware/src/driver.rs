// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Glue between the NPI link and the nRF peripherals.
//!
//! The link's ports never block: they post a request to a driver task and
//! return. The driver task runs the DMA transfer and reports the result
//! back through [`NpiLink::driver_event`].

use core::pin::pin;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use defmt::{debug, warn};
use embassy_nrf::gpio::{Input, Output};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures::future::{select, Either};
use npi_transport::{DriverEvent, HandshakeLines, NpiLink, PortError, PowerPolicy};

#[cfg(feature = "npi-uart")]
pub use uart::*;

#[cfg(feature = "npi-spi")]
pub use spi::*;

#[cfg(all(feature = "npi-uart", feature = "npi-spi"))]
compile_error!("features `npi-uart` and `npi-spi` are mutually exclusive");

#[cfg(not(any(feature = "npi-uart", feature = "npi-spi")))]
compile_error!("select a transport with `npi-uart` or `npi-spi`");

pub type Link = NpiLink<Transport, Lines, CountedPower>;

/// Level of MRDY as last seen by the edge task. The line is active low.
pub static MRDY_ASSERTED: AtomicBool = AtomicBool::new(false);

/// Power constraint diagnostics, reported by the SYS service.
pub static POWER_HOLDS: AtomicU32 = AtomicU32::new(0);
pub static POWER_ACQUIRES: AtomicU32 = AtomicU32::new(0);

/// Counted power policy. The nRF has no sleep mode that would break an
/// EasyDMA transfer, so holding only feeds the counters.
pub struct CountedPower;

impl PowerPolicy for CountedPower {
    fn acquire(&mut self) {
        POWER_HOLDS.fetch_add(1, Ordering::Relaxed);
        POWER_ACQUIRES.fetch_add(1, Ordering::Relaxed);
    }

    fn release(&mut self) {
        POWER_HOLDS.fetch_sub(1, Ordering::Relaxed);
    }
}

/// SRDY output plus the MRDY level published by [`mrdy_task`].
pub struct Lines {
    srdy: Output<'static>,
}

impl Lines {
    pub fn new(srdy: Output<'static>) -> Self {
        Self { srdy }
    }
}

impl HandshakeLines for Lines {
    fn set_local_ready(&mut self, asserted: bool) {
        if asserted {
            self.srdy.set_low();
        } else {
            self.srdy.set_high();
        }
    }

    fn local_ready(&self) -> bool {
        self.srdy.is_set_low()
    }

    fn remote_ready(&self) -> bool {
        MRDY_ASSERTED.load(Ordering::Relaxed)
    }
}

#[embassy_executor::task]
pub async fn mrdy_task(mut mrdy: Input<'static>, link: &'static Link) {
    loop {
        mrdy.wait_for_any_edge().await;
        MRDY_ASSERTED.store(mrdy.is_low(), Ordering::Relaxed);
        link.remote_ready_edge();
    }
}

#[cfg(feature = "npi-uart")]
mod uart {
    use super::*;
    use consts::NPI_UART_MAX_TRANSFER;
    use embassy_nrf::peripherals::{TIMER0, UARTE0};
    use embassy_nrf::uarte::{UarteRxWithIdle, UarteTx};
    use heapless::Vec;
    use npi_transport::{UartPort, UartTransport};

    pub type Transport = UartTransport<SignalUart>;

    type Chunk = Vec<u8, NPI_UART_MAX_TRANSFER>;

    enum ReadCmd {
        Start,
        Cancel,
    }

    static READ: Signal<CriticalSectionRawMutex, ReadCmd> = Signal::new();
    static WRITE: Signal<CriticalSectionRawMutex, Chunk> = Signal::new();

    /// UART port backed by the rx and tx driver tasks.
    pub struct SignalUart;

    impl UartPort for SignalUart {
        fn start_read(&mut self) -> Result<(), PortError> {
            READ.signal(ReadCmd::Start);
            Ok(())
        }

        fn start_write(&mut self, bytes: &[u8]) -> Result<(), PortError> {
            if WRITE.signaled() {
                return Err(PortError::Busy);
            }
            let chunk = Chunk::from_slice(bytes).map_err(|_| PortError::Hardware)?;
            WRITE.signal(chunk);
            Ok(())
        }

        fn cancel_read(&mut self) {
            READ.signal(ReadCmd::Cancel);
        }
    }

    #[embassy_executor::task]
    pub async fn uart_rx_task(mut rx: UarteRxWithIdle<'static, UARTE0, TIMER0>, link: &'static Link) {
        let mut buf = [0u8; NPI_UART_MAX_TRANSFER];
        loop {
            if let ReadCmd::Cancel = READ.wait().await {
                continue;
            }
            let n = {
                let read = pin!(rx.read_until_idle(&mut buf));
                match select(read, READ.wait()).await {
                    Either::Left((Ok(n), _)) => n,
                    Either::Left((Err(e), _)) => {
                        warn!("uart: read failed: {}", e);
                        0
                    }
                    // Cancelled: completes with nothing.
                    Either::Right(_) => 0,
                }
            };
            link.driver_event(DriverEvent::ReadDone(&buf[..n]));
        }
    }

    #[embassy_executor::task]
    pub async fn uart_tx_task(mut tx: UarteTx<'static, UARTE0>, link: &'static Link) {
        loop {
            let chunk = WRITE.wait().await;
            let sent = match tx.write(&chunk).await {
                Ok(()) => chunk.len(),
                Err(e) => {
                    warn!("uart: write failed: {}", e);
                    0
                }
            };
            debug!("uart: {} bytes out", sent);
            link.driver_event(DriverEvent::WriteDone(sent));
        }
    }
}

#[cfg(feature = "npi-spi")]
mod spi {
    use super::*;
    use consts::NPI_TL_BUF_SIZE;
    use embassy_nrf::peripherals::SPI0;
    use embassy_nrf::spis::Spis;
    use npi_transport::{SpiPort, SpiTransport};

    pub type Transport = SpiTransport<SignalSpi>;

    type Exchange = [u8; NPI_TL_BUF_SIZE];

    enum SpiCmd {
        Start(Exchange),
        Cancel,
    }

    static CMD: Signal<CriticalSectionRawMutex, SpiCmd> = Signal::new();

    /// SPI slave port backed by [`spi_task`].
    pub struct SignalSpi;

    impl SpiPort for SignalSpi {
        fn start_transfer(&mut self, tx: &[u8]) -> Result<(), PortError> {
            let mut exchange = [0u8; NPI_TL_BUF_SIZE];
            exchange
                .get_mut(..tx.len())
                .ok_or(PortError::Hardware)?
                .copy_from_slice(tx);
            CMD.signal(SpiCmd::Start(exchange));
            Ok(())
        }

        fn cancel(&mut self) {
            CMD.signal(SpiCmd::Cancel);
        }
    }

    #[embassy_executor::task]
    pub async fn spi_task(mut spis: Spis<'static, SPI0>, link: &'static Link) {
        let mut rx = [0u8; NPI_TL_BUF_SIZE];
        let mut next = None;
        loop {
            let tx = match next.take() {
                Some(tx) => tx,
                None => match CMD.wait().await {
                    SpiCmd::Start(tx) => tx,
                    SpiCmd::Cancel => continue,
                },
            };
            // None when the exchange was dropped before the master clocked it.
            let clocked = {
                let transfer = pin!(spis.transfer(&mut rx, &tx));
                match select(transfer, CMD.wait()).await {
                    Either::Left((Ok(_), _)) => Some(true),
                    Either::Left((Err(e), _)) => {
                        warn!("spi: transfer failed: {}", e);
                        Some(false)
                    }
                    // A cancel followed by a new exchange collapses into the
                    // latter.
                    Either::Right((SpiCmd::Start(tx), _)) => {
                        next = Some(tx);
                        None
                    }
                    Either::Right((SpiCmd::Cancel, _)) => None,
                }
            };
            match clocked {
                Some(true) => link.driver_event(DriverEvent::TransferDone(&rx)),
                Some(false) => link.driver_event(DriverEvent::TransferDone(&[])),
                None => {}
            }
        }
    }
}
