// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Serial transports.
//!
//! A transport owns the framing of one physical link. Its port only arms
//! DMA transfers; results come back later through [`Transport::driver_event`]
//! from whatever context the driver completes in. Nothing here blocks.

pub mod spi;
pub mod uart;

pub use spi::SpiTransport;
pub use uart::UartTransport;

/// The hardware refused to start a transfer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortError {
    Busy,
    Hardware,
}

/// Non-blocking UART driver.
pub trait UartPort {
    /// Arm a receive. Completes with [`DriverEvent::ReadDone`] as soon as
    /// some bytes arrived, or with no bytes after [`UartPort::cancel_read`].
    fn start_read(&mut self) -> Result<(), PortError>;
    /// Arm a transmit of `bytes`, at most one transfer in flight.
    /// Completes with [`DriverEvent::WriteDone`].
    fn start_write(&mut self, bytes: &[u8]) -> Result<(), PortError>;
    fn cancel_read(&mut self);
}

/// Non-blocking SPI slave driver.
pub trait SpiPort {
    /// Arm a full-duplex exchange of `tx.len()` bytes. Completes with
    /// [`DriverEvent::TransferDone`].
    fn start_transfer(&mut self, tx: &[u8]) -> Result<(), PortError>;
    /// Drop an armed exchange the master has not clocked yet. No completion
    /// is reported for it.
    fn cancel(&mut self);
}

/// Driver completions.
#[derive(Debug)]
pub enum DriverEvent<'d> {
    ReadDone(&'d [u8]),
    WriteDone(usize),
    TransferDone(&'d [u8]),
}

/// Called once per finished transaction with the received body (empty when
/// nothing valid arrived) and, when the transaction had a write half, the
/// number of bytes sent. A failed write completes with `Some(0)`.
pub type Done<'f> = &'f mut dyn FnMut(&[u8], Option<usize>);

pub trait Transport {
    /// Largest body accepted by [`Transport::write`].
    fn max_body(&self) -> usize;
    fn open(&mut self, power_saving: bool);
    fn close(&mut self);
    /// Arm a receive.
    fn read(&mut self);
    /// Frame and start sending `body`, or queue it until the remote side is
    /// ready. Returns the framed length, 0 if the port refused.
    fn write(&mut self, body: &[u8]) -> usize;
    /// The remote side de-asserted its ready line.
    fn stop_transfer(&mut self, done: Done<'_>);
    /// The remote side asserted its ready line.
    fn handle_remote_ready(&mut self, done: Done<'_>);
    fn driver_event(&mut self, event: DriverEvent<'_>, done: Done<'_>);
}
