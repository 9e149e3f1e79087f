// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Transport layer: one transport plus its handshake lines and power hold.
//!
//! Everything here runs either from the driver completion context or from
//! the dispatch task, always under the link's critical section mutex.

use npi_protocol::Error;

use crate::handshake::{Edge, Handshake, HandshakeLines};
use crate::power::{Constraint, PowerPolicy};
use crate::transport::{Done, DriverEvent, Transport};

/// Which side drives MRDY.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Network processor: senses MRDY, drives SRDY.
    #[default]
    Slave,
    /// Application processor: drives MRDY, senses SRDY.
    Master,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    /// Gate every transaction on the MRDY/SRDY handshake.
    pub power_saving: bool,
    pub role: Role,
}

pub struct TransportLayer<T, H, P> {
    config: LinkConfig,
    transport: T,
    lines: H,
    power: Constraint<P>,
    handshake: Handshake,
    tx_active: bool,
    tx_pkt_count: u32,
}

impl<T, H, P> TransportLayer<T, H, P>
where
    T: Transport,
    H: HandshakeLines,
    P: PowerPolicy,
{
    pub fn new(config: LinkConfig, transport: T, lines: H, policy: P) -> Self {
        Self {
            config,
            transport,
            lines,
            power: Constraint::new(policy),
            handshake: Handshake::new(),
            tx_active: false,
            tx_pkt_count: 0,
        }
    }

    pub fn config(&self) -> LinkConfig {
        self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn lines(&self) -> &H {
        &self.lines
    }

    pub fn lines_mut(&mut self) -> &mut H {
        &mut self.lines
    }

    pub fn power(&self) -> &Constraint<P> {
        &self.power
    }

    pub fn max_body(&self) -> usize {
        self.transport.max_body()
    }

    pub fn tx_pkt_count(&self) -> u32 {
        self.tx_pkt_count
    }

    pub fn is_tx_active(&self) -> bool {
        self.tx_active
    }

    pub fn open(&mut self) {
        let power_saving = self.config.power_saving;
        self.lines.set_local_ready(false);
        self.tx_active = false;
        self.transport.open(power_saving);
        if power_saving {
            let level = self.lines.remote_ready();
            self.handshake.sync(level);
            // The assertion happened before we were listening.
            if level {
                self.power.set();
                self.transport.read();
                self.lines.set_local_ready(true);
            }
        }
        info!("npi: link open, power saving {}", power_saving);
    }

    pub fn close(&mut self) {
        self.lines.set_local_ready(false);
        self.power.release();
        self.transport.close();
        self.tx_active = false;
    }

    /// True while a transaction is in progress.
    pub fn check_busy(&self) -> bool {
        if self.config.power_saving {
            self.lines.local_ready()
                || (self.config.role == Role::Master && self.lines.remote_ready())
        } else {
            self.tx_active
        }
    }

    /// Starts sending one body, `[LEN][CMD0][CMD1][payload]` for NPI.
    pub fn write(&mut self, body: &[u8]) -> Result<(), Error> {
        if self.check_busy() {
            return Err(Error::Busy);
        }
        if body.len() > self.transport.max_body() {
            return Err(Error::Oversize);
        }
        self.tx_active = true;
        self.tx_pkt_count = self.tx_pkt_count.wrapping_add(1);
        if self.config.power_saving {
            self.power.set();
        }

        if self.transport.write(body) == 0 {
            self.tx_active = false;
            if self.config.power_saving && !self.handshake.is_asserted() {
                self.power.release();
            }
            return Err(Error::Busy);
        }

        if self.config.power_saving {
            self.lines.set_local_ready(true);
        }
        Ok(())
    }

    /// Remote ready interrupt. Returns true when the task has to run
    /// [`TransportLayer::handle_remote_ready`].
    pub fn remote_ready_edge(&mut self, done: Done<'_>) -> bool {
        if !self.config.power_saving {
            return false;
        }
        let level = self.lines.remote_ready();
        let edges = self.handshake.on_interrupt(level, self.tx_pkt_count);
        if edges.len() > 1 {
            warn!("npi: missed remote ready edge, resynchronised");
        }
        for edge in &edges {
            match edge {
                Edge::Asserted => self.power.set(),
                Edge::Deasserted => {
                    self.with_completion(&mut *done, |t, cb| t.stop_transfer(cb));
                    // Asserted and dropped before the task armed anything.
                    if !self.lines.local_ready() && !self.tx_active {
                        self.power.release();
                    }
                }
            }
        }
        !edges.is_empty()
    }

    /// Task side of a remote ready change.
    pub fn handle_remote_ready(&mut self, done: Done<'_>) {
        let stamped = self.tx_active && self.handshake.stamp() == self.tx_pkt_count;
        if self.lines.remote_ready() || stamped {
            self.with_completion(done, |t, cb| t.handle_remote_ready(cb));
            // A completion inside the call above already dropped the line.
            if self.power.is_held() {
                self.lines.set_local_ready(true);
            }
        }
    }

    /// Driver completion.
    pub fn driver_event(&mut self, event: DriverEvent<'_>, done: Done<'_>) {
        self.with_completion(done, |t, cb| t.driver_event(event, cb));
    }

    /// Runs `f` against the transport with the TL's completion wrapped
    /// around `done`.
    fn with_completion<F>(&mut self, done: Done<'_>, f: F)
    where
        F: FnOnce(&mut T, Done<'_>),
    {
        let power_saving = self.config.power_saving;
        let Self {
            transport,
            lines,
            power,
            tx_active,
            ..
        } = self;
        let mut complete = |rx: &[u8], tx: Option<usize>| {
            // Any finished write frees the link, even one that sent nothing.
            if tx.is_some() || power_saving {
                *tx_active = false;
            }
            done(rx, tx);
            if power_saving {
                power.release();
                lines.set_local_ready(false);
            }
        };
        f(transport, &mut complete);
    }
}
