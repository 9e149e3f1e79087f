// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! MRDY/SRDY handshake.
//!
//! Both lines are active low on the wire; the traits below speak in terms of
//! "asserted" and leave polarity to the board code.

use heapless::Vec;

/// The two handshake GPIOs of one link.
pub trait HandshakeLines {
    /// Drive the local ready output.
    fn set_local_ready(&mut self, asserted: bool);
    /// Current state of the local ready output.
    fn local_ready(&self) -> bool;
    /// Instantaneous level of the remote ready input.
    fn remote_ready(&self) -> bool;
}

/// Remote ready transition seen by the coordinator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    Asserted,
    Deasserted,
}

/// Tracks the remote ready line from an interrupt that fires on both edges
/// but cannot say which one.
#[derive(Debug)]
pub struct Handshake {
    /// Shadow of the remote line, toggled on every interrupt.
    asserted: bool,
    /// Transmit packet count at the last assertion.
    stamp: u32,
}

impl Handshake {
    pub const fn new() -> Self {
        Self {
            asserted: false,
            stamp: 0,
        }
    }

    /// Aligns the shadow with the line, e.g. when the link is opened.
    pub fn sync(&mut self, level: bool) {
        self.asserted = level;
    }

    pub fn is_asserted(&self) -> bool {
        self.asserted
    }

    pub fn stamp(&self) -> u32 {
        self.stamp
    }

    /// Handles one edge interrupt.
    ///
    /// The shadow is toggled and then compared with `level`, the line read
    /// right after. If they differ an edge was missed; the shadow adopts
    /// `level` and a second notification is returned.
    pub fn on_interrupt(&mut self, level: bool, tx_pkt_count: u32) -> Vec<Edge, 2> {
        let mut edges = Vec::new();
        self.asserted = !self.asserted;
        let _ = edges.push(self.apply(tx_pkt_count));
        if self.asserted != level {
            self.asserted = level;
            let _ = edges.push(self.apply(tx_pkt_count));
        }
        edges
    }

    fn apply(&mut self, tx_pkt_count: u32) -> Edge {
        if self.asserted {
            self.stamp = tx_pkt_count;
            Edge::Asserted
        } else {
            Edge::Deasserted
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}
