// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! NPI link: transports, MRDY/SRDY handshake and the dispatch task.
//!
//! Bytes flow from a [`transport::Transport`] completion into the receive
//! ring, get reassembled by a [`collector::FrameCollector`] and are routed by
//! the [`task::NpiTask`]. Frames for the host go through the link queues and
//! leave through the same transport.

#![cfg_attr(not(test), no_std)]

// This must go first so the macros are visible everywhere.
#[macro_use]
mod fmt;

pub mod collector;
pub mod events;
pub mod frame;
pub mod handshake;
pub mod link;
pub mod power;
pub mod rxbuf;
pub mod task;
pub mod tl;
pub mod transport;

#[cfg(test)]
mod tests;

pub use collector::{FrameCollector, HciCollector, NpiCollector};
pub use events::{EventFlags, Events};
pub use frame::Frame;
pub use handshake::{Edge, Handshake, HandshakeLines};
pub use link::NpiLink;
pub use power::{Constraint, NoPowerPolicy, PowerPolicy};
pub use rxbuf::RxBuf;
pub use task::{Handler, NpiTask, Policy};
pub use tl::{LinkConfig, Role, TransportLayer};
pub use transport::{DriverEvent, PortError, SpiPort, SpiTransport, Transport, UartPort, UartTransport};
