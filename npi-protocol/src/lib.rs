// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Processor Interface (NPI) wire formats.
//! The application processor is the host and the radio MCU is the network
//! processor. This crate only knows about bytes: it frames and parses
//! messages for the UART, SPI and HCI links plus the serial bootloader, and
//! leaves scheduling and flow control to `npi-transport`.

#![cfg_attr(not(test), no_std)]

pub mod fcs;
pub mod frame;
pub mod hci;
pub mod sbl;
pub mod spi;
pub mod status;
pub mod uart;

pub use frame::{subsystem, MsgType, NpiFrame, MAX_NPI_PAYLOAD};
pub use hci::{HciEvent, HciPacket, HciParser, PacketType};
pub use status::{Error, Status};
