// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Size of the transport layer transmit and receive buffers.
/// Bounds the unframed body (length, command and payload bytes) of a single
/// NPI message in either direction.
pub const NPI_TL_BUF_SIZE: usize = 270;

/// Start of frame marker used by both the UART and SPI framings.
pub const NPI_SOF: u8 = 0xFE;

/// Length of the NPI message header: two length bytes plus CMD0 and CMD1.
pub const NPI_MSG_HDR_LENGTH: usize = 4;

/// Largest payload an SPI frame can carry.
/// The SPI framing has a single length byte.
pub const NPI_SPI_PAYLOAD_SIZE: usize = 255;

/// Non-payload bytes of an SPI frame: zero pad, SOF, LEN and FCS.
pub const NPI_SPI_HDR_LEN: usize = 4;

/// Capacity of the circular receive buffer sitting between the transport
/// completion path and the frame collector.
/// Holds two full bodies so a completion can land while the previous frame
/// is still being collected.
pub const NPI_RX_BUF_SIZE: usize = 2 * NPI_TL_BUF_SIZE;

/// Depth of each dispatch queue (async/sync, TX/RX, from-stack).
pub const NPI_QUEUE_DEPTH: usize = 4;

/// Maximum number of subsystems that can register a from-host handler.
pub const NPI_MAX_SUBSYSTEMS: usize = 8;

/// Time a synchronous request may stay unanswered before the dispatch task
/// gives up on it and resumes processing queued synchronous requests.
pub const NPI_SYNC_WATCHDOG_MS: u64 = 500;

/// Largest single UARTE DMA transfer.
/// Longer writes are fragmented by the UART transport.
pub const NPI_UART_MAX_TRANSFER: usize = 255;

/// Default baudrate of the NPI UART link.
pub const NPI_UART_BAUDRATE: u32 = 115_200;

/// Baudrate used to talk to a serial bootloader.
pub const SBL_UART_BAUDRATE: u32 = 115_200;
