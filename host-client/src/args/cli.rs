// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Command line arguments.

use std::path::PathBuf;

use clap::ValueEnum;
use npi_protocol::MsgType;

#[derive(clap::Parser)]
#[command(about = "Talk to an NPI network processor over a serial port")]
pub struct Args {
    /// List the serial ports and exit.
    #[arg(short, long)]
    pub list_ports: bool,
    /// Path to config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Serial port, e.g. /dev/ttyUSB0.
    #[arg(short, long)]
    pub port: Option<String>,
    #[arg(short, long)]
    pub baudrate: Option<u32>,
    /// How long to wait for an answer.
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Send one frame. Sync requests wait for their response.
    Send {
        /// Subsystem id, decimal or 0x-prefixed hex.
        #[arg(short, long, value_parser = parse_byte)]
        subsystem: u8,
        /// CMD1, decimal or 0x-prefixed hex.
        #[arg(short, long, value_parser = parse_byte)]
        cmd: u8,
        #[arg(long = "type", value_enum, default_value_t = FrameType::Async)]
        kind: FrameType,
        /// Payload in hex.
        #[arg(long, default_value = "")]
        payload: String,
    },
    /// Print every frame the network processor sends.
    Monitor,
    /// Send the frames listed in a TOML script.
    Script { file: PathBuf },
    /// Send the serial bootloader autobaud sequence and report the answer.
    SblAutobaud,
}

/// Frame types a host may originate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameType {
    #[default]
    Async,
    SyncReq,
}

impl From<FrameType> for MsgType {
    fn from(kind: FrameType) -> Self {
        match kind {
            FrameType::Async => MsgType::Async,
            FrameType::SyncReq => MsgType::SyncReq,
        }
    }
}

pub fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("`{s}` is not a byte: {e}"))
}
