// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use consts::NPI_UART_BAUDRATE;
use npi_protocol::{MsgType, NpiFrame};

mod cli;
mod config;

pub use cli::FrameType;
pub use config::{Config, Error as ConfigError};

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Program arguments loaded from the CLI and config file.
#[derive(Debug, Clone)]
pub struct Args {
    pub settings: Settings,
    pub action: Action,
}

/// Serial link settings after merging the config file and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub port: String,
    pub baudrate: u32,
    pub timeout: Duration,
}

impl Settings {
    /// CLI values win over config values, which win over the defaults.
    pub fn merge(cli: &cli::Args, config: Option<Config>) -> Self {
        let config = config.unwrap_or_default();
        Self {
            port: cli
                .port
                .clone()
                .or(config.port)
                .unwrap_or_else(|| DEFAULT_PORT.into()),
            baudrate: cli.baudrate.or(config.baudrate).unwrap_or(NPI_UART_BAUDRATE),
            timeout: Duration::from_millis(
                cli.timeout_ms.or(config.timeout_ms).unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    ListPorts,
    Send(NpiFrame),
    Monitor,
    Script(PathBuf),
    SblAutobaud,
}

pub fn args<I, T>(args: I) -> Result<Args, Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Args::try_parse_from(args).map_err(Error::Cli)?;
    let config = cli.config.as_deref().map(Config::load).transpose()?;
    let settings = Settings::merge(&cli, config);

    let action = if cli.list_ports {
        Action::ListPorts
    } else {
        match cli.command {
            None => return Err(Error::NoCommand),
            Some(cli::Command::Send {
                subsystem,
                cmd,
                kind,
                payload,
            }) => Action::Send(frame(kind.into(), subsystem, cmd, &payload)?),
            Some(cli::Command::Monitor) => Action::Monitor,
            Some(cli::Command::Script { file }) => Action::Script(file),
            Some(cli::Command::SblAutobaud) => Action::SblAutobaud,
        }
    };
    Ok(Args { settings, action })
}

/// Builds a frame from a hex payload.
pub fn frame(msg_type: MsgType, subsystem: u8, cmd: u8, payload: &str) -> Result<NpiFrame, Error> {
    let payload = hex::decode(payload.trim())?;
    NpiFrame::new(msg_type, subsystem, cmd, &payload).map_err(Error::Frame)
}

#[derive(Debug)]
pub enum Error {
    Cli(clap::Error),
    Config(ConfigError),
    Frame(npi_protocol::Error),
    Hex(hex::FromHexError),
    NoCommand,
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Hex(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Cli(e) => write!(f, "{e}"),
            Error::Config(e) => write!(f, "{e}"),
            Error::Frame(e) => write!(f, "cannot build frame: {e}"),
            Error::Hex(e) => write!(f, "payload is not valid hex: {e}"),
            Error::NoCommand => write!(f, "choose a command, see --help"),
        }
    }
}

impl std::error::Error for Error {}
