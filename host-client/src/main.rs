// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use npi_protocol::{sbl, MsgType, NpiFrame, Status};

use args::{Action, Settings};
use link::{Received, SerialLink};
use script::Script;

mod args;
mod link;
mod script;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let args = match args::args(std::env::args_os()) {
        Ok(args) => args,
        Err(args::Error::Cli(e)) => e.exit(),
        Err(e) => return Err(e.into()),
    };
    run(args).await.map_err(Into::into)
}

async fn run(args: args::Args) -> Result<(), Error> {
    let settings = args.settings;
    match args.action {
        Action::ListPorts => {
            println!("List of available serial ports:");
            for port in tokio_serial::available_ports()? {
                println!("- {}", port.port_name);
            }
            Ok(())
        }
        Action::Send(frame) => {
            let mut link = SerialLink::open(&settings.port, settings.baudrate)?;
            transact(&mut link, &frame, settings.timeout).await
        }
        Action::Monitor => {
            let mut link = SerialLink::open(&settings.port, settings.baudrate)?;
            loop {
                print_received(&link.recv().await?);
            }
        }
        Action::Script(path) => {
            let script = Script::load(&path).map_err(args::Error::from)?;
            let mut link = SerialLink::open(&settings.port, settings.baudrate)?;
            for (idx, entry) in script.frames.iter().enumerate() {
                let frame = entry.frame()?;
                log::info!("script frame {idx}");
                transact(&mut link, &frame, settings.timeout).await?;
                if let Some(delay) = entry.delay() {
                    tokio::time::sleep(delay).await;
                }
            }
            Ok(())
        }
        Action::SblAutobaud => sbl_autobaud(&settings).await,
    }
}

/// Sends `frame`. A sync request waits for the response with the same
/// subsystem and command; anything else arriving meanwhile is printed.
async fn transact(link: &mut SerialLink, frame: &NpiFrame, timeout: Duration) -> Result<(), Error> {
    link.send(frame).await?;
    println!(">> {}", describe(frame));
    if frame.msg_type() != Ok(MsgType::SyncReq) {
        return Ok(());
    }

    let wait = async {
        loop {
            match link.recv().await? {
                Received::Frame(rsp)
                    if rsp.msg_type() == Ok(MsgType::SyncRsp)
                        && rsp.subsystem() == frame.subsystem()
                        && rsp.cmd1 == frame.cmd1 =>
                {
                    return Ok::<_, Error>(rsp);
                }
                other => print_received(&other),
            }
        }
    };
    let rsp = tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| Error::Timeout)??;
    println!("<< {}", describe(&rsp));
    // Responses carry their status first by convention.
    if let Some(status) = rsp.payload.first().and_then(|&s| Status::try_from(s).ok()) {
        println!("status: {status:?}");
    }
    Ok(())
}

async fn sbl_autobaud(settings: &Settings) -> Result<(), Error> {
    let mut link = SerialLink::open(&settings.port, settings.baudrate)?;
    link.write_raw(&sbl::AUTOBAUD).await?;
    let mut rsp = [0u8; 2];
    tokio::time::timeout(settings.timeout, link.read_raw(&mut rsp))
        .await
        .map_err(|_| Error::Timeout)??;
    match sbl::classify_ack(rsp)? {
        sbl::Ack::Ack => println!("bootloader acknowledged autobaud"),
        sbl::Ack::Nack => println!("bootloader refused autobaud"),
    }
    Ok(())
}

fn print_received(item: &Received) {
    match item {
        Received::Frame(frame) => println!("<< {}", describe(frame)),
        Received::Malformed(e) => log::warn!("malformed frame: {e}"),
        Received::BadChecksum => log::warn!("frame discarded, bad checksum"),
        Received::Oversize => log::warn!("frame discarded, too large"),
    }
}

fn describe(frame: &NpiFrame) -> String {
    let kind = match frame.msg_type() {
        Ok(t) => format!("{t:?}"),
        Err(_) => "?".into(),
    };
    format!(
        "{kind} ss={} cmd={:#04x} [{}]",
        frame.subsystem(),
        frame.cmd1,
        hex::encode(&frame.payload)
    )
}

#[derive(Debug)]
enum Error {
    Args(args::Error),
    Io(std::io::Error),
    PortClosed,
    Protocol(npi_protocol::Error),
    Serial(tokio_serial::Error),
    Timeout,
}

impl From<args::Error> for Error {
    fn from(e: args::Error) -> Self {
        Error::Args(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<npi_protocol::Error> for Error {
    fn from(e: npi_protocol::Error) -> Self {
        Error::Protocol(e)
    }
}

impl From<tokio_serial::Error> for Error {
    fn from(e: tokio_serial::Error) -> Self {
        Error::Serial(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Args(e) => write!(f, "{e}"),
            Error::Io(e) => write!(f, "serial i/o failed: {e}"),
            Error::PortClosed => write!(f, "serial port closed"),
            Error::Protocol(e) => write!(f, "{e}"),
            Error::Serial(e) => write!(f, "cannot open serial port: {e}"),
            Error::Timeout => write!(f, "no response from device"),
        }
    }
}

impl std::error::Error for Error {}
