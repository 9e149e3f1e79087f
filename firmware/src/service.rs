// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Frame handlers living on the network processor.

use core::sync::atomic::Ordering;

use defmt::{debug, info, warn};
use npi_protocol::{subsystem, Error, MsgType, NpiFrame, Status};
use npi_transport::{Frame, Handler};

use crate::driver::{Link, POWER_ACQUIRES, POWER_HOLDS};

// SYS commands (CMD1)
pub const SYS_PING: u8 = 0x01;
pub const SYS_ECHO: u8 = 0x02;
pub const SYS_POWER: u8 = 0x03;

/// Builds the response to `req`: the status byte followed by `data`.
fn sync_rsp(req: &NpiFrame, status: Status, data: &[u8]) -> Result<NpiFrame, Error> {
    let mut rsp = NpiFrame::new(MsgType::SyncRsp, req.subsystem(), req.cmd1, &[status as u8])?;
    rsp.payload.extend_from_slice(data).map_err(|_| Error::Oversize)?;
    Ok(rsp)
}

/// The `SYS` subsystem: ping, echo and power diagnostics.
pub struct SysService {
    link: &'static Link,
}

impl SysService {
    pub fn new(link: &'static Link) -> Self {
        Self { link }
    }

    fn answer(&self, req: &NpiFrame) -> Option<Result<NpiFrame, Error>> {
        let msg_type = req.msg_type().ok()?;
        let reply = match (msg_type, req.cmd1) {
            (MsgType::SyncReq, SYS_PING) => {
                sync_rsp(req, Status::Success, env!("CARGO_PKG_VERSION").as_bytes())
            }
            (MsgType::SyncReq, SYS_POWER) => {
                let mut data = [0u8; 8];
                data[..4].copy_from_slice(&POWER_HOLDS.load(Ordering::Relaxed).to_le_bytes());
                data[4..].copy_from_slice(&POWER_ACQUIRES.load(Ordering::Relaxed).to_le_bytes());
                sync_rsp(req, Status::Success, &data)
            }
            (MsgType::SyncReq, _) => sync_rsp(req, Status::TaskInvalidParams, &[]),
            (MsgType::Async, SYS_ECHO) => {
                NpiFrame::new(MsgType::Async, subsystem::SYS, SYS_ECHO, &req.payload)
            }
            _ => return None,
        };
        Some(reply)
    }
}

impl Handler for SysService {
    fn handle_frame(&mut self, frame: Frame) {
        let Frame::Npi(req) = frame else {
            return;
        };
        match self.answer(&req) {
            Some(Ok(reply)) => {
                if let Err(e) = self.link.send_to_host(reply.into()) {
                    warn!("sys: reply dropped: {}", e);
                }
            }
            Some(Err(e)) => warn!("sys: cannot build reply: {}", e),
            None => debug!("sys: ignored cmd {=u8:#x}", req.cmd1),
        }
    }
}

/// Stands in for the protocol stack: frames nobody claimed end up here.
/// Sync requests get a `SubsystemNotFound` answer so the host is not left
/// waiting for the watchdog.
pub struct StackStandIn {
    link: &'static Link,
}

impl StackStandIn {
    pub fn new(link: &'static Link) -> Self {
        Self { link }
    }
}

impl Handler for StackStandIn {
    fn handle_frame(&mut self, frame: Frame) {
        info!("stack: {}", frame);
        let Frame::Npi(req) = frame else {
            return;
        };
        if req.msg_type() != Ok(MsgType::SyncReq) {
            return;
        }
        let result = sync_rsp(&req, Status::SubsystemNotFound, &[])
            .and_then(|rsp| self.link.send_from_stack(rsp.into()));
        if let Err(e) = result {
            warn!("stack: no answer for ss {}: {}", req.subsystem(), e);
        }
    }
}

/// Counts finished transmits.
#[derive(Default)]
pub struct TxCounter {
    count: u32,
}

impl Handler for TxCounter {
    fn handle_frame(&mut self, _frame: Frame) {}

    fn transaction_done(&mut self) {
        self.count = self.count.wrapping_add(1);
        debug!("npi: {} frames sent", self.count);
    }
}
