// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::cell::RefCell;
use std::rc::Rc;

use consts::NPI_TL_BUF_SIZE;
use npi_protocol::{uart, MsgType, NpiFrame};

use crate::collector::NpiCollector;
use crate::frame::Frame;
use crate::handshake::HandshakeLines;
use crate::link::NpiLink;
use crate::power::PowerPolicy;
use crate::task::{Handler, NpiTask};
use crate::tl::{LinkConfig, Role, TransportLayer};
use crate::transport::{PortError, SpiPort, SpiTransport, UartPort, UartTransport};

mod tl;
mod transport;

#[derive(Default)]
pub struct FakeUart {
    pub reads: usize,
    pub read_armed: bool,
    pub cancels: usize,
    pub writes: Vec<Vec<u8>>,
    pub refuse_read: bool,
    pub refuse_write: bool,
}

impl UartPort for FakeUart {
    fn start_read(&mut self) -> Result<(), PortError> {
        if self.refuse_read {
            return Err(PortError::Busy);
        }
        self.reads += 1;
        self.read_armed = true;
        Ok(())
    }

    fn start_write(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        if self.refuse_write {
            return Err(PortError::Hardware);
        }
        self.writes.push(bytes.to_vec());
        Ok(())
    }

    fn cancel_read(&mut self) {
        self.cancels += 1;
        self.read_armed = false;
    }
}

#[derive(Default)]
pub struct FakeSpi {
    pub transfers: Vec<Vec<u8>>,
    pub cancels: usize,
    pub refuse: bool,
}

impl SpiPort for FakeSpi {
    fn start_transfer(&mut self, tx: &[u8]) -> Result<(), PortError> {
        if self.refuse {
            return Err(PortError::Busy);
        }
        self.transfers.push(tx.to_vec());
        Ok(())
    }

    fn cancel(&mut self) {
        self.cancels += 1;
    }
}

#[derive(Default)]
pub struct FakeLines {
    pub local: bool,
    pub remote: bool,
}

impl HandshakeLines for FakeLines {
    fn set_local_ready(&mut self, asserted: bool) {
        self.local = asserted;
    }

    fn local_ready(&self) -> bool {
        self.local
    }

    fn remote_ready(&self) -> bool {
        self.remote
    }
}

/// Counts outstanding holds like a platform power manager would.
#[derive(Default)]
pub struct CountingPower {
    pub holds: i32,
}

impl PowerPolicy for CountingPower {
    fn acquire(&mut self) {
        self.holds += 1;
    }

    fn release(&mut self) {
        self.holds -= 1;
    }
}

/// Records everything it is handed. Clones share the same log.
#[derive(Clone, Default)]
pub struct Recorder {
    pub frames: Rc<RefCell<Vec<Frame>>>,
    pub done: Rc<RefCell<usize>>,
}

impl Recorder {
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.borrow().clone()
    }

    pub fn done(&self) -> usize {
        *self.done.borrow()
    }
}

impl Handler for Recorder {
    fn handle_frame(&mut self, frame: Frame) {
        self.frames.borrow_mut().push(frame);
    }

    fn transaction_done(&mut self) {
        *self.done.borrow_mut() += 1;
    }
}

pub type UartLink = NpiLink<UartTransport<FakeUart>, FakeLines, CountingPower>;
pub type SpiLink = NpiLink<SpiTransport<FakeSpi>, FakeLines, CountingPower>;
pub type UartTask<'a> = NpiTask<'a, UartTransport<FakeUart>, FakeLines, CountingPower, NpiCollector>;

pub fn config(power_saving: bool) -> LinkConfig {
    LinkConfig {
        power_saving,
        role: Role::Slave,
    }
}

pub fn uart_link(power_saving: bool) -> UartLink {
    NpiLink::new(TransportLayer::new(
        config(power_saving),
        UartTransport::new(FakeUart::default()),
        FakeLines::default(),
        CountingPower::default(),
    ))
}

pub fn spi_link(power_saving: bool) -> SpiLink {
    NpiLink::new(TransportLayer::new(
        config(power_saving),
        SpiTransport::new(FakeSpi::default()),
        FakeLines::default(),
        CountingPower::default(),
    ))
}

pub fn npi(msg_type: MsgType, subsystem: u8, cmd1: u8, payload: &[u8]) -> NpiFrame {
    NpiFrame::new(msg_type, subsystem, cmd1, payload).unwrap()
}

/// UART wire bytes of `frame`.
pub fn wire(frame: &NpiFrame) -> Vec<u8> {
    let mut buf = [0u8; NPI_TL_BUF_SIZE + uart::FRAMING_OVERHEAD];
    let len = uart::encode(frame, &mut buf).unwrap();
    buf[..len].to_vec()
}

/// Encoded body of `frame`, as handed to the transport.
pub fn body(frame: &NpiFrame) -> Vec<u8> {
    let mut buf = [0u8; NPI_TL_BUF_SIZE];
    let len = frame.encode_body(&mut buf).unwrap();
    buf[..len].to_vec()
}

/// Processes until the task stops re-signalling itself.
pub fn run_until_idle<T, H, P, C>(task: &mut NpiTask<'_, T, H, P, C>) -> usize
where
    T: crate::transport::Transport,
    H: HandshakeLines,
    P: PowerPolicy,
    C: crate::collector::FrameCollector,
{
    let mut rounds = 0;
    while task.try_process() {
        rounds += 1;
        assert!(rounds < 100, "task keeps re-signalling itself");
    }
    rounds
}
