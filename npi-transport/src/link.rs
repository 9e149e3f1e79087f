// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! State shared between the driver completion context, the remote ready
//! interrupt, local senders and the dispatch task.

use core::cell::RefCell;

use consts::{NPI_QUEUE_DEPTH, NPI_RX_BUF_SIZE, NPI_TL_BUF_SIZE};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Deque;
use npi_protocol::{Error, MsgType};

use crate::events::{EventFlags, Events};
use crate::frame::Frame;
use crate::handshake::HandshakeLines;
use crate::power::PowerPolicy;
use crate::rxbuf::RxBuf;
use crate::tl::TransportLayer;
use crate::transport::{DriverEvent, Transport};

pub type FrameQueue = Deque<Frame, NPI_QUEUE_DEPTH>;

#[derive(Default)]
pub struct Queues {
    /// Async frames for the host.
    pub tx: FrameQueue,
    /// Sync responses for the host.
    pub sync_tx: FrameQueue,
    /// Async frames from the host.
    pub rx: FrameQueue,
    /// Sync requests from the host.
    pub sync_rx: FrameQueue,
    /// Frames handed over by the protocol stack.
    pub from_stack: FrameQueue,
}

impl Queues {
    pub const fn new() -> Self {
        Self {
            tx: Deque::new(),
            sync_tx: Deque::new(),
            rx: Deque::new(),
            sync_rx: Deque::new(),
            from_stack: Deque::new(),
        }
    }
}

pub struct NpiLink<T, H, P> {
    tl: Mutex<CriticalSectionRawMutex, RefCell<TransportLayer<T, H, P>>>,
    rx: RxBuf<NPI_RX_BUF_SIZE>,
    queues: Mutex<CriticalSectionRawMutex, RefCell<Queues>>,
    events: EventFlags,
}

impl<T, H, P> NpiLink<T, H, P>
where
    T: Transport,
    H: HandshakeLines,
    P: PowerPolicy,
{
    pub fn new(tl: TransportLayer<T, H, P>) -> Self {
        Self {
            tl: Mutex::new(RefCell::new(tl)),
            rx: RxBuf::new(),
            queues: Mutex::new(RefCell::new(Queues::new())),
            events: EventFlags::new(),
        }
    }

    pub fn events(&self) -> &EventFlags {
        &self.events
    }

    pub fn rx(&self) -> &RxBuf<NPI_RX_BUF_SIZE> {
        &self.rx
    }

    pub fn with_tl<R>(&self, f: impl FnOnce(&mut TransportLayer<T, H, P>) -> R) -> R {
        self.tl.lock(|tl| f(&mut tl.borrow_mut()))
    }

    pub fn with_queues<R>(&self, f: impl FnOnce(&mut Queues) -> R) -> R {
        self.queues.lock(|q| f(&mut q.borrow_mut()))
    }

    pub fn open(&self) {
        self.with_tl(|tl| tl.open());
    }

    pub fn close(&self) {
        self.with_tl(|tl| tl.close());
    }

    pub fn check_busy(&self) -> bool {
        self.with_tl(|tl| tl.check_busy())
    }

    pub fn max_body(&self) -> usize {
        self.with_tl(|tl| tl.max_body())
    }

    /// Driver completion, called from the driver's context.
    pub fn driver_event(&self, event: DriverEvent<'_>) {
        let mut posted = Events::empty();
        self.with_tl(|tl| {
            tl.driver_event(event, &mut |rx, tx| self.on_transaction(rx, tx, &mut posted));
        });
        self.post(posted);
    }

    /// Remote ready edge interrupt.
    pub fn remote_ready_edge(&self) {
        let mut posted = Events::empty();
        let notify = self.with_tl(|tl| {
            tl.remote_ready_edge(&mut |rx, tx| self.on_transaction(rx, tx, &mut posted))
        });
        if notify {
            posted |= Events::REMOTE_READY;
        }
        self.post(posted);
    }

    /// Task side of [`NpiLink::remote_ready_edge`].
    pub fn handle_remote_ready(&self) {
        let mut posted = Events::empty();
        self.with_tl(|tl| {
            tl.handle_remote_ready(&mut |rx, tx| self.on_transaction(rx, tx, &mut posted));
        });
        self.post(posted);
    }

    /// Queues a frame for the host.
    pub fn send_to_host(&self, frame: Frame) -> Result<(), Error> {
        let event = match frame.msg_type() {
            Ok(MsgType::Async) => Events::TX_READY,
            Ok(MsgType::SyncRsp) => Events::SYNC_TX_READY,
            _ => return Err(Error::InvalidParams),
        };
        if frame.body_len() > self.max_body() {
            return Err(Error::Oversize);
        }
        self.with_queues(|q| {
            let queue = if event == Events::TX_READY { &mut q.tx } else { &mut q.sync_tx };
            queue.push_back(frame).map_err(|_| Error::Busy)
        })?;
        self.events.post(event);
        Ok(())
    }

    /// Queues a frame coming from the protocol stack. The task applies the
    /// outbound reroute policy before it is sent.
    pub fn send_from_stack(&self, frame: Frame) -> Result<(), Error> {
        self.with_queues(|q| q.from_stack.push_back(frame).map_err(|_| Error::Busy))?;
        self.events.post(Events::STACK_MSG);
        Ok(())
    }

    /// Encodes `frame` and hands it to the transport layer.
    pub fn write(&self, frame: &Frame) -> Result<(), Error> {
        let mut body = [0u8; NPI_TL_BUF_SIZE];
        let len = frame.encode_body(&mut body).map_err(|e| match e {
            Error::BufferTooSmall => Error::Oversize,
            e => e,
        })?;
        self.with_tl(|tl| tl.write(&body[..len]))
    }

    /// TX events for the queues that still hold frames.
    pub fn pending_tx(&self) -> Events {
        self.with_queues(|q| {
            let mut events = Events::empty();
            if !q.tx.is_empty() {
                events |= Events::TX_READY;
            }
            if !q.sync_tx.is_empty() {
                events |= Events::SYNC_TX_READY;
            }
            events
        })
    }

    fn on_transaction(&self, rx: &[u8], tx: Option<usize>, posted: &mut Events) {
        if !rx.is_empty() {
            if let Err(e) = self.rx.write(rx) {
                fatal!("npi: rx ring overflow, {} bytes with {} free", e.len, e.available);
            }
            *posted |= Events::TRANSPORT_RX;
        }
        if tx.is_some() {
            *posted |= Events::TX_DONE;
        }
        // The link is free again; anything held back while busy can go.
        *posted |= self.pending_tx();
    }

    fn post(&self, events: Events) {
        if !events.is_empty() {
            self.events.post(events);
        }
    }
}
