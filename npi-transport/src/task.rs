// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! The dispatch task.
//!
//! One iteration of [`NpiTask::process`] snapshots the posted events and
//! works through them in a fixed order: remote ready, sync responses,
//! stack messages, sync requests, async transmit, receive bytes, received
//! frames and transmit done. Sync requests from the host are served one at
//! a time; while one is outstanding async traffic in both directions waits.
//!
//! Received frames are never dropped for lack of queue space. When a
//! receive queue is full the frame in hand is parked and collection stops,
//! leaving the rest of the bytes in the ring until the queue drains.

use core::pin::pin;

use consts::{NPI_MAX_SUBSYSTEMS, NPI_SYNC_WATCHDOG_MS};
use embassy_time::{Duration, Instant, Timer};
use futures::future::{select, Either};
use heapless::Vec;
use npi_protocol::{subsystem, Error, MsgType};

use crate::collector::FrameCollector;
use crate::events::Events;
use crate::frame::Frame;
use crate::handshake::HandshakeLines;
use crate::link::{FrameQueue, NpiLink, Queues};
use crate::power::PowerPolicy;
use crate::transport::Transport;

/// Receiver of complete frames.
pub trait Handler {
    fn handle_frame(&mut self, frame: Frame);

    /// A transmit to the host finished.
    fn transaction_done(&mut self) {}
}

/// What a reroute handler gets to see.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Policy {
    /// Frames go to their default destination only.
    #[default]
    Deliver,
    /// Frames go to their default destination and a copy to the handler.
    Echo,
    /// Frames go to the handler only.
    Intercept,
}

#[derive(Clone, Copy)]
enum TxQueue {
    Async,
    Sync,
}

impl TxQueue {
    fn select(self, q: &mut Queues) -> &mut FrameQueue {
        match self {
            Self::Async => &mut q.tx,
            Self::Sync => &mut q.sync_tx,
        }
    }
}

pub struct NpiTask<'a, T, H, P, C> {
    link: &'a NpiLink<T, H, P>,
    collector: C,
    stack: &'a mut dyn Handler,
    subsystems: Vec<(u8, &'a mut dyn Handler), NPI_MAX_SUBSYSTEMS>,
    rx_reroute: Option<(Policy, &'a mut dyn Handler)>,
    tx_reroute: Option<(Policy, &'a mut dyn Handler)>,
    listener: Option<&'a mut dyn Handler>,
    /// Events taken from the link and not fully handled yet.
    events: Events,
    /// Received frame waiting for room in its queue.
    parked: Option<Frame>,
    sync_in_flight: u8,
    watchdog_armed: bool,
    /// Bumped every time the watchdog is armed.
    watchdog_generation: u32,
}

impl<'a, T, H, P, C> NpiTask<'a, T, H, P, C>
where
    T: Transport,
    H: HandshakeLines,
    P: PowerPolicy,
    C: FrameCollector,
{
    /// `stack` receives every inbound frame no subsystem claimed.
    pub fn new(link: &'a NpiLink<T, H, P>, collector: C, stack: &'a mut dyn Handler) -> Self {
        Self {
            link,
            collector,
            stack,
            subsystems: Vec::new(),
            rx_reroute: None,
            tx_reroute: None,
            listener: None,
            events: Events::empty(),
            parked: None,
            sync_in_flight: 0,
            watchdog_armed: false,
            watchdog_generation: 0,
        }
    }

    pub fn link(&self) -> &'a NpiLink<T, H, P> {
        self.link
    }

    pub fn sync_in_flight(&self) -> u8 {
        self.sync_in_flight
    }

    pub fn is_watchdog_armed(&self) -> bool {
        self.watchdog_armed
    }

    pub fn register_subsystem(&mut self, id: u8, handler: &'a mut dyn Handler) -> Result<(), Error> {
        if id == subsystem::RES0 || id > subsystem::MAX {
            return Err(Error::InvalidParams);
        }
        if let Some(entry) = self.subsystems.iter_mut().find(|(ss, _)| *ss == id) {
            entry.1 = handler;
            debug!("npi: subsystem {} replaced", id);
            return Ok(());
        }
        self.subsystems
            .push((id, handler))
            .map_err(|_| Error::RoutingFull)?;
        debug!("npi: subsystem {} registered", id);
        Ok(())
    }

    pub fn deregister_subsystem(&mut self, id: u8) -> Result<(), Error> {
        let pos = self
            .subsystems
            .iter()
            .position(|(ss, _)| *ss == id)
            .ok_or(Error::SubsystemNotFound)?;
        self.subsystems.swap_remove(pos);
        Ok(())
    }

    /// Frames from the host.
    pub fn register_rx_reroute(&mut self, policy: Policy, handler: &'a mut dyn Handler) {
        self.rx_reroute = Some((policy, handler));
    }

    /// Frames from the stack to the host.
    pub fn register_tx_reroute(&mut self, policy: Policy, handler: &'a mut dyn Handler) {
        self.tx_reroute = Some((policy, handler));
    }

    pub fn set_transaction_listener(&mut self, handler: &'a mut dyn Handler) {
        self.listener = Some(handler);
    }

    /// Runs one iteration if the link has been signalled.
    pub fn try_process(&mut self) -> bool {
        if self.link.events().try_wait() {
            self.process();
            true
        } else {
            false
        }
    }

    pub fn process(&mut self) {
        self.events |= self.link.events().take();
        let mut stalled = false;

        if self.events.contains(Events::REMOTE_READY) {
            self.events.remove(Events::REMOTE_READY);
            self.link.handle_remote_ready();
            self.events |= self.link.events().take();
        }

        if self.events.contains(Events::SYNC_TX_READY) && !self.link.check_busy() {
            stalled |= !self.send_next(TxQueue::Sync);
        }

        if self.events.contains(Events::STACK_MSG) {
            if let Some(frame) = self.link.with_queues(|q| q.from_stack.pop_front()) {
                self.process_stack_msg(frame);
            }
        }

        if self.events.contains(Events::SYNC_FRAME_RX) && self.sync_in_flight == 0 {
            if let Some(frame) = self.link.with_queues(|q| q.sync_rx.pop_front()) {
                self.sync_in_flight += 1;
                self.watchdog_armed = true;
                self.watchdog_generation = self.watchdog_generation.wrapping_add(1);
                self.route_inbound(frame);
            }
        }

        if self.events.contains(Events::TX_READY) && self.sync_in_flight == 0 && !self.link.check_busy() {
            stalled |= !self.send_next(TxQueue::Async);
        }

        if self.events.contains(Events::TRANSPORT_RX) || self.parked.is_some() {
            self.events.remove(Events::TRANSPORT_RX);
            self.collect();
        }

        if self.events.contains(Events::FRAME_RX) && self.sync_in_flight == 0 {
            if let Some(frame) = self.link.with_queues(|q| q.rx.pop_front()) {
                self.route_inbound(frame);
            }
        }

        if self.events.contains(Events::TX_DONE) {
            self.events.remove(Events::TX_DONE);
            if let Some(listener) = self.listener.as_mut() {
                listener.transaction_done();
            }
            self.events |= self.link.pending_tx();
        }

        self.settle(stalled);
    }

    /// Aborts the outstanding sync request.
    pub fn watchdog_expired(&mut self) {
        self.watchdog_armed = false;
        if self.sync_in_flight == 0 {
            return;
        }
        self.sync_in_flight -= 1;
        warn!("npi: sync request timed out");
        if self.link.with_queues(|q| !q.sync_rx.is_empty()) {
            self.events |= Events::SYNC_FRAME_RX;
        }
        self.link.events().repost();
    }

    /// Waits for events and processes them forever, aborting sync requests
    /// the stack leaves unanswered for `NPI_SYNC_WATCHDOG_MS`.
    pub async fn run(&mut self) -> ! {
        let link = self.link;
        let mut deadline: Option<(u32, Instant)> = None;
        loop {
            deadline = watchdog_deadline(
                self.watchdog_armed,
                self.watchdog_generation,
                deadline,
                Instant::now(),
            );

            match deadline.map(|(_, at)| at) {
                Some(at) => {
                    let wake = pin!(link.events().wait());
                    let timeout = pin!(Timer::at(at));
                    if let Either::Right(_) = select(wake, timeout).await {
                        self.watchdog_expired();
                        deadline = None;
                        continue;
                    }
                }
                None => link.events().wait().await,
            }
            self.process();
        }
    }

    /// Sends the head of `which`. Returns false if the transport refused.
    ///
    /// The head stays queued until the transport took it, so a refused
    /// frame keeps its place and its slot even when senders keep queueing.
    /// Only this task pops the TX queues, so the head cannot change under
    /// us.
    fn send_next(&mut self, which: TxQueue) -> bool {
        let Some(frame) = self.link.with_queues(|q| which.select(q).front().cloned()) else {
            return true;
        };
        match self.link.write(&frame) {
            Ok(()) => {}
            Err(Error::Busy) => return false,
            Err(e) => warn!("npi: dropping frame for the host: {}", e),
        }
        self.link.with_queues(|q| which.select(q).pop_front());
        if let TxQueue::Sync = which {
            self.sync_in_flight = self.sync_in_flight.saturating_sub(1);
            self.watchdog_armed = false;
        }
        true
    }

    fn process_stack_msg(&mut self, frame: Frame) {
        let frame = match self.tx_reroute.as_mut() {
            Some((Policy::Intercept, handler)) => {
                handler.handle_frame(frame);
                return;
            }
            Some((Policy::Echo, handler)) => {
                handler.handle_frame(frame.clone());
                frame
            }
            _ => frame,
        };
        let (which, event) = match frame.msg_type() {
            Ok(MsgType::Async) => (TxQueue::Async, Events::TX_READY),
            Ok(MsgType::SyncRsp) => (TxQueue::Sync, Events::SYNC_TX_READY),
            _ => {
                warn!("npi: stack frame with bad type dropped");
                return;
            }
        };
        let queued = self.link.with_queues(|q| which.select(q).push_back(frame).is_ok());
        if queued {
            self.events |= event;
        } else {
            warn!("npi: tx queue full, stack frame dropped");
        }
    }

    fn collect(&mut self) {
        if let Some(frame) = self.parked.take() {
            if let Err(frame) = Self::enqueue_rx(self.link, &mut self.events, frame) {
                self.parked = Some(frame);
                return;
            }
        }
        let link = self.link;
        let Self {
            collector,
            events,
            parked,
            ..
        } = self;
        collector.collect(link.rx(), &mut |frame| match Self::enqueue_rx(link, events, frame) {
            Ok(()) => true,
            Err(frame) => {
                debug!("npi: rx queue full, holding frame back");
                *parked = Some(frame);
                false
            }
        });
    }

    /// Queues a received frame for dispatch, handing it back when its queue
    /// is full.
    fn enqueue_rx(link: &NpiLink<T, H, P>, events: &mut Events, frame: Frame) -> Result<(), Frame> {
        let sync = frame.is_sync_request();
        link.with_queues(|q| {
            let queue = if sync { &mut q.sync_rx } else { &mut q.rx };
            queue.push_back(frame)
        })?;
        *events |= if sync {
            Events::SYNC_FRAME_RX
        } else {
            Events::FRAME_RX
        };
        Ok(())
    }

    fn route_inbound(&mut self, frame: Frame) {
        let policy = self.rx_reroute.as_ref().map(|(policy, _)| *policy);
        match (policy, self.rx_reroute.as_mut()) {
            (Some(Policy::Intercept), Some((_, handler))) => handler.handle_frame(frame),
            (Some(Policy::Echo), Some(_)) => {
                self.deliver(frame.clone());
                if let Some((_, handler)) = self.rx_reroute.as_mut() {
                    handler.handle_frame(frame);
                }
            }
            _ => self.deliver(frame),
        }
    }

    fn deliver(&mut self, frame: Frame) {
        let id = frame.subsystem();
        match self.subsystems.iter_mut().find(|(ss, _)| *ss == id) {
            Some((_, handler)) => handler.handle_frame(frame),
            None => self.stack.handle_frame(frame),
        }
    }

    /// Drops the bits whose work is done and wakes the task again if what
    /// is left can make progress now.
    fn settle(&mut self, stalled: bool) {
        let parked_sync = self.parked.as_ref().map(Frame::is_sync_request);
        let (tx, sync_tx, rx, sync_rx, from_stack, unpark) = self.link.with_queues(|q| {
            (
                !q.tx.is_empty(),
                !q.sync_tx.is_empty(),
                !q.rx.is_empty(),
                !q.sync_rx.is_empty(),
                !q.from_stack.is_empty(),
                match parked_sync {
                    Some(true) => !q.sync_rx.is_full(),
                    Some(false) => !q.rx.is_full(),
                    None => false,
                },
            )
        });
        self.events.set(Events::TX_READY, tx);
        self.events.set(Events::SYNC_TX_READY, sync_tx);
        self.events.set(Events::FRAME_RX, rx);
        self.events.set(Events::SYNC_FRAME_RX, sync_rx);
        self.events.set(Events::STACK_MSG, from_stack);

        let busy = self.link.check_busy();
        let idle = self.sync_in_flight == 0;
        let progress = from_stack
            || unpark
            || (sync_rx && idle)
            || (rx && idle)
            || (!busy && !stalled && (sync_tx || (tx && idle)))
            || self.events
                .intersects(Events::REMOTE_READY | Events::TRANSPORT_RX | Events::TX_DONE);
        if progress {
            self.link.events().repost();
        }
    }
}

/// Deadline of the outstanding sync request as `(generation, instant)`.
///
/// A deadline belongs to the request that armed the watchdog: it is kept
/// while the generation is unchanged, restarted from `now` once a newer
/// request armed it, and cleared when nothing is armed.
pub(crate) fn watchdog_deadline(
    armed: bool,
    generation: u32,
    current: Option<(u32, Instant)>,
    now: Instant,
) -> Option<(u32, Instant)> {
    if !armed {
        return None;
    }
    match current {
        Some((g, at)) if g == generation => Some((g, at)),
        _ => Some((generation, now + Duration::from_millis(NPI_SYNC_WATCHDOG_MS))),
    }
}
