// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::Cell;

use bitflags::bitflags;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

bitflags! {
    /// Work items for the dispatch task.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Events: u16 {
        /// Bytes landed in the receive ring.
        const TRANSPORT_RX = 0x0002;
        /// A transmit completed.
        const TX_DONE = 0x0004;
        /// An async frame is waiting in the RX queue.
        const FRAME_RX = 0x0008;
        /// An async frame is waiting in the TX queue.
        const TX_READY = 0x0010;
        /// A sync request is waiting in the sync RX queue.
        const SYNC_FRAME_RX = 0x0020;
        /// A sync response is waiting in the sync TX queue.
        const SYNC_TX_READY = 0x0040;
        /// The remote ready line changed.
        const REMOTE_READY = 0x0080;
        /// The protocol stack handed over a frame for the host.
        const STACK_MSG = 0x0100;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Events {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Events({=u16:#06x})", self.bits())
    }
}

/// Event bits posted from interrupt and task context plus the wake-up
/// signal the dispatch task sleeps on.
pub struct EventFlags {
    pending: Mutex<CriticalSectionRawMutex, Cell<Events>>,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFlags {
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(Cell::new(Events::empty())),
            wake: Signal::new(),
        }
    }

    /// Sets `events` and wakes the task.
    pub fn post(&self, events: Events) {
        self.pending.lock(|p| p.set(p.get() | events));
        self.wake.signal(());
    }

    /// Wakes the task without new events.
    pub fn repost(&self) {
        self.wake.signal(());
    }

    /// Snapshot and clear in one critical section.
    pub fn take(&self) -> Events {
        self.pending.lock(|p| p.replace(Events::empty()))
    }

    pub fn peek(&self) -> Events {
        self.pending.lock(|p| p.get())
    }

    pub async fn wait(&self) {
        self.wake.wait().await
    }

    /// Consumes a pending wake-up, if any.
    pub fn try_wait(&self) -> bool {
        self.wake.try_take().is_some()
    }
}
