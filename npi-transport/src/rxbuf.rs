// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::spsc::Queue;

/// The chunk did not fit in the free space.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Overflow {
    pub len: usize,
    pub available: usize,
}

/// Circular receive buffer between the transport completion path and the
/// frame collector.
///
/// The completion path is the only producer and the collector the only
/// consumer. Each call holds the critical section just long enough to move
/// one chunk. Holds `N - 1` bytes.
pub struct RxBuf<const N: usize> {
    queue: Mutex<CriticalSectionRawMutex, RefCell<Queue<u8, N>>>,
}

impl<const N: usize> Default for RxBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RxBuf<N> {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(Queue::new())),
        }
    }

    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Bytes written and not read yet.
    pub fn used(&self) -> usize {
        self.queue.lock(|q| q.borrow().len())
    }

    /// Free space.
    pub fn available(&self) -> usize {
        self.capacity() - self.used()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock(|q| q.borrow().is_empty())
    }

    /// Producer side. Appends all of `bytes` or nothing.
    pub fn write(&self, bytes: &[u8]) -> Result<(), Overflow> {
        self.queue.lock(|q| {
            let mut q = q.borrow_mut();
            let available = q.capacity() - q.len();
            let overflow = Overflow {
                len: bytes.len(),
                available,
            };
            if bytes.len() > available {
                return Err(overflow);
            }
            bytes
                .iter()
                .try_for_each(|&b| q.enqueue(b))
                .map_err(|_| overflow)
        })
    }

    /// Consumer side. Copies up to `out.len()` bytes, fewer when less is
    /// available, and returns how many were read.
    pub fn read(&self, out: &mut [u8]) -> usize {
        self.queue.lock(|q| {
            let mut q = q.borrow_mut();
            let mut n = 0;
            for slot in out.iter_mut() {
                let Some(b) = q.dequeue() else {
                    break;
                };
                *slot = b;
                n += 1;
            }
            n
        })
    }
}
