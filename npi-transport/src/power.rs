// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Platform hook keeping the MCU out of low power states while a
/// transaction is on the wire.
///
/// Implementations are expected to count: several links may hold the
/// constraint at the same time.
pub trait PowerPolicy {
    fn acquire(&mut self);
    fn release(&mut self);
}

/// For platforms whose sleep cannot break a transfer.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPowerPolicy;

impl PowerPolicy for NoPowerPolicy {
    fn acquire(&mut self) {}
    fn release(&mut self) {}
}

/// One link's hold on a [`PowerPolicy`]. Setting twice or releasing twice
/// is a no-op, so the policy always sees balanced calls.
#[derive(Debug)]
pub struct Constraint<P> {
    policy: P,
    held: bool,
}

impl<P: PowerPolicy> Constraint<P> {
    pub const fn new(policy: P) -> Self {
        Self { policy, held: false }
    }

    pub fn set(&mut self) {
        if !self.held {
            self.held = true;
            self.policy.acquire();
        }
    }

    pub fn release(&mut self) {
        if self.held {
            self.held = false;
            self.policy.release();
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Count(i32);

    impl PowerPolicy for Count {
        fn acquire(&mut self) {
            self.0 += 1;
        }
        fn release(&mut self) {
            self.0 -= 1;
        }
    }

    #[test]
    fn set_and_release_are_idempotent() {
        let mut c = Constraint::new(Count::default());
        c.release();
        assert_eq!(c.policy().0, 0);
        c.set();
        c.set();
        assert!(c.is_held());
        assert_eq!(c.policy().0, 1);
        c.release();
        c.release();
        assert_eq!(c.policy().0, 0);
        assert!(!c.is_held());
    }
}
