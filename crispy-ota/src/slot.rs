// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Single-flight guard: at most one update session per slot.

use core::sync::atomic::Ordering;

use portable_atomic::AtomicBool;

static GLOBAL: UpdateSlot = UpdateSlot::new();

/// Ownership token for the right to run an update.
pub struct UpdateSlot {
    busy: AtomicBool,
}

impl Default for UpdateSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateSlot {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Process-wide slot used by [`Updater::begin`](crate::session::Updater::begin).
    pub fn global() -> &'static UpdateSlot {
        &GLOBAL
    }

    /// Claim the slot. `None` while another permit is alive.
    pub fn acquire(&self) -> Option<UpdatePermit<'_>> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(UpdatePermit { slot: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Releases its slot when dropped.
pub struct UpdatePermit<'s> {
    slot: &'s UpdateSlot,
}

impl Drop for UpdatePermit<'_> {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::SeqCst);
    }
}
