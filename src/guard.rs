// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// RAII guard that holds one lock mode on a node for the lifetime of the
// guard.

use std::marker::PhantomData;

use crate::{LockMode, MultiLock};

/// RAII guard: the mode is already held on construction, released on drop.
///
/// Not `Send`: holds are accounted to the acquiring thread and must be
/// released there. A guard kept in a `thread_local!` is released when the
/// thread exits, even after the thread's hold records are gone.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct ModeGuard<'a, 'p> {
    lock: &'a MultiLock<'p>,
    mode: LockMode,
    _not_send: PhantomData<*const ()>,
}

impl<'a, 'p> ModeGuard<'a, 'p> {
    pub(crate) fn new(lock: &'a MultiLock<'p>, mode: LockMode) -> Self {
        Self {
            lock,
            mode,
            _not_send: PhantomData,
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// The node this guard holds a mode on.
    pub fn node(&self) -> &'a MultiLock<'p> {
        self.lock
    }
}

impl Drop for ModeGuard<'_, '_> {
    fn drop(&mut self) {
        self.lock.unlock(self.mode);
    }
}

impl std::fmt::Debug for ModeGuard<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeGuard").field("mode", &self.mode).finish()
    }
}
