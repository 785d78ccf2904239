// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// CAS-driven acquire/release for the exclusive field and the three shared
// fields. Compatibility is never looked up in a table: it falls out of the
// counters, with the calling thread's own holds subtracted so that a thread
// is always compatible with itself (reentrancy, upgrade).

use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::hold::{current_thread_token, HoldAccounting};
use crate::state::{PackedState, IX_FIELD, NON_X_FIELDS, S_FIELD, X_FIELD, X_UNIT};
use crate::{Field, LockError};

/// How a shared field was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SharedGrant {
    /// The caller owns X; compatibility was not consulted.
    ViaExclusive,
    Granted,
}

pub(crate) struct Synchronizer {
    state: PackedState,
    /// Thread token of the X holder, 0 when X is free.
    owner: AtomicU64,
    holds: HoldAccounting,
}

impl Synchronizer {
    pub(crate) fn new() -> Self {
        Self {
            state: PackedState::new(),
            owner: AtomicU64::new(0),
            holds: HoldAccounting::new(),
        }
    }

    /// One non-blocking attempt on `field`.
    pub(crate) fn try_acquire(&self, field: Field) -> Result<bool, LockError> {
        match field {
            Field::Exclusive => self.try_acquire_exclusive(),
            shared => Ok(self.try_acquire_shared(shared)?.is_some()),
        }
    }

    /// Release one unit of `field`. Returns true when that field is now
    /// entirely free.
    pub(crate) fn release(&self, field: Field) -> Result<bool, LockError> {
        match field {
            Field::Exclusive => self.release_exclusive(),
            shared => self.release_shared(shared),
        }
    }

    fn is_exclusive_owner(&self, me: u64) -> bool {
        self.owner.load(Ordering::Acquire) == me
    }

    pub(crate) fn try_acquire_exclusive(&self) -> Result<bool, LockError> {
        let me = current_thread_token();
        loop {
            let c = self.state.load();
            if c != 0 {
                if c & X_FIELD == 0 {
                    // shared fields only: grant as an upgrade iff they are all ours
                    let others = c - self.holds.state()?;
                    if others & NON_X_FIELDS != 0 {
                        return Ok(false);
                    }
                } else if !self.is_exclusive_owner(me) {
                    return Ok(false);
                }
            }
            let next = Field::Exclusive.checked_add(c)?;
            if self.state.compare_exchange(c, next) {
                self.owner.store(me, Ordering::Release);
                return Ok(true);
            }
        }
    }

    pub(crate) fn release_exclusive(&self) -> Result<bool, LockError> {
        if !self.is_exclusive_owner(current_thread_token()) {
            return Err(LockError::ProtocolViolation {
                field: Field::Exclusive,
                detail: "calling thread is not the exclusive owner",
            });
        }
        loop {
            let c = self.state.load();
            let next = c - X_UNIT;
            let released = next & X_FIELD == 0;
            if released {
                self.owner.store(0, Ordering::Release);
            }
            if self.state.compare_exchange(c, next) {
                return Ok(released);
            }
            if released {
                // still the owner until the CAS lands
                self.owner.store(current_thread_token(), Ordering::Release);
            }
        }
    }

    /// `Ok(None)` when another thread's holds are incompatible with `field`.
    pub(crate) fn try_acquire_shared(
        &self,
        field: Field,
    ) -> Result<Option<SharedGrant>, LockError> {
        let me = current_thread_token();
        let mine = self.holds.counter()?;
        loop {
            let c = self.state.load();
            let exclusive = self.is_exclusive_owner(me);
            if c & X_FIELD != 0 && !exclusive {
                return Ok(None);
            }
            let grant = if exclusive {
                SharedGrant::ViaExclusive
            } else {
                let blocking = match field {
                    // IS is compatible with every combination of S, IX and IS
                    Field::IntentionShared => 0,
                    // S blocks IX unless we are the only S holder (S -> SIX)
                    Field::IntentionExclusive => S_FIELD,
                    // IX blocks S unless we are the only IX holder (IX -> SIX)
                    Field::Shared => IX_FIELD,
                    Field::Exclusive => unreachable!("X is not a shared field"),
                };
                if c & blocking != 0 && (c - mine.state()) & blocking != 0 {
                    return Ok(None);
                }
                SharedGrant::Granted
            };
            let next = field.checked_add(c)?;
            if self.state.compare_exchange(c, next) {
                mine.add(field.unit());
                return Ok(Some(grant));
            }
        }
    }

    /// Release one unit of a shared field. A thread whose hold records are
    /// already torn down (a guard dropped from a thread-local destructor)
    /// cannot be checked; its release goes straight to the shared counter.
    pub(crate) fn release_shared(&self, field: Field) -> Result<bool, LockError> {
        match self.holds.counter() {
            Ok(mine) => {
                if field.count(mine.state()) == 0 {
                    return Err(LockError::ProtocolViolation {
                        field,
                        detail: "calling thread holds no such lock",
                    });
                }
                mine.sub(field.unit());
            }
            Err(LockError::ThreadExiting) => {
                debug!("releasing {field} after the thread's hold records were destroyed");
            }
            Err(err) => return Err(err),
        }
        loop {
            let c = self.state.load();
            if field.count(c) == 0 {
                // only reachable on the unchecked teardown path
                return Err(LockError::ProtocolViolation {
                    field,
                    detail: "no thread holds such a lock",
                });
            }
            let next = c - field.unit();
            if self.state.compare_exchange(c, next) {
                return Ok(next & X_FIELD == 0 && field.count(next) == 0);
            }
        }
    }

    /// Holds of `field` across all threads.
    pub(crate) fn lock_count(&self, field: Field) -> u32 {
        field.count(self.state.load())
    }

    /// Holds of `field` by the calling thread.
    pub(crate) fn hold_count(&self, field: Field) -> u32 {
        let c = self.state.load();
        if field.count(c) == 0 {
            return 0;
        }
        match field {
            Field::Exclusive if self.is_exclusive_owner(current_thread_token()) => field.count(c),
            Field::Exclusive => 0,
            shared => shared.count(self.holds.state().unwrap_or_default()),
        }
    }

    pub(crate) fn is_free(&self) -> bool {
        self.state.load() == 0
    }

    pub(crate) fn is_held_exclusively_by_current_thread(&self) -> bool {
        self.state.load() & X_FIELD != 0 && self.is_exclusive_owner(current_thread_token())
    }
}
