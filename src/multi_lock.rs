// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A lock node: packed state, hold accounting and wait queue, plus an
// optional parent through which intention locks cascade to the root.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, trace};

use crate::sync::{SharedGrant, Synchronizer};
use crate::waiter::{Parked, Waiter};
use crate::{CancelReason, Field, Interrupt, LockError, LockMode, ModeGuard};

/// Backoff rounds a blocking acquisition spends before parking.
pub const DEFAULT_SPIN_LIMIT: u32 = 32;

/// Suspension policy wrapped around one acquisition.
#[derive(Clone, Copy)]
enum Wait<'i> {
    /// Single attempt.
    Never,
    /// Park until granted, the deadline passes or the interrupt is raised.
    Park {
        deadline: Option<Instant>,
        interrupt: Option<&'i Interrupt>,
    },
}

/// A reentrant multi-granularity lock supporting IS, IX, S, SIX and X.
///
/// A node may have a parent (`'p` keeps the parent alive for as long as the
/// child). Taking a mode on a child first takes its
/// [`parent_intention`](LockMode::parent_intention) on the parent,
/// recursively to the root, and releasing drops them in the opposite order.
///
/// Holds are thread-affine: every acquisition must be released by the thread
/// that made it, once per acquisition.
pub struct MultiLock<'p> {
    sync: Synchronizer,
    waiter: Arc<Waiter>,
    parent: Option<&'p MultiLock<'p>>,
    spin_limit: u32,
}

impl<'p> MultiLock<'p> {
    /// Create a root lock.
    pub fn new() -> Self {
        Self::with_spin_limit(DEFAULT_SPIN_LIMIT)
    }

    /// Create a lock beneath `parent`.
    pub fn with_parent(parent: &'p MultiLock<'p>) -> Self {
        Self::with_parent_and_spin_limit(parent, DEFAULT_SPIN_LIMIT)
    }

    /// Create a root lock that spins `spin_limit` backoff rounds before
    /// parking. Zero parks immediately.
    pub fn with_spin_limit(spin_limit: u32) -> Self {
        Self {
            sync: Synchronizer::new(),
            waiter: Arc::new(Waiter::new()),
            parent: None,
            spin_limit,
        }
    }

    pub fn with_parent_and_spin_limit(parent: &'p MultiLock<'p>, spin_limit: u32) -> Self {
        Self {
            parent: Some(parent),
            ..Self::with_spin_limit(spin_limit)
        }
    }

    pub fn parent(&self) -> Option<&'p MultiLock<'p>> {
        self.parent
    }

    /// Acquire `mode`, blocking until it is compatible.
    ///
    /// # Panics
    /// If a counter would overflow, or when called from a thread-local
    /// destructor after the thread's hold records are gone.
    pub fn lock(&self, mode: LockMode) {
        let wait = Wait::Park {
            deadline: None,
            interrupt: None,
        };
        if let Err(err) = self.acquire(mode, wait) {
            defect(err);
        }
    }

    /// Acquire `mode` only if it is compatible right now.
    ///
    /// # Panics
    /// If a counter would overflow, or when called from a thread-local
    /// destructor after the thread's hold records are gone.
    pub fn try_lock(&self, mode: LockMode) -> bool {
        recoverable(self.acquire(mode, Wait::Never))
    }

    /// Acquire `mode`, waiting at most `timeout` in total (parent intention
    /// locks included).
    ///
    /// # Panics
    /// If a counter would overflow, or when called from a thread-local
    /// destructor after the thread's hold records are gone.
    pub fn try_lock_for(&self, mode: LockMode, timeout: Duration) -> bool {
        let wait = Wait::Park {
            deadline: Instant::now().checked_add(timeout),
            interrupt: None,
        };
        recoverable(self.acquire(mode, wait))
    }

    /// Like [`try_lock_for`](Self::try_lock_for) but also gives up when
    /// `interrupt` is raised. `Ok(false)` means the timeout elapsed.
    ///
    /// # Panics
    /// If a counter would overflow, or when called from a thread-local
    /// destructor after the thread's hold records are gone.
    pub fn try_lock_for_interruptibly(
        &self,
        mode: LockMode,
        timeout: Duration,
        interrupt: &Interrupt,
    ) -> Result<bool, LockError> {
        let wait = Wait::Park {
            deadline: Instant::now().checked_add(timeout),
            interrupt: Some(interrupt),
        };
        match self.acquire(mode, wait) {
            Ok(()) => Ok(true),
            Err(LockError::Cancelled {
                reason: CancelReason::TimedOut,
                ..
            }) => Ok(false),
            Err(err) if err.is_defect() => defect(err),
            Err(err) => Err(err),
        }
    }

    /// Acquire `mode`, blocking until it is compatible or `interrupt` is
    /// raised. A raised interrupt fails the call even if the mode is free.
    ///
    /// # Panics
    /// If a counter would overflow, or when called from a thread-local
    /// destructor after the thread's hold records are gone.
    pub fn lock_interruptibly(
        &self,
        mode: LockMode,
        interrupt: &Interrupt,
    ) -> Result<(), LockError> {
        let wait = Wait::Park {
            deadline: None,
            interrupt: Some(interrupt),
        };
        match self.acquire(mode, wait) {
            Err(err) if err.is_defect() => defect(err),
            other => other,
        }
    }

    /// Release one acquisition of `mode`, then the parent intention lock it
    /// implied.
    ///
    /// # Panics
    /// If the calling thread does not hold `mode` on this node.
    pub fn unlock(&self, mode: LockMode) {
        if let Err(err) = self.release(mode) {
            defect(err);
        }
    }

    /// [`lock`](Self::lock) returning a guard that unlocks on drop.
    pub fn guard(&self, mode: LockMode) -> ModeGuard<'_, 'p> {
        self.lock(mode);
        ModeGuard::new(self, mode)
    }

    /// [`try_lock`](Self::try_lock) returning a guard that unlocks on drop.
    pub fn try_guard(&self, mode: LockMode) -> Option<ModeGuard<'_, 'p>> {
        self.try_lock(mode).then(|| ModeGuard::new(self, mode))
    }

    fn acquire(&self, mode: LockMode, wait: Wait<'_>) -> Result<(), LockError> {
        let Some(parent) = self.parent else {
            return self.acquire_local(mode, wait);
        };
        let intention = mode.parent_intention();
        parent.acquire(intention, wait)?;
        self.acquire_local(mode, wait).or_else(|err| {
            debug!("{mode} not acquired ({err}); releasing {intention} on parent");
            parent.release(intention)?;
            Err(err)
        })
    }

    fn acquire_local(&self, mode: LockMode, wait: Wait<'_>) -> Result<(), LockError> {
        let fields = mode.fields();
        for (i, &field) in fields.iter().enumerate() {
            if let Err(err) = self.acquire_field(mode, field, wait) {
                for &held in fields[..i].iter().rev() {
                    debug!("{mode} not acquired ({err}); releasing {held}");
                    self.release_field(held)?;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn acquire_field(&self, mode: LockMode, field: Field, wait: Wait<'_>) -> Result<(), LockError> {
        match wait {
            Wait::Never => {
                if self.sync.try_acquire(field)? {
                    Ok(())
                } else {
                    Err(LockError::IncompatibleMode { mode })
                }
            }
            Wait::Park { deadline, interrupt } => {
                let attempt = || -> Result<Option<()>, LockError> {
                    match field {
                        Field::Exclusive => Ok(self.sync.try_acquire_exclusive()?.then_some(())),
                        shared => Ok(self.sync.try_acquire_shared(shared)?.map(|grant| {
                            if grant == SharedGrant::ViaExclusive {
                                trace!("{field} granted through exclusive ownership");
                            }
                        })),
                    }
                };
                match self.waiter.wait_until(attempt, self.spin_limit, deadline, interrupt)? {
                    Parked::Acquired(()) => Ok(()),
                    Parked::Cancelled(reason) => {
                        debug!("{mode} acquisition {reason}");
                        Err(LockError::Cancelled { mode, reason })
                    }
                }
            }
        }
    }

    fn release(&self, mode: LockMode) -> Result<(), LockError> {
        for &field in mode.fields().iter().rev() {
            self.release_field(field)?;
        }
        match self.parent {
            Some(parent) => parent.release(mode.parent_intention()),
            None => Ok(()),
        }
    }

    fn release_field(&self, field: Field) -> Result<(), LockError> {
        if self.sync.release(field)? {
            trace!("{field} fully released");
        }
        // Wake regardless: a partial release can still unblock a sole-holder
        // upgrade.
        self.waiter.wake_all();
        Ok(())
    }

    /// IS holds across all threads. Advisory only.
    pub fn intention_read_lock_count(&self) -> u32 {
        self.sync.lock_count(Field::IntentionShared)
    }

    /// S holds across all threads. Advisory only.
    pub fn read_lock_count(&self) -> u32 {
        self.sync.lock_count(Field::Shared)
    }

    /// IX holds across all threads. Advisory only.
    pub fn intention_write_lock_count(&self) -> u32 {
        self.sync.lock_count(Field::IntentionExclusive)
    }

    /// Reentrant X holds of the exclusive owner. Advisory only.
    pub fn write_lock_count(&self) -> u32 {
        self.sync.lock_count(Field::Exclusive)
    }

    pub fn intention_read_hold_count(&self) -> u32 {
        self.sync.hold_count(Field::IntentionShared)
    }

    pub fn read_hold_count(&self) -> u32 {
        self.sync.hold_count(Field::Shared)
    }

    pub fn intention_write_hold_count(&self) -> u32 {
        self.sync.hold_count(Field::IntentionExclusive)
    }

    pub fn write_hold_count(&self) -> u32 {
        self.sync.hold_count(Field::Exclusive)
    }

    /// Holds of `field` across all threads.
    pub fn lock_count(&self, field: Field) -> u32 {
        self.sync.lock_count(field)
    }

    /// Holds of `field` by the calling thread.
    pub fn hold_count(&self, field: Field) -> u32 {
        self.sync.hold_count(field)
    }

    pub fn is_write_locked_by_current_thread(&self) -> bool {
        self.sync.is_held_exclusively_by_current_thread()
    }

    /// No mode is held by any thread.
    pub fn is_free(&self) -> bool {
        self.sync.is_free()
    }
}

impl Default for MultiLock<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MultiLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiLock")
            .field("is", &self.intention_read_lock_count())
            .field("ix", &self.intention_write_lock_count())
            .field("s", &self.read_lock_count())
            .field("x", &self.write_lock_count())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// `true` on success, `false` on conflict or cancellation.
fn recoverable(result: Result<(), LockError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) if err.is_defect() => defect(err),
        Err(_) => false,
    }
}

#[cold]
fn defect(err: LockError) -> ! {
    error!("{err}");
    panic!("{err}");
}
