// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Condition-variable + mutex wait queue used by a lock node to park
// acquirers whose mode is currently incompatible, plus the cancellation
// handle that can wake them early.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::{CancelReason, LockError};

/// Adaptive backoff used before parking.
///
/// - step < 4:  busy spin (do nothing)
/// - step < 16: CPU pause hint
/// - otherwise: thread yield
pub(crate) struct Backoff {
    step: u32,
}

impl Backoff {
    pub(crate) const fn new() -> Self {
        Self { step: 0 }
    }

    #[inline]
    pub(crate) fn snooze(&mut self) {
        if self.step < 4 {
            // busy spin
        } else if self.step < 16 {
            std::hint::spin_loop();
        } else {
            std::thread::yield_now();
        }
        self.step += 1;
    }

    #[inline]
    pub(crate) fn rounds(&self) -> u32 {
        self.step
    }
}

/// Outcome of a parked acquisition that did not fail with a defect.
pub(crate) enum Parked<T> {
    Acquired(T),
    Cancelled(CancelReason),
}

/// Wait queue of one lock node.
///
/// `parked` counts threads inside [`Waiter::wait_until`]'s sleep loop. It is
/// bumped under `lock` before the acquirer's next attempt, and read by
/// [`Waiter::wake_all`] after the releaser's state CAS, so either the
/// acquirer sees the release or the releaser sees the acquirer.
pub(crate) struct Waiter {
    lock: Mutex<()>,
    cond: Condvar,
    parked: AtomicUsize,
}

impl Waiter {
    pub(crate) fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            cond: Condvar::new(),
            parked: AtomicUsize::new(0),
        }
    }

    /// Retry `attempt` until it yields a value, `deadline` passes or
    /// `interrupt` is raised. Spins for `spin_limit` backoff rounds before
    /// sleeping on the condition variable.
    ///
    /// A raised interrupt is honoured before the first attempt.
    pub(crate) fn wait_until<T, F>(
        self: &Arc<Self>,
        mut attempt: F,
        spin_limit: u32,
        deadline: Option<Instant>,
        interrupt: Option<&Interrupt>,
    ) -> Result<Parked<T>, LockError>
    where
        F: FnMut() -> Result<Option<T>, LockError>,
    {
        let interrupted = || interrupt.is_some_and(Interrupt::is_interrupted);
        let expired = || deadline.is_some_and(|d| Instant::now() >= d);

        let mut backoff = Backoff::new();
        while backoff.rounds() < spin_limit {
            if interrupted() {
                return Ok(Parked::Cancelled(CancelReason::Interrupted));
            }
            if let Some(value) = attempt()? {
                return Ok(Parked::Acquired(value));
            }
            if expired() {
                return Ok(Parked::Cancelled(CancelReason::TimedOut));
            }
            backoff.snooze();
        }

        let _registration = interrupt.map(|i| i.register(self));
        let mut guard = self.lock.lock();
        self.parked.fetch_add(1, Ordering::SeqCst);
        let outcome = loop {
            if interrupted() {
                break Ok(Parked::Cancelled(CancelReason::Interrupted));
            }
            match attempt() {
                Ok(Some(value)) => break Ok(Parked::Acquired(value)),
                Ok(None) => {}
                Err(err) => break Err(err),
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        break Ok(Parked::Cancelled(CancelReason::TimedOut));
                    }
                    trace!("parking until {deadline:?}");
                    self.cond.wait_until(&mut guard, deadline);
                }
                None => {
                    trace!("parking");
                    self.cond.wait(&mut guard);
                }
            }
        };
        self.parked.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    /// Wake every parked acquirer so each re-evaluates compatibility.
    pub(crate) fn wake_all(&self) {
        if self.parked.load(Ordering::SeqCst) == 0 {
            return;
        }
        // Barrier: briefly acquire lock to ensure waiters are in cond_wait
        drop(self.lock.lock());
        let woken = self.cond.notify_all();
        trace!("woke {woken} parked acquirer(s)");
    }
}

/// Cancellation handle for interruptible acquisitions.
///
/// Clones share one flag. Raising it fails any acquisition currently
/// waiting with it (and any later one) with
/// [`LockError::Cancelled`] until [`Interrupt::clear`] is called.
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<InterruptState>,
}

#[derive(Default)]
struct InterruptState {
    raised: AtomicBool,
    parked_on: Mutex<Vec<Arc<Waiter>>>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake whichever wait queues the handle is parked on.
    pub fn interrupt(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        let parked_on = self.inner.parked_on.lock().clone();
        for waiter in parked_on {
            // bypass the parked-count shortcut: the waiter may be between
            // registering and bumping the count
            drop(waiter.lock.lock());
            waiter.cond.notify_all();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Lower the flag so the handle can be reused.
    pub fn clear(&self) {
        self.inner.raised.store(false, Ordering::SeqCst);
    }

    fn register(&self, waiter: &Arc<Waiter>) -> Registration<'_> {
        self.inner.parked_on.lock().push(Arc::clone(waiter));
        Registration {
            interrupt: self,
            waiter: Arc::clone(waiter),
        }
    }
}

impl std::fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupt")
            .field("raised", &self.is_interrupted())
            .finish()
    }
}

struct Registration<'a> {
    interrupt: &'a Interrupt,
    waiter: Arc<Waiter>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut parked_on = self.interrupt.inner.parked_on.lock();
        if let Some(i) = parked_on.iter().position(|w| Arc::ptr_eq(w, &self.waiter)) {
            parked_on.swap_remove(i);
        }
    }
}
