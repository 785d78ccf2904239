// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Per-thread hold accounting.
//
// Each thread records its own contribution to a node's shared counters in
// the same packed layout as the node state, so `global - mine` is what all
// *other* threads hold. Records live in thread-local storage keyed by a
// process-unique node id and are fronted by a single "last used" slot.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::LockError;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Inert records are swept once a thread's map grows past this.
const PRUNE_THRESHOLD: usize = 64;

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
    static HOLDS: RefCell<HashMap<u64, Rc<HoldCounter>>> = RefCell::new(HashMap::new());
    static LAST_USED: RefCell<Option<(u64, Rc<HoldCounter>)>> = const { RefCell::new(None) };
}

/// Nonzero identifier of the calling thread. Zero is never handed out.
#[inline]
pub(crate) fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

/// One thread's packed contribution to one node.
#[derive(Default)]
pub(crate) struct HoldCounter {
    state: Cell<u64>,
}

impl HoldCounter {
    #[inline]
    pub(crate) fn state(&self) -> u64 {
        self.state.get()
    }

    #[inline]
    pub(crate) fn add(&self, unit: u64) {
        self.state.set(self.state.get() + unit);
    }

    /// Callers check the field is nonzero first.
    #[inline]
    pub(crate) fn sub(&self, unit: u64) {
        self.state.set(self.state.get() - unit);
    }
}

/// Hold records of every thread for a single node.
///
/// Every access is fallible: once the calling thread's thread-local storage
/// is being torn down the records are gone and [`LockError::ThreadExiting`]
/// is returned instead.
pub(crate) struct HoldAccounting {
    node: u64,
}

impl HoldAccounting {
    pub(crate) fn new() -> Self {
        Self {
            node: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// The calling thread's packed holds on this node. Does not create a record.
    pub(crate) fn state(&self) -> Result<u64, LockError> {
        if let Some(state) = self.cached(|counter| counter.state()) {
            return Ok(state);
        }
        HOLDS
            .try_with(|holds| {
                holds
                    .borrow()
                    .get(&self.node)
                    .map_or(0, |counter| counter.state())
            })
            .map_err(|_| LockError::ThreadExiting)
    }

    /// `None` on a miss, or when the slot is already destroyed.
    fn cached<R>(&self, f: impl FnOnce(&Rc<HoldCounter>) -> R) -> Option<R> {
        LAST_USED
            .try_with(|slot| match &*slot.borrow() {
                Some((node, counter)) if *node == self.node => Some(f(counter)),
                _ => None,
            })
            .ok()
            .flatten()
    }

    /// The calling thread's record: cache hit first, then the keyed lookup
    /// (creating the record lazily).
    pub(crate) fn counter(&self) -> Result<Rc<HoldCounter>, LockError> {
        if let Some(counter) = self.cached(Rc::clone) {
            return Ok(counter);
        }
        let counter = HOLDS
            .try_with(|holds| {
                let mut holds = holds.borrow_mut();
                if holds.len() >= PRUNE_THRESHOLD {
                    prune(&mut holds);
                }
                Rc::clone(holds.entry(self.node).or_default())
            })
            .map_err(|_| LockError::ThreadExiting)?;
        let _ = LAST_USED.try_with(|slot| {
            *slot.borrow_mut() = Some((self.node, Rc::clone(&counter)));
        });
        Ok(counter)
    }
}

impl Drop for HoldAccounting {
    fn drop(&mut self) {
        // Other threads' records for this id stay behind; ids are never reused
        // so they are inert until swept.
        let _ = HOLDS.try_with(|holds| holds.borrow_mut().remove(&self.node));
        let _ = LAST_USED.try_with(|slot| {
            let mut slot = slot.borrow_mut();
            if matches!(&*slot, Some((node, _)) if *node == self.node) {
                *slot = None;
            }
        });
    }
}

/// Drop all-zero records. The cached slot is cleared with them when it is
/// zero too, so it never outlives its map entry while still in use.
fn prune(holds: &mut HashMap<u64, Rc<HoldCounter>>) {
    holds.retain(|_, counter| counter.state() != 0);
    let _ = LAST_USED.try_with(|slot| {
        let mut slot = slot.borrow_mut();
        if matches!(&*slot, Some((_, counter)) if counter.state() == 0) {
            *slot = None;
        }
    });
}
