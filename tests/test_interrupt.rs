// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Interruptible acquisitions and their rollback.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use multilock::{CancelReason, Interrupt, LockError, LockMode, MultiLock};

use LockMode::*;

fn interrupted(mode: LockMode) -> Result<(), LockError> {
    Err(LockError::Cancelled {
        mode,
        reason: CancelReason::Interrupted,
    })
}

#[test]
fn raised_interrupt_fails_even_when_free() {
    let lock = MultiLock::new();
    let interrupt = Interrupt::new();
    interrupt.interrupt();
    assert!(interrupt.is_interrupted());

    for mode in LockMode::ALL {
        assert_eq!(lock.lock_interruptibly(mode, &interrupt), interrupted(mode));
        assert_eq!(
            lock.try_lock_for_interruptibly(mode, Duration::from_millis(10), &interrupt),
            Err(LockError::Cancelled {
                mode,
                reason: CancelReason::Interrupted
            })
        );
    }
    assert!(lock.is_free());

    // the uninterruptible calls ignore the handle entirely
    assert!(lock.try_lock(X));
    lock.unlock(X);
}

#[test]
fn cleared_interrupt_is_reusable() {
    let lock = MultiLock::new();
    let interrupt = Interrupt::new();
    interrupt.interrupt();
    assert!(lock.lock_interruptibly(S, &interrupt).is_err());

    interrupt.clear();
    assert!(!interrupt.is_interrupted());
    lock.lock_interruptibly(S, &interrupt).unwrap();
    assert_eq!(lock.read_hold_count(), 1);
    lock.unlock(S);
    assert!(lock.is_free());
}

#[test]
fn interrupt_wakes_blocked_acquirer() {
    let lock = Arc::new(MultiLock::with_spin_limit(0));
    lock.lock(X);

    let interrupt = Interrupt::new();
    let (tx, rx) = mpsc::channel();
    let l2 = Arc::clone(&lock);
    let i2 = interrupt.clone();
    let waiter = thread::spawn(move || {
        tx.send(l2.lock_interruptibly(S, &i2)).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    interrupt.interrupt();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), interrupted(S));
    waiter.join().unwrap();

    assert_eq!(lock.read_lock_count(), 0);
    lock.unlock(X);
    assert!(lock.is_free());
}

#[test]
fn one_interrupt_cancels_every_clone() {
    let lock = Arc::new(MultiLock::new());
    lock.lock(X);

    let interrupt = Interrupt::new();
    let (tx, rx) = mpsc::channel();
    let waiters: Vec<_> = [IS, IX, S]
        .into_iter()
        .map(|mode| {
            let l = Arc::clone(&lock);
            let i = interrupt.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                tx.send((mode, l.lock_interruptibly(mode, &i))).unwrap();
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    interrupt.interrupt();
    for _ in 0..3 {
        let (mode, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, interrupted(mode));
    }
    for w in waiters {
        w.join().unwrap();
    }

    lock.unlock(X);
    assert!(lock.is_free());
}

#[test]
fn timeout_reported_as_false_not_error() {
    let lock = Arc::new(MultiLock::new());
    lock.lock(S);

    let l2 = Arc::clone(&lock);
    thread::spawn(move || {
        let interrupt = Interrupt::new();
        assert_eq!(
            l2.try_lock_for_interruptibly(X, Duration::from_millis(20), &interrupt),
            Ok(false)
        );
        assert_eq!(
            l2.try_lock_for_interruptibly(S, Duration::from_millis(20), &interrupt),
            Ok(true)
        );
        l2.unlock(S);
    })
    .join()
    .unwrap();

    lock.unlock(S);
    assert!(lock.is_free());
}

#[test]
fn six_rolls_back_shared_when_interrupted() {
    // S is granted alongside the other reader, IX then blocks on it
    let lock = Arc::new(MultiLock::new());
    let (held_tx, held_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let l2 = Arc::clone(&lock);
    let reader = thread::spawn(move || {
        l2.lock(S);
        held_tx.send(()).unwrap();
        done_rx.recv().unwrap();
        l2.unlock(S);
    });
    held_rx.recv().unwrap();

    let interrupt = Interrupt::new();
    let (tx, rx) = mpsc::channel();
    let l3 = Arc::clone(&lock);
    let i3 = interrupt.clone();
    let requester = thread::spawn(move || {
        let result = l3.lock_interruptibly(SIX, &i3);
        tx.send((result, l3.read_hold_count())).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(lock.read_lock_count(), 2);

    interrupt.interrupt();
    let (result, held) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(result, interrupted(SIX));
    assert_eq!(held, 0);
    assert_eq!(lock.read_lock_count(), 1);
    assert_eq!(lock.intention_write_lock_count(), 0);
    requester.join().unwrap();

    done_tx.send(()).unwrap();
    reader.join().unwrap();
    assert!(lock.is_free());
}

#[test]
fn six_rolls_back_shared_on_try_and_timeout() {
    let lock = Arc::new(MultiLock::new());
    lock.lock(S);

    let l2 = Arc::clone(&lock);
    thread::spawn(move || {
        assert!(!l2.try_lock(SIX));
        assert_eq!(l2.read_lock_count(), 1);

        assert!(!l2.try_lock_for(SIX, Duration::from_millis(20)));
        assert_eq!(l2.read_lock_count(), 1);
        assert_eq!(l2.read_hold_count(), 0);
    })
    .join()
    .unwrap();

    lock.unlock(S);
    assert!(lock.is_free());
}
