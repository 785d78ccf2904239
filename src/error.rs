// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy for lock acquisition and release.

use std::fmt;

use thiserror::Error;

use crate::{Field, LockMode};

/// Why a waiting acquisition gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The caller's [`Interrupt`](crate::Interrupt) was raised.
    Interrupted,
    /// The deadline elapsed before the mode became compatible.
    TimedOut,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CancelReason::Interrupted => "interrupted",
            CancelReason::TimedOut => "timed out",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// A non-blocking attempt found the mode incompatible with current holders.
    #[error("{mode} is incompatible with the modes currently held")]
    IncompatibleMode { mode: LockMode },

    /// The wait was interrupted or its deadline elapsed. Any partially
    /// acquired compound or hierarchical state has already been released.
    #[error("acquisition of {mode} {reason}")]
    Cancelled { mode: LockMode, reason: CancelReason },

    /// Release by a thread that does not hold the field being released.
    #[error("protocol violation releasing {field}: {detail}")]
    ProtocolViolation { field: Field, detail: &'static str },

    /// A 16-bit counter is saturated (leaked or runaway reentrant holds).
    #[error("{field} counter overflow: more than 65535 holds")]
    CounterOverflow { field: Field },

    /// The calling thread's hold records were already destroyed by
    /// thread-local teardown.
    #[error("hold records of the calling thread are already destroyed")]
    ThreadExiting,
}

impl LockError {
    /// Programming errors that are never retried.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            LockError::ProtocolViolation { .. }
                | LockError::CounterOverflow { .. }
                | LockError::ThreadExiting
        )
    }
}
