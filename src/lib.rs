// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Multi-granularity locking: one reentrant lock per resource supporting the
// IS, IX, S, SIX and X modes, with intention locks cascading up a tree of
// resources (database -> table -> row).

mod error;
pub use error::{CancelReason, LockError};

mod state;
pub use state::Field;

mod hold;
mod sync;

mod waiter;
pub use waiter::Interrupt;

mod mode;
pub use mode::{LockMode, ParseLockModeError};

mod multi_lock;
pub use multi_lock::{MultiLock, DEFAULT_SPIN_LIMIT};

mod guard;
pub use guard::ModeGuard;
