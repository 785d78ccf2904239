// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Single-word atomic lock state holding four reentrant counters.
//   bits 48..63  X   (exclusive)
//   bits 32..47  S   (shared)
//   bits 16..31  IX  (intention exclusive)
//   bits  0..15  IS  (intention shared)

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::LockError;

pub(crate) const X_FIELD: u64 = 0xFFFF_0000_0000_0000;
pub(crate) const S_FIELD: u64 = 0x0000_FFFF_0000_0000;
pub(crate) const IX_FIELD: u64 = 0x0000_0000_FFFF_0000;
pub(crate) const IS_FIELD: u64 = 0x0000_0000_0000_FFFF;
pub(crate) const NON_X_FIELDS: u64 = !X_FIELD;

pub(crate) const X_UNIT: u64 = 0x0001_0000_0000_0000;
pub(crate) const S_UNIT: u64 = 0x0000_0001_0000_0000;
pub(crate) const IX_UNIT: u64 = 0x0000_0000_0001_0000;
pub(crate) const IS_UNIT: u64 = 0x0000_0000_0000_0001;

/// One of the four counters packed into a lock's state word.
///
/// SIX has no field of its own: it is S and IX held together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    IntentionShared,
    IntentionExclusive,
    Shared,
    Exclusive,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::IntentionShared,
        Field::IntentionExclusive,
        Field::Shared,
        Field::Exclusive,
    ];

    #[inline]
    pub(crate) const fn unit(self) -> u64 {
        match self {
            Field::IntentionShared => IS_UNIT,
            Field::IntentionExclusive => IX_UNIT,
            Field::Shared => S_UNIT,
            Field::Exclusive => X_UNIT,
        }
    }

    #[inline]
    pub(crate) const fn mask(self) -> u64 {
        match self {
            Field::IntentionShared => IS_FIELD,
            Field::IntentionExclusive => IX_FIELD,
            Field::Shared => S_FIELD,
            Field::Exclusive => X_FIELD,
        }
    }

    #[inline]
    const fn shift(self) -> u32 {
        self.unit().trailing_zeros()
    }

    /// Extract this field's counter from a packed word.
    #[inline]
    pub(crate) const fn count(self, word: u64) -> u32 {
        ((word & self.mask()) >> self.shift()) as u32
    }

    /// `word` with this field bumped by one unit, or `CounterOverflow`
    /// if the 16-bit counter is already saturated.
    #[inline]
    pub(crate) fn checked_add(self, word: u64) -> Result<u64, LockError> {
        if word & self.mask() == self.mask() {
            return Err(LockError::CounterOverflow { field: self });
        }
        Ok(word + self.unit())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::IntentionShared => "IS",
            Field::IntentionExclusive => "IX",
            Field::Shared => "S",
            Field::Exclusive => "X",
        })
    }
}

/// The packed counter word of one lock node.
///
/// All mutation goes through [`PackedState::compare_exchange`]; callers
/// re-read and retry on failure. Sequentially consistent ordering pairs
/// with the waiter count in `Waiter` so a release never misses a parked
/// acquirer.
pub(crate) struct PackedState {
    word: AtomicU64,
}

impl PackedState {
    pub(crate) const fn new() -> Self {
        Self {
            word: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn load(&self) -> u64 {
        self.word.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn compare_exchange(&self, current: u64, new: u64) -> bool {
        self.word
            .compare_exchange_weak(current, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_partition_the_word() {
        let masks = Field::ALL.map(Field::mask);
        assert_eq!(masks.iter().fold(0u64, |acc, m| acc | m), u64::MAX);
        for (i, a) in masks.iter().enumerate() {
            for b in &masks[i + 1..] {
                assert_eq!(a & b, 0);
            }
        }
        assert_eq!(NON_X_FIELDS, S_FIELD | IX_FIELD | IS_FIELD);
    }

    #[test]
    fn count_reads_each_field_independently() {
        let word = 3 * X_UNIT + 5 * S_UNIT + 7 * IX_UNIT + 11 * IS_UNIT;
        assert_eq!(Field::Exclusive.count(word), 3);
        assert_eq!(Field::Shared.count(word), 5);
        assert_eq!(Field::IntentionExclusive.count(word), 7);
        assert_eq!(Field::IntentionShared.count(word), 11);
    }

    #[test]
    fn checked_add_stops_at_field_capacity() {
        let full_s = S_FIELD;
        assert_eq!(
            Field::Shared.checked_add(full_s),
            Err(LockError::CounterOverflow {
                field: Field::Shared
            })
        );
        // a saturated neighbour does not block the other fields
        assert_eq!(Field::IntentionExclusive.checked_add(full_s), Ok(full_s + IX_UNIT));
        assert_eq!(Field::Exclusive.checked_add(0xFFFE * X_UNIT), Ok(X_FIELD));
    }

    #[test]
    fn compare_exchange_retries_on_stale_value() {
        let state = PackedState::new();
        assert_eq!(state.load(), 0);
        assert!(!state.compare_exchange(IS_UNIT, IS_UNIT * 2));
        let mut ok = false;
        for _ in 0..16 {
            if state.compare_exchange(0, S_UNIT) {
                ok = true;
                break;
            }
        }
        assert!(ok);
        assert_eq!(Field::Shared.count(state.load()), 1);
    }
}
