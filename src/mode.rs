// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The five multi-granularity lock modes and how each maps onto the
// packed fields of a node.

use std::fmt;
use std::str::FromStr;

use crate::Field;

/// A multi-granularity lock mode (Gray et al., "Granularity of Locks in a
/// Shared Data Base").
///
/// |     | IS  | IX  | S   | SIX | X  |
/// |-----|-----|-----|-----|-----|----|
/// | IS  | yes | yes | yes | yes | no |
/// | IX  | yes | yes | no  | no  | no |
/// | S   | yes | no  | yes | no  | no |
/// | SIX | yes | no  | no  | no  | no |
/// | X   | no  | no  | no  | no  | no |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Intention shared.
    IS,
    /// Intention exclusive.
    IX,
    /// Shared.
    S,
    /// Shared + intention exclusive: S and IX held together.
    SIX,
    /// Exclusive.
    X,
}

impl LockMode {
    pub const ALL: [LockMode; 5] = [
        LockMode::IS,
        LockMode::IX,
        LockMode::S,
        LockMode::SIX,
        LockMode::X,
    ];

    /// Fields acquired, in order, to take this mode. Released in reverse.
    pub(crate) const fn fields(self) -> &'static [Field] {
        match self {
            LockMode::IS => &[Field::IntentionShared],
            LockMode::IX => &[Field::IntentionExclusive],
            LockMode::S => &[Field::Shared],
            LockMode::SIX => &[Field::Shared, Field::IntentionExclusive],
            LockMode::X => &[Field::Exclusive],
        }
    }

    /// Intention mode a parent node must hold before this mode is taken on
    /// one of its children.
    pub const fn parent_intention(self) -> LockMode {
        match self {
            LockMode::IS | LockMode::S => LockMode::IS,
            LockMode::IX | LockMode::SIX | LockMode::X => LockMode::IX,
        }
    }

    /// Whether `self` held by one thread admits `requested` from another.
    pub const fn is_compatible_with(self, requested: LockMode) -> bool {
        use LockMode::*;
        match (self, requested) {
            (X, _) | (_, X) => false,
            (IS, _) | (_, IS) => true,
            (IX, IX) | (S, S) => true,
            _ => false,
        }
    }

    pub const fn is_intention(self) -> bool {
        matches!(self, LockMode::IS | LockMode::IX)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            LockMode::IS => "IS",
            LockMode::IX => "IX",
            LockMode::S => "S",
            LockMode::SIX => "SIX",
            LockMode::X => "X",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised lock mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lock mode: {0:?}")]
pub struct ParseLockModeError(String);

impl FromStr for LockMode {
    type Err = ParseLockModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LockMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseLockModeError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LockMode::*;

    #[test]
    fn compatibility_matrix_is_symmetric() {
        for a in LockMode::ALL {
            for b in LockMode::ALL {
                assert_eq!(a.is_compatible_with(b), b.is_compatible_with(a), "{a} / {b}");
            }
        }
    }

    #[test]
    fn compatibility_rows() {
        let row = |held: LockMode| LockMode::ALL.map(|r| held.is_compatible_with(r));
        assert_eq!(row(IS), [true, true, true, true, false]);
        assert_eq!(row(IX), [true, true, false, false, false]);
        assert_eq!(row(S), [true, false, true, false, false]);
        assert_eq!(row(SIX), [true, false, false, false, false]);
        assert_eq!(row(X), [false, false, false, false, false]);
    }

    #[test]
    fn six_is_shared_then_intention_exclusive() {
        assert_eq!(SIX.fields(), &[Field::Shared, Field::IntentionExclusive]);
        assert_eq!(X.fields(), &[Field::Exclusive]);
    }

    #[test]
    fn only_intentions_cascade() {
        assert_eq!(IS.parent_intention(), IS);
        assert_eq!(S.parent_intention(), IS);
        assert_eq!(IX.parent_intention(), IX);
        assert_eq!(SIX.parent_intention(), IX);
        assert_eq!(X.parent_intention(), IX);
        assert!(LockMode::ALL.iter().all(|m| m.parent_intention().is_intention()));
    }

    #[test]
    fn parses_names() {
        assert_eq!("six".parse::<LockMode>(), Ok(SIX));
        assert_eq!("IX".parse::<LockMode>(), Ok(IX));
        assert!("Y".parse::<LockMode>().is_err());
        for mode in LockMode::ALL {
            assert_eq!(mode.to_string().parse::<LockMode>(), Ok(mode));
        }
    }
}
