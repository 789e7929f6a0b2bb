//! Movement capability flags.

use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bitmask of movement capabilities supported by a cell or an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MovementFlags(pub u8);

impl MovementFlags {
    /// No movement possible
    pub const NONE: MovementFlags = MovementFlags(0x00);
    /// Ground movement
    pub const WALK: MovementFlags = MovementFlags(0x01);
    /// Flying movement
    pub const FLY: MovementFlags = MovementFlags(0x02);
    /// Any movement
    pub const ALL: MovementFlags = MovementFlags(0x03);

    /// Raw bits
    #[inline]
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every bit of `flag` is set.
    #[inline]
    pub fn contains(&self, flag: MovementFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// Whether any bit of `flag` is set.
    #[inline]
    pub fn intersects(&self, flag: MovementFlags) -> bool {
        self.0 & flag.0 != 0
    }

    /// Whether no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Set the bits of `flag`.
    #[inline]
    pub fn insert(&mut self, flag: MovementFlags) {
        self.0 |= flag.0;
    }

    /// Clear the bits of `flag`.
    #[inline]
    pub fn remove(&mut self, flag: MovementFlags) {
        self.0 &= !flag.0;
    }
}

impl BitOr for MovementFlags {
    type Output = MovementFlags;

    #[inline]
    fn bitor(self, other: MovementFlags) -> MovementFlags {
        MovementFlags(self.0 | other.0)
    }
}

impl BitOrAssign for MovementFlags {
    #[inline]
    fn bitor_assign(&mut self, other: MovementFlags) {
        self.0 |= other.0;
    }
}

impl BitAnd for MovementFlags {
    type Output = MovementFlags;

    #[inline]
    fn bitand(self, other: MovementFlags) -> MovementFlags {
        MovementFlags(self.0 & other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_ops() {
        let mut flags = MovementFlags::WALK;
        assert!(flags.contains(MovementFlags::WALK));
        assert!(!flags.contains(MovementFlags::ALL));
        assert!(flags.intersects(MovementFlags::ALL));

        flags |= MovementFlags::FLY;
        assert_eq!(flags, MovementFlags::ALL);

        flags.remove(MovementFlags::WALK);
        assert_eq!(flags & MovementFlags::ALL, MovementFlags::FLY);
        assert!(!(flags & MovementFlags::WALK).intersects(MovementFlags::ALL));
    }
}
