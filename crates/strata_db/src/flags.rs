//! Bit-set newtypes for record flags.

use serde::{Deserialize, Serialize};

macro_rules! define_flags {
    ($(#[$meta:meta])* $name:ident: $repr:ty { $($(#[$fmeta:meta])* $flag:ident = $bit:expr;)* }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            $(
                $(#[$fmeta])*
                pub const $flag: Self = Self(1 << $bit);
            )*

            /// No flags set.
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Raw bits.
            pub const fn bits(self) -> $repr {
                self.0
            }

            /// Returns `true` if every bit of `other` is set.
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Returns the flags with `other` set or cleared.
            pub const fn set(self, other: Self, on: bool) -> Self {
                if on {
                    Self(self.0 | other.0)
                } else {
                    Self(self.0 & !other.0)
                }
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut set = f.debug_set();
                $(
                    if self.contains(Self::$flag) {
                        set.entry(&stringify!($flag));
                    }
                )*
                set.finish()
            }
        }
    };
}

define_flags!(
    /// Flags of a node instance.
    NodeFlags: u8 {
        /// Selectable only by clicking exactly on it.
        HARD_SELECT = 0;
        /// Cannot be edited.
        LOCKED = 1;
        /// Drawn only when looking inside the parent cell.
        VISIBLE_INSIDE = 2;
        /// A resistor that is not shorted by the parasitic equivalence policy.
        REAL_RESISTOR = 3;
    }
);

define_flags!(
    /// Flags of an arc instance.
    ArcFlags: u16 {
        /// Extended by half its width past the tail.
        TAIL_EXTENDED = 0;
        /// Extended by half its width past the head.
        HEAD_EXTENDED = 1;
        /// Arrow drawn at the head.
        HEAD_ARROWED = 2;
        /// Arrow drawn along the body.
        BODY_ARROWED = 3;
        /// Keeps its shape when attached nodes move.
        RIGID = 4;
        /// Keeps its angle when attached nodes move.
        FIXED_ANGLE = 5;
        /// Ends may slide within their ports.
        SLIDABLE = 6;
        /// Selectable only by clicking exactly on it.
        HARD_SELECT = 7;
        /// Tail end is negated (drawn with a bubble).
        TAIL_NEGATED = 8;
        /// Head end is negated.
        HEAD_NEGATED = 9;
    }
);

impl ArcFlags {
    /// Flags of a freshly created arc.
    pub const DEFAULT: ArcFlags =
        ArcFlags(ArcFlags::TAIL_EXTENDED.0 | ArcFlags::HEAD_EXTENDED.0 | ArcFlags::FIXED_ANGLE.0);
}

define_flags!(
    /// Flags of a cell.
    CellFlags: u16 {
        /// Instances cannot be edited.
        INSTANCES_LOCKED = 0;
        /// Contents cannot be edited.
        CONTENTS_LOCKED = 1;
        /// Part of a cell library rather than a design.
        IS_LIBRARY_CELL = 2;
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear() {
        let f = NodeFlags::empty().set(NodeFlags::LOCKED, true);
        assert!(f.contains(NodeFlags::LOCKED));
        assert!(!f.contains(NodeFlags::HARD_SELECT));
        assert_eq!(f.set(NodeFlags::LOCKED, false), NodeFlags::empty());
    }

    #[test]
    fn default_arc_flags() {
        let f = ArcFlags::DEFAULT;
        assert!(f.contains(ArcFlags::TAIL_EXTENDED | ArcFlags::HEAD_EXTENDED));
        assert!(!f.contains(ArcFlags::RIGID));
        assert_eq!(format!("{:?}", NodeFlags::REAL_RESISTOR), "{\"REAL_RESISTOR\"}");
    }
}
