//! Integer-backed enums shared by modeled objects.

use strum::{Display, EnumString, FromRepr};

use crate::memory::read::EnumRepr;

/// Phase of the current duel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display, EnumString)]
#[repr(i32)]
#[strum(serialize_all = "snake_case")]
pub enum DuelPhase {
    Starting = 0,
    PrePlanning = 1,
    Planning = 2,
    PreExecution = 3,
    Execution = 4,
    Resolution = 5,
    Victory = 6,
    Ended = 7,
    Max = 10,
}

impl EnumRepr for DuelPhase {
    fn from_i32(value: i32) -> Option<Self> {
        Self::from_repr(value)
    }

    fn as_i32(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duel_phase_discriminants() {
        assert_eq!(DuelPhase::from_i32(2), Some(DuelPhase::Planning));
        assert_eq!(DuelPhase::from_i32(10), Some(DuelPhase::Max));
        // 8 and 9 are holes in the client's table, not valid phases.
        assert_eq!(DuelPhase::from_i32(8), None);
        assert_eq!(DuelPhase::Ended.as_i32(), 7);
    }
}
