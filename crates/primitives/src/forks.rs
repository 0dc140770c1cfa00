//! The ordered hard-fork schedule.

use core::fmt::Display;

/// A named protocol rule-set, ordered by activation.
///
/// Comparing two forks with `<`/`>` compares their position in the
/// schedule, so `Fork::Berlin >= Fork::Byzantium` reads as "Berlin rules
/// include the Byzantium changes".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fork {
    /// The genesis rule-set.
    Frontier,
    /// EIP-2 / EIP-7 / EIP-8.
    Homestead,
    /// The DAO recovery hard-fork.
    Dao,
    /// EIP-150 gas repricing ("Tangerine Whistle").
    Tangerine,
    /// EIP-155 / EIP-158 state clearing ("Spurious Dragon").
    Spurious,
    /// Byzantium (EIP-658 receipt status, reward drop to 3 ETH).
    Byzantium,
    /// Constantinople (reward drop to 2 ETH).
    Constantinople,
    /// Petersburg (Constantinople with EIP-1283 removed).
    Petersburg,
    /// Istanbul.
    Istanbul,
    /// Muir Glacier difficulty-bomb delay.
    MuirGlacier,
    /// Berlin (EIP-2929 access lists).
    Berlin,
    /// London (EIP-1559 fee market).
    London,
    /// Arrow Glacier difficulty-bomb delay.
    ArrowGlacier,
    /// Gray Glacier difficulty-bomb delay.
    GrayGlacier,
    /// The proof-of-stake transition.
    Merge,
}

impl Display for Fork {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Frontier => "Frontier",
            Self::Homestead => "Homestead",
            Self::Dao => "DAO",
            Self::Tangerine => "Tangerine",
            Self::Spurious => "Spurious",
            Self::Byzantium => "Byzantium",
            Self::Constantinople => "Constantinople",
            Self::Petersburg => "Petersburg",
            Self::Istanbul => "Istanbul",
            Self::MuirGlacier => "MuirGlacier",
            Self::Berlin => "Berlin",
            Self::London => "London",
            Self::ArrowGlacier => "ArrowGlacier",
            Self::GrayGlacier => "GrayGlacier",
            Self::Merge => "Merge",
        };
        write!(f, "{name}")
    }
}
