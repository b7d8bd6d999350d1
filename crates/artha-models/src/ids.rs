//! Identifier and enumeration types.
//!
//! `StrategyId` and `RegimeKind` are closed enums rather than free strings so
//! the priority matrix can be a fixed-size table indexed by discriminant.

use serde::{Deserialize, Serialize};

// =============================================================================
// Instrument
// =============================================================================

/// Exchange tradingsymbol (e.g. "RELIANCE", "NIFTY24AUGFUT").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentId(pub String);

impl InstrumentId {
    pub fn new(sym: impl Into<String>) -> Self {
        Self(sym.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Strategy roster
// =============================================================================

/// The fixed strategy roster.
///
/// `Recovery` is reserved for positions synthesized by reconciliation; it is
/// never allowed to originate entry signals (priority 0 in every regime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StrategyId {
    OrbBreakout = 0,
    MomentumRider = 1,
    VwapReversion = 2,
    RangeFade = 3,
    GapTrader = 4,
    Recovery = 5,
}

impl StrategyId {
    pub const COUNT: usize = 6;

    /// All roster members, in discriminant order.
    pub const ALL: [StrategyId; Self::COUNT] = [
        StrategyId::OrbBreakout,
        StrategyId::MomentumRider,
        StrategyId::VwapReversion,
        StrategyId::RangeFade,
        StrategyId::GapTrader,
        StrategyId::Recovery,
    ];

    /// Table index for priority-matrix lookup.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::OrbBreakout => "orb_breakout",
            StrategyId::MomentumRider => "momentum_rider",
            StrategyId::VwapReversion => "vwap_reversion",
            StrategyId::RangeFade => "range_fade",
            StrategyId::GapTrader => "gap_trader",
            StrategyId::Recovery => "recovery",
        }
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StrategyId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyId::ALL
            .iter()
            .find(|id| id.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown strategy id: {s}"))
    }
}

// =============================================================================
// Market regime
// =============================================================================

/// Regime tag produced by the external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RegimeKind {
    TrendingUp = 0,
    TrendingDown = 1,
    Ranging = 2,
    Choppy = 3,
    VolatileRanging = 4,
}

impl RegimeKind {
    pub const COUNT: usize = 5;

    pub const ALL: [RegimeKind; Self::COUNT] = [
        RegimeKind::TrendingUp,
        RegimeKind::TrendingDown,
        RegimeKind::Ranging,
        RegimeKind::Choppy,
        RegimeKind::VolatileRanging,
    ];

    /// Table index for priority-matrix lookup.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeKind::TrendingUp => "trending_up",
            RegimeKind::TrendingDown => "trending_down",
            RegimeKind::Ranging => "ranging",
            RegimeKind::Choppy => "choppy",
            RegimeKind::VolatileRanging => "volatile_ranging",
        }
    }
}

impl std::fmt::Display for RegimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RegimeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegimeKind::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown regime: {s}"))
    }
}

// =============================================================================
// Direction
// =============================================================================

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn flip(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// +1.0 for long, -1.0 for short. Multiplies price moves into pnl.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
