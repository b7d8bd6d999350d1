//! Management actions, closure phases and decision reason codes.

use crate::ids::InstrumentId;
use serde::{Deserialize, Serialize};

// =============================================================================
// Closure phase
// =============================================================================

/// Session-time-driven escalation state for end-of-day risk reduction.
/// Derived purely from wall-clock time against configured boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosurePhase {
    #[default]
    Normal,
    Gradual,
    Urgent,
    Immediate,
}

impl ClosurePhase {
    /// New-entry signals are admitted only while the session is Normal.
    pub fn entries_allowed(&self) -> bool {
        matches!(self, ClosurePhase::Normal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClosurePhase::Normal => "NORMAL",
            ClosurePhase::Gradual => "GRADUAL",
            ClosurePhase::Urgent => "URGENT",
            ClosurePhase::Immediate => "IMMEDIATE",
        }
    }
}

impl std::fmt::Display for ClosurePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Management actions
// =============================================================================

/// What a management action does to the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PartialExit,
    Scale,
    AdjustStop,
    FullExit,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::PartialExit => "PARTIAL_EXIT",
            ActionKind::Scale => "SCALE",
            ActionKind::AdjustStop => "ADJUST_STOP",
            ActionKind::FullExit => "FULL_EXIT",
        }
    }

    /// Exits must never be dropped silently; a terminal dispatch failure on
    /// one escalates to a critical alert.
    pub fn is_exit(&self) -> bool {
        matches!(self, ActionKind::PartialExit | ActionKind::FullExit)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a management action fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionReason {
    EmergencyStop,
    StopLoss,
    TargetHit,
    ProfitTier,
    BreakevenLock,
    VolTighten,
    AgeTighten,
    MomentumScale,
    SessionUrgent,
    SessionImmediate,
}

impl ActionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionReason::EmergencyStop => "EMERGENCY_STOP",
            ActionReason::StopLoss => "STOP_LOSS",
            ActionReason::TargetHit => "TARGET_HIT",
            ActionReason::ProfitTier => "PROFIT_TIER",
            ActionReason::BreakevenLock => "BREAKEVEN_LOCK",
            ActionReason::VolTighten => "VOL_TIGHTEN",
            ActionReason::AgeTighten => "AGE_TIGHTEN",
            ActionReason::MomentumScale => "MOMENTUM_SCALE",
            ActionReason::SessionUrgent => "SESSION_URGENT",
            ActionReason::SessionImmediate => "SESSION_IMMEDIATE",
        }
    }
}

impl std::fmt::Display for ActionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle-driven order, distinct from a new strategy signal.
///
/// Always carries `priority = true`: management actions bypass the rate
/// governor because a late protective exit is worse than a momentary rate
/// excess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementAction {
    pub instrument: InstrumentId,
    pub kind: ActionKind,
    /// Quantity delta in units. Zero for pure stop adjustments.
    pub quantity: u32,
    /// New stop level, set for `AdjustStop`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    pub reason: ActionReason,
    pub priority: bool,
}

impl ManagementAction {
    pub fn full_exit(instrument: InstrumentId, quantity: u32, reason: ActionReason) -> Self {
        Self {
            instrument,
            kind: ActionKind::FullExit,
            quantity,
            stop_price: None,
            reason,
            priority: true,
        }
    }

    pub fn partial_exit(instrument: InstrumentId, quantity: u32, reason: ActionReason) -> Self {
        Self {
            instrument,
            kind: ActionKind::PartialExit,
            quantity,
            stop_price: None,
            reason,
            priority: true,
        }
    }

    pub fn adjust_stop(instrument: InstrumentId, stop_price: f64, reason: ActionReason) -> Self {
        Self {
            instrument,
            kind: ActionKind::AdjustStop,
            quantity: 0,
            stop_price: Some(stop_price),
            reason,
            priority: true,
        }
    }

    pub fn scale(instrument: InstrumentId, quantity: u32, reason: ActionReason) -> Self {
        Self {
            instrument,
            kind: ActionKind::Scale,
            quantity,
            stop_price: None,
            reason,
            priority: true,
        }
    }
}

// =============================================================================
// Arbitration reject reasons
// =============================================================================

/// Why arbitration refused a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Signal older than its TTL / explicit expiry.
    Expired,
    /// Session closure phase admits no new entries.
    SessionClosing,
    /// External daily-loss gate vetoed all new approvals.
    DailyLossGate,
    /// Instrument owned by a different strategy within the timeout.
    OwnershipHeld,
    /// Strategy has priority 0 in the current regime.
    StrategyDisabled,
    /// Lost a same-instrument conflict to a higher-ranked signal.
    ConflictLost,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Expired => "EXPIRED",
            RejectReason::SessionClosing => "SESSION_CLOSING",
            RejectReason::DailyLossGate => "DAILY_LOSS_GATE",
            RejectReason::OwnershipHeld => "OWNERSHIP_HELD",
            RejectReason::StrategyDisabled => "STRATEGY_DISABLED",
            RejectReason::ConflictLost => "CONFLICT_LOST",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
