//! Signal and regime inputs.

use crate::ids::{Direction, InstrumentId, RegimeKind, StrategyId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A strategy's proposal to open or adjust exposure.
///
/// Immutable once created; consumed exactly once by arbitration (either
/// approved and dispatched, or rejected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: InstrumentId,
    pub strategy: StrategyId,
    pub direction: Direction,
    /// Requested quantity in units (shares or lots).
    pub quantity: u32,
    /// Reference price at proposal time.
    pub price: f64,
    /// Conviction score, 0.0 to 10.0.
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    /// Explicit expiry. When absent, the engine-wide TTL applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Signal {
    pub fn new(
        instrument: impl Into<InstrumentId>,
        strategy: StrategyId,
        direction: Direction,
        quantity: u32,
        price: f64,
        confidence: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            strategy,
            direction,
            quantity,
            price,
            confidence,
            created_at,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// True if the signal is stale at `now`, given the engine-wide `ttl`.
    /// An explicit `expires_at` overrides the TTL.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.expires_at {
            Some(exp) => now >= exp,
            None => now - self.created_at >= ttl,
        }
    }
}

/// Process-wide regime value, refreshed every cycle by the external
/// classifier. Read-only to the engine; used only for priority lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketRegime {
    pub kind: RegimeKind,
    /// Classifier confidence, 0.0 to 1.0.
    pub confidence: f64,
}

impl MarketRegime {
    pub fn new(kind: RegimeKind, confidence: f64) -> Self {
        Self { kind, confidence }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_ttl_expiry() {
        let sig = Signal::new(
            "RELIANCE",
            StrategyId::OrbBreakout,
            Direction::Long,
            10,
            2950.0,
            7.5,
            t0(),
        );
        let ttl = Duration::seconds(120);
        assert!(!sig.is_expired(t0() + Duration::seconds(119), ttl));
        assert!(sig.is_expired(t0() + Duration::seconds(120), ttl));
    }

    #[test]
    fn test_explicit_expiry_overrides_ttl() {
        let sig = Signal::new(
            "RELIANCE",
            StrategyId::OrbBreakout,
            Direction::Long,
            10,
            2950.0,
            7.5,
            t0(),
        )
        .with_expiry(t0() + Duration::seconds(30));
        let ttl = Duration::seconds(120);
        assert!(sig.is_expired(t0() + Duration::seconds(30), ttl));
        assert!(!sig.is_expired(t0() + Duration::seconds(29), ttl));
    }
}
