//! Signal arbitrator.
//!
//! Turns a raw batch of strategy proposals into a conflict-free, ownership-
//! consistent approved set. Filter order: TTL, session closure, external
//! daily-loss gate, ownership, regime priority, per-instrument conflict
//! resolution, ownership acquisition.
//!
//! Conflict tie-break chain (deterministic, reproducible): higher regime
//! priority, then higher confidence, then earlier creation timestamp.
//!
//! When the regime feed is unavailable the arbitrator degrades to
//! pass-through — TTL and ownership still apply, priority filtering and
//! conflict resolution do not. Loud, not silent: WARN every affected cycle.

use crate::ownership::OwnershipLedger;
use crate::priority::PriorityMatrix;
use artha_models::{
    ClosurePhase, Direction, InstrumentId, MarketRegime, RejectReason, Signal, StrategyId,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

// =============================================================================
// Decision records
// =============================================================================

/// Audit record for one signal's arbitration outcome. The digest is
/// deterministic over the decision's canonical bytes so identical inputs
/// replay to identical records.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub ts: DateTime<Utc>,
    pub instrument: InstrumentId,
    pub strategy: StrategyId,
    pub direction: Direction,
    pub confidence: f64,
    /// Regime priority at decision time; absent in degraded mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<RejectReason>,
    pub digest: String,
}

impl DecisionRecord {
    fn build(
        ts: DateTime<Utc>,
        signal: &Signal,
        priority: Option<u8>,
        reject_reason: Option<RejectReason>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"arb:");
        hasher.update(signal.instrument.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(signal.strategy.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(signal.direction.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(signal.created_at.timestamp_micros().to_le_bytes());
        hasher.update(b":");
        hasher.update(match reject_reason {
            None => "APPROVED".as_bytes().to_vec(),
            Some(r) => r.as_str().as_bytes().to_vec(),
        });
        hasher.update(b":");
        hasher.update(ts.timestamp_micros().to_le_bytes());
        Self {
            ts,
            instrument: signal.instrument.clone(),
            strategy: signal.strategy,
            direction: signal.direction,
            confidence: signal.confidence,
            priority,
            approved: reject_reason.is_none(),
            reject_reason,
            digest: format!("{:x}", hasher.finalize()),
        }
    }
}

/// Output of one arbitration pass.
#[derive(Debug, Default)]
pub struct ArbitrationOutcome {
    pub approved: Vec<Signal>,
    pub rejected: Vec<(Signal, RejectReason)>,
    pub records: Vec<DecisionRecord>,
    /// True when the pass ran without a regime (pass-through mode).
    pub degraded: bool,
}

// =============================================================================
// Arbitrator
// =============================================================================

pub struct Arbitrator {
    matrix: PriorityMatrix,
    signal_ttl: Duration,
}

impl Arbitrator {
    pub fn new(matrix: PriorityMatrix, signal_ttl: Duration) -> Self {
        Self { matrix, signal_ttl }
    }

    /// Arbitrate one batch. Side effect: winners acquire (or refresh)
    /// ownership of their instrument in `ledger`.
    pub fn arbitrate(
        &self,
        signals: Vec<Signal>,
        regime: Option<&MarketRegime>,
        phase: ClosurePhase,
        gate_allows_entries: bool,
        ledger: &mut OwnershipLedger,
        now: DateTime<Utc>,
    ) -> ArbitrationOutcome {
        let mut out = ArbitrationOutcome {
            degraded: regime.is_none(),
            ..Default::default()
        };

        if out.degraded && !signals.is_empty() {
            tracing::warn!(
                batch = signals.len(),
                "regime unavailable, arbitration degraded to pass-through"
            );
        }

        // Pre-filters that need no cross-signal context.
        let mut live: Vec<Signal> = Vec::with_capacity(signals.len());
        for signal in signals {
            let reason = if signal.is_expired(now, self.signal_ttl) {
                Some(RejectReason::Expired)
            } else if !phase.entries_allowed() {
                Some(RejectReason::SessionClosing)
            } else if !gate_allows_entries {
                Some(RejectReason::DailyLossGate)
            } else if !ledger.permits(&signal.instrument, signal.strategy, now) {
                Some(RejectReason::OwnershipHeld)
            } else if let Some(regime) = regime {
                let prio = self.matrix.priority(regime.kind, signal.strategy);
                if prio == 0 {
                    Some(RejectReason::StrategyDisabled)
                } else {
                    None
                }
            } else {
                None
            };
            match reason {
                Some(reason) => self.reject(&mut out, signal, regime, reason, now),
                None => live.push(signal),
            }
        }

        // Group by instrument in deterministic (BTreeMap) order.
        let mut groups: BTreeMap<InstrumentId, Vec<Signal>> = BTreeMap::new();
        for signal in live {
            groups.entry(signal.instrument.clone()).or_default().push(signal);
        }

        for (instrument, mut group) in groups {
            if let Some(regime) = regime {
                let both_directions = group.iter().any(|s| s.direction == Direction::Long)
                    && group.iter().any(|s| s.direction == Direction::Short);
                if both_directions {
                    self.rank(&mut group, regime);
                    let winner = group.remove(0);
                    tracing::info!(
                        instrument = %instrument,
                        winner = %winner.strategy,
                        direction = %winner.direction,
                        losers = group.len(),
                        "arbitration conflict resolved"
                    );
                    for loser in group.drain(..) {
                        self.reject(&mut out, loser, Some(regime), RejectReason::ConflictLost, now);
                    }
                    group.push(winner);
                } else {
                    // single-direction groups pass through unchanged, but
                    // acquisition order must still be deterministic
                    self.rank(&mut group, regime);
                }
            }

            for signal in group {
                if ledger.acquire(&signal.instrument, signal.strategy, now) {
                    self.approve(&mut out, signal, regime, now);
                } else {
                    self.reject(&mut out, signal, regime, RejectReason::OwnershipHeld, now);
                }
            }
        }

        out
    }

    /// Order a group best-first by the documented tie-break chain.
    fn rank(&self, group: &mut [Signal], regime: &MarketRegime) {
        group.sort_by(|a, b| {
            let pa = self.matrix.priority(regime.kind, a.strategy);
            let pb = self.matrix.priority(regime.kind, b.strategy);
            pb.cmp(&pa)
                .then_with(|| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
    }

    fn approve(
        &self,
        out: &mut ArbitrationOutcome,
        signal: Signal,
        regime: Option<&MarketRegime>,
        now: DateTime<Utc>,
    ) {
        let priority = regime.map(|r| self.matrix.priority(r.kind, signal.strategy));
        tracing::info!(
            instrument = %signal.instrument,
            strategy = %signal.strategy,
            direction = %signal.direction,
            qty = signal.quantity,
            confidence = signal.confidence,
            "signal approved"
        );
        out.records
            .push(DecisionRecord::build(now, &signal, priority, None));
        out.approved.push(signal);
    }

    fn reject(
        &self,
        out: &mut ArbitrationOutcome,
        signal: Signal,
        regime: Option<&MarketRegime>,
        reason: RejectReason,
        now: DateTime<Utc>,
    ) {
        let priority = regime.map(|r| self.matrix.priority(r.kind, signal.strategy));
        tracing::info!(
            instrument = %signal.instrument,
            strategy = %signal.strategy,
            reason = %reason,
            "signal rejected"
        );
        out.records
            .push(DecisionRecord::build(now, &signal, priority, Some(reason)));
        out.rejected.push((signal, reason));
    }
}
