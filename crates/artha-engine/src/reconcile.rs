//! Broker reconciliation.
//!
//! The broker is the source of truth for what is actually held. Once per
//! cycle, before arbitration and lifecycle evaluation, the internal book is
//! diffed against the broker's reported holdings:
//!
//! - **orphan** — broker-only instrument. A position is synthesized with
//!   conservative emergency stop/target and inserted, ownership
//!   force-acquired for `StrategyId::Recovery`.
//! - **phantom** — internal-only instrument. Removed and ownership released;
//!   the fill/closure evidently happened out-of-band.
//!
//! This is the only writer allowed to insert/remove positions outside the
//! dispatch path. Every repair is logged with its reason for audit.

use crate::config::ReconcileConfig;
use crate::lifecycle::PositionBook;
use crate::ownership::OwnershipLedger;
use artha_models::{BrokerPosition, InstrumentId, Position, StrategyId};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// What one reconciliation pass repaired.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub recovered: Vec<InstrumentId>,
    pub dropped: Vec<InstrumentId>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.recovered.is_empty() && self.dropped.is_empty()
    }
}

pub struct Reconciler {
    cfg: ReconcileConfig,
    tier_count: usize,
}

impl Reconciler {
    pub fn new(cfg: ReconcileConfig, tier_count: usize) -> Self {
        Self { cfg, tier_count }
    }

    pub fn reconcile(
        &self,
        book: &mut PositionBook,
        ledger: &mut OwnershipLedger,
        broker_positions: &[BrokerPosition],
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let broker_instruments: BTreeSet<&InstrumentId> =
            broker_positions.iter().map(|bp| &bp.instrument).collect();

        // phantoms: internal positions the broker does not hold
        for instrument in book.instruments() {
            if !broker_instruments.contains(&instrument) {
                book.close(&instrument);
                ledger.release(&instrument);
                tracing::warn!(
                    instrument = %instrument,
                    reason = "phantom",
                    "reconciliation dropped internal position absent at broker"
                );
                report.dropped.push(instrument);
            }
        }

        // orphans: broker holdings with no internal record
        for bp in broker_positions {
            if book.contains(&bp.instrument) {
                continue;
            }
            let position = self.synthesize(bp, now);
            tracing::warn!(
                instrument = %bp.instrument,
                direction = %bp.direction,
                qty = bp.quantity,
                stop = position.stop_loss,
                target = position.target,
                reason = "orphan",
                "reconciliation recovered broker position with no internal record"
            );
            ledger.force_acquire(&bp.instrument, StrategyId::Recovery, now);
            book.insert(position);
            report.recovered.push(bp.instrument.clone());
        }

        report
    }

    /// Conservative recovery position: emergency stop/target around the
    /// broker's average price, owned by the recovery pseudo-strategy.
    fn synthesize(&self, bp: &BrokerPosition, now: DateTime<Utc>) -> Position {
        let sign = bp.direction.sign();
        let stop = bp.avg_price * (1.0 - sign * self.cfg.orphan_stop_pct / 100.0);
        let target = bp.avg_price * (1.0 + sign * self.cfg.orphan_target_pct / 100.0);
        Position::new(
            bp.instrument.clone(),
            StrategyId::Recovery,
            bp.direction,
            bp.quantity,
            bp.avg_price,
            stop,
            target,
            now,
            self.tier_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artha_models::Direction;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 11, 0, 0).unwrap()
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(ReconcileConfig::default(), 2)
    }

    fn broker_long(instrument: &str, qty: u32, avg: f64) -> BrokerPosition {
        BrokerPosition {
            instrument: InstrumentId::new(instrument),
            direction: Direction::Long,
            quantity: qty,
            avg_price: avg,
        }
    }

    #[test]
    fn test_orphan_recovered_with_emergency_levels() {
        let mut book = PositionBook::new();
        let mut ledger = OwnershipLedger::new(Duration::seconds(300));
        let report = reconciler().reconcile(
            &mut book,
            &mut ledger,
            &[broker_long("HDFCBANK", 25, 1600.0)],
            t0(),
        );

        assert_eq!(report.recovered, vec![InstrumentId::new("HDFCBANK")]);
        assert!(report.dropped.is_empty());

        let pos = book.get(&InstrumentId::new("HDFCBANK")).unwrap();
        assert_eq!(pos.strategy, StrategyId::Recovery);
        assert_eq!(pos.quantity, 25);
        assert!((pos.stop_loss - 1520.0).abs() < 1e-9); // 5% below
        assert!((pos.target - 1760.0).abs() < 1e-9); // 10% above

        let (owner, _) = ledger.owner(&InstrumentId::new("HDFCBANK"), t0()).unwrap();
        assert_eq!(owner, StrategyId::Recovery);
    }

    #[test]
    fn test_phantom_removed_and_ownership_released() {
        let mut book = PositionBook::new();
        let mut ledger = OwnershipLedger::new(Duration::seconds(300));
        let ins = InstrumentId::new("WIPRO");
        book.insert(Position::new(
            ins.clone(),
            StrategyId::RangeFade,
            Direction::Long,
            10,
            400.0,
            396.0,
            412.0,
            t0(),
            2,
        ));
        ledger.acquire(&ins, StrategyId::RangeFade, t0());

        let report = reconciler().reconcile(&mut book, &mut ledger, &[], t0());
        assert_eq!(report.dropped, vec![ins.clone()]);
        assert!(book.is_empty());
        assert!(ledger.owner(&ins, t0()).is_none());
    }

    #[test]
    fn test_matching_positions_left_alone() {
        let mut book = PositionBook::new();
        let mut ledger = OwnershipLedger::new(Duration::seconds(300));
        let ins = InstrumentId::new("TATAMOTORS");
        book.insert(Position::new(
            ins.clone(),
            StrategyId::GapTrader,
            Direction::Long,
            10,
            900.0,
            891.0,
            927.0,
            t0(),
            2,
        ));
        ledger.acquire(&ins, StrategyId::GapTrader, t0());

        let report = reconciler().reconcile(
            &mut book,
            &mut ledger,
            &[broker_long("TATAMOTORS", 10, 900.0)],
            t0() + Duration::seconds(5),
        );
        assert!(report.is_clean());
        // neither ownership nor the position was touched
        assert_eq!(book.get(&ins).unwrap().strategy, StrategyId::GapTrader);
        let (owner, _) = ledger.owner(&ins, t0() + Duration::seconds(5)).unwrap();
        assert_eq!(owner, StrategyId::GapTrader);
    }
}
