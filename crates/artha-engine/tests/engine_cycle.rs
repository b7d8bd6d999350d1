//! Full-cycle tests: paper collaborators wired into the driver loop.

use artha_engine::{AllowAll, BrokerClient, BrokerError, Engine, EngineConfig};
use artha_models::{
    ClosurePhase, Direction, InstrumentId, MarketRegime, RegimeKind, Signal, StrategyId,
};
use artha_paper::broker::long_holding;
use artha_paper::{FixedRegimeSource, PaperBroker, ScriptedSignalSource, StaticPriceFeed};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

struct Harness {
    engine: Engine,
    broker: Arc<PaperBroker>,
    signals: Arc<ScriptedSignalSource>,
    prices: Arc<StaticPriceFeed>,
    regime: Arc<FixedRegimeSource>,
}

fn harness(cfg: EngineConfig, regime: Option<MarketRegime>) -> Harness {
    let broker = Arc::new(PaperBroker::new());
    let signals = Arc::new(ScriptedSignalSource::new());
    let prices = Arc::new(StaticPriceFeed::new());
    let regime = Arc::new(FixedRegimeSource::new(regime));
    let engine = Engine::new(
        cfg,
        broker.clone(),
        regime.clone(),
        signals.clone(),
        prices.clone(),
        Arc::new(AllowAll),
    )
    .unwrap();
    Harness {
        engine,
        broker,
        signals,
        prices,
        regime,
    }
}

fn fast_dispatch(cfg: &mut EngineConfig) {
    cfg.dispatch.backoff_base_ms = 1;
}

/// 10:30 IST — mid-session, NORMAL phase.
fn normal_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 7, 5, 0, 0).unwrap()
}

fn signal(
    instrument: &str,
    strategy: StrategyId,
    direction: Direction,
    confidence: f64,
    now: DateTime<Utc>,
) -> Signal {
    Signal::new(instrument, strategy, direction, 10, 500.0, confidence, now)
}

// -----------------------------------------------------------------------------
// Conflict arbitration end to end
// -----------------------------------------------------------------------------

/// Two strategies propose BUY (confidence 7.0, priority 8) and SELL
/// (confidence 8.5, priority 3) for the same instrument. Priority dominates
/// confidence: the BUY wins, the SELL is rejected, ownership goes to the
/// winner.
#[test]
fn test_priority_beats_confidence_through_full_cycle() {
    let mut cfg = EngineConfig::default();
    fast_dispatch(&mut cfg);
    cfg.priority.insert(
        "ranging".to_string(),
        BTreeMap::from([
            ("orb_breakout".to_string(), 8u8),
            ("gap_trader".to_string(), 3u8),
        ]),
    );
    let mut h = harness(cfg, Some(MarketRegime::new(RegimeKind::Ranging, 0.8)));

    let now = normal_now();
    h.prices.set_price("X", 500.0);
    h.signals.push_batch(vec![
        signal("X", StrategyId::OrbBreakout, Direction::Long, 7.0, now),
        signal("X", StrategyId::GapTrader, Direction::Short, 8.5, now),
    ]);

    let report = h.engine.run_cycle(now);
    assert_eq!(report.approved, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.entries_placed, 1);

    let x = InstrumentId::new("X");
    let pos = h.engine.book().get(&x).expect("winner's position open");
    assert_eq!(pos.strategy, StrategyId::OrbBreakout);
    assert_eq!(pos.direction, Direction::Long);
    let (owner, _) = h.engine.ledger().owner(&x, now).unwrap();
    assert_eq!(owner, StrategyId::OrbBreakout);
}

// -----------------------------------------------------------------------------
// Reconciliation round trip
// -----------------------------------------------------------------------------

#[test]
fn test_orphan_recovered_then_phantom_dropped() {
    let mut cfg = EngineConfig::default();
    fast_dispatch(&mut cfg);
    let mut h = harness(cfg, Some(MarketRegime::new(RegimeKind::Ranging, 0.8)));
    let now = normal_now();

    // the broker reports a holding the engine has never seen
    h.broker.set_positions(vec![long_holding("HDFCBANK", 25, 1600.0)]);
    h.prices.set_price("HDFCBANK", 1600.0);

    let report = h.engine.run_cycle(now);
    assert_eq!(report.reconcile.recovered, vec![InstrumentId::new("HDFCBANK")]);

    let pos = h.engine.book().get(&InstrumentId::new("HDFCBANK")).unwrap();
    assert_eq!(pos.strategy, StrategyId::Recovery);
    assert!((pos.stop_loss - 1520.0).abs() < 1e-9);
    assert!((pos.target - 1760.0).abs() < 1e-9);

    // out-of-band closure: the broker no longer holds it
    h.broker.set_positions(vec![]);
    let later = now + chrono::Duration::seconds(1);
    let report = h.engine.run_cycle(later);
    assert_eq!(report.reconcile.dropped, vec![InstrumentId::new("HDFCBANK")]);
    assert!(h.engine.book().is_empty());
    assert!(h
        .engine
        .ledger()
        .owner(&InstrumentId::new("HDFCBANK"), later)
        .is_none());
}

// -----------------------------------------------------------------------------
// Closure escalation
// -----------------------------------------------------------------------------

#[test]
fn test_closure_phases_escalate_and_immediate_flattens() {
    let mut cfg = EngineConfig::default();
    fast_dispatch(&mut cfg);
    let mut h = harness(cfg, Some(MarketRegime::new(RegimeKind::TrendingUp, 0.9)));

    // NORMAL: an entry goes through
    let now = normal_now();
    h.prices.set_price("INFY", 500.0);
    h.signals.push_batch(vec![signal(
        "INFY",
        StrategyId::MomentumRider,
        Direction::Long,
        8.0,
        now,
    )]);
    let report = h.engine.run_cycle(now);
    assert_eq!(report.phase, ClosurePhase::Normal);
    assert_eq!(report.entries_placed, 1);

    // GRADUAL (15:05 IST): new entries refused
    let gradual = Utc.with_ymd_and_hms(2026, 8, 7, 9, 35, 0).unwrap();
    h.signals.push_batch(vec![signal(
        "TCS",
        StrategyId::MomentumRider,
        Direction::Long,
        8.0,
        gradual,
    )]);
    h.prices.set_price("INFY", 501.0);
    let report = h.engine.run_cycle(gradual);
    assert_eq!(report.phase, ClosurePhase::Gradual);
    assert_eq!(report.approved, 0);
    assert_eq!(report.rejected, 1);
    assert!(h.engine.book().contains(&InstrumentId::new("INFY")));

    // URGENT (15:15 IST): small winner is held, not force-closed
    let urgent = Utc.with_ymd_and_hms(2026, 8, 7, 9, 45, 0).unwrap();
    let report = h.engine.run_cycle(urgent);
    assert_eq!(report.phase, ClosurePhase::Urgent);
    assert!(h.engine.book().contains(&InstrumentId::new("INFY")));

    // IMMEDIATE (15:25 IST): everything is flattened regardless of pnl
    let immediate = Utc.with_ymd_and_hms(2026, 8, 7, 9, 55, 0).unwrap();
    let report = h.engine.run_cycle(immediate);
    assert_eq!(report.phase, ClosurePhase::Immediate);
    assert_eq!(report.actions_dispatched, 1);
    assert!(h.engine.book().is_empty());
    assert!(h.broker.positions().unwrap().is_empty());
    assert!(h
        .engine
        .ledger()
        .owner(&InstrumentId::new("INFY"), immediate)
        .is_none());
}

// -----------------------------------------------------------------------------
// Exit failure escalation and retry
// -----------------------------------------------------------------------------

#[test]
fn test_failed_exit_keeps_position_and_retries_next_cycle() {
    let mut cfg = EngineConfig::default();
    fast_dispatch(&mut cfg);
    let mut h = harness(cfg, Some(MarketRegime::new(RegimeKind::TrendingUp, 0.9)));
    let now = normal_now();

    h.prices.set_price("SBIN", 500.0);
    h.signals.push_batch(vec![signal(
        "SBIN",
        StrategyId::MomentumRider,
        Direction::Long,
        8.0,
        now,
    )]);
    h.engine.run_cycle(now);
    assert!(h.engine.book().contains(&InstrumentId::new("SBIN")));

    // price crashes through the stop; every dispatch attempt fails
    h.prices.set_price("SBIN", 494.0);
    for _ in 0..3 {
        h.broker.push_failure(BrokerError::Transport("link down".to_string()));
    }
    let t1 = now + chrono::Duration::seconds(1);
    let report = h.engine.run_cycle(t1);
    assert_eq!(report.actions_failed, 1);
    // never silently removed: the position survives the failed exit
    assert!(h.engine.book().contains(&InstrumentId::new("SBIN")));

    // next cycle the broker is back and the exit completes
    let t2 = now + chrono::Duration::seconds(2);
    let report = h.engine.run_cycle(t2);
    assert_eq!(report.actions_dispatched, 1);
    assert!(h.engine.book().is_empty());
}

// -----------------------------------------------------------------------------
// Degraded arbitration
// -----------------------------------------------------------------------------

#[test]
fn test_regime_outage_degrades_to_passthrough() {
    let mut cfg = EngineConfig::default();
    fast_dispatch(&mut cfg);
    let mut h = harness(cfg, None);
    let now = normal_now();

    h.prices.set_price("ITC", 500.0);
    // range_fade would be disabled in a trending regime; without a regime it
    // passes straight through
    h.signals.push_batch(vec![signal(
        "ITC",
        StrategyId::RangeFade,
        Direction::Long,
        4.0,
        now,
    )]);
    let report = h.engine.run_cycle(now);
    assert_eq!(report.approved, 1);
    assert_eq!(report.entries_placed, 1);

    // the classifier comes back and normal filtering resumes
    h.regime.set(Some(MarketRegime::new(RegimeKind::TrendingUp, 0.9)));
    h.signals.push_batch(vec![signal(
        "DLF",
        StrategyId::RangeFade,
        Direction::Long,
        4.0,
        now + chrono::Duration::seconds(1),
    )]);
    let report = h.engine.run_cycle(now + chrono::Duration::seconds(1));
    assert_eq!(report.approved, 0);
    assert_eq!(
        report.rejected, 1,
        "range_fade is disabled while trending"
    );
}

// -----------------------------------------------------------------------------
// Profit tier booking through the dispatch path
// -----------------------------------------------------------------------------

#[test]
fn test_partial_exit_reduces_book_and_broker() {
    let mut cfg = EngineConfig::default();
    fast_dispatch(&mut cfg);
    // bring the first tier within reach and silence the target
    cfg.tiers[0].trigger_pct = 2.0;
    cfg.tiers[1].trigger_pct = 50.0;
    cfg.entry.default_target_pct = 60.0;
    cfg.tighten.breakeven_trigger_pct = 50.0;
    let mut h = harness(cfg, Some(MarketRegime::new(RegimeKind::TrendingUp, 0.9)));
    let now = normal_now();

    h.prices.set_price("LT", 500.0);
    h.signals.push_batch(vec![signal(
        "LT",
        StrategyId::MomentumRider,
        Direction::Long,
        8.0,
        now,
    )]);
    h.engine.run_cycle(now);

    // +2.4%: first tier books half of 10
    h.prices.set_price("LT", 512.0);
    let t1 = now + chrono::Duration::seconds(1);
    let report = h.engine.run_cycle(t1);
    assert!(report.actions_dispatched >= 1);
    let pos = h.engine.book().get(&InstrumentId::new("LT")).unwrap();
    assert_eq!(pos.quantity, 5);
    assert!(pos.booked_tiers[0]);
    assert_eq!(h.broker.positions().unwrap()[0].quantity, 5);

    // the tier never fires twice
    let t2 = now + chrono::Duration::seconds(2);
    h.engine.run_cycle(t2);
    assert_eq!(h.engine.book().get(&InstrumentId::new("LT")).unwrap().quantity, 5);
}

// -----------------------------------------------------------------------------
// Rejection of stale signals at the boundary
// -----------------------------------------------------------------------------

#[test]
fn test_stale_signal_rejected_in_cycle() {
    let mut cfg = EngineConfig::default();
    fast_dispatch(&mut cfg);
    let mut h = harness(cfg, Some(MarketRegime::new(RegimeKind::TrendingUp, 0.9)));
    let now = normal_now();

    h.signals.push_batch(vec![signal(
        "OLDX",
        StrategyId::MomentumRider,
        Direction::Long,
        8.0,
        now - chrono::Duration::seconds(180),
    )]);
    let report = h.engine.run_cycle(now);
    assert_eq!(report.approved, 0);
    assert_eq!(report.rejected, 1);
    assert!(h.engine.book().is_empty());
}
