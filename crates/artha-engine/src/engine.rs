//! Cycle driver.
//!
//! One periodic loop owns all mutable state (position book, ownership
//! ledger) and runs each cycle in strict order:
//!
//! 1. closure phase from session time
//! 2. regime refresh
//! 3. broker reconciliation
//! 4. lifecycle evaluation per position → management dispatch
//! 5. retry-queue drain
//! 6. signal collection → arbitration → entry dispatch
//!
//! All broker I/O happens inside the dispatcher; no lock is held across a
//! network call because nothing here is shared — collaborators are read
//! through `Arc<dyn …>` traits and state is owned by the loop. An external
//! stop flag ends the loop between cycles; in-flight dispatch completes.

use crate::arbiter::Arbitrator;
use crate::audit::{AuditEvent, AuditLog};
use crate::closure::ClosureController;
use crate::config::{ConfigError, EngineConfig};
use crate::dispatch::{BrokerClient, Dispatcher, EntryDispatch};
use crate::governor::RateGovernor;
use crate::lifecycle::{LifecycleManager, PositionBook, TickSnapshot};
use crate::ownership::OwnershipLedger;
use crate::reconcile::{ReconcileReport, Reconciler};
use artha_models::{
    ActionKind, ClosurePhase, InstrumentId, ManagementAction, MarketRegime, Signal,
};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// Collaborator traits
// =============================================================================

/// External regime classifier. `None` puts arbitration in pass-through mode.
pub trait RegimeSource: Send + Sync {
    fn current(&self) -> Option<MarketRegime>;
}

/// Strategy modules, one batch per cycle.
pub trait SignalSource: Send + Sync {
    fn collect(&self, now: DateTime<Utc>) -> Vec<Signal>;
}

/// Market-data cache.
pub trait PriceSource: Send + Sync {
    fn tick(&self, instrument: &InstrumentId) -> Option<TickSnapshot>;
}

/// External admission predicate (e.g. the daily-loss-limit gate). May veto
/// all new arbitration approvals; never touches management actions.
pub trait AdmissionGate: Send + Sync {
    fn entries_allowed(&self, now: DateTime<Utc>) -> bool;
}

/// Gate that never vetoes.
pub struct AllowAll;

impl AdmissionGate for AllowAll {
    fn entries_allowed(&self, _now: DateTime<Utc>) -> bool {
        true
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot open audit log: {0}")]
    Audit(#[from] std::io::Error),
}

/// What one cycle did, for observers and tests.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub phase: ClosurePhase,
    pub reconcile: ReconcileReport,
    pub actions_dispatched: u32,
    pub actions_failed: u32,
    pub entries_placed: u32,
    pub approved: usize,
    pub rejected: usize,
}

// =============================================================================
// Engine
// =============================================================================

pub struct Engine {
    cfg: EngineConfig,
    book: PositionBook,
    ledger: OwnershipLedger,
    arbitrator: Arbitrator,
    lifecycle: LifecycleManager,
    reconciler: Reconciler,
    closure: ClosureController,
    dispatcher: Dispatcher,
    broker: Arc<dyn BrokerClient>,
    regime_source: Arc<dyn RegimeSource>,
    signal_source: Arc<dyn SignalSource>,
    price_source: Arc<dyn PriceSource>,
    gate: Arc<dyn AdmissionGate>,
    audit: Option<AuditLog>,
    last_phase: Option<ClosurePhase>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: EngineConfig,
        broker: Arc<dyn BrokerClient>,
        regime_source: Arc<dyn RegimeSource>,
        signal_source: Arc<dyn SignalSource>,
        price_source: Arc<dyn PriceSource>,
        gate: Arc<dyn AdmissionGate>,
    ) -> Result<Self, EngineError> {
        cfg.validate()?;
        let matrix = cfg.priority_matrix()?;
        let closure = ClosureController::new(&cfg.session)?;
        let audit = match &cfg.audit_log {
            Some(path) => Some(AuditLog::open(path)?),
            None => None,
        };
        let dispatcher = Dispatcher::new(
            broker.clone(),
            RateGovernor::new(cfg.governor.ceiling_per_sec),
            cfg.dispatch.clone(),
            cfg.signal_ttl(),
        );
        Ok(Self {
            ledger: OwnershipLedger::new(cfg.ownership_timeout()),
            arbitrator: Arbitrator::new(matrix, cfg.signal_ttl()),
            lifecycle: LifecycleManager::new(&cfg),
            reconciler: Reconciler::new(cfg.reconcile.clone(), cfg.tiers.len()),
            closure,
            dispatcher,
            book: PositionBook::new(),
            broker,
            regime_source,
            signal_source,
            price_source,
            gate,
            audit,
            last_phase: None,
            cfg,
        })
    }

    pub fn book(&self) -> &PositionBook {
        &self.book
    }

    pub fn ledger(&self) -> &OwnershipLedger {
        &self.ledger
    }

    /// Exchange wall-clock time for `now`.
    pub fn session_time(&self, now: DateTime<Utc>) -> NaiveTime {
        (now + Duration::minutes(self.cfg.utc_offset_minutes as i64)).time()
    }

    /// Fixed-cadence loop until `stop` is raised. A raised flag never aborts
    /// a cycle midway; the current cycle finishes first.
    pub fn run(&mut self, stop: &AtomicBool) {
        let interval = std::time::Duration::from_millis(self.cfg.cycle_interval_ms);
        tracing::info!(
            interval_ms = self.cfg.cycle_interval_ms,
            "engine loop started"
        );
        while !stop.load(Ordering::Relaxed) {
            let started = std::time::Instant::now();
            self.run_cycle(Utc::now());
            if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                std::thread::sleep(remaining);
            }
        }
        if let Some(audit) = self.audit.as_mut() {
            let _ = audit.flush();
        }
        tracing::info!("engine loop stopped");
    }

    /// One full cycle at `now`. Public so tests and replay harnesses can
    /// drive simulated clocks.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();

        // 1. closure phase
        let phase = self.closure.phase_at(self.session_time(now));
        report.phase = phase;
        if self.last_phase != Some(phase) {
            if let Some(previous) = self.last_phase {
                tracing::info!(from = %previous, to = %phase, "closure phase transition");
                self.record(&AuditEvent::PhaseTransition {
                    ts: now,
                    from: previous,
                    to: phase,
                });
            }
            self.last_phase = Some(phase);
        }

        // 2. regime refresh
        let regime = self.regime_source.current();

        // 3. broker reconciliation
        match self.broker.positions() {
            Ok(broker_positions) => {
                let outcome =
                    self.reconciler
                        .reconcile(&mut self.book, &mut self.ledger, &broker_positions, now);
                for instrument in &outcome.recovered {
                    self.record(&AuditEvent::ReconcileRepair {
                        ts: now,
                        instrument: instrument.clone(),
                        repair: "orphan",
                    });
                }
                for instrument in &outcome.dropped {
                    self.record(&AuditEvent::ReconcileRepair {
                        ts: now,
                        instrument: instrument.clone(),
                        repair: "phantom",
                    });
                }
                report.reconcile = outcome;
            }
            Err(err) => {
                tracing::warn!(error = %err, "broker positions unavailable, reconciliation skipped");
            }
        }

        // 4. lifecycle evaluation and management dispatch
        for instrument in self.book.instruments() {
            let Some(tick) = self.price_source.tick(&instrument) else {
                tracing::warn!(instrument = %instrument, "no price this cycle, position not evaluated");
                continue;
            };
            let Some(position) = self.book.get_mut(&instrument) else {
                continue;
            };
            let direction = position.direction;
            let actions = self.lifecycle.evaluate(position, &tick, phase, now);
            for action in actions {
                match self.dispatcher.dispatch_action(&action, direction) {
                    Ok(order_ref) => {
                        report.actions_dispatched += 1;
                        self.apply_confirmed_action(&action, tick.price);
                        self.record(&AuditEvent::ActionDispatched {
                            ts: now,
                            instrument: action.instrument.clone(),
                            kind: action.kind,
                            qty: action.quantity,
                            reason: action.reason,
                            order_ref: order_ref.0,
                        });
                    }
                    Err(err) => {
                        report.actions_failed += 1;
                        self.record(&AuditEvent::DispatchFailed {
                            ts: now,
                            instrument: action.instrument.clone(),
                            kind: action.kind,
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        // 5. rate-denied entries from earlier cycles. Once the session stops
        // admitting new exposure the backlog is abandoned, not dispatched.
        if phase.entries_allowed() {
            for (signal, outcome) in self.dispatcher.drain_queue(now) {
                self.settle_entry(signal, outcome, now, &mut report);
            }
        } else {
            for signal in self.dispatcher.clear_queue() {
                tracing::info!(
                    instrument = %signal.instrument,
                    strategy = %signal.strategy,
                    "queued entry abandoned at session close"
                );
                self.release_unopened(&signal.instrument);
            }
        }
        for signal in self.dispatcher.take_overflow() {
            self.release_unopened(&signal.instrument);
        }

        // 6. fresh signals
        let signals = self.signal_source.collect(now);
        let gate_ok = self.gate.entries_allowed(now);
        let outcome = self.arbitrator.arbitrate(
            signals,
            regime.as_ref(),
            phase,
            gate_ok,
            &mut self.ledger,
            now,
        );
        report.approved = outcome.approved.len();
        report.rejected = outcome.rejected.len();
        for record in &outcome.records {
            self.record(&AuditEvent::SignalDecision(record.clone()));
        }
        for signal in outcome.approved {
            if self.book.contains(&signal.instrument) {
                tracing::info!(
                    instrument = %signal.instrument,
                    strategy = %signal.strategy,
                    "entry skipped, position already open"
                );
                continue;
            }
            let dispatched = self.dispatcher.dispatch_entry(signal.clone(), now);
            self.settle_entry(signal, dispatched, now, &mut report);
        }

        report
    }

    /// Mutate the book to reflect a confirmed management dispatch. A full or
    /// completing partial exit also releases ownership.
    fn apply_confirmed_action(&mut self, action: &ManagementAction, fill_price: f64) {
        use crate::lifecycle::BookChange;
        match action.kind {
            ActionKind::FullExit => {
                self.book.close(&action.instrument);
                self.ledger.release(&action.instrument);
            }
            ActionKind::PartialExit => {
                if self.book.reduce(&action.instrument, action.quantity) == Some(BookChange::Closed)
                {
                    self.ledger.release(&action.instrument);
                }
            }
            ActionKind::Scale => {
                self.book
                    .scale_up(&action.instrument, action.quantity, fill_price);
            }
            // the stop already moved inside evaluate(); the dispatch merely
            // mirrored it to the broker
            ActionKind::AdjustStop => {}
        }
    }

    /// Account for an entry dispatch outcome: open the position on
    /// confirmation, give the ownership claim back on failure.
    fn settle_entry(
        &mut self,
        signal: Signal,
        outcome: EntryDispatch,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        match outcome {
            EntryDispatch::Placed(order_ref) => {
                report.entries_placed += 1;
                let qty = signal.quantity;
                let instrument = signal.instrument.clone();
                self.book.open_from_signal(&signal, &self.cfg, now);
                self.record(&AuditEvent::EntryOpened {
                    ts: now,
                    instrument,
                    qty,
                    order_ref: order_ref.0,
                });
            }
            EntryDispatch::Queued => {
                // ownership stays reserved while the entry waits its turn
            }
            EntryDispatch::Expired | EntryDispatch::Failed(_) => {
                self.release_unopened(&signal.instrument);
            }
        }
    }

    /// Release an ownership claim that never turned into a position.
    fn release_unopened(&mut self, instrument: &InstrumentId) {
        if !self.book.contains(instrument) {
            self.ledger.release(instrument);
        }
    }

    fn record(&mut self, event: &AuditEvent) {
        if let Some(log) = self.audit.as_mut() {
            if let Err(err) = log.append(event) {
                tracing::warn!(error = %err, "audit log write failed");
            }
        }
    }
}
