//! Execution dispatcher.
//!
//! The single choke point between the engine and the broker, and the only
//! component permitted to perform blocking I/O. New-entry signals pass
//! through the rate governor; when denied they wait in a bounded FIFO
//! (oldest dropped on overflow) and are retried on later cycles until their
//! TTL lapses. Management actions bypass the governor entirely — a late
//! protective exit is worse than a momentary rate excess.
//!
//! Broker failures are classified transient/terminal. Transient failures are
//! retried in-call with doubling backoff up to a bounded attempt count. A
//! terminal failure on an exit action raises a critical alert; the position
//! stays in the book and the exit fires again next cycle.

use crate::config::DispatchConfig;
use crate::governor::RateGovernor;
use artha_models::{ActionKind, Direction, InstrumentId, ManagementAction, Signal};
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Broker boundary
// =============================================================================

/// Broker-assigned order reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRef(pub String);

impl std::fmt::Display for OrderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderKind {
    Market,
    Limit(f64),
    /// Protective stop amendment at the given trigger price.
    StopLoss(f64),
}

/// What the engine asks the broker to do.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub client_order_id: Uuid,
    pub instrument: InstrumentId,
    pub direction: Direction,
    pub quantity: u32,
    pub kind: OrderKind,
}

impl OrderRequest {
    pub fn new(
        instrument: InstrumentId,
        direction: Direction,
        quantity: u32,
        kind: OrderKind,
    ) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            instrument,
            direction,
            quantity,
            kind,
        }
    }
}

/// Broker failure taxonomy. `is_transient` drives the retry policy.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("broker call timed out after {0} s")]
    Timeout(u64),

    #[error("order rejected by exchange: {0}")]
    Rejected(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl BrokerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transport(_) | BrokerError::Timeout(_))
    }
}

/// The external order-execution collaborator. Implementations own the
/// per-call timeout (`DispatchConfig::broker_timeout_secs`) and surface it
/// as `BrokerError::Timeout`.
pub trait BrokerClient: Send + Sync {
    fn place_order(&self, request: &OrderRequest) -> Result<OrderRef, BrokerError>;

    /// Current holdings, for reconciliation.
    fn positions(&self) -> Result<Vec<artha_models::BrokerPosition>, BrokerError>;
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Outcome of a single entry dispatch attempt.
#[derive(Debug)]
pub enum EntryDispatch {
    Placed(OrderRef),
    /// Rate-denied; parked in the retry queue.
    Queued,
    /// TTL lapsed while waiting; discarded.
    Expired,
    Failed(BrokerError),
}

pub struct Dispatcher {
    broker: Arc<dyn BrokerClient>,
    governor: RateGovernor,
    queue: VecDeque<Signal>,
    /// Signals pushed out of the bounded queue, awaiting ownership release.
    overflow: Vec<Signal>,
    cfg: DispatchConfig,
    signal_ttl: Duration,
}

impl Dispatcher {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        governor: RateGovernor,
        cfg: DispatchConfig,
        signal_ttl: Duration,
    ) -> Self {
        Self {
            broker,
            governor,
            queue: VecDeque::with_capacity(cfg.queue_capacity),
            overflow: Vec::new(),
            cfg,
            signal_ttl,
        }
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Dispatch a freshly approved entry signal, subject to the governor.
    pub fn dispatch_entry(&mut self, signal: Signal, now: DateTime<Utc>) -> EntryDispatch {
        if signal.is_expired(now, self.signal_ttl) {
            return EntryDispatch::Expired;
        }
        if !self.governor.admit() {
            self.enqueue(signal);
            return EntryDispatch::Queued;
        }
        self.place_entry(signal)
    }

    /// Retry rate-denied entries from earlier cycles, oldest first, while the
    /// governor admits. Returns each signal's outcome.
    pub fn drain_queue(&mut self, now: DateTime<Utc>) -> Vec<(Signal, EntryDispatch)> {
        let mut results = Vec::new();
        loop {
            let expired = match self.queue.front() {
                None => break,
                Some(signal) => signal.is_expired(now, self.signal_ttl),
            };
            if !expired && !self.governor.admit() {
                break;
            }
            let Some(signal) = self.queue.pop_front() else {
                break;
            };
            if expired {
                tracing::info!(
                    instrument = %signal.instrument,
                    strategy = %signal.strategy,
                    "queued entry expired before dispatch"
                );
                results.push((signal, EntryDispatch::Expired));
            } else {
                let outcome = self.place_entry(signal.clone());
                results.push((signal, outcome));
            }
        }
        results
    }

    /// Dispatch a management action. Bypasses the governor. The caller
    /// supplies the managed position's direction so exits can be flipped
    /// into closing orders.
    pub fn dispatch_action(
        &self,
        action: &ManagementAction,
        position_direction: Direction,
    ) -> Result<OrderRef, BrokerError> {
        let request = match action.kind {
            ActionKind::FullExit | ActionKind::PartialExit => OrderRequest::new(
                action.instrument.clone(),
                position_direction.flip(),
                action.quantity,
                OrderKind::Market,
            ),
            ActionKind::Scale => OrderRequest::new(
                action.instrument.clone(),
                position_direction,
                action.quantity,
                OrderKind::Market,
            ),
            ActionKind::AdjustStop => {
                let stop = action.stop_price.ok_or_else(|| {
                    BrokerError::InvalidRequest("stop amendment without a price".to_string())
                })?;
                OrderRequest::new(
                    action.instrument.clone(),
                    position_direction.flip(),
                    action.quantity,
                    OrderKind::StopLoss(stop),
                )
            }
        };

        match self.place_with_retry(&request) {
            Ok(order_ref) => {
                tracing::info!(
                    instrument = %action.instrument,
                    kind = %action.kind,
                    reason = %action.reason,
                    qty = action.quantity,
                    order_ref = %order_ref,
                    "management action dispatched"
                );
                Ok(order_ref)
            }
            Err(err) => {
                if action.kind.is_exit() {
                    tracing::error!(
                        instrument = %action.instrument,
                        kind = %action.kind,
                        reason = %action.reason,
                        error = %err,
                        alert = "CRITICAL",
                        "exit dispatch failed; position integrity not guaranteed, retrying next cycle"
                    );
                } else {
                    tracing::warn!(
                        instrument = %action.instrument,
                        kind = %action.kind,
                        error = %err,
                        "management dispatch failed"
                    );
                }
                Err(err)
            }
        }
    }

    fn place_entry(&self, signal: Signal) -> EntryDispatch {
        let request = OrderRequest::new(
            signal.instrument.clone(),
            signal.direction,
            signal.quantity,
            OrderKind::Limit(signal.price),
        );
        match self.place_with_retry(&request) {
            Ok(order_ref) => {
                tracing::info!(
                    instrument = %signal.instrument,
                    strategy = %signal.strategy,
                    direction = %signal.direction,
                    qty = signal.quantity,
                    order_ref = %order_ref,
                    "entry dispatched"
                );
                EntryDispatch::Placed(order_ref)
            }
            Err(err) => {
                tracing::warn!(
                    instrument = %signal.instrument,
                    strategy = %signal.strategy,
                    error = %err,
                    "entry dispatch failed"
                );
                EntryDispatch::Failed(err)
            }
        }
    }

    /// Bounded retry with doubling backoff. Only transient errors retry.
    fn place_with_retry(&self, request: &OrderRequest) -> Result<OrderRef, BrokerError> {
        let mut attempt = 0;
        loop {
            match self.broker.place_order(request) {
                Ok(order_ref) => return Ok(order_ref),
                Err(err) if err.is_transient() && attempt + 1 < self.cfg.max_attempts => {
                    let backoff = self.cfg.backoff_base_ms << attempt;
                    tracing::warn!(
                        instrument = %request.instrument,
                        attempt = attempt + 1,
                        backoff_ms = backoff,
                        error = %err,
                        "transient broker failure, backing off"
                    );
                    std::thread::sleep(std::time::Duration::from_millis(backoff));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Abandon all queued entries (session no longer admits new exposure).
    /// Returns them so the caller can release their ownership claims.
    pub fn clear_queue(&mut self) -> Vec<Signal> {
        self.queue.drain(..).collect()
    }

    /// Signals dropped from the bounded queue since the last call. The
    /// caller releases their ownership claims.
    pub fn take_overflow(&mut self) -> Vec<Signal> {
        std::mem::take(&mut self.overflow)
    }

    fn enqueue(&mut self, signal: Signal) {
        if self.queue.len() >= self.cfg.queue_capacity {
            if let Some(dropped) = self.queue.pop_front() {
                tracing::warn!(
                    instrument = %dropped.instrument,
                    strategy = %dropped.strategy,
                    "retry queue full, oldest entry dropped"
                );
                self.overflow.push(dropped);
            }
        }
        self.queue.push_back(signal);
    }
}
