//! Paper broker.
//!
//! Fills every order instantly at the requested (or last) price and keeps a
//! holdings book, so the engine's reconciliation sees a broker that behaves
//! like one. Failures can be scripted per call for resilience tests, and
//! holdings can be injected or removed directly to simulate out-of-band
//! fills (orphans) and closures (phantoms).

use artha_engine::{BrokerClient, BrokerError, OrderKind, OrderRef, OrderRequest};
use artha_models::{BrokerPosition, Direction, InstrumentId};
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct BrokerState {
    holdings: Vec<BrokerPosition>,
    scripted_failures: VecDeque<BrokerError>,
    placed: Vec<OrderRequest>,
}

#[derive(Default)]
pub struct PaperBroker {
    state: Mutex<BrokerState>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next `place_order` call.
    pub fn push_failure(&self, err: BrokerError) {
        self.state
            .lock()
            .unwrap()
            .scripted_failures
            .push_back(err);
    }

    /// Replace the holdings outright (simulates out-of-band activity).
    pub fn set_positions(&self, holdings: Vec<BrokerPosition>) {
        self.state.lock().unwrap().holdings = holdings;
    }

    /// Every order placed so far, in order.
    pub fn placed(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().placed.clone()
    }

    fn fill(state: &mut BrokerState, request: &OrderRequest) {
        let price = match request.kind {
            OrderKind::Limit(p) => p,
            OrderKind::Market => state
                .holdings
                .iter()
                .find(|h| h.instrument == request.instrument)
                .map(|h| h.avg_price)
                .unwrap_or(0.0),
            // protective amendment, not a fill
            OrderKind::StopLoss(_) => return,
        };

        let existing = state
            .holdings
            .iter()
            .position(|h| h.instrument == request.instrument);
        match existing {
            None => state.holdings.push(BrokerPosition {
                instrument: request.instrument.clone(),
                direction: request.direction,
                quantity: request.quantity,
                avg_price: price,
            }),
            Some(i) => {
                let holding = &mut state.holdings[i];
                if holding.direction == request.direction {
                    // scale-in: grow and re-average
                    let old_notional = holding.avg_price * holding.quantity as f64;
                    holding.quantity += request.quantity;
                    holding.avg_price =
                        (old_notional + price * request.quantity as f64) / holding.quantity as f64;
                } else if request.quantity >= holding.quantity {
                    state.holdings.remove(i);
                } else {
                    holding.quantity -= request.quantity;
                }
            }
        }
    }
}

impl BrokerClient for PaperBroker {
    fn place_order(&self, request: &OrderRequest) -> Result<OrderRef, BrokerError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.scripted_failures.pop_front() {
            tracing::debug!(instrument = %request.instrument, error = %err, "scripted failure");
            return Err(err);
        }
        Self::fill(&mut state, request);
        state.placed.push(request.clone());
        Ok(OrderRef(format!("paper-{}", Uuid::new_v4())))
    }

    fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        Ok(self.state.lock().unwrap().holdings.clone())
    }
}

/// Convenience for tests: a long holding at `avg`.
pub fn long_holding(instrument: &str, quantity: u32, avg: f64) -> BrokerPosition {
    BrokerPosition {
        instrument: InstrumentId::new(instrument),
        direction: Direction::Long,
        quantity,
        avg_price: avg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(instrument: &str, qty: u32, price: f64) -> OrderRequest {
        OrderRequest::new(
            InstrumentId::new(instrument),
            Direction::Long,
            qty,
            OrderKind::Limit(price),
        )
    }

    #[test]
    fn test_fills_build_and_reduce_holdings() {
        let broker = PaperBroker::new();
        broker.place_order(&entry("SBIN", 10, 800.0)).unwrap();
        let held = broker.positions().unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].quantity, 10);

        // opposite direction reduces, then closes
        let reduce = OrderRequest::new(
            InstrumentId::new("SBIN"),
            Direction::Short,
            4,
            OrderKind::Market,
        );
        broker.place_order(&reduce).unwrap();
        assert_eq!(broker.positions().unwrap()[0].quantity, 6);
        let close = OrderRequest::new(
            InstrumentId::new("SBIN"),
            Direction::Short,
            6,
            OrderKind::Market,
        );
        broker.place_order(&close).unwrap();
        assert!(broker.positions().unwrap().is_empty());
    }

    #[test]
    fn test_scripted_failure_consumed_once() {
        let broker = PaperBroker::new();
        broker.push_failure(BrokerError::Timeout(5));
        assert!(broker.place_order(&entry("SBIN", 10, 800.0)).is_err());
        assert!(broker.place_order(&entry("SBIN", 10, 800.0)).is_ok());
    }

    #[test]
    fn test_stop_amendment_does_not_touch_holdings() {
        let broker = PaperBroker::new();
        broker.place_order(&entry("SBIN", 10, 800.0)).unwrap();
        let amend = OrderRequest::new(
            InstrumentId::new("SBIN"),
            Direction::Short,
            0,
            OrderKind::StopLoss(792.0),
        );
        broker.place_order(&amend).unwrap();
        assert_eq!(broker.positions().unwrap()[0].quantity, 10);
    }
}
