//! # Artha Engine
//!
//! Signal arbitration and position lifecycle engine for intraday trading.
//!
//! Sits between strategy signal generation and order execution: arbitrates
//! conflicting proposals against shared ownership state, enforces the global
//! trade-rate ceiling, runs every open position through stop/target/tier/
//! closure-phase rules each cycle, and reconciles the internal book against
//! the broker, which is the actual source of truth.
//!
//! ## Architecture
//!
//! ```text
//! strategies ──signals──▶ Arbitrator ──approved──▶ Dispatcher ──▶ broker
//!                            │  ▲                      ▲
//!                       OwnershipLedger           RateGovernor
//!
//! broker ──holdings──▶ Reconciler ──▶ PositionBook ──▶ LifecycleManager
//!                                          ▲                │ actions
//!                                   ClosureController       ▼
//!                                          │            Dispatcher (governor bypassed)
//! ```
//!
//! The `Engine` driver owns all mutable state and runs the components in a
//! strict per-cycle order; see `engine.rs`.

pub mod arbiter;
pub mod audit;
pub mod closure;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod governor;
pub mod lifecycle;
pub mod ownership;
pub mod priority;
pub mod reconcile;

pub use arbiter::{ArbitrationOutcome, Arbitrator, DecisionRecord};
pub use audit::{AuditEvent, AuditLog};
pub use closure::ClosureController;
pub use config::{ConfigError, EngineConfig, ProfitTier};
pub use dispatch::{
    BrokerClient, BrokerError, Dispatcher, EntryDispatch, OrderKind, OrderRef, OrderRequest,
};
pub use engine::{
    AdmissionGate, AllowAll, CycleReport, Engine, EngineError, PriceSource, RegimeSource,
    SignalSource,
};
pub use governor::RateGovernor;
pub use lifecycle::{BookChange, LifecycleManager, PositionBook, TickSnapshot};
pub use ownership::{OwnershipLedger, OwnershipRecord};
pub use priority::PriorityMatrix;
pub use reconcile::{ReconcileReport, Reconciler};
