//! # Artha Models
//!
//! Shared data types for the Artha intraday engine.
//!
//! Pure types only: identifiers, signals, positions, management actions and
//! reason codes. No I/O, no clocks, no engine logic — every crate in the
//! workspace depends on this one and nothing here depends on the rest.

pub mod action;
pub mod ids;
pub mod position;
pub mod signal;

pub use action::{ActionKind, ActionReason, ClosurePhase, ManagementAction, RejectReason};
pub use ids::{Direction, InstrumentId, RegimeKind, StrategyId};
pub use position::{BrokerPosition, Position};
pub use signal::{MarketRegime, Signal};
