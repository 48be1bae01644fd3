//! Strategy module: position sizing and execution
//!
//! Turns a persisted trade strategy plus one participant's risk into an ordered
//! sequence of venue orders.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    STARTUP                                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  StrategyRegistry::with_defaults()                          │
//! │    - One executor per ExecutionStrategyKind                 │
//! │    - Immutable afterwards, shared by Arc                    │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PER PARTICIPANT                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  validate request                                           │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  credentials + balance ──► rung count ──► size_positions    │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  guard rails (risk appetite, margin)                        │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  stop-loss ─► entries ─► take-profits, one at a time        │
//! │    (stop at the first failure)                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`size_positions`]: Risk-weighted price ladder
//! - [`StrategyExecutor`]: Trait every execution algorithm implements
//! - [`DcaExecutor`]: Laddered entries, first rung at market or all limits
//! - [`DmaExecutor`]: Single limit or market entry
//! - [`StrategyRegistry`]: Kind to executor lookup
//! - [`ExecutionLimits`]: Rung tiers and guard rails

mod dca;
mod dma;
mod limits;
mod orders;
mod registry;
mod sizer;
mod traits;

#[cfg(test)]
mod test_support;

pub use dca::DcaExecutor;
pub use dma::DmaExecutor;
pub use limits::ExecutionLimits;
pub use registry::{StrategyRegistry, StrategyRegistryBuilder};
pub use sizer::size_positions;
pub use traits::{ExecutionContext, ExecutionRequest, SharedExecutor, StrategyExecutor};
