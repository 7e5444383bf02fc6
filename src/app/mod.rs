//! Application core — fulfillment logic with no direct I/O.
//!
//! The orchestrator, its per-medicine stage machine and the worker that
//! serializes access to a dispenser.  The store and event stream are reached
//! through the traits in [`ports`]; the dispenser through
//! [`Link`](crate::link::Link).

pub mod commands;
pub mod events;
pub mod orchestrator;
pub mod ports;
pub mod stage;
pub mod worker;
