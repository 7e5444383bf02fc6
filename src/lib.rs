//! medvend — prescription fulfillment for a serial pill dispenser.
//!
//! Exposes the dispensing core for the CLI and for integration testing.
//! The hardware sits behind [`link::Link`]; the patient/inventory store
//! behind [`app::ports::PatientStore`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod ledger;
pub mod link;
pub mod model;
pub mod protocol;
