//! Metrics for the validation engine.
//!
//! Engine events (files discovered, routed and failed, audit writes, runs)
//! implement `sluice_core`'s `InternalEvent` and are emitted with
//! `sluice_core::emit!`.

pub mod events;

pub use events::*;
