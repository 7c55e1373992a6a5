//! Application layer: the reconciliation engine and the plan query surface.
//!
//! Both depend only on the ports in [`crate::domain::ports`]; stores, the
//! gateway adapter and the event publisher are injected at construction.

pub mod engine;
pub mod queries;
