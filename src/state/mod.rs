//! Per-project local state.
//!
//! This module provides the key-value store providers use to remember
//! configuration choices between prepare runs, and the run state of
//! services a provider started.

pub mod local_state;
pub mod run_state;

pub use local_state::LocalStateFile;
pub use run_state::ServiceRunState;
