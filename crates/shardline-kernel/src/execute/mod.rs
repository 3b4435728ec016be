//! # Execute
//!
//! Drives execution units through the data-source port.

pub mod cancel;
pub mod coordinator;

pub use cancel::{CancelHandle, CancelSignal};
pub use coordinator::{ExecutionCoordinator, UnitResult};
