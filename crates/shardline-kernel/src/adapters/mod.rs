//! # Adapters Layer
//!
//! Implementations of the outbound ports.

mod memory_data_source;

pub use memory_data_source::{
    ExecutedUnit, InMemoryDataSources, MemoryConnection, MemoryQueryResult,
};
