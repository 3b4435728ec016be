//! # Application Layer
//!
//! Wires the pipeline stages behind the inbound port.

mod service;

pub use service::ShardingKernel;
