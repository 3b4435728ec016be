//! # Ports
//!
//! Inbound API of the kernel and the outbound data-source capability.

pub mod inbound;
pub mod outbound;

pub use inbound::ShardingKernelApi;
pub use outbound::{DataSourceExecutor, QueryResult, UnitOutput};
