//! # Inbound Ports
//!
//! What callers of the kernel can do.

use crate::domain::{KernelError, ParsedStatement, Value};
use crate::execute::CancelSignal;
use crate::merge::MergedResult;
use async_trait::async_trait;

/// Sharding kernel API - inbound port.
///
/// Both operations run the full route, rewrite, execute and merge pipeline
/// for one statement. `cancel` aborts every in-flight unit.
#[async_trait]
pub trait ShardingKernelApi: Send + Sync {
    /// Run a SELECT and return its merged rows.
    async fn execute_query(
        &self,
        statement: &ParsedStatement,
        parameters: &[Value],
        cancel: &CancelSignal,
    ) -> Result<Box<dyn MergedResult>, KernelError>;

    /// Run an INSERT, UPDATE, DELETE or DDL statement and return the total
    /// affected row count. Any unit failure fails the statement.
    async fn execute_update(
        &self,
        statement: &ParsedStatement,
        parameters: &[Value],
        cancel: &CancelSignal,
    ) -> Result<u64, KernelError>;
}
