//! # Sharding Kernel Service
//!
//! Runs one statement through route, rewrite, execute and merge.

use crate::config::KernelConfig;
use crate::domain::{KernelError, ParsedStatement, RouteKind, ShardingRule, Value};
use crate::execute::{CancelSignal, ExecutionCoordinator};
use crate::merge::{MergedResult, ResultMerger};
use crate::ports::{DataSourceExecutor, ShardingKernelApi};
use crate::rewrite::{RewriteEngine, RewriteResult};
use crate::route::RoutingEngine;
use async_trait::async_trait;
use shardline_telemetry::metrics::ROUTES;
use std::sync::Arc;
use tracing::{info, instrument};

/// The sharding kernel.
///
/// The rule is shared read-only across statements; everything a statement
/// produces lives only for that statement's call.
pub struct ShardingKernel<E: DataSourceExecutor> {
    router: RoutingEngine,
    rewriter: RewriteEngine,
    coordinator: ExecutionCoordinator<E>,
    merger: ResultMerger,
}

impl<E: DataSourceExecutor + 'static> ShardingKernel<E> {
    /// Create a kernel.
    pub fn new(rule: Arc<ShardingRule>, executor: Arc<E>, config: KernelConfig) -> Self {
        Self {
            router: RoutingEngine::new(rule),
            rewriter: RewriteEngine::new(config.sql_show),
            coordinator: ExecutionCoordinator::new(executor, config.executor),
            merger: ResultMerger::new(config.merge),
        }
    }

    /// The sharding rule.
    pub fn rule(&self) -> &ShardingRule {
        self.router.rule()
    }

    /// The data-source executor.
    pub fn executor(&self) -> &Arc<E> {
        self.coordinator.executor()
    }

    fn prepare(
        &self,
        statement: &ParsedStatement,
        parameters: &[Value],
    ) -> Result<(RouteKind, RewriteResult), KernelError> {
        let route = self.router.route(statement, parameters)?;
        ROUTES.with_label_values(&[route.kind.label()]).inc();
        let rewritten = self.rewriter.rewrite(statement, parameters, &route)?;
        Ok((route.kind, rewritten))
    }
}

#[async_trait]
impl<E: DataSourceExecutor + 'static> ShardingKernelApi for ShardingKernel<E> {
    #[instrument(skip_all, fields(kind = statement.statement.kind()))]
    async fn execute_query(
        &self,
        statement: &ParsedStatement,
        parameters: &[Value],
        cancel: &CancelSignal,
    ) -> Result<Box<dyn MergedResult>, KernelError> {
        let (kind, rewritten) = self.prepare(statement, parameters)?;
        let units = rewritten.units.len();
        let results = self.coordinator.execute(rewritten.units, false, cancel).await?;
        let merged = self.merger.merge_query(results, &rewritten.shape)?;
        info!(
            route = kind.label(),
            units,
            merge = merged.mode().label(),
            "Query executed"
        );
        Ok(Box::new(merged))
    }

    #[instrument(skip_all, fields(kind = statement.statement.kind()))]
    async fn execute_update(
        &self,
        statement: &ParsedStatement,
        parameters: &[Value],
        cancel: &CancelSignal,
    ) -> Result<u64, KernelError> {
        let (kind, rewritten) = self.prepare(statement, parameters)?;
        let units = rewritten.units.len();
        let results = self.coordinator.execute(rewritten.units, true, cancel).await?;
        let affected = self.merger.merge_update(results)?;
        info!(route = kind.label(), units, affected, "Statement executed");
        Ok(affected)
    }
}
