//! # Execution Coordinator
//!
//! Runs execution units against their data sources.
//!
//! - Units sharing a data source run sequentially on one connection.
//! - Data sources run concurrently, bounded by `max_parallelism`.
//! - Each unit is bounded by `unit_timeout_ms`.
//! - Results are returned indexed by unit, whatever the completion order.
//! - Dropping the `execute` future aborts its in-flight tasks.
//!
//! In atomic mode the first failure cancels every sibling and the statement
//! fails with the lowest-index failure.

use super::cancel::{CancelHandle, CancelSignal};
use crate::config::ExecutorConfig;
use crate::domain::{DataSourceError, ExecutionError, ExecutionUnit, ExecutionUnitError};
use crate::ports::{DataSourceExecutor, UnitOutput};
use shardline_telemetry::metrics::{UNITS_EXECUTED, UNIT_DURATION, UNIT_FAILURES};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Outcome of one unit.
pub type UnitResult = Result<UnitOutput, ExecutionUnitError>;

enum Outcome {
    Done(UnitOutput),
    Failed(DataSourceError),
    TimedOut,
    Cancelled,
}

/// Runs statements' units through a `DataSourceExecutor`.
pub struct ExecutionCoordinator<E: DataSourceExecutor> {
    executor: Arc<E>,
    config: ExecutorConfig,
    permits: Arc<Semaphore>,
}

impl<E: DataSourceExecutor + 'static> ExecutionCoordinator<E> {
    /// Create a coordinator.
    pub fn new(executor: Arc<E>, config: ExecutorConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_parallelism.max(1)));
        Self {
            executor,
            config,
            permits,
        }
    }

    /// The underlying executor.
    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    /// Execute every unit.
    ///
    /// Returns one result per unit, at the unit's index. Fails as a whole
    /// when the caller cancels, or when `atomic` is set and any unit fails.
    pub async fn execute(
        &self,
        units: Vec<ExecutionUnit>,
        atomic: bool,
        cancel: &CancelSignal,
    ) -> Result<Vec<UnitResult>, ExecutionError> {
        let unit_count = units.len();
        let (abort, abort_signal) = CancelHandle::new();

        let mut groups: Vec<(String, Vec<ExecutionUnit>)> = Vec::new();
        for unit in units {
            match groups.iter_mut().find(|(ds, _)| ds == unit.data_source()) {
                Some((_, group)) => group.push(unit),
                None => groups.push((unit.data_source().to_string(), vec![unit])),
            }
        }
        debug!(units = unit_count, data_sources = groups.len(), atomic, "Executing units");

        let mut handles = Vec::with_capacity(groups.len());
        let mut group_indices = Vec::with_capacity(groups.len());
        for (data_source, units) in groups {
            group_indices.push(units.iter().map(|u| u.index).collect::<Vec<_>>());
            let task = GroupTask {
                executor: Arc::clone(&self.executor),
                permits: Arc::clone(&self.permits),
                data_source,
                units,
                atomic,
                timeout_ms: self.config.unit_timeout_ms,
                cancel: cancel.clone(),
                abort: abort.clone(),
                abort_signal: abort_signal.clone(),
            };
            handles.push(tokio::spawn(task.run()));
        }

        let _tasks = AbortOnDrop(handles.iter().map(|h| h.abort_handle()).collect());
        let mut slots: Vec<Option<UnitResult>> = (0..unit_count).map(|_| None).collect();
        let joined = futures::future::join_all(handles).await;
        for (joined, indices) in joined.into_iter().zip(group_indices) {
            match joined {
                Ok(results) => {
                    for (index, result) in results {
                        if let Some(slot) = slots.get_mut(index) {
                            *slot = Some(result);
                        }
                    }
                }
                Err(e) => {
                    for index in indices {
                        if let Some(slot) = slots.get_mut(index) {
                            *slot = Some(Err(ExecutionUnitError::TaskFailed {
                                unit: index,
                                reason: e.to_string(),
                            }));
                        }
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            warn!(units = unit_count, "Statement cancelled, discarding unit results");
            return Err(ExecutionError::Cancelled);
        }

        let results: Vec<UnitResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    Err(ExecutionUnitError::TaskFailed {
                        unit: index,
                        reason: "unit produced no result".to_string(),
                    })
                })
            })
            .collect();

        if atomic {
            if let Some(failure) = primary_failure(&results) {
                warn!(unit = failure.unit(), error = %failure, "Atomic statement failed");
                return Err(ExecutionError::AtomicFailure(failure));
            }
        }
        Ok(results)
    }
}

/// Aborts spawned group tasks when `execute` is dropped before they finish.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// Lowest-index failure that is not a knock-on cancellation, else the
/// lowest-index failure.
fn primary_failure(results: &[UnitResult]) -> Option<ExecutionUnitError> {
    let errors = || results.iter().filter_map(|r| r.as_ref().err());
    errors()
        .find(|e| !matches!(e, ExecutionUnitError::Cancelled { .. }))
        .or_else(|| errors().next())
        .cloned()
}

/// All units of one data source.
struct GroupTask<E: DataSourceExecutor> {
    executor: Arc<E>,
    permits: Arc<Semaphore>,
    data_source: String,
    units: Vec<ExecutionUnit>,
    atomic: bool,
    timeout_ms: u64,
    cancel: CancelSignal,
    abort: CancelHandle,
    abort_signal: CancelSignal,
}

impl<E: DataSourceExecutor + 'static> GroupTask<E> {
    fn cancelled(&self, unit: usize) -> ExecutionUnitError {
        ExecutionUnitError::Cancelled {
            unit,
            data_source: self.data_source.clone(),
        }
    }

    fn stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.abort_signal.is_cancelled()
    }

    fn fail(&self, error: &ExecutionUnitError) {
        let reason = match error {
            ExecutionUnitError::DataSource { .. } => "data_source",
            ExecutionUnitError::Timeout { .. } => "timeout",
            ExecutionUnitError::Cancelled { .. } => "cancelled",
            ExecutionUnitError::TaskFailed { .. } => "task",
        };
        UNIT_FAILURES.with_label_values(&[reason]).inc();
        if !matches!(error, ExecutionUnitError::Cancelled { .. }) {
            warn!(
                unit = error.unit(),
                data_source = %self.data_source,
                error = %error,
                "Execution unit failed"
            );
        }
        if self.atomic {
            self.abort.cancel();
        }
    }

    async fn run(mut self) -> Vec<(usize, UnitResult)> {
        let units = std::mem::take(&mut self.units);

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            _ = self.abort_signal.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            return units
                .iter()
                .map(|u| (u.index, Err(self.cancelled(u.index))))
                .collect();
        };

        let acquired = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            _ = self.abort_signal.cancelled() => None,
            connection = self.executor.acquire(&self.data_source) => Some(connection),
        };
        let mut connection = match acquired {
            None => {
                return units
                    .iter()
                    .map(|u| (u.index, Err(self.cancelled(u.index))))
                    .collect();
            }
            Some(Err(source)) => {
                let results: Vec<(usize, UnitResult)> = units
                    .iter()
                    .map(|u| {
                        (
                            u.index,
                            Err(ExecutionUnitError::DataSource {
                                unit: u.index,
                                data_source: self.data_source.clone(),
                                source: source.clone(),
                            }),
                        )
                    })
                    .collect();
                if let Some((_, Err(error))) = results.first() {
                    self.fail(error);
                }
                return results;
            }
            Some(Ok(connection)) => connection,
        };

        let timeout = Duration::from_millis(self.timeout_ms);
        let mut results = Vec::with_capacity(units.len());
        for unit in &units {
            if self.stopped() {
                results.push((unit.index, Err(self.cancelled(unit.index))));
                continue;
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Outcome::Cancelled,
                _ = self.abort_signal.cancelled() => Outcome::Cancelled,
                executed = tokio::time::timeout(timeout, self.executor.execute(&mut connection, unit)) => {
                    match executed {
                        Ok(Ok(output)) => Outcome::Done(output),
                        Ok(Err(source)) => Outcome::Failed(source),
                        Err(_) => Outcome::TimedOut,
                    }
                }
            };

            let result = match outcome {
                Outcome::Done(output) => {
                    let elapsed = started.elapsed();
                    UNITS_EXECUTED.inc();
                    UNIT_DURATION.observe(elapsed.as_secs_f64());
                    debug!(
                        unit = unit.index,
                        data_source = %self.data_source,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Execution unit finished"
                    );
                    Ok(output)
                }
                Outcome::Failed(source) => Err(ExecutionUnitError::DataSource {
                    unit: unit.index,
                    data_source: self.data_source.clone(),
                    source,
                }),
                Outcome::TimedOut => {
                    self.executor.cancel(unit).await;
                    Err(ExecutionUnitError::Timeout {
                        unit: unit.index,
                        data_source: self.data_source.clone(),
                        timeout_ms: self.timeout_ms,
                    })
                }
                Outcome::Cancelled => {
                    self.executor.cancel(unit).await;
                    Err(self.cancelled(unit.index))
                }
            };
            if let Err(error) = &result {
                self.fail(error);
            }
            results.push((unit.index, result));
        }

        self.executor.release(connection).await;
        results
    }
}
