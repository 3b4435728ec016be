//! # Domain Errors
//!
//! Error taxonomy for the sharding pipeline. Each stage owns one enum;
//! `KernelError` is what callers of the kernel see.

use thiserror::Error;

/// Rule configuration errors, raised while building a `ShardingRule`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// An algorithm type name is not present in the registry.
    #[error("Unknown sharding algorithm type: {0}")]
    UnknownAlgorithmType(String),

    /// A strategy references an algorithm definition that does not exist.
    #[error("Unknown algorithm reference '{0}'")]
    UnknownAlgorithm(String),

    /// A key generator type name is not present in the registry.
    #[error("Unknown key generator type: {0}")]
    UnknownKeyGenerator(String),

    /// A required algorithm property is missing or malformed.
    #[error("Invalid property '{property}' for {algorithm}: {reason}")]
    InvalidProperty {
        /// Algorithm type
        algorithm: String,
        /// Property key
        property: String,
        /// What is wrong
        reason: String,
    },

    /// An inline data-node expression could not be parsed.
    #[error("Invalid inline expression '{expression}': {reason}")]
    InvalidExpression {
        /// The expression text
        expression: String,
        /// What is wrong
        reason: String,
    },

    /// A binding group references tables whose partitioning differs.
    #[error("Binding tables {left} and {right} are not aligned: {reason}")]
    MisalignedBinding {
        /// First table
        left: String,
        /// Second table
        right: String,
        /// What differs
        reason: String,
    },

    /// A binding group or broadcast list names a table with no rule.
    #[error("Table '{0}' is referenced but has no table rule")]
    UnknownTable(String),

    /// A data node or default names a data source that is not configured.
    #[error("Data source '{data_source}' referenced by '{table}' is not configured")]
    UnknownDataSource {
        /// Referencing table (or `<default>`)
        table: String,
        /// Missing data source
        data_source: String,
    },

    /// A table rule resolves to no data nodes.
    #[error("Table '{0}' has no actual data nodes")]
    NoDataNodes(String),
}

/// Routing failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoutingError {
    /// The operator cannot be evaluated by the configured algorithm.
    #[error("Algorithm {algorithm} on {table}.{column} does not support {operator} conditions")]
    UnsupportedOperator {
        /// Logic table
        table: String,
        /// Sharding column
        column: String,
        /// Algorithm type
        algorithm: String,
        /// Operator description
        operator: String,
    },

    /// A sharding value has a type the algorithm cannot use.
    #[error("Algorithm {algorithm} cannot shard value {value} of column {column}")]
    IncompatibleValue {
        /// Algorithm type
        algorithm: String,
        /// Sharding column
        column: String,
        /// Rendered value
        value: String,
    },

    /// The resolved target set is empty; always a configuration problem.
    #[error("No data node resolved for table '{0}'")]
    EmptyRoute(String),

    /// A predicate references a parameter index that was not bound.
    #[error("Parameter {index} is not bound (got {bound} parameters)")]
    MissingParameter {
        /// Zero-based parameter index
        index: usize,
        /// Number of parameters bound
        bound: usize,
    },

    /// UPDATE/DELETE whose predicate cannot be narrowed to specific nodes.
    #[error("Cannot route {kind} on sharded table '{table}' without a sharding condition")]
    UnroutableMutation {
        /// Statement kind
        kind: String,
        /// Logic table
        table: String,
    },

    /// An INSERT row does not resolve to exactly one data node.
    #[error("Insert row {row} into '{table}' resolved to {resolved} data nodes")]
    AmbiguousInsertRow {
        /// Zero-based row index
        row: usize,
        /// Logic table
        table: String,
        /// Number of nodes it resolved to
        resolved: usize,
    },

    /// Unsharded tables need a default data source.
    #[error("Table '{0}' is not sharded and no default data source is configured")]
    NoDefaultDataSource(String),

    /// Key generation failed.
    #[error("Key generation failed for {table}.{column}: {reason}")]
    KeyGeneration {
        /// Logic table
        table: String,
        /// Key column
        column: String,
        /// Generator message
        reason: String,
    },
}

/// Key generator failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KeyGenerationError {
    /// The clock went backwards further than the generator tolerates.
    #[error("Clock moved backwards by {0}ms")]
    ClockBackwards(u64),
}

/// Token generation or rewrite failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RewriteError {
    /// Two tokens cover the same span of text.
    #[error("Overlapping SQL tokens at [{first_start}, {first_stop}) and [{second_start}, {second_stop})")]
    OverlappingTokens {
        /// Earlier token start
        first_start: usize,
        /// Earlier token stop
        first_stop: usize,
        /// Later token start
        second_start: usize,
        /// Later token stop
        second_stop: usize,
    },

    /// A token span lies outside of the SQL text.
    #[error("Token span [{start}, {stop}) outside SQL of length {len}")]
    SpanOutOfBounds {
        /// Span start
        start: usize,
        /// Span stop
        stop: usize,
        /// SQL length
        len: usize,
    },

    /// LIMIT/OFFSET resolved to something that is not a non-negative integer.
    #[error("Invalid pagination value: {0}")]
    InvalidPagination(String),

    /// A parameter referenced by the statement is not bound.
    #[error("Parameter {index} is not bound (got {bound} parameters)")]
    MissingParameter {
        /// Zero-based parameter index
        index: usize,
        /// Number of parameters bound
        bound: usize,
    },
}

/// Failure reported by the external data-source capability.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataSourceError {
    /// No connection could be acquired.
    #[error("Connection to '{data_source}' failed: {reason}")]
    Connection {
        /// Data source name
        data_source: String,
        /// Driver message
        reason: String,
    },

    /// The statement failed on the node.
    #[error("Statement failed: {0}")]
    Statement(String),

    /// Reading a row from the result stream failed.
    #[error("Result stream failed: {0}")]
    Stream(String),
}

/// Failure of a single execution unit.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionUnitError {
    /// The underlying node reported a failure.
    #[error("Unit {unit} on '{data_source}' failed: {source}")]
    DataSource {
        /// Unit index
        unit: usize,
        /// Data source name
        data_source: String,
        /// Underlying failure
        #[source]
        source: DataSourceError,
    },

    /// The unit exceeded its timeout.
    #[error("Unit {unit} on '{data_source}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Unit index
        unit: usize,
        /// Data source name
        data_source: String,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// The unit was cancelled before completing.
    #[error("Unit {unit} on '{data_source}' was cancelled")]
    Cancelled {
        /// Unit index
        unit: usize,
        /// Data source name
        data_source: String,
    },

    /// The task running the unit panicked or was aborted.
    #[error("Unit {unit} task failed: {reason}")]
    TaskFailed {
        /// Unit index
        unit: usize,
        /// Join error message
        reason: String,
    },
}

impl ExecutionUnitError {
    /// Index of the unit this error belongs to.
    pub fn unit(&self) -> usize {
        match self {
            Self::DataSource { unit, .. }
            | Self::Timeout { unit, .. }
            | Self::Cancelled { unit, .. }
            | Self::TaskFailed { unit, .. } => *unit,
        }
    }
}

/// Statement-level execution failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    /// A unit failed while the statement required all-or-nothing execution.
    #[error("Statement aborted: {0}")]
    AtomicFailure(#[source] ExecutionUnitError),

    /// The caller cancelled the statement.
    #[error("Statement cancelled")]
    Cancelled,
}

/// Result merge failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MergeError {
    /// A unit failed, so no complete result can be produced.
    #[error("Cannot merge: {0}")]
    UnitFailed(#[source] ExecutionUnitError),

    /// Reading from an underlying stream failed mid-merge.
    #[error("Stream of unit {unit} failed during merge: {source}")]
    Stream {
        /// Unit index
        unit: usize,
        /// Underlying failure
        #[source]
        source: DataSourceError,
    },

    /// Streams disagree on their column layout.
    #[error("Unit {unit} returned {got} columns, expected {expected}")]
    ColumnMismatch {
        /// Unit index
        unit: usize,
        /// Expected column count
        expected: usize,
        /// Actual column count
        got: usize,
    },

    /// An ORDER BY/GROUP BY/aggregation column is missing from the metadata.
    #[error("Column '{0}' not found in result metadata")]
    UnknownColumn(String),

    /// Units returned a mix of row streams and update counts.
    #[error("Units returned mixed result kinds")]
    MixedResults,

    /// Aggregation could not combine two values.
    #[error("Cannot aggregate {function} over {left} and {right}")]
    Aggregation {
        /// Aggregate function
        function: String,
        /// Left operand
        left: String,
        /// Right operand
        right: String,
    },

    /// `value()` was called without a current row.
    #[error("No current row")]
    NoCurrentRow,

    /// Column index out of range.
    #[error("Column index {index} out of range ({count} columns)")]
    ColumnOutOfRange {
        /// Requested index
        index: usize,
        /// Visible column count
        count: usize,
    },
}

/// Anything the kernel can fail with.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    /// Routing failed.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Rewrite failed.
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    /// Execution failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Merge failed.
    #[error(transparent)]
    Merge(#[from] MergeError),
}
