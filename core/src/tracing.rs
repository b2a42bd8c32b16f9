//! Tracing utilities for statement, transaction and migration observability.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate.
//! With the feature off every macro expands to nothing. The `cfg` is evaluated in
//! the crate that invokes the macro, so each crate carries its own `tracing` feature.

/// Debug event for one executed statement: SQL text and bound parameter count.
///
/// ```ignore
/// quarry_trace_query!(&sql, params.len());
/// ```
#[macro_export]
macro_rules! quarry_trace_query {
    ($sql:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql = %$sql, params = $param_count, "quarry.query");
    };
}

/// Info event when a transaction begins, commits or rolls back. With an error
/// argument the event is emitted at warn level.
///
/// ```ignore
/// quarry_trace_tx!("begin");
/// quarry_trace_tx!("rollback_failed", err);
/// ```
#[macro_export]
macro_rules! quarry_trace_tx {
    ($event:literal) => {
        #[cfg(feature = "tracing")]
        tracing::info!(event = $event, "quarry.transaction");
    };
    ($event:literal, $error:expr) => {
        #[cfg(feature = "tracing")]
        tracing::warn!(event = $event, error = %$error, "quarry.transaction");
        #[cfg(not(feature = "tracing"))]
        let _ = &$error;
    };
}

/// Emit an info-level tracing event for one step of a migration plan.
///
/// ```ignore
/// quarry_trace_migration!("run", 1, 2);
/// ```
#[macro_export]
macro_rules! quarry_trace_migration {
    ($kind:expr, $from:expr, $to:expr) => {
        #[cfg(feature = "tracing")]
        tracing::info!(kind = %$kind, from = $from, to = $to, "quarry.migration");
    };
}
