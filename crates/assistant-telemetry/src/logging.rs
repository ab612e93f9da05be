//! Structured log helpers.
//!
//! Every line carries a `component` field naming the engine part that
//! produced it (`sync_queue`, `sink_coordinator`, `handover`, `runtime`), so
//! JSON output can be filtered without parsing messages.

/// Log with a `component` field.
///
/// ```rust,ignore
/// log_event!(info, "runtime", "Actor started", queue = capacity);
/// ```
#[macro_export]
macro_rules! log_event {
    (debug, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(component = $component, $($($field)*,)? $msg)
    };
    (info, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(component = $component, $($($field)*,)? $msg)
    };
    (warn, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(component = $component, $($($field)*,)? $msg)
    };
    (error, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(component = $component, $($($field)*,)? $msg)
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_log_event_expands() {
        let depth = 3;
        crate::log_event!(info, "runtime", "queue drained");
        crate::log_event!(warn, "runtime", "queue backlog", depth = depth);
        crate::log_event!(debug, "runtime", "tick", depth = depth, drained = true);
    }
}
