//! Structured logging helpers.
//!
//! Every consensus log line carries the same round coordinates so that a
//! single validator's view of a round can be grepped out of mixed output.

/// Log with a fixed `subsystem` field.
#[macro_export]
macro_rules! log_event {
    (info, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(subsystem = $subsystem, $($($field)*,)? $msg)
    };
    (warn, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(subsystem = $subsystem, $($($field)*,)? $msg)
    };
    (error, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(subsystem = $subsystem, $($($field)*,)? $msg)
    };
    (debug, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(subsystem = $subsystem, $($($field)*,)? $msg)
    };
}

/// Log a round-scoped event with `height`, `view` and `idx` fields.
#[macro_export]
macro_rules! log_round_event {
    ($level:ident, $msg:expr, $height:expr, $view:expr, $idx:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            height = $height,
            view = $view,
            idx = $idx,
            $($($field)*,)?
            $msg
        )
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_expand_without_subscriber() {
        crate::log_event!(info, "pbft", "hello", height = 1u64);
        crate::log_round_event!(debug, "round", 1u64, 0u64, 2u64, hash = "abcd");
    }
}
