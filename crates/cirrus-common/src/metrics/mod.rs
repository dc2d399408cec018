//! Metrics and observability infrastructure.
//!
//! - `server`: Prometheus recorder, HTTP endpoint and test initialization
//! - `emit!`: records an internal event through the `metrics` facade

mod server;

pub use server::{DEFAULT_METRICS_ADDR, MetricsController, init_global, init_test};

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Macro for emitting metric events.
///
/// Calls `InternalEvent::emit()` on the given event, which records the
/// corresponding metric through the `metrics` facade.
///
/// ```ignore
/// emit!(RowsLoaded { target: "aws_s3_buckets".into(), count: 1000 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::InternalEvent::emit($event)
    };
}
