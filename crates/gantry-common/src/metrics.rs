//! Metrics registry for gantry observability
//!
//! OpenTelemetry instruments for:
//! - Entity reconciliation (count, duration, outcome per kind)
//! - Remote API calls (per kind, operation and result)
//! - Derived plugin bindings (created, deleted)

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for gantry metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("gantry"));

// ============================================================================
// Reconciliation
// ============================================================================

/// Counter of reconcile passes
///
/// Labels:
/// - `kind`: declared object kind
/// - `outcome`: converged, retry, fatal, error
pub static RECONCILES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("gantry_reconciles_total")
        .with_description("Total number of reconcile passes")
        .with_unit("{reconciles}")
        .build()
});

/// Histogram of reconcile duration
///
/// Labels:
/// - `kind`: declared object kind
/// - `outcome`: converged, retry, fatal, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("gantry_reconcile_duration_seconds")
        .with_description("Duration of reconcile passes in seconds")
        .with_unit("s")
        .build()
});

// ============================================================================
// Remote API
// ============================================================================

/// Counter of remote API calls
///
/// Labels:
/// - `kind`: remote entity kind
/// - `operation`: create, upsert, delete, list, get
/// - `result`: success, not_found, conflict, terminal, transient
pub static REMOTE_CALLS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("gantry_remote_calls_total")
        .with_description("Total number of remote API calls")
        .with_unit("{calls}")
        .build()
});

// ============================================================================
// Derived resources
// ============================================================================

/// Counter of derived plugin binding changes
///
/// Labels:
/// - `change`: created, deleted
pub static DERIVED_BINDINGS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("gantry_derived_bindings_total")
        .with_description("Total number of derived plugin bindings created or deleted")
        .with_unit("{bindings}")
        .build()
});

/// Outcome label of a reconcile pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged, requeued at the sync period
    Converged,
    /// Scheduled retry (dependency or transient)
    Retry,
    /// Terminal for this generation
    Fatal,
    /// Reconciler returned an error
    Error,
}

impl ReconcileOutcome {
    /// Label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::Retry => "retry",
            Self::Fatal => "fatal",
            Self::Error => "error",
        }
    }
}

/// Times one reconcile pass of one kind
pub struct ReconcileTimer {
    kind: &'static str,
    start: std::time::Instant,
}

impl ReconcileTimer {
    /// Start timing a reconcile
    pub fn start(kind: &'static str) -> Self {
        Self {
            kind,
            start: std::time::Instant::now(),
        }
    }

    /// Record the pass with its outcome
    pub fn finish(self, outcome: ReconcileOutcome) {
        let labels = [
            KeyValue::new("kind", self.kind),
            KeyValue::new("outcome", outcome.as_str()),
        ];
        RECONCILES.add(1, &labels);
        RECONCILE_DURATION.record(self.start.elapsed().as_secs_f64(), &labels);
    }
}

/// Record one remote API call
pub fn record_remote_call(kind: &'static str, operation: &'static str, result: &'static str) {
    REMOTE_CALLS.add(
        1,
        &[
            KeyValue::new("kind", kind),
            KeyValue::new("operation", operation),
            KeyValue::new("result", result),
        ],
    );
}

/// Record a derived binding creation or deletion
pub fn record_derived_binding(change: &'static str) {
    DERIVED_BINDINGS.add(1, &[KeyValue::new("change", change)]);
}
