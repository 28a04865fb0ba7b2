//! Reduction of invocation outcomes into batch statistics.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::outcome::{FailureKind, InvocationFailure, InvocationOutcome, OperationKind};

/// Batch average in milliseconds, or unavailable when anything failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AverageMillis {
    Available(f64),
    Unavailable,
}

impl AverageMillis {
    pub fn value(&self) -> Option<f64> {
        match self {
            AverageMillis::Available(ms) => Some(*ms),
            AverageMillis::Unavailable => None,
        }
    }
}

impl fmt::Display for AverageMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AverageMillis::Available(ms) => write!(f, "{ms:.2}"),
            AverageMillis::Unavailable => f.write_str("unavailable"),
        }
    }
}

impl Serialize for AverageMillis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AverageMillis::Available(ms) => serializer.serialize_f64(*ms),
            AverageMillis::Unavailable => serializer.serialize_str("unavailable"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub operation_kind: OperationKind,
    pub outcomes: Vec<InvocationOutcome>,
    pub average_duration_millis: AverageMillis,
    pub succeeded: bool,
    pub status: String,
}

impl BatchResult {
    /// A batch that never issued an invocation because its input could not be
    /// prepared. Recorded as a single failed slot carrying `message`.
    pub fn aborted(operation_kind: OperationKind, message: impl Into<String>) -> Self {
        let failure = InvocationFailure::new(FailureKind::Preparation, message);
        aggregate(operation_kind, vec![InvocationOutcome::failure(0, failure)])
    }

    pub fn first_failure(&self) -> Option<&InvocationFailure> {
        self.outcomes.iter().find_map(InvocationOutcome::error)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    pub fn payload_too_large(&self) -> bool {
        self.outcomes
            .iter()
            .filter_map(InvocationOutcome::error)
            .any(InvocationFailure::is_payload_too_large)
    }
}

/// Average over `outcomes`, all-or-nothing: a single failure makes the
/// average unavailable.
pub fn average_millis(outcomes: &[InvocationOutcome]) -> AverageMillis {
    if outcomes.is_empty() || outcomes.iter().any(|o| !o.is_success()) {
        return AverageMillis::Unavailable;
    }
    let total_ns: u128 = outcomes
        .iter()
        .filter_map(InvocationOutcome::duration_nanos)
        .map(u128::from)
        .sum();
    let ms = (total_ns as f64) / (outcomes.len() as f64) / 1e6;
    AverageMillis::Available((ms * 100.0).round() / 100.0)
}

pub fn aggregate(operation_kind: OperationKind, outcomes: Vec<InvocationOutcome>) -> BatchResult {
    let succeeded = outcomes.iter().all(InvocationOutcome::is_success);
    let average_duration_millis = average_millis(&outcomes);
    let status = describe(succeeded, &outcomes);

    BatchResult {
        operation_kind,
        outcomes,
        average_duration_millis,
        succeeded,
        status,
    }
}

fn describe(succeeded: bool, outcomes: &[InvocationOutcome]) -> String {
    if succeeded {
        return format!("ok ({} invocations)", outcomes.len());
    }
    let failed: Vec<&InvocationFailure> = outcomes.iter().filter_map(InvocationOutcome::error).collect();
    match failed.first() {
        Some(first) if first.kind == FailureKind::Preparation => format!("N/A ({})", first.message),
        Some(_) if failed.iter().any(|f| f.is_payload_too_large()) => {
            "N/A (payload too large for transaction)".to_string()
        }
        Some(first) => format!(
            "N/A ({} of {} failed: {})",
            failed.len(),
            outcomes.len(),
            first.message
        ),
        None => "N/A".to_string(),
    }
}
