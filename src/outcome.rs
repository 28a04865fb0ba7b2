//! Per-invocation outcomes and their classification.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Elapsed, LedgerError, StoreError};

/// Which operation a batch of invocations exercised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Ledger `submit` of a new record.
    Write,
    /// Ledger `query` of an existing record.
    Read,
    /// Content-store `store` of the payload bytes.
    Store,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Write => "write",
            OperationKind::Read => "read",
            OperationKind::Store => "store",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Informational failure class; never changes how a runner behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PayloadTooLarge,
    TimedOut,
    Connection,
    /// The payload could not be prepared, so nothing was invoked.
    Preparation,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl InvocationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_payload_too_large(&self) -> bool {
        self.kind == FailureKind::PayloadTooLarge
    }
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<LedgerError> for InvocationFailure {
    fn from(err: LedgerError) -> Self {
        let kind = match &err {
            LedgerError::PayloadTooLarge { .. } => FailureKind::PayloadTooLarge,
            LedgerError::Connection(_) => FailureKind::Connection,
            LedgerError::Rejected { .. } | LedgerError::UnknownOperation(_) => FailureKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<StoreError> for InvocationFailure {
    fn from(err: StoreError) -> Self {
        Self::new(FailureKind::Other, err.to_string())
    }
}

impl From<Elapsed> for InvocationFailure {
    fn from(err: Elapsed) -> Self {
        Self::new(FailureKind::TimedOut, err.to_string())
    }
}

/// Result of one timed invocation. Exactly one of `duration_nanos` and
/// `failure` is set; the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationOutcome {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_nanos: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<InvocationFailure>,
}

impl InvocationOutcome {
    pub fn success(index: usize, duration_nanos: u64) -> Self {
        Self {
            index,
            duration_nanos: Some(duration_nanos),
            failure: None,
        }
    }

    pub fn failure(index: usize, failure: InvocationFailure) -> Self {
        Self {
            index,
            duration_nanos: None,
            failure: Some(failure),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn duration_nanos(&self) -> Option<u64> {
        self.duration_nanos
    }

    pub fn error(&self) -> Option<&InvocationFailure> {
        self.failure.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.duration_nanos.is_some() && self.failure.is_none()
    }
}
