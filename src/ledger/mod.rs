//! Ledger client seam.
//!
//! The benchmark only ever talks to a ledger through [`LedgerClient`]; the
//! in-process [`SimulatedLedger`] exists so the runner works without a
//! network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

pub mod record;
pub mod simulated;

pub use record::{BatchRecord, CreateBatch};
pub use simulated::{SimulatedLedger, SimulatedLedgerConfig};

/// Write operation exposed by the record contract.
pub const CREATE_BATCH: &str = "CreateBatch";
/// Point-query operation exposed by the record contract.
pub const READ_BATCH: &str = "ReadBatch";

/// Acknowledgement of a committed submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_id: String,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a transaction and wait for it to commit.
    async fn submit(&self, operation: &str, args: &[&str]) -> Result<Receipt, LedgerError>;

    /// Evaluate a read-only operation.
    async fn query(&self, operation: &str, args: &[&str]) -> Result<Vec<u8>, LedgerError>;
}
