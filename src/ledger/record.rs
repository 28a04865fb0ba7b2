use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

use super::CREATE_BATCH;

/// Record as stored in ledger world state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub id: String,
    pub batch_id: String,
    pub actor_id: String,
    pub step: String,
    pub product_name: String,
    pub product_category: String,
    pub timestamp: String,
    pub parent_batches: Vec<String>,
    pub attachment_refs: Vec<String>,
}

/// Positional arguments of a `CreateBatch` submit.
///
/// `parent_batches` and `attachment_refs` travel as JSON array text.
#[derive(Debug, Clone, Copy)]
pub struct CreateBatch<'a> {
    pub id: &'a str,
    pub batch_id: &'a str,
    pub actor_id: &'a str,
    pub step: &'a str,
    pub product_name: &'a str,
    pub product_category: &'a str,
    pub timestamp: &'a str,
    pub parent_batches_json: &'a str,
    pub attachment_refs_json: &'a str,
}

pub const CREATE_BATCH_ARITY: usize = 9;

impl<'a> CreateBatch<'a> {
    pub fn to_args(&self) -> [&'a str; CREATE_BATCH_ARITY] {
        [
            self.id,
            self.batch_id,
            self.actor_id,
            self.step,
            self.product_name,
            self.product_category,
            self.timestamp,
            self.parent_batches_json,
            self.attachment_refs_json,
        ]
    }

    pub fn from_args(args: &[&'a str]) -> Result<Self, LedgerError> {
        match args {
            &[id, batch_id, actor_id, step, product_name, product_category, timestamp, parents, refs] => Ok(Self {
                id,
                batch_id,
                actor_id,
                step,
                product_name,
                product_category,
                timestamp,
                parent_batches_json: parents,
                attachment_refs_json: refs,
            }),
            _ => Err(rejected(format!(
                "expected {CREATE_BATCH_ARITY} arguments, got {}",
                args.len()
            ))),
        }
    }

    /// Decode the JSON list arguments into a storable record.
    pub fn into_record(self) -> Result<BatchRecord, LedgerError> {
        Ok(BatchRecord {
            id: self.id.to_string(),
            batch_id: self.batch_id.to_string(),
            actor_id: self.actor_id.to_string(),
            step: self.step.to_string(),
            product_name: self.product_name.to_string(),
            product_category: self.product_category.to_string(),
            timestamp: self.timestamp.to_string(),
            parent_batches: parse_list(self.parent_batches_json, "parent batches")?,
            attachment_refs: parse_list(self.attachment_refs_json, "attachment refs")?,
        })
    }
}

fn parse_list(json: &str, what: &str) -> Result<Vec<String>, LedgerError> {
    if json.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(json).map_err(|e| rejected(format!("failed to unmarshal {what}: {e}")))
}

fn rejected(reason: String) -> LedgerError {
    LedgerError::Rejected {
        operation: CREATE_BATCH.to_string(),
        reason,
    }
}
