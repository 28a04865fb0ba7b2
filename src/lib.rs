use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod catalog;
pub mod error;
pub mod generate;
pub mod harness;
pub mod ledger;
pub mod outcome;
pub mod runner;
pub mod schema;
pub mod session;
pub mod store;
pub mod strategy;
pub mod timer;

/// Where payload bytes live relative to the ledger transaction.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Payload bytes embedded in the transaction as base64 text.
    #[default]
    Direct,
    /// Payload bytes in a content-addressed store; only the content id on the ledger.
    Reference,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Direct => "direct",
            StrategyKind::Reference => "reference",
        }
    }
}
