//! In-process ledger honouring the record contract.
//!
//! Transaction size limits and latency are modelled so direct and referenced
//! payloads can be compared without a network, but nothing is replicated or
//! persisted. Only the most recent record bodies are kept; older ids are
//! remembered so they still count as duplicates.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::LedgerError;

use super::record::CreateBatch;
use super::{LedgerClient, Receipt, CREATE_BATCH, READ_BATCH};

const MIB: u64 = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct SimulatedLedgerConfig {
    /// Largest transaction, in bytes, the transport will carry.
    pub max_message_bytes: usize,
    /// Fixed cost of every submit or query.
    pub base_latency: Duration,
    /// Additional cost per MiB of arguments or returned record.
    pub latency_per_mib: Duration,
    /// How many of the most recent record bodies stay queryable.
    pub retained_records: usize,
}

impl Default for SimulatedLedgerConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 100 * MIB as usize,
            base_latency: Duration::from_millis(20),
            latency_per_mib: Duration::from_millis(8),
            retained_records: 16,
        }
    }
}

#[derive(Default)]
struct LedgerState {
    committed: HashSet<String>,
    bodies: HashMap<String, Vec<u8>>,
    order: VecDeque<String>,
}

impl LedgerState {
    fn commit(&mut self, id: String, body: Vec<u8>, keep: usize) {
        self.committed.insert(id.clone());
        self.bodies.insert(id.clone(), body);
        self.order.push_back(id);
        while self.order.len() > keep {
            if let Some(old) = self.order.pop_front() {
                self.bodies.remove(&old);
            }
        }
    }
}

pub struct SimulatedLedger {
    config: SimulatedLedgerConfig,
    state: Mutex<LedgerState>,
    next_tx: AtomicU64,
}

impl SimulatedLedger {
    /// Validate `config` the way a gateway would validate a connection
    /// profile.
    pub fn connect(config: SimulatedLedgerConfig) -> Result<Self, LedgerError> {
        if config.max_message_bytes == 0 {
            return Err(LedgerError::Connection(
                "max message size must be greater than zero".to_string(),
            ));
        }
        if config.retained_records == 0 {
            return Err(LedgerError::Connection(
                "at least one record must be retained".to_string(),
            ));
        }
        Ok(Self {
            config,
            state: Mutex::new(LedgerState::default()),
            next_tx: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &SimulatedLedgerConfig {
        &self.config
    }

    /// Records committed since connecting, retained or not.
    pub fn record_count(&self) -> usize {
        self.lock().map(|s| s.committed.len()).unwrap_or(0)
    }

    /// Bytes of record bodies currently held for queries.
    pub fn retained_bytes(&self) -> usize {
        self.lock()
            .map(|s| s.bodies.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerState>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Connection("ledger state poisoned".to_string()))
    }

    fn check_size(&self, operation: &str, args: &[&str]) -> Result<usize, LedgerError> {
        let size = operation.len() + args.iter().map(|a| a.len()).sum::<usize>();
        if size > self.config.max_message_bytes {
            return Err(LedgerError::PayloadTooLarge {
                size,
                limit: self.config.max_message_bytes,
            });
        }
        Ok(size)
    }

    async fn simulate_latency(&self, bytes: usize) {
        let scaled = self.config.latency_per_mib.as_secs_f64() * (bytes as f64 / MIB as f64);
        tokio::time::sleep(self.config.base_latency + Duration::from_secs_f64(scaled)).await;
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    /// Arguments are parsed after the transport delay, so concurrent
    /// submits all yield before any of them does record work.
    async fn submit(&self, operation: &str, args: &[&str]) -> Result<Receipt, LedgerError> {
        let size = self.check_size(operation, args)?;
        if operation != CREATE_BATCH {
            return Err(LedgerError::UnknownOperation(operation.to_string()));
        }

        self.simulate_latency(size).await;

        let record = CreateBatch::from_args(args)?.into_record()?;
        let encoded = serde_json::to_vec(&record).map_err(|e| LedgerError::Rejected {
            operation: operation.to_string(),
            reason: e.to_string(),
        })?;

        let mut state = self.lock()?;
        if state.committed.contains(&record.id) {
            return Err(LedgerError::Rejected {
                operation: operation.to_string(),
                reason: format!("the batch {} already exists", record.id),
            });
        }
        state.commit(record.id.clone(), encoded, self.config.retained_records);
        drop(state);

        let tx = self.next_tx.fetch_add(1, Ordering::Relaxed);
        debug!(id = %record.id, size, tx, "committed record");
        Ok(Receipt {
            transaction_id: format!("tx-{tx:08}"),
        })
    }

    async fn query(&self, operation: &str, args: &[&str]) -> Result<Vec<u8>, LedgerError> {
        self.check_size(operation, args)?;
        if operation != READ_BATCH {
            return Err(LedgerError::UnknownOperation(operation.to_string()));
        }
        let id = match args {
            [id] => *id,
            _ => {
                return Err(LedgerError::Rejected {
                    operation: operation.to_string(),
                    reason: format!("expected 1 argument, got {}", args.len()),
                })
            }
        };

        let record = {
            let state = self.lock()?;
            match state.bodies.get(id) {
                Some(body) => body.clone(),
                None => {
                    let reason = if state.committed.contains(id) {
                        format!("the batch {id} is no longer retained")
                    } else {
                        format!("the batch {id} does not exist")
                    };
                    return Err(LedgerError::Rejected {
                        operation: operation.to_string(),
                        reason,
                    });
                }
            }
        };

        self.simulate_latency(record.len()).await;
        Ok(record)
    }
}
