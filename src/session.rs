//! Benchmark session: one write batch then one read batch per payload.
//!
//! Per payload the session moves through
//! `Pending -> WriteRunning -> {WriteFailed | WriteSucceeded -> ReadRunning ->
//! {ReadFailed | ReadSucceeded}}`. Reads only ever target a record from a
//! fully successful write batch. Nothing that happens to one payload stops
//! the session from moving on to the next.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::aggregate::{aggregate, BatchResult};
use crate::catalog::{PayloadCatalog, PayloadEntry};
use crate::error::SessionError;
use crate::harness::BenchConfig;
use crate::ledger::{CreateBatch, LedgerClient, CREATE_BATCH, READ_BATCH};
use crate::outcome::OperationKind;
use crate::runner::{ConcurrencyMode, InvocationRunner};
use crate::schema::{now_utc_millis, unix_millis};
use crate::strategy::{PrepareError, Prepared, StrategyAdapter};
use crate::StrategyKind;

const ACTOR_ID: &str = "BENCHMARK_ACTOR";
const STEP: &str = "BENCHMARK_STEP";
const PRODUCT_CATEGORY: &str = "BenchmarkCategory";
const NO_PARENTS: &str = "[]";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadState {
    Pending,
    WriteRunning,
    WriteFailed,
    WriteSucceeded,
    ReadRunning,
    ReadFailed,
    ReadSucceeded,
}

impl PayloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PayloadState::WriteFailed | PayloadState::ReadFailed | PayloadState::ReadSucceeded
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PayloadReport {
    pub file: String,
    pub size_label: String,
    pub size_bytes: u64,
    pub state: PayloadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_batch: Option<BatchResult>,
    pub write_batch: BatchResult,
    /// Absent unless `write_batch` succeeded.
    pub read_batch: Option<BatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_target: Option<String>,
}

/// Reports of every payload that could be resolved, in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    strategy: StrategyKind,
    invocations: usize,
    payloads: Vec<PayloadReport>,
}

impl SessionReport {
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn invocations(&self) -> usize {
        self.invocations
    }

    pub fn payloads(&self) -> &[PayloadReport] {
        &self.payloads
    }

    pub fn into_payloads(self) -> Vec<PayloadReport> {
        self.payloads
    }
}

pub struct BenchmarkSession {
    ledger: Arc<dyn LedgerClient>,
    strategy: Arc<dyn StrategyAdapter>,
    runner: InvocationRunner,
    invocations: usize,
    run_tag: String,
}

impl BenchmarkSession {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        strategy: Arc<dyn StrategyAdapter>,
        config: &BenchConfig,
    ) -> Result<Self, SessionError> {
        if config.invocations == 0 {
            return Err(SessionError::Config(
                "invocation count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            ledger,
            strategy,
            runner: InvocationRunner::new(config.timeout),
            invocations: config.invocations,
            run_tag: unix_millis().to_string(),
        })
    }

    /// Override the tag that keeps record ids unique across runs.
    pub fn with_run_tag(mut self, tag: impl Into<String>) -> Self {
        self.run_tag = tag.into();
        self
    }

    /// Id of write `index` for the payload at `ordinal` in the catalog.
    /// Labels alone repeat when discovered files share a size.
    pub fn record_id(&self, entry: &PayloadEntry, ordinal: usize, index: usize) -> String {
        format!(
            "{}-{}-{}-{ordinal}-write-{index}",
            self.strategy.kind().as_str(),
            entry.size_label(),
            self.run_tag
        )
    }

    /// Walk the catalog in order. Each entry's bytes are released once its
    /// payload has finished, so at most one payload is held at a time.
    pub async fn run(&self, catalog: &mut PayloadCatalog) -> SessionReport {
        let strategy = self.strategy.kind();
        info!(
            strategy = strategy.as_str(),
            payloads = catalog.len(),
            invocations = self.invocations,
            "starting benchmark session"
        );

        let mut payloads = Vec::with_capacity(catalog.len());
        for (ordinal, entry) in catalog.entries_mut().iter_mut().enumerate() {
            let bytes = match entry.load().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(file = entry.display_name(), "{e}. Skipping.");
                    continue;
                }
            };
            let report = self.run_payload(entry, ordinal, &bytes).await;
            drop(bytes);
            entry.release();
            info!(
                file = %report.file,
                state = ?report.state,
                write_avg_ms = %report.write_batch.average_duration_millis,
                read_avg_ms = %report
                    .read_batch
                    .as_ref()
                    .map(|b| b.average_duration_millis.to_string())
                    .unwrap_or_else(|| "skipped".to_string()),
                "payload finished"
            );
            payloads.push(report);
        }

        SessionReport {
            strategy,
            invocations: self.invocations,
            payloads,
        }
    }

    async fn run_payload(&self, entry: &PayloadEntry, ordinal: usize, bytes: &[u8]) -> PayloadReport {
        info!(file = entry.display_name(), size = entry.size_label(), "testing payload");
        let mut state = PayloadState::Pending;
        advance(&mut state, PayloadState::WriteRunning, entry);

        let (attachments, store_batch) = match self.strategy.prepare(bytes).await.and_then(attachment_refs) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(file = entry.display_name(), "skipping ledger transactions: {e}");
                let write_batch = BatchResult::aborted(OperationKind::Write, e.write_message());
                let store_batch = match e {
                    PrepareError::Store { batch } => Some(batch),
                    PrepareError::Encoding(_) => None,
                };
                advance(&mut state, PayloadState::WriteFailed, entry);
                return PayloadReport {
                    file: entry.display_name().to_string(),
                    size_label: entry.size_label().to_string(),
                    size_bytes: bytes.len() as u64,
                    state,
                    store_batch,
                    write_batch,
                    read_batch: None,
                    read_target: None,
                };
            }
        };

        let write_batch = self.write_batch(entry, ordinal, &attachments).await;
        drop(attachments);

        let (read_batch, read_target) = if write_batch.succeeded {
            advance(&mut state, PayloadState::WriteSucceeded, entry);
            let target = self.record_id(entry, ordinal, self.invocations - 1);
            advance(&mut state, PayloadState::ReadRunning, entry);
            let read_batch = self.read_batch(&target).await;
            let next = if read_batch.succeeded {
                PayloadState::ReadSucceeded
            } else {
                PayloadState::ReadFailed
            };
            advance(&mut state, next, entry);
            (Some(read_batch), Some(target))
        } else {
            error!(
                file = entry.display_name(),
                status = %write_batch.status,
                "write batch failed, skipping reads"
            );
            advance(&mut state, PayloadState::WriteFailed, entry);
            (None, None)
        };

        PayloadReport {
            file: entry.display_name().to_string(),
            size_label: entry.size_label().to_string(),
            size_bytes: bytes.len() as u64,
            state,
            store_batch,
            write_batch,
            read_batch,
            read_target,
        }
    }

    async fn write_batch(&self, entry: &PayloadEntry, ordinal: usize, attachments: &str) -> BatchResult {
        let record_ids: Vec<String> = (0..self.invocations)
            .map(|i| self.record_id(entry, ordinal, i))
            .collect();
        let batch_ids: Vec<String> = (0..self.invocations)
            .map(|i| format!("BARREL-{}-{i}", self.strategy.kind().as_str().to_ascii_uppercase()))
            .collect();
        let product_name = format!("Product for {}", entry.display_name());
        let timestamp = now_utc_millis();
        let ledger = &self.ledger;

        let outcomes = self
            .runner
            .run(
                OperationKind::Write,
                self.invocations,
                ConcurrencyMode::for_kind(OperationKind::Write),
                |i| {
                    let args = CreateBatch {
                        id: &record_ids[i],
                        batch_id: &batch_ids[i],
                        actor_id: ACTOR_ID,
                        step: STEP,
                        product_name: &product_name,
                        product_category: PRODUCT_CATEGORY,
                        timestamp: &timestamp,
                        parent_batches_json: NO_PARENTS,
                        attachment_refs_json: attachments,
                    }
                    .to_args();
                    async move { ledger.submit(CREATE_BATCH, &args).await }
                },
            )
            .await;
        aggregate(OperationKind::Write, outcomes)
    }

    async fn read_batch(&self, target: &str) -> BatchResult {
        let ledger = &self.ledger;
        let outcomes = self
            .runner
            .run(
                OperationKind::Read,
                self.invocations,
                ConcurrencyMode::for_kind(OperationKind::Read),
                |_| async move { ledger.query(READ_BATCH, &[target]).await },
            )
            .await;
        aggregate(OperationKind::Read, outcomes)
    }
}

/// JSON list holding the prepared value, the form the record contract takes.
fn attachment_refs(prepared: Prepared) -> Result<(String, Option<BatchResult>), PrepareError> {
    let json = serde_json::to_string(&[prepared.value.as_str()])
        .map_err(|e| PrepareError::Encoding(e.to_string()))?;
    Ok((json, prepared.store_batch))
}

fn advance(state: &mut PayloadState, next: PayloadState, entry: &PayloadEntry) {
    tracing::debug!(file = entry.display_name(), from = ?*state, to = ?next, "payload state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PayloadSource;
    use crate::error::{LedgerError, StoreError};
    use crate::ledger::{Receipt, SimulatedLedger, SimulatedLedgerConfig};
    use crate::store::ContentStore;
    use crate::strategy::{DirectStrategy, ReferenceStrategy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::sleep;

    /// Ledger with fixed per-invocation latencies and optional failures.
    #[derive(Default)]
    struct ScriptedLedger {
        write_ms: Vec<u64>,
        read_ms: Vec<u64>,
        fail_write: Option<usize>,
        fail_read: Option<usize>,
        submits: AtomicUsize,
        queries: AtomicUsize,
        queried: Mutex<Vec<String>>,
    }

    fn write_index(id: &str) -> usize {
        id.rsplit('-').next().and_then(|s| s.parse().ok()).unwrap_or(0)
    }

    #[async_trait]
    impl LedgerClient for ScriptedLedger {
        async fn submit(&self, operation: &str, args: &[&str]) -> Result<Receipt, LedgerError> {
            assert_eq!(operation, CREATE_BATCH);
            assert_eq!(args.len(), 9);
            self.submits.fetch_add(1, Ordering::SeqCst);
            let index = write_index(args[0]);
            sleep(Duration::from_millis(self.write_ms[index % self.write_ms.len()])).await;
            if self.fail_write == Some(index) {
                return Err(LedgerError::Rejected {
                    operation: operation.to_string(),
                    reason: "endorsement failure".to_string(),
                });
            }
            Ok(Receipt {
                transaction_id: format!("tx-{index}"),
            })
        }

        async fn query(&self, operation: &str, args: &[&str]) -> Result<Vec<u8>, LedgerError> {
            assert_eq!(operation, READ_BATCH);
            let call = self.queries.fetch_add(1, Ordering::SeqCst);
            self.queried.lock().unwrap().push(args[0].to_string());
            sleep(Duration::from_millis(self.read_ms[call % self.read_ms.len()])).await;
            if self.fail_read == Some(call) {
                return Err(LedgerError::Rejected {
                    operation: operation.to_string(),
                    reason: format!("the batch {} does not exist", args[0]),
                });
            }
            Ok(b"{}".to_vec())
        }
    }

    struct DownStore;

    #[async_trait]
    impl ContentStore for DownStore {
        async fn store(&self, _bytes: &[u8]) -> Result<String, StoreError> {
            Err(StoreError::Unreachable("connect ECONNREFUSED 127.0.0.1:5001".to_string()))
        }
    }

    fn config(invocations: usize) -> BenchConfig {
        BenchConfig {
            invocations,
            timeout: None,
            ..BenchConfig::default()
        }
    }

    fn inline(label: &str, len: usize) -> PayloadEntry {
        PayloadEntry::new(
            format!("file_{label}.bin"),
            label,
            PayloadSource::Inline(Arc::from(vec![0x5Au8; len])),
        )
    }

    fn session(ledger: Arc<dyn LedgerClient>, strategy: Arc<dyn StrategyAdapter>, n: usize) -> BenchmarkSession {
        BenchmarkSession::new(ledger, strategy, &config(n))
            .unwrap()
            .with_run_tag("42")
    }

    fn assert_read_follows_write(report: &SessionReport) {
        for p in report.payloads() {
            assert!(p.state.is_terminal());
            if !p.write_batch.succeeded {
                assert!(p.read_batch.is_none(), "{} read without a successful write", p.file);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_calls_succeed() {
        let ledger = Arc::new(ScriptedLedger {
            write_ms: vec![10, 12, 11],
            read_ms: vec![5, 6, 5],
            ..Default::default()
        });
        let session = session(ledger.clone(), Arc::new(DirectStrategy), 3);
        let mut catalog = PayloadCatalog::new(vec![inline("100KB", 100 * 1024)]);

        let report = session.run(&mut catalog).await;
        assert_read_follows_write(&report);
        assert_eq!(report.payloads().len(), 1);

        let p = &report.payloads()[0];
        assert_eq!(p.state, PayloadState::ReadSucceeded);
        assert_eq!(p.size_bytes, 102_400);
        assert!(p.write_batch.succeeded);
        assert_eq!(p.write_batch.average_duration_millis.to_string(), "11.00");
        let read = p.read_batch.as_ref().unwrap();
        assert!(read.succeeded);
        assert_eq!(read.average_duration_millis.to_string(), "5.33");

        // Every read targets the last written record.
        assert_eq!(p.read_target.as_deref(), Some("direct-100KB-42-0-write-2"));
        let queried = ledger.queried.lock().unwrap();
        assert_eq!(queried.len(), 3);
        assert!(queried.iter().all(|id| id == "direct-100KB-42-0-write-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failed_write_skips_reads() {
        let ledger = Arc::new(ScriptedLedger {
            write_ms: vec![10, 12, 11],
            read_ms: vec![5],
            fail_write: Some(1),
            ..Default::default()
        });
        let session = session(ledger.clone(), Arc::new(DirectStrategy), 3);
        let mut catalog = PayloadCatalog::new(vec![inline("100KB", 100 * 1024)]);

        let report = session.run(&mut catalog).await;
        assert_read_follows_write(&report);

        let p = &report.payloads()[0];
        assert_eq!(p.state, PayloadState::WriteFailed);
        assert!(!p.write_batch.succeeded);
        assert_eq!(p.write_batch.average_duration_millis.to_string(), "unavailable");
        assert_eq!(p.write_batch.outcomes.len(), 3);
        assert!(p.read_batch.is_none());
        assert_eq!(ledger.submits.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_payload_is_skipped() {
        let ledger = Arc::new(ScriptedLedger {
            write_ms: vec![1],
            read_ms: vec![1],
            ..Default::default()
        });
        let session = session(ledger, Arc::new(DirectStrategy), 2);
        let mut catalog = PayloadCatalog::new(vec![
            PayloadEntry::new(
                "file_50KB.bin",
                "50KB",
                PayloadSource::File("/definitely/not/here/file_50KB.bin".into()),
            ),
            inline("1KB", 1024),
        ]);

        let report = session.run(&mut catalog).await;
        assert_eq!(report.payloads().len(), 1);
        assert_eq!(report.payloads()[0].file, "file_1KB.bin");
        assert_eq!(report.payloads()[0].state, PayloadState::ReadSucceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_fails_write_without_submitting() {
        let ledger = Arc::new(ScriptedLedger {
            write_ms: vec![1],
            read_ms: vec![1],
            ..Default::default()
        });
        let strategy = ReferenceStrategy::new(Arc::new(DownStore), InvocationRunner::new(None), 3);
        let session = session(ledger.clone(), Arc::new(strategy), 3);
        let mut catalog = PayloadCatalog::new(vec![inline("100KB", 100 * 1024)]);

        let report = session.run(&mut catalog).await;
        assert_read_follows_write(&report);

        let p = &report.payloads()[0];
        assert_eq!(p.state, PayloadState::WriteFailed);
        assert!(!p.write_batch.succeeded);
        assert_eq!(
            p.write_batch.first_failure().map(|f| f.message.as_str()),
            Some("content store unreachable: connect ECONNREFUSED 127.0.0.1:5001")
        );
        assert!(p.read_batch.is_none());
        let store_batch = p.store_batch.as_ref().unwrap();
        assert_eq!(store_batch.outcomes.len(), 1);
        assert_eq!(ledger.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_is_fail_fast() {
        let ledger = Arc::new(ScriptedLedger {
            write_ms: vec![2],
            read_ms: vec![1],
            fail_read: Some(1),
            ..Default::default()
        });
        let session = session(ledger.clone(), Arc::new(DirectStrategy), 5);
        let mut catalog = PayloadCatalog::new(vec![inline("1KB", 1024), inline("2KB", 2048)]);

        let report = session.run(&mut catalog).await;
        assert_read_follows_write(&report);

        let first = &report.payloads()[0];
        assert_eq!(first.state, PayloadState::ReadFailed);
        assert_eq!(first.read_batch.as_ref().unwrap().outcomes.len(), 2);
        // The next payload still runs.
        assert_eq!(report.payloads()[1].state, PayloadState::ReadSucceeded);
        assert_eq!(ledger.queries.load(Ordering::SeqCst), 2 + 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_vs_reference_on_simulated_ledger() {
        let limit = 64 * 1024;
        let ledger: Arc<dyn LedgerClient> = Arc::new(
            SimulatedLedger::connect(SimulatedLedgerConfig {
                max_message_bytes: limit,
                base_latency: Duration::from_millis(3),
                latency_per_mib: Duration::from_millis(50),
                ..SimulatedLedgerConfig::default()
            })
            .unwrap(),
        );
        let mut catalog = PayloadCatalog::new(vec![inline("8KB", 8 * 1024), inline("100KB", 100 * 1024)]);

        let direct = BenchmarkSession::new(ledger.clone(), Arc::new(DirectStrategy), &config(4))
            .unwrap()
            .with_run_tag("d");
        let report = direct.run(&mut catalog).await;
        assert_read_follows_write(&report);
        assert_eq!(report.payloads()[0].state, PayloadState::ReadSucceeded);
        let too_big = &report.payloads()[1];
        assert_eq!(too_big.state, PayloadState::WriteFailed);
        assert!(too_big.write_batch.payload_too_large());

        let dir = tempfile::tempdir().unwrap();
        let store = crate::store::FsContentStore::open(dir.path()).await.unwrap();
        let reference = ReferenceStrategy::new(Arc::new(store), InvocationRunner::new(None), 4);
        let session = BenchmarkSession::new(ledger, Arc::new(reference), &config(4))
            .unwrap()
            .with_run_tag("r");
        let report = session.run(&mut catalog).await;
        assert_read_follows_write(&report);
        assert!(report
            .payloads()
            .iter()
            .all(|p| p.state == PayloadState::ReadSucceeded && p.store_batch.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_size_files_get_distinct_record_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), vec![1u8; 1024]).unwrap();
        std::fs::write(dir.path().join("b.bin"), vec![2u8; 1024]).unwrap();
        let mut catalog = PayloadCatalog::discover(dir.path()).unwrap();

        let ledger: Arc<dyn LedgerClient> =
            Arc::new(SimulatedLedger::connect(SimulatedLedgerConfig::default()).unwrap());
        let session = session(ledger, Arc::new(DirectStrategy), 3);
        let report = session.run(&mut catalog).await;

        let payloads = report.payloads();
        assert_eq!(payloads.len(), 2);
        assert!(payloads.iter().all(|p| p.size_label == "1KB"));
        assert!(payloads.iter().all(|p| p.state == PayloadState::ReadSucceeded));
        assert_eq!(payloads[0].read_target.as_deref(), Some("direct-1KB-42-0-write-2"));
        assert_eq!(payloads[1].read_target.as_deref(), Some("direct-1KB-42-1-write-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_bytes_are_released_after_each_payload() {
        let ledger = Arc::new(ScriptedLedger {
            write_ms: vec![1],
            read_ms: vec![1],
            ..Default::default()
        });
        let session = session(ledger, Arc::new(DirectStrategy), 2);
        let mut catalog = PayloadCatalog::new(vec![inline("1KB", 1024), inline("2KB", 2048)]);

        let report = session.run(&mut catalog).await;
        assert_eq!(report.payloads().len(), 2);
        assert!(catalog.entries().iter().all(|e| !e.is_loaded()));
    }

    #[test]
    fn test_zero_invocations_is_a_config_error() {
        let ledger: Arc<dyn LedgerClient> = Arc::new(ScriptedLedger::default());
        let err = BenchmarkSession::new(ledger, Arc::new(DirectStrategy), &config(0))
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::Config(_)));
    }
}
