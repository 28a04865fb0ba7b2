//! Turning payload bytes into the value a ledger write embeds.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::aggregate::{aggregate, BatchResult};
use crate::error::StoreError;
use crate::outcome::OperationKind;
use crate::runner::{ConcurrencyMode, InvocationRunner};
use crate::store::ContentStore;
use crate::StrategyKind;

/// Value to embed plus whatever was measured while producing it.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub value: String,
    /// Content-store timings, reference strategy only.
    pub store_batch: Option<BatchResult>,
}

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("failed to encode payload: {0}")]
    Encoding(String),

    #[error("content store failed: {}", .batch.status)]
    Store { batch: BatchResult },
}

impl PrepareError {
    /// Measurements taken before the failure, if any.
    pub fn store_batch(&self) -> Option<&BatchResult> {
        match self {
            PrepareError::Store { batch } => Some(batch),
            PrepareError::Encoding(_) => None,
        }
    }

    /// Message recorded against the write batch that could not run.
    pub fn write_message(&self) -> String {
        match self {
            PrepareError::Store { batch } => batch
                .first_failure()
                .map(|f| f.message.clone())
                .unwrap_or_else(|| batch.status.clone()),
            PrepareError::Encoding(_) => self.to_string(),
        }
    }
}

#[async_trait]
pub trait StrategyAdapter: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn prepare(&self, bytes: &[u8]) -> Result<Prepared, PrepareError>;
}

/// Embeds the payload itself, base64-encoded.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectStrategy;

impl DirectStrategy {
    pub fn encode(bytes: &[u8]) -> Result<String, PrepareError> {
        if base64::encoded_len(bytes.len(), true).is_none() {
            return Err(PrepareError::Encoding(format!(
                "{} bytes exceed the encodable length",
                bytes.len()
            )));
        }
        Ok(STANDARD.encode(bytes))
    }

    pub fn decode(value: &str) -> Result<Vec<u8>, PrepareError> {
        STANDARD
            .decode(value)
            .map_err(|e| PrepareError::Encoding(e.to_string()))
    }
}

#[async_trait]
impl StrategyAdapter for DirectStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    async fn prepare(&self, bytes: &[u8]) -> Result<Prepared, PrepareError> {
        Ok(Prepared {
            value: Self::encode(bytes)?,
            store_batch: None,
        })
    }
}

/// Stores the payload externally and embeds its content id.
///
/// The store call is repeated `invocations` times as a sequential, fail-fast
/// batch so its latency is comparable with the ledger batches; the id of the
/// last successful call is embedded.
pub struct ReferenceStrategy {
    store: Arc<dyn ContentStore>,
    runner: InvocationRunner,
    invocations: usize,
}

impl ReferenceStrategy {
    pub fn new(store: Arc<dyn ContentStore>, runner: InvocationRunner, invocations: usize) -> Self {
        Self {
            store,
            runner,
            invocations: invocations.max(1),
        }
    }
}

#[async_trait]
impl StrategyAdapter for ReferenceStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Reference
    }

    async fn prepare(&self, bytes: &[u8]) -> Result<Prepared, PrepareError> {
        let last_id: Mutex<Option<String>> = Mutex::new(None);
        let store = &self.store;
        let last = &last_id;

        let outcomes = self
            .runner
            .run(
                OperationKind::Store,
                self.invocations,
                ConcurrencyMode::for_kind(OperationKind::Store),
                |_| async move {
                    let id = store.store(bytes).await?;
                    *last.lock().await = Some(id);
                    Ok::<_, StoreError>(())
                },
            )
            .await;
        let batch = aggregate(OperationKind::Store, outcomes);
        let content_id = last_id.into_inner();

        match content_id {
            Some(id) if batch.succeeded => {
                info!(
                    content_id = %id,
                    avg_ms = %batch.average_duration_millis,
                    "stored payload in content store"
                );
                Ok(Prepared {
                    value: id,
                    store_batch: Some(batch),
                })
            }
            _ => {
                warn!(status = %batch.status, "content store batch failed");
                Err(PrepareError::Store { batch })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FlakyStore {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl ContentStore for FlakyStore {
        async fn store(&self, bytes: &[u8]) -> Result<String, StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(3)).await;
            if Some(call) == self.fail_on {
                return Err(StoreError::Unreachable("connection refused".to_string()));
            }
            Ok(format!("cid-{}-{call}", bytes.len()))
        }
    }

    fn flaky(fail_on: Option<usize>) -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            calls: AtomicUsize::new(0),
            fail_on,
        })
    }

    #[test]
    fn test_direct_roundtrip() {
        let samples: [&[u8]; 4] = [b"", b"a", b"\x00\xff\x10binary", &[0xAB; 1000]];
        for bytes in samples {
            let encoded = DirectStrategy::encode(bytes).unwrap();
            assert!(encoded.is_ascii());
            assert_eq!(DirectStrategy::decode(&encoded).unwrap(), bytes);
        }
    }

    #[test]
    fn test_direct_rejects_bad_text() {
        assert!(matches!(
            DirectStrategy::decode("not*base64"),
            Err(PrepareError::Encoding(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reference_embeds_last_content_id() {
        let store = flaky(None);
        let strategy = ReferenceStrategy::new(store.clone(), InvocationRunner::new(None), 3);

        let prepared = strategy.prepare(b"payload").await.unwrap();
        assert_eq!(prepared.value, "cid-7-2");
        let batch = prepared.store_batch.unwrap();
        assert!(batch.succeeded);
        assert_eq!(batch.outcomes.len(), 3);
        assert_eq!(batch.average_duration_millis.value(), Some(3.0));
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reference_store_failure_stops_batch() {
        let store = flaky(Some(1));
        let strategy = ReferenceStrategy::new(store.clone(), InvocationRunner::new(None), 5);

        let err = strategy.prepare(b"payload").await.unwrap_err();
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        let batch = err.store_batch().unwrap();
        assert!(!batch.succeeded);
        assert_eq!(batch.outcomes.len(), 2);
        assert_eq!(
            err.write_message(),
            "content store unreachable: connection refused"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_last_store_call_is_not_ok() {
        // Earlier calls produced ids; the batch must still fail.
        let store = flaky(Some(2));
        let strategy = ReferenceStrategy::new(store.clone(), InvocationRunner::new(None), 3);

        let err = strategy.prepare(b"payload").await.unwrap_err();
        let batch = err.store_batch().unwrap();
        assert!(!batch.succeeded);
        assert_eq!(batch.outcomes.len(), 3);
        assert!(!batch.status.starts_with("ok"));
    }
}
