use std::time::Duration;

use crate::catalog::PayloadCatalog;

/// Default number of invocations per batch.
pub const DEFAULT_INVOCATIONS: usize = 10;

/// Default per-invocation deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Copy, Debug)]
pub enum Profile {
    Quick,
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Quick => "quick",
            Profile::Full => "full",
        }
    }

    /// Largest payload the profile benchmarks, `None` for no limit.
    pub fn max_payload_bytes(&self) -> Option<u64> {
        match self {
            Profile::Quick => Some(10 * 1024 * 1024),
            Profile::Full => None,
        }
    }

    pub fn apply(&self, catalog: PayloadCatalog) -> PayloadCatalog {
        match self.max_payload_bytes() {
            Some(max) => catalog.limited_to(max),
            None => catalog,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BenchConfig {
    pub profile: Profile,
    pub seed: u64,
    /// Invocations per write, read and store batch.
    pub invocations: usize,
    /// Per-invocation deadline; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Quick,
            seed: 0,
            invocations: DEFAULT_INVOCATIONS,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl BenchConfig {
    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout.map(|t| t.as_millis() as u64)
    }
}
