use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::harness::BenchConfig;
use crate::session::{PayloadReport, SessionReport};
use crate::StrategyKind;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub profile: String,
    pub strategy: StrategyKind,
    pub invocations: usize,
    pub timeout_ms: Option<u64>,
    pub seed: u64,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

impl RunMeta {
    pub fn new(cfg: &BenchConfig, strategy: StrategyKind) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            profile: cfg.profile.as_str().to_string(),
            strategy,
            invocations: cfg.invocations,
            timeout_ms: cfg.timeout_ms(),
            seed: cfg.seed,
            timestamp_utc: now_utc(),
            git_sha: git_sha_short(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub run: RunMeta,
    pub payloads: Vec<PayloadReport>,
}

impl BenchReport {
    pub fn new(run: RunMeta, session: SessionReport) -> Self {
        Self {
            run,
            payloads: session.into_payloads(),
        }
    }
}

pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// RFC 3339 UTC, e.g. `2026-10-18T09:30:00Z`.
pub fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// RFC 3339 UTC with milliseconds, for record timestamps.
pub fn now_utc_millis() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn git_sha_short() -> Option<String> {
    // Best-effort: read from environment set by CI/build scripts.
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}
