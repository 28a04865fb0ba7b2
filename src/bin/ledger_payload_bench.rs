use anyhow::Context;
use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use ledger_payload_bench::aggregate::BatchResult;
use ledger_payload_bench::catalog::{self, PayloadCatalog, PayloadSource, STANDARD_SIZES};
use ledger_payload_bench::error::SessionError;
use ledger_payload_bench::generate::{self, GenerateConfig};
use ledger_payload_bench::harness::{BenchConfig, Profile, DEFAULT_INVOCATIONS};
use ledger_payload_bench::ledger::{LedgerClient, SimulatedLedger, SimulatedLedgerConfig};
use ledger_payload_bench::runner::InvocationRunner;
use ledger_payload_bench::schema::{BenchReport, RunMeta};
use ledger_payload_bench::session::BenchmarkSession;
use ledger_payload_bench::store::FsContentStore;
use ledger_payload_bench::strategy::{DirectStrategy, ReferenceStrategy, StrategyAdapter};
use ledger_payload_bench::StrategyKind;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Quick,
    Full,
}

impl From<ProfileArg> for Profile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Quick => Profile::Quick,
            ProfileArg::Full => Profile::Full,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

#[derive(clap::Args, Debug)]
struct CatalogArgs {
    /// Directory holding the `file_<size>.bin` payloads.
    #[arg(long, value_name = "DIR", default_value = "test_files_for_benchmark")]
    payload_dir: PathBuf,

    /// Use every `*.bin` file in the directory instead of the standard size list.
    #[arg(long, default_value_t = false)]
    discover: bool,

    /// Restrict the run to these size labels (e.g. `--payload 1MB --payload 5MB`).
    #[arg(long = "payload", value_name = "SIZE", action = clap::ArgAction::Append)]
    payloads: Vec<String>,
}

impl CatalogArgs {
    fn build(&self, profile: Profile) -> anyhow::Result<PayloadCatalog> {
        let catalog = if self.discover {
            PayloadCatalog::discover(&self.payload_dir)
                .with_context(|| format!("scanning {}", self.payload_dir.display()))?
        } else {
            profile.apply(PayloadCatalog::standard(&self.payload_dir))
        };
        Ok(catalog.only_labels(&self.payloads))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Benchmark write and read latency for every payload in the catalog.
    Run {
        /// How payload bytes reach the ledger.
        #[arg(long, value_enum, default_value_t = StrategyKind::Direct)]
        strategy: StrategyKind,

        #[command(flatten)]
        catalog: CatalogArgs,

        /// Invocations per write, read and store batch.
        #[arg(long, short = 'n', default_value_t = DEFAULT_INVOCATIONS,
              value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        invocations: usize,

        /// Per-invocation deadline in milliseconds; 0 waits indefinitely.
        #[arg(long, default_value_t = 120_000)]
        timeout_ms: u64,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Content store directory (reference strategy).
        #[arg(long, value_name = "DIR", default_value = "content_store")]
        store_dir: PathBuf,

        /// Largest transaction the simulated ledger accepts.
        #[arg(long, default_value_t = 100 * 1024 * 1024)]
        max_message_bytes: usize,

        /// Fixed simulated latency per ledger call.
        #[arg(long, default_value_t = 20)]
        base_latency_ms: u64,

        /// Additional simulated latency per MiB moved.
        #[arg(long, default_value_t = 8)]
        latency_per_mib_ms: u64,
    },

    /// Write deterministic payload files for the catalog.
    GeneratePayloads {
        /// Output directory for the generated payloads.
        #[arg(long, short = 'o', value_name = "DIR", default_value = "test_files_for_benchmark")]
        output: PathBuf,

        /// Size labels to generate; defaults to the profile's standard sizes.
        #[arg(long, value_delimiter = ',')]
        sizes: Vec<String>,
    },

    /// Show which catalog payloads are present.
    CatalogInfo {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
}

#[derive(Parser, Debug)]
#[command(name = "ledger-payload-bench")]
#[command(about = "Direct vs. content-referenced ledger payload benchmark (JSON output)")]
struct Args {
    #[arg(long, value_enum, default_value_t = ProfileArg::Quick, global = true)]
    profile: ProfileArg,

    #[arg(long, default_value_t = 0, global = true)]
    seed: u64,

    /// Where to write the report. If omitted, prints to stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cell(batch: Option<&BatchResult>) -> String {
    match batch {
        None => "-".to_string(),
        Some(b) if b.succeeded => b.average_duration_millis.to_string(),
        Some(b) => b.status.clone(),
    }
}

fn render_table(report: &BenchReport) -> String {
    let header = ["File", "Size", "Store avg (ms)", "Write avg (ms)", "Read avg (ms)"];
    let rows: Vec<[String; 5]> = report
        .payloads
        .iter()
        .map(|p| {
            let read = match (&p.read_batch, p.write_batch.succeeded) {
                (Some(b), _) => cell(Some(b)),
                (None, false) => "N/A (write failed)".to_string(),
                (None, true) => "-".to_string(),
            };
            [
                p.file.clone(),
                p.size_label.clone(),
                cell(p.store_batch.as_ref()),
                cell(Some(&p.write_batch)),
                read,
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (w, c) in widths.iter_mut().zip(row) {
            *w = (*w).max(c.len());
        }
    }

    let line = |cells: &[&str]| -> String {
        cells
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut out = String::new();
    out.push_str(&format!(
        "--- Benchmark Results ({}, {} invocations) ---\n",
        report.run.strategy.as_str(),
        report.run.invocations
    ));
    out.push_str(&line(&header));
    out.push('\n');
    out.push_str(&widths.map(|w| "-".repeat(w)).join("-+-"));
    out.push('\n');
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push_str(&line(&cells));
        out.push('\n');
    }
    out
}

fn emit(out: Option<&PathBuf>, text: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => fs::write(path, text).with_context(|| format!("writing {}", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = BenchConfig {
        profile: args.profile.into(),
        seed: args.seed,
        ..BenchConfig::default()
    };

    match &args.cmd {
        Command::Run {
            strategy,
            catalog,
            invocations,
            timeout_ms,
            format,
            store_dir,
            max_message_bytes,
            base_latency_ms,
            latency_per_mib_ms,
        } => {
            cfg.invocations = *invocations;
            cfg.timeout = (*timeout_ms > 0).then(|| Duration::from_millis(*timeout_ms));

            let mut catalog = catalog.build(cfg.profile)?;
            let ledger_config = SimulatedLedgerConfig {
                max_message_bytes: *max_message_bytes,
                base_latency: Duration::from_millis(*base_latency_ms),
                latency_per_mib: Duration::from_millis(*latency_per_mib_ms),
                // Reads only target the payload currently under test.
                retained_records: cfg.invocations,
            };
            let ledger: Arc<dyn LedgerClient> =
                Arc::new(SimulatedLedger::connect(ledger_config).map_err(SessionError::from)?);
            info!(max_message_bytes, "connected to simulated ledger");

            let adapter: Arc<dyn StrategyAdapter> = match strategy {
                StrategyKind::Direct => Arc::new(DirectStrategy),
                StrategyKind::Reference => {
                    let store = FsContentStore::open(store_dir)
                        .await
                        .with_context(|| format!("opening content store {}", store_dir.display()))?;
                    info!(root = %store.root().display(), "using filesystem content store");
                    Arc::new(ReferenceStrategy::new(
                        Arc::new(store),
                        InvocationRunner::new(cfg.timeout),
                        cfg.invocations,
                    ))
                }
            };

            let session = BenchmarkSession::new(ledger, adapter, &cfg)?;
            let session_report = session.run(&mut catalog).await;
            let report = BenchReport::new(RunMeta::new(&cfg, *strategy), session_report);

            let text = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&report)?,
                OutputFormat::Table => render_table(&report),
            };
            emit(args.out.as_ref(), &text)?;
        }
        Command::GeneratePayloads { output, sizes } => {
            let sizes = if sizes.is_empty() {
                let max = cfg.profile.max_payload_bytes().unwrap_or(u64::MAX);
                STANDARD_SIZES
                    .iter()
                    .filter(|l| catalog::parse_size_label(l).map_or(false, |s| s <= max))
                    .map(|l| l.to_string())
                    .collect()
            } else {
                sizes.clone()
            };
            let gen_config = GenerateConfig { sizes, seed: cfg.seed };

            let start = std::time::Instant::now();
            let written = generate::generate_payloads(output, &gen_config)
                .with_context(|| format!("generating payloads in {}", output.display()))?;
            let elapsed = start.elapsed();

            let total: u64 = written.iter().map(|p| p.size).sum();
            for p in &written {
                info!(path = %p.path.display(), bytes = p.size, "wrote payload");
            }
            info!(
                files = written.len(),
                "wrote {:.2} MB in {:.2}s ({:.1} MB/s)",
                total as f64 / 1_048_576.0,
                elapsed.as_secs_f64(),
                (total as f64 / 1_048_576.0) / elapsed.as_secs_f64().max(f64::EPSILON)
            );
        }
        Command::CatalogInfo { catalog } => {
            let catalog = catalog.build(cfg.profile)?;
            let mut lines = Vec::with_capacity(catalog.len());
            for entry in catalog.entries() {
                let status = match entry.source() {
                    PayloadSource::File(path) => match fs::metadata(path) {
                        Ok(meta) => format!("{:.2} MB", meta.len() as f64 / 1_048_576.0),
                        Err(e) => format!("missing ({e})"),
                    },
                    PayloadSource::Inline(bytes) => format!("{} bytes inline", bytes.len()),
                };
                lines.push(format!("{:<20} {:<8} {status}", entry.display_name(), entry.size_label()));
            }
            emit(args.out.as_ref(), &lines.join("\n"))?;
        }
    }

    Ok(())
}
