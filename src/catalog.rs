//! Payload catalog: the ordered corpus of files each session walks through.
//!
//! Entries are cheap descriptors; their bytes are read on first use, shared
//! by every invocation of that payload, and released once it has finished.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::CatalogError;

/// Size labels of the standard catalog, smallest first.
pub const STANDARD_SIZES: &[&str] = &[
    "100KB", "200KB", "500KB", "1MB", "2MB", "3MB", "5MB", "10MB", "15MB", "20MB", "25MB", "30MB",
    "40MB", "50MB", "75MB", "100MB", "200MB", "300MB", "400MB", "500MB",
];

/// Where an entry's bytes come from.
#[derive(Debug, Clone)]
pub enum PayloadSource {
    File(PathBuf),
    Inline(Arc<[u8]>),
}

#[derive(Debug)]
pub struct PayloadEntry {
    display_name: String,
    size_label: String,
    source: PayloadSource,
    bytes: OnceCell<Arc<[u8]>>,
}

impl PayloadEntry {
    pub fn new(display_name: impl Into<String>, size_label: impl Into<String>, source: PayloadSource) -> Self {
        Self {
            display_name: display_name.into(),
            size_label: size_label.into(),
            source,
            bytes: OnceCell::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn size_label(&self) -> &str {
        &self.size_label
    }

    pub fn source(&self) -> &PayloadSource {
        &self.source
    }

    /// Nominal size parsed from the label, if it parses.
    pub fn nominal_size(&self) -> Option<u64> {
        parse_size_label(&self.size_label).ok()
    }

    pub fn is_loaded(&self) -> bool {
        self.bytes.initialized()
    }

    /// Bytes of this entry, read from the source at most once until released.
    pub async fn load(&self) -> Result<Arc<[u8]>, CatalogError> {
        let bytes = self.bytes.get_or_try_init(|| self.read_source()).await?;
        Ok(Arc::clone(bytes))
    }

    /// Drop the cached bytes. Returns whether anything was cached.
    pub fn release(&mut self) -> bool {
        self.bytes.take().is_some()
    }

    async fn read_source(&self) -> Result<Arc<[u8]>, CatalogError> {
        let path = match &self.source {
            PayloadSource::Inline(bytes) => return Ok(Arc::clone(bytes)),
            PayloadSource::File(path) => path,
        };
        let data = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CatalogError::NotFound {
                    name: self.display_name.clone(),
                    path: path.clone(),
                }
            } else {
                CatalogError::Read {
                    name: self.display_name.clone(),
                    source: e,
                }
            }
        })?;
        debug!(name = %self.display_name, len = data.len(), "loaded payload");
        Ok(Arc::from(data))
    }
}

#[derive(Debug, Default)]
pub struct PayloadCatalog {
    entries: Vec<PayloadEntry>,
}

impl PayloadCatalog {
    pub fn new(entries: Vec<PayloadEntry>) -> Self {
        Self { entries }
    }

    /// `file_<label>.bin` under `dir` for every standard size label.
    pub fn standard<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        let entries = STANDARD_SIZES
            .iter()
            .map(|label| {
                let name = file_name_for(label);
                let path = dir.join(&name);
                PayloadEntry::new(name, *label, PayloadSource::File(path))
            })
            .collect();
        Self { entries }
    }

    /// Every `*.bin` file directly under `dir`, smallest first.
    pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let mut found: Vec<(u64, PathBuf)> = Vec::new();
        for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| CatalogError::Read {
                name: dir.display().to_string(),
                source: e.into(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|s| s.to_str()) != Some("bin") {
                continue;
            }
            let len = entry
                .metadata()
                .map_err(|e| CatalogError::Read {
                    name: path.display().to_string(),
                    source: e.into(),
                })?
                .len();
            found.push((len, path.to_path_buf()));
        }
        found.sort();

        let entries = found
            .into_iter()
            .map(|(len, path)| {
                let name = path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or("payload.bin")
                    .to_string();
                PayloadEntry::new(name, format_size_label(len), PayloadSource::File(path))
            })
            .collect();
        Ok(Self { entries })
    }

    /// Drop entries whose nominal size exceeds `max_bytes`.
    pub fn limited_to(mut self, max_bytes: u64) -> Self {
        self.entries
            .retain(|e| e.nominal_size().map_or(true, |size| size <= max_bytes));
        self
    }

    /// Keep only entries whose size label is in `labels` (case-insensitive).
    pub fn only_labels(mut self, labels: &[String]) -> Self {
        if labels.is_empty() {
            return self;
        }
        self.entries
            .retain(|e| labels.iter().any(|l| l.eq_ignore_ascii_case(&e.size_label)));
        self
    }

    pub fn entries(&self) -> &[PayloadEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [PayloadEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes of `entry`; see [`PayloadEntry::load`].
    pub async fn resolve(&self, entry: &PayloadEntry) -> Result<Arc<[u8]>, CatalogError> {
        entry.load().await
    }
}

pub fn file_name_for(size_label: &str) -> String {
    format!("file_{size_label}.bin")
}

/// Parse labels such as `100KB`, `1MB` or `512B` as binary multiples.
pub fn parse_size_label(label: &str) -> Result<u64, CatalogError> {
    let upper = label.trim().to_ascii_uppercase();
    let split = upper
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(upper.len());
    let (digits, unit) = upper.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| CatalogError::InvalidSizeLabel(label.to_string()))?;
    let mult: u64 = match unit {
        "" | "B" => 1,
        "KB" | "K" => 1024,
        "MB" | "M" => 1024 * 1024,
        "GB" | "G" => 1024 * 1024 * 1024,
        _ => return Err(CatalogError::InvalidSizeLabel(label.to_string())),
    };
    n.checked_mul(mult)
        .ok_or_else(|| CatalogError::InvalidSizeLabel(label.to_string()))
}

/// Inverse of [`parse_size_label`] for exact multiples; falls back to bytes.
pub fn format_size_label(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    match bytes {
        n if n >= MB && n % MB == 0 => format!("{}MB", n / MB),
        n if n >= KB && n % KB == 0 => format!("{}KB", n / KB),
        n => format!("{n}B"),
    }
}
