//! Durable per-street result storage (`<data_dir>/<street_key>/results.json`).
//!
//! The store is the only writer of a street's [`ResultSet`]. Every append
//! rewrites the file atomically (temp file, fsync, rename), so a crash after
//! N appends leaves exactly N complete records.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::result_set::ResultSet;
use crate::core::summary::{LikelihoodCounts, summarize};
use crate::core::types::{ProcessedResult, StreetTarget};

const STORE_VERSION: u32 = 1;
const RESULTS_FILE: &str = "results.json";
const IMAGES_DIR: &str = "images";

/// Persisted state for a street could not be read back.
///
/// Fatal for the street: the run aborts instead of discarding prior progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCorruptionError {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for StoreCorruptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "result store {} is corrupt: {}",
            self.path.display(),
            self.reason
        )
    }
}

impl std::error::Error for StoreCorruptionError {}

/// On-disk document layout.
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    street: String,
    suburb: String,
    results: Vec<ProcessedResult>,
}

/// One street's stored results, as found by [`ResultStore::load_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredStreet {
    /// Directory name under `data_dir`.
    pub key: String,
    pub street: String,
    pub suburb: String,
    pub results: ResultSet,
}

/// Canonical paths for one street's persisted state.
#[derive(Debug, Clone)]
pub struct StreetPaths {
    pub dir: PathBuf,
    pub results_path: PathBuf,
    pub images_dir: PathBuf,
}

impl StreetPaths {
    pub fn new(data_dir: &Path, street_key: &str) -> Self {
        let dir = data_dir.join(street_key);
        Self {
            results_path: dir.join(RESULTS_FILE),
            images_dir: dir.join(IMAGES_DIR),
            dir,
        }
    }
}

/// File-backed result store rooted at `data_dir`.
#[derive(Debug, Clone)]
pub struct ResultStore {
    data_dir: PathBuf,
}

impl ResultStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn paths(&self, target: &StreetTarget) -> StreetPaths {
        StreetPaths::new(&self.data_dir, &target.street_key())
    }

    /// Load the street's results. A missing file is an empty set.
    #[instrument(skip_all, fields(street = %target.street_key()))]
    pub fn load(&self, target: &StreetTarget) -> Result<ResultSet> {
        let path = self.paths(target).results_path;
        if !path.exists() {
            debug!(path = %path.display(), "no stored results");
            return Ok(ResultSet::new());
        }
        let (_, results) = read_document(&path)?;
        Ok(results)
    }

    /// Load every street stored under `data_dir`, sorted by directory name.
    ///
    /// Directories without a results file are skipped. Any corrupt store
    /// fails the whole load.
    #[instrument(skip_all, fields(data_dir = %self.data_dir.display()))]
    pub fn load_all(&self) -> Result<Vec<StoredStreet>> {
        if !self.data_dir.exists() {
            debug!("no data directory");
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.data_dir)
            .with_context(|| format!("read data directory {}", self.data_dir.display()))?;
        let mut streets = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("read data directory {}", self.data_dir.display()))?;
            let key = entry.file_name().to_string_lossy().into_owned();
            let path = StreetPaths::new(&self.data_dir, &key).results_path;
            if !path.is_file() {
                continue;
            }
            let (doc, results) = read_document(&path)?;
            streets.push(StoredStreet {
                key,
                street: doc.street,
                suburb: doc.suburb,
                results,
            });
        }
        streets.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(streets = streets.len(), "stored streets loaded");
        Ok(streets)
    }

    /// Load `target` and return a handle that owns its result set.
    pub fn open(&self, target: &StreetTarget) -> Result<StreetStore> {
        let results = self.load(target)?;
        Ok(StreetStore {
            store: self.clone(),
            target: target.clone(),
            results,
        })
    }

    /// Insert or overwrite one result and persist it before returning.
    pub fn append(&self, target: &StreetTarget, result: ProcessedResult) -> Result<()> {
        self.open(target)?.append(result)
    }

    /// Replace the street's persisted results with `results`.
    pub fn write_all(&self, target: &StreetTarget, results: &ResultSet) -> Result<()> {
        let path = self.paths(target).results_path;
        let doc = StoreDocument {
            version: STORE_VERSION,
            street: target.street_name.clone(),
            suburb: target.suburb.clone(),
            results: results.results().to_vec(),
        };
        let mut buf = serde_json::to_string_pretty(&doc).context("serialize results")?;
        buf.push('\n');
        write_atomic(&path, &buf)
    }

    /// Per-likelihood counts for `results`.
    pub fn summary(&self, results: &ResultSet) -> LikelihoodCounts {
        summarize(results)
    }
}

/// Write handle for one street. Holds the in-memory view so appends do not
/// re-read the file.
#[derive(Debug)]
pub struct StreetStore {
    store: ResultStore,
    target: StreetTarget,
    results: ResultSet,
}

impl StreetStore {
    pub fn target(&self) -> &StreetTarget {
        &self.target
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    /// Insert or overwrite one result; durable on return.
    #[instrument(skip_all, fields(street = %self.target.street_key(), address = %result.address))]
    pub fn append(&mut self, result: ProcessedResult) -> Result<()> {
        let inserted = self.results.insert(result);
        debug!(inserted, entries = self.results.len(), "appending result");
        self.store.write_all(&self.target, &self.results)
    }

    /// Replace the whole set (used by dedupe).
    pub fn replace(&mut self, results: ResultSet) -> Result<()> {
        self.results = results;
        self.store.write_all(&self.target, &self.results)
    }
}

/// Parse and validate one results file. Every failure is a
/// [`StoreCorruptionError`].
fn read_document(path: &Path) -> Result<(StoreDocument, ResultSet)> {
    let corrupt = |reason: String| StoreCorruptionError {
        path: path.to_path_buf(),
        reason,
    };
    let contents =
        fs::read_to_string(path).map_err(|err| corrupt(format!("read failed: {err}")))?;
    let mut doc: StoreDocument = serde_json::from_str(&contents)
        .map_err(|err| corrupt(format!("parse failed: {err}")))?;
    if doc.version != STORE_VERSION {
        return Err(corrupt(format!("unsupported version {}", doc.version)).into());
    }
    let results = ResultSet::from_results(std::mem::take(&mut doc.results)).map_err(corrupt)?;
    debug!(path = %path.display(), entries = results.len(), "stored results loaded");
    Ok((doc, results))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("results path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("create temp results {}", tmp_path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write temp results {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("sync temp results {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace results {}", path.display()))?;
    Ok(())
}
