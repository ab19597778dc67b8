//! Version Store - append-only persistence of version records
//!
//! Records are appended to `versions.jsonl` (fsync per append) and indexed
//! in memory by subject. On open the log is replayed to rebuild the index.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::types::{NewVersion, SubjectRef, TrailResult, VersionRecord};
use crate::utils::next_monotonic;

/// Configuration for the VersionStore
#[derive(Debug, Clone)]
pub struct VersionStoreConfig {
    /// Directory holding `versions.jsonl`; `None` keeps records in memory only
    pub data_dir: Option<PathBuf>,
    /// Whether to fsync after every append
    pub sync_writes: bool,
}

impl Default for VersionStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: Some(PathBuf::from("data")),
            sync_writes: true,
        }
    }
}

impl VersionStoreConfig {
    /// Persist under `data_dir`
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: Some(data_dir.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Keep records in memory only
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            sync_writes: false,
        }
    }

    /// Path to versions.jsonl, if persistent
    pub fn log_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("versions.jsonl"))
    }
}

#[derive(Default)]
struct StoreInner {
    /// Records in id order
    records: Vec<Arc<VersionRecord>>,
    /// (subject type, subject id) -> positions in `records`, ascending
    by_subject: HashMap<SubjectRef, Vec<usize>>,
    next_id: u64,
    last_created_at: Option<DateTime<Utc>>,
}

impl StoreInner {
    fn push(&mut self, record: VersionRecord) -> Arc<VersionRecord> {
        let record = Arc::new(record);
        let position = self.records.len();

        if record.id >= self.next_id {
            self.next_id = record.id + 1;
        }
        if self.last_created_at.map_or(true, |last| record.created_at > last) {
            self.last_created_at = Some(record.created_at);
        }

        self.by_subject
            .entry(record.subject())
            .or_default()
            .push(position);
        self.records.push(Arc::clone(&record));
        record
    }

    /// Strictly increasing creation time, even when the clock stalls
    fn next_created_at(&self) -> DateTime<Utc> {
        next_monotonic(self.last_created_at, Utc::now())
    }
}

/// Newest first: `created_at` descending, then id descending
pub(crate) fn newest_first(a: &Arc<VersionRecord>, b: &Arc<VersionRecord>) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

/// Stores version records and answers subject-indexed reads
pub struct VersionStore {
    config: VersionStoreConfig,
    inner: RwLock<StoreInner>,
    skipped_lines: usize,
}

impl VersionStore {
    /// Open a store, replaying the log if one exists
    pub fn open(config: VersionStoreConfig) -> TrailResult<Self> {
        let mut inner = StoreInner {
            next_id: 1,
            ..Default::default()
        };
        let mut skipped_lines = 0;

        if let Some(path) = config.log_path() {
            if path.exists() {
                skipped_lines = Self::replay(&path, &mut inner)?;
                tracing::info!(
                    path = %path.display(),
                    records = inner.records.len(),
                    skipped = skipped_lines,
                    "Replayed version log"
                );
            }
        }

        Ok(Self {
            config,
            inner: RwLock::new(inner),
            skipped_lines,
        })
    }

    /// In-memory store with no backing file
    pub fn in_memory() -> Self {
        Self {
            config: VersionStoreConfig::in_memory(),
            inner: RwLock::new(StoreInner {
                next_id: 1,
                ..Default::default()
            }),
            skipped_lines: 0,
        }
    }

    fn replay(path: &Path, inner: &mut StoreInner) -> TrailResult<usize> {
        let reader = BufReader::new(File::open(path)?);
        let mut loaded = Vec::new();
        let mut skipped = 0;

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<VersionRecord>(&line) {
                Ok(record) => loaded.push(record),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        path = %path.display(),
                        line = line_num + 1,
                        error = %e,
                        "Skipping corrupt version log line"
                    );
                }
            }
        }

        loaded.sort_by_key(|r| r.id);
        for record in loaded {
            inner.push(record);
        }
        Ok(skipped)
    }

    pub fn config(&self) -> &VersionStoreConfig {
        &self.config
    }

    /// Number of log lines that could not be decoded on open
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Assign identity to `new` and append it
    ///
    /// The write lock is held across the file append so ids, timestamps and
    /// log order always agree.
    pub fn insert(&self, new: NewVersion) -> TrailResult<Arc<VersionRecord>> {
        let mut inner = self.inner.write();
        let record = VersionRecord::from_new(inner.next_id, inner.next_created_at(), new)?;

        if let Some(path) = self.config.log_path() {
            self.append_line(&path, &record)?;
        }

        Ok(inner.push(record))
    }

    fn append_line(&self, path: &Path, record: &VersionRecord) -> TrailResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let json_line = serde_json::to_string(record)?;
        writeln!(file, "{}", json_line)?;

        if self.config.sync_writes {
            file.sync_all()?;
        }
        Ok(())
    }

    pub fn get(&self, id: u64) -> Option<Arc<VersionRecord>> {
        let inner = self.inner.read();
        inner
            .records
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|pos| Arc::clone(&inner.records[pos]))
    }

    /// Every record, newest first
    pub fn all(&self) -> Vec<Arc<VersionRecord>> {
        let mut records = self.inner.read().records.clone();
        records.sort_by(newest_first);
        records
    }

    /// Records for exactly `subject`, newest first, after `offset`, at most `limit`
    pub fn for_subject(
        &self,
        subject: &SubjectRef,
        limit: Option<usize>,
        offset: usize,
    ) -> Vec<Arc<VersionRecord>> {
        let inner = self.inner.read();
        let mut records: Vec<Arc<VersionRecord>> = inner
            .by_subject
            .get(subject)
            .map(|positions| positions.iter().map(|&p| Arc::clone(&inner.records[p])).collect())
            .unwrap_or_default();
        drop(inner);

        records.sort_by(newest_first);
        paginate(records, limit, offset)
    }

    /// Most recent record for `subject`
    pub fn latest_for(&self, subject: &SubjectRef) -> Option<Arc<VersionRecord>> {
        self.for_subject(subject, Some(1), 0).into_iter().next()
    }

    /// Records whose subject is any of `subjects`, newest first
    pub fn for_subjects(
        &self,
        subjects: &BTreeSet<SubjectRef>,
        limit: Option<usize>,
        offset: usize,
    ) -> Vec<Arc<VersionRecord>> {
        let inner = self.inner.read();
        let mut records: Vec<Arc<VersionRecord>> = subjects
            .iter()
            .filter_map(|subject| inner.by_subject.get(subject))
            .flatten()
            .map(|&p| Arc::clone(&inner.records[p]))
            .collect();
        drop(inner);

        records.sort_by(newest_first);
        paginate(records, limit, offset)
    }
}

pub(crate) fn paginate<T>(items: Vec<T>, limit: Option<usize>, offset: usize) -> Vec<T> {
    let iter = items.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}
