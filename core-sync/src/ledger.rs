//! # Execution & Media Ledgers
//!
//! Durable state that makes the engine idempotent and resumable.
//!
//! ## Overview
//!
//! - **Execution ledger**: append-only JSONL log, one record per line, mapping
//!   SKU → last-applied fingerprint + outcome. The in-memory view keeps only
//!   the latest entry per SKU (last-write-wins by append order). Records are
//!   appended, never edited; an explicit [`ExecutionLedger::compact`] rewrites
//!   the file keeping one entry per SKU behind an atomic rename.
//! - **Media ledger**: compact JSON snapshot mapping content checksum →
//!   remote asset id. Rewritten in full on save because its cardinality (one
//!   entry per unique binary) stays small.
//!
//! Both ledgers serialize all mutation internally so concurrent workers can
//! share one instance behind an `Arc`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use bridge_traits::error::{Result, SyncError};
use bridge_traits::time::Clock;

use crate::config::CorruptionPolicy;
use crate::outcome::SyncAction;

/// Status recorded with a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Error,
}

/// One execution ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sku: String,
    /// Last-applied content fingerprint; empty on failure records so the
    /// item can never be mistaken for a no-op on the next run
    pub hash: String,
    pub action: SyncAction,
    pub status: RecordStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub remote_id: Option<i64>,
    /// Set when a run started but did not confirm success
    #[serde(default)]
    pub incomplete: bool,
}

struct LedgerState {
    entries: HashMap<String, LedgerEntry>,
    skipped_lines: usize,
}

/// Append-only execution ledger.
pub struct ExecutionLedger {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
}

impl ExecutionLedger {
    /// Open (and load) the ledger at `path`.
    ///
    /// A malformed line is fatal under [`CorruptionPolicy::Fail`] — silently
    /// dropping ledger state risks duplicate remote writes. `Rebuild` is
    /// reserved and treated as `Fail`.
    pub async fn open(
        path: impl Into<PathBuf>,
        corruption_policy: CorruptionPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.into();
        let mut entries = HashMap::new();
        let mut skipped_lines = 0usize;

        if path.exists() {
            let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
                SyncError::ledger("", "ledger_load", format!("cannot read ledger: {e}"))
            })?;

            for (index, line) in text.lines().enumerate() {
                let line_num = index + 1;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match serde_json::from_str::<LedgerEntry>(line) {
                    Ok(entry) => {
                        entries.insert(entry.sku.clone(), entry);
                    }
                    Err(e) => match corruption_policy {
                        CorruptionPolicy::IgnoreCorruptLines => {
                            skipped_lines += 1;
                            warn!(line_num, error = %e, "skipping corrupt ledger entry");
                        }
                        CorruptionPolicy::Fail | CorruptionPolicy::Rebuild => {
                            return Err(SyncError::ledger(
                                "",
                                "ledger_load",
                                format!("corrupt ledger entry at line {line_num}: {e}"),
                            )
                            .with_payload(serde_json::json!({
                                "line": line,
                                "line_num": line_num,
                            })));
                        }
                    },
                }
            }

            if skipped_lines > 0 {
                warn!(skipped_lines, "loaded ledger with corrupt entries skipped");
            }
        }

        Ok(Self {
            path,
            clock,
            state: Mutex::new(LedgerState {
                entries,
                skipped_lines,
            }),
        })
    }

    /// Append one record and update the in-memory index.
    pub async fn record(
        &self,
        sku: &str,
        hash: &str,
        action: SyncAction,
        status: RecordStatus,
        remote_id: Option<i64>,
        incomplete: bool,
    ) -> Result<()> {
        let entry = LedgerEntry {
            sku: sku.to_string(),
            hash: hash.to_string(),
            action,
            status,
            timestamp: self.clock.now(),
            remote_id,
            incomplete,
        };

        let line = serde_json::to_string(&entry).map_err(|e| {
            SyncError::ledger(sku, "ledger_record", format!("cannot serialize entry: {e}"))
        })?;

        // Index update and file append happen under one lock so concurrent
        // workers never interleave partial lines.
        let mut state = self.state.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SyncError::ledger(sku, "ledger_record", format!("cannot create ledger dir: {e}"))
            })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                SyncError::ledger(sku, "ledger_record", format!("cannot open ledger: {e}"))
            })?;

        file.write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| {
                SyncError::ledger(sku, "ledger_record", format!("cannot append entry: {e}"))
            })?;
        file.flush().await.map_err(|e| {
            SyncError::ledger(sku, "ledger_record", format!("cannot flush ledger: {e}"))
        })?;

        state.entries.insert(entry.sku.clone(), entry);
        Ok(())
    }

    /// Latest entry for a SKU.
    pub async fn get(&self, sku: &str) -> Option<LedgerEntry> {
        self.state.lock().await.entries.get(sku).cloned()
    }

    /// Last-applied fingerprint for a SKU, if any.
    pub async fn fingerprint_of(&self, sku: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .entries
            .get(sku)
            .map(|entry| entry.hash.clone())
    }

    /// SKUs whose latest entry is marked incomplete.
    pub async fn incomplete_skus(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut skus: Vec<String> = state
            .entries
            .values()
            .filter(|entry| entry.incomplete)
            .map(|entry| entry.sku.clone())
            .collect();
        skus.sort();
        skus
    }

    /// Number of malformed lines skipped at load time.
    pub async fn skipped_line_count(&self) -> usize {
        self.state.lock().await.skipped_lines
    }

    /// Rewrite the backing file keeping exactly one entry per SKU.
    ///
    /// Writes to a temp file and atomically renames over the store so
    /// readers never observe a partial file.
    pub async fn compact(&self) -> Result<()> {
        let state = self.state.lock().await;
        if state.entries.is_empty() {
            return Ok(());
        }

        let mut entries: Vec<&LedgerEntry> = state.entries.values().collect();
        entries.sort_by(|a, b| a.sku.cmp(&b.sku));

        let mut contents = String::new();
        for entry in entries {
            let line = serde_json::to_string(entry).map_err(|e| {
                SyncError::ledger("", "ledger_compact", format!("cannot serialize entry: {e}"))
            })?;
            contents.push_str(&line);
            contents.push('\n');
        }

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, contents).await.map_err(|e| {
            SyncError::ledger("", "ledger_compact", format!("cannot write temp file: {e}"))
        })?;
        tokio::fs::rename(&temp_path, &self.path).await.map_err(|e| {
            SyncError::ledger("", "ledger_compact", format!("cannot replace ledger: {e}"))
        })?;

        debug!(path = %self.path.display(), "compacted execution ledger");
        Ok(())
    }

    /// Appends are written through immediately; flush exists for teardown
    /// symmetry with the media ledger.
    pub async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// One media ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaLedgerEntry {
    pub checksum: String,
    pub asset_id: i64,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
}

struct MediaLedgerState {
    entries: HashMap<String, MediaLedgerEntry>,
    dirty: bool,
}

/// Checksum → remote asset dedup ledger.
pub struct MediaLedger {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    state: Mutex<MediaLedgerState>,
}

impl MediaLedger {
    /// Open (and load) the media ledger. The snapshot is a dedup cache, not
    /// a source of truth, so a corrupt file starts empty instead of failing.
    pub async fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        let path = path.into();
        let mut entries = HashMap::new();

        if path.exists() {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => match serde_json::from_str::<HashMap<String, MediaLedgerEntry>>(&text) {
                    Ok(loaded) => entries = loaded,
                    Err(e) => warn!(error = %e, "media ledger unreadable, starting empty"),
                },
                Err(e) => warn!(error = %e, "cannot read media ledger, starting empty"),
            }
        }

        Self {
            path,
            clock,
            state: Mutex::new(MediaLedgerState {
                entries,
                dirty: false,
            }),
        }
    }

    /// Record an uploaded asset. First-writer-wins: an existing mapping for
    /// the checksum is never overwritten with a different asset id.
    pub async fn record(&self, checksum: &str, asset_id: i64, filename: &str) {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.entries.get(checksum) {
            if existing.asset_id != asset_id {
                warn!(
                    checksum,
                    existing = existing.asset_id,
                    rejected = asset_id,
                    "media ledger already maps this checksum; keeping first writer"
                );
            }
            return;
        }

        state.entries.insert(
            checksum.to_string(),
            MediaLedgerEntry {
                checksum: checksum.to_string(),
                asset_id,
                filename: filename.to_string(),
                uploaded_at: self.clock.now(),
            },
        );
        state.dirty = true;
    }

    /// Previously uploaded asset id for a checksum, if any.
    pub async fn asset_id(&self, checksum: &str) -> Option<i64> {
        self.state
            .lock()
            .await
            .entries
            .get(checksum)
            .map(|entry| entry.asset_id)
    }

    pub async fn get(&self, checksum: &str) -> Option<MediaLedgerEntry> {
        self.state.lock().await.entries.get(checksum).cloned()
    }

    /// Persist the whole table via write-temp-then-rename. No-op when clean.
    pub async fn save(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SyncError::ledger("", "media_ledger_save", format!("cannot create dir: {e}"))
            })?;
        }

        let contents = serde_json::to_string_pretty(&state.entries).map_err(|e| {
            SyncError::ledger("", "media_ledger_save", format!("cannot serialize: {e}"))
        })?;

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, contents).await.map_err(|e| {
            SyncError::ledger("", "media_ledger_save", format!("cannot write temp file: {e}"))
        })?;
        tokio::fs::rename(&temp_path, &self.path).await.map_err(|e| {
            SyncError::ledger("", "media_ledger_save", format!("cannot replace ledger: {e}"))
        })?;

        state.dirty = false;
        Ok(())
    }

    /// Directory holding this ledger (lock markers live beside it).
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::SystemClock;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(SystemClock)
    }

    #[tokio::test]
    async fn records_are_visible_to_a_fresh_instance() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.jsonl");

        let ledger = ExecutionLedger::open(&path, CorruptionPolicy::Fail, clock())
            .await
            .unwrap();
        ledger
            .record("SKU-1", "abc", SyncAction::Created, RecordStatus::Success, Some(42), false)
            .await
            .unwrap();

        let reopened = ExecutionLedger::open(&path, CorruptionPolicy::Fail, clock())
            .await
            .unwrap();
        let entry = reopened.get("SKU-1").await.unwrap();
        assert_eq!(entry.hash, "abc");
        assert_eq!(entry.remote_id, Some(42));
        assert_eq!(entry.action, SyncAction::Created);
    }

    #[tokio::test]
    async fn latest_entry_wins_per_sku() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.jsonl");

        let ledger = ExecutionLedger::open(&path, CorruptionPolicy::Fail, clock())
            .await
            .unwrap();
        ledger
            .record("SKU-1", "old", SyncAction::Created, RecordStatus::Success, Some(1), false)
            .await
            .unwrap();
        ledger
            .record("SKU-1", "new", SyncAction::Updated, RecordStatus::Success, Some(1), false)
            .await
            .unwrap();

        assert_eq!(ledger.fingerprint_of("SKU-1").await.as_deref(), Some("new"));

        // both lines are on disk until compaction
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn corrupt_line_fails_load_under_fail_policy() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.jsonl");
        std::fs::write(&path, "{broken\n").unwrap();

        let result = ExecutionLedger::open(&path, CorruptionPolicy::Fail, clock()).await;
        let err = result.err().expect("load should fail");
        assert_eq!(err.kind(), "ledger");
    }

    #[tokio::test]
    async fn corrupt_line_is_skipped_under_ignore_policy() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.jsonl");

        let good = serde_json::json!({
            "sku": "SKU-1", "hash": "abc", "action": "created",
            "status": "success", "timestamp": "2026-01-01T00:00:00Z"
        });
        let contents = format!("{good}\n{{broken\n{good}\n");
        std::fs::write(&path, contents).unwrap();

        let ledger =
            ExecutionLedger::open(&path, CorruptionPolicy::IgnoreCorruptLines, clock())
                .await
                .unwrap();
        assert_eq!(ledger.skipped_line_count().await, 1);
        assert!(ledger.get("SKU-1").await.is_some());
    }

    #[tokio::test]
    async fn compact_keeps_one_entry_per_sku() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.jsonl");

        let ledger = ExecutionLedger::open(&path, CorruptionPolicy::Fail, clock())
            .await
            .unwrap();
        for hash in ["a", "b", "c"] {
            ledger
                .record("SKU-1", hash, SyncAction::Updated, RecordStatus::Success, Some(1), false)
                .await
                .unwrap();
        }
        ledger
            .record("SKU-2", "z", SyncAction::Created, RecordStatus::Success, Some(2), false)
            .await
            .unwrap();

        ledger.compact().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);

        let reopened = ExecutionLedger::open(&path, CorruptionPolicy::Fail, clock())
            .await
            .unwrap();
        assert_eq!(reopened.fingerprint_of("SKU-1").await.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn incomplete_skus_reflect_latest_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.jsonl");

        let ledger = ExecutionLedger::open(&path, CorruptionPolicy::Fail, clock())
            .await
            .unwrap();
        ledger
            .record("SKU-1", "", SyncAction::Failed, RecordStatus::Error, None, true)
            .await
            .unwrap();
        ledger
            .record("SKU-2", "ok", SyncAction::Created, RecordStatus::Success, Some(7), false)
            .await
            .unwrap();

        assert_eq!(ledger.incomplete_skus().await, vec!["SKU-1"]);

        // a later successful record clears the flag
        ledger
            .record("SKU-1", "ok", SyncAction::Updated, RecordStatus::Success, Some(9), false)
            .await
            .unwrap();
        assert!(ledger.incomplete_skus().await.is_empty());
    }

    #[tokio::test]
    async fn media_ledger_round_trips_and_keeps_first_writer() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("media_ledger.json");

        let ledger = MediaLedger::open(&path, clock()).await;
        ledger.record("abc", 10, "main.jpg").await;
        ledger.record("abc", 99, "other.jpg").await;
        assert_eq!(ledger.asset_id("abc").await, Some(10));

        ledger.save().await.unwrap();

        let reopened = MediaLedger::open(&path, clock()).await;
        assert_eq!(reopened.asset_id("abc").await, Some(10));
        assert_eq!(reopened.get("abc").await.unwrap().filename, "main.jpg");
    }

    #[tokio::test]
    async fn corrupt_media_ledger_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("media_ledger.json");
        std::fs::write(&path, "not json at all").unwrap();

        let ledger = MediaLedger::open(&path, clock()).await;
        assert_eq!(ledger.asset_id("abc").await, None);
    }
}
