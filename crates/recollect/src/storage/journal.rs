//! Append-only transaction journal
//!
//! Every committed write is one JSON line holding the list of [`LogEntry`]
//! values it applied. Replaying the lines in order through
//! [`StoreState::apply`](super::state::StoreState::apply) rebuilds the
//! records, the vector index and the relationship graph.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{RecollectError, Result};
use crate::memory::types::{Memory, MemoryLink};

/// Default journal file name inside the data directory
pub const JOURNAL_FILE: &str = "journal.jsonl";

/// A single state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEntry {
    /// Insert or replace a memory record
    PutMemory { memory: Memory },
    /// Delete a memory and every edge touching it
    RemoveMemory { id: Uuid },
    /// Flip the archived flag on a set of memories
    SetArchived {
        ids: Vec<Uuid>,
        archived: bool,
        at: DateTime<Utc>,
    },
    PutLink { link: MemoryLink },
    RemoveLink { link: MemoryLink },
}

/// One journal line
#[derive(Debug, Serialize, Deserialize)]
struct Transaction {
    at: DateTime<Utc>,
    entries: Vec<LogEntry>,
}

/// Durable storage for committed transactions
#[async_trait]
pub trait Journal: Send + Sync {
    /// Durably record one transaction. On error nothing is recorded.
    async fn append(&self, entries: &[LogEntry]) -> Result<()>;

    /// Every recorded entry, in commit order
    async fn replay(&self) -> Result<Vec<LogEntry>>;

    /// Atomically replace the whole journal with `entries`
    async fn rewrite(&self, entries: &[LogEntry]) -> Result<()>;
}

fn io_error(context: &str, path: &Path, err: std::io::Error) -> RecollectError {
    RecollectError::Storage(format!("{context} {}: {err}", path.display()))
}

fn encode(entries: &[LogEntry]) -> Result<String> {
    let transaction = Transaction {
        at: Utc::now(),
        entries: entries.to_vec(),
    };
    let mut line = serde_json::to_string(&transaction)
        .map_err(|e| RecollectError::Storage(format!("Failed to encode transaction: {e}")))?;
    line.push('\n');
    Ok(line)
}

/// JSON-lines journal on the local filesystem
pub struct FileJournal {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileJournal {
    /// Open (or create) the journal at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error("Failed to create directory", parent, e))?;
            }
        }
        let file = Self::open_append(&path).await?;
        debug!("Opened journal at {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open_append(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| io_error("Failed to open journal", path, e))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| JOURNAL_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Journal for FileJournal {
    async fn append(&self, entries: &[LogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let line = encode(entries)?;

        let mut file = self.file.lock().await;
        let len = file
            .metadata()
            .await
            .map_err(|e| io_error("Failed to stat journal", &self.path, e))?
            .len();

        let written = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            file.sync_data().await
        }
        .await;

        if let Err(err) = written {
            warn!("Journal append failed, truncating to {len} bytes: {err}");
            if let Err(truncate_err) = file.set_len(len).await {
                warn!("Failed to truncate journal: {truncate_err}");
            }
            return Err(io_error("Failed to append to journal", &self.path, err));
        }

        debug!(entries = entries.len(), "Appended transaction");
        Ok(())
    }

    async fn replay(&self) -> Result<Vec<LogEntry>> {
        let file = self.file.lock().await;
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("Failed to read journal", &self.path, e)),
        };

        let mut entries = Vec::new();
        let mut offset = 0usize;
        let mut lines = text.split_inclusive('\n').peekable();
        let mut line_no = 0usize;

        while let Some(raw) = lines.next() {
            line_no += 1;
            let line = raw.trim();
            if line.is_empty() {
                offset += raw.len();
                continue;
            }

            match serde_json::from_str::<Transaction>(line) {
                Ok(transaction) => entries.extend(transaction.entries),
                Err(err) if lines.peek().is_none() => {
                    warn!(
                        "Ignoring torn journal tail at line {line_no} of {}: {err}",
                        self.path.display()
                    );
                    file.set_len(offset as u64)
                        .await
                        .map_err(|e| io_error("Failed to truncate journal", &self.path, e))?;
                    break;
                }
                Err(err) => {
                    return Err(RecollectError::Storage(format!(
                        "Corrupt journal {} at line {line_no}: {err}",
                        self.path.display()
                    )));
                }
            }
            offset += raw.len();
        }

        Ok(entries)
    }

    async fn rewrite(&self, entries: &[LogEntry]) -> Result<()> {
        let mut file = self.file.lock().await;
        let temp = self.temp_path();

        let mut contents = String::new();
        for entry in entries {
            contents.push_str(&encode(std::slice::from_ref(entry))?);
        }

        let mut out = File::create(&temp)
            .await
            .map_err(|e| io_error("Failed to create", &temp, e))?;
        out.write_all(contents.as_bytes())
            .await
            .map_err(|e| io_error("Failed to write", &temp, e))?;
        out.sync_all()
            .await
            .map_err(|e| io_error("Failed to sync", &temp, e))?;
        drop(out);

        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| io_error("Failed to replace journal", &self.path, e))?;
        *file = Self::open_append(&self.path).await?;

        debug!(entries = entries.len(), "Rewrote journal");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::Relationship;
    use tempfile::tempdir;

    fn memory(content: &str) -> Memory {
        Memory::new(content.to_string(), vec![1.0, 0.0])
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let dir = tempdir().unwrap();
        let journal = FileJournal::open(dir.path().join(JOURNAL_FILE)).await.unwrap();

        let a = memory("a");
        let b = memory("b");
        journal
            .append(&[LogEntry::PutMemory { memory: a.clone() }])
            .await
            .unwrap();
        journal
            .append(&[
                LogEntry::PutMemory { memory: b.clone() },
                LogEntry::PutLink {
                    link: MemoryLink::new(a.id, b.id, Relationship::Follows),
                },
            ])
            .await
            .unwrap();

        let entries = journal.replay().await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], LogEntry::PutMemory { memory: a });

        let text = std::fs::read_to_string(journal.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(JOURNAL_FILE);
        let journal = FileJournal::open(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(journal.replay().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_torn_tail_is_ignored_and_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        let journal = FileJournal::open(&path).await.unwrap();
        journal
            .append(&[LogEntry::PutMemory {
                memory: memory("kept"),
            }])
            .await
            .unwrap();

        let mut raw = std::fs::read_to_string(&path).unwrap();
        let intact_len = raw.len();
        raw.push_str(r#"{"at":"2024-01-01T00:00:00Z","entries":[{"kind":"put_mem"#);
        std::fs::write(&path, raw).unwrap();

        let entries = journal.replay().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), intact_len as u64);

        // Appends after recovery land on a clean line
        journal
            .append(&[LogEntry::RemoveMemory { id: Uuid::new_v4() }])
            .await
            .unwrap();
        assert_eq!(journal.replay().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_corruption_before_tail_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        let journal = FileJournal::open(&path).await.unwrap();
        journal
            .append(&[LogEntry::RemoveMemory { id: Uuid::new_v4() }])
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, format!("not json\n{raw}")).unwrap();

        let err = journal.replay().await.unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn test_rewrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        let journal = FileJournal::open(&path).await.unwrap();

        for i in 0..5 {
            journal
                .append(&[LogEntry::PutMemory {
                    memory: memory(&format!("m{i}")),
                }])
                .await
                .unwrap();
        }

        let snapshot = vec![LogEntry::PutMemory {
            memory: memory("only"),
        }];
        journal.rewrite(&snapshot).await.unwrap();
        assert_eq!(journal.replay().await.unwrap(), snapshot);
        assert!(!journal.temp_path().exists());

        journal
            .append(&[LogEntry::RemoveMemory { id: Uuid::new_v4() }])
            .await
            .unwrap();
        assert_eq!(journal.replay().await.unwrap().len(), 2);
    }

    #[test]
    fn test_entry_json_shape() {
        let id = Uuid::nil();
        let json = serde_json::to_value(LogEntry::RemoveMemory { id }).unwrap();
        assert_eq!(json["kind"], "remove_memory");
        assert_eq!(json["id"], id.to_string());
    }
}
