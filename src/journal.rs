//! Append-only log of store writes.
//!
//! Every write is recorded as `pending` before it is issued and followed by a
//! `done` or `failed` line afterwards, so a run that died halfway through the
//! writer leaves behind exactly the operations that need checking or
//! replaying.
//!
//! A run whose writes all complete rewrites the whole current batch, which
//! supersedes anything older, so the log is cleared afterwards.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ReconError, Result};
use crate::model::now_timestamp;
use crate::writer::WriteOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub run_id: String,
    pub seq: usize,
    pub at: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<WriteOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Journal {
    path: Option<PathBuf>,
    run_id: String,
    seq: usize,
}

impl Journal {
    pub fn open(path: &Path, run_id: &str) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            run_id: run_id.to_string(),
            seq: 0,
        }
    }

    /// A journal that records nothing.
    pub fn disabled() -> Self {
        Self {
            path: None,
            run_id: String::new(),
            seq: 0,
        }
    }

    /// Record an intended write; returns its sequence number.
    pub fn begin(&mut self, op: &WriteOp) -> Result<usize> {
        self.seq += 1;
        let entry = Entry {
            run_id: self.run_id.clone(),
            seq: self.seq,
            at: now_timestamp(),
            status: Status::Pending,
            op: Some(op.clone()),
            error: None,
        };
        self.append(&entry)?;
        Ok(self.seq)
    }

    pub fn finish(&mut self, seq: usize, error: Option<&ReconError>) -> Result<()> {
        let entry = Entry {
            run_id: self.run_id.clone(),
            seq,
            at: now_timestamp(),
            status: if error.is_some() {
                Status::Failed
            } else {
                Status::Done
            },
            op: None,
            error: error.map(|e| e.to_string()),
        };
        self.append(&entry)
    }

    /// Drop the log after a run in which every write reached `done`.
    pub fn clear(&self) -> Result<()> {
        match &self.path {
            Some(path) if path.exists() => Ok(fs::write(path, "")?),
            _ => Ok(()),
        }
    }

    fn append(&self, entry: &Entry) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Writes from earlier runs that never reached `done`, oldest first. The
/// returned entries carry the operation and their final status
/// (`pending` when the process died mid-write).
pub fn unfinished(path: &Path) -> Result<Vec<Entry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)?;

    let mut order: Vec<(String, usize)> = Vec::new();
    let mut intents: HashMap<(String, usize), Entry> = HashMap::new();
    for (n, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let entry: Entry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable journal line {} in {}: {}", n + 1, path.display(), e);
                continue;
            }
        };
        let key = (entry.run_id.clone(), entry.seq);
        match entry.status {
            Status::Pending => {
                order.push(key.clone());
                intents.insert(key, entry);
            }
            status => {
                if let Some(intent) = intents.get_mut(&key) {
                    intent.status = status;
                    intent.error = entry.error;
                }
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|key| intents.remove(&key))
        .filter(|e| e.status != Status::Done)
        .collect())
}
