//! Append-only JSON Lines journal of monitor events.
//!
//! Layout: `{data_dir}/monitors.jsonl`, one event per line:
//!
//! ```json
//! {"event":"created","monitor":{...}}
//! {"event":"triggered","id":"...","at":"..."}
//! {"event":"removed","id":"..."}
//! ```
//!
//! Every mutation is written and fsync'd before the in-memory view changes,
//! so a crash never leaves the view ahead of the file. A failed append is cut
//! back out of the file before the error is returned. On open the
//! journal is replayed; a truncated final line (torn write) is dropped with a
//! warning and cut from the file, any other unreadable line fails the open.

use crate::error::{StoreError, StoreResult};
use crate::store::{sort_by_age, MonitorStore};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tickwatch_core::{BoxFuture, Monitor, MonitorId, MonitorSpec};
use tracing::{debug, error, info, warn};

const JOURNAL_FILE: &str = "monitors.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JournalEvent {
    Created { monitor: Monitor },
    Triggered { id: MonitorId, at: DateTime<Utc> },
    Removed { id: MonitorId },
}

struct JournalState {
    path: PathBuf,
    records: HashMap<MonitorId, Monitor>,
    file: File,
    /// Bytes of committed events in the file.
    len: u64,
    /// Lines currently in the file, live or not.
    lines: usize,
    /// A failed append could not be rolled back; writes stay refused until
    /// the journal is compacted or reopened.
    poisoned: bool,
}

impl JournalState {
    fn append(&mut self, event: &JournalEvent) -> StoreResult<()> {
        if self.poisoned {
            return Err(StoreError::Unavailable(
                "journal holds an unreverted failed write".to_string(),
            ));
        }

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        if let Err(e) = self.write_synced(&line) {
            if let Err(rollback) = truncate(&self.path, self.len) {
                error!(path = %self.path.display(), error = %rollback, "Journal rollback failed");
                self.poisoned = true;
            }
            return Err(e.into());
        }

        self.len += line.len() as u64;
        self.lines += 1;
        Ok(())
    }

    fn write_synced(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line)?;
        self.file.sync_data()
    }
}

fn truncate(path: &Path, len: u64) -> std::io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_data()
}

pub struct JournalMonitorStore {
    path: PathBuf,
    state: Mutex<JournalState>,
}

impl JournalMonitorStore {
    /// Open (or create) the journal under `data_dir` and replay it.
    pub fn open(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(JOURNAL_FILE);

        let (records, lines) = if path.exists() {
            replay(&path)?
        } else {
            (HashMap::new(), 0)
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let len = file.metadata()?.len();
        info!(
            path = %path.display(),
            records = records.len(),
            lines,
            "Monitor journal opened"
        );

        Ok(Self {
            path: path.clone(),
            state: Mutex::new(JournalState {
                path,
                records,
                file,
                len,
                lines,
                poisoned: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines in the journal file.
    pub fn journal_lines(&self) -> usize {
        self.state.lock().lines
    }

    /// Rewrite the journal with one `created` line per live record.
    ///
    /// The new file is written next to the old one and renamed over it, so a
    /// crash mid-compaction leaves the previous journal intact.
    pub fn compact(&self) -> StoreResult<usize> {
        let mut state = self.state.lock();
        let before = state.lines;

        let mut monitors: Vec<Monitor> = state.records.values().cloned().collect();
        sort_by_age(&mut monitors);

        let tmp_path = self.path.with_extension("jsonl.tmp");
        {
            let tmp = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(tmp);
            for monitor in &monitors {
                let event = JournalEvent::Created {
                    monitor: monitor.clone(),
                };
                writeln!(writer, "{}", serde_json::to_string(&event)?)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        state.len = file.metadata()?.len();
        state.file = file;
        state.lines = monitors.len();
        state.poisoned = false;

        info!(before, after = state.lines, "Monitor journal compacted");
        Ok(state.lines)
    }
}

/// Rebuild the record map from the journal at `path`.
fn replay(path: &Path) -> StoreResult<(HashMap<MonitorId, Monitor>, usize)> {
    let content = std::fs::read_to_string(path)?;
    let mut records = HashMap::new();
    let mut lines = 0usize;
    let mut valid_len = 0usize;
    let mut torn = false;

    let segments: Vec<&str> = content.split_inclusive('\n').collect();
    let last = segments.len().saturating_sub(1);

    for (idx, segment) in segments.iter().enumerate() {
        let line = segment.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            valid_len += segment.len();
            continue;
        }

        match serde_json::from_str::<JournalEvent>(line) {
            Ok(event) => {
                apply(&mut records, event);
                lines += 1;
                valid_len += segment.len();
            }
            Err(e) if idx == last && !segment.ends_with('\n') => {
                warn!(line = idx + 1, error = %e, "Dropping torn final journal line");
                torn = true;
            }
            Err(e) => {
                return Err(StoreError::Corrupt {
                    line: idx + 1,
                    reason: e.to_string(),
                });
            }
        }
    }

    if torn {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len as u64)?;
        file.sync_all()?;
    }

    Ok((records, lines))
}

fn apply(records: &mut HashMap<MonitorId, Monitor>, event: JournalEvent) {
    match event {
        JournalEvent::Created { monitor } => {
            records.insert(monitor.id, monitor);
        }
        JournalEvent::Triggered { id, at } => match records.get_mut(&id) {
            Some(monitor) => {
                monitor.mark_triggered(at);
            }
            None => debug!(%id, "Triggered event for unknown monitor"),
        },
        JournalEvent::Removed { id } => {
            records.remove(&id);
        }
    }
}

impl MonitorStore for JournalMonitorStore {
    fn create(&self, spec: MonitorSpec) -> BoxFuture<'_, StoreResult<Monitor>> {
        Box::pin(async move {
            let monitor = Monitor::from_spec(spec);
            let mut state = self.state.lock();
            state.append(&JournalEvent::Created {
                monitor: monitor.clone(),
            })?;
            state.records.insert(monitor.id, monitor.clone());
            Ok(monitor)
        })
    }

    fn get(&self, id: MonitorId) -> BoxFuture<'_, StoreResult<Option<Monitor>>> {
        Box::pin(async move { Ok(self.state.lock().records.get(&id).cloned()) })
    }

    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<Monitor>>> {
        Box::pin(async move {
            let mut out: Vec<Monitor> = self.state.lock().records.values().cloned().collect();
            sort_by_age(&mut out);
            Ok(out)
        })
    }

    fn list_active(&self) -> BoxFuture<'_, StoreResult<Vec<Monitor>>> {
        Box::pin(async move {
            let mut out: Vec<Monitor> = self
                .state
                .lock()
                .records
                .values()
                .filter(|m| m.is_active())
                .cloned()
                .collect();
            sort_by_age(&mut out);
            Ok(out)
        })
    }

    fn mark_triggered(
        &self,
        id: MonitorId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            let active = state.records.get(&id).is_some_and(|m| m.is_active());
            if !active {
                return Ok(false);
            }
            state.append(&JournalEvent::Triggered { id, at })?;
            Ok(state
                .records
                .get_mut(&id)
                .is_some_and(|m| m.mark_triggered(at)))
        })
    }

    fn remove(&self, id: MonitorId) -> BoxFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            if !state.records.contains_key(&id) {
                return Ok(false);
            }
            state.append(&JournalEvent::Removed { id })?;
            state.records.remove(&id);
            Ok(true)
        })
    }
}
