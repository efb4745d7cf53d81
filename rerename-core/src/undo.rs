use crate::error::ErrorKind;
use crate::executor::{move_entry, ExecutionError, ExecutionLog, ExecutorOptions};
use crate::fs::Filesystem;
use crate::item::{Item, ItemId};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use thiserror::Error;

/// Where one item went during a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMove {
    pub item: ItemId,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// The physical moves of one executed batch, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoRecord {
    pub steps: Vec<(PathBuf, PathBuf)>,
    pub moves: Vec<ItemMove>,
    pub timestamp: DateTime<Local>,
}

impl UndoRecord {
    pub fn new(steps: Vec<(PathBuf, PathBuf)>, moves: Vec<ItemMove>) -> Self {
        Self {
            steps,
            moves,
            timestamp: Local::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// An item taken out of the batch, with the display position it had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedItem {
    pub position: usize,
    pub item: Item,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoEntry {
    RenameBatch(UndoRecord),
    AddItems(Vec<ItemId>),
    RemoveItems(Vec<RemovedItem>),
}

/// Undo entries, newest last. With a capacity the oldest entries are evicted.
#[derive(Debug, Clone, Default)]
pub struct UndoStack {
    entries: VecDeque<UndoEntry>,
    capacity: Option<usize>,
}

impl UndoStack {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, entry: UndoEntry) {
        if self.capacity == Some(0) {
            return;
        }
        self.entries.push_back(entry);
        if let Some(max) = self.capacity {
            while self.entries.len() > max {
                self.entries.pop_front();
            }
        }
    }

    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop_back()
    }

    pub fn peek(&self) -> Option<&UndoEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Error)]
pub enum UndoError {
    #[error("{} no longer exists", path.display())]
    TargetMissing { path: PathBuf },
    #[error("{} is already taken", path.display())]
    OriginalOccupied { path: PathBuf },
    #[error(transparent)]
    Move(#[from] ExecutionError),
}

impl UndoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TargetMissing { .. } => ErrorKind::UndoTargetMissing,
            Self::OriginalOccupied { .. } => ErrorKind::RenameRaceFailure,
            Self::Move(err) => err.kind(),
        }
    }
}

#[derive(Debug)]
pub struct UndoFailure {
    /// Path the entry was renamed to
    pub current: PathBuf,
    /// Path it should have been restored to
    pub original: PathBuf,
    pub error: UndoError,
}

#[derive(Debug, Default)]
pub struct UndoReport {
    pub reverted: Vec<(PathBuf, PathBuf)>,
    pub failures: Vec<UndoFailure>,
}

impl UndoReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// What a session-level undo did.
#[derive(Debug)]
pub enum UndoOutcome {
    /// The stack was empty
    Nothing,
    Renames(UndoReport),
    /// An add was undone by removing this many items
    ItemsRemoved(usize),
    /// A removal was undone by putting this many items back
    ItemsRestored(usize),
}

/// Reverse every step of `record`, newest first. Failures are collected and
/// the remaining steps still run.
pub fn revert_record(
    record: &UndoRecord,
    fs: &dyn Filesystem,
    options: &ExecutorOptions,
) -> UndoReport {
    let mut log = ExecutionLog::open(options.log_file.as_deref());
    let mut report = UndoReport::default();
    log.log(&format!("Undoing batch of {} steps", record.steps.len()));

    for (original, current) in record.steps.iter().rev() {
        let result = if !fs.exists(current) {
            Err(UndoError::TargetMissing {
                path: current.clone(),
            })
        } else if fs.exists(original) {
            Err(UndoError::OriginalOccupied {
                path: original.clone(),
            })
        } else {
            move_entry(fs, current, original, &mut log).map_err(UndoError::from)
        };

        match result {
            Ok(()) => report.reverted.push((current.clone(), original.clone())),
            Err(error) => {
                tracing::warn!(
                    path = %current.display(),
                    error = %error,
                    "could not undo rename"
                );
                log.log(&format!("Undo failed: {error}"));
                report.failures.push(UndoFailure {
                    current: current.clone(),
                    original: original.clone(),
                    error,
                });
            },
        }
    }

    tracing::info!(
        reverted = report.reverted.len(),
        failed = report.failures.len(),
        "undo finished"
    );
    report
}
