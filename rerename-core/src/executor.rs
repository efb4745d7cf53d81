use crate::conflict::CasePolicy;
use crate::error::ErrorKind;
use crate::fs::{is_cross_device, Filesystem};
use crate::item::ItemId;
use crate::undo::{ItemMove, UndoRecord};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Options for executing a rename plan
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Append a line per filesystem step to this file
    pub log_file: Option<PathBuf>,
}

/// One accepted rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRename {
    pub item: ItemId,
    pub from: PathBuf,
    pub to: PathBuf,
    /// Go through a temporary name even without a cycle
    pub case_only: bool,
}

/// Renames accepted from a conflict-free preview, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    pub renames: Vec<PlannedRename>,
    pub case_policy: CasePolicy,
}

impl RenamePlan {
    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("moving {} to {} across volumes failed: {reason}", from.display(), to.display())]
    CrossVolumeFailure {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },
    #[error("{} changed on disk before it could be renamed: {reason}", from.display())]
    RenameRaceFailure {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },
    #[error("failed to rename {} to {}: {source}", from.display(), to.display())]
    Io {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CrossVolumeFailure { .. } => ErrorKind::CrossVolumeFailure,
            Self::RenameRaceFailure { .. } => ErrorKind::RenameRaceFailure,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    fn race(from: &Path, to: &Path, reason: &str) -> Self {
        Self::RenameRaceFailure {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    fn cross_volume(from: &Path, to: &Path, reason: impl Into<String>) -> Self {
        Self::CrossVolumeFailure {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug)]
pub enum ItemOutcome {
    Renamed { from: PathBuf, to: PathBuf },
    Failed(ExecutionError),
}

#[derive(Debug)]
pub struct ItemReport {
    pub item: ItemId,
    pub outcome: ItemOutcome,
}

#[derive(Debug)]
pub struct ExecutionReport {
    pub items: Vec<ItemReport>,
    pub record: UndoRecord,
}

impl ExecutionReport {
    pub fn renamed(&self) -> usize {
        self.items
            .iter()
            .filter(|r| matches!(r.outcome, ItemOutcome::Renamed { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (ItemId, &ExecutionError)> {
        self.items.iter().filter_map(|r| match &r.outcome {
            ItemOutcome::Failed(err) => Some((r.item, err)),
            ItemOutcome::Renamed { .. } => None,
        })
    }
}

/// Appends timestamped lines to the optional apply log. Write failures are
/// reported once and then the file is dropped; they never fail a rename.
pub(crate) struct ExecutionLog {
    log_file: Option<File>,
}

impl ExecutionLog {
    pub(crate) fn open(path: Option<&Path>) -> Self {
        let log_file = path.and_then(|path| {
            let opened = path
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|()| OpenOptions::new().create(true).append(true).open(path));
            match opened {
                Ok(file) => Some(file),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "cannot open apply log");
                    None
                },
            }
        });
        Self { log_file }
    }

    pub(crate) fn log(&mut self, message: &str) {
        tracing::debug!("{message}");
        if let Some(ref mut file) = self.log_file {
            let written = writeln!(
                file,
                "[{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                message
            )
            .and_then(|()| file.flush());
            if let Err(err) = written {
                tracing::warn!(error = %err, "apply log write failed, disabling it");
                self.log_file = None;
            }
        }
    }
}

/// Move one entry, falling back to copy, verify and delete when the rename
/// crosses volumes.
pub(crate) fn move_entry(
    fs: &dyn Filesystem,
    from: &Path,
    to: &Path,
    log: &mut ExecutionLog,
) -> Result<(), ExecutionError> {
    log.log(&format!("Renaming {} -> {}", from.display(), to.display()));
    match fs.rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if is_cross_device(&err) => {
            log.log(&format!(
                "Cross-volume move detected, copying {} -> {}",
                from.display(),
                to.display()
            ));
            move_across_volumes(fs, from, to)
        },
        Err(source) => Err(ExecutionError::Io {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }),
    }
}

fn move_across_volumes(fs: &dyn Filesystem, from: &Path, to: &Path) -> Result<(), ExecutionError> {
    if let Err(err) = fs.copy_verified(from, to) {
        if fs.exists(to) {
            if let Err(cleanup) = fs.remove(to) {
                tracing::warn!(
                    path = %to.display(),
                    error = %cleanup,
                    "failed to clean up partial copy"
                );
            }
        }
        return Err(ExecutionError::cross_volume(from, to, format!("copy failed: {err}")));
    }

    // The copy is complete from here on, so it is kept even if the source
    // cannot be removed.
    if let Err(err) = fs.remove(from) {
        return Err(ExecutionError::cross_volume(
            from,
            to,
            format!("copied but the source could not be removed: {err}"),
        ));
    }
    if fs.exists(from) || !fs.exists(to) {
        return Err(ExecutionError::cross_volume(from, to, "verification after move failed"));
    }
    Ok(())
}

fn checked_move(
    fs: &dyn Filesystem,
    from: &Path,
    to: &Path,
    log: &mut ExecutionLog,
) -> Result<(), ExecutionError> {
    if !fs.exists(from) {
        return Err(ExecutionError::race(from, to, "source no longer exists"));
    }
    if fs.exists(to) {
        return Err(ExecutionError::race(from, to, "target already exists"));
    }
    move_entry(fs, from, to, log)
}

/// A free temporary name next to `path`.
pub(crate) fn temp_path(fs: &dyn Filesystem, path: &Path) -> PathBuf {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let mut n = 0u32;
    loop {
        let candidate = dir.join(format!(".rerename-{}-{}.tmp", std::process::id(), n));
        if !fs.exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

struct Pending<'p> {
    op: &'p PlannedRename,
    current: PathBuf,
    /// Index into the recorded steps of the move to a temporary name
    hop_step: Option<usize>,
}

/// Execute `plan` best-effort.
///
/// Ready renames (nothing pending beneath them and no other pending rename
/// still occupying their target) run deepest first. When every pending
/// rename waits on another one, a member of the cycle is moved to a temporary
/// name to break it. Each physical move is recorded for undo.
pub fn execute_plan(
    plan: &RenamePlan,
    fs: &dyn Filesystem,
    options: &ExecutorOptions,
) -> ExecutionReport {
    let policy = plan.case_policy;
    let mut log = ExecutionLog::open(options.log_file.as_deref());
    let mut steps: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut items = Vec::new();
    let mut moves = Vec::new();

    let mut pending: Vec<Pending<'_>> = plan
        .renames
        .iter()
        .filter(|op| op.from != op.to)
        .map(|op| Pending {
            op,
            current: op.from.clone(),
            hop_step: None,
        })
        .collect();

    tracing::info!(renames = pending.len(), "applying rename plan");
    log.log(&format!("Starting batch of {} renames", pending.len()));

    while !pending.is_empty() {
        let occupants: HashMap<String, usize> = pending
            .iter()
            .enumerate()
            .map(|(i, p)| (policy.path_key(&p.current), i))
            .collect();
        // Folder key -> a pending rename somewhere beneath it
        let mut below: HashMap<String, usize> = HashMap::new();
        for (j, p) in pending.iter().enumerate() {
            for ancestor in p.current.ancestors().skip(1) {
                below.entry(policy.path_key(ancestor)).or_insert(j);
            }
        }
        // A folder waits for everything beneath it. Target edges stay inside
        // one directory and descendant edges only go deeper, so a cycle never
        // contains a folder with pending entries below it.
        let blocked_by: Vec<Option<usize>> = pending
            .iter()
            .enumerate()
            .map(|(i, p)| {
                below.get(&policy.path_key(&p.current)).copied().or_else(|| {
                    occupants
                        .get(&policy.path_key(&p.op.to))
                        .copied()
                        .filter(|&j| j != i)
                })
            })
            .collect();

        let ready = (0..pending.len())
            .filter(|&i| blocked_by[i].is_none())
            .max_by_key(|&i| (pending[i].op.from.components().count(), Reverse(i)));

        if let Some(i) = ready {
            let p = pending.remove(i);
            let item = p.op.item;
            let outcome = match finish_rename(fs, p, &mut steps, &mut log) {
                Ok(mv) => {
                    let outcome = ItemOutcome::Renamed {
                        from: mv.from.clone(),
                        to: mv.to.clone(),
                    };
                    moves.push(mv);
                    outcome
                },
                Err(err) => {
                    tracing::warn!(item = %item, error = %err, "rename failed");
                    log.log(&format!("Failed: {err}"));
                    ItemOutcome::Failed(err)
                },
            };
            items.push(ItemReport { item, outcome });
            continue;
        }

        // Everything is blocked, so following the chain must revisit a node,
        // and that node sits on a cycle.
        let mut i = 0;
        let mut seen = HashSet::new();
        while seen.insert(i) {
            match blocked_by[i] {
                Some(j) => i = j,
                None => break,
            }
        }

        let tmp = temp_path(fs, &pending[i].current);
        log.log(&format!(
            "Cycle detected, parking {} at {}",
            pending[i].current.display(),
            tmp.display()
        ));
        match checked_move(fs, &pending[i].current, &tmp, &mut log) {
            Ok(()) => {
                steps.push((pending[i].current.clone(), tmp.clone()));
                pending[i].hop_step = Some(steps.len() - 1);
                pending[i].current = tmp;
            },
            Err(err) => {
                let p = pending.remove(i);
                tracing::warn!(item = %p.op.item, error = %err, "rename failed");
                items.push(ItemReport {
                    item: p.op.item,
                    outcome: ItemOutcome::Failed(err),
                });
            },
        }
    }

    let record = UndoRecord::new(steps, moves);
    let report = ExecutionReport { items, record };
    let failed = report.failures().count();
    tracing::info!(renamed = report.renamed(), failed, "rename plan finished");
    log.log(&format!(
        "Finished batch: {} renamed, {} failed",
        report.renamed(),
        failed
    ));
    report
}

fn finish_rename(
    fs: &dyn Filesystem,
    mut p: Pending<'_>,
    steps: &mut Vec<(PathBuf, PathBuf)>,
    log: &mut ExecutionLog,
) -> Result<ItemMove, ExecutionError> {
    if p.op.case_only && p.hop_step.is_none() {
        let tmp = temp_path(fs, &p.current);
        log.log(&format!(
            "Case-only rename detected, using temp: {}",
            tmp.display()
        ));
        checked_move(fs, &p.current, &tmp, log)?;
        steps.push((p.current.clone(), tmp.clone()));
        p.hop_step = Some(steps.len() - 1);
        p.current = tmp;
    }

    if let Err(err) = checked_move(fs, &p.current, &p.op.to, log) {
        if let Some(hop) = p.hop_step {
            restore_from_hop(fs, &p, hop, steps, log);
        }
        return Err(err);
    }

    steps.push((p.current.clone(), p.op.to.clone()));
    log.log(&format!(
        "Successfully renamed {} -> {}",
        p.op.from.display(),
        p.op.to.display()
    ));
    Ok(ItemMove {
        item: p.op.item,
        from: p.op.from.clone(),
        to: p.op.to.clone(),
    })
}

/// Move an entry parked at a temporary name back to where it came from.
fn restore_from_hop(
    fs: &dyn Filesystem,
    p: &Pending<'_>,
    hop: usize,
    steps: &mut Vec<(PathBuf, PathBuf)>,
    log: &mut ExecutionLog,
) {
    match checked_move(fs, &p.current, &p.op.from, log) {
        Ok(()) if hop + 1 == steps.len() => {
            steps.pop();
        },
        Ok(()) => steps.push((p.current.clone(), p.op.from.clone())),
        Err(err) => {
            tracing::warn!(
                path = %p.current.display(),
                error = %err,
                "entry left at temporary name"
            );
            log.log(&format!(
                "Could not restore {} from {}",
                p.op.from.display(),
                p.current.display()
            ));
        },
    }
}
