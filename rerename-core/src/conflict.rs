use crate::error::ErrorKind;
use crate::template::TemplateError;
use crate::validate::{validate_name, validate_path_length, IllegalName, Platform};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use ts_rs::TS;

/// How names are compared when looking for collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CasePolicy {
    Sensitive,
    Insensitive,
}

impl CasePolicy {
    /// Windows and macOS default to case-insensitive volumes.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Windows | Platform::MacOs => Self::Insensitive,
            Platform::Linux => Self::Sensitive,
        }
    }

    pub fn fold<'a>(self, s: &'a str) -> Cow<'a, str> {
        match self {
            Self::Sensitive => Cow::Borrowed(s),
            Self::Insensitive => Cow::Owned(s.to_lowercase()),
        }
    }

    pub fn path_key(self, path: &Path) -> String {
        self.fold(&path.to_string_lossy()).into_owned()
    }

    pub fn same(self, a: &str, b: &str) -> bool {
        self.fold(a) == self.fold(b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictReason {
    #[error("{0}")]
    InvalidTemplate(#[from] TemplateError),
    #[error("{0}")]
    IllegalName(#[from] IllegalName),
    #[error("another item in the batch is renamed to the same name")]
    DuplicateInBatch,
    #[error("{} already exists", .0.display())]
    ExistingTarget(PathBuf),
}

impl ConflictReason {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTemplate(_) => ErrorKind::InvalidTemplate,
            Self::IllegalName(_) => ErrorKind::IllegalName,
            Self::DuplicateInBatch => ErrorKind::DuplicateInBatch,
            Self::ExistingTarget(_) => ErrorKind::ExistingTargetConflict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Unchanged,
    Ok,
    Conflict(ConflictReason),
}

impl Status {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Entry names found in each directory touched by a batch.
#[derive(Debug, Clone)]
pub struct DirectorySnapshot {
    policy: CasePolicy,
    entries: HashMap<PathBuf, HashSet<String>>,
}

impl DirectorySnapshot {
    pub fn new(policy: CasePolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, dir: PathBuf, names: BTreeSet<String>) {
        let folded = names
            .iter()
            .map(|n| self.policy.fold(n).into_owned())
            .collect();
        self.entries.insert(dir, folded);
    }

    pub fn contains(&self, dir: &Path, name: &str) -> bool {
        self.entries
            .get(dir)
            .is_some_and(|names| names.contains(self.policy.fold(name).as_ref()))
    }
}

/// One item as seen by the resolver.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub source_path: &'a Path,
    /// Full proposed file name, or the reason it could not be produced
    pub proposed: Result<String, TemplateError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: Status,
    /// Target differs from the source only by letter case under an
    /// insensitive policy, so execution goes through a temporary name
    pub case_only: bool,
    pub target: Option<PathBuf>,
}

/// Assign a status to every candidate.
///
/// Pure over its inputs: the snapshot carries everything read from disk.
pub fn resolve(
    candidates: &[Candidate<'_>],
    platform: Platform,
    policy: CasePolicy,
    existing: &DirectorySnapshot,
) -> Vec<Resolution> {
    let mut resolutions: Vec<Resolution> = candidates
        .iter()
        .map(|c| initial_resolution(c, platform))
        .collect();

    let mut target_counts: HashMap<String, usize> = HashMap::new();
    for resolution in &resolutions {
        if let Some(target) = &resolution.target {
            *target_counts.entry(policy.path_key(target)).or_default() += 1;
        }
    }
    for resolution in &mut resolutions {
        if resolution.status != Status::Ok {
            continue;
        }
        if let Some(target) = &resolution.target {
            if target_counts[&policy.path_key(target)] > 1 {
                resolution.status = Status::Conflict(ConflictReason::DuplicateInBatch);
            }
        }
    }

    // An existing entry only blocks a rename if it stays where it is. Entries
    // that are themselves being renamed away are vacated, but only while their
    // own rename is still valid, so repeat until nothing changes.
    loop {
        let vacated: HashSet<String> = candidates
            .iter()
            .zip(&resolutions)
            .filter(|(_, r)| r.status == Status::Ok)
            .map(|(c, _)| policy.path_key(c.source_path))
            .collect();

        let mut changed = false;
        for (candidate, resolution) in candidates.iter().zip(resolutions.iter_mut()) {
            if resolution.status != Status::Ok {
                continue;
            }
            let Some(target) = resolution.target.as_ref() else {
                continue;
            };
            let target_key = policy.path_key(target);
            if target_key == policy.path_key(candidate.source_path) || vacated.contains(&target_key)
            {
                continue;
            }
            let dir = target.parent().unwrap_or_else(|| Path::new(""));
            let name = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if existing.contains(dir, &name) {
                resolution.status =
                    Status::Conflict(ConflictReason::ExistingTarget(target.clone()));
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    for (candidate, resolution) in candidates.iter().zip(resolutions.iter_mut()) {
        resolution.case_only = resolution.status == Status::Ok
            && policy == CasePolicy::Insensitive
            && resolution
                .target
                .as_ref()
                .is_some_and(|t| policy.path_key(t) == policy.path_key(candidate.source_path));
    }

    resolutions
}

fn initial_resolution(candidate: &Candidate<'_>, platform: Platform) -> Resolution {
    let conflict = |reason: ConflictReason, target: Option<PathBuf>| Resolution {
        status: Status::Conflict(reason),
        case_only: false,
        target,
    };

    let new_name = match &candidate.proposed {
        Ok(name) => name,
        Err(err) => return conflict(err.clone().into(), None),
    };
    let current = candidate
        .source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = candidate.source_path.parent().unwrap_or_else(|| Path::new(""));

    if *new_name == current {
        return Resolution {
            status: Status::Unchanged,
            case_only: false,
            target: Some(candidate.source_path.to_path_buf()),
        };
    }

    // Names that cannot be joined safely never get a target path
    if let Err(err) = validate_name(new_name, platform) {
        return conflict(err.into(), None);
    }
    let target = dir.join(new_name);
    if let Err(err) = validate_path_length(&target, platform) {
        return conflict(err.into(), Some(target));
    }

    Resolution {
        status: Status::Ok,
        case_only: false,
        target: Some(target),
    }
}
