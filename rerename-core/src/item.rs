use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use ts_rs::TS;

/// Stable identity of an item for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum EntryKind {
    File,
    Dir,
}

/// A file name split into base and extension.
///
/// The extension is the text after the last dot, without the dot. A name whose
/// only dot is the leading one (`.bashrc`) has no extension, and neither does a
/// folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FileName {
    pub base: String,
    pub extension: Option<String>,
}

impl FileName {
    pub fn new(base: impl Into<String>, extension: Option<String>) -> Self {
        Self {
            base: base.into(),
            extension,
        }
    }

    pub fn split(name: &str, kind: EntryKind) -> Self {
        if kind == EntryKind::Dir {
            return Self::new(name, None);
        }
        match name.rfind('.') {
            Some(0) | None => Self::new(name, None),
            Some(idx) => Self::new(&name[..idx], Some(name[idx + 1..].to_string())),
        }
    }

    pub fn full(&self) -> String {
        match &self.extension {
            Some(ext) => format!("{}.{}", self.base, ext),
            None => self.base.clone(),
        }
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full())
    }
}

/// One filesystem entry in the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub source_path: PathBuf,
    pub kind: EntryKind,
    pub name: FileName,
}

impl Item {
    /// Returns `None` for paths without a final component (`/`, `..`).
    pub fn new(id: ItemId, source_path: PathBuf, kind: EntryKind) -> Option<Self> {
        let name = source_path.file_name()?.to_string_lossy().into_owned();
        Some(Self {
            id,
            name: FileName::split(&name, kind),
            source_path,
            kind,
        })
    }

    pub fn base_name(&self) -> &str {
        &self.name.base
    }

    pub fn extension(&self) -> Option<&str> {
        self.name.extension.as_deref()
    }

    pub fn file_name(&self) -> String {
        self.name.full()
    }

    pub fn parent(&self) -> &Path {
        self.source_path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Point the item at its new location after a rename or an undo.
    pub fn relocate(&mut self, path: PathBuf) {
        if let Some(name) = path.file_name() {
            self.name = FileName::split(&name.to_string_lossy(), self.kind);
        }
        self.source_path = path;
    }
}
