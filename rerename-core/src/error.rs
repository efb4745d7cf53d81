use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of every failure the engine can report.
///
/// Validation kinds show up as item statuses in a preview, execution kinds as
/// per-item apply outcomes and `UndoTargetMissing` as a per-pair undo outcome.
/// None of them aborts the surrounding batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed template or a token that cannot be resolved for the item
    InvalidTemplate,
    /// Name rejected by the platform validator
    IllegalName,
    /// Two or more items propose the same final name
    DuplicateInBatch,
    /// Proposed name collides with an entry already on disk
    ExistingTargetConflict,
    /// Cross-device move failed even after the copy fallback
    CrossVolumeFailure,
    /// Source or target changed between conflict check and apply
    RenameRaceFailure,
    /// Renamed path vanished before it could be undone
    UndoTargetMissing,
    /// Any other I/O failure of a single rename
    Io,
}

impl ErrorKind {
    /// Whether this kind blocks acceptance of a batch (as opposed to being
    /// reported after execution).
    pub fn is_validation(self) -> bool {
        matches!(
            self,
            Self::InvalidTemplate
                | Self::IllegalName
                | Self::DuplicateInBatch
                | Self::ExistingTargetConflict
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidTemplate => "invalid-template",
            Self::IllegalName => "illegal-name",
            Self::DuplicateInBatch => "duplicate-in-batch",
            Self::ExistingTargetConflict => "existing-target",
            Self::CrossVolumeFailure => "cross-volume-failure",
            Self::RenameRaceFailure => "rename-race",
            Self::UndoTargetMissing => "undo-target-missing",
            Self::Io => "io",
        };
        f.write_str(label)
    }
}
