#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod busy;
pub mod config;
pub mod conflict;
pub mod error;
pub mod executor;
pub mod fs;
pub mod item;
pub mod matcher;
pub mod ordering;
pub mod presets;
pub mod preview;
pub mod session;
pub mod template;
pub mod undo;
pub mod validate;

pub use busy::{is_busy, ApplyGuard};
pub use config::Config;
pub use conflict::{
    resolve, Candidate, CasePolicy, ConflictReason, DirectorySnapshot, Resolution, Status,
};
pub use error::ErrorKind;
pub use executor::{
    execute_plan, ExecutionError, ExecutionReport, ExecutorOptions, ItemOutcome, ItemReport,
    PlannedRename, RenamePlan,
};
pub use fs::{
    calculate_checksum, detect_case_insensitive_fs, is_cross_device, Filesystem, OsFilesystem,
};
pub use item::{EntryKind, FileName, Item, ItemId};
pub use matcher::{CompiledRule, MatchOutcome, Rule, RuleError, Scope};
pub use ordering::{
    lexicographic, move_selection, natural_order, Comparator, OrderingError, OrderingManager,
    OrderingMode,
};
pub use presets::{Favorites, RecentRules, DEFAULT_HISTORY_LIMIT};
pub use preview::{compute_preview, render_summary, ItemPreview, Preview, PreviewInput, Summary};
pub use session::{AddReport, ApplyError, ApplyReport, ApplyTicket, Session, SessionConfig};
pub use template::{Expansion, NumberingState, Template, TemplateError, TemplateToken};
pub use undo::{
    revert_record, ItemMove, RemovedItem, UndoEntry, UndoError, UndoFailure, UndoOutcome,
    UndoRecord, UndoReport, UndoStack,
};
pub use validate::{is_windows_reserved, validate_name, validate_path_length, IllegalName, Platform};
