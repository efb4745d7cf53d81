use crate::busy::{is_busy, ApplyGuard};
use crate::config::{CasePolicySetting, Config, PlatformSetting, SortSetting};
use crate::conflict::CasePolicy;
use crate::executor::{execute_plan, ExecutionReport, ExecutorOptions, RenamePlan};
use crate::fs::{detect_case_insensitive_fs, Filesystem, OsFilesystem};
use crate::item::{EntryKind, Item, ItemId};
use crate::matcher::{CompiledRule, Rule, RuleError};
use crate::ordering::{
    lexicographic, natural_order, Comparator, OrderingError, OrderingManager, OrderingMode,
};
use crate::presets::RecentRules;
use crate::preview::{compute_preview, Preview, PreviewInput, Summary};
use crate::undo::{
    revert_record, RemovedItem, UndoEntry, UndoOutcome, UndoRecord, UndoReport, UndoStack,
};
use crate::validate::Platform;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("another apply or undo is still running")]
    Busy,
    #[error("{conflicts} item(s) have conflicts")]
    Blocked { conflicts: usize },
}

/// Runtime settings of a session.
#[derive(Clone)]
pub struct SessionConfig {
    pub platform: Platform,
    pub case_policy: CasePolicy,
    pub autosort: bool,
    pub comparator: Comparator,
    pub undo_limit: Option<usize>,
    pub history_limit: usize,
    pub enforce_uniform_type: bool,
    pub executor: ExecutorOptions,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("platform", &self.platform)
            .field("case_policy", &self.case_policy)
            .field("autosort", &self.autosort)
            .field("undo_limit", &self.undo_limit)
            .field("history_limit", &self.history_limit)
            .field("enforce_uniform_type", &self.enforce_uniform_type)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        let defaults = &config.defaults;
        let platform = match defaults.platform {
            PlatformSetting::Auto => Platform::current(),
            PlatformSetting::Windows => Platform::Windows,
            PlatformSetting::Macos => Platform::MacOs,
            PlatformSetting::Linux => Platform::Linux,
        };
        let case_policy = match defaults.case_policy {
            CasePolicySetting::Platform => CasePolicy::for_platform(platform),
            CasePolicySetting::Sensitive => CasePolicy::Sensitive,
            CasePolicySetting::Insensitive => CasePolicy::Insensitive,
            CasePolicySetting::Detect => {
                let dir = std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir());
                if detect_case_insensitive_fs(&dir) {
                    CasePolicy::Insensitive
                } else {
                    CasePolicy::Sensitive
                }
            },
        };
        let comparator: Comparator = match defaults.sort {
            SortSetting::Lexicographic => Arc::new(lexicographic),
            SortSetting::Natural => Arc::new(natural_order),
        };

        Self {
            platform,
            case_policy,
            autosort: defaults.autosort,
            comparator,
            undo_limit: defaults.undo_limit,
            history_limit: defaults.history_limit,
            enforce_uniform_type: defaults.enforce_uniform_type,
            executor: ExecutorOptions {
                log_file: defaults.log_file.clone(),
            },
        }
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self.case_policy = CasePolicy::for_platform(platform);
        self
    }

    #[must_use]
    pub fn with_case_policy(mut self, case_policy: CasePolicy) -> Self {
        self.case_policy = case_policy;
        self
    }

    #[must_use]
    pub fn with_autosort(mut self, autosort: bool) -> Self {
        self.autosort = autosort;
        self
    }
}

/// What happened to the paths passed to [`Session::add_paths`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    pub added: Vec<ItemId>,
    pub missing: Vec<PathBuf>,
    pub mixed_kind: Vec<PathBuf>,
    pub duplicates: Vec<PathBuf>,
}

/// Everything needed to run an accepted plan away from the session.
///
/// Holds the busy flag until it is handed back to [`Session::finish_apply`].
#[derive(Debug)]
pub struct ApplyTicket {
    plan: RenamePlan,
    rule: Rule,
    fs: Arc<dyn Filesystem>,
    options: ExecutorOptions,
    guard: ApplyGuard,
}

impl ApplyTicket {
    pub fn plan(&self) -> &RenamePlan {
        &self.plan
    }

    /// Perform the renames. Blocking I/O; may run on any thread.
    pub fn run(self) -> ApplyReport {
        let execution = execute_plan(&self.plan, self.fs.as_ref(), &self.options);
        ApplyReport {
            execution,
            rule: self.rule,
            guard: Some(self.guard),
        }
    }
}

/// Result of an executed plan.
#[derive(Debug)]
pub struct ApplyReport {
    pub execution: ExecutionReport,
    rule: Rule,
    guard: Option<ApplyGuard>,
}

impl ApplyReport {
    pub fn renamed(&self) -> usize {
        self.execution.renamed()
    }

    pub fn failed(&self) -> usize {
        self.execution.failures().count()
    }
}

/// A batch of items with its rule, ordering, preview and undo history.
pub struct Session {
    fs: Arc<dyn Filesystem>,
    config: SessionConfig,
    items: HashMap<ItemId, Item>,
    next_id: u64,
    ordering: OrderingManager,
    rule: Rule,
    undo: UndoStack,
    recent_rules: RecentRules,
    preview: Arc<Preview>,
    requested_generation: u64,
    busy: Arc<AtomicBool>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("items", &self.items.len())
            .field("ordering", &self.ordering)
            .field("rule", &self.rule)
            .field("undo", &self.undo.len())
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_filesystem(config, Arc::new(OsFilesystem))
    }

    pub fn with_filesystem(config: SessionConfig, fs: Arc<dyn Filesystem>) -> Self {
        let mode = if config.autosort {
            OrderingMode::AutoSorted
        } else {
            OrderingMode::Manual
        };
        Self {
            fs,
            ordering: OrderingManager::new(mode, Arc::clone(&config.comparator)),
            undo: UndoStack::new(config.undo_limit),
            recent_rules: RecentRules::new(config.history_limit),
            config,
            items: HashMap::new(),
            next_id: 0,
            rule: Rule::default(),
            preview: Arc::new(Preview::default()),
            requested_generation: 0,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    /// Items in display order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.ordering
            .sequence()
            .iter()
            .filter_map(|id| self.items.get(id))
    }

    pub fn ordering_mode(&self) -> OrderingMode {
        self.ordering.mode()
    }

    /// The kind every item in a uniform batch shares.
    pub fn collection_kind(&self) -> Option<EntryKind> {
        self.items.values().next().map(|item| item.kind)
    }

    pub fn is_busy(&self) -> bool {
        is_busy(&self.busy)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn recent_rules(&self) -> &RecentRules {
        &self.recent_rules
    }

    /// Add entries to the batch. Missing paths, entries of the other kind and
    /// paths already present are skipped and reported.
    pub fn add_paths<I, P>(&mut self, paths: I) -> AddReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let policy = self.config.case_policy;
        let mut report = AddReport::default();
        let mut kind = self.collection_kind();
        let mut known: HashSet<String> = self
            .items
            .values()
            .map(|item| policy.path_key(&item.source_path))
            .collect();

        for path in paths {
            let path = absolute(path.as_ref());
            if !self.fs.exists(&path) {
                report.missing.push(path);
                continue;
            }
            let entry_kind = if self.fs.is_dir(&path) {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            if self.config.enforce_uniform_type && kind.is_some_and(|k| k != entry_kind) {
                report.mixed_kind.push(path);
                continue;
            }
            if !known.insert(policy.path_key(&path)) {
                report.duplicates.push(path);
                continue;
            }
            let id = ItemId(self.next_id);
            let Some(item) = Item::new(id, path.clone(), entry_kind) else {
                report.missing.push(path);
                continue;
            };
            self.next_id += 1;
            kind.get_or_insert(entry_kind);
            self.items.insert(id, item);
            report.added.push(id);
        }

        if !report.added.is_empty() {
            self.ordering.extend(report.added.iter().copied(), &self.items);
            self.undo.push(UndoEntry::AddItems(report.added.clone()));
            self.refresh_preview();
        }
        tracing::debug!(
            added = report.added.len(),
            missing = report.missing.len(),
            mixed_kind = report.mixed_kind.len(),
            duplicates = report.duplicates.len(),
            "paths added"
        );
        report
    }

    /// Remove items from the batch; returns how many were present.
    pub fn remove(&mut self, ids: &[ItemId]) -> usize {
        let removed = self.take_items(ids);
        let count = removed.len();
        if count > 0 {
            self.undo.push(UndoEntry::RemoveItems(removed));
            self.refresh_preview();
        }
        count
    }

    pub fn clear(&mut self) -> usize {
        let ids: Vec<ItemId> = self.ordering.sequence().to_vec();
        self.remove(&ids)
    }

    fn take_items(&mut self, ids: &[ItemId]) -> Vec<RemovedItem> {
        let mut removed: Vec<RemovedItem> = ids
            .iter()
            .filter_map(|&id| {
                let position = self.ordering.position(id)?;
                let item = self.items.remove(&id)?;
                Some(RemovedItem { position, item })
            })
            .collect();
        removed.sort_by_key(|r| r.position);
        let gone: HashSet<ItemId> = removed.iter().map(|r| r.item.id).collect();
        self.ordering.remove(&gone);
        removed
    }

    /// Replace the active rule. An invalid pattern is rejected and the
    /// previous rule stays active.
    pub fn set_rule(&mut self, rule: Rule) -> Result<(), RuleError> {
        CompiledRule::new(&rule)?;
        self.rule = rule;
        self.refresh_preview();
        Ok(())
    }

    pub fn set_autosort(&mut self, autosort: bool) {
        let mode = if autosort {
            OrderingMode::AutoSorted
        } else {
            OrderingMode::Manual
        };
        self.ordering.set_mode(mode, &self.items);
        self.refresh_preview();
    }

    pub fn set_comparator(&mut self, comparator: Comparator) {
        self.config.comparator = Arc::clone(&comparator);
        self.ordering.set_comparator(comparator, &self.items);
        self.refresh_preview();
    }

    /// Move the rows at `selection` so they land before the row at
    /// `target_index`. Only allowed in manual order.
    pub fn move_selection(
        &mut self,
        selection: &BTreeSet<usize>,
        target_index: usize,
    ) -> Result<(), OrderingError> {
        self.ordering.move_selection(selection, target_index)?;
        self.refresh_preview();
        Ok(())
    }

    /// Snapshot of everything the next preview depends on. Each call
    /// supersedes earlier requests.
    pub fn request_preview(&mut self) -> PreviewInput {
        self.requested_generation += 1;
        PreviewInput {
            generation: self.requested_generation,
            items: self.items().cloned().collect(),
            rule: self.rule.clone(),
            platform: self.config.platform,
            case_policy: self.config.case_policy,
            fs: Arc::clone(&self.fs),
        }
    }

    /// Install a computed preview. Results of superseded requests are
    /// discarded and `false` is returned.
    pub fn install_preview(&mut self, preview: Preview) -> bool {
        if preview.generation != self.requested_generation {
            tracing::debug!(
                generation = preview.generation,
                latest = self.requested_generation,
                "discarding stale preview"
            );
            return false;
        }
        self.preview = Arc::new(preview);
        true
    }

    fn refresh_preview(&mut self) {
        let input = self.request_preview();
        match compute_preview(&input) {
            Ok(preview) => {
                self.install_preview(preview);
            },
            Err(err) => tracing::warn!(error = %err, "preview failed, keeping previous one"),
        }
    }

    /// The current preview snapshot.
    pub fn preview(&self) -> Arc<Preview> {
        Arc::clone(&self.preview)
    }

    pub fn summary(&self) -> Summary {
        self.preview.summary()
    }

    /// Reserve the session for an apply of the current preview.
    pub fn begin_apply(&mut self) -> Result<ApplyTicket, ApplyError> {
        let guard = ApplyGuard::acquire(&self.busy).ok_or(ApplyError::Busy)?;

        if self.preview.generation != self.requested_generation {
            self.refresh_preview();
        }
        let summary = self.preview.summary();
        if summary.conflict > 0 {
            return Err(ApplyError::Blocked {
                conflicts: summary.conflict,
            });
        }

        Ok(ApplyTicket {
            plan: self.preview.plan(self.config.case_policy),
            rule: self.rule.clone(),
            fs: Arc::clone(&self.fs),
            options: self.config.executor.clone(),
            guard,
        })
    }

    /// Record the outcome of a ticket: items that moved get their new paths,
    /// the batch becomes one undo entry and the rule joins the history.
    pub fn finish_apply(&mut self, mut report: ApplyReport) -> ApplyReport {
        let record = &report.execution.record;
        self.relocate(record.steps.iter().map(|(from, to)| (from, to)));
        if !record.is_empty() {
            self.undo.push(UndoEntry::RenameBatch(record.clone()));
        }
        self.recent_rules.record(report.rule.clone());
        self.ordering.resort(&self.items);
        self.refresh_preview();
        report.guard = None;
        report
    }

    /// Apply the current preview and wait for it to finish.
    pub fn apply(&mut self) -> Result<ApplyReport, ApplyError> {
        let ticket = self.begin_apply()?;
        let report = ticket.run();
        Ok(self.finish_apply(report))
    }

    /// Undo the newest entry of the history.
    pub fn undo(&mut self) -> Result<UndoOutcome, ApplyError> {
        let Some(entry) = self.undo.pop() else {
            return Ok(UndoOutcome::Nothing);
        };

        let outcome = match entry {
            UndoEntry::RenameBatch(record) => {
                let Some(_guard) = ApplyGuard::acquire(&self.busy) else {
                    self.undo.push(UndoEntry::RenameBatch(record));
                    return Err(ApplyError::Busy);
                };
                UndoOutcome::Renames(self.undo_renames(&record))
            },
            UndoEntry::AddItems(ids) => UndoOutcome::ItemsRemoved(self.take_items(&ids).len()),
            UndoEntry::RemoveItems(removed) => {
                UndoOutcome::ItemsRestored(self.restore_items(removed))
            },
        };

        self.refresh_preview();
        Ok(outcome)
    }

    fn undo_renames(&mut self, record: &UndoRecord) -> UndoReport {
        let report = revert_record(record, self.fs.as_ref(), &self.config.executor);
        // Only the steps that were actually reversed move items back
        self.relocate(report.reverted.iter().map(|(current, original)| (current, original)));
        self.ordering.resort(&self.items);
        report
    }

    /// Replay physical moves, in the order they happened, over the item
    /// paths. An item follows a move of its own path or of any folder above it.
    fn relocate<'a>(&mut self, steps: impl Iterator<Item = (&'a PathBuf, &'a PathBuf)>) {
        for (from, to) in steps {
            for item in self.items.values_mut() {
                let moved = item.source_path.strip_prefix(from).ok().map(|rest| {
                    if rest.as_os_str().is_empty() {
                        to.clone()
                    } else {
                        to.join(rest)
                    }
                });
                if let Some(path) = moved {
                    item.relocate(path);
                }
            }
        }
    }

    fn restore_items(&mut self, removed: Vec<RemovedItem>) -> usize {
        let policy = self.config.case_policy;
        let mut known: HashSet<String> = self
            .items
            .values()
            .map(|item| policy.path_key(&item.source_path))
            .collect();
        let mut kind = self.collection_kind();
        let mut restored = 0;

        for RemovedItem { position, item } in removed {
            if self.config.enforce_uniform_type && kind.is_some_and(|k| k != item.kind) {
                continue;
            }
            if !known.insert(policy.path_key(&item.source_path)) {
                continue;
            }
            kind.get_or_insert(item.kind);
            let id = item.id;
            self.items.insert(id, item);
            self.ordering.insert_at(position, id, &self.items);
            restored += 1;
        }
        restored
    }
}

/// Absolute, lexically normalized form of `path`, so `dir/./a` and
/// `dir/sub/../a` name the same item as `dir/a`.
fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                },
                // `..` at the root stays at the root
                Some(Component::RootDir | Component::Prefix(_)) => {},
                _ => normalized.push(component),
            },
            other => normalized.push(other),
        }
    }
    normalized
}
