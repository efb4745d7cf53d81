use crate::conflict::{resolve, Candidate, CasePolicy, DirectorySnapshot, Status};
use crate::executor::{PlannedRename, RenamePlan};
use crate::fs::Filesystem;
use crate::item::{EntryKind, FileName, Item, ItemId};
use crate::matcher::{CompiledRule, Rule, RuleError};
use crate::template::{NumberingState, TemplateError};
use crate::validate::Platform;
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Write as FmtWrite;
use std::path::PathBuf;
use std::sync::Arc;

/// Proposed outcome for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPreview {
    pub item: ItemId,
    pub display_index: usize,
    pub source_path: PathBuf,
    pub kind: EntryKind,
    /// `None` when the template could not be expanded for this item
    pub proposed_name: Option<FileName>,
    pub target: Option<PathBuf>,
    pub status: Status,
    pub case_only: bool,
}

impl ItemPreview {
    pub fn source_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Counts of rows per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub unchanged: usize,
    pub ok: usize,
    pub conflict: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to rename, {} unchanged, {} conflicting",
            self.ok, self.unchanged, self.conflict
        )
    }
}

/// Immutable result of one preview computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preview {
    pub generation: u64,
    pub rows: Vec<ItemPreview>,
}

impl Preview {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for row in &self.rows {
            match row.status {
                Status::Unchanged => summary.unchanged += 1,
                Status::Ok => summary.ok += 1,
                Status::Conflict(_) => summary.conflict += 1,
            }
        }
        summary
    }

    /// A preview can be applied when no row conflicts.
    pub fn is_acceptable(&self) -> bool {
        self.rows.iter().all(|r| !r.status.is_conflict())
    }

    pub fn row(&self, item: ItemId) -> Option<&ItemPreview> {
        self.rows.iter().find(|r| r.item == item)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &ItemPreview> {
        self.rows.iter().filter(|r| r.status.is_conflict())
    }

    /// The renames of every `Ok` row, in display order.
    pub fn plan(&self, case_policy: CasePolicy) -> RenamePlan {
        let renames = self
            .rows
            .iter()
            .filter(|r| r.status == Status::Ok)
            .filter_map(|r| {
                r.target.as_ref().map(|to| PlannedRename {
                    item: r.item,
                    from: r.source_path.clone(),
                    to: to.clone(),
                    case_only: r.case_only,
                })
            })
            .collect();
        RenamePlan {
            renames,
            case_policy,
        }
    }
}

/// Everything a preview depends on, detached from the session so it can be
/// computed on another thread.
#[derive(Clone)]
pub struct PreviewInput {
    pub generation: u64,
    /// Items in display order
    pub items: Vec<Item>,
    pub rule: Rule,
    pub platform: Platform,
    pub case_policy: CasePolicy,
    pub fs: Arc<dyn Filesystem>,
}

impl fmt::Debug for PreviewInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewInput")
            .field("generation", &self.generation)
            .field("items", &self.items.len())
            .field("rule", &self.rule)
            .field("platform", &self.platform)
            .field("case_policy", &self.case_policy)
            .finish_non_exhaustive()
    }
}

impl PreviewInput {
    pub fn compute(&self) -> Result<Preview, RuleError> {
        compute_preview(self)
    }
}

fn propose(
    compiled: &CompiledRule,
    item: &Item,
    numbering: &mut NumberingState,
) -> Result<FileName, TemplateError> {
    if !compiled.matches(&item.name, item.kind) {
        return Ok(item.name.clone());
    }
    let expansion = compiled.template().expand(&item.source_path, numbering)?;
    let outcome = compiled.apply(&item.name, item.kind, &expansion)?;
    if outcome.matched {
        numbering.advance();
    }
    Ok(outcome.name)
}

/// Compute proposed names and statuses for every item.
///
/// Reads directory listings but never modifies anything.
pub fn compute_preview(input: &PreviewInput) -> Result<Preview, RuleError> {
    let compiled = CompiledRule::new(&input.rule)?;

    let mut numbering = NumberingState::new();
    let proposals: Vec<Result<FileName, TemplateError>> = input
        .items
        .iter()
        .map(|item| propose(&compiled, item, &mut numbering))
        .collect();

    let dirs: BTreeSet<PathBuf> = input
        .items
        .iter()
        .map(|item| item.parent().to_path_buf())
        .collect();
    let mut snapshot = DirectorySnapshot::new(input.case_policy);
    for dir in dirs {
        match input.fs.list_directory(&dir) {
            Ok(names) => snapshot.insert(dir, names),
            Err(err) => {
                tracing::debug!(dir = %dir.display(), error = %err, "cannot list directory");
            },
        }
    }

    let candidates: Vec<Candidate<'_>> = input
        .items
        .iter()
        .zip(&proposals)
        .map(|(item, proposal)| Candidate {
            source_path: &item.source_path,
            proposed: proposal.as_ref().map(FileName::full).map_err(Clone::clone),
        })
        .collect();
    let resolutions = resolve(&candidates, input.platform, input.case_policy, &snapshot);

    let rows = input
        .items
        .iter()
        .zip(proposals)
        .zip(resolutions)
        .enumerate()
        .map(|(display_index, ((item, proposal), resolution))| ItemPreview {
            item: item.id,
            display_index,
            source_path: item.source_path.clone(),
            kind: item.kind,
            proposed_name: proposal.ok(),
            target: resolution.target,
            status: resolution.status,
            case_only: resolution.case_only,
        })
        .collect::<Vec<_>>();

    let preview = Preview {
        generation: input.generation,
        rows,
    };
    tracing::debug!(
        generation = preview.generation,
        summary = %preview.summary(),
        "preview computed"
    );
    Ok(preview)
}

/// Human-readable summary followed by one line per conflicting row.
pub fn render_summary(preview: &Preview) -> String {
    let mut out = preview.summary().to_string();
    for row in preview.conflicts() {
        let proposed = row
            .proposed_name
            .as_ref()
            .map_or_else(|| "?".to_string(), FileName::full);
        if let Status::Conflict(reason) = &row.status {
            let _ = write!(
                out,
                "\n  {} -> {}: [{}] {}",
                row.source_name(),
                proposed,
                reason.kind(),
                reason
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFilesystem;
    use crate::matcher::Scope;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup(names: &[&str]) -> (TempDir, Vec<Item>) {
        let temp = TempDir::new().unwrap();
        let items = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let path = temp.path().join(name);
                fs::write(&path, name).unwrap();
                Item::new(ItemId(i as u64), path, EntryKind::File).unwrap()
            })
            .collect();
        (temp, items)
    }

    fn input(items: Vec<Item>, rule: Rule, platform: Platform) -> PreviewInput {
        PreviewInput {
            generation: 1,
            items,
            rule,
            platform,
            case_policy: CasePolicy::for_platform(platform),
            fs: Arc::new(OsFilesystem),
        }
    }

    fn proposed(preview: &Preview) -> Vec<String> {
        preview
            .rows
            .iter()
            .map(|r| r.proposed_name.as_ref().map_or_else(String::new, FileName::full))
            .collect()
    }

    #[test]
    fn test_numbering_skips_unmatched_items() {
        let (_temp, items) = setup(&["a1.txt", "b.txt", "a2.txt"]);
        let preview = compute_preview(&input(
            items,
            Rule::regex(r"^a\d", "<##:10:5>"),
            Platform::Linux,
        ))
        .unwrap();
        assert_eq!(proposed(&preview), vec!["10.txt", "b.txt", "15.txt"]);
        assert_eq!(preview.rows[1].status, Status::Unchanged);
    }

    #[test]
    fn test_invalid_regex_is_an_error() {
        let (_temp, items) = setup(&["a.txt"]);
        assert!(compute_preview(&input(items, Rule::regex("[", ""), Platform::Linux)).is_err());
    }

    #[test]
    fn test_template_error_only_when_matched() {
        let (_temp, items) = setup(&["match.txt", "other.txt"]);
        let preview = compute_preview(&input(
            items,
            Rule::regex("match", r"\4"),
            Platform::Linux,
        ))
        .unwrap();
        assert!(preview.rows[0].status.is_conflict());
        assert!(preview.rows[0].proposed_name.is_none());
        assert_eq!(preview.rows[1].status, Status::Unchanged);
        assert!(!preview.is_acceptable());
    }

    #[test]
    fn test_plan_contains_only_ok_rows() {
        let (_temp, items) = setup(&["x_1.txt", "y.txt"]);
        let preview =
            compute_preview(&input(items, Rule::literal("x_", ""), Platform::Linux)).unwrap();
        let plan = preview.plan(CasePolicy::Sensitive);
        assert_eq!(plan.renames.len(), 1);
        assert_eq!(plan.renames[0].item, ItemId(0));
        assert!(plan.renames[0].to.ends_with("1.txt"));
    }

    #[test]
    fn test_summary_display() {
        let (_temp, items) = setup(&["a.txt", "A.txt", "keep.md"]);
        let preview = compute_preview(&input(
            items,
            Rule::regex("^a$", "x").case_insensitive(),
            Platform::Windows,
        ))
        .unwrap();
        insta::assert_snapshot!(preview.summary(), @"0 to rename, 1 unchanged, 2 conflicting");
    }

    #[test]
    fn test_render_summary_lists_conflicts() {
        let (_temp, items) = setup(&["a.txt", "b.txt"]);
        let preview = compute_preview(&input(
            items,
            Rule::regex(".+", "same").with_scope(Scope::Name),
            Platform::Linux,
        ))
        .unwrap();
        insta::assert_snapshot!(render_summary(&preview), @r"
        0 to rename, 0 unchanged, 2 conflicting
          a.txt -> same.txt: [duplicate-in-batch] another item in the batch is renamed to the same name
          b.txt -> same.txt: [duplicate-in-batch] another item in the batch is renamed to the same name
        ");
    }

    proptest! {
        #[test]
        fn prop_preview_is_idempotent(
            find in "[a-c]{1,2}",
            replace in "[a-c<>#:p0-9]{0,6}",
        ) {
            let (_temp, items) = setup(&["abc.txt", "cab.txt", "bca.txt", "aaa.txt"]);
            let input = input(items, Rule::regex(find, replace), Platform::Linux);
            let first = compute_preview(&input).unwrap();
            let second = compute_preview(&input).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_ok_rows_are_valid_and_unique(
            find in "[a-c]{1,2}",
            replace in "[a-c_]{0,3}",
        ) {
            let (_temp, items) = setup(&["abc.txt", "cab.txt", "bca.txt", "aaa.txt"]);
            let preview = compute_preview(&input(items, Rule::literal(find, replace), Platform::Windows))
                .unwrap();
            let mut seen = std::collections::HashSet::new();
            for row in preview.rows.iter().filter(|r| r.status == Status::Ok) {
                let name = row.proposed_name.as_ref().unwrap().full();
                prop_assert!(crate::validate::validate_name(&name, Platform::Windows).is_ok());
                prop_assert!(seen.insert(name.to_lowercase()));
            }
        }
    }
}
