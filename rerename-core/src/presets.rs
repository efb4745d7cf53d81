use crate::matcher::Rule;
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub const DEFAULT_HISTORY_LIMIT: usize = 15;

fn load_rules(path: &Path, what: &str) -> Result<Vec<Rule>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", what, path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {} file: {}", what, path.display()))
}

fn save_rules(path: &Path, rules: &[Rule], what: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("Failed to create {} file: {}", what, path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, rules)
        .with_context(|| format!("Failed to write {} file: {}", what, path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write {} file: {}", what, path.display()))
}

/// Saved rules, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Favorites {
    rules: Vec<Rule>,
}

impl Favorites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `rule` at the front. An identical rule already saved moves to the
    /// front instead of being duplicated.
    pub fn save(&mut self, rule: Rule) {
        self.rules.retain(|r| *r != rule);
        self.rules.insert(0, rule);
    }

    pub fn remove(&mut self, index: usize) -> Option<Rule> {
        (index < self.rules.len()).then(|| self.rules.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.rules)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let rules: Vec<Rule> = serde_json::from_str(json).context("Failed to parse favorites")?;
        let mut favorites = Self::new();
        // Keep the first occurrence of each rule, preserving order
        for rule in rules.into_iter().rev() {
            favorites.save(rule);
        }
        Ok(favorites)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut favorites = Self::new();
        for rule in load_rules(path, "favorites")?.into_iter().rev() {
            favorites.save(rule);
        }
        Ok(favorites)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        save_rules(path, &self.rules, "favorites")
    }
}

/// Rules that were applied, oldest first, capped at `limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentRules {
    rules: Vec<Rule>,
    limit: usize,
}

impl Default for RecentRules {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl RecentRules {
    pub fn new(limit: usize) -> Self {
        Self {
            rules: Vec::new(),
            limit,
        }
    }

    /// Record an applied rule as the newest entry.
    pub fn record(&mut self, rule: Rule) {
        self.rules.retain(|r| *r != rule);
        self.rules.push(rule);
        self.enforce_limit();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.enforce_limit();
    }

    /// Oldest first.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn newest(&self) -> Option<&Rule> {
        self.rules.last()
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn enforce_limit(&mut self) {
        if self.rules.len() > self.limit {
            let excess = self.rules.len() - self.limit;
            self.rules.drain(..excess);
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.rules)?)
    }

    pub fn from_json(json: &str, limit: usize) -> Result<Self> {
        let rules: Vec<Rule> =
            serde_json::from_str(json).context("Failed to parse recent rules")?;
        Ok(Self::from_rules(rules, limit))
    }

    pub fn load_from_path(path: &Path, limit: usize) -> Result<Self> {
        Ok(Self::from_rules(load_rules(path, "history")?, limit))
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        save_rules(path, &self.rules, "history")
    }

    fn from_rules(rules: Vec<Rule>, limit: usize) -> Self {
        let mut recent = Self::new(limit);
        for rule in rules {
            recent.record(rule);
        }
        recent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Scope;
    use tempfile::TempDir;

    #[test]
    fn test_favorites_newest_first_and_deduped() {
        let mut favorites = Favorites::new();
        favorites.save(Rule::literal("a", "b"));
        favorites.save(Rule::literal("c", "d"));
        favorites.save(Rule::literal("a", "b"));
        assert_eq!(
            favorites.rules(),
            &[Rule::literal("a", "b"), Rule::literal("c", "d")]
        );
        assert_eq!(favorites.remove(1), Some(Rule::literal("c", "d")));
        assert_eq!(favorites.remove(5), None);
    }

    #[test]
    fn test_favorites_distinguish_flags() {
        let mut favorites = Favorites::new();
        favorites.save(Rule::literal("a", "b"));
        favorites.save(Rule::literal("a", "b").with_scope(Scope::Extension));
        favorites.save(Rule::regex("a", "b"));
        assert_eq!(favorites.len(), 3);
    }

    #[test]
    fn test_recent_rules_cap_and_order() {
        let mut recent = RecentRules::new(3);
        for i in 0..5 {
            recent.record(Rule::literal(format!("f{i}"), "r"));
        }
        let finds: Vec<_> = recent.rules().iter().map(|r| r.find_pattern.as_str()).collect();
        assert_eq!(finds, vec!["f2", "f3", "f4"]);

        recent.record(Rule::literal("f2", "r"));
        let finds: Vec<_> = recent.newest_first().map(|r| r.find_pattern.as_str()).collect();
        assert_eq!(finds, vec!["f2", "f4", "f3"]);
    }

    #[test]
    fn test_recent_rules_shrinking_limit() {
        let mut recent = RecentRules::default();
        for i in 0..DEFAULT_HISTORY_LIMIT + 4 {
            recent.record(Rule::regex(format!("{i}"), ""));
        }
        assert_eq!(recent.len(), DEFAULT_HISTORY_LIMIT);
        recent.set_limit(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(
            recent.newest().map(|r| r.find_pattern.clone()),
            Some(format!("{}", DEFAULT_HISTORY_LIMIT + 3))
        );
    }

    #[test]
    fn test_round_trip_through_files() {
        let temp = TempDir::new().unwrap();
        let fav_path = temp.path().join(".rerename/favorites.json");
        let hist_path = temp.path().join(".rerename/history.json");

        let mut favorites = Favorites::new();
        favorites.save(Rule::literal("x", "y").case_insensitive());
        favorites.save(Rule::regex(r"(\d+)", r"#\1").with_scope(Scope::NameAndExtension));
        favorites.save_to_path(&fav_path).unwrap();
        assert_eq!(Favorites::load_from_path(&fav_path).unwrap(), favorites);

        let mut recent = RecentRules::new(5);
        recent.record(Rule::literal("1", "2"));
        recent.record(Rule::literal("3", "4"));
        recent.save_to_path(&hist_path).unwrap();
        assert_eq!(RecentRules::load_from_path(&hist_path, 5).unwrap(), recent);
    }

    #[test]
    fn test_missing_file_is_empty_and_garbage_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(Favorites::load_from_path(&temp.path().join("none.json"))
            .unwrap()
            .is_empty());

        let bad = temp.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        let err = RecentRules::load_from_path(&bad, 5).unwrap_err();
        assert!(err.to_string().contains("Failed to parse history file"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_save_reports_buffered_write_failure() {
        // Every write to this device fails with "no space left"
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let mut favorites = Favorites::new();
        favorites.save(Rule::literal("a", "b"));
        let err = favorites.save_to_path(full).unwrap_err();
        assert!(err.to_string().contains("Failed to write favorites file"));
    }

    #[test]
    fn test_from_json_tolerates_missing_flags() {
        let favorites = Favorites::from_json(r#"[{"find": "a", "replace": "b"}]"#).unwrap();
        assert_eq!(favorites.get(0), Some(&Rule::regex("a", "b")));
    }
}
