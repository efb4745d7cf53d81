use crate::item::{EntryKind, FileName};
use crate::template::{Expansion, Template, TemplateError};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

/// Which part of a file name a rule operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Scope {
    #[default]
    Name,
    Extension,
    NameAndExtension,
}

/// A find/replace rule as the user entered it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rule {
    #[serde(rename = "find")]
    pub find_pattern: String,
    #[serde(rename = "replace")]
    pub replace_template: String,
    #[serde(default = "default_true")]
    pub use_regex: bool,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    #[serde(default)]
    pub scope: Scope,
}

fn default_true() -> bool {
    true
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            find_pattern: String::new(),
            replace_template: String::new(),
            use_regex: true,
            case_sensitive: true,
            scope: Scope::Name,
        }
    }
}

impl Rule {
    pub fn regex(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find_pattern: find.into(),
            replace_template: replace.into(),
            ..Self::default()
        }
    }

    pub fn literal(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            use_regex: false,
            ..Self::regex(find, replace)
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }
}

#[derive(Debug, Clone, Error)]
pub enum RuleError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Result of running a rule over one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub name: FileName,
    pub matched: bool,
}

/// A rule with its pattern compiled and its template parsed.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: Rule,
    regex: Option<Regex>,
    template: Template,
}

impl CompiledRule {
    pub fn new(rule: &Rule) -> Result<Self, RuleError> {
        let regex = if rule.find_pattern.is_empty() {
            None
        } else {
            let pattern = if rule.use_regex {
                rule.find_pattern.clone()
            } else {
                regex::escape(&rule.find_pattern)
            };
            Some(
                RegexBuilder::new(&pattern)
                    .case_insensitive(!rule.case_sensitive)
                    .build()?,
            )
        };

        Ok(Self {
            rule: rule.clone(),
            regex,
            template: Template::parse(&rule.replace_template),
        })
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Whether the pattern finds anything in the scoped part of `name`.
    pub fn matches(&self, name: &FileName, kind: EntryKind) -> bool {
        match (&self.regex, subject(name, kind, self.rule.scope)) {
            (Some(regex), Some(subject)) => regex.is_match(&subject),
            _ => false,
        }
    }

    /// Substitute every non-overlapping match in the scoped part of `name`.
    pub fn apply(
        &self,
        name: &FileName,
        kind: EntryKind,
        replacement: &Expansion,
    ) -> Result<MatchOutcome, TemplateError> {
        let unchanged = || MatchOutcome {
            name: name.clone(),
            matched: false,
        };
        let Some(regex) = &self.regex else {
            return Ok(unchanged());
        };
        let Some(subject) = subject(name, kind, self.rule.scope) else {
            return Ok(unchanged());
        };

        let Some(replaced) = substitute(regex, &subject, replacement, self.rule.use_regex)? else {
            return Ok(unchanged());
        };

        let new_name = match self.rule.scope {
            Scope::Name => FileName::new(placeholder_if_empty(replaced), name.extension.clone()),
            Scope::Extension => {
                // The separator is added back by `FileName::full`
                let extension = replaced.trim_start_matches('.');
                FileName::new(
                    name.base.clone(),
                    (!extension.is_empty()).then(|| extension.to_string()),
                )
            },
            Scope::NameAndExtension => FileName::split(&placeholder_if_empty(replaced), kind),
        };

        Ok(MatchOutcome {
            name: new_name,
            matched: true,
        })
    }
}

/// A name emptied by a replacement becomes `_` rather than vanishing or
/// leaving a bare `.ext` dotfile behind.
fn placeholder_if_empty(name: String) -> String {
    if name.is_empty() {
        "_".to_string()
    } else {
        name
    }
}

fn subject(name: &FileName, kind: EntryKind, scope: Scope) -> Option<String> {
    match scope {
        Scope::Name => Some(name.base.clone()),
        // Folders carry no extension to operate on
        Scope::Extension if kind == EntryKind::Dir => None,
        Scope::Extension => Some(name.extension.clone().unwrap_or_default()),
        Scope::NameAndExtension => Some(name.full()),
    }
}

/// `None` when the pattern did not match at all.
fn substitute(
    regex: &Regex,
    subject: &str,
    replacement: &Expansion,
    interpret_backrefs: bool,
) -> Result<Option<String>, TemplateError> {
    let plain = (!interpret_backrefs).then(|| replacement.to_plain());
    let mut out = String::with_capacity(subject.len());
    let mut last = 0;
    let mut matched = false;

    for caps in regex.captures_iter(subject) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&subject[last..whole.start()]);
        match &plain {
            Some(text) => out.push_str(text),
            None => replacement.render(&caps, &mut out)?,
        }
        last = whole.end();
        matched = true;
    }

    if !matched {
        return Ok(None);
    }
    out.push_str(&subject[last..]);
    Ok(Some(out))
}
