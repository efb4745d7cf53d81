use regex::Captures;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A parsed piece of a replacement template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateToken {
    /// Plain text, possibly containing `\N` back-references
    Literal(String),
    /// `<###>`, `<###:start>` or `<###:start:step>`
    Numbering { width: usize, start: i64, step: i64 },
    /// `<p>`, `<p:N>`, `<parent>` or `<parent:N>`
    ParentName { depth: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("<p:{depth}> goes beyond the filesystem root of {}", path.display())]
    ParentBeyondRoot { depth: usize, path: PathBuf },
    #[error("back-reference \\{group} refers to a group the pattern does not have ({available} available)")]
    UnknownGroup { group: usize, available: usize },
}

/// Counter shared by every numbering token of one preview pass.
///
/// It only moves forward when an item actually matched, so unmatched items do
/// not consume numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NumberingState {
    matches_seen: u64,
}

impl NumberingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches_seen(&self) -> u64 {
        self.matches_seen
    }

    pub fn advance(&mut self) {
        self.matches_seen += 1;
    }
}

/// Replacement text with tokens resolved for one item.
///
/// Literal parts still carry back-references. Token output is kept apart so a
/// parent folder named `\1` is inserted as-is instead of being read as a
/// group reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expansion {
    pieces: Vec<Piece>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Verbatim(String),
}

impl Expansion {
    /// Concatenation of all pieces with back-references left untouched.
    pub fn to_plain(&self) -> String {
        self.pieces
            .iter()
            .map(|piece| match piece {
                Piece::Text(s) | Piece::Verbatim(s) => s.as_str(),
            })
            .collect()
    }

    /// Append the expansion to `out`, resolving `\N` against `caps`.
    pub fn render(&self, caps: &Captures<'_>, out: &mut String) -> Result<(), TemplateError> {
        for piece in &self.pieces {
            match piece {
                Piece::Verbatim(s) => out.push_str(s),
                Piece::Text(s) => interpolate(s, caps, out)?,
            }
        }
        Ok(())
    }
}

fn interpolate(text: &str, caps: &Captures<'_>, out: &mut String) -> Result<(), TemplateError> {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('\\') => {
                chars.next();
                out.push('\\');
            },
            Some(d) if d.is_ascii_digit() => {
                chars.next();
                let mut group = d as usize - '0' as usize;
                if let Some(&d2) = chars.peek() {
                    if d2.is_ascii_digit() {
                        chars.next();
                        group = group * 10 + (d2 as usize - '0' as usize);
                    }
                }
                let available = caps.len() - 1;
                if group > available {
                    return Err(TemplateError::UnknownGroup { group, available });
                }
                // A group that did not participate in the match expands to nothing
                if let Some(m) = caps.get(group) {
                    out.push_str(m.as_str());
                }
            },
            _ => out.push('\\'),
        }
    }
    Ok(())
}

/// A replacement template parsed into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    tokens: Vec<TemplateToken>,
}

impl Template {
    /// Parse a raw template. Anything that does not form a valid token stays
    /// literal text, so parsing never fails.
    pub fn parse(raw: &str) -> Self {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while let Some(open) = rest.find('<') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let token = after
                .find('>')
                .and_then(|close| parse_token(&after[..close]).map(|t| (t, close)));
            match token {
                Some((token, close)) => {
                    if !literal.is_empty() {
                        tokens.push(TemplateToken::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(token);
                    rest = &after[close + 1..];
                },
                None => {
                    literal.push('<');
                    rest = after;
                },
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            tokens.push(TemplateToken::Literal(literal));
        }

        Self { tokens }
    }

    pub fn tokens(&self) -> &[TemplateToken] {
        &self.tokens
    }

    pub fn has_numbering(&self) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, TemplateToken::Numbering { .. }))
    }

    /// Resolve every token for the item at `source_path`.
    ///
    /// The numbering state is only read here; the caller advances it once the
    /// item is known to have matched.
    pub fn expand(
        &self,
        source_path: &Path,
        numbering: &NumberingState,
    ) -> Result<Expansion, TemplateError> {
        let mut pieces = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            let piece = match token {
                TemplateToken::Literal(text) => Piece::Text(text.clone()),
                TemplateToken::Numbering { width, start, step } => {
                    Piece::Verbatim(format_number(*width, *start, *step, numbering))
                },
                TemplateToken::ParentName { depth } => {
                    Piece::Verbatim(parent_name(source_path, *depth)?)
                },
            };
            pieces.push(piece);
        }
        Ok(Expansion { pieces })
    }
}

fn format_number(width: usize, start: i64, step: i64, numbering: &NumberingState) -> String {
    let offset = i64::try_from(numbering.matches_seen()).unwrap_or(i64::MAX);
    let value = start.saturating_add(step.saturating_mul(offset));
    format!("{:0width$}", value, width = width)
}

fn parent_name(source: &Path, depth: usize) -> Result<String, TemplateError> {
    if depth == 0 {
        return Ok(String::new());
    }
    let mut dir = source.parent();
    for _ in 1..depth {
        dir = dir.and_then(Path::parent);
    }
    dir.and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| TemplateError::ParentBeyondRoot {
            depth,
            path: source.to_path_buf(),
        })
}

fn parse_token(inner: &str) -> Option<TemplateToken> {
    if inner.starts_with('#') {
        return parse_numbering(inner);
    }
    let lower = inner.to_ascii_lowercase();
    let (name, arg) = match lower.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (lower.as_str(), None),
    };
    if name != "p" && name != "parent" {
        return None;
    }
    let depth = match arg {
        None => 1,
        Some(digits) if is_digits(digits) => digits.parse().ok()?,
        Some(_) => return None,
    };
    Some(TemplateToken::ParentName { depth })
}

fn parse_numbering(inner: &str) -> Option<TemplateToken> {
    let width = inner.chars().take_while(|&c| c == '#').count();
    let rest = &inner[width..];
    let (start, step) = if rest.is_empty() {
        (1, 1)
    } else {
        let args = rest.strip_prefix(':')?;
        match args.split_once(':') {
            Some((start, step)) => (parse_signed(start)?, parse_signed(step)?),
            None => (parse_signed(args)?, 1),
        }
    };
    Some(TemplateToken::Numbering { width, start, step })
}

fn parse_signed(s: &str) -> Option<i64> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if !is_digits(digits) {
        return None;
    }
    s.parse().ok()
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
