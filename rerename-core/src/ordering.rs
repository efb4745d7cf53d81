use crate::item::{Item, ItemId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use ts_rs::TS;

/// Orders two file names.
pub type Comparator = Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

/// Plain code point order.
pub fn lexicographic(a: &str, b: &str) -> Ordering {
    a.cmp(b)
}

/// Alphanumeric-aware order: digit runs compare by value, so `file2` sorts
/// before `file10`. Text runs compare case-insensitively.
pub fn natural_order(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);
    loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Chunk::Digits(x)), Some(Chunk::Digits(y))) => compare_digits(x, y),
            (Some(Chunk::Digits(_)), Some(Chunk::Text(_))) => Ordering::Less,
            (Some(Chunk::Text(_)), Some(Chunk::Digits(_))) => Ordering::Greater,
            (Some(Chunk::Text(x)), Some(Chunk::Text(y))) => x
                .chars()
                .flat_map(char::to_lowercase)
                .cmp(y.chars().flat_map(char::to_lowercase)),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

fn compare_digits(x: &str, y: &str) -> Ordering {
    let xs = x.trim_start_matches('0');
    let ys = y.trim_start_matches('0');
    xs.len()
        .cmp(&ys.len())
        .then_with(|| xs.cmp(ys))
        .then_with(|| x.len().cmp(&y.len()))
}

enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if digits {
            Chunk::Digits(chunk)
        } else {
            Chunk::Text(chunk)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum OrderingMode {
    AutoSorted,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingError {
    #[error("items cannot be moved while autosort is on")]
    AutoSorted,
    #[error("position {index} is out of range for {len} items")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Move the selected positions as a block so they land before the element
/// currently at `target_index` (`len` means the end). Selected elements keep
/// their relative order, and so do the others.
pub fn move_selection<T: Clone>(
    sequence: &[T],
    selection: &BTreeSet<usize>,
    target_index: usize,
) -> Result<Vec<T>, OrderingError> {
    let len = sequence.len();
    if target_index > len {
        return Err(OrderingError::IndexOutOfRange {
            index: target_index,
            len,
        });
    }
    if let Some(&index) = selection.iter().find(|&&i| i >= len) {
        return Err(OrderingError::IndexOutOfRange { index, len });
    }

    let moved: Vec<T> = selection.iter().map(|&i| sequence[i].clone()).collect();
    let mut others = Vec::with_capacity(len - moved.len());
    let mut insert_at = 0;
    for (i, element) in sequence.iter().enumerate() {
        if selection.contains(&i) {
            continue;
        }
        if i < target_index {
            insert_at += 1;
        }
        others.push(element.clone());
    }

    others.splice(insert_at..insert_at, moved);
    Ok(others)
}

/// Display order of the items in a batch.
#[derive(Clone)]
pub struct OrderingManager {
    mode: OrderingMode,
    comparator: Comparator,
    sequence: Vec<ItemId>,
}

impl fmt::Debug for OrderingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderingManager")
            .field("mode", &self.mode)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl OrderingManager {
    pub fn new(mode: OrderingMode, comparator: Comparator) -> Self {
        Self {
            mode,
            comparator,
            sequence: Vec::new(),
        }
    }

    pub fn mode(&self) -> OrderingMode {
        self.mode
    }

    pub fn sequence(&self) -> &[ItemId] {
        &self.sequence
    }

    pub fn position(&self, id: ItemId) -> Option<usize> {
        self.sequence.iter().position(|&x| x == id)
    }

    /// Append new ids, then re-sort if autosort is on.
    pub fn extend(&mut self, ids: impl IntoIterator<Item = ItemId>, items: &HashMap<ItemId, Item>) {
        self.sequence.extend(ids);
        self.resort(items);
    }

    /// Put an id back at `index` (clamped). Autosort overrides the position.
    pub fn insert_at(&mut self, index: usize, id: ItemId, items: &HashMap<ItemId, Item>) {
        let index = index.min(self.sequence.len());
        self.sequence.insert(index, id);
        self.resort(items);
    }

    pub fn remove(&mut self, ids: &HashSet<ItemId>) {
        self.sequence.retain(|id| !ids.contains(id));
    }

    pub fn clear(&mut self) {
        self.sequence.clear();
    }

    /// Switching from manual to autosort re-sorts immediately. Switching off
    /// freezes the current order.
    pub fn set_mode(&mut self, mode: OrderingMode, items: &HashMap<ItemId, Item>) {
        self.mode = mode;
        self.resort(items);
    }

    pub fn set_comparator(&mut self, comparator: Comparator, items: &HashMap<ItemId, Item>) {
        self.comparator = comparator;
        self.resort(items);
    }

    /// Re-apply the comparator. No-op in manual mode.
    pub fn resort(&mut self, items: &HashMap<ItemId, Item>) {
        if self.mode != OrderingMode::AutoSorted {
            return;
        }
        let comparator = Arc::clone(&self.comparator);
        self.sequence.sort_by(|a, b| match (items.get(a), items.get(b)) {
            (Some(x), Some(y)) => comparator(&x.file_name(), &y.file_name())
                .then_with(|| x.source_path.cmp(&y.source_path)),
            _ => a.cmp(b),
        });
    }

    pub fn move_selection(
        &mut self,
        selection: &BTreeSet<usize>,
        target_index: usize,
    ) -> Result<(), OrderingError> {
        if self.mode == OrderingMode::AutoSorted {
            return Err(OrderingError::AutoSorted);
        }
        self.sequence = move_selection(&self.sequence, selection, target_index)?;
        Ok(())
    }
}
