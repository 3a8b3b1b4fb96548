// 🔍 Name-based deduplication
//
// Two records "are the same thing" when their names match case-insensitively
// after trimming surrounding whitespace. Empty names never match anything.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// DEDUP PREFERENCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupPreference {
    /// Merge locations, labels and policies whose names match
    MergeMatchingNames,

    /// Move everything across as-is; duplicate names may coexist
    KeepSeparate,
}

impl DedupPreference {
    pub fn is_enabled(&self) -> bool {
        matches!(self, DedupPreference::MergeMatchingNames)
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Normalized match key, or `None` when the name can't match anything
pub fn normalize_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

pub fn names_match(a: &str, b: &str) -> bool {
    match (normalize_name(a), normalize_name(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

// ============================================================================
// NAME INDEX
// ============================================================================

/// Normalized name -> ids, preserving insertion order per key
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    by_name: HashMap<String, Vec<String>>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut index = NameIndex::new();
        for (id, name) in entries {
            index.insert(id, name);
        }
        index
    }

    pub fn insert(&mut self, id: &str, name: &str) {
        if let Some(key) = normalize_name(name) {
            self.by_name.entry(key).or_default().push(id.to_string());
        }
    }

    /// The single id whose name matches; ambiguous matches yield `None`
    pub fn unique_match(&self, name: &str) -> Option<&str> {
        let key = normalize_name(name)?;
        match self.by_name.get(&key) {
            Some(ids) if ids.len() == 1 => Some(ids[0].as_str()),
            _ => None,
        }
    }

    /// The first id (in insertion order) whose name matches
    pub fn first_match(&self, name: &str) -> Option<&str> {
        let key = normalize_name(name)?;
        self.by_name
            .get(&key)
            .and_then(|ids| ids.first())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
