use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use super::Category;

/// Grammar of a placeholder token: `__<category>_<n>__`.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"__[a-z]+(?:_[a-z]+)*_[1-9][0-9]*__").expect("placeholder grammar compiles")
});

/// Format the placeholder token for the `n`th value of `category`.
pub fn placeholder(category: Category, n: u32) -> String {
    format!("__{}_{}__", category.as_str(), n)
}

/// Byte spans of every placeholder-shaped token in `text`.
pub fn placeholder_spans(text: &str) -> Vec<(usize, usize)> {
    PLACEHOLDER_RE
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect()
}

/// Per-request association between placeholders and the values they hide.
///
/// Insertion ordered. An original value maps to exactly one placeholder and a
/// placeholder never stands for two values. Counters are per category and
/// start at 1, skipping any token reserved because the caller already wrote
/// it. A table lives for one request/response cycle and is never shared
/// between requests.
#[derive(Debug, Default, Clone)]
pub struct MappingTable {
    entries: Vec<(String, String)>,
    by_placeholder: HashMap<String, usize>,
    by_original: HashMap<String, usize>,
    counters: HashMap<Category, u32>,
    allocated: HashMap<Category, u32>,
    reserved: HashSet<String>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder for `original`, allocating the next one for `category` if the
    /// value has not been seen in this table yet.
    pub fn placeholder_for(&mut self, original: &str, category: Category) -> String {
        if let Some(&idx) = self.by_original.get(original) {
            return self.entries[idx].0.clone();
        }

        let counter = self.counters.entry(category).or_insert(0);
        let token = loop {
            *counter += 1;
            let token = placeholder(category, *counter);
            if !self.reserved.contains(&token) {
                break token;
            }
        };
        *self.allocated.entry(category).or_insert(0) += 1;

        let idx = self.entries.len();
        self.entries.push((token.clone(), original.to_string()));
        self.by_placeholder.insert(token.clone(), idx);
        self.by_original.insert(original.to_string(), idx);
        token
    }

    /// Keep every placeholder-shaped token already present in `text` out of
    /// allocation. Reserved tokens are never restored.
    pub fn reserve_existing(&mut self, text: &str) {
        for (start, end) in placeholder_spans(text) {
            let token = &text[start..end];
            if !self.by_placeholder.contains_key(token) {
                self.reserved.insert(token.to_string());
            }
        }
    }

    /// Original value behind a placeholder.
    pub fn get(&self, placeholder: &str) -> Option<&str> {
        self.by_placeholder
            .get(placeholder)
            .map(|&idx| self.entries[idx].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(placeholder, original)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, o)| (p.as_str(), o.as_str()))
    }

    /// Number of distinct values per category, for reporting.
    pub fn category_counts(&self) -> BTreeMap<Category, u32> {
        self.allocated
            .iter()
            .filter(|(_, &n)| n > 0)
            .map(|(&c, &n)| (c, n))
            .collect()
    }

    /// Replace every known placeholder in `text`, passing each original through
    /// `encode` first. Unknown placeholder-shaped tokens stay as they are.
    pub fn replace_with<F>(&self, text: &str, encode: F) -> String
    where
        F: Fn(&str) -> String,
    {
        if self.is_empty() {
            return text.to_string();
        }
        PLACEHOLDER_RE
            .replace_all(text, |caps: &regex::Captures| {
                let token = &caps[0];
                match self.get(token) {
                    Some(original) => encode(original),
                    None => token.to_string(),
                }
            })
            .into_owned()
    }
}
