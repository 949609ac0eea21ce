//! Ingredient normalization.
//!
//! Detector labels and free-text entries both end up here. The set is the single
//! canonical input to recipe matching: deduplicated, case-folded and ordered,
//! so two sets built from the same entries in any order compare equal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::food::types::{DetectionBatch, Ingredient};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngredientSet(BTreeSet<Ingredient>);

impl IngredientSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        set.merge(entries);
        set
    }

    /// Union the normalized entries into the set. Returns how many were new.
    pub fn merge<I, S>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        entries
            .into_iter()
            .filter_map(|entry| Ingredient::parse(entry.as_ref()))
            .filter(|ingredient| self.0.insert(ingredient.clone()))
            .count()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Ingredient> {
        self.0.iter()
    }

    /// The member that `name` refers to, tolerating a plural suffix on either side.
    pub fn find_same(&self, name: &Ingredient) -> Option<&Ingredient> {
        self.0
            .get(name)
            .or_else(|| self.0.iter().find(|member| member.same_as(name)))
    }

    pub fn difference(&self, other: &IngredientSet) -> IngredientSet {
        IngredientSet(self.0.difference(&other.0).cloned().collect())
    }

    pub fn is_disjoint(&self, other: &IngredientSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn is_subset(&self, other: &IngredientSet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Sorted names, the form used to decide whether a new catalog query is needed.
    pub fn sorted_names(&self) -> Vec<String> {
        self.0.iter().map(|i| i.as_str().to_string()).collect()
    }

    pub fn join(&self, separator: &str) -> String {
        self.sorted_names().join(separator)
    }
}

impl FromIterator<Ingredient> for IngredientSet {
    fn from_iter<T: IntoIterator<Item = Ingredient>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a IngredientSet {
    type Item = &'a Ingredient;
    type IntoIter = std::collections::btree_set::Iter<'a, Ingredient>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Split a comma-separated free-text entry into raw ingredient entries.
pub fn split_free_text(text: &str) -> Vec<&str> {
    text.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Flatten the labels of several detection batches into raw entries.
pub fn detection_entries(batches: &[DetectionBatch]) -> Vec<&str> {
    batches.iter().flat_map(|batch| batch.labels()).collect()
}

/// Set-union of `existing` with the normalized `entries`.
pub fn normalize<I, S>(existing: &IngredientSet, entries: I) -> IngredientSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut merged = existing.clone();
    merged.merge(entries);
    merged
}
