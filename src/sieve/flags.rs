//! Flag environments and label selections

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::sieve::literal::Value;

/// Mapping of flag names to values
///
/// Used for the session defaults, the build-time environment and the live environment of a
/// resolution pass. Iteration is sorted by name, which keeps cache keys stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagEnv(BTreeMap<String, Value>);

impl FlagEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn unset(&mut self, name: &str) {
        self.0.remove(name);
    }

    /// Apply a `set` (`Some`) or an `unset` (`None`)
    pub fn apply(&mut self, name: &str, value: Option<&Value>) {
        match value {
            Some(value) => {
                self.0.insert(name.to_string(), value.clone());
            }
            None => {
                self.0.remove(name);
            }
        }
    }

    /// Layer `other` on top of `self`, `other` wins on conflicts
    pub fn overlay(mut self, other: &FlagEnv) -> Self {
        for (name, value) in other.iter() {
            self.0.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for FlagEnv {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Requested label names
///
/// The empty selection means "everything", never "nothing".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSelection(BTreeSet<String>);

impl LabelSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_selected(&self, label: &str) -> bool {
        self.0.is_empty() || self.0.contains(label)
    }

    pub fn insert(&mut self, label: impl Into<String>) -> bool {
        self.0.insert(label.into())
    }

    pub fn extend<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(labels.into_iter().map(Into::into));
    }

    pub fn union(&self, other: &LabelSelection) -> LabelSelection {
        LabelSelection(self.0.union(&other.0).cloned().collect())
    }

    /// Labels in sorted order
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for LabelSelection {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
