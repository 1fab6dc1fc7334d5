/**
 * Flagged items and the working set a scan produces
 */

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::range::{DateInterval, RecordedDate};
use crate::store::DateChange;

/// An asset whose recorded date disagreed with its capture date when it was scanned.
///
/// The disagreement is a point-in-time fact; the store's date may have moved since.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedItem<A> {
    pub identifier: String,
    #[serde(skip)]
    pub asset: A,
    pub recorded_date: DateTime<Utc>,
    pub extracted_date: DateTime<Utc>,
    pub selected: bool,
}

impl<A> FlaggedItem<A> {
    pub fn new(
        identifier: String,
        asset: A,
        recorded_date: DateTime<Utc>,
        extracted_date: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier,
            asset,
            recorded_date,
            extracted_date,
            selected: false,
        }
    }

    /// How far the recorded date sits from the capture date (positive: recorded later).
    pub fn drift(&self) -> Duration {
        self.recorded_date - self.extracted_date
    }

    pub fn correction(&self) -> DateChange {
        DateChange {
            identifier: self.identifier.clone(),
            new_date: self.extracted_date,
        }
    }
}

impl<A> RecordedDate for FlaggedItem<A> {
    fn recorded_date(&self) -> DateTime<Utc> {
        self.recorded_date
    }
}

/// Result set of one scan pass. Order follows enumeration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent, bound = "")]
pub struct FlaggedSet<A> {
    items: Vec<FlaggedItem<A>>,
}

impl<A> FlaggedSet<A> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Later duplicates of an identifier are dropped.
    pub fn from_items(items: Vec<FlaggedItem<A>>) -> Self {
        let mut seen = HashSet::new();
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.identifier.clone()))
            .collect();
        Self { items }
    }

    pub(crate) fn push(&mut self, item: FlaggedItem<A>) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[FlaggedItem<A>] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FlaggedItem<A>> {
        self.items.iter()
    }

    pub fn into_items(self) -> Vec<FlaggedItem<A>> {
        self.items
    }

    pub fn get(&self, identifier: &str) -> Option<&FlaggedItem<A>> {
        self.items.iter().find(|item| item.identifier == identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.get(identifier).is_some()
    }

    /// Returns false if no item has that identifier.
    pub fn select(&mut self, identifier: &str, selected: bool) -> bool {
        match self.items.iter_mut().find(|item| item.identifier == identifier) {
            Some(item) => {
                item.selected = selected;
                true
            }
            None => false,
        }
    }

    pub fn select_all(&mut self, selected: bool) {
        for item in &mut self.items {
            item.selected = selected;
        }
    }

    pub fn selected(&self) -> Vec<&FlaggedItem<A>> {
        self.items.iter().filter(|item| item.selected).collect()
    }

    pub fn selected_count(&self) -> usize {
        self.items.iter().filter(|item| item.selected).count()
    }

    /// Drop every item whose identifier is in `identifiers`; returns how many went.
    pub fn remove_identifiers(&mut self, identifiers: &HashSet<String>) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !identifiers.contains(&item.identifier));
        before - self.items.len()
    }

    /// Keep only the items recorded within `interval`, in their current order.
    pub fn retain_interval(&mut self, interval: &DateInterval) {
        self.items.retain(|item| interval.contains(item.recorded_date));
    }
}

impl<A> Default for FlaggedSet<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, A> IntoIterator for &'a FlaggedSet<A> {
    type Item = &'a FlaggedItem<A>;
    type IntoIter = std::slice::Iter<'a, FlaggedItem<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
