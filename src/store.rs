/**
 * Asset store boundary
 *
 * The engine never owns assets. It enumerates them, fetches their original
 * payloads, and hands batches of date changes back to the store, which applies
 * each batch atomically or not at all.
 */

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::range::{DateInterval, RecordedDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    OldestFirst,
    NewestFirst,
}

/// Enumeration request. The interval is a hint the store uses to avoid handing
/// out assets (and later payload fetches) the caller does not care about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetQuery {
    pub sort: Option<SortOrder>,
    pub interval: Option<DateInterval>,
}

impl AssetQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn within(mut self, interval: DateInterval) -> Self {
        self.interval = Some(interval);
        self
    }
}

/// One enumerated asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRecord<A> {
    pub identifier: String,
    pub recorded_date: DateTime<Utc>,
    pub asset: A,
}

impl<A> RecordedDate for AssetRecord<A> {
    fn recorded_date(&self) -> DateTime<Utc> {
        self.recorded_date
    }
}

/// Overwrite the recorded date of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateChange {
    pub identifier: String,
    pub new_date: DateTime<Utc>,
}

pub trait AssetStore: Send + Sync {
    /// Store-side reference to an asset; cloned into flagged items.
    type Asset: Clone + Send + Sync + 'static;

    fn enumerate(&self, query: &AssetQuery) -> Result<Vec<AssetRecord<Self::Asset>>, StoreError>;

    /// The original binary content of an asset.
    fn fetch_payload<'a>(
        &'a self,
        record: &'a AssetRecord<Self::Asset>,
    ) -> BoxFuture<'a, Result<Vec<u8>, StoreError>>;

    /// Apply every change, or none of them.
    fn apply_dates(&self, changes: Vec<DateChange>) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Shared helper for stores that filter and sort in memory.
pub fn arrange<A>(mut records: Vec<AssetRecord<A>>, query: &AssetQuery) -> Vec<AssetRecord<A>> {
    if let Some(interval) = &query.interval {
        records.retain(|record| interval.contains(record.recorded_date));
    }
    match query.sort {
        Some(SortOrder::OldestFirst) => records.sort_by_key(|r| r.recorded_date),
        Some(SortOrder::NewestFirst) => records.sort_by(|a, b| b.recorded_date.cmp(&a.recorded_date)),
        None => {}
    }
    records
}

#[derive(Debug, Clone)]
struct MemoryAsset {
    identifier: String,
    recorded_date: DateTime<Utc>,
    payload: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    assets: Vec<MemoryAsset>,
    transaction_failure: Option<String>,
    fetches: usize,
    transactions: usize,
}

/// An in-process asset store. Assets enumerate in insertion order unless sorted.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    state: Mutex<MemoryState>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add or replace an asset. `payload: None` makes every fetch fail.
    pub fn insert(&self, identifier: &str, recorded_date: DateTime<Utc>, payload: Option<Vec<u8>>) {
        let mut state = self.lock();
        let asset = MemoryAsset {
            identifier: identifier.to_string(),
            recorded_date,
            payload,
        };
        match state.assets.iter_mut().find(|a| a.identifier == identifier) {
            Some(existing) => *existing = asset,
            None => state.assets.push(asset),
        }
    }

    pub fn recorded_date(&self, identifier: &str) -> Option<DateTime<Utc>> {
        self.lock()
            .assets
            .iter()
            .find(|a| a.identifier == identifier)
            .map(|a| a.recorded_date)
    }

    /// Make every following batch fail with `message` (or succeed again with `None`).
    pub fn fail_transactions(&self, message: Option<&str>) {
        self.lock().transaction_failure = message.map(str::to_string);
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    pub fn transaction_count(&self) -> usize {
        self.lock().transactions
    }

    pub fn len(&self) -> usize {
        self.lock().assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().assets.is_empty()
    }
}

impl AssetStore for MemoryAssetStore {
    type Asset = String;

    fn enumerate(&self, query: &AssetQuery) -> Result<Vec<AssetRecord<String>>, StoreError> {
        let records = self
            .lock()
            .assets
            .iter()
            .map(|a| AssetRecord {
                identifier: a.identifier.clone(),
                recorded_date: a.recorded_date,
                asset: a.identifier.clone(),
            })
            .collect();
        Ok(arrange(records, query))
    }

    fn fetch_payload<'a>(
        &'a self,
        record: &'a AssetRecord<String>,
    ) -> BoxFuture<'a, Result<Vec<u8>, StoreError>> {
        let result = {
            let mut state = self.lock();
            state.fetches += 1;
            state
                .assets
                .iter()
                .find(|a| a.identifier == record.asset)
                .and_then(|a| a.payload.clone())
                .ok_or_else(|| StoreError::PayloadUnavailable {
                    identifier: record.identifier.clone(),
                    reason: "no payload stored".to_string(),
                })
        };
        Box::pin(async move { result })
    }

    fn apply_dates(&self, changes: Vec<DateChange>) -> BoxFuture<'_, Result<(), StoreError>> {
        let result = {
            let mut state = self.lock();
            state.transactions += 1;
            commit_in_memory(&mut state, &changes)
        };
        Box::pin(async move { result })
    }
}

fn commit_in_memory(state: &mut MemoryState, changes: &[DateChange]) -> Result<(), StoreError> {
    if let Some(message) = &state.transaction_failure {
        return Err(StoreError::Transaction {
            message: Some(message.clone()),
        });
    }

    let positions: HashMap<&str, usize> = state
        .assets
        .iter()
        .enumerate()
        .map(|(i, a)| (a.identifier.as_str(), i))
        .collect();

    // Resolve everything before touching anything
    let mut resolved = Vec::with_capacity(changes.len());
    for change in changes {
        match positions.get(change.identifier.as_str()) {
            Some(&index) => resolved.push((index, change.new_date)),
            None => {
                return Err(StoreError::Transaction {
                    message: Some(format!("unknown asset {}", change.identifier)),
                })
            }
        }
    }

    for (index, new_date) in resolved {
        state.assets[index].recorded_date = new_date;
    }
    debug!("Committed {} date change(s)", changes.len());
    Ok(())
}
