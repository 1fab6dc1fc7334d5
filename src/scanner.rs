/**
 * Mismatch scanning
 *
 * Walks the candidates an asset store enumerates, one at a time and in order:
 * fetch payload -> extract original date -> compare against the recorded date.
 * A candidate whose payload or metadata is unusable is skipped; nothing a single
 * candidate does can abort the pass.
 */

use futures::stream::{self, Stream};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ConfigError, StoreError};
use crate::exif::{KamadakReader, MetadataExtractor, MetadataReader};
use crate::flagged::{FlaggedItem, FlaggedSet};
use crate::range::DateInterval;
use crate::store::{AssetQuery, AssetRecord, AssetStore, SortOrder};
use crate::tolerance::{is_mismatch, Tolerance};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub tolerance: Tolerance,
    /// Progress is reported every this many candidates, and on the last one.
    pub progress_interval: usize,
    pub sort: Option<SortOrder>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            progress_interval: 25,
            sort: Some(SortOrder::OldestFirst),
        }
    }
}

impl ScanConfig {
    pub fn new(tolerance: Tolerance) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Result<Self, ConfigError> {
        if interval == 0 {
            return Err(ConfigError::ZeroProgressInterval);
        }
        self.progress_interval = interval;
        Ok(self)
    }

    pub fn with_sort(mut self, sort: Option<SortOrder>) -> Self {
        self.sort = sort;
        self
    }

    fn should_report(&self, position: usize, total: usize) -> bool {
        position == total || position % self.progress_interval.max(1) == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Candidates processed so far.
    pub position: usize,
    pub total: usize,
    /// Candidates flagged so far.
    pub flagged: usize,
}

impl ScanProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.position as f64 / self.total as f64
    }

    pub fn is_complete(&self) -> bool {
        self.position == self.total
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent<A> {
    Flagged(FlaggedItem<A>),
    Progress(ScanProgress),
}

#[derive(Debug, Clone)]
pub struct ScanOutcome<A> {
    pub flagged: FlaggedSet<A>,
    /// Candidates that were inspected (flagged, consistent or skipped).
    pub scanned: usize,
    /// Candidates with no payload or no usable capture date.
    pub skipped: usize,
    pub cancelled: bool,
}

#[derive(Debug)]
struct MonitorState<A> {
    progress: ScanProgress,
    flagged: Vec<FlaggedItem<A>>,
}

/// Live view of a running scan, readable from other threads, plus a cancel switch.
///
/// Readers always see whole items and a prefix of the final result.
#[derive(Debug)]
pub struct ScanMonitor<A> {
    state: Arc<Mutex<MonitorState<A>>>,
    cancelled: Arc<AtomicBool>,
}

impl<A> Clone for ScanMonitor<A> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

impl<A> Default for ScanMonitor<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> ScanMonitor<A> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitorState {
                progress: ScanProgress::default(),
                flagged: Vec::new(),
            })),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState<A>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stop the scan before its next candidate.
    ///
    /// Cancellation is permanent: every later scan through this monitor (or a clone of
    /// it) ends before its first candidate. Use a new monitor for a new pass.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> ScanProgress {
        self.lock().progress
    }

    fn begin(&self, total: usize) {
        let mut state = self.lock();
        state.progress = ScanProgress {
            position: 0,
            total,
            flagged: 0,
        };
        state.flagged.clear();
    }

    fn record(&self, progress: ScanProgress, item: Option<FlaggedItem<A>>) {
        let mut state = self.lock();
        if let Some(item) = item {
            state.flagged.push(item);
        }
        state.progress = progress;
    }
}

impl<A: Clone> ScanMonitor<A> {
    pub fn flagged_so_far(&self) -> Vec<FlaggedItem<A>> {
        self.lock().flagged.clone()
    }
}

enum Inspection<A> {
    Flagged(FlaggedItem<A>),
    Consistent,
    Skipped,
}

struct StreamState<A> {
    records: std::vec::IntoIter<AssetRecord<A>>,
    progress: ScanProgress,
    pending: VecDeque<ScanEvent<A>>,
}

pub struct MismatchScanner<R = KamadakReader> {
    extractor: MetadataExtractor<R>,
    config: ScanConfig,
}

impl MismatchScanner<KamadakReader> {
    /// kamadak-exif extraction with system timezone fallback
    pub fn with_config(config: ScanConfig) -> Self {
        Self::new(MetadataExtractor::new(), config)
    }
}

impl<R: MetadataReader> MismatchScanner<R> {
    pub fn new(extractor: MetadataExtractor<R>, config: ScanConfig) -> Self {
        Self { extractor, config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn query(&self, interval: Option<DateInterval>) -> AssetQuery {
        AssetQuery {
            sort: self.config.sort,
            interval,
        }
    }

    /// Flagged items and progress reports as a lazy stream.
    ///
    /// Each flagged item is yielded before the progress report that counts it.
    /// Dropping the stream abandons the scan.
    pub fn events<'a, S: AssetStore>(
        &'a self,
        store: &'a S,
        interval: Option<DateInterval>,
    ) -> Result<impl Stream<Item = ScanEvent<S::Asset>> + 'a, StoreError> {
        let records = store.enumerate(&self.query(interval))?;
        let state = StreamState {
            progress: ScanProgress {
                position: 0,
                total: records.len(),
                flagged: 0,
            },
            records: records.into_iter(),
            pending: VecDeque::new(),
        };

        Ok(stream::unfold(state, move |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((event, state));
                }

                let record = state.records.next()?;
                state.progress.position += 1;
                if let Inspection::Flagged(item) = self.inspect(store, record).await {
                    state.progress.flagged += 1;
                    state.pending.push_back(ScanEvent::Flagged(item));
                }
                if self.config.should_report(state.progress.position, state.progress.total) {
                    state.pending.push_back(ScanEvent::Progress(state.progress));
                }
            }
        }))
    }

    /// Run a whole pass, calling `on_progress` at each reporting point.
    pub async fn scan<S, F>(
        &self,
        store: &S,
        interval: Option<DateInterval>,
        mut on_progress: F,
    ) -> Result<ScanOutcome<S::Asset>, StoreError>
    where
        S: AssetStore,
        F: FnMut(&ScanProgress),
    {
        self.run(store, interval, None, &mut on_progress).await
    }

    /// Run a whole pass while publishing every step to `monitor`.
    ///
    /// The monitor's previous contents are discarded when the pass starts.
    pub async fn scan_monitored<S: AssetStore>(
        &self,
        store: &S,
        interval: Option<DateInterval>,
        monitor: &ScanMonitor<S::Asset>,
    ) -> Result<ScanOutcome<S::Asset>, StoreError> {
        self.run(store, interval, Some(monitor), &mut |_: &ScanProgress| {}).await
    }

    async fn run<S: AssetStore>(
        &self,
        store: &S,
        interval: Option<DateInterval>,
        monitor: Option<&ScanMonitor<S::Asset>>,
        on_progress: &mut dyn FnMut(&ScanProgress),
    ) -> Result<ScanOutcome<S::Asset>, StoreError> {
        let records = store.enumerate(&self.query(interval))?;
        let total = records.len();
        info!("Scanning {} assets (tolerance {})", total, self.config.tolerance);

        if let Some(monitor) = monitor {
            monitor.begin(total);
        }

        let mut progress = ScanProgress {
            position: 0,
            total,
            flagged: 0,
        };
        let mut flagged = FlaggedSet::new();
        let mut skipped = 0;
        let mut cancelled = false;

        for record in records {
            if monitor.map_or(false, |m| m.is_cancelled()) {
                info!("Scan cancelled after {} of {} assets", progress.position, total);
                cancelled = true;
                break;
            }

            progress.position += 1;
            let found = match self.inspect(store, record).await {
                Inspection::Flagged(item) => {
                    progress.flagged += 1;
                    Some(item)
                }
                Inspection::Consistent => None,
                Inspection::Skipped => {
                    skipped += 1;
                    None
                }
            };

            if let Some(monitor) = monitor {
                monitor.record(progress, found.clone());
            }
            if let Some(item) = found {
                flagged.push(item);
            }
            if self.config.should_report(progress.position, total) {
                on_progress(&progress);
            }
        }

        info!(
            "Scan finished: {} flagged, {} skipped, {} scanned",
            flagged.len(),
            skipped,
            progress.position
        );

        Ok(ScanOutcome {
            flagged,
            scanned: progress.position,
            skipped,
            cancelled,
        })
    }

    async fn inspect<S: AssetStore>(&self, store: &S, record: AssetRecord<S::Asset>) -> Inspection<S::Asset> {
        let extracted = match store.fetch_payload(&record).await {
            Ok(payload) => self.extractor.extract_original_date(&payload),
            Err(e) => {
                debug!("Skipping {}: {}", record.identifier, e);
                return Inspection::Skipped;
            }
        };

        let extracted = match extracted {
            Some(date) => date,
            None => {
                debug!("Skipping {}: no usable capture date", record.identifier);
                return Inspection::Skipped;
            }
        };

        if !is_mismatch(record.recorded_date, extracted, self.config.tolerance) {
            return Inspection::Consistent;
        }

        debug!(
            "Flagged {}: recorded {} vs captured {}",
            record.identifier, record.recorded_date, extracted
        );
        Inspection::Flagged(FlaggedItem::new(
            record.identifier,
            record.asset,
            record.recorded_date,
            extracted,
        ))
    }
}
