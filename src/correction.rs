/**
 * Correction batches - overwrite recorded dates with capture dates
 */

use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;

use crate::error::CorrectionError;
use crate::flagged::{FlaggedItem, FlaggedSet};
use crate::store::{AssetStore, DateChange};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorrectionReport {
    /// Identifiers whose recorded date was overwritten, in batch order.
    pub corrected: Vec<String>,
}

impl CorrectionReport {
    pub fn is_empty(&self) -> bool {
        self.corrected.is_empty()
    }
}

/// Commits corrections as one store transaction.
///
/// No locking of its own: overlapping batches submitted concurrently are
/// ordered by the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrectionApplier;

impl CorrectionApplier {
    pub fn new() -> Self {
        Self
    }

    /// Send one batch overwriting each item's recorded date with its extracted date.
    ///
    /// An empty batch succeeds without contacting the store.
    pub async fn commit<S: AssetStore>(
        &self,
        store: &S,
        items: &[&FlaggedItem<S::Asset>],
    ) -> Result<CorrectionReport, CorrectionError> {
        if items.is_empty() {
            return Ok(CorrectionReport::default());
        }

        let changes: Vec<DateChange> = items.iter().map(|item| item.correction()).collect();
        let corrected: Vec<String> = changes.iter().map(|c| c.identifier.clone()).collect();

        info!("Committing {} date correction(s)", changes.len());
        match store.apply_dates(changes).await {
            Ok(()) => {
                info!("Corrected {} asset(s)", corrected.len());
                Ok(CorrectionReport { corrected })
            }
            Err(e) => {
                warn!("Correction batch of {} rejected: {}", corrected.len(), e);
                Err(CorrectionError::Transaction {
                    attempted: corrected.len(),
                    source: e,
                })
            }
        }
    }

    /// Commit the selected items of `working_set` and drop them from it on success.
    ///
    /// On failure the working set is left exactly as it was, so the batch can be retried.
    pub async fn apply_selected<S: AssetStore>(
        &self,
        store: &S,
        working_set: &mut FlaggedSet<S::Asset>,
    ) -> Result<CorrectionReport, CorrectionError> {
        let report = {
            let selected = working_set.selected();
            self.commit(store, &selected).await?
        };

        let done: HashSet<String> = report.corrected.iter().cloned().collect();
        working_set.remove_identifiers(&done);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryAssetStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn ymd(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
    }

    fn setup() -> (MemoryAssetStore, FlaggedSet<String>) {
        let store = MemoryAssetStore::new();
        let mut items = Vec::new();
        for (i, id) in ["x", "y", "z"].iter().enumerate() {
            let recorded = ymd(2020 + i as i32);
            store.insert(id, recorded, None);
            items.push(FlaggedItem::new(id.to_string(), id.to_string(), recorded, ymd(2000 + i as i32)));
        }
        (store, FlaggedSet::from_items(items))
    }

    #[tokio::test]
    async fn nothing_selected_never_reaches_the_store() {
        let (store, mut set) = setup();
        let report = CorrectionApplier::new().apply_selected(&store, &mut set).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(store.transaction_count(), 0);
        assert_eq!(set.len(), 3);
    }

    #[tokio::test]
    async fn partial_selection_only_touches_selected() {
        let (store, mut set) = setup();
        set.select("y", true);
        let report = CorrectionApplier::new().apply_selected(&store, &mut set).await.unwrap();
        assert_eq!(report.corrected, vec!["y".to_string()]);
        assert_eq!(store.recorded_date("y"), Some(ymd(2001)));
        assert_eq!(store.recorded_date("x"), Some(ymd(2020)));
        assert!(!set.contains("y"));
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn failure_surfaces_store_message() {
        let (store, mut set) = setup();
        set.select_all(true);
        store.fail_transactions(Some("permission denied"));
        let err = CorrectionApplier::new().apply_selected(&store, &mut set).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to correct 3 asset(s): batch transaction failed: permission denied"
        );
        let CorrectionError::Transaction { attempted, source } = &err;
        assert_eq!(*attempted, 3);
        assert!(matches!(
            source,
            StoreError::Transaction { message: Some(m) } if m == "permission denied"
        ));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(set.selected_count(), 3);
    }
}
