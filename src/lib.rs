/**
 * exif-datefix: find photos whose library date drifted from their EXIF capture time
 * and write the capture time back.
 *
 * Flow: MismatchScanner (store enumeration -> payload -> MetadataExtractor ->
 * tolerance check) produces a FlaggedSet; callers narrow it with a DateInterval,
 * select items, and hand it to the CorrectionApplier.
 */

pub mod correction;
pub mod error;
pub mod exif;
pub mod exif_writer;
pub mod file_store;
pub mod flagged;
pub mod range;
pub mod scanner;
pub mod store;
pub mod timestamp;
pub mod tolerance;

pub use correction::{CorrectionApplier, CorrectionReport};
pub use error::{ConfigError, CorrectionError, StoreError, TimestampError};
pub use exif::{KamadakReader, MetadataExtractor, MetadataReader};
pub use flagged::{FlaggedItem, FlaggedSet};
pub use range::DateInterval;
pub use scanner::{MismatchScanner, ScanConfig, ScanEvent, ScanMonitor, ScanOutcome, ScanProgress};
pub use store::{AssetQuery, AssetRecord, AssetStore, DateChange, MemoryAssetStore, SortOrder};
pub use timestamp::{FixedTimezone, SystemTimezone, TimestampCodec, TimezoneProvider};
pub use tolerance::{is_mismatch, Tolerance};
