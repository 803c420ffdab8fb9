//! Data models for the curation engine
//!
//! Plain value types; persistence mapping lives in `db`.

mod enums;
mod file;
mod report;

pub use enums::{BitrateMode, DeletedBy, DeletionReason, MatchedBy, UpsertOutcome, UserAction};
pub use file::{AudioProperties, LibraryFile, LOSSLESS_FORMATS};
pub use report::{
    DedupEvent, LibraryStatistics, ProgressEvent, ProgressFn, ScanFailure, ScanReport,
    UpgradeCandidate, VetEntry, VettingReport, VettingRun,
};
