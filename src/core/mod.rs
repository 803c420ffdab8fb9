//! Core curation pipeline: read → hash → score → match → delete

pub mod checker;
pub mod deletion;
pub mod indexer;
pub mod quality;
pub mod reader;
pub mod similarity;
pub mod upgrades;
pub mod vetter;

pub use checker::{Candidate, DuplicateChecker, MatchResult};
pub use deletion::{
    DeletionEngine, DeletionGroup, DeletionPlan, DeletionStats, ExecuteOptions, Severity,
    ValidationResult,
};
pub use indexer::{Indexer, ScanOptions};
pub use upgrades::UpgradeScout;
pub use vetter::Vetter;
