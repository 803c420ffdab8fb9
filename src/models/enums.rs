//! Enums shared across the curation engine

use serde::{Deserialize, Serialize};

/// Encoding strategy of a lossy stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BitrateMode {
    Cbr,
    Vbr,
    Abr,
    #[default]
    Unknown,
}

impl BitrateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BitrateMode::Cbr => "CBR",
            BitrateMode::Vbr => "VBR",
            BitrateMode::Abr => "ABR",
            BitrateMode::Unknown => "UNKNOWN",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "CBR" => BitrateMode::Cbr,
            "VBR" => BitrateMode::Vbr,
            "ABR" => BitrateMode::Abr,
            _ => BitrateMode::Unknown,
        }
    }
}

/// Outcome of a single `upsert_file` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
    Unchanged,
}

/// Which tier produced a duplicate match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    ContentHash,
    MetadataHash,
    Fuzzy,
}

impl MatchedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchedBy::ContentHash => "content_hash",
            MatchedBy::MetadataHash => "metadata_hash",
            MatchedBy::Fuzzy => "fuzzy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "content_hash" => Some(MatchedBy::ContentHash),
            "metadata_hash" => Some(MatchedBy::MetadataHash),
            "fuzzy" => Some(MatchedBy::Fuzzy),
            _ => None,
        }
    }
}

/// Why a file was deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionReason {
    ExactContent,
    ExactMetadata,
    LowerQuality,
    UserRequested,
}

impl DeletionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionReason::ExactContent => "exact_content",
            DeletionReason::ExactMetadata => "exact_metadata",
            DeletionReason::LowerQuality => "lower_quality",
            DeletionReason::UserRequested => "user_requested",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "exact_content" => Some(DeletionReason::ExactContent),
            "exact_metadata" => Some(DeletionReason::ExactMetadata),
            "lower_quality" => Some(DeletionReason::LowerQuality),
            "user_requested" => Some(DeletionReason::UserRequested),
            _ => None,
        }
    }

    /// The match tier this reason implies for the audit trail.
    pub fn matched_by(&self) -> MatchedBy {
        match self {
            DeletionReason::ExactContent => MatchedBy::ContentHash,
            DeletionReason::ExactMetadata => MatchedBy::MetadataHash,
            DeletionReason::LowerQuality => MatchedBy::MetadataHash,
            DeletionReason::UserRequested => MatchedBy::Fuzzy,
        }
    }
}

/// Who triggered a deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletedBy {
    System,
    #[default]
    User,
    Auto,
}

impl DeletedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletedBy::System => "system",
            DeletedBy::User => "user",
            DeletedBy::Auto => "auto",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "system" => DeletedBy::System,
            "auto" => DeletedBy::Auto,
            _ => DeletedBy::User,
        }
    }
}

/// Curator decision on an upgrade candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAction {
    #[default]
    Pending,
    Approved,
    Rejected,
    Completed,
    Ignored,
}

impl UserAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserAction::Pending => "pending",
            UserAction::Approved => "approved",
            UserAction::Rejected => "rejected",
            UserAction::Completed => "completed",
            UserAction::Ignored => "ignored",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(UserAction::Pending),
            "approved" => Some(UserAction::Approved),
            "rejected" => Some(UserAction::Rejected),
            "completed" => Some(UserAction::Completed),
            "ignored" => Some(UserAction::Ignored),
            _ => None,
        }
    }
}
