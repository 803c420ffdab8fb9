//! Upgrade scout
//!
//! Walks the active lossy files and suggests the ones that would gain the
//! most from being replaced with a lossless copy. Suggestions are upserted
//! as upgrade candidates; curator decisions on existing rows are preserved.

use std::sync::Arc;

use crate::db::Store;
use crate::error::Result;
use crate::models::{AudioProperties, BitrateMode, UpgradeCandidate};
use crate::utils::dates::Clock;

use super::quality::quality_score;

const RECOMMENDED_FORMAT: &str = "flac";

pub struct UpgradeScout {
    store: Arc<Store>,
    clock: Clock,
}

impl UpgradeScout {
    pub fn new(store: Arc<Store>) -> Self {
        UpgradeScout {
            store,
            clock: Clock::system(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Refresh upgrade candidates for every active lossy file whose
    /// potential gain is at least `min_gain` points, and return the current
    /// candidate list, highest priority first.
    pub async fn suggest(&self, min_gain: u8) -> Result<Vec<UpgradeCandidate>> {
        let now = self.clock.now();
        let files = self.store.list_active_lossy().await?;
        let mut suggested = 0u64;

        for file in files {
            // the score this recording would reach as FLAC at its current
            // sample rate (CD rate when unknown)
            let target = AudioProperties {
                format: RECOMMENDED_FORMAT.into(),
                sample_rate_hz: file.sample_rate_hz.or(Some(44_100)),
                bit_depth: Some(16),
                channels: file.channels,
                bitrate_mode: BitrateMode::Unknown,
                ..Default::default()
            };
            let target_score = quality_score(&target, file.file_mtime, now);
            let gain = target_score.saturating_sub(file.quality_score);
            if gain < min_gain {
                continue;
            }

            let priority = (2 * gain as u16).min(100) as u8;
            self.store
                .upsert_upgrade_candidate(
                    file.id,
                    &file.format,
                    file.bitrate_kbps,
                    file.quality_score,
                    RECOMMENDED_FORMAT,
                    gain,
                    priority,
                    now,
                )
                .await?;
            suggested += 1;
        }

        tracing::info!(suggested, min_gain, "upgrade scout pass finished");

        self.store.list_upgrade_candidates(0, None).await
    }
}
