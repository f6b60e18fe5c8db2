//! Listing order for media snapshots.

use std::cmp::Ordering;

use clipflow_models::{Clip, MediaAsset};

/// Sort assets most-recent-first; ties break on ID so the order is stable
/// across identical snapshots.
pub fn sort_most_recent_first(assets: &mut [MediaAsset]) {
    assets.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.as_str().cmp(b.id.as_str()))
    });
}

/// Sort clips by their position in the source recording.
pub fn sort_clips_by_start(clips: &mut [Clip]) {
    clips.sort_by(|a, b| {
        a.start_secs
            .partial_cmp(&b.start_secs)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}
