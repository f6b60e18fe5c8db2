//! Playable and thumbnail URL resolution for generated clips.
//!
//! Each lookup is an ordered list of resolver functions; the first one that
//! yields a URL wins. A clip with nothing resolvable yet is `NotAvailable`,
//! not an error.

use clipflow_models::{is_resolvable_url, Clip, ClipView, MediaAsset, Playable};
use clipflow_storage::{time_fragment, DeliveryConfig};

/// One step of a URL fallback chain.
pub type UrlResolver = fn(&Clip, &MediaAsset) -> Option<String>;

/// Playable URL fallbacks, in order.
pub const PLAYABLE_RESOLVERS: &[UrlResolver] = &[
    rendered_artifact,
    resolvable_external_url,
    source_time_fragment,
];

/// Thumbnail URL fallbacks, in order.
pub const THUMBNAIL_RESOLVERS: &[UrlResolver] = &[clip_thumbnail, source_thumbnail_at_start];

/// The clip's own rendered artifact.
pub fn rendered_artifact(clip: &Clip, _asset: &MediaAsset) -> Option<String> {
    non_blank(clip.artifact_url.as_deref())
}

/// An external copy of the clip that already resolves.
pub fn resolvable_external_url(clip: &Clip, _asset: &MediaAsset) -> Option<String> {
    clip.external_url
        .as_deref()
        .filter(|u| is_resolvable_url(u))
        .map(str::to_string)
}

/// The parent recording restricted to the clip's offsets.
pub fn source_time_fragment(clip: &Clip, asset: &MediaAsset) -> Option<String> {
    if clip.media_asset_id != asset.id {
        return None;
    }
    asset
        .resolvable_source()
        .map(|source| time_fragment(source, clip.start_secs, clip.end_secs))
}

/// The clip's own thumbnail.
pub fn clip_thumbnail(clip: &Clip, _asset: &MediaAsset) -> Option<String> {
    non_blank(clip.thumbnail_url.as_deref())
}

/// A frame of the parent recording at the clip's start.
pub fn source_thumbnail_at_start(clip: &Clip, asset: &MediaAsset) -> Option<String> {
    if clip.media_asset_id != asset.id {
        return None;
    }
    asset
        .thumbnail_url_template
        .as_deref()
        .and_then(|template| DeliveryConfig::thumbnail_at(template, clip.start_secs))
}

fn non_blank(url: Option<&str>) -> Option<String> {
    url.map(str::trim).filter(|u| !u.is_empty()).map(str::to_string)
}

fn first_hit(resolvers: &[UrlResolver], clip: &Clip, asset: &MediaAsset) -> Option<String> {
    resolvers.iter().find_map(|resolve| resolve(clip, asset))
}

/// Resolve a playable URL for a clip.
pub fn resolve_playable_url(clip: &Clip, asset: &MediaAsset) -> Playable {
    match first_hit(PLAYABLE_RESOLVERS, clip, asset) {
        Some(url) => Playable::Url(url),
        None => Playable::NotAvailable,
    }
}

/// Resolve a thumbnail URL for a clip.
pub fn resolve_thumbnail_url(clip: &Clip, asset: &MediaAsset) -> Option<String> {
    first_hit(THUMBNAIL_RESOLVERS, clip, asset)
}

/// Build gallery view-models.
pub fn resolve_views(clips: &[Clip], asset: &MediaAsset) -> Vec<ClipView> {
    clips
        .iter()
        .map(|clip| ClipView {
            clip_id: clip.id.clone(),
            title: clip.title.clone(),
            caption: clip.caption.clone(),
            score: clip.score,
            start_secs: clip.start_secs,
            end_secs: clip.end_secs,
            status: clip.status,
            playable: resolve_playable_url(clip, asset),
            thumbnail_url: resolve_thumbnail_url(clip, asset),
        })
        .collect()
}
