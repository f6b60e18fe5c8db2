//! Delivery URL conventions.
//!
//! Playback and thumbnail URLs are derived from the stable asset ID that
//! storage returns when an upload is finalized. Thumbnail URLs are stored as
//! templates with a `{time}` placeholder so a frame can be picked per clip.

/// Placeholder substituted with a timestamp in thumbnail templates.
pub const THUMBNAIL_TIME_PLACEHOLDER: &str = "{time}";

/// Default playback host.
pub const DEFAULT_PLAYBACK_BASE_URL: &str = "https://stream.clipflow.app";

/// Default thumbnail host.
pub const DEFAULT_THUMBNAIL_BASE_URL: &str = "https://image.clipflow.app";

/// Delivery configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Base URL for streaming playback
    pub playback_base_url: String,
    /// Suffix appended to the asset ID for playback
    pub playback_suffix: String,
    /// Base URL for thumbnails
    pub thumbnail_base_url: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            playback_base_url: DEFAULT_PLAYBACK_BASE_URL.to_string(),
            playback_suffix: ".m3u8".to_string(),
            thumbnail_base_url: DEFAULT_THUMBNAIL_BASE_URL.to_string(),
        }
    }
}

impl DeliveryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            playback_base_url: std::env::var("PLAYBACK_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.playback_base_url),
            playback_suffix: std::env::var("PLAYBACK_URL_SUFFIX")
                .unwrap_or(defaults.playback_suffix),
            thumbnail_base_url: std::env::var("THUMBNAIL_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.thumbnail_base_url),
        }
    }

    /// Playback URL for a stored asset.
    pub fn playback_url(&self, asset_id: &str) -> String {
        format!(
            "{}/{}{}",
            self.playback_base_url.trim_end_matches('/'),
            urlencoding::encode(asset_id),
            self.playback_suffix
        )
    }

    /// Thumbnail URL template for a stored asset.
    pub fn thumbnail_url_template(&self, asset_id: &str) -> String {
        format!(
            "{}/{}/thumbnail.jpg?time={}",
            self.thumbnail_base_url.trim_end_matches('/'),
            urlencoding::encode(asset_id),
            THUMBNAIL_TIME_PLACEHOLDER
        )
    }

    /// Fill a thumbnail template with a timestamp in seconds.
    pub fn thumbnail_at(template: &str, secs: f64) -> Option<String> {
        if !template.contains(THUMBNAIL_TIME_PLACEHOLDER) || !secs.is_finite() || secs < 0.0 {
            return None;
        }
        Some(template.replace(THUMBNAIL_TIME_PLACEHOLDER, &format_secs(secs)))
    }
}

/// Append a media fragment restricting playback to `start..end` seconds.
pub fn time_fragment(url: &str, start_secs: f64, end_secs: f64) -> String {
    let base = url.split('#').next().unwrap_or(url);
    format!("{}#t={},{}", base, format_secs(start_secs), format_secs(end_secs))
}

/// Seconds without a trailing `.0` for whole values, millisecond precision otherwise.
fn format_secs(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        let s = format!("{:.3}", secs);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DeliveryConfig {
        DeliveryConfig {
            playback_base_url: "https://stream.test/".to_string(),
            playback_suffix: ".m3u8".to_string(),
            thumbnail_base_url: "https://img.test".to_string(),
        }
    }

    #[test]
    fn test_playback_url() {
        assert_eq!(config().playback_url("abc"), "https://stream.test/abc.m3u8");
    }

    #[test]
    fn test_thumbnail_template() {
        let template = config().thumbnail_url_template("abc");
        assert_eq!(template, "https://img.test/abc/thumbnail.jpg?time={time}");
        assert_eq!(
            DeliveryConfig::thumbnail_at(&template, 12.0).as_deref(),
            Some("https://img.test/abc/thumbnail.jpg?time=12")
        );
        assert_eq!(
            DeliveryConfig::thumbnail_at(&template, 12.5).as_deref(),
            Some("https://img.test/abc/thumbnail.jpg?time=12.5")
        );
        assert!(DeliveryConfig::thumbnail_at("https://img.test/static.jpg", 1.0).is_none());
    }

    #[test]
    fn test_time_fragment() {
        assert_eq!(
            time_fragment("https://stream.test/abc.m3u8", 10.0, 42.25),
            "https://stream.test/abc.m3u8#t=10,42.25"
        );
        assert_eq!(
            time_fragment("https://stream.test/abc.m3u8#t=1,2", 3.0, 4.0),
            "https://stream.test/abc.m3u8#t=3,4"
        );
    }
}
