//! Application configuration loaded from environment variables.
//!
//! Every setting has a default. Unparseable values are logged and replaced by
//! the default, except the rendition ladder: a ladder that does not build a
//! valid [`RenditionPlan`] is a startup error.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::api::server::ApiServerConfig;
use crate::encoder::plan::{EncodeSettings, RenditionPlan};
use crate::{Error, Result};

pub const DEFAULT_LADDER: &str = "1920:1080@5000k,1280:720@3000k,640:360@1000k";

/// Remote store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
    /// Upload endpoint. `None` disables publishing.
    pub url: Option<String>,
    /// Identity token passed to every publish, possibly empty.
    pub token: String,
    pub timeout_secs: u64,
}

impl PublishConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: String::new(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ApiServerConfig,
    /// Where uploaded sources are placed.
    pub upload_dir: PathBuf,
    /// Root of per-job output directories.
    pub output_dir: PathBuf,
    /// Enables the rolling file log when set.
    pub log_dir: Option<PathBuf>,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub publish: PublishConfig,
    pub encode: EncodeSettings,
    /// Ordered `(resolution, bitrate)` pairs.
    pub ladder: Vec<(String, String)>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ApiServerConfig::default(),
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("transcoded"),
            log_dir: None,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            publish: PublishConfig::default(),
            encode: EncodeSettings::default(),
            ladder: default_ladder(),
        }
    }
}

fn default_ladder() -> Vec<(String, String)> {
    RenditionPlan::parse_ladder(DEFAULT_LADDER).unwrap_or_default()
}

impl AppConfig {
    /// Load from the process environment.
    ///
    /// Supported env vars: `API_BIND_ADDRESS`, `API_PORT`, `UPLOAD_DIR`,
    /// `OUTPUT_DIR`, `LOG_DIR`, `FFMPEG_PATH`, `FFPROBE_PATH`, `PUBLISH_URL`,
    /// `PUBLISH_TOKEN`, `PUBLISH_TIMEOUT_SECS`, `HLS_SEGMENT_SECS`,
    /// `VIDEO_CODEC`, `AUDIO_CODEC`, `AUDIO_BITRATE`, `ENCODER_PRESET`,
    /// `GOP_SIZE`, `RENDITION_LADDER`.
    pub fn from_env_or_default() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            server: ApiServerConfig::from_lookup(&lookup),
            ..Self::default()
        };

        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = text("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = text("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        config.log_dir = log_dir_from_lookup(&lookup);
        if let Some(path) = text("FFMPEG_PATH") {
            config.ffmpeg_path = path;
        }
        if let Some(path) = text("FFPROBE_PATH") {
            config.ffprobe_path = path;
        }

        config.publish.url = text("PUBLISH_URL").map(|u| u.trim().to_string());
        config.publish.token = lookup("PUBLISH_TOKEN").unwrap_or_default();
        config.publish.timeout_secs =
            parse_or_default(&lookup, "PUBLISH_TIMEOUT_SECS", config.publish.timeout_secs);

        let encode = &mut config.encode;
        encode.segment_duration_secs =
            parse_or_default(&lookup, "HLS_SEGMENT_SECS", encode.segment_duration_secs);
        encode.gop_size = parse_or_default(&lookup, "GOP_SIZE", encode.gop_size);
        if let Some(codec) = text("VIDEO_CODEC") {
            encode.video_codec = codec;
        }
        if let Some(codec) = text("AUDIO_CODEC") {
            encode.audio_codec = codec;
        }
        if let Some(bitrate) = text("AUDIO_BITRATE") {
            encode.audio_bitrate = bitrate;
        }
        if let Some(preset) = text("ENCODER_PRESET") {
            encode.preset = preset;
        }

        if let Some(ladder) = text("RENDITION_LADDER") {
            config.ladder = RenditionPlan::parse_ladder(&ladder)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.encode.segment_duration_secs == 0 {
            return Err(Error::config("HLS_SEGMENT_SECS must be positive"));
        }
        if self.encode.gop_size == 0 {
            return Err(Error::config("GOP_SIZE must be positive"));
        }
        if let Some(url) = &self.publish.url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(Error::config(format!(
                "PUBLISH_URL must be an http(s) URL, got '{url}'"
            )));
        }
        self.rendition_plan()
            .map(|_| ())
            .map_err(|e| Error::config(format!("invalid rendition ladder: {e}")))
    }

    /// The plan every job uses.
    pub fn rendition_plan(&self) -> Result<RenditionPlan> {
        RenditionPlan::new(&self.ladder, self.encode.clone())
    }
}

/// `LOG_DIR` from the process environment.
///
/// Read on its own so logging can be installed before the rest of the
/// configuration is loaded and its warnings are emitted.
pub fn log_dir_from_env() -> Option<PathBuf> {
    log_dir_from_lookup(&|key: &str| std::env::var(key).ok())
}

fn log_dir_from_lookup<F>(lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    lookup("LOG_DIR")
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Parse `key` as `T`, warning and returning `default` when it is malformed.
fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) if raw.trim().is_empty() => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, default = %default, "Invalid config value, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn log_dir_is_read_the_same_way_before_and_during_load() {
        let vars = HashMap::from([("LOG_DIR".to_string(), "/var/log/hls".to_string())]);
        let lookup = |key: &str| vars.get(key).cloned();

        let early = log_dir_from_lookup(&lookup);
        let config = AppConfig::from_lookup(lookup).unwrap();

        assert_eq!(early, Some(PathBuf::from("/var/log/hls")));
        assert_eq!(config.log_dir, early);
        assert_eq!(log_dir_from_lookup(&|_: &str| Some("  ".to_string())), None);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = load(&[]).unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 8096);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.output_dir, PathBuf::from("transcoded"));
        assert!(config.log_dir.is_none());
        assert!(config.publish.url.is_none());
        assert_eq!(config.publish.token, "");
        assert_eq!(config.publish.timeout(), Duration::from_secs(60));
        assert_eq!(config.encode, EncodeSettings::default());
        assert_eq!(
            config.ladder,
            RenditionPlan::parse_ladder(DEFAULT_LADDER).unwrap()
        );
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("API_PORT", "9000"),
            ("OUTPUT_DIR", "/srv/hls"),
            ("PUBLISH_URL", "https://store.example/upload"),
            ("PUBLISH_TOKEN", "abc"),
            ("HLS_SEGMENT_SECS", "4"),
            ("VIDEO_CODEC", "libx264"),
            ("RENDITION_LADDER", "1280:720@2500k,854:480@1200k"),
        ])
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.output_dir, PathBuf::from("/srv/hls"));
        assert_eq!(
            config.publish.url.as_deref(),
            Some("https://store.example/upload")
        );
        assert_eq!(config.publish.token, "abc");
        assert_eq!(config.encode.segment_duration_secs, 4);
        assert_eq!(config.encode.video_codec, "libx264");
        let plan = config.rendition_plan().unwrap();
        assert_eq!(plan.labels().collect::<Vec<_>>(), vec!["720", "480"]);
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        let config = load(&[
            ("API_PORT", "not-a-port"),
            ("PUBLISH_TIMEOUT_SECS", "soon"),
            ("GOP_SIZE", "-5"),
        ])
        .unwrap();

        assert_eq!(config.server.port, 8096);
        assert_eq!(config.publish.timeout_secs, 60);
        assert_eq!(config.encode.gop_size, 120);
    }

    #[test]
    fn invalid_ladder_is_a_configuration_error() {
        for ladder in ["1280x720@3000k", "1280:720", "1280:720@3000k,640:720@800k"] {
            let err = load(&[("RENDITION_LADDER", ladder)]).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{ladder}: {err}");
        }
    }

    #[test]
    fn zero_segment_duration_is_rejected() {
        assert!(load(&[("HLS_SEGMENT_SECS", "0")]).is_err());
    }

    #[test]
    fn non_http_publish_url_is_rejected() {
        assert!(load(&[("PUBLISH_URL", "ftp://store")]).is_err());
    }
}
