//! Settings (settings.json). Loaded once at startup and shared by `Arc`; nothing here is a
//! global singleton. Every field has a default, so a partial file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::state::{Feature, ToggleNotice};

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

const DEFAULT_PORT: u16 = 28800;
const DEFAULT_MEDIA_PREFIX_BYTES: usize = 4 * 1024 * 1024; // 4 MiB, enough for front-loaded moov
pub const DEFAULT_IMAGE_MAX_BYTES: usize = 20 * 1024 * 1024;

/// Access token for a pull-mode bot, matched against the self_id reported by `get_login_info`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub self_id: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port for the WS endpoint and the probe endpoints.
    pub port: u16,
    /// WS endpoint path. Empty or "nil" = serve on "/".
    pub ws_path: String,
    /// Token gateways must present when connecting. Empty = no auth.
    pub ws_token: String,
    /// Base URLs of pull-mode (HTTP) bots, queried once at startup.
    pub http_paths: Vec<String>,
    pub access_tokens: Vec<AccessToken>,
    /// Videos shorter than this many seconds are withdrawn.
    pub video_second_limit: u32,
    /// Also require a QR positive before withdrawing a short video.
    pub check_video_qrcode: bool,
    /// Positive frames needed before a video counts as containing a QR code.
    pub qr_limit: usize,
    pub withdraw_notice: String,
    pub on_enable_video_check: String,
    pub on_disable_video_check: String,
    pub on_enable_pic_check: String,
    pub on_disable_pic_check: String,
    pub video_check_enabled_notice: String,
    pub video_check_disabled_notice: String,
    pub pic_check_enabled_notice: String,
    pub pic_check_disabled_notice: String,
    /// Kick the sender after a keyword withdrawal.
    pub set_group_kick: bool,
    /// When kicking, also reject the member's future join requests.
    pub kick_and_reject_add_request: bool,
    /// Ad keywords, matched as substrings in list order.
    pub withdraw_words: Vec<String>,
    /// Downloaded media, sampled frames and daily event logs.
    pub data_dir: PathBuf,
    /// SQLite file holding per-group feature flags.
    pub state_db: PathBuf,
    pub media_prefix_bytes: usize,
    /// Largest image body fetched for QR scanning.
    pub image_max_bytes: usize,
    pub fetch_timeout_secs: u64,
    pub ffmpeg_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            ws_path: String::new(),
            ws_token: String::new(),
            http_paths: Vec::new(),
            access_tokens: Vec::new(),
            video_second_limit: 5,
            check_video_qrcode: false,
            qr_limit: 1,
            withdraw_notice: "Suspected advertisement withdrawn.".to_string(),
            on_enable_video_check: "enable video check".to_string(),
            on_disable_video_check: "disable video check".to_string(),
            on_enable_pic_check: "enable pic check".to_string(),
            on_disable_pic_check: "disable pic check".to_string(),
            video_check_enabled_notice: "Video check enabled for this group.".to_string(),
            video_check_disabled_notice: "Video check disabled for this group.".to_string(),
            pic_check_enabled_notice: "Image check enabled for this group.".to_string(),
            pic_check_disabled_notice: "Image check disabled for this group.".to_string(),
            set_group_kick: false,
            kick_and_reject_add_request: false,
            withdraw_words: Vec::new(),
            data_dir: PathBuf::from("video"),
            state_db: PathBuf::from("moderation.db"),
            media_prefix_bytes: DEFAULT_MEDIA_PREFIX_BYTES,
            image_max_bytes: DEFAULT_IMAGE_MAX_BYTES,
            fetch_timeout_secs: 10,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl Config {
    /// Load settings from `path`. A missing file is replaced by a template holding the defaults
    /// and the defaults are returned; unreadable or invalid JSON is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Config::default();
                config.write_template(path)?;
                tracing::warn!(path = %path.display(), "settings file missing, wrote template with defaults");
                return Ok(config);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: Config = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded settings");
        Ok(config)
    }

    fn write_template(&self, path: &Path) -> Result<(), ConfigError> {
        let body = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, body).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Route the WS endpoint is mounted on.
    pub fn ws_route(&self) -> String {
        let path = self.ws_path.trim().trim_matches('/');
        if path.is_empty() || path == "nil" {
            "/".to_string()
        } else {
            format!("/{}", path)
        }
    }

    /// Access token configured for a pull-mode bot, or "" when none.
    pub fn token_for(&self, self_id: &str) -> &str {
        self.access_tokens
            .iter()
            .find(|t| t.self_id == self_id)
            .map(|t| t.token.as_str())
            .unwrap_or("")
    }

    /// Feature whose enable or disable command exactly equals `text`. Empty commands never match.
    pub fn toggle_feature(&self, text: &str) -> Option<Feature> {
        let is = |cmd: &str| !cmd.is_empty() && cmd == text;
        if is(self.on_enable_video_check.as_str()) || is(self.on_disable_video_check.as_str()) {
            Some(Feature::VideoCheck)
        } else if is(self.on_enable_pic_check.as_str()) || is(self.on_disable_pic_check.as_str()) {
            Some(Feature::ImageCheck)
        } else {
            None
        }
    }

    /// Notice text sent after a toggle.
    pub fn toggle_notice(&self, feature: Feature, notice: ToggleNotice) -> &str {
        match (feature, notice) {
            (Feature::VideoCheck, ToggleNotice::Enabled) => &self.video_check_enabled_notice,
            (Feature::VideoCheck, ToggleNotice::Disabled) => &self.video_check_disabled_notice,
            (Feature::ImageCheck, ToggleNotice::Enabled) => &self.pic_check_enabled_notice,
            (Feature::ImageCheck, ToggleNotice::Disabled) => &self.pic_check_disabled_notice,
        }
    }

    /// First configured ad keyword contained in `text`, in list order.
    pub fn matching_keyword(&self, text: &str) -> Option<&str> {
        self.withdraw_words
            .iter()
            .map(String::as_str)
            .find(|w| !w.is_empty() && text.contains(*w))
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"port": 9000, "withdraw_words": ["加群", "vx"]}"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.withdraw_words, vec!["加群", "vx"]);
        assert_eq!(config.video_second_limit, 5);
        assert_eq!(config.media_prefix_bytes, 4 * 1024 * 1024);
        assert_eq!(config.image_max_bytes, DEFAULT_IMAGE_MAX_BYTES);
    }

    #[test]
    fn missing_file_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.withdraw_notice, config.withdraw_notice);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn ws_route_handles_root_and_nil() {
        let mut config = Config::default();
        assert_eq!(config.ws_route(), "/");
        config.ws_path = "nil".into();
        assert_eq!(config.ws_route(), "/");
        config.ws_path = "/onebot/".into();
        assert_eq!(config.ws_route(), "/onebot");
    }

    #[test]
    fn keyword_match_is_first_in_list_order() {
        let config = Config {
            withdraw_words: vec!["".into(), "vx".into(), "加群".into()],
            ..Config::default()
        };
        assert_eq!(config.matching_keyword("加群 vx 123"), Some("vx"));
        assert_eq!(config.matching_keyword("hello"), None);
    }

    #[test]
    fn empty_commands_never_match() {
        let config = Config {
            on_enable_video_check: String::new(),
            on_disable_video_check: String::new(),
            ..Config::default()
        };
        assert_eq!(config.toggle_feature(""), None);
        assert_eq!(config.toggle_feature("enable pic check"), Some(Feature::ImageCheck));
    }
}
