use std::{env, path::PathBuf};

use db::models::batch_job::BadgeType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::composer::{Anchor, BadgeStyle};
use crate::services::providers::ReviewSource;

const CONFIG_PATH_ENV: &str = "APHRODITE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JellyfinSettings {
    pub url: String,
    pub api_key: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub tmdb_api_key: String,
    pub omdb_api_key: String,
    pub fanart_api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSettings {
    pub sources_enabled: Vec<ReviewSource>,
    pub source_priority: Vec<ReviewSource>,
    pub min_votes: u64,
    pub max_badges: usize,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            sources_enabled: vec![
                ReviewSource::Imdb,
                ReviewSource::RottenTomatoes,
                ReviewSource::Metacritic,
                ReviewSource::Tmdb,
            ],
            source_priority: vec![
                ReviewSource::Imdb,
                ReviewSource::RottenTomatoes,
                ReviewSource::Metacritic,
                ReviewSource::Tmdb,
            ],
            min_votes: 0,
            max_badges: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwardsSettings {
    pub color_scheme: String,
    pub sources_enabled: Vec<String>,
}

impl Default for AwardsSettings {
    fn default() -> Self {
        Self {
            color_scheme: "black".to_string(),
            sources_enabled: vec![
                "oscars".to_string(),
                "emmys".to_string(),
                "golden-globes".to_string(),
                "bafta".to_string(),
                "cannes".to_string(),
                "crunchyroll".to_string(),
            ],
        }
    }
}

/// Per-badge-type style blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BadgeStyles {
    pub audio: BadgeStyle,
    pub resolution: BadgeStyle,
    pub review: BadgeStyle,
    pub awards: BadgeStyle,
}

impl Default for BadgeStyles {
    fn default() -> Self {
        Self {
            audio: BadgeStyle {
                position: Anchor::TopRight,
                ..BadgeStyle::default()
            },
            resolution: BadgeStyle {
                position: Anchor::TopLeft,
                ..BadgeStyle::default()
            },
            review: BadgeStyle {
                position: Anchor::BottomLeft,
                ..BadgeStyle::default()
            },
            awards: BadgeStyle {
                position: Anchor::FlushBottomRight,
                edge_padding: 0,
                ..BadgeStyle::default()
            },
        }
    }
}

/// All configuration the core recognises, loaded once at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub max_concurrent_jobs: usize,
    pub poster_download_retries: usize,
    pub poster_download_backoff_initial_ms: u64,
    pub inter_poster_throttle_ms: u64,
    pub max_retries_per_poster: i64,
    pub external_io_timeout_secs: u64,
    pub jellyfin: JellyfinSettings,
    pub providers: ProviderSettings,
    pub badges: BadgeStyles,
    pub review: ReviewSettings,
    pub awards: AwardsSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            poster_download_retries: 3,
            poster_download_backoff_initial_ms: 1000,
            inter_poster_throttle_ms: 100,
            max_retries_per_poster: 3,
            external_io_timeout_secs: 30,
            jellyfin: JellyfinSettings::default(),
            providers: ProviderSettings::default(),
            badges: BadgeStyles::default(),
            review: ReviewSettings::default(),
            awards: AwardsSettings::default(),
        }
    }
}

impl AppSettings {
    /// Read the settings file (`APHRODITE_CONFIG`, or `aphrodite.json` in the
    /// data root), then let environment variables win for connection secrets.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        let mut settings = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            tracing::info!("no config file at {}, using defaults", path.display());
            Self::default()
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    fn config_path() -> PathBuf {
        env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| utils::assets::data_root().join("aphrodite.json"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("JELLYFIN_URL") {
            self.jellyfin.url = url;
        }
        if let Ok(key) = env::var("JELLYFIN_API_KEY") {
            self.jellyfin.api_key = key;
        }
        if let Ok(user) = env::var("JELLYFIN_USER_ID") {
            self.jellyfin.user_id = user;
        }
        if let Ok(key) = env::var("TMDB_API_KEY") {
            self.providers.tmdb_api_key = key;
        }
        if let Ok(key) = env::var("OMDB_API_KEY") {
            self.providers.omdb_api_key = key;
        }
        if let Ok(key) = env::var("FANART_API_KEY") {
            self.providers.fanart_api_key = key;
        }
        if let Ok(Ok(cap)) = env::var("MAX_CONCURRENT_JOBS").map(|v| v.parse()) {
            self.max_concurrent_jobs = cap;
        }
    }

    pub fn badge_style(&self, badge_type: BadgeType) -> &BadgeStyle {
        match badge_type {
            BadgeType::Audio => &self.badges.audio,
            BadgeType::Resolution => &self.badges.resolution,
            BadgeType::Review => &self.badges.review,
            BadgeType::Awards => &self.badges.awards,
        }
    }
}
