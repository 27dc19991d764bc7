use std::collections::HashMap;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::config::JellyfinSettings;

#[derive(Debug, Error)]
pub enum JellyfinError {
    #[error("Jellyfin connection not configured")]
    NotConfigured,
    #[error("Jellyfin item not found: {0}")]
    NotFound(String),
    #[error("Jellyfin authentication failed")]
    Unauthorized,
    #[error("Jellyfin rejected the request: {0}")]
    BadRequest(String),
    #[error("Jellyfin rate limit exceeded")]
    RateLimited,
    #[error("Jellyfin transport error: {0}")]
    Transport(String),
}

impl JellyfinError {
    pub fn should_retry(&self) -> bool {
        matches!(self, JellyfinError::Transport(_) | JellyfinError::RateLimited)
    }
}

impl From<reqwest::Error> for JellyfinError {
    fn from(err: reqwest::Error) -> Self {
        JellyfinError::Transport(err.to_string())
    }
}

/// A stream (audio/video/subtitle) on a Jellyfin media item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MediaStream {
    #[serde(rename = "Type")]
    pub stream_type: String,
    pub codec: Option<String>,
    pub profile: Option<String>,
    pub title: Option<String>,
    pub display_title: Option<String>,
    pub channels: Option<i64>,
    pub channel_layout: Option<String>,
    pub bit_rate: Option<i64>,
    pub sample_rate: Option<i64>,
    pub is_default: bool,
    pub height: Option<i64>,
    pub width: Option<i64>,
    pub video_range: Option<String>,
    pub video_range_type: Option<String>,
}

impl MediaStream {
    pub fn is_audio(&self) -> bool {
        self.stream_type.eq_ignore_ascii_case("audio")
    }

    pub fn is_video(&self) -> bool {
        self.stream_type.eq_ignore_ascii_case("video")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MediaItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "Type")]
    pub item_type: String,
    pub media_streams: Vec<MediaStream>,
    pub provider_ids: HashMap<String, String>,
    pub community_rating: Option<f64>,
    pub production_year: Option<i32>,
    pub tags: Vec<String>,
}

impl MediaItem {
    /// Provider ids arrive with inconsistent casing across Jellyfin versions.
    pub fn provider_id(&self, provider: &str) -> Option<&str> {
        self.provider_ids
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(provider))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Library {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub collection_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResponse<T> {
    items: Vec<T>,
}

/// Seam between the poster pipeline and the media server, so workers can be
/// exercised against a stub in tests.
#[async_trait]
pub trait MediaServer: Send + Sync {
    async fn get_media(&self, id: &str) -> Result<MediaItem, JellyfinError>;
    async fn download_primary(&self, id: &str) -> Result<Vec<u8>, JellyfinError>;
    async fn upload_primary(&self, id: &str, image: Vec<u8>) -> Result<(), JellyfinError>;
    async fn add_tag(&self, id: &str, tag: &str) -> Result<(), JellyfinError>;
}

/// Typed wrapper over the Jellyfin REST API. Stateless apart from the bearer
/// token, safe to share across workers.
#[derive(Clone)]
pub struct JellyfinClient {
    client: Client,
    base_url: String,
    api_key: String,
    user_id: String,
}

impl JellyfinClient {
    pub fn new(settings: &JellyfinSettings) -> Result<Self, JellyfinError> {
        if settings.url.is_empty() || settings.api_key.is_empty() {
            return Err(JellyfinError::NotConfigured);
        }
        Ok(Self {
            client: Client::new(),
            base_url: settings.url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            user_id: settings.user_id.clone(),
        })
    }

    fn check_status(&self, status: StatusCode, context: &str) -> Result<(), JellyfinError> {
        if status.is_success() {
            return Ok(());
        }
        match status {
            StatusCode::NOT_FOUND => Err(JellyfinError::NotFound(context.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(JellyfinError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(JellyfinError::RateLimited),
            status if status.is_client_error() => {
                Err(JellyfinError::BadRequest(format!("{context}: HTTP {status}")))
            }
            status => Err(JellyfinError::Transport(format!("{context}: HTTP {status}"))),
        }
    }

    pub async fn list_libraries(&self) -> Result<Vec<Library>, JellyfinError> {
        let url = format!("{}/Users/{}/Views", self.base_url, self.user_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        self.check_status(response.status(), "list libraries")?;
        let views: ItemsResponse<Library> = response
            .json()
            .await
            .map_err(|e| JellyfinError::Transport(e.to_string()))?;
        Ok(views.items)
    }
}

#[async_trait]
impl MediaServer for JellyfinClient {
    async fn get_media(&self, id: &str) -> Result<MediaItem, JellyfinError> {
        let url = format!("{}/Users/{}/Items/{}", self.base_url, self.user_id, id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        self.check_status(response.status(), id)?;
        response
            .json()
            .await
            .map_err(|e| JellyfinError::Transport(e.to_string()))
    }

    async fn download_primary(&self, id: &str) -> Result<Vec<u8>, JellyfinError> {
        let url = format!("{}/Items/{}/Images/Primary", self.base_url, id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        self.check_status(response.status(), id)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| JellyfinError::Transport(e.to_string()))?;
        if bytes.is_empty() {
            return Err(JellyfinError::Transport(format!("empty poster body for {id}")));
        }
        Ok(bytes.to_vec())
    }

    async fn upload_primary(&self, id: &str, image: Vec<u8>) -> Result<(), JellyfinError> {
        // Jellyfin expects the image body base64-encoded.
        let url = format!("{}/Items/{}/Images/Primary", self.base_url, id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "image/jpeg")
            .body(BASE64.encode(&image))
            .send()
            .await?;
        self.check_status(response.status(), id)
    }

    async fn add_tag(&self, id: &str, tag: &str) -> Result<(), JellyfinError> {
        // Tag mutation goes through a full item update; fetch the raw item so
        // unrelated fields round-trip untouched.
        let url = format!("{}/Users/{}/Items/{}", self.base_url, self.user_id, id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        self.check_status(response.status(), id)?;
        let mut item: serde_json::Value = response
            .json()
            .await
            .map_err(|e| JellyfinError::Transport(e.to_string()))?;

        let tags = item
            .as_object_mut()
            .ok_or_else(|| JellyfinError::Transport(format!("malformed item body for {id}")))?
            .entry("Tags")
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if let Some(list) = tags.as_array_mut() {
            if list.iter().any(|t| t.as_str() == Some(tag)) {
                return Ok(());
            }
            list.push(serde_json::Value::String(tag.to_string()));
        }

        let update_url = format!("{}/Items/{}", self.base_url, id);
        let response = self
            .client
            .post(&update_url)
            .bearer_auth(&self.api_key)
            .json(&item)
            .send()
            .await?;
        self.check_status(response.status(), id)
    }
}
