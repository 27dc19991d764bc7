use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::services::jellyfin::MediaItem;

const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";
const OMDB_API_BASE: &str = "https://www.omdbapi.com";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} API key not configured")]
    NotConfigured(&'static str),
    #[error("provider rate limit exceeded: {0}")]
    RateLimited(&'static str),
    #[error("provider API error: {0}")]
    Api(String),
    #[error("provider request error: {0}")]
    Request(String),
}

impl ProviderError {
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::Request(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Request(err.to_string())
    }
}

/// Review aggregation sources, in the order the UI names them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReviewSource {
    Imdb,
    RottenTomatoes,
    Metacritic,
    Tmdb,
}

impl ReviewSource {
    pub fn image_key(self) -> &'static str {
        match self {
            ReviewSource::Imdb => "imdb.png",
            ReviewSource::RottenTomatoes => "rt.png",
            ReviewSource::Metacritic => "metacritic.png",
            ReviewSource::Tmdb => "tmdb.png",
        }
    }
}

/// One aggregated score, normalised to 0-100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewScore {
    pub source: ReviewSource,
    pub score_percent: f64,
    pub votes: u64,
    pub image_key: String,
}

impl ReviewScore {
    fn new(source: ReviewSource, score_percent: f64, votes: u64) -> Self {
        Self {
            source,
            score_percent,
            votes,
            image_key: source.image_key().to_string(),
        }
    }

    pub fn display_text(&self) -> String {
        format!("{:.0}%", self.score_percent)
    }
}

/// Seam for the review extractor: one client can answer for several sources
/// (OMDB carries IMDb, Rotten Tomatoes and Metacritic in one response).
#[async_trait]
pub trait ReviewSourceClient: Send + Sync {
    fn sources(&self) -> &'static [ReviewSource];
    async fn scores(&self, item: &MediaItem) -> Result<Vec<ReviewScore>, ProviderError>;
}

fn retry_policy() -> ExponentialBuilder {
    // 429s get a long leash: the extractor waits rather than burning the key.
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(2))
        .with_max_delay(Duration::from_secs(30))
        .with_max_times(3)
        .with_jitter()
}

// ---------- TMDB ----------

#[derive(Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct TmdbMovie {
    vote_average: Option<f64>,
    vote_count: Option<u64>,
}

impl TmdbClient {
    pub fn new(api_key: &str) -> Result<Self, ProviderError> {
        if api_key.is_empty() {
            return Err(ProviderError::NotConfigured("TMDB"));
        }
        Ok(Self {
            client: Client::new(),
            api_key: api_key.to_string(),
        })
    }

    async fn fetch_movie(&self, tmdb_id: &str) -> Result<TmdbMovie, ProviderError> {
        let url = format!(
            "{TMDB_API_BASE}/movie/{tmdb_id}?api_key={}",
            self.api_key
        );
        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited("TMDB")),
            status if !status.is_success() => {
                Err(ProviderError::Api(format!("TMDB HTTP {status}")))
            }
            _ => response
                .json()
                .await
                .map_err(|e| ProviderError::Api(e.to_string())),
        }
    }
}

#[async_trait]
impl ReviewSourceClient for TmdbClient {
    fn sources(&self) -> &'static [ReviewSource] {
        &[ReviewSource::Tmdb]
    }

    async fn scores(&self, item: &MediaItem) -> Result<Vec<ReviewScore>, ProviderError> {
        let Some(tmdb_id) = item.provider_id("Tmdb").map(str::to_string) else {
            return Ok(Vec::new());
        };

        let movie = (|| async { self.fetch_movie(&tmdb_id).await })
            .retry(&retry_policy())
            .when(|e: &ProviderError| e.should_retry())
            .notify(|err: &ProviderError, dur: Duration| {
                tracing::warn!(
                    "TMDB lookup failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    err
                );
            })
            .await?;

        match movie.vote_average {
            Some(average) if average > 0.0 => Ok(vec![ReviewScore::new(
                ReviewSource::Tmdb,
                average * 10.0,
                movie.vote_count.unwrap_or(0),
            )]),
            _ => Ok(Vec::new()),
        }
    }
}

// ---------- OMDB ----------

#[derive(Clone)]
pub struct OmdbClient {
    client: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct OmdbResponse {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "imdbRating", default)]
    imdb_rating: Option<String>,
    #[serde(rename = "imdbVotes", default)]
    imdb_votes: Option<String>,
    #[serde(rename = "Ratings", default)]
    ratings: Vec<OmdbRating>,
    #[serde(rename = "Metascore", default)]
    metascore: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OmdbRating {
    #[serde(rename = "Source")]
    source: String,
    #[serde(rename = "Value")]
    value: String,
}

impl OmdbClient {
    pub fn new(api_key: &str) -> Result<Self, ProviderError> {
        if api_key.is_empty() {
            return Err(ProviderError::NotConfigured("OMDB"));
        }
        Ok(Self {
            client: Client::new(),
            api_key: api_key.to_string(),
        })
    }

    async fn fetch(&self, imdb_id: &str) -> Result<OmdbResponse, ProviderError> {
        let url = format!("{OMDB_API_BASE}/?apikey={}&i={imdb_id}", self.api_key);
        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited("OMDB")),
            status if !status.is_success() => {
                Err(ProviderError::Api(format!("OMDB HTTP {status}")))
            }
            _ => response
                .json()
                .await
                .map_err(|e| ProviderError::Api(e.to_string())),
        }
    }

    fn parse_scores(payload: &OmdbResponse) -> Vec<ReviewScore> {
        let mut scores = Vec::new();
        let votes = payload
            .imdb_votes
            .as_deref()
            .map(parse_vote_count)
            .unwrap_or(0);

        if let Some(rating) = payload
            .imdb_rating
            .as_deref()
            .and_then(|r| r.parse::<f64>().ok())
        {
            scores.push(ReviewScore::new(ReviewSource::Imdb, rating * 10.0, votes));
        }

        for rating in &payload.ratings {
            match rating.source.as_str() {
                "Rotten Tomatoes" => {
                    if let Some(percent) = rating
                        .value
                        .strip_suffix('%')
                        .and_then(|v| v.parse::<f64>().ok())
                    {
                        scores.push(ReviewScore::new(ReviewSource::RottenTomatoes, percent, votes));
                    }
                }
                "Metacritic" => {
                    if let Some(percent) = rating
                        .value
                        .split('/')
                        .next()
                        .and_then(|v| v.parse::<f64>().ok())
                    {
                        scores.push(ReviewScore::new(ReviewSource::Metacritic, percent, votes));
                    }
                }
                _ => {}
            }
        }

        // Metascore sometimes arrives only as a top-level field.
        if !scores.iter().any(|s| s.source == ReviewSource::Metacritic) {
            if let Some(score) = payload
                .metascore
                .as_deref()
                .filter(|m| *m != "N/A")
                .and_then(|m| m.parse::<f64>().ok())
            {
                scores.push(ReviewScore::new(ReviewSource::Metacritic, score, votes));
            }
        }

        scores
    }
}

fn parse_vote_count(raw: &str) -> u64 {
    raw.replace(',', "").parse().unwrap_or(0)
}

#[async_trait]
impl ReviewSourceClient for OmdbClient {
    fn sources(&self) -> &'static [ReviewSource] {
        &[
            ReviewSource::Imdb,
            ReviewSource::RottenTomatoes,
            ReviewSource::Metacritic,
        ]
    }

    async fn scores(&self, item: &MediaItem) -> Result<Vec<ReviewScore>, ProviderError> {
        let Some(imdb_id) = item.provider_id("Imdb").map(str::to_string) else {
            return Ok(Vec::new());
        };

        let payload = (|| async { self.fetch(&imdb_id).await })
            .retry(&retry_policy())
            .when(|e: &ProviderError| e.should_retry())
            .notify(|err: &ProviderError, dur: Duration| {
                tracing::warn!(
                    "OMDB lookup failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    err
                );
            })
            .await?;

        if payload.response != "True" {
            return Ok(Vec::new());
        }
        Ok(Self::parse_scores(&payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omdb_payload_yields_all_three_sources() {
        let payload = OmdbResponse {
            response: "True".into(),
            imdb_rating: Some("8.6".into()),
            imdb_votes: Some("1,234,567".into()),
            ratings: vec![
                OmdbRating {
                    source: "Rotten Tomatoes".into(),
                    value: "73%".into(),
                },
                OmdbRating {
                    source: "Metacritic".into(),
                    value: "74/100".into(),
                },
            ],
            metascore: Some("74".into()),
        };

        let scores = OmdbClient::parse_scores(&payload);
        assert_eq!(scores.len(), 3);
        assert_eq!(scores[0].source, ReviewSource::Imdb);
        assert!((scores[0].score_percent - 86.0).abs() < f64::EPSILON);
        assert_eq!(scores[0].votes, 1_234_567);
        assert_eq!(scores[1].source, ReviewSource::RottenTomatoes);
        assert!((scores[1].score_percent - 73.0).abs() < f64::EPSILON);
        assert_eq!(scores[2].source, ReviewSource::Metacritic);
    }

    #[test]
    fn metascore_fallback_is_used_once() {
        let payload = OmdbResponse {
            response: "True".into(),
            imdb_rating: None,
            imdb_votes: None,
            ratings: Vec::new(),
            metascore: Some("61".into()),
        };
        let scores = OmdbClient::parse_scores(&payload);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].source, ReviewSource::Metacritic);
        assert!((scores[0].score_percent - 61.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_keys_are_rejected() {
        assert!(TmdbClient::new("").is_err());
        assert!(OmdbClient::new("").is_err());
    }

    #[test]
    fn review_source_round_trips_as_string() {
        use std::str::FromStr;
        let source = ReviewSource::from_str("rotten_tomatoes").unwrap();
        assert_eq!(source, ReviewSource::RottenTomatoes);
        assert_eq!(source.to_string(), "rotten_tomatoes");
    }
}
