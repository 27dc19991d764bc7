use std::sync::Arc;

use crate::services::config::ReviewSettings;
use crate::services::jellyfin::MediaItem;
use crate::services::providers::{ReviewScore, ReviewSourceClient};

/// Aggregate review scores from the configured providers.
///
/// Provider failures are non-fatal: a source that errors is skipped and the
/// poster proceeds with whatever the remaining sources produced. Sources are
/// emitted in configured priority order, filtered by the minimum-votes
/// threshold and capped at `max_badges`.
pub async fn extract(
    item: &MediaItem,
    clients: &[Arc<dyn ReviewSourceClient>],
    settings: &ReviewSettings,
) -> Vec<ReviewScore> {
    let mut collected: Vec<ReviewScore> = Vec::new();
    for client in clients {
        if !client
            .sources()
            .iter()
            .any(|s| settings.sources_enabled.contains(s))
        {
            continue;
        }
        match client.scores(item).await {
            Ok(scores) => collected.extend(scores),
            Err(err) => {
                tracing::warn!(item = %item.id, "review source failed, skipping: {err}");
            }
        }
    }

    let mut ordered = Vec::new();
    for source in &settings.source_priority {
        if !settings.sources_enabled.contains(source) {
            continue;
        }
        if let Some(score) = collected.iter().find(|s| s.source == *source) {
            if score.votes >= settings.min_votes {
                ordered.push(score.clone());
            }
        }
        if ordered.len() >= settings.max_badges {
            break;
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::{ProviderError, ReviewSource};
    use async_trait::async_trait;

    struct StubClient {
        scores: Vec<ReviewScore>,
        fail: bool,
    }

    #[async_trait]
    impl ReviewSourceClient for StubClient {
        fn sources(&self) -> &'static [ReviewSource] {
            &[
                ReviewSource::Imdb,
                ReviewSource::RottenTomatoes,
                ReviewSource::Metacritic,
                ReviewSource::Tmdb,
            ]
        }

        async fn scores(&self, _item: &MediaItem) -> Result<Vec<ReviewScore>, ProviderError> {
            if self.fail {
                return Err(ProviderError::Api("stubbed outage".into()));
            }
            Ok(self.scores.clone())
        }
    }

    fn score(source: ReviewSource, percent: f64, votes: u64) -> ReviewScore {
        ReviewScore {
            image_key: source.image_key().to_string(),
            source,
            score_percent: percent,
            votes,
        }
    }

    fn settings() -> ReviewSettings {
        ReviewSettings::default()
    }

    #[tokio::test]
    async fn scores_come_back_in_priority_order() {
        let client: Arc<dyn ReviewSourceClient> = Arc::new(StubClient {
            scores: vec![
                score(ReviewSource::Tmdb, 81.0, 5000),
                score(ReviewSource::Imdb, 86.0, 100_000),
            ],
            fail: false,
        });
        let item = MediaItem::default();
        let result = extract(&item, &[client], &settings()).await;
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].source, ReviewSource::Imdb);
        assert_eq!(result[1].source, ReviewSource::Tmdb);
    }

    #[tokio::test]
    async fn min_votes_filters_thin_sources() {
        let client: Arc<dyn ReviewSourceClient> = Arc::new(StubClient {
            scores: vec![
                score(ReviewSource::Imdb, 86.0, 12),
                score(ReviewSource::Tmdb, 81.0, 5000),
            ],
            fail: false,
        });
        let mut settings = settings();
        settings.min_votes = 100;
        let result = extract(&MediaItem::default(), &[client], &settings).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].source, ReviewSource::Tmdb);
    }

    #[tokio::test]
    async fn max_badges_caps_output() {
        let client: Arc<dyn ReviewSourceClient> = Arc::new(StubClient {
            scores: vec![
                score(ReviewSource::Imdb, 86.0, 1000),
                score(ReviewSource::RottenTomatoes, 73.0, 1000),
                score(ReviewSource::Metacritic, 74.0, 1000),
                score(ReviewSource::Tmdb, 81.0, 1000),
            ],
            fail: false,
        });
        let mut settings = settings();
        settings.max_badges = 2;
        let result = extract(&MediaItem::default(), &[client], &settings).await;
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn disabled_sources_are_skipped() {
        let client: Arc<dyn ReviewSourceClient> = Arc::new(StubClient {
            scores: vec![
                score(ReviewSource::Imdb, 86.0, 1000),
                score(ReviewSource::Tmdb, 81.0, 1000),
            ],
            fail: false,
        });
        let mut settings = settings();
        settings.sources_enabled = vec![ReviewSource::Tmdb];
        let result = extract(&MediaItem::default(), &[client], &settings).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].source, ReviewSource::Tmdb);
    }

    #[tokio::test]
    async fn failing_provider_is_non_fatal() {
        let failing: Arc<dyn ReviewSourceClient> = Arc::new(StubClient {
            scores: Vec::new(),
            fail: true,
        });
        let working: Arc<dyn ReviewSourceClient> = Arc::new(StubClient {
            scores: vec![score(ReviewSource::Imdb, 86.0, 1000)],
            fail: false,
        });
        let result = extract(&MediaItem::default(), &[failing, working], &settings()).await;
        assert_eq!(result.len(), 1);
    }
}
