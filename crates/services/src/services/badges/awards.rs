use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::services::config::AwardsSettings;
use crate::services::jellyfin::MediaItem;

static AWARDS_JSON: &str = include_str!("../../../data/awards.json");

#[derive(Debug, Deserialize)]
struct AwardsDataset {
    by_tmdb_id: HashMap<String, Vec<String>>,
    by_imdb_id: HashMap<String, Vec<String>>,
}

static DATASET: Lazy<AwardsDataset> =
    Lazy::new(|| serde_json::from_str(AWARDS_JSON).expect("bundled awards dataset is valid JSON"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardBadge {
    pub source: String,
    pub image_key: String,
}

/// Look the item up in the bundled awards dataset by TMDB id, falling back
/// to IMDb id. Returns `None` when the item won nothing (or nothing from an
/// enabled source).
pub fn extract(item: &MediaItem, settings: &AwardsSettings) -> Option<Vec<AwardBadge>> {
    let won = item
        .provider_id("Tmdb")
        .and_then(|id| DATASET.by_tmdb_id.get(id))
        .or_else(|| {
            item.provider_id("Imdb")
                .and_then(|id| DATASET.by_imdb_id.get(id))
        })?;

    let badges: Vec<AwardBadge> = won
        .iter()
        .filter(|source| settings.sources_enabled.iter().any(|s| s == *source))
        .map(|source| AwardBadge {
            source: source.clone(),
            image_key: format!("{source}-{}.png", settings.color_scheme),
        })
        .collect();

    if badges.is_empty() { None } else { Some(badges) }
}
