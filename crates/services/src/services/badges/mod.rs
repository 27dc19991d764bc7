pub mod audio;
pub mod awards;
pub mod resolution;
pub mod review;

use serde::{Deserialize, Serialize};

pub use db::models::batch_job::BadgeType;

use crate::services::providers::ReviewScore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgePayload {
    Audio(audio::AudioBadge),
    Resolution(resolution::ResolutionBadge),
    Review(Vec<ReviewScore>),
    Awards(Vec<awards::AwardBadge>),
}

/// A badge ready for composition: the requested type plus its extracted
/// content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub badge_type: BadgeType,
    pub payload: BadgePayload,
}
