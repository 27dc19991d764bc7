use serde::{Deserialize, Serialize};

use crate::services::jellyfin::{MediaItem, MediaStream};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionBadge {
    pub label: String,
    pub hdr: bool,
    pub dolby_vision: bool,
    pub image_key: String,
}

/// Bin the primary video stream's height into a tier and fold in HDR/DV
/// flags. Returns `None` when the item has no video stream.
pub fn extract(item: &MediaItem) -> Option<ResolutionBadge> {
    let stream = item
        .media_streams
        .iter()
        .filter(|s| s.is_video())
        .max_by_key(|s| s.height.unwrap_or(0))?;

    let tier = tier_for_height(stream.height.unwrap_or(0));
    let dolby_vision = detect_dolby_vision(stream);
    let hdr = detect_hdr(stream);

    let label = match (dolby_vision, hdr) {
        (true, _) => format!("{tier} DV"),
        (false, true) => format!("{tier} HDR"),
        (false, false) => tier.to_string(),
    };

    Some(ResolutionBadge {
        label,
        hdr,
        dolby_vision,
        image_key: image_key(tier, dolby_vision, hdr),
    })
}

fn tier_for_height(height: i64) -> &'static str {
    match height {
        h if h >= 2160 => "4K",
        h if h >= 1080 => "1080p",
        h if h >= 720 => "720p",
        h if h >= 576 => "576p",
        _ => "480p",
    }
}

fn detect_dolby_vision(stream: &MediaStream) -> bool {
    let range_type = stream.video_range_type.as_deref().unwrap_or("").to_uppercase();
    let title = stream.display_title.as_deref().unwrap_or("").to_uppercase();
    range_type.contains("DOVI")
        || range_type.contains("DV")
        || title.contains("DOLBY VISION")
}

fn detect_hdr(stream: &MediaStream) -> bool {
    let range = stream.video_range.as_deref().unwrap_or("").to_uppercase();
    let range_type = stream.video_range_type.as_deref().unwrap_or("").to_uppercase();
    range.contains("HDR") || range_type.contains("HDR") || range_type.contains("HLG")
}

fn image_key(tier: &str, dolby_vision: bool, hdr: bool) -> String {
    let base = tier.to_lowercase();
    let suffix = match (dolby_vision, hdr) {
        (true, true) => "dvhdr",
        (true, false) => "dv",
        (false, true) => "hdr",
        (false, false) => "",
    };
    format!("{base}{suffix}.png")
}
