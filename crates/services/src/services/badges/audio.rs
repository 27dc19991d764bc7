use serde::{Deserialize, Serialize};

use crate::services::jellyfin::{MediaItem, MediaStream};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioBadge {
    pub display_codec: String,
    pub channels: i64,
    pub is_atmos: bool,
    pub is_dts_x: bool,
    pub is_lossless: bool,
    pub image_key: String,
}

/// Pick the primary audio stream by quality score and derive the badge
/// content. Ties keep the first stream in track order. Returns `None` when
/// the item carries no audio streams.
pub fn extract(item: &MediaItem) -> Option<AudioBadge> {
    let stream = item
        .media_streams
        .iter()
        .filter(|s| s.is_audio())
        .fold(None::<(&MediaStream, i64)>, |best, stream| {
            let score = quality_score(stream);
            match best {
                Some((_, best_score)) if score <= best_score => best,
                _ => Some((stream, score)),
            }
        })
        .map(|(stream, _)| stream)?;

    let codec = stream.codec.as_deref().unwrap_or("").to_uppercase();
    let profile = stream.profile.as_deref().unwrap_or("").to_string();
    let is_atmos = detect_atmos(stream);
    let is_dts_x = detect_dts_x(stream);
    let display_codec = display_codec(&codec, &profile, is_atmos, is_dts_x);

    Some(AudioBadge {
        image_key: image_key(&display_codec, &codec, is_atmos, is_dts_x),
        display_codec,
        channels: stream.channels.unwrap_or(2),
        is_atmos,
        is_dts_x,
        is_lossless: detect_lossless(stream),
    })
}

/// Quality score used to pick the primary stream: codec family first, then
/// object-audio bonuses, channel count, bitrate, and the default flag.
fn quality_score(stream: &MediaStream) -> i64 {
    let codec = stream.codec.as_deref().unwrap_or("").to_uppercase();
    let profile = stream.profile.as_deref().unwrap_or("").to_uppercase();
    let channels = stream.channels.unwrap_or(0);
    let bitrate = stream.bit_rate.unwrap_or(0);

    const CODEC_SCORES: &[(&str, i64)] = &[
        ("TRUEHD", 1000),
        ("MLP", 1000),
        ("DTSMA", 950),
        ("DTSHD", 900),
        ("PCM", 900),
        ("LPCM", 900),
        ("FLAC", 850),
        ("DTS", 800),
        ("EAC3", 600),
        ("AC3", 400),
        ("AAC", 300),
        ("MP3", 200),
    ];

    let base_codec: String = codec.chars().filter(|c| *c != '-' && *c != '_').collect();
    let mut score = CODEC_SCORES
        .iter()
        .find(|(key, _)| base_codec.contains(key))
        .map(|(_, s)| *s)
        .unwrap_or(100);

    if profile.contains("ATMOS") || codec.contains("ATMOS") {
        score += 500;
    } else if profile.contains("DTS-X") || profile.contains("DTS:X") || base_codec.contains("DTSX")
    {
        score += 450;
    }

    score += match channels {
        c if c >= 8 => 200,
        c if c >= 6 => 150,
        c if c >= 3 => 75,
        2 => 50,
        _ => 0,
    };

    let bitrate_kbps = if bitrate > 1000 { bitrate / 1000 } else { bitrate };
    score += match bitrate_kbps {
        b if b > 1000 => 100,
        b if b > 640 => 50,
        b if b > 320 => 25,
        _ => 0,
    };

    if stream.is_default {
        score += 25;
    }

    score
}

fn stream_haystack(stream: &MediaStream) -> String {
    [
        stream.profile.as_deref(),
        stream.title.as_deref(),
        stream.display_title.as_deref(),
        stream.codec.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
    .to_uppercase()
}

fn detect_atmos(stream: &MediaStream) -> bool {
    stream_haystack(stream).contains("ATMOS")
}

fn detect_dts_x(stream: &MediaStream) -> bool {
    let haystack = stream_haystack(stream);
    ["DTS-X", "DTS:X", "DTSX", "DTS X"]
        .iter()
        .any(|token| haystack.contains(token))
}

fn detect_lossless(stream: &MediaStream) -> bool {
    let codec = stream.codec.as_deref().unwrap_or("").to_uppercase();
    let profile = stream.profile.as_deref().unwrap_or("").to_uppercase();
    ["TRUEHD", "MLP", "FLAC", "PCM", "LPCM"]
        .iter()
        .any(|c| codec.contains(c))
        || (codec.contains("DTS") && profile.contains("MA"))
}

fn display_codec(codec: &str, profile: &str, is_atmos: bool, is_dts_x: bool) -> String {
    if is_atmos {
        return if codec.contains("TRUEHD") {
            "TrueHD Atmos".to_string()
        } else {
            "Dolby Atmos".to_string()
        };
    }
    if is_dts_x {
        return "DTS-X".to_string();
    }

    if codec.contains("DTS") {
        let profile = profile.to_uppercase();
        return if profile.contains("MA") {
            "DTS-HD MA".to_string()
        } else if profile.contains("HD") {
            "DTS-HD".to_string()
        } else {
            "DTS".to_string()
        };
    }

    match codec {
        "DCA" => "DTS".to_string(),
        "TRUEHD" => "TrueHD".to_string(),
        "AC3" => "Dolby Digital".to_string(),
        "EAC3" => "Dolby Digital Plus".to_string(),
        "AAC" => "AAC".to_string(),
        "MP3" => "MP3".to_string(),
        "FLAC" => "FLAC".to_string(),
        "PCM" => "PCM".to_string(),
        "LPCM" => "LPCM".to_string(),
        other => other.to_string(),
    }
}

fn image_key(display_codec: &str, raw_codec: &str, is_atmos: bool, is_dts_x: bool) -> String {
    if is_atmos {
        return "TrueHD-Atmos.png".to_string();
    }
    if is_dts_x {
        return "DTS-X.png".to_string();
    }

    let upper = display_codec.to_uppercase();
    if upper.contains("TRUEHD") {
        "TrueHD.png"
    } else if upper.contains("DTS") {
        "DTS-HD.png"
    } else if upper.contains("DOLBY DIGITAL PLUS") || raw_codec.contains("EAC3") {
        "DigitalPlus.png"
    } else if upper.contains("DOLBY DIGITAL") || raw_codec.contains("AC3") {
        "dolby-digital.png"
    } else if upper.contains("FLAC") {
        "flac.png"
    } else if upper.contains("PCM") {
        "pcm.png"
    } else {
        "aac.png"
    }
    .to_string()
}
