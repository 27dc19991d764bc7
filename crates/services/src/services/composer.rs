use std::collections::HashMap;
use std::path::PathBuf;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use image::{DynamicImage, Rgba, RgbaImage, imageops};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::badges::{Badge, BadgePayload};

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("font error: {0}")]
    Font(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Nine anchor regions plus four flush variants that abut the poster edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
    FlushTopLeft,
    FlushTopRight,
    FlushBottomLeft,
    FlushBottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VAlign {
    Top,
    Center,
    Bottom,
}

impl Anchor {
    fn is_flush(self) -> bool {
        matches!(
            self,
            Anchor::FlushTopLeft
                | Anchor::FlushTopRight
                | Anchor::FlushBottomLeft
                | Anchor::FlushBottomRight
        )
    }

    fn horizontal(self) -> HAlign {
        match self {
            Anchor::TopLeft
            | Anchor::CenterLeft
            | Anchor::BottomLeft
            | Anchor::FlushTopLeft
            | Anchor::FlushBottomLeft => HAlign::Left,
            Anchor::TopCenter | Anchor::Center | Anchor::BottomCenter => HAlign::Center,
            Anchor::TopRight
            | Anchor::CenterRight
            | Anchor::BottomRight
            | Anchor::FlushTopRight
            | Anchor::FlushBottomRight => HAlign::Right,
        }
    }

    fn vertical(self) -> VAlign {
        match self {
            Anchor::TopLeft
            | Anchor::TopCenter
            | Anchor::TopRight
            | Anchor::FlushTopLeft
            | Anchor::FlushTopRight => VAlign::Top,
            Anchor::CenterLeft | Anchor::Center | Anchor::CenterRight => VAlign::Center,
            Anchor::BottomLeft
            | Anchor::BottomCenter
            | Anchor::BottomRight
            | Anchor::FlushBottomLeft
            | Anchor::FlushBottomRight => VAlign::Bottom,
        }
    }

    /// Left/right anchors stack vertically, top/bottom (and center) anchors
    /// stack horizontally.
    fn stacks_vertically(self) -> bool {
        self.horizontal() != HAlign::Center
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowStyle {
    pub blur: u32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub opacity: u8,
}

impl Default for ShadowStyle {
    fn default() -> Self {
        Self {
            blur: 4,
            offset_x: 2,
            offset_y: 2,
            opacity: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BadgeStyle {
    pub position: Anchor,
    pub base_size: u32,
    pub dynamic_sizing: bool,
    pub edge_padding: u32,
    pub spacing: u32,
    pub background_color: String,
    /// 0-100
    pub background_opacity: u8,
    pub corner_radius: u32,
    pub shadow: Option<ShadowStyle>,
    pub text_color: String,
    pub font_path: Option<PathBuf>,
    pub fallback_font_path: Option<PathBuf>,
    pub font_size: f32,
    pub fallback_to_text: bool,
    pub asset_dir: PathBuf,
    pub image_mapping: HashMap<String, String>,
}

impl Default for BadgeStyle {
    fn default() -> Self {
        Self {
            position: Anchor::TopRight,
            base_size: 100,
            dynamic_sizing: true,
            edge_padding: 30,
            spacing: 15,
            background_color: "#000000".to_string(),
            background_opacity: 60,
            corner_radius: 10,
            shadow: None,
            text_color: "#FFFFFF".to_string(),
            font_path: None,
            fallback_font_path: None,
            font_size: 40.0,
            fallback_to_text: true,
            asset_dir: utils::assets::badge_asset_dir(),
            image_mapping: HashMap::new(),
        }
    }
}

/// One renderable unit of a badge: an asset lookup key plus the text used
/// when no asset matches.
#[derive(Debug, Clone)]
pub struct BadgeCell {
    pub image_key: Option<String>,
    pub text: Option<String>,
}

/// Flatten a badge payload into its cells. Multi-valued payloads (review,
/// awards) emit one cell per entry.
pub fn cells_for(badge: &Badge) -> Vec<BadgeCell> {
    match &badge.payload {
        BadgePayload::Audio(audio) => vec![BadgeCell {
            image_key: Some(audio.image_key.clone()),
            text: Some(audio.display_codec.clone()),
        }],
        BadgePayload::Resolution(resolution) => vec![BadgeCell {
            image_key: Some(resolution.image_key.clone()),
            text: Some(resolution.label.clone()),
        }],
        BadgePayload::Review(scores) => scores
            .iter()
            .map(|score| BadgeCell {
                image_key: Some(score.image_key.clone()),
                text: Some(score.display_text()),
            })
            .collect(),
        BadgePayload::Awards(awards) => awards
            .iter()
            .map(|award| BadgeCell {
                image_key: Some(award.image_key.clone()),
                text: Some(award.source.clone()),
            })
            .collect(),
    }
}

/// Composite badges onto a poster. Pure function of its inputs: the same
/// (source, badges, styles) always yields identical bytes.
pub fn compose(
    source: &DynamicImage,
    badges: &[(Badge, BadgeStyle)],
) -> Result<RgbaImage, ComposeError> {
    let mut canvas = source.to_rgba8();
    let poster_width = canvas.width();

    // Rendered cells grouped by anchor, input order preserved so stacking is
    // stable across runs.
    let mut groups: Vec<(Anchor, u32, u32, Vec<RgbaImage>)> = Vec::new();
    for (badge, style) in badges {
        let scale = if style.dynamic_sizing {
            poster_width as f32 / 1000.0
        } else {
            1.0
        };
        for cell in cells_for(badge) {
            let Some(rendered) = render_cell(&cell, style, scale)? else {
                continue;
            };
            match groups.iter_mut().find(|(anchor, ..)| *anchor == style.position) {
                Some((_, _, _, cells)) => cells.push(rendered),
                None => groups.push((
                    style.position,
                    style.edge_padding,
                    scaled(style.spacing, scale),
                    vec![rendered],
                )),
            }
        }
    }

    for (anchor, padding, spacing, cells) in &groups {
        place_stack(&mut canvas, *anchor, *padding, *spacing, cells);
    }

    Ok(canvas)
}

fn scaled(value: u32, scale: f32) -> u32 {
    (value as f32 * scale).round() as u32
}

/// Render one cell to an RGBA buffer: rounded background, optional shadow,
/// and either the mapped image asset or the fallback text.
fn render_cell(
    cell: &BadgeCell,
    style: &BadgeStyle,
    scale: f32,
) -> Result<Option<RgbaImage>, ComposeError> {
    let badge_size = scaled(style.base_size, scale).max(16);

    let content = match resolve_asset(cell, style)? {
        Some(asset) => Some(resize_to_height(&asset, badge_size)),
        None => match (&cell.text, style.fallback_to_text) {
            (Some(text), true) if !text.is_empty() => match load_font(style)? {
                Some(font) => {
                    let px = (style.font_size * scale).max(8.0);
                    let color = parse_color(&style.text_color, 255);
                    Some(raster_text(text, &font, px, color))
                }
                None => {
                    tracing::debug!("no badge font configured, skipping text cell");
                    None
                }
            },
            _ => None,
        },
    };
    let Some(content) = content else {
        return Ok(None);
    };

    let inner = (badge_size / 8).max(4);
    let bg_w = content.width() + 2 * inner;
    let bg_h = content.height() + 2 * inner;
    let radius = scaled(style.corner_radius, scale).min(bg_w.min(bg_h) / 2);
    let alpha = (style.background_opacity.min(100) as u32 * 255 / 100) as u8;
    let bg_color = parse_color(&style.background_color, alpha);

    let margin = style
        .shadow
        .map(|s| s.blur + s.offset_x.unsigned_abs().max(s.offset_y.unsigned_abs()))
        .unwrap_or(0);

    let mut img = RgbaImage::new(bg_w + 2 * margin, bg_h + 2 * margin);

    if let Some(shadow) = style.shadow {
        draw_shadow(&mut img, margin, bg_w, bg_h, radius, shadow);
    }
    fill_rounded_rect(&mut img, margin, margin, bg_w, bg_h, radius, bg_color);
    imageops::overlay(
        &mut img,
        &content,
        (margin + inner) as i64,
        (margin + inner) as i64,
    );

    Ok(Some(img))
}

fn resolve_asset(cell: &BadgeCell, style: &BadgeStyle) -> Result<Option<RgbaImage>, ComposeError> {
    let Some(key) = &cell.image_key else {
        return Ok(None);
    };
    let file = style.image_mapping.get(key).map(String::as_str).unwrap_or(key);
    let path = style.asset_dir.join(file);
    if !path.exists() {
        return Ok(None);
    }
    // A present-but-unreadable asset is a compose failure, not a fallback.
    Ok(Some(image::open(&path)?.to_rgba8()))
}

fn resize_to_height(img: &RgbaImage, height: u32) -> RgbaImage {
    if img.height() == 0 {
        return img.clone();
    }
    let width = ((img.width() as u64 * height as u64) / img.height() as u64).max(1) as u32;
    imageops::resize(img, width, height, imageops::FilterType::Lanczos3)
}

/// Load the configured font, trying the fallback path second. `Ok(None)`
/// when no font is configured at all; a configured-but-corrupt font is a
/// compose failure.
fn load_font(style: &BadgeStyle) -> Result<Option<FontArc>, ComposeError> {
    let configured: Vec<_> = [&style.font_path, &style.fallback_font_path]
        .into_iter()
        .flatten()
        .collect();
    if configured.is_empty() {
        return Ok(None);
    }
    let mut last_error = None;
    for path in configured {
        match std::fs::read(path) {
            Ok(bytes) => {
                return FontArc::try_from_vec(bytes)
                    .map(Some)
                    .map_err(|e| ComposeError::Font(format!("{}: {e}", path.display())));
            }
            Err(err) => {
                tracing::warn!("badge font {} unreadable: {err}", path.display());
                last_error = Some(err);
            }
        }
    }
    Err(ComposeError::Font(format!(
        "no configured badge font is readable: {}",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

fn parse_color(hex: &str, alpha: u8) -> Rgba<u8> {
    let hex = hex.trim_start_matches('#');
    let parse = |range| u8::from_str_radix(hex.get(range).unwrap_or("0"), 16).unwrap_or(0);
    if hex.len() >= 6 {
        Rgba([parse(0..2), parse(2..4), parse(4..6), alpha])
    } else {
        Rgba([0, 0, 0, alpha])
    }
}

fn raster_text(text: &str, font: &FontArc, px: f32, color: Rgba<u8>) -> RgbaImage {
    let scale = PxScale::from(px);
    let scaled_font = font.as_scaled(scale);
    let ascent = scaled_font.ascent();
    let height = scaled_font.height().ceil().max(1.0) as u32;

    let mut width = 0.0f32;
    let mut prev = None;
    for ch in text.chars() {
        let glyph = font.glyph_id(ch);
        if let Some(prev) = prev {
            width += scaled_font.kern(prev, glyph);
        }
        width += scaled_font.h_advance(glyph);
        prev = Some(glyph);
    }
    let mut img = RgbaImage::new(width.ceil().max(1.0) as u32, height);

    let mut caret = 0.0f32;
    let mut prev = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = prev {
            caret += scaled_font.kern(prev, id);
        }
        let glyph = id.with_scale_and_position(scale, point(caret, ascent));
        caret += scaled_font.h_advance(id);
        prev = Some(id);

        if let Some(outline) = font.outline_glyph(glyph) {
            let bounds = outline.px_bounds();
            outline.draw(|x, y, coverage| {
                let px_x = bounds.min.x as i64 + x as i64;
                let px_y = bounds.min.y as i64 + y as i64;
                if px_x >= 0
                    && px_y >= 0
                    && (px_x as u32) < img.width()
                    && (px_y as u32) < img.height()
                {
                    blend_pixel(&mut img, px_x as u32, px_y as u32, color, coverage);
                }
            });
        }
    }
    img
}

/// Coverage of a pixel centre against a rounded rectangle, with a one-pixel
/// soft edge.
fn rounded_rect_coverage(px: f32, py: f32, w: f32, h: f32, radius: f32) -> f32 {
    let r = radius.min(w / 2.0).min(h / 2.0);
    // distance from the rectangle's "core" (the rect inset by r)
    let dx = (r - px).max(px - (w - r)).max(0.0);
    let dy = (r - py).max(py - (h - r)).max(0.0);
    let dist = (dx * dx + dy * dy).sqrt();
    (r - dist + 0.5).clamp(0.0, 1.0)
}

fn blend_pixel(img: &mut RgbaImage, x: u32, y: u32, color: Rgba<u8>, coverage: f32) {
    if coverage <= 0.0 {
        return;
    }
    let src_a = (color.0[3] as f32 / 255.0) * coverage.min(1.0);
    let dst = img.get_pixel_mut(x, y);
    let dst_a = dst.0[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return;
    }
    for i in 0..3 {
        let src_c = color.0[i] as f32;
        let dst_c = dst.0[i] as f32;
        dst.0[i] = ((src_c * src_a + dst_c * dst_a * (1.0 - src_a)) / out_a).round() as u8;
    }
    dst.0[3] = (out_a * 255.0).round() as u8;
}

fn fill_rounded_rect(
    img: &mut RgbaImage,
    x0: u32,
    y0: u32,
    w: u32,
    h: u32,
    radius: u32,
    color: Rgba<u8>,
) {
    for dy in 0..h {
        for dx in 0..w {
            let coverage = rounded_rect_coverage(
                dx as f32 + 0.5,
                dy as f32 + 0.5,
                w as f32,
                h as f32,
                radius as f32,
            );
            let x = x0 + dx;
            let y = y0 + dy;
            if x < img.width() && y < img.height() {
                blend_pixel(img, x, y, color, coverage);
            }
        }
    }
}

fn draw_shadow(img: &mut RgbaImage, margin: u32, w: u32, h: u32, radius: u32, shadow: ShadowStyle) {
    let (iw, ih) = img.dimensions();
    let mut mask = vec![0.0f32; (iw * ih) as usize];
    let x0 = margin as i64 + shadow.offset_x as i64;
    let y0 = margin as i64 + shadow.offset_y as i64;
    for dy in 0..h {
        for dx in 0..w {
            let x = x0 + dx as i64;
            let y = y0 + dy as i64;
            if x >= 0 && y >= 0 && (x as u32) < iw && (y as u32) < ih {
                mask[(y as u32 * iw + x as u32) as usize] = rounded_rect_coverage(
                    dx as f32 + 0.5,
                    dy as f32 + 0.5,
                    w as f32,
                    h as f32,
                    radius as f32,
                );
            }
        }
    }
    if shadow.blur > 0 {
        box_blur(&mut mask, iw, ih, shadow.blur);
    }
    let opacity = shadow.opacity.min(100) as f32 / 100.0;
    for y in 0..ih {
        for x in 0..iw {
            let coverage = mask[(y * iw + x) as usize] * opacity;
            blend_pixel(img, x, y, Rgba([0, 0, 0, 255]), coverage);
        }
    }
}

/// Separable box blur over an alpha mask.
fn box_blur(mask: &mut [f32], w: u32, h: u32, radius: u32) {
    let r = radius as i64;
    let norm = (2 * r + 1) as f32;
    let mut tmp = vec![0.0f32; mask.len()];

    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let mut sum = 0.0;
            for k in -r..=r {
                let sx = (x + k).clamp(0, w as i64 - 1);
                sum += mask[(y * w as i64 + sx) as usize];
            }
            tmp[(y * w as i64 + x) as usize] = sum / norm;
        }
    }
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let mut sum = 0.0;
            for k in -r..=r {
                let sy = (y + k).clamp(0, h as i64 - 1);
                sum += tmp[(sy * w as i64 + x) as usize];
            }
            mask[(y * w as i64 + x) as usize] = sum / norm;
        }
    }
}

fn place_stack(canvas: &mut RgbaImage, anchor: Anchor, padding: u32, spacing: u32, cells: &[RgbaImage]) {
    if cells.is_empty() {
        return;
    }
    let (cw, ch) = canvas.dimensions();
    let vertical = anchor.stacks_vertically();
    let pad = if anchor.is_flush() { 0 } else { padding };

    let total_w = if vertical {
        cells.iter().map(|c| c.width()).max().unwrap_or(0)
    } else {
        cells.iter().map(|c| c.width()).sum::<u32>() + spacing * (cells.len() as u32 - 1)
    };
    let total_h = if vertical {
        cells.iter().map(|c| c.height()).sum::<u32>() + spacing * (cells.len() as u32 - 1)
    } else {
        cells.iter().map(|c| c.height()).max().unwrap_or(0)
    };

    let x0 = match anchor.horizontal() {
        HAlign::Left => pad,
        HAlign::Center => cw.saturating_sub(total_w) / 2,
        HAlign::Right => cw.saturating_sub(total_w + pad),
    };
    let y0 = match anchor.vertical() {
        VAlign::Top => pad,
        VAlign::Center => ch.saturating_sub(total_h) / 2,
        VAlign::Bottom => ch.saturating_sub(total_h + pad),
    };

    let mut cursor = 0u32;
    for cell in cells {
        let (x, y) = if vertical {
            let x = match anchor.horizontal() {
                HAlign::Left => x0,
                HAlign::Center => x0 + total_w.saturating_sub(cell.width()) / 2,
                HAlign::Right => x0 + total_w.saturating_sub(cell.width()),
            };
            (x, y0 + cursor)
        } else {
            let y = match anchor.vertical() {
                VAlign::Top => y0,
                VAlign::Center => y0 + total_h.saturating_sub(cell.height()) / 2,
                VAlign::Bottom => y0 + total_h.saturating_sub(cell.height()),
            };
            (x0 + cursor, y)
        };
        imageops::overlay(canvas, cell, x as i64, y as i64);
        cursor += if vertical { cell.height() } else { cell.width() } + spacing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::badges::audio::AudioBadge;
    use db::models::batch_job::BadgeType;

    fn solid_poster(w: u32, h: u32) -> DynamicImage {
        let img = RgbaImage::from_pixel(w, h, Rgba([20, 30, 40, 255]));
        DynamicImage::ImageRgba8(img)
    }

    fn audio_badge(image_key: &str) -> Badge {
        Badge {
            badge_type: BadgeType::Audio,
            payload: BadgePayload::Audio(AudioBadge {
                display_codec: "TrueHD Atmos".into(),
                channels: 8,
                is_atmos: true,
                is_dts_x: false,
                is_lossless: true,
                image_key: image_key.into(),
            }),
        }
    }

    fn asset_style(dir: &std::path::Path) -> BadgeStyle {
        BadgeStyle {
            asset_dir: dir.to_path_buf(),
            dynamic_sizing: false,
            fallback_to_text: false,
            ..BadgeStyle::default()
        }
    }

    fn write_asset(dir: &std::path::Path, name: &str) {
        let asset = RgbaImage::from_pixel(60, 30, Rgba([200, 40, 40, 255]));
        asset.save(dir.join(name)).unwrap();
    }

    #[test]
    fn composition_is_byte_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write_asset(dir.path(), "TrueHD-Atmos.png");
        let poster = solid_poster(400, 600);
        let badges = vec![(audio_badge("TrueHD-Atmos.png"), asset_style(dir.path()))];

        let first = compose(&poster, &badges).unwrap();
        let second = compose(&poster, &badges).unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn badge_lands_in_anchor_region() {
        let dir = tempfile::tempdir().unwrap();
        write_asset(dir.path(), "TrueHD-Atmos.png");
        let poster = solid_poster(400, 600);
        let mut style = asset_style(dir.path());
        style.position = Anchor::TopRight;
        style.edge_padding = 10;

        let out = compose(&poster, &[(audio_badge("TrueHD-Atmos.png"), style)]).unwrap();
        // top-right quadrant changed, bottom-left untouched
        let untouched = out.get_pixel(10, 590);
        assert_eq!(untouched, &Rgba([20, 30, 40, 255]));
        let mut changed = false;
        for x in 200..400 {
            for y in 0..200 {
                if out.get_pixel(x, y) != &Rgba([20, 30, 40, 255]) {
                    changed = true;
                }
            }
        }
        assert!(changed, "expected badge pixels in the top-right quadrant");
    }

    #[test]
    fn flush_anchor_abuts_the_edge() {
        let dir = tempfile::tempdir().unwrap();
        write_asset(dir.path(), "oscars-black.png");
        let poster = solid_poster(300, 450);
        let mut style = asset_style(dir.path());
        style.position = Anchor::FlushBottomRight;
        style.edge_padding = 40; // ignored for flush anchors
        style.corner_radius = 0; // keep the exact corner pixel covered

        let badge = Badge {
            badge_type: BadgeType::Awards,
            payload: BadgePayload::Awards(vec![crate::services::badges::awards::AwardBadge {
                source: "oscars".into(),
                image_key: "oscars-black.png".into(),
            }]),
        };
        let out = compose(&poster, &[(badge, style)]).unwrap();
        // the exact corner pixel is covered
        assert_ne!(out.get_pixel(299, 449), &Rgba([20, 30, 40, 255]));
    }

    #[test]
    fn dynamic_sizing_scales_with_poster_width() {
        let dir = tempfile::tempdir().unwrap();
        write_asset(dir.path(), "TrueHD-Atmos.png");
        let mut style = asset_style(dir.path());
        style.dynamic_sizing = true;
        style.base_size = 100;

        // A 2000px poster doubles the badge footprint relative to a 1000px one.
        let wide = compose(&solid_poster(2000, 1000), &[(audio_badge("TrueHD-Atmos.png"), style.clone())]).unwrap();
        let narrow = compose(&solid_poster(1000, 1000), &[(audio_badge("TrueHD-Atmos.png"), style)]).unwrap();

        let count_changed = |img: &RgbaImage, base: Rgba<u8>| {
            img.pixels().filter(|p| **p != base).count()
        };
        let base = Rgba([20, 30, 40, 255]);
        let wide_px = count_changed(&wide, base);
        let narrow_px = count_changed(&narrow, base);
        assert!(wide_px > narrow_px * 3, "expected ~4x footprint, got {wide_px} vs {narrow_px}");
    }

    #[test]
    fn missing_asset_without_text_fallback_skips_cell() {
        let dir = tempfile::tempdir().unwrap();
        let poster = solid_poster(200, 300);
        let style = asset_style(dir.path()); // fallback_to_text = false, no asset on disk

        let out = compose(&poster, &[(audio_badge("TrueHD-Atmos.png"), style)]).unwrap();
        assert_eq!(out.as_raw(), poster.to_rgba8().as_raw());
    }

    #[test]
    fn same_anchor_badges_stack() {
        let dir = tempfile::tempdir().unwrap();
        write_asset(dir.path(), "imdb.png");
        write_asset(dir.path(), "rt.png");
        let poster = solid_poster(400, 600);
        let mut style = asset_style(dir.path());
        style.position = Anchor::BottomLeft;

        let badge = Badge {
            badge_type: BadgeType::Review,
            payload: BadgePayload::Review(vec![
                crate::services::providers::ReviewScore {
                    source: crate::services::providers::ReviewSource::Imdb,
                    score_percent: 86.0,
                    votes: 1000,
                    image_key: "imdb.png".into(),
                },
                crate::services::providers::ReviewScore {
                    source: crate::services::providers::ReviewSource::RottenTomatoes,
                    score_percent: 73.0,
                    votes: 1000,
                    image_key: "rt.png".into(),
                },
            ]),
        };
        let single = Badge {
            badge_type: BadgeType::Review,
            payload: match &badge.payload {
                BadgePayload::Review(scores) => BadgePayload::Review(scores[..1].to_vec()),
                _ => unreachable!(),
            },
        };

        let base = Rgba([20, 30, 40, 255]);
        let two = compose(&poster, &[(badge, style.clone())]).unwrap();
        let one = compose(&poster, &[(single, style)]).unwrap();
        let count = |img: &RgbaImage| img.pixels().filter(|p| **p != base).count();
        assert!(count(&two) > count(&one), "stacked badges should cover more area");
    }
}
