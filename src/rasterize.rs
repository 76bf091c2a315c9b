//! Draws a composed overlay onto the photo's pixels and writes the PNG.

use crate::compose::{ComposedOverlay, Placement};
use crate::error::ExportError;
use crate::model::{Color4, WatermarkStyle};
use eframe::egui;
use image::{imageops::FilterType, DynamicImage, ImageFormat, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub const EXPORT_SCALE: f32 = 2.0;
/// Largest size a photo is shown at, in logical pixels. Export captures this
/// view, not the full-resolution original.
pub const VIEW_MAX: (f32, f32) = (960.0, 640.0);
pub const FILE_PREFIX: &str = "gps-watermarked-";

/// Overlay text is drawn at this fraction of the style's font size.
const TEXT_RATIO: f32 = 0.8;
const LINE_HEIGHT: f32 = 1.2;
const PAD_X: f32 = 12.0;
const PAD_Y: f32 = 8.0;
const ICON: f32 = 32.0;
const GAP: f32 = 12.0;
const LINE_GAP: f32 = 4.0;
const RADIUS: f32 = 8.0;
const ADDRESS_SHARE: f32 = 0.7;

pub trait Rasterizer: Send + Sync {
    fn rasterize(
        &self,
        image: &DynamicImage,
        overlay: &ComposedOverlay,
        style: &WatermarkStyle,
        scale: f32,
    ) -> Result<RgbaImage, ExportError>;
}

pub struct OverlayRasterizer {
    body: Font<'static>,
    mono: Font<'static>,
}

fn egui_font(name: &str) -> Result<Font<'static>, ExportError> {
    let defs = egui::FontDefinitions::default();
    let data = defs
        .font_data
        .get(name)
        .ok_or_else(|| ExportError::Font(format!("{name} is not a built-in font")))?;
    Font::try_from_vec(data.font.to_vec()).ok_or_else(|| ExportError::Font(name.to_string()))
}

impl OverlayRasterizer {
    /// Uses the fonts egui ships with.
    pub fn new() -> Result<Self, ExportError> {
        Ok(Self {
            body: egui_font("Ubuntu-Light")?,
            mono: egui_font("Hack")?,
        })
    }

    /// One TTF/OTF file for every line.
    pub fn from_font_file(path: &Path) -> Result<Self, ExportError> {
        let bytes = std::fs::read(path).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| ExportError::Font(path.display().to_string()))?;
        Ok(Self {
            body: font.clone(),
            mono: font,
        })
    }

    pub fn from_config(font_path: Option<&Path>) -> Result<Self, ExportError> {
        match font_path {
            Some(path) => Self::from_font_file(path),
            None => Self::new(),
        }
    }
}

impl Rasterizer for OverlayRasterizer {
    fn rasterize(
        &self,
        image: &DynamicImage,
        overlay: &ComposedOverlay,
        style: &WatermarkStyle,
        scale: f32,
    ) -> Result<RgbaImage, ExportError> {
        let (view_w, view_h) = view_size(image.width(), image.height());
        let width = (view_w * scale).round().max(1.0) as u32;
        let height = (view_h * scale).round().max(1.0) as u32;
        let mut out = if (width, height) == (image.width(), image.height()) {
            image.to_rgba8()
        } else {
            image::imageops::resize(&image.to_rgba8(), width, height, FilterType::Triangle)
        };
        if overlay.is_empty() {
            return Ok(out);
        }

        let px = style.font_size() as f32 * TEXT_RATIO * scale;
        let line_h = px * LINE_HEIGHT;
        let (pad_x, pad_y) = (PAD_X * scale, PAD_Y * scale);
        let (icon, gap) = (ICON * scale, GAP * scale);
        let placement = Placement::new(style.corner, scale);

        let mono_w = text_width(&self.mono, px, &overlay.coordinates)
            .max(text_width(&self.mono, px, &overlay.timestamp));
        let mono_h = line_h * 2.0 + LINE_GAP * scale;

        let max_box = (width as f32 - 2.0 * placement.inset).max(0.0);
        let address_max = (max_box - 2.0 * pad_x - icon - 2.0 * gap - mono_w)
            .max(px * 4.0)
            .min(max_box * ADDRESS_SHARE);
        let address_lines = wrap(&self.body, px, &overlay.address, address_max);
        let address_w = address_lines
            .iter()
            .map(|l| text_width(&self.body, px, l))
            .fold(0.0_f32, f32::max);
        let address_h = address_lines.len() as f32 * line_h;

        let box_w = pad_x * 2.0 + icon + gap + address_w + gap + mono_w;
        let box_h = pad_y * 2.0 + icon.max(address_h).max(mono_h);
        let (x0, y0) = placement.origin((width as f32, height as f32), (box_w, box_h));

        let opacity = style.opacity();
        let text = style.text.faded(opacity).to_rgba8();
        fill_rounded_rect(
            &mut out,
            (x0, y0, box_w, box_h),
            RADIUS * scale,
            style.background.faded(opacity).to_rgba8(),
        );

        // pin marker
        let cx = x0 + pad_x + icon / 2.0;
        let cy = y0 + box_h / 2.0;
        fill_circle(
            &mut out,
            (cx, cy),
            icon / 2.0,
            Color4::WHITE.faded(0.2 * opacity).to_rgba8(),
        );
        fill_circle(&mut out, (cx, cy - icon * 0.08), icon * 0.18, text);
        fill_circle(
            &mut out,
            (cx, cy - icon * 0.08),
            icon * 0.07,
            style.background.faded(opacity).to_rgba8(),
        );
        fill_circle(&mut out, (cx, cy + icon * 0.2), icon * 0.05, text);

        let address_x = x0 + pad_x + icon + gap;
        let mut y = y0 + (box_h - address_h) / 2.0;
        for line in &address_lines {
            draw_text(&mut out, &self.body, px, (address_x, y), text, line);
            y += line_h;
        }

        let mono_x = address_x + address_w + gap;
        let mono_y = y0 + (box_h - mono_h) / 2.0;
        draw_text(&mut out, &self.mono, px, (mono_x, mono_y), text, &overlay.coordinates);
        draw_text(
            &mut out,
            &self.mono,
            px,
            (mono_x, mono_y + line_h + LINE_GAP * scale),
            text,
            &overlay.timestamp,
        );
        Ok(out)
    }
}

/// Size of the photo's view: fitted inside [`VIEW_MAX`], never enlarged.
pub fn view_size(width: u32, height: u32) -> (f32, f32) {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let fit = (VIEW_MAX.0 / w).min(VIEW_MAX.1 / h).min(1.0);
    (w * fit, h * fit)
}

// ── Pixel helpers ───────────────────────────────────────────────────────────

fn blend(dst: &mut Rgba<u8>, color: [u8; 4], coverage: f32) {
    let a = color[3] as f32 / 255.0 * coverage.clamp(0.0, 1.0);
    if a <= 0.0 {
        return;
    }
    let inv = 1.0 - a;
    for i in 0..3 {
        dst.0[i] = (color[i] as f32 * a + dst.0[i] as f32 * inv).round() as u8;
    }
    let dst_a = dst.0[3] as f32 / 255.0;
    dst.0[3] = ((a + dst_a * inv) * 255.0).round() as u8;
}

/// Calls `f(x, y, px)` for every in-bounds pixel of the rectangle.
fn for_each_pixel(
    img: &mut RgbaImage,
    (x, y, w, h): (f32, f32, f32, f32),
    mut f: impl FnMut(f32, f32, &mut Rgba<u8>),
) {
    let x_min = x.floor().max(0.0) as u32;
    let y_min = y.floor().max(0.0) as u32;
    let x_max = ((x + w).ceil().max(0.0) as u32).min(img.width());
    let y_max = ((y + h).ceil().max(0.0) as u32).min(img.height());
    for py in y_min..y_max {
        for px in x_min..x_max {
            f(px as f32 + 0.5, py as f32 + 0.5, img.get_pixel_mut(px, py));
        }
    }
}

fn fill_rounded_rect(img: &mut RgbaImage, rect: (f32, f32, f32, f32), radius: f32, color: [u8; 4]) {
    let (x, y, w, h) = rect;
    let r = radius.min(w / 2.0).min(h / 2.0).max(0.0);
    for_each_pixel(img, rect, |px, py, dst| {
        let qx = (px - x).min(x + w - px);
        let qy = (py - y).min(y + h - py);
        let coverage = if qx < r && qy < r {
            let d = ((r - qx).powi(2) + (r - qy).powi(2)).sqrt();
            r + 0.5 - d
        } else {
            qx.min(qy) + 0.5
        };
        blend(dst, color, coverage);
    });
}

fn fill_circle(img: &mut RgbaImage, (cx, cy): (f32, f32), radius: f32, color: [u8; 4]) {
    let bounds = (cx - radius - 1.0, cy - radius - 1.0, radius * 2.0 + 2.0, radius * 2.0 + 2.0);
    for_each_pixel(img, bounds, |px, py, dst| {
        let d = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();
        blend(dst, color, radius + 0.5 - d);
    });
}

fn text_width(font: &Font<'static>, px: f32, text: &str) -> f32 {
    if text.is_empty() {
        return 0.0;
    }
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    font.layout(text, scale, point(0.0, v_metrics.ascent))
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// Greedy word wrap. A word wider than `max_width` keeps a line to itself.
fn wrap(font: &Font<'static>, px: f32, text: &str, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if current.is_empty() || text_width(font, px, &candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn draw_text(
    img: &mut RgbaImage,
    font: &Font<'static>,
    px: f32,
    (x, y): (f32, f32),
    color: [u8; 4],
    text: &str,
) {
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    let (w, h) = (img.width() as i32, img.height() as i32);
    for glyph in font.layout(text, scale, point(x, y + v_metrics.ascent)) {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, v| {
            let px = gx as i32 + bb.min.x;
            let py = gy as i32 + bb.min.y;
            if px < 0 || py < 0 || px >= w || py >= h {
                return;
            }
            blend(img.get_pixel_mut(px as u32, py as u32), color, v);
        });
    }
}

// ── Export ──────────────────────────────────────────────────────────────────

pub fn export_file_name(now_millis: i64) -> String {
    format!("{FILE_PREFIX}{now_millis}.png")
}

/// Rasterizes at [`EXPORT_SCALE`] and writes the PNG into `out_dir`.
///
/// The PNG is encoded in memory first, so a failure leaves no file behind.
pub fn export_png(
    rasterizer: &dyn Rasterizer,
    image: &DynamicImage,
    overlay: &ComposedOverlay,
    style: &WatermarkStyle,
    out_dir: &Path,
    now_millis: i64,
) -> Result<PathBuf, ExportError> {
    if overlay.is_empty() {
        return Err(ExportError::NoLocation);
    }
    let pixels = rasterizer.rasterize(image, overlay, style, EXPORT_SCALE)?;
    let mut encoded = Vec::new();
    pixels.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;

    let path = out_dir.join(export_file_name(now_millis));
    std::fs::write(&path, &encoded).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    tracing::info!(path = %path.display(), bytes = encoded.len(), "exported");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::compose;
    use crate::model::{Coordinate, Corner, LocationRecord, TimestampSetting};
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    fn overlay() -> ComposedOverlay {
        let ts = TimestampSetting::new(
            NaiveDate::from_ymd_opt(2023, 5, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            "+05:30",
        );
        let loc = LocationRecord::manual(Coordinate::new(12.82464, 80.046536), "Test Rd, City");
        compose(Some(&loc), &ts)
    }

    fn photo(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([40, 90, 160, 255])))
    }

    struct Failing;

    impl Rasterizer for Failing {
        fn rasterize(
            &self,
            _: &DynamicImage,
            _: &ComposedOverlay,
            _: &WatermarkStyle,
            _: f32,
        ) -> Result<RgbaImage, ExportError> {
            Err(ExportError::Font("broken".into()))
        }
    }

    #[test]
    fn output_is_scaled_and_overlay_drawn_in_its_corner() {
        let r = OverlayRasterizer::new().unwrap();
        let src = photo(400, 300);
        let mut style = WatermarkStyle::default();
        style.corner = Corner::BottomLeft;
        let out = r.rasterize(&src, &overlay(), &style, 2.0).unwrap();
        assert_eq!(out.dimensions(), (800, 600));

        // background box sits just inside the bottom-left inset
        let near = out.get_pixel(32 + 20, 600 - 32 - 4);
        assert_ne!(near, &Rgba([40, 90, 160, 255]));
        // opposite corner untouched
        assert_eq!(out.get_pixel(790, 5), &Rgba([40, 90, 160, 255]));
    }

    #[test]
    fn large_photos_are_captured_at_view_size() {
        let (w, h) = view_size(4000, 3000);
        assert_eq!(h, 640.0);
        assert!((w - 853.33).abs() < 0.01);
        assert_eq!(view_size(300, 200), (300.0, 200.0));
        let r = OverlayRasterizer::new().unwrap();
        let out = r
            .rasterize(&photo(1920, 1280), &overlay(), &WatermarkStyle::default(), 2.0)
            .unwrap();
        assert_eq!(out.dimensions(), (1920, 1280));
    }

    #[test]
    fn empty_overlay_leaves_pixels_alone() {
        let r = OverlayRasterizer::new().unwrap();
        let out = r
            .rasterize(&photo(10, 10), &ComposedOverlay::default(), &WatermarkStyle::default(), 1.0)
            .unwrap();
        assert!(out.pixels().all(|p| *p == Rgba([40, 90, 160, 255])));
    }

    #[test]
    fn wrap_splits_long_addresses() {
        let r = OverlayRasterizer::new().unwrap();
        let text = "Grand Southern Trunk Road, Potheri, SRM Nagar, Kattankulathur";
        let one = wrap(&r.body, 12.0, text, 10_000.0);
        assert_eq!(one, vec![text.to_string()]);
        let many = wrap(&r.body, 12.0, text, 80.0);
        assert!(many.len() > 1);
        assert_eq!(many.join(" "), text);
        assert!(wrap(&r.body, 12.0, "", 80.0).is_empty());
    }

    #[test]
    fn export_writes_timestamped_png() {
        let dir = tempfile::tempdir().unwrap();
        let r = OverlayRasterizer::new().unwrap();
        let path = export_png(
            &r,
            &photo(64, 48),
            &overlay(),
            &WatermarkStyle::default(),
            dir.path(),
            1_700_000_000_123,
        )
        .unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "gps-watermarked-1700000000123.png"
        );
        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (128, 96));
    }

    #[test]
    fn failed_export_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = export_png(
            &Failing,
            &photo(8, 8),
            &overlay(),
            &WatermarkStyle::default(),
            dir.path(),
            1,
        );
        assert_matches!(result, Err(ExportError::Font(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn export_without_location_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let r = OverlayRasterizer::new().unwrap();
        let result = export_png(
            &r,
            &photo(8, 8),
            &ComposedOverlay::default(),
            &WatermarkStyle::default(),
            dir.path(),
            1,
        );
        assert_matches!(result, Err(ExportError::NoLocation));
    }
}
