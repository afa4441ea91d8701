//! Rasterizer – paints a laid-out label onto an off-screen RGB surface and
//! encodes it as JPEG.
//!
//! Every embedded image is decoded before the first pixel is painted, so a
//! label is either complete or not produced at all. The surface is an RAII
//! value: it is released when [`rasterize`] returns, on success and on error.

use std::cell::Cell;
use std::collections::HashMap;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, Rgb, RgbImage, RgbaImage};

use crate::assets::parse_data_uri;
use crate::error::{LabelError, Result};
use crate::fonts::{FontManager, GlyphCache, GLYPH_COLS, GLYPH_ROWS};
use crate::layout_config::{LayoutBox, TextContent};
use crate::templates::RenderedLabel;

/// Default JPEG quality for label rasters.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Largest surface we are willing to allocate (pixels).
const MAX_SURFACE_PIXELS: u64 = 64_000_000;

thread_local! {
    static LIVE_SURFACES: Cell<usize> = const { Cell::new(0) };
}

/// Number of off-screen surfaces currently alive on this thread.
pub fn live_surfaces() -> usize {
    LIVE_SURFACES.with(|c| c.get())
}

/// A rasterized label.
#[derive(Debug, Clone)]
pub struct RasterLabel {
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// JPEG bytes.
    pub encoded: Vec<u8>,
}

/// Off-screen drawing surface, white on creation.
struct Surface {
    pixels: RgbImage,
}

impl Surface {
    fn new(width: u32, height: u32) -> Self {
        LIVE_SURFACES.with(|c| c.set(c.get() + 1));
        Self {
            pixels: RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
        }
    }

    fn blend(&mut self, x: i64, y: i64, color: [f32; 4]) {
        if x < 0 || y < 0 || x >= self.pixels.width() as i64 || y >= self.pixels.height() as i64 {
            return;
        }
        let a = color[3].clamp(0.0, 1.0);
        if a <= 0.0 {
            return;
        }
        let px = self.pixels.get_pixel_mut(x as u32, y as u32);
        for (i, channel) in px.0.iter_mut().enumerate() {
            let src = color[i].clamp(0.0, 1.0) * 255.0;
            *channel = (src * a + *channel as f32 * (1.0 - a)).round() as u8;
        }
    }

    fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: [f32; 4]) {
        for y in y0.max(0)..y1.min(self.pixels.height() as i64) {
            for x in x0.max(0)..x1.min(self.pixels.width() as i64) {
                self.blend(x, y, color);
            }
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        LIVE_SURFACES.with(|c| c.set(c.get().saturating_sub(1)));
    }
}

/// Rasterize `label` at `scale` × its natural size and encode it as JPEG.
pub fn rasterize(label: &RenderedLabel, scale: f32, jpeg_quality: u8) -> Result<RasterLabel> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(LabelError::Rasterization(format!(
            "scale factor must be positive, got {scale}"
        )));
    }
    let width = (label.width * scale).round();
    let height = (label.height * scale).round();
    if !(width >= 1.0 && height >= 1.0) {
        return Err(LabelError::Rasterization(format!(
            "label has no area ({}×{} px)",
            label.width, label.height
        )));
    }
    let (width, height) = (width as u32, height as u32);
    if width as u64 * height as u64 > MAX_SURFACE_PIXELS {
        return Err(LabelError::Rasterization(format!(
            "surface of {width}×{height} px is too large"
        )));
    }

    let mut surface = Surface::new(width, height);
    let images = load_images(&label.root)?;

    Painter {
        surface: &mut surface,
        scale,
        images: &images,
        glyphs: GlyphCache::new(),
        fonts: FontManager::default(),
    }
    .paint(&label.root);

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, jpeg_quality.clamp(1, 100))
        .encode(surface.pixels.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| LabelError::Rasterization(format!("JPEG encoding failed: {e}")))?;

    log::debug!(
        "Rasterized label at {width}×{height} px ({} bytes)",
        encoded.len()
    );
    Ok(RasterLabel {
        pixel_width: width,
        pixel_height: height,
        encoded,
    })
}

/// Decode every image referenced by the label, once per distinct source.
fn load_images(root: &LayoutBox) -> Result<HashMap<String, RgbaImage>> {
    let mut images = HashMap::new();
    for src in root.image_sources() {
        if images.contains_key(src) {
            continue;
        }
        let bytes = parse_data_uri(src)
            .map_err(|e| LabelError::Rasterization(format!("image failed to load: {e}")))?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| LabelError::Rasterization(format!("image failed to load: {e}")))?;
        images.insert(src.to_string(), decoded.to_rgba8());
    }
    Ok(images)
}

struct Painter<'a> {
    surface: &'a mut Surface,
    scale: f32,
    images: &'a HashMap<String, RgbaImage>,
    glyphs: GlyphCache,
    fonts: FontManager,
}

impl Painter<'_> {
    fn px(&self, v: f32) -> i64 {
        (v * self.scale).round() as i64
    }

    fn paint(&mut self, lbox: &LayoutBox) {
        let (x0, y0) = (self.px(lbox.x), self.px(lbox.y));
        let (x1, y1) = (self.px(lbox.x + lbox.width), self.px(lbox.y + lbox.height));

        if let Some(bg) = lbox.background_color {
            self.surface.fill_rect(x0, y0, x1, y1, bg);
        }

        if let Some(border) = &lbox.border {
            let bw = self.px(border.width).max(1);
            let c = border.color;
            self.surface.fill_rect(x0, y0, x1, y0 + bw, c);
            self.surface.fill_rect(x0, y1 - bw, x1, y1, c);
            self.surface.fill_rect(x0, y0, x0 + bw, y1, c);
            self.surface.fill_rect(x1 - bw, y0, x1, y1, c);
        }

        if let Some(text) = &lbox.text {
            self.paint_text(lbox, text);
        }

        if let Some(img) = &lbox.image {
            self.paint_image(&img.src, x0, y0, self.px(img.width), self.px(img.height));
        }

        for child in &lbox.children {
            self.paint(child);
        }
    }

    fn paint_text(&mut self, lbox: &LayoutBox, text: &TextContent) {
        let advance = self.fonts.advance(text.font_size, text.bold);
        let cell_w = text.font_size * 0.5 * self.scale;
        let cell_h = text.font_size * self.scale;
        if cell_w < 1.0 || cell_h < 1.0 {
            return;
        }
        // Glyph cell sits vertically centred in the line box.
        let leading = (text.line_height - text.font_size) / 2.0;
        let overstrike = if text.bold { self.scale.round().max(1.0) as i64 } else { 0 };

        for line in &text.lines {
            let top = lbox.y + line.y_offset + leading;
            let mut pen_x = lbox.x + line.x_offset;
            for ch in line.text.chars() {
                if !ch.is_whitespace() {
                    let gx = self.px(pen_x);
                    let gy = self.px(top);
                    self.draw_glyph(ch, gx, gy, cell_w, cell_h, overstrike, text.color);
                }
                pen_x += advance;
            }

            if text.underline && !line.text.is_empty() {
                let baseline = self.px(top + self.fonts.ascender_px(text.font_size));
                let start = self.px(lbox.x + line.x_offset);
                let end = self.px(pen_x);
                let thickness = self.scale.round().max(1.0) as i64;
                self.surface
                    .fill_rect(start, baseline + 1, end, baseline + 1 + thickness, text.color);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_glyph(
        &mut self,
        ch: char,
        gx: i64,
        gy: i64,
        cell_w: f32,
        cell_h: f32,
        overstrike: i64,
        color: [f32; 4],
    ) {
        let glyph = self.glyphs.glyph(ch);
        let (w, h) = (cell_w.round() as i64, cell_h.round() as i64);
        for ty in 0..h {
            let row = ((ty as f32 + 0.5) * GLYPH_ROWS as f32 / cell_h) as usize;
            for tx in 0..w {
                let col = ((tx as f32 + 0.5) * GLYPH_COLS as f32 / cell_w) as usize;
                if glyph.is_set(col, row) {
                    for dx in 0..=overstrike {
                        self.surface.blend(gx + tx + dx, gy + ty, color);
                    }
                }
            }
        }
    }

    fn paint_image(&mut self, src: &str, x0: i64, y0: i64, w: i64, h: i64) {
        let Some(decoded) = self.images.get(src) else {
            return;
        };
        if w <= 0 || h <= 0 {
            return;
        }
        let resized = image::imageops::resize(decoded, w as u32, h as u32, FilterType::Triangle);
        for (x, y, px) in resized.enumerate_pixels() {
            let [r, g, b, a] = px.0;
            self.surface.blend(
                x0 + x as i64,
                y0 + y as i64,
                [
                    r as f32 / 255.0,
                    g as f32 / 255.0,
                    b as f32 / 255.0,
                    a as f32 / 255.0,
                ],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::render_qr_png;
    use crate::layout_config::{ImageContent, TextLine};
    use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

    fn card(width: f32, height: f32) -> RenderedLabel {
        RenderedLabel {
            root: LayoutBox::new(0.0, 0.0, width, height),
            width,
            height,
        }
    }

    fn text_box(s: &str) -> LayoutBox {
        let mut lb = LayoutBox::new(0.0, 0.0, 100.0, 20.0);
        lb.text = Some(TextContent {
            lines: vec![TextLine {
                text: s.to_string(),
                x_offset: 0.0,
                y_offset: 0.0,
            }],
            font_size: 16.0,
            bold: false,
            color: [0.0, 0.0, 0.0, 1.0],
            line_height: 20.0,
            text_align: "left".to_string(),
            underline: false,
        });
        lb
    }

    fn image_box(src: String) -> LayoutBox {
        let mut lb = LayoutBox::new(10.0, 10.0, 40.0, 40.0);
        lb.image = Some(ImageContent {
            src,
            width: 40.0,
            height: 40.0,
        });
        lb
    }

    #[test]
    fn output_is_scaled_jpeg() {
        let raster = rasterize(&card(100.0, 50.0), 2.0, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!((raster.pixel_width, raster.pixel_height), (200, 100));
        assert_eq!(&raster.encoded[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&raster.encoded).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 100));
        assert_eq!(live_surfaces(), 0);
    }

    #[test]
    fn text_leaves_ink() {
        let mut label = card(100.0, 20.0);
        label.root.children.push(text_box("AWB"));
        let raster = rasterize(&label, 1.0, 100).unwrap();
        let img = image::load_from_memory(&raster.encoded).unwrap().to_luma8();
        assert!(img.pixels().any(|p| p[0] < 100));
    }

    #[test]
    fn images_are_painted() {
        let png = render_qr_png("AWB0001", 60).unwrap();
        let src = format!("data:image/png;base64,{}", BASE64_STD.encode(&png));
        let mut label = card(60.0, 60.0);
        label.root.children.push(image_box(src));
        let raster = rasterize(&label, 1.0, 100).unwrap();
        let img = image::load_from_memory(&raster.encoded).unwrap().to_luma8();
        assert!(img.pixels().any(|p| p[0] < 100));
    }

    #[test]
    fn broken_image_fails_and_releases_surface() {
        let mut label = card(60.0, 60.0);
        label
            .root
            .children
            .push(image_box("data:image/png;base64,AAAA".to_string()));
        assert!(matches!(
            rasterize(&label, 2.0, DEFAULT_JPEG_QUALITY),
            Err(LabelError::Rasterization(_))
        ));
        assert_eq!(live_surfaces(), 0);
    }

    #[test]
    fn zero_area_and_bad_scale_are_rejected() {
        assert!(rasterize(&card(0.0, 10.0), 2.0, 90).is_err());
        assert!(rasterize(&card(10.0, 10.0), 0.0, 90).is_err());
        assert!(rasterize(&card(10.0, 10.0), f32::NAN, 90).is_err());
    }

    #[test]
    fn surface_counter_tracks_lifetime() {
        let before = live_surfaces();
        {
            let _surface = Surface::new(4, 4);
            assert_eq!(live_surfaces(), before + 1);
        }
        assert_eq!(live_surfaces(), before);
    }
}
