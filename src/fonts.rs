//! Text metrics and glyph bitmaps for label text.
//!
//! Labels are drawn with the Spleen 12×24 bitmap font, scaled to the
//! requested font size. The font is monospaced, so measurement is exact: a
//! glyph cell is `font_size` tall and half as wide. Bold text is drawn with
//! a one-column overstrike and gets a slightly wider advance.

use std::collections::HashMap;

use spleen_font::{PSF2Font, FONT_12X24};

/// Native cell size of the bitmap font.
pub const GLYPH_COLS: usize = 12;
pub const GLYPH_ROWS: usize = 24;

/// Baseline position within the 24-row cell.
const BASELINE_ROW: f32 = 19.0;

/// Advance per character as a fraction of the font size.
const REGULAR_ADVANCE: f32 = 0.5;
const BOLD_ADVANCE: f32 = 0.55;

/// Text metrics for the label font.
#[derive(Debug, Clone, Copy, Default)]
pub struct FontManager;

impl FontManager {
    pub fn new() -> Self {
        Self
    }

    /// Horizontal advance of one character in px.
    pub fn advance(&self, font_size: f32, bold: bool) -> f32 {
        font_size * if bold { BOLD_ADVANCE } else { REGULAR_ADVANCE }
    }

    /// Measure the width of a string at a given font size (in px).
    pub fn measure_text_width(&self, text: &str, font_size: f32, bold: bool) -> f32 {
        text.chars().count() as f32 * self.advance(font_size, bold)
    }

    /// Measure the line height in px.
    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    /// Distance from the top of the glyph cell to the baseline, in px.
    pub fn ascender_px(&self, font_size: f32) -> f32 {
        font_size * BASELINE_ROW / GLYPH_ROWS as f32
    }
}

/// Word-wrap text to fit within `max_width` pixels. Returns a vec of lines.
///
/// Explicit `\n` always starts a new line. A single word wider than the line
/// is broken at the character that overflows.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    bold: bool,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let advance = fonts.advance(font_size, bold);
    let max_chars = ((max_width / advance).floor() as usize).max(1);

    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        for word in words {
            let mut word: String = word.to_string();
            loop {
                let candidate_len = if current_line.is_empty() {
                    word.chars().count()
                } else {
                    current_line.chars().count() + 1 + word.chars().count()
                };
                if candidate_len <= max_chars {
                    if !current_line.is_empty() {
                        current_line.push(' ');
                    }
                    current_line.push_str(&word);
                    break;
                }
                if !current_line.is_empty() {
                    lines.push(std::mem::take(&mut current_line));
                    continue;
                }
                // Word alone does not fit: hard break.
                let head: String = word.chars().take(max_chars).collect();
                let tail: String = word.chars().skip(max_chars).collect();
                lines.push(head);
                word = tail;
                if word.is_empty() {
                    break;
                }
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

// ---------------------------------------------------------------------------
// Glyph bitmaps
// ---------------------------------------------------------------------------

/// A 12×24 one-bit glyph, row-major.
#[derive(Debug, Clone)]
pub struct Glyph {
    bits: Vec<bool>,
}

impl Glyph {
    fn blank() -> Self {
        Self {
            bits: vec![false; GLYPH_COLS * GLYPH_ROWS],
        }
    }

    /// Whether the pixel at (`col`, `row`) of the native cell is inked.
    pub fn is_set(&self, col: usize, row: usize) -> bool {
        col < GLYPH_COLS && row < GLYPH_ROWS && self.bits[row * GLYPH_COLS + col]
    }
}

/// Decoded glyphs, keyed by character. One cache per rasterized label.
#[derive(Debug, Default)]
pub struct GlyphCache {
    glyphs: HashMap<char, Glyph>,
}

impl GlyphCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Glyph for `ch`. Characters the font lacks render as `?`.
    pub fn glyph(&mut self, ch: char) -> &Glyph {
        self.glyphs.entry(ch).or_insert_with(|| load_glyph(ch))
    }
}

fn load_glyph(ch: char) -> Glyph {
    let Ok(mut font) = PSF2Font::new(FONT_12X24) else {
        log::warn!("Bitmap font failed to load; drawing blank glyphs");
        return Glyph::blank();
    };

    let mut glyph = Glyph::blank();
    let utf8 = ch.to_string();
    let found = match font.glyph_for_utf8(utf8.as_bytes()) {
        Some(rows) => {
            for (row_y, row) in rows.enumerate() {
                for (col_x, on) in row.enumerate() {
                    if row_y < GLYPH_ROWS && col_x < GLYPH_COLS {
                        glyph.bits[row_y * GLYPH_COLS + col_x] = on;
                    }
                }
            }
            true
        }
        None => false,
    };

    if !found && ch != '?' {
        return load_glyph('?');
    }
    glyph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monospace_text_width() {
        let mgr = FontManager::default();
        let w = mgr.measure_text_width("Hello", 16.0, false);
        // 5 chars × 16 × 0.5 = 40
        assert!((w - 40.0).abs() < 0.1);
        assert!(mgr.measure_text_width("Hello", 16.0, true) > w);
    }

    #[test]
    fn word_wrap_basic() {
        let mgr = FontManager::default();
        let lines = wrap_text("Hello world foo bar", 16.0, false, 60.0, &mgr);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
        for line in &lines {
            assert!(mgr.measure_text_width(line, 16.0, false) <= 60.0);
        }
    }

    #[test]
    fn explicit_newlines_are_kept() {
        let mgr = FontManager::default();
        let lines = wrap_text("12 MG Road\nFlat 4", 10.0, false, 500.0, &mgr);
        assert_eq!(lines, vec!["12 MG Road", "Flat 4"]);
    }

    #[test]
    fn long_word_is_hard_broken() {
        let mgr = FontManager::default();
        // 10px font → 5px per char → 4 chars per 20px line.
        let lines = wrap_text("ABCDEFGHIJ", 10.0, false, 20.0, &mgr);
        assert_eq!(lines, vec!["ABCD", "EFGH", "IJ"]);
    }

    #[test]
    fn glyphs_have_ink() {
        let mut cache = GlyphCache::new();
        let a = cache.glyph('A').clone();
        let inked = (0..GLYPH_ROWS)
            .flat_map(|r| (0..GLYPH_COLS).map(move |c| (c, r)))
            .filter(|&(c, r)| a.is_set(c, r))
            .count();
        assert!(inked > 10);

        let space = cache.glyph(' ');
        assert!(!(0..GLYPH_ROWS).any(|r| (0..GLYPH_COLS).any(|c| space.is_set(c, r))));
    }
}
