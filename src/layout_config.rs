//! Layout config – the intermediate representations shared by the pipeline
//! stages.
//!
//! * [`LayoutBox`] is one laid-out label card in CSS pixels, the input of the
//!   rasterizer.
//! * [`SheetLayout`] is the frozen placement of rasterized labels on A4
//!   pages, the input of the PDF emitter. It serialises to JSON so callers
//!   can inspect placements without opening the PDF.

use serde::{Deserialize, Serialize};

use crate::raster::RasterLabel;

/// A complete sheet layout ready for PDF emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetLayout {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    /// Physical page size in millimetres (orientation already applied).
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    /// Ordered list of pages.
    pub pages: Vec<SheetPage>,
    /// Rasterized label images, indexed by [`Placement::label_index`].
    #[serde(skip)]
    pub labels: Vec<RasterLabel>,
}

/// One output page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetPage {
    pub page_index: usize,
    pub placements: Vec<Placement>,
}

/// Where one label image lands. Coordinates are millimetres from the top-left
/// corner of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Index of the box (and its label) in booking order.
    pub label_index: usize,
    /// Cell index on the page, row-major.
    pub slot: usize,
    pub row: usize,
    pub col: usize,
    pub x_mm: f32,
    pub y_mm: f32,
    pub width_mm: f32,
    pub height_mm: f32,
}

impl SheetLayout {
    pub fn placement_count(&self) -> usize {
        self.pages.iter().map(|p| p.placements.len()).sum()
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON. The label images are not part of the JSON form.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }
}

/// A positioned rectangle with optional content, in label pixels measured
/// from the top-left corner of the label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    /// Visual styling
    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,

    /// Content (mutually exclusive in practice)
    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,

    /// Children (nested boxes)
    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped lines of text.
    pub lines: Vec<TextLine>,
    pub font_size: f32,
    pub bold: bool,
    pub color: [f32; 4],
    pub line_height: f32,
    pub text_align: String,
    pub underline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// X offset within the layout box (padding and alignment included)
    pub x_offset: f32,
    /// Y offset from the top of the layout box
    pub y_offset: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    pub src: String,
    pub width: f32,
    pub height: f32,
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            text: None,
            image: None,
            children: Vec::new(),
        }
    }

    /// Depth-first iterator over this box and all of its descendants.
    pub fn descendants(&self) -> Vec<&LayoutBox> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.descendants());
        }
        out
    }

    /// Image sources in document order.
    pub fn image_sources(&self) -> Vec<&str> {
        self.descendants()
            .into_iter()
            .filter_map(|b| b.image.as_ref().map(|i| i.src.as_str()))
            .collect()
    }

    /// All text lines in document order.
    pub fn text_lines(&self) -> Vec<&str> {
        self.descendants()
            .into_iter()
            .filter_map(|b| b.text.as_ref())
            .flat_map(|t| t.lines.iter().map(|l| l.text.as_str()))
            .collect()
    }
}
