//! Page compositor – packs rasterized labels onto fixed-size pages in a grid.
//!
//! Every label is scaled uniformly to fit its cell and centred in it. Labels
//! fill cells row-major in input order; a new page starts whenever the grid
//! of the current page is full. Geometry is fixed for the whole call.

use crate::error::{LabelError, Result};
use crate::layout_config::{Placement, SheetLayout, SheetPage};
use crate::raster::RasterLabel;

/// A4 paper size in millimetres (portrait).
pub const A4_WIDTH_MM: f32 = 210.0;
pub const A4_HEIGHT_MM: f32 = 297.0;

/// Page orientation for the generated PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width and height swapped.
    Landscape,
}

/// Page and grid geometry, in millimetres.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetGeometry {
    /// Paper size in portrait orientation.
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    pub margin_mm: f32,
    /// Space between adjacent cells, both axes.
    pub gap_mm: f32,
    pub columns: usize,
    pub rows: usize,
    pub orientation: PageOrientation,
}

impl Default for SheetGeometry {
    fn default() -> Self {
        Self {
            page_width_mm: A4_WIDTH_MM,
            page_height_mm: A4_HEIGHT_MM,
            margin_mm: 10.0,
            gap_mm: 5.0,
            columns: 2,
            rows: 2,
            orientation: PageOrientation::Portrait,
        }
    }
}

impl SheetGeometry {
    /// Create an A4 landscape geometry.
    pub fn a4_landscape() -> Self {
        Self {
            orientation: PageOrientation::Landscape,
            ..Self::default()
        }
    }

    /// Effective page width after applying orientation.
    pub fn effective_width(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.page_width_mm,
            PageOrientation::Landscape => self.page_height_mm,
        }
    }

    /// Effective page height after applying orientation.
    pub fn effective_height(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.page_height_mm,
            PageOrientation::Landscape => self.page_width_mm,
        }
    }

    pub fn cell_width(&self) -> f32 {
        cell_extent(self.effective_width(), self.margin_mm, self.gap_mm, self.columns)
    }

    pub fn cell_height(&self) -> f32 {
        cell_extent(self.effective_height(), self.margin_mm, self.gap_mm, self.rows)
    }

    pub fn labels_per_page(&self) -> usize {
        self.columns * self.rows
    }

    fn validate(&self) -> Result<()> {
        if self.columns == 0 || self.rows == 0 {
            return Err(LabelError::InvalidInput(format!(
                "grid must have at least one cell, got {}×{}",
                self.columns, self.rows
            )));
        }
        let (w, h) = (self.cell_width(), self.cell_height());
        if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
            return Err(LabelError::InvalidInput(format!(
                "margins and gaps leave no room for cells ({w:.2}×{h:.2} mm)"
            )));
        }
        Ok(())
    }
}

fn cell_extent(page: f32, margin: f32, gap: f32, count: usize) -> f32 {
    (page - 2.0 * margin - count.saturating_sub(1) as f32 * gap) / count.max(1) as f32
}

/// Incremental compositor: labels are pushed one at a time, in order.
#[derive(Debug)]
pub struct SheetCompositor {
    geometry: SheetGeometry,
    cell_w: f32,
    cell_h: f32,
    layout: SheetLayout,
}

impl SheetCompositor {
    pub fn new(geometry: SheetGeometry) -> Result<Self> {
        geometry.validate()?;
        let layout = SheetLayout {
            title: String::new(),
            page_width_mm: geometry.effective_width(),
            page_height_mm: geometry.effective_height(),
            pages: Vec::new(),
            labels: Vec::new(),
        };
        Ok(Self {
            cell_w: geometry.cell_width(),
            cell_h: geometry.cell_height(),
            geometry,
            layout,
        })
    }

    /// Place the next label and take ownership of its raster.
    pub fn push(&mut self, label: RasterLabel) -> Result<&Placement> {
        let index = self.layout.labels.len();
        if label.pixel_width == 0 || label.pixel_height == 0 {
            return Err(LabelError::Rasterization(format!(
                "label {} has zero size ({}×{} px)",
                index + 1,
                label.pixel_width,
                label.pixel_height
            )));
        }

        let (px_w, px_h) = (label.pixel_width as f32, label.pixel_height as f32);
        let scale = (self.cell_w / px_w).min(self.cell_h / px_h);
        let (placed_w, placed_h) = (px_w * scale, px_h * scale);

        let g = &self.geometry;
        let slot = index % g.labels_per_page();
        let (row, col) = (slot / g.columns, slot % g.columns);
        let cell_left = g.margin_mm + col as f32 * (self.cell_w + g.gap_mm);
        let cell_top = g.margin_mm + row as f32 * (self.cell_h + g.gap_mm);

        if slot == 0 {
            self.layout.pages.push(SheetPage {
                page_index: self.layout.pages.len(),
                placements: Vec::new(),
            });
        }

        let placement = Placement {
            label_index: index,
            slot,
            row,
            col,
            x_mm: cell_left + (self.cell_w - placed_w) / 2.0,
            y_mm: cell_top + (self.cell_h - placed_h) / 2.0,
            width_mm: placed_w,
            height_mm: placed_h,
        };
        log::debug!(
            "Label {} → page {}, slot {slot} ({:.1}×{:.1} mm)",
            index + 1,
            self.layout.pages.len(),
            placed_w,
            placed_h
        );

        self.layout.labels.push(label);
        let page = self
            .layout
            .pages
            .last_mut()
            .ok_or_else(|| LabelError::Rasterization("no page allocated".to_string()))?;
        page.placements.push(placement);
        page.placements
            .last()
            .ok_or_else(|| LabelError::Rasterization("placement lost".to_string()))
    }

    /// Finish the sheet. Fails when no label was pushed.
    pub fn finish(self) -> Result<SheetLayout> {
        if self.layout.labels.is_empty() {
            return Err(LabelError::EmptyShipment);
        }
        Ok(self.layout)
    }
}

/// Compose all `labels` in one go.
pub fn compose(labels: Vec<RasterLabel>, geometry: &SheetGeometry) -> Result<SheetLayout> {
    if labels.is_empty() {
        return Err(LabelError::EmptyShipment);
    }
    let mut compositor = SheetCompositor::new(geometry.clone())?;
    for label in labels {
        compositor.push(label)?;
    }
    compositor.finish()
}
