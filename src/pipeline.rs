//! Pipeline – ties together asset resolution, label rendering,
//! rasterization, page composition and PDF emission into a single call.
//!
//! Stages run strictly in order: `CollectingAssets → RenderingLabels →
//! Compositing → Emitted`. Any fatal error aborts the whole call and no
//! document is produced.

use std::fmt;

use crate::assets::{resolve_assets, AssetConfig, ResolvedAssets};
use crate::compositor::{SheetCompositor, SheetGeometry};
use crate::emit::{emit, OutputDocument};
use crate::error::{LabelError, Result};
use crate::layout_config::SheetLayout;
use crate::raster::{rasterize, DEFAULT_JPEG_QUALITY};
use crate::shipment::ShipmentLabelData;
use crate::templates::{render_label, DEFAULT_CARD_WIDTH_PX};

/// Configuration for the label generation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Document title embedded in the PDF metadata
    /// (default: "Shipping labels {reference}").
    pub title: Option<String>,
    /// Page size, margins and grid (default: A4 portrait, 2×2).
    pub geometry: SheetGeometry,
    /// Natural label width in CSS pixels (default: 384).
    pub card_width_px: f32,
    /// Raster resolution relative to the natural label size (default: 2).
    pub scale_factor: f32,
    /// JPEG quality of label rasters (default: 90).
    pub jpeg_quality: u8,
    /// Logo and QR sources.
    pub assets: AssetConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            title: None,
            geometry: SheetGeometry::default(),
            card_width_px: DEFAULT_CARD_WIDTH_PX,
            scale_factor: 2.0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            assets: AssetConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// PDF title for `data`.
    pub fn title_for(&self, data: &ShipmentLabelData) -> String {
        match &self.title {
            Some(title) => title.clone(),
            None => match data.reference_id() {
                Some(reference) => format!("Shipping labels {reference}"),
                None => "Shipping labels".to_string(),
            },
        }
    }
}

/// Pipeline progress, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CollectingAssets,
    RenderingLabels { current: usize, total: usize },
    Compositing,
    Emitted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::CollectingAssets => write!(f, "collecting assets"),
            Stage::RenderingLabels { current, total } => {
                write!(f, "rendering label {current}/{total}")
            }
            Stage::Compositing => write!(f, "compositing"),
            Stage::Emitted => write!(f, "emitted"),
        }
    }
}

/// Full pipeline: shipment → PDF.
pub async fn generate_labels(
    data: &ShipmentLabelData,
    config: &PipelineConfig,
) -> Result<OutputDocument> {
    let (doc, _) = generate_labels_with_layout(data, config).await?;
    Ok(doc)
}

/// Like [`generate_labels`], also returning the sheet layout the document was
/// emitted from.
pub async fn generate_labels_with_layout(
    data: &ShipmentLabelData,
    config: &PipelineConfig,
) -> Result<(OutputDocument, SheetLayout)> {
    if data.boxes.is_empty() {
        return Err(LabelError::EmptyShipment);
    }

    log::debug!("Stage: {}", Stage::CollectingAssets);
    let assets = resolve_assets(data.awb(), &config.assets).await?;

    let layout = build_sheet(data, &assets, config)?;

    let doc = emit(&layout, data.reference_id())?;
    log::debug!("Stage: {}", Stage::Emitted);
    Ok((doc, layout))
}

/// Render, rasterize and compose every box with already resolved assets.
///
/// Boxes are processed one at a time, in booking order, so at most one
/// raster surface is alive at any moment.
pub fn build_sheet(
    data: &ShipmentLabelData,
    assets: &ResolvedAssets,
    config: &PipelineConfig,
) -> Result<SheetLayout> {
    let total = data.boxes.len();
    if total == 0 {
        return Err(LabelError::EmptyShipment);
    }

    let mut compositor = SheetCompositor::new(config.geometry.clone())?;
    for (index, parcel) in data.boxes.iter().enumerate() {
        log::debug!(
            "Stage: {}",
            Stage::RenderingLabels {
                current: index + 1,
                total
            }
        );
        let label = render_label(parcel, index, total, data, assets, config.card_width_px)?;
        let raster = rasterize(&label, config.scale_factor, config.jpeg_quality)?;
        compositor.push(raster)?;
    }

    log::debug!("Stage: {}", Stage::Compositing);
    let mut layout = compositor.finish()?;
    layout.title = config.title_for(data);
    Ok(layout)
}

/// Lay out the sheet without emitting a PDF – useful for inspection.
pub async fn compute_sheet_layout(
    data: &ShipmentLabelData,
    config: &PipelineConfig,
) -> Result<SheetLayout> {
    if data.boxes.is_empty() {
        return Err(LabelError::EmptyShipment);
    }
    let assets = resolve_assets(data.awb(), &config.assets).await?;
    build_sheet(data, &assets, config)
}
