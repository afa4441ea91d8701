//! Document emitter – turns a [`SheetLayout`] into PDF bytes using `printpdf`
//! (v0.8 ops-based API).
//!
//! Each label raster is registered once as an image XObject and drawn at its
//! placement rectangle. Placements use a top-left origin in millimetres; PDF
//! uses a bottom-left origin in points.

use std::collections::HashMap;

use printpdf::*;

use crate::error::{LabelError, Result};
use crate::layout_config::SheetLayout;

/// PDF points per millimetre.
const PT_PER_MM: f32 = 72.0 / 25.4;

/// Used when the shipment has no reference id.
const FALLBACK_FILE_STEM: &str = "shipment";

/// The finished document.
#[derive(Debug, Clone)]
pub struct OutputDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// `labels_{hint}.pdf`, or `labels_shipment.pdf` when the hint is absent or
/// blank. Path separators in the hint are replaced.
pub fn label_file_name(hint: Option<&str>) -> String {
    let stem = hint
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(FALLBACK_FILE_STEM)
        .replace(['/', '\\'], "_");
    format!("labels_{stem}.pdf")
}

/// Emit the PDF for `layout`, named from `file_name_hint`.
pub fn emit(layout: &SheetLayout, file_name_hint: Option<&str>) -> Result<OutputDocument> {
    let bytes = render_pdf(layout)?;
    let doc = OutputDocument {
        file_name: label_file_name(file_name_hint),
        bytes,
        page_count: layout.pages.len().max(1),
    };
    log::info!(
        "Emitted {} ({} pages, {} bytes)",
        doc.file_name,
        doc.page_count,
        doc.bytes.len()
    );
    Ok(doc)
}

/// Render a SheetLayout into PDF bytes.
pub fn render_pdf(layout: &SheetLayout) -> Result<Vec<u8>> {
    let page_w = Mm(layout.page_width_mm);
    let page_h = Mm(layout.page_height_mm);

    let mut doc = PdfDocument::new(&layout.title);

    // ── Register every raster once ────────────────────────────────────────
    let mut image_resources: HashMap<usize, ImageResource> = HashMap::new();
    let mut img_warnings: Vec<PdfWarnMsg> = Vec::new();

    for page in &layout.pages {
        for placement in &page.placements {
            let index = placement.label_index;
            if image_resources.contains_key(&index) {
                continue;
            }
            let label = layout.labels.get(index).ok_or_else(|| {
                LabelError::Emit(format!("placement refers to missing label {index}"))
            })?;
            let raw = RawImage::decode_from_bytes(&label.encoded, &mut img_warnings)
                .map_err(|e| LabelError::Emit(format!("label {index} image: {e}")))?;
            let xobj_id = doc.add_image(&raw);
            image_resources.insert(
                index,
                ImageResource {
                    xobj_id,
                    px_width: label.pixel_width,
                    px_height: label.pixel_height,
                },
            );
        }
    }

    // ── Render pages ──────────────────────────────────────────────────────
    let mut pages = Vec::new();
    for page in &layout.pages {
        let mut ops = Vec::new();
        for placement in &page.placements {
            let Some(res) = image_resources.get(&placement.label_index) else {
                continue;
            };
            // At dpi=72 printpdf renders 1 px = 1 pt, so scale = pt / px.
            let width_pt = placement.width_mm * PT_PER_MM;
            let height_pt = placement.height_mm * PT_PER_MM;
            let bottom_mm = layout.page_height_mm - placement.y_mm - placement.height_mm;

            ops.push(Op::UseXobject {
                id: res.xobj_id.clone(),
                transform: XObjectTransform {
                    translate_x: Some(Pt(placement.x_mm * PT_PER_MM)),
                    translate_y: Some(Pt(bottom_mm * PT_PER_MM)),
                    dpi: Some(72.0),
                    scale_x: Some(width_pt / res.px_width.max(1) as f32),
                    scale_y: Some(height_pt / res.px_height.max(1) as f32),
                    rotate: None,
                },
            });
        }
        pages.push(PdfPage::new(page_w, page_h, ops));
    }

    // Ensure at least one page.
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    doc.with_pages(pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut Vec::new());
    Ok(bytes)
}
