//! # labelsheet – shipping label sheets as PDF
//!
//! Given one booked shipment, this crate renders one label per parcel and
//! packs the labels onto A4 pages, four to a page. The pipeline stages are:
//!
//! 1. **Assets** – logo, QR code and Code128 barcode for the AWB ([`assets`])
//! 2. **Template** – label HTML → styled DOM → Taffy layout ([`templates`],
//!    built on [`dom`], [`style`] and [`layout`])
//! 3. **Rasterize** – paint each label to a JPEG raster ([`raster`])
//! 4. **Composite** – scale-to-fit into a 2×2 grid per page ([`compositor`])
//! 5. **Emit** – write the PDF via printpdf ([`emit`])
//!
//! [`pipeline::generate_labels`] runs all stages. A C-compatible FFI surface
//! is exposed via the [`ffi`] module.

pub mod assets;
pub mod compositor;
pub mod dom;
pub mod emit;
pub mod error;
pub mod ffi;
pub mod fonts;
pub mod layout;
pub mod layout_config;
pub mod pipeline;
pub mod raster;
pub mod shipment;
pub mod style;
pub mod templates;

// Re-exports for convenience
pub use compositor::{PageOrientation, SheetGeometry};
pub use emit::OutputDocument;
pub use error::{LabelError, Result};
pub use pipeline::{generate_labels, generate_labels_with_layout, PipelineConfig};
pub use shipment::ShipmentLabelData;

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use image::{Rgb, RgbImage};

    /// Write a small PNG logo to a per-test temp file and return its path.
    pub fn write_logo(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "labelsheet-{}-{name}.png",
            std::process::id()
        ));
        let img = RgbImage::from_fn(48, 16, |x, _| {
            if x < 16 {
                Rgb([200, 30, 30])
            } else {
                Rgb([20, 20, 20])
            }
        });
        img.save(&path).unwrap();
        path
    }
}
