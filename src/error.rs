//! Error types for label sheet generation.
//!
//! Every variant except [`LabelError::BarcodeGeneration`] is fatal for the
//! whole document: callers must assume no file was produced.

use thiserror::Error;

/// Main error type for labelsheet operations
#[derive(Debug, Error)]
pub enum LabelError {
    /// The shipment carries no boxes, so there is nothing to print.
    #[error("shipment has no boxes")]
    EmptyShipment,

    /// The logo or QR code could not be retrieved.
    #[error("asset fetch failed: {0}")]
    AssetFetch(String),

    /// Local barcode rendering failed. Recovered inside the asset resolver.
    #[error("barcode generation failed: {0}")]
    BarcodeGeneration(String),

    /// Off-screen capture of a label failed.
    #[error("rasterization failed: {0}")]
    Rasterization(String),

    /// The label template could not be laid out.
    #[error("label template error: {0}")]
    Template(String),

    /// PDF assembly failed.
    #[error("PDF emit failed: {0}")]
    Emit(String),

    /// Malformed or incomplete shipment payload.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LabelError>;
