//! Asset resolver – logo, QR code and barcode for one shipment.
//!
//! The three assets are produced concurrently, once per generation call, and
//! handed to every label as base64 data URIs so that per-label rendering never
//! touches the network or the filesystem.
//!
//! Failure policy:
//! - logo or QR unavailable → [`LabelError::AssetFetch`], fatal;
//! - barcode rendering fails → logged, the labels simply have no barcode.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use barcoders::sym::code128::Code128;
use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::QrCode;

use crate::error::{LabelError, Result};

/// Public QR rendering service used by the portal.
pub const DEFAULT_QR_ENDPOINT: &str = "https://api.qrserver.com/v1/create-qr-code/";

/// Edge length of the QR image in pixels.
pub const DEFAULT_QR_SIZE_PX: u32 = 150;

/// Barcode geometry: pixels per Code128 module, bar height, quiet zone.
const BARCODE_MODULE_PX: u32 = 2;
const BARCODE_HEIGHT_PX: u32 = 60;
const BARCODE_QUIET_MODULES: u32 = 10;

/// Modules of white border around a locally rendered QR code.
const QR_QUIET_MODULES: u32 = 4;

/// Where the QR image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrSource {
    /// `GET {endpoint}?size={n}x{n}&data={awb}` on a QR rendering service.
    Remote { endpoint: String },
    /// Rendered in-process; no network access.
    Local,
}

impl Default for QrSource {
    fn default() -> Self {
        QrSource::Remote {
            endpoint: DEFAULT_QR_ENDPOINT.to_string(),
        }
    }
}

/// Asset source locations.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Logo printed in the label header (PNG or JPEG).
    pub logo_path: PathBuf,
    pub qr_source: QrSource,
    pub qr_size_px: u32,
    /// Applies to the whole remote QR request.
    pub fetch_timeout: Duration,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            logo_path: PathBuf::from("assets/logo.png"),
            qr_source: QrSource::default(),
            qr_size_px: DEFAULT_QR_SIZE_PX,
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

/// An image ready to be embedded in a label template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    data_uri: String,
}

impl EmbeddedImage {
    /// Wrap encoded PNG/JPEG bytes. Anything that is not a decodable PNG or
    /// JPEG is refused.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, String> {
        let mime = match image::guess_format(bytes) {
            Ok(ImageFormat::Png) => "image/png",
            Ok(ImageFormat::Jpeg) => "image/jpeg",
            Ok(other) => return Err(format!("unsupported image format {other:?}")),
            Err(e) => return Err(format!("not an image: {e}")),
        };
        image::load_from_memory(bytes).map_err(|e| format!("decode error: {e}"))?;
        Ok(Self {
            data_uri: format!("data:{mime};base64,{}", BASE64_STD.encode(bytes)),
        })
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }
}

/// Shared, read-only assets for every label of one shipment.
#[derive(Debug, Clone)]
pub struct ResolvedAssets {
    pub logo: EmbeddedImage,
    pub qr_code: EmbeddedImage,
    /// `None` when barcode rendering failed.
    pub barcode: Option<EmbeddedImage>,
}

/// Produce logo, QR code and barcode for `awb`, concurrently.
pub async fn resolve_assets(awb: &str, config: &AssetConfig) -> Result<ResolvedAssets> {
    let (logo, qr_code, barcode) = tokio::join!(
        load_logo(&config.logo_path),
        resolve_qr(awb, config),
        generate_barcode(awb),
    );

    let logo = logo?;
    let qr_code = qr_code?;
    let barcode = match barcode {
        Ok(b) => Some(b),
        Err(e) => {
            log::warn!("Continuing without barcode for AWB {awb:?}: {e}");
            None
        }
    };

    Ok(ResolvedAssets {
        logo,
        qr_code,
        barcode,
    })
}

async fn load_logo(path: &Path) -> Result<EmbeddedImage> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        LabelError::AssetFetch(format!("cannot read logo {}: {e}", path.display()))
    })?;
    EmbeddedImage::from_bytes(&bytes)
        .map_err(|e| LabelError::AssetFetch(format!("logo {}: {e}", path.display())))
}

async fn resolve_qr(awb: &str, config: &AssetConfig) -> Result<EmbeddedImage> {
    match &config.qr_source {
        QrSource::Remote { endpoint } => {
            fetch_remote_qr(endpoint, awb, config.qr_size_px, config.fetch_timeout).await
        }
        QrSource::Local => {
            let png = render_qr_png(awb, config.qr_size_px)?;
            EmbeddedImage::from_bytes(&png).map_err(LabelError::AssetFetch)
        }
    }
}

/// Request URL for the QR service, with the AWB form-encoded.
pub fn qr_request_url(endpoint: &str, awb: &str, size_px: u32) -> Result<reqwest::Url> {
    reqwest::Url::parse_with_params(
        endpoint,
        &[("size", format!("{size_px}x{size_px}")), ("data", awb.to_string())],
    )
    .map_err(|e| LabelError::AssetFetch(format!("invalid QR endpoint {endpoint:?}: {e}")))
}

async fn fetch_remote_qr(
    endpoint: &str,
    awb: &str,
    size_px: u32,
    timeout: Duration,
) -> Result<EmbeddedImage> {
    let url = qr_request_url(endpoint, awb, size_px)?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("labelsheet/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| LabelError::AssetFetch(format!("HTTP client error: {e}")))?;

    log::debug!("Fetching QR code from {url}");
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| LabelError::AssetFetch(format!("QR request to {url} failed: {e}")))?;
    if !response.status().is_success() {
        return Err(LabelError::AssetFetch(format!(
            "QR request to {url} failed: HTTP {}",
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| LabelError::AssetFetch(format!("failed to read QR image: {e}")))?;

    EmbeddedImage::from_bytes(&bytes)
        .map_err(|e| LabelError::AssetFetch(format!("QR image from {url}: {e}")))
}

/// Render `data` as a square QR code PNG of `size_px` pixels.
pub fn render_qr_png(data: &str, size_px: u32) -> Result<Vec<u8>> {
    let code = QrCode::new(data.as_bytes())
        .map_err(|e| LabelError::AssetFetch(format!("QR encoding failed: {e}")))?;

    let modules = code.width() as u32;
    let total = modules + 2 * QR_QUIET_MODULES;
    let cell = (size_px / total).max(1);
    let side = total * cell;

    let mut img = GrayImage::from_pixel(side, side, Luma([255]));
    for qy in 0..modules {
        for qx in 0..modules {
            if code[(qx as usize, qy as usize)] != qrcode::Color::Dark {
                continue;
            }
            let x0 = (qx + QR_QUIET_MODULES) * cell;
            let y0 = (qy + QR_QUIET_MODULES) * cell;
            for y in y0..y0 + cell {
                for x in x0..x0 + cell {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
    }

    if side != size_px && size_px > 0 {
        img = image::imageops::resize(&img, size_px, size_px, image::imageops::FilterType::Nearest);
    }
    encode_png(DynamicImage::ImageLuma8(img)).map_err(LabelError::AssetFetch)
}

/// Barcode rendering runs on the blocking pool so that a panic inside the
/// symbology encoder is contained like any other barcode failure.
async fn generate_barcode(awb: &str) -> Result<EmbeddedImage> {
    let data = awb.to_owned();
    tokio::task::spawn_blocking(move || render_code128(&data))
        .await
        .map_err(|e| LabelError::BarcodeGeneration(format!("barcode task aborted: {e}")))?
}

/// Render `data` as a Code128 (character set B) barcode.
pub fn render_code128(data: &str) -> Result<EmbeddedImage> {
    // U+0181 selects character set B (printable ASCII).
    let prefixed = format!("\u{0181}{data}");
    let barcode = Code128::new(&prefixed)
        .map_err(|e| LabelError::BarcodeGeneration(format!("{data:?}: {e:?}")))?;
    let modules = barcode.encode();

    let width = (modules.len() as u32 + 2 * BARCODE_QUIET_MODULES) * BARCODE_MODULE_PX;
    let mut img = GrayImage::from_pixel(width, BARCODE_HEIGHT_PX, Luma([255]));
    for (i, &module) in modules.iter().enumerate() {
        if module != 1 {
            continue;
        }
        let x0 = (i as u32 + BARCODE_QUIET_MODULES) * BARCODE_MODULE_PX;
        for x in x0..x0 + BARCODE_MODULE_PX {
            for y in 0..BARCODE_HEIGHT_PX {
                img.put_pixel(x, y, Luma([0]));
            }
        }
    }

    let png = encode_png(DynamicImage::ImageLuma8(img)).map_err(LabelError::BarcodeGeneration)?;
    EmbeddedImage::from_bytes(&png).map_err(LabelError::BarcodeGeneration)
}

fn encode_png(img: DynamicImage) -> std::result::Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| format!("PNG encode error: {e}"))?;
    Ok(buf)
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
///
/// Returns `Err` if `src` is not a data URI or does not use base64 encoding.
pub fn parse_data_uri(src: &str) -> std::result::Result<Vec<u8>, String> {
    let rest = src.strip_prefix("data:").ok_or_else(|| {
        let preview: String = src.chars().take(80).collect();
        format!("image src must be a base64 data URI, got {preview:?}")
    })?;
    let comma_pos = rest
        .find(',')
        .ok_or_else(|| "invalid data URI: missing `,` separator".to_string())?;
    if !rest[..comma_pos].contains(";base64") {
        return Err("only base64-encoded data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(rest[comma_pos + 1..].trim())
        .map_err(|e| format!("base64 decode error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_logo;

    #[test]
    fn qr_url_encodes_awb() {
        let url = qr_request_url(DEFAULT_QR_ENDPOINT, "AWB 1/2", 150).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.qrserver.com/v1/create-qr-code/?size=150x150&data=AWB+1%2F2"
        );
    }

    #[test]
    fn local_qr_has_requested_size() {
        let png = render_qr_png("AWB0001", 150).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (150, 150));
    }

    #[test]
    fn empty_awb_still_yields_qr() {
        assert!(render_qr_png("", DEFAULT_QR_SIZE_PX).is_ok());
    }

    #[test]
    fn code128_renders_bars() {
        let barcode = render_code128("AWB0001").unwrap();
        let bytes = parse_data_uri(barcode.data_uri()).unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_luma8();
        assert_eq!(img.height(), BARCODE_HEIGHT_PX);
        assert!(img.pixels().any(|p| p[0] == 0));
    }

    #[test]
    fn code128_rejects_characters_outside_set_b() {
        assert!(matches!(
            render_code128("AWB☃"),
            Err(LabelError::BarcodeGeneration(_))
        ));
    }

    #[test]
    fn data_uri_round_trip_and_rejects_plain_paths() {
        let png = render_qr_png("x", 40).unwrap();
        let img = EmbeddedImage::from_bytes(&png).unwrap();
        assert!(img.data_uri().starts_with("data:image/png;base64,"));
        assert_eq!(parse_data_uri(img.data_uri()).unwrap(), png);
        assert!(parse_data_uri("logo.png").is_err());
        assert!(EmbeddedImage::from_bytes(b"<html>").is_err());
    }

    #[tokio::test]
    async fn resolves_offline_assets() {
        let config = AssetConfig {
            logo_path: write_logo("assets-offline"),
            qr_source: QrSource::Local,
            ..AssetConfig::default()
        };
        let assets = resolve_assets("AWB0001", &config).await.unwrap();
        assert!(assets.barcode.is_some());
        assert!(assets.logo.data_uri().starts_with("data:image/png"));
    }

    #[tokio::test]
    async fn missing_logo_is_fatal() {
        let config = AssetConfig {
            logo_path: PathBuf::from("/nonexistent/labelsheet/logo.png"),
            qr_source: QrSource::Local,
            ..AssetConfig::default()
        };
        assert!(matches!(
            resolve_assets("AWB0001", &config).await,
            Err(LabelError::AssetFetch(_))
        ));
    }

    #[tokio::test]
    async fn barcode_failure_degrades() {
        let config = AssetConfig {
            logo_path: write_logo("assets-degrade"),
            qr_source: QrSource::Local,
            ..AssetConfig::default()
        };
        let assets = resolve_assets("AWB☃", &config).await.unwrap();
        assert!(assets.barcode.is_none());
    }
}
