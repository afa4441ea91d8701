//! Integration tests for the labelsheet pipeline.
//!
//! These tests validate:
//! - Page count and placement order for typical shipment sizes
//! - Scale-to-fit and centring of labels in their cells
//! - Barcode degradation and shared asset identity
//! - Remote QR fetch against a loopback HTTP server
//! - Output naming and text formatting

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use labelsheet::assets::{parse_data_uri, render_qr_png, resolve_assets, AssetConfig, QrSource};
use labelsheet::layout_config::SheetLayout;
use labelsheet::pipeline::{generate_labels, generate_labels_with_layout, PipelineConfig};
use labelsheet::raster::live_surfaces;
use labelsheet::shipment::{Consignee, ParcelBox, Shipper, ShipmentLabelData};
use labelsheet::templates::{format_weight, render_label, DEFAULT_CARD_WIDTH_PX};
use labelsheet::{LabelError, SheetGeometry};

// =====================================================================
// Helpers
// =====================================================================

fn write_logo(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "labelsheet-it-{}-{name}.png",
        std::process::id()
    ));
    image::RgbImage::from_pixel(40, 20, image::Rgb([10, 60, 160]))
        .save(&path)
        .unwrap();
    path
}

fn offline_config(name: &str) -> PipelineConfig {
    PipelineConfig {
        scale_factor: 1.0,
        assets: AssetConfig {
            logo_path: write_logo(name),
            qr_source: QrSource::Local,
            ..AssetConfig::default()
        },
        ..PipelineConfig::default()
    }
}

fn shipment(boxes: usize, awb: &str) -> ShipmentLabelData {
    ShipmentLabelData {
        shipment_reference_id: Some("REF123".into()),
        shipment_awb: Some(awb.into()),
        consignee: Consignee {
            name: Some("Asha Rao".into()),
            address: Some("12 MG Road\nFlat 4".into()),
            city: Some("Pune".into()),
            state: Some("MH".into()),
            pin: Some("411001".into()),
            country: Some("India".into()),
            phone: Some("9800000000".into()),
        },
        shipper: Shipper {
            name: Some("Corner Shop".into()),
            address: Some("5 Market St".into()),
            city: Some("Delhi".into()),
            country: Some("India".into()),
            ..Shipper::default()
        },
        shipment_date: Some("2024-03-01".into()),
        vendor_name: Some("FastShip".into()),
        boxes: (0..boxes)
            .map(|i| ParcelBox {
                weight_kg: Some(1.0 + i as f64 / 10.0),
                length_cm: Some(30.0),
                breadth_cm: Some(20.0),
                height_cm: Some(10.0),
            })
            .collect(),
    }
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

async fn layout_for(n: usize, name: &str) -> SheetLayout {
    let (doc, layout) = generate_labels_with_layout(&shipment(n, "AWB0001"), &offline_config(name))
        .await
        .unwrap();
    assert_valid_pdf(&doc.bytes);
    assert_eq!(doc.page_count, layout.pages.len());
    layout
}

/// Serve exactly one HTTP response on a loopback port. The join handle
/// yields the request line that was received.
async fn serve_once(status: &'static str, body: Vec<u8>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
        }
        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        let _ = socket.shutdown().await;
        String::from_utf8_lossy(&request)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    });
    (format!("http://{addr}/v1/create-qr-code/"), handle)
}

fn image_hashes(srcs: &[&str]) -> Vec<Vec<u8>> {
    srcs.iter()
        .map(|src| Sha256::digest(parse_data_uri(src).unwrap()).to_vec())
        .collect()
}

// =====================================================================
// Pagination and placement
// =====================================================================

#[tokio::test]
async fn page_count_is_ceil_of_quarter() {
    for (n, pages) in [(1, 1), (4, 1), (5, 2), (8, 2), (9, 3)] {
        let layout = layout_for(n, &format!("pages-{n}")).await;
        assert_eq!(layout.pages.len(), pages, "n = {n}");
        assert_eq!(layout.placement_count(), n);
    }
}

#[tokio::test]
async fn boxes_keep_booking_order() {
    let layout = layout_for(9, "order").await;
    for (i, placement) in layout.pages.iter().flat_map(|p| &p.placements).enumerate() {
        assert_eq!(placement.label_index, i);
        assert_eq!(placement.slot, i % 4);
        assert_eq!(placement.row, (i % 4) / 2);
        assert_eq!(placement.col, (i % 4) % 2);
    }
    let last = &layout.pages[2].placements[0];
    assert_eq!(last.label_index, 8);
    assert_eq!(last.slot, 0);
    assert_eq!(layout.pages[2].placements.len(), 1);
}

#[tokio::test]
async fn labels_scale_uniformly_and_centre_in_cells() {
    let layout = layout_for(4, "centre").await;
    let geometry = SheetGeometry::default();
    let (cell_w, cell_h) = (geometry.cell_width(), geometry.cell_height());

    for p in &layout.pages[0].placements {
        let label = &layout.labels[p.label_index];
        let raster_ratio = label.pixel_width as f32 / label.pixel_height as f32;
        assert!((p.width_mm / p.height_mm - raster_ratio).abs() < 1e-3);
        assert!(p.width_mm <= cell_w + 1e-3 && p.height_mm <= cell_h + 1e-3);

        let cell_left = geometry.margin_mm + p.col as f32 * (cell_w + geometry.gap_mm);
        let cell_top = geometry.margin_mm + p.row as f32 * (cell_h + geometry.gap_mm);
        let left = p.x_mm - cell_left;
        let right = cell_left + cell_w - (p.x_mm + p.width_mm);
        let top = p.y_mm - cell_top;
        let bottom = cell_top + cell_h - (p.y_mm + p.height_mm);
        assert!((left - right).abs() < 0.01, "left {left} right {right}");
        assert!((top - bottom).abs() < 0.01, "top {top} bottom {bottom}");
    }
}

#[tokio::test]
async fn raster_scale_follows_config() {
    let mut config = offline_config("scale");
    config.scale_factor = 2.0;
    let (_, layout) = generate_labels_with_layout(&shipment(1, "AWB0001"), &config)
        .await
        .unwrap();
    assert_eq!(
        layout.labels[0].pixel_width,
        (DEFAULT_CARD_WIDTH_PX * 2.0).round() as u32
    );
}

#[tokio::test]
async fn no_surface_outlives_generation() {
    let _ = layout_for(3, "surfaces").await;
    assert_eq!(live_surfaces(), 0);
}

#[tokio::test]
async fn layout_json_round_trip() {
    let layout = layout_for(5, "json").await;
    let restored = SheetLayout::from_json(&layout.to_json()).unwrap();
    assert_eq!(restored.pages.len(), 2);
    assert_eq!(restored.pages[1].placements, layout.pages[1].placements);
    assert!(restored.labels.is_empty());
}

// =====================================================================
// Failure and degradation
// =====================================================================

#[tokio::test]
async fn empty_shipment_produces_nothing() {
    let result = generate_labels(&shipment(0, "AWB0001"), &offline_config("empty")).await;
    assert!(matches!(result, Err(LabelError::EmptyShipment)));
}

#[tokio::test]
async fn barcode_failure_still_yields_all_pages() {
    let data = shipment(5, "AWB☃");
    let config = offline_config("degrade");

    let (doc, layout) = generate_labels_with_layout(&data, &config).await.unwrap();
    assert_valid_pdf(&doc.bytes);
    assert_eq!(layout.pages.len(), 2);

    let assets = resolve_assets(data.awb(), &config.assets).await.unwrap();
    assert!(assets.barcode.is_none());
    let label = render_label(&data.boxes[0], 0, 5, &data, &assets, DEFAULT_CARD_WIDTH_PX).unwrap();
    // Logo and QR only.
    assert_eq!(label.root.image_sources().len(), 2);
}

#[tokio::test]
async fn missing_logo_aborts() {
    let mut config = offline_config("no-logo");
    config.assets.logo_path = PathBuf::from("/nonexistent/labelsheet/logo.png");
    let result = generate_labels(&shipment(2, "AWB0001"), &config).await;
    assert!(matches!(result, Err(LabelError::AssetFetch(_))));
}

// =====================================================================
// Shared assets
// =====================================================================

#[tokio::test]
async fn first_and_last_label_share_identical_images() {
    let data = shipment(6, "AWB0042");
    let config = offline_config("identity");
    let assets = resolve_assets(data.awb(), &config.assets).await.unwrap();

    let first = render_label(&data.boxes[0], 0, 6, &data, &assets, DEFAULT_CARD_WIDTH_PX).unwrap();
    let last = render_label(&data.boxes[5], 5, 6, &data, &assets, DEFAULT_CARD_WIDTH_PX).unwrap();

    let first_hashes = image_hashes(&first.root.image_sources());
    let last_hashes = image_hashes(&last.root.image_sources());
    assert_eq!(first_hashes.len(), 3);
    assert_eq!(first_hashes, last_hashes);
}

// =====================================================================
// Remote QR
// =====================================================================

#[tokio::test]
async fn remote_qr_is_fetched_with_size_and_awb() {
    let png = render_qr_png("AWB1", 150).unwrap();
    let (endpoint, server) = serve_once("200 OK", png.clone()).await;

    let mut config = offline_config("remote-ok");
    config.assets.qr_source = QrSource::Remote { endpoint };
    let assets = resolve_assets("AWB1", &config.assets).await.unwrap();

    let request_line = server.await.unwrap();
    assert!(request_line.starts_with("GET /v1/create-qr-code/?"), "{request_line}");
    assert!(request_line.contains("size=150x150"), "{request_line}");
    assert!(request_line.contains("data=AWB1"), "{request_line}");
    assert_eq!(parse_data_uri(assets.qr_code.data_uri()).unwrap(), png);
}

#[tokio::test]
async fn remote_qr_server_error_aborts() {
    let (endpoint, server) = serve_once("500 Internal Server Error", Vec::new()).await;

    let mut config = offline_config("remote-500");
    config.assets.qr_source = QrSource::Remote { endpoint };
    let result = generate_labels(&shipment(2, "AWB1"), &config).await;

    assert!(matches!(result, Err(LabelError::AssetFetch(_))));
    server.await.unwrap();
}

// =====================================================================
// Naming and text
// =====================================================================

#[tokio::test]
async fn file_name_follows_reference() {
    let config = offline_config("names");

    let doc = generate_labels(&shipment(1, "AWB0001"), &config).await.unwrap();
    assert_eq!(doc.file_name, "labels_REF123.pdf");

    let mut anonymous = shipment(1, "AWB0001");
    anonymous.shipment_reference_id = None;
    let doc = generate_labels(&anonymous, &config).await.unwrap();
    assert_eq!(doc.file_name, "labels_shipment.pdf");

    anonymous.shipment_reference_id = Some(String::new());
    let doc = generate_labels(&anonymous, &config).await.unwrap();
    assert_eq!(doc.file_name, "labels_shipment.pdf");
}

#[test]
fn weight_has_three_decimals() {
    assert_eq!(format_weight(Some(1.2)), "1.200");
    assert_eq!(format_weight(Some(0.0)), "0.000");
    assert_eq!(format_weight(None), "0.000");
}

#[tokio::test]
async fn sparse_shipment_never_prints_placeholders() {
    let data = ShipmentLabelData {
        boxes: vec![ParcelBox::default()],
        ..ShipmentLabelData::default()
    };
    let config = offline_config("sparse");
    let assets = resolve_assets(data.awb(), &config.assets).await.unwrap();
    let label = render_label(&data.boxes[0], 0, 1, &data, &assets, DEFAULT_CARD_WIDTH_PX).unwrap();

    let lines = label.root.text_lines();
    assert!(lines.iter().any(|l| l.contains("0.000")));
    assert!(lines.iter().any(|l| l.contains("1/1")));
    for line in lines {
        assert!(!line.contains("undefined"), "{line}");
        assert!(!line.contains("null"), "{line}");
    }
}

#[test]
fn portal_json_is_accepted() {
    let json = r#"{
        "shipmentReferenceId": "R-77",
        "shipmentAwb": 123456,
        "consignee": {"name": "A", "address": "B", "city": "C", "country": "D", "pin": 560001},
        "shipper": {"name": "E", "address": "F"},
        "boxes": [{"weightKg": "2.5", "lengthCm": 10}]
    }"#;
    let data = ShipmentLabelData::from_json(json).unwrap();
    data.validate().unwrap();
    assert_eq!(data.awb(), "123456");
    assert_eq!(data.consignee.pin.as_deref(), Some("560001"));
    assert_eq!(data.boxes[0].weight_kg, Some(2.5));

    let missing = ShipmentLabelData::from_json(r#"{"boxes": []}"#).unwrap();
    assert!(matches!(missing.validate(), Err(LabelError::InvalidInput(_))));
}
