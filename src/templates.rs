//! Label template – one parcel of a shipment as a laid-out label card.
//!
//! The card is written in the crate's HTML subset, then parsed, styled and
//! laid out at a fixed width. Rendering is pure: all images come from
//! [`ResolvedAssets`] as data URIs.

use crate::assets::ResolvedAssets;
use crate::dom::{body_children, escape_html, parse_html};
use crate::error::Result;
use crate::fonts::FontManager;
use crate::layout::layout_card;
use crate::layout_config::LayoutBox;
use crate::shipment::{display_text, ParcelBox, ShipmentLabelData};
use crate::style::build_styled_tree;

/// Natural label width in CSS pixels.
pub const DEFAULT_CARD_WIDTH_PX: f32 = 384.0;

/// A laid-out label, before rasterization.
#[derive(Debug, Clone)]
pub struct RenderedLabel {
    pub root: LayoutBox,
    pub width: f32,
    pub height: f32,
}

/// Render the label for box `index` of `total`.
pub fn render_label(
    parcel: &ParcelBox,
    index: usize,
    total: usize,
    shared: &ShipmentLabelData,
    assets: &ResolvedAssets,
    card_width: f32,
) -> Result<RenderedLabel> {
    let html = label_html(parcel, index, total, shared, assets);
    let dom = body_children(&parse_html(&html));
    let styled = build_styled_tree(&dom, None);
    let root = layout_card(&styled, card_width, &FontManager::default())?;
    Ok(RenderedLabel {
        width: root.width,
        height: root.height,
        root,
    })
}

/// The label card markup for one box.
pub fn label_html(
    parcel: &ParcelBox,
    index: usize,
    total: usize,
    shared: &ShipmentLabelData,
    assets: &ResolvedAssets,
) -> String {
    let consignee = &shared.consignee;
    let shipper = &shared.shipper;

    let barcode = match &assets.barcode {
        Some(img) => format!(
            r#"<img src="{}" style="width: 300px; height: 56px" class="mt-1" />"#,
            img.data_uri()
        ),
        None => String::new(),
    };

    format!(
        r##"
<div class="flex flex-col border-2 bg-white">
    <div class="flex justify-between items-center p-2 border">
        <img src="{logo}" style="height: 36px" />
        <div class="flex flex-col items-end">
            <p class="text-xs font-bold text-right">Ref: {reference}</p>
            <p class="text-xs text-right">Date: {date}</p>
        </div>
    </div>

    <div class="flex">
        <div class="w-1/2 p-2 border">
            <p class="text-2xs font-bold uppercase text-gray-700">Ship to</p>
            <p class="text-sm font-bold">{to_name}</p>
            <p class="text-xs">{to_address}</p>
            <p class="text-xs">{to_locality}</p>
            <p class="text-xs">{to_country}</p>
            <p class="text-xs">Ph: {to_phone}</p>
        </div>
        <div class="w-1/2 p-2 border">
            <p class="text-2xs font-bold uppercase text-gray-700">From</p>
            <p class="text-sm font-bold">{from_name}</p>
            <p class="text-xs">{from_address}</p>
            <p class="text-xs">{from_locality}</p>
            <p class="text-xs">{from_country}</p>
            <p class="text-xs">ID: {from_id}</p>
        </div>
    </div>

    <table class="w-full text-xs">
        <tr>
            <th>Weight (kg)</th>
            <th>Dimensions (cm)</th>
            <th>Piece</th>
        </tr>
        <tr>
            <td>{weight}</td>
            <td>{dimensions}</td>
            <td class="font-bold">{piece}</td>
        </tr>
    </table>

    <div class="flex flex-col items-center p-2">
        <p class="text-2xs">AWB</p>
        <p class="text-lg font-bold">{awb}</p>
        <p class="text-xs">Vendor: {vendor}</p>
        {barcode}
        <img src="{qr}" style="width: 110px; height: 110px" class="mt-2" />
    </div>
</div>
"##,
        logo = assets.logo.data_uri(),
        reference = text(shared.shipment_reference_id.as_deref()),
        date = text(shared.shipment_date.as_deref()),
        to_name = text(consignee.name.as_deref()),
        to_address = multiline(consignee.address.as_deref()),
        to_locality = locality(
            consignee.city.as_deref(),
            consignee.state.as_deref(),
            consignee.pin.as_deref()
        ),
        to_country = text(consignee.country.as_deref()),
        to_phone = text(consignee.phone.as_deref()),
        from_name = text(shipper.name.as_deref()),
        from_address = multiline(shipper.address.as_deref()),
        from_locality = locality(
            shipper.city.as_deref(),
            shipper.state.as_deref(),
            shipper.pin.as_deref()
        ),
        from_country = text(shipper.country.as_deref()),
        from_id = text(shipper.id_number.as_deref()),
        weight = format_weight(parcel.weight_kg),
        dimensions = format_dimensions(parcel),
        piece = piece_counter(index, total),
        awb = text(shared.shipment_awb.as_deref()),
        vendor = text(shared.vendor_name.as_deref()),
        barcode = barcode,
        qr = assets.qr_code.data_uri(),
    )
}

/// Weight in kilograms with exactly three decimals.
pub fn format_weight(weight_kg: Option<f64>) -> String {
    format!("{:.3}", weight_kg.unwrap_or(0.0))
}

/// `L × B × H`, each with at most two decimals.
pub fn format_dimensions(parcel: &ParcelBox) -> String {
    [parcel.length_cm, parcel.breadth_cm, parcel.height_cm]
        .into_iter()
        .map(format_measure)
        .collect::<Vec<_>>()
        .join(" × ")
}

fn format_measure(value: Option<f64>) -> String {
    let formatted = format!("{:.2}", value.unwrap_or(0.0));
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-0" => "0".to_string(),
        t => t.to_string(),
    }
}

/// One-based piece counter, e.g. `2/5`.
pub fn piece_counter(index: usize, total: usize) -> String {
    format!("{}/{}", index + 1, total)
}

fn text(value: Option<&str>) -> String {
    escape_html(display_text(value))
}

/// Escape a multi-line field and turn its line breaks into `<br>`.
fn multiline(value: Option<&str>) -> String {
    display_text(value)
        .lines()
        .map(|line| escape_html(line.trim()))
        .collect::<Vec<_>>()
        .join("<br>")
}

/// `City, State Pin`, skipping whatever is missing.
fn locality(city: Option<&str>, state: Option<&str>, pin: Option<&str>) -> String {
    let place = [city, state]
        .into_iter()
        .map(|v| display_text(v).trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    let pin = display_text(pin).trim();
    let line = match (place.is_empty(), pin.is_empty()) {
        (_, true) => place,
        (true, false) => pin.to_string(),
        (false, false) => format!("{place} {pin}"),
    };
    escape_html(&line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{render_code128, render_qr_png, EmbeddedImage};
    use crate::shipment::Consignee;

    fn assets(with_barcode: bool) -> ResolvedAssets {
        let logo = EmbeddedImage::from_bytes(&render_qr_png("logo", 40).unwrap()).unwrap();
        let qr = EmbeddedImage::from_bytes(&render_qr_png("AWB1", 150).unwrap()).unwrap();
        ResolvedAssets {
            logo,
            qr_code: qr,
            barcode: with_barcode.then(|| render_code128("AWB1").unwrap()),
        }
    }

    fn shipment() -> ShipmentLabelData {
        ShipmentLabelData {
            shipment_reference_id: Some("REF123".into()),
            shipment_awb: Some("AWB1".into()),
            consignee: Consignee {
                name: Some("Asha <Rao>".into()),
                address: Some("12 MG Road\nFlat 4".into()),
                city: Some("Pune".into()),
                pin: Some("411001".into()),
                ..Default::default()
            },
            boxes: vec![ParcelBox::default(); 3],
            ..Default::default()
        }
    }

    #[test]
    fn weight_has_three_decimals() {
        assert_eq!(format_weight(Some(1.2)), "1.200");
        assert_eq!(format_weight(Some(0.0)), "0.000");
        assert_eq!(format_weight(None), "0.000");
    }

    #[test]
    fn dimensions_trim_trailing_zeros() {
        let parcel = ParcelBox {
            weight_kg: None,
            length_cm: Some(10.0),
            breadth_cm: Some(20.5),
            height_cm: Some(7.256),
        };
        assert_eq!(format_dimensions(&parcel), "10 × 20.5 × 7.26");
        assert_eq!(format_dimensions(&ParcelBox::default()), "0 × 0 × 0");
    }

    #[test]
    fn piece_counter_is_one_based() {
        assert_eq!(piece_counter(0, 3), "1/3");
        assert_eq!(piece_counter(2, 3), "3/3");
    }

    #[test]
    fn payload_text_is_escaped_and_breaks_kept() {
        let data = shipment();
        let html = label_html(&data.boxes[0], 0, 3, &data, &assets(true));
        assert!(html.contains("Asha &lt;Rao&gt;"));
        assert!(html.contains("12 MG Road<br>Flat 4"));
        assert!(html.contains("Pune 411001"));
    }

    #[test]
    fn rendered_label_has_expected_lines() {
        let data = shipment();
        let label = render_label(&data.boxes[1], 1, 3, &data, &assets(true), DEFAULT_CARD_WIDTH_PX)
            .unwrap();
        assert_eq!(label.width, DEFAULT_CARD_WIDTH_PX);
        assert!(label.height > 200.0, "height {}", label.height);
        let lines = label.root.text_lines();
        assert!(lines.contains(&"Asha <Rao>"));
        assert!(lines.contains(&"12 MG Road"));
        assert!(lines.contains(&"Flat 4"));
        assert!(lines.contains(&"2/3"));
        assert!(lines.contains(&"SHIP TO"));
        assert!(lines
            .iter()
            .all(|l| !l.contains("undefined") && !l.contains("null")));
        assert_eq!(label.root.image_sources().len(), 3);
    }

    #[test]
    fn missing_barcode_omits_the_slot() {
        let data = shipment();
        let label = render_label(&data.boxes[0], 0, 3, &data, &assets(false), DEFAULT_CARD_WIDTH_PX)
            .unwrap();
        let sources = label.root.image_sources();
        assert_eq!(sources.len(), 2);
    }
}
