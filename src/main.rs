//! labelsheet – command-line shipping label generator.
//!
//! Usage:
//!   labelsheet <shipment.json> [output_dir] [--logo PATH]
//!              [--qr-endpoint URL | --local-qr] [--scale N] [--title T]
//!              [--landscape] [--layout-json PATH]
//!
//! The PDF is written to `output_dir` (default: the current directory) as
//! `labels_{shipmentReferenceId}.pdf`.

use std::{env, fs, path::PathBuf, process};

use labelsheet::assets::QrSource;
use labelsheet::compositor::{PageOrientation, SheetGeometry};
use labelsheet::pipeline::{generate_labels_with_layout, PipelineConfig};
use labelsheet::shipment::ShipmentLabelData;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut input_path: Option<PathBuf> = None;
    let mut output_dir: Option<PathBuf> = None;
    let mut layout_json: Option<PathBuf> = None;
    let mut config = PipelineConfig::default();
    let mut landscape = false;
    let mut positional = 0usize;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--landscape" | "-l" => landscape = true,
            "--local-qr" => config.assets.qr_source = QrSource::Local,
            "--title" | "-t" => config.title = Some(flag_value(&mut iter, arg, &args[0])),
            "--logo" => config.assets.logo_path = PathBuf::from(flag_value(&mut iter, arg, &args[0])),
            "--qr-endpoint" => {
                config.assets.qr_source = QrSource::Remote {
                    endpoint: flag_value(&mut iter, arg, &args[0]),
                }
            }
            "--scale" => {
                let value = flag_value(&mut iter, arg, &args[0]);
                match value.parse::<f32>() {
                    Ok(s) if s.is_finite() && s > 0.0 => config.scale_factor = s,
                    _ => {
                        eprintln!("Invalid --scale value: {value}");
                        process::exit(1);
                    }
                }
            }
            "--layout-json" => {
                layout_json = Some(PathBuf::from(flag_value(&mut iter, arg, &args[0])))
            }
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if positional == 0 {
                    input_path = Some(PathBuf::from(path));
                } else if positional == 1 {
                    output_dir = Some(PathBuf::from(path));
                } else {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                positional += 1;
            }
        }
    }

    let input = match input_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no shipment file specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };
    let output_dir = output_dir.unwrap_or_else(|| PathBuf::from("."));

    if landscape {
        config.geometry = SheetGeometry {
            orientation: PageOrientation::Landscape,
            ..config.geometry
        };
    }

    let json = match fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", input.display());
            process::exit(1);
        }
    };

    let data = match ShipmentLabelData::from_json(&json).and_then(|d| d.validate().map(|_| d)) {
        Ok(d) => d,
        Err(e) => fail(e),
    };

    let (doc, layout) = match generate_labels_with_layout(&data, &config).await {
        Ok(result) => result,
        Err(e) => fail(e),
    };

    if let Err(e) = fs::create_dir_all(&output_dir) {
        eprintln!("Error creating output directory: {e}");
        process::exit(1);
    }
    let output = output_dir.join(&doc.file_name);
    if let Err(e) = fs::write(&output, &doc.bytes) {
        eprintln!("Error writing '{}': {e}", output.display());
        process::exit(1);
    }

    if let Some(path) = layout_json {
        if let Err(e) = fs::write(&path, layout.to_json()) {
            eprintln!("Error writing '{}': {e}", path.display());
            process::exit(1);
        }
    }

    let labels = layout.placement_count();
    eprintln!(
        "Wrote '{}' ({} bytes, {} label{} on {} page{})",
        output.display(),
        doc.bytes.len(),
        labels,
        if labels == 1 { "" } else { "s" },
        doc.page_count,
        if doc.page_count == 1 { "" } else { "s" }
    );
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str, prog: &str) -> String {
    match iter.next() {
        Some(v) => v.clone(),
        None => {
            eprintln!("Missing value for {flag}");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn fail(e: labelsheet::LabelError) -> ! {
    log::error!("{e:?}");
    eprintln!("Failed to generate label PDF: {e}");
    process::exit(1);
}

fn print_usage(prog: &str) {
    eprintln!("labelsheet – shipping label sheet generator");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <shipment.json> [output_dir] [flags]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <shipment.json>     Shipment payload (camelCase JSON)");
    eprintln!("  [output_dir]        Directory for labels_<reference>.pdf (default: .)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --logo PATH         Header logo, PNG or JPEG (default: assets/logo.png)");
    eprintln!("  --qr-endpoint URL   QR rendering service (default: api.qrserver.com)");
    eprintln!("  --local-qr          Render the QR code locally, no network");
    eprintln!("  --scale N           Raster scale factor (default: 2)");
    eprintln!("  --title, -t T       Document title in PDF metadata");
    eprintln!("  --landscape, -l     Landscape A4 pages");
    eprintln!("  --layout-json PATH  Also write the sheet layout as JSON");
    eprintln!("  --help              Print this message");
}
