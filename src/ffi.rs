//! C-compatible FFI API for cross-language bindings.
//!
//! # ABI Contract
//!
//! All exported functions use `extern "C"` calling convention and `#[no_mangle]`
//! to ensure stable symbol names.
//!
//! ## Memory management
//! - Buffers and strings returned by `lsheet_*` functions are allocated on
//!   the Rust heap.
//! - Callers **must** free them with `lsheet_free_buffer` / `lsheet_free_string`.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int` (0 = success, non-zero = error).
//! - Error details can be retrieved via `lsheet_last_error`.
//!
//! | code | meaning                                   |
//! |------|-------------------------------------------|
//! | 1    | null pointer argument                     |
//! | 2    | input is not valid UTF-8                  |
//! | 3    | malformed shipment JSON                   |
//! | 4    | shipment has no boxes                     |
//! | 5    | logo or QR code could not be fetched      |
//! | 6    | rendering, rasterization or PDF failure   |
//! | 7    | async runtime could not be started        |
//!
//! ## Threading
//! Each call drives its own current-thread tokio runtime, so the functions
//! must not be called from inside a running tokio runtime. `lsheet_last_error`
//! is thread-local.
//!
//! ## Usage from Go (cgo)
//! ```go
//! // #cgo LDFLAGS: -llabelsheet
//! // #include "labelsheet.h"
//! import "C"
//! ```

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::ptr;
use std::slice;

use crate::assets::QrSource;
use crate::compositor::{PageOrientation, SheetGeometry};
use crate::error::LabelError;
use crate::pipeline::{compute_sheet_layout, generate_labels, PipelineConfig};
use crate::shipment::ShipmentLabelData;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg.replace('\0', " ")).ok();
    });
}

fn error_code(err: &LabelError) -> c_int {
    match err {
        LabelError::InvalidInput(_) => 3,
        LabelError::EmptyShipment => 4,
        LabelError::AssetFetch(_) | LabelError::Io(_) => 5,
        LabelError::BarcodeGeneration(_)
        | LabelError::Rasterization(_)
        | LabelError::Template(_)
        | LabelError::Emit(_) => 6,
    }
}

fn fail(err: LabelError) -> c_int {
    set_last_error(&err.to_string());
    error_code(&err)
}

// ---------------------------------------------------------------------------
// C-compatible configuration types
// ---------------------------------------------------------------------------

/// Page orientation for use in [`LsheetConfig`].
#[repr(C)]
pub enum LsheetPageOrientation {
    /// Portrait A4 (default).
    Portrait = 0,
    /// Landscape A4.
    Landscape = 1,
}

/// Optional configuration passed to the generation functions.
///
/// `NULL` strings and `0` numbers fall back to the library defaults.
#[repr(C)]
pub struct LsheetConfig {
    /// Null-terminated UTF-8 PDF title. `NULL` → "Shipping labels {reference}".
    pub title: *const c_char,
    /// Null-terminated path to the header logo. `NULL` → `assets/logo.png`.
    pub logo_path: *const c_char,
    /// Null-terminated QR service URL. `NULL` → the public default endpoint.
    pub qr_endpoint: *const c_char,
    /// Non-zero renders the QR code locally; `qr_endpoint` is then ignored.
    pub local_qr: c_int,
    /// Raster scale factor. `0.0` → 2.0.
    pub scale_factor: f32,
    pub orientation: LsheetPageOrientation,
}

/// Read an optional C string.
///
/// # Safety
/// `s`, if non-null, must point to a valid null-terminated string.
unsafe fn opt_string(s: *const c_char, field: &str) -> Result<Option<String>, c_int> {
    if s.is_null() {
        return Ok(None);
    }
    match CStr::from_ptr(s).to_str() {
        Ok(v) => Ok(Some(v.to_string())),
        Err(e) => {
            set_last_error(&format!("Invalid UTF-8 in {field}: {e}"));
            Err(2)
        }
    }
}

/// Convert an `LsheetConfig` (FFI) to a `PipelineConfig` (Rust).
///
/// # Safety
/// Every non-null string field must point to a valid null-terminated string.
unsafe fn pipeline_config_from_c(cfg: &LsheetConfig) -> Result<PipelineConfig, c_int> {
    let mut config = PipelineConfig {
        title: opt_string(cfg.title, "title")?,
        ..PipelineConfig::default()
    };

    if let Some(path) = opt_string(cfg.logo_path, "logo_path")? {
        config.assets.logo_path = PathBuf::from(path);
    }
    if cfg.local_qr != 0 {
        config.assets.qr_source = QrSource::Local;
    } else if let Some(endpoint) = opt_string(cfg.qr_endpoint, "qr_endpoint")? {
        config.assets.qr_source = QrSource::Remote { endpoint };
    }
    if cfg.scale_factor.is_finite() && cfg.scale_factor > 0.0 {
        config.scale_factor = cfg.scale_factor;
    }
    config.geometry = SheetGeometry {
        orientation: match cfg.orientation {
            LsheetPageOrientation::Portrait => PageOrientation::Portrait,
            LsheetPageOrientation::Landscape => PageOrientation::Landscape,
        },
        ..config.geometry
    };
    Ok(config)
}

/// Shared prologue: parse the shipment and the optional config.
///
/// # Safety
/// `json_ptr` must point to `json_len` valid bytes; `cfg` must be null or valid.
unsafe fn prepare(
    json_ptr: *const u8,
    json_len: u32,
    cfg: *const LsheetConfig,
) -> Result<(ShipmentLabelData, PipelineConfig), c_int> {
    let bytes = slice::from_raw_parts(json_ptr, json_len as usize);
    let json = match std::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            set_last_error(&format!("Invalid UTF-8: {e}"));
            return Err(2);
        }
    };
    let data = ShipmentLabelData::from_json(json).map_err(fail)?;
    let config = if cfg.is_null() {
        PipelineConfig::default()
    } else {
        pipeline_config_from_c(&*cfg)?
    };
    Ok((data, config))
}

fn runtime() -> Result<tokio::runtime::Runtime, c_int> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            set_last_error(&format!("Cannot start async runtime: {e}"));
            7
        })
}

fn into_c_string(s: String) -> *mut c_char {
    CString::new(s).map_or(ptr::null_mut(), CString::into_raw)
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Generate the label PDF for a shipment.
///
/// # Parameters
/// - `json_ptr`, `json_len`: UTF-8 shipment JSON (not necessarily null-terminated)
/// - `cfg`: optional pointer to an [`LsheetConfig`]; pass `NULL` for defaults
/// - `out_buf`, `out_len`: on success, the PDF bytes (free with `lsheet_free_buffer`)
/// - `out_file_name`: optional; on success receives `labels_{reference}.pdf`
///   (free with `lsheet_free_string`)
///
/// # Returns
/// `0` on success, non-zero on error. On error, call `lsheet_last_error`.
///
/// # Safety
/// - `json_ptr` must point to `json_len` valid bytes.
/// - `cfg`, if non-null, must point to a fully initialised [`LsheetConfig`].
/// - `out_buf` and `out_len` must be valid pointers; `out_file_name` may be null.
#[no_mangle]
pub unsafe extern "C" fn lsheet_generate_labels(
    json_ptr: *const u8,
    json_len: u32,
    cfg: *const LsheetConfig,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
    out_file_name: *mut *mut c_char,
) -> c_int {
    if json_ptr.is_null() || out_buf.is_null() || out_len.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }

    let (data, config) = match prepare(json_ptr, json_len, cfg) {
        Ok(v) => v,
        Err(code) => return code,
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };

    match rt.block_on(generate_labels(&data, &config)) {
        Ok(doc) => {
            let len = doc.bytes.len() as u32;
            let buf = doc.bytes.into_boxed_slice();
            *out_buf = Box::into_raw(buf) as *mut u8;
            *out_len = len;
            if !out_file_name.is_null() {
                *out_file_name = into_c_string(doc.file_name);
            }
            0
        }
        Err(e) => fail(e),
    }
}

/// Compute only the sheet layout (no PDF). Returns JSON.
///
/// Assets are still resolved and every label rasterized, since placement
/// depends on the raster sizes.
///
/// # Safety
/// Same as `lsheet_generate_labels`. `*out_json_ptr` must be freed with
/// `lsheet_free_string`.
#[no_mangle]
pub unsafe extern "C" fn lsheet_compute_layout(
    json_ptr: *const u8,
    json_len: u32,
    cfg: *const LsheetConfig,
    out_json_ptr: *mut *mut c_char,
) -> c_int {
    if json_ptr.is_null() || out_json_ptr.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }

    let (data, config) = match prepare(json_ptr, json_len, cfg) {
        Ok(v) => v,
        Err(code) => return code,
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };

    match rt.block_on(compute_sheet_layout(&data, &config)) {
        Ok(layout) => match CString::new(layout.to_json()) {
            Ok(cs) => {
                *out_json_ptr = cs.into_raw();
                0
            }
            Err(_) => {
                set_last_error("JSON contained null byte");
                6
            }
        },
        Err(e) => fail(e),
    }
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a PDF buffer returned by `lsheet_generate_labels`.
///
/// # Safety
/// `buf` must have been returned by `lsheet_generate_labels`, and `len` must
/// be the corresponding length.
#[no_mangle]
pub unsafe extern "C" fn lsheet_free_buffer(buf: *mut u8, len: u32) {
    if !buf.is_null() {
        let _ = Box::from_raw(slice::from_raw_parts_mut(buf, len as usize));
    }
}

/// Free a file name or layout JSON string.
///
/// # Safety
/// `s` must have been returned by an `lsheet_*` function that documents
/// `lsheet_free_string` as its deallocator.
#[no_mangle]
pub unsafe extern "C" fn lsheet_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// Retrieve the last error message of this thread, or null.
///
/// The pointer stays valid until the next failing `lsheet_*` call on the same
/// thread. Do **not** free it.
#[no_mangle]
pub extern "C" fn lsheet_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(cs) => cs.as_ptr(),
        None => ptr::null(),
    })
}

/// Library version as a static null-terminated string. Do **not** free it.
#[no_mangle]
pub extern "C" fn lsheet_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}
