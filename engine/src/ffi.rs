//! FFI layer for widget and app hosts.
//!
//! This module provides C-compatible functions so a host process (for example
//! a widget extension) can run the exact same derivation and resolution code
//! as the interactive surface. All data crosses the boundary as JSON strings.
//!
//! # Memory Management
//!
//! - Strings returned by `taskdeck_*` functions are allocated by Rust
//! - Caller must free them with `taskdeck_string_free`
//!
//! # Error Handling
//!
//! Functions return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>"}` on failure

use crate::{
    derive, kv::keys, resolve, MemoryStore, Preferences, Record, RefreshPolicy, Resolution,
    WidgetContext,
};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::{c_char, CStr, CString};

/// Result wrapper for FFI responses.
#[derive(serde::Serialize)]
#[serde(untagged)]
enum FfiResult<T: serde::Serialize> {
    Ok { ok: T },
    Err { error: String },
}

impl<T: serde::Serialize> FfiResult<T> {
    fn ok(value: T) -> Self {
        FfiResult::Ok { ok: value }
    }

    fn err(message: impl Into<String>) -> Self {
        FfiResult::Err {
            error: message.into(),
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}

/// Convert a Rust string to a C string pointer.
/// Caller must free with `taskdeck_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => {
            // String contained null bytes - return error JSON
            let error = CString::new(r#"{"error":"string contained null bytes"}"#).unwrap();
            error.into_raw()
        }
    }
}

/// Convert a C string pointer to a Rust string.
/// Returns None if pointer is null or invalid UTF-8.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a valid pointer from a `taskdeck_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn taskdeck_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// View Engine
// ============================================================================

/// Derive the filtered, sorted view of a record list.
///
/// # Arguments
/// - `records_json`: JSON array of Record
/// - `prefs_json`: JSON Preferences, or null for defaults
///
/// # Returns
/// JSON string: `{"ok": DerivedView}` or `{"error": "message"}`
///
/// # Safety
/// - `records_json` and `prefs_json` must be valid null-terminated C strings or null
/// - Caller must free the returned string with `taskdeck_string_free`
#[no_mangle]
pub unsafe extern "C" fn taskdeck_view_derive(
    records_json: *const c_char,
    prefs_json: *const c_char,
) -> *mut c_char {
    let records_str = match from_c_string(records_json) {
        Some(s) => s,
        None => return to_c_string(FfiResult::<()>::err("invalid records JSON").to_json()),
    };

    let records: Vec<Record> = match serde_json::from_str(&records_str) {
        Ok(r) => r,
        Err(e) => {
            return to_c_string(FfiResult::<()>::err(format!("parse error: {}", e)).to_json())
        }
    };

    let prefs = match from_c_string(prefs_json) {
        Some(s) => match serde_json::from_str::<Preferences>(&s) {
            Ok(p) => p,
            Err(e) => {
                return to_c_string(
                    FfiResult::<()>::err(format!("preferences parse error: {}", e)).to_json(),
                )
            }
        },
        None => Preferences::default(),
    };

    to_c_string(FfiResult::ok(derive(&records, &prefs)).to_json())
}

// ============================================================================
// Resolution
// ============================================================================

/// Snapshot of the store entries a host read on the widget's behalf.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest {
    /// Explicit context; loaded from `shared` when absent
    #[serde(default)]
    context: Option<WidgetContext>,
    /// Cross-process store entries, values as stored (UTF-8 JSON)
    #[serde(default)]
    shared: BTreeMap<String, String>,
    /// Fallback store entries
    #[serde(default)]
    fallback: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveResponse {
    resolution: Resolution,
    /// Seconds since the epoch
    next_refresh_at: i64,
}

/// Run widget resolution over host-provided store entries.
///
/// # Arguments
/// - `request_json`: `{"context"?: WidgetContext, "shared": {key: value}, "fallback": {key: value}}`
/// - `now_secs`: current time, seconds since the epoch
///
/// # Returns
/// JSON string: `{"ok": {"resolution": Resolution, "nextRefreshAt": secs}}` or `{"error": "message"}`
///
/// # Safety
/// - `request_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `taskdeck_string_free`
#[no_mangle]
pub unsafe extern "C" fn taskdeck_resolve(request_json: *const c_char, now_secs: i64) -> *mut c_char {
    let request: ResolveRequest = match from_c_string(request_json) {
        Some(s) => match serde_json::from_str(&s) {
            Ok(r) => r,
            Err(e) => {
                return to_c_string(FfiResult::<()>::err(format!("parse error: {}", e)).to_json())
            }
        },
        None => ResolveRequest::default(),
    };

    let now = match Utc.timestamp_opt(now_secs, 0).single() {
        Some(t) => t,
        None => return to_c_string(FfiResult::<()>::err("invalid timestamp").to_json()),
    };

    let shared = MemoryStore::from_entries(request.shared);
    let fallback = MemoryStore::from_entries(request.fallback);
    let context = request
        .context
        .unwrap_or_else(|| WidgetContext::load(&shared));

    let resolution = resolve(&context, &shared, &fallback);
    let next_refresh_at = RefreshPolicy::default()
        .next_refresh_at(resolution.state, now)
        .timestamp();

    to_c_string(
        FfiResult::ok(ResolveResponse {
            resolution,
            next_refresh_at,
        })
        .to_json(),
    )
}

/// Collection-scoped cache key for a remote collection id.
///
/// # Safety
/// - `remote_id` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `taskdeck_string_free`
#[no_mangle]
pub unsafe extern "C" fn taskdeck_cache_key(remote_id: *const c_char) -> *mut c_char {
    match from_c_string(remote_id) {
        Some(id) => to_c_string(FfiResult::ok(keys::cache_items(&id)).to_json()),
        None => to_c_string(FfiResult::<()>::err("invalid collection id").to_json()),
    }
}

// ============================================================================
// Utility
// ============================================================================

/// Get the engine version.
///
/// # Returns
/// Static string pointer (do not free)
#[no_mangle]
pub extern "C" fn taskdeck_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

/// Get the cached view format version.
#[no_mangle]
pub extern "C" fn taskdeck_cache_format_version() -> u32 {
    crate::CACHE_FORMAT_VERSION
}
