//! FFI bindings for Formsense
//!
//! This module provides C-compatible functions for embedding a tracker in a
//! non-Rust host (a webview shell, a browser binding). All functions use C strings
//! (null-terminated UTF-8) and return allocated memory that must be freed by the
//! caller using `formsense_free_string`.
//!
//! Events are passed as script steps, the same JSON the `script` module replays:
//! `{"kind": "field", "control": 0, "event": {"type": "focus"}}`. A step without
//! `at` is stamped with the current time.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::field::content_hash;
use crate::script::{PageFixture, Replay, ScriptStep};
use crate::session::SESSION_COOKIE;
use crate::transport::{Delivery, HttpTransport, OfflineTransport, Transport};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn deliveries_to_json(deliveries: &[Delivery]) -> String {
    serde_json::Value::Array(deliveries.iter().map(Delivery::to_json).collect()).to_string()
}

// ============================================================================
// Tracker API
// ============================================================================

/// Opaque handle to a running tracker
pub struct FormsenseTrackerHandle {
    replay: Replay,
}

fn new_handle(
    config_json: &str,
    page_json: &str,
    transport: impl FnOnce(&TrackerConfig) -> Result<Box<dyn Transport>, TrackerError>,
) -> Result<FormsenseTrackerHandle, TrackerError> {
    let config = TrackerConfig::from_json(config_json)?;
    let fixture = PageFixture::from_json(page_json)?;
    let transport = transport(&config)?;
    let replay = Replay::new(config, &fixture, transport, SystemClock.now_ms())?;
    Ok(FormsenseTrackerHandle { replay })
}

unsafe fn create(
    config_json: *const c_char,
    page_json: *const c_char,
    transport: impl FnOnce(&TrackerConfig) -> Result<Box<dyn Transport>, TrackerError>,
) -> *mut FormsenseTrackerHandle {
    let config_str = match cstr_to_string(config_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    let page_str = match cstr_to_string(page_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid page string pointer");
            return ptr::null_mut();
        }
    };

    match new_handle(&config_str, &page_str, transport) {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Create a tracker that posts to the configured collector.
///
/// The session is resolved before this returns; when the page carries no
/// session cookie this makes a blocking open-session request.
///
/// # Safety
/// - `config_json` and `page_json` must be valid null-terminated C strings.
/// - Returns a pointer that must be freed with `formsense_tracker_free`.
/// - Returns NULL on error; call `formsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn formsense_tracker_new(
    config_json: *const c_char,
    page_json: *const c_char,
) -> *mut FormsenseTrackerHandle {
    clear_last_error();
    create(config_json, page_json, |config| {
        Ok(Box::new(HttpTransport::new(config)?) as Box<dyn Transport>)
    })
}

/// Create a tracker whose sends are answered in-process (dry run).
///
/// # Safety
/// - `config_json` and `page_json` must be valid null-terminated C strings.
/// - Returns a pointer that must be freed with `formsense_tracker_free`.
/// - Returns NULL on error; call `formsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn formsense_tracker_new_offline(
    config_json: *const c_char,
    page_json: *const c_char,
) -> *mut FormsenseTrackerHandle {
    clear_last_error();
    create(config_json, page_json, |_| {
        Ok(Box::new(OfflineTransport::new()) as Box<dyn Transport>)
    })
}

/// Free a tracker.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `formsense_tracker_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn formsense_tracker_free(tracker: *mut FormsenseTrackerHandle) {
    if !tracker.is_null() {
        drop(Box::from_raw(tracker));
    }
}

/// Feed one script step and pump. Returns a JSON array of delivery reports.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `formsense_tracker_new`.
/// - `step_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `formsense_free_string`.
/// - Returns NULL on error; call `formsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn formsense_tracker_dispatch(
    tracker: *mut FormsenseTrackerHandle,
    step_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }

    let handle = &mut *tracker;

    let step_str = match cstr_to_string(step_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid step string pointer");
            return ptr::null_mut();
        }
    };

    let mut step: ScriptStep = match serde_json::from_str(&step_str) {
        Ok(step) => step,
        Err(e) => {
            set_last_error(&TrackerError::ScriptError(e.to_string()).to_string());
            return ptr::null_mut();
        }
    };
    if step.at.is_none() {
        step.at = Some(SystemClock.now_ms());
    }

    match handle.replay.step(&step) {
        Ok(deliveries) => string_to_cstr(&deliveries_to_json(&deliveries)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Deliver queued sends. Returns a JSON array of delivery reports.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `formsense_tracker_new`.
/// - Returns a newly allocated string that must be freed with `formsense_free_string`.
/// - Returns NULL on error; call `formsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn formsense_tracker_pump(tracker: *mut FormsenseTrackerHandle) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }

    let handle = &mut *tracker;
    let deliveries = handle.replay.tracker_mut().pump();
    string_to_cstr(&deliveries_to_json(&deliveries))
}

/// The session cookie pair (`trackSessionId=<id>`) the host should persist.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `formsense_tracker_new`.
/// - Returns a newly allocated string that must be freed with `formsense_free_string`.
/// - Returns NULL when no session was established (the last error stays empty).
#[no_mangle]
pub unsafe extern "C" fn formsense_tracker_session_cookie(tracker: *const FormsenseTrackerHandle) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }

    let handle = &*tracker;
    match handle.replay.tracker().session_id() {
        Some(id) => string_to_cstr(&format!("{}={}", SESSION_COOKIE, id)),
        None => ptr::null_mut(),
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Hash a field value the way records carry it (SHA-1 of the trimmed, lowercased value).
///
/// # Safety
/// - `value` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `formsense_free_string`.
/// - Returns NULL on error; call `formsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn formsense_hash_value(value: *const c_char) -> *mut c_char {
    clear_last_error();

    match cstr_to_string(value) {
        Some(s) => string_to_cstr(&content_hash(&s)),
        None => {
            set_last_error("Invalid value string pointer");
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Formsense functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Formsense function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn formsense_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Formsense function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn formsense_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Formsense library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn formsense_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn config_json() -> CString {
        CString::new(r#"{"pixel_id": "px-1", "api_host": "collect.example"}"#).unwrap()
    }

    fn page_json(cookie: &str) -> CString {
        CString::new(format!(
            r#"{{
                "location": "https://shop.example/signup",
                "cookie": "{}",
                "form": {{"controls": [
                    {{"tag": "input", "type": "email"}},
                    {{"tag": "button", "type": "submit"}}
                ]}}
            }}"#,
            cookie
        ))
        .unwrap()
    }

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        formsense_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_offline_lifecycle() {
        let config = config_json();
        let page = page_json("");

        unsafe {
            let tracker = formsense_tracker_new_offline(config.as_ptr(), page.as_ptr());
            assert!(!tracker.is_null());

            let cookie = take_string(formsense_tracker_session_cookie(tracker));
            assert!(cookie.starts_with("trackSessionId="));

            let focus = CString::new(r#"{"kind": "field", "at": 10, "control": 0, "event": {"type": "focus"}}"#).unwrap();
            let reports = take_string(formsense_tracker_dispatch(tracker, focus.as_ptr()));
            assert_eq!(reports, "[]");

            let blur = CString::new(
                r#"{"kind": "field", "at": 40, "control": 0, "event": {"type": "blur"}, "update": {"value": "a@b.c"}}"#,
            )
            .unwrap();
            let reports = take_string(formsense_tracker_dispatch(tracker, blur.as_ptr()));
            let reports: serde_json::Value = serde_json::from_str(&reports).unwrap();
            assert_eq!(reports.as_array().unwrap().len(), 1);
            assert_eq!(reports[0]["ok"], true);
            assert_eq!(reports[0]["path"], "collect-event/");

            let pumped = take_string(formsense_tracker_pump(tracker));
            assert_eq!(pumped, "[]");

            formsense_tracker_free(tracker);
        }
    }

    #[test]
    fn test_ffi_cookie_avoids_open_session() {
        let config = config_json();
        let page = page_json("trackSessionId=known");

        unsafe {
            // the session comes from the cookie, so nothing reaches the network
            let tracker = formsense_tracker_new(config.as_ptr(), page.as_ptr());
            assert!(!tracker.is_null());

            let cookie = take_string(formsense_tracker_session_cookie(tracker));
            assert_eq!(cookie, "trackSessionId=known");

            formsense_tracker_free(tracker);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        let config = CString::new("not json").unwrap();
        let page = page_json("");

        unsafe {
            let tracker = formsense_tracker_new_offline(config.as_ptr(), page.as_ptr());
            assert!(tracker.is_null());

            let error = formsense_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.starts_with("Invalid JSON"));

            let config = config_json();
            let tracker = formsense_tracker_new_offline(config.as_ptr(), page.as_ptr());
            let bad_step = CString::new(r#"{"kind": "field", "control": 5, "event": {"type": "focus"}}"#).unwrap();
            assert!(formsense_tracker_dispatch(tracker, bad_step.as_ptr()).is_null());
            let error_str = CStr::from_ptr(formsense_last_error()).to_str().unwrap();
            assert_eq!(error_str, "Unknown control: 5");

            assert!(formsense_tracker_dispatch(ptr::null_mut(), bad_step.as_ptr()).is_null());
            formsense_tracker_free(tracker);
        }
    }

    #[test]
    fn test_ffi_hash_value() {
        let value = CString::new("  Hello ").unwrap();
        unsafe {
            let hash = take_string(formsense_hash_value(value.as_ptr()));
            assert_eq!(hash, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = formsense_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
