use std::ffi::{c_char, CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use once_cell::sync::Lazy;

use crate::config::MergeSettings;
use crate::error::merge_error;
use crate::merge::CommentMerger;
use crate::progress::ConsoleProgress;

static LAST_ERROR: Lazy<Mutex<Option<CString>>> = Lazy::new(|| Mutex::new(None));
static LAST_REPORT: Lazy<Mutex<Option<CString>>> = Lazy::new(|| Mutex::new(None));

fn store(slot: &Mutex<Option<CString>>, msg: Option<&str>) {
    let c = msg.map(|m| CString::new(m.replace('\0', " ")).unwrap_or_default());
    let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
    *guard = c;
}

fn set_last_error(msg: &str) {
    store(&LAST_ERROR, Some(msg));
}

fn load(slot: &Mutex<Option<CString>>) -> *const c_char {
    let guard = slot.lock().unwrap_or_else(|e| e.into_inner());
    match guard.as_ref() {
        Some(s) => s.as_ptr(),
        None => std::ptr::null(),
    }
}

fn take_cstr(ptr: *const c_char, name: &str) -> Result<String, String> {
    if ptr.is_null() {
        return Err(format!("{name} is null"));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(|s| s.to_string())
        .map_err(|_| format!("{name} is not valid UTF-8"))
}

fn run(config: Option<PathBuf>, input: &Path, comments: &Path, output: &Path) -> anyhow::Result<String> {
    let workdir = input.parent().unwrap_or_else(|| Path::new("."));
    let (settings, _) = MergeSettings::resolve(config, workdir)?;
    let docx = std::fs::read(input).with_context(|| format!("read docx: {}", input.display()))?;
    let json = std::fs::read_to_string(comments)
        .with_context(|| format!("read comments json: {}", comments.display()))?;

    let merger = CommentMerger::new(settings, ConsoleProgress::silent());
    let out = merger.merge_json(&docx, &json)?;
    std::fs::write(output, &out.docx)
        .with_context(|| format!("write docx: {}", output.display()))?;
    out.report.to_json()
}

/// Merge comment records from a JSON file into a DOCX file.
///
/// `config_path` may be null to use `docx-comment-merge.toml` discovery. Returns 0 when the
/// output was written (even if some records did not match), 12 when the input docx or records
/// are invalid, 13 for any other failure. See `dcm_last_error_utf8()` and
/// `dcm_last_report_json_utf8()`.
#[no_mangle]
pub extern "C" fn dcm_merge_docx(
    config_path: *const c_char,
    input_docx: *const c_char,
    comments_json: *const c_char,
    output_docx: *const c_char,
) -> i32 {
    store(&LAST_ERROR, None);
    store(&LAST_REPORT, None);

    let cfg = if config_path.is_null() {
        None
    } else {
        match take_cstr(config_path, "config_path") {
            Ok(v) if v.trim().is_empty() => None,
            Ok(v) => Some(PathBuf::from(v)),
            Err(e) => {
                set_last_error(&e);
                return 2;
            }
        }
    };
    let input = match take_cstr(input_docx, "input_docx") {
        Ok(v) => PathBuf::from(v),
        Err(e) => {
            set_last_error(&e);
            return 3;
        }
    };
    let comments = match take_cstr(comments_json, "comments_json") {
        Ok(v) => PathBuf::from(v),
        Err(e) => {
            set_last_error(&e);
            return 4;
        }
    };
    let output = match take_cstr(output_docx, "output_docx") {
        Ok(v) => PathBuf::from(v),
        Err(e) => {
            set_last_error(&e);
            return 5;
        }
    };

    match run(cfg, &input, &comments, &output) {
        Ok(report) => {
            store(&LAST_REPORT, Some(&report));
            0
        }
        Err(err) => {
            set_last_error(&format!("{err:#}"));
            if merge_error(&err).is_some_and(|e| e.is_input_problem()) {
                12
            } else {
                13
            }
        }
    }
}

/// Returns the last error message as a UTF-8 C string pointer (or null if none).
/// The pointer is valid until the next `dcm_merge_docx` call.
#[no_mangle]
pub extern "C" fn dcm_last_error_utf8() -> *const c_char {
    load(&LAST_ERROR)
}

/// Returns the merge report of the last successful call as JSON (or null).
/// The pointer is valid until the next `dcm_merge_docx` call.
#[no_mangle]
pub extern "C" fn dcm_last_report_json_utf8() -> *const c_char {
    load(&LAST_REPORT)
}
