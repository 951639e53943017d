//! Dynamic algorithm plugins over a stable C ABI.
//!
//! A plugin library exports one of two entry points:
//!
//! ```c
//! int sortlab_get_algorithms_v1(const sortlab_algo_v1 **out, int32_t *count);
//! int sortlab_get_algorithms_v2(const sortlab_algo_v2 **out, int32_t *count);
//! ```
//!
//! v1 carries i32-only routines; v2 carries optional per-type entry points
//! for the six numeric element types. The loader prefers v2 and falls back
//! to v1 for `i32`. Descriptor arrays are owned by the plugin and must stay
//! valid for the library's lifetime.
//!
//! Libraries contributing at least one algorithm to a run are retained for
//! the process lifetime: their function pointers may still be referenced by
//! in-flight benchmarks. Discovery-only loads are dropped before returning.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::{Mutex, OnceLock};

use libloading::Library;

use crate::algos::Algo;
use crate::elem::Element;

/// v1 descriptor: i32-only.
#[repr(C)]
pub struct AlgoV1 {
    pub name: *const c_char,
    pub run_int: Option<unsafe extern "C" fn(*mut i32, i32)>,
}

/// v2 descriptor: per-type entry points, any of which may be null.
#[repr(C)]
pub struct AlgoV2 {
    pub name: *const c_char,
    pub run_i32: Option<unsafe extern "C" fn(*mut i32, i32)>,
    pub run_u32: Option<unsafe extern "C" fn(*mut u32, i32)>,
    pub run_i64: Option<unsafe extern "C" fn(*mut i64, i32)>,
    pub run_u64: Option<unsafe extern "C" fn(*mut u64, i32)>,
    pub run_f32: Option<unsafe extern "C" fn(*mut f32, i32)>,
    pub run_f64: Option<unsafe extern "C" fn(*mut f64, i32)>,
}

type GetAlgosV1 = unsafe extern "C" fn(*mut *const AlgoV1, *mut i32) -> i32;
type GetAlgosV2 = unsafe extern "C" fn(*mut *const AlgoV2, *mut i32) -> i32;

const SYM_V1: &[u8] = b"sortlab_get_algorithms_v1\0";
const SYM_V2: &[u8] = b"sortlab_get_algorithms_v2\0";

/// How to treat libraries that contribute algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Retention {
    /// Keep contributing libraries loaded for the process lifetime (runs).
    Process,
    /// Drop every handle before returning (discovery).
    Transient,
}

fn retained() -> &'static Mutex<Vec<Library>> {
    static RETAINED: OnceLock<Mutex<Vec<Library>>> = OnceLock::new();
    RETAINED.get_or_init(|| Mutex::new(Vec::new()))
}

/// Loads plugin libraries and appends their usable algorithms for `T`.
///
/// A library that fails to load, exposes no entry point, or contributes no
/// algorithm for this element type is skipped with a warning; the rest
/// proceed. Errors are never fatal to the caller.
pub(crate) fn load_for_type<T: Element>(
    paths: &[String],
    regs: &mut Vec<Algo<T>>,
    retention: Retention,
) {
    let mut transient = Vec::new();
    for path in paths {
        if path.is_empty() {
            continue;
        }
        let lib = match open_now(path) {
            Ok(lib) => lib,
            Err(err) => {
                tracing::warn!(path, error = %err, "skipping plugin: load failed");
                continue;
            }
        };
        let added = unsafe { register_from::<T>(&lib, regs) };
        if added == 0 {
            // Nothing usable for this element type; release immediately.
            drop(lib);
            continue;
        }
        tracing::debug!(path, added, "plugin registered");
        match retention {
            Retention::Process => retained()
                .lock()
                .expect("plugin retention lock poisoned")
                .push(lib),
            Retention::Transient => transient.push(lib),
        }
    }
    // In transient mode the registered function pointers die with `transient`
    // here; callers only read names out of `regs` before returning.
}

/// Opens a library with immediate symbol resolution.
#[cfg(unix)]
fn open_now(path: &str) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL).map(Into::into) }
}

#[cfg(not(unix))]
fn open_now(path: &str) -> Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}

/// Reads the plugin's descriptor table and registers entries usable for `T`.
/// Returns the number of algorithms added.
///
/// # Safety
///
/// Trusts the plugin to uphold the ABI: descriptor arrays outlive the
/// library handle and `run_*` routines sort `n` contiguous elements.
unsafe fn register_from<T: Element>(lib: &Library, regs: &mut Vec<Algo<T>>) -> usize {
    if let Ok(get_v2) = lib.get::<GetAlgosV2>(SYM_V2) {
        let mut table: *const AlgoV2 = std::ptr::null();
        let mut count: i32 = 0;
        if get_v2(&mut table, &mut count) == 0 || table.is_null() || count <= 0 {
            return 0;
        }
        let entries = std::slice::from_raw_parts(table, count as usize);
        return entries
            .iter()
            .filter_map(|entry| {
                let name = name_of(entry.name)?;
                let run = T::plugin_v2_entry(entry)?;
                Some(push_algo(regs, name, run))
            })
            .count();
    }

    if !T::PLUGIN_V1 {
        return 0;
    }
    let Ok(get_v1) = lib.get::<GetAlgosV1>(SYM_V1) else {
        return 0;
    };
    let mut table: *const AlgoV1 = std::ptr::null();
    let mut count: i32 = 0;
    if get_v1(&mut table, &mut count) == 0 || table.is_null() || count <= 0 {
        return 0;
    }
    let entries = std::slice::from_raw_parts(table, count as usize);
    entries
        .iter()
        .filter_map(|entry| {
            let name = name_of(entry.name)?;
            let run = entry.run_int?;
            // v1 is i32-only; `T::PLUGIN_V1` gates this branch to i32, so the
            // pointer cast is a no-op.
            let run: unsafe extern "C" fn(*mut T, i32) = std::mem::transmute(run);
            Some(push_algo(regs, name, run))
        })
        .count()
}

fn name_of(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(str::to_owned)
}

fn push_algo<T: Element>(
    regs: &mut Vec<Algo<T>>,
    name: String,
    run: unsafe extern "C" fn(*mut T, i32),
) {
    regs.push(Algo {
        name,
        run: std::sync::Arc::new(move |v: &mut Vec<T>| {
            if v.is_empty() || v.len() > i32::MAX as usize {
                return;
            }
            unsafe { run(v.as_mut_ptr(), v.len() as i32) }
        }),
    });
}
