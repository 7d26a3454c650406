use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_float, c_int, c_long, c_short, c_uint, c_ushort, c_void};
use std::path::Path;
use std::ptr;

use crate::config::{MecabLatticeHandle, MecabModelHandle, MecabTaggerHandle};
use crate::error::{MecabError, Result};

type FnMecabVersion = unsafe extern "C" fn() -> *const c_char;
type FnMecabStrerror = unsafe extern "C" fn(MecabTaggerHandle) -> *const c_char;
type FnMecabModelNew = unsafe extern "C" fn(c_int, *mut *mut c_char) -> MecabModelHandle;
type FnMecabModelDestroy = unsafe extern "C" fn(MecabModelHandle);
type FnMecabModelNewTagger = unsafe extern "C" fn(MecabModelHandle) -> MecabTaggerHandle;
type FnMecabModelNewLattice = unsafe extern "C" fn(MecabModelHandle) -> MecabLatticeHandle;
type FnMecabModelDictionaryInfo =
    unsafe extern "C" fn(MecabModelHandle) -> *const MecabDictionaryInfoRaw;
type FnMecabDestroy = unsafe extern "C" fn(MecabTaggerHandle);
type FnMecabFormatNode =
    unsafe extern "C" fn(MecabTaggerHandle, *const MecabNodeRaw) -> *const c_char;
type FnMecabLatticeDestroy = unsafe extern "C" fn(MecabLatticeHandle);
type FnMecabLatticeClear = unsafe extern "C" fn(MecabLatticeHandle);
type FnMecabLatticeSetSentence2 = unsafe extern "C" fn(MecabLatticeHandle, *const c_char, usize);
type FnMecabLatticeSetRequestType = unsafe extern "C" fn(MecabLatticeHandle, c_int);
type FnMecabLatticeAddRequestType = unsafe extern "C" fn(MecabLatticeHandle, c_int);
type FnMecabLatticeSetBoundaryConstraint = unsafe extern "C" fn(MecabLatticeHandle, usize, c_int);
type FnMecabLatticeSetFeatureConstraint =
    unsafe extern "C" fn(MecabLatticeHandle, usize, usize, *const c_char);
type FnMecabParseLattice = unsafe extern "C" fn(MecabTaggerHandle, MecabLatticeHandle) -> c_int;
type FnMecabLatticeTostr = unsafe extern "C" fn(MecabLatticeHandle) -> *const c_char;
type FnMecabLatticeNbestTostr = unsafe extern "C" fn(MecabLatticeHandle, usize) -> *const c_char;
type FnMecabLatticeNext = unsafe extern "C" fn(MecabLatticeHandle) -> c_int;
type FnMecabLatticeGetBosNode = unsafe extern "C" fn(MecabLatticeHandle) -> *const MecabNodeRaw;
type FnMecabLatticeStrerror = unsafe extern "C" fn(MecabLatticeHandle) -> *const c_char;

/// Layout of `mecab_dictionary_info_t`.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct MecabDictionaryInfoRaw {
    pub(crate) filename: *const c_char,
    pub(crate) charset: *const c_char,
    pub(crate) size: c_uint,
    pub(crate) dic_type: c_int,
    pub(crate) lsize: c_uint,
    pub(crate) rsize: c_uint,
    pub(crate) version: c_ushort,
    pub(crate) next: *const MecabDictionaryInfoRaw,
}

/// Layout of `mecab_path_t`. Only traversed through node pointers.
#[repr(C)]
#[derive(Debug)]
#[allow(dead_code)]
pub(crate) struct MecabPathRaw {
    pub(crate) rnode: *mut MecabNodeRaw,
    pub(crate) rnext: *mut MecabPathRaw,
    pub(crate) lnode: *mut MecabNodeRaw,
    pub(crate) lnext: *mut MecabPathRaw,
    pub(crate) cost: c_int,
    pub(crate) prob: c_float,
}

/// Layout of `mecab_node_t`.
#[repr(C)]
#[derive(Debug)]
#[allow(dead_code)]
pub(crate) struct MecabNodeRaw {
    pub(crate) prev: *mut MecabNodeRaw,
    pub(crate) next: *mut MecabNodeRaw,
    pub(crate) enext: *mut MecabNodeRaw,
    pub(crate) bnext: *mut MecabNodeRaw,
    pub(crate) rpath: *mut MecabPathRaw,
    pub(crate) lpath: *mut MecabPathRaw,
    pub(crate) surface: *const c_char,
    pub(crate) feature: *const c_char,
    pub(crate) id: c_uint,
    pub(crate) length: c_ushort,
    pub(crate) rlength: c_ushort,
    pub(crate) rc_attr: c_ushort,
    pub(crate) lc_attr: c_ushort,
    pub(crate) posid: c_ushort,
    pub(crate) char_type: u8,
    pub(crate) stat: u8,
    pub(crate) isbest: u8,
    pub(crate) alpha: c_float,
    pub(crate) beta: c_float,
    pub(crate) prob: c_float,
    pub(crate) wcost: c_short,
    pub(crate) cost: c_long,
}

#[derive(Clone, Copy)]
pub(crate) struct MecabApi {
    pub(crate) mecab_version: FnMecabVersion,
    pub(crate) mecab_strerror: FnMecabStrerror,
    pub(crate) mecab_model_new: FnMecabModelNew,
    pub(crate) mecab_model_destroy: FnMecabModelDestroy,
    pub(crate) mecab_model_new_tagger: FnMecabModelNewTagger,
    pub(crate) mecab_model_new_lattice: FnMecabModelNewLattice,
    pub(crate) mecab_model_dictionary_info: FnMecabModelDictionaryInfo,
    pub(crate) mecab_destroy: FnMecabDestroy,
    pub(crate) mecab_format_node: FnMecabFormatNode,
    pub(crate) mecab_lattice_destroy: FnMecabLatticeDestroy,
    pub(crate) mecab_lattice_clear: FnMecabLatticeClear,
    pub(crate) mecab_lattice_set_sentence2: FnMecabLatticeSetSentence2,
    pub(crate) mecab_lattice_set_request_type: FnMecabLatticeSetRequestType,
    pub(crate) mecab_lattice_add_request_type: FnMecabLatticeAddRequestType,
    pub(crate) mecab_lattice_set_boundary_constraint: FnMecabLatticeSetBoundaryConstraint,
    pub(crate) mecab_lattice_set_feature_constraint: FnMecabLatticeSetFeatureConstraint,
    pub(crate) mecab_parse_lattice: FnMecabParseLattice,
    pub(crate) mecab_lattice_tostr: FnMecabLatticeTostr,
    pub(crate) mecab_lattice_nbest_tostr: Option<FnMecabLatticeNbestTostr>,
    pub(crate) mecab_lattice_next: Option<FnMecabLatticeNext>,
    pub(crate) mecab_lattice_get_bos_node: FnMecabLatticeGetBosNode,
    pub(crate) mecab_lattice_strerror: FnMecabLatticeStrerror,
}

impl MecabApi {
    pub(crate) unsafe fn load(library: &DynamicLibrary) -> Result<Self> {
        Ok(Self {
            mecab_version: library.load_symbol("mecab_version")?,
            mecab_strerror: library.load_symbol("mecab_strerror")?,
            mecab_model_new: library.load_symbol("mecab_model_new")?,
            mecab_model_destroy: library.load_symbol("mecab_model_destroy")?,
            mecab_model_new_tagger: library.load_symbol("mecab_model_new_tagger")?,
            mecab_model_new_lattice: library.load_symbol("mecab_model_new_lattice")?,
            mecab_model_dictionary_info: library.load_symbol("mecab_model_dictionary_info")?,
            mecab_destroy: library.load_symbol("mecab_destroy")?,
            mecab_format_node: library.load_symbol("mecab_format_node")?,
            mecab_lattice_destroy: library.load_symbol("mecab_lattice_destroy")?,
            mecab_lattice_clear: library.load_symbol("mecab_lattice_clear")?,
            mecab_lattice_set_sentence2: library.load_symbol("mecab_lattice_set_sentence2")?,
            mecab_lattice_set_request_type: library
                .load_symbol("mecab_lattice_set_request_type")?,
            mecab_lattice_add_request_type: library
                .load_symbol("mecab_lattice_add_request_type")?,
            mecab_lattice_set_boundary_constraint: library
                .load_symbol("mecab_lattice_set_boundary_constraint")?,
            mecab_lattice_set_feature_constraint: library
                .load_symbol("mecab_lattice_set_feature_constraint")?,
            mecab_parse_lattice: library.load_symbol("mecab_parse_lattice")?,
            mecab_lattice_tostr: library.load_symbol("mecab_lattice_tostr")?,
            mecab_lattice_nbest_tostr: library.load_symbol_optional("mecab_lattice_nbest_tostr")?,
            mecab_lattice_next: library.load_symbol_optional("mecab_lattice_next")?,
            mecab_lattice_get_bos_node: library.load_symbol("mecab_lattice_get_bos_node")?,
            mecab_lattice_strerror: library.load_symbol("mecab_lattice_strerror")?,
        })
    }
}

/// Function table plus the library it was resolved from.
///
/// `_library` is `None` only for in-process engines used by tests.
pub(crate) struct LoadedLibrary {
    pub(crate) _library: Option<DynamicLibrary>,
    pub(crate) api: MecabApi,
}

#[derive(Debug)]
pub(crate) struct DynamicLibrary {
    handle: *mut c_void,
}

impl DynamicLibrary {
    pub(crate) fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_string = path.as_ref().to_string_lossy().to_string();
        let path_c = CString::new(path_string.clone())?;
        let handle = unsafe { platform_open(path_c.as_ptr()) };
        if handle.is_null() {
            return Err(MecabError::LibraryNotFound(format!(
                "{} ({})",
                path_string,
                platform_last_error()
            )));
        }
        Ok(Self { handle })
    }

    pub(crate) unsafe fn load_symbol<T: Copy>(&self, symbol_name: &str) -> Result<T> {
        let symbol_c = CString::new(symbol_name)?;
        let symbol_ptr = platform_symbol(self.handle, symbol_c.as_ptr());
        if symbol_ptr.is_null() {
            return Err(MecabError::SymbolLoad(format!(
                "{} ({})",
                symbol_name,
                platform_last_error()
            )));
        }
        Ok(std::mem::transmute_copy::<*mut c_void, T>(&symbol_ptr))
    }

    pub(crate) unsafe fn load_symbol_optional<T: Copy>(
        &self,
        symbol_name: &str,
    ) -> Result<Option<T>> {
        let symbol_c = CString::new(symbol_name)?;
        let symbol_ptr = platform_symbol(self.handle, symbol_c.as_ptr());
        if symbol_ptr.is_null() {
            return Ok(None);
        }
        Ok(Some(std::mem::transmute_copy::<*mut c_void, T>(
            &symbol_ptr,
        )))
    }
}

impl Drop for DynamicLibrary {
    fn drop(&mut self) {
        if self.handle.is_null() {
            return;
        }
        unsafe {
            platform_close(self.handle);
        }
        self.handle = ptr::null_mut();
    }
}

/// Reads the error for a tagger, or the global error when `tagger` is null.
pub(crate) fn read_mecab_error(api: &MecabApi, tagger: MecabTaggerHandle) -> Option<String> {
    let message_ptr = unsafe { (api.mecab_strerror)(tagger) };
    non_empty_message(message_ptr)
}

pub(crate) fn read_lattice_error(api: &MecabApi, lattice: MecabLatticeHandle) -> Option<String> {
    let message_ptr = unsafe { (api.mecab_lattice_strerror)(lattice) };
    non_empty_message(message_ptr)
}

fn non_empty_message(message_ptr: *const c_char) -> Option<String> {
    if message_ptr.is_null() {
        return None;
    }
    let message = unsafe { CStr::from_ptr(message_ptr) }
        .to_string_lossy()
        .trim()
        .to_string();
    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}

/// Copies a NUL-terminated engine string as raw bytes.
pub(crate) fn cstr_bytes(pointer: *const c_char) -> Vec<u8> {
    if pointer.is_null() {
        return Vec::new();
    }
    unsafe { CStr::from_ptr(pointer) }.to_bytes().to_vec()
}

/// Copies `length` bytes starting at `pointer`; the region is not NUL-terminated.
pub(crate) unsafe fn span_bytes(pointer: *const c_char, length: usize) -> Vec<u8> {
    if pointer.is_null() || length == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(pointer.cast::<u8>(), length).to_vec()
}

#[cfg(target_os = "windows")]
#[link(name = "kernel32")]
extern "system" {
    fn LoadLibraryA(lp_lib_file_name: *const c_char) -> *mut c_void;
    fn GetProcAddress(h_module: *mut c_void, lp_proc_name: *const c_char) -> *mut c_void;
    fn FreeLibrary(h_lib_module: *mut c_void) -> i32;
    fn GetLastError() -> u32;
}

#[cfg(target_os = "windows")]
unsafe fn platform_open(path: *const c_char) -> *mut c_void {
    LoadLibraryA(path)
}

#[cfg(target_os = "windows")]
unsafe fn platform_symbol(handle: *mut c_void, symbol: *const c_char) -> *mut c_void {
    GetProcAddress(handle, symbol)
}

#[cfg(target_os = "windows")]
unsafe fn platform_close(handle: *mut c_void) {
    let _ = FreeLibrary(handle);
}

#[cfg(target_os = "windows")]
fn platform_last_error() -> String {
    format!("GetLastError={}", unsafe { GetLastError() })
}

#[cfg(target_os = "linux")]
#[link(name = "dl")]
extern "C" {
    fn dlopen(filename: *const c_char, flags: c_int) -> *mut c_void;
    fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void;
    fn dlclose(handle: *mut c_void) -> c_int;
    fn dlerror() -> *const c_char;
}

#[cfg(all(unix, not(target_os = "linux")))]
extern "C" {
    fn dlopen(filename: *const c_char, flags: c_int) -> *mut c_void;
    fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void;
    fn dlclose(handle: *mut c_void) -> c_int;
    fn dlerror() -> *const c_char;
}

#[cfg(unix)]
unsafe fn platform_open(path: *const c_char) -> *mut c_void {
    const RTLD_NOW: c_int = 2;
    const RTLD_LOCAL: c_int = 0;
    dlopen(path, RTLD_NOW | RTLD_LOCAL)
}

#[cfg(unix)]
unsafe fn platform_symbol(handle: *mut c_void, symbol: *const c_char) -> *mut c_void {
    dlsym(handle, symbol)
}

#[cfg(unix)]
unsafe fn platform_close(handle: *mut c_void) {
    let _ = dlclose(handle);
}

#[cfg(unix)]
fn platform_last_error() -> String {
    let pointer = unsafe { dlerror() };
    if pointer.is_null() {
        "unknown error".to_string()
    } else {
        let full = unsafe { CStr::from_ptr(pointer) }
            .to_string_lossy()
            .to_string();
        full.split(": tried:").next().unwrap_or(&full).to_string()
    }
}
