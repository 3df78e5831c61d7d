//! Runtime binding to `spcm64.dll`.
//!
//! ## Overview
//!
//! [`SpcmDll`] loads the DLL with `libloading`, resolves every function this crate uses into a
//! table of function pointers, and implements [`SpcmApi`] by forwarding each call. Loading at
//! runtime (rather than linking against an import library) lets the crate build and be tested
//! on machines without the vendor software; the DLL is only needed once [`SpcmDll::open`] is
//! called.
//!
//! ## Safety
//!
//! The function pointers are valid for as long as the [`Library`] they were resolved from is
//! loaded; `SpcmDll` owns both, so they share a lifetime. SPCM-DLL keeps process-wide state and
//! is not documented as thread-safe, so every call, through any handle, is made while holding
//! the process-wide `SPCM_CALL_LOCK`.
//!
//! ## Constants and Types
//!
//! The C types of the DLL header are spelled with the aliases below (`CShort`, `CInt32`, ...)
//! so that signatures can be compared against `Spcm_def.h` line by line. Note that
//! `unsigned long` is 32 bits wide on Win64.

use std::ffi::CStr;
use std::path::{Path, PathBuf};

use libloading::Library;
use parking_lot::Mutex;
use tracing::{debug, info};

use spcm_backend::data::SpcData;
use spcm_backend::error::{Result, SpcmError};
use spcm_backend::records::{AdjustPara, RateValues, SpcEepData, SpcModInfo};

use crate::api::{SpcmApi, MAX_NO_OF_SPC, VERSION_BUF_LEN};

pub type CShort = libc::c_short;
pub type CInt32 = libc::c_int;
pub type CUint32 = libc::c_uint;
pub type CULong = u32;
type CCharPtr = *mut libc::c_char;

type FnInit = unsafe extern "C" fn(ini_file: CCharPtr) -> CShort;
type FnVoid = unsafe extern "C" fn() -> CShort;
type FnModNo = unsafe extern "C" fn(mod_no: CShort) -> CShort;
type FnSetMode = unsafe extern "C" fn(mode: CShort, force_use: CShort, in_use: *mut CInt32) -> CShort;
type FnGetModuleInfo = unsafe extern "C" fn(mod_no: CShort, mod_info: *mut SpcModInfo) -> CShort;
type FnGetVersion = unsafe extern "C" fn(mod_no: CShort, version: CCharPtr) -> CShort;
type FnData = unsafe extern "C" fn(mod_no: CShort, data: *mut SpcData) -> CShort;
type FnGetParameter = unsafe extern "C" fn(mod_no: CShort, par_id: CShort, value: *mut f32) -> CShort;
type FnSetParameter = unsafe extern "C" fn(mod_no: CShort, par_id: CShort, value: f32) -> CShort;
type FnGetEepromData = unsafe extern "C" fn(mod_no: CShort, eep_data: *mut SpcEepData) -> CShort;
type FnGetAdjustParameters = unsafe extern "C" fn(mod_no: CShort, adjpara: *mut AdjustPara) -> CShort;
type FnReadParametersFromInifile = unsafe extern "C" fn(data: *mut SpcData, inifile: CCharPtr) -> CShort;
type FnSaveParametersToInifile = unsafe extern "C" fn(
    data: *mut SpcData,
    dest_inifile: CCharPtr,
    source_inifile: CCharPtr,
    with_comments: CInt32,
) -> CShort;
type FnShortOut = unsafe extern "C" fn(mod_no: CShort, value: *mut CShort) -> CShort;
type FnFloatOut = unsafe extern "C" fn(mod_no: CShort, value: *mut f32) -> CShort;
type FnReadRates = unsafe extern "C" fn(mod_no: CShort, rates: *mut RateValues) -> CShort;
type FnReadFifo = unsafe extern "C" fn(mod_no: CShort, count: *mut CULong, data: *mut u16) -> CShort;
type FnGetFifoInitVars = unsafe extern "C" fn(
    mod_no: CShort,
    fifo_type: *mut CShort,
    stream_type: *mut CShort,
    mt_clock: *mut CInt32,
    spc_header: *mut CUint32,
) -> CShort;

struct SpcmFns {
    init: FnInit,
    close: FnVoid,
    get_init_status: FnModNo,
    get_mode: FnVoid,
    set_mode: FnSetMode,
    test_id: FnModNo,
    get_module_info: FnGetModuleInfo,
    get_version: FnGetVersion,
    get_parameters: FnData,
    set_parameters: FnData,
    get_parameter: FnGetParameter,
    set_parameter: FnSetParameter,
    get_eeprom_data: FnGetEepromData,
    get_adjust_parameters: FnGetAdjustParameters,
    read_parameters_from_inifile: FnReadParametersFromInifile,
    save_parameters_to_inifile: FnSaveParametersToInifile,
    test_state: FnShortOut,
    get_sync_state: FnShortOut,
    get_time_from_start: FnFloatOut,
    get_break_time: FnFloatOut,
    get_actual_coltime: FnFloatOut,
    clear_rates: FnModNo,
    read_rates: FnReadRates,
    get_fifo_usage: FnFloatOut,
    start_measurement: FnModNo,
    stop_measurement: FnModNo,
    read_fifo: FnReadFifo,
    get_fifo_init_vars: FnGetFifoInitVars,
}

/// Resolves `name` in `lib` and copies out the function pointer.
///
/// # Safety
///
/// `T` must match the C signature of the exported symbol, and the pointer must not be used after
/// `lib` is unloaded.
unsafe fn sym<T: Copy>(lib: &Library, name: &str) -> std::result::Result<T, libloading::Error> {
    let symbol = lib.get::<T>(name.as_bytes())?;
    Ok(*symbol)
}

impl SpcmFns {
    unsafe fn resolve(lib: &Library) -> std::result::Result<Self, libloading::Error> {
        Ok(Self {
            init: sym(lib, "SPC_init")?,
            close: sym(lib, "SPC_close")?,
            get_init_status: sym(lib, "SPC_get_init_status")?,
            get_mode: sym(lib, "SPC_get_mode")?,
            set_mode: sym(lib, "SPC_set_mode")?,
            test_id: sym(lib, "SPC_test_id")?,
            get_module_info: sym(lib, "SPC_get_module_info")?,
            get_version: sym(lib, "SPC_get_version")?,
            get_parameters: sym(lib, "SPC_get_parameters")?,
            set_parameters: sym(lib, "SPC_set_parameters")?,
            get_parameter: sym(lib, "SPC_get_parameter")?,
            set_parameter: sym(lib, "SPC_set_parameter")?,
            get_eeprom_data: sym(lib, "SPC_get_eeprom_data")?,
            get_adjust_parameters: sym(lib, "SPC_get_adjust_parameters")?,
            read_parameters_from_inifile: sym(lib, "SPC_read_parameters_from_inifile")?,
            save_parameters_to_inifile: sym(lib, "SPC_save_parameters_to_inifile")?,
            test_state: sym(lib, "SPC_test_state")?,
            get_sync_state: sym(lib, "SPC_get_sync_state")?,
            get_time_from_start: sym(lib, "SPC_get_time_from_start")?,
            get_break_time: sym(lib, "SPC_get_break_time")?,
            get_actual_coltime: sym(lib, "SPC_get_actual_coltime")?,
            clear_rates: sym(lib, "SPC_clear_rates")?,
            read_rates: sym(lib, "SPC_read_rates")?,
            get_fifo_usage: sym(lib, "SPC_get_fifo_usage")?,
            start_measurement: sym(lib, "SPC_start_measurement")?,
            stop_measurement: sym(lib, "SPC_stop_measurement")?,
            read_fifo: sym(lib, "SPC_read_fifo")?,
            get_fifo_init_vars: sym(lib, "SPC_get_fifo_init_vars")?,
        })
    }
}

/// A loaded `spcm64.dll`.
pub struct SpcmDll {
    path: PathBuf,
    fns: SpcmFns,
    // Dropped last: the function pointers above point into it
    _lib: Library,
}

impl SpcmDll {
    /// Loads the DLL at `path` and resolves all functions.
    pub fn open(path: &Path) -> Result<Self> {
        let load_err = |e: libloading::Error| SpcmError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        // Loading runs the DLL's initialization routine; resolving only reads its export table.
        let lib = unsafe { Library::new(path) }.map_err(load_err)?;
        let fns = unsafe { SpcmFns::resolve(&lib) }.map_err(load_err)?;
        info!(path = %path.display(), "Loaded SPCM-DLL");
        Ok(Self {
            path: path.to_path_buf(),
            fns,
            _lib: lib,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn spcm_call<F: FnOnce() -> CShort>(&self, func: &'static str, f: F) -> CShort {
        serialized_call(func, f)
    }
}

// Handles loaded from the same path share one DLL image, and with it the DLL's state.
static SPCM_CALL_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Runs one DLL call while holding the process-wide call lock.
fn serialized_call<F: FnOnce() -> CShort>(func: &'static str, f: F) -> CShort {
    let status = {
        let _guard = SPCM_CALL_LOCK.lock();
        f()
    };
    debug!(func, status, "SPCM-DLL call returned");
    status
}

// The DLL takes non-const `char *` for strings it only reads.
fn c_str_arg(s: &CStr) -> CCharPtr {
    s.as_ptr() as CCharPtr
}

impl SpcmApi for SpcmDll {
    fn init(&self, ini_file: &CStr) -> CShort {
        self.spcm_call("SPC_init", || unsafe { (self.fns.init)(c_str_arg(ini_file)) })
    }

    fn close(&self) -> CShort {
        self.spcm_call("SPC_close", || unsafe { (self.fns.close)() })
    }

    fn get_init_status(&self, mod_no: CShort) -> CShort {
        self.spcm_call("SPC_get_init_status", || unsafe { (self.fns.get_init_status)(mod_no) })
    }

    fn get_mode(&self) -> CShort {
        self.spcm_call("SPC_get_mode", || unsafe { (self.fns.get_mode)() })
    }

    fn set_mode(&self, mode: CShort, force_use: CShort, in_use: &[CInt32; MAX_NO_OF_SPC]) -> CShort {
        // The DLL does not write through in_use; a copy keeps the caller's array immutable
        let mut in_use = *in_use;
        self.spcm_call("SPC_set_mode", || unsafe {
            (self.fns.set_mode)(mode, force_use, in_use.as_mut_ptr())
        })
    }

    fn test_id(&self, mod_no: CShort) -> CShort {
        self.spcm_call("SPC_test_id", || unsafe { (self.fns.test_id)(mod_no) })
    }

    fn get_module_info(&self, mod_no: CShort, mod_info: &mut SpcModInfo) -> CShort {
        self.spcm_call("SPC_get_module_info", || unsafe {
            (self.fns.get_module_info)(mod_no, mod_info)
        })
    }

    fn get_version(&self, mod_no: CShort, version: &mut [u8; VERSION_BUF_LEN]) -> CShort {
        self.spcm_call("SPC_get_version", || unsafe {
            (self.fns.get_version)(mod_no, version.as_mut_ptr() as CCharPtr)
        })
    }

    fn get_parameters(&self, mod_no: CShort, data: &mut SpcData) -> CShort {
        self.spcm_call("SPC_get_parameters", || unsafe { (self.fns.get_parameters)(mod_no, data) })
    }

    fn set_parameters(&self, mod_no: CShort, data: &SpcData) -> CShort {
        let mut data = *data;
        self.spcm_call("SPC_set_parameters", || unsafe {
            (self.fns.set_parameters)(mod_no, &mut data)
        })
    }

    fn get_parameter(&self, mod_no: CShort, par_id: CShort, value: &mut f32) -> CShort {
        self.spcm_call("SPC_get_parameter", || unsafe {
            (self.fns.get_parameter)(mod_no, par_id, value)
        })
    }

    fn set_parameter(&self, mod_no: CShort, par_id: CShort, value: f32) -> CShort {
        self.spcm_call("SPC_set_parameter", || unsafe {
            (self.fns.set_parameter)(mod_no, par_id, value)
        })
    }

    fn get_eeprom_data(&self, mod_no: CShort, eep_data: &mut SpcEepData) -> CShort {
        self.spcm_call("SPC_get_eeprom_data", || unsafe {
            (self.fns.get_eeprom_data)(mod_no, eep_data)
        })
    }

    fn get_adjust_parameters(&self, mod_no: CShort, adj_para: &mut AdjustPara) -> CShort {
        self.spcm_call("SPC_get_adjust_parameters", || unsafe {
            (self.fns.get_adjust_parameters)(mod_no, adj_para)
        })
    }

    fn read_parameters_from_inifile(&self, data: &mut SpcData, ini_file: &CStr) -> CShort {
        self.spcm_call("SPC_read_parameters_from_inifile", || unsafe {
            (self.fns.read_parameters_from_inifile)(data, c_str_arg(ini_file))
        })
    }

    fn save_parameters_to_inifile(
        &self,
        data: &SpcData,
        dest_inifile: &CStr,
        source_inifile: Option<&CStr>,
        with_comments: CInt32,
    ) -> CShort {
        let mut data = *data;
        let source = source_inifile.map_or(std::ptr::null_mut(), c_str_arg);
        self.spcm_call("SPC_save_parameters_to_inifile", || unsafe {
            (self.fns.save_parameters_to_inifile)(
                &mut data,
                c_str_arg(dest_inifile),
                source,
                with_comments,
            )
        })
    }

    fn test_state(&self, mod_no: CShort, state: &mut CShort) -> CShort {
        self.spcm_call("SPC_test_state", || unsafe { (self.fns.test_state)(mod_no, state) })
    }

    fn get_sync_state(&self, mod_no: CShort, sync_state: &mut CShort) -> CShort {
        self.spcm_call("SPC_get_sync_state", || unsafe {
            (self.fns.get_sync_state)(mod_no, sync_state)
        })
    }

    fn get_time_from_start(&self, mod_no: CShort, time: &mut f32) -> CShort {
        self.spcm_call("SPC_get_time_from_start", || unsafe {
            (self.fns.get_time_from_start)(mod_no, time)
        })
    }

    fn get_break_time(&self, mod_no: CShort, time: &mut f32) -> CShort {
        self.spcm_call("SPC_get_break_time", || unsafe { (self.fns.get_break_time)(mod_no, time) })
    }

    fn get_actual_coltime(&self, mod_no: CShort, time: &mut f32) -> CShort {
        self.spcm_call("SPC_get_actual_coltime", || unsafe {
            (self.fns.get_actual_coltime)(mod_no, time)
        })
    }

    fn clear_rates(&self, mod_no: CShort) -> CShort {
        self.spcm_call("SPC_clear_rates", || unsafe { (self.fns.clear_rates)(mod_no) })
    }

    fn read_rates(&self, mod_no: CShort, rates: &mut RateValues) -> CShort {
        self.spcm_call("SPC_read_rates", || unsafe { (self.fns.read_rates)(mod_no, rates) })
    }

    fn get_fifo_usage(&self, mod_no: CShort, usage_degree: &mut f32) -> CShort {
        self.spcm_call("SPC_get_fifo_usage", || unsafe {
            (self.fns.get_fifo_usage)(mod_no, usage_degree)
        })
    }

    fn start_measurement(&self, mod_no: CShort) -> CShort {
        self.spcm_call("SPC_start_measurement", || unsafe { (self.fns.start_measurement)(mod_no) })
    }

    fn stop_measurement(&self, mod_no: CShort) -> CShort {
        self.spcm_call("SPC_stop_measurement", || unsafe { (self.fns.stop_measurement)(mod_no) })
    }

    fn read_fifo(&self, mod_no: CShort, count: &mut u32, data: &mut [u16]) -> CShort {
        // Never let the DLL write past the end of the buffer
        let capacity = u32::try_from(data.len()).unwrap_or(u32::MAX);
        *count = (*count).min(capacity);
        self.spcm_call("SPC_read_fifo", || unsafe {
            (self.fns.read_fifo)(mod_no, count, data.as_mut_ptr())
        })
    }

    fn get_fifo_init_vars(
        &self,
        mod_no: CShort,
        fifo_type: &mut CShort,
        stream_type: &mut CShort,
        mt_clock: &mut CInt32,
        spc_header: &mut u32,
    ) -> CShort {
        self.spcm_call("SPC_get_fifo_init_vars", || unsafe {
            (self.fns.get_fifo_init_vars)(mod_no, fifo_type, stream_type, mt_clock, spc_header)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_dll_fails_with_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spcm64.dll");
        match SpcmDll::open(&path) {
            Err(SpcmError::Load { path: p, message }) => {
                assert_eq!(p, path);
                assert!(!message.is_empty());
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("loading a missing DLL succeeded"),
        }
    }

    #[test]
    fn calls_from_threads_never_overlap() {
        use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
        use std::sync::Arc;

        let in_call = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let in_call = Arc::clone(&in_call);
                let overlaps = Arc::clone(&overlaps);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        serialized_call("SPC_test_state", || {
                            if in_call.swap(true, Ordering::SeqCst) {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            std::thread::yield_now();
                            in_call.store(false, Ordering::SeqCst);
                            0
                        });
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
