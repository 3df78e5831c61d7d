//! The raw call surface of SPCM-DLL.
//!
//! [`SpcmApi`] has one method per DLL function used by this crate, with the C signature kept
//! as-is: every method returns the DLL's `short` status and writes results through `&mut`
//! out-parameters. Checking statuses and converting types is left to [`crate::spcm::Spcm`], so an
//! implementation only has to forward or simulate the calls. Two implementations exist: the
//! runtime-loaded DLL ([`crate::ffi::SpcmDll`]) and the in-process simulator
//! ([`crate::mock::MockSpcm`], `mock` feature).

use std::ffi::CStr;

use spcm_backend::data::SpcData;
use spcm_backend::records::{AdjustPara, RateValues, SpcEepData, SpcModInfo};

use crate::ffi::{CInt32, CShort};

/// Number of modules SPCM-DLL can address (`MAX_NO_OF_SPC`).
pub const MAX_NO_OF_SPC: usize = 32;

/// Size of the buffer passed to `SPC_get_version`.
pub const VERSION_BUF_LEN: usize = 32;

pub trait SpcmApi: Send + Sync {
    fn init(&self, ini_file: &CStr) -> CShort;
    fn close(&self) -> CShort;
    fn get_init_status(&self, mod_no: CShort) -> CShort;
    fn get_mode(&self) -> CShort;
    fn set_mode(&self, mode: CShort, force_use: CShort, in_use: &[CInt32; MAX_NO_OF_SPC]) -> CShort;
    fn test_id(&self, mod_no: CShort) -> CShort;
    fn get_module_info(&self, mod_no: CShort, mod_info: &mut SpcModInfo) -> CShort;
    fn get_version(&self, mod_no: CShort, version: &mut [u8; VERSION_BUF_LEN]) -> CShort;

    fn get_parameters(&self, mod_no: CShort, data: &mut SpcData) -> CShort;
    fn set_parameters(&self, mod_no: CShort, data: &SpcData) -> CShort;
    fn get_parameter(&self, mod_no: CShort, par_id: CShort, value: &mut f32) -> CShort;
    fn set_parameter(&self, mod_no: CShort, par_id: CShort, value: f32) -> CShort;
    fn get_eeprom_data(&self, mod_no: CShort, eep_data: &mut SpcEepData) -> CShort;
    fn get_adjust_parameters(&self, mod_no: CShort, adj_para: &mut AdjustPara) -> CShort;
    fn read_parameters_from_inifile(&self, data: &mut SpcData, ini_file: &CStr) -> CShort;
    fn save_parameters_to_inifile(
        &self,
        data: &SpcData,
        dest_inifile: &CStr,
        source_inifile: Option<&CStr>,
        with_comments: CInt32,
    ) -> CShort;

    fn test_state(&self, mod_no: CShort, state: &mut CShort) -> CShort;
    fn get_sync_state(&self, mod_no: CShort, sync_state: &mut CShort) -> CShort;
    fn get_time_from_start(&self, mod_no: CShort, time: &mut f32) -> CShort;
    fn get_break_time(&self, mod_no: CShort, time: &mut f32) -> CShort;
    fn get_actual_coltime(&self, mod_no: CShort, time: &mut f32) -> CShort;
    fn clear_rates(&self, mod_no: CShort) -> CShort;
    fn read_rates(&self, mod_no: CShort, rates: &mut RateValues) -> CShort;
    fn get_fifo_usage(&self, mod_no: CShort, usage_degree: &mut f32) -> CShort;

    fn start_measurement(&self, mod_no: CShort) -> CShort;
    fn stop_measurement(&self, mod_no: CShort) -> CShort;
    /// `count` holds the capacity of `data` in words on entry and the number read on return.
    fn read_fifo(&self, mod_no: CShort, count: &mut u32, data: &mut [u16]) -> CShort;
    fn get_fifo_init_vars(
        &self,
        mod_no: CShort,
        fifo_type: &mut CShort,
        stream_type: &mut CShort,
        mt_clock: &mut CInt32,
        spc_header: &mut u32,
    ) -> CShort;
}
