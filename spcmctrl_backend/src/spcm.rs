//! Typed access to SPCM-DLL.
//!
//! ## Overview
//!
//! [`Spcm`] wraps an [`SpcmApi`] implementation and turns its C-shaped calls into Rust ones:
//! statuses become [`Result`]s carrying [`SpcmError::Dll`], out-parameters become return values,
//! raw codes become enumerations and flag sets, and paths become C strings. The methods map
//! one-to-one to DLL functions (`get_parameters` calls `SPC_get_parameters`, and so on).
//!
//! ## Usage
//!
//! On Windows with the SPCM software installed, [`Spcm::load`] locates and loads `spcm64.dll`.
//! With the `mock` feature, [`Spcm::mock`] returns a handle on the in-process simulator, which is
//! what the tests and the demo binary use.
//!
//! ```
//! use spcm_backend::{minimal_spcm_ini, ini_file, DllOperationMode, ParId, ParValue};
//! use spcmctrl_backend::Spcm;
//!
//! let spcm = Spcm::mock();
//! let ini = ini_file(&minimal_spcm_ini(150)).unwrap();
//! spcm.init(ini.path()).unwrap();
//! assert_eq!(spcm.get_mode().unwrap(), DllOperationMode::SimulateSpc150);
//!
//! spcm.set_parameter(0, ParId::Mode, ParValue::Int(1)).unwrap();
//! assert_eq!(spcm.get_parameter(0, ParId::Mode).unwrap(), ParValue::Int(1));
//! ```
//!
//! ## Error Handling
//!
//! Every negative status is logged with `tracing` at `warn` level and returned as
//! [`SpcmError::Dll`]. Arguments that cannot be expressed in the C call (module masks longer than
//! 32 entries, values of the wrong type for a parameter) are rejected before the DLL is called.

use std::ffi::CString;
use std::path::Path;

use ndarray::Array1;
use tracing::warn;

use spcm_backend::data::SpcData;
use spcm_backend::enums::{
    DllOperationMode, FifoType, InitStatus, MeasurementState, ModuleType, StreamType, SyncState,
};
use spcm_backend::error::{check, ErrorEnum, Result, SpcmError};
use spcm_backend::fifo::FifoInitVars;
use spcm_backend::parameter::{ParId, ParValue};
use spcm_backend::records::{
    from_c_chars, AdjustPara, EepData, ModInfo, RateValues, SpcEepData, SpcModInfo,
};

use crate::api::{SpcmApi, MAX_NO_OF_SPC, VERSION_BUF_LEN};
use crate::ffi::{CInt32, CShort, SpcmDll};
use crate::locate;

fn path_arg(path: &Path) -> Result<CString> {
    Ok(CString::new(path.to_string_lossy().into_owned())?)
}

/// Logs and converts a DLL status.
fn spcm_check(func: &'static str, status: CShort) -> Result<CShort> {
    check(status).map_err(|e| {
        warn!(func, status, error = %e, "SPCM-DLL call failed");
        e
    })
}

fn check_mod_no(mod_no: i16) -> Result<()> {
    if (0..MAX_NO_OF_SPC as i16).contains(&mod_no) {
        Ok(())
    } else {
        Err(SpcmError::from_code(ErrorEnum::ModNo.code()))
    }
}

/// A handle on SPCM-DLL (or the simulator).
pub struct Spcm {
    api: Box<dyn SpcmApi>,
}

impl Spcm {
    pub fn new(api: Box<dyn SpcmApi>) -> Self {
        Self { api }
    }

    /// Locates `spcm64.dll`, checks its version and loads it.
    pub fn load() -> Result<Self> {
        let path = locate::spcm_dll_path()?;
        locate::check_version(locate::dll_file_version(&path)?)?;
        Ok(Self::new(Box::new(SpcmDll::open(&path)?)))
    }

    /// A handle on the in-process simulator.
    #[cfg(feature = "mock")]
    pub fn mock() -> Self {
        Self::new(Box::new(crate::mock::MockSpcm::new()))
    }

    /// Initializes the DLL with the given `.ini` file.
    pub fn init(&self, ini_file: &Path) -> Result<()> {
        let ini = path_arg(ini_file)?;
        spcm_check("SPC_init", self.api.init(&ini))?;
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        spcm_check("SPC_close", self.api.close())?;
        Ok(())
    }

    /// Initialization status of a module.
    ///
    /// The DLL returns init statuses and error codes through the same value, so the module
    /// number is range-checked here first.
    pub fn get_init_status(&self, mod_no: i16) -> Result<InitStatus> {
        check_mod_no(mod_no)?;
        InitStatus::from_code(self.api.get_init_status(mod_no))
    }

    pub fn get_mode(&self) -> Result<DllOperationMode> {
        let mode = spcm_check("SPC_get_mode", self.api.get_mode())?;
        DllOperationMode::from_code(mode)
    }

    /// Switches the operation mode and selects the modules to use.
    ///
    /// `in_use[i]` selects module `i`; missing entries count as not in use.
    pub fn set_mode(&self, mode: DllOperationMode, force_use: bool, in_use: &[bool]) -> Result<()> {
        if in_use.len() > MAX_NO_OF_SPC {
            return Err(SpcmError::TooManyModules {
                got: in_use.len(),
                max: MAX_NO_OF_SPC,
            });
        }
        let mut mask: [CInt32; MAX_NO_OF_SPC] = [0; MAX_NO_OF_SPC];
        for (slot, &used) in mask.iter_mut().zip(in_use) {
            *slot = used as CInt32;
        }
        spcm_check(
            "SPC_set_mode",
            self.api.set_mode(mode.code(), force_use as CShort, &mask),
        )?;
        Ok(())
    }

    pub fn test_id(&self, mod_no: i16) -> Result<ModuleType> {
        let module_type = spcm_check("SPC_test_id", self.api.test_id(mod_no))?;
        ModuleType::from_code(module_type)
    }

    pub fn get_module_info(&self, mod_no: i16) -> Result<ModInfo> {
        let mut info = SpcModInfo::default();
        spcm_check("SPC_get_module_info", self.api.get_module_info(mod_no, &mut info))?;
        ModInfo::try_from(&info)
    }

    /// FPGA version of the module, as a hex string.
    pub fn get_version(&self, mod_no: i16) -> Result<String> {
        let mut buf = [0u8; VERSION_BUF_LEN];
        spcm_check("SPC_get_version", self.api.get_version(mod_no, &mut buf))?;
        Ok(from_c_chars(&buf))
    }

    pub fn get_parameters(&self, mod_no: i16) -> Result<SpcData> {
        let mut data = SpcData::default();
        spcm_check("SPC_get_parameters", self.api.get_parameters(mod_no, &mut data))?;
        Ok(data)
    }

    pub fn set_parameters(&self, mod_no: i16, data: &SpcData) -> Result<()> {
        spcm_check("SPC_set_parameters", self.api.set_parameters(mod_no, data))?;
        Ok(())
    }

    /// Reads one parameter, typed according to `par_id`.
    pub fn get_parameter(&self, mod_no: i16, par_id: ParId) -> Result<ParValue> {
        let mut value = 0.0f32;
        spcm_check(
            "SPC_get_parameter",
            self.api.get_parameter(mod_no, par_id.value(), &mut value),
        )?;
        Ok(ParValue::from_f32(par_id.par_type(), value))
    }

    /// Writes one parameter. Values of the wrong type are rejected without calling the DLL.
    pub fn set_parameter(&self, mod_no: i16, par_id: ParId, value: ParValue) -> Result<()> {
        if value.par_type() != par_id.par_type() {
            return Err(SpcmError::ParameterType {
                name: par_id.name(),
                expected: par_id.par_type(),
            });
        }
        spcm_check(
            "SPC_set_parameter",
            self.api.set_parameter(mod_no, par_id.value(), value.as_f32()),
        )?;
        Ok(())
    }

    pub fn get_eeprom_data(&self, mod_no: i16) -> Result<EepData> {
        let mut eep = SpcEepData::default();
        spcm_check("SPC_get_eeprom_data", self.api.get_eeprom_data(mod_no, &mut eep))?;
        Ok(EepData::from(&eep))
    }

    pub fn get_adjust_parameters(&self, mod_no: i16) -> Result<AdjustPara> {
        let mut adj = AdjustPara::default();
        spcm_check(
            "SPC_get_adjust_parameters",
            self.api.get_adjust_parameters(mod_no, &mut adj),
        )?;
        Ok(adj)
    }

    pub fn read_parameters_from_inifile(&self, ini_file: &Path) -> Result<SpcData> {
        let ini = path_arg(ini_file)?;
        let mut data = SpcData::default();
        spcm_check(
            "SPC_read_parameters_from_inifile",
            self.api.read_parameters_from_inifile(&mut data, &ini),
        )?;
        Ok(data)
    }

    /// Writes `data` to `dest_inifile`.
    ///
    /// Sections other than the parameters are copied from `source_inifile`, or from the file
    /// passed to `init` when `None`.
    pub fn save_parameters_to_inifile(
        &self,
        data: &SpcData,
        dest_inifile: &Path,
        source_inifile: Option<&Path>,
        with_comments: bool,
    ) -> Result<()> {
        let dest = path_arg(dest_inifile)?;
        let source = source_inifile.map(path_arg).transpose()?;
        spcm_check(
            "SPC_save_parameters_to_inifile",
            self.api.save_parameters_to_inifile(
                data,
                &dest,
                source.as_deref(),
                with_comments as CInt32,
            ),
        )?;
        Ok(())
    }

    pub fn test_state(&self, mod_no: i16) -> Result<MeasurementState> {
        let mut state: CShort = 0;
        spcm_check("SPC_test_state", self.api.test_state(mod_no, &mut state))?;
        Ok(MeasurementState::from_bits_retain(state as u16))
    }

    pub fn get_sync_state(&self, mod_no: i16) -> Result<SyncState> {
        let mut state: CShort = 0;
        spcm_check("SPC_get_sync_state", self.api.get_sync_state(mod_no, &mut state))?;
        Ok(SyncState::from_bits_retain(state as u16))
    }

    pub fn get_time_from_start(&self, mod_no: i16) -> Result<f32> {
        let mut time = 0.0;
        spcm_check(
            "SPC_get_time_from_start",
            self.api.get_time_from_start(mod_no, &mut time),
        )?;
        Ok(time)
    }

    pub fn get_break_time(&self, mod_no: i16) -> Result<f32> {
        let mut time = 0.0;
        spcm_check("SPC_get_break_time", self.api.get_break_time(mod_no, &mut time))?;
        Ok(time)
    }

    pub fn get_actual_coltime(&self, mod_no: i16) -> Result<f32> {
        let mut time = 0.0;
        spcm_check(
            "SPC_get_actual_coltime",
            self.api.get_actual_coltime(mod_no, &mut time),
        )?;
        Ok(time)
    }

    pub fn clear_rates(&self, mod_no: i16) -> Result<()> {
        spcm_check("SPC_clear_rates", self.api.clear_rates(mod_no))?;
        Ok(())
    }

    /// Current count rates, or `None` if the rate counters have not completed a cycle yet.
    pub fn read_rates(&self, mod_no: i16) -> Result<Option<RateValues>> {
        let mut rates = RateValues::default();
        let status = self.api.read_rates(mod_no, &mut rates);
        if status == ErrorEnum::RatesNotRdy.code() {
            return Ok(None);
        }
        spcm_check("SPC_read_rates", status)?;
        Ok(Some(rates))
    }

    pub fn get_fifo_usage(&self, mod_no: i16) -> Result<f32> {
        let mut usage = 0.0;
        spcm_check("SPC_get_fifo_usage", self.api.get_fifo_usage(mod_no, &mut usage))?;
        Ok(usage)
    }

    pub fn start_measurement(&self, mod_no: i16) -> Result<()> {
        spcm_check("SPC_start_measurement", self.api.start_measurement(mod_no))?;
        Ok(())
    }

    pub fn stop_measurement(&self, mod_no: i16) -> Result<()> {
        spcm_check("SPC_stop_measurement", self.api.stop_measurement(mod_no))?;
        Ok(())
    }

    /// Reads FIFO words into `buf` and returns the number of words read.
    pub fn read_fifo(&self, mod_no: i16, buf: &mut [u16]) -> Result<usize> {
        let mut count = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        spcm_check("SPC_read_fifo", self.api.read_fifo(mod_no, &mut count, buf))?;
        Ok((count as usize).min(buf.len()))
    }

    /// Reads up to `max_words` FIFO words into a new array.
    pub fn read_fifo_to_array(&self, mod_no: i16, max_words: usize) -> Result<Array1<u16>> {
        let mut buf = vec![0u16; max_words];
        let n = self.read_fifo(mod_no, &mut buf)?;
        buf.truncate(n);
        Ok(Array1::from_vec(buf))
    }

    pub fn get_fifo_init_vars(&self, mod_no: i16) -> Result<FifoInitVars> {
        let mut fifo_type: CShort = 0;
        let mut stream_type: CShort = 0;
        let mut mt_clock: CInt32 = 0;
        let mut spc_header: u32 = 0;
        spcm_check(
            "SPC_get_fifo_init_vars",
            self.api.get_fifo_init_vars(
                mod_no,
                &mut fifo_type,
                &mut stream_type,
                &mut mt_clock,
                &mut spc_header,
            ),
        )?;
        Ok(FifoInitVars {
            fifo_type: FifoType::from_code(fifo_type)?,
            stream_type: StreamType::from_bits_retain(stream_type as u16 as i32),
            mt_clock,
            spc_header: spc_header.to_le_bytes(),
        })
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use spcm_backend::ini::{ini_file, minimal_spcm_ini};
    use spcm_backend::parameter::ParType;

    fn spc150() -> Spcm {
        let spcm = Spcm::mock();
        let ini = ini_file(&minimal_spcm_ini(150)).unwrap();
        spcm.init(ini.path()).unwrap();
        spcm
    }

    #[test]
    fn init_status_checks_module_number_locally() {
        let spcm = spc150();
        assert_eq!(spcm.get_init_status(0).unwrap(), InitStatus::Ok);
        assert!(spcm.get_init_status(1000).unwrap_err().is(ErrorEnum::ModNo));
        assert!(spcm.get_init_status(-1).unwrap_err().is(ErrorEnum::ModNo));
    }

    #[test]
    fn too_many_modules() {
        let spcm = spc150();
        let in_use = [true; MAX_NO_OF_SPC + 1];
        assert!(matches!(
            spcm.set_mode(DllOperationMode::SimulateSpc150, false, &in_use),
            Err(SpcmError::TooManyModules { got: 33, max: 32 })
        ));
        // 32 entries are fine
        spcm.set_mode(DllOperationMode::SimulateSpc150, false, &in_use[..MAX_NO_OF_SPC])
            .unwrap();
    }

    #[test]
    fn parameter_types_checked_before_call() {
        let spcm = spc150();
        let err = spcm
            .set_parameter(0, ParId::Mode, ParValue::Float(1.0))
            .unwrap_err();
        assert!(matches!(err, SpcmError::ParameterType { expected: ParType::Int, .. }));

        spcm.set_parameter(0, ParId::CfdLimitLow, ParValue::Float(-10.0))
            .unwrap();
        match spcm.get_parameter(0, ParId::CfdLimitLow).unwrap() {
            ParValue::Float(v) => assert!((v + 10.0).abs() < 0.5),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rates_not_ready_is_none() {
        let spcm = spc150();
        assert_eq!(spcm.read_rates(0).unwrap(), None);
        spcm.clear_rates(0).unwrap();
        assert!(spcm.read_rates(0).unwrap().unwrap().sync_rate > 0.0);
    }

    #[test]
    fn fifo_init_vars_for_spc150() {
        let spcm = spc150();
        spcm.set_parameter(0, ParId::Mode, ParValue::Int(1)).unwrap();
        spcm.set_parameter(0, ParId::MacroTimeClk, ParValue::Int(0)).unwrap();
        let vars = spcm.get_fifo_init_vars(0).unwrap();
        assert_eq!(vars.fifo_type, FifoType::Spc150);
        assert!(vars.stream_type.contains(StreamType::HAS_SPC_HEADER));
        assert_eq!(vars.mt_clock, 250);
        assert_eq!(vars.spc_header, [250, 0, 0, (4 << 3) | (1 << 7)]);
    }

    #[test]
    fn read_fifo_to_array_truncates() {
        let spcm = spc150();
        spcm.set_parameter(0, ParId::Mode, ParValue::Int(1)).unwrap();
        let empty = spcm.read_fifo_to_array(0, 64).unwrap();
        assert_eq!(empty.len(), 0);
    }
}
