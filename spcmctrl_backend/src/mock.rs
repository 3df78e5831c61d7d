//! In-process simulator implementing [`SpcmApi`] (`mock` feature).
//!
//! `MockSpcm` behaves like SPCM-DLL running in one of its simulation modes, closely enough to
//! drive [`crate::spcm::Spcm`] and the diagnostic dump without the vendor software:
//!
//! * `init` validates the `.ini` file the way the DLL does (missing file: `OPEN_FILE`, missing
//!   `; SPCM` marker: `FILE_NVALID`), reads `simulation = N` and applies `[spc_module]` keys.
//!   Hardware mode (`N = 0`) finds no modules and fails with `NO_ACT_MOD`.
//! * All 32 module slots hold a simulated module of the selected type. `set_mode` enables the
//!   modules selected by its `in_use` mask; disabled modules report `NOT_ACTIVE` for
//!   module-level calls but still answer `get_module_info` and `get_init_status`.
//! * A started measurement stays armed until stopped, or until `collect_time` elapses when
//!   `stop_on_time` is set. In FIFO mode (`mode = 1`) `read_fifo` delivers synthetic photon
//!   records at a fixed rate for the time the measurement was armed. The simulated FIFO holds
//!   [`FIFO_DEPTH`] words; photons arriving while it is full are lost and set `FIFO_OVERFLOW`,
//!   and with `stop_on_ovfl` set the measurement stops.
//! * Rates become ready after `clear_rates`.

use std::collections::VecDeque;
use std::ffi::CStr;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use spcm_backend::data::SpcData;
use spcm_backend::enums::{
    DllOperationMode, FifoType, InUseStatus, InitStatus, MeasurementState, ModuleType, StreamType,
    SyncState,
};
use spcm_backend::error::ErrorEnum;
use spcm_backend::fifo::{EventRecord, FifoInitVars};
use spcm_backend::ini::{is_spcm_ini, parse_ini};
use spcm_backend::parameter::{ParId, ParType, ParValue};
use spcm_backend::records::{to_c_chars, AdjustPara, RateValues, SpcEepData, SpcModInfo};

use crate::api::{SpcmApi, MAX_NO_OF_SPC, VERSION_BUF_LEN};
use crate::ffi::{CInt32, CShort};

/// Photon rate of the simulated detector, in counts per second.
pub const PHOTON_RATE: f64 = 1e5;
/// Simulated sync (laser repetition) rate.
pub const SYNC_RATE: f32 = 80e6;

const FIFO_MODE: u16 = 1;
const ROUTING_BITS: u8 = 4;
const MACROTIME_PERIOD: u32 = 1 << 12;
/// Capacity of the simulated FIFO, in 16-bit words.
pub const FIFO_DEPTH: usize = 1 << 16;

fn status(kind: ErrorEnum) -> CShort {
    kind.code()
}

/// Parameter defaults of a freshly initialized simulated module.
pub fn simulator_defaults() -> SpcData {
    SpcData {
        cfd_limit_low: 5.0,
        cfd_limit_high: 80.0,
        cfd_zc_level: 0.0,
        cfd_holdoff: 5.0,
        sync_zc_level: 0.0,
        sync_holdoff: 4.0,
        sync_threshold: -19.6,
        tac_range: 50.0,
        sync_freq_div: 4,
        tac_gain: 1,
        tac_limit_high: 95.0,
        tac_limit_low: 5.0,
        adc_resolution: 10,
        collect_time: 1.0,
        display_time: 1.0,
        repeat_time: 10.0,
        stop_on_time: 1,
        stop_on_ovfl: 1,
        count_incr: 1,
        dead_time_comp: 1,
        rate_count_time: 1.0,
        ..Default::default()
    }
}

/// Applies `[spc_module]` keys of an `.ini` text to `data`. Unknown keys are ignored.
fn apply_ini_parameters(text: &str, data: &mut SpcData) -> Result<(), ErrorEnum> {
    let sections = parse_ini(text);
    let Some(module) = sections.get("spc_module") else {
        return Ok(());
    };
    for (key, value) in module {
        let Ok(par_id) = ParId::from_name(key) else {
            continue;
        };
        let number: f64 = value.parse().map_err(|_| ErrorEnum::ReadStr)?;
        let value = match par_id.par_type() {
            ParType::Int => ParValue::Int(number.round() as i64),
            ParType::Float => ParValue::Float(number),
        };
        data.set(par_id, value).map_err(|_| ErrorEnum::BadParaVal)?;
    }
    Ok(())
}

fn read_ini(path: &CStr) -> Result<String, ErrorEnum> {
    let path = PathBuf::from(path.to_string_lossy().into_owned());
    let text = fs::read_to_string(path).map_err(|_| ErrorEnum::OpenFile)?;
    if !is_spcm_ini(&text) {
        return Err(ErrorEnum::FileNvalid);
    }
    Ok(text)
}

struct Measurement {
    started: Instant,
    stopped_after: Option<f64>,
    photons_emitted: u64,
    macrotime: u32,
    lcg: u32,
    pending: VecDeque<u16>,
    fifo_depth: usize,
    fifo_overflow: bool,
    time_over: bool,
}

impl Measurement {
    fn new(seed: u32) -> Self {
        Self {
            started: Instant::now(),
            stopped_after: None,
            photons_emitted: 0,
            macrotime: 0,
            lcg: seed,
            pending: VecDeque::new(),
            fifo_depth: FIFO_DEPTH,
            fifo_overflow: false,
            time_over: false,
        }
    }

    fn elapsed(&self) -> f64 {
        self.stopped_after
            .unwrap_or_else(|| self.started.elapsed().as_secs_f64())
    }

    /// Queues the photons due by now, each advancing the macrotime by one step. Photons that do
    /// not fit in the FIFO are dropped.
    fn generate(&mut self) {
        let due = (self.elapsed() * PHOTON_RATE) as u64;
        while self.photons_emitted < due {
            if self.pending.len() + 2 > self.fifo_depth {
                self.fifo_overflow = true;
                self.photons_emitted = due;
                break;
            }
            self.lcg = self.lcg.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let step = 1 + (self.lcg >> 24) % 64;
            self.macrotime += step;
            let mtov = self.macrotime >= MACROTIME_PERIOD;
            self.macrotime %= MACROTIME_PERIOD;
            let record = EventRecord {
                invalid: false,
                mtov,
                gap: false,
                mark: false,
                adc: ((self.lcg >> 8) & 0xfff) as u16,
                routing: 0,
                macrotime: self.macrotime as u16,
            }
            .encode();
            self.pending.push_back((record & 0xffff) as u16);
            self.pending.push_back((record >> 16) as u16);
            self.photons_emitted += 1;
        }
    }
}

struct SimModule {
    enabled: bool,
    init: InitStatus,
    data: SpcData,
    armed: bool,
    measurement: Option<Measurement>,
    rates_ready: bool,
}

impl SimModule {
    fn new() -> Self {
        Self {
            enabled: false,
            init: InitStatus::NotDone,
            data: simulator_defaults(),
            armed: false,
            measurement: None,
            rates_ready: false,
        }
    }

    /// Disarms when the collection time of a timed measurement has run out, or when the FIFO
    /// overflowed and `stop_on_ovfl` is set.
    fn update(&mut self) {
        if !self.armed {
            return;
        }
        let Some(m) = self.measurement.as_mut() else {
            return;
        };
        if self.data.stop_on_time != 0 {
            let collect_time = f64::from(self.data.collect_time);
            if m.started.elapsed().as_secs_f64() >= collect_time {
                m.stopped_after = Some(collect_time);
                m.time_over = true;
                self.armed = false;
            }
        }
        if self.data.mode == FIFO_MODE {
            m.generate();
            if m.fifo_overflow && self.data.stop_on_ovfl != 0 && self.armed {
                m.stopped_after = Some(m.started.elapsed().as_secs_f64());
                self.armed = false;
            }
        }
    }
}

struct SimState {
    initialized: bool,
    mode: DllOperationMode,
    ini_path: Option<PathBuf>,
    modules: Vec<SimModule>,
}

impl SimState {
    fn module_type(&self) -> ModuleType {
        self.mode.simulated_module().unwrap_or(ModuleType::Unknown)
    }

    fn module(&mut self, mod_no: CShort) -> Result<&mut SimModule, ErrorEnum> {
        usize::try_from(mod_no)
            .ok()
            .and_then(|i| self.modules.get_mut(i))
            .ok_or(ErrorEnum::ModNo)
    }

    fn active_module(&mut self, mod_no: CShort) -> Result<&mut SimModule, ErrorEnum> {
        if !self.initialized {
            return Err(ErrorEnum::NotInit);
        }
        let module = self.module(mod_no)?;
        if !module.enabled {
            return Err(ErrorEnum::NotActive);
        }
        module.update();
        Ok(module)
    }

    fn fifo_type(&self) -> FifoType {
        match self.module_type() {
            ModuleType::Spc130 | ModuleType::Spc130Em => FifoType::Spc130,
            ModuleType::Spc140 => FifoType::Spc140,
            ModuleType::Spc830 | ModuleType::Spc930 => FifoType::Spc830,
            ModuleType::Spc600 | ModuleType::Spc630 => FifoType::Spc600_32,
            ModuleType::Dpc230 => FifoType::Dpc230,
            _ => FifoType::Spc150,
        }
    }
}

/// Simulated SPCM-DLL.
pub struct MockSpcm {
    state: Mutex<SimState>,
}

impl Default for MockSpcm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSpcm {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                initialized: false,
                mode: DllOperationMode::Hardware,
                ini_path: None,
                modules: (0..MAX_NO_OF_SPC).map(|_| SimModule::new()).collect(),
            }),
        }
    }

    /// Runs `f` on the simulator state, turning `Err(kind)` into the DLL's status code.
    fn with_state<F>(&self, func: &'static str, f: F) -> CShort
    where
        F: FnOnce(&mut SimState) -> Result<CShort, ErrorEnum>,
    {
        let mut state = self.state.lock();
        let status = match f(&mut state) {
            Ok(payload) => payload,
            Err(kind) => status(kind),
        };
        debug!(func, status, "simulated SPCM call");
        status
    }

    fn with_active<F>(&self, func: &'static str, mod_no: CShort, f: F) -> CShort
    where
        F: FnOnce(&mut SimModule) -> Result<CShort, ErrorEnum>,
    {
        self.with_state(func, |state| f(state.active_module(mod_no)?))
    }
}

impl SpcmApi for MockSpcm {
    fn init(&self, ini_file: &CStr) -> CShort {
        self.with_state("SPC_init", |state| {
            let text = read_ini(ini_file)?;
            let sections = parse_ini(&text);
            let simulation = sections
                .get("spc_base")
                .and_then(|base| base.get("simulation"))
                .map(|v| v.parse::<i16>().map_err(|_| ErrorEnum::ReadStr))
                .transpose()?
                .unwrap_or(0);
            let mode = DllOperationMode::from_code(simulation).map_err(|_| ErrorEnum::BadParaVal)?;
            let mut data = simulator_defaults();
            apply_ini_parameters(&text, &mut data)?;

            state.ini_path = Some(PathBuf::from(ini_file.to_string_lossy().into_owned()));
            state.mode = mode;
            if mode == DllOperationMode::Hardware {
                state.initialized = false;
                return Err(ErrorEnum::NoActMod);
            }
            state.initialized = true;
            for module in state.modules.iter_mut() {
                *module = SimModule::new();
                module.enabled = true;
                module.init = InitStatus::Ok;
                module.data = data;
            }
            Ok(0)
        })
    }

    fn close(&self) -> CShort {
        self.with_state("SPC_close", |state| {
            state.initialized = false;
            for module in state.modules.iter_mut() {
                module.enabled = false;
                module.armed = false;
                module.init = InitStatus::NotDone;
            }
            Ok(0)
        })
    }

    fn get_init_status(&self, mod_no: CShort) -> CShort {
        self.with_state("SPC_get_init_status", |state| Ok(state.module(mod_no)?.init.code()))
    }

    fn get_mode(&self) -> CShort {
        self.with_state("SPC_get_mode", |state| {
            if !state.initialized {
                return Err(ErrorEnum::NotInit);
            }
            Ok(state.mode.code())
        })
    }

    fn set_mode(&self, mode: CShort, _force_use: CShort, in_use: &[CInt32; MAX_NO_OF_SPC]) -> CShort {
        self.with_state("SPC_set_mode", |state| {
            let mode = DllOperationMode::from_code(mode).map_err(|_| ErrorEnum::BadParaVal)?;
            if mode == DllOperationMode::Hardware || in_use.iter().all(|&u| u == 0) {
                return Err(ErrorEnum::NoActMod);
            }
            state.mode = mode;
            state.initialized = true;
            for (module, &use_it) in state.modules.iter_mut().zip(in_use.iter()) {
                module.enabled = use_it != 0;
                module.init = if module.enabled {
                    InitStatus::Ok
                } else {
                    InitStatus::NotDone
                };
                if !module.enabled {
                    module.armed = false;
                }
            }
            Ok(0)
        })
    }

    fn test_id(&self, mod_no: CShort) -> CShort {
        self.with_state("SPC_test_id", |state| {
            let module_type = state.module_type();
            let module = state.module(mod_no)?;
            if !module.enabled {
                return Err(ErrorEnum::NotActive);
            }
            Ok(module_type.code())
        })
    }

    fn get_module_info(&self, mod_no: CShort, mod_info: &mut SpcModInfo) -> CShort {
        self.with_state("SPC_get_module_info", |state| {
            let module_type = state.module_type();
            let module = state.module(mod_no)?;
            *mod_info = SpcModInfo {
                module_type: module_type.code(),
                bus_number: 0,
                slot_number: mod_no,
                in_use: if module.enabled {
                    InUseStatus::InUseHere.code()
                } else {
                    InUseStatus::NotInUse.code()
                },
                init: module.init.code(),
                base_adr: 0,
            };
            Ok(0)
        })
    }

    fn get_version(&self, mod_no: CShort, version: &mut [u8; VERSION_BUF_LEN]) -> CShort {
        self.with_active("SPC_get_version", mod_no, |_| {
            *version = to_c_chars("0");
            Ok(0)
        })
    }

    fn get_parameters(&self, mod_no: CShort, data: &mut SpcData) -> CShort {
        self.with_state("SPC_get_parameters", |state| {
            let module = state.active_module(mod_no)?;
            *data = module.data;
            data.init = module.init.code();
            data.pci_card_no = mod_no;
            Ok(0)
        })
    }

    fn set_parameters(&self, mod_no: CShort, data: &SpcData) -> CShort {
        self.with_active("SPC_set_parameters", mod_no, |module| {
            let internal = module.data;
            module.data = SpcData {
                base_adr: internal.base_adr,
                init: internal.init,
                pci_card_no: internal.pci_card_no,
                test_eep: internal.test_eep,
                ..*data
            };
            Ok(0)
        })
    }

    fn get_parameter(&self, mod_no: CShort, par_id: CShort, value: &mut f32) -> CShort {
        self.with_active("SPC_get_parameter", mod_no, |module| {
            let par_id = ParId::from_value(par_id).map_err(|_| ErrorEnum::BadPara)?;
            *value = module.data.get(par_id).as_f32();
            Ok(0)
        })
    }

    fn set_parameter(&self, mod_no: CShort, par_id: CShort, value: f32) -> CShort {
        self.with_active("SPC_set_parameter", mod_no, |module| {
            let par_id = ParId::from_value(par_id).map_err(|_| ErrorEnum::BadPara)?;
            let value = ParValue::from_f32(par_id.par_type(), value);
            module
                .data
                .set(par_id, value)
                .map_err(|_| ErrorEnum::BadParaVal)?;
            Ok(0)
        })
    }

    fn get_eeprom_data(&self, mod_no: CShort, eep_data: &mut SpcEepData) -> CShort {
        self.with_state("SPC_get_eeprom_data", |state| {
            let module_type = state.module_type();
            state.active_module(mod_no)?;
            *eep_data = SpcEepData {
                module_type: to_c_chars(&module_type.eeprom_name()),
                serial_no: to_c_chars(&format!("SIM{:05}", mod_no)),
                date: to_c_chars("01.01.2024"),
                adj_para: simulated_adjust_para(),
            };
            Ok(0)
        })
    }

    fn get_adjust_parameters(&self, mod_no: CShort, adj_para: &mut AdjustPara) -> CShort {
        self.with_active("SPC_get_adjust_parameters", mod_no, |_| {
            *adj_para = simulated_adjust_para();
            Ok(0)
        })
    }

    fn read_parameters_from_inifile(&self, data: &mut SpcData, ini_file: &CStr) -> CShort {
        self.with_state("SPC_read_parameters_from_inifile", |_| {
            let text = read_ini(ini_file)?;
            let mut read = simulator_defaults();
            apply_ini_parameters(&text, &mut read)?;
            *data = read;
            Ok(0)
        })
    }

    fn save_parameters_to_inifile(
        &self,
        data: &SpcData,
        dest_inifile: &CStr,
        source_inifile: Option<&CStr>,
        with_comments: CInt32,
    ) -> CShort {
        self.with_state("SPC_save_parameters_to_inifile", |state| {
            let source = match source_inifile {
                Some(source) => read_ini(source)?,
                None => {
                    let path = state.ini_path.as_ref().ok_or(ErrorEnum::NotInit)?;
                    fs::read_to_string(path).map_err(|_| ErrorEnum::OpenFile)?
                }
            };
            let mut text = String::from("; SPCM parameters\n");
            for (section, keys) in parse_ini(&source) {
                if section.is_empty() || section == "spc_module" {
                    continue;
                }
                let _ = writeln!(text, "[{}]", section);
                for (key, value) in keys {
                    let _ = writeln!(text, "{} = {}", key, value);
                }
            }
            text.push_str("[spc_module]\n");
            for (name, value) in data.items() {
                if with_comments != 0 {
                    let _ = writeln!(text, "; {} ({})", name, value.par_type());
                }
                let _ = writeln!(text, "{} = {}", name, value);
            }
            let dest = PathBuf::from(dest_inifile.to_string_lossy().into_owned());
            fs::write(dest, text).map_err(|_| ErrorEnum::OpenFile)?;
            Ok(0)
        })
    }

    fn test_state(&self, mod_no: CShort, state: &mut CShort) -> CShort {
        self.with_active("SPC_test_state", mod_no, |module| {
            let mut flags = MeasurementState::empty();
            if module.armed {
                flags |= MeasurementState::ARMED;
            }
            if let Some(m) = module.measurement.as_mut() {
                if m.time_over {
                    flags |= MeasurementState::COLLECTION_TIME_OVER | MeasurementState::TIME_OVER;
                }
                if module.data.mode == FIFO_MODE {
                    m.generate();
                    if m.pending.is_empty() {
                        flags |= MeasurementState::FIFO_EMPTY;
                    }
                    if m.fifo_overflow {
                        flags |= MeasurementState::FIFO_OVERFLOW;
                    }
                }
            }
            *state = flags.bits() as CShort;
            Ok(0)
        })
    }

    fn get_sync_state(&self, mod_no: CShort, sync_state: &mut CShort) -> CShort {
        self.with_active("SPC_get_sync_state", mod_no, |_| {
            *sync_state = SyncState::SYNC_OK.bits() as CShort;
            Ok(0)
        })
    }

    fn get_time_from_start(&self, mod_no: CShort, time: &mut f32) -> CShort {
        self.with_active("SPC_get_time_from_start", mod_no, |module| {
            *time = module.measurement.as_ref().map_or(0.0, |m| m.elapsed() as f32);
            Ok(0)
        })
    }

    fn get_break_time(&self, mod_no: CShort, time: &mut f32) -> CShort {
        self.with_active("SPC_get_break_time", mod_no, |module| {
            *time = module
                .measurement
                .as_ref()
                .and_then(|m| m.stopped_after)
                .unwrap_or(0.0) as f32;
            Ok(0)
        })
    }

    fn get_actual_coltime(&self, mod_no: CShort, time: &mut f32) -> CShort {
        self.with_active("SPC_get_actual_coltime", mod_no, |module| {
            let elapsed = module.measurement.as_ref().map_or(0.0, |m| m.elapsed() as f32);
            *time = elapsed.min(module.data.collect_time);
            Ok(0)
        })
    }

    fn clear_rates(&self, mod_no: CShort) -> CShort {
        self.with_active("SPC_clear_rates", mod_no, |module| {
            module.rates_ready = true;
            Ok(0)
        })
    }

    fn read_rates(&self, mod_no: CShort, rates: &mut RateValues) -> CShort {
        self.with_active("SPC_read_rates", mod_no, |module| {
            if !module.rates_ready {
                return Err(ErrorEnum::RatesNotRdy);
            }
            let photon_rate = PHOTON_RATE as f32;
            *rates = RateValues {
                sync_rate: SYNC_RATE,
                cfd_rate: photon_rate,
                tac_rate: photon_rate,
                adc_rate: photon_rate * 0.95,
            };
            Ok(0)
        })
    }

    fn get_fifo_usage(&self, mod_no: CShort, usage_degree: &mut f32) -> CShort {
        self.with_active("SPC_get_fifo_usage", mod_no, |module| {
            if module.data.mode != FIFO_MODE {
                return Err(ErrorEnum::BadFunc);
            }
            // Words are handed out as fast as they are produced
            *usage_degree = 0.0;
            Ok(0)
        })
    }

    fn start_measurement(&self, mod_no: CShort) -> CShort {
        self.with_active("SPC_start_measurement", mod_no, |module| {
            let seed = 0x5eed_0000 | mod_no as u16 as u32;
            module.measurement = Some(Measurement::new(seed));
            module.armed = true;
            Ok(0)
        })
    }

    fn stop_measurement(&self, mod_no: CShort) -> CShort {
        self.with_active("SPC_stop_measurement", mod_no, |module| {
            if module.armed {
                if let Some(m) = module.measurement.as_mut() {
                    m.stopped_after = Some(m.started.elapsed().as_secs_f64());
                }
            }
            module.armed = false;
            Ok(0)
        })
    }

    fn read_fifo(&self, mod_no: CShort, count: &mut u32, data: &mut [u16]) -> CShort {
        self.with_active("SPC_read_fifo", mod_no, |module| {
            if module.data.mode != FIFO_MODE {
                return Err(ErrorEnum::BadFunc);
            }
            // Whole records only
            let capacity = (*count as usize).min(data.len()) & !1;
            let mut n = 0;
            if let Some(m) = module.measurement.as_mut() {
                m.generate();
                while n < capacity {
                    match m.pending.pop_front() {
                        Some(word) => data[n] = word,
                        None => break,
                    }
                    n += 1;
                }
            }
            *count = n as u32;
            Ok(0)
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
        self.with_state("SPC_get_fifo_init_vars", |state| {
            let simulated_fifo_type = state.fifo_type();
            let module = state.active_module(mod_no)?;
            if module.data.mode != FIFO_MODE {
                return Err(ErrorEnum::BadFunc);
            }
            // 0.1 ns units: 25 ns internal clock, 12.5 ns otherwise
            let clock = if module.data.macro_time_clk == 0 { 250 } else { 125 };
            *fifo_type = simulated_fifo_type.code();
            *stream_type = (StreamType::BH_STREAM | StreamType::HAS_SPC_HEADER).bits() as CShort;
            *mt_clock = clock;
            *spc_header = u32::from_le_bytes(FifoInitVars::spc_header_for(clock, ROUTING_BITS));
            Ok(0)
        })
    }
}

fn simulated_adjust_para() -> AdjustPara {
    AdjustPara {
        vrt1: 100,
        vrt2: 100,
        vrt3: 100,
        dith_width: 2000,
        gain_1: 2000,
        gain_2: 2000,
        gain_4: 2000,
        gain_8: 2000,
        tac_r0: 1000,
        tac_r1: 1000,
        tac_r2: 1000,
        tac_r4: 1000,
        tac_r8: 1000,
        sync_div: 0,
    }
}
