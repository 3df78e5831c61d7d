#![cfg(feature = "mock")]

use std::time::{Duration, Instant};

use spcm_backend::*;
use spcmctrl_backend::{dump_state, Spcm};

fn spc150() -> (Spcm, IniFile) {
    let spcm = Spcm::mock();
    let ini = ini_file(&minimal_spcm_ini(150)).unwrap();
    spcm.init(ini.path()).unwrap();
    (spcm, ini)
}

#[test]
fn init_with_hardware_mode_finds_no_modules() {
    let spcm = Spcm::mock();
    let ini = ini_file(&minimal_spcm_ini(0)).unwrap();
    let err = spcm.init(ini.path()).unwrap_err();
    assert!(err.is(ErrorEnum::NoActMod));
}

#[test]
fn init_rejects_files_without_marker() {
    let spcm = Spcm::mock();
    let ini = ini_file("[spc_base]\nsimulation = 150\n").unwrap();
    assert!(spcm.init(ini.path()).unwrap_err().is(ErrorEnum::FileNvalid));

    let missing = ini.path().with_file_name("missing.ini");
    assert!(spcm.init(&missing).unwrap_err().is(ErrorEnum::OpenFile));
}

#[test]
fn set_mode_selects_modules() {
    let (spcm, _ini) = spc150();
    assert_eq!(spcm.get_mode().unwrap(), DllOperationMode::SimulateSpc150);
    assert_eq!(spcm.test_id(0).unwrap(), ModuleType::Spc150);

    let err = spcm
        .set_mode(DllOperationMode::SimulateSpc150, false, &[false; 4])
        .unwrap_err();
    assert!(err.is(ErrorEnum::NoActMod));

    spcm.set_mode(DllOperationMode::SimulateSpc150, false, &[true])
        .unwrap();
    assert_eq!(spcm.get_init_status(0).unwrap(), InitStatus::Ok);
    assert_eq!(spcm.get_init_status(1).unwrap(), InitStatus::NotDone);
    assert!(spcm.test_id(1).unwrap_err().is(ErrorEnum::NotActive));

    let info = spcm.get_module_info(1).unwrap();
    assert_eq!(info.module_type, ModuleType::Spc150);
    assert_eq!(info.in_use, InUseStatus::NotInUse);
    assert_eq!(info.init, InitStatus::NotDone);
    assert_eq!(
        info.to_string(),
        "<ModInfo(module_type=<ModuleType.SPC_150: 150>, bus_number=0, slot_number=1, \
         in_use=<InUseStatus.NOT_IN_USE: 0>, init=<InitStatus.NOT_DONE: -1>)>"
    );
}

#[test]
fn module_queries() {
    let (spcm, _ini) = spc150();
    assert_eq!(spcm.get_version(0).unwrap(), "0");

    let eep = spcm.get_eeprom_data(0).unwrap();
    assert_eq!(eep.module_type, "SPC-150");
    assert_eq!(eep.adj_para, spcm.get_adjust_parameters(0).unwrap());

    assert_eq!(spcm.get_sync_state(0).unwrap(), SyncState::SYNC_OK);
    assert!(!spcm.test_state(0).unwrap().contains(MeasurementState::ARMED));
}

#[test]
fn parameters_round_trip_through_module() {
    let (spcm, _ini) = spc150();
    let mut data = spcm.get_parameters(0).unwrap();
    data.collect_time = 2.5;
    data.adc_resolution = 8;
    spcm.set_parameters(0, &data).unwrap();

    let read = spcm.get_parameters(0).unwrap();
    assert_eq!(read.collect_time, 2.5);
    assert_eq!(read.adc_resolution, 8);
    assert_eq!(
        spcm.get_parameter(0, ParId::AdcResolution).unwrap(),
        ParValue::Int(8)
    );

    spcm.set_parameter(0, ParId::SyncFreqDiv, ParValue::Int(2))
        .unwrap();
    assert_eq!(spcm.get_parameters(0).unwrap().sync_freq_div, 2);
}

#[test]
fn ini_file_parameters() {
    let (spcm, ini) = spc150();
    let data = spcm.read_parameters_from_inifile(ini.path()).unwrap();
    assert_eq!(data.add_select, 0);

    let dest = ini.path().with_file_name("saved.ini");
    spcm.save_parameters_to_inifile(&SpcData::default(), &dest, None, true)
        .unwrap();
    let saved = std::fs::read_to_string(&dest).unwrap();
    assert!(is_spcm_ini(&saved));

    let read = spcm.read_parameters_from_inifile(&dest).unwrap();
    assert_eq!(read.sync_threshold, 0.0);
    assert_eq!(read.diff(&SpcData::default()).len(), 0);
}

#[test]
fn rates_need_clear_first() {
    let (spcm, _ini) = spc150();
    assert_eq!(spcm.read_rates(0).unwrap(), None);
    spcm.clear_rates(0).unwrap();
    let rates = spcm.read_rates(0).unwrap().unwrap();
    assert!(rates.sync_rate > 0.0);
}

#[test]
fn fifo_acquisition_yields_photons() {
    let (spcm, _ini) = spc150();
    spcm.set_parameter(0, ParId::Mode, ParValue::Int(1)).unwrap();
    spcm.set_parameter(0, ParId::CollectTime, ParValue::Float(0.05))
        .unwrap();
    spcm.set_parameter(0, ParId::StopOnTime, ParValue::Int(1))
        .unwrap();
    assert_eq!(spcm.get_fifo_usage(0).unwrap(), 0.0);

    let init_vars = spcm.get_fifo_init_vars(0).unwrap();
    assert_eq!(init_vars.fifo_type, FifoType::Spc150);
    assert!(init_vars.stream_type.contains(StreamType::HAS_SPC_HEADER));
    assert_eq!(init_vars.mt_clock, 250);
    assert_eq!(init_vars.header_mt_clock(), 250);

    spcm.start_measurement(0).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut words = Vec::new();
    loop {
        let state = spcm.test_state(0).unwrap();
        let chunk = spcm.read_fifo_to_array(0, 1 << 12).unwrap();
        words.extend(chunk.iter().copied());
        if !state.contains(MeasurementState::ARMED) && chunk.is_empty() {
            break;
        }
        assert!(Instant::now() < deadline, "measurement did not stop");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(words.len() % 2, 0);
    assert!(spcm.get_break_time(0).unwrap() > 0.0);

    let photons = records_from_words(&words)
        .into_iter()
        .map(EventRecord::decode)
        .filter(EventRecord::is_photon)
        .count();
    assert!(photons > 0);
}

#[test]
fn measurement_can_be_stopped() {
    let (spcm, _ini) = spc150();
    spcm.set_parameter(0, ParId::StopOnTime, ParValue::Int(0))
        .unwrap();
    spcm.start_measurement(0).unwrap();
    assert!(spcm.test_state(0).unwrap().contains(MeasurementState::ARMED));
    spcm.stop_measurement(0).unwrap();
    assert!(!spcm.test_state(0).unwrap().contains(MeasurementState::ARMED));
}

#[test]
fn fifo_functions_need_fifo_mode() {
    let (spcm, _ini) = spc150();
    spcm.set_parameter(0, ParId::Mode, ParValue::Int(0)).unwrap();
    assert!(spcm.get_fifo_init_vars(0).unwrap_err().is(ErrorEnum::BadFunc));
    let mut buf = [0u16; 8];
    assert!(spcm.read_fifo(0, &mut buf).unwrap_err().is(ErrorEnum::BadFunc));
}

#[test]
fn dump_reports_modules() {
    let (spcm, _ini) = spc150();
    spcm.set_mode(DllOperationMode::SimulateSpc150, false, &[true])
        .unwrap();

    let mut out = Vec::new();
    dump_state(&spcm, Some(&[0, 1]), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("<DllOperationMode.SIMULATE_SPC_150: 150>\n\nModule 0: "));
    assert!(text.contains("  EEPData.serial_no:   SIM00000\n"));
    assert!(text.contains("  Sync state:          <SyncState.SYNC_OK: 1>\n"));
    assert!(text.ends_with("\nModule 1 is not active\n"));
}

#[test]
fn closed_dll_is_not_initialized() {
    let (spcm, _ini) = spc150();
    spcm.close().unwrap();
    assert!(spcm.get_mode().unwrap_err().is(ErrorEnum::NotInit));
    assert!(spcm.get_parameters(0).unwrap_err().is(ErrorEnum::NotInit));
}
