use spcm_backend::*;

#[test]
fn every_parameter_round_trips_through_the_view() {
    let mut data = SpcData::default();
    for &par_id in ParId::ALL {
        let value = match par_id.par_type() {
            ParType::Int => ParValue::Int(1),
            ParType::Float => ParValue::Float(1.0),
        };
        data.set_by_name(par_id.name(), value).unwrap();
        let dict = data.as_dict();
        assert_eq!(dict[par_id.name()], value);
    }
    // Every view field is now non-default
    assert_eq!(data.diff(&SpcData::default()).len(), ParId::ALL.len());
}

#[test]
fn view_order_matches_id_order() {
    let names: Vec<&str> = SpcData::default().items().map(|(name, _)| name).collect();
    let ids: Vec<String> = ParId::ALL.iter().map(|p| p.to_string().to_lowercase()).collect();
    assert_eq!(names, ids);
}

#[test]
fn error_strings_cover_every_named_code() {
    for &kind in ErrorEnum::ALL {
        let msg = error_string(kind.code() as i64).unwrap();
        assert!(!msg.starts_with("Unknown"), "{}", kind);
        assert_eq!(msg, kind.message());
    }
}

#[test]
fn dll_error_from_status() {
    let err = check(-13).unwrap_err();
    assert!(err.is(ErrorEnum::ModNo));
    assert_eq!(err.kind(), Some(ErrorEnum::ModNo));
    assert!(!SpcmError::UnsupportedPlatform.is(ErrorEnum::ModNo));
}

#[test]
fn temporary_ini_round_trip() {
    let text = minimal_spcm_ini(DllOperationMode::SimulateSpc180N.code());
    let ini = ini_file(&text).unwrap();
    let read = std::fs::read_to_string(ini.path()).unwrap();
    assert_eq!(read, text);
    assert!(is_spcm_ini(&read));
    assert_eq!(parse_ini(&read)["spc_base"]["simulation"], "180");

    let path = ini.path().to_path_buf();
    drop(ini);
    assert!(!path.exists());
}

#[test]
fn fifo_words_decode_to_photons() {
    let photon = EventRecord {
        invalid: false,
        mtov: false,
        gap: false,
        mark: false,
        adc: 1000,
        routing: 2,
        macrotime: 77,
    };
    let overflow = INVALID | MTOV | 3;
    let words = words_from_records(&[photon.encode(), overflow]);
    assert_eq!(words.len(), 4);

    let records = records_from_words(&words);
    let decoded: Vec<EventRecord> = records.iter().map(|&r| EventRecord::decode(r)).collect();
    assert_eq!(decoded[0], photon);
    assert!(decoded[0].is_photon());
    assert!(!decoded[1].is_photon());
    assert_eq!(EventRecord::overflow_count(records[1]), Some(3));
}

#[test]
fn mod_info_rejects_unknown_codes() {
    let raw = SpcModInfo {
        module_type: 150,
        init: -150,
        ..Default::default()
    };
    let info = ModInfo::try_from(&raw).unwrap();
    assert_eq!(info.init, InitStatus::XilinxErr(-150));

    let raw = SpcModInfo { init: -200, ..raw };
    assert!(matches!(
        ModInfo::try_from(&raw),
        Err(SpcmError::InvalidEnumValue { kind: "InitStatus", value: -200 })
    ));
}
