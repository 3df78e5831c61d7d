//! Smaller DLL records: module info, EEPROM data, adjust parameters and rate values.
//!
//! Records that the DLL fills in come in two forms where needed: the raw `#[repr(C)]` struct
//! that is passed to the DLL (`SpcModInfo`, `SpcEepData`), and a typed view with enumerations and
//! strings (`ModInfo`, `EepData`). Records made only of numbers are used directly.
//!
//! All records export their fields in declaration order through `as_dict` and print in the form
//! `<Name(field=value, ...)>`.

use std::fmt;

use indexmap::IndexMap;

use crate::enums::{InUseStatus, InitStatus, ModuleType};
use crate::error::Result;

/// A field value of a record, as exported by `as_dict`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    ModuleType(ModuleType),
    InUse(InUseStatus),
    Init(InitStatus),
    AdjustPara(AdjustPara),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{:?}", v),
            FieldValue::Text(s) => write!(f, "'{}'", s),
            FieldValue::ModuleType(v) => write!(f, "{}", v),
            FieldValue::InUse(v) => write!(f, "{}", v),
            FieldValue::Init(v) => write!(f, "{}", v),
            FieldValue::AdjustPara(v) => write!(f, "{}", v),
        }
    }
}

fn write_record(
    f: &mut fmt::Formatter,
    type_name: &str,
    fields: &IndexMap<&'static str, FieldValue>,
) -> fmt::Result {
    let fields: Vec<String> = fields
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    write!(f, "<{}({})>", type_name, fields.join(", "))
}

/// Calibration parameters stored in the module EEPROM (`SPC_Adjust_Para`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustPara {
    pub vrt1: i16,
    pub vrt2: i16,
    pub vrt3: i16,
    pub dith_width: i16,
    pub gain_1: i16,
    pub gain_2: i16,
    pub gain_4: i16,
    pub gain_8: i16,
    pub tac_r0: i16,
    pub tac_r1: i16,
    pub tac_r2: i16,
    pub tac_r4: i16,
    pub tac_r8: i16,
    pub sync_div: i16,
}

impl AdjustPara {
    pub fn as_dict(&self) -> IndexMap<&'static str, FieldValue> {
        [
            ("vrt1", self.vrt1),
            ("vrt2", self.vrt2),
            ("vrt3", self.vrt3),
            ("dith_width", self.dith_width),
            ("gain_1", self.gain_1),
            ("gain_2", self.gain_2),
            ("gain_4", self.gain_4),
            ("gain_8", self.gain_8),
            ("tac_r0", self.tac_r0),
            ("tac_r1", self.tac_r1),
            ("tac_r2", self.tac_r2),
            ("tac_r4", self.tac_r4),
            ("tac_r8", self.tac_r8),
            ("sync_div", self.sync_div),
        ]
        .into_iter()
        .map(|(name, v)| (name, FieldValue::Int(v.into())))
        .collect()
    }
}

impl fmt::Display for AdjustPara {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_record(f, "AdjustPara", &self.as_dict())
    }
}

/// EEPROM contents as exchanged with `SPC_get_eeprom_data` (`SPC_EEP_Data`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpcEepData {
    pub module_type: [u8; 16],
    pub serial_no: [u8; 16],
    pub date: [u8; 16],
    pub adj_para: AdjustPara,
}

/// Copies `s` into a fixed-size C string field, truncating so that a NUL terminator remains.
pub fn to_c_chars<const N: usize>(s: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let n = s.len().min(N.saturating_sub(1));
    buf[..n].copy_from_slice(&s.as_bytes()[..n]);
    buf
}

/// Reads a NUL-terminated (or full-length) C string field.
pub fn from_c_chars(chars: &[u8]) -> String {
    let end = chars.iter().position(|&c| c == 0).unwrap_or(chars.len());
    String::from_utf8_lossy(&chars[..end]).into_owned()
}

/// Typed view of [`SpcEepData`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EepData {
    pub module_type: String,
    pub serial_no: String,
    pub date: String,
    pub adj_para: AdjustPara,
}

impl From<&SpcEepData> for EepData {
    fn from(raw: &SpcEepData) -> Self {
        Self {
            module_type: from_c_chars(&raw.module_type),
            serial_no: from_c_chars(&raw.serial_no),
            date: from_c_chars(&raw.date),
            adj_para: raw.adj_para,
        }
    }
}

impl From<&EepData> for SpcEepData {
    fn from(data: &EepData) -> Self {
        Self {
            module_type: to_c_chars(&data.module_type),
            serial_no: to_c_chars(&data.serial_no),
            date: to_c_chars(&data.date),
            adj_para: data.adj_para,
        }
    }
}

impl EepData {
    pub fn as_dict(&self) -> IndexMap<&'static str, FieldValue> {
        IndexMap::from([
            ("module_type", FieldValue::Text(self.module_type.clone())),
            ("serial_no", FieldValue::Text(self.serial_no.clone())),
            ("date", FieldValue::Text(self.date.clone())),
            ("adj_para", FieldValue::AdjustPara(self.adj_para)),
        ])
    }
}

impl fmt::Display for EepData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_record(f, "EEPData", &self.as_dict())
    }
}

/// Module information as exchanged with `SPC_get_module_info` (`SPCModInfo`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpcModInfo {
    pub module_type: i16,
    pub bus_number: i16,
    pub slot_number: i16,
    pub in_use: i16,
    pub init: i16,
    pub base_adr: u16,
}

/// Typed view of [`SpcModInfo`].
///
/// `base_adr` is kept for completeness but is not part of the exported fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModInfo {
    pub module_type: ModuleType,
    pub bus_number: i16,
    pub slot_number: i16,
    pub in_use: InUseStatus,
    pub init: InitStatus,
    pub base_adr: u16,
}

impl Default for ModInfo {
    fn default() -> Self {
        Self {
            module_type: ModuleType::Unknown,
            bus_number: 0,
            slot_number: 0,
            in_use: InUseStatus::NotInUse,
            init: InitStatus::Ok,
            base_adr: 0,
        }
    }
}

impl TryFrom<&SpcModInfo> for ModInfo {
    type Error = crate::error::SpcmError;

    fn try_from(raw: &SpcModInfo) -> Result<Self> {
        Ok(Self {
            module_type: ModuleType::from_code(raw.module_type)?,
            bus_number: raw.bus_number,
            slot_number: raw.slot_number,
            in_use: InUseStatus::from_code(raw.in_use)?,
            init: InitStatus::from_code(raw.init)?,
            base_adr: raw.base_adr,
        })
    }
}

impl From<&ModInfo> for SpcModInfo {
    fn from(info: &ModInfo) -> Self {
        Self {
            module_type: info.module_type.code(),
            bus_number: info.bus_number,
            slot_number: info.slot_number,
            in_use: info.in_use.code(),
            init: info.init.code(),
            base_adr: info.base_adr,
        }
    }
}

impl ModInfo {
    pub fn as_dict(&self) -> IndexMap<&'static str, FieldValue> {
        IndexMap::from([
            ("module_type", FieldValue::ModuleType(self.module_type)),
            ("bus_number", FieldValue::Int(self.bus_number.into())),
            ("slot_number", FieldValue::Int(self.slot_number.into())),
            ("in_use", FieldValue::InUse(self.in_use)),
            ("init", FieldValue::Init(self.init)),
        ])
    }
}

impl fmt::Display for ModInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_record(f, "ModInfo", &self.as_dict())
    }
}

/// Count rates in counts per second (`rate_values`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateValues {
    pub sync_rate: f32,
    pub cfd_rate: f32,
    pub tac_rate: f32,
    pub adc_rate: f32,
}

impl RateValues {
    pub fn as_dict(&self) -> IndexMap<&'static str, FieldValue> {
        IndexMap::from([
            ("sync_rate", FieldValue::Float(self.sync_rate.into())),
            ("cfd_rate", FieldValue::Float(self.cfd_rate.into())),
            ("tac_rate", FieldValue::Float(self.tac_rate.into())),
            ("adc_rate", FieldValue::Float(self.adc_rate.into())),
        ])
    }
}

impl fmt::Display for RateValues {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_record(f, "RateValues", &self.as_dict())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn layouts_match_c_structs() {
        assert_eq!(size_of::<AdjustPara>(), 28);
        assert_eq!(size_of::<SpcEepData>(), 76);
        assert_eq!(size_of::<SpcModInfo>(), 12);
        assert_eq!(size_of::<RateValues>(), 16);
    }

    #[test]
    fn mod_info_repr() {
        assert_eq!(
            ModInfo::default().to_string(),
            "<ModInfo(module_type=<ModuleType.UNKNOWN: 0>, bus_number=0, slot_number=0, \
             in_use=<InUseStatus.NOT_IN_USE: 0>, init=<InitStatus.OK: 0>)>"
        );
    }

    #[test]
    fn mod_info_from_raw() {
        let raw = SpcModInfo {
            module_type: 150,
            in_use: 1,
            init: -1,
            ..Default::default()
        };
        let info = ModInfo::try_from(&raw).unwrap();
        assert_eq!(info.module_type, ModuleType::Spc150);
        assert_eq!(info.in_use, InUseStatus::InUseHere);
        assert_eq!(info.init, InitStatus::NotDone);
        assert_eq!(SpcModInfo::from(&info), raw);

        let bad = SpcModInfo { in_use: 7, ..raw };
        assert!(ModInfo::try_from(&bad).is_err());
    }

    #[test]
    fn eep_data_strings() {
        let raw = SpcEepData {
            module_type: to_c_chars("SPC-150"),
            serial_no: to_c_chars("0123456789abcdefXYZ"),
            ..Default::default()
        };
        let eep = EepData::from(&raw);
        assert_eq!(eep.module_type, "SPC-150");
        assert_eq!(eep.serial_no, "0123456789abcde");
        assert_eq!(eep.date, "");

        // A full-length field without terminator is read completely
        let full = SpcEepData {
            date: *b"2024-01-01 12:00",
            ..Default::default()
        };
        assert_eq!(EepData::from(&full).date, "2024-01-01 12:00");
    }

    #[test]
    fn record_reprs() {
        let r = EepData::default().to_string();
        assert!(r.starts_with("<EEPData("));
        assert!(r.contains(", serial_no='', "));
        assert!(r.ends_with(")>)>"));

        let r = AdjustPara::default().to_string();
        assert!(r.contains(", vrt2=0, "));

        let r = RateValues::default().to_string();
        assert!(r.contains(", cfd_rate=0.0, "));
    }

    #[test]
    fn nested_as_dict() {
        let d = EepData::default().as_dict();
        assert_eq!(d["date"], FieldValue::Text(String::new()));
        match &d["adj_para"] {
            FieldValue::AdjustPara(a) => assert_eq!(a.as_dict()["sync_div"], FieldValue::Int(0)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
