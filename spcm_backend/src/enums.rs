//! Vendor enumerations and flag sets.
//!
//! The DLL reports states and identifiers as bare integers. The types here give those integers
//! names and reject values outside the documented set with [`SpcmError::InvalidEnumValue`], so
//! that an unexpected code from a newer DLL surfaces as an error rather than as a silently
//! misinterpreted value.
//!
//! `Display` of every enumeration produces the same `<Type.NAME: code>` form that appears in
//! record representations and in the diagnostic dump.

use std::fmt;

use bitflags::bitflags;

use crate::error::{Result, SpcmError};

macro_rules! code_enum {
    (
        $(#[$meta:meta])*
        pub enum $ty:ident : $repr:ty {
            $( $variant:ident = $code:literal, $name:literal; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $ty {
            $( $variant, )*
        }

        impl $ty {
            pub const ALL: &'static [$ty] = &[ $( $ty::$variant, )* ];

            pub fn from_code(code: $repr) -> Result<Self> {
                match code {
                    $( $code => Ok($ty::$variant), )*
                    _ => Err(SpcmError::InvalidEnumValue {
                        kind: stringify!($ty),
                        value: code as i64,
                    }),
                }
            }

            pub fn code(self) -> $repr {
                match self {
                    $( $ty::$variant => $code, )*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( $ty::$variant => $name, )*
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "<{}.{}: {}>", stringify!($ty), self.name(), self.code())
            }
        }
    };
}

code_enum! {
    /// Whether a module is in use, as reported in the module info.
    pub enum InUseStatus: i16 {
        NotInUse = 0, "NOT_IN_USE";
        InUseHere = 1, "IN_USE_HERE";
        InUseElsewhere = -1, "IN_USE_ELSEWHERE";
    }
}

code_enum! {
    /// SPC module model, as returned by `SPC_test_id`.
    pub enum ModuleType: i16 {
        Unknown = 0, "UNKNOWN";
        Spc130 = 130, "SPC_130";
        Spc130Em = 131, "SPC_130EM";
        Spc140 = 140, "SPC_140";
        Spc150 = 150, "SPC_150";
        Spc150N = 151, "SPC_150N";
        Spc150Nx = 152, "SPC_150NX";
        Spc160 = 160, "SPC_160";
        Spc160Pcie = 161, "SPC_160PCIE";
        Spc180N = 180, "SPC_180N";
        Spc180Nx = 182, "SPC_180NX";
        Dpc230 = 230, "DPC_230";
        Spc600 = 600, "SPC_600";
        Spc630 = 630, "SPC_630";
        Spc700 = 700, "SPC_700";
        Spc730 = 730, "SPC_730";
        Spc830 = 830, "SPC_830";
        Spc930 = 930, "SPC_930";
    }
}

impl ModuleType {
    /// The model name as stored in the module EEPROM, e.g. `"SPC-150"`.
    pub fn eeprom_name(self) -> String {
        match self {
            ModuleType::Unknown => String::new(),
            _ => self.name().replace('_', "-"),
        }
    }
}

code_enum! {
    /// DLL operation mode: real hardware, or simulation of one module model.
    ///
    /// Simulation codes are equal to the code of the simulated [`ModuleType`].
    pub enum DllOperationMode: i16 {
        Hardware = 0, "HARDWARE";
        SimulateSpc130 = 130, "SIMULATE_SPC_130";
        SimulateSpc130Em = 131, "SIMULATE_SPC_130EM";
        SimulateSpc140 = 140, "SIMULATE_SPC_140";
        SimulateSpc150 = 150, "SIMULATE_SPC_150";
        SimulateSpc150N = 151, "SIMULATE_SPC_150N";
        SimulateSpc150Nx = 152, "SIMULATE_SPC_150NX";
        SimulateSpc160 = 160, "SIMULATE_SPC_160";
        SimulateSpc160Pcie = 161, "SIMULATE_SPC_160PCIE";
        SimulateSpc180N = 180, "SIMULATE_SPC_180N";
        SimulateSpc180Nx = 182, "SIMULATE_SPC_180NX";
        SimulateDpc230 = 230, "SIMULATE_DPC_230";
        SimulateSpc600 = 600, "SIMULATE_SPC_600";
        SimulateSpc630 = 630, "SIMULATE_SPC_630";
        SimulateSpc700 = 700, "SIMULATE_SPC_700";
        SimulateSpc730 = 730, "SIMULATE_SPC_730";
        SimulateSpc830 = 830, "SIMULATE_SPC_830";
        SimulateSpc930 = 930, "SIMULATE_SPC_930";
    }
}

impl DllOperationMode {
    /// The simulated module type, or `None` for hardware mode.
    pub fn simulated_module(self) -> Option<ModuleType> {
        match self {
            DllOperationMode::Hardware => None,
            _ => ModuleType::from_code(self.code()).ok(),
        }
    }
}

code_enum! {
    /// FIFO data format, as returned by `SPC_get_fifo_init_vars`.
    pub enum FifoType: i16 {
        Spc600_48 = 2, "SPC_600_48";
        Spc600_32 = 3, "SPC_600_32";
        Spc130 = 4, "SPC_130";
        Spc830 = 5, "SPC_830";
        Spc140 = 6, "SPC_140";
        Spc150 = 7, "SPC_150";
        Dpc230 = 8, "DPC_230";
    }
}

/// Module initialization status (`SPC_get_init_status`, `SPCModInfo.init`).
///
/// Codes -100 to -199 all denote a Xilinx configuration failure; the raw code is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitStatus {
    Ok,
    NotDone,
    WrongEepChksum,
    WrongModId,
    HardTestErr,
    CantOpenPciCard,
    ModInUse,
    WindrvrVer,
    WrongLicense,
    FirmwareVer,
    NoLicense,
    LicenseNotValid,
    LicenseDateExp,
    CantOpenUsb,
    XilinxErr(i16),
}

impl InitStatus {
    pub fn from_code(code: i16) -> Result<Self> {
        let status = match code {
            0 => Self::Ok,
            -1 => Self::NotDone,
            -2 => Self::WrongEepChksum,
            -3 => Self::WrongModId,
            -4 => Self::HardTestErr,
            -5 => Self::CantOpenPciCard,
            -6 => Self::ModInUse,
            -7 => Self::WindrvrVer,
            -8 => Self::WrongLicense,
            -9 => Self::FirmwareVer,
            -10 => Self::NoLicense,
            -11 => Self::LicenseNotValid,
            -12 => Self::LicenseDateExp,
            -13 => Self::CantOpenUsb,
            -199..=-100 => Self::XilinxErr(code),
            _ => {
                return Err(SpcmError::InvalidEnumValue {
                    kind: "InitStatus",
                    value: code as i64,
                })
            }
        };
        Ok(status)
    }

    pub fn code(self) -> i16 {
        use InitStatus::*;
        match self {
            Ok => 0,
            NotDone => -1,
            WrongEepChksum => -2,
            WrongModId => -3,
            HardTestErr => -4,
            CantOpenPciCard => -5,
            ModInUse => -6,
            WindrvrVer => -7,
            WrongLicense => -8,
            FirmwareVer => -9,
            NoLicense => -10,
            LicenseNotValid => -11,
            LicenseDateExp => -12,
            CantOpenUsb => -13,
            XilinxErr(code) => code,
        }
    }

    pub fn name(self) -> &'static str {
        use InitStatus::*;
        match self {
            Ok => "OK",
            NotDone => "NOT_DONE",
            WrongEepChksum => "WRONG_EEP_CHKSUM",
            WrongModId => "WRONG_MOD_ID",
            HardTestErr => "HARD_TEST_ERR",
            CantOpenPciCard => "CANT_OPEN_PCI_CARD",
            ModInUse => "MOD_IN_USE",
            WindrvrVer => "WINDRVR_VER",
            WrongLicense => "WRONG_LICENSE",
            FirmwareVer => "FIRMWARE_VER",
            NoLicense => "NO_LICENSE",
            LicenseNotValid => "LICENSE_NOT_VALID",
            LicenseDateExp => "LICENSE_DATE_EXP",
            CantOpenUsb => "CANT_OPEN_USB",
            XilinxErr(_) => "XILINX_ERR",
        }
    }

    pub fn message(self) -> &'static str {
        use InitStatus::*;
        match self {
            Ok => "Initialized",
            NotDone => "Not initialized",
            WrongEepChksum => "Wrong EEPROM checksum",
            WrongModId => "Wrong module identification code",
            HardTestErr => "Hardware test failed",
            CantOpenPciCard => "Cannot open PCI card",
            ModInUse => "Module in use by another application",
            WindrvrVer => "Incorrect WinDriver version",
            WrongLicense => "Wrong license key",
            FirmwareVer => "Incompatible firmware version",
            NoLicense => "No license key",
            LicenseNotValid => "License key not valid",
            LicenseDateExp => "License date expired",
            CantOpenUsb => "Cannot open USB device",
            XilinxErr(_) => "Xilinx chip configuration error",
        }
    }
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<InitStatus.{}: {}>", self.name(), self.code())
    }
}

bitflags! {
    /// Measurement state bits returned by `SPC_test_state`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MeasurementState: u16 {
        const OVERFLOW_OCCURRED = 0x1;
        const OVERFLOW = 0x2;
        const TIME_OVER = 0x4;
        const COLLECTION_TIME_OVER = 0x8;
        const COMMAND_STOP = 0x10;
        const REPEAT_TIME_OVER = 0x20;
        const SEQUENCER_GAP = 0x40;
        /// Measurement in progress
        const ARMED = 0x80;
        const COLLECTION_TIME_OVER_2 = 0x100;
        const REPEAT_TIME_OVER_2 = 0x200;
        const FIFO_OVERFLOW = 0x400;
        const FIFO_EMPTY = 0x800;
        const WAIT_TRIGGER = 0x1000;
        const HARDWARE_FILL_NOT_READY = 0x8000;
    }
}

/// Maps a [`MeasurementState`] flag name to the macro name used in the vendor documentation.
///
/// ```
/// use spcm_backend::enums::measurement_state_bh_name;
///
/// assert_eq!(measurement_state_bh_name("FIFO_OVERFLOW"), Some("SPC_FOVFL"));
/// assert_eq!(measurement_state_bh_name("NO_SUCH_FLAG"), None);
/// ```
pub fn measurement_state_bh_name(name: &str) -> Option<&'static str> {
    Some(match name {
        "OVERFLOW_OCCURRED" => "SPC_OVERFL",
        "OVERFLOW" => "SPC_OVERFLOW",
        "TIME_OVER" => "SPC_TIME_OVER",
        "COLLECTION_TIME_OVER" => "SPC_COLTIM_OVER",
        "COMMAND_STOP" => "SPC_CMD_STOP",
        "REPEAT_TIME_OVER" => "SPC_REPTIM_OVER",
        "SEQUENCER_GAP" => "SPC_SEQ_GAP",
        "ARMED" => "SPC_ARMED",
        "COLLECTION_TIME_OVER_2" => "SPC_COLTIM_2OVER",
        "REPEAT_TIME_OVER_2" => "SPC_REPTIM_2OVER",
        "FIFO_OVERFLOW" => "SPC_FOVFL",
        "FIFO_EMPTY" => "SPC_FEMPTY",
        "WAIT_TRIGGER" => "SPC_WAIT_TRG",
        "HARDWARE_FILL_NOT_READY" => "SPC_HFILL_NRDY",
        _ => return None,
    })
}

bitflags! {
    /// Sync input state bits returned by `SPC_get_sync_state`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SyncState: u16 {
        const SYNC_OK = 0x1;
        const SYNC_OVERLOAD = 0x2;
    }
}

bitflags! {
    /// Properties of the FIFO stream, as returned by `SPC_get_fifo_init_vars`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StreamType: i32 {
        const BH_STREAM = 0x1;
        const DPC_STREAM = 0x2;
        const HAS_SPC_HEADER = 0x4;
        const RAW_DATA = 0x8;
        const MARK3_IN_FIFO = 0x10;
    }
}

macro_rules! impl_flags_display {
    ($($ty:ident),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
                    if names.is_empty() {
                        return write!(f, "<{}: {}>", stringify!($ty), self.bits());
                    }
                    write!(f, "<{}.{}: {}>", stringify!($ty), names.join("|"), self.bits())
                }
            }
        )*
    };
}

impl_flags_display!(MeasurementState, SyncState, StreamType);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_status_xilinx_range() {
        for code in [-100, -142, -199] {
            let status = InitStatus::from_code(code).unwrap();
            assert_eq!(status, InitStatus::XilinxErr(code));
            assert_eq!(status.name(), "XILINX_ERR");
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn init_status_rejects_unknown_codes() {
        for code in [1, -14, -99, -200] {
            assert!(matches!(
                InitStatus::from_code(code),
                Err(SpcmError::InvalidEnumValue { kind: "InitStatus", .. })
            ));
        }
    }

    #[test]
    fn init_status_message() {
        assert_eq!(InitStatus::from_code(0).unwrap().message(), "Initialized");
        assert_eq!(InitStatus::Ok.to_string(), "<InitStatus.OK: 0>");
    }

    #[test]
    fn module_type_names() {
        assert_eq!(ModuleType::from_code(150).unwrap(), ModuleType::Spc150);
        assert_eq!(ModuleType::Spc150.eeprom_name(), "SPC-150");
        assert_eq!(ModuleType::Unknown.eeprom_name(), "");
        assert_eq!(ModuleType::Spc180N.to_string(), "<ModuleType.SPC_180N: 180>");
        assert!(ModuleType::from_code(999).is_err());
    }

    #[test]
    fn simulation_modes_match_module_types() {
        for &mode in DllOperationMode::ALL {
            match mode.simulated_module() {
                None => assert_eq!(mode, DllOperationMode::Hardware),
                Some(module_type) => {
                    assert_eq!(module_type.code(), mode.code());
                    assert_eq!(mode.name(), format!("SIMULATE_{}", module_type.name()));
                }
            }
        }
        assert_eq!(DllOperationMode::ALL.len(), ModuleType::ALL.len());
    }

    #[test]
    fn every_flag_has_a_vendor_name() {
        for (name, _) in MeasurementState::all().iter_names() {
            assert!(measurement_state_bh_name(name).is_some(), "{}", name);
        }
        assert_eq!(measurement_state_bh_name("SEQUENCER_GAP"), Some("SPC_SEQ_GAP"));
    }

    #[test]
    fn flags_display() {
        let state = MeasurementState::ARMED | MeasurementState::FIFO_EMPTY;
        assert_eq!(state.to_string(), "<MeasurementState.ARMED|FIFO_EMPTY: 2176>");
        assert_eq!(SyncState::empty().to_string(), "<SyncState: 0>");
    }
}
