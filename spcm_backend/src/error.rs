//! Error codes returned by SPCM-DLL functions and the crate-wide error type.
//!
//! ## Overview
//!
//! Every SPCM-DLL function returns a `short`. Zero or positive values mean success (some functions
//! return a payload such as the module type through this value), negative values are error codes.
//! [`ErrorEnum`] names each code known to the DLL header, and [`error_string`] maps any 16-bit code
//! to a descriptive message. Codes that are not in the table still resolve to an "Unknown" message,
//! so the mapping never fails for a representable code.
//!
//! [`SpcmError`] is the single error type of the crate. It carries either a vendor status
//! ([`SpcmError::Dll`]) or a binding-level failure (DLL not found, wrong parameter type, ...).
//! Use [`check`] to convert a raw status into a [`Result`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::parameter::ParType;

/// Result type alias for SPCM operations.
pub type Result<T> = std::result::Result<T, SpcmError>;

macro_rules! spcm_error_codes {
    ($( $variant:ident = $code:literal, $name:literal, $msg:literal; )*) => {
        /// Named SPCM-DLL error codes.
        ///
        /// `Unknown` stands for any code not listed in the DLL header and has the code `i16::MIN`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ErrorEnum {
            $( $variant, )*
            Unknown,
        }

        impl ErrorEnum {
            /// All named codes, in header order (`Unknown` excluded).
            pub const ALL: &'static [ErrorEnum] = &[ $( ErrorEnum::$variant, )* ];

            pub fn from_code(code: i16) -> Self {
                match code {
                    $( $code => ErrorEnum::$variant, )*
                    _ => ErrorEnum::Unknown,
                }
            }

            pub fn code(self) -> i16 {
                match self {
                    $( ErrorEnum::$variant => $code, )*
                    ErrorEnum::Unknown => i16::MIN,
                }
            }

            /// Header-style name, e.g. `"NO_ACT_MOD"`.
            pub fn name(self) -> &'static str {
                match self {
                    $( ErrorEnum::$variant => $name, )*
                    ErrorEnum::Unknown => "UNKNOWN",
                }
            }

            fn known_message(code: i16) -> Option<&'static str> {
                match code {
                    $( $code => Some($msg), )*
                    _ => None,
                }
            }
        }
    };
}

spcm_error_codes! {
    None = 0, "NONE", "No error";
    OpenFile = -1, "OPEN_FILE", "Can't open configuration file";
    FileNvalid = -2, "FILE_NVALID", "Not valid configuration file";
    MemAlloc = -3, "MEM_ALLOC", "Memory allocation problem";
    ReadStr = -4, "READ_STR", "Can't read string from configuration file";
    WrongId = -5, "WRONG_ID", "Wrong module identification code";
    EepromChksum = -6, "EEPROM_CHKSUM", "Wrong EEPROM checksum";
    EepromRead = -7, "EEPROM_READ", "EEPROM read error";
    EepromWrite = -8, "EEPROM_WRITE", "EEPROM write error";
    EepWrDis = -9, "EEP_WR_DIS", "EEPROM is write disabled";
    BadPara = -10, "BAD_PARA", "Wrong parameter ID";
    BadParaVal = -11, "BAD_PARA_VAL", "Wrong parameter value";
    BadFunc = -12, "BAD_FUNC", "Function not allowed in current mode";
    ModNo = -13, "MOD_NO", "Wrong module number";
    NotActive = -14, "NOT_ACTIVE", "Module not active";
    NoActMod = -15, "NO_ACT_MOD", "No active modules";
    InUse = -16, "IN_USE", "Module in use by another application";
    NotInit = -17, "NOT_INIT", "SPCM-DLL not initialized";
    XilinxErr = -18, "XILINX_ERR", "Xilinx chip configuration error";
    Timeout = -19, "TIMEOUT", "Timeout while waiting for the module";
    RatesNotRdy = -20, "RATES_NOT_RDY", "Rate values not ready";
    Armed = -21, "ARMED", "Measurement in progress";
    FifoOvfl = -22, "FIFO_OVFL", "FIFO overflow";
    WindrvrErr = -23, "WINDRVR_ERR", "WinDriver error";
    LicenseErr = -24, "LICENSE_ERR", "License error";
    FirmwareVer = -25, "FIRMWARE_VER", "Incompatible firmware version";
    BadPage = -26, "BAD_PAGE", "Wrong memory page";
    SeqRun = -27, "SEQ_RUN", "Sequencer is running";
    CantArm = -28, "CANT_ARM", "Can't arm the measurement";
    NotSupported = -29, "NOT_SUPPORTED", "Function not supported by this module";
    MemConfig = -30, "MEM_CONFIG", "Memory not configured";
    CantOpenUsb = -31, "CANT_OPEN_USB", "Can't open USB device";
    UsbErr = -32, "USB_ERR", "USB communication error";
}

impl ErrorEnum {
    /// The message the DLL associates with this code.
    pub fn message(self) -> String {
        message_for(self.code())
    }
}

impl fmt::Display for ErrorEnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

fn message_for(code: i16) -> String {
    match ErrorEnum::known_message(code) {
        Some(msg) => msg.to_string(),
        None => format!("Unknown SPCM error (code {})", code),
    }
}

/// Returns the descriptive message for an SPCM error code.
///
/// Every code representable as a C `short` resolves to a non-empty message. Codes outside that
/// range cannot have been returned by the DLL and fail with [`SpcmError::CodeOverflow`].
///
/// ```
/// use spcm_backend::error::*;
///
/// assert_eq!(error_string(0).unwrap(), "No error");
/// assert!(error_string(-1).unwrap().to_lowercase().contains("file"));
/// assert!(error_string(32768).is_err());
/// ```
pub fn error_string(code: i64) -> Result<String> {
    let code = i16::try_from(code).map_err(|_| SpcmError::CodeOverflow(code))?;
    Ok(message_for(code))
}

/// Converts the status returned by an SPCM-DLL function into a `Result`.
///
/// Non-negative statuses are passed through (several functions return a payload this way).
pub fn check(status: i16) -> Result<i16> {
    if status < 0 {
        Err(SpcmError::from_code(status))
    } else {
        Ok(status)
    }
}

/// Errors that can occur when working with SPCM-DLL.
#[derive(Error, Debug)]
pub enum SpcmError {
    /// A DLL function returned a negative status
    #[error("SPCM-DLL error {code} ({}): {message}", .kind.name())]
    Dll {
        code: i16,
        kind: ErrorEnum,
        message: String,
    },

    /// Error code does not fit in a C `short`
    #[error("Error code {0} is out of range for a 16-bit status code")]
    CodeOverflow(i64),

    /// Value of the wrong numeric type for a parameter
    #[error("Parameter {name} expects a value of type {expected}")]
    ParameterType { name: &'static str, expected: ParType },

    /// Integer does not fit in the parameter's field
    #[error("Value {value} is out of range for parameter {name}")]
    OutOfRange { name: &'static str, value: i64 },

    /// Code that is not a member of a vendor enumeration
    #[error("{value} is not a valid {kind}")]
    InvalidEnumValue { kind: &'static str, value: i64 },

    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    /// More modules than SPCM-DLL can address
    #[error("At most {max} modules can be addressed (got {got})")]
    TooManyModules { got: usize, max: usize },

    #[error("Cannot find spcm64.dll in its expected install location (tried: {tried:?})")]
    DllNotFound { tried: Vec<PathBuf> },

    #[error("Only supported on Windows x64")]
    UnsupportedPlatform,

    #[error("Minimum version of spcm64.dll supported is 4.0 (found: {found})")]
    UnsupportedDllVersion { found: String },

    /// The DLL exists but could not be loaded or lacks a symbol
    #[error("Failed to load '{}': {message}", .path.display())]
    Load { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("String argument contains an interior nul byte: {0}")]
    Nul(#[from] std::ffi::NulError),
}

impl SpcmError {
    /// Builds the error for a status returned by the DLL.
    pub fn from_code(code: i16) -> Self {
        Self::Dll {
            code,
            kind: ErrorEnum::from_code(code),
            message: message_for(code),
        }
    }

    /// The vendor error kind, if this error came from the DLL.
    pub fn kind(&self) -> Option<ErrorEnum> {
        match self {
            Self::Dll { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Check if this is the given vendor error.
    pub fn is(&self, kind: ErrorEnum) -> bool {
        self.kind() == Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_short_code_has_a_message() {
        for code in i16::MIN..=i16::MAX {
            let msg = error_string(code as i64).unwrap();
            assert!(!msg.is_empty(), "empty message for {}", code);
        }
    }

    #[test]
    fn out_of_range_codes_overflow() {
        assert!(matches!(error_string(32768), Err(SpcmError::CodeOverflow(32768))));
        assert!(matches!(error_string(-32769), Err(SpcmError::CodeOverflow(-32769))));
    }

    #[test]
    fn known_and_unknown_messages() {
        assert_eq!(error_string(0).unwrap(), "No error");
        assert_eq!(
            error_string(ErrorEnum::None.code() as i64).unwrap(),
            "No error"
        );
        assert!(error_string(-1).unwrap().to_lowercase().contains("file"));
        assert!(error_string(ErrorEnum::Unknown.code() as i64)
            .unwrap()
            .starts_with("Unknown "));
        assert!(error_string(1234).unwrap().starts_with("Unknown "));
    }

    #[test]
    fn codes_round_trip_through_enum() {
        for &kind in ErrorEnum::ALL {
            assert_eq!(ErrorEnum::from_code(kind.code()), kind);
        }
        assert_eq!(ErrorEnum::from_code(-12345), ErrorEnum::Unknown);
    }

    #[test]
    fn check_passes_payloads_and_rejects_negatives() {
        assert_eq!(check(150).unwrap(), 150);
        assert_eq!(check(0).unwrap(), 0);
        let err = check(ErrorEnum::NoActMod.code()).unwrap_err();
        assert!(err.is(ErrorEnum::NoActMod));
        assert!(err.to_string().contains("NO_ACT_MOD"));
    }

    #[test]
    fn unknown_dll_code_keeps_raw_value() {
        match SpcmError::from_code(-999) {
            SpcmError::Dll { code, kind, message } => {
                assert_eq!(code, -999);
                assert_eq!(kind, ErrorEnum::Unknown);
                assert!(message.contains("-999"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
