//! Parameter IDs and typed parameter values.
//!
//! SPCM-DLL addresses single entries of the module parameter block ([`SpcData`]) by a numeric
//! parameter ID. The ID table fixes, for each ID, the name of the corresponding struct field and
//! whether it holds an integer or a floating point value. The DLL itself transports every value
//! as a C `float` (`SPC_get_parameter`/`SPC_set_parameter`), so the declared type is what lets us
//! hand out integers for integer fields and reject values of the wrong type before they reach
//! the DLL.
//!
//! The table is expanded by the `spc_parameters!` macro into [`ParId`] and the accessors
//! [`SpcData::get`] and [`SpcData::set`], so IDs, names, types and field offsets cannot drift
//! apart.

use std::fmt;

use crate::data::SpcData;
use crate::error::{Result, SpcmError};

/// Declared numeric type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParType {
    Int,
    Float,
}

impl fmt::Display for ParType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ParType::Int => "int",
                ParType::Float => "float",
            }
        )
    }
}

/// A parameter value tagged with its numeric type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParValue {
    Int(i64),
    Float(f64),
}

impl ParValue {
    pub fn par_type(&self) -> ParType {
        match self {
            ParValue::Int(_) => ParType::Int,
            ParValue::Float(_) => ParType::Float,
        }
    }

    /// The value as transported by `SPC_set_parameter`.
    pub fn as_f32(&self) -> f32 {
        match *self {
            ParValue::Int(v) => v as f32,
            ParValue::Float(v) => v as f32,
        }
    }

    /// Interprets a `float` received from `SPC_get_parameter` according to `par_type`.
    pub fn from_f32(par_type: ParType, value: f32) -> Self {
        match par_type {
            ParType::Int => ParValue::Int(value.round() as i64),
            ParType::Float => ParValue::Float(value as f64),
        }
    }
}

impl From<i64> for ParValue {
    fn from(v: i64) -> Self {
        ParValue::Int(v)
    }
}

impl From<f64> for ParValue {
    fn from(v: f64) -> Self {
        ParValue::Float(v)
    }
}

impl fmt::Display for ParValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParValue::Int(v) => write!(f, "{}", v),
            // Debug keeps the trailing ".0" of integral floats
            ParValue::Float(v) => write!(f, "{:?}", v),
        }
    }
}

macro_rules! spc_parameters {
    ($( $variant:ident = $id:literal, $name:literal, $kind:ident, $field:ident $([$idx:literal])?; )*) => {
        /// SPCM-DLL parameter IDs (`SPC_get_parameter`/`SPC_set_parameter`).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i16)]
        pub enum ParId {
            $( $variant = $id, )*
        }

        impl ParId {
            /// All parameter IDs in ID order.
            pub const ALL: &'static [ParId] = &[ $( ParId::$variant, )* ];

            pub fn value(self) -> i16 {
                self as i16
            }

            /// Snake-case name, identical to the field name in the parameter block.
            pub fn name(self) -> &'static str {
                match self {
                    $( ParId::$variant => $name, )*
                }
            }

            pub fn par_type(self) -> ParType {
                match self {
                    $( ParId::$variant => ParType::$kind, )*
                }
            }

            pub fn from_value(value: i16) -> Result<Self> {
                match value {
                    $( $id => Ok(ParId::$variant), )*
                    _ => Err(SpcmError::InvalidEnumValue { kind: "ParId", value: value as i64 }),
                }
            }

            pub fn from_name(name: &str) -> Result<Self> {
                match name {
                    $( $name => Ok(ParId::$variant), )*
                    _ => Err(SpcmError::UnknownParameter(name.to_string())),
                }
            }
        }

        impl SpcData {
            /// Reads one parameter, typed according to the parameter ID table.
            pub fn get(&self, par_id: ParId) -> ParValue {
                match par_id {
                    $( ParId::$variant => spc_parameters!(@get $kind, self.$field $([$idx])?), )*
                }
            }

            /// Writes one parameter.
            ///
            /// The value must have the declared type of `par_id`; integers must also fit in the
            /// C type of the underlying field.
            pub fn set(&mut self, par_id: ParId, value: ParValue) -> Result<()> {
                match par_id {
                    $( ParId::$variant => spc_parameters!(@set $kind, par_id, self.$field $([$idx])?, value), )*
                }
                Ok(())
            }
        }
    };

    (@get Int, $place:expr) => {
        ParValue::Int(i64::from($place))
    };
    (@get Float, $place:expr) => {
        ParValue::Float(f64::from($place))
    };
    (@set Int, $par_id:expr, $place:expr, $value:expr) => {
        match $value {
            ParValue::Int(v) => {
                $place = v
                    .try_into()
                    .map_err(|_| SpcmError::OutOfRange { name: $par_id.name(), value: v })?;
            }
            ParValue::Float(_) => {
                return Err(SpcmError::ParameterType { name: $par_id.name(), expected: ParType::Int })
            }
        }
    };
    (@set Float, $par_id:expr, $place:expr, $value:expr) => {
        match $value {
            ParValue::Float(v) => $place = v as f32,
            ParValue::Int(_) => {
                return Err(SpcmError::ParameterType { name: $par_id.name(), expected: ParType::Float })
            }
        }
    };
}

spc_parameters! {
    CfdLimitLow = 0, "cfd_limit_low", Float, cfd_limit_low;
    CfdLimitHigh = 1, "cfd_limit_high", Float, cfd_limit_high;
    CfdZcLevel = 2, "cfd_zc_level", Float, cfd_zc_level;
    CfdHoldoff = 3, "cfd_holdoff", Float, cfd_holdoff;
    SyncZcLevel = 4, "sync_zc_level", Float, sync_zc_level;
    SyncHoldoff = 5, "sync_holdoff", Float, sync_holdoff;
    SyncThreshold = 6, "sync_threshold", Float, sync_threshold;
    TacRange = 7, "tac_range", Float, tac_range;
    SyncFreqDiv = 8, "sync_freq_div", Int, sync_freq_div;
    TacGain = 9, "tac_gain", Int, tac_gain;
    TacOffset = 10, "tac_offset", Float, tac_offset;
    TacLimitLow = 11, "tac_limit_low", Float, tac_limit_low;
    TacLimitHigh = 12, "tac_limit_high", Float, tac_limit_high;
    AdcResolution = 13, "adc_resolution", Int, adc_resolution;
    ExtLatchDelay = 14, "ext_latch_delay", Int, ext_latch_delay;
    CollectTime = 15, "collect_time", Float, collect_time;
    DisplayTime = 16, "display_time", Float, display_time;
    RepeatTime = 17, "repeat_time", Float, repeat_time;
    StopOnTime = 18, "stop_on_time", Int, stop_on_time;
    StopOnOvfl = 19, "stop_on_ovfl", Int, stop_on_ovfl;
    DitherRange = 20, "dither_range", Int, dither_range;
    CountIncr = 21, "count_incr", Int, count_incr;
    MemBank = 22, "mem_bank", Int, mem_bank;
    DeadTimeComp = 23, "dead_time_comp", Int, dead_time_comp;
    ScanControl = 24, "scan_control", Int, scan_control;
    RoutingMode = 25, "routing_mode", Int, routing_mode;
    TacEnableHold = 26, "tac_enable_hold", Float, tac_enable_hold;
    Mode = 27, "mode", Int, mode;
    ScanSizeX = 28, "scan_size_x", Int, scan_size_x;
    ScanSizeY = 29, "scan_size_y", Int, scan_size_y;
    ScanRoutX = 30, "scan_rout_x", Int, scan_rout_x;
    ScanRoutY = 31, "scan_rout_y", Int, scan_rout_y;
    ScanFlyback = 32, "scan_flyback", Int, scan_flyback;
    ScanBorders = 33, "scan_borders", Int, scan_borders;
    ScanPolarity = 34, "scan_polarity", Int, scan_polarity;
    PixelClock = 35, "pixel_clock", Int, pixel_clock;
    LineCompression = 36, "line_compression", Int, line_compression;
    Trigger = 37, "trigger", Int, trigger;
    PixelTime = 38, "pixel_time", Float, pixel_time;
    ExtPixclkDiv = 39, "ext_pixclk_div", Int, ext_pixclk_div;
    RateCountTime = 40, "rate_count_time", Float, rate_count_time;
    MacroTimeClk = 41, "macro_time_clk", Int, macro_time_clk;
    AddSelect = 42, "add_select", Int, add_select;
    AdcZoom = 43, "adc_zoom", Int, adc_zoom;
    ImgSizeX = 44, "img_size_x", Int, img_size_x;
    ImgSizeY = 45, "img_size_y", Int, img_size_y;
    ImgRoutX = 46, "img_rout_x", Int, img_rout_x;
    ImgRoutY = 47, "img_rout_y", Int, img_rout_y;
    XyGain = 48, "xy_gain", Int, xy_gain;
    MasterClock = 49, "master_clock", Int, master_clock;
    AdcSampleDelay = 50, "adc_sample_delay", Int, adc_sample_delay;
    DetectorType = 51, "detector_type", Int, detector_type;
    XAxisType = 52, "x_axis_type", Int, x_axis_type;
    ChanEnable = 53, "chan_enable", Int, chan_enable;
    ChanSlope = 54, "chan_slope", Int, chan_slope;
    ChanSpecNo = 55, "chan_spec_no", Int, chan_spec_no;
    TdcControl = 56, "tdc_control", Int, tdc_control;
    TdcOffset1 = 57, "tdc_offset1", Float, tdc_offset[0];
    TdcOffset2 = 58, "tdc_offset2", Float, tdc_offset[1];
    TdcOffset3 = 59, "tdc_offset3", Float, tdc_offset[2];
    TdcOffset4 = 60, "tdc_offset4", Float, tdc_offset[3];
}

impl fmt::Display for ParId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name().to_uppercase())
    }
}
