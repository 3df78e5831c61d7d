//! The module parameter block (`SPCdata`).
//!
//! [`SpcData`] mirrors the C struct that `SPC_get_parameters`/`SPC_set_parameters` exchange with
//! the DLL, field for field. The fields are public so that callers can work with the raw block,
//! but the preferred way to read and write it is through the parameter-ID view
//! ([`SpcData::get`], [`SpcData::set`] and the name-based variants), which type-checks values.
//!
//! The view covers exactly the 61 fields that have a parameter ID, in ID order. `base_adr`,
//! `init`, `pci_card_no` and `test_eep` are maintained by the DLL and are not part of it.
//!
//! ## Example
//! ```
//! use spcm_backend::data::SpcData;
//! use spcm_backend::parameter::{ParId, ParValue};
//!
//! let mut data = SpcData::default();
//! data.set_by_name("collect_time", ParValue::Float(2.0)).unwrap();
//! data.set(ParId::Mode, ParValue::Int(1)).unwrap();
//!
//! let changed = data.diff(&SpcData::default());
//! assert_eq!(changed.keys().copied().collect::<Vec<_>>(), ["collect_time", "mode"]);
//! ```

use std::fmt;

use indexmap::IndexMap;

use crate::error::Result;
use crate::parameter::{ParId, ParValue};

/// Module parameters, layout-compatible with `SPCdata` of the DLL header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpcData {
    pub base_adr: u16,
    pub init: i16,
    pub cfd_limit_low: f32,
    pub cfd_limit_high: f32,
    pub cfd_zc_level: f32,
    pub cfd_holdoff: f32,
    pub sync_zc_level: f32,
    pub sync_holdoff: f32,
    pub sync_threshold: f32,
    pub tac_range: f32,
    pub sync_freq_div: i16,
    pub tac_gain: i16,
    pub tac_offset: f32,
    pub tac_limit_low: f32,
    pub tac_limit_high: f32,
    pub adc_resolution: i16,
    pub ext_latch_delay: i16,
    pub collect_time: f32,
    pub display_time: f32,
    pub repeat_time: f32,
    pub stop_on_time: i16,
    pub stop_on_ovfl: i16,
    pub dither_range: i16,
    pub count_incr: i16,
    pub mem_bank: i16,
    pub dead_time_comp: i16,
    pub scan_control: u16,
    pub routing_mode: i16,
    pub tac_enable_hold: f32,
    pub pci_card_no: i16,
    pub mode: u16,
    pub scan_size_x: u32,
    pub scan_size_y: u32,
    pub scan_rout_x: u32,
    pub scan_rout_y: u32,
    pub scan_flyback: u32,
    pub scan_borders: u32,
    pub scan_polarity: u16,
    pub pixel_clock: u16,
    pub line_compression: u16,
    pub trigger: u16,
    pub pixel_time: f32,
    pub ext_pixclk_div: u32,
    pub rate_count_time: f32,
    pub macro_time_clk: i16,
    pub add_select: i16,
    pub test_eep: i16,
    pub adc_zoom: i16,
    pub img_size_x: u32,
    pub img_size_y: u32,
    pub img_rout_x: u32,
    pub img_rout_y: u32,
    pub xy_gain: i16,
    pub master_clock: i16,
    pub adc_sample_delay: i16,
    pub detector_type: i16,
    pub x_axis_type: i16,
    pub chan_enable: i16,
    pub chan_slope: i16,
    pub chan_spec_no: i16,
    pub tdc_control: u32,
    pub tdc_offset: [f32; 4],
}

impl SpcData {
    pub fn get_by_name(&self, name: &str) -> Result<ParValue> {
        Ok(self.get(ParId::from_name(name)?))
    }

    pub fn set_by_name(&mut self, name: &str, value: ParValue) -> Result<()> {
        self.set(ParId::from_name(name)?, value)
    }

    /// `(name, value)` pairs of the parameter view, in ID order.
    pub fn items(&self) -> impl Iterator<Item = (&'static str, ParValue)> + '_ {
        ParId::ALL.iter().map(move |&par_id| (par_id.name(), self.get(par_id)))
    }

    pub fn as_dict(&self) -> IndexMap<&'static str, ParValue> {
        self.items().collect()
    }

    /// Parameters of `self` whose value differs from `other`, in ID order.
    pub fn diff(&self, other: &SpcData) -> IndexMap<&'static str, ParValue> {
        ParId::ALL
            .iter()
            .filter(|&&par_id| self.get(par_id) != other.get(par_id))
            .map(|&par_id| (par_id.name(), self.get(par_id)))
            .collect()
    }
}

impl fmt::Display for SpcData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fields: Vec<String> = self
            .items()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        write!(f, "<Data({})>", fields.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpcmError;
    use std::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_c_struct() {
        assert_eq!(size_of::<SpcData>(), 196);
        assert_eq!(offset_of!(SpcData, init), 2);
        assert_eq!(offset_of!(SpcData, cfd_limit_low), 4);
        assert_eq!(offset_of!(SpcData, sync_freq_div), 36);
        assert_eq!(offset_of!(SpcData, tac_offset), 40);
        assert_eq!(offset_of!(SpcData, collect_time), 56);
        assert_eq!(offset_of!(SpcData, scan_control), 80);
        assert_eq!(offset_of!(SpcData, tac_enable_hold), 84);
        assert_eq!(offset_of!(SpcData, pci_card_no), 88);
        assert_eq!(offset_of!(SpcData, mode), 90);
        assert_eq!(offset_of!(SpcData, scan_size_x), 92);
        assert_eq!(offset_of!(SpcData, scan_polarity), 116);
        assert_eq!(offset_of!(SpcData, pixel_time), 124);
        assert_eq!(offset_of!(SpcData, macro_time_clk), 136);
        assert_eq!(offset_of!(SpcData, img_size_x), 144);
        assert_eq!(offset_of!(SpcData, xy_gain), 160);
        assert_eq!(offset_of!(SpcData, tdc_control), 176);
        assert_eq!(offset_of!(SpcData, tdc_offset), 180);
    }

    #[test]
    fn view_excludes_internal_fields() {
        let data = SpcData::default();
        let dict = data.as_dict();
        assert_eq!(dict.len(), 61);
        for internal in ["base_adr", "init", "pci_card_no", "test_eep"] {
            assert!(!dict.contains_key(internal));
        }
        assert_eq!(dict.get_index(0).unwrap().0, &"cfd_limit_low");
        assert_eq!(dict.get_index(60).unwrap().0, &"tdc_offset4");
    }

    #[test]
    fn diff_reports_exactly_the_changed_field() {
        let a = SpcData::default();
        let mut b = a;
        b.tac_gain = 4;
        let d = b.diff(&a);
        assert_eq!(d.len(), 1);
        assert_eq!(d["tac_gain"], ParValue::Int(4));
        assert!(a.diff(&a).is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn name_lookup() {
        let mut data = SpcData::default();
        data.set_by_name("tdc_offset1", ParValue::Float(0.25)).unwrap();
        assert_eq!(data.tdc_offset[0], 0.25);
        assert_eq!(data.get_by_name("tdc_offset1").unwrap(), ParValue::Float(0.25));
        assert!(matches!(
            data.get_by_name("pci_card_no"),
            Err(SpcmError::UnknownParameter(_))
        ));
    }

    #[test]
    fn display_is_python_style() {
        let data = SpcData {
            sync_freq_div: 2,
            ..Default::default()
        };
        let s = data.to_string();
        assert!(s.starts_with("<Data(cfd_limit_low=0.0, "));
        assert!(s.contains(", sync_freq_div=2, "));
        assert!(s.ends_with("tdc_offset4=0.0)>"));
    }
}
