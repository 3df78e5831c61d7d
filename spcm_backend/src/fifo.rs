//! FIFO stream format of the SPC-130/140/150/160/180 modules.
//!
//! `SPC_read_fifo` delivers the stream as 16-bit words. Each event occupies one 32-bit record,
//! stored as two words with the low word first. The layout is:
//!
//! | bits  | meaning                                     |
//! |-------|---------------------------------------------|
//! | 31    | INVALID: no valid photon                    |
//! | 30    | MTOV: macrotime overflow                    |
//! | 29    | GAP: data lost before this record           |
//! | 28    | MARK: marker record, routing bits hold mark |
//! | 16-27 | ADC value (microtime, inverted)             |
//! | 12-15 | routing signals                             |
//! | 0-11  | macrotime                                   |
//!
//! A record is a photon when both INVALID and MARK are clear. A record with INVALID and MTOV set
//! carries a count of macrotime overflows in bits 0-27 instead.
//!
//! Photon-mode streams written to `.spc` files start with a 4-byte header; the same header is
//! returned by `SPC_get_fifo_init_vars` and described by [`FifoInitVars`].

use std::fmt;

use indexmap::IndexMap;

use crate::enums::{FifoType, StreamType};
use crate::records::FieldValue;

pub const INVALID: u32 = 1 << 31;
pub const MTOV: u32 = 1 << 30;
pub const GAP: u32 = 1 << 29;
pub const MARK: u32 = 1 << 28;
const ADC_SHIFT: u32 = 16;
const ADC_MASK: u32 = 0xfff;
const ROUT_SHIFT: u32 = 12;
const ROUT_MASK: u32 = 0xf;
const MACROTIME_MASK: u32 = 0xfff;
const OVERFLOW_COUNT_MASK: u32 = 0x0fff_ffff;

/// Joins FIFO words into 32-bit records. A trailing odd word is ignored.
pub fn records_from_words(words: &[u16]) -> Vec<u32> {
    words
        .chunks_exact(2)
        .map(|pair| u32::from(pair[0]) | (u32::from(pair[1]) << 16))
        .collect()
}

/// Splits records into FIFO words, low word first.
pub fn words_from_records(records: &[u32]) -> Vec<u16> {
    records
        .iter()
        .flat_map(|&r| [(r & 0xffff) as u16, (r >> 16) as u16])
        .collect()
}

/// One decoded FIFO record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub invalid: bool,
    pub mtov: bool,
    pub gap: bool,
    pub mark: bool,
    pub adc: u16,
    pub routing: u8,
    pub macrotime: u16,
}

impl EventRecord {
    pub fn decode(record: u32) -> Self {
        Self {
            invalid: record & INVALID != 0,
            mtov: record & MTOV != 0,
            gap: record & GAP != 0,
            mark: record & MARK != 0,
            adc: ((record >> ADC_SHIFT) & ADC_MASK) as u16,
            routing: ((record >> ROUT_SHIFT) & ROUT_MASK) as u8,
            macrotime: (record & MACROTIME_MASK) as u16,
        }
    }

    pub fn encode(&self) -> u32 {
        let mut record = (u32::from(self.adc) & ADC_MASK) << ADC_SHIFT
            | (u32::from(self.routing) & ROUT_MASK) << ROUT_SHIFT
            | u32::from(self.macrotime) & MACROTIME_MASK;
        for (set, bit) in [
            (self.invalid, INVALID),
            (self.mtov, MTOV),
            (self.gap, GAP),
            (self.mark, MARK),
        ] {
            if set {
                record |= bit;
            }
        }
        record
    }

    pub fn is_photon(&self) -> bool {
        !self.invalid && !self.mark
    }

    /// Number of macrotime overflows for an INVALID+MTOV record.
    pub fn overflow_count(record: u32) -> Option<u32> {
        if record & (INVALID | MTOV) == INVALID | MTOV {
            Some(record & OVERFLOW_COUNT_MASK)
        } else {
            None
        }
    }
}

/// FIFO stream description returned by `SPC_get_fifo_init_vars`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoInitVars {
    pub fifo_type: FifoType,
    pub stream_type: StreamType,
    /// Macrotime clock in units of 0.1 ns
    pub mt_clock: i32,
    pub spc_header: [u8; 4],
}

impl FifoInitVars {
    /// Builds the SPC-130/140/150/180 file header: bytes 0-2 hold the macrotime clock, byte 3
    /// the number of routing bits in bits 3-6 and a set bit 7.
    pub fn spc_header_for(mt_clock: i32, routing_bits: u8) -> [u8; 4] {
        let clock = (mt_clock as u32 & 0x00ff_ffff).to_le_bytes();
        [clock[0], clock[1], clock[2], ((routing_bits & 0xf) << 3) | 0x80]
    }

    /// Macrotime clock stored in the header, in units of 0.1 ns.
    pub fn header_mt_clock(&self) -> u32 {
        u32::from_le_bytes([self.spc_header[0], self.spc_header[1], self.spc_header[2], 0])
    }

    pub fn header_routing_bits(&self) -> u8 {
        (self.spc_header[3] >> 3) & 0xf
    }

    pub fn as_dict(&self) -> IndexMap<&'static str, FieldValue> {
        IndexMap::from([
            ("fifo_type", FieldValue::Int(self.fifo_type.code().into())),
            ("stream_type", FieldValue::Int(self.stream_type.bits().into())),
            ("mt_clock", FieldValue::Int(self.mt_clock.into())),
            (
                "spc_header",
                FieldValue::Text(format!("{:?}", self.spc_header)),
            ),
        ])
    }
}

impl fmt::Display for FifoInitVars {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<FIFOInitVars(fifo_type={}, stream_type={}, mt_clock={}, spc_header={:?})>",
            self.fifo_type, self.stream_type, self.mt_clock, self.spc_header
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_pair_low_first() {
        let records = records_from_words(&[0x5678, 0x1234, 0xffff]);
        assert_eq!(records, vec![0x1234_5678]);
        assert_eq!(words_from_records(&records), vec![0x5678, 0x1234]);
    }

    #[test]
    fn decode_photon() {
        let rec = EventRecord::decode(0x0abc_3def);
        assert!(rec.is_photon());
        assert_eq!(rec.adc, 0xabc);
        assert_eq!(rec.routing, 0x3);
        assert_eq!(rec.macrotime, 0xdef);
        assert_eq!(rec.encode(), 0x0abc_3def);
    }

    #[test]
    fn decode_flags() {
        let marker = EventRecord::decode(MARK | 0x1000);
        assert!(!marker.is_photon());
        assert_eq!(marker.routing, 1);

        let ovfl = INVALID | MTOV | 42;
        assert!(!EventRecord::decode(ovfl).is_photon());
        assert_eq!(EventRecord::overflow_count(ovfl), Some(42));
        assert_eq!(EventRecord::overflow_count(MTOV | 42), None);

        // MTOV alone still marks a valid photon
        assert!(EventRecord::decode(MTOV | GAP).is_photon());
    }

    #[test]
    fn spc150_header() {
        let header = FifoInitVars::spc_header_for(250, 4);
        assert_eq!(header, [250, 0, 0, (4 << 3) | (1 << 7)]);
        let vars = FifoInitVars {
            fifo_type: FifoType::Spc150,
            stream_type: StreamType::BH_STREAM | StreamType::HAS_SPC_HEADER,
            mt_clock: 250,
            spc_header: header,
        };
        assert_eq!(vars.header_mt_clock(), 250);
        assert_eq!(vars.header_routing_bits(), 4);
        assert!(vars.to_string().starts_with("<FIFOInitVars(fifo_type=<FifoType.SPC_150: 7>"));
    }
}
