//! Data model of the Becker & Hickl SPCM-DLL.
//!
//! This crate holds everything about SPCM that does not need the DLL itself: the `#[repr(C)]`
//! records exchanged with it, the parameter-ID table with a typed view of the parameter block,
//! vendor enumerations and flag sets, the error-code table and the crate-wide error type, FIFO
//! record decoding and the `.ini` text helpers. Device control lives in `spcmctrl_backend`.

pub mod data;
pub mod enums;
pub mod error;
pub mod fifo;
pub mod ini;
pub mod parameter;
pub mod records;

#[cfg(feature = "python")]
pub mod python;

pub use data::*;
pub use enums::*;
pub use error::*;
pub use fifo::*;
pub use ini::*;
pub use parameter::*;
pub use records::*;
