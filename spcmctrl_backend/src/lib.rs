//! # SPCM-DLL control
//!
//! Loads Becker & Hickl's `spcm64.dll` at runtime and exposes its module control, parameter,
//! measurement and FIFO functions with Rust types from [`spcm_backend`].
//!
//! ## Modules
//!
//! - [`api`]: the [`SpcmApi`] trait, one C-shaped method per DLL function.
//! - [`ffi`]: [`SpcmDll`], the `libloading` implementation of [`SpcmApi`].
//! - [`locate`]: finding the installed DLL and checking its file version.
//! - [`spcm`]: [`Spcm`], the typed wrapper used by applications.
//! - [`dump`]: a text dump of the DLL and module state.
//! - `mock` (feature `mock`): an in-process simulator implementing [`SpcmApi`].
//!
//! With the `python` feature the crate builds the `spcmctrl_backend` Python extension module.

pub mod api;
pub mod dump;
pub mod ffi;
pub mod locate;
#[cfg(feature = "mock")]
pub mod mock;
pub mod spcm;

#[cfg(feature = "python")]
mod python;

pub use crate::api::{SpcmApi, MAX_NO_OF_SPC};
pub use crate::dump::{dump_module_state, dump_state};
pub use crate::ffi::SpcmDll;
#[cfg(feature = "mock")]
pub use crate::mock::MockSpcm;
pub use crate::spcm::Spcm;
