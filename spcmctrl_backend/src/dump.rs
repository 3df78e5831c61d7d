//! Human-readable dump of the DLL and module state, for troubleshooting.
//!
//! Each query is made independently and a failing query is reported in place of its result, so
//! that one broken call does not hide the rest of the state.

use std::io::Write;

use textwrap::{Options, WordSplitter};

use spcm_backend::error::{ErrorEnum, Result, SpcmError};

use crate::api::MAX_NO_OF_SPC;
use crate::spcm::Spcm;

const PARAMS_WIDTH: usize = 79;
const PARAMS_INDENT: &str = "    ";

/// Prints the state of one module.
///
/// Fails only if the module is not active (`test_id` returns `NOT_ACTIVE`) or writing to `out`
/// fails; any other failure is printed.
pub fn dump_module_state<W: Write>(spcm: &Spcm, mod_no: i16, out: &mut W) -> Result<()> {
    let module_type = match spcm.test_id(mod_no) {
        Ok(module_type) => module_type,
        Err(e) if e.is(ErrorEnum::NotActive) => return Err(e),
        Err(e) => {
            writeln!(out, "Module {}: test_id() failed: {}", mod_no, e)?;
            return Ok(());
        }
    };
    writeln!(out, "Module {}: {}", mod_no, module_type)?;

    let init_status = spcm.get_init_status(mod_no);
    match &init_status {
        Ok(status) => writeln!(out, "  {}", status)?,
        Err(e) => writeln!(out, "  get_init_status() failed: {}", e)?,
    }

    match spcm.get_module_info(mod_no) {
        Ok(info) => {
            if info.module_type != module_type {
                writeln!(out, "  ModInfo.module_type: {}", info.module_type)?;
            }
            writeln!(out, "  PCI bus/slot:        {}, {}", info.bus_number, info.slot_number)?;
            writeln!(out, "  ModInfo.in_use:      {}", info.in_use)?;
            if init_status.as_ref().ok() != Some(&info.init) {
                writeln!(out, "  ModInfo.init_status: {}", info.init)?;
            }
        }
        Err(e) => writeln!(out, "  get_module_info() failed: {}", e)?,
    }

    match spcm.get_eeprom_data(mod_no) {
        Ok(eep) => {
            writeln!(out, "  EEPData.module_type: {}", eep.module_type)?;
            writeln!(out, "  EEPData.serial_no:   {}", eep.serial_no)?;
            writeln!(out, "  EEPData.date:        {}", eep.date)?;
        }
        Err(e) => writeln!(out, "  get_eeprom_data() failed: {}", e)?,
    }

    match spcm.get_version(mod_no) {
        Ok(version) => writeln!(out, "  FPGA Version:        {}", version)?,
        Err(e) => writeln!(out, "  get_version() failed: {}", e)?,
    }

    match spcm.test_state(mod_no) {
        Ok(state) => writeln!(out, "  State:               {}", state)?,
        Err(e) => writeln!(out, "  test_state() failed: {}", e)?,
    }

    match spcm.get_sync_state(mod_no) {
        Ok(state) => writeln!(out, "  Sync state:          {}", state)?,
        Err(e) => writeln!(out, "  get_sync_state() failed: {}", e)?,
    }

    match spcm.get_parameters(mod_no) {
        Ok(data) => {
            let params: Vec<String> = data
                .items()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect();
            let params = params.join(" ");
            writeln!(out, "  Parameters:")?;
            let options = Options::new(PARAMS_WIDTH)
                .initial_indent(PARAMS_INDENT)
                .subsequent_indent(PARAMS_INDENT)
                .break_words(false)
                .word_splitter(WordSplitter::NoHyphenation);
            for line in textwrap::wrap(&params, options) {
                writeln!(out, "{}", line)?;
            }
        }
        Err(e) => writeln!(out, "  get_parameters() failed: {}", e)?,
    }
    Ok(())
}

/// Prints the DLL operation mode followed by the state of each module in `mod_nos`
/// (all 32 if `None`). Inactive modules are reported as such.
///
/// Fails if the DLL mode cannot be read; module queries never fail the dump.
pub fn dump_state<W: Write>(spcm: &Spcm, mod_nos: Option<&[i16]>, out: &mut W) -> Result<()> {
    let mode = spcm.get_mode()?;
    writeln!(out, "{}", mode)?;

    let all: Vec<i16> = (0..MAX_NO_OF_SPC as i16).collect();
    for &mod_no in mod_nos.unwrap_or(&all) {
        writeln!(out)?;
        match dump_module_state(spcm, mod_no, out) {
            Ok(()) => {}
            Err(e @ SpcmError::Io(_)) => return Err(e),
            Err(_) => writeln!(out, "Module {} is not active", mod_no)?,
        }
    }
    Ok(())
}
