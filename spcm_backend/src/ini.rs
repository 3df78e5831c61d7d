//! Helpers for the `.ini` configuration text read by `SPC_init`.
//!
//! Only the minimum needed to drive the DLL is covered: generating a minimal configuration,
//! placing text in a temporary file for the duration of a call, checking the marker line the
//! DLL requires, and a small parser for the `key = value` sections of files the DLL writes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use tempfile::TempDir;

use crate::error::Result;

/// Returns the text of a minimal `.ini` file for `SPC_init`.
///
/// `mode` is the DLL operation mode: 0 for hardware, or a simulated module-type code. No module
/// parameters are set. The `[spc_module]` heading is included so that the file can also serve as
/// a source for saving and reading parameters.
///
/// ```
/// let text = spcm_backend::ini::minimal_spcm_ini(180);
/// assert!(text.starts_with("; SPCM"));
/// assert!(text.contains("simulation = 180"));
/// ```
pub fn minimal_spcm_ini(mode: i16) -> String {
    // The DLL rejects files whose first line is not a "; SPCM" comment
    format!("; SPCM\n[spc_base]\nsimulation = {}\n[spc_module]\n", mode)
}

/// True if the first line of `text` carries the marker comment the DLL requires.
pub fn is_spcm_ini(text: &str) -> bool {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let marker = MARKER.get_or_init(|| Regex::new(r"^\s*;\s*SPCM").unwrap());
    text.lines().next().is_some_and(|line| marker.is_match(line))
}

/// Parses `[section]` / `key = value` text into ordered maps.
///
/// Comments (`;` or `#`) and blank lines are skipped. Keys before the first section heading are
/// collected under the empty section name. Keys are lowercased; the DLL treats them
/// case-insensitively.
pub fn parse_ini(text: &str) -> IndexMap<String, IndexMap<String, String>> {
    let mut sections: IndexMap<String, IndexMap<String, String>> = IndexMap::new();
    let mut current = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim().to_lowercase();
            sections.entry(current.clone()).or_default();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.split(';').next().unwrap_or("").trim();
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_lowercase(), value.to_string());
        }
    }
    sections
}

/// A temporary `.ini` file, deleted together with its directory on drop.
pub struct IniFile {
    path: PathBuf,
    _dir: TempDir,
}

impl IniFile {
    pub fn new(text: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("spcm").tempdir()?;
        let path = dir.path().join("spcm.ini");
        fs::write(&path, text)?;
        Ok(Self { path, _dir: dir })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Shorthand for [`IniFile::new`].
pub fn ini_file(text: &str) -> Result<IniFile> {
    IniFile::new(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_ini_is_valid() {
        let text = minimal_spcm_ini(150);
        assert!(is_spcm_ini(&text));
        let parsed = parse_ini(&text);
        assert_eq!(parsed["spc_base"]["simulation"], "150");
        assert!(parsed["spc_module"].is_empty());
    }

    #[test]
    fn marker_must_be_on_first_line() {
        assert!(is_spcm_ini("  ;  SPCM settings\n"));
        assert!(!is_spcm_ini("invalid"));
        assert!(!is_spcm_ini(""));
        assert!(!is_spcm_ini("\n; SPCM\n"));
    }

    #[test]
    fn parse_sections_and_comments() {
        let text = "; SPCM\n[SPC_MODULE]\nCOLLECT_TIME = 0.5 ; seconds\n# other\n\nmode=1\n";
        let parsed = parse_ini(text);
        let module = &parsed["spc_module"];
        assert_eq!(module["collect_time"], "0.5");
        assert_eq!(module["mode"], "1");
        assert_eq!(module.len(), 2);
    }

    #[test]
    fn temporary_file_lifetime() {
        let ini = ini_file("blah").unwrap();
        let path = ini.path().to_path_buf();
        assert_eq!(path.extension().unwrap(), "ini");
        assert_eq!(fs::read_to_string(&path).unwrap(), "blah");
        drop(ini);
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());
    }
}
