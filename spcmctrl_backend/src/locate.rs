//! Finding `spcm64.dll` and checking its version.
//!
//! The SPCM installer records the path of its executable in the registry value
//! `HKEY_CURRENT_USER\SOFTWARE\BH\SPCM\FilePath`; the DLL sits in the `DLL` directory next to
//! it. A fixed default install directory is tried as a fallback. The first candidate directory
//! that contains `spcm64.dll` wins, and the result of the search is cached for the lifetime of
//! the process.
//!
//! Only Windows x64 is supported. On other targets every lookup fails with
//! [`SpcmError::UnsupportedPlatform`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::debug;

use spcm_backend::error::{Result, SpcmError};

pub const DLL_NAME: &str = "spcm64.dll";
pub const FALLBACK_DLL_DIR: &str = "C:/Program Files (x86)/BH/SPCM/DLL";
const REGISTRY_KEY: &str = "SOFTWARE\\BH\\SPCM";
const REGISTRY_VALUE: &str = "FilePath";

/// Structure layouts changed (and functions were added) in 4.00.
pub const MIN_DLL_VERSION: DllVersion = DllVersion([4, 0, 0, 0]);

/// A four-part file version, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DllVersion(pub [u16; 4]);

impl DllVersion {
    /// Splits the two 32-bit halves of a `VS_FIXEDFILEINFO` file version.
    pub fn from_ms_ls(ms: u32, ls: u32) -> Self {
        Self([(ms >> 16) as u16, ms as u16, (ls >> 16) as u16, ls as u16])
    }
}

impl fmt::Display for DllVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

/// Rejects versions older than [`MIN_DLL_VERSION`].
pub fn check_version(version: DllVersion) -> Result<()> {
    if version < MIN_DLL_VERSION {
        return Err(SpcmError::UnsupportedDllVersion {
            found: version.to_string(),
        });
    }
    Ok(())
}

fn supported_platform() -> Result<()> {
    if cfg!(all(windows, target_arch = "x86_64")) {
        Ok(())
    } else {
        Err(SpcmError::UnsupportedPlatform)
    }
}

/// Directories to search, in order: the registry-derived one (if any), then the fallback.
pub fn candidate_dirs(registry_exe_path: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = registry_exe_path.and_then(Path::parent) {
        candidates.push(dir.join("DLL"));
    }
    let fixed = PathBuf::from(FALLBACK_DLL_DIR);
    if !candidates.contains(&fixed) {
        candidates.push(fixed);
    }
    candidates
}

/// Returns the first directory in `candidates` that contains the DLL.
pub fn find_dll_dir(candidates: &[PathBuf]) -> Result<PathBuf> {
    candidates
        .iter()
        .find(|dir| dir.is_dir() && dir.join(DLL_NAME).exists())
        .cloned()
        .ok_or_else(|| SpcmError::DllNotFound {
            tried: candidates.to_vec(),
        })
}

/// Directory containing `spcm64.dll`; searched once per process.
pub fn spcm_dll_dir() -> Result<PathBuf> {
    supported_platform()?;
    static DLL_DIR: OnceLock<std::result::Result<PathBuf, Vec<PathBuf>>> = OnceLock::new();
    let found = DLL_DIR.get_or_init(|| {
        let exe_path = registry_exe_path();
        debug!(?exe_path, "SPCM registry FilePath");
        let candidates = candidate_dirs(exe_path.as_deref());
        find_dll_dir(&candidates).map_err(|_| candidates)
    });
    match found {
        Ok(dir) => Ok(dir.clone()),
        Err(tried) => Err(SpcmError::DllNotFound {
            tried: tried.clone(),
        }),
    }
}

/// Full path of `spcm64.dll`.
pub fn spcm_dll_path() -> Result<PathBuf> {
    Ok(spcm_dll_dir()?.join(DLL_NAME))
}

/// File version of the installed `spcm64.dll`.
pub fn spcm_dll_version() -> Result<DllVersion> {
    dll_file_version(&spcm_dll_path()?)
}

#[cfg(windows)]
fn to_wide(s: &std::ffi::OsStr) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    s.encode_wide().chain(std::iter::once(0)).collect()
}

#[cfg(windows)]
fn registry_exe_path() -> Option<PathBuf> {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use windows_sys::Win32::Foundation::ERROR_SUCCESS;
    use windows_sys::Win32::System::Registry::{RegGetValueW, HKEY_CURRENT_USER, RRF_RT_REG_SZ};

    let key = to_wide(REGISTRY_KEY.as_ref());
    let value = to_wide(REGISTRY_VALUE.as_ref());
    let mut buf = vec![0u16; 1024];
    let mut size = (buf.len() * 2) as u32;
    let status = unsafe {
        RegGetValueW(
            HKEY_CURRENT_USER,
            key.as_ptr(),
            value.as_ptr(),
            RRF_RT_REG_SZ,
            std::ptr::null_mut(),
            buf.as_mut_ptr().cast(),
            &mut size,
        )
    };
    if status != ERROR_SUCCESS {
        return None;
    }
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    Some(PathBuf::from(OsString::from_wide(&buf[..len])))
}

#[cfg(not(windows))]
fn registry_exe_path() -> Option<PathBuf> {
    let _ = (REGISTRY_KEY, REGISTRY_VALUE);
    None
}

/// Reads the file version from the Windows version resource of `path`.
#[cfg(windows)]
pub fn dll_file_version(path: &Path) -> Result<DllVersion> {
    use windows_sys::Win32::Storage::FileSystem::{
        GetFileVersionInfoSizeW, GetFileVersionInfoW, VerQueryValueW, VS_FIXEDFILEINFO,
    };

    let no_version = || SpcmError::Load {
        path: path.to_path_buf(),
        message: "no version resource".to_string(),
    };
    let wide_path = to_wide(path.as_os_str());
    let mut handle = 0u32;
    let size = unsafe { GetFileVersionInfoSizeW(wide_path.as_ptr(), &mut handle) };
    if size == 0 {
        return Err(no_version());
    }
    let mut block = vec![0u8; size as usize];
    let ok = unsafe { GetFileVersionInfoW(wide_path.as_ptr(), 0, size, block.as_mut_ptr().cast()) };
    if ok == 0 {
        return Err(no_version());
    }
    let root = to_wide("\\".as_ref());
    let mut info: *mut std::ffi::c_void = std::ptr::null_mut();
    let mut info_len = 0u32;
    let ok = unsafe { VerQueryValueW(block.as_ptr().cast(), root.as_ptr(), &mut info, &mut info_len) };
    if ok == 0 || info.is_null() || (info_len as usize) < std::mem::size_of::<VS_FIXEDFILEINFO>() {
        return Err(no_version());
    }
    // info points into block, which is still alive
    let fixed = unsafe { &*(info as *const VS_FIXEDFILEINFO) };
    Ok(DllVersion::from_ms_ls(fixed.dwFileVersionMS, fixed.dwFileVersionLS))
}

#[cfg(not(windows))]
pub fn dll_file_version(_path: &Path) -> Result<DllVersion> {
    Err(SpcmError::UnsupportedPlatform)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering_and_display() {
        let v = DllVersion::from_ms_ls(0x0004_0002, 0x0000_0007);
        assert_eq!(v, DllVersion([4, 2, 0, 7]));
        assert_eq!(v.to_string(), "4.2.0.7");
        assert!(check_version(v).is_ok());
        assert!(check_version(MIN_DLL_VERSION).is_ok());

        let old = DllVersion([3, 90, 0, 0]);
        match check_version(old) {
            Err(SpcmError::UnsupportedDllVersion { found }) => assert_eq!(found, "3.90.0.0"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn candidates_follow_registry_then_fallback() {
        let exe = Path::new("D:/BH/SPCM/spcm64.exe");
        assert_eq!(
            candidate_dirs(Some(exe)),
            vec![PathBuf::from("D:/BH/SPCM/DLL"), PathBuf::from(FALLBACK_DLL_DIR)]
        );
        assert_eq!(candidate_dirs(None), vec![PathBuf::from(FALLBACK_DLL_DIR)]);

        // No duplicate when the registry points at the default install
        let default_exe = Path::new("C:/Program Files (x86)/BH/SPCM/spcm64.exe");
        assert_eq!(candidate_dirs(Some(default_exe)).len(), 1);
    }

    #[test]
    fn first_directory_with_dll_wins() {
        let empty = tempfile::tempdir().unwrap();
        let with_dll = tempfile::tempdir().unwrap();
        std::fs::write(with_dll.path().join(DLL_NAME), b"").unwrap();

        let candidates = vec![
            empty.path().to_path_buf(),
            with_dll.path().to_path_buf(),
            PathBuf::from("/no/such/dir"),
        ];
        assert_eq!(find_dll_dir(&candidates).unwrap(), with_dll.path());

        let missing = vec![empty.path().to_path_buf()];
        match find_dll_dir(&missing) {
            Err(SpcmError::DllNotFound { tried }) => assert_eq!(tried, missing),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[cfg(not(all(windows, target_arch = "x86_64")))]
    #[test]
    fn other_platforms_are_rejected() {
        assert!(matches!(spcm_dll_dir(), Err(SpcmError::UnsupportedPlatform)));
        assert!(matches!(
            dll_file_version(Path::new(DLL_NAME)),
            Err(SpcmError::UnsupportedPlatform)
        ));
    }
}
