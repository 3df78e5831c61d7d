//! The `spcmctrl_backend` Python extension module (`python` feature).
//!
//! Exposes [`Spcm`] as the class `SPCM`, whose methods mirror the Rust ones. Enumerations cross
//! the boundary as their names (`"SIMULATE_SPC_150"`), flag sets as their integer bits and
//! parameter IDs as either names (`"collect_time"`) or integer IDs.
//!
//! # Example (python)
//! ```python
//! import spcmctrl_backend as spcm
//!
//! s = spcm.SPCM()
//! with open("spcm.ini", "w") as f:
//!     f.write(spcm.minimal_spcm_ini(150))
//! s.init("spcm.ini")
//! s.set_parameter(0, "mode", 1)
//! data = s.get_fifo_init_vars(0)
//! print(s.dump_state())
//! ```

use std::path::PathBuf;

use numpy::{IntoPyArray, PyArray1};
use pyo3::exceptions::{PyTypeError, PyValueError};
use pyo3::prelude::*;

use spcm_backend::enums::{measurement_state_bh_name as bh_name, DllOperationMode};
use spcm_backend::error::{self, SpcmError};
use spcm_backend::ini::{self, IniFile};
use spcm_backend::parameter::ParId;
use spcm_backend::python::*;

use crate::dump;
use crate::locate;
use crate::spcm::Spcm;

fn par_id_from_py(par_id: &PyAny) -> PyResult<ParId> {
    if let Ok(name) = par_id.extract::<&str>() {
        return Ok(ParId::from_name(&name.to_lowercase())?);
    }
    if let Ok(value) = par_id.extract::<i16>() {
        return Ok(ParId::from_value(value)?);
    }
    Err(PyTypeError::new_err("parameter ID must be a name or an integer"))
}

fn mode_from_py(mode: &PyAny) -> PyResult<DllOperationMode> {
    if let Ok(name) = mode.extract::<&str>() {
        let upper = name.to_uppercase();
        return DllOperationMode::ALL
            .iter()
            .copied()
            .find(|m| m.name() == upper)
            .ok_or_else(|| SpcmError::UnknownParameter(name.to_string()).into());
    }
    if let Ok(code) = mode.extract::<i16>() {
        return Ok(DllOperationMode::from_code(code)?);
    }
    Err(PyTypeError::new_err("mode must be a name or an integer"))
}

/// Handle on SPCM-DLL.
#[pyclass(name = "SPCM")]
pub struct PySpcm {
    inner: Spcm,
}

#[pymethods]
impl PySpcm {
    /// Locates and loads spcm64.dll; raises RuntimeError if that is not possible.
    #[new]
    fn new() -> PyResult<Self> {
        Ok(Self {
            inner: Spcm::load()?,
        })
    }

    /// Handle on the in-process simulator instead of the DLL.
    #[cfg(feature = "mock")]
    #[staticmethod]
    fn mock() -> Self {
        Self {
            inner: Spcm::mock(),
        }
    }

    fn init(&self, ini_file: PathBuf) -> PyResult<()> {
        Ok(self.inner.init(&ini_file)?)
    }

    fn close(&self) -> PyResult<()> {
        Ok(self.inner.close()?)
    }

    fn get_init_status(&self, mod_no: i16) -> PyResult<&'static str> {
        Ok(self.inner.get_init_status(mod_no)?.name())
    }

    fn get_mode(&self) -> PyResult<&'static str> {
        Ok(self.inner.get_mode()?.name())
    }

    #[pyo3(signature = (mode, force_use, in_use))]
    fn set_mode(&self, mode: &PyAny, force_use: bool, in_use: Vec<bool>) -> PyResult<()> {
        Ok(self.inner.set_mode(mode_from_py(mode)?, force_use, &in_use)?)
    }

    fn test_id(&self, mod_no: i16) -> PyResult<&'static str> {
        Ok(self.inner.test_id(mod_no)?.name())
    }

    fn get_module_info(&self, mod_no: i16) -> PyResult<PyModInfo> {
        Ok(PyModInfo {
            inner: self.inner.get_module_info(mod_no)?,
        })
    }

    fn get_version(&self, mod_no: i16) -> PyResult<String> {
        Ok(self.inner.get_version(mod_no)?)
    }

    fn get_parameters(&self, mod_no: i16) -> PyResult<PyData> {
        Ok(PyData {
            inner: self.inner.get_parameters(mod_no)?,
        })
    }

    fn set_parameters(&self, mod_no: i16, data: PyRef<PyData>) -> PyResult<()> {
        Ok(self.inner.set_parameters(mod_no, &data.inner)?)
    }

    fn get_parameter(&self, py: Python, mod_no: i16, par_id: &PyAny) -> PyResult<PyObject> {
        let value = self.inner.get_parameter(mod_no, par_id_from_py(par_id)?)?;
        Ok(par_value_to_py(py, value))
    }

    fn set_parameter(&self, mod_no: i16, par_id: &PyAny, value: &PyAny) -> PyResult<()> {
        let par_id = par_id_from_py(par_id)?;
        let value = par_value_from_py(par_id, value)?;
        Ok(self.inner.set_parameter(mod_no, par_id, value)?)
    }

    fn get_eeprom_data(&self, mod_no: i16) -> PyResult<PyEepData> {
        Ok(PyEepData {
            inner: self.inner.get_eeprom_data(mod_no)?,
        })
    }

    fn get_adjust_parameters(&self, mod_no: i16) -> PyResult<PyAdjustPara> {
        Ok(PyAdjustPara {
            inner: self.inner.get_adjust_parameters(mod_no)?,
        })
    }

    fn read_parameters_from_inifile(&self, ini_file: PathBuf) -> PyResult<PyData> {
        Ok(PyData {
            inner: self.inner.read_parameters_from_inifile(&ini_file)?,
        })
    }

    #[pyo3(signature = (data, dest_inifile, source_inifile=None, with_comments=false))]
    fn save_parameters_to_inifile(
        &self,
        data: PyRef<PyData>,
        dest_inifile: PathBuf,
        source_inifile: Option<PathBuf>,
        with_comments: bool,
    ) -> PyResult<()> {
        Ok(self.inner.save_parameters_to_inifile(
            &data.inner,
            &dest_inifile,
            source_inifile.as_deref(),
            with_comments,
        )?)
    }

    fn test_state(&self, mod_no: i16) -> PyResult<u16> {
        Ok(self.inner.test_state(mod_no)?.bits())
    }

    fn get_sync_state(&self, mod_no: i16) -> PyResult<u16> {
        Ok(self.inner.get_sync_state(mod_no)?.bits())
    }

    fn get_time_from_start(&self, mod_no: i16) -> PyResult<f32> {
        Ok(self.inner.get_time_from_start(mod_no)?)
    }

    fn get_break_time(&self, mod_no: i16) -> PyResult<f32> {
        Ok(self.inner.get_break_time(mod_no)?)
    }

    fn get_actual_coltime(&self, mod_no: i16) -> PyResult<f32> {
        Ok(self.inner.get_actual_coltime(mod_no)?)
    }

    fn clear_rates(&self, mod_no: i16) -> PyResult<()> {
        Ok(self.inner.clear_rates(mod_no)?)
    }

    /// None until a full rate integration period has passed since `clear_rates`.
    fn read_rates(&self, mod_no: i16) -> PyResult<Option<PyRateValues>> {
        Ok(self
            .inner
            .read_rates(mod_no)?
            .map(|inner| PyRateValues { inner }))
    }

    fn get_fifo_usage(&self, mod_no: i16) -> PyResult<f32> {
        Ok(self.inner.get_fifo_usage(mod_no)?)
    }

    fn start_measurement(&self, mod_no: i16) -> PyResult<()> {
        Ok(self.inner.start_measurement(mod_no)?)
    }

    fn stop_measurement(&self, mod_no: i16) -> PyResult<()> {
        Ok(self.inner.stop_measurement(mod_no)?)
    }

    /// Reads up to `max_words` 16-bit FIFO words into a numpy array.
    fn read_fifo_to_array<'py>(
        &self,
        py: Python<'py>,
        mod_no: i16,
        max_words: usize,
    ) -> PyResult<&'py PyArray1<u16>> {
        let words = self.inner.read_fifo_to_array(mod_no, max_words)?;
        Ok(words.into_pyarray(py))
    }

    fn get_fifo_init_vars(&self, mod_no: i16) -> PyResult<PyFifoInitVars> {
        Ok(PyFifoInitVars {
            inner: self.inner.get_fifo_init_vars(mod_no)?,
        })
    }

    /// Text dump of the DLL mode and the given modules (default: module 0; None: all).
    #[pyo3(signature = (mod_nos=vec![0]))]
    fn dump_state(&self, mod_nos: Option<Vec<i16>>) -> PyResult<String> {
        let mut out = Vec::new();
        dump::dump_state(&self.inner, mod_nos.as_deref(), &mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Text dump of one module; raises SPCMError if the module is not active.
    fn dump_module_state(&self, mod_no: i16) -> PyResult<String> {
        let mut out = Vec::new();
        dump::dump_module_state(&self.inner, mod_no, &mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Temporary `spcm.ini`; use as a context manager, which yields the file path.
///
/// The file and its directory are removed on exit.
#[pyclass(name = "IniFile")]
pub struct PyIniFile {
    inner: Option<IniFile>,
}

#[pymethods]
impl PyIniFile {
    #[getter]
    fn path(&self) -> PyResult<PathBuf> {
        self.inner
            .as_ref()
            .map(|ini| ini.path().to_path_buf())
            .ok_or_else(|| PyValueError::new_err("temporary ini file already removed"))
    }

    fn __enter__(&self) -> PyResult<PathBuf> {
        self.path()
    }

    fn __exit__(&mut self, _exc_type: &PyAny, _exc_value: &PyAny, _traceback: &PyAny) -> bool {
        self.inner = None;
        false
    }
}

#[pyfunction]
fn error_string(code: i64) -> PyResult<String> {
    Ok(error::error_string(code)?)
}

#[pyfunction]
fn minimal_spcm_ini(mode: i16) -> String {
    ini::minimal_spcm_ini(mode)
}

#[pyfunction]
fn ini_file(text: &str) -> PyResult<PyIniFile> {
    Ok(PyIniFile {
        inner: Some(IniFile::new(text)?),
    })
}

/// File version of the installed spcm64.dll, e.g. "5.2.0.0".
#[pyfunction]
fn spcm_dll_version() -> PyResult<String> {
    Ok(locate::spcm_dll_version()?.to_string())
}

#[pyfunction]
fn measurement_state_bh_name(name: &str) -> Option<&'static str> {
    bh_name(name)
}

#[pymodule]
fn spcmctrl_backend(py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PySpcm>()?;
    m.add_class::<PyData>()?;
    m.add_class::<PyAdjustPara>()?;
    m.add_class::<PyEepData>()?;
    m.add_class::<PyModInfo>()?;
    m.add_class::<PyRateValues>()?;
    m.add_class::<PyFifoInitVars>()?;
    m.add_class::<PyIniFile>()?;
    m.add("SPCMError", py.get_type::<SPCMError>())?;
    m.add_function(wrap_pyfunction!(error_string, m)?)?;
    m.add_function(wrap_pyfunction!(minimal_spcm_ini, m)?)?;
    m.add_function(wrap_pyfunction!(ini_file, m)?)?;
    m.add_function(wrap_pyfunction!(spcm_dll_version, m)?)?;
    m.add_function(wrap_pyfunction!(measurement_state_bh_name, m)?)?;
    Ok(())
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use pyo3::types::IntoPyDict;

    fn run(py: Python, code: &str, spcm: PySpcm) {
        let spcm = Py::new(py, spcm).unwrap();
        let ini = Py::new(py, ini_file(&ini::minimal_spcm_ini(150)).unwrap()).unwrap();
        let locals = [("s", spcm.to_object(py)), ("ini", ini.to_object(py))].into_py_dict(py);
        if let Err(e) = py.run(code, None, Some(locals)) {
            e.print(py);
            panic!("python code failed");
        }
    }

    #[test]
    fn dump_state_defaults_to_module_zero() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            run(
                py,
                r#"
with ini as path:
    s.init(path)
text = s.dump_state()
assert text.startswith("<DllOperationMode.SIMULATE_SPC_150: 150>\n\nModule 0: "), text
assert "Module 1" not in text
assert "Module 31: " in s.dump_state(None)
assert s.dump_module_state(0).startswith("Module 0: ")
"#,
                PySpcm::mock(),
            );
        });
    }

    #[test]
    fn parameters_by_name_or_number() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            run(
                py,
                r#"
with ini as path:
    s.init(path)
    s.set_parameter(0, "COLLECT_TIME", 2)
    assert s.get_parameter(0, "collect_time") == 2.0
    s.set_parameter(0, 27, 1)
    assert s.get_parameter(0, "mode") == 1
    try:
        s.set_parameter(0, "mode", 1.0)
    except TypeError:
        pass
    else:
        raise AssertionError("float accepted for an int parameter")
    s.set_mode("simulate_spc_150", False, [True])
    assert s.get_init_status(1) == "NOT_DONE"
"#,
                PySpcm::mock(),
            );
        });
    }

    #[test]
    fn ini_file_is_removed_on_exit() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            run(
                py,
                r#"
import os
with ini as path:
    with open(path) as f:
        assert f.readline().startswith("; SPCM")
assert not os.path.exists(path)
"#,
                PySpcm::mock(),
            );
        });
    }
}
