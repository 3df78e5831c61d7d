//! Python value classes for the SPCM records (`python` feature).
//!
//! Each class wraps the corresponding Rust record and exposes its fields as attributes. The
//! classes are registered by the `spcmctrl_backend` extension module; this module only defines
//! them together with the conversion of [`SpcmError`] into Python exceptions.
//!
//! # Example (python)
//! ```python
//! from spcmctrl_backend import Data
//!
//! d = Data()
//! d.collect_time = 2       # ints are accepted for float fields
//! d.sync_freq_div = 4
//! assert d.diff_as_dict(Data()) == {"collect_time": 2.0, "sync_freq_div": 4}
//! d.mode = 1.0             # TypeError
//! ```

use indexmap::IndexMap;
use pyo3::basic::CompareOp;
use pyo3::create_exception;
use pyo3::exceptions::{
    PyAttributeError, PyException, PyOSError, PyOverflowError, PyRuntimeError, PyTypeError,
    PyValueError,
};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict, PyFloat};

use crate::data::SpcData;
use crate::error::SpcmError;
use crate::fifo::FifoInitVars;
use crate::parameter::{ParId, ParType, ParValue};
use crate::records::{AdjustPara, EepData, FieldValue, ModInfo, RateValues};

create_exception!(
    spcmctrl_backend,
    SPCMError,
    PyException,
    "Error returned by an SPCM-DLL function; args are (code, name, message)."
);

impl From<SpcmError> for PyErr {
    fn from(err: SpcmError) -> PyErr {
        match &err {
            SpcmError::Dll {
                code,
                kind,
                message,
            } => SPCMError::new_err((*code, kind.name(), message.clone())),
            SpcmError::ParameterType { .. } => PyTypeError::new_err(err.to_string()),
            SpcmError::OutOfRange { .. } | SpcmError::CodeOverflow(_) => {
                PyOverflowError::new_err(err.to_string())
            }
            SpcmError::InvalidEnumValue { .. }
            | SpcmError::TooManyModules { .. }
            | SpcmError::Nul(_) => PyValueError::new_err(err.to_string()),
            SpcmError::UnknownParameter(_) => PyAttributeError::new_err(err.to_string()),
            SpcmError::Io(_) => PyOSError::new_err(err.to_string()),
            SpcmError::DllNotFound { .. }
            | SpcmError::UnsupportedPlatform
            | SpcmError::UnsupportedDllVersion { .. }
            | SpcmError::Load { .. } => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

pub fn par_value_to_py(py: Python, value: ParValue) -> PyObject {
    match value {
        ParValue::Int(v) => v.into_py(py),
        ParValue::Float(v) => v.into_py(py),
    }
}

/// Converts a Python number to the declared type of `par_id`.
///
/// Python ints are accepted for float parameters; floats for integer parameters are rejected.
pub fn par_value_from_py(par_id: ParId, value: &PyAny) -> PyResult<ParValue> {
    match par_id.par_type() {
        ParType::Int => {
            if value.is_instance_of::<PyFloat>() {
                return Err(SpcmError::ParameterType {
                    name: par_id.name(),
                    expected: ParType::Int,
                }
                .into());
            }
            Ok(ParValue::Int(value.extract()?))
        }
        ParType::Float => Ok(ParValue::Float(value.extract()?)),
    }
}

fn field_to_py(py: Python, value: &FieldValue) -> PyResult<PyObject> {
    Ok(match value {
        FieldValue::Int(v) => v.into_py(py),
        FieldValue::Float(v) => v.into_py(py),
        FieldValue::Text(s) => s.into_py(py),
        FieldValue::ModuleType(v) => v.name().into_py(py),
        FieldValue::InUse(v) => v.name().into_py(py),
        FieldValue::Init(v) => v.name().into_py(py),
        FieldValue::AdjustPara(v) => Py::new(py, PyAdjustPara { inner: *v })?.into_py(py),
    })
}

fn fields_to_dict<'py>(
    py: Python<'py>,
    fields: &IndexMap<&'static str, FieldValue>,
) -> PyResult<&'py PyDict> {
    let dict = PyDict::new(py);
    for (name, value) in fields {
        dict.set_item(name, field_to_py(py, value)?)?;
    }
    Ok(dict)
}

fn eq_only<T: PartialEq>(a: &T, b: &T, op: CompareOp, py: Python) -> PyObject {
    match op {
        CompareOp::Eq => (a == b).into_py(py),
        CompareOp::Ne => (a != b).into_py(py),
        _ => py.NotImplemented(),
    }
}

/// SPC module parameters (`SPCdata`).
#[pyclass(name = "Data")]
#[derive(Clone, Default)]
pub struct PyData {
    pub inner: SpcData,
}

#[pymethods]
impl PyData {
    #[new]
    pub fn new() -> Self {
        Self::default()
    }

    #[classattr]
    fn _fields() -> Vec<&'static str> {
        ParId::ALL.iter().map(|p| p.name()).collect()
    }

    fn __getattr__(&self, py: Python, name: &str) -> PyResult<PyObject> {
        Ok(par_value_to_py(py, self.inner.get_by_name(name)?))
    }

    fn __setattr__(&mut self, name: &str, value: &PyAny) -> PyResult<()> {
        let par_id = ParId::from_name(name)?;
        let value = par_value_from_py(par_id, value)?;
        Ok(self.inner.set(par_id, value)?)
    }

    fn __repr__(&self) -> String {
        self.inner.to_string()
    }

    fn __richcmp__(&self, other: PyRef<Self>, op: CompareOp, py: Python) -> PyObject {
        eq_only(&self.inner, &other.inner, op, py)
    }

    fn __copy__(&self) -> Self {
        self.clone()
    }

    fn __deepcopy__(&self, _memo: &PyAny) -> Self {
        self.clone()
    }

    fn as_dict<'py>(&self, py: Python<'py>) -> PyResult<&'py PyDict> {
        let dict = PyDict::new(py);
        for (name, value) in self.inner.items() {
            dict.set_item(name, par_value_to_py(py, value))?;
        }
        Ok(dict)
    }

    fn items(&self, py: Python) -> Vec<(&'static str, PyObject)> {
        self.inner
            .items()
            .map(|(name, value)| (name, par_value_to_py(py, value)))
            .collect()
    }

    /// Fields of this block that differ from `other`.
    fn diff_as_dict<'py>(&self, py: Python<'py>, other: PyRef<Self>) -> PyResult<&'py PyDict> {
        let dict = PyDict::new(py);
        for (name, value) in self.inner.diff(&other.inner) {
            dict.set_item(name, par_value_to_py(py, value))?;
        }
        Ok(dict)
    }
}

macro_rules! py_record {
    ($py_type:ident, $py_name:literal, $inner:ty) => {
        #[pyclass(name = $py_name)]
        #[derive(Clone, Default)]
        pub struct $py_type {
            pub inner: $inner,
        }

        #[pymethods]
        impl $py_type {
            #[new]
            pub fn new() -> Self {
                Self::default()
            }

            fn __getattr__(&self, py: Python, name: &str) -> PyResult<PyObject> {
                match self.inner.as_dict().get(name) {
                    Some(value) => field_to_py(py, value),
                    None => Err(PyAttributeError::new_err(name.to_string())),
                }
            }

            fn __repr__(&self) -> String {
                self.inner.to_string()
            }

            fn __richcmp__(&self, other: PyRef<Self>, op: CompareOp, py: Python) -> PyObject {
                eq_only(&self.inner, &other.inner, op, py)
            }

            fn __copy__(&self) -> Self {
                self.clone()
            }

            fn __deepcopy__(&self, _memo: &PyAny) -> Self {
                self.clone()
            }

            fn as_dict<'py>(&self, py: Python<'py>) -> PyResult<&'py PyDict> {
                fields_to_dict(py, &self.inner.as_dict())
            }
        }
    };
}

py_record!(PyAdjustPara, "AdjustPara", AdjustPara);
py_record!(PyEepData, "EEPData", EepData);
py_record!(PyModInfo, "ModInfo", ModInfo);
py_record!(PyRateValues, "RateValues", RateValues);

/// FIFO stream description (`SPC_get_fifo_init_vars`).
#[pyclass(name = "FIFOInitVars")]
#[derive(Clone)]
pub struct PyFifoInitVars {
    pub inner: FifoInitVars,
}

#[pymethods]
impl PyFifoInitVars {
    #[getter]
    fn fifo_type(&self) -> &'static str {
        self.inner.fifo_type.name()
    }

    #[getter]
    fn stream_type(&self) -> i32 {
        self.inner.stream_type.bits()
    }

    #[getter]
    fn mt_clock(&self) -> i32 {
        self.inner.mt_clock
    }

    #[getter]
    fn spc_header<'py>(&self, py: Python<'py>) -> &'py PyBytes {
        PyBytes::new(py, &self.inner.spc_header)
    }

    fn __repr__(&self) -> String {
        self.inner.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyo3::types::IntoPyDict;

    fn with_py<F: FnOnce(Python)>(f: F) {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(f);
    }

    #[test]
    fn int_parameters_reject_floats() {
        with_py(|py| {
            let err = par_value_from_py(ParId::Mode, 1.0f64.into_py(py).as_ref(py)).unwrap_err();
            assert!(err.is_instance_of::<PyTypeError>(py));

            let value = par_value_from_py(ParId::Mode, 1i64.into_py(py).as_ref(py)).unwrap();
            assert_eq!(value, ParValue::Int(1));
        });
    }

    #[test]
    fn float_parameters_accept_ints() {
        with_py(|py| {
            let value = par_value_from_py(ParId::CollectTime, 2i64.into_py(py).as_ref(py)).unwrap();
            assert_eq!(value, ParValue::Float(2.0));
        });
    }

    #[test]
    fn errors_map_to_python_exceptions() {
        with_py(|py| {
            let err = PyErr::from(crate::error::error_string(32768).unwrap_err());
            assert!(err.is_instance_of::<PyOverflowError>(py));

            let err = PyErr::from(SpcmError::ParameterType {
                name: "mode",
                expected: ParType::Int,
            });
            assert!(err.is_instance_of::<PyTypeError>(py));

            let err = PyErr::from(SpcmError::UnknownParameter("nope".to_string()));
            assert!(err.is_instance_of::<PyAttributeError>(py));

            let err = PyErr::from(SpcmError::from_code(-13));
            assert!(err.is_instance_of::<SPCMError>(py));
            let args: (i16, String, String) = err.value(py).getattr("args").unwrap().extract().unwrap();
            assert_eq!(args.0, -13);
            assert_eq!(args.1, "MOD_NO");
        });
    }

    #[test]
    fn data_behaves_like_a_value() {
        with_py(|py| {
            let data = Py::new(py, PyData::new()).unwrap();
            let locals = [("d", data)].into_py_dict(py);
            let code = r#"
import copy
Data = type(d)
assert Data._fields[0] == "cfd_limit_low"
assert len(Data._fields) == 61
e = copy.copy(d)
assert e == d
d.collect_time = 2
assert d.collect_time == 2.0
assert e != d
assert copy.deepcopy(d) == d
assert d.diff_as_dict(e) == {"collect_time": 2.0}
try:
    d.mode = 1.0
except TypeError:
    pass
else:
    raise AssertionError("float accepted for an int field")
try:
    d.no_such_field
except AttributeError:
    pass
else:
    raise AssertionError("unknown field read")
"#;
            if let Err(e) = py.run(code, None, Some(locals)) {
                e.print(py);
                panic!("python code failed");
            }
        });
    }
}
