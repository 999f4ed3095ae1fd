// Tynne PyO3-innpakninger rundt json_api. All logikk bor i kjernen,
// her mappes bare CoreError til ValueError.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::error::CoreError;
use crate::json_api;

fn to_py(e: CoreError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

#[pyfunction]
fn analyze_samples_json(session_id: &str, samples_json: &str) -> PyResult<String> {
    json_api::analyze_samples_json(session_id, samples_json).map_err(to_py)
}

#[pyfunction]
#[pyo3(signature = (user_id, days, rows_json))]
fn compare_history_json(user_id: &str, days: u32, rows_json: &str) -> PyResult<String> {
    json_api::compare_history_json(user_id, days, rows_json).map_err(to_py)
}

#[pyfunction]
fn performance_score_json(samples_json: &str) -> PyResult<String> {
    json_api::performance_score_json(samples_json).map_err(to_py)
}

#[pymodule]
fn rehabtech_core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(analyze_samples_json, m)?)?;
    m.add_function(wrap_pyfunction!(compare_history_json, m)?)?;
    m.add_function(wrap_pyfunction!(performance_score_json, m)?)?;
    Ok(())
}
