use std::io::Cursor;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyBool, PyBytes, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple};
use recombinant_io_xlsx::{
    Canonicalizer, DataTypeRegistry, EnumCanonicalValue, EnumCellValue, RecombinantError,
    RecombinantResult, SheetReader, SpecFieldSpec, SpecOrganization, SpecRecombinantConfig,
    SpecSheet, SpecTableSchema, TemplateWriter, TypeRecord, TypeRow, TypeSheetRows,
    build_records, records_to_ipc_bytes,
};

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "recombinant.xlsx.v1";
const C_BRIDGE_TRANSPORT: &str = "arrow_ipc";

type TypeSheetResults = Box<dyn Iterator<Item = RecombinantResult<SpecSheet<TypeSheetRows>>>>;

////////////////////////////////////////////////////////////////////////////////
// #region Reading

#[pyclass(name = "SheetIterator", unsendable)]
struct PySheetIterator {
    inner: TypeSheetResults,
}

#[pymethods]
impl PySheetIterator {
    fn __iter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    /// `(sheet_name, organization_label, column_identifiers, rows)`.
    fn __next__(&mut self, py: Python<'_>) -> PyResult<Option<Py<PyAny>>> {
        let Some(res_sheet) = self.inner.next() else {
            return Ok(None);
        };
        let sheet = res_sheet.map_err(derive_py_err)?;

        let rows = Py::new(py, PyRowIterator { inner: sheet.rows })?;
        let tup_sheet = PyTuple::new(
            py,
            [
                sheet.sheet_name.into_pyobject(py)?.into_any(),
                sheet.organization_label.into_pyobject(py)?.into_any(),
                PyList::new(py, sheet.column_identifiers)?.into_any(),
                rows.into_bound(py).into_any(),
            ],
        )?;
        Ok(Some(tup_sheet.into_any().unbind()))
    }
}

/// Single-pass filtered data rows of one sheet.
#[pyclass(name = "RowIterator", unsendable)]
struct PyRowIterator {
    inner: TypeSheetRows,
}

#[pymethods]
impl PyRowIterator {
    fn __iter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    fn __next__(&mut self, py: Python<'_>) -> PyResult<Option<Py<PyAny>>> {
        let Some(row) = self.inner.next() else {
            return Ok(None);
        };
        let l_cells = row
            .iter()
            .map(|value| convert_cell_to_py(py, value))
            .collect::<PyResult<Vec<_>>>()?;
        Ok(Some(PyList::new(py, l_cells)?.into_any().unbind()))
    }
}

/// Iterate the importable sheets of the workbook at `path`.
#[pyfunction]
fn read_excel(path: PathBuf) -> PyResult<PySheetIterator> {
    let reader = SheetReader::open(&path).map_err(derive_py_err)?;
    Ok(PySheetIterator {
        inner: Box::new(reader),
    })
}

/// Iterate the importable sheets of an in-memory workbook upload.
#[pyfunction]
fn read_excel_bytes(data: Vec<u8>) -> PyResult<PySheetIterator> {
    let reader = SheetReader::from_reader(Cursor::new(data)).map_err(derive_py_err)?;
    Ok(PySheetIterator {
        inner: Box::new(reader),
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Records

#[pyfunction]
#[pyo3(signature = (value, datastore_type, datastore_types_json = None))]
fn canonicalize(
    py: Python<'_>,
    value: &Bound<'_, PyAny>,
    datastore_type: &str,
    datastore_types_json: Option<&str>,
) -> PyResult<Py<PyAny>> {
    let registry = derive_registry(datastore_types_json)?;
    let canonicalizer = Canonicalizer::new(&registry).map_err(derive_py_err)?;
    let value_canon = canonicalizer
        .canonicalize(&convert_py_to_cell(value)?, datastore_type)
        .map_err(derive_py_err)?;
    convert_canonical_to_py(py, &value_canon)
}

/// Build one dict per row; the first bad cell raises `ValueError("Row N: ...")`.
#[pyfunction]
#[pyo3(signature = (rows, fields, datastore_types_json = None))]
fn get_records(
    py: Python<'_>,
    rows: &Bound<'_, PyAny>,
    fields: &Bound<'_, PyAny>,
    datastore_types_json: Option<&str>,
) -> PyResult<Py<PyAny>> {
    let registry = derive_registry(datastore_types_json)?;
    let l_fields = parse_field_specs(fields)?;

    let mut l_rows: Vec<TypeRow> = Vec::new();
    for obj_row in rows.try_iter()? {
        let obj_row = obj_row?;
        let mut row = TypeRow::new();
        for obj_cell in obj_row.try_iter()? {
            row.push(convert_py_to_cell(&obj_cell?)?);
        }
        l_rows.push(row);
    }

    let l_records = build_records(l_rows, &l_fields, &registry).map_err(derive_py_err)?;

    let mut l_dicts = Vec::with_capacity(l_records.len());
    for record in &l_records {
        let dict_record = PyDict::new(py);
        for (key, value) in record {
            dict_record.set_item(key, convert_canonical_to_py(py, value)?)?;
        }
        l_dicts.push(dict_record);
    }
    Ok(PyList::new(py, l_dicts)?.into_any().unbind())
}

/// Arrow IPC bytes of `records`, one nullable string column per field.
#[pyfunction]
fn records_to_ipc(
    py: Python<'_>,
    records: &Bound<'_, PyAny>,
    fields: &Bound<'_, PyAny>,
) -> PyResult<Py<PyAny>> {
    let l_fields = parse_field_specs(fields)?;

    let mut l_records: Vec<TypeRecord> = Vec::new();
    for obj_record in records.try_iter()? {
        let obj_record = obj_record?;
        let mut record = TypeRecord::with_capacity(l_fields.len());
        for field in &l_fields {
            let value = match obj_record.get_item(&field.datastore_id) {
                Ok(obj_value) => convert_py_to_canonical(&obj_value)?,
                Err(_) => EnumCanonicalValue::Null,
            };
            record.insert(field.datastore_id.clone(), value);
        }
        l_records.push(record);
    }

    let v_ipc = records_to_ipc_bytes(&l_records, &l_fields).map_err(derive_py_err)?;
    Ok(PyBytes::new(py, &v_ipc).into_any().unbind())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Template

/// Write the blank template for one table schema and organization.
///
/// `table_json` is either one table object or a whole configuration document,
/// in which case `dataset_type` picks the table.
#[pyfunction]
#[pyo3(signature = (
    file_out,
    table_json,
    org_json,
    dataset_type = None,
    datastore_types_json = None
))]
fn xls_template(
    file_out: PathBuf,
    table_json: &str,
    org_json: &str,
    dataset_type: Option<&str>,
    datastore_types_json: Option<&str>,
) -> PyResult<()> {
    let registry = derive_registry(datastore_types_json)?;
    let table = parse_table_schema(table_json, dataset_type)?;
    let org = SpecOrganization::from_json_str(org_json).map_err(derive_py_err)?;

    TemplateWriter::new(&registry)
        .save_template(&table, &org, &file_out)
        .map_err(derive_py_err)
}

fn parse_table_schema(table_json: &str, dataset_type: Option<&str>) -> PyResult<SpecTableSchema> {
    let Some(dataset_type) = dataset_type else {
        return SpecTableSchema::from_json_str(table_json).map_err(derive_py_err);
    };
    let config = SpecRecombinantConfig::from_json_str(table_json).map_err(derive_py_err)?;
    config
        .get_table(dataset_type)
        .cloned()
        .map_err(derive_py_err)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Conversion

fn convert_cell_to_py(py: Python<'_>, value: &EnumCellValue) -> PyResult<Py<PyAny>> {
    match value {
        EnumCellValue::Empty => Ok(py.None()),
        EnumCellValue::Number(val) => Ok(val.into_pyobject(py)?.into_any().unbind()),
        EnumCellValue::Bool(val) => Ok(PyBool::new(py, *val).to_owned().into_any().unbind()),
        EnumCellValue::Text(val) => Ok(val.into_pyobject(py)?.into_any().unbind()),
        EnumCellValue::DateTime(val) => {
            let cls_datetime = py.import("datetime")?.getattr("datetime")?;
            let inst_datetime = cls_datetime.call1((
                val.year(),
                val.month(),
                val.day(),
                val.hour(),
                val.minute(),
                val.second(),
                val.nanosecond() / 1_000,
            ))?;
            Ok(inst_datetime.unbind())
        }
    }
}

fn convert_py_to_cell(obj: &Bound<'_, PyAny>) -> PyResult<EnumCellValue> {
    if obj.is_none() {
        return Ok(EnumCellValue::Empty);
    }
    if let Ok(val) = obj.downcast::<PyString>() {
        return Ok(EnumCellValue::Text(val.to_str()?.to_string()));
    }
    if let Ok(val) = obj.downcast::<PyBool>() {
        return Ok(EnumCellValue::Bool(val.is_true()));
    }
    if obj.is_instance_of::<PyInt>() || obj.is_instance_of::<PyFloat>() {
        return Ok(EnumCellValue::Number(obj.extract::<f64>()?));
    }
    if obj.hasattr("year")? && obj.hasattr("month")? && obj.hasattr("day")? {
        if !obj.hasattr("hour")? {
            return derive_date_cell(obj);
        }
        return Ok(EnumCellValue::DateTime(derive_naive_datetime(obj)?));
    }
    Ok(EnumCellValue::Text(obj.str()?.to_str()?.to_string()))
}

/// Plain `date` objects carry no time of day and stay ISO date text.
fn derive_date_cell(obj: &Bound<'_, PyAny>) -> PyResult<EnumCellValue> {
    let n_year = obj.getattr("year")?.extract::<i32>()?;
    let n_month = obj.getattr("month")?.extract::<u32>()?;
    let n_day = obj.getattr("day")?.extract::<u32>()?;

    EnumCellValue::from_date_text(n_year, n_month, n_day).ok_or_else(|| {
        PyValueError::new_err(format!(
            "Invalid date value: {n_year:04}-{n_month:02}-{n_day:02}"
        ))
    })
}

/// `datetime`-like objects; missing time parts default to zero.
fn derive_naive_datetime(obj: &Bound<'_, PyAny>) -> PyResult<NaiveDateTime> {
    let n_year = obj.getattr("year")?.extract::<i32>()?;
    let n_month = obj.getattr("month")?.extract::<u32>()?;
    let n_day = obj.getattr("day")?.extract::<u32>()?;
    let n_hour = extract_optional_attr::<u32>(obj, "hour")?.unwrap_or(0);
    let n_minute = extract_optional_attr::<u32>(obj, "minute")?.unwrap_or(0);
    let n_second = extract_optional_attr::<u32>(obj, "second")?.unwrap_or(0);
    let n_micro = extract_optional_attr::<u32>(obj, "microsecond")?.unwrap_or(0);

    NaiveDate::from_ymd_opt(n_year, n_month, n_day)
        .and_then(|date| date.and_hms_micro_opt(n_hour, n_minute, n_second, n_micro))
        .ok_or_else(|| {
            PyValueError::new_err(format!(
                "Invalid date value: {n_year:04}-{n_month:02}-{n_day:02}"
            ))
        })
}

fn convert_canonical_to_py(py: Python<'_>, value: &EnumCanonicalValue) -> PyResult<Py<PyAny>> {
    match value {
        EnumCanonicalValue::Text(val) => Ok(val.into_pyobject(py)?.into_any().unbind()),
        EnumCanonicalValue::Integer(val) => Ok(val.into_pyobject(py)?.into_any().unbind()),
        EnumCanonicalValue::Null => Ok(py.None()),
    }
}

fn convert_py_to_canonical(obj: &Bound<'_, PyAny>) -> PyResult<EnumCanonicalValue> {
    if obj.is_none() {
        return Ok(EnumCanonicalValue::Null);
    }
    if obj.is_instance_of::<PyInt>() && !obj.is_instance_of::<PyBool>() {
        return Ok(EnumCanonicalValue::Integer(obj.extract::<i64>()?));
    }
    Ok(EnumCanonicalValue::Text(obj.str()?.to_str()?.to_string()))
}

fn parse_field_specs(fields: &Bound<'_, PyAny>) -> PyResult<Vec<SpecFieldSpec>> {
    let mut l_fields = Vec::new();
    for obj_field in fields.try_iter()? {
        let obj_field = obj_field?;
        let mut field = SpecFieldSpec::new(
            extract_required_item::<String>(&obj_field, "datastore_id")?,
            extract_required_item::<String>(&obj_field, "datastore_type")?,
        );
        if let Some(val) = extract_optional_item::<String>(&obj_field, "label")? {
            field.label = val;
        }
        field.xls_column_width = extract_optional_item::<f64>(&obj_field, "xls_column_width")?;
        l_fields.push(field);
    }
    Ok(l_fields)
}

fn derive_registry(datastore_types_json: Option<&str>) -> PyResult<DataTypeRegistry> {
    match datastore_types_json {
        Some(txt) => DataTypeRegistry::from_json_str(txt).map_err(derive_py_err),
        None => Ok(DataTypeRegistry::default()),
    }
}

fn derive_py_err(err: RecombinantError) -> PyErr {
    if err.is_bad_data() {
        PyValueError::new_err(err.to_string())
    } else {
        PyRuntimeError::new_err(err.to_string())
    }
}

fn extract_optional_attr<T>(obj: &Bound<'_, PyAny>, attr: &str) -> PyResult<Option<T>>
where
    for<'a> T: FromPyObject<'a>,
{
    if !obj.hasattr(attr)? {
        return Ok(None);
    }
    let val = obj.getattr(attr)?;
    if val.is_none() {
        return Ok(None);
    }
    Ok(Some(val.extract::<T>()?))
}

fn extract_optional_item<T>(obj: &Bound<'_, PyAny>, key: &str) -> PyResult<Option<T>>
where
    for<'a> T: FromPyObject<'a>,
{
    let Ok(val) = obj.get_item(key) else {
        return Ok(None);
    };
    if val.is_none() {
        return Ok(None);
    }
    Ok(Some(val.extract::<T>()?))
}

fn extract_required_item<T>(obj: &Bound<'_, PyAny>, key: &str) -> PyResult<T>
where
    for<'a> T: FromPyObject<'a>,
{
    extract_optional_item::<T>(obj, key)?
        .ok_or_else(|| PyValueError::new_err(format!("Field is missing `{key}`.")))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[pymodule]
fn _recombinant_io_xlsx_rs(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PySheetIterator>()?;
    module.add_class::<PyRowIterator>()?;
    module.add_function(wrap_pyfunction!(read_excel, module)?)?;
    module.add_function(wrap_pyfunction!(read_excel_bytes, module)?)?;
    module.add_function(wrap_pyfunction!(canonicalize, module)?)?;
    module.add_function(wrap_pyfunction!(get_records, module)?)?;
    module.add_function(wrap_pyfunction!(records_to_ipc, module)?)?;
    module.add_function(wrap_pyfunction!(xls_template, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
