//! Shared recombinant specification models and top-level error types.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::conf::C_MSG_FORMULA_NOT_SUPPORTED;

////////////////////////////////////////////////////////////////////////////////
// #region CellValues

/// Raw value decoded from one spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Absent/blank cell.
    Empty,
    /// Numeric cell (integers are carried as whole reals).
    Number(f64),
    /// Boolean cell; integer-valued on the numeric path.
    Bool(bool),
    /// Text cell, including formula text (`=...`) and cell error text.
    Text(String),
    /// Date-formatted cell.
    DateTime(NaiveDateTime),
}

impl EnumCellValue {
    /// Midnight date-time cell for a calendar date, `None` when the date is invalid.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(Self::DateTime)
    }

    /// Text cell holding the ISO `YYYY-MM-DD` form of a calendar date without
    /// a time of day, `None` when the date is invalid.
    pub fn from_date_text(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(|date| Self::Text(date.format("%Y-%m-%d").to_string()))
    }

    /// Shorthand for a text cell.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

/// Canonical value stored for one record field.
///
/// Successful conversions are text; declared type defaults may be `Null` and
/// the numeric-from-text path may produce the bare `Integer(0)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumCanonicalValue {
    /// Canonical text.
    Text(String),
    /// Bare integer value.
    Integer(i64),
    /// Null default.
    Null,
}

impl EnumCanonicalValue {
    /// Shorthand for a canonical text value.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Render as nullable text for columnar export.
    pub fn to_text_opt(&self) -> Option<String> {
        match self {
            Self::Text(val) => Some(val.clone()),
            Self::Integer(val) => Some(val.to_string()),
            Self::Null => None,
        }
    }
}

/// One spreadsheet row, indexed positionally.
pub type TypeRow = Vec<EnumCellValue>;

/// One canonical record: `datastore_id -> value`, in field order.
pub type TypeRecord = IndexMap<String, EnumCanonicalValue>;

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SchemaModels

/// One declared column of the canonical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecFieldSpec {
    /// Unique, order-significant datastore column id.
    pub datastore_id: String,
    /// Datastore type tag looked up in the registry.
    pub datastore_type: String,
    /// Human label written into the template header row.
    #[serde(default)]
    pub label: String,
    /// Template column width.
    #[serde(default)]
    pub xls_column_width: Option<f64>,
}

impl SpecFieldSpec {
    /// Build a field with an empty label and default width.
    pub fn new(datastore_id: impl Into<String>, datastore_type: impl Into<String>) -> Self {
        Self {
            datastore_id: datastore_id.into(),
            datastore_type: datastore_type.into(),
            label: String::new(),
            xls_column_width: None,
        }
    }
}

/// Semantic properties of one datastore type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDataTypeEntry {
    /// Type tag, e.g. `money`.
    pub tag: String,
    /// Whether cells convert through the numeric path.
    pub numeric: bool,
    /// Value used for empty cells.
    pub default: EnumCanonicalValue,
    /// Excel number format applied to template columns.
    pub xl_format: String,
}

/// Pattern fill applied to a whole template row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecFillStyle {
    /// Pattern kind, e.g. `solid`.
    #[serde(default, rename = "patternType")]
    pub pattern_type: Option<String>,
    /// Pattern foreground color (hex RGB or ARGB).
    #[serde(default, rename = "fgColor")]
    pub fg_color: Option<String>,
    /// Pattern background color (hex RGB or ARGB).
    #[serde(default, rename = "bgColor")]
    pub bg_color: Option<String>,
}

/// Font applied to a whole template row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecFontStyle {
    /// Font family.
    #[serde(default)]
    pub name: Option<String>,
    /// Font size in points.
    #[serde(default)]
    pub size: Option<f64>,
    /// Bold style.
    #[serde(default)]
    pub bold: Option<bool>,
    /// Italic style.
    #[serde(default)]
    pub italic: Option<bool>,
    /// Underline kind, e.g. `single`.
    #[serde(default)]
    pub underline: Option<String>,
    /// Font color (hex RGB or ARGB).
    #[serde(default)]
    pub color: Option<String>,
}

/// Style descriptor for one template row; absent kinds are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecRowStyle {
    #[serde(default, rename = "PatternFill")]
    pub fill: Option<SpecFillStyle>,
    #[serde(default, rename = "Font")]
    pub font: Option<SpecFontStyle>,
}

/// Schema descriptor of one recombinant table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecTableSchema {
    /// Dataset type this table belongs to.
    pub dataset_type: String,
    /// Human title.
    #[serde(default)]
    pub title: String,
    /// Template sheet title.
    pub xls_sheet_name: String,
    /// Organization keys written into template row 1, in order.
    #[serde(default)]
    pub xls_organization_info: Vec<String>,
    /// Style of template row 1.
    #[serde(default)]
    pub xls_organization_style: SpecRowStyle,
    /// Style of template row 2.
    #[serde(default)]
    pub xls_header_style: SpecRowStyle,
    /// Declared fields, in record order.
    pub fields: Vec<SpecFieldSpec>,
}

impl SpecTableSchema {
    /// Parse one table object.
    pub fn from_json_str(txt: &str) -> RecombinantResult<Self> {
        Ok(serde_json::from_str(txt)?)
    }
}

/// Schema collaborator document holding every table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecRecombinantConfig {
    #[serde(default)]
    pub tables: Vec<SpecTableSchema>,
}

impl SpecRecombinantConfig {
    /// Parse a JSON configuration document.
    pub fn from_json_str(txt: &str) -> RecombinantResult<Self> {
        Ok(serde_json::from_str(txt)?)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_path(path: &Path) -> RecombinantResult<Self> {
        let txt = std::fs::read_to_string(path).map_err(|source| RecombinantError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&txt)
    }

    /// Look up the table declared for `dataset_type`.
    pub fn get_table(&self, dataset_type: &str) -> RecombinantResult<&SpecTableSchema> {
        self.tables
            .iter()
            .find(|t| t.dataset_type == dataset_type)
            .ok_or_else(|| RecombinantError::UnknownDatasetType(dataset_type.to_string()))
    }
}

/// One `{key, value}` organization extra.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecOrganizationExtra {
    pub key: String,
    pub value: String,
}

/// Organization record used to fill template row 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecOrganization {
    /// Extras, consulted first.
    #[serde(default)]
    pub extras: Vec<SpecOrganizationExtra>,
    /// Fallback attributes, consulted when no extra matches.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl SpecOrganization {
    /// Parse an organization JSON object.
    pub fn from_json_str(txt: &str) -> RecombinantResult<Self> {
        Ok(serde_json::from_str(txt)?)
    }

    /// Value for `key`: first matching extra, else fallback attribute, else empty text.
    pub fn derive_value(&self, key: &str) -> String {
        if let Some(extra) = self.extras.iter().find(|e| e.key == key) {
            return extra.value.clone();
        }
        match self.attributes.get(key) {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(val)) => val.clone(),
            Some(val) => val.to_string(),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Convenience result alias.
pub type RecombinantResult<T> = Result<T, RecombinantError>;

/// Top-level error for reading, canonicalizing and templating.
#[derive(Debug, thiserror::Error)]
pub enum RecombinantError {
    /// A non-numeric cell holds formula text.
    #[error("{}", C_MSG_FORMULA_NOT_SUPPORTED)]
    FormulaNotSupported,
    /// A numeric cell is NaN or infinite and cannot be truncated.
    #[error("Invalid numeric value: {0}")]
    InvalidNumber(f64),
    /// Cell failure annotated with its 1-based source row number.
    #[error("Row {row}: {source}")]
    BadRow {
        row: usize,
        #[source]
        source: Box<RecombinantError>,
    },
    /// A field references a type tag absent from the registry.
    #[error("Unknown datastore type: {0}")]
    UnknownTypeTag(String),
    /// No table is declared for the dataset type.
    #[error("Unknown dataset type: {0}")]
    UnknownDatasetType(String),
    /// A sheet ends before its three header rows.
    #[error("Sheet {sheet_name:?} is missing its header rows")]
    MissingHeaderRows { sheet_name: String },
    /// Workbook decode failure.
    #[error("xlsx read error: {0}")]
    Workbook(#[from] calamine::XlsxError),
    /// Template write failure.
    #[error("xlsx write error: {0}")]
    Template(#[from] rust_xlsxwriter::XlsxError),
    /// Configuration parse failure.
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Canonicalizer pattern compilation failure.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    /// DataFrame export failure.
    #[error("DataFrame export error: {0}")]
    Frame(#[from] polars::prelude::PolarsError),
    /// Filesystem failure.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecombinantError {
    /// Wrap a cell failure with its source row number.
    pub fn at_row(self, row: usize) -> Self {
        Self::BadRow {
            row,
            source: Box::new(self),
        }
    }

    /// Whether the failure is caused by uploaded cell data rather than setup.
    pub fn is_bad_data(&self) -> bool {
        matches!(
            self,
            Self::FormulaNotSupported | Self::InvalidNumber(_) | Self::BadRow { .. }
        )
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    const C_CONFIG_JSON: &str = r#"{
        "tables": [{
            "dataset_type": "contracts",
            "title": "Proactive Disclosure - Contracts",
            "xls_sheet_name": "Contracts",
            "xls_organization_info": ["title", "department_number"],
            "xls_organization_style": {
                "PatternFill": {"patternType": "solid", "fgColor": "FF2A6BB5"},
                "Font": {"bold": true, "size": 14, "color": "FFFFFFFF"}
            },
            "xls_header_style": {"Font": {"bold": true}},
            "fields": [
                {"datastore_id": "ref", "datastore_type": "text", "label": "Reference", "xls_column_width": 20},
                {"datastore_id": "value", "datastore_type": "money", "label": "Value"}
            ]
        }]
    }"#;

    #[test]
    fn config_parses_recombinant_keys() {
        let cfg = SpecRecombinantConfig::from_json_str(C_CONFIG_JSON).expect("parse config");
        let table = cfg.get_table("contracts").expect("table");

        assert_eq!(table.xls_sheet_name, "Contracts");
        assert_eq!(table.xls_organization_info, vec!["title", "department_number"]);
        assert_eq!(table.fields.len(), 2);
        assert_eq!(table.fields[0].xls_column_width, Some(20.0));
        assert_eq!(table.fields[1].xls_column_width, None);

        let fill = table
            .xls_organization_style
            .fill
            .as_ref()
            .expect("organization fill");
        assert_eq!(fill.pattern_type.as_deref(), Some("solid"));
        assert_eq!(fill.fg_color.as_deref(), Some("FF2A6BB5"));
        assert!(table.xls_header_style.fill.is_none());
        assert_eq!(
            table.xls_header_style.font.as_ref().and_then(|f| f.bold),
            Some(true)
        );
    }

    #[test]
    fn config_reads_from_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("recombinant.json");
        std::fs::write(&path, C_CONFIG_JSON).expect("write config");

        let cfg = SpecRecombinantConfig::from_path(&path).expect("read config");
        assert_eq!(cfg.tables.len(), 1);
        assert_eq!(cfg.get_table("contracts").expect("table").xls_sheet_name, "Contracts");
    }

    #[test]
    fn config_missing_path_reports_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.json");

        let err = SpecRecombinantConfig::from_path(&path).expect_err("must fail");
        assert!(matches!(err, RecombinantError::Io { path: ref p, .. } if p == &path));
        assert!(err.to_string().contains("absent.json"));
        assert!(!err.is_bad_data());
    }

    #[test]
    fn config_unknown_dataset_type_is_rejected() {
        let cfg = SpecRecombinantConfig::from_json_str(C_CONFIG_JSON).expect("parse config");
        let err = cfg.get_table("grants").expect_err("must fail");
        assert!(matches!(err, RecombinantError::UnknownDatasetType(ref name) if name == "grants"));
        assert!(!err.is_bad_data());
    }

    #[test]
    fn organization_prefers_extras_then_attributes() {
        let org = SpecOrganization::from_json_str(
            r#"{
                "title": "Department of Widgets",
                "name": "dow",
                "department_number": 42,
                "extras": [{"key": "title", "value": "Widgets Canada"}]
            }"#,
        )
        .expect("parse organization");

        assert_eq!(org.derive_value("title"), "Widgets Canada");
        assert_eq!(org.derive_value("name"), "dow");
        assert_eq!(org.derive_value("department_number"), "42");
        assert_eq!(org.derive_value("missing"), "");
    }

    #[test]
    fn canonical_default_deserializes_from_json_scalars() {
        let l_values: Vec<EnumCanonicalValue> =
            serde_json::from_str(r#"[null, "", "x", 0]"#).expect("parse values");
        assert_eq!(
            l_values,
            vec![
                EnumCanonicalValue::Null,
                EnumCanonicalValue::text(""),
                EnumCanonicalValue::text("x"),
                EnumCanonicalValue::Integer(0),
            ]
        );
    }

    #[test]
    fn row_annotation_prefixes_message() {
        let err = RecombinantError::FormulaNotSupported.at_row(6);
        assert_eq!(err.to_string(), "Row 6: Formulas are not supported");
        assert!(err.is_bad_data());
    }

    #[test]
    fn from_ymd_rejects_invalid_dates() {
        assert!(EnumCellValue::from_ymd(2020, 2, 30).is_none());
        assert!(EnumCellValue::from_ymd(2020, 2, 29).is_some());
    }

    #[test]
    fn from_date_text_keeps_the_calendar_date_only() {
        assert_eq!(
            EnumCellValue::from_date_text(2020, 3, 5),
            Some(EnumCellValue::text("2020-03-05"))
        );
        assert!(EnumCellValue::from_date_text(2021, 2, 29).is_none());
    }
}
