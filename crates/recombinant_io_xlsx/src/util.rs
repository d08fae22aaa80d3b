//! Pure helper functions shared by reader, canonicalizer and writer.

use chrono::{Datelike, NaiveDateTime, Timelike};
use rust_xlsxwriter::{ColNum, RowNum, XlsxError};

use crate::conf::{N_LEN_EXCEL_SHEET_NAME_MAX, TUP_EXCEL_ILLEGAL};
use crate::spec::{EnumCellValue, RecombinantError, RecombinantResult};

////////////////////////////////////////////////////////////////////////////////
// #region FillerDetection

/// Whether a cell is filler: absent, or text that trims to empty.
pub fn is_filler(value: &EnumCellValue) -> bool {
    match value {
        EnumCellValue::Empty => true,
        EnumCellValue::Text(val) => val.trim().is_empty(),
        EnumCellValue::Number(_) | EnumCellValue::Bool(_) | EnumCellValue::DateTime(_) => false,
    }
}

/// Whether a trailing cell may be trimmed from an over-long row.
///
/// Stricter than [`is_filler`]: whitespace-only text is kept.
pub fn is_trailing_filler(value: &EnumCellValue) -> bool {
    match value {
        EnumCellValue::Empty => true,
        EnumCellValue::Text(val) => val.is_empty(),
        EnumCellValue::Number(_) | EnumCellValue::Bool(_) | EnumCellValue::DateTime(_) => false,
    }
}

/// Whether every cell of a row is filler (vacuously true for an empty row).
pub fn is_filler_row(row: &[EnumCellValue]) -> bool {
    row.iter().all(is_filler)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TextForms

/// Render a number verbatim: whole values without a fractional part,
/// others with 12 significant digits (`%.12g`).
pub fn render_number(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e16 {
        return (value as i64).to_string();
    }
    render_general(value)
}

/// `%.12g` for a finite, non-zero value; fixed form keeps a `.0` when
/// rounding leaves no fraction.
fn render_general(value: f64) -> String {
    const N_SIG_DIGITS: i32 = 12;

    // Exponent after rounding to the significant digits.
    let c_sci = format!("{:.*e}", (N_SIG_DIGITS - 1) as usize, value);
    let Some((c_mantissa, c_exp)) = c_sci.split_once('e') else {
        return c_sci;
    };
    let n_exp: i32 = c_exp.parse().unwrap_or(0);

    if n_exp < -4 || n_exp >= N_SIG_DIGITS {
        let c_mantissa = trim_fraction_zeros(c_mantissa);
        let c_sign = if n_exp < 0 { '-' } else { '+' };
        return format!("{c_mantissa}e{c_sign}{:02}", n_exp.unsigned_abs());
    }

    let n_precision = (N_SIG_DIGITS - 1 - n_exp) as usize;
    let c_fixed = format!("{value:.n_precision$}");
    let c_fixed = trim_fraction_zeros(&c_fixed);
    if c_fixed.contains('.') {
        c_fixed.to_string()
    } else {
        format!("{c_fixed}.0")
    }
}

fn trim_fraction_zeros(text: &str) -> &str {
    if !text.contains('.') {
        return text;
    }
    text.trim_end_matches('0').trim_end_matches('.')
}

/// Boolean text form: `True` / `False`.
pub fn render_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// Floor toward negative infinity and render the integer part.
pub fn render_floor(value: f64) -> RecombinantResult<String> {
    if !value.is_finite() {
        return Err(RecombinantError::InvalidNumber(value));
    }
    let n_floor = value.floor();
    if n_floor == 0.0 {
        return Ok("0".to_string());
    }
    Ok(format!("{n_floor:.0}"))
}

/// Render `YYYY-MM-DD HH:MM:SS`, with microseconds only when present.
pub fn render_datetime(value: &NaiveDateTime) -> String {
    if value.nanosecond() / 1_000 == 0 {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Render the calendar date as zero-padded `YYYY-MM-DD`.
pub fn render_date(value: &NaiveDateTime) -> String {
    format!("{:04}-{:02}-{:02}", value.year(), value.month(), value.day())
}

/// Text form of a raw cell; absent cells render empty.
pub fn derive_cell_text(value: &EnumCellValue) -> String {
    match value {
        EnumCellValue::Empty => String::new(),
        EnumCellValue::Number(val) => render_number(*val),
        EnumCellValue::Bool(val) => render_bool(*val).to_string(),
        EnumCellValue::Text(val) => val.clone(),
        EnumCellValue::DateTime(val) => render_datetime(val),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WorkbookHelpers

/// Replace characters Excel forbids in sheet names and clamp the length.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Parse a hex `RRGGBB` or `AARRGGBB` color (optional `#`), dropping alpha.
pub fn derive_color_rgb(color: &str) -> Option<u32> {
    let c_hex = color.trim().trim_start_matches('#');
    if !c_hex.is_ascii() {
        return None;
    }
    let c_rgb = match c_hex.len() {
        6 => c_hex,
        8 => &c_hex[2..],
        _ => return None,
    };
    u32::from_str_radix(c_rgb, 16).ok()
}

pub fn cast_row_num(value: usize) -> RecombinantResult<RowNum> {
    RowNum::try_from(value).map_err(|_| XlsxError::RowColumnLimitError.into())
}

pub fn cast_col_num(value: usize) -> RecombinantResult<ColNum> {
    ColNum::try_from(value).map_err(|_| XlsxError::RowColumnLimitError.into())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
