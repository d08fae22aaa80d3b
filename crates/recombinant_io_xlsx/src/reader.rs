//! Workbook reader: per-sheet header metadata plus lazy, filler-filtered rows.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::conf::C_SHEET_NAME_SENTINEL;
use crate::spec::{EnumCellValue, RecombinantError, RecombinantResult, TypeRow};
use crate::util::{derive_cell_text, is_filler_row};

////////////////////////////////////////////////////////////////////////////////
// #region SheetModel

/// One importable sheet: header metadata plus its single-pass row source.
#[derive(Debug)]
pub struct SpecSheet<I> {
    /// Worksheet name.
    pub sheet_name: String,
    /// Text of row 1, column A.
    pub organization_label: String,
    /// Text of every row-3 cell, in column order.
    pub column_identifiers: Vec<String>,
    /// Data rows (row 4 onward); consuming it twice yields nothing the second time.
    pub rows: I,
}

/// Row source of one sheet as produced by [`SheetReader`].
pub type TypeSheetRows = FilterFillerRows<SheetRows>;

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RowSource

/// Positional rows of one worksheet.
///
/// The worksheet's cell and formula ranges are loaded whole when the sheet is
/// surfaced; each row is materialized into a [`TypeRow`] only when pulled.
/// Every row spans columns `A..=last used column`, so rows of one sheet share
/// a width. Formula cells surface as `=<formula>` text.
#[derive(Debug)]
pub struct SheetRows {
    range: Range<Data>,
    formulas: Option<Range<String>>,
    n_row_next: u32,
    n_row_end_exclusive: u32,
    n_width: u32,
}

impl SheetRows {
    pub fn new(range: Range<Data>, formulas: Option<Range<String>>) -> Self {
        let (n_row_end_values, n_col_end_values) = _derive_extent(range.end());
        let (n_row_end_formulas, n_col_end_formulas) =
            _derive_extent(formulas.as_ref().and_then(Range::end));
        Self {
            range,
            formulas,
            n_row_next: 0,
            n_row_end_exclusive: u32::max(n_row_end_values, n_row_end_formulas),
            n_width: u32::max(n_col_end_values, n_col_end_formulas),
        }
    }

    fn derive_row(&self, n_row: u32) -> TypeRow {
        (0..self.n_width)
            .map(|n_col| {
                let pos = (n_row, n_col);
                if let Some(formula) = self.formulas.as_ref().and_then(|f| f.get_value(pos))
                    && !formula.is_empty()
                {
                    return EnumCellValue::Text(format!("={formula}"));
                }
                self.range
                    .get_value(pos)
                    .map_or(EnumCellValue::Empty, derive_cell_value)
            })
            .collect()
    }
}

impl Iterator for SheetRows {
    type Item = TypeRow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.n_row_next >= self.n_row_end_exclusive {
            return None;
        }
        let row = self.derive_row(self.n_row_next);
        self.n_row_next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n_left = self.n_row_end_exclusive.saturating_sub(self.n_row_next) as usize;
        (n_left, Some(n_left))
    }
}

impl ExactSizeIterator for SheetRows {}

/// Exclusive (row, col) extent of a range end position; `(0, 0)` when empty.
fn _derive_extent(end: Option<(u32, u32)>) -> (u32, u32) {
    end.map_or((0, 0), |(n_row, n_col)| (n_row + 1, n_col + 1))
}

/// Lazily drop rows whose every cell is filler.
#[derive(Debug)]
pub struct FilterFillerRows<I> {
    inner: I,
}

impl<I> FilterFillerRows<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I: Iterator<Item = TypeRow>> Iterator for FilterFillerRows<I> {
    type Item = TypeRow;

    fn next(&mut self) -> Option<Self::Item> {
        for row in self.inner.by_ref() {
            if !is_filler_row(&row) {
                return Some(row);
            }
            debug!(width = row.len(), "skipping filler row");
        }
        None
    }
}

/// Wrap any row sequence with filler-row suppression.
pub fn filter_filler_rows<I>(rows: I) -> FilterFillerRows<I::IntoIter>
where
    I: IntoIterator<Item = TypeRow>,
{
    FilterFillerRows::new(rows.into_iter())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellDecoding

/// Map one decoded cell onto the closed cell-value union.
pub fn derive_cell_value(value: &Data) -> EnumCellValue {
    match value {
        Data::Empty => EnumCellValue::Empty,
        Data::Int(val) => EnumCellValue::Number(*val as f64),
        Data::Float(val) => EnumCellValue::Number(*val),
        Data::Bool(val) => EnumCellValue::Bool(*val),
        Data::String(val) => EnumCellValue::Text(val.clone()),
        Data::Error(val) => EnumCellValue::Text(val.to_string()),
        Data::DateTime(val) => {
            if val.is_datetime()
                && let Some(dt) = val.as_datetime()
            {
                EnumCellValue::DateTime(dt)
            } else {
                EnumCellValue::Number(val.as_f64())
            }
        }
        Data::DateTimeIso(val) => match _parse_iso_datetime(val) {
            Some(dt) => EnumCellValue::DateTime(dt),
            None => EnumCellValue::Text(val.clone()),
        },
        Data::DurationIso(val) => EnumCellValue::Text(val.clone()),
    }
}

fn _parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetReader

/// Sheet-by-sheet workbook reader.
///
/// Yields one [`SpecSheet`] per worksheet in workbook order and stops for good
/// at the sheet named `reference`. The first error also ends iteration.
pub struct SheetReader<RS: Read + Seek> {
    workbook: Xlsx<RS>,
    l_sheet_names: std::vec::IntoIter<String>,
    if_finished: bool,
}

impl SheetReader<BufReader<File>> {
    /// Open a workbook file.
    pub fn open(path: &Path) -> RecombinantResult<Self> {
        let workbook: Xlsx<_> = open_workbook(path)?;
        Ok(Self::from_workbook(workbook))
    }
}

impl<RS: Read + Seek> SheetReader<RS> {
    /// Read a workbook from any seekable source, e.g. an in-memory upload.
    pub fn from_reader(reader: RS) -> RecombinantResult<Self> {
        let workbook = Xlsx::new(reader)?;
        Ok(Self::from_workbook(workbook))
    }

    fn from_workbook(workbook: Xlsx<RS>) -> Self {
        let l_sheet_names = workbook.sheet_names();
        Self {
            workbook,
            l_sheet_names: l_sheet_names.into_iter(),
            if_finished: false,
        }
    }

    fn read_sheet(&mut self, sheet_name: String) -> RecombinantResult<SpecSheet<TypeSheetRows>> {
        let range = self.workbook.worksheet_range(&sheet_name)?;
        let formulas = self.workbook.worksheet_formula(&sheet_name)?;
        let mut rows = SheetRows::new(range, Some(formulas));

        let missing_header = || RecombinantError::MissingHeaderRows {
            sheet_name: sheet_name.clone(),
        };
        let row_organization = rows.next().ok_or_else(missing_header)?;
        let _row_labels = rows.next().ok_or_else(missing_header)?;
        let row_names = rows.next().ok_or_else(missing_header)?;

        let organization_label = row_organization
            .first()
            .map(derive_cell_text)
            .unwrap_or_default();
        let column_identifiers = row_names.iter().map(derive_cell_text).collect();

        debug!(
            sheet_name = %sheet_name,
            organization = %organization_label,
            "surfacing sheet"
        );

        Ok(SpecSheet {
            sheet_name,
            organization_label,
            column_identifiers,
            rows: FilterFillerRows::new(rows),
        })
    }
}

impl<RS: Read + Seek> Iterator for SheetReader<RS> {
    type Item = RecombinantResult<SpecSheet<TypeSheetRows>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.if_finished {
            return None;
        }
        let Some(sheet_name) = self.l_sheet_names.next() else {
            self.if_finished = true;
            return None;
        };
        if sheet_name == C_SHEET_NAME_SENTINEL {
            debug!(sheet_name = %sheet_name, "sentinel sheet reached");
            self.if_finished = true;
            return None;
        }

        let res_sheet = self.read_sheet(sheet_name);
        if res_sheet.is_err() {
            self.if_finished = true;
        }
        Some(res_sheet)
    }
}

/// Open `path` and iterate its importable sheets.
pub fn read_excel(path: &Path) -> RecombinantResult<SheetReader<BufReader<File>>> {
    SheetReader::open(path)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
