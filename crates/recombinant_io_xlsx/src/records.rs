//! Record assembly: fit rows to the declared fields, canonicalize each cell,
//! and export record sets as DataFrame / Arrow IPC.

use std::iter::Enumerate;

use polars::prelude::{Column, DataFrame, IpcWriter, SerWriter};
use tracing::{info, warn};

use crate::canonical::Canonicalizer;
use crate::conf::N_HEADER_ROWS;
use crate::datatypes::DataTypeRegistry;
use crate::spec::{
    EnumCanonicalValue, EnumCellValue, RecombinantError, RecombinantResult, SpecDataTypeEntry,
    SpecFieldSpec, TypeRecord, TypeRow,
};
use crate::util::is_trailing_filler;

////////////////////////////////////////////////////////////////////////////////
// #region RowFitting

/// Trim trailing filler beyond `n_fields`, then pad with empty cells up to it.
///
/// Non-filler cells past `n_fields` are kept; zipping against the fields
/// ignores them.
pub fn fit_row_to_fields(row: &mut TypeRow, n_fields: usize) {
    while row.len() > n_fields && row.last().is_some_and(is_trailing_filler) {
        row.pop();
    }
    if row.len() < n_fields {
        row.resize(n_fields, EnumCellValue::Empty);
    }
}

/// 1-based source row number of the `n_idx_row`-th retained data row.
pub fn derive_source_row_number(n_idx_row: usize) -> usize {
    n_idx_row + N_HEADER_ROWS + 1
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RecordBuilder

/// Builds records for one declared field list.
///
/// Every field's type tag is resolved on construction, so schema errors
/// surface before any cell is converted.
#[derive(Debug, Clone)]
pub struct RecordBuilder<'a> {
    canonicalizer: Canonicalizer<'a>,
    fields: &'a [SpecFieldSpec],
    l_entries: Vec<&'a SpecDataTypeEntry>,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(
        registry: &'a DataTypeRegistry,
        fields: &'a [SpecFieldSpec],
    ) -> RecombinantResult<Self> {
        Ok(Self {
            canonicalizer: Canonicalizer::new(registry)?,
            fields,
            l_entries: registry.resolve_fields(fields)?,
        })
    }

    /// Fit and convert one row; failures carry no row context.
    pub fn build_record(&self, mut row: TypeRow) -> RecombinantResult<TypeRecord> {
        fit_row_to_fields(&mut row, self.fields.len());

        let mut record = TypeRecord::with_capacity(self.fields.len());
        for ((field, entry), value) in self.fields.iter().zip(&self.l_entries).zip(&row) {
            let value_canon = self.canonicalizer.canonicalize_entry(value, entry)?;
            record.insert(field.datastore_id.clone(), value_canon);
        }
        Ok(record)
    }

    /// Convert every row, aborting at the first failure with its row number.
    pub fn build_records<I>(&self, rows: I) -> RecombinantResult<Vec<TypeRecord>>
    where
        I: IntoIterator<Item = TypeRow>,
    {
        let mut l_records = Vec::new();
        for (n_idx_row, row) in rows.into_iter().enumerate() {
            let record = self
                .build_record(row)
                .map_err(|err| _annotate_row_error(err, n_idx_row))?;
            l_records.push(record);
        }
        info!(
            n_records = l_records.len(),
            n_fields = self.fields.len(),
            "records built"
        );
        Ok(l_records)
    }

    /// Lazy form of [`Self::build_records`]; ends after the first failure.
    pub fn into_records<I>(self, rows: I) -> RecordIter<'a, I::IntoIter>
    where
        I: IntoIterator<Item = TypeRow>,
    {
        RecordIter {
            builder: self,
            rows: rows.into_iter().enumerate(),
            if_failed: false,
        }
    }
}

/// Iterator of row-annotated record results.
#[derive(Debug)]
pub struct RecordIter<'a, I> {
    builder: RecordBuilder<'a>,
    rows: Enumerate<I>,
    if_failed: bool,
}

impl<I: Iterator<Item = TypeRow>> Iterator for RecordIter<'_, I> {
    type Item = RecombinantResult<TypeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.if_failed {
            return None;
        }
        let (n_idx_row, row) = self.rows.next()?;
        let res_record = self
            .builder
            .build_record(row)
            .map_err(|err| _annotate_row_error(err, n_idx_row));
        self.if_failed = res_record.is_err();
        Some(res_record)
    }
}

fn _annotate_row_error(err: RecombinantError, n_idx_row: usize) -> RecombinantError {
    let n_row = derive_source_row_number(n_idx_row);
    warn!(row = n_row, error = %err, "record build aborted");
    err.at_row(n_row)
}

/// Lazily build records for `fields` from `rows` against `registry`.
pub fn iter_records<'a, I>(
    rows: I,
    fields: &'a [SpecFieldSpec],
    registry: &'a DataTypeRegistry,
) -> RecombinantResult<RecordIter<'a, I::IntoIter>>
where
    I: IntoIterator<Item = TypeRow>,
{
    Ok(RecordBuilder::new(registry, fields)?.into_records(rows))
}

/// Build records for `fields` from `rows` against `registry`.
pub fn build_records<I>(
    rows: I,
    fields: &[SpecFieldSpec],
    registry: &DataTypeRegistry,
) -> RecombinantResult<Vec<TypeRecord>>
where
    I: IntoIterator<Item = TypeRow>,
{
    RecordBuilder::new(registry, fields)?.build_records(rows)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Export

/// One nullable String column per field, in field order.
pub fn records_to_dataframe(
    records: &[TypeRecord],
    fields: &[SpecFieldSpec],
) -> RecombinantResult<DataFrame> {
    let l_columns: Vec<Column> = fields
        .iter()
        .map(|field| {
            let l_values: Vec<Option<String>> = records
                .iter()
                .map(|record| {
                    record
                        .get(&field.datastore_id)
                        .and_then(EnumCanonicalValue::to_text_opt)
                })
                .collect();
            Column::new(field.datastore_id.as_str().into(), l_values)
        })
        .collect();
    Ok(DataFrame::new(l_columns)?)
}

/// Serialize [`records_to_dataframe`] output as Arrow IPC bytes.
pub fn records_to_ipc_bytes(
    records: &[TypeRecord],
    fields: &[SpecFieldSpec],
) -> RecombinantResult<Vec<u8>> {
    let mut df = records_to_dataframe(records, fields)?;
    let mut v_buf = Vec::new();
    IpcWriter::new(&mut v_buf).finish(&mut df)?;
    Ok(v_buf)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use polars::prelude::{IpcReader, SerReader};

    use super::*;

    fn text(value: &str) -> EnumCellValue {
        EnumCellValue::text(value)
    }

    fn derive_fields() -> Vec<SpecFieldSpec> {
        vec![
            SpecFieldSpec::new("id", "text"),
            SpecFieldSpec::new("amt", "numeric"),
        ]
    }

    #[test]
    fn fit_row_trims_trailing_filler_down_to_field_count() {
        let mut row = vec![text("a"), text("b"), EnumCellValue::Empty, text("")];
        fit_row_to_fields(&mut row, 2);
        assert_eq!(row, vec![text("a"), text("b")]);
    }

    #[test]
    fn fit_row_stops_at_non_filler_tail() {
        let mut row = vec![text("a"), EnumCellValue::Empty, text("x"), EnumCellValue::Empty];
        fit_row_to_fields(&mut row, 2);
        assert_eq!(row, vec![text("a"), EnumCellValue::Empty, text("x")]);

        let mut row = vec![text("a"), text("b"), text("  ")];
        fit_row_to_fields(&mut row, 2);
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn fit_row_never_trims_below_field_count() {
        let mut row = vec![text("a"), EnumCellValue::Empty, EnumCellValue::Empty];
        fit_row_to_fields(&mut row, 2);
        assert_eq!(row, vec![text("a"), EnumCellValue::Empty]);
    }

    #[test]
    fn fit_row_pads_short_rows_with_empty_cells() {
        let mut row = vec![text("a")];
        fit_row_to_fields(&mut row, 3);
        assert_eq!(row, vec![text("a"), EnumCellValue::Empty, EnumCellValue::Empty]);

        let mut row = vec![];
        fit_row_to_fields(&mut row, 2);
        assert_eq!(row, vec![EnumCellValue::Empty, EnumCellValue::Empty]);
    }

    #[test]
    fn build_produces_one_record_per_row_in_field_order() {
        let registry = DataTypeRegistry::default();
        let fields = derive_fields();
        let l_records = build_records(
            vec![
                vec![text("7"), text("12.999")],
                vec![text("8")],
                vec![text("9"), EnumCellValue::Number(-3.7), text("extra")],
            ],
            &fields,
            &registry,
        )
        .expect("build records");

        assert_eq!(l_records.len(), 3);
        for record in &l_records {
            assert_eq!(record.keys().collect::<Vec<_>>(), vec!["id", "amt"]);
        }
        assert_eq!(l_records[0]["id"], EnumCanonicalValue::text("7"));
        assert_eq!(l_records[0]["amt"], EnumCanonicalValue::text("12"));
        assert_eq!(l_records[1]["amt"], EnumCanonicalValue::Null);
        assert_eq!(l_records[2]["amt"], EnumCanonicalValue::text("-4"));
    }

    #[test]
    fn build_failure_is_prefixed_with_source_row_number() {
        let registry = DataTypeRegistry::default();
        let fields = derive_fields();
        let err = build_records(
            vec![
                vec![text("1"), text("1")],
                vec![text("2"), text("2")],
                vec![text("=A1"), text("3")],
                vec![text("4"), text("4")],
            ],
            &fields,
            &registry,
        )
        .expect_err("must fail");

        assert_eq!(err.to_string(), "Row 6: Formulas are not supported");
        assert!(matches!(
            err,
            RecombinantError::BadRow { row: 6, ref source }
                if matches!(**source, RecombinantError::FormulaNotSupported)
        ));
    }

    #[test]
    fn unknown_tag_fails_before_any_row_without_row_context() {
        let registry = DataTypeRegistry::default();
        let fields = vec![SpecFieldSpec::new("a", "text"), SpecFieldSpec::new("b", "blob")];
        let err = build_records(Vec::<TypeRow>::new(), &fields, &registry).expect_err("must fail");
        assert!(matches!(err, RecombinantError::UnknownTypeTag(_)));
    }

    #[test]
    fn lazy_records_stop_after_first_failure() {
        let registry = DataTypeRegistry::default();
        let fields = derive_fields();
        let l_results: Vec<_> = iter_records(
            vec![vec![text("1")], vec![text("=NOW()")], vec![text("3")]],
            &fields,
            &registry,
        )
        .expect("record iterator")
        .collect();

        assert_eq!(l_results.len(), 2);
        assert!(l_results[0].is_ok());
        let err = l_results[1].as_ref().expect_err("second row fails");
        assert_eq!(err.to_string(), "Row 5: Formulas are not supported");
    }

    #[test]
    fn records_export_to_nullable_string_frame() {
        let registry = DataTypeRegistry::default();
        let fields = derive_fields();
        let l_records = build_records(
            vec![vec![text("7"), text("abc")], vec![text("8")]],
            &fields,
            &registry,
        )
        .expect("build records");

        let df = records_to_dataframe(&l_records, &fields).expect("frame");
        assert_eq!(df.shape(), (2, 2));
        assert_eq!(df.get_column_names_str(), vec!["id", "amt"]);

        let col_amt = df.column("amt").expect("amt").str().expect("str column");
        assert_eq!(col_amt.get(0), Some("0"));
        assert_eq!(col_amt.get(1), None);
    }

    #[test]
    fn records_export_to_ipc_bytes() {
        let registry = DataTypeRegistry::default();
        let fields = derive_fields();
        let l_records =
            build_records(vec![vec![text("7"), text("12.5")]], &fields, &registry).expect("build");

        let v_ipc = records_to_ipc_bytes(&l_records, &fields).expect("ipc");
        let df = IpcReader::new(Cursor::new(v_ipc)).finish().expect("read ipc");
        assert_eq!(df.shape(), (1, 2));
        let col_amt = df.column("amt").expect("amt").str().expect("str column");
        assert_eq!(col_amt.get(0), Some("12"));
    }
}
