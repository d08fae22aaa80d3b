//! Blank template writer: table schema + organization -> one-sheet workbook
//! shaped for [`crate::reader::SheetReader`].
//!
//! Row 1 carries organization info, row 2 field labels. Rows 1 and 2 stay
//! frozen; the host appends the datastore id row and data below.

use std::path::Path;

use rust_xlsxwriter::{Color, Format, FormatPattern, FormatUnderline, Workbook, Worksheet};
use tracing::debug;

use crate::conf::N_WIDTH_COLUMN_DEFAULT;
use crate::datatypes::DataTypeRegistry;
use crate::spec::{
    RecombinantResult, SpecFillStyle, SpecFontStyle, SpecOrganization, SpecRowStyle,
    SpecTableSchema,
};
use crate::util::{cast_col_num, cast_row_num, derive_color_rgb, sanitize_sheet_name};

const N_ROW_ORGANIZATION: usize = 0;
const N_ROW_LABELS: usize = 1;

/// Template generator bound to one datastore type registry.
#[derive(Debug, Clone, Copy)]
pub struct TemplateWriter<'a> {
    registry: &'a DataTypeRegistry,
}

impl<'a> TemplateWriter<'a> {
    pub fn new(registry: &'a DataTypeRegistry) -> Self {
        Self { registry }
    }

    /// Build the in-memory template workbook.
    ///
    /// Every field type is resolved before anything is written.
    pub fn build_template(
        &self,
        table: &SpecTableSchema,
        org: &SpecOrganization,
    ) -> RecombinantResult<Workbook> {
        let l_entries = self.registry.resolve_fields(&table.fields)?;

        let fmt_organization = derive_row_format(&table.xls_organization_style);
        let fmt_header = derive_row_format(&table.xls_header_style);

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sanitize_sheet_name(&table.xls_sheet_name, "_"))?;

        for (n_idx_col, key) in table.xls_organization_info.iter().enumerate() {
            write_text_cell(
                worksheet,
                N_ROW_ORGANIZATION,
                n_idx_col,
                &org.derive_value(key),
                &fmt_organization,
            )?;
        }
        worksheet.set_row_format(cast_row_num(N_ROW_ORGANIZATION)?, &fmt_organization)?;

        for (n_idx_col, (field, entry)) in table.fields.iter().zip(&l_entries).enumerate() {
            let n_col = cast_col_num(n_idx_col)?;
            write_text_cell(worksheet, N_ROW_LABELS, n_idx_col, &field.label, &fmt_header)?;
            worksheet.set_column_width(
                n_col,
                field.xls_column_width.unwrap_or(N_WIDTH_COLUMN_DEFAULT),
            )?;
            worksheet.set_column_format(n_col, &Format::new().set_num_format(&entry.xl_format))?;
        }
        worksheet.set_row_format(cast_row_num(N_ROW_LABELS)?, &fmt_header)?;

        worksheet.set_freeze_panes(cast_row_num(N_ROW_LABELS + 1)?, 0)?;

        debug!(
            dataset_type = %table.dataset_type,
            sheet_name = %table.xls_sheet_name,
            n_fields = table.fields.len(),
            "template built"
        );
        Ok(workbook)
    }

    /// Build the template and write it to `path`.
    pub fn save_template(
        &self,
        table: &SpecTableSchema,
        org: &SpecOrganization,
        path: &Path,
    ) -> RecombinantResult<()> {
        let mut workbook = self.build_template(table, org)?;
        workbook.save(path)?;
        Ok(())
    }

    /// Build the template and return the `.xlsx` bytes.
    pub fn save_template_to_buffer(
        &self,
        table: &SpecTableSchema,
        org: &SpecOrganization,
    ) -> RecombinantResult<Vec<u8>> {
        let mut workbook = self.build_template(table, org)?;
        Ok(workbook.save_to_buffer()?)
    }
}

/// Build the template for `table` and `org` against `registry`.
pub fn build_template(
    table: &SpecTableSchema,
    org: &SpecOrganization,
    registry: &DataTypeRegistry,
) -> RecombinantResult<Workbook> {
    TemplateWriter::new(registry).build_template(table, org)
}

fn write_text_cell(
    worksheet: &mut Worksheet,
    n_idx_row: usize,
    n_idx_col: usize,
    value: &str,
    format: &Format,
) -> RecombinantResult<()> {
    let (n_row, n_col) = (cast_row_num(n_idx_row)?, cast_col_num(n_idx_col)?);
    if value.is_empty() {
        worksheet.write_blank(n_row, n_col, format)?;
    } else {
        worksheet.write_string_with_format(n_row, n_col, value, format)?;
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////
// #region RowStyles

/// Translate a row style descriptor into a cell format.
///
/// Missing style kinds and unrecognized values leave the format untouched.
pub fn derive_row_format(style: &SpecRowStyle) -> Format {
    let mut format = Format::new();
    if let Some(fill) = &style.fill {
        format = apply_fill_style(format, fill);
    }
    if let Some(font) = &style.font {
        format = apply_font_style(format, font);
    }
    format
}

fn apply_fill_style(mut format: Format, fill: &SpecFillStyle) -> Format {
    if let Some(val) = &fill.pattern_type
        && let Some(pattern) = derive_format_pattern(val)
    {
        format = format.set_pattern(pattern);
    }
    if let Some(rgb) = fill.fg_color.as_deref().and_then(derive_color_rgb) {
        format = format.set_foreground_color(Color::RGB(rgb));
    }
    if let Some(rgb) = fill.bg_color.as_deref().and_then(derive_color_rgb) {
        format = format.set_background_color(Color::RGB(rgb));
    }
    format
}

fn apply_font_style(mut format: Format, font: &SpecFontStyle) -> Format {
    if let Some(val) = &font.name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = font.size {
        format = format.set_font_size(val);
    }
    if font.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if font.italic.unwrap_or(false) {
        format = format.set_italic();
    }
    if let Some(val) = &font.underline
        && let Some(underline) = derive_format_underline(val)
    {
        format = format.set_underline(underline);
    }
    if let Some(rgb) = font.color.as_deref().and_then(derive_color_rgb) {
        format = format.set_font_color(Color::RGB(rgb));
    }
    format
}

fn derive_format_pattern(pattern: &str) -> Option<FormatPattern> {
    let value = pattern.trim().to_ascii_lowercase();
    match value.as_str() {
        "none" => Some(FormatPattern::None),
        "solid" => Some(FormatPattern::Solid),
        "mediumgray" => Some(FormatPattern::MediumGray),
        "darkgray" => Some(FormatPattern::DarkGray),
        "lightgray" => Some(FormatPattern::LightGray),
        "darkhorizontal" => Some(FormatPattern::DarkHorizontal),
        "darkvertical" => Some(FormatPattern::DarkVertical),
        "darkdown" => Some(FormatPattern::DarkDown),
        "darkup" => Some(FormatPattern::DarkUp),
        "darkgrid" => Some(FormatPattern::DarkGrid),
        "darktrellis" => Some(FormatPattern::DarkTrellis),
        "lighthorizontal" => Some(FormatPattern::LightHorizontal),
        "lightvertical" => Some(FormatPattern::LightVertical),
        "lightdown" => Some(FormatPattern::LightDown),
        "lightup" => Some(FormatPattern::LightUp),
        "lightgrid" => Some(FormatPattern::LightGrid),
        "lighttrellis" => Some(FormatPattern::LightTrellis),
        "gray125" => Some(FormatPattern::Gray125),
        "gray0625" => Some(FormatPattern::Gray0625),
        _ => None,
    }
}

fn derive_format_underline(underline: &str) -> Option<FormatUnderline> {
    let value = underline.trim().to_ascii_lowercase();
    match value.as_str() {
        "none" => Some(FormatUnderline::None),
        "single" => Some(FormatUnderline::Single),
        "double" => Some(FormatUnderline::Double),
        "singleaccounting" => Some(FormatUnderline::SingleAccounting),
        "doubleaccounting" => Some(FormatUnderline::DoubleAccounting),
        _ => None,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use calamine::{Data, Reader, Xlsx};

    use super::*;
    use crate::spec::{RecombinantError, SpecFieldSpec};

    fn derive_table() -> SpecTableSchema {
        let mut field_ref = SpecFieldSpec::new("ref", "text");
        field_ref.label = "Reference".to_string();
        field_ref.xls_column_width = Some(20.0);
        let mut field_value = SpecFieldSpec::new("value", "money");
        field_value.label = "Value".to_string();

        SpecTableSchema {
            dataset_type: "contracts".to_string(),
            title: "Contracts".to_string(),
            xls_sheet_name: "Contracts".to_string(),
            xls_organization_info: vec![
                "title".to_string(),
                "name".to_string(),
                "phone".to_string(),
            ],
            xls_organization_style: SpecRowStyle::default(),
            xls_header_style: SpecRowStyle {
                fill: None,
                font: Some(SpecFontStyle {
                    bold: Some(true),
                    ..SpecFontStyle::default()
                }),
            },
            fields: vec![field_ref, field_value],
        }
    }

    fn derive_org() -> SpecOrganization {
        SpecOrganization::from_json_str(
            r#"{"title": "Department of Widgets", "name": "dow",
                "extras": [{"key": "title", "value": "Widgets Canada"}]}"#,
        )
        .expect("organization")
    }

    #[test]
    fn template_writes_organization_and_label_rows() {
        let registry = DataTypeRegistry::default();
        let v_xlsx = TemplateWriter::new(&registry)
            .save_template_to_buffer(&derive_table(), &derive_org())
            .expect("template bytes");

        let mut workbook = Xlsx::new(Cursor::new(v_xlsx)).expect("reopen template");
        assert_eq!(workbook.sheet_names(), vec!["Contracts".to_string()]);

        let range = workbook.worksheet_range("Contracts").expect("range");
        assert_eq!(
            range.get_value((0, 0)),
            Some(&Data::String("Widgets Canada".to_string()))
        );
        assert_eq!(range.get_value((0, 1)), Some(&Data::String("dow".to_string())));
        assert!(matches!(range.get_value((0, 2)), None | Some(Data::Empty)));
        assert_eq!(
            range.get_value((1, 0)),
            Some(&Data::String("Reference".to_string()))
        );
        assert_eq!(range.get_value((1, 1)), Some(&Data::String("Value".to_string())));
    }

    #[test]
    fn unknown_field_type_fails_before_writing() {
        let registry = DataTypeRegistry::default();
        let mut table = derive_table();
        table.fields.push(SpecFieldSpec::new("geom", "geometry"));

        let err = build_template(&table, &derive_org(), &registry).err().expect("must fail");
        assert!(matches!(err, RecombinantError::UnknownTypeTag(ref tag) if tag == "geometry"));
    }

    #[test]
    fn template_saves_to_path() {
        let registry = DataTypeRegistry::default();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("contracts.xlsx");

        TemplateWriter::new(&registry)
            .save_template(&derive_table(), &derive_org(), &path)
            .expect("save template");
        assert!(path.is_file());
    }

    #[test]
    fn row_format_maps_fill_and_font() {
        let style = SpecRowStyle {
            fill: Some(SpecFillStyle {
                pattern_type: Some("solid".to_string()),
                fg_color: Some("FF2A6BB5".to_string()),
                bg_color: None,
            }),
            font: Some(SpecFontStyle {
                size: Some(14.0),
                bold: Some(true),
                underline: Some("single".to_string()),
                color: Some("#FFFFFF".to_string()),
                ..SpecFontStyle::default()
            }),
        };

        let expected = Format::new()
            .set_pattern(FormatPattern::Solid)
            .set_foreground_color(Color::RGB(0x2A6BB5))
            .set_font_size(14.0)
            .set_bold()
            .set_underline(FormatUnderline::Single)
            .set_font_color(Color::RGB(0xFFFFFF));
        assert_eq!(derive_row_format(&style), expected);
    }

    #[test]
    fn row_format_skips_absent_and_unknown_styles() {
        assert_eq!(derive_row_format(&SpecRowStyle::default()), Format::new());

        let style = SpecRowStyle {
            fill: Some(SpecFillStyle {
                pattern_type: Some("plaid".to_string()),
                fg_color: Some("blue".to_string()),
                bg_color: None,
            }),
            font: None,
        };
        assert_eq!(derive_row_format(&style), Format::new());
    }
}
