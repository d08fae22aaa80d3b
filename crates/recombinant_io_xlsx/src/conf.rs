//! Workbook layout constants and default datastore type presets.

use crate::spec::{EnumCanonicalValue, SpecDataTypeEntry};

/// Number of header rows preceding data rows: organization, labels, ids.
pub const N_HEADER_ROWS: usize = 3;
/// Sheet name that marks the logical end of importable content.
pub const C_SHEET_NAME_SENTINEL: &str = "reference";
/// Error text carried by formula rejections.
pub const C_MSG_FORMULA_NOT_SUPPORTED: &str = "Formulas are not supported";
/// Column width used when a field declares none.
pub const N_WIDTH_COLUMN_DEFAULT: f64 = 10.0;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Datastore type tags known to the default registry.
pub const TUP_DATASTORE_TAGS: [&str; 8] = [
    "year", "month", "date", "int", "bigint", "numeric", "money", "text",
];

fn _entry(
    tag: &str,
    numeric: bool,
    default: EnumCanonicalValue,
    xl_format: &str,
) -> SpecDataTypeEntry {
    SpecDataTypeEntry {
        tag: tag.to_string(),
        numeric,
        default,
        xl_format: xl_format.to_string(),
    }
}

/// Build the default datastore type entries used by
/// [`crate::datatypes::DataTypeRegistry::default`].
pub fn derive_default_datastore_types() -> Vec<SpecDataTypeEntry> {
    vec![
        _entry("year", true, EnumCanonicalValue::Null, "###0"),
        _entry("month", true, EnumCanonicalValue::Null, "00"),
        _entry("date", false, EnumCanonicalValue::Null, "yyyy-mm-dd"),
        _entry("int", true, EnumCanonicalValue::Null, "#,##0"),
        _entry("bigint", true, EnumCanonicalValue::Null, "#,##0"),
        _entry("numeric", true, EnumCanonicalValue::Null, "#,##0.00"),
        _entry("money", false, EnumCanonicalValue::Null, "$#,##0.00"),
        _entry("text", false, EnumCanonicalValue::Text(String::new()), "@"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_datastore_types_cover_every_known_tag() {
        let l_entries = derive_default_datastore_types();
        let l_tags: Vec<&str> = l_entries.iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(l_tags, TUP_DATASTORE_TAGS.to_vec());
    }

    #[test]
    fn only_text_declares_a_text_default() {
        for entry in derive_default_datastore_types() {
            if entry.tag == "text" {
                assert_eq!(entry.default, EnumCanonicalValue::Text(String::new()));
            } else {
                assert_eq!(entry.default, EnumCanonicalValue::Null, "tag={}", entry.tag);
            }
        }
    }
}
