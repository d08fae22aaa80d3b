//! Cell canonicalization: raw cell + declared datastore type -> canonical value.
//!
//! Precedence, first match wins:
//! 1. empty cell -> type default
//! 2. number or boolean, numeric type -> floor toward negative infinity, integer text
//! 3. number or boolean, other type -> text verbatim (`True` / `False` for booleans)
//! 4. text trimming to empty -> type default
//! 5. `money` -> drop a trailing `.<digits/spaces>`, then every non-digit
//! 6. `date` with a date cell -> `YYYY-MM-DD`
//! 7. other non-numeric text starting with `=` -> formula rejection
//! 8. other non-numeric -> text verbatim
//! 9. numeric type, text -> digits before the first `.`, or bare `0`

use regex::Regex;

use crate::datatypes::DataTypeRegistry;
use crate::spec::{
    EnumCanonicalValue, EnumCellValue, RecombinantError, RecombinantResult, SpecDataTypeEntry,
};
use crate::util::{derive_cell_text, render_bool, render_date, render_floor, render_number};

const C_TAG_MONEY: &str = "money";
const C_TAG_DATE: &str = "date";

/// Canonicalizer bound to one datastore type registry.
#[derive(Debug, Clone)]
pub struct Canonicalizer<'a> {
    registry: &'a DataTypeRegistry,
    re_trailing_decimal: Regex,
    re_non_digit: Regex,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(registry: &'a DataTypeRegistry) -> RecombinantResult<Self> {
        Ok(Self {
            registry,
            // End anchor also matches before one final newline.
            re_trailing_decimal: Regex::new(r"\.[0-9 ]+\n?$")?,
            re_non_digit: Regex::new(r"[^0-9]")?,
        })
    }

    /// Canonicalize `value` against the entry registered for `tag`.
    pub fn canonicalize(
        &self,
        value: &EnumCellValue,
        tag: &str,
    ) -> RecombinantResult<EnumCanonicalValue> {
        let entry = self.registry.get(tag)?;
        self.canonicalize_entry(value, entry)
    }

    /// Canonicalize `value` against an already resolved entry.
    pub fn canonicalize_entry(
        &self,
        value: &EnumCellValue,
        entry: &SpecDataTypeEntry,
    ) -> RecombinantResult<EnumCanonicalValue> {
        match value {
            EnumCellValue::Empty => return Ok(entry.default.clone()),
            EnumCellValue::Number(val) => {
                let c_text = if entry.numeric {
                    render_floor(*val)?
                } else {
                    render_number(*val)
                };
                return Ok(EnumCanonicalValue::Text(c_text));
            }
            EnumCellValue::Bool(val) => {
                let c_text = if entry.numeric {
                    render_floor(f64::from(u8::from(*val)))?
                } else {
                    render_bool(*val).to_string()
                };
                return Ok(EnumCanonicalValue::Text(c_text));
            }
            EnumCellValue::Text(val) if val.trim().is_empty() => {
                return Ok(entry.default.clone());
            }
            EnumCellValue::Text(_) | EnumCellValue::DateTime(_) => {}
        }

        let c_text = derive_cell_text(value);

        if !entry.numeric {
            if entry.tag == C_TAG_MONEY {
                return Ok(EnumCanonicalValue::Text(self.strip_money(&c_text)));
            }
            if entry.tag == C_TAG_DATE
                && let EnumCellValue::DateTime(dt) = value
            {
                return Ok(EnumCanonicalValue::Text(render_date(dt)));
            }
            if c_text.starts_with('=') {
                return Err(RecombinantError::FormulaNotSupported);
            }
            return Ok(EnumCanonicalValue::Text(c_text));
        }

        let c_int_part = c_text
            .split_once('.')
            .map_or(c_text.as_str(), |(head, _)| head);
        let c_digits = self.re_non_digit.replace_all(c_int_part, "");
        if c_digits.is_empty() {
            // Bare zero, not the type default.
            return Ok(EnumCanonicalValue::Integer(0));
        }
        Ok(EnumCanonicalValue::Text(c_digits.into_owned()))
    }

    fn strip_money(&self, text: &str) -> String {
        let c_no_decimal = self.re_trailing_decimal.replace(text, "");
        self.re_non_digit
            .replace_all(&c_no_decimal, "")
            .into_owned()
    }
}
