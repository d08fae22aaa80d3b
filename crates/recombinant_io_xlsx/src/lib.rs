//! `recombinant_io_xlsx` v1:
//! Rust-side kernel for recombinant spreadsheet import and template export.
//!
//! Data flow: `reader` -> row filter -> `records` -> `canonical` (per cell).
//! `writer` consumes the same schema and registry to emit blank templates.
//!
//! - `conf`      : constants and default datastore type presets
//! - `spec`      : models, configuration documents and errors
//! - `datatypes` : datastore type registry
//! - `canonical` : cell canonicalization
//! - `reader`    : sheet reader and filler-row filter
//! - `records`   : record assembly and DataFrame / IPC export
//! - `writer`    : template writer
//! - `util`      : pure helper functions
pub mod canonical;
pub mod conf;
pub mod datatypes;
pub mod reader;
pub mod records;
pub mod spec;
pub mod util;
pub mod writer;

pub use canonical::Canonicalizer;
pub use conf::{
    C_MSG_FORMULA_NOT_SUPPORTED, C_SHEET_NAME_SENTINEL, N_HEADER_ROWS, TUP_DATASTORE_TAGS,
    derive_default_datastore_types,
};
pub use datatypes::DataTypeRegistry;
pub use reader::{
    FilterFillerRows, SheetReader, SheetRows, SpecSheet, TypeSheetRows, derive_cell_value,
    filter_filler_rows, read_excel,
};
pub use records::{
    RecordBuilder, RecordIter, build_records, fit_row_to_fields, iter_records,
    records_to_dataframe, records_to_ipc_bytes,
};
pub use spec::{
    EnumCanonicalValue, EnumCellValue, RecombinantError, RecombinantResult, SpecDataTypeEntry,
    SpecFieldSpec, SpecFillStyle, SpecFontStyle, SpecOrganization, SpecOrganizationExtra,
    SpecRecombinantConfig, SpecRowStyle, SpecTableSchema, TypeRecord, TypeRow,
};
pub use util::{is_filler, is_filler_row};
pub use writer::{TemplateWriter, build_template, derive_row_format};
