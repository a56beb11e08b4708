pub mod parser;
pub mod record;
pub mod sheet;

pub use parser::{parse_workbook_bytes, parse_workbook_path};
pub use record::TreeRecord;
pub use sheet::parse_sheet_name;

#[derive(thiserror::Error, Debug)]
pub enum WorkbookError {
    #[error("unsupported file type (expected .xlsx or .xls): {0}")]
    UnsupportedFileType(String),
    #[error("failed to open workbook: {0}")]
    Open(#[from] calamine::Error),
    #[error("failed to read sheet `{sheet}`: {message}")]
    Sheet { sheet: String, message: String },
}
