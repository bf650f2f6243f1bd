pub mod processor;
pub mod types;
pub mod utils;

pub use processor::WorkbookCorrector;
pub use types::{CorrectedWorkbook, Upload, XLSX_MIME_TYPE};
