use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;

use crate::error::AppError;
use crate::services::excel::{CorrectedWorkbook, XLSX_MIME_TYPE};

#[derive(Debug, Serialize)]
pub struct CorrectedFile {
    pub original_name: String,
    pub file_name: String,
    pub mime_type: &'static str,
    pub size: usize,
    pub corrected_cells: usize,
    /// Base64 of the corrected workbook.
    pub content: String,
}

impl CorrectedFile {
    pub fn new(original_name: &str, corrected: CorrectedWorkbook) -> Self {
        Self {
            original_name: original_name.to_string(),
            file_name: corrected.file_name,
            mime_type: XLSX_MIME_TYPE,
            size: corrected.data.len(),
            corrected_cells: corrected.corrected_cells,
            content: STANDARD.encode(&corrected.data),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileFailure {
    pub file_name: String,
    pub kind: &'static str,
    pub message: String,
}

impl FileFailure {
    pub fn new(file_name: &str, error: &AppError) -> Self {
        Self {
            file_name: file_name.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub files: Vec<CorrectedFile>,
    pub failures: Vec<FileFailure>,
}

impl BatchReport {
    pub fn push_success(&mut self, file: CorrectedFile) {
        self.processed += 1;
        self.files.push(file);
    }

    pub fn push_failure(&mut self, failure: FileFailure) {
        self.failed += 1;
        self.failures.push(failure);
    }
}
