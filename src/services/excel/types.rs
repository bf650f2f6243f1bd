use bytes::Bytes;
use std::ops::RangeInclusive;

pub const XLSX_MIME_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const DEFAULT_EXTENSION: &str = ".xlsx";
pub const FORM_TITLE: &str = "CCG Activity Tracking Form";

pub const CORRECTED_FONT_NAME: &str = "Calibri";
pub const CORRECTED_FONT_SIZE: f64 = 14.0;

/// The block of cells on the active sheet that gets proofread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionRange {
    pub column: u32,
    pub first_row: u32,
    pub last_row: u32,
}

/// Column `L`, rows 13 through 19.
pub const TRACKING_FORM_RANGE: CorrectionRange = CorrectionRange {
    column: 12,
    first_row: 13,
    last_row: 19,
};

impl CorrectionRange {
    pub fn rows(&self) -> RangeInclusive<u32> {
        self.first_row..=self.last_row
    }
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorrectedWorkbook {
    pub file_name: String,
    pub data: Vec<u8>,
    pub corrected_cells: usize,
}
