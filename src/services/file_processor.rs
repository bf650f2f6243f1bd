use crate::error::AppError;
use crate::models::{BatchReport, CorrectedFile, FileFailure};
use crate::services::excel::utils::split_extension;
use crate::services::excel::{CorrectedWorkbook, Upload, WorkbookCorrector};
use crate::services::grammar::GrammarChecker;

const ACCEPTED_EXTENSION: &str = "xlsx";

/// Rejects uploads that cannot be a tracking form before any parsing happens.
pub fn validate_upload(upload: &Upload, max_file_size: usize) -> Result<(), AppError> {
    let (_, extension) = split_extension(&upload.file_name);
    if !extension.is_empty() && !extension[1..].eq_ignore_ascii_case(ACCEPTED_EXTENSION) {
        return Err(AppError::InvalidInput(format!(
            "Only XLSX files are supported, got {}",
            upload.file_name
        )));
    }
    if upload.data.is_empty() {
        return Err(AppError::InvalidInput(format!("{} is empty", upload.file_name)));
    }
    if upload.data.len() > max_file_size {
        return Err(AppError::InvalidInput(format!(
            "{} is {}KB, over the {}KB limit",
            upload.file_name,
            upload.data.len() / 1024,
            max_file_size / 1024
        )));
    }
    Ok(())
}

pub async fn process_upload<G: GrammarChecker>(
    corrector: &WorkbookCorrector<G>,
    upload: &Upload,
    max_file_size: usize,
) -> Result<CorrectedWorkbook, AppError> {
    validate_upload(upload, max_file_size)?;
    corrector.correct(upload.data.clone(), &upload.file_name).await
}

/// Runs every upload through the corrector on its own; one file failing never
/// stops the rest.
pub async fn process_batch<G: GrammarChecker>(
    corrector: &WorkbookCorrector<G>,
    uploads: Vec<Upload>,
    max_file_size: usize,
) -> BatchReport {
    let start = std::time::Instant::now();
    tracing::info!("Processing {} file(s)", uploads.len());

    let mut report = BatchReport::default();
    for upload in uploads {
        tracing::info!("Processing: {}", upload.file_name);
        match process_upload(corrector, &upload, max_file_size).await {
            Ok(corrected) => report.push_success(CorrectedFile::new(&upload.file_name, corrected)),
            Err(e) => {
                tracing::error!("Failed to process {}: {}", upload.file_name, e);
                report.push_failure(FileFailure::new(&upload.file_name, &e));
            }
        }
    }

    tracing::info!(
        "Batch finished in {:?}: {} processed, {} failed",
        start.elapsed(),
        report.processed,
        report.failed
    );
    report
}
