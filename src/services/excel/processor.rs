use super::types::*;
use super::utils::output_file_name;
use bytes::Bytes;
use std::io::Cursor;
use std::sync::Arc;
use umya_spreadsheet::{Font, Spreadsheet, Worksheet};
use crate::error::AppError;
use crate::services::clock::Clock;
use crate::services::grammar::GrammarChecker;

pub struct WorkbookCorrector<G> {
    checker: G,
    clock: Arc<dyn Clock>,
    range: CorrectionRange,
}

impl<G: GrammarChecker> WorkbookCorrector<G> {
    pub fn new(checker: G, clock: Arc<dyn Clock>) -> Self {
        Self {
            checker,
            clock,
            range: TRACKING_FORM_RANGE,
        }
    }

    /// Proofreads the tracking-form cells of the active sheet and renames the
    /// file after last week's date window.
    ///
    /// Parsing and writing run on the blocking pool; a panic inside the
    /// spreadsheet library fails this file only.
    pub async fn correct(&self, file_data: impl Into<Bytes>, original_name: &str) -> Result<CorrectedWorkbook, AppError> {
        let start = std::time::Instant::now();
        tracing::info!("Correcting workbook {}", original_name);

        let file_data = file_data.into();
        let range = self.range;
        let (workbook, sheet_index, targets) = run_blocking(
            move || {
                let mut workbook = read_workbook(&file_data)?;
                let (sheet_index, sheet) = active_sheet_mut(&mut workbook)?;
                tracing::debug!("Active sheet: {}", sheet.get_name());
                let targets = collect_targets(sheet, range);
                Ok((workbook, sheet_index, targets))
            },
            AppError::MalformedFile,
        )
        .await?;

        let mut corrections = Vec::with_capacity(targets.len());
        for (row, original_text) in targets {
            let corrected_text = self.checker.check_and_correct(&original_text).await.map_err(|e| {
                tracing::error!("Grammar check failed for row {} of {}: {}", row, original_name, e);
                e
            })?;
            if corrected_text != original_text {
                tracing::debug!("Row {} rewritten", row);
            }
            corrections.push((row, corrected_text));
        }
        let corrected_cells = corrections.len();

        let data = run_blocking(
            move || {
                let mut workbook = workbook;
                let sheet = workbook
                    .get_sheet_mut(&sheet_index)
                    .ok_or_else(|| AppError::Serialization(format!("Sheet {} disappeared", sheet_index)))?;
                apply_corrections(sheet, range, corrections);
                write_workbook(&workbook)
            },
            AppError::Serialization,
        )
        .await?;

        let file_name = output_file_name(original_name, self.clock.today());

        tracing::info!(
            "Corrected {} cells in {}, saved as {} ({}KB) in {:?}",
            corrected_cells,
            original_name,
            file_name,
            data.len() / 1024,
            start.elapsed()
        );

        Ok(CorrectedWorkbook {
            file_name,
            data,
            corrected_cells,
        })
    }
}

/// Runs spreadsheet work on the blocking pool, turning a panic into `on_panic`.
async fn run_blocking<T, F>(task: F, on_panic: fn(String) -> AppError) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|e| {
        let reason = if e.is_panic() {
            let payload = e.into_panic();
            payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "spreadsheet library panicked".to_string())
        } else {
            e.to_string()
        };
        tracing::error!("Spreadsheet task failed: {}", reason);
        on_panic(reason)
    })?
}

pub fn read_workbook(file_data: &[u8]) -> Result<Spreadsheet, AppError> {
    umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(file_data), true)
        .map_err(|e| AppError::MalformedFile(format!("Failed to open Excel file: {}", e)))
}

pub fn write_workbook(workbook: &Spreadsheet) -> Result<Vec<u8>, AppError> {
    let mut output = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(workbook, &mut output)
        .map_err(|e| AppError::Serialization(format!("Failed to write Excel file: {}", e)))?;
    Ok(output.into_inner())
}

fn active_sheet_mut(workbook: &mut Spreadsheet) -> Result<(usize, &mut Worksheet), AppError> {
    let index = *workbook.get_workbook_view().get_active_tab() as usize;
    workbook
        .get_sheet_mut(&index)
        .map(|sheet| (index, sheet))
        .ok_or_else(|| AppError::MalformedFile(format!("Workbook has no sheet at active index {}", index)))
}

/// Rows in `range` whose cell holds text worth checking.
fn collect_targets(sheet: &Worksheet, range: CorrectionRange) -> Vec<(u32, String)> {
    range
        .rows()
        .filter_map(|row| match cell_text(sheet, (range.column, row)) {
            Some(text) => Some((row, text)),
            None => {
                tracing::debug!("Row {} has no text to correct, skipping", row);
                None
            }
        })
        .collect()
}

fn apply_corrections(sheet: &mut Worksheet, range: CorrectionRange, corrections: Vec<(u32, String)>) {
    for (row, text) in corrections {
        let cell = sheet.get_cell_mut((range.column, row));
        cell.set_value_string(text);
        cell.get_style_mut().set_font(corrected_font());
    }

    for row in range.rows() {
        reset_row_height(sheet, row);
    }
}

/// Text held by a cell, if it holds any. Numbers, booleans and formulas are
/// not prose and are left for the sheet to render.
fn cell_text(sheet: &Worksheet, coordinate: (u32, u32)) -> Option<String> {
    let cell = sheet.get_cell(coordinate)?;
    if cell.is_formula() || cell.get_data_type() != "s" {
        return None;
    }
    let text = cell.get_value();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn corrected_font() -> Font {
    let mut font = Font::default();
    font.set_name(CORRECTED_FONT_NAME);
    font.set_size(CORRECTED_FONT_SIZE);
    font
}

fn reset_row_height(sheet: &mut Worksheet, row: u32) {
    if sheet.get_row_dimension(&row).is_none() {
        return;
    }
    sheet
        .get_row_dimension_mut(&row)
        .set_height(0.0)
        .set_custom_height(false);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::clock::FixedClock;
    use crate::services::grammar::GrammarMatch;
    use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use zip::write::SimpleFileOptions;
    use zip::{ZipArchive, ZipWriter};

    /// Rewrites whole words from a fixed table.
    pub(crate) struct WordFixer(pub HashMap<&'static str, &'static str>);

    impl WordFixer {
        pub(crate) fn typos() -> Self {
            Self(HashMap::from([
                ("teh", "the"),
                ("recieved", "received"),
                ("CCG", "CGG"),
                ("CM", "Cm"),
            ]))
        }
    }

    impl GrammarChecker for WordFixer {
        async fn check(&self, text: &str) -> Result<Vec<GrammarMatch>, AppError> {
            let mut matches = Vec::new();
            let mut offset = 0;
            for word in text.split(' ') {
                if let Some(fix) = self.0.get(word) {
                    matches.push(GrammarMatch::new(offset, word.encode_utf16().count(), fix));
                }
                offset += word.encode_utf16().count() + 1;
            }
            Ok(matches)
        }
    }

    struct Unreachable;

    impl GrammarChecker for Unreachable {
        async fn check(&self, _text: &str) -> Result<Vec<GrammarMatch>, AppError> {
            Err(AppError::GrammarService("connection refused".into()))
        }
    }

    pub(crate) fn reference_clock() -> Arc<dyn Clock> {
        // Wednesday
        Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 3, 13).unwrap()))
    }

    pub(crate) fn tracking_form() -> Vec<u8> {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_active_sheet_mut();
        sheet.get_cell_mut("A1").set_value("Activity");
        sheet.get_cell_mut("K13").set_value("teh neighbour");
        sheet.get_cell_mut("L12").set_value("teh header");
        sheet.get_cell_mut("L13").set_value("We recieved teh report");
        sheet.get_cell_mut("L14").set_value("CCG met with CM staff");
        sheet.get_cell_mut("L16").set_value_number(42);
        sheet.get_cell_mut("L20").set_value("teh footer");

        sheet.get_cell_mut("L15").get_style_mut().get_font_mut().set_name("Arial").set_size(9.0);
        sheet.get_cell_mut("K13").get_style_mut().get_font_mut().set_name("Arial").set_size(9.0);

        sheet.get_row_dimension_mut(&13).set_height(48.0).set_custom_height(true);
        sheet.get_row_dimension_mut(&15).set_height(60.0).set_custom_height(true);
        sheet.get_row_dimension_mut(&20).set_height(30.0).set_custom_height(true);

        write_workbook(&book).unwrap()
    }

    /// Rewrites `xl/worksheets/sheet1.xml` inside an otherwise intact package.
    pub(crate) fn with_sheet_xml(data: &[u8], edit: impl Fn(Vec<u8>) -> Vec<u8>) -> Vec<u8> {
        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for idx in 0..archive.len() {
            let mut entry = archive.by_index(idx).unwrap();
            let name = entry.name().to_string();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            if name == "xl/worksheets/sheet1.xml" {
                contents = edit(contents);
            }
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(&contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// A tracking form whose sheet XML is cut off halfway.
    pub(crate) fn tracking_form_with_broken_sheet() -> Vec<u8> {
        with_sheet_xml(&tracking_form(), |xml| xml[..xml.len() / 2].to_vec())
    }

    fn value(book: &Spreadsheet, coordinate: &str) -> String {
        book.get_sheet(&0)
            .unwrap()
            .get_cell(coordinate)
            .map(|c| c.get_value().to_string())
            .unwrap_or_default()
    }

    fn font(book: &Spreadsheet, coordinate: &str) -> Option<(String, f64)> {
        let cell = book.get_sheet(&0).unwrap().get_cell(coordinate)?;
        let font = cell.get_style().get_font()?;
        Some((font.get_name().to_string(), *font.get_size()))
    }

    fn row_height(book: &Spreadsheet, row: u32) -> f64 {
        book.get_sheet(&0)
            .unwrap()
            .get_row_dimension(&row)
            .map_or(0.0, |r| *r.get_height())
    }

    async fn corrected_form() -> (CorrectedWorkbook, Spreadsheet) {
        let corrector = WorkbookCorrector::new(WordFixer::typos(), reference_clock());
        let result = corrector.correct(tracking_form(), "Report.xlsx").await.unwrap();
        let book = read_workbook(&result.data).unwrap();
        (result, book)
    }

    #[tokio::test]
    async fn corrects_text_in_range_and_sets_font() {
        let (result, book) = corrected_form().await;

        assert_eq!(result.corrected_cells, 2);
        assert_eq!(value(&book, "L13"), "We received the report");
        assert_eq!(font(&book, "L13"), Some(("Calibri".to_string(), 14.0)));
    }

    #[tokio::test]
    async fn abbreviations_survive_correction() {
        let (_, book) = corrected_form().await;
        assert_eq!(value(&book, "L14"), "CCG met with CM staff");
        assert_eq!(font(&book, "L14"), Some(("Calibri".to_string(), 14.0)));
    }

    #[tokio::test]
    async fn cells_outside_range_are_untouched() {
        let (_, book) = corrected_form().await;

        assert_eq!(value(&book, "A1"), "Activity");
        assert_eq!(value(&book, "K13"), "teh neighbour");
        assert_eq!(value(&book, "L12"), "teh header");
        assert_eq!(value(&book, "L20"), "teh footer");
        assert_eq!(font(&book, "K13"), Some(("Arial".to_string(), 9.0)));
    }

    #[tokio::test]
    async fn empty_and_numeric_cells_are_skipped() {
        let (_, book) = corrected_form().await;

        assert_eq!(value(&book, "L15"), "");
        assert_eq!(font(&book, "L15"), Some(("Arial".to_string(), 9.0)));
        assert_eq!(value(&book, "L16"), "42");
        assert_eq!(value(&book, "L17"), "");
    }

    #[tokio::test]
    async fn row_heights_in_range_are_cleared() {
        let (_, book) = corrected_form().await;

        assert_eq!(row_height(&book, 13), 0.0);
        assert_eq!(row_height(&book, 15), 0.0);
        assert_eq!(row_height(&book, 20), 30.0);
    }

    #[tokio::test]
    async fn output_name_uses_previous_week() {
        let corrector = WorkbookCorrector::new(WordFixer::typos(), reference_clock());

        let named = corrector.correct(tracking_form(), "Report").await.unwrap();
        assert_eq!(named.file_name, "Report CCG Activity Tracking Form 03.04.24 - 03.10.24.xlsx");

        let (result, _) = corrected_form().await;
        assert_eq!(result.file_name, "Report CCG Activity Tracking Form 03.04.24 - 03.10.24.xlsx");
    }

    #[tokio::test]
    async fn corrected_values_read_back_with_calamine() {
        let (result, _) = corrected_form().await;

        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(result.data)).unwrap();
        let sheet_name = workbook.sheet_names()[0].clone();
        let range = workbook.worksheet_range(&sheet_name).unwrap();

        let at = |row: u32, col: u32| range.get_value((row - 1, col - 1)).cloned().unwrap_or(Data::Empty);
        assert_eq!(at(13, 12), Data::String("We received the report".to_string()));
        assert_eq!(at(14, 12), Data::String("CCG met with CM staff".to_string()));
        assert_eq!(at(1, 1), Data::String("Activity".to_string()));
    }

    #[tokio::test]
    async fn malformed_bytes_are_rejected() {
        let corrector = WorkbookCorrector::new(WordFixer::typos(), reference_clock());
        let err = corrector.correct(b"definitely not a zip".to_vec(), "Report.xlsx").await.unwrap_err();
        assert_eq!(err.kind(), "malformed_file");
    }

    #[tokio::test]
    async fn corrupt_sheet_xml_is_malformed_not_a_crash() {
        let corrector = WorkbookCorrector::new(WordFixer::typos(), reference_clock());
        let err = corrector
            .correct(tracking_form_with_broken_sheet(), "Report.xlsx")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_file");

        // The corrector stays usable afterwards.
        let result = corrector.correct(tracking_form(), "Report.xlsx").await.unwrap();
        assert_eq!(result.corrected_cells, 2);
    }

    #[tokio::test]
    async fn grammar_failure_fails_the_file() {
        let corrector = WorkbookCorrector::new(Unreachable, reference_clock());
        let err = corrector.correct(tracking_form(), "Report.xlsx").await.unwrap_err();
        assert_eq!(err.kind(), "grammar_service");
    }

    #[tokio::test]
    async fn empty_range_needs_no_grammar_service() {
        let mut book = umya_spreadsheet::new_file();
        book.get_active_sheet_mut().get_cell_mut("B2").set_value("untouched");
        let data = write_workbook(&book).unwrap();

        let corrector = WorkbookCorrector::new(Unreachable, reference_clock());
        let result = corrector.correct(data, "Blank.xlsx").await.unwrap();
        assert_eq!(result.corrected_cells, 0);
        assert_eq!(value(&read_workbook(&result.data).unwrap(), "B2"), "untouched");
    }
}
