use chrono::{Datelike, Duration, NaiveDate};

use super::types::{DEFAULT_EXTENSION, FORM_TITLE};

const WINDOW_DATE_FORMAT: &str = "%m.%d.%y";

/// Monday and Sunday of the calendar week before the one containing `today`.
pub fn previous_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let weekday = today.weekday().num_days_from_monday() as i64;
    let start = today - Duration::days(weekday + 7);
    let end = today - Duration::days(weekday + 1);
    (start, end)
}

/// Splits `name` into base and extension the way path tools usually do:
/// the extension starts at the last dot of the final path component, and
/// leading dots never start one.
pub fn split_extension(name: &str) -> (&str, &str) {
    let file_start = name.rfind(['/', '\\']).map_or(0, |idx| idx + 1);
    let file = &name[file_start..];
    let leading_dots = file.len() - file.trim_start_matches('.').len();

    match file[leading_dots..].rfind('.') {
        Some(dot) => name.split_at(file_start + leading_dots + dot),
        None => (name, ""),
    }
}

pub fn output_file_name(original_name: &str, today: NaiveDate) -> String {
    let (base, extension) = split_extension(original_name);
    let extension = if extension.is_empty() { DEFAULT_EXTENSION } else { extension };
    let (start, end) = previous_week(today);

    format!(
        "{} {} {} - {}{}",
        base,
        FORM_TITLE,
        start.format(WINDOW_DATE_FORMAT),
        end.format(WINDOW_DATE_FORMAT),
        extension
    )
}
