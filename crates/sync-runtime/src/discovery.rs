use chrono::NaiveDate;

/// Which bucket layout and rate limits the pipeline runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Test bucket, `MM-DD-YYYY-test` folders, tighter rate limits.
    Development,
    /// Live bucket, plain `MM-DD-YYYY` folders.
    Production,
}

/// Parses a folder name against the mode's pattern. Production folders are
/// bare `MM-DD-YYYY`; development folders carry a `-test` suffix. Anything
/// else is not a feed folder.
pub fn folder_date(name: &str, mode: ExecutionMode) -> Option<NaiveDate> {
    let date_part = match mode {
        ExecutionMode::Production => {
            if name.ends_with("-test") {
                return None;
            }
            name
        }
        ExecutionMode::Development => name.strip_suffix("-test")?,
    };
    NaiveDate::parse_from_str(date_part, "%m-%d-%Y").ok()
}

/// Newest matching folder by its date prefix.
pub fn newest_feed_folder(folders: &[String], mode: ExecutionMode) -> Option<String> {
    folders
        .iter()
        .filter_map(|name| folder_date(name, mode).map(|date| (date, name)))
        .max_by_key(|(date, _)| *date)
        .map(|(_, name)| name.clone())
}

/// Only `.csv` objects are consumed, extension matched case-insensitively.
pub fn is_csv_object(key: &str) -> bool {
    key.to_ascii_lowercase().ends_with(".csv")
}
