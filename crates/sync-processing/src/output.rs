use chrono::Utc;
use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};
use sync_core::progress::ProgressReport;
use tracing::error;

const ERROR_LOG: &str = "error-log.txt";
const UPDATES_LOG: &str = "updates-log.txt";
const INFO_LOG: &str = "info-log.txt";
const PROGRESS_FILE: &str = "update-progress.txt";

/// Flat-file artifacts under `output-files/`. Writing is best-effort: a log
/// line that cannot land must never take the pipeline down, so failures are
/// traced and swallowed.
pub struct OutputFiles {
    dir: PathBuf,
}

impl OutputFiles {
    pub fn create(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Timestamped error with its full source chain.
    pub fn append_error(&self, context: &str, err: &(dyn std::error::Error + 'static)) {
        let mut line = format!("[{}] {context}: {err}", Utc::now().to_rfc3339());
        let mut source = err.source();
        while let Some(cause) = source {
            line.push_str(&format!("\n    caused by: {cause}"));
            source = cause.source();
        }
        self.append(ERROR_LOG, &line);
    }

    pub fn append_error_text(&self, context: &str, detail: &str) {
        self.append(
            ERROR_LOG,
            &format!("[{}] {context}: {detail}", Utc::now().to_rfc3339()),
        );
    }

    /// One line per successfully pushed update.
    pub fn append_update(&self, feed_key: &str, row_index: u64, remote_id: u64, part_number: &str) {
        self.append(
            UPDATES_LOG,
            &format!(
                "[{}] feed={feed_key} row={row_index} id={remote_id} part_number={part_number}",
                Utc::now().to_rfc3339()
            ),
        );
    }

    pub fn append_info(&self, line: &str) {
        self.append(INFO_LOG, &format!("[{}] {line}", Utc::now().to_rfc3339()));
    }

    /// Latest snapshot only; each write replaces the previous one.
    pub fn write_progress(&self, report: &ProgressReport) {
        let path = self.dir.join(PROGRESS_FILE);
        if let Err(e) = std::fs::write(&path, format!("{report}\n")) {
            error!(path = %path.display(), error = %e, "failed to write progress snapshot");
        }
    }

    fn append(&self, file: &str, line: &str) {
        let path = self.dir.join(file);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            error!(path = %path.display(), error = %e, "failed to append log line");
        }
    }
}
