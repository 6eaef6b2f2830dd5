use serde::{Deserialize, Serialize};

/// Normalized column names of one feed, carried once per batch instead of
/// once per row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    columns: Vec<String>,
}

impl Header {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Borrowed view of one CSV row: the shared header plus this row's cells.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    header: &'a Header,
    cells: &'a [String],
}

impl<'a> Row<'a> {
    pub fn new(header: &'a Header, cells: &'a [String]) -> Self {
        Self { header, cells }
    }

    /// Returns the trimmed cell under `column`, or `None` when the column
    /// is absent or the cell is blank.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.header.position(column)?;
        let cell = self.cells.get(idx)?.trim();
        if cell.is_empty() { None } else { Some(cell) }
    }

    /// Like `get`, but blank and absent cells read as the empty string.
    pub fn get_or_empty(&self, column: &str) -> &'a str {
        self.get(column).unwrap_or("")
    }
}
