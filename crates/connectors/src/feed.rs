use crate::error::FeedError;
use model::row::Header;

/// Normalizes one header cell: trim, lowercase, runs of whitespace to `_`.
/// Idempotent, so re-normalizing an already-clean header is harmless.
pub fn normalize_header(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if c.is_whitespace() {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('_');
        }
        pending_sep = false;
        for lower in c.to_lowercase() {
            out.push(lower);
        }
    }
    out
}

/// One pass over a cached CSV body. The body is fetched once; counting and
/// batching are two passes over the same buffer, not two downloads.
pub struct CsvFeed<'a> {
    header: Header,
    reader: csv::Reader<&'a [u8]>,
}

impl<'a> CsvFeed<'a> {
    pub fn open(body: &'a str) -> Result<Self, FeedError> {
        let mut reader = csv::Reader::from_reader(body.as_bytes());

        let raw = reader.headers()?;
        if raw.is_empty() {
            return Err(FeedError::MissingHeader);
        }
        let header = Header::new(raw.iter().map(normalize_header).collect());

        Ok(Self { header, reader })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Consumes the feed into its header and a row iterator. Row errors are
    /// yielded in place so the caller can apply its own failure budget.
    pub fn into_rows(
        self,
    ) -> (
        Header,
        impl Iterator<Item = Result<Vec<String>, FeedError>> + 'a,
    ) {
        let rows = self
            .reader
            .into_records()
            .map(|record| -> Result<Vec<String>, FeedError> {
                Ok(record?
                    .iter()
                    .map(|cell| cell.to_string())
                    .collect::<Vec<String>>())
            });
        (self.header, rows)
    }
}

/// First pass: number of readable data rows in the body. Unreadable records
/// are not counted; the second pass surfaces them to the failure budget.
pub fn count_rows(body: &str) -> u64 {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    reader.records().filter(|record| record.is_ok()).count() as u64
}
