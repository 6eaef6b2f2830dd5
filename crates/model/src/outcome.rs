use crate::catalog::UpdatePayload;

/// Result of reconciling one row against the remote catalog.
#[derive(Debug, Clone)]
pub enum RowOutcome {
    /// The row and the remote product already agree.
    NoChange,
    /// A material difference exists; the payload goes into the bulk call.
    Update(UpdatePayload),
    /// The row carries no part number.
    MissingPart,
    /// The part number matched nothing in the remote catalog.
    NotFound { part_number: String },
    /// The current product could not be fetched after retries.
    FetchFailed { part_number: String, reason: String },
}

impl RowOutcome {
    /// Failures increment the feed's `failed` counter.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RowOutcome::MissingPart | RowOutcome::NotFound { .. } | RowOutcome::FetchFailed { .. }
        )
    }
}
