use crate::{error::ReconcileError, normalize::normalize_text, retry::classify_catalog_error};
use connectors::{catalog::CatalogApi, error::CatalogError};
use model::{
    catalog::{CanonicalProduct, META_COLUMNS, MetaEntry, RemoteProduct, UpdatePayload, meta_key_whitelisted},
    outcome::RowOutcome,
    row::Row,
};
use std::sync::Arc;
use sync_core::{
    metrics::Metrics,
    retry::{RetryError, RetryPolicy},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Per-row decision logic: look the part up, fetch the current product,
/// diff against the whitelisted projection, and emit a payload only when a
/// material difference exists.
pub struct Reconciler {
    catalog: Arc<dyn CatalogApi>,
    retry: RetryPolicy,
    metrics: Metrics,
}

impl Reconciler {
    pub fn new(catalog: Arc<dyn CatalogApi>, retry: RetryPolicy, metrics: Metrics) -> Self {
        Self {
            catalog,
            retry,
            metrics,
        }
    }

    pub async fn reconcile_row(
        &self,
        cancel: &CancellationToken,
        row: Row<'_>,
    ) -> Result<RowOutcome, ReconcileError> {
        let Some(part_number) = row.get("part_number") else {
            return Ok(RowOutcome::MissingPart);
        };

        self.metrics.add_remote_calls(1);
        let remote_id = match self
            .retry
            .run(
                || self.catalog.lookup_id_by_part_number(cancel, part_number),
                classify_catalog_error,
            )
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => {
                return Ok(RowOutcome::NotFound {
                    part_number: part_number.to_string(),
                });
            }
            Err(err) => return Self::row_failure(part_number, "lookup", err),
        };

        self.metrics.add_remote_calls(1);
        let current = match self
            .retry
            .run(
                || self.catalog.fetch_by_id(cancel, remote_id),
                classify_catalog_error,
            )
            .await
        {
            Ok(product) => product,
            Err(err) => return Self::row_failure(part_number, "fetch", err),
        };

        let payload = payload_from_row(remote_id, part_number, row);
        let projection = project(&current);

        if is_update_needed(&projection, &payload) {
            debug!(part_number, remote_id, "row differs from catalog");
            Ok(RowOutcome::Update(payload))
        } else {
            Ok(RowOutcome::NoChange)
        }
    }

    /// Cancellation aborts the whole batch instead of polluting the failed
    /// counter; every other exhausted error is a row-level failure.
    fn row_failure(
        part_number: &str,
        stage: &str,
        err: RetryError<CatalogError>,
    ) -> Result<RowOutcome, ReconcileError> {
        let inner = err.into_inner();
        if matches!(inner, CatalogError::Cancelled) {
            return Err(ReconcileError::Cancelled);
        }
        Ok(RowOutcome::FetchFailed {
            part_number: part_number.to_string(),
            reason: format!("{stage} failed: {inner}"),
        })
    }
}

/// Builds the update payload from the fixed column mapping. Every
/// whitelisted meta key is always present; absent columns become empty
/// strings. Values are emitted verbatim; normalization is for comparison
/// only.
pub fn payload_from_row(remote_id: u64, part_number: &str, row: Row<'_>) -> UpdatePayload {
    UpdatePayload {
        remote_id,
        part_number: part_number.to_string(),
        sku: row.get_or_empty("sku").to_string(),
        description: row.get_or_empty("product_description").to_string(),
        meta_data: META_COLUMNS
            .iter()
            .map(|(key, column)| MetaEntry::new(*key, row.get_or_empty(column)))
            .collect(),
    }
}

/// Whitelisted projection of the current remote product.
pub fn project(current: &RemoteProduct) -> CanonicalProduct {
    CanonicalProduct {
        sku: current.sku.clone(),
        description: current.description.clone(),
        meta_data: current
            .meta_data
            .iter()
            .filter(|entry| meta_key_whitelisted(&entry.key))
            .cloned()
            .collect(),
    }
}

/// Field-level diff. `id` and `part_number` never participate. Scalars
/// compare under text normalization. Meta entries compare by key from the
/// new side; keys present only on the current side are ignored, so updates
/// stay non-destructive.
pub fn is_update_needed(current: &CanonicalProduct, new: &UpdatePayload) -> bool {
    if normalize_text(&current.sku) != normalize_text(&new.sku) {
        return true;
    }
    if normalize_text(&current.description) != normalize_text(&new.description) {
        return true;
    }

    for entry in &new.meta_data {
        match current.meta_data.iter().find(|c| c.key == entry.key) {
            None => return true,
            Some(existing) => {
                if normalize_text(&existing.value) != normalize_text(&entry.value) {
                    return true;
                }
            }
        }
    }

    false
}
