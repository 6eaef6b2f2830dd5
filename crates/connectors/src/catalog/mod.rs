use crate::error::CatalogError;
use async_trait::async_trait;
use model::catalog::{BulkUpdateResult, RemoteProduct, UpdatePayload};
use tokio_util::sync::CancellationToken;

pub mod http;

/// Narrow façade over the remote commerce catalog. Every implementation
/// admits its wire calls through the shared rate gate; retry loops live with
/// the callers, driven by the gate's policy.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Resolves a part number to the first matching product id, or `None`
    /// when the search comes back empty.
    async fn lookup_id_by_part_number(
        &self,
        cancel: &CancellationToken,
        part_number: &str,
    ) -> Result<Option<u64>, CatalogError>;

    /// Current remote product, fields and meta entries included.
    async fn fetch_by_id(
        &self,
        cancel: &CancellationToken,
        remote_id: u64,
    ) -> Result<RemoteProduct, CatalogError>;

    /// Submits every payload in one call; results come back per id.
    async fn bulk_update(
        &self,
        cancel: &CancellationToken,
        payloads: &[UpdatePayload],
    ) -> Result<Vec<BulkUpdateResult>, CatalogError>;
}
