use crate::catalog::CatalogApi;
use crate::error::CatalogError;
use async_trait::async_trait;
use model::catalog::{BulkUpdateResult, MetaEntry, RemoteProduct, UpdatePayload};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use sync_core::gate::RateGate;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
}

#[derive(Debug, Clone)]
pub struct HttpCatalogConfig {
    pub base_url: String,
    pub credentials: ApiCredentials,
    pub timeout: Duration,
}

/// HTTP implementation of the catalog façade. Thin by design: one request
/// per operation, no retries here. The rate gate is the only way out.
pub struct HttpCatalog {
    client: Client,
    base_url: Url,
    credentials: ApiCredentials,
    gate: Arc<RateGate>,
}

/// Search result entry; only the id is consumed.
#[derive(Debug, Deserialize)]
struct ProductSummary {
    id: u64,
}

/// Wire shape of one bulk-update entry. The payload's part number is
/// attribution only and never crosses the wire.
#[derive(Debug, Serialize)]
struct WireUpdate<'a> {
    id: u64,
    sku: &'a str,
    description: &'a str,
    meta_data: &'a [MetaEntry],
}

#[derive(Debug, Serialize)]
struct BulkRequest<'a> {
    update: Vec<WireUpdate<'a>>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    update: Vec<BulkUpdateResult>,
}

impl HttpCatalog {
    pub fn new(config: HttpCatalogConfig, gate: Arc<RateGate>) -> Result<Self, CatalogError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|_| CatalogError::InvalidBaseUrl(config.base_url.clone()))?;

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url,
            credentials: config.credentials,
            gate,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        self.base_url
            .join(path)
            .map_err(|_| CatalogError::InvalidBaseUrl(format!("{}{path}", self.base_url)))
    }

    fn authed(&self, url: Url) -> reqwest::RequestBuilder {
        self.client.get(url).query(&[
            ("consumer_key", self.credentials.consumer_key.as_str()),
            ("consumer_secret", self.credentials.consumer_secret.as_str()),
        ])
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        context: &str,
    ) -> Result<T, CatalogError> {
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                context: context.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl CatalogApi for HttpCatalog {
    async fn lookup_id_by_part_number(
        &self,
        cancel: &CancellationToken,
        part_number: &str,
    ) -> Result<Option<u64>, CatalogError> {
        let url = self.endpoint("products")?;
        let request = self.authed(url).query(&[("part_number", part_number)]);

        let results: Vec<ProductSummary> = self
            .gate
            .schedule(cancel, &format!("lookup:{part_number}"), || async move {
                let response = request.send().await?;
                Self::read_json(response, &format!("lookup '{part_number}'")).await
            })
            .await
            .map_err(CatalogError::from)?;

        debug!(part_number, hits = results.len(), "part number lookup");
        Ok(results.first().map(|p| p.id))
    }

    async fn fetch_by_id(
        &self,
        cancel: &CancellationToken,
        remote_id: u64,
    ) -> Result<RemoteProduct, CatalogError> {
        let url = self.endpoint(&format!("products/{remote_id}"))?;
        let request = self.authed(url);

        self.gate
            .schedule(cancel, &format!("fetch:{remote_id}"), || async move {
                let response = request.send().await?;
                Self::read_json(response, &format!("fetch product {remote_id}")).await
            })
            .await
            .map_err(CatalogError::from)
    }

    async fn bulk_update(
        &self,
        cancel: &CancellationToken,
        payloads: &[UpdatePayload],
    ) -> Result<Vec<BulkUpdateResult>, CatalogError> {
        let url = self.endpoint("products/batch")?;
        let body = BulkRequest {
            update: payloads
                .iter()
                .map(|p| WireUpdate {
                    id: p.remote_id,
                    sku: &p.sku,
                    description: &p.description,
                    meta_data: &p.meta_data,
                })
                .collect(),
        };
        let request = self
            .client
            .post(url)
            .query(&[
                ("consumer_key", self.credentials.consumer_key.as_str()),
                ("consumer_secret", self.credentials.consumer_secret.as_str()),
            ])
            .json(&body);

        let count = payloads.len();
        let response: BulkResponse = self
            .gate
            .schedule(cancel, &format!("bulk:{count}"), || async move {
                let response = request.send().await?;
                Self::read_json(response, &format!("bulk update of {count} products"))
                    .await
            })
            .await
            .map_err(CatalogError::from)?;

        Ok(response.update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_update_carries_exactly_the_contract_fields() {
        let payload = UpdatePayload {
            remote_id: 42,
            part_number: "X-1".into(),
            sku: "sku-new".into(),
            description: "desc".into(),
            meta_data: vec![MetaEntry::new("spq", "100")],
        };
        let wire = WireUpdate {
            id: payload.remote_id,
            sku: &payload.sku,
            description: &payload.description,
            meta_data: &payload.meta_data,
        };

        let value = serde_json::to_value(&wire).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 42,
                "sku": "sku-new",
                "description": "desc",
                "meta_data": [{"key": "spq", "value": "100"}],
            })
        );
    }

    #[test]
    fn bulk_response_tolerates_missing_update_list() {
        let parsed: BulkResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.update.is_empty());

        let parsed: BulkResponse =
            serde_json::from_str(r#"{"update": [{"id": 7}, {"id": 8, "error": "nope"}]}"#).unwrap();
        assert_eq!(parsed.update.len(), 2);
        assert_eq!(parsed.update[1].error.as_deref(), Some("nope"));
    }
}
