use connectors::error::CatalogError;
use sync_core::retry::RetryDisposition;

/// Maps a catalog failure onto the shared retry policy. Gateway timeouts
/// (524) retry with a doubled delay; the other transient statuses and
/// reset/hang-up transport errors retry normally; everything else is final.
pub fn classify_catalog_error(err: &CatalogError) -> RetryDisposition {
    match err.status() {
        Some(524) => RetryDisposition::RetrySlow,
        Some(429) | Some(502) | Some(504) => RetryDisposition::Retry,
        Some(_) => RetryDisposition::Stop,
        None if err.is_transient_transport() => RetryDisposition::Retry,
        None => RetryDisposition::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> CatalogError {
        CatalogError::Status {
            status,
            context: "test".into(),
        }
    }

    #[test]
    fn transient_statuses_retry() {
        for code in [429, 502, 504] {
            assert_eq!(classify_catalog_error(&status(code)), RetryDisposition::Retry);
        }
    }

    #[test]
    fn gateway_timeout_retries_slowly() {
        assert_eq!(
            classify_catalog_error(&status(524)),
            RetryDisposition::RetrySlow
        );
    }

    #[test]
    fn client_and_server_contract_errors_stop() {
        for code in [400, 401, 404, 500] {
            assert_eq!(classify_catalog_error(&status(code)), RetryDisposition::Stop);
        }
        assert_eq!(
            classify_catalog_error(&CatalogError::Cancelled),
            RetryDisposition::Stop
        );
    }
}
