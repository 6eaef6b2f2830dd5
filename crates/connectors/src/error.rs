use sync_core::gate::GateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object store I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Object '{0}' not found")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("CSV feed could not be read: {0}")]
    Read(#[from] csv::Error),

    #[error("CSV feed has no header row")]
    MissingHeader,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Invalid catalog base URL '{0}'")]
    InvalidBaseUrl(String),

    #[error("Catalog transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Catalog returned HTTP {status} for {context}")]
    Status { status: u16, context: String },

    #[error("Catalog call cancelled")]
    Cancelled,
}

impl CatalogError {
    /// HTTP status of the failure, when the remote answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::Status { status, .. } => Some(*status),
            CatalogError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Transport-level failures worth retrying: timeouts, refused or reset
    /// connections, bodies that die mid-read. Builder, redirect and decode
    /// errors are programming or contract problems and are final.
    pub fn is_transient_transport(&self) -> bool {
        match self {
            CatalogError::Transport(e) => {
                !(e.is_builder() || e.is_decode() || e.is_redirect() || e.is_status())
            }
            _ => false,
        }
    }
}

impl From<GateError<CatalogError>> for CatalogError {
    fn from(err: GateError<CatalogError>) -> Self {
        match err {
            GateError::Cancelled => CatalogError::Cancelled,
            GateError::Task(inner) => inner,
        }
    }
}
