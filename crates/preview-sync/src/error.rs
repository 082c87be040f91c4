use preview_core::{CatalogError, RecordError};
use preview_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("branch '{branch}' does not contain any letters or digits to build a preview slug from")]
    EmptySlug { branch: String },

    #[error("service catalog '{path}' does not exist in the configuration repository")]
    CatalogNotFound { path: String },

    #[error("service catalog '{path}' could not be fetched")]
    CatalogUnavailable {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("service catalog '{path}' is malformed")]
    MalformedCatalog {
        path: String,
        #[source]
        source: CatalogError,
    },

    #[error("service '{service}' is not in the service catalog (known services: {known})")]
    ServiceNotInCatalog { service: String, known: String },

    #[error("preview record '{path}' could not be read")]
    MalformedRecord {
        path: String,
        #[source]
        source: RecordError,
    },

    #[error("preview record '{path}' could not be serialized")]
    EncodeRecord {
        path: String,
        #[source]
        source: RecordError,
    },

    #[error(
        "the configuration repository refused access; the token needs read and write access to repository contents"
    )]
    Forbidden {
        #[source]
        source: StoreError,
    },

    #[error("gave up on '{path}' after {attempts} attempts; each write lost to a concurrent update")]
    RetriesExhausted { path: String, attempts: u32 },

    #[error(transparent)]
    Store(StoreError),
}

impl DeployError {
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::Forbidden { .. } => Self::Forbidden { source: err },
            other => Self::Store(other),
        }
    }

    pub(crate) fn not_in_catalog(service: &str, catalog: &[String]) -> Self {
        let known = if catalog.is_empty() {
            "none".to_string()
        } else {
            catalog.join(", ")
        };
        Self::ServiceNotInCatalog {
            service: service.to_string(),
            known,
        }
    }
}
