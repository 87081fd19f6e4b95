use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The local store could not be opened or its connection is unusable.
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A single local mutation did not persist. The caller may retry.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    /// The remote catalog could not be fetched (network, auth or timeout).
    #[error("Remote catalog unreachable: {0}")]
    RemoteUnreachable(String),

    /// An outbound remote write failed. Only ever logged.
    #[error("Remote write failed: {0}")]
    RemoteWriteFailed(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Payment error: {0}")]
    Payment(String),

    #[error("Checkout error: {0}")]
    Checkout(String),
}

impl serde::Serialize for CatalogError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_as_message() {
        let err = CatalogError::WriteFailed("no row with id 7".into());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Write failed: no row with id 7\"");
    }
}
