use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Revision conflict on {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Generic(String),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing field: {0}")]
    Missing(&'static str),

    #[error("Invalid username '{0}': expected 3-16 characters of letters, digits or '_'")]
    Username(String),

    #[error("Invalid uuid '{0}'")]
    Uuid(String),

    #[error("Unknown asset type '{0}'")]
    AssetKind(String),

    #[error("Asset is not a PNG image")]
    NotPng,

    #[error("Asset payload is not valid base64")]
    Base64,

    #[error("Invalid request body: {0}")]
    Body(String),

    #[error("Asset is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing admin key")]
    MissingKey,

    #[error("Invalid admin key")]
    InvalidKey,
}
