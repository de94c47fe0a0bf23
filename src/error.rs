use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("invalid collection name: '{0}'")]
    InvalidCollectionName(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("unique constraint violated: field '{field}' value already exists")]
    UniqueViolation { field: String },

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("document must be a JSON object")]
    NotAnObject,
}

pub type Result<T> = std::result::Result<T, Error>;
