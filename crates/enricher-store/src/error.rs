use enricher_core::PortError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("artifact too large: {actual} bytes exceeds {max}")]
    TooLarge { max: usize, actual: usize },

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for PortError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => PortError::NotFound(what),
            StoreError::TooLarge { max, actual } => PortError::TooLarge { max, actual },
            StoreError::CorruptRow { .. } | StoreError::Serialization(_) => {
                PortError::Corrupt(e.to_string())
            }
            StoreError::Database(_) | StoreError::Io(_) => PortError::Unavailable(e.to_string()),
        }
    }
}
