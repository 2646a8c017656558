use thiserror::Error;

/// Failures surfaced by the prediction league core.
///
/// Lifecycle and selection errors are recoverable and map to client errors at the HTTP boundary;
/// storage errors are passed through as-is.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    InvalidSelection(String),

    #[error("{0}")]
    Validation(String),

    /// A request body that could not be read as the expected JSON.
    #[error("{0}")]
    InvalidBody(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("admin access required")]
    Forbidden,

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn not_found(entity: &'static str, id: i32) -> Self {
        Error::NotFound { entity, id }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
