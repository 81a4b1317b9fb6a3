use uuid::Uuid;

/// Failure talking to the time-series store. Never fatal to a reconciliation
/// pass: the query that produced it is treated as empty.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("influx returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("influx statement error: {0}")]
    Statement(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Server-side and connection failures may clear up; a rejected query won't.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500,
            Self::Statement(_) | Self::Other(_) => false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("building {0} has no time-series database configured")]
    MissingDatabase(Uuid),
    #[error("building {0} not found")]
    BuildingNotFound(Uuid),
    #[error("unit {0} not found")]
    UnitNotFound(Uuid),
    #[error("meter {0} not found")]
    MeterNotFound(Uuid),
    #[error("operation cancelled")]
    Cancelled,
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}
