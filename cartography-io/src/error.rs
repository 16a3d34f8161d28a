/// Errors reading a chart document (§6's import boundary).
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("malformed chart json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid chart data: {0}")]
    Chart(#[from] cartography_core::error::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Errors writing a chart document (§6's export boundary).
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to encode chart json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
