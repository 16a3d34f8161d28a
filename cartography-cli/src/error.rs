/// Top-level CLI error: anything a subcommand can fail with, collapsed to
/// one type so `main` only has to match on it once to pick an exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Import(#[from] cartography_io::ImportError),
    #[error("{0}")]
    Export(#[from] cartography_io::ExportError),
    #[error("{0}")]
    Core(#[from] cartography_core::error::Error),
    #[error("{0}")]
    Usage(String),
}
