use thiserror::Error;

/// Taxonomy of expected, recoverable failure modes inside the CORE.
///
/// Adapter-boundary errors (`ImportError`/`ExportError`) are not part of this
/// enum: they live in `cartography-io`, which owns the adapter boundary.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("invalid titer string: '{0}'")]
    InvalidTiter(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("chart is read-only")]
    ChartReadOnly,

    #[error("serum coverage error for serum {serum}: {reason}")]
    SerumCoverageError {
        serum: usize,
        reason: SerumCoverageReason,
    },

    #[error("optimization failed: {0}")]
    OptimizationFailed(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Why a serum-circle radius could not be computed for a given antigen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SerumCoverageReason {
    #[error("homologous titer is not a regular titer")]
    NonRegularHomologousTiter,
    #[error("protection boundary titer is too low, protects everything")]
    TiterTooLow,
}

pub type Result<T> = std::result::Result<T, Error>;
