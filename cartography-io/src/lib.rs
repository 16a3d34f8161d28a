//! `serde_json` Chart import/export adapter (SPEC_FULL.md §A).
//!
//! Stands in for the ACD1/ACE/lispmds/CSV/HTML adapters named in spec.md §6,
//! which stay out of scope; this is the one concrete format that exercises
//! `cartography-core`'s adapter-facing contract end to end.

pub mod document;
pub mod error;

pub use document::{from_str, to_string, ChartDocument};
pub use error::{ExportError, ImportError};
