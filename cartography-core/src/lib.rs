//! Antigenic cartography core: titer model, stress function, optimization
//! pipeline, and the diagnostic/merge tools built on top of them.
//!
//! This crate has no file I/O and no CLI; it owns the in-memory data model
//! (`Chart`, `Projection`, `Layout`, ...) and the numerics over it. Chart
//! import/export adapters live in `cartography-io`; the command-line surface
//! lives in `cartography-cli`.

pub mod antigen;
pub mod avidity;
pub mod blobs;
pub mod bounding_ball;
pub mod chart;
pub mod column_bases;
pub mod common_match;
pub mod error;
pub mod layout;
pub mod map_resolution_test;
pub mod merge;
pub mod optimizer;
pub mod procrustes;
pub mod projection;
pub mod serum_circle;
pub mod stress;
pub mod table;
pub mod table_distances;
pub mod titer;
pub mod transformation;
