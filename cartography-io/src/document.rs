//! `serde_json` round-trip format for [`cartography_core::chart::Chart`].
//!
//! `Chart` itself carries a `RwLock` cache and keeps its antigen/serum/table
//! fields private, so it isn't `Serialize`/`Deserialize` directly (mirrors
//! the teacher's pattern of a plain DTO at the io boundary, e.g.
//! `gwas_catalog`'s record structs, rather than deriving serde on the
//! in-memory aggregate itself). This module defines that DTO and the two
//! conversions to and from it.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use cartography_core::{
    antigen::{Antigen, Serum},
    chart::{Chart, ChartInfo, PlotSpec},
    column_bases::{ColumnBases, MinimumColumnBasis},
    layout::Layout,
    projection::Projection,
    table::TiterTable,
    transformation::Transformation,
};

use crate::error::ImportError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransformationDocument {
    matrix: Vec<Vec<f64>>,
    translation: Vec<f64>,
}

fn transformation_to_document(t: &Transformation) -> TransformationDocument {
    let d = t.dimensions();
    let matrix = (0..d).map(|i| (0..d).map(|j| t.matrix()[(i, j)]).collect()).collect();
    let translation = t.translation().iter().copied().collect();
    TransformationDocument { matrix, translation }
}

fn transformation_from_document(doc: &TransformationDocument) -> Transformation {
    let d = doc.translation.len();
    let mut matrix = DMatrix::zeros(d, d);
    for i in 0..d {
        for j in 0..d {
            matrix[(i, j)] = doc.matrix[i][j];
        }
    }
    Transformation::new(matrix, DVector::from_vec(doc.translation.clone()))
}

fn layout_to_document(layout: &Layout) -> Vec<Vec<f64>> {
    (0..layout.number_of_points())
        .map(|p| layout.point(p).iter().copied().collect())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectionDocument {
    layout: Vec<Vec<f64>>,
    minimum_column_basis: MinimumColumnBasis,
    forced_column_bases: Option<ColumnBases>,
    transformation: TransformationDocument,
    dodgy_titer_is_regular: bool,
    mult_antigen_titer_until_column_adjust: bool,
    stress_diff_to_stop: Option<f64>,
    unmovable: Vec<usize>,
    disconnected: Vec<usize>,
    unmovable_in_last_dimension: Vec<usize>,
    avidity_adjusts: Vec<f64>,
    comment: Option<String>,
    cancelled: bool,
}

fn projection_to_document(projection: &Projection) -> ProjectionDocument {
    ProjectionDocument {
        layout: layout_to_document(projection.layout()),
        minimum_column_basis: projection.minimum_column_basis,
        forced_column_bases: projection.forced_column_bases.clone(),
        transformation: transformation_to_document(&projection.transformation),
        dodgy_titer_is_regular: projection.dodgy_titer_is_regular,
        mult_antigen_titer_until_column_adjust: projection.mult_antigen_titer_until_column_adjust,
        stress_diff_to_stop: projection.stress_diff_to_stop,
        unmovable: projection.unmovable().iter().copied().collect(),
        disconnected: projection.disconnected().iter().copied().collect(),
        unmovable_in_last_dimension: projection.unmovable_in_last_dimension().iter().copied().collect(),
        avidity_adjusts: projection.avidity_adjusts().to_vec(),
        comment: projection.comment.clone(),
        cancelled: projection.cancelled,
    }
}

fn projection_from_document(doc: ProjectionDocument) -> Projection {
    let layout = Layout::from_rows(doc.layout);
    let mut projection = Projection::new(layout, doc.minimum_column_basis);
    projection.forced_column_bases = doc.forced_column_bases;
    projection.transformation = transformation_from_document(&doc.transformation);
    projection.dodgy_titer_is_regular = doc.dodgy_titer_is_regular;
    projection.mult_antigen_titer_until_column_adjust = doc.mult_antigen_titer_until_column_adjust;
    projection.stress_diff_to_stop = doc.stress_diff_to_stop;
    projection.set_unmovable(doc.unmovable.into_iter().collect());
    projection.set_disconnected(doc.disconnected.into_iter().collect());
    projection.set_unmovable_in_last_dimension(doc.unmovable_in_last_dimension.into_iter().collect());
    projection.set_avidity_adjusts(doc.avidity_adjusts);
    projection.comment = doc.comment;
    projection.cancelled = doc.cancelled;
    projection
}

/// On-disk shape of a chart (spec.md §3): info, antigens, sera, the merged
/// titer table, optional forced column bases, every stored projection, and
/// the opaque plot spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartDocument {
    info: ChartInfo,
    antigens: Vec<Antigen>,
    sera: Vec<Serum>,
    table: TiterTable,
    forced_column_bases: Option<ColumnBases>,
    projections: Vec<ProjectionDocument>,
    plot_spec: PlotSpec,
}

impl ChartDocument {
    pub fn from_chart(chart: &Chart) -> Self {
        Self {
            info: chart.info.clone(),
            antigens: chart.antigens().to_vec(),
            sera: chart.sera().to_vec(),
            table: chart.table().clone(),
            forced_column_bases: chart.forced_column_bases.clone(),
            projections: chart.projections().iter().map(projection_to_document).collect(),
            plot_spec: chart.plot_spec.clone(),
        }
    }

    pub fn into_chart(self) -> Result<Chart, ImportError> {
        let mut chart = Chart::new(self.info, self.antigens, self.sera, self.table)?;
        chart.forced_column_bases = self.forced_column_bases;
        chart.plot_spec = self.plot_spec;
        for doc in self.projections {
            chart.projections_mut().push(projection_from_document(doc));
        }
        Ok(chart)
    }
}

/// Serializes a chart to pretty-printed JSON (spec.md §6's export boundary).
pub fn to_string(chart: &Chart) -> Result<String, crate::error::ExportError> {
    Ok(serde_json::to_string_pretty(&ChartDocument::from_chart(chart))?)
}

/// Parses a chart previously written by [`to_string`].
pub fn from_str(s: &str) -> Result<Chart, ImportError> {
    let doc: ChartDocument = serde_json::from_str(s)?;
    doc.into_chart()
}
