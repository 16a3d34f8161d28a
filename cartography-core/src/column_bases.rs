use std::str::FromStr;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{error::Error, table::TiterTable};

/// Floor applied to every computed column basis.
///
/// Three spellings are accepted: `"none"` (no floor), `"log2:<f>"` (an
/// already-logged floor, e.g. `"log2:5"`), or a bare raw titer such as
/// `"1280"`, parsed as `log2(v / 10)`. The `log2:` prefix removes the
/// ambiguity between "this is a raw titer" and "this is already a
/// log-titer" that a bare float would otherwise carry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MinimumColumnBasis {
    None,
    Value(f64),
}

impl Default for MinimumColumnBasis {
    fn default() -> Self {
        MinimumColumnBasis::None
    }
}

impl MinimumColumnBasis {
    fn floor(self) -> Option<f64> {
        match self {
            MinimumColumnBasis::None => None,
            MinimumColumnBasis::Value(v) => Some(v),
        }
    }
}

impl FromStr for MinimumColumnBasis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            return Ok(MinimumColumnBasis::None);
        }
        if let Some(rest) = s.strip_prefix("log2:") {
            let v: f64 = rest
                .parse()
                .map_err(|_| Error::InvalidData(format!("bad log2 minimum column basis: {s}")))?;
            return Ok(MinimumColumnBasis::Value(v));
        }
        let raw: u32 = s
            .parse()
            .map_err(|_| Error::InvalidData(format!("bad minimum column basis: {s}")))?;
        Ok(MinimumColumnBasis::Value((raw as f64 / 10.0).log2()))
    }
}

/// Per-serum reference log-titer, the zero-distance point for that serum
/// (spec.md §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnBases {
    values: Vec<f64>,
}

impl ColumnBases {
    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn column_basis(&self, serum: usize) -> f64 {
        self.values[serum]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Computed column basis: per serum, the largest
    /// `titer.logged_for_column_bases()` over all antigens, floored at
    /// `0.0` and then at `minimum` if it is higher (mirrors the
    /// source's `ComputedColumnBases`, whose accumulator starts at
    /// zero and only ever rises).
    pub fn compute(table: &TiterTable, minimum: MinimumColumnBasis) -> Self {
        let mut values = vec![0.0_f64; table.number_of_sera()];
        for (_, s, titer) in table.iter_non_dont_care() {
            let v = titer.logged_for_column_bases();
            if v > values[s] {
                values[s] = v;
            }
        }
        if let Some(floor) = minimum.floor() {
            for v in &mut values {
                if floor > *v {
                    *v = floor;
                }
            }
        }
        Self { values }
    }

    /// A chart's forced column bases, validated against `minimum`: any
    /// entry not dominating the minimum floor is logged as non-compliant
    /// by the caller (spec.md §4.3) and left as given — the minimum is
    /// advisory for forced bases, never silently overridden.
    pub fn forced(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Indices whose forced value does not dominate `minimum`.
    pub fn non_dominating(&self, minimum: MinimumColumnBasis) -> Vec<usize> {
        match minimum.floor() {
            None => Vec::new(),
            Some(floor) => self
                .values
                .iter()
                .enumerate()
                .filter(|(_, &v)| v < floor)
                .map(|(i, _)| i)
                .collect(),
        }
    }
}
