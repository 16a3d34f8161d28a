use std::collections::BTreeMap;

use either::Either;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{error::Error, titer::Titer};

/// One antigen x serum grid of titers, dense or sparse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Storage {
    /// Row-major, `antigens` rows of `sera` entries each.
    Dense(Vec<Vec<Titer>>),
    /// Only present (non-`DontCare`) titers, per antigen row.
    Sparse(Vec<BTreeMap<usize, Titer>>),
}

impl Storage {
    fn get(&self, antigens: usize, sera: usize, a: usize, s: usize) -> Titer {
        assert!(a < antigens && s < sera, "point index out of range");
        match self {
            Storage::Dense(rows) => rows[a][s],
            Storage::Sparse(rows) => rows[a].get(&s).copied().unwrap_or(Titer::DontCare),
        }
    }

    fn row_len_ok(&self, antigens: usize, sera: usize) -> bool {
        match self {
            Storage::Dense(rows) => rows.len() == antigens && rows.iter().all(|r| r.len() == sera),
            Storage::Sparse(rows) => {
                rows.len() == antigens && rows.iter().all(|r| r.keys().all(|&s| s < sera))
            }
        }
    }

    fn iter_non_dont_care(
        &self,
    ) -> Either<impl Iterator<Item = (usize, usize, Titer)> + '_, impl Iterator<Item = (usize, usize, Titer)> + '_>
    {
        match self {
            Storage::Dense(rows) => Either::Left(rows.iter().enumerate().flat_map(|(a, row)| {
                row.iter()
                    .enumerate()
                    .filter(|(_, t)| !t.is_dont_care())
                    .map(move |(s, t)| (a, s, *t))
            })),
            Storage::Sparse(rows) => Either::Right(
                rows.iter()
                    .enumerate()
                    .flat_map(|(a, row)| row.iter().map(move |(&s, &t)| (a, s, t))),
            ),
        }
    }
}

/// Dense or sparse antigen x serum titer matrix, with optional source-table
/// layers (spec.md §3, §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiterTable {
    antigens: usize,
    sera: usize,
    storage: Storage,
    /// Source tables prior to merging, same shape as `storage`.
    layers: Vec<Storage>,
}

impl TiterTable {
    pub fn new_dense(antigens: usize, sera: usize) -> Self {
        Self {
            antigens,
            sera,
            storage: Storage::Dense(vec![vec![Titer::DontCare; sera]; antigens]),
            layers: Vec::new(),
        }
    }

    pub fn new_sparse(antigens: usize, sera: usize) -> Self {
        Self {
            antigens,
            sera,
            storage: Storage::Sparse(vec![BTreeMap::new(); antigens]),
            layers: Vec::new(),
        }
    }

    pub fn from_storage(
        antigens: usize,
        sera: usize,
        storage: Storage,
        layers: Vec<Storage>,
    ) -> crate::error::Result<Self> {
        if !storage.row_len_ok(antigens, sera) {
            return Err(Error::InvalidData(
                "titer table storage shape does not match (antigens, sera)".into(),
            ));
        }
        for layer in &layers {
            if !layer.row_len_ok(antigens, sera) {
                return Err(Error::InvalidData(
                    "titer table layer shape does not match (antigens, sera)".into(),
                ));
            }
        }
        Ok(Self {
            antigens,
            sera,
            storage,
            layers,
        })
    }

    /// Builds the merged matrix from layers: the merged cell takes the
    /// first non-`DontCare` value in layer order (see SPEC_FULL.md §G).
    pub fn merged_from_layers(
        antigens: usize,
        sera: usize,
        layers: Vec<Storage>,
    ) -> crate::error::Result<Self> {
        let mut merged = vec![vec![Titer::DontCare; sera]; antigens];
        for layer in &layers {
            for a in 0..antigens {
                for s in 0..sera {
                    if merged[a][s].is_dont_care() {
                        let t = layer.get(antigens, sera, a, s);
                        if !t.is_dont_care() {
                            merged[a][s] = t;
                        }
                    }
                }
            }
        }
        Self::from_storage(antigens, sera, Storage::Dense(merged), layers)
    }

    pub fn number_of_antigens(&self) -> usize {
        self.antigens
    }
    pub fn number_of_sera(&self) -> usize {
        self.sera
    }
    pub fn number_of_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn titer(&self, a: usize, s: usize) -> Titer {
        self.storage.get(self.antigens, self.sera, a, s)
    }

    pub fn titer_of_layer(&self, layer: usize, a: usize, s: usize) -> Titer {
        self.layers[layer].get(self.antigens, self.sera, a, s)
    }

    pub fn iter_non_dont_care(&self) -> impl Iterator<Item = (usize, usize, Titer)> + '_ {
        self.storage.iter_non_dont_care()
    }

    pub fn iter_non_dont_care_of_layer(
        &self,
        layer: usize,
    ) -> impl Iterator<Item = (usize, usize, Titer)> + '_ {
        self.layers[layer].iter_non_dont_care()
    }

    pub fn number_of_non_dont_cares(&self) -> usize {
        self.iter_non_dont_care().count()
    }

    /// Antigen and serum indices actually present (non-`DontCare`) in a
    /// given layer.
    pub fn antigens_sera_of_layer(&self, layer: usize) -> (Vec<usize>, Vec<usize>) {
        let mut ags = std::collections::BTreeSet::new();
        let mut sra = std::collections::BTreeSet::new();
        for (a, s, _) in self.iter_non_dont_care_of_layer(layer) {
            ags.insert(a);
            sra.insert(s);
        }
        (ags.into_iter().collect(), sra.into_iter().collect())
    }

    /// Point indices (in the unified `[0, antigens+sera)` numbering) with
    /// fewer than `threshold` Regular titers against the other side.
    /// Used to auto-disconnect poorly-connected points before optimization.
    pub fn having_too_few_numeric_titers(&self, threshold: usize) -> Vec<usize> {
        let mut antigen_counts = vec![0usize; self.antigens];
        let mut serum_counts = vec![0usize; self.sera];
        for (a, s, t) in self.iter_non_dont_care() {
            if t.is_regular() {
                antigen_counts[a] += 1;
                serum_counts[s] += 1;
            }
        }
        let mut out = Vec::new();
        for (a, &c) in antigen_counts.iter().enumerate() {
            if c < threshold {
                out.push(a);
            }
        }
        for (s, &c) in serum_counts.iter().enumerate() {
            if c < threshold {
                out.push(self.antigens + s);
            }
        }
        out
    }

    /// Randomized cross-validation helper: returns a copy with a `p`
    /// fraction of Regular titers replaced by `DontCare`, using `rng`
    /// (deterministic given a seeded rng).
    pub fn set_proportion_of_titers_to_dont_care(
        &self,
        p: f64,
        rng: &mut impl Rng,
    ) -> (Self, Vec<(usize, usize, Titer)>) {
        assert!((0.0..=1.0).contains(&p));
        let mut removed = Vec::new();
        let storage = match &self.storage {
            Storage::Dense(rows) => {
                let mut rows = rows.clone();
                for (a, row) in rows.iter_mut().enumerate() {
                    for (s, t) in row.iter_mut().enumerate() {
                        if t.is_regular() && rng.random::<f64>() < p {
                            removed.push((a, s, *t));
                            *t = Titer::DontCare;
                        }
                    }
                }
                Storage::Dense(rows)
            }
            Storage::Sparse(rows) => {
                let mut rows = rows.clone();
                for (a, row) in rows.iter_mut().enumerate() {
                    let to_remove: Vec<usize> = row
                        .iter()
                        .filter(|(_, t)| t.is_regular())
                        .filter(|_| rng.random::<f64>() < p)
                        .map(|(&s, _)| s)
                        .collect();
                    for s in to_remove {
                        if let Some(t) = row.remove(&s) {
                            removed.push((a, s, t));
                        }
                    }
                }
                Storage::Sparse(rows)
            }
        };
        (
            Self {
                antigens: self.antigens,
                sera: self.sera,
                storage,
                layers: self.layers.clone(),
            },
            removed,
        )
    }

    pub fn set_titer(&mut self, a: usize, s: usize, titer: Titer) {
        assert!(a < self.antigens && s < self.sera);
        match &mut self.storage {
            Storage::Dense(rows) => rows[a][s] = titer,
            Storage::Sparse(rows) => {
                if titer.is_dont_care() {
                    rows[a].remove(&s);
                } else {
                    rows[a].insert(s, titer);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    fn small_table() -> TiterTable {
        // S2: 2 antigens, 2 sera, [[40,<20],[80,*]]
        let mut t = TiterTable::new_dense(2, 2);
        t.set_titer(0, 0, "40".parse().unwrap());
        t.set_titer(0, 1, "<20".parse().unwrap());
        t.set_titer(1, 0, "80".parse().unwrap());
        t.set_titer(1, 1, "*".parse().unwrap());
        t
    }

    #[test]
    fn all_dont_care_has_zero_non_dont_cares() {
        let t = TiterTable::new_dense(3, 3);
        assert_eq!(t.number_of_non_dont_cares(), 0);
    }

    #[test]
    fn having_too_few_numeric_titers() {
        let t = small_table();
        // antigen 0: 2 regular-ish titers but only "40" and "80" are Regular, <20 is not.
        // antigen 0 has 1 regular (against serum 0), antigen 1 has 1 regular.
        // serum 0 has 2 regular, serum 1 has 0 regular.
        let few = t.having_too_few_numeric_titers(3);
        assert!(few.contains(&0)); // antigen 0 point index
        assert!(few.contains(&1)); // antigen 1 point index
        assert!(few.contains(&t.number_of_antigens() + 1)); // serum 1
    }

    #[test]
    fn merged_from_layers_takes_first_non_dont_care() {
        let mut l1 = vec![vec![Titer::DontCare; 2]; 2];
        l1[0][0] = "40".parse().unwrap();
        let mut l2 = vec![vec![Titer::DontCare; 2]; 2];
        l2[0][0] = "80".parse().unwrap();
        l2[0][1] = "<20".parse().unwrap();

        let merged =
            TiterTable::merged_from_layers(2, 2, vec![Storage::Dense(l1), Storage::Dense(l2)])
                .unwrap();
        assert_eq!(merged.titer(0, 0), "40".parse().unwrap()); // layer 1 wins
        assert_eq!(merged.titer(0, 1), "<20".parse().unwrap()); // only layer 2 has it
        assert_eq!(merged.number_of_layers(), 2);
    }

    #[test]
    fn set_proportion_to_dont_care_is_deterministic_given_seed() {
        let t = small_table();
        let mut rng1 = SmallRng::seed_from_u64(42);
        let mut rng2 = SmallRng::seed_from_u64(42);
        let (t1, r1) = t.set_proportion_of_titers_to_dont_care(0.5, &mut rng1);
        let (t2, r2) = t.set_proportion_of_titers_to_dont_care(0.5, &mut rng2);
        assert_eq!(t1, t2);
        assert_eq!(r1, r2);
    }
}
