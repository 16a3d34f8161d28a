use std::{
    collections::HashMap,
    io::{self, Write},
    sync::RwLock,
};

use serde::{Deserialize, Serialize};

use crate::{
    antigen::{Antigen, Lineage, NamedPoint, Serum},
    column_bases::{ColumnBases, MinimumColumnBasis},
    error::{Error, Result},
    optimizer::{self, MultiStartOptions},
    projection::{Projection, Recalculate},
    serum_circle::{self, AntigenSample, EmpiricalRadiusResult},
    stress::Stress,
    table::TiterTable,
    titer::Titer,
};

/// Free-text chart metadata (spec.md §3): nothing here feeds the numerics,
/// it only travels with the chart for display and round-tripping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartInfo {
    pub virus: Option<String>,
    pub virus_type: Option<String>,
    pub assay: Option<String>,
    pub lab: Option<String>,
    pub rbc_species: Option<String>,
    pub dates: Vec<String>,
    pub source_tables: Vec<String>,
}

/// Opaque styling metadata (point shapes/colors, viewport). A chart owns it
/// so round-trips through the io adapters don't lose it, but nothing in
/// `cartography-core` interprets the keys (spec.md §9's plot-spec note).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotSpec {
    pub styles: HashMap<String, String>,
    pub drawing_order: Vec<usize>,
}

/// How strictly `Chart::set_homologous` matches antigens to a serum's raising
/// strain (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomologousOptions {
    /// Passage (or, if blank, egg/non-egg category) must match exactly.
    Strict,
    /// Falls back to egg/non-egg category, but an antigen already claimed
    /// strictly by another serum is not offered again.
    RelaxedStrict,
    /// Falls back to egg/non-egg category with no exclusivity.
    Relaxed,
    /// Every name/reassortant/annotation match, regardless of passage.
    All,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum ColumnBasisCacheKey {
    None,
    Value(ordered_float::OrderedFloat<f64>),
}

fn cache_key(minimum: MinimumColumnBasis) -> ColumnBasisCacheKey {
    match minimum {
        MinimumColumnBasis::None => ColumnBasisCacheKey::None,
        MinimumColumnBasis::Value(v) => ColumnBasisCacheKey::Value(ordered_float::OrderedFloat(v)),
    }
}

/// The central aggregate (spec.md §3, §4.8): antigens, sera, the merged titer
/// table, and every projection computed against them. Column bases are
/// cached per `MinimumColumnBasis` the first time they're asked for; the
/// cache lives behind a `RwLock` since relax/grid-test/blobs read it from
/// multiple worker threads at once (spec.md §5).
#[derive(Debug)]
pub struct Chart {
    pub info: ChartInfo,
    antigens: Vec<Antigen>,
    sera: Vec<Serum>,
    table: TiterTable,
    pub forced_column_bases: Option<ColumnBases>,
    projections: Vec<Projection>,
    pub plot_spec: PlotSpec,
    column_basis_cache: RwLock<HashMap<ColumnBasisCacheKey, ColumnBases>>,
}

impl Clone for Chart {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            antigens: self.antigens.clone(),
            sera: self.sera.clone(),
            table: self.table.clone(),
            forced_column_bases: self.forced_column_bases.clone(),
            projections: self.projections.clone(),
            plot_spec: self.plot_spec.clone(),
            column_basis_cache: RwLock::new(self.column_basis_cache.read().unwrap().clone()),
        }
    }
}

impl Chart {
    pub fn new(info: ChartInfo, antigens: Vec<Antigen>, sera: Vec<Serum>, table: TiterTable) -> Result<Self> {
        if antigens.is_empty() || sera.is_empty() {
            return Err(Error::InvalidData("chart needs at least one antigen and one serum".into()));
        }
        if table.number_of_antigens() != antigens.len() || table.number_of_sera() != sera.len() {
            return Err(Error::InvalidData("titer table shape does not match antigen/serum counts".into()));
        }
        Ok(Self {
            info,
            antigens,
            sera,
            table,
            forced_column_bases: None,
            projections: Vec::new(),
            plot_spec: PlotSpec::default(),
            column_basis_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn antigens(&self) -> &[Antigen] {
        &self.antigens
    }
    pub fn sera(&self) -> &[Serum] {
        &self.sera
    }
    pub fn table(&self) -> &TiterTable {
        &self.table
    }
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }
    pub fn projections_mut(&mut self) -> &mut Vec<Projection> {
        &mut self.projections
    }
    pub fn number_of_antigens(&self) -> usize {
        self.antigens.len()
    }
    pub fn number_of_sera(&self) -> usize {
        self.sera.len()
    }
    pub fn number_of_points(&self) -> usize {
        self.antigens.len() + self.sera.len()
    }
    pub fn remove_antigens_sera(&mut self, antigens_to_remove: &[usize], sera_to_remove: &[usize]) -> Result<()> {
        if self.antigens.len() - antigens_to_remove.len() == 0 || self.sera.len() - sera_to_remove.len() == 0 {
            return Err(Error::InvalidData("cannot remove every antigen or every serum".into()));
        }
        let keep_ag: Vec<usize> = (0..self.antigens.len()).filter(|a| !antigens_to_remove.contains(a)).collect();
        let keep_sr: Vec<usize> = (0..self.sera.len()).filter(|s| !sera_to_remove.contains(s)).collect();

        let mut table = TiterTable::new_dense(keep_ag.len(), keep_sr.len());
        for (new_a, &old_a) in keep_ag.iter().enumerate() {
            for (new_s, &old_s) in keep_sr.iter().enumerate() {
                table.set_titer(new_a, new_s, self.table.titer(old_a, old_s));
            }
        }
        self.antigens = keep_ag.iter().map(|&a| self.antigens[a].clone()).collect();
        self.sera = keep_sr.iter().map(|&s| self.sera[s].clone()).collect();
        self.table = table;
        self.projections.clear();
        self.column_basis_cache.write().unwrap().clear();
        Ok(())
    }

    /// Column bases for `minimum`, computed once and cached thereafter
    /// (spec.md §4.3). Pass `use_cache = false` to force a fresh pass, e.g.
    /// after the table itself changed without going through a `Chart`
    /// mutator that already clears the cache.
    pub fn computed_column_bases(&self, minimum: MinimumColumnBasis, use_cache: bool) -> ColumnBases {
        if !use_cache {
            return ColumnBases::compute(&self.table, minimum);
        }
        let key = cache_key(minimum);
        if let Some(existing) = self.column_basis_cache.read().unwrap().get(&key) {
            return existing.clone();
        }
        let computed = ColumnBases::compute(&self.table, minimum);
        self.column_basis_cache.write().unwrap().insert(key, computed.clone());
        computed
    }

    /// The column bases a given projection actually optimizes/reports
    /// against: its own forced values if set, else the chart's forced
    /// values if it has any, else the chart's computed ones for its
    /// `minimum_column_basis` (spec.md §3, §4.3, §4.7).
    pub fn column_bases_for_projection(&self, projection: &Projection) -> ColumnBases {
        let forced = projection.forced_column_bases.as_ref().or(self.forced_column_bases.as_ref());
        match forced {
            Some(forced) => {
                let bad = forced.non_dominating(projection.minimum_column_basis);
                if !bad.is_empty() {
                    log::warn!("{} forced column basis entries do not dominate the projection's minimum", bad.len());
                }
                forced.clone()
            }
            None => self.computed_column_bases(projection.minimum_column_basis, true),
        }
    }

    pub fn column_basis(&self, serum: usize, projection_no: usize) -> f64 {
        self.column_bases_for_projection(&self.projections[projection_no]).column_basis(serum)
    }

    /// The stress model a projection is actually judged against, assembled
    /// from the chart's table and that projection's resolved column bases
    /// (spec.md §4.5, §4.7).
    pub fn make_stress(&self, projection_no: usize) -> Stress {
        let projection = &self.projections[projection_no];
        let column_bases = self.column_bases_for_projection(projection);
        projection.stress_model(&self.table, &column_bases, self.antigens.len())
    }

    /// Stable sort of `projections` by stress ascending, recomputing any
    /// that don't already have a stored value (spec.md §4.6's append-then-
    /// sort contract: ties keep their relative append order).
    pub fn sort_projections_by_stress(&mut self) {
        let antigens = self.antigens.len();
        let mut decorated: Vec<(f64, Projection)> = std::mem::take(&mut self.projections)
            .into_iter()
            .map(|mut p| {
                let column_bases = self.column_bases_for_projection(&p);
                let stress = p.stress(&self.table, &column_bases, antigens, Recalculate::IfNecessary);
                (stress, p)
            })
            .collect();
        decorated.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        self.projections = decorated.into_iter().map(|(_, p)| p).collect();
    }

    /// Runs `multi_start` from `template` (a projection carrying the
    /// minimum-column-basis/flags/disconnect set to use), appends every
    /// resulting projection, and re-sorts the whole list by stress
    /// (spec.md §4.6, §4.7). `auto_disconnect_threshold`, if set, is applied
    /// to `template` before any optimization runs.
    pub fn relax(&mut self, mut template: Projection, options: &MultiStartOptions, auto_disconnect_threshold: Option<usize>) {
        if let Some(threshold) = auto_disconnect_threshold {
            template.apply_auto_disconnect(&self.table, threshold);
        }
        let column_bases = self.column_bases_for_projection(&template);
        let stress = template.stress_model(&self.table, &column_bases, self.antigens.len());
        let max_table_distance = optimizer::max_table_distance(&self.table, &column_bases);

        let outcomes = optimizer::multi_start(&stress, self.number_of_points(), max_table_distance, options);
        for outcome in outcomes {
            let mut projection = template.clone();
            projection.set_layout(outcome.layout);
            projection.cancelled = outcome.cancelled;
            projection.stress(&self.table, &column_bases, self.antigens.len(), Recalculate::Yes);
            self.projections.push(projection);
        }
        self.sort_projections_by_stress();
    }

    pub fn serum_circle_radius_theoretical(&self, projection_no: usize, serum: usize, fold: f64) -> Result<f64> {
        let homologous = self.sera[serum]
            .homologous_antigens
            .first()
            .copied()
            .ok_or_else(|| Error::InvalidData(format!("serum {serum} has no homologous antigen")))?;
        let titer = self.table.titer(homologous, serum);
        let column_bases = self.column_bases_for_projection(&self.projections[projection_no]);
        serum_circle::theoretical_radius(&column_bases, serum, titer, fold)
    }

    pub fn serum_circle_radius_empirical(&self, projection_no: usize, serum: usize, fold: f64) -> Result<EmpiricalRadiusResult> {
        let homologous = self.sera[serum]
            .homologous_antigens
            .first()
            .copied()
            .ok_or_else(|| Error::InvalidData(format!("serum {serum} has no homologous antigen")))?;
        let homologous_titer = self.table.titer(homologous, serum);
        let projection = &self.projections[projection_no];
        let layout = projection.layout();
        let serum_point = self.antigens.len() + serum;
        let samples: Vec<AntigenSample> = (0..self.antigens.len())
            .map(|a| AntigenSample {
                distance_from_serum: layout.distance(a, serum_point),
                titer: self.table.titer(a, serum),
            })
            .collect();
        serum_circle::empirical_radius(&self.column_bases_for_projection(projection), serum, homologous_titer, &samples, fold)
    }

    /// Whether a candidate antigen's passage matches `serum`'s category
    /// (spec.md §4.8): exact passage match if the serum's passage is known,
    /// otherwise just egg/non-egg category via `Serum::is_egg`.
    fn strict_match(&self, antigen: &Antigen, serum: &Serum) -> bool {
        if serum.passage.is_empty() {
            antigen.is_egg() == serum.is_egg()
        } else {
            antigen.passage == serum.passage
        }
    }

    /// Recomputes every serum's `homologous_antigens` (spec.md §4.8). Modes
    /// from strictest to loosest: `Strict` (passage/category only),
    /// `RelaxedStrict`/`Relaxed` (category fallback, the former excluding
    /// antigens already claimed strictly by an earlier serum), `All` (any
    /// name/reassortant/annotation match regardless of passage).
    pub fn set_homologous(&mut self, options: HomologousOptions) {
        let candidates_per_serum: Vec<Vec<usize>> = self
            .sera
            .iter()
            .map(|serum| {
                self.antigens
                    .iter()
                    .enumerate()
                    .filter(|(_, antigen)| {
                        antigen.name() == serum.name()
                            && antigen.reassortant() == serum.reassortant()
                            && antigen.matching_annotations() == serum.matching_annotations()
                            && !antigen.is_distinct()
                            && !serum.is_distinct()
                    })
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect();

        let mut claimed_strictly = std::collections::HashSet::new();
        for (serum_index, candidates) in candidates_per_serum.iter().enumerate() {
            let serum = &self.sera[serum_index];
            let strict: Vec<usize> = candidates.iter().copied().filter(|&a| self.strict_match(&self.antigens[a], serum)).collect();

            let chosen = match options {
                HomologousOptions::All => candidates.clone(),
                HomologousOptions::Strict => strict,
                HomologousOptions::RelaxedStrict | HomologousOptions::Relaxed => {
                    if !strict.is_empty() {
                        strict
                    } else {
                        let by_category: Vec<usize> = candidates
                            .iter()
                            .copied()
                            .filter(|&a| self.antigens[a].is_egg() == serum.is_egg())
                            .collect();
                        if options == HomologousOptions::RelaxedStrict {
                            by_category.into_iter().filter(|a| !claimed_strictly.contains(a)).collect()
                        } else {
                            by_category
                        }
                    }
                }
            };
            for &a in &chosen {
                claimed_strictly.insert(a);
            }
            self.sera[serum_index].homologous_antigens = chosen;
        }
    }

    /// Plurality lineage across antigens with a known lineage; `Unknown` if
    /// none is set or Victoria/Yamagata tie.
    pub fn lineage(&self) -> Lineage {
        let mut victoria = 0usize;
        let mut yamagata = 0usize;
        for antigen in &self.antigens {
            match antigen.lineage {
                Lineage::Victoria => victoria += 1,
                Lineage::Yamagata => yamagata += 1,
                Lineage::Unknown => {}
            }
        }
        if victoria == 0 && yamagata == 0 {
            Lineage::Unknown
        } else if victoria >= yamagata {
            Lineage::Victoria
        } else {
            Lineage::Yamagata
        }
    }

    pub fn description(&self) -> String {
        format!(
            "{} ({}x{}, {} titers, {} projection{})",
            self.info.virus.as_deref().unwrap_or("unnamed chart"),
            self.antigens.len(),
            self.sera.len(),
            self.table.number_of_non_dont_cares(),
            self.projections.len(),
            if self.projections.len() == 1 { "" } else { "s" }
        )
    }

    /// Writes the (merged, or one source layer's) titer matrix as
    /// tab-separated text, antigen names down the left and serum names
    /// across the top.
    pub fn show_table(&self, out: &mut impl Write, layer: Option<usize>) -> io::Result<()> {
        write!(out, "\t")?;
        for serum in &self.sera {
            write!(out, "\t{}", serum.full_name())?;
        }
        writeln!(out)?;
        for (a, antigen) in self.antigens.iter().enumerate() {
            write!(out, "{}", antigen.full_name())?;
            for s in 0..self.sera.len() {
                let titer: Titer = match layer {
                    Some(layer) => self.table.titer_of_layer(layer, a, s),
                    None => self.table.titer(a, s),
                };
                write!(out, "\t{titer}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}
