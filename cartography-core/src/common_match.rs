use std::collections::HashSet;

use crate::antigen::NamedPoint;

/// How good a candidate pairing is (spec.md §4.12), from worst to best so a
/// derived `Ord` sorts candidates best-first when reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchScore {
    NoMatch,
    /// `passage_serum_id_ignored`: name/reassortant/annotations agree, but
    /// nothing about passage or serum id was used to decide that.
    Ignored,
    /// Passage differs but both sides agree on egg vs. cell/other passage.
    Egg,
    /// Passage strings differ only by a trailing collection-date suffix.
    WithoutDate,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchLevel {
    Strict,
    Relaxed,
    Ignored,
    Automatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonMatch {
    pub primary: usize,
    pub secondary: usize,
    pub score: MatchScore,
}

/// Strips a trailing `(YYYY-MM-DD)`-shaped date annotation so two passages
/// that differ only by a collection date compare equal.
fn passage_key(passage: &str) -> &str {
    let trimmed = passage.trim_end();
    if let Some(rest) = trimmed.strip_suffix(')') {
        if let Some(open) = rest.rfind('(') {
            let inside = &rest[open + 1..];
            let looks_like_date = inside.len() == 10
                && inside.as_bytes()[4] == b'-'
                && inside.as_bytes()[7] == b'-'
                && inside.chars().enumerate().all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
            if looks_like_date {
                return rest[..open].trim_end();
            }
        }
    }
    trimmed
}

/// Trait requirement for anything `common_match` can pair up: a
/// `NamedPoint` (name/reassortant/annotations) plus the passage/egg fields
/// that distinguish records otherwise sharing that identity.
pub trait MatchCandidate: NamedPoint {
    fn is_egg_candidate(&self) -> bool;
}

impl MatchCandidate for crate::antigen::Antigen {
    fn is_egg_candidate(&self) -> bool {
        self.is_egg()
    }
}

impl MatchCandidate for crate::antigen::Serum {
    fn is_egg_candidate(&self) -> bool {
        self.is_egg()
    }
}

fn score_pair(primary: &impl MatchCandidate, secondary: &impl MatchCandidate) -> MatchScore {
    if primary.is_distinct() || secondary.is_distinct() {
        return MatchScore::NoMatch;
    }
    if primary.name() != secondary.name() || primary.reassortant() != secondary.reassortant() || primary.matching_annotations() != secondary.matching_annotations() {
        return MatchScore::NoMatch;
    }
    let p1 = primary.passage_or_serum_id();
    let p2 = secondary.passage_or_serum_id();
    if !p1.is_empty() && p1 == p2 {
        return MatchScore::Full;
    }
    if !p1.is_empty() && !p2.is_empty() && passage_key(p1) == passage_key(p2) {
        return MatchScore::WithoutDate;
    }
    if primary.is_egg_candidate() == secondary.is_egg_candidate() {
        return MatchScore::Egg;
    }
    MatchScore::Ignored
}

/// Builds every candidate `(primary_index, secondary_index)` pair that
/// shares name/reassortant/annotations identity, scored individually.
fn candidates<T: MatchCandidate>(primary: &[T], secondary: &[T]) -> Vec<(usize, usize, MatchScore)> {
    let mut out = Vec::new();
    for (i, p) in primary.iter().enumerate() {
        for (j, s) in secondary.iter().enumerate() {
            let score = score_pair(p, s);
            if score != MatchScore::NoMatch {
                out.push((i, j, score));
            }
        }
    }
    out
}

/// Greedy best-score-first bipartite assignment: every primary/secondary
/// index is used at most once (spec.md §4.12's "each record participates in
/// at most one match").
fn greedy_assign(mut candidates: Vec<(usize, usize, MatchScore)>) -> Vec<(usize, usize, MatchScore)> {
    candidates.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));
    let mut used_primary = HashSet::new();
    let mut used_secondary = HashSet::new();
    let mut out = Vec::new();
    for (p, s, score) in candidates {
        if used_primary.contains(&p) || used_secondary.contains(&s) {
            continue;
        }
        used_primary.insert(p);
        used_secondary.insert(s);
        out.push((p, s, score));
    }
    out
}

/// Applies a `MatchLevel`'s acceptance gate to an already-greedy-assigned,
/// best-first list (spec.md §4.12). `Automatic` accepts every candidate
/// tied with the very best score, but never fewer than
/// `max(3, min(|primary|, |secondary|) / 10)` pairs even if that means
/// reaching into lower-scoring matches.
fn select(assigned: &[(usize, usize, MatchScore)], level: MatchLevel, primary_len: usize, secondary_len: usize) -> Vec<CommonMatch> {
    let as_matches = |slice: &[(usize, usize, MatchScore)]| {
        slice
            .iter()
            .map(|&(primary, secondary, score)| CommonMatch { primary, secondary, score })
            .collect()
    };
    match level {
        MatchLevel::Strict => as_matches(&assigned.iter().copied().filter(|&(_, _, s)| s == MatchScore::Full).collect::<Vec<_>>()),
        MatchLevel::Relaxed => as_matches(&assigned.iter().copied().filter(|&(_, _, s)| s >= MatchScore::Egg).collect::<Vec<_>>()),
        MatchLevel::Ignored => as_matches(&assigned.iter().copied().filter(|&(_, _, s)| s >= MatchScore::Ignored).collect::<Vec<_>>()),
        MatchLevel::Automatic => {
            if assigned.is_empty() {
                return Vec::new();
            }
            let best = assigned[0].2;
            let equal_to_best = assigned.iter().take_while(|&&(_, _, s)| s == best).count();
            let minimum = 3.max(primary_len.min(secondary_len) / 10);
            let take = equal_to_best.max(minimum).min(assigned.len());
            as_matches(&assigned[..take])
        }
    }
}

/// Matches `primary` against `secondary` (both antigens, or both sera) at
/// `level` (spec.md §4.12). Each record appears in at most one returned
/// pair.
pub fn match_points<T: MatchCandidate>(primary: &[T], secondary: &[T], level: MatchLevel) -> Vec<CommonMatch> {
    let assigned = greedy_assign(candidates(primary, secondary));
    select(&assigned, level, primary.len(), secondary.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antigen::Antigen;

    fn antigen(name: &str, passage: &str) -> Antigen {
        Antigen { name: name.into(), passage: passage.into(), ..Default::default() }
    }

    #[test]
    fn identical_passage_is_full_match() {
        let primary = vec![antigen("A/X/1/2020", "MDCK1")];
        let secondary = vec![antigen("A/X/1/2020", "MDCK1")];
        let matches = match_points(&primary, &secondary, MatchLevel::Strict);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, MatchScore::Full);
    }

    #[test]
    fn date_suffix_difference_is_without_date() {
        let primary = vec![antigen("A/X/1/2020", "MDCK1 (2020-03-01)")];
        let secondary = vec![antigen("A/X/1/2020", "MDCK1")];
        let matches = match_points(&primary, &secondary, MatchLevel::Relaxed);
        assert_eq!(matches[0].score, MatchScore::WithoutDate);
    }

    #[test]
    fn egg_vs_cell_is_not_strict() {
        let primary = vec![antigen("A/X/1/2020", "MDCK1")];
        let secondary = vec![antigen("A/X/1/2020", "EGG1")];
        assert!(match_points(&primary, &secondary, MatchLevel::Strict).is_empty());
        let relaxed = match_points(&primary, &secondary, MatchLevel::Ignored);
        assert_eq!(relaxed[0].score, MatchScore::Ignored);
    }

    #[test]
    fn different_name_never_matches() {
        let primary = vec![antigen("A/X/1/2020", "MDCK1")];
        let secondary = vec![antigen("A/Y/1/2020", "MDCK1")];
        assert!(match_points(&primary, &secondary, MatchLevel::Ignored).is_empty());
    }

    #[test]
    fn greedy_assignment_is_one_to_one() {
        let primary = vec![antigen("A/X/1/2020", "MDCK1"), antigen("A/X/1/2020", "MDCK2")];
        let secondary = vec![antigen("A/X/1/2020", "MDCK1")];
        let matches = match_points(&primary, &secondary, MatchLevel::Ignored);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].primary, 0);
    }

    #[test]
    fn automatic_keeps_a_minimum_count_even_with_low_scores() {
        let primary: Vec<Antigen> = (0..10).map(|i| antigen(&format!("A/X{i}/1/2020"), "MDCK1")).collect();
        let secondary: Vec<Antigen> = (0..10).map(|i| antigen(&format!("A/X{i}/1/2020"), "EGG1")).collect();
        let matches = match_points(&primary, &secondary, MatchLevel::Automatic);
        assert!(matches.len() >= 3);
    }
}
