use serde::{Deserialize, Serialize};

/// Serum-only annotation tags ignored when matching antigens to a serum's
/// homologous candidates (spec.md §4.8).
pub const SERUM_ONLY_ANNOTATIONS: &[&str] = &["CONC", "RDE@", "BOOST", "BLEED", "LAIV", "CDC"];

/// An antigen/serum annotation that marks the two records as never matching
/// each other during common-point discovery (spec.md §4.12).
pub const DISTINCT_ANNOTATION: &str = "DISTINCT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lineage {
    Unknown,
    Victoria,
    Yamagata,
}

impl Default for Lineage {
    fn default() -> Self {
        Lineage::Unknown
    }
}

/// Fields shared between antigens and sera, used to build the canonical
/// "full name" identity (spec.md §3).
pub trait NamedPoint {
    fn name(&self) -> &str;
    fn reassortant(&self) -> &str;
    fn annotations(&self) -> &[String];
    /// The passage (antigens) or serum id (sera): whichever disambiguates
    /// within a (name, reassortant, annotations) group.
    fn passage_or_serum_id(&self) -> &str;

    fn full_name(&self) -> String {
        let mut s = self.name().to_string();
        if !self.reassortant().is_empty() {
            s.push(' ');
            s.push_str(self.reassortant());
        }
        for a in self.annotations() {
            s.push(' ');
            s.push_str(a);
        }
        let extra = self.passage_or_serum_id();
        if !extra.is_empty() {
            s.push(' ');
            s.push_str(extra);
        }
        s
    }

    /// Annotations relevant to antigen/serum identity: `DISTINCT` aside,
    /// serum-only tags are stripped out first so two records that differ
    /// only in how the serum was handled still compare equal.
    fn matching_annotations(&self) -> Vec<&str> {
        self.annotations()
            .iter()
            .map(String::as_str)
            .filter(|a| !SERUM_ONLY_ANNOTATIONS.contains(a))
            .collect()
    }

    fn is_distinct(&self) -> bool {
        self.annotations()
            .iter()
            .any(|a| a == DISTINCT_ANNOTATION)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Antigen {
    pub name: String,
    pub passage: String,
    pub reassortant: String,
    pub annotations: Vec<String>,
    pub lineage: Lineage,
    pub date: Option<String>,
    pub lab_ids: Vec<String>,
    pub clades: Vec<String>,
    pub reference: bool,
}

impl NamedPoint for Antigen {
    fn name(&self) -> &str {
        &self.name
    }
    fn reassortant(&self) -> &str {
        &self.reassortant
    }
    fn annotations(&self) -> &[String] {
        &self.annotations
    }
    fn passage_or_serum_id(&self) -> &str {
        &self.passage
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Serum {
    pub name: String,
    pub passage: String,
    pub reassortant: String,
    pub annotations: Vec<String>,
    pub lineage: Lineage,
    pub serum_id: String,
    pub serum_species: String,
    /// Antigen indices this serum was raised against.
    pub homologous_antigens: Vec<usize>,
}

impl NamedPoint for Serum {
    fn name(&self) -> &str {
        &self.name
    }
    fn reassortant(&self) -> &str {
        &self.reassortant
    }
    fn annotations(&self) -> &[String] {
        &self.annotations
    }
    fn passage_or_serum_id(&self) -> &str {
        if self.serum_id.is_empty() {
            &self.passage
        } else {
            &self.serum_id
        }
    }
}

impl Serum {
    /// `true` if this serum's passage (or, if blank, its serum id) marks it
    /// as raised in eggs.
    pub fn is_egg(&self) -> bool {
        if !self.passage.is_empty() {
            self.passage.to_ascii_uppercase().contains("EGG")
        } else {
            self.serum_id.to_ascii_uppercase().contains("EGG")
        }
    }
}

impl Antigen {
    pub fn is_egg(&self) -> bool {
        self.passage.to_ascii_uppercase().contains("EGG")
    }
}
