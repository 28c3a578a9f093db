//! Mitochondrial gene names.
//!
//! GenBank annotations name the same gene in several ways (`COX1`, `CO1`,
//! `NAD1`, `Cyt B`...). A `GeneTable` maps every accepted spelling to one
//! canonical name and keeps the canonical genes in genome order.

use std::collections::HashMap;

/// Canonical gene names with their accepted aliases, in genome order.
const MITOCHONDRIAL_GENES: &[(&str, &[&str])] = &[
    ("ND1", &["NAD1"]),
    ("ND2", &["NAD2"]),
    ("COX1", &["CO1"]),
    ("COX2", &["CO2"]),
    ("ATP8", &["ATPASE 8"]),
    ("ATP6", &["ATPASE 6"]),
    ("ND3", &["NAD3"]),
    ("ND4L", &["NAD4L"]),
    ("ND4", &["NAD4"]),
    ("ND5", &["NAD5"]),
    ("CYTB", &["CYT B", "COB"]),
    ("ND6", &["NAD6"]),
    ("COX3", &["CO3"]),
];

/// Name of the control region pseudo-gene.
pub const DLOOP: &str = "DLOOP";

/// Immutable alias → canonical gene lookup.
#[derive(Debug, Clone)]
pub struct GeneTable {
    genes: Vec<String>,
    aliases: HashMap<String, usize>,
}

impl GeneTable {
    /// Builds a table from `(canonical, aliases)` pairs. The canonical name is
    /// always an alias of itself; lookups ignore case.
    pub fn new<S: AsRef<str>>(entries: &[(S, &[S])]) -> Self {
        let mut genes = Vec::with_capacity(entries.len());
        let mut aliases = HashMap::new();
        for (idx, (canonical, names)) in entries.iter().enumerate() {
            let canonical = canonical.as_ref().to_uppercase();
            aliases.insert(canonical.clone(), idx);
            for name in names.iter() {
                aliases.insert(name.as_ref().to_uppercase(), idx);
            }
            genes.push(canonical);
        }
        Self { genes, aliases }
    }

    /// The 13 mitochondrial protein-coding genes, plus the D-loop when requested.
    pub fn mitochondrial(include_dloop: bool) -> Self {
        let mut entries: Vec<(&str, &[&str])> = MITOCHONDRIAL_GENES.to_vec();
        if include_dloop {
            entries.push((DLOOP, &[]));
        }
        Self::new(&entries)
    }

    /// Canonical name for `name`, if known.
    pub fn canonical(&self, name: &str) -> Option<&str> {
        let key = name.trim().to_uppercase();
        self.aliases.get(&key).map(|&idx| self.genes[idx].as_str())
    }

    /// Canonical names in table order.
    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.genes.iter().any(|g| g == canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve() {
        let table = GeneTable::mitochondrial(false);
        assert_eq!(table.canonical("COX1"), Some("COX1"));
        assert_eq!(table.canonical("co1"), Some("COX1"));
        assert_eq!(table.canonical("Cyt B"), Some("CYTB"));
        assert_eq!(table.canonical("COB"), Some("CYTB"));
        assert_eq!(table.canonical("ATPase 6"), Some("ATP6"));
        assert_eq!(table.canonical(" nad4l "), Some("ND4L"));
        assert_eq!(table.canonical("16S rRNA"), None);
    }

    #[test]
    fn test_dloop_is_optional() {
        let without = GeneTable::mitochondrial(false);
        assert_eq!(without.genes().len(), 13);
        assert_eq!(without.canonical("DLOOP"), None);

        let with = GeneTable::mitochondrial(true);
        assert_eq!(with.genes().len(), 14);
        assert_eq!(with.genes().last().map(String::as_str), Some(DLOOP));
        assert!(with.contains(DLOOP));
    }

    #[test]
    fn test_genome_order() {
        let table = GeneTable::mitochondrial(false);
        assert_eq!(table.genes()[0], "ND1");
        assert_eq!(table.genes()[12], "COX3");
    }

    #[test]
    fn test_custom_table() {
        let table = GeneTable::new(&[("rbcL", &["RBCL-LARGE"][..])]);
        assert_eq!(table.canonical("rbcl-large"), Some("RBCL"));
        assert_eq!(table.genes(), ["RBCL".to_string()]);
    }
}
