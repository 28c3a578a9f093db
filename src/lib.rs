//! # phylomito - Mitochondrial supermatrix phylogeny
//!
//! Builds multi-gene phylogenies from annotated mitochondrial genomes.
//!
//! ## Architecture
//!
//! - `model`: sequences, alphabets and alignments
//! - `genetic_code`: NCBI translation tables
//! - `formats`: FASTA, PHYLIP and NEXUS reading, writing and conversion
//! - `backtranslate`: codon alignments from protein alignments
//! - `genes`: mitochondrial gene name aliases
//! - `genbank`: per-gene extraction from GenBank files
//! - `supermatrix`: per-organism concatenation of gene alignments
//! - `tools`: ClustalW and PhyML invocation
//! - `pipeline`: the whole run, GenBank to trees

pub mod backtranslate;
pub mod formats;
pub mod genbank;
pub mod genes;
pub mod genetic_code;
pub mod model;
pub mod pipeline;
pub mod supermatrix;
pub mod tools;
