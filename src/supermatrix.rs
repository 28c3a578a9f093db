//! Concatenation of per-gene alignments into one row per organism.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use crate::formats::fasta::{self, FastaError};
use crate::formats::{self, FileFormat, WriteError};
use crate::model::{Alignment, Sequence, GAP};

pub const NUCLEOTIDE_SUFFIX: &str = "_nuc.aln";
pub const AMINO_ACID_SUFFIX: &str = "_aa.aln";
pub const CODON_SUFFIX: &str = "_codon.aln";

/// Prefix of the joined outputs, skipped when collecting gene alignments.
const OUTPUT_PREFIX: &str = "all";

#[derive(Error, Debug)]
pub enum JoinError {
    #[error("No alignments ending in {suffix} in {}", .dir.display())]
    NoAlignments { dir: PathBuf, suffix: String },

    #[error("Cannot list {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot read {}: {source}", .path.display())]
    Read { path: PathBuf, source: FastaError },

    #[error("{} is not an alignment: {reason}", .path.display())]
    NotAligned { path: PathBuf, reason: String },

    #[error("Cannot write {}: {source}", .path.display())]
    Write { path: PathBuf, source: WriteError },
}

/// One gene alignment to concatenate.
#[derive(Debug, Clone)]
pub struct GeneBlock {
    pub gene: String,
    pub alignment: Alignment,
}

/// A concatenated multi-gene alignment.
#[derive(Debug, Clone)]
pub struct Supermatrix {
    pub alignment: Alignment,
    /// Gene names with their column counts, in concatenation order.
    pub partitions: Vec<(String, usize)>,
    /// `(organism, gene)` blocks filled with gaps.
    pub padded: Vec<(String, String)>,
}

impl Supermatrix {
    /// One-based column range of every gene, e.g. `COX1:1-4 CYTB:5-6`.
    pub fn describe_partitions(&self) -> String {
        let mut start = 1;
        let mut parts = Vec::with_capacity(self.partitions.len());
        for (gene, width) in &self.partitions {
            parts.push(format!("{}:{}-{}", gene, start, start + width - 1));
            start += width;
        }
        parts.join(" ")
    }
}

/// Base name of the joined files for a gene alignment suffix: `_nuc.aln` → `all_nuc`.
pub fn output_stem(suffix: &str) -> String {
    let kind = suffix.strip_suffix(".aln").unwrap_or(suffix);
    format!("{}{}", OUTPUT_PREFIX, kind)
}

/// Gene alignments in `dir` ending in `suffix`, sorted by file name.
pub fn find_alignments(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, JoinError> {
    let io_err = |source| JoinError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let joined_output = name.starts_with(&format!("{}_", OUTPUT_PREFIX));
        if path.is_file() && name.ends_with(suffix) && !joined_output {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Concatenates gene blocks per organism (leading identifier token).
///
/// Organisms keep the order in which they are first seen. An organism absent
/// from a block gets gaps for that block's width.
pub fn concatenate(blocks: &[GeneBlock]) -> Supermatrix {
    let mut organisms: Vec<String> = Vec::new();
    let mut tables: Vec<HashMap<&str, &Sequence>> = Vec::with_capacity(blocks.len());

    for block in blocks {
        let mut rows = HashMap::new();
        for seq in &block.alignment.sequences {
            let organism = seq.leading_token();
            if rows.contains_key(organism) {
                warn!("{}: organism {} appears twice, keeping the first", block.gene, organism);
                continue;
            }
            rows.insert(organism, seq);
            if !organisms.iter().any(|o| o == organism) {
                organisms.push(organism.to_string());
            }
        }
        tables.push(rows);
    }

    let mut rows: Vec<String> = vec![String::new(); organisms.len()];
    let mut padded = Vec::new();
    for (block, table) in blocks.iter().zip(&tables) {
        let width = block.alignment.alignment_length();
        for (organism, row) in organisms.iter().zip(rows.iter_mut()) {
            match table.get(organism.as_str()) {
                Some(seq) => row.push_str(seq.as_str()),
                None => {
                    warn!("{} is missing from {}, padding with gaps", organism, block.gene);
                    row.extend(std::iter::repeat(GAP as char).take(width));
                    padded.push((organism.clone(), block.gene.clone()));
                }
            }
        }
    }

    let sequences = organisms
        .into_iter()
        .zip(rows)
        .map(|(organism, row)| Sequence::new(organism, row))
        .collect();
    Supermatrix {
        alignment: Alignment::new(sequences),
        partitions: blocks
            .iter()
            .map(|b| (b.gene.clone(), b.alignment.alignment_length()))
            .collect(),
        padded,
    }
}

/// Reads one gene alignment; the gene name is the file name without `suffix`.
///
/// An empty file yields `None`.
fn read_block(path: &Path, suffix: &str) -> Result<Option<GeneBlock>, JoinError> {
    let alignment = match fasta::parse_fasta_file(path) {
        Ok(alignment) => alignment,
        Err(FastaError::EmptyFile) => {
            warn!("{} holds no record, leaving it out", path.display());
            return Ok(None);
        }
        Err(source) => {
            return Err(JoinError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if !alignment.is_valid_alignment {
        return Err(JoinError::NotAligned {
            path: path.to_path_buf(),
            reason: alignment.warning.clone().unwrap_or_default(),
        });
    }
    let gene = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(suffix))
        .unwrap_or_default()
        .to_string();
    Ok(Some(GeneBlock { gene, alignment }))
}

/// Joins every `*<suffix>` alignment of `dir` into a supermatrix.
///
/// Empty alignment files are left out; `NoAlignments` is returned when
/// nothing else remains.
pub fn join_alignments(dir: &Path, suffix: &str) -> Result<Supermatrix, JoinError> {
    let files = find_alignments(dir, suffix)?;
    let mut blocks = Vec::with_capacity(files.len());
    for path in &files {
        if let Some(block) = read_block(path, suffix)? {
            blocks.push(block);
        }
    }
    if blocks.is_empty() {
        return Err(JoinError::NoAlignments {
            dir: dir.to_path_buf(),
            suffix: suffix.to_string(),
        });
    }
    let matrix = concatenate(&blocks);
    info!(
        "Joined {} alignments into {} rows of {} columns",
        blocks.len(),
        matrix.alignment.sequence_count(),
        matrix.alignment.alignment_length()
    );
    debug!("Partitions: {}", matrix.describe_partitions());
    Ok(matrix)
}

/// Writes the supermatrix as `<stem>.aln` (FASTA), `<stem>.phy` and `<stem>.nex`.
///
/// Returns the written paths in that order.
pub fn write_supermatrix(
    matrix: &Supermatrix,
    dir: &Path,
    stem: &str,
) -> Result<Vec<PathBuf>, JoinError> {
    let outputs = [
        ("aln", FileFormat::Fasta),
        ("phy", FileFormat::Phylip),
        ("nex", FileFormat::Nexus),
    ];
    let mut written = Vec::with_capacity(outputs.len());
    for (extension, format) in outputs {
        let path = dir.join(format!("{}.{}", stem, extension));
        formats::write_file(&path, &matrix.alignment, format).map_err(|source| {
            JoinError::Write {
                path: path.clone(),
                source,
            }
        })?;
        written.push(path);
    }
    Ok(written)
}
