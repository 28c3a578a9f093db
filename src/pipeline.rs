//! End-to-end run: GenBank genomes in, supermatrices and ML trees out.
//!
//! Steps, all inside the output directory:
//! 1. split the genomes into per-gene FASTA files
//! 2. align every gene
//! 3. back-translate protein alignments to codon alignments (protein + codon mode)
//! 4. join the gene alignments into supermatrices (FASTA, PHYLIP, NEXUS)
//! 5. run PhyML on each supermatrix, then optionally on each gene

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::backtranslate;
use crate::formats::{self, FileFormat};
use crate::genbank::{self, GenbankError, SplitOptions, SplitSummary};
use crate::genes::GeneTable;
use crate::genetic_code::GeneticCode;
use crate::model::SequenceType;
use crate::supermatrix::{self, JoinError, AMINO_ACID_SUFFIX, CODON_SUFFIX, NUCLEOTIDE_SUFFIX};
use crate::tools::{self, Aligner, Phyml, ToolError, PHYML_LOG};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Cannot create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Genbank(#[from] GenbankError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error("No gene could be aligned")]
    NothingAligned,
}

/// Everything a pipeline run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// GenBank file name endings, e.g. `.gbk`.
    pub extensions: Vec<String>,
    /// Align translated proteins instead of nucleotides.
    pub protein: bool,
    /// In protein mode, also build codon alignments from the protein alignments.
    pub codon: bool,
    /// Extract the D-loop as an extra gene (nucleotide mode only).
    pub dloop: bool,
    /// Run PhyML on every gene alignment too.
    pub gene_trees: bool,
    pub genetic_code: GeneticCode,
    pub aligner: Aligner,
    pub phyml: Phyml,
}

/// What a run produced.
#[derive(Debug, Default)]
pub struct PipelineSummary {
    pub split: SplitSummary,
    pub aligned: Vec<String>,
    /// Genes with a codon alignment.
    pub codon_aligned: Vec<String>,
    /// Supermatrix PHYLIP files, one per alignment kind.
    pub supermatrices: Vec<PathBuf>,
    /// PHYLIP inputs PhyML ran on successfully.
    pub trees: Vec<PathBuf>,
}

/// The alignment kinds joined for a configuration, with the data type PhyML sees.
fn alignment_kinds(config: &PipelineConfig) -> Vec<(&'static str, SequenceType)> {
    if !config.protein {
        return vec![(NUCLEOTIDE_SUFFIX, SequenceType::Nucleotide)];
    }
    let mut kinds = vec![(AMINO_ACID_SUFFIX, SequenceType::AminoAcid)];
    if config.codon {
        kinds.push((CODON_SUFFIX, SequenceType::Nucleotide));
    }
    kinds
}

pub fn run(config: &PipelineConfig) -> Result<PipelineSummary, PipelineError> {
    let outdir = config.output_dir.as_path();
    fs::create_dir_all(outdir).map_err(|source| PipelineError::OutputDir {
        path: outdir.to_path_buf(),
        source,
    })?;

    let files = genbank::find_genomes(&config.input_dir, &config.extensions)?;
    let genes = GeneTable::mitochondrial(config.dloop);
    let options = SplitOptions {
        genes: &genes,
        code: &config.genetic_code,
        protein: config.protein,
    };
    let split = genbank::split_genomes(&files, outdir, &options)?;

    let aligned: Vec<String> = tools::align_genes(&config.aligner, outdir, &split.genes, config.protein)?
        .into_iter()
        .filter(|a| a.result.is_ok())
        .map(|a| a.gene)
        .collect();
    if aligned.is_empty() {
        return Err(PipelineError::NothingAligned);
    }
    info!("Aligned {}/{} genes", aligned.len(), split.genes.len());

    let mut summary = PipelineSummary {
        split,
        aligned,
        ..Default::default()
    };

    if config.protein && config.codon {
        for batch in backtranslate::back_translate_genes(outdir, &summary.aligned, &config.genetic_code) {
            match batch.result {
                Ok(report) => {
                    if !report.is_clean() {
                        warn!("{}: codon alignment is missing some organisms", batch.gene);
                    }
                    summary.codon_aligned.push(batch.gene);
                }
                Err(e) => warn!("{}: no codon alignment: {}", batch.gene, e),
            }
        }
    }

    let mut kinds = alignment_kinds(config);
    if config.codon && summary.codon_aligned.is_empty() {
        warn!("No codon alignment was built");
        kinds.retain(|&(suffix, _)| suffix != CODON_SUFFIX);
    }
    let mut matrices = Vec::new();
    for &(suffix, sequence_type) in &kinds {
        let matrix = match supermatrix::join_alignments(outdir, suffix) {
            Ok(matrix) => matrix,
            // Codon output is optional
            Err(e) if suffix == CODON_SUFFIX => {
                warn!("No codon supermatrix: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let written = supermatrix::write_supermatrix(&matrix, outdir, &supermatrix::output_stem(suffix))?;
        if let Some(phy) = written.into_iter().find(|p| p.extension().is_some_and(|e| e == "phy")) {
            matrices.push((phy, sequence_type));
        }
    }
    summary.supermatrices = matrices.iter().map(|(p, _)| p.clone()).collect();

    let Some(mut log) = open_phyml_log(outdir) else {
        return Ok(summary);
    };
    for (phy, sequence_type) in &matrices {
        run_phyml(&config.phyml, phy, *sequence_type, &mut log, &mut summary.trees);
    }

    if config.gene_trees {
        for &(suffix, sequence_type) in &kinds {
            for phy in gene_phylips(outdir, suffix) {
                run_phyml(&config.phyml, &phy, sequence_type, &mut log, &mut summary.trees);
            }
        }
    }
    Ok(summary)
}

fn open_phyml_log(dir: &Path) -> Option<File> {
    match tools::open_log(&dir.join(PHYML_LOG)) {
        Ok(log) => Some(log),
        Err(e) => {
            warn!("{}; skipping phylogeny", e);
            None
        }
    }
}

fn run_phyml(phyml: &Phyml, phy: &Path, sequence_type: SequenceType, log: &mut File, trees: &mut Vec<PathBuf>) {
    match phyml.run(phy, sequence_type, log) {
        Ok(()) => trees.push(phy.to_path_buf()),
        Err(e) => warn!("PhyML on {} failed: {}", phy.display(), e),
    }
}

/// Converts every gene alignment ending in `suffix` to PHYLIP next to it.
fn gene_phylips(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let files = match supermatrix::find_alignments(dir, suffix) {
        Ok(files) => files,
        Err(e) => {
            warn!("{}", e);
            return Vec::new();
        }
    };
    let mut phylips = Vec::with_capacity(files.len());
    for aln in files {
        let phy = aln.with_extension("phy");
        match formats::convert_file(&aln, &phy, Some(FileFormat::Fasta), FileFormat::Phylip) {
            Ok(_) => phylips.push(phy),
            Err(e) => warn!("No gene tree for {}: {}", aln.display(), e),
        }
    }
    phylips
}
