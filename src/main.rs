//! phylomito - mitochondrial supermatrix phylogeny
//!
//! ## Usage
//!
//! ```bash
//! phylomito run -i genomes/ -o out/              # nucleotide supermatrix + PhyML
//! phylomito run -i genomes/ -o out/ -p --codon   # protein and codon supermatrices
//! phylomito back-translate -a COX1_aa.aln -n COX1.fasta -o COX1_codon.aln
//! phylomito convert all_nuc.aln -o all_nuc.nex -t nexus
//! ```
//!
//! Set `RUST_LOG=debug` for the commands run and the files written.

// Use jemalloc for better memory management (returns memory to OS)
#[cfg(not(windows))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info, warn};

use phylomito::backtranslate::{self, BatchReport};
use phylomito::formats::{self, FileFormat};
use phylomito::genbank::{self, SplitOptions};
use phylomito::genes::GeneTable;
use phylomito::genetic_code::{GeneticCode, GeneticCodes};
use phylomito::pipeline::{self, PipelineConfig};
use phylomito::supermatrix;
use phylomito::tools::{
    Aligner, Phyml, DEFAULT_ALIGNER, DEFAULT_ALIGNER_FALLBACK, DEFAULT_PHYML,
};

/// Alignment format names accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Fasta,
    Nexus,
    Phylip,
}

impl From<FormatArg> for FileFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Fasta => FileFormat::Fasta,
            FormatArg::Nexus => FileFormat::Nexus,
            FormatArg::Phylip => FileFormat::Phylip,
        }
    }
}

/// phylomito - supermatrix phylogeny from mitochondrial GenBank records
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the genomes are and how genes are extracted.
#[derive(Args, Debug)]
struct GenomeArgs {
    /// Folder with the GenBank files
    #[arg(short = 'i', long = "inpath")]
    input: PathBuf,

    /// Folder for alignments, supermatrices and trees
    #[arg(short = 'o', long = "outpath", default_value = ".")]
    output: PathBuf,

    /// GenBank file extensions
    #[arg(short = 'e', long = "extension", num_args = 1.., default_values = [".gbk", ".gb"])]
    extensions: Vec<String>,

    /// Work on translated proteins instead of nucleotides
    #[arg(short = 'p', long)]
    protein: bool,

    /// Include the D-loop as an extra gene (nucleotide mode only)
    #[arg(short = 'd', long)]
    dloop: bool,

    /// Genetic code, by NCBI number or name
    #[arg(long = "genetic-code", default_value = "2")]
    genetic_code: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract, align, join and build trees
    Run {
        #[command(flatten)]
        genomes: GenomeArgs,

        /// PhyML bootstrap replicates
        #[arg(short = 'b', long, default_value_t = 100)]
        bootstrap: u32,

        /// Also build one tree per gene
        #[arg(short = 'g', long = "gene-tree")]
        gene_trees: bool,

        /// In protein mode, also build codon alignments and their supermatrix
        #[arg(long, requires = "protein")]
        codon: bool,

        /// Aligner program (ClustalW compatible)
        #[arg(long, env = "PHYLOMITO_ALIGNER", default_value = DEFAULT_ALIGNER)]
        aligner: String,

        /// Aligner tried when the first one cannot be started
        #[arg(long = "aligner-fallback", env = "PHYLOMITO_ALIGNER_FALLBACK", default_value = DEFAULT_ALIGNER_FALLBACK)]
        aligner_fallback: String,

        /// PhyML program
        #[arg(long, env = "PHYLOMITO_PHYML", default_value = DEFAULT_PHYML)]
        phyml: String,
    },

    /// Only extract per-gene FASTA files from the GenBank records
    Split {
        #[command(flatten)]
        genomes: GenomeArgs,
    },

    /// Rebuild a codon alignment from a protein alignment and its coding sequences
    BackTranslate {
        /// Aligned amino-acid FASTA
        #[arg(short = 'a', long = "alignment")]
        alignment: PathBuf,

        /// Ungapped coding sequences (FASTA)
        #[arg(short = 'n', long = "nucleotides")]
        nucleotides: PathBuf,

        /// Codon alignment output (FASTA)
        #[arg(short = 'o', long = "output")]
        output: PathBuf,

        /// Genetic code, by NCBI number or name
        #[arg(long = "genetic-code", default_value = "2")]
        genetic_code: String,
    },

    /// Join per-gene alignments into a supermatrix (.aln, .phy and .nex)
    Concat {
        /// Folder holding the gene alignments
        #[arg(short = 'd', long = "dir")]
        dir: PathBuf,

        /// Gene alignment file ending, e.g. _nuc.aln
        #[arg(short = 's', long = "suffix")]
        suffix: String,

        /// Output FASTA; PHYLIP and NEXUS copies get the same stem
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },

    /// Convert between FASTA, PHYLIP and NEXUS
    Convert {
        input: PathBuf,

        #[arg(short = 'o', long = "output")]
        output: PathBuf,

        /// Output format
        #[arg(short = 't', long = "to", value_enum)]
        to: FormatArg,

        /// Input format (detected from extension and content when omitted)
        #[arg(short = 'f', long = "from", value_enum)]
        from: Option<FormatArg>,
    },

    /// Remove gaps from an aligned FASTA
    Degap {
        input: PathBuf,

        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
}

fn genetic_code(query: &str) -> Result<GeneticCode> {
    let codes = GeneticCodes::new();
    match codes.find(query) {
        Some(code) => Ok(code.clone()),
        None => bail!("Unknown genetic code: {}", query),
    }
}

fn split(genomes: &GenomeArgs) -> Result<()> {
    let code = genetic_code(&genomes.genetic_code)?;
    std::fs::create_dir_all(&genomes.output)
        .with_context(|| format!("Cannot create {}", genomes.output.display()))?;
    let files = genbank::find_genomes(&genomes.input, &genomes.extensions)?;
    let table = GeneTable::mitochondrial(genomes.dloop);
    let options = SplitOptions {
        genes: &table,
        code: &code,
        protein: genomes.protein,
    };
    let summary = genbank::split_genomes(&files, &genomes.output, &options)?;
    info!("Genes written: {}", summary.genes.join(" "));
    Ok(())
}

fn report(batch: &BatchReport) {
    if batch.is_clean() {
        info!("All {} records back-translated", batch.records.len());
        return;
    }
    let skipped: Vec<&str> = batch
        .failures
        .iter()
        .map(|f| f.id.as_str())
        .chain(batch.unpaired.iter().map(String::as_str))
        .collect();
    warn!("{} records left out: {}", skipped.len(), skipped.join(", "));
}

fn concat(dir: &Path, suffix: &str, output: &Path) -> Result<()> {
    let matrix = supermatrix::join_alignments(dir, suffix)?;
    let out_dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Invalid output name {}", output.display()))?;
    for path in supermatrix::write_supermatrix(&matrix, out_dir, stem)? {
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn try_main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            genomes,
            bootstrap,
            gene_trees,
            codon,
            aligner,
            aligner_fallback,
            phyml,
        } => {
            let config = PipelineConfig {
                genetic_code: genetic_code(&genomes.genetic_code)?,
                input_dir: genomes.input,
                output_dir: genomes.output,
                extensions: genomes.extensions,
                protein: genomes.protein,
                codon,
                dloop: genomes.dloop,
                gene_trees,
                aligner: Aligner {
                    program: aligner,
                    fallback: Some(aligner_fallback).filter(|p| !p.trim().is_empty()),
                },
                phyml: Phyml {
                    program: phyml,
                    bootstrap,
                },
            };
            let summary = pipeline::run(&config)?;
            for matrix in &summary.supermatrices {
                info!("Supermatrix: {}", matrix.display());
            }
            info!("PhyML finished on {} alignments", summary.trees.len());
        }
        Commands::Split { genomes } => split(&genomes)?,
        Commands::BackTranslate {
            alignment,
            nucleotides,
            output,
            genetic_code: query,
        } => {
            let code = genetic_code(&query)?;
            let batch = backtranslate::back_translate_files(&alignment, &nucleotides, &output, &code)?;
            report(&batch);
        }
        Commands::Concat { dir, suffix, output } => concat(&dir, &suffix, &output)?,
        Commands::Convert {
            input,
            output,
            to,
            from,
        } => {
            let count = formats::convert_file(&input, &output, from.map(FileFormat::from), to.into())?;
            info!("Wrote {} sequences to {}", count, output.display());
        }
        Commands::Degap { input, output } => {
            let count = formats::remove_gaps_file(&input, &output)?;
            info!("Wrote {} sequences to {}", count, output.display());
        }
    }
    Ok(())
}

fn main() {
    if let Err(err) = try_main() {
        error!("{}", err);

        // report any errors that are produced
        err.chain()
            .skip(1)
            .for_each(|cause| error!("  because: {}", cause));
        std::process::exit(1);
    }
}
