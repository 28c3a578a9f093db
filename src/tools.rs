//! External programs: the multiple aligner (ClustalW) and PhyML.
//!
//! Commands run one at a time in the output directory. Each command line is
//! appended to a log file followed by whatever the program printed.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info, warn};
use thiserror::Error;

use crate::model::SequenceType;

/// Aligner log, inside the output directory.
pub const ALIGNER_LOG: &str = "log.txt";
/// PhyML log, inside the output directory.
pub const PHYML_LOG: &str = "log_phyml.txt";

pub const DEFAULT_ALIGNER: &str = "clustalw2";
pub const DEFAULT_ALIGNER_FALLBACK: &str = "clustalw";
pub const DEFAULT_PHYML: &str = "phyml";

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Cannot start {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("`{command}` failed ({status})")]
    Failed { command: String, status: String },

    #[error("Cannot open log {}: {source}", .path.display())]
    OpenLog { path: PathBuf, source: io::Error },

    #[error("Cannot write tool log: {0}")]
    Log(#[from] io::Error),
}

pub type ToolResult<T> = Result<T, ToolError>;

/// A program with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `base` is a program name optionally followed by fixed arguments
    /// (`clustalw2 -QUIET`); `args` come after those.
    pub fn from_base<I, S>(base: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut words = base.split_whitespace();
        let program = words.next().unwrap_or_default();
        Self::new(program, words.map(String::from).chain(args.into_iter().map(Into::into)))
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Opens `path` for appending, creating it if needed.
pub fn open_log(path: &Path) -> ToolResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ToolError::OpenLog {
            path: path.to_path_buf(),
            source,
        })
}

/// Runs `command` inside `dir` and waits for it, logging the command line and its output.
pub fn run_logged<W: Write>(command: &ToolCommand, dir: &Path, log: &mut W) -> ToolResult<()> {
    debug!("Running {} in {}", command, dir.display());
    let output = Command::new(&command.program)
        .args(&command.args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ToolError::Spawn {
            program: command.program.clone(),
            source,
        })?;

    writeln!(log, "{}", command)?;
    log.write_all(&output.stdout)?;
    log.write_all(&output.stderr)?;
    log.flush()?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            command: command.to_string(),
            status: output.status.to_string(),
        });
    }
    Ok(())
}

/// ClustalW-style aligner with an optional second program to try when the
/// first one cannot be started.
#[derive(Debug, Clone)]
pub struct Aligner {
    pub program: String,
    pub fallback: Option<String>,
}

impl Default for Aligner {
    fn default() -> Self {
        Self {
            program: DEFAULT_ALIGNER.to_string(),
            fallback: Some(DEFAULT_ALIGNER_FALLBACK.to_string()),
        }
    }
}

impl Aligner {
    fn arguments(input: &Path, output: &Path, protein: bool) -> Vec<String> {
        let mut args = vec![format!("-INFILE={}", input.display()), "-ALIGN".to_string()];
        if protein {
            args.push("-TYPE=PROTEIN".to_string());
        }
        args.push("-OUTPUT=FASTA".to_string());
        args.push(format!("-OUTFILE={}", output.display()));
        args
    }

    pub fn command(&self, input: &Path, output: &Path, protein: bool) -> ToolCommand {
        ToolCommand::from_base(&self.program, Self::arguments(input, output, protein))
    }

    /// Aligns `input` into `output` (aligned FASTA). The tool runs inside
    /// `dir`, so relative paths are resolved from there.
    pub fn align<W: Write>(
        &self,
        input: &Path,
        output: &Path,
        protein: bool,
        dir: &Path,
        log: &mut W,
    ) -> ToolResult<()> {
        let command = self.command(input, output, protein);
        match run_logged(&command, dir, log) {
            Err(ToolError::Spawn { program, source }) => match &self.fallback {
                Some(fallback) => {
                    warn!("Cannot start {} ({}), trying {}", program, source, fallback);
                    let retry =
                        ToolCommand::from_base(fallback, Self::arguments(input, output, protein));
                    run_logged(&retry, dir, log)
                }
                None => Err(ToolError::Spawn { program, source }),
            },
            other => other,
        }
    }
}

/// Per-gene input and output names of the alignment step.
pub fn alignment_paths(dir: &Path, gene: &str, protein: bool) -> (PathBuf, PathBuf) {
    if protein {
        (
            dir.join(format!("{}_prot.fasta", gene)),
            dir.join(format!("{}_aa.aln", gene)),
        )
    } else {
        (
            dir.join(format!("{}.fasta", gene)),
            dir.join(format!("{}_nuc.aln", gene)),
        )
    }
}

/// `path` as seen by a tool whose working directory is `dir`.
fn inside<'a>(path: &'a Path, dir: &Path) -> &'a Path {
    path.strip_prefix(dir).unwrap_or(path)
}

/// Outcome of aligning one gene.
#[derive(Debug)]
pub struct GeneAlignment {
    pub gene: String,
    pub output: PathBuf,
    pub result: ToolResult<()>,
}

/// Aligns every gene of `dir`, logging to `log.txt`. A failing gene does not
/// stop the others.
pub fn align_genes<S: AsRef<str>>(
    aligner: &Aligner,
    dir: &Path,
    genes: &[S],
    protein: bool,
) -> ToolResult<Vec<GeneAlignment>> {
    let mut log = open_log(&dir.join(ALIGNER_LOG))?;
    let mut aligned = Vec::with_capacity(genes.len());
    for gene in genes {
        let gene = gene.as_ref();
        let (input, output) = alignment_paths(dir, gene, protein);
        info!("Aligning {}", input.display());
        let result = aligner.align(
            inside(&input, dir),
            inside(&output, dir),
            protein,
            dir,
            &mut log,
        );
        if let Err(e) = &result {
            warn!("{}: alignment failed: {}", gene, e);
        }
        aligned.push(GeneAlignment {
            gene: gene.to_string(),
            output,
            result,
        });
    }
    Ok(aligned)
}

/// PhyML maximum-likelihood tree search.
#[derive(Debug, Clone)]
pub struct Phyml {
    pub program: String,
    pub bootstrap: u32,
}

impl Default for Phyml {
    fn default() -> Self {
        Self {
            program: DEFAULT_PHYML.to_string(),
            bootstrap: 100,
        }
    }
}

impl Phyml {
    /// GTR for nucleotide (and codon) data, JTT for amino acids; four rate
    /// categories with estimated gamma shape and ML base frequencies.
    pub fn command(&self, input: &Path, sequence_type: SequenceType) -> ToolCommand {
        let mut args: Vec<String> = Vec::new();
        match sequence_type {
            SequenceType::AminoAcid => args.extend(["-d", "aa", "-m", "JTT"].map(String::from)),
            SequenceType::Nucleotide => args.extend(["-m", "GTR"].map(String::from)),
        }
        args.push("-b".to_string());
        args.push(self.bootstrap.to_string());
        args.extend(["-v", "0.0", "-c", "4", "-a", "4", "-f", "m", "-i"].map(String::from));
        args.push(input.display().to_string());
        ToolCommand::from_base(&self.program, args)
    }

    /// Runs PhyML on a PHYLIP alignment, inside the alignment's directory.
    pub fn run<W: Write>(&self, input: &Path, sequence_type: SequenceType, log: &mut W) -> ToolResult<()> {
        let (dir, name) = match (input.parent(), input.file_name()) {
            (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => (parent, Path::new(name)),
            _ => (Path::new("."), input),
        };
        info!("Running PhyML on {}", input.display());
        run_logged(&self.command(name, sequence_type), dir, log)
    }
}
