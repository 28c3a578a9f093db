//! Alignment files on disk.
//!
//! Gene alignments and supermatrices are FASTA (`.aln`); PhyML reads the
//! strict PHYLIP copy and the NEXUS copy is for downstream tools. When no
//! format is forced, the extension is tried first and the first non-blank
//! line decides if that fails.

pub mod fasta;
pub mod nexus;
pub mod phylip;

use std::ffi::OsStr;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, warn};
use thiserror::Error;

use crate::model::Alignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Fasta,
    Phylip,
    Nexus,
}

/// Lower-case extensions and the format they imply.
const EXTENSIONS: &[(&str, FileFormat)] = &[
    ("aln", FileFormat::Fasta),
    ("fasta", FileFormat::Fasta),
    ("fas", FileFormat::Fasta),
    ("fa", FileFormat::Fasta),
    ("fna", FileFormat::Fasta),
    ("faa", FileFormat::Fasta),
    ("ffn", FileFormat::Fasta),
    ("phy", FileFormat::Phylip),
    ("phylip", FileFormat::Phylip),
    ("ph", FileFormat::Phylip),
    ("nex", FileFormat::Nexus),
    ("nexus", FileFormat::Nexus),
    ("nxs", FileFormat::Nexus),
];

impl FileFormat {
    pub fn name(self) -> &'static str {
        match self {
            FileFormat::Fasta => "FASTA",
            FileFormat::Phylip => "PHYLIP",
            FileFormat::Nexus => "NEXUS",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Cannot read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("File is blank")]
    EmptyFile,

    #[error("Format not recognised, give it with --from")]
    UnknownFormat,

    #[error("Bad FASTA: {0}")]
    FastaError(#[from] fasta::FastaError),

    #[error("Bad PHYLIP: {0}")]
    PhylipError(#[from] phylip::PhylipError),

    #[error("Bad NEXUS: {0}")]
    NexusError(#[from] nexus::NexusError),
}

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to write file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Nothing to write: the alignment is empty")]
    EmptyAlignment,

    #[error("Not an alignment: {0}")]
    UnequalLengths(String),

    #[error("Duplicate sequence name '{0}' after truncation")]
    DuplicateName(String),
}

/// Errors from a read-then-write conversion.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Cannot read {path}: {source}")]
    Read { path: String, source: ParseError },

    #[error("Cannot write {path}: {source}")]
    Write { path: String, source: WriteError },
}

pub fn detect_format_from_extension<P: AsRef<Path>>(path: P) -> Option<FileFormat> {
    let ext = path.as_ref().extension().and_then(OsStr::to_str)?.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|&(_, format)| format)
}

/// Guesses the format from the first non-blank line: `#NEXUS`, a `>`
/// header, or a PHYLIP `ntax nchar` pair.
pub fn detect_format_from_content(content: &str) -> Option<FileFormat> {
    let first = content.lines().map(str::trim).find(|l| !l.is_empty())?;
    if first.starts_with('>') {
        Some(FileFormat::Fasta)
    } else if first.get(..6).map_or(false, |tag| tag.eq_ignore_ascii_case("#NEXUS")) {
        Some(FileFormat::Nexus)
    } else {
        let numbers: Vec<&str> = first.split_whitespace().take(2).collect();
        (numbers.len() == 2 && numbers.iter().all(|n| n.parse::<usize>().is_ok()))
            .then_some(FileFormat::Phylip)
    }
}

pub fn parse_content(content: &str, format: FileFormat) -> ParseResult<Alignment> {
    match format {
        FileFormat::Fasta => Ok(fasta::parse_fasta_str(content)?),
        FileFormat::Phylip => Ok(phylip::parse_phylip_str(content)?),
        FileFormat::Nexus => Ok(nexus::parse_nexus_str(content)?),
    }
}

/// Reads an alignment in `format`, or in the detected format when `None`.
pub fn parse_file_with_options<P: AsRef<Path>>(
    path: P,
    format: Option<FileFormat>,
) -> ParseResult<Alignment> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Err(ParseError::EmptyFile);
    }
    if let Some(format) = format {
        return parse_content(&content, format);
    }

    let by_extension = detect_format_from_extension(path)
        .map(|format| (format, parse_content(&content, format)));
    match by_extension {
        Some((_, Ok(alignment))) => return Ok(alignment),
        Some((format, Err(e))) => debug!(
            "{} is not {} ({}), looking at its content",
            path.display(),
            format,
            e
        ),
        None => {}
    }

    let format = detect_format_from_content(&content).ok_or(ParseError::UnknownFormat)?;
    parse_content(&content, format)
}

pub fn parse_file<P: AsRef<Path>>(path: P) -> ParseResult<Alignment> {
    parse_file_with_options(path, None)
}

/// Writes an alignment in the given format.
pub fn write_alignment<W: Write>(
    writer: &mut W,
    alignment: &Alignment,
    format: FileFormat,
) -> Result<(), WriteError> {
    match format {
        FileFormat::Fasta => Ok(fasta::write_fasta(writer, &alignment.sequences)?),
        FileFormat::Phylip => phylip::write_phylip(writer, alignment),
        FileFormat::Nexus => nexus::write_nexus(writer, alignment),
    }
}

/// Writes an alignment to `path`, replacing any existing file.
pub fn write_file<P: AsRef<Path>>(
    path: P,
    alignment: &Alignment,
    format: FileFormat,
) -> Result<(), WriteError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_alignment(&mut writer, alignment, format)?;
    writer.flush()?;
    Ok(())
}

/// Reads `input` (format forced or detected) and writes it to `output` as `to`.
///
/// Returns the number of sequences written.
pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    from: Option<FileFormat>,
    to: FileFormat,
) -> Result<usize, ConvertError> {
    let input = input.as_ref();
    let output = output.as_ref();
    let alignment = parse_file_with_options(input, from).map_err(|source| ConvertError::Read {
        path: input.display().to_string(),
        source,
    })?;
    if let Some(warning) = &alignment.warning {
        warn!("{}: {}", input.display(), warning);
    }
    write_file(output, &alignment, to).map_err(|source| ConvertError::Write {
        path: output.display().to_string(),
        source,
    })?;
    debug!("Converted {} to {} ({})", input.display(), output.display(), to);
    Ok(alignment.sequence_count())
}

/// Removes every gap from an aligned FASTA file and writes the result as FASTA.
pub fn remove_gaps_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
) -> Result<usize, ConvertError> {
    let input = input.as_ref();
    let output = output.as_ref();
    let alignment = fasta::parse_fasta_file(input).map_err(|e| ConvertError::Read {
        path: input.display().to_string(),
        source: e.into(),
    })?;
    let degapped = alignment.without_gaps();
    write_file(output, &degapped, FileFormat::Fasta).map_err(|source| ConvertError::Write {
        path: output.display().to_string(),
        source,
    })?;
    Ok(degapped.sequence_count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_detection() {
        let cases = [
            ("\n\n  >0_COX1\nATG\n", Some(FileFormat::Fasta)),
            (" 2 9\n0         ATGGCCTAA\n", Some(FileFormat::Phylip)),
            ("#NEXUS\nbegin data;\n", Some(FileFormat::Nexus)),
            ("#nexus\n", Some(FileFormat::Nexus)),
            ("LOCUS       NC_005089   16299 bp\n", None),
            ("", None),
        ];
        for (content, expected) in cases {
            assert_eq!(detect_format_from_content(content), expected, "{:?}", content);
        }
    }

    #[test]
    fn test_extension_detection() {
        assert_eq!(detect_format_from_extension("COX1_aa.aln"), Some(FileFormat::Fasta));
        assert_eq!(detect_format_from_extension("ND6.FASTA"), Some(FileFormat::Fasta));
        assert_eq!(detect_format_from_extension("all_nuc.phy"), Some(FileFormat::Phylip));
        assert_eq!(detect_format_from_extension("all_nuc.nex"), Some(FileFormat::Nexus));
        assert_eq!(detect_format_from_extension("mouse.gbk"), None);
        assert_eq!(detect_format_from_extension("species_code.txt"), None);
    }

    #[test]
    fn test_misnamed_file_falls_back_to_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all_nuc.phy");
        fs::write(&path, ">0\nATG\n>1\nATA\n").unwrap();
        assert_eq!(parse_file(&path).unwrap().sequence_count(), 2);
    }

    #[test]
    fn test_convert_fasta_to_phylip_and_nexus() {
        let dir = tempfile::tempdir().unwrap();
        let aln = dir.path().join("all_nuc.aln");
        fs::write(&aln, ">0\nATG-CC\n>1\nATGACC\n").unwrap();

        let phy = dir.path().join("all_nuc.phy");
        assert_eq!(convert_file(&aln, &phy, None, FileFormat::Phylip).unwrap(), 2);
        let back = parse_file(&phy).unwrap();
        assert_eq!(back.get(0).unwrap().as_str(), "ATG-CC");
        assert_eq!(back.get(1).unwrap().id, "1");

        let nex = dir.path().join("all_nuc.nex");
        convert_file(&aln, &nex, Some(FileFormat::Fasta), FileFormat::Nexus).unwrap();
        let text = fs::read_to_string(&nex).unwrap();
        assert!(text.contains("datatype=dna"));
        assert_eq!(parse_file(&nex).unwrap().get(1).unwrap().as_str(), "ATGACC");
    }

    #[test]
    fn test_convert_reports_unreadable_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = convert_file(
            dir.path().join("missing.aln"),
            dir.path().join("out.phy"),
            None,
            FileFormat::Phylip,
        );
        assert!(matches!(result, Err(ConvertError::Read { .. })));
    }

    #[test]
    fn test_remove_gaps_file() {
        let dir = tempfile::tempdir().unwrap();
        let aln = dir.path().join("COX1_aa.aln");
        fs::write(&aln, ">0_COX1\nMK--V\n>1_COX1\nM-K-V\n").unwrap();
        let out = dir.path().join("COX1_aa.fasta");

        assert_eq!(remove_gaps_file(&aln, &out).unwrap(), 2);
        let degapped = parse_file(&out).unwrap();
        assert_eq!(degapped.get(0).unwrap().as_str(), "MKV");
        assert_eq!(degapped.get(1).unwrap().as_str(), "MKV");
        assert_eq!(degapped.get(1).unwrap().id, "1_COX1");
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.fasta");
        fs::write(&path, "\n").unwrap();
        assert!(matches!(parse_file(&path), Err(ParseError::EmptyFile)));
    }
}
