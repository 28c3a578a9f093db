//! FASTA reading and writing.
//!
//! Identifiers stop at the first whitespace of the header, so
//! `>0_COX1 Mus musculus` is read as `0_COX1`. Sequence lines may be wrapped
//! at any width; blank lines are ignored and records with no symbols are
//! left out.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use crate::model::{Alignment, Sequence};

/// Symbols per line when writing.
pub const LINE_WIDTH: usize = 60;

#[derive(Error, Debug)]
pub enum FastaError {
    #[error("Cannot read FASTA: {0}")]
    IoError(#[from] std::io::Error),

    #[error("No FASTA record with symbols")]
    EmptyFile,

    #[error("Malformed FASTA: {0}")]
    InvalidFormat(String),

    #[error("Line {0} holds symbols before any '>' header")]
    SequenceWithoutHeader(usize),
}

pub type FastaResult<T> = Result<T, FastaError>;

/// Reads a FASTA file into an alignment.
///
/// ```no_run
/// use phylomito::formats::fasta::parse_fasta_file;
///
/// let cox1 = parse_fasta_file("COX1_nuc.aln").unwrap();
/// assert!(cox1.is_valid_alignment);
/// ```
pub fn parse_fasta_file<P: AsRef<Path>>(path: P) -> FastaResult<Alignment> {
    parse_fasta_str(&fs::read_to_string(path)?)
}

pub fn parse_fasta_str(content: &str) -> FastaResult<Alignment> {
    let mut records: Vec<(&str, Vec<u8>)> = Vec::new();

    for (line_number, line) in (1..).zip(content.lines().map(str::trim)) {
        if let Some(header) = line.strip_prefix('>') {
            let Some(id) = header.split_whitespace().next() else {
                return Err(FastaError::InvalidFormat(format!(
                    "header without identifier at line {}",
                    line_number
                )));
            };
            records.push((id, Vec::new()));
        } else if !line.is_empty() {
            let Some((_, data)) = records.last_mut() else {
                return Err(FastaError::SequenceWithoutHeader(line_number));
            };
            data.extend(line.bytes().filter(|b| !b.is_ascii_whitespace()));
        }
    }

    let sequences: Vec<Sequence> = records
        .into_iter()
        .filter(|(_, data)| !data.is_empty())
        .map(|(id, data)| Sequence::from_bytes(id, data))
        .collect();
    if sequences.is_empty() {
        return Err(FastaError::EmptyFile);
    }
    Ok(Alignment::new(sequences))
}

/// Writes sequences as FASTA, wrapping sequence lines at `LINE_WIDTH`.
pub fn write_fasta<W: Write>(writer: &mut W, sequences: &[Sequence]) -> std::io::Result<()> {
    for seq in sequences {
        writeln!(writer, ">{}", seq.id)?;
        for chunk in seq.as_bytes().chunks(LINE_WIDTH) {
            writer.write_all(chunk)?;
            writer.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Writes sequences to a FASTA file, replacing any existing file.
pub fn write_fasta_file<P: AsRef<Path>>(path: P, sequences: &[Sequence]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_fasta(&mut writer, sequences)?;
    writer.flush()
}
