//! PHYLIP reading and writing.
//!
//! PhyML input is written in the strict interleaved layout, names padded to
//! ten columns and the data split in blocks of fifty:
//! ```text
//!  2 60
//! 0_COX1    ATGTTCATTA ACCGATGACT ATTCTCAACC AACCACAAAG ATATTGGCAC
//! 1_COX1    ATGTTCATCA ACCGCTGACT ATTTTCAACC AACCACAAAG ACATCGGCAC
//!
//! CCTGTATCTT
//! CCTATACCTA
//! ```
//!
//! Reading accepts more: sequential or interleaved rows, names of any length
//! followed by whitespace, or names filling the first ten columns.

use std::io::Write;

use thiserror::Error;

use super::WriteError;
use crate::model::{Alignment, Sequence};

/// Width of the name column in strict PHYLIP.
pub const NAME_WIDTH: usize = 10;
/// Sequence columns per interleaved block.
const BLOCK_WIDTH: usize = 50;
/// Columns between spaces inside a block.
const CHUNK_WIDTH: usize = 10;

#[derive(Error, Debug)]
pub enum PhylipError {
    #[error("PHYLIP file has no content")]
    EmptyFile,

    #[error("First line '{0}' should give the number of taxa and of sites")]
    InvalidHeader(String),

    #[error("Number of taxa '{0}' is not a positive integer")]
    InvalidSequenceCount(String),

    #[error("Number of sites '{0}' is not an integer")]
    InvalidSequenceLength(String),

    #[error("Header is not followed by any row")]
    NoSequenceData,
}

pub type PhylipResult<T> = Result<T, PhylipError>;

/// Reads `ntax nchar` from the first line.
fn parse_header(header: &str) -> PhylipResult<(usize, usize)> {
    let fields: Vec<&str> = header.split_whitespace().collect();
    let &[taxa, sites, ..] = fields.as_slice() else {
        return Err(PhylipError::InvalidHeader(header.to_string()));
    };
    let ntax = taxa
        .parse::<usize>()
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| PhylipError::InvalidSequenceCount(taxa.to_string()))?;
    let nchar = sites
        .parse::<usize>()
        .map_err(|_| PhylipError::InvalidSequenceLength(sites.to_string()))?;
    Ok((ntax, nchar))
}

/// Reads a PHYLIP alignment. Rows past the header's taxon count are ignored.
pub fn parse_phylip_str(content: &str) -> PhylipResult<Alignment> {
    let mut lines = content.lines().map(str::trim).skip_while(|l| l.is_empty());
    let (ntax, nchar) = parse_header(lines.next().ok_or(PhylipError::EmptyFile)?)?;

    let mut rows: Vec<(String, Vec<u8>)> = Vec::with_capacity(ntax);
    // Index of the next row to extend once inside interleaved continuation blocks
    let mut interleaved: Option<usize> = None;

    for line in lines {
        if line.is_empty() {
            if rows.len() == ntax {
                interleaved = Some(0);
            }
            continue;
        }
        if rows.len() == ntax && rows.iter().all(|(_, data)| data.len() >= nchar) {
            break;
        }

        if let Some(next) = interleaved.as_mut() {
            let row = *next % ntax;
            rows[row].1.extend(strip_whitespace(line));
            *next += 1;
            continue;
        }

        match split_name(line) {
            Some((name, data)) if rows.len() < ntax => rows.push((name.to_string(), data)),
            Some((name, data)) => {
                if let Some(row) = rows.iter_mut().find(|(n, _)| n == name) {
                    row.1.extend(data);
                }
            }
            None => {
                if let Some(last) = rows.last_mut() {
                    last.1.extend(strip_whitespace(line));
                }
            }
        }
    }

    if rows.is_empty() {
        return Err(PhylipError::NoSequenceData);
    }

    Ok(Alignment::new(
        rows.into_iter()
            .map(|(name, data)| Sequence::from_bytes(name, data))
            .collect(),
    ))
}

/// Splits a data line into a name and its sequence symbols.
///
/// Returns `None` for continuation lines that carry only sequence data.
fn split_name(line: &str) -> Option<(&str, Vec<u8>)> {
    // Strict layout: a single word padded to 10 columns, data right after
    if let (Some(name), Some(rest)) = (line.get(..NAME_WIDTH), line.get(NAME_WIDTH..)) {
        let name = name.trim();
        let data = strip_whitespace(rest);
        if !name.is_empty()
            && !name.contains(char::is_whitespace)
            && !data.is_empty()
            && data.iter().all(|&b| is_sequence_symbol(b))
        {
            return Some((name, data));
        }
    }

    // Relaxed layout: name, whitespace, data
    if let Some((name, rest)) = line.split_once(char::is_whitespace) {
        let data = strip_whitespace(rest);
        if !data.is_empty() && data.iter().all(|&b| is_sequence_symbol(b)) {
            return Some((name, data));
        }
    }

    if line.bytes().all(is_sequence_symbol) {
        None
    } else {
        Some((line, Vec::new()))
    }
}

fn strip_whitespace(text: &str) -> Vec<u8> {
    text.bytes().filter(|b| !b.is_ascii_whitespace()).collect()
}

fn is_sequence_symbol(b: u8) -> bool {
    b.is_ascii_alphabetic() || matches!(b, b'-' | b'.' | b'*' | b'?')
}

/// Writes a strict interleaved PHYLIP alignment.
///
/// Names are truncated or padded to 10 columns (whitespace becomes '_');
/// rows of unequal length and names that collide after truncation are rejected.
pub fn write_phylip<W: Write>(writer: &mut W, alignment: &Alignment) -> Result<(), WriteError> {
    if alignment.is_empty() {
        return Err(WriteError::EmptyAlignment);
    }
    if !alignment.is_valid_alignment {
        return Err(WriteError::UnequalLengths(
            alignment.warning.clone().unwrap_or_default(),
        ));
    }

    let mut names: Vec<String> = Vec::with_capacity(alignment.sequence_count());
    for seq in &alignment.sequences {
        let name: String = seq
            .id
            .chars()
            .take(NAME_WIDTH)
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();
        if names.contains(&name) {
            return Err(WriteError::DuplicateName(name));
        }
        names.push(name);
    }

    let length = alignment.alignment_length();
    writeln!(writer, " {} {}", alignment.sequence_count(), length)?;

    let mut start = 0;
    while start < length || start == 0 {
        let end = (start + BLOCK_WIDTH).min(length);
        if start > 0 {
            writeln!(writer)?;
        }
        for (seq, name) in alignment.sequences.iter().zip(&names) {
            if start == 0 {
                write!(writer, "{:<width$}", name, width = NAME_WIDTH)?;
            }
            let block = seq.slice(start..end);
            let chunks: Vec<&str> = block
                .as_bytes()
                .chunks(CHUNK_WIDTH)
                .map(|c| std::str::from_utf8(c).unwrap_or_default())
                .collect();
            writeln!(writer, "{}", chunks.join(" "))?;
        }
        if end == length {
            break;
        }
        start = end;
    }
    Ok(())
}
