//! NEXUS reading and writing.
//!
//! Only the first DATA or CHARACTERS block is read; TAXA, TREES and other
//! blocks are skipped. A supermatrix written here looks like:
//! ```text
//! #NEXUS
//! begin data;
//!     dimensions ntax=2 nchar=9;
//!     format datatype=dna missing=? gap=-;
//! matrix
//! 0 ATGGCCTAA
//! 1 ATG---TAA
//! ;
//! end;
//! ```
//!
//! Commands are case insensitive; bracketed comments are ignored; taxon names
//! may be quoted. The matrix may be sequential (one name, data spanning any
//! number of lines) or interleaved (`FORMAT INTERLEAVE`), and `MATCHCHAR`
//! is resolved against the first row.

use std::io::Write;

use thiserror::Error;

use super::WriteError;
use crate::model::{Alignment, Sequence, SequenceType};

#[derive(Error, Debug)]
pub enum NexusError {
    #[error("First line is not #NEXUS")]
    NotNexus,

    #[error("NEXUS file has no content")]
    EmptyFile,

    #[error("No taxa in a DATA or CHARACTERS block")]
    NoDataBlock,

    #[error("DATA block has no MATRIX")]
    MissingMatrix,

    #[error("MATRIX is not closed by ';'")]
    UnterminatedMatrix,

    #[error("Unterminated comment or quoted name starting at line {0}")]
    Unterminated(usize),
}

pub type NexusResult<T> = Result<T, NexusError>;

/// One lexical token and the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    line: usize,
    quoted: bool,
}

impl Token {
    fn is(&self, keyword: &str) -> bool {
        !self.quoted && self.text.eq_ignore_ascii_case(keyword)
    }
}

/// Splits NEXUS text into tokens. Comments are dropped, quotes removed,
/// and ';' is always a token of its own.
fn tokenize(content: &str) -> NexusResult<Vec<Token>> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut chars = content.chars().peekable();
    let mut line = 1;
    let mut current = String::new();
    let mut current_line = line;

    fn flush(tokens: &mut Vec<Token>, current: &mut String, line: usize) {
        if !current.is_empty() {
            tokens.push(Token {
                text: std::mem::take(current),
                line,
                quoted: false,
            });
        }
    }

    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                flush(&mut tokens, &mut current, current_line);
                line += 1;
            }
            '[' => {
                flush(&mut tokens, &mut current, current_line);
                let start = line;
                let mut depth = 1;
                while depth > 0 {
                    match chars.next() {
                        Some('[') => depth += 1,
                        Some(']') => depth -= 1,
                        Some('\n') => line += 1,
                        Some(_) => {}
                        None => return Err(NexusError::Unterminated(start)),
                    }
                }
            }
            '\'' | '"' => {
                flush(&mut tokens, &mut current, current_line);
                let start = line;
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(q) if q == c => {
                            // A doubled quote stands for the quote itself
                            if chars.peek() == Some(&c) {
                                chars.next();
                                text.push(c);
                            } else {
                                break;
                            }
                        }
                        Some('\n') => {
                            line += 1;
                            text.push(' ');
                        }
                        Some(other) => text.push(other),
                        None => return Err(NexusError::Unterminated(start)),
                    }
                }
                tokens.push(Token {
                    text,
                    line: start,
                    quoted: true,
                });
            }
            ';' => {
                flush(&mut tokens, &mut current, current_line);
                tokens.push(Token {
                    text: ";".to_string(),
                    line,
                    quoted: false,
                });
            }
            c if c.is_whitespace() => flush(&mut tokens, &mut current, current_line),
            c => {
                if current.is_empty() {
                    current_line = line;
                }
                current.push(c);
            }
        }
    }
    flush(&mut tokens, &mut current, current_line);
    Ok(tokens)
}

/// Reads `KEY=VALUE` and bare `KEY` parameters from a command's tokens.
fn parameters(tokens: &[Token]) -> Vec<(String, Option<String>)> {
    let joined = tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" =", "=")
        .replace("= ", "=");
    joined
        .split_whitespace()
        .map(|word| match word.split_once('=') {
            Some((key, value)) => (key.to_uppercase(), Some(value.to_string())),
            None => (word.to_uppercase(), None),
        })
        .collect()
}

/// Layout settings collected from DIMENSIONS and FORMAT.
#[derive(Debug, Default)]
struct MatrixLayout {
    ntax: Option<usize>,
    nchar: Option<usize>,
    interleave: bool,
    matchchar: Option<u8>,
}

/// Reads the first character matrix of a NEXUS document.
pub fn parse_nexus_str(content: &str) -> NexusResult<Alignment> {
    let first = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or(NexusError::EmptyFile)?;
    if !first.to_uppercase().starts_with("#NEXUS") {
        return Err(NexusError::NotNexus);
    }

    let tokens = tokenize(content)?;
    let mut commands = tokens.split(|t| t.is(";"));

    // Seek BEGIN DATA; or BEGIN CHARACTERS;
    commands
        .by_ref()
        .find(|cmd| {
            cmd.windows(2)
                .any(|w| w[0].is("BEGIN") && (w[1].is("DATA") || w[1].is("CHARACTERS")))
        })
        .ok_or(NexusError::NoDataBlock)?;

    let mut layout = MatrixLayout::default();
    for command in commands {
        let Some(keyword) = command.first() else {
            continue;
        };
        if keyword.is("END") || keyword.is("ENDBLOCK") {
            break;
        }
        if keyword.is("DIMENSIONS") {
            for (key, value) in parameters(&command[1..]) {
                let value = value.and_then(|v| v.parse().ok());
                match key.as_str() {
                    "NTAX" => layout.ntax = value,
                    "NCHAR" => layout.nchar = value,
                    _ => {}
                }
            }
        } else if keyword.is("FORMAT") {
            for (key, value) in parameters(&command[1..]) {
                match key.as_str() {
                    "INTERLEAVE" => {
                        layout.interleave = value.map_or(true, |v| !v.eq_ignore_ascii_case("no"))
                    }
                    "MATCHCHAR" => layout.matchchar = value.and_then(|v| v.bytes().next()),
                    _ => {}
                }
            }
        } else if keyword.is("MATRIX") {
            if command.last().map_or(false, |t| t.is("END") || t.is("ENDBLOCK")) {
                return Err(NexusError::UnterminatedMatrix);
            }
            let rows = parse_matrix(&command[1..], &layout);
            if rows.is_empty() {
                return Err(NexusError::NoDataBlock);
            }
            return Ok(Alignment::new(rows));
        }
    }

    Err(NexusError::MissingMatrix)
}

/// Builds rows from the MATRIX tokens.
fn parse_matrix(tokens: &[Token], layout: &MatrixLayout) -> Vec<Sequence> {
    let mut rows: Vec<(String, Vec<u8>)> = Vec::new();
    let full = |rows: &[(String, Vec<u8>)]| layout.ntax.map_or(false, |n| rows.len() >= n);

    if layout.interleave || layout.nchar.is_none() {
        // Line oriented: each line is a name followed by its data
        let mut line_start = 0;
        while line_start < tokens.len() {
            let line = tokens[line_start].line;
            let line_end = tokens[line_start..]
                .iter()
                .position(|t| t.line != line)
                .map_or(tokens.len(), |p| line_start + p);
            let name = &tokens[line_start].text;
            let data: Vec<u8> = tokens[line_start + 1..line_end]
                .iter()
                .flat_map(|t| t.text.bytes())
                .collect();

            if let Some(row) = rows.iter_mut().find(|(n, _)| n == name) {
                row.1.extend(data);
            } else if data.is_empty()
                && !tokens[line_start].quoted
                && !rows.is_empty()
                && !layout.interleave
                && name.bytes().all(is_data_symbol)
            {
                // A data-only continuation line
                if let Some(last) = rows.last_mut() {
                    last.1.extend(name.bytes());
                }
            } else if !full(&rows) {
                rows.push((name.clone(), data));
            }
            line_start = line_end;
        }
    } else {
        // Sequential with a known length: a name, then data until NCHAR symbols
        let nchar = layout.nchar.unwrap_or(0);
        let mut iter = tokens.iter().peekable();
        while let Some(name) = iter.next() {
            if full(&rows) {
                break;
            }
            let mut data = Vec::with_capacity(nchar);
            while data.len() < nchar {
                match iter.next() {
                    Some(token) => data.extend(token.text.bytes()),
                    None => break,
                }
            }
            rows.push((name.text.clone(), data));
        }
    }

    if let Some(mc) = layout.matchchar {
        apply_matchchar(&mut rows, mc);
    }

    rows.into_iter()
        .map(|(name, data)| Sequence::from_bytes(name, data))
        .collect()
}

fn is_data_symbol(b: u8) -> bool {
    b.is_ascii_alphabetic() || matches!(b, b'-' | b'.' | b'*' | b'?')
}

/// Replaces MATCHCHAR symbols with the first row's symbol in the same column.
fn apply_matchchar(rows: &mut [(String, Vec<u8>)], matchchar: u8) {
    let Some((first, rest)) = rows.split_first_mut() else {
        return;
    };
    for (_, data) in rest {
        for (byte, &reference) in data.iter_mut().zip(first.1.iter()) {
            if *byte == matchchar {
                *byte = reference;
            }
        }
    }
}

/// Quotes a taxon name when it contains whitespace or NEXUS punctuation.
fn quote_name(name: &str) -> String {
    let needs_quotes = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || "()[]{}/\\,;:=*'\"`<>".contains(c));
    if needs_quotes {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}

/// Writes the alignment as a NEXUS DATA block.
pub fn write_nexus<W: Write>(writer: &mut W, alignment: &Alignment) -> Result<(), WriteError> {
    if alignment.is_empty() {
        return Err(WriteError::EmptyAlignment);
    }
    if !alignment.is_valid_alignment {
        return Err(WriteError::UnequalLengths(
            alignment.warning.clone().unwrap_or_default(),
        ));
    }

    let datatype = match alignment.sequence_type {
        SequenceType::Nucleotide => "dna",
        SequenceType::AminoAcid => "protein",
    };
    let names: Vec<String> = alignment.sequences.iter().map(|s| quote_name(&s.id)).collect();
    let width = names.iter().map(String::len).max().unwrap_or(0) + 1;

    writeln!(writer, "#NEXUS")?;
    writeln!(writer, "begin data;")?;
    writeln!(
        writer,
        "\tdimensions ntax={} nchar={};",
        alignment.sequence_count(),
        alignment.alignment_length()
    )?;
    writeln!(writer, "\tformat datatype={} missing=? gap=-;", datatype)?;
    writeln!(writer, "matrix")?;
    for (seq, name) in alignment.sequences.iter().zip(&names) {
        writeln!(writer, "{:<width$}{}", name, seq.as_str(), width = width)?;
    }
    writeln!(writer, ";")?;
    writeln!(writer, "end;")?;
    Ok(())
}
