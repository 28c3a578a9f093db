//! Data model for sequences and alignments.
//!
//! This module contains the value types shared by every pipeline step:
//! - `Sequence`: an identifier plus its symbols
//! - `Alphabet`: symbol validation for nucleotide and amino-acid data
//! - `Alignment`: an ordered set of sequences with length bookkeeping

use std::ops::Range;

use thiserror::Error;

/// The gap symbol used in every alignment.
pub const GAP: u8 = b'-';

/// A symbol outside the expected alphabet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Sequence '{id}' has invalid {alphabet} symbol '{symbol}' at position {position}")]
pub struct AlphabetError {
    pub id: String,
    pub alphabet: Alphabet,
    pub position: usize,
    pub symbol: char,
}

/// Symbol sets accepted by `Sequence::checked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    /// IUPAC nucleotide codes, ungapped
    Nucleotide,
    /// IUPAC amino acids, stop and gap
    AminoAcid,
}

impl Alphabet {
    /// Returns true if `symbol` belongs to this alphabet (case-insensitive).
    pub fn contains(self, symbol: u8) -> bool {
        let upper = symbol.to_ascii_uppercase();
        match self {
            Alphabet::Nucleotide => b"ACGTURYSWKMBDHVN".contains(&upper),
            Alphabet::AminoAcid => {
                upper.is_ascii_uppercase() || upper == b'*' || upper == GAP
            }
        }
    }
}

impl std::fmt::Display for Alphabet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Alphabet::Nucleotide => write!(f, "nucleotide"),
            Alphabet::AminoAcid => write!(f, "amino acid"),
        }
    }
}

/// A named run of sequence symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    /// Header text up to the first whitespace
    pub id: String,
    data: String,
}

impl Sequence {
    pub fn new(id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }

    /// Creates a sequence from raw bytes. Invalid UTF-8 is replaced lossily.
    pub fn from_bytes(id: impl Into<String>, data: Vec<u8>) -> Self {
        let data = String::from_utf8(data)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
        Self {
            id: id.into(),
            data,
        }
    }

    /// Creates a sequence after checking every symbol against `alphabet`.
    pub fn checked(
        id: impl Into<String>,
        data: impl Into<String>,
        alphabet: Alphabet,
    ) -> Result<Self, AlphabetError> {
        let seq = Self::new(id, data);
        seq.validate(alphabet)?;
        Ok(seq)
    }

    /// Checks every symbol against `alphabet`.
    pub fn validate(&self, alphabet: Alphabet) -> Result<(), AlphabetError> {
        match self.data.bytes().position(|b| !alphabet.contains(b)) {
            None => Ok(()),
            Some(position) => Err(AlphabetError {
                id: self.id.clone(),
                alphabet,
                position,
                symbol: self.data[position..].chars().next().unwrap_or('?'),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Symbols in `range`, clamped to the sequence end. A reversed range is empty.
    pub fn slice(&self, range: Range<usize>) -> &str {
        let end = range.end.min(self.data.len());
        &self.data[range.start.min(end)..end]
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Number of non-gap symbols.
    pub fn residue_count(&self) -> usize {
        self.data.bytes().filter(|&b| b != GAP).count()
    }

    /// The identifier up to the first '_' (the species code for extracted records).
    pub fn leading_token(&self) -> &str {
        leading_token(&self.id)
    }

    /// Returns a copy with every gap removed.
    pub fn without_gaps(&self) -> Sequence {
        Sequence::new(
            self.id.clone(),
            self.data.chars().filter(|&c| c != GAP as char).collect::<String>(),
        )
    }
}

/// The part of an identifier before the first '_'.
pub fn leading_token(id: &str) -> &str {
    id.split('_').next().unwrap_or(id)
}

/// Type of sequence data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceType {
    #[default]
    Nucleotide,
    AminoAcid,
}

impl SequenceType {
    /// Guesses the type from content: nucleotide when at least 90% of
    /// non-gap symbols are A, C, G, T, U or N.
    pub fn detect(sequences: &[Sequence]) -> Self {
        let mut total = 0usize;
        let mut nucleotide = 0usize;
        for b in sequences.iter().flat_map(|s| s.as_bytes()) {
            let upper = b.to_ascii_uppercase();
            if upper == GAP || upper == b'?' || upper == b'.' {
                continue;
            }
            total += 1;
            if matches!(upper, b'A' | b'C' | b'G' | b'T' | b'U' | b'N') {
                nucleotide += 1;
            }
        }
        if total == 0 || nucleotide * 10 >= total * 9 {
            SequenceType::Nucleotide
        } else {
            SequenceType::AminoAcid
        }
    }
}

/// Rows read from one alignment file, with their shared length.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub sequences: Vec<Sequence>,
    /// Detected from content; callers may override it
    pub sequence_type: SequenceType,
    /// Longest row
    width: usize,
    /// All rows share one length
    pub is_valid_alignment: bool,
    /// Set when the rows disagree in length
    pub warning: Option<String>,
}

impl Alignment {
    pub fn new(sequences: Vec<Sequence>) -> Self {
        let (shortest, longest) = sequences
            .iter()
            .map(Sequence::len)
            .fold(None, |range: Option<(usize, usize)>, len| match range {
                None => Some((len, len)),
                Some((lo, hi)) => Some((lo.min(len), hi.max(len))),
            })
            .unwrap_or((0, 0));
        let warning = (shortest != longest).then(|| {
            format!(
                "Rows range from {} to {} symbols; this is not an alignment",
                shortest, longest
            )
        });
        Self {
            sequence_type: SequenceType::detect(&sequences),
            sequences,
            width: longest,
            is_valid_alignment: warning.is_none(),
            warning,
        }
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    /// Number of columns (the longest row when rows differ).
    pub fn alignment_length(&self) -> usize {
        self.width
    }

    pub fn get(&self, index: usize) -> Option<&Sequence> {
        self.sequences.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Same sequences with every gap removed.
    pub fn without_gaps(&self) -> Alignment {
        let mut degapped = Alignment::new(self.sequences.iter().map(Sequence::without_gaps).collect());
        degapped.sequence_type = self.sequence_type;
        degapped
    }
}
