//! Codon-aware back-translation.
//!
//! Maps a gapped amino-acid alignment row back onto the coding sequence it
//! was translated from. Every aligned residue consumes the next in-frame
//! codon, which must translate to that residue under the chosen genetic
//! code; every gap becomes `---`.
//!
//! A record either reconstructs completely or fails with a
//! `BackTranslateError`. Batches pair rows with coding sequences by the
//! leading identifier token and keep going past failed records.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use crate::formats::fasta::{self, FastaError};
use crate::genetic_code::GeneticCode;
use crate::model::{Alignment, AlphabetError, Alphabet, Sequence, GAP};

/// Placeholder emitted for each gap column.
pub const GAP_CODON: &[u8; 3] = b"---";

/// Why a single record could not be back-translated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackTranslateError {
    #[error("nucleotide sequence holds {codons} codons but the protein row has {residues} residues")]
    InsufficientSequence { codons: usize, residues: usize },

    #[error("column {position}: codon {codon} translates to '{translated}', alignment has '{expected}'")]
    CodonMismatch {
        position: usize,
        expected: char,
        codon: String,
        translated: char,
    },
}

/// Trailing nucleotides dropped to restore the reading frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTruncation {
    pub id: String,
    pub removed: usize,
}

/// Returns the truncation notice for a coding sequence whose length is not a multiple of 3.
pub fn frame_truncation(nucleotides: &Sequence) -> Option<FrameTruncation> {
    match nucleotides.len() % 3 {
        0 => None,
        removed => Some(FrameTruncation {
            id: nucleotides.id.clone(),
            removed,
        }),
    }
}

/// Back-translates one gapped amino-acid row using its coding sequence.
///
/// The result keeps the protein row's identifier and is exactly three times
/// as long as the row. A trailing partial codon in `nucleotides` is dropped
/// with a warning.
pub fn back_translate(
    protein: &Sequence,
    nucleotides: &Sequence,
    code: &GeneticCode,
) -> Result<Sequence, BackTranslateError> {
    let mut source = nucleotides.as_bytes();
    if let Some(notice) = frame_truncation(nucleotides) {
        warn!(
            "{}: length {} is not a multiple of 3, removing {} trailing nucleotide(s)",
            notice.id,
            source.len(),
            notice.removed
        );
        source = &source[..source.len() - notice.removed];
    }

    let codons = source.len() / 3;
    let residues = protein.residue_count();
    if codons < residues {
        return Err(BackTranslateError::InsufficientSequence { codons, residues });
    }

    let mut out = Vec::with_capacity(protein.len() * 3);
    let mut gaps = 0;
    for (n, &aa) in protein.as_bytes().iter().enumerate() {
        if aa == GAP {
            out.extend_from_slice(GAP_CODON);
            gaps += 1;
            continue;
        }
        let pos = (n - gaps) * 3;
        let codon = &source[pos..pos + 3];
        let translated = code.translate_codon(codon);
        if !translated.eq_ignore_ascii_case(&char::from(aa)) {
            return Err(BackTranslateError::CodonMismatch {
                position: n,
                expected: char::from(aa),
                codon: String::from_utf8_lossy(codon).into_owned(),
                translated,
            });
        }
        out.extend_from_slice(codon);
    }

    Ok(Sequence::from_bytes(protein.id.clone(), out))
}

/// A record-level failure inside a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error(transparent)]
    BackTranslate(#[from] BackTranslateError),

    #[error(transparent)]
    Alphabet(#[from] AlphabetError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Identifier of the amino-acid row
    pub id: String,
    pub error: RecordError,
}

/// Outcome of back-translating a whole alignment.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Reconstructed records, in amino-acid alignment order
    pub records: Vec<Sequence>,
    pub failures: Vec<RecordFailure>,
    pub truncations: Vec<FrameTruncation>,
    /// Amino-acid identifiers without a nucleotide partner
    pub unpaired: Vec<String>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.unpaired.is_empty()
    }
}

/// Back-translates every row of `proteins` against its partner in `nucleotides`.
///
/// Rows are paired on the identifier text before the first '_'; each output
/// record is named after that token. A failed record is reported and left out;
/// it never stops the rest of the batch.
pub fn back_translate_alignment(
    proteins: &Alignment,
    nucleotides: &Alignment,
    code: &GeneticCode,
) -> BatchReport {
    if let Some(warning) = &proteins.warning {
        warn!("Amino-acid input: {}", warning);
    }

    let mut partners: HashMap<&str, &Sequence> = HashMap::with_capacity(nucleotides.sequence_count());
    for nuc in &nucleotides.sequences {
        match partners.entry(nuc.leading_token()) {
            Entry::Occupied(_) => warn!(
                "Nucleotide records share the identifier token '{}'; keeping the first",
                nuc.leading_token()
            ),
            Entry::Vacant(slot) => {
                slot.insert(nuc);
            }
        }
    }

    let mut report = BatchReport::default();
    for protein in &proteins.sequences {
        let Some(&nuc) = partners.get(protein.leading_token()) else {
            warn!("{}: no nucleotide record with token '{}'", protein.id, protein.leading_token());
            report.unpaired.push(protein.id.clone());
            continue;
        };

        match translate_pair(protein, nuc, code, &mut report.truncations) {
            Ok(codons) => {
                debug!("{}: back-translated {} columns", protein.id, protein.len());
                report
                    .records
                    .push(Sequence::new(nuc.leading_token(), codons.as_str()));
            }
            Err(error) => {
                warn!("{}: skipped, {}", protein.id, error);
                report.failures.push(RecordFailure {
                    id: protein.id.clone(),
                    error,
                });
            }
        }
    }
    report
}

/// Validates both records, then back-translates them.
fn translate_pair(
    protein: &Sequence,
    nuc: &Sequence,
    code: &GeneticCode,
    truncations: &mut Vec<FrameTruncation>,
) -> Result<Sequence, RecordError> {
    protein.validate(Alphabet::AminoAcid)?;
    nuc.validate(Alphabet::Nucleotide)?;
    if let Some(notice) = frame_truncation(nuc) {
        truncations.push(notice);
    }
    Ok(back_translate(protein, nuc, code)?)
}

/// File-level errors of a back-translation batch.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Cannot read {}: {source}", .path.display())]
    Read { path: PathBuf, source: FastaError },

    #[error("Cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No record of {} could be back-translated ({skipped} left out)", .path.display())]
    NoRecords { path: PathBuf, skipped: usize },
}

/// Reads an aligned amino-acid FASTA and its coding sequences, back-translates
/// every pair and writes the codon alignment to `output`.
///
/// Nothing is written when no record survives; the batch fails with
/// `BatchError::NoRecords` instead.
pub fn back_translate_files<P, Q, R>(
    alignment: P,
    nucleotides: Q,
    output: R,
    code: &GeneticCode,
) -> Result<BatchReport, BatchError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
{
    let read = |path: &Path| {
        fasta::parse_fasta_file(path).map_err(|source| BatchError::Read {
            path: path.to_path_buf(),
            source,
        })
    };
    let proteins = read(alignment.as_ref())?;
    let nucleotides = read(nucleotides.as_ref())?;

    let report = back_translate_alignment(&proteins, &nucleotides, code);

    let output = output.as_ref();
    if report.records.is_empty() {
        // Drop a codon file left by an earlier run
        if output.exists() {
            fs::remove_file(output).map_err(|source| BatchError::Write {
                path: output.to_path_buf(),
                source,
            })?;
        }
        return Err(BatchError::NoRecords {
            path: alignment.as_ref().to_path_buf(),
            skipped: report.failures.len() + report.unpaired.len(),
        });
    }
    fasta::write_fasta_file(output, &report.records).map_err(|source| BatchError::Write {
        path: output.to_path_buf(),
        source,
    })?;
    info!(
        "Wrote {} codon-aligned records to {} ({} skipped)",
        report.records.len(),
        output.display(),
        report.failures.len() + report.unpaired.len()
    );
    Ok(report)
}

/// Back-translation of one gene inside a directory.
#[derive(Debug)]
pub struct GeneBatch {
    pub gene: String,
    pub output: PathBuf,
    pub result: Result<BatchReport, BatchError>,
}

/// Back-translates `<GENE>_aa.aln` against `<GENE>.fasta` into `<GENE>_codon.aln`
/// for every gene in `genes` whose two inputs exist in `dir`.
///
/// One gene failing (unreadable input, unwritable output) does not stop the others.
pub fn back_translate_genes<S: AsRef<str>>(dir: &Path, genes: &[S], code: &GeneticCode) -> Vec<GeneBatch> {
    let mut batches = Vec::new();
    for gene in genes {
        let gene = gene.as_ref();
        let alignment = dir.join(format!("{}_aa.aln", gene));
        let nucleotides = dir.join(format!("{}.fasta", gene));
        if !alignment.is_file() || !nucleotides.is_file() {
            debug!("{}: no amino-acid alignment or coding sequences, skipping", gene);
            continue;
        }
        let output = dir.join(format!("{}_codon.aln", gene));
        let result = back_translate_files(&alignment, &nucleotides, &output, code);
        if let Err(e) = &result {
            warn!("{}: back-translation failed: {}", gene, e);
        }
        batches.push(GeneBatch {
            gene: gene.to_string(),
            output,
            result,
        });
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic_code::GeneticCodes;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_cds(rng: &mut StdRng, codons: usize) -> String {
        (0..codons * 3)
            .map(|_| ['A', 'C', 'G', 'T'][rng.random_range(0..4)])
            .collect()
    }

    #[test]
    fn test_round_trip_every_table() {
        let codes = GeneticCodes::new();
        let mut rng = StdRng::seed_from_u64(7);
        for code in codes.all() {
            for _ in 0..20 {
                let len = rng.random_range(0..200);
                let cds = random_cds(&mut rng, len);
                let protein = code.translate_sequence(cds.as_bytes(), 0);

                let result = back_translate(
                    &Sequence::new("p", protein),
                    &Sequence::new("n", cds.clone()),
                    code,
                )
                .unwrap();
                assert_eq!(result.as_str(), cds, "table {}", code.id);
            }
        }
    }

    #[test]
    fn test_gaps_become_gap_codons() {
        let codes = GeneticCodes::new();
        let code = codes.get(2).unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..50 {
            let cds = random_cds(&mut rng, 60);
            let protein = code.translate_sequence(cds.as_bytes(), 0);
            let mut row = String::new();
            for aa in protein.chars() {
                while rng.random_range(0..4) == 0 {
                    row.push('-');
                }
                row.push(aa);
            }
            row.push('-');

            let result = back_translate(&Sequence::new("p", row.clone()), &Sequence::new("n", cds.clone()), code)
                .unwrap();

            assert_eq!(result.len(), 3 * row.len());
            for (i, symbol) in row.bytes().enumerate() {
                let codon = result.slice(3 * i..3 * i + 3);
                if symbol == GAP {
                    assert_eq!(codon, "---");
                } else {
                    assert_eq!(code.translate_codon(codon.as_bytes()), char::from(symbol));
                }
            }
            assert_eq!(result.as_str().replace('-', ""), cds);
        }
    }

    #[test]
    fn test_mismatch_reports_column() {
        let codes = GeneticCodes::new();
        let standard = codes.default_code();

        // M F K, third codon corrupted to GAA (E)
        let err = back_translate(
            &Sequence::new("p", "MFK"),
            &Sequence::new("n", "ATGTTTGAA"),
            standard,
        )
        .unwrap_err();
        assert_eq!(
            err,
            BackTranslateError::CodonMismatch {
                position: 2,
                expected: 'K',
                codon: "GAA".to_string(),
                translated: 'E',
            }
        );

        // Column counts include gaps; TTT -> TCT (S) is the second residue
        let err = back_translate(
            &Sequence::new("p", "M--FK"),
            &Sequence::new("n", "ATGTCTAAA"),
            standard,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BackTranslateError::CodonMismatch { position: 3, expected: 'F', translated: 'S', .. }
        ));
    }

    #[test]
    fn test_mitochondrial_code_matters() {
        let codes = GeneticCodes::new();
        // TGA is Trp in vertebrate mitochondria, stop in the standard code
        let protein = Sequence::new("p", "MW");
        let cds = Sequence::new("n", "ATGTGA");

        assert!(back_translate(&protein, &cds, codes.get(2).unwrap()).is_ok());
        assert!(matches!(
            back_translate(&protein, &cds, codes.get(1).unwrap()),
            Err(BackTranslateError::CodonMismatch { position: 1, translated: '*', .. })
        ));
    }

    #[test]
    fn test_truncates_partial_codon() {
        let codes = GeneticCodes::new();
        let standard = codes.default_code();
        for cds in ["ATGTTTAAAC", "ATGTTTAAACG"] {
            let nuc = Sequence::new("n", cds);
            assert_eq!(frame_truncation(&nuc).unwrap().removed, cds.len() - 9);

            let result = back_translate(&Sequence::new("p", "M-FK"), &nuc, standard).unwrap();
            assert_eq!(result.as_str(), "ATG---TTTAAA");
        }
        assert!(frame_truncation(&Sequence::new("n", "ATG")).is_none());
    }

    #[test]
    fn test_insufficient_sequence() {
        let codes = GeneticCodes::new();
        let standard = codes.default_code();

        let err = back_translate(
            &Sequence::new("p", "M-FK"),
            &Sequence::new("n", "ATGTTTAA"),
            standard,
        )
        .unwrap_err();
        assert_eq!(err, BackTranslateError::InsufficientSequence { codons: 2, residues: 3 });
    }

    #[test]
    fn test_extra_codons_are_ignored() {
        let codes = GeneticCodes::new();
        // Trailing stop codon absent from the alignment
        let result = back_translate(
            &Sequence::new("p", "MF"),
            &Sequence::new("n", "ATGTTTTAA"),
            codes.default_code(),
        )
        .unwrap();
        assert_eq!(result.as_str(), "ATGTTT");
    }

    #[test]
    fn test_case_insensitive_comparison() {
        let codes = GeneticCodes::new();
        let result = back_translate(
            &Sequence::new("p", "mf"),
            &Sequence::new("n", "atgttt"),
            codes.default_code(),
        )
        .unwrap();
        assert_eq!(result.as_str(), "atgttt");
    }

    #[test]
    fn test_batch_continues_past_bad_record() {
        let codes = GeneticCodes::new();
        let code = codes.get(2).unwrap();

        let proteins = Alignment::new(vec![
            Sequence::new("0_COX1", "MF-K"),
            Sequence::new("1_COX1", "MFWK"),
            Sequence::new("2_COX1", "M-FK"),
        ]);
        let nucleotides = Alignment::new(vec![
            Sequence::new("2_COX1", "ATGTTTAAA"),
            Sequence::new("0_COX1", "ATGTTCAAG"),
            // TGA (W) replaced by AGA (stop in this code)
            Sequence::new("1_COX1", "ATGTTTAGAAAA"),
        ]);

        let report = back_translate_alignment(&proteins, &nucleotides, code);

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].id, "0");
        assert_eq!(report.records[0].as_str(), "ATGTTC---AAG");
        assert_eq!(report.records[1].id, "2");
        assert_eq!(report.records[1].as_str(), "ATG---TTTAAA");

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "1_COX1");
        assert!(matches!(
            report.failures[0].error,
            RecordError::BackTranslate(BackTranslateError::CodonMismatch { position: 2, .. })
        ));
        assert!(!report.is_clean());
    }

    #[test]
    fn test_batch_reports_unpaired_and_invalid() {
        let codes = GeneticCodes::new();
        let proteins = Alignment::new(vec![
            Sequence::new("0_ND1", "MF"),
            Sequence::new("1_ND1", "MF"),
            Sequence::new("5_ND1", "MF"),
        ]);
        let nucleotides = Alignment::new(vec![
            Sequence::new("0_ND1", "ATGTTTA"),
            Sequence::new("1_ND1", "ATG-TTT"),
            Sequence::new("1_ND1", "ATGTTT"),
        ]);

        let report = back_translate_alignment(&proteins, &nucleotides, codes.get(2).unwrap());

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].as_str(), "ATGTTT");
        assert_eq!(report.unpaired, vec!["5_ND1".to_string()]);
        assert_eq!(report.truncations, vec![FrameTruncation { id: "0_ND1".into(), removed: 1 }]);
        // First record with a shared token wins, and it holds a gap
        assert!(matches!(
            &report.failures[0].error,
            RecordError::Alphabet(e) if e.position == 3
        ));
    }

    #[test]
    fn test_back_translate_files_and_genes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ND1_aa.aln"), ">0_ND1\nM-F\n>1_ND1\nMWF\n").unwrap();
        std::fs::write(dir.path().join("ND1.fasta"), ">0_ND1\nATGTTT\n>1_ND1\nATGTGGTTC\n").unwrap();
        // Only the alignment exists for ND2
        std::fs::write(dir.path().join("ND2_aa.aln"), ">0_ND2\nM\n").unwrap();

        let codes = GeneticCodes::new();
        let batches = back_translate_genes(dir.path(), &["ND1", "ND2"], codes.get(2).unwrap());

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].gene, "ND1");
        let report = batches[0].result.as_ref().unwrap();
        assert!(report.is_clean());

        let written = fasta::parse_fasta_file(&batches[0].output).unwrap();
        assert_eq!(written.get(0).unwrap().id, "0");
        assert_eq!(written.get(0).unwrap().as_str(), "ATG---TTT");
        assert_eq!(written.get(1).unwrap().as_str(), "ATGTGGTTC");
    }

    #[test]
    fn test_gene_without_surviving_records_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("COX1_aa.aln"), ">0_COX1\nMA\n>1_COX1\nMA\n").unwrap();
        std::fs::write(dir.path().join("COX1.fasta"), ">0_COX1\nATGGCC\n>1_COX1\nATGGCC\n").unwrap();
        // Every ND3 row disagrees with its coding sequence
        std::fs::write(dir.path().join("ND3_aa.aln"), ">0_ND3\nMK\n>1_ND3\nMK\n").unwrap();
        std::fs::write(dir.path().join("ND3.fasta"), ">0_ND3\nATGTGG\n>1_ND3\nATGTGG\n").unwrap();
        // Left over from an earlier run
        std::fs::write(dir.path().join("ND3_codon.aln"), ">0\nATGAAA\n").unwrap();

        let codes = GeneticCodes::new();
        let batches = back_translate_genes(dir.path(), &["COX1", "ND3"], codes.get(2).unwrap());

        assert_eq!(batches.len(), 2);
        assert!(batches[0].result.is_ok());
        assert!(batches[0].output.is_file());

        assert_eq!(batches[1].gene, "ND3");
        assert!(matches!(
            batches[1].result,
            Err(BatchError::NoRecords { skipped: 2, .. })
        ));
        assert!(!batches[1].output.exists());
    }

    #[test]
    fn test_back_translate_files_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let codes = GeneticCodes::new();
        let result = back_translate_files(
            dir.path().join("a.aln"),
            dir.path().join("n.fasta"),
            dir.path().join("out.aln"),
            codes.default_code(),
        );
        assert!(matches!(result, Err(BatchError::Read { .. })));
    }
}
