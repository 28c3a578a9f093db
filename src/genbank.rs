//! Per-gene extraction from annotated mitochondrial genomes.
//!
//! Every GenBank file is one genome. Genomes get a numeric species code (their
//! position in the sorted file list) and each protein-coding gene is written
//! to `<GENE>.fasta` with records named `<code>_<GENE>`, so that later steps
//! can join genes back per organism by the leading identifier token.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use gb_io::reader::SeqReader;
use gb_io::seq::{Feature, Location, Seq};
use log::{debug, info, warn};
use thiserror::Error;

use crate::formats::fasta;
use crate::genes::{GeneTable, DLOOP};
use crate::genetic_code::GeneticCode;
use crate::model::{Alphabet, AlphabetError, Sequence};

/// File mapping species codes to organism names.
pub const SPECIES_CODE_FILE: &str = "species_code.txt";

#[derive(Error, Debug)]
pub enum GenbankError {
    #[error("Less than 2 GenBank files found ({0}); check the input directory and extensions")]
    TooFewFiles(usize),

    #[error("Cannot read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("{} was not recognized as GenBank: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("{} holds no GenBank record", .path.display())]
    NoRecord { path: PathBuf },

    #[error("{}: {name} is not a known gene. Use one of: {known}", .path.display())]
    UnknownGene {
        path: PathBuf,
        name: String,
        known: String,
    },

    #[error("{}: CDS at {location} has neither a gene nor a product qualifier", .path.display())]
    UnnamedFeature { path: PathBuf, location: String },

    #[error("{}: cannot extract {name} from location {location}", .path.display())]
    BadLocation {
        path: PathBuf,
        name: String,
        location: String,
    },

    #[error("{}: {source}", .path.display())]
    Symbol { path: PathBuf, source: AlphabetError },

    #[error("Cannot write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

pub type GenbankResult<T> = Result<T, GenbankError>;

/// How genes are extracted from the genomes.
#[derive(Debug, Clone, Copy)]
pub struct SplitOptions<'a> {
    pub genes: &'a GeneTable,
    pub code: &'a GeneticCode,
    /// Also write translated proteins to `<GENE>_prot.fasta`.
    pub protein: bool,
}

/// One input genome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genome {
    pub code: usize,
    pub path: PathBuf,
    pub organism: Option<String>,
}

/// What `split_genomes` wrote.
#[derive(Debug, Default)]
pub struct SplitSummary {
    pub genomes: Vec<Genome>,
    /// Genes present in every genome, in gene table order.
    pub genes: Vec<String>,
    /// Genes missing from at least one genome, with the number of genomes holding them.
    pub dropped: Vec<(String, usize)>,
}

/// Lists the files in `dir` whose name ends with one of `extensions`, sorted by name.
pub fn find_genomes<S: AsRef<str>>(dir: &Path, extensions: &[S]) -> GenbankResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| GenbankError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| GenbankError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && extensions.iter().any(|ext| name.ends_with(ext.as_ref())) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Splits the genomes in `files` into per-gene FASTA files inside `outdir`.
///
/// Genome `n` of `files` gets species code `n`; `species_code.txt` records the
/// organism behind each code. A gene missing from any genome is not written.
pub fn split_genomes(
    files: &[PathBuf],
    outdir: &Path,
    options: &SplitOptions<'_>,
) -> GenbankResult<SplitSummary> {
    if files.len() < 2 {
        return Err(GenbankError::TooFewFiles(files.len()));
    }

    let collect_dloop = !options.protein && options.genes.contains(DLOOP);
    let mut nucleotides: BTreeMap<String, Vec<Sequence>> = BTreeMap::new();
    let mut proteins: BTreeMap<String, Vec<Sequence>> = BTreeMap::new();
    let mut summary = SplitSummary::default();

    for (code, path) in files.iter().enumerate() {
        info!("Reading {}", path.display());
        let record = read_genome(path)?;
        let organism = organism(&record);
        if organism.is_none() {
            warn!("File {} has no source feature", path.display());
        }

        for gene in extract_genes(&record, path, options.genes, collect_dloop)? {
            let id = format!("{}_{}", code, gene.name);
            let entry = nucleotides.entry(gene.name.clone()).or_default();
            if entry.iter().any(|s| s.id == id) {
                warn!("{}: {} annotated more than once, keeping the first", path.display(), gene.name);
                continue;
            }
            if options.protein {
                let protein = options.code.translate_sequence(&gene.data, 0);
                proteins
                    .entry(gene.name.clone())
                    .or_default()
                    .push(Sequence::new(id.clone(), protein));
            }
            let nucleotide = Sequence::checked(id, String::from_utf8_lossy(&gene.data), Alphabet::Nucleotide)
                .map_err(|source| GenbankError::Symbol {
                    path: path.clone(),
                    source,
                })?;
            entry.push(nucleotide);
        }

        summary.genomes.push(Genome {
            code,
            path: path.clone(),
            organism,
        });
    }

    for gene in options.genes.genes() {
        if gene == DLOOP && !collect_dloop {
            continue;
        }
        let records = nucleotides.remove(gene).unwrap_or_default();
        if records.len() < files.len() {
            warn!(
                "{}: this gene is not present in all GenBank files ({}/{}). Gene removed.",
                gene,
                records.len(),
                files.len()
            );
            summary.dropped.push((gene.clone(), records.len()));
            continue;
        }
        write_records(&outdir.join(format!("{}.fasta", gene)), &records)?;
        if let Some(translated) = proteins.remove(gene) {
            write_records(&outdir.join(format!("{}_prot.fasta", gene)), &translated)?;
        }
        summary.genes.push(gene.clone());
    }

    write_species_codes(&outdir.join(SPECIES_CODE_FILE), &summary.genomes)?;
    info!(
        "Extracted {} genes from {} genomes ({} dropped)",
        summary.genes.len(),
        summary.genomes.len(),
        summary.dropped.len()
    );
    Ok(summary)
}

fn read_genome(path: &Path) -> GenbankResult<Seq> {
    let file = File::open(path).map_err(|source| GenbankError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match SeqReader::new(file).next() {
        Some(Ok(record)) => Ok(record),
        Some(Err(e)) => Err(GenbankError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        None => Err(GenbankError::NoRecord {
            path: path.to_path_buf(),
        }),
    }
}

/// Organism of the `source` feature, whitespace replaced by `_`.
fn organism(record: &Seq) -> Option<String> {
    record
        .features
        .iter()
        .find(|f| f.kind.to_string().eq_ignore_ascii_case("source"))
        .and_then(|f| qualifier(f, "organism"))
        .map(|name| name.split_whitespace().collect::<Vec<_>>().join("_"))
}

fn qualifier(feature: &Feature, key: &str) -> Option<String> {
    feature
        .qualifier_values(key.into())
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

struct GeneSequence {
    name: String,
    data: Vec<u8>,
}

fn extract_genes(
    record: &Seq,
    path: &Path,
    table: &GeneTable,
    collect_dloop: bool,
) -> GenbankResult<Vec<GeneSequence>> {
    let mut genes = Vec::new();
    let mut dloop_seen = false;

    for feature in &record.features {
        let kind = feature.kind.to_string();
        let name = if kind.eq_ignore_ascii_case("CDS") {
            let Some(label) = qualifier(feature, "gene").or_else(|| qualifier(feature, "product"))
            else {
                return Err(GenbankError::UnnamedFeature {
                    path: path.to_path_buf(),
                    location: format!("{:?}", feature.location),
                });
            };
            let label = label.to_uppercase();
            match table.canonical(&label) {
                Some(canonical) => canonical.to_string(),
                None => {
                    return Err(GenbankError::UnknownGene {
                        path: path.to_path_buf(),
                        name: label,
                        known: table.genes().join(" "),
                    })
                }
            }
        } else if collect_dloop
            && (kind.eq_ignore_ascii_case("misc_feature") || kind.eq_ignore_ascii_case("D-loop"))
        {
            if dloop_seen {
                debug!("{}: ignoring extra {} at {:?}", path.display(), kind, feature.location);
                continue;
            }
            dloop_seen = true;
            DLOOP.to_string()
        } else {
            continue;
        };

        let Some(data) = extract_location(&feature.location, &record.seq) else {
            return Err(GenbankError::BadLocation {
                path: path.to_path_buf(),
                name,
                location: format!("{:?}", feature.location),
            });
        };
        genes.push(GeneSequence { name, data });
    }
    Ok(genes)
}

/// Sequence covered by `location`: ranges are 0-based half-open, joins are
/// concatenated in order and complements reverse-complemented.
fn extract_location(location: &Location, seq: &[u8]) -> Option<Vec<u8>> {
    match location {
        Location::Range((a, _), (b, _)) => {
            let start = usize::try_from((*a).min(*b)).ok()?;
            let end = usize::try_from((*a).max(*b)).ok()?;
            seq.get(start..end).map(<[u8]>::to_vec)
        }
        Location::Complement(inner) => extract_location(inner, seq).map(|s| reverse_complement(&s)),
        Location::Join(parts) | Location::Order(parts) => {
            let mut out = Vec::new();
            for part in parts {
                out.extend(extract_location(part, seq)?);
            }
            Some(out)
        }
        _ => None,
    }
}

/// Reverse complement over the IUPAC nucleotide alphabet, keeping case.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

fn complement(base: u8) -> u8 {
    let upper = match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'T' | b'U' => b'A',
        b'G' => b'C',
        b'C' => b'G',
        b'R' => b'Y',
        b'Y' => b'R',
        b'K' => b'M',
        b'M' => b'K',
        b'B' => b'V',
        b'V' => b'B',
        b'D' => b'H',
        b'H' => b'D',
        other => other,
    };
    if base.is_ascii_lowercase() {
        upper.to_ascii_lowercase()
    } else {
        upper
    }
}

fn write_records(path: &Path, records: &[Sequence]) -> GenbankResult<()> {
    debug!("Writing {} records to {}", records.len(), path.display());
    fasta::write_fasta_file(path, records).map_err(|source| GenbankError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn write_species_codes(path: &Path, genomes: &[Genome]) -> GenbankResult<()> {
    let write = || -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        for genome in genomes {
            if let Some(organism) = &genome.organism {
                writeln!(writer, "{} {}", genome.code, organism)?;
            }
        }
        writer.flush()
    };
    write().map_err(|source| GenbankError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic_code::GeneticCodes;

    // 1..9 COX1, complement(10..18) ND6, join(19..21,25..30) CYTB, 31..40 D-loop
    const GENOME: &str = "ATGGCCTAACTAAAACATATGCCCTGGTAAGGGGGCCCCCACGTACGTACGTACGTACGT";

    fn origin(seq: &str) -> String {
        let mut out = String::from("ORIGIN\n");
        for (line, chunk) in seq.as_bytes().chunks(60).enumerate() {
            out.push_str(&format!("{:>9}", line * 60 + 1));
            for block in chunk.chunks(10) {
                out.push(' ');
                out.push_str(&String::from_utf8_lossy(block).to_lowercase());
            }
            out.push('\n');
        }
        out
    }

    fn genbank(name: &str, organism: Option<&str>, features: &str) -> String {
        let mut text = format!(
            "LOCUS       {:<16}{:>11} bp    DNA     circular MAM 01-JAN-2020\n\
             DEFINITION  {} mitochondrion, complete genome.\n\
             ACCESSION   {}\n\
             FEATURES             Location/Qualifiers\n",
            name,
            GENOME.len(),
            name,
            name
        );
        if let Some(organism) = organism {
            text.push_str(&format!(
                "     source          1..{}\n                     /organism=\"{}\"\n",
                GENOME.len(),
                organism
            ));
        }
        text.push_str(features);
        text.push_str(&origin(GENOME));
        text.push_str("//\n");
        text
    }

    const ALL_GENES: &str = "     CDS             1..9
                     /gene=\"CO1\"
     CDS             complement(10..18)
                     /gene=\"ND6\"
     CDS             join(19..21,25..30)
                     /product=\"Cyt b\"
     misc_feature    31..40
                     /note=\"control region\"
";

    const NO_ND6: &str = "     CDS             1..9
                     /gene=\"COX1\"
     CDS             join(19..21,25..30)
                     /gene=\"COB\"
     misc_feature    31..40
";

    fn fixture(dir: &Path) -> Vec<PathBuf> {
        let mouse = dir.join("a_mouse.gbk");
        let rat = dir.join("b_rat.gb");
        fs::write(&mouse, genbank("MOUSE", Some("Mus musculus"), ALL_GENES)).unwrap();
        fs::write(&rat, genbank("RAT", Some("Rattus norvegicus"), NO_ND6)).unwrap();
        fs::write(dir.join("notes.txt"), "not a genome").unwrap();
        find_genomes(dir, &[".gbk", ".gb"]).unwrap()
    }

    fn read(path: &Path) -> Vec<(String, String)> {
        fasta::parse_fasta_file(path)
            .unwrap()
            .sequences
            .into_iter()
            .map(|s| (s.id.clone(), s.as_str().to_string()))
            .collect()
    }

    fn pair(id: &str, data: &str) -> (String, String) {
        (id.to_string(), data.to_string())
    }

    #[test]
    fn test_find_genomes_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a_mouse.gbk", "b_rat.gb"]);
    }

    #[test]
    fn test_split_nucleotide_genes() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        let genes = GeneTable::mitochondrial(false);
        let codes = GeneticCodes::new();
        let options = SplitOptions {
            genes: &genes,
            code: codes.get(2).unwrap(),
            protein: false,
        };

        let summary = split_genomes(&files, dir.path(), &options).unwrap();
        assert_eq!(summary.genes, ["COX1", "CYTB"]);
        assert!(summary.dropped.contains(&("ND6".to_string(), 1)));
        assert!(!dir.path().join("ND6.fasta").exists());
        assert!(!dir.path().join("DLOOP.fasta").exists());

        assert_eq!(
            read(&dir.path().join("COX1.fasta")),
            [pair("0_COX1", "ATGGCCTAA"), pair("1_COX1", "ATGGCCTAA")]
        );
        assert_eq!(
            read(&dir.path().join("CYTB.fasta")),
            [pair("0_CYTB", "ATGTGGTAA"), pair("1_CYTB", "ATGTGGTAA")]
        );
        assert_eq!(
            fs::read_to_string(dir.path().join(SPECIES_CODE_FILE)).unwrap(),
            "0 Mus_musculus\n1 Rattus_norvegicus\n"
        );
        assert_eq!(summary.genomes[1].organism.as_deref(), Some("Rattus_norvegicus"));
    }

    #[test]
    fn test_invalid_symbol_in_gene() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        // E inside COX1 (1..9)
        let broken = genbank("MOUSE", Some("Mus musculus"), ALL_GENES).replacen("atggcctaac", "atggectaac", 1);
        fs::write(&files[0], broken).unwrap();
        let genes = GeneTable::mitochondrial(false);
        let codes = GeneticCodes::new();
        let options = SplitOptions {
            genes: &genes,
            code: codes.get(2).unwrap(),
            protein: false,
        };

        match split_genomes(&files, dir.path(), &options) {
            Err(GenbankError::Symbol { path, source }) => {
                assert_eq!(path, files[0]);
                assert_eq!(source.id, "0_COX1");
                assert_eq!(source.position, 4);
            }
            other => panic!("expected a symbol error, got {:?}", other),
        }
    }

    #[test]
    fn test_complement_location() {
        let dir = tempfile::tempdir().unwrap();
        let mouse = dir.path().join("a.gbk");
        let other = dir.path().join("b.gbk");
        fs::write(&mouse, genbank("A", Some("Mus musculus"), ALL_GENES)).unwrap();
        fs::write(&other, genbank("B", Some("Mus spretus"), ALL_GENES)).unwrap();
        let genes = GeneTable::mitochondrial(false);
        let codes = GeneticCodes::new();
        let options = SplitOptions {
            genes: &genes,
            code: codes.get(2).unwrap(),
            protein: true,
        };

        let summary = split_genomes(&[mouse, other], dir.path(), &options).unwrap();
        assert_eq!(summary.genes, ["COX1", "CYTB", "ND6"]);
        assert_eq!(read(&dir.path().join("ND6.fasta"))[0], pair("0_ND6", "ATGTTTTAG"));
        // TAG is a stop codon in vertebrate mitochondria
        assert_eq!(read(&dir.path().join("ND6_prot.fasta"))[1], pair("1_ND6", "MF*"));
        assert_eq!(read(&dir.path().join("CYTB_prot.fasta"))[0], pair("0_CYTB", "MW*"));
    }

    #[test]
    fn test_dloop_collected_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        let genes = GeneTable::mitochondrial(true);
        let codes = GeneticCodes::new();
        let options = SplitOptions {
            genes: &genes,
            code: codes.get(2).unwrap(),
            protein: false,
        };

        let summary = split_genomes(&files, dir.path(), &options).unwrap();
        assert!(summary.genes.contains(&DLOOP.to_string()));
        assert_eq!(
            read(&dir.path().join("DLOOP.fasta")),
            [pair("0_DLOOP", "GGGGGCCCCC"), pair("1_DLOOP", "GGGGGCCCCC")]
        );
    }

    #[test]
    fn test_dloop_ignored_in_protein_mode() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        let genes = GeneTable::mitochondrial(true);
        let codes = GeneticCodes::new();
        let options = SplitOptions {
            genes: &genes,
            code: codes.get(2).unwrap(),
            protein: true,
        };

        let summary = split_genomes(&files, dir.path(), &options).unwrap();
        assert!(!summary.genes.contains(&DLOOP.to_string()));
        assert!(!summary.dropped.iter().any(|(g, _)| g == DLOOP));
        assert!(dir.path().join("COX1_prot.fasta").exists());
    }

    #[test]
    fn test_unknown_gene() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.gbk");
        let b = dir.path().join("b.gbk");
        let unknown = "     CDS             1..9\n                     /gene=\"16S\"\n";
        fs::write(&a, genbank("A", Some("Mus musculus"), unknown)).unwrap();
        fs::write(&b, genbank("B", Some("Mus spretus"), ALL_GENES)).unwrap();
        let genes = GeneTable::mitochondrial(false);
        let codes = GeneticCodes::new();
        let options = SplitOptions {
            genes: &genes,
            code: codes.get(2).unwrap(),
            protein: false,
        };

        let err = split_genomes(&[a, b], dir.path(), &options).unwrap_err();
        match err {
            GenbankError::UnknownGene { name, known, .. } => {
                assert_eq!(name, "16S");
                assert!(known.starts_with("ND1 ND2 COX1"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_source_still_splits() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.gbk");
        let b = dir.path().join("b.gbk");
        fs::write(&a, genbank("A", None, ALL_GENES)).unwrap();
        fs::write(&b, genbank("B", Some("Mus spretus"), ALL_GENES)).unwrap();
        let genes = GeneTable::mitochondrial(false);
        let codes = GeneticCodes::new();
        let options = SplitOptions {
            genes: &genes,
            code: codes.get(2).unwrap(),
            protein: false,
        };

        let summary = split_genomes(&[a, b], dir.path(), &options).unwrap();
        assert_eq!(summary.genomes[0].organism, None);
        assert_eq!(
            fs::read_to_string(dir.path().join(SPECIES_CODE_FILE)).unwrap(),
            "1 Mus_spretus\n"
        );
    }

    #[test]
    fn test_too_few_files() {
        let dir = tempfile::tempdir().unwrap();
        let genes = GeneTable::mitochondrial(false);
        let codes = GeneticCodes::new();
        let options = SplitOptions {
            genes: &genes,
            code: codes.get(2).unwrap(),
            protein: false,
        };
        let result = split_genomes(&[dir.path().join("one.gbk")], dir.path(), &options);
        assert!(matches!(result, Err(GenbankError::TooFewFiles(1))));
    }

    #[test]
    fn test_unreadable_file_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.gbk");
        fs::write(&a, genbank("A", Some("Mus musculus"), ALL_GENES)).unwrap();
        let missing = dir.path().join("missing.gbk");
        let genes = GeneTable::mitochondrial(false);
        let codes = GeneticCodes::new();
        let options = SplitOptions {
            genes: &genes,
            code: codes.get(2).unwrap(),
            protein: false,
        };

        let err = split_genomes(&[a, missing], dir.path(), &options).unwrap_err();
        assert!(err.to_string().contains("missing.gbk"));
    }

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"ATGc"), b"gCAT");
        assert_eq!(reverse_complement(b"RYN-"), b"-NRY");
    }
}
