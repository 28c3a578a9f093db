//! NCBI genetic codes and codon translation.
//!
//! Vertebrate mtDNA (table 2) reads TGA as Trp and AGA/AGG as stops, so
//! translation and back-translation always take an explicit table.

/// Nucleotide order used by the NCBI `ncbieaa` strings.
const BASES: [u8; 4] = [b'T', b'C', b'A', b'G'];

/// Codon → amino acid table.
#[derive(Debug, Clone)]
pub struct GeneticCode {
    /// NCBI transl_table number
    pub id: u8,
    pub name: &'static str,
    /// Amino acid for each codon, indexed in NCBI order (TTT, TTC, TTA, TTG, TCT, ...)
    amino_acids: [u8; 64],
}

impl GeneticCode {
    /// Builds a table from its 64-symbol NCBI `ncbieaa` string.
    fn new(id: u8, name: &'static str, ncbieaa: &str) -> Self {
        let mut amino_acids = [b'X'; 64];
        for (slot, aa) in amino_acids.iter_mut().zip(ncbieaa.bytes()) {
            *slot = aa;
        }
        Self {
            id,
            name,
            amino_acids,
        }
    }

    /// Amino acid for one codon.
    ///
    /// Lookup ignores case and reads U as T. An IUPAC ambiguity code gives the
    /// amino acid shared by every codon it stands for, or 'X' if they differ.
    /// A codon made only of gap symbols (`-`, `!`, `.`) gives '-'; a gap mixed
    /// with bases gives '!'. Wrong lengths and unknown symbols give 'X'.
    pub fn translate_codon(&self, codon: &[u8]) -> char {
        if codon.len() != 3 {
            return 'X';
        }

        let is_gap = |b: &u8| matches!(b, b'-' | b'!' | b'.');
        if codon.iter().all(is_gap) {
            return '-';
        }
        if codon.iter().any(is_gap) {
            return '!';
        }

        let (Some(first), Some(second), Some(third)) =
            (expand(codon[0]), expand(codon[1]), expand(codon[2]))
        else {
            return 'X';
        };

        let mut translated: Option<u8> = None;
        for &b1 in first {
            for &b2 in second {
                for &b3 in third {
                    let aa = self.amino_acids[16 * base_index(b1) + 4 * base_index(b2) + base_index(b3)];
                    match translated {
                        None => translated = Some(aa),
                        Some(prev) if prev != aa => return 'X',
                        Some(_) => {}
                    }
                }
            }
        }
        translated.map(char::from).unwrap_or('X')
    }

    /// Translates the whole codons of `sequence` starting at offset `frame` (0-2).
    /// A trailing partial codon is dropped.
    pub fn translate_sequence(&self, sequence: &[u8], frame: usize) -> String {
        let start = frame.min(2).min(sequence.len());
        sequence[start..]
            .chunks_exact(3)
            .map(|codon| self.translate_codon(codon))
            .collect()
    }
}

/// Position of an unambiguous base in `BASES`.
fn base_index(base: u8) -> usize {
    match base {
        b'T' => 0,
        b'C' => 1,
        b'A' => 2,
        _ => 3,
    }
}

/// The unambiguous bases an IUPAC nucleotide code stands for.
fn expand(symbol: u8) -> Option<&'static [u8]> {
    let bases: &'static [u8] = match symbol.to_ascii_uppercase() {
        b'A' => b"A",
        b'C' => b"C",
        b'G' => b"G",
        b'T' | b'U' => b"T",
        b'R' => b"AG",
        b'Y' => b"CT",
        b'S' => b"CG",
        b'W' => b"AT",
        b'K' => b"GT",
        b'M' => b"AC",
        b'B' => b"CGT",
        b'D' => b"AGT",
        b'H' => b"ACT",
        b'V' => b"ACG",
        b'N' => &BASES,
        _ => return None,
    };
    Some(bases)
}

/// The NCBI translation tables.
pub struct GeneticCodes {
    codes: Vec<GeneticCode>,
}

impl GeneticCodes {
    pub fn new() -> Self {
        let codes = vec![
            GeneticCode::new(1, "Standard",
                "FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(2, "Vertebrate Mitochondrial",
                "FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIMMTTTTNNKKSS**VVVVAAAADDEEGGGG"),
            GeneticCode::new(3, "Yeast Mitochondrial",
                "FFLLSSSSYY**CCWWTTTTPPPPHHQQRRRRIIMMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(4, "Mold Mitochondrial",
                "FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(5, "Invertebrate Mitochondrial",
                "FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIMMTTTTNNKKSSSSVVVVAAAADDEEGGGG"),
            GeneticCode::new(6, "Ciliate Nuclear",
                "FFLLSSSSYYQQCC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(9, "Echinoderm Mitochondrial",
                "FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIIMTTTTNNNKSSSSVVVVAAAADDEEGGGG"),
            GeneticCode::new(10, "Euplotid Nuclear",
                "FFLLSSSSYY**CCCWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(11, "Bacterial",
                "FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(12, "Alternative Yeast Nuclear",
                "FFLLSSSSYY**CC*WLLLSPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(13, "Ascidian Mitochondrial",
                "FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIMMTTTTNNKKSSGGVVVVAAAADDEEGGGG"),
            GeneticCode::new(14, "Alternative Flatworm Mitochondrial",
                "FFLLSSSSYYY*CCWWLLLLPPPPHHQQRRRRIIIMTTTTNNNKSSSSVVVVAAAADDEEGGGG"),
            GeneticCode::new(15, "Blepharisma Macronuclear",
                "FFLLSSSSYY*QCC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(16, "Chlorophycean Mitochondrial",
                "FFLLSSSSYY*LCC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(21, "Trematode Mitochondrial",
                "FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIMMTTTTNNNKSSSSVVVVAAAADDEEGGGG"),
            GeneticCode::new(22, "Scenedesmus obliquus Mitochondrial",
                "FFLLSS*SYY*LCC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(23, "Thraustochytrium Mitochondrial",
                "FF*LSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(24, "Rhabdopleuridae Mitochondrial",
                "FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSSKVVVVAAAADDEEGGGG"),
            GeneticCode::new(25, "Candidate Division SR1",
                "FFLLSSSSYY**CCGWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(26, "Pachysolen tannophilus Nuclear",
                "FFLLSSSSYY**CC*WLLLAPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(27, "Karyorelict Nuclear",
                "FFLLSSSSYYQQCCWWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(28, "Condylostoma Nuclear",
                "FFLLSSSSYYQQCCWWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(29, "Mesodinium Nuclear",
                "FFLLSSSSYYYYCC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(30, "Peritrich Nuclear",
                "FFLLSSSSYYEECC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(31, "Blastocrithidia Nuclear",
                "FFLLSSSSYYEECCWWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(32, "Balanophoraceae Plastid",
                "FFLLSSSSYY*WCC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"),
            GeneticCode::new(33, "Cephalodiscidae Mitochondrial",
                "FFLLSSSSYYY*CCWWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSSKVVVVAAAADDEEGGGG"),
        ];

        Self { codes }
    }

    pub fn all(&self) -> &[GeneticCode] {
        &self.codes
    }

    /// Table with NCBI id `id`.
    pub fn get(&self, id: u8) -> Option<&GeneticCode> {
        self.codes.iter().find(|c| c.id == id)
    }

    /// Gets a genetic code by NCBI id ("2") or by name ("vertebrate mitochondrial").
    pub fn find(&self, query: &str) -> Option<&GeneticCode> {
        let query = query.trim();
        match query.parse::<u8>() {
            Ok(id) => self.get(id),
            Err(_) => self.codes.iter().find(|c| c.name.eq_ignore_ascii_case(query)),
        }
    }

    /// The Standard code (table 1).
    pub fn default_code(&self) -> &GeneticCode {
        &self.codes[0]
    }
}

impl Default for GeneticCodes {
    fn default() -> Self {
        Self::new()
    }
}
