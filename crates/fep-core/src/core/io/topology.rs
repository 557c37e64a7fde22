//! Reader and writer for GROMACS molecule topologies (`.top` / `.itp`).
//!
//! Only the sections needed for graph editing are interpreted: `[ atoms ]`, `[ bonds ]`,
//! `[ pairs ]`, `[ angles ]` and `[ dihedrals ]`. Everything else (includes, preprocessor
//! directives, `[ moleculetype ]`, `[ system ]`, `[ molecules ]`, other bonded sections)
//! is kept verbatim and written back in its original position.

use crate::core::io::traits::ModelFile;
use crate::core::models::ids::AtomId;
use crate::core::models::topology::{
    Interaction, InteractionKind, TopAtom, Topology, TopologyBlock,
};
use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Line {line} references unknown atom {id}")]
    UnknownAtom { line: usize, id: usize },
    #[error("Duplicate atom number {id} on line {line}")]
    DuplicateAtom { line: usize, id: usize },
    #[error("Second [ atoms ] section on line {line}: only single-molecule topologies are supported")]
    MultipleMolecules { line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Atoms,
    Interactions(InteractionKind),
    Other,
}

fn section_header(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('[')?;
    let end = inner.find(']')?;
    Some(inner[..end].trim().to_ascii_lowercase())
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_field<T: std::str::FromStr>(
    value: &str,
    what: &str,
    line: usize,
) -> Result<T, TopologyError> {
    value.parse().map_err(|_| TopologyError::Parse {
        line,
        message: format!("invalid {} '{}'", what, value),
    })
}

fn parse_atom(fields: &[&str], line: usize) -> Result<TopAtom, TopologyError> {
    if fields.len() < 7 {
        return Err(TopologyError::Parse {
            line,
            message: format!("[ atoms ] entry needs at least 7 fields, found {}", fields.len()),
        });
    }
    let mass = match fields.get(7) {
        Some(m) => Some(parse_field(m, "mass", line)?),
        None => None,
    };
    let state_b = (fields.len() > 8).then(|| fields[8..].join(" "));
    Ok(TopAtom {
        id: parse_field(fields[0], "atom number", line)?,
        atom_type: fields[1].to_string(),
        resnr: parse_field(fields[2], "residue number", line)?,
        resname: fields[3].to_string(),
        name: fields[4].to_string(),
        cgnr: parse_field(fields[5], "charge group", line)?,
        charge: parse_field(fields[6], "charge", line)?,
        mass,
        state_b,
    })
}

fn parse_interaction<const N: usize>(
    fields: &[&str],
    numbers: &HashMap<usize, AtomId>,
    line: usize,
) -> Result<Interaction<N>, TopologyError> {
    if fields.len() < N {
        return Err(TopologyError::Parse {
            line,
            message: format!("interaction needs {} atoms, found {} fields", N, fields.len()),
        });
    }
    let mut atoms = Vec::with_capacity(N);
    for field in &fields[..N] {
        let number: usize = parse_field(field, "atom number", line)?;
        let id = numbers
            .get(&number)
            .copied()
            .ok_or(TopologyError::UnknownAtom { line, id: number })?;
        atoms.push(id);
    }
    let atoms: [AtomId; N] = atoms.try_into().map_err(|_| TopologyError::Parse {
        line,
        message: "wrong number of atoms".to_string(),
    })?;
    let func = match fields.get(N) {
        Some(f) => parse_field(f, "function type", line)?,
        None => 1,
    };
    let params = fields.get(N + 1..).map(|p| p.join(" ")).unwrap_or_default();
    Ok(Interaction {
        atoms,
        func,
        params,
    })
}

fn write_interactions<const N: usize>(
    top: &Topology,
    kind: InteractionKind,
    list: &[Interaction<N>],
    writer: &mut impl Write,
) -> Result<(), TopologyError> {
    writeln!(writer, "[ {} ]", kind.section_name())?;
    let header: String = ["ai", "aj", "ak", "al"][..N]
        .iter()
        .map(|h| format!("{:>5} ", h))
        .collect();
    writeln!(writer, ";{}funct", &header[1..])?;
    for interaction in list {
        let mut line = String::new();
        for &atom in &interaction.atoms {
            let number = top.atom(atom).map(|a| a.id).unwrap_or(0);
            line.push_str(&format!("{:>5} ", number));
        }
        line.push_str(&format!("{:>5}", interaction.func));
        if !interaction.params.is_empty() {
            line.push(' ');
            line.push_str(&interaction.params);
        }
        writeln!(writer, "{}", line)?;
    }
    writeln!(writer)?;
    Ok(())
}

fn write_section(
    top: &Topology,
    block: &TopologyBlock,
    writer: &mut impl Write,
) -> Result<(), TopologyError> {
    match block {
        TopologyBlock::Raw(line) => writeln!(writer, "{}", line)?,
        TopologyBlock::Atoms => {
            writeln!(writer, "[ atoms ]")?;
            writeln!(
                writer,
                ";   nr       type  resnr residue  atom   cgnr     charge       mass  typeB    chargeB      massB"
            )?;
            for (_, atom) in top.atoms() {
                let mut line = format!(
                    "{:>6} {:>10} {:>6} {:>6} {:>6} {:>6} {:>10}",
                    atom.id, atom.atom_type, atom.resnr, atom.resname, atom.name, atom.cgnr, atom.charge
                );
                if let Some(mass) = atom.mass {
                    line.push_str(&format!(" {:>10}", mass));
                }
                if let Some(state_b) = &atom.state_b {
                    line.push_str(&format!(" {}", state_b));
                }
                writeln!(writer, "{}", line)?;
            }
            writeln!(writer)?;
        }
        TopologyBlock::Interactions(kind) => match kind {
            InteractionKind::Bonds => write_interactions(top, *kind, &top.bonds, writer)?,
            InteractionKind::Pairs => write_interactions(top, *kind, &top.pairs, writer)?,
            InteractionKind::Angles => write_interactions(top, *kind, &top.angles, writer)?,
            InteractionKind::Dihedrals => {
                write_interactions(top, *kind, &top.dihedrals, writer)?
            }
        },
    }
    Ok(())
}

pub struct TopologyFile;

impl ModelFile for TopologyFile {
    type Model = Topology;
    type Error = TopologyError;

    fn read_from(reader: &mut impl BufRead) -> Result<Topology, TopologyError> {
        let mut top = Topology::new();
        let mut numbers: HashMap<usize, AtomId> = HashMap::new();
        let mut section = Section::Other;

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;

            if let Some(name) = section_header(&line) {
                section = if name == "atoms" {
                    if top.has_block(&TopologyBlock::Atoms) {
                        return Err(TopologyError::MultipleMolecules { line: line_num });
                    }
                    top.push_block(TopologyBlock::Atoms);
                    Section::Atoms
                } else if let Some(kind) = InteractionKind::from_section_name(&name) {
                    let block = TopologyBlock::Interactions(kind);
                    if !top.has_block(&block) {
                        top.push_block(block);
                    }
                    Section::Interactions(kind)
                } else {
                    top.push_block(TopologyBlock::Raw(line));
                    Section::Other
                };
                continue;
            }

            let data = strip_comment(&line).trim();
            if section == Section::Other {
                top.push_block(TopologyBlock::Raw(line));
                continue;
            }
            if data.is_empty() {
                continue;
            }
            if data.starts_with('#') {
                // A preprocessor directive ends the interpreted section.
                top.push_block(TopologyBlock::Raw(line));
                section = Section::Other;
                continue;
            }

            let fields: Vec<&str> = data.split_whitespace().collect();
            match section {
                Section::Atoms => {
                    let atom = parse_atom(&fields, line_num)?;
                    let number = atom.id;
                    if numbers.contains_key(&number) {
                        return Err(TopologyError::DuplicateAtom {
                            line: line_num,
                            id: number,
                        });
                    }
                    let id = top.add_atom(atom);
                    numbers.insert(number, id);
                }
                Section::Interactions(InteractionKind::Bonds) => {
                    let bond = parse_interaction::<2>(&fields, &numbers, line_num)?;
                    top.bonds.push(bond);
                }
                Section::Interactions(InteractionKind::Pairs) => {
                    let pair = parse_interaction::<2>(&fields, &numbers, line_num)?;
                    top.pairs.push(pair);
                }
                Section::Interactions(InteractionKind::Angles) => {
                    let angle = parse_interaction::<3>(&fields, &numbers, line_num)?;
                    top.angles.push(angle);
                }
                Section::Interactions(InteractionKind::Dihedrals) => {
                    let dihedral = parse_interaction::<4>(&fields, &numbers, line_num)?;
                    top.dihedrals.push(dihedral);
                }
                Section::Other => unreachable!("handled above"),
            }
        }
        Ok(top)
    }

    fn write_to(top: &Topology, writer: &mut impl Write) -> Result<(), TopologyError> {
        let layout = top.layout();
        let mut written: HashSet<InteractionKind> = HashSet::new();
        let last_section = layout
            .iter()
            .rposition(|b| !matches!(b, TopologyBlock::Raw(_)));

        if last_section.is_none() {
            if top.natoms() > 0 {
                write_section(top, &TopologyBlock::Atoms, writer)?;
            }
            write_missing_sections(top, &written, writer)?;
        }
        for (idx, block) in layout.iter().enumerate() {
            write_section(top, block, writer)?;
            if let TopologyBlock::Interactions(kind) = block {
                written.insert(*kind);
            }
            if Some(idx) == last_section {
                write_missing_sections(top, &written, writer)?;
            }
        }
        Ok(())
    }
}

/// Writes interaction kinds the model gained without a section in the source file.
fn write_missing_sections(
    top: &Topology,
    written: &HashSet<InteractionKind>,
    writer: &mut impl Write,
) -> Result<(), TopologyError> {
    for kind in InteractionKind::ALL {
        if !written.contains(&kind) && top.interaction_count(kind) > 0 {
            write_section(top, &TopologyBlock::Interactions(kind), writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::topology::Pair;

    const DIPEPTIDE: &str = "\
; generated by pdb2gmx
#include \"amber99sb.ff/forcefield.itp\"

[ moleculetype ]
; Name            nrexcl
Protein_chain_A     3

[ atoms ]
;   nr       type  resnr residue  atom   cgnr     charge       mass
     1         N3      1    GLY      N      1     0.2943     14.01
     2          H      1    GLY     H1      2     0.1642      1.008
     3         CT      1    GLY     CA      3    -0.0100     12.01
     4          C      1    GLY      C      4     0.6163     12.01   ; carbonyl
     5          N      2    ALA      N      5    -0.4157     14.01
     6         CT      2    ALA     CA      6     0.0337     12.01
     7          C      2    ALA      C      7     0.8350     12.01

[ bonds ]
;  ai    aj funct            c0            c1
    1     2     1
    1     3     1
    3     4     1
    4     5     1
    5     6     1
    6     7     1

[ pairs ]
    1     5     1

[ angles ]
    2     1     3     1
    3     4     5     1

[ dihedrals ]
    1     3     4     5     9

[ dihedrals ]
    3     5     4     6     4    180.0   4.6   2

; Include Position restraint file
#ifdef POSRES
#include \"posre.itp\"
#endif

[ system ]
Protein

[ molecules ]
Protein_chain_A     1
";

    #[test]
    fn reads_atoms_and_interactions() {
        let top = TopologyFile::read_from_str(DIPEPTIDE).unwrap();
        assert_eq!(top.natoms(), 7);
        assert_eq!(top.bonds.len(), 6);
        assert_eq!(top.pairs.len(), 1);
        assert_eq!(top.angles.len(), 2);
        assert_eq!(top.dihedrals.len(), 2, "repeated sections are merged");
        assert_eq!(top.dihedrals[1].func, 4);
        assert_eq!(top.dihedrals[1].params, "180.0 4.6 2");

        let c = top.find_atom(1, "C").unwrap();
        let atom = top.atom(c).unwrap();
        assert_eq!(atom.id, 4);
        assert_eq!(atom.charge, 0.6163);
        assert_eq!(atom.mass, Some(12.01));
        assert_eq!(top.residues(), vec![(1, "GLY".into()), (2, "ALA".into())]);
    }

    #[test]
    fn writing_preserves_unknown_blocks_in_order() {
        let top = TopologyFile::read_from_str(DIPEPTIDE).unwrap();
        let text = TopologyFile::write_to_string(&top).unwrap();
        let include = text.find("#include \"amber99sb.ff/forcefield.itp\"").unwrap();
        let atoms = text.find("[ atoms ]").unwrap();
        let posres = text.find("#ifdef POSRES").unwrap();
        let molecules = text.find("[ molecules ]").unwrap();
        assert!(include < atoms && atoms < posres && posres < molecules);
        assert_eq!(text.matches("[ dihedrals ]").count(), 1);
        assert!(text.contains("Protein_chain_A     1"));
    }

    #[test]
    fn written_topology_reads_back_to_the_same_model() {
        let top = TopologyFile::read_from_str(DIPEPTIDE).unwrap();
        let again =
            TopologyFile::read_from_str(&TopologyFile::write_to_string(&top).unwrap()).unwrap();
        let atoms_a: Vec<_> = top.atoms().map(|(_, a)| a.clone()).collect();
        let atoms_b: Vec<_> = again.atoms().map(|(_, a)| a.clone()).collect();
        assert_eq!(atoms_a, atoms_b);
        for kind in InteractionKind::ALL {
            assert_eq!(top.interaction_count(kind), again.interaction_count(kind));
        }
        assert_eq!(again.dihedrals[1].params, "180.0 4.6 2");
    }

    #[test]
    fn new_interaction_kinds_are_emitted_after_the_last_section() {
        let text = "\
[ atoms ]
     1  CT  1  ALA  CA  1  0.0  12.01
     2  CT  1  ALA  CB  2  0.0  12.01
[ bonds ]
     1     2     1

[ system ]
Test
";
        let mut top = TopologyFile::read_from_str(text).unwrap();
        let a = top.atom_by_id(1).unwrap();
        let b = top.atom_by_id(2).unwrap();
        top.pairs.push(Pair::new([a, b], 1));
        let out = TopologyFile::write_to_string(&top).unwrap();
        let pairs = out.find("[ pairs ]").unwrap();
        assert!(out.find("[ bonds ]").unwrap() < pairs);
        assert!(pairs < out.find("[ system ]").unwrap());
    }

    #[test]
    fn unknown_atom_references_are_errors() {
        let text = "[ atoms ]\n 1 CT 1 ALA CA 1 0.0 12.01\n[ bonds ]\n 1 9 1\n";
        assert!(matches!(
            TopologyFile::read_from_str(text),
            Err(TopologyError::UnknownAtom { line: 4, id: 9 })
        ));
    }

    #[test]
    fn second_molecule_is_rejected() {
        let text = "[ atoms ]\n 1 CT 1 ALA CA 1 0.0\n[ moleculetype ]\nB 3\n[ atoms ]\n";
        assert!(matches!(
            TopologyFile::read_from_str(text),
            Err(TopologyError::MultipleMolecules { line: 5 })
        ));
    }

    #[test]
    fn malformed_atom_lines_report_the_line() {
        let text = "[ atoms ]\n 1 CT one ALA CA 1 0.0\n";
        match TopologyFile::read_from_str(text) {
            Err(TopologyError::Parse { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("residue number"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
