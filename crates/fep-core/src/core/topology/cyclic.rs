//! Head-to-tail cyclisation of peptide topologies.
//!
//! A linear peptide is built with one dummy residue on each end: a copy of the last
//! residue before the first and a copy of the first after the last. After `pdb2gmx` has
//! parameterised the linear chain, the dummy termini are cut away and the backbone is closed
//! with an amide bond between `N` of the first and `C` of the last real residue. The
//! interactions of the real residues around the junction then already carry the
//! parameters of an internal peptide bond, except for the 1-4 pairs that span the new
//! bond, which are regenerated here.

use crate::core::models::ids::AtomId;
use crate::core::models::structure::Structure;
use crate::core::models::topology::{Bond, Pair, Topology};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

const RING_NITROGEN: &str = "N";
const RING_CARBON: &str = "C";
const RING_PAIR_FUNC: u8 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CyclicError {
    #[error("Atom '{name}' not found in residue {resnr}")]
    MissingAtom { resnr: isize, name: String },
    #[error("A cyclic peptide needs at least {min} residues including dummy termini, found {found}")]
    TooFewResidues { min: usize, found: usize },
    #[error("Peptide sequence is empty")]
    EmptySequence,
    #[error("Invalid residue code '{0}' in sequence")]
    InvalidResidueCode(char),
    #[error("Chirality string has {chirality} entries but the sequence has {sequence} residues")]
    ChiralityLength { sequence: usize, chirality: usize },
    #[error("Invalid chirality '{0}': expected L or D")]
    InvalidChirality(char),
}

/// Outcome of [`splice_cyclic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceSummary {
    pub removed_atoms: usize,
    pub offset: usize,
    pub residues: usize,
    /// File numbers of the `N` and `C` atoms joined by the ring bond.
    pub ring_bond: (usize, usize),
    pub new_pairs: usize,
}

/// Collects all atoms of the two dummy residues.
///
/// # Return
///
/// The atoms to remove and the offset by which the remaining atoms must be renumbered
/// (the atom count of the first residue).
pub fn identify_atoms_to_remove(
    top: &Topology,
    first_resnr: isize,
    last_resnr: isize,
) -> (HashSet<AtomId>, usize) {
    let mut ids = HashSet::new();
    let mut offset = 0;
    for (id, atom) in top.atoms() {
        if atom.resnr == first_resnr {
            ids.insert(id);
            offset += 1;
        }
        if atom.resnr == last_resnr {
            ids.insert(id);
        }
    }
    (ids, offset)
}

/// Deletes the atoms and every bond, pair, angle and dihedral touching any of them.
pub fn remove_atoms(top: &mut Topology, ids: &HashSet<AtomId>) -> usize {
    top.remove_atoms(ids)
}

/// Shifts atom and charge-group numbers down by `offset` and residue numbers down by one.
pub fn renumber_atoms(top: &mut Topology, offset: usize) {
    let offset = offset as isize;
    for atom in top.atoms_mut() {
        atom.id = (atom.id as isize - offset).max(0) as usize;
        atom.cgnr -= offset;
        atom.resnr -= 1;
    }
}

/// Appends the 1-4 pairs reachable from `a` through the bond graph.
fn collect_14(
    top: &Topology,
    partners: &HashMap<AtomId, Vec<AtomId>>,
    a: AtomId,
    pairs: &mut Vec<[AtomId; 2]>,
    list13: &mut HashSet<(AtomId, AtomId)>,
) {
    let empty = Vec::new();
    let neighbours = |x: AtomId| partners.get(&x).unwrap_or(&empty);
    for &a12 in neighbours(a) {
        for &a13 in neighbours(a12) {
            if a13 == a {
                continue;
            }
            list13.insert((a, a13));
            list13.insert((a13, a));
            for &a14 in neighbours(a13) {
                if a14 == a12 || a14 == a {
                    continue;
                }
                if pairs.contains(&[a, a14]) || pairs.contains(&[a14, a]) {
                    continue;
                }
                if top.has_pair(a, a14, RING_PAIR_FUNC) {
                    continue;
                }
                pairs.push([a, a14]);
            }
        }
    }
}

/// Closes the ring with a bond from `N` of the first residue to `C` of the last residue
/// and adds the 1-4 pairs around the new bond.
///
/// # Return
///
/// The two ring atoms and the number of pairs added.
///
/// # Errors
///
/// Returns [`CyclicError::MissingAtom`] if either backbone atom cannot be found.
pub fn close_ring(top: &mut Topology) -> Result<((AtomId, AtomId), usize), CyclicError> {
    let residues = top.residues();
    let (first, last) = match (residues.first(), residues.last()) {
        (Some((first, _)), Some((last, _))) => (*first, *last),
        _ => {
            return Err(CyclicError::TooFewResidues {
                min: 1,
                found: 0,
            });
        }
    };
    let n = top
        .find_atom(first, RING_NITROGEN)
        .ok_or_else(|| CyclicError::MissingAtom {
            resnr: first,
            name: RING_NITROGEN.to_string(),
        })?;
    let c = top
        .find_atom(last, RING_CARBON)
        .ok_or_else(|| CyclicError::MissingAtom {
            resnr: last,
            name: RING_CARBON.to_string(),
        })?;
    top.bonds.insert(0, Bond::new([n, c], 1));

    let partners = top.bonded_partners();
    let mut pairs = Vec::new();
    let mut list13 = HashSet::new();
    collect_14(top, &partners, n, &mut pairs, &mut list13);
    collect_14(top, &partners, c, &mut pairs, &mut list13);
    for &a in partners.get(&n).into_iter().flatten() {
        if a != c {
            collect_14(top, &partners, a, &mut pairs, &mut list13);
        }
    }
    for &a in partners.get(&c).into_iter().flatten() {
        if a != n {
            collect_14(top, &partners, a, &mut pairs, &mut list13);
        }
    }

    let before = top.pairs.len();
    for [a, b] in pairs {
        if !list13.contains(&(a, b)) {
            top.pairs.push(Pair::new([a, b], RING_PAIR_FUNC));
        }
    }
    Ok(((n, c), top.pairs.len() - before))
}

/// Turns the topology of a linear peptide with dummy termini into a cyclic one.
///
/// The first and last residues are removed, the remaining atoms renumbered from one and
/// the ring closed.
pub fn splice_cyclic(top: &mut Topology) -> Result<SpliceSummary, CyclicError> {
    let residues = top.residues();
    if residues.len() < 3 {
        return Err(CyclicError::TooFewResidues {
            min: 3,
            found: residues.len(),
        });
    }
    let first = residues[0].0;
    let last = residues[residues.len() - 1].0;
    let (ids, offset) = identify_atoms_to_remove(top, first, last);
    let removed_atoms = remove_atoms(top, &ids);
    renumber_atoms(top, offset);
    debug!(removed_atoms, offset, "Removed dummy termini");

    let ((n, c), new_pairs) = close_ring(top)?;
    let number = |id: AtomId| top.atom(id).map(|a| a.id).unwrap_or(0);
    Ok(SpliceSummary {
        removed_atoms,
        offset,
        residues: top.residues().len(),
        ring_bond: (number(n), number(c)),
        new_pairs,
    })
}

/// Removes the dummy first and last residues from a structure and renumbers it.
pub fn trim_dummy_residues(structure: &mut Structure) -> Result<usize, CyclicError> {
    let keys = structure.residue_keys();
    if keys.len() < 3 {
        return Err(CyclicError::TooFewResidues {
            min: 3,
            found: keys.len(),
        });
    }
    let mut removed = structure.remove_residue(&keys[keys.len() - 1]);
    removed += structure.remove_residue(&keys[0]);
    structure.renumber_serials();
    structure.renumber_residues_from_one();
    Ok(removed)
}

/// Wraps a one-letter sequence in dummy termini: `last + sequence + first`.
///
/// # Return
///
/// The extended sequence and the matching extended chirality string.
pub fn extend_sequence(sequence: &str, chirality: &str) -> Result<(String, String), CyclicError> {
    let seq: Vec<char> = sequence.trim().chars().collect();
    let chir: Vec<char> = chirality.trim().chars().collect();
    let (Some(&first), Some(&last)) = (seq.first(), seq.last()) else {
        return Err(CyclicError::EmptySequence);
    };
    if let Some(&bad) = seq.iter().find(|c| !c.is_ascii_uppercase()) {
        return Err(CyclicError::InvalidResidueCode(bad));
    }
    if chir.len() != seq.len() {
        return Err(CyclicError::ChiralityLength {
            sequence: seq.len(),
            chirality: chir.len(),
        });
    }
    if let Some(&bad) = chir.iter().find(|c| !matches!(c, 'L' | 'D')) {
        return Err(CyclicError::InvalidChirality(bad));
    }
    let wrap = |items: &[char]| -> String {
        std::iter::once(items[items.len() - 1])
            .chain(items.iter().copied())
            .chain(std::iter::once(items[0]))
            .collect()
    };
    debug!(first = %first, last = %last, "Extending sequence with dummy termini");
    Ok((wrap(&seq), wrap(&chir)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::topology::{Angle, Dihedral, TopAtom};

    /// Backbone-only peptide of `n` residues: N, CA, C per residue, chained.
    fn backbone(n: usize) -> Topology {
        let mut top = Topology::new();
        let mut prev_c: Option<AtomId> = None;
        let mut number = 0;
        for res in 1..=n as isize {
            let mut ids = Vec::new();
            for name in ["N", "CA", "C"] {
                number += 1;
                ids.push(top.add_atom(TopAtom::new(number, "CT", res, "GLY", name)));
            }
            top.bonds.push(Bond::new([ids[0], ids[1]], 1));
            top.bonds.push(Bond::new([ids[1], ids[2]], 1));
            top.angles.push(Angle::new([ids[0], ids[1], ids[2]], 1));
            if let Some(c) = prev_c {
                top.bonds.push(Bond::new([c, ids[0]], 1));
                top.dihedrals
                    .push(Dihedral::new([c, ids[0], ids[1], ids[2]], 9));
            }
            prev_c = Some(ids[2]);
        }
        top
    }

    fn numbers(top: &Topology, pair: &[AtomId; 2]) -> (usize, usize) {
        (
            top.atom(pair[0]).unwrap().id,
            top.atom(pair[1]).unwrap().id,
        )
    }

    #[test]
    fn identifies_both_dummy_residues_with_first_residue_offset() {
        let top = backbone(4);
        let (ids, offset) = identify_atoms_to_remove(&top, 1, 4);
        assert_eq!(ids.len(), 6);
        assert_eq!(offset, 3);
    }

    #[test]
    fn renumbering_shifts_ids_groups_and_residues() {
        let mut top = backbone(3);
        let (ids, offset) = identify_atoms_to_remove(&top, 1, 3);
        remove_atoms(&mut top, &ids);
        renumber_atoms(&mut top, offset);
        let atoms: Vec<(usize, isize, isize)> =
            top.atoms().map(|(_, a)| (a.id, a.cgnr, a.resnr)).collect();
        assert_eq!(atoms, vec![(1, 1, 1), (2, 2, 1), (3, 3, 1)]);
        assert_eq!(top.bonds.len(), 2);
        assert!(top.dihedrals.is_empty());
    }

    #[test]
    fn ring_bond_is_inserted_first_and_pairs_span_it() {
        let mut top = backbone(5);
        let summary = splice_cyclic(&mut top).unwrap();
        assert_eq!(summary.removed_atoms, 6);
        assert_eq!(summary.offset, 3);
        assert_eq!(summary.residues, 3);
        assert_eq!(summary.ring_bond, (1, 9));

        let first = top.bonds[0].atoms;
        assert_eq!(numbers(&top, &first), (1, 9));

        let pairs: HashSet<(usize, usize)> = top
            .pairs
            .iter()
            .map(|p| {
                let (a, b) = numbers(&top, &p.atoms);
                (a.min(b), a.max(b))
            })
            .collect();
        // 1-4 pairs across the new N(1)-C(9) bond
        assert!(pairs.contains(&(2, 8)));
        assert!(pairs.contains(&(1, 7)));
        assert!(pairs.contains(&(3, 9)));
        assert_eq!(pairs.len(), top.pairs.len(), "no duplicate pairs");
        assert_eq!(summary.new_pairs, top.pairs.len());
    }

    #[test]
    fn existing_pairs_are_not_duplicated() {
        let mut top = backbone(5);
        let mut reference = top.clone();
        splice_cyclic(&mut reference).unwrap();
        let ca1 = top.find_atom(2, "CA").unwrap();
        let ca3 = top.find_atom(4, "CA").unwrap();
        top.pairs.push(Pair::new([ca3, ca1], 1));
        let summary = splice_cyclic(&mut top).unwrap();
        assert_eq!(summary.new_pairs + 1, reference.pairs.len());
        assert_eq!(top.pairs.len(), reference.pairs.len());
    }

    #[test]
    fn pairs_of_another_function_type_do_not_block_ring_pairs() {
        let mut top = backbone(5);
        let mut reference = top.clone();
        splice_cyclic(&mut reference).unwrap();
        let ca1 = top.find_atom(2, "CA").unwrap();
        let ca3 = top.find_atom(4, "CA").unwrap();
        top.pairs.push(Pair::new([ca3, ca1], 2));
        let summary = splice_cyclic(&mut top).unwrap();
        assert_eq!(summary.new_pairs, reference.pairs.len());
        assert_eq!(top.pairs.len(), reference.pairs.len() + 1);
    }

    #[test]
    fn one_three_relationships_are_not_paired() {
        // In a three-residue ring of 9 atoms every atom is 1-4 to some other atom, but
        // atoms two bonds apart must never be paired.
        let mut top = backbone(5);
        splice_cyclic(&mut top).unwrap();
        let partners = top.bonded_partners();
        for pair in &top.pairs {
            let [a, b] = pair.atoms;
            let one_three = partners[&a]
                .iter()
                .any(|m| partners[m].contains(&b));
            assert!(!one_three);
        }
    }

    #[test]
    fn missing_backbone_atom_is_reported() {
        let mut top = backbone(4);
        let n = top.find_atom(2, "N").unwrap();
        top.atom_mut(n).unwrap().name = "NX".to_string();
        assert_eq!(
            splice_cyclic(&mut top).unwrap_err(),
            CyclicError::MissingAtom {
                resnr: 1,
                name: "N".to_string()
            }
        );
    }

    #[test]
    fn too_short_peptides_are_rejected() {
        let mut top = backbone(2);
        assert_eq!(
            splice_cyclic(&mut top).unwrap_err(),
            CyclicError::TooFewResidues { min: 3, found: 2 }
        );
    }

    #[test]
    fn sequence_is_wrapped_in_dummy_termini() {
        let (seq, chir) = extend_sequence("PVWLVVV", "LDLDLDL").unwrap();
        assert_eq!(seq, "VPVWLVVVP");
        assert_eq!(chir, "LLDLDLDLL");
    }

    #[test]
    fn invalid_sequences_are_rejected() {
        assert_eq!(extend_sequence("", ""), Err(CyclicError::EmptySequence));
        assert_eq!(
            extend_sequence("PVW", "LD"),
            Err(CyclicError::ChiralityLength {
                sequence: 3,
                chirality: 2
            })
        );
        assert_eq!(
            extend_sequence("PVW", "LXD"),
            Err(CyclicError::InvalidChirality('X'))
        );
        assert_eq!(
            extend_sequence("Pv", "LL"),
            Err(CyclicError::InvalidResidueCode('v'))
        );
    }
}
