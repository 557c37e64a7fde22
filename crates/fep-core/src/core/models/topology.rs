use super::ids::AtomId;
use slotmap::SlotMap;
use std::collections::{HashMap, HashSet};

/// One entry of the `[ atoms ]` section of a molecule topology.
#[derive(Debug, Clone, PartialEq)]
pub struct TopAtom {
    /// Atom number as written in the file (1-based).
    pub id: usize,
    pub atom_type: String,
    pub resnr: isize,
    pub resname: String,
    pub name: String,
    pub cgnr: isize,
    pub charge: f64,
    pub mass: Option<f64>,
    /// B-state columns (`typeB chargeB massB`) kept verbatim.
    pub state_b: Option<String>,
}

impl TopAtom {
    pub fn new(id: usize, atom_type: &str, resnr: isize, resname: &str, name: &str) -> Self {
        Self {
            id,
            atom_type: atom_type.to_string(),
            resnr,
            resname: resname.to_string(),
            name: name.to_string(),
            cgnr: id as isize,
            charge: 0.0,
            mass: None,
            state_b: None,
        }
    }
}

/// A bonded interaction between `N` atoms.
///
/// Only the atoms and the function type are interpreted; any parameters that follow them
/// on the line are kept as raw text and written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction<const N: usize> {
    pub atoms: [AtomId; N],
    pub func: u8,
    pub params: String,
}

pub type Bond = Interaction<2>;
pub type Pair = Interaction<2>;
pub type Angle = Interaction<3>;
pub type Dihedral = Interaction<4>;

impl<const N: usize> Interaction<N> {
    pub fn new(atoms: [AtomId; N], func: u8) -> Self {
        Self {
            atoms,
            func,
            params: String::new(),
        }
    }

    pub fn contains(&self, id: AtomId) -> bool {
        self.atoms.contains(&id)
    }

    pub fn involves_any(&self, ids: &HashSet<AtomId>) -> bool {
        self.atoms.iter().any(|a| ids.contains(a))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Bonds,
    Pairs,
    Angles,
    Dihedrals,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 4] = [
        InteractionKind::Bonds,
        InteractionKind::Pairs,
        InteractionKind::Angles,
        InteractionKind::Dihedrals,
    ];

    pub fn section_name(self) -> &'static str {
        match self {
            InteractionKind::Bonds => "bonds",
            InteractionKind::Pairs => "pairs",
            InteractionKind::Angles => "angles",
            InteractionKind::Dihedrals => "dihedrals",
        }
    }

    pub fn from_section_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.section_name() == name)
    }

    pub fn arity(self) -> usize {
        match self {
            InteractionKind::Bonds | InteractionKind::Pairs => 2,
            InteractionKind::Angles => 3,
            InteractionKind::Dihedrals => 4,
        }
    }
}

/// Position of a block of the source file, used to write the topology back in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyBlock {
    /// A line outside the sections the model understands, reproduced verbatim.
    Raw(String),
    Atoms,
    Interactions(InteractionKind),
}

/// The bonded graph of a single molecule, as described by a GROMACS `.top`/`.itp` file.
///
/// Atoms are stored in a slot map and addressed by [`AtomId`]; interactions reference
/// these ids, so deleting or renumbering atoms never invalidates the remaining
/// interactions. Atom file order is tracked separately.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    atoms: SlotMap<AtomId, TopAtom>,
    atom_order: Vec<AtomId>,
    pub bonds: Vec<Bond>,
    pub pairs: Vec<Pair>,
    pub angles: Vec<Angle>,
    pub dihedrals: Vec<Dihedral>,
    layout: Vec<TopologyBlock>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an atom to the end of the `[ atoms ]` section.
    ///
    /// # Return
    ///
    /// The stable identifier of the new atom.
    pub fn add_atom(&mut self, atom: TopAtom) -> AtomId {
        let id = self.atoms.insert(atom);
        self.atom_order.push(id);
        id
    }

    pub fn atom(&self, id: AtomId) -> Option<&TopAtom> {
        self.atoms.get(id)
    }

    pub fn atom_mut(&mut self, id: AtomId) -> Option<&mut TopAtom> {
        self.atoms.get_mut(id)
    }

    /// Atoms in file order.
    pub fn atoms(&self) -> impl Iterator<Item = (AtomId, &TopAtom)> {
        self.atom_order
            .iter()
            .filter_map(|&id| self.atoms.get(id).map(|a| (id, a)))
    }

    pub fn atoms_mut(&mut self) -> impl Iterator<Item = &mut TopAtom> {
        self.atoms.values_mut()
    }

    pub fn natoms(&self) -> usize {
        self.atoms.len()
    }

    /// Looks up an atom by its file number.
    pub fn atom_by_id(&self, number: usize) -> Option<AtomId> {
        self.atoms().find(|(_, a)| a.id == number).map(|(id, _)| id)
    }

    /// Finds the atom called `name` in residue `resnr`.
    pub fn find_atom(&self, resnr: isize, name: &str) -> Option<AtomId> {
        self.atoms()
            .find(|(_, a)| a.resnr == resnr && a.name == name)
            .map(|(id, _)| id)
    }

    /// Distinct `(resnr, resname)` pairs in order of first appearance.
    pub fn residues(&self) -> Vec<(isize, String)> {
        let mut seen = HashSet::new();
        let mut residues = Vec::new();
        for (_, atom) in self.atoms() {
            if seen.insert(atom.resnr) {
                residues.push((atom.resnr, atom.resname.clone()));
            }
        }
        residues
    }

    pub fn residue_atoms(&self, resnr: isize) -> Vec<AtomId> {
        self.atoms()
            .filter(|(_, a)| a.resnr == resnr)
            .map(|(id, _)| id)
            .collect()
    }

    /// Removes the given atoms together with every interaction that touches any of them.
    ///
    /// # Return
    ///
    /// The number of atoms actually removed.
    pub fn remove_atoms(&mut self, ids: &HashSet<AtomId>) -> usize {
        let mut removed = 0;
        for &id in ids {
            if self.atoms.remove(id).is_some() {
                removed += 1;
            }
        }
        self.atom_order.retain(|id| !ids.contains(id));
        self.bonds.retain(|b| !b.involves_any(ids));
        self.pairs.retain(|p| !p.involves_any(ids));
        self.angles.retain(|a| !a.involves_any(ids));
        self.dihedrals.retain(|d| !d.involves_any(ids));
        removed
    }

    /// Bonded neighbours of every atom, in the order the bonds are listed.
    pub fn bonded_partners(&self) -> HashMap<AtomId, Vec<AtomId>> {
        let mut partners: HashMap<AtomId, Vec<AtomId>> = HashMap::new();
        for bond in &self.bonds {
            let [a, b] = bond.atoms;
            partners.entry(a).or_default().push(b);
            partners.entry(b).or_default().push(a);
        }
        partners
    }

    /// Whether a pair of function type `func` between `a` and `b` exists, in either
    /// orientation.
    pub fn has_pair(&self, a: AtomId, b: AtomId, func: u8) -> bool {
        self.pairs
            .iter()
            .any(|p| p.func == func && (p.atoms == [a, b] || p.atoms == [b, a]))
    }

    pub fn interaction_count(&self, kind: InteractionKind) -> usize {
        match kind {
            InteractionKind::Bonds => self.bonds.len(),
            InteractionKind::Pairs => self.pairs.len(),
            InteractionKind::Angles => self.angles.len(),
            InteractionKind::Dihedrals => self.dihedrals.len(),
        }
    }

    /// Total charge of the molecule.
    pub fn net_charge(&self) -> f64 {
        self.atoms.values().map(|a| a.charge).sum()
    }

    pub fn layout(&self) -> &[TopologyBlock] {
        &self.layout
    }

    pub(crate) fn push_block(&mut self, block: TopologyBlock) {
        self.layout.push(block);
    }

    pub(crate) fn has_block(&self, block: &TopologyBlock) -> bool {
        self.layout.contains(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_of(n: usize) -> (Topology, Vec<AtomId>) {
        let mut top = Topology::new();
        let ids: Vec<AtomId> = (1..=n)
            .map(|i| top.add_atom(TopAtom::new(i, "CT", (i as isize + 1) / 2, "ALA", "C")))
            .collect();
        for w in ids.windows(2) {
            top.bonds.push(Bond::new([w[0], w[1]], 1));
        }
        (top, ids)
    }

    #[test]
    fn atoms_iterate_in_file_order_after_removal() {
        let (mut top, ids) = chain_of(5);
        top.remove_atoms(&HashSet::from([ids[1]]));
        let numbers: Vec<usize> = top.atoms().map(|(_, a)| a.id).collect();
        assert_eq!(numbers, vec![1, 3, 4, 5]);
    }

    #[test]
    fn removing_atoms_drops_touching_interactions() {
        let (mut top, ids) = chain_of(4);
        top.pairs.push(Pair::new([ids[0], ids[3]], 1));
        top.angles.push(Angle::new([ids[1], ids[2], ids[3]], 1));
        top.dihedrals
            .push(Dihedral::new([ids[0], ids[1], ids[2], ids[3]], 9));

        assert_eq!(top.remove_atoms(&HashSet::from([ids[0]])), 1);
        assert_eq!(top.bonds.len(), 2);
        assert!(top.pairs.is_empty());
        assert_eq!(top.angles.len(), 1);
        assert!(top.dihedrals.is_empty());
    }

    #[test]
    fn residues_are_distinct_and_ordered() {
        let (top, _) = chain_of(5);
        let numbers: Vec<isize> = top.residues().iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(top.residue_atoms(2).len(), 2);
    }

    #[test]
    fn bonded_partners_are_symmetric() {
        let (top, ids) = chain_of(3);
        let partners = top.bonded_partners();
        assert_eq!(partners[&ids[1]], vec![ids[0], ids[2]]);
        assert_eq!(partners[&ids[0]], vec![ids[1]]);
    }

    #[test]
    fn pair_lookup_ignores_orientation() {
        let (mut top, ids) = chain_of(4);
        top.pairs.push(Pair::new([ids[3], ids[0]], 1));
        assert!(top.has_pair(ids[0], ids[3], 1));
        assert!(!top.has_pair(ids[0], ids[2], 1));
    }

    #[test]
    fn pair_lookup_matches_function_type() {
        let (mut top, ids) = chain_of(4);
        top.pairs.push(Pair::new([ids[0], ids[3]], 2));
        assert!(top.has_pair(ids[3], ids[0], 2));
        assert!(!top.has_pair(ids[0], ids[3], 1));
    }

    #[test]
    fn lookup_by_number_and_name() {
        let (mut top, ids) = chain_of(2);
        top.atom_mut(ids[1]).unwrap().name = "N".to_string();
        assert_eq!(top.atom_by_id(2), Some(ids[1]));
        assert_eq!(top.find_atom(1, "N"), Some(ids[1]));
        assert_eq!(top.find_atom(2, "N"), None);
    }
}
