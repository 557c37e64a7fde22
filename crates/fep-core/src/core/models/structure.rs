use nalgebra::{Matrix3, Point3, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Atom,
    Hetatm,
}

impl RecordKind {
    pub fn tag(self) -> &'static str {
        match self {
            RecordKind::Atom => "ATOM",
            RecordKind::Hetatm => "HETATM",
        }
    }
}

/// A single atom record of a coordinate file. Positions are in Angstrom.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureAtom {
    pub record: RecordKind,
    pub serial: usize,
    pub name: String,
    pub alt_loc: char,
    pub res_name: String,
    pub chain_id: char,
    pub res_seq: isize,
    pub i_code: char,
    pub position: Point3<f64>,
    pub occupancy: f64,
    pub b_factor: f64,
    pub element: String,
}

impl StructureAtom {
    pub fn residue_key(&self) -> ResidueKey {
        ResidueKey {
            chain_id: self.chain_id,
            res_seq: self.res_seq,
            i_code: self.i_code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResidueKey {
    pub chain_id: char,
    pub res_seq: isize,
    pub i_code: char,
}

/// Coordinates of a molecular system in file order, with an optional unit cell whose rows
/// are the box vectors (Angstrom).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Structure {
    pub atoms: Vec<StructureAtom>,
    pub cell: Option<Matrix3<f64>>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn natoms(&self) -> usize {
        self.atoms.len()
    }

    /// Residues in order of first appearance.
    pub fn residue_keys(&self) -> Vec<ResidueKey> {
        let mut keys: Vec<ResidueKey> = Vec::new();
        for atom in &self.atoms {
            let key = atom.residue_key();
            if keys.last() != Some(&key) && !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    pub fn first_residue(&self) -> Option<ResidueKey> {
        self.atoms.first().map(StructureAtom::residue_key)
    }

    pub fn last_residue(&self) -> Option<ResidueKey> {
        self.atoms.last().map(StructureAtom::residue_key)
    }

    /// Removes every atom of the residue and returns how many were removed.
    pub fn remove_residue(&mut self, key: &ResidueKey) -> usize {
        let before = self.atoms.len();
        self.atoms.retain(|a| a.residue_key() != *key);
        before - self.atoms.len()
    }

    /// Renumbers atom serials consecutively from 1.
    pub fn renumber_serials(&mut self) {
        for (i, atom) in self.atoms.iter_mut().enumerate() {
            atom.serial = i + 1;
        }
    }

    /// Shifts residue numbers so that the first residue is numbered 1.
    pub fn renumber_residues_from_one(&mut self) {
        if let Some(first) = self.atoms.first().map(|a| a.res_seq) {
            let shift = first - 1;
            for atom in &mut self.atoms {
                atom.res_seq -= shift;
            }
        }
    }
}

/// Unit cell lengths (Angstrom) and angles (degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellParameters {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl CellParameters {
    /// Box vectors in the GROMACS convention: `a` along x, `b` in the xy plane.
    pub fn to_box_vectors(&self) -> Matrix3<f64> {
        let (alpha, beta, gamma) = (
            self.alpha.to_radians(),
            self.beta.to_radians(),
            self.gamma.to_radians(),
        );
        let v1 = Vector3::new(self.a, 0.0, 0.0);
        let v2 = Vector3::new(self.b * gamma.cos(), self.b * gamma.sin(), 0.0);
        let cx = self.c * beta.cos();
        let cy = if gamma.sin().abs() > f64::EPSILON {
            self.c * (alpha.cos() - beta.cos() * gamma.cos()) / gamma.sin()
        } else {
            0.0
        };
        let cz = (self.c * self.c - cx * cx - cy * cy).max(0.0).sqrt();
        let v3 = Vector3::new(cx, cy, cz);
        Matrix3::from_rows(&[v1.transpose(), v2.transpose(), v3.transpose()])
    }

    pub fn from_box_vectors(m: &Matrix3<f64>) -> Self {
        let v1: Vector3<f64> = m.row(0).transpose();
        let v2: Vector3<f64> = m.row(1).transpose();
        let v3: Vector3<f64> = m.row(2).transpose();
        let angle = |u: &Vector3<f64>, w: &Vector3<f64>| {
            let denom = u.norm() * w.norm();
            if denom > 0.0 {
                (u.dot(w) / denom).clamp(-1.0, 1.0).acos().to_degrees()
            } else {
                90.0
            }
        };
        Self {
            a: v1.norm(),
            b: v2.norm(),
            c: v3.norm(),
            alpha: angle(&v2, &v3),
            beta: angle(&v1, &v3),
            gamma: angle(&v1, &v2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(serial: usize, res_seq: isize, name: &str) -> StructureAtom {
        StructureAtom {
            record: RecordKind::Atom,
            serial,
            name: name.to_string(),
            alt_loc: ' ',
            res_name: "GLY".to_string(),
            chain_id: 'A',
            res_seq,
            i_code: ' ',
            position: Point3::origin(),
            occupancy: 1.0,
            b_factor: 0.0,
            element: "C".to_string(),
        }
    }

    fn peptide() -> Structure {
        Structure {
            atoms: vec![
                atom(1, 1, "N"),
                atom(2, 1, "CA"),
                atom(3, 2, "N"),
                atom(4, 2, "CA"),
                atom(5, 3, "N"),
                atom(6, 3, "C"),
            ],
            cell: None,
        }
    }

    #[test]
    fn residue_keys_follow_file_order() {
        let keys = peptide().residue_keys();
        let numbers: Vec<isize> = keys.iter().map(|k| k.res_seq).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn trimming_terminal_residues_and_renumbering() {
        let mut s = peptide();
        let first = s.first_residue().unwrap();
        let last = s.last_residue().unwrap();
        assert_eq!(s.remove_residue(&first), 2);
        assert_eq!(s.remove_residue(&last), 2);
        s.renumber_serials();
        s.renumber_residues_from_one();
        assert_eq!(s.natoms(), 2);
        assert_eq!(s.atoms[0].serial, 1);
        assert_eq!(s.atoms[1].serial, 2);
        assert!(s.atoms.iter().all(|a| a.res_seq == 1));
    }

    #[test]
    fn rectangular_cell_parameters_give_a_diagonal_box() {
        let params = CellParameters {
            a: 30.0,
            b: 40.0,
            c: 50.0,
            alpha: 90.0,
            beta: 90.0,
            gamma: 90.0,
        };
        let m = params.to_box_vectors();
        assert!((m[(0, 0)] - 30.0).abs() < 1e-9);
        assert!((m[(1, 1)] - 40.0).abs() < 1e-9);
        assert!((m[(2, 2)] - 50.0).abs() < 1e-9);
        assert!(m[(1, 0)].abs() < 1e-9);
    }

    #[test]
    fn triclinic_cell_parameters_survive_conversion() {
        let params = CellParameters {
            a: 60.0,
            b: 60.0,
            c: 60.0,
            alpha: 60.0,
            beta: 60.0,
            gamma: 90.0,
        };
        let back = CellParameters::from_box_vectors(&params.to_box_vectors());
        assert!((back.a - 60.0).abs() < 1e-6);
        assert!((back.alpha - 60.0).abs() < 1e-6);
        assert!((back.beta - 60.0).abs() < 1e-6);
        assert!((back.gamma - 90.0).abs() < 1e-6);
    }
}
