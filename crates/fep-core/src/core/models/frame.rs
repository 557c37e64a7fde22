use super::structure::Structure;
use nalgebra::{Matrix3, Point3, Vector3};
use std::fmt;
use thiserror::Error;

/// Default XTC precision: coordinates are stored to 1/1000 nm.
pub const DEFAULT_XTC_PRECISION: f32 = 1000.0;

const ANGSTROM_PER_NM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthUnit {
    #[default]
    Nanometer,
    Angstrom,
}

impl LengthUnit {
    /// Factor converting a value in this unit into nanometres.
    pub fn to_nanometer(self) -> f64 {
        match self {
            LengthUnit::Nanometer => 1.0,
            LengthUnit::Angstrom => 1.0 / ANGSTROM_PER_NM,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Coordinate list length {0} is not a multiple of 3")]
    RaggedCoordinates(usize),
    #[error("Atom count mismatch: frame has {frame} atoms, structure has {structure}")]
    AtomCountMismatch { frame: usize, structure: usize },
}

/// One snapshot of a trajectory.
///
/// Lengths are in nanometres. Rows of `box_vectors` are the three box vectors, as GROMACS
/// stores them. TRR frames may carry no positions at all, in which case `positions` is
/// empty and `natoms` still reports the atom count of the frame header.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub step: i32,
    pub time: f32,
    pub lambda: f32,
    pub precision: f32,
    pub box_vectors: Matrix3<f32>,
    pub positions: Vec<Point3<f32>>,
    pub velocities: Option<Vec<Vector3<f32>>>,
    pub forces: Option<Vec<Vector3<f32>>>,
    natoms: usize,
}

impl Frame {
    /// A frame of `natoms` atoms at the origin with an empty box.
    pub fn new(natoms: usize) -> Self {
        Self {
            step: 0,
            time: 0.0,
            lambda: 0.0,
            precision: DEFAULT_XTC_PRECISION,
            box_vectors: Matrix3::zeros(),
            positions: vec![Point3::origin(); natoms],
            velocities: None,
            forces: None,
            natoms,
        }
    }

    pub fn with_positions(positions: Vec<Point3<f32>>) -> Self {
        let natoms = positions.len();
        Self {
            positions,
            ..Self::new(0)
        }
        .with_natoms(natoms)
    }

    /// A frame whose header announces `natoms` atoms but carries no positions.
    pub(crate) fn without_positions(natoms: usize) -> Self {
        Self {
            positions: Vec::new(),
            ..Self::new(0)
        }
        .with_natoms(natoms)
    }

    fn with_natoms(mut self, natoms: usize) -> Self {
        self.natoms = natoms;
        self
    }

    /// Builds a frame from a flat `x, y, z, x, y, z, ...` list.
    pub fn from_coordinates(flat: &[f64], unit: LengthUnit) -> Result<Self, FrameError> {
        if flat.len() % 3 != 0 {
            return Err(FrameError::RaggedCoordinates(flat.len()));
        }
        let scale = unit.to_nanometer();
        let positions = flat
            .chunks_exact(3)
            .map(|c| {
                Point3::new(
                    (c[0] * scale) as f32,
                    (c[1] * scale) as f32,
                    (c[2] * scale) as f32,
                )
            })
            .collect();
        Ok(Self::with_positions(positions))
    }

    /// Builds a frame from a PDB structure (Angstrom) converting to nanometres.
    pub fn from_structure(structure: &Structure) -> Self {
        let positions = structure
            .atoms
            .iter()
            .map(|a| (a.position / ANGSTROM_PER_NM).cast::<f32>())
            .collect();
        let mut frame = Self::with_positions(positions);
        if let Some(cell) = structure.cell {
            frame.box_vectors = (cell / ANGSTROM_PER_NM).cast::<f32>();
        }
        frame
    }

    /// Copies positions and box of this frame into `structure`.
    pub fn update_structure(&self, structure: &mut Structure) -> Result<(), FrameError> {
        if self.positions.len() != structure.atoms.len() {
            return Err(FrameError::AtomCountMismatch {
                frame: self.positions.len(),
                structure: structure.atoms.len(),
            });
        }
        for (atom, p) in structure.atoms.iter_mut().zip(&self.positions) {
            atom.position = p.cast::<f64>() * ANGSTROM_PER_NM;
        }
        if self.box_vectors != Matrix3::zeros() {
            structure.cell = Some(self.box_vectors.cast::<f64>() * ANGSTROM_PER_NM);
        }
        Ok(())
    }

    pub fn natoms(&self) -> usize {
        self.natoms
    }

    pub fn box_vectors(&self) -> &Matrix3<f32> {
        &self.box_vectors
    }

    pub fn has_positions(&self) -> bool {
        !self.positions.is_empty() || self.natoms == 0
    }

    /// Box entries in row-major order, the layout used on disk.
    pub(crate) fn box_row_major(&self) -> [f32; 9] {
        let b = &self.box_vectors;
        [
            b[(0, 0)],
            b[(0, 1)],
            b[(0, 2)],
            b[(1, 0)],
            b[(1, 1)],
            b[(1, 2)],
            b[(2, 0)],
            b[(2, 1)],
            b[(2, 2)],
        ]
    }

    pub(crate) fn set_box_row_major(&mut self, values: &[f32]) {
        if values.len() == 9 {
            self.box_vectors = Matrix3::from_row_slice(values);
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "< Frame: natoms = {} | step = {} | time = {} >",
            self.natoms, self.step, self.time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::structure::{RecordKind, StructureAtom};

    fn structure_with(positions: &[[f64; 3]]) -> Structure {
        let atoms = positions
            .iter()
            .enumerate()
            .map(|(i, p)| StructureAtom {
                record: RecordKind::Atom,
                serial: i + 1,
                name: "CA".to_string(),
                alt_loc: ' ',
                res_name: "ALA".to_string(),
                chain_id: 'A',
                res_seq: 1,
                i_code: ' ',
                position: Point3::new(p[0], p[1], p[2]),
                occupancy: 1.0,
                b_factor: 0.0,
                element: "C".to_string(),
            })
            .collect();
        Structure { atoms, cell: None }
    }

    #[test]
    fn angstrom_coordinates_are_scaled_to_nanometres() {
        let frame =
            Frame::from_coordinates(&[10.0, 20.0, -5.0, 0.0, 1.0, 2.0], LengthUnit::Angstrom)
                .unwrap();
        assert_eq!(frame.natoms(), 2);
        assert!((frame.positions[0].x - 1.0).abs() < 1e-6);
        assert!((frame.positions[0].z + 0.5).abs() < 1e-6);
        assert!((frame.positions[1].z - 0.2).abs() < 1e-6);
    }

    #[test]
    fn ragged_coordinate_lists_are_rejected() {
        assert_eq!(
            Frame::from_coordinates(&[1.0, 2.0], LengthUnit::Nanometer),
            Err(FrameError::RaggedCoordinates(2))
        );
    }

    #[test]
    fn structure_round_trips_through_a_frame() {
        let mut structure = structure_with(&[[1.0, 2.0, 3.0], [-4.0, 5.5, 6.25]]);
        structure.cell = Some(Matrix3::from_diagonal_element(30.0));
        let mut frame = Frame::from_structure(&structure);
        assert!((frame.box_vectors[(1, 1)] - 3.0).abs() < 1e-6);

        frame.positions[1] = Point3::new(0.1, 0.2, 0.3);
        frame.update_structure(&mut structure).unwrap();
        assert!((structure.atoms[1].position.y - 2.0).abs() < 1e-5);
        assert!((structure.atoms[0].position.z - 3.0).abs() < 1e-5);
    }

    #[test]
    fn update_structure_rejects_different_atom_counts() {
        let frame = Frame::new(3);
        let mut structure = structure_with(&[[0.0, 0.0, 0.0]]);
        assert_eq!(
            frame.update_structure(&mut structure),
            Err(FrameError::AtomCountMismatch {
                frame: 3,
                structure: 1
            })
        );
    }

    #[test]
    fn display_lists_count_step_and_time() {
        let mut frame = Frame::new(4);
        frame.step = 250;
        frame.time = 0.5;
        assert_eq!(
            frame.to_string(),
            "< Frame: natoms = 4 | step = 250 | time = 0.5 >"
        );
    }
}
