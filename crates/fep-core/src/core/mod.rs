//! # Core Module
//!
//! Fundamental data structures and file formats used throughout fepflow.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Trajectory frames, coordinate structures and
//!   the bonded topology graph of a molecule
//! - **File I/O** ([`io`]) - XDR-based trajectory formats (XTC, TRR), PDB files, GROMACS
//!   topology files and system topology generation
//! - **Force Field Data** ([`forcefield`]) - Atom type tables and their merging
//! - **Topology Editing** ([`topology`]) - Graph surgery on molecule topologies, such as
//!   closing a linear peptide into a ring

pub mod forcefield;
pub mod io;
pub mod models;
pub mod topology;
