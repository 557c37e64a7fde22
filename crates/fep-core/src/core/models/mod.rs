//! # Core Models Module
//!
//! Data structures describing molecular systems as fepflow sees them.
//!
//! ## Key Components
//!
//! - [`frame`] - A single trajectory frame (positions, box, step, time, lambda)
//! - [`structure`] - Coordinate structures as read from and written to PDB files
//! - [`topology`] - The bonded graph of a molecule (atoms, bonds, pairs, angles, dihedrals)
//! - [`ids`] - Stable identifiers for topology atoms
//!
//! Topology interactions reference atoms by [`ids::AtomId`] rather than by their serial
//! number, so atoms can be removed and renumbered without rewriting every interaction.

pub mod frame;
pub mod ids;
pub mod structure;
pub mod topology;
