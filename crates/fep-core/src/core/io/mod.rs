//! Provides input/output functionality for molecular file formats.
//!
//! This module contains readers and writers for the binary trajectory formats produced by
//! GROMACS (XTC and TRR, both built on XDR encoding), for PDB coordinate files and for
//! GROMACS topology files. Text formats share the [`traits::ModelFile`] interface.

pub mod pdb;
pub mod system_top;
pub mod topology;
pub mod traits;
pub mod trajectory;
pub mod trr;
pub mod xdr;
pub mod xtc;
