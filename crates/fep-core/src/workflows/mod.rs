//! # Workflows Module
//!
//! High-level procedures that carry a relative free-energy study from raw inputs to a table
//! of binding free-energy differences.
//!
//! ## Overview
//!
//! Every workflow operates on an opened [`setup::Study`] and a selection of its edges. The
//! steps mirror the order in which a study is run:
//!
//! 1. [`setup`] - resolve inputs and create the directory tree
//! 2. [`ligands`] - atom mapping and hybrid structure/topology generation with `pmx`
//! 3. [`assemble`] - initial structures and system topologies for both branches
//! 4. [`solvation`] - box, water and ions
//! 5. [`simulation`] - run inputs for em, eq and transitions, and local execution
//! 6. [`transitions`] - equilibrium snapshot extraction and transition run inputs
//! 7. [`jobs`] - scheduler scripts as an alternative to local execution
//! 8. [`analysis`] - `pmx analyse` per replica and the ddG summary
//!
//! [`cyclic`] is independent of studies: it turns the topology of a linear peptide into a
//! head-to-tail cyclic one.
//!
//! External programs are reached through an
//! [`CommandRunner`](crate::engine::gmx::CommandRunner), so each workflow can be exercised
//! without GROMACS or `pmx` installed.

pub mod analysis;
pub mod assemble;
pub mod cyclic;
pub mod jobs;
pub mod ligands;
pub mod setup;
pub mod simulation;
pub mod solvation;
pub mod transitions;
