//! # Engine Module
//!
//! This module implements the orchestration layer of fepflow: everything needed to turn a
//! set of ligands, a protein and a list of edges into a tree of ready-to-run GROMACS
//! simulations, and to collect the free-energy estimates afterwards.
//!
//! ## Overview
//!
//! A relative FEP study transforms ligand A into ligand B twice, once in water and once in
//! the binding site. The engine owns the description of such a study, the on-disk layout of
//! its directories and the glue to the external programs that do the actual work (GROMACS
//! and `pmx`). It does not simulate or estimate anything itself.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Study parameters, system preparation and job settings
//! - **Directory Layout** ([`layout`]) - Path arithmetic for the `edge/branch/state/run/sim` tree
//! - **Input Discovery** ([`inputs`]) - Protein and ligand folders, edge lists
//! - **External Programs** ([`gmx`]) - Command runners and typed wrappers for `gmx` and `pmx`
//! - **Job Scripts** ([`jobscript`]) - SGE and SLURM scripts plus their submission script
//! - **Results** ([`results`]) - Parsing of `pmx analyse` output and replica statistics
//! - **Progress Monitoring** ([`progress`]) - Progress reporting for front ends
//! - **Error Handling** ([`error`]) - Engine-specific error types and error propagation
//!
//! ## Key Capabilities
//!
//! - **Reproducible layout** with idempotent directory creation
//! - **Pluggable command execution** so workflows can be exercised without GROMACS installed
//! - **Parallel preparation** of independent transition run inputs
//! - **Scheduler support** for SGE array jobs and SLURM

pub mod config;
pub mod error;
pub mod gmx;
pub mod inputs;
pub mod jobscript;
pub mod layout;
pub mod progress;
pub mod results;
