//! # fepflow Core Library
//!
//! A library for preparing, running and analysing relative free-energy perturbation (FEP)
//! studies on top of GROMACS and the `pmx` toolkit.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models and file formats: the XTC/TRR
//!   trajectory codec, the molecule topology graph (including cyclic peptide splicing),
//!   PDB structures, force-field atom types and system topology files.
//!
//! - **[`engine`]: The Orchestration Layer.** Study configuration, the experiment directory
//!   layout, input discovery, external command execution, scheduler job scripts and the
//!   statistics used to aggregate free-energy estimates.
//!
//! - **[`workflows`]: The Public API.** Complete procedures (directory setup, hybrid ligand
//!   generation, system assembly, simulation preparation, analysis) that tie the `engine`
//!   and `core` together.

pub mod core;
pub mod engine;
pub mod workflows;
