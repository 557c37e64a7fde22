use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::config::ConfigError;
use crate::core::forcefield::atomtypes::AtomTypeError;
use crate::core::io::pdb::PdbError;
use crate::core::io::topology::TopologyError;
use crate::core::io::trajectory::TrajectoryError;
use crate::core::topology::cyclic::CyclicError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Command '{command}' failed with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Invalid study layout: {0}")]
    Layout(String),

    #[error("Input discovery failed: {0}")]
    Input(String),

    #[error("Edge '{edge}' references unknown ligand '{ligand}'")]
    UnknownLigand { edge: String, ligand: String },

    #[error("Failed to parse results in '{path}': {message}")]
    ResultParse { path: String, message: String },

    #[error("Statistics error: {0}")]
    Statistics(String),

    #[error("Failed to export results: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    #[error("Trajectory error: {source}")]
    Trajectory {
        #[from]
        source: TrajectoryError,
    },

    #[error("Topology error: {source}")]
    Topology {
        #[from]
        source: TopologyError,
    },

    #[error("PDB error: {source}")]
    Pdb {
        #[from]
        source: PdbError,
    },

    #[error("Atom type error: {source}")]
    AtomTypes {
        #[from]
        source: AtomTypeError,
    },

    #[error("Cyclic topology error: {source}")]
    Cyclic {
        #[from]
        source: CyclicError,
    },
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| EngineError::Io { path, source }
    }
}
