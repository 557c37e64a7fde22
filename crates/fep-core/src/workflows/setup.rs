use crate::engine::config::{Branch, StudyConfig};
use crate::engine::error::EngineError;
use crate::engine::inputs::{Edge, Ligand, LigandSet, ProteinInputs, resolve_edges};
use crate::engine::layout::Layout;
use crate::engine::progress::{Progress, ProgressReporter};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// An opened study: configuration with absolute paths, discovered inputs and edges.
#[derive(Debug, Clone)]
pub struct Study {
    pub config: StudyConfig,
    pub layout: Layout,
    pub protein: ProteinInputs,
    pub ligands: LigandSet,
    pub edges: Vec<Edge>,
}

impl Study {
    /// Resolves paths and discovers the protein, ligands and edges without touching the
    /// work directory.
    pub fn open(mut config: StudyConfig) -> Result<Self, EngineError> {
        let paths = &mut config.paths;
        paths.work_dir = absolute(&paths.work_dir)?;
        paths.mdp_dir = absolute(&paths.mdp_dir)?;
        paths.protein_dir = absolute(&paths.protein_dir)?;
        paths.ligand_dir = absolute(&paths.ligand_dir)?;

        let protein = ProteinInputs::discover(&config.paths.protein_dir)?;
        let ligands = LigandSet::discover(&config.paths.ligand_dir)?;
        let edges = resolve_edges(&config.edges, &ligands)?;
        let layout = Layout::from_config(&config);
        Ok(Self {
            config,
            layout,
            protein,
            ligands,
            edges,
        })
    }

    /// The edges named in `names`, in study order; all edges when `names` is empty.
    ///
    /// A name may be given with or without its `edge_` prefix.
    pub fn select_edges(&self, names: &[String]) -> Result<Vec<&Edge>, EngineError> {
        if names.is_empty() {
            return Ok(self.edges.iter().collect());
        }
        for name in names {
            if !self.edges.iter().any(|e| edge_matches(e, name)) {
                return Err(EngineError::Input(format!(
                    "edge '{}' is not part of the study",
                    name
                )));
            }
        }
        Ok(self
            .edges
            .iter()
            .filter(|e| names.iter().any(|n| edge_matches(e, n)))
            .collect())
    }

    pub fn ligand(&self, name: &str) -> Result<&Ligand, EngineError> {
        self.ligands
            .get(name)
            .ok_or_else(|| EngineError::Input(format!("unknown ligand '{}'", name)))
    }

    /// The two ligands of `edge`.
    pub fn edge_ligands(&self, edge: &Edge) -> Result<(&Ligand, &Ligand), EngineError> {
        Ok((self.ligand(&edge.ligand_a)?, self.ligand(&edge.ligand_b)?))
    }

    /// Branches of the study restricted to `selection`.
    pub fn branches(&self, selection: &[Branch]) -> Vec<Branch> {
        self.layout
            .branches()
            .iter()
            .copied()
            .filter(|b| selection.contains(b))
            .collect()
    }

    pub fn mdp(&self, name: &str) -> PathBuf {
        self.config.paths.mdp_dir.join(name)
    }

    /// The printable summary of paths, replicas and edges.
    pub fn summary(&self) -> String {
        StudySummary(self).to_string()
    }
}

struct StudySummary<'a>(&'a Study);

impl fmt::Display for StudySummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let study = self.0;
        let paths = &study.config.paths;
        writeln!(f, "Summary of the setup:")?;
        writeln!(f, "   workpath: {}", paths.work_dir.display())?;
        writeln!(f, "   mdp path: {}", paths.mdp_dir.display())?;
        writeln!(f, "   protein files: {}", paths.protein_dir.display())?;
        writeln!(f, "   ligand files: {}", paths.ligand_dir.display())?;
        writeln!(f, "   number of replicas: {}", study.config.replicas)?;
        writeln!(f, "   edges:")?;
        for edge in &study.edges {
            writeln!(f, "        {}", edge.name)?;
        }
        Ok(())
    }
}

fn edge_matches(edge: &Edge, name: &str) -> bool {
    edge.name == name || edge.name.strip_prefix("edge_") == Some(name)
}

fn absolute(path: &Path) -> Result<PathBuf, EngineError> {
    std::path::absolute(path).map_err(EngineError::io(path))
}

/// Opens the study and creates its work directory tree.
#[instrument(skip_all, name = "setup_workflow")]
pub fn prepare_free_energy_dir(
    config: StudyConfig,
    reporter: &ProgressReporter,
) -> Result<Study, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Reading inputs",
    });
    let study = Study::open(config)?;
    info!(
        ligands = study.ligands.len(),
        edges = study.edges.len(),
        protein = %study.protein.structure.display(),
        "Inputs discovered"
    );
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart {
        name: "Creating directories",
    });
    let leaves = study.layout.create_tree(&study.edges)?;
    info!(
        work_dir = %study.layout.work_dir().display(),
        leaves, "Directory tree ready"
    );
    reporter.report(Progress::PhaseFinish);
    Ok(study)
}
