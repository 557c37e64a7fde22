use super::config::{Branch, SimType, State, StudyConfig};
use super::error::EngineError;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const HYBRID_DIR: &str = "hybridStrTop";

/// Path arithmetic for the experiment tree:
///
/// ```text
/// <work>/edge_A_B/hybridStrTop
/// <work>/edge_A_B/<branch>/<state>/run<r>/<sim>
/// <work>/edge_A_B/<branch>/analyse<r>
/// <work>/<sim>_jobscripts
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    work_dir: PathBuf,
    replicas: usize,
    states: Vec<State>,
    branches: Vec<Branch>,
    sim_types: Vec<SimType>,
}

impl Layout {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        replicas: usize,
        states: Vec<State>,
        branches: Vec<Branch>,
        sim_types: Vec<SimType>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            replicas,
            states,
            branches,
            sim_types,
        }
    }

    pub fn from_config(config: &StudyConfig) -> Self {
        Self::new(
            config.paths.work_dir.clone(),
            config.replicas,
            config.states.clone(),
            config.branches.clone(),
            config.sim_types.clone(),
        )
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Replica numbers, 1-based.
    pub fn runs(&self) -> impl Iterator<Item = usize> + Clone {
        1..=self.replicas
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn sim_types(&self) -> &[SimType] {
        &self.sim_types
    }

    pub fn edge_dir(&self, edge: &str) -> PathBuf {
        self.work_dir.join(edge)
    }

    pub fn hybrid_dir(&self, edge: &str) -> PathBuf {
        self.edge_dir(edge).join(HYBRID_DIR)
    }

    pub fn branch_dir(&self, edge: &str, branch: Branch) -> PathBuf {
        self.edge_dir(edge).join(branch.dir_name())
    }

    pub fn state_dir(&self, edge: &str, branch: Branch, state: State) -> PathBuf {
        self.branch_dir(edge, branch).join(state.dir_name())
    }

    pub fn run_dir(&self, edge: &str, branch: Branch, state: State, run: usize) -> PathBuf {
        self.state_dir(edge, branch, state)
            .join(format!("run{}", run))
    }

    pub fn sim_dir(
        &self,
        edge: &str,
        branch: Branch,
        state: State,
        run: usize,
        sim: SimType,
    ) -> PathBuf {
        self.run_dir(edge, branch, state, run).join(sim.dir_name())
    }

    pub fn analysis_dir(&self, edge: &str, branch: Branch, run: usize) -> PathBuf {
        self.branch_dir(edge, branch).join(format!("analyse{}", run))
    }

    pub fn jobscript_dir(&self, sim: SimType) -> PathBuf {
        self.work_dir.join(format!("{}_jobscripts", sim.dir_name()))
    }

    /// Creates every directory of the tree for `edges`. Existing directories are kept.
    ///
    /// # Return
    ///
    /// The number of leaf simulation directories in the tree.
    pub fn create_tree<S: AsRef<str>>(&self, edges: &[S]) -> Result<usize, EngineError> {
        create_dir(&self.work_dir)?;
        let mut leaves = 0;
        for edge in edges {
            let edge = edge.as_ref();
            create_dir(&self.hybrid_dir(edge))?;
            for &branch in &self.branches {
                for &state in &self.states {
                    for run in self.runs() {
                        for &sim in &self.sim_types {
                            create_dir(&self.sim_dir(edge, branch, state, run, sim))?;
                            leaves += 1;
                        }
                    }
                }
            }
            debug!(edge, "Created directory tree");
        }
        Ok(leaves)
    }

    /// Renders the tree diagram of one generic edge.
    pub fn describe_tree(&self) -> String {
        TreeDiagram(self).to_string()
    }
}

struct TreeDiagram<'a>(&'a Layout);

impl fmt::Display for TreeDiagram<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = self.0;
        let runs = layout
            .runs()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("/");
        let sims = layout
            .sim_types
            .iter()
            .map(|s| s.dir_name())
            .collect::<Vec<_>>()
            .join("/");

        writeln!(f, "{}/", layout.work_dir.display())?;
        writeln!(f, "|")?;
        writeln!(f, "|--edge_X_Y")?;
        for branch in &layout.branches {
            writeln!(f, "|--|--{}", branch.dir_name())?;
            for state in &layout.states {
                writeln!(f, "|--|--|--{}", state.dir_name())?;
                writeln!(f, "|--|--|--|--run{}", runs)?;
                writeln!(f, "|--|--|--|--|--{}", sims)?;
            }
        }
        writeln!(f, "|--|--{}", HYBRID_DIR)?;
        writeln!(f, "|--edge_..")
    }
}

pub(crate) fn create_dir(path: &Path) -> Result<(), EngineError> {
    fs::create_dir_all(path).map_err(EngineError::io(path))
}

/// Deletes `path`; a file that does not exist is not an error.
pub(crate) fn remove_file_if_present(path: &Path) -> Result<(), EngineError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(EngineError::io(path)(e)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(root: &Path) -> Layout {
        Layout::new(
            root,
            3,
            State::ALL.to_vec(),
            Branch::ALL.to_vec(),
            SimType::ALL.to_vec(),
        )
    }

    #[test]
    fn paths_nest_edge_branch_state_run_sim() {
        let l = layout(Path::new("/w"));
        assert_eq!(
            l.sim_dir("edge_a_b", Branch::Protein, State::B, 2, SimType::Transitions),
            PathBuf::from("/w/edge_a_b/protein/stateB/run2/transitions")
        );
        assert_eq!(
            l.hybrid_dir("edge_a_b"),
            PathBuf::from("/w/edge_a_b/hybridStrTop")
        );
        assert_eq!(
            l.analysis_dir("edge_a_b", Branch::Water, 3),
            PathBuf::from("/w/edge_a_b/water/analyse3")
        );
        assert_eq!(
            l.jobscript_dir(SimType::Eq),
            PathBuf::from("/w/eq_jobscripts")
        );
    }

    #[test]
    fn create_tree_builds_every_leaf_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(&dir.path().join("work"));
        let edges = ["edge_1_2", "edge_2_3"];
        assert_eq!(l.create_tree(&edges).unwrap(), 2 * 2 * 2 * 3 * 3);
        assert_eq!(l.create_tree(&edges).unwrap(), 72);
        assert!(l.hybrid_dir("edge_2_3").is_dir());
        assert!(
            l.sim_dir("edge_1_2", Branch::Water, State::A, 3, SimType::Em)
                .is_dir()
        );
        assert!(!l.run_dir("edge_1_2", Branch::Water, State::A, 4).exists());
    }

    #[test]
    fn tree_description_lists_runs_and_stages() {
        let l = layout(Path::new("/w"));
        let text = l.describe_tree();
        assert!(text.starts_with("/w/\n|\n|--edge_X_Y\n|--|--water\n"));
        assert!(text.contains("|--|--|--|--run1/2/3\n"));
        assert!(text.contains("|--|--|--|--|--em/eq/transitions\n"));
        assert_eq!(text.matches("stateB").count(), 2);
        assert!(text.ends_with("|--|--hybridStrTop\n|--edge_..\n"));
    }
}
