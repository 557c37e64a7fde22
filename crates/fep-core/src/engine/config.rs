use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// The simulation stages of every run directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SimType {
    Em,
    Eq,
    Transitions,
}

impl SimType {
    pub const ALL: [SimType; 3] = [SimType::Em, SimType::Eq, SimType::Transitions];

    pub fn dir_name(self) -> &'static str {
        match self {
            SimType::Em => "em",
            SimType::Eq => "eq",
            SimType::Transitions => "transitions",
        }
    }

    /// Prefix of the `.mdp` files, e.g. `ti` in `ti_l0.mdp`.
    pub fn mdp_prefix(self) -> &'static str {
        match self {
            SimType::Em => "em",
            SimType::Eq => "eq",
            SimType::Transitions => "ti",
        }
    }
}

impl fmt::Display for SimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for SimType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "em" => Ok(SimType::Em),
            "eq" => Ok(SimType::Eq),
            "transitions" | "ti" => Ok(SimType::Transitions),
            other => Err(ConfigError::InvalidParameter {
                name: "sim-type",
                reason: format!("'{}' is not one of em, eq, transitions", other),
            }),
        }
    }
}

/// The two alchemical end states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum State {
    A,
    B,
}

impl State {
    pub const ALL: [State; 2] = [State::A, State::B];

    pub fn dir_name(self) -> &'static str {
        match self {
            State::A => "stateA",
            State::B => "stateB",
        }
    }

    pub fn lambda_suffix(self) -> &'static str {
        match self {
            State::A => "l0",
            State::B => "l1",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// The legs of the thermodynamic cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Branch {
    Water,
    Protein,
}

impl Branch {
    pub const ALL: [Branch; 2] = [Branch::Water, Branch::Protein];

    pub fn dir_name(self) -> &'static str {
        match self {
            Branch::Water => "water",
            Branch::Protein => "protein",
        }
    }

    /// Short tag used in job names.
    pub fn job_prefix(self) -> &'static str {
        match self {
            Branch::Water => "lig",
            Branch::Protein => "prot",
        }
    }

    pub fn system_name(self) -> &'static str {
        match self {
            Branch::Water => "ligand in water",
            Branch::Protein => "protein and ligand in water",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Branch {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "water" | "ligand" => Ok(Branch::Water),
            "protein" => Ok(Branch::Protein),
            other => Err(ConfigError::InvalidParameter {
                name: "branch",
                reason: format!("'{}' is not one of water, protein", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Queue {
    #[default]
    Sge,
    Slurm,
}

impl FromStr for Queue {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SGE" => Ok(Queue::Sge),
            "SLURM" => Ok(Queue::Slurm),
            _ => Err(ConfigError::InvalidParameter {
                name: "queue",
                reason: format!("'{}' is not one of SGE, SLURM", s),
            }),
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Queue::Sge => f.write_str("SGE"),
            Queue::Slurm => f.write_str("SLURM"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathsConfig {
    pub work_dir: PathBuf,
    pub mdp_dir: PathBuf,
    pub protein_dir: PathBuf,
    pub ligand_dir: PathBuf,
}

/// How the solvated simulation box is built.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    pub forcefield: String,
    pub box_shape: String,
    /// Minimum solute to box edge distance in nm.
    pub box_distance: f64,
    pub water_model: String,
    /// Salt concentration in mol/L.
    pub salt_concentration: f64,
    pub positive_ion: String,
    pub negative_ion: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            forcefield: "amber99sb-star-ildn-mut.ff".to_string(),
            box_shape: "dodecahedron".to_string(),
            box_distance: 1.5,
            water_model: "tip3p".to_string(),
            salt_concentration: 0.15,
            positive_ion: "NaJ".to_string(),
            negative_ion: "ClJ".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub queue: Queue,
    pub sim_time_hours: u32,
    pub sim_cpu: u32,
    pub gpu: bool,
    pub partition: Option<String>,
    pub modules: Vec<String>,
    pub sources: Vec<String>,
    pub exports: Vec<String>,
    pub mdrun: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            queue: Queue::Sge,
            sim_time_hours: 24,
            sim_cpu: 8,
            gpu: true,
            partition: None,
            modules: Vec::new(),
            sources: Vec::new(),
            exports: Vec::new(),
            mdrun: "gmx mdrun".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionConfig {
    /// Number of non-equilibrium transitions started per state and replica.
    pub count: usize,
    /// Equilibrium time (ps) from which snapshots are extracted.
    pub snapshot_start_ps: f64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            count: 80,
            snapshot_start_ps: 2250.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub temperature: f64,
    pub bootstraps: usize,
    /// Normal draws per replica when pooling replica errors.
    pub summary_samples: usize,
    pub seed: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            temperature: 298.0,
            bootstraps: 100,
            summary_samples: 1000,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binaries {
    pub gmx: String,
    pub pmx: String,
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            gmx: "gmx".to_string(),
            pmx: "pmx".to_string(),
        }
    }
}

/// Where the edges of a study come from.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeSource {
    Pairs(Vec<(String, String)>),
    /// A text file with one `A B` pair per line.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudyConfig {
    pub paths: PathsConfig,
    pub replicas: usize,
    pub states: Vec<State>,
    pub branches: Vec<Branch>,
    pub sim_types: Vec<SimType>,
    pub system: SystemConfig,
    pub jobs: JobConfig,
    pub transitions: TransitionConfig,
    pub analysis: AnalysisConfig,
    pub binaries: Binaries,
    pub edges: EdgeSource,
}

#[derive(Default)]
pub struct StudyConfigBuilder {
    work_dir: Option<PathBuf>,
    mdp_dir: Option<PathBuf>,
    protein_dir: Option<PathBuf>,
    ligand_dir: Option<PathBuf>,
    replicas: Option<usize>,
    states: Option<Vec<State>>,
    branches: Option<Vec<Branch>>,
    sim_types: Option<Vec<SimType>>,
    system: Option<SystemConfig>,
    jobs: Option<JobConfig>,
    transitions: Option<TransitionConfig>,
    analysis: Option<AnalysisConfig>,
    binaries: Option<Binaries>,
    edges: Option<EdgeSource>,
}

impl StudyConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn work_dir(mut self, path: PathBuf) -> Self {
        self.work_dir = Some(path);
        self
    }
    pub fn mdp_dir(mut self, path: PathBuf) -> Self {
        self.mdp_dir = Some(path);
        self
    }
    pub fn protein_dir(mut self, path: PathBuf) -> Self {
        self.protein_dir = Some(path);
        self
    }
    pub fn ligand_dir(mut self, path: PathBuf) -> Self {
        self.ligand_dir = Some(path);
        self
    }
    pub fn replicas(mut self, n: usize) -> Self {
        self.replicas = Some(n);
        self
    }
    pub fn states(mut self, states: Vec<State>) -> Self {
        self.states = Some(states);
        self
    }
    pub fn branches(mut self, branches: Vec<Branch>) -> Self {
        self.branches = Some(branches);
        self
    }
    pub fn sim_types(mut self, sim_types: Vec<SimType>) -> Self {
        self.sim_types = Some(sim_types);
        self
    }
    pub fn system(mut self, system: SystemConfig) -> Self {
        self.system = Some(system);
        self
    }
    pub fn jobs(mut self, jobs: JobConfig) -> Self {
        self.jobs = Some(jobs);
        self
    }
    pub fn transitions(mut self, transitions: TransitionConfig) -> Self {
        self.transitions = Some(transitions);
        self
    }
    pub fn analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.analysis = Some(analysis);
        self
    }
    pub fn binaries(mut self, binaries: Binaries) -> Self {
        self.binaries = Some(binaries);
        self
    }
    pub fn edges(mut self, edges: EdgeSource) -> Self {
        self.edges = Some(edges);
        self
    }

    pub fn build(self) -> Result<StudyConfig, ConfigError> {
        let paths = PathsConfig {
            work_dir: self
                .work_dir
                .ok_or(ConfigError::MissingParameter("work_dir"))?,
            mdp_dir: self.mdp_dir.ok_or(ConfigError::MissingParameter("mdp_dir"))?,
            protein_dir: self
                .protein_dir
                .ok_or(ConfigError::MissingParameter("protein_dir"))?,
            ligand_dir: self
                .ligand_dir
                .ok_or(ConfigError::MissingParameter("ligand_dir"))?,
        };
        let edges = self.edges.ok_or(ConfigError::MissingParameter("edges"))?;

        let replicas = self.replicas.unwrap_or(3);
        if replicas == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "replicas",
                reason: "at least one replica is required".to_string(),
            });
        }

        let transitions = self.transitions.unwrap_or_default();
        if transitions.count == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "transitions.count",
                reason: "at least one transition is required".to_string(),
            });
        }

        let analysis = self.analysis.unwrap_or_default();
        if analysis.summary_samples == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "analysis.summary_samples",
                reason: "must be positive".to_string(),
            });
        }

        let system = self.system.unwrap_or_default();
        if system.box_distance.is_nan() || system.box_distance <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "system.box_distance",
                reason: format!("{} is not a positive distance", system.box_distance),
            });
        }

        let states = non_empty(self.states, State::ALL.to_vec(), "states")?;
        let branches = non_empty(self.branches, Branch::ALL.to_vec(), "branches")?;
        let sim_types = non_empty(self.sim_types, SimType::ALL.to_vec(), "sim_types")?;

        Ok(StudyConfig {
            paths,
            replicas,
            states,
            branches,
            sim_types,
            system,
            jobs: self.jobs.unwrap_or_default(),
            transitions,
            analysis,
            binaries: self.binaries.unwrap_or_default(),
            edges,
        })
    }
}

fn non_empty<T>(
    value: Option<Vec<T>>,
    default: Vec<T>,
    name: &'static str,
) -> Result<Vec<T>, ConfigError> {
    match value {
        Some(v) if v.is_empty() => Err(ConfigError::InvalidParameter {
            name,
            reason: "must not be empty".to_string(),
        }),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> StudyConfigBuilder {
        StudyConfigBuilder::new()
            .work_dir("work".into())
            .mdp_dir("mdp".into())
            .protein_dir("protein".into())
            .ligand_dir("ligands".into())
            .edges(EdgeSource::Pairs(vec![("a".into(), "b".into())]))
    }

    #[test]
    fn defaults_follow_the_standard_protocol() {
        let config = minimal().build().unwrap();
        assert_eq!(config.replicas, 3);
        assert_eq!(config.states, vec![State::A, State::B]);
        assert_eq!(config.branches, vec![Branch::Water, Branch::Protein]);
        assert_eq!(config.sim_types, SimType::ALL.to_vec());
        assert_eq!(config.system.forcefield, "amber99sb-star-ildn-mut.ff");
        assert_eq!(config.system.positive_ion, "NaJ");
        assert_eq!(config.jobs.queue, Queue::Sge);
        assert_eq!(config.jobs.mdrun, "gmx mdrun");
        assert_eq!(config.transitions.count, 80);
        assert_eq!(config.analysis.bootstraps, 100);
    }

    #[test]
    fn build_fails_if_required_parameter_is_missing() {
        let result = StudyConfigBuilder::new()
            .work_dir("work".into())
            .mdp_dir("mdp".into())
            .ligand_dir("ligands".into())
            .build();
        assert_eq!(
            result.unwrap_err(),
            ConfigError::MissingParameter("protein_dir")
        );
    }

    #[test]
    fn zero_replicas_is_rejected() {
        let err = minimal().replicas(0).build().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "replicas",
                ..
            }
        ));
    }

    #[test]
    fn empty_branch_list_is_rejected() {
        let err = minimal().branches(Vec::new()).build().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "branches",
                ..
            }
        ));
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("TI".parse::<SimType>().unwrap(), SimType::Transitions);
        assert_eq!("slurm".parse::<Queue>().unwrap(), Queue::Slurm);
        assert_eq!("Protein".parse::<Branch>().unwrap(), Branch::Protein);
        assert!("vacuum".parse::<Branch>().is_err());
        assert_eq!(SimType::Transitions.mdp_prefix(), "ti");
        assert_eq!(State::B.lambda_suffix(), "l1");
    }
}
