use clap::{Args, Parser, Subcommand, ValueEnum};
use fepflow::engine::config::{Branch, SimType};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "fepflow CLI - set up, run and analyse relative free-energy perturbation studies with GROMACS and pmx.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel run-input generation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read the inputs of a study and create its directory tree.
    Setup(StudyArgs),
    /// Map the atoms of both ligands of every edge (pmx atomMapping).
    Map(StudyArgs),
    /// Build hybrid structures and topologies (pmx ligandHybrid).
    Hybrid(StudyArgs),
    /// Write the initial structure and topology of each branch.
    Assemble(BranchArgs),
    /// Box, solvate and add ions to each branch.
    Solvate(SolvateArgs),
    /// Generate the run inputs of one simulation type.
    Prepare(SimArgs),
    /// Run one simulation type locally with mdrun.
    Run(SimArgs),
    /// Extract equilibrium snapshots and build the transition run inputs.
    Transitions(TransitionArgs),
    /// Write scheduler job scripts for one simulation type.
    Jobs(SimArgs),
    /// Analyse the transitions of every replica with pmx analyse.
    Analyse(BranchArgs),
    /// Collect the analysis results into replica, branch and edge tables.
    Summary(SummaryArgs),
    /// Turn the topology of a linear peptide with dummy termini into a cyclic one.
    Cyclize(CyclizeArgs),
    /// Inspect or convert XTC/TRR trajectories.
    Traj(TrajArgs),
}

/// Arguments shared by every command operating on a study.
#[derive(Args, Debug, Clone)]
pub struct StudyArgs {
    /// Path to the study configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Restrict the command to these edges (with or without the `edge_` prefix).
    /// Can be used multiple times. Defaults to all edges.
    #[arg(short, long = "edge", value_name = "NAME")]
    pub edges: Vec<String>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S transitions.count=40
    /// A relative `paths.work-dir` is taken from the current directory.
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchSelection {
    Water,
    Protein,
    #[default]
    Both,
}

impl BranchSelection {
    pub fn branches(self) -> Vec<Branch> {
        match self {
            BranchSelection::Water => vec![Branch::Water],
            BranchSelection::Protein => vec![Branch::Protein],
            BranchSelection::Both => Branch::ALL.to_vec(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct BranchArgs {
    #[command(flatten)]
    pub study: StudyArgs,

    /// Which legs of the thermodynamic cycle to process.
    #[arg(short, long, value_enum, default_value_t = BranchSelection::Both)]
    pub branch: BranchSelection,
}

#[derive(Args, Debug, Clone)]
pub struct SolvateArgs {
    #[command(flatten)]
    pub target: BranchArgs,

    /// Skip placing the system in a box.
    #[arg(long)]
    pub no_box: bool,

    /// Skip adding water.
    #[arg(long)]
    pub no_water: bool,

    /// Skip adding ions.
    #[arg(long)]
    pub no_ions: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimArg {
    Em,
    Eq,
    Transitions,
}

impl From<SimArg> for SimType {
    fn from(s: SimArg) -> Self {
        match s {
            SimArg::Em => SimType::Em,
            SimArg::Eq => SimType::Eq,
            SimArg::Transitions => SimType::Transitions,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SimArgs {
    #[command(flatten)]
    pub target: BranchArgs,

    /// The simulation type.
    #[arg(short, long, value_enum, required = true)]
    pub sim: SimArg,
}

#[derive(Args, Debug, Clone)]
pub struct TransitionArgs {
    #[command(flatten)]
    pub target: BranchArgs,

    /// Only extract the snapshots; do not run grompp on them.
    #[arg(long)]
    pub no_tpr: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub study: StudyArgs,

    /// Directory receiving results_all.csv and results_summary.csv.
    /// Defaults to the work directory of the study.
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CyclizeArgs {
    /// Structure of the linear peptide including one dummy residue on each end.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Topology of the linear peptide. Built with pdb2gmx when omitted.
    #[arg(short = 'p', long, value_name = "PATH")]
    pub topology: Option<PathBuf>,

    /// Working directory for intermediate files and the minimisation.
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub work_dir: PathBuf,

    /// Output structure of the cyclic peptide. Defaults to <work-dir>/out.pdb.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Output topology of the cyclic peptide. Defaults to <work-dir>/topol.top.
    #[arg(long, value_name = "PATH")]
    pub output_topology: Option<PathBuf>,

    /// One-letter sequence of the cyclic peptide, checked against the topology.
    #[arg(long, value_name = "SEQ", requires = "chirality")]
    pub sequence: Option<String>,

    /// Chirality (L/D) of each residue of the sequence.
    #[arg(long, value_name = "LD..", requires = "sequence")]
    pub chirality: Option<String>,

    /// Force field passed to pdb2gmx.
    #[arg(long, default_value = "amber99sb-star-ildn", value_name = "NAME")]
    pub forcefield: String,

    /// Water model passed to pdb2gmx.
    #[arg(long, default_value = "tip3p", value_name = "NAME")]
    pub water: String,

    /// Minimise the cyclic peptide in vacuum afterwards.
    #[arg(long)]
    pub minimize: bool,

    /// The GROMACS executable.
    #[arg(long, default_value = "gmx", value_name = "PATH")]
    pub gmx: String,
}

#[derive(Args, Debug, Clone)]
pub struct TrajArgs {
    #[command(subcommand)]
    pub command: TrajCommands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TrajCommands {
    /// Print the atom count, frame count and time range of a trajectory.
    Info {
        #[arg(required = true, value_name = "PATH")]
        input: PathBuf,
    },
    /// Convert a trajectory between XTC and TRR (chosen by extension).
    Convert {
        #[arg(required = true, value_name = "INPUT")]
        input: PathBuf,
        #[arg(required = true, value_name = "OUTPUT")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn study_commands_accept_edges_branch_and_overrides() {
        let cli = Cli::parse_from([
            "fepflow", "-vv", "prepare", "-c", "study.toml", "--sim", "eq", "--edge", "a_b",
            "--edge", "edge_b_c", "-b", "water", "-S", "replicas=1",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Prepare(args) = cli.command else {
            panic!("expected prepare");
        };
        assert_eq!(args.sim, SimArg::Eq);
        assert_eq!(args.target.branch.branches(), vec![Branch::Water]);
        assert_eq!(args.target.study.edges, vec!["a_b", "edge_b_c"]);
        assert_eq!(args.target.study.set_values, vec!["replicas=1"]);
    }

    #[test]
    fn branch_defaults_to_both() {
        let cli = Cli::parse_from(["fepflow", "analyse", "-c", "study.toml"]);
        let Commands::Analyse(args) = cli.command else {
            panic!("expected analyse");
        };
        assert_eq!(args.branch, BranchSelection::Both);
        assert_eq!(args.branch.branches(), Branch::ALL.to_vec());
    }

    #[test]
    fn sequence_requires_chirality() {
        let result = Cli::try_parse_from(["fepflow", "cyclize", "-i", "x.pdb", "--sequence", "GG"]);
        assert!(result.is_err());
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["fepflow", "-q", "-v", "traj", "info", "x.xtc"]);
        assert!(result.is_err());
    }
}
