use super::setup::Study;
use super::transitions::generate_transition_tprs;
use crate::engine::config::{Branch, SimType, State};
use crate::engine::error::EngineError;
use crate::engine::gmx::{CommandRunner, Gromacs, GromppRequest, MdrunFiles, clean_backup_files};
use crate::engine::inputs::Edge;
use crate::engine::progress::{Progress, ProgressReporter};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, instrument};

pub(crate) const MAX_WARNINGS: u32 = 4;

/// One `edge/branch/state/run` combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunTarget<'s> {
    pub edge: &'s Edge,
    pub branch: Branch,
    pub state: State,
    pub run: usize,
}

/// Every run target in the order edge, state, run, branch.
pub(crate) fn run_targets<'s>(
    study: &Study,
    edges: &[&'s Edge],
    branches: &[Branch],
) -> Vec<RunTarget<'s>> {
    let branches = study.branches(branches);
    let mut targets = Vec::new();
    for &edge in edges {
        for &state in study.layout.states() {
            for run in study.layout.runs() {
                for &branch in &branches {
                    targets.push(RunTarget {
                        edge,
                        branch,
                        state,
                        run,
                    });
                }
            }
        }
    }
    targets
}

impl fmt::Display for RunTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} run{}", self.edge, self.branch, self.state, self.run)
    }
}

impl RunTarget<'_> {
    pub fn sim_dir(&self, study: &Study, sim: SimType) -> PathBuf {
        study
            .layout
            .sim_dir(&self.edge.name, self.branch, self.state, self.run, sim)
    }

    pub fn topology(&self, study: &Study) -> PathBuf {
        study
            .layout
            .branch_dir(&self.edge.name, self.branch)
            .join("topol.top")
    }

    pub fn mdp(&self, study: &Study, sim: SimType) -> PathBuf {
        study.mdp(&format!(
            "{}_{}.mdp",
            sim.mdp_prefix(),
            self.state.lambda_suffix()
        ))
    }
}

/// Generates the run input (`tpr.tpr`) of `sim` for every state and replica.
///
/// Minimisation starts from the branch's `ions.pdb`, equilibration from the minimised
/// `em/confout.gro` of the same replica. For transitions the `ti<i>.tpr` inputs are built
/// from already extracted snapshots.
///
/// # Return
///
/// The number of run inputs generated.
#[instrument(skip_all, name = "prepare_simulation_workflow", fields(sim = %sim))]
pub fn prepare_simulation(
    study: &Study,
    edges: &[&Edge],
    branches: &[Branch],
    sim: SimType,
    runner: &dyn CommandRunner,
    reporter: &ProgressReporter,
) -> Result<usize, EngineError> {
    let targets = run_targets(study, edges, branches);
    if sim == SimType::Transitions {
        reporter.report(Progress::PhaseStart {
            name: "Preparing transitions",
        });
        let mut generated = 0;
        reporter.task(targets.iter(), |target| {
            generated += generate_transition_tprs(study, target, runner)?;
            Ok::<(), EngineError>(())
        })?;
        reporter.report(Progress::PhaseFinish);
        return Ok(generated);
    }

    reporter.report(Progress::PhaseStart {
        name: "Preparing simulations",
    });
    let gmx = Gromacs::new(runner, &study.config.binaries.gmx);
    reporter.task(targets.iter(), |target| {
        let sim_dir = target.sim_dir(study, sim);
        let structure = match sim {
            SimType::Em => study
                .layout
                .branch_dir(&target.edge.name, target.branch)
                .join("ions.pdb"),
            _ => target.sim_dir(study, SimType::Em).join("confout.gro"),
        };
        gmx.grompp(&GromppRequest {
            mdp: &target.mdp(study, sim),
            structure: &structure,
            topology: &target.topology(study),
            output: &sim_dir.join("tpr.tpr"),
            processed_mdp: Some(&sim_dir.join("mdout.mdp")),
            max_warnings: MAX_WARNINGS,
        })?;
        clean_backup_files(&sim_dir)?;
        Ok::<(), EngineError>(())
    })?;
    info!(count = targets.len(), "Run inputs generated");
    reporter.report(Progress::PhaseFinish);
    Ok(targets.len())
}

/// Runs `sim` with `mdrun` on this machine for every state and replica, one after another.
///
/// # Return
///
/// The number of `mdrun` calls.
#[instrument(skip_all, name = "run_locally_workflow", fields(sim = %sim))]
pub fn run_locally(
    study: &Study,
    edges: &[&Edge],
    branches: &[Branch],
    sim: SimType,
    runner: &dyn CommandRunner,
    reporter: &ProgressReporter,
) -> Result<usize, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Running simulations",
    });
    let gmx = Gromacs::new(runner, &study.config.binaries.gmx);
    let targets = run_targets(study, edges, branches);
    let mut calls = 0;
    reporter.task(targets.iter(), |target| {
        info!(
            edge = %target.edge.name,
            branch = %target.branch,
            state = %target.state,
            run = target.run,
            "Running {}", sim
        );
        let sim_dir = target.sim_dir(study, sim);
        let jobs = match sim {
            SimType::Em => vec![MdrunFiles::minimization(&sim_dir)],
            SimType::Eq => vec![MdrunFiles::free_energy(&sim_dir)],
            SimType::Transitions => (1..=study.config.transitions.count)
                .map(|i| MdrunFiles::transition(&sim_dir, i))
                .collect(),
        };
        for files in &jobs {
            gmx.mdrun(files, &[])?;
            calls += 1;
        }
        clean_backup_files(&sim_dir)?;
        Ok::<(), EngineError>(())
    })?;
    reporter.report(Progress::PhaseFinish);
    Ok(calls)
}
