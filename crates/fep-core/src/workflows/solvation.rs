use super::setup::Study;
use crate::engine::config::{Branch, SimType, State};
use crate::engine::error::EngineError;
use crate::engine::gmx::{
    BoxSpec, CommandRunner, GenionRequest, Gromacs, GromppRequest, clean_backup_files,
};
use crate::engine::inputs::Edge;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument};

const SOLVENT_BOX: &str = "spc216.gro";
const ION_GROUP: &str = "SOL";
const MAX_WARNINGS: u32 = 4;

/// Which of the three solvation steps to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolvationSteps {
    pub boxing: bool,
    pub water: bool,
    pub ions: bool,
}

impl Default for SolvationSteps {
    fn default() -> Self {
        Self {
            boxing: true,
            water: true,
            ions: true,
        }
    }
}

/// Puts each branch system into a box, solvates it and adds ions.
///
/// `init.pdb` becomes `box.pdb`, then `water.pdb`, then `ions.pdb`; `solvate` and
/// `genion` update `topol.top` in place. Ions are placed with the state A minimisation
/// parameters (`em_l0.mdp`).
#[instrument(skip_all, name = "solvation_workflow")]
pub fn box_water_ions(
    study: &Study,
    edges: &[&Edge],
    branches: &[Branch],
    steps: SolvationSteps,
    runner: &dyn CommandRunner,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Box, water, ions",
    });
    let gmx = Gromacs::new(runner, &study.config.binaries.gmx);
    let system = &study.config.system;
    let branches = study.branches(branches);
    let ions_mdp = study.mdp(&format!(
        "{}_{}.mdp",
        SimType::Em.mdp_prefix(),
        State::A.lambda_suffix()
    ));

    reporter.task(edges.iter(), |edge| {
        for &branch in &branches {
            info!(edge = %edge.name, branch = %branch, "Preparing solvated system");
            let dir = study.layout.branch_dir(&edge.name, branch);
            let topology = dir.join("topol.top");
            if steps.boxing {
                gmx.editconf(
                    &dir.join("init.pdb"),
                    &dir.join("box.pdb"),
                    &BoxSpec::Distance {
                        shape: system.box_shape.clone(),
                        distance: system.box_distance,
                    },
                )?;
            }
            if steps.water {
                gmx.solvate(
                    &dir.join("box.pdb"),
                    SOLVENT_BOX,
                    &topology,
                    &dir.join("water.pdb"),
                )?;
            }
            if steps.ions {
                let tpr = dir.join("tpr.tpr");
                gmx.grompp(&GromppRequest {
                    mdp: &ions_mdp,
                    structure: &dir.join("water.pdb"),
                    topology: &topology,
                    output: &tpr,
                    processed_mdp: Some(&dir.join("mdout.mdp")),
                    max_warnings: MAX_WARNINGS,
                })?;
                gmx.genion(&GenionRequest {
                    tpr: &tpr,
                    topology: &topology,
                    output: &dir.join("ions.pdb"),
                    concentration: system.salt_concentration,
                    neutral: true,
                    positive_ion: &system.positive_ion,
                    negative_ion: &system.negative_ion,
                    group: ION_GROUP,
                })?;
            }
            clean_backup_files(&dir)?;
        }
        Ok::<(), EngineError>(())
    })?;
    reporter.report(Progress::PhaseFinish);
    Ok(())
}
