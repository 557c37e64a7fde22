use super::setup::Study;
use super::simulation::run_targets;
use crate::engine::config::{Branch, SimType};
use crate::engine::error::EngineError;
use crate::engine::inputs::Edge;
use crate::engine::jobscript::{
    Jobscript, simulation_commands, transition_commands, write_submission_script,
};
use crate::engine::layout::create_dir;
use std::path::PathBuf;
use tracing::{info, instrument};

/// The scripts written for one simulation type.
#[derive(Debug, Clone, PartialEq)]
pub struct JobBatch {
    pub dir: PathBuf,
    pub count: usize,
    pub submit_script: PathBuf,
}

/// Writes `jobscript0 .. jobscript<n-1>` for `sim` into `<work>/<sim>_jobscripts`, one
/// per edge, state, replica and branch, plus the `submit.sh` that queues all of them.
#[instrument(skip_all, name = "jobscripts_workflow", fields(sim = %sim))]
pub fn prepare_jobscripts(
    study: &Study,
    edges: &[&Edge],
    branches: &[Branch],
    sim: SimType,
) -> Result<JobBatch, EngineError> {
    let jobs = &study.config.jobs;
    let count = study.config.transitions.count;
    let dir = study.layout.jobscript_dir(sim);
    create_dir(&dir)?;

    let targets = run_targets(study, edges, branches);
    for (counter, target) in targets.iter().enumerate() {
        let name = format!(
            "{}_{}_{}_{}_{}",
            target.branch.job_prefix(),
            target.edge.name,
            target.state,
            target.run,
            sim
        );
        let sim_dir = target.sim_dir(study, sim);
        let commands = match sim {
            SimType::Transitions => transition_commands(jobs.queue, &sim_dir, count),
            _ => simulation_commands(&sim_dir),
        };
        Jobscript::new(&name, jobs)
            .with_commands(commands)
            .write_to_path(&dir.join(format!("jobscript{}", counter)))?;
    }

    let array_tasks = (sim == SimType::Transitions).then_some(count);
    let submit_script = write_submission_script(&dir, jobs.queue, targets.len(), array_tasks)?;
    info!(
        dir = %dir.display(),
        count = targets.len(),
        queue = %jobs.queue,
        "Jobscripts written"
    );
    Ok(JobBatch {
        dir,
        count: targets.len(),
        submit_script,
    })
}
