use super::{open_study, reporter, runner};
use crate::cli::{SimArgs, TransitionArgs};
use crate::error::Result;
use fepflow::engine::config::SimType;
use fepflow::workflows::{jobs, simulation, transitions};

pub fn prepare(args: SimArgs) -> Result<()> {
    let study = open_study(&args.target.study)?;
    let edges = study.select_edges(&args.target.study.edges)?;
    let sim = SimType::from(args.sim);
    let count = simulation::prepare_simulation(
        &study,
        &edges,
        &args.target.branch.branches(),
        sim,
        &runner(),
        &reporter(),
    )?;
    println!("Generated {} run input(s) for {}.", count, sim);
    Ok(())
}

pub fn run(args: SimArgs) -> Result<()> {
    let study = open_study(&args.target.study)?;
    let edges = study.select_edges(&args.target.study.edges)?;
    let sim = SimType::from(args.sim);
    let count = simulation::run_locally(
        &study,
        &edges,
        &args.target.branch.branches(),
        sim,
        &runner(),
        &reporter(),
    )?;
    println!("Finished {} {} simulation(s).", count, sim);
    Ok(())
}

pub fn prepare_transitions(args: TransitionArgs) -> Result<()> {
    let study = open_study(&args.target.study)?;
    let edges = study.select_edges(&args.target.study.edges)?;
    transitions::prepare_transitions(
        &study,
        &edges,
        &args.target.branch.branches(),
        !args.no_tpr,
        &runner(),
        &reporter(),
    )?;
    if args.no_tpr {
        println!("Extracted equilibrium snapshots.");
    } else {
        println!(
            "Extracted snapshots and generated {} transition input(s) per run.",
            study.config.transitions.count
        );
    }
    Ok(())
}

pub fn write_jobs(args: SimArgs) -> Result<()> {
    let study = open_study(&args.target.study)?;
    let edges = study.select_edges(&args.target.study.edges)?;
    let sim = SimType::from(args.sim);
    let batch = jobs::prepare_jobscripts(&study, &edges, &args.target.branch.branches(), sim)?;
    println!(
        "Wrote {} {} job script(s) to {}.",
        batch.count,
        study.config.jobs.queue,
        batch.dir.display()
    );
    println!("Submit them with: bash {}", batch.submit_script.display());
    Ok(())
}
