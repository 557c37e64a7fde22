use super::{open_study, reporter, runner};
use crate::cli::{BranchArgs, SolvateArgs, StudyArgs};
use crate::error::Result;
use fepflow::workflows::{assemble, ligands, solvation};
use tracing::info;

pub fn map(args: StudyArgs) -> Result<()> {
    let study = open_study(&args)?;
    let edges = study.select_edges(&args.edges)?;
    ligands::atom_mapping(&study, &edges, &runner(), &reporter())?;
    println!("Mapped atoms for {} edge(s).", edges.len());
    Ok(())
}

pub fn hybrid(args: StudyArgs) -> Result<()> {
    let study = open_study(&args)?;
    let edges = study.select_edges(&args.edges)?;
    ligands::hybrid_structure_topology(&study, &edges, &runner(), &reporter())?;
    println!("Built hybrid structures and topologies for {} edge(s).", edges.len());
    Ok(())
}

pub fn assemble_branches(args: BranchArgs) -> Result<()> {
    let study = open_study(&args.study)?;
    let edges = study.select_edges(&args.study.edges)?;
    let branches = args.branch.branches();
    assemble::assemble_systems(&study, &edges, &branches, &reporter())?;
    println!(
        "Assembled {} system(s).",
        edges.len() * study.branches(&branches).len()
    );
    Ok(())
}

pub fn solvate(args: SolvateArgs) -> Result<()> {
    let study = open_study(&args.target.study)?;
    let edges = study.select_edges(&args.target.study.edges)?;
    let branches = args.target.branch.branches();
    let steps = solvation::SolvationSteps {
        boxing: !args.no_box,
        water: !args.no_water,
        ions: !args.no_ions,
    };
    info!(?steps, "Invoking the solvation workflow...");
    solvation::box_water_ions(&study, &edges, &branches, steps, &runner(), &reporter())?;
    println!(
        "Solvated {} system(s).",
        edges.len() * study.branches(&branches).len()
    );
    Ok(())
}
