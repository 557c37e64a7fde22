use super::setup::Study;
use crate::engine::error::EngineError;
use crate::engine::gmx::{AtomMappingFiles, CommandRunner, HybridFiles, Pmx};
use crate::engine::inputs::Edge;
use crate::engine::layout::create_dir;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument};

/// Maps the atoms of ligand A onto ligand B for every edge with `pmx atomMapping`.
#[instrument(skip_all, name = "atom_mapping_workflow")]
pub fn atom_mapping(
    study: &Study,
    edges: &[&Edge],
    runner: &dyn CommandRunner,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Atom mapping",
    });
    let pmx = Pmx::new(runner, &study.config.binaries.pmx);
    reporter.task(edges.iter(), |edge| {
        info!(edge = %edge.name, "Mapping atoms");
        let (a, b) = study.edge_ligands(edge)?;
        let out_dir = study.layout.hybrid_dir(&edge.name);
        create_dir(&out_dir)?;
        pmx.atom_mapping(&AtomMappingFiles::new(a.structure(), b.structure(), &out_dir))?;
        Ok::<(), EngineError>(())
    })?;
    reporter.report(Progress::PhaseFinish);
    Ok(())
}

/// Builds the hybrid structures and topology of every edge with `pmx ligandHybrid`.
///
/// Needs the `pairs1.dat` written by [`atom_mapping`].
#[instrument(skip_all, name = "hybrid_workflow")]
pub fn hybrid_structure_topology(
    study: &Study,
    edges: &[&Edge],
    runner: &dyn CommandRunner,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Hybrid structure/topology",
    });
    let pmx = Pmx::new(runner, &study.config.binaries.pmx);
    reporter.task(edges.iter(), |edge| {
        info!(edge = %edge.name, "Creating hybrid structure and topology");
        let (a, b) = study.edge_ligands(edge)?;
        let out_dir = study.layout.hybrid_dir(&edge.name);
        let files = HybridFiles::new(
            (a.structure(), a.topology()),
            (b.structure(), b.topology()),
            &out_dir,
        );
        if !files.pairs.is_file() {
            return Err(EngineError::Layout(format!(
                "'{}' is missing; run the atom mapping first",
                files.pairs.display()
            )));
        }
        pmx.ligand_hybrid(&files)?;
        Ok(())
    })?;
    reporter.report(Progress::PhaseFinish);
    Ok(())
}
