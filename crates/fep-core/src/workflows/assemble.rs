use super::setup::Study;
use crate::core::forcefield::atomtypes::merge_atomtype_files;
use crate::core::io::pdb::make_clean_pdb;
use crate::core::io::system_top::SystemTopology;
use crate::engine::config::Branch;
use crate::engine::error::EngineError;
use crate::engine::inputs::Edge;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{debug, info, instrument};

const LIGAND_MOLECULE: &str = "MOL";

/// Writes `init.pdb` and `topol.top` of each selected branch of every edge.
///
/// The water branch holds the hybrid ligand alone; the protein branch holds the protein
/// followed by the hybrid ligand. The atom types of both ligands and of the hybrid are
/// merged into `hybridStrTop/ffmerged.itp` first.
#[instrument(skip_all, name = "assemble_workflow")]
pub fn assemble_systems(
    study: &Study,
    edges: &[&Edge],
    branches: &[Branch],
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Assembling systems",
    });
    let branches = study.branches(branches);
    let system = &study.config.system;

    reporter.task(edges.iter(), |edge| {
        info!(edge = %edge.name, "Assembling systems");
        let (lig_a, lig_b) = study.edge_ligands(edge)?;
        let hybrid_dir = study.layout.hybrid_dir(&edge.name);
        let merged_pdb = hybrid_dir.join("mergedA.pdb");
        let ff_itp = hybrid_dir.join("ffmerged.itp");
        let ligand_itp = hybrid_dir.join("merged.itp");

        let mut inputs = vec![lig_a.atomtypes(), lig_b.atomtypes()];
        if ff_itp.is_file() {
            inputs.push(ff_itp.clone());
        }
        let types = merge_atomtype_files(&ff_itp, &inputs)?;
        debug!(edge = %edge.name, types, "Merged atom types");

        for &branch in &branches {
            let out_dir = study.layout.branch_dir(&edge.name, branch);
            let init = out_dir.join("init.pdb");
            let mut top = SystemTopology::new(
                &system.forcefield,
                &system.water_model,
                branch.system_name(),
            )
            .include(&ff_itp)
            .include(&ligand_itp);

            match branch {
                Branch::Water => {
                    make_clean_pdb(&merged_pdb, &init, false)?;
                }
                Branch::Protein => {
                    make_clean_pdb(&study.protein.structure, &init, false)?;
                    make_clean_pdb(&merged_pdb, &init, true)?;
                    for itp in &study.protein.topologies {
                        top = top.include(itp);
                    }
                    for molecule in &study.protein.molecules {
                        top = top.molecule(molecule, 1);
                    }
                }
            }
            let top = top.molecule(LIGAND_MOLECULE, 1);
            let top_path = out_dir.join("topol.top");
            top.write_to_path(&top_path)
                .map_err(EngineError::io(&top_path))?;
        }
        Ok::<(), EngineError>(())
    })?;
    reporter.report(Progress::PhaseFinish);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::atomtypes::AtomTypeFile;
    use crate::core::io::traits::ModelFile;
    use crate::workflows::setup::fixtures;
    use std::fs;

    #[test]
    fn both_branches_get_structure_and_topology() {
        let dir = tempfile::tempdir().unwrap();
        let study = fixtures::study(dir.path());
        let hybrid = study.layout.hybrid_dir("edge_a_b");
        fs::write(hybrid.join("mergedA.pdb"), fixtures::LIGAND_PDB).unwrap();
        fs::write(hybrid.join("ffmerged.itp"), fixtures::atomtypes("dummy")).unwrap();
        let edges = study.select_edges(&["a_b".to_string()]).unwrap();

        assemble_systems(&study, &edges, &Branch::ALL, &ProgressReporter::new()).unwrap();

        let water = study.layout.branch_dir("edge_a_b", Branch::Water);
        let protein = study.layout.branch_dir("edge_a_b", Branch::Protein);
        let water_pdb = fs::read_to_string(water.join("init.pdb")).unwrap();
        assert_eq!(water_pdb.lines().count(), 2);
        let protein_pdb = fs::read_to_string(protein.join("init.pdb")).unwrap();
        assert_eq!(protein_pdb.lines().count(), 4);
        assert!(protein_pdb.lines().next().unwrap().starts_with("ATOM"));
        assert!(protein_pdb.lines().last().unwrap().starts_with("HETATM"));

        let top = fs::read_to_string(protein.join("topol.top")).unwrap();
        assert!(top.contains("protein and ligand in water"));
        assert!(top.contains("topol_Protein.itp\""));
        assert!(top.ends_with("[ molecules ]\nProtein 1\nMOL 1\n"));
        let water_top = fs::read_to_string(water.join("topol.top")).unwrap();
        assert!(water_top.ends_with("[ molecules ]\nMOL 1\n"));

        let types = AtomTypeFile::read_from_path(hybrid.join("ffmerged.itp")).unwrap();
        for name in ["c", "ha", "hb", "dummy"] {
            assert!(types.get(name).is_some(), "missing type {name}");
        }
    }

    #[test]
    fn protein_only_assembly_leaves_water_branch_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let study = fixtures::study(dir.path());
        let hybrid = study.layout.hybrid_dir("edge_b_c");
        fs::write(hybrid.join("mergedA.pdb"), fixtures::LIGAND_PDB).unwrap();
        let edges = study.select_edges(&["b_c".to_string()]).unwrap();

        assemble_systems(&study, &edges, &[Branch::Protein], &ProgressReporter::new()).unwrap();
        let water = study.layout.branch_dir("edge_b_c", Branch::Water);
        assert!(!water.join("init.pdb").exists());
        assert!(hybrid.join("ffmerged.itp").is_file());
    }

    #[test]
    fn missing_hybrid_structure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let study = fixtures::study(dir.path());
        let edges = study.select_edges(&[]).unwrap();
        let err = assemble_systems(&study, &edges, &Branch::ALL, &ProgressReporter::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Pdb { .. }));
    }
}
