//! Builds the topology and structure of a head-to-tail cyclic peptide.
//!
//! The input is a structure of the linear peptide extended by one dummy residue on each
//! end (see [`extend_sequence`]). The workflow proceeds in four steps:
//!
//! 1. **Parameterisation.** `pdb2gmx` builds the linear topology, unless one is given.
//! 2. **Splicing.** The dummy termini are cut from the topology and the ring is closed
//!    ([`splice_cyclic`]).
//! 3. **Trimming.** The same residues are removed from the structure.
//! 4. **Minimisation (optional).** The cyclic peptide is relaxed in vacuum in a 3 nm cubic
//!    box inside `<work>/em`.

use crate::core::io::pdb::PdbFile;
use crate::core::io::topology::TopologyFile;
use crate::core::io::traits::ModelFile;
use crate::core::topology::cyclic::{
    SpliceSummary, extend_sequence, splice_cyclic, trim_dummy_residues,
};
use crate::engine::error::EngineError;
use crate::engine::gmx::{
    BoxSpec, CommandRunner, Gromacs, GromppRequest, MdrunFiles, clean_backup_files,
};
use crate::engine::layout::{create_dir, remove_file_if_present};
use crate::engine::progress::{Progress, ProgressReporter};
use std::fs;
use std::path::PathBuf;
use tracing::{info, instrument};

const MINIMIZATION_MDP: &str = "\
define                  =
integrator              = steep
emtol                   = 1000.0
nsteps                  = 10000
nstlist                 = 10
cutoff-scheme           = Verlet
rlist                   = 1.2
vdwtype                 = Cut-off
rvdw                    = 1.2
coulombtype             = cutoff
rcoulomb                = 1.2
constraints             = none
";

const MINIMIZATION_BOX_NM: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CyclicOptions {
    /// Structure of the linear peptide including both dummy termini.
    pub input_structure: PathBuf,
    /// Topology of the linear peptide; built with `pdb2gmx` when absent.
    pub input_topology: Option<PathBuf>,
    pub output_structure: PathBuf,
    pub output_topology: PathBuf,
    pub work_dir: PathBuf,
    pub forcefield: String,
    pub water: String,
    pub minimize: bool,
    pub gmx: String,
    /// One-letter sequence and chirality of the cyclic peptide, checked against the
    /// residue count of the topology.
    pub sequence: Option<(String, String)>,
}

impl CyclicOptions {
    pub fn new(input_structure: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            input_structure: input_structure.into(),
            input_topology: None,
            output_structure: work_dir.join("out.pdb"),
            output_topology: work_dir.join("topol.top"),
            work_dir,
            forcefield: "amber99sb-star-ildn".to_string(),
            water: "tip3p".to_string(),
            minimize: false,
            gmx: "gmx".to_string(),
            sequence: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CyclicReport {
    pub splice: SpliceSummary,
    /// Atoms removed from the structure with the dummy termini.
    pub trimmed_atoms: usize,
    pub minimized_structure: Option<PathBuf>,
}

#[instrument(skip_all, name = "cyclic_topology_workflow")]
pub fn build_cyclic_topology(
    options: &CyclicOptions,
    runner: &dyn CommandRunner,
    reporter: &ProgressReporter,
) -> Result<CyclicReport, EngineError> {
    let gmx = Gromacs::new(runner, &options.gmx);
    create_dir(&options.work_dir)?;

    reporter.report(Progress::PhaseStart {
        name: "Linear topology",
    });
    let (linear_structure, linear_topology) = match &options.input_topology {
        Some(topology) => (options.input_structure.clone(), topology.clone()),
        None => parameterize(options, &gmx)?,
    };
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart {
        name: "Closing the ring",
    });
    let mut topology = TopologyFile::read_from_path(&linear_topology)?;
    if let Some((sequence, chirality)) = &options.sequence {
        let (extended, _) = extend_sequence(sequence, chirality)?;
        let found = topology.residues().len();
        if extended.len() != found {
            return Err(EngineError::Input(format!(
                "sequence '{}' with dummy termini has {} residues but '{}' has {}",
                sequence,
                extended.len(),
                linear_topology.display(),
                found
            )));
        }
    }
    let splice = splice_cyclic(&mut topology)?;
    info!(
        removed = splice.removed_atoms,
        residues = splice.residues,
        pairs = splice.new_pairs,
        "Spliced cyclic topology"
    );

    let mut structure = PdbFile::read_from_path(&linear_structure)?;
    let trimmed_atoms = trim_dummy_residues(&mut structure)?;
    if structure.natoms() != topology.natoms() {
        return Err(EngineError::Input(format!(
            "cyclic structure '{}' has {} atoms but the spliced topology has {}",
            linear_structure.display(),
            structure.natoms(),
            topology.natoms()
        )));
    }
    TopologyFile::write_to_path(&topology, &options.output_topology)?;
    PdbFile::write_to_path(&structure, &options.output_structure)?;
    reporter.report(Progress::PhaseFinish);

    let minimized_structure = if options.minimize {
        reporter.report(Progress::PhaseStart {
            name: "Minimization",
        });
        let minimized = minimize(options, &gmx)?;
        reporter.report(Progress::PhaseFinish);
        Some(minimized)
    } else {
        None
    };

    Ok(CyclicReport {
        splice,
        trimmed_atoms,
        minimized_structure,
    })
}

/// Runs `pdb2gmx` on the linear peptide inside the work directory.
fn parameterize(
    options: &CyclicOptions,
    gmx: &Gromacs<'_>,
) -> Result<(PathBuf, PathBuf), EngineError> {
    let structure = options.work_dir.join("linear.pdb");
    let topology = options.work_dir.join("linear.top");
    let restraints = options.work_dir.join("posre.itp");
    gmx.pdb2gmx(
        &options.input_structure,
        &structure,
        &topology,
        &restraints,
        &options.forcefield,
        &options.water,
    )?;
    remove_file_if_present(&restraints)?;
    clean_backup_files(&options.work_dir)?;
    Ok((structure, topology))
}

fn minimize(options: &CyclicOptions, gmx: &Gromacs<'_>) -> Result<PathBuf, EngineError> {
    let dir = options.work_dir.join("em");
    create_dir(&dir)?;
    let boxed = dir.join("box.pdb");
    gmx.editconf(
        &options.output_structure,
        &boxed,
        &BoxSpec::Size {
            shape: "cubic".to_string(),
            lengths: [MINIMIZATION_BOX_NM; 3],
        },
    )?;

    let mdp = dir.join("em.mdp");
    fs::write(&mdp, MINIMIZATION_MDP).map_err(EngineError::io(&mdp))?;
    let processed = dir.join("mdout.mdp");
    let files = MdrunFiles {
        tpr: dir.join("em.tpr"),
        confout: dir.join("minimized.pdb"),
        ..MdrunFiles::minimization(&dir)
    };
    gmx.grompp(&GromppRequest {
        mdp: &mdp,
        structure: &boxed,
        topology: &options.output_topology,
        output: &files.tpr,
        processed_mdp: Some(&processed),
        max_warnings: 0,
    })?;
    gmx.mdrun(&files, &["-ntomp", "1", "-ntmpi", "1"])?;

    for scratch in [&processed, &files.log, &files.trajectory, &files.energy] {
        remove_file_if_present(scratch)?;
    }
    clean_backup_files(&dir)?;
    info!(path = %files.confout.display(), "Minimized cyclic peptide");
    Ok(files.confout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::topology::cyclic::CyclicError;
    use crate::engine::gmx::testing::{RecordingRunner, flag};
    use std::fmt::Write as _;
    use std::path::Path;

    /// A backbone-only peptide of `n` glycines as (structure, topology) text.
    fn linear_peptide(n: usize) -> (String, String) {
        let mut pdb = String::new();
        let mut top = String::from("[ moleculetype ]\nPeptide 3\n\n[ atoms ]\n");
        let mut bonds = String::from("\n[ bonds ]\n");
        let mut id = 0;
        for res in 1..=n {
            for name in ["N", "CA", "C"] {
                id += 1;
                let x = id as f64 * 1.2;
                writeln!(
                    pdb,
                    "ATOM  {:>5} {:<4} GLY A{:>4}    {:>8.3}{:>8.3}{:>8.3}  1.00  0.00           {}",
                    id,
                    name,
                    res,
                    x,
                    0.0,
                    0.0,
                    &name[..1]
                ).unwrap();
                writeln!(top, "{} CT {} GLY {} {} 0.0 12.01", id, res, name, id).unwrap();
            }
            writeln!(bonds, "{} {} 1", id - 2, id - 1).unwrap();
            writeln!(bonds, "{} {} 1", id - 1, id).unwrap();
            if res > 1 {
                writeln!(bonds, "{} {} 1", id - 3, id - 2).unwrap();
            }
        }
        pdb.push_str("END\n");
        top.push_str(&bonds);
        (pdb, top)
    }

    fn write_inputs(dir: &Path, n: usize) -> (PathBuf, PathBuf) {
        let (pdb, top) = linear_peptide(n);
        let structure = dir.join("extended.pdb");
        let topology = dir.join("extended.top");
        fs::write(&structure, pdb).unwrap();
        fs::write(&topology, top).unwrap();
        (structure, topology)
    }

    #[test]
    fn given_topology_is_spliced_without_external_tools() {
        let dir = tempfile::tempdir().unwrap();
        let (structure, topology) = write_inputs(dir.path(), 5);
        let mut options = CyclicOptions::new(structure, dir.path().join("work"));
        options.input_topology = Some(topology);
        let runner = RecordingRunner::new();

        let report =
            build_cyclic_topology(&options, &runner, &ProgressReporter::new()).unwrap();

        assert!(runner.calls().is_empty());
        assert_eq!(report.splice.residues, 3);
        assert_eq!(report.splice.ring_bond, (1, 9));
        assert_eq!(report.trimmed_atoms, 6);
        assert!(report.minimized_structure.is_none());

        let cyclic = TopologyFile::read_from_path(&options.output_topology).unwrap();
        assert_eq!(cyclic.natoms(), 9);
        let trimmed = PdbFile::read_from_path(&options.output_structure).unwrap();
        assert_eq!(trimmed.natoms(), 9);
        assert_eq!(trimmed.first_residue().unwrap().res_seq, 1);
    }

    #[test]
    fn pdb2gmx_and_minimization_run_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (structure, _) = write_inputs(dir.path(), 4);
        let (pdb, top) = linear_peptide(4);
        let runner = RecordingRunner::with_hook(move |inv| {
            if inv.args[0] == "pdb2gmx" {
                fs::write(flag(inv, "-o").unwrap(), &pdb).unwrap();
                fs::write(flag(inv, "-p").unwrap(), &top).unwrap();
                fs::write(flag(inv, "-i").unwrap(), "").unwrap();
            }
            Ok(())
        });
        let work = dir.path().join("work");
        let mut options = CyclicOptions::new(structure, &work);
        options.minimize = true;
        options.sequence = Some(("GG".to_string(), "LL".to_string()));

        let report =
            build_cyclic_topology(&options, &runner, &ProgressReporter::new()).unwrap();

        let tools: Vec<String> = runner.calls().iter().map(|c| c.args[0].clone()).collect();
        assert_eq!(tools, vec!["pdb2gmx", "editconf", "grompp", "mdrun"]);
        let pdb2gmx = &runner.calls_to("pdb2gmx")[0];
        assert_eq!(flag(pdb2gmx, "-ff"), Some("amber99sb-star-ildn"));
        assert_eq!(flag(pdb2gmx, "-water"), Some("tip3p"));
        assert!(!work.join("posre.itp").exists());

        let editconf = &runner.calls_to("editconf")[0];
        assert!(editconf.command_line().ends_with("-bt cubic -box 3 3 3"));
        let mdrun = &runner.calls_to("mdrun")[0];
        assert!(flag(mdrun, "-s").unwrap().ends_with("em/em.tpr"));
        assert_eq!(flag(mdrun, "-ntomp"), Some("1"));
        assert_eq!(
            report.minimized_structure,
            Some(work.join("em").join("minimized.pdb"))
        );
        let mdp = fs::read_to_string(work.join("em/em.mdp")).unwrap();
        assert!(mdp.contains("integrator              = steep"));
        assert!(mdp.contains("constraints             = none"));
    }

    #[test]
    fn sequence_must_match_the_topology() {
        let dir = tempfile::tempdir().unwrap();
        let (structure, topology) = write_inputs(dir.path(), 5);
        let mut options = CyclicOptions::new(structure, dir.path().join("work"));
        options.input_topology = Some(topology);
        options.sequence = Some(("GG".to_string(), "LL".to_string()));
        let err = build_cyclic_topology(&options, &RecordingRunner::new(), &ProgressReporter::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Input(_)));
        assert!(!options.output_topology.exists());
    }

    #[test]
    fn structure_and_topology_must_agree_on_atom_count() {
        let dir = tempfile::tempdir().unwrap();
        let (structure, _) = write_inputs(dir.path(), 5);
        let (_, longer_topology) = linear_peptide(6);
        let topology = dir.path().join("longer.top");
        fs::write(&topology, longer_topology).unwrap();
        let mut options = CyclicOptions::new(structure, dir.path().join("work"));
        options.input_topology = Some(topology);

        let err = build_cyclic_topology(&options, &RecordingRunner::new(), &ProgressReporter::new())
            .unwrap_err();

        match err {
            EngineError::Input(msg) => assert!(msg.contains("9 atoms") && msg.contains("has 12")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!options.output_topology.exists());
        assert!(!options.output_structure.exists());
    }

    #[test]
    fn two_residue_input_cannot_be_cyclised() {
        let dir = tempfile::tempdir().unwrap();
        let (structure, topology) = write_inputs(dir.path(), 2);
        let mut options = CyclicOptions::new(structure, dir.path().join("work"));
        options.input_topology = Some(topology);
        let err = build_cyclic_topology(&options, &RecordingRunner::new(), &ProgressReporter::new())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Cyclic {
                source: CyclicError::TooFewResidues { found: 2, .. }
            }
        ));
    }
}
