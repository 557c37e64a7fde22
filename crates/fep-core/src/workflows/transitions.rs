use super::setup::Study;
use super::simulation::{MAX_WARNINGS, RunTarget, run_targets};
use crate::engine::config::{Branch, SimType};
use crate::engine::error::EngineError;
use crate::engine::gmx::{CommandRunner, Gromacs, GromppRequest, TrjconvRequest, clean_backup_files};
use crate::engine::inputs::Edge;
use crate::engine::layout::remove_file_if_present;
use crate::engine::progress::{Progress, ProgressReporter};
use rayon::prelude::*;
use std::fs;
use std::io;
use tracing::{debug, info, instrument};

const SNAPSHOT_GROUP: &str = "System";

/// Splits the equilibrium trajectory of `target` into `frame<i>.gro` snapshots.
///
/// `trjconv -sep` numbers frames from zero; `frame0.gro` is renamed to `frame<count>.gro`
/// so the snapshots used are `frame1.gro` to `frame<count>.gro`.
pub(crate) fn extract_snapshots(
    study: &Study,
    target: &RunTarget<'_>,
    gmx: &Gromacs<'_>,
) -> Result<(), EngineError> {
    let eq_dir = target.sim_dir(study, SimType::Eq);
    let ti_dir = target.sim_dir(study, SimType::Transitions);
    let count = study.config.transitions.count;

    gmx.trjconv(&TrjconvRequest {
        tpr: &eq_dir.join("tpr.tpr"),
        trajectory: &eq_dir.join("traj.trr"),
        output: &ti_dir.join("frame.gro"),
        separate: true,
        unit_cell: Some("compact"),
        pbc: Some("mol"),
        begin_ps: Some(study.config.transitions.snapshot_start_ps),
        group: SNAPSHOT_GROUP,
    })?;

    let first = ti_dir.join("frame0.gro");
    let last = ti_dir.join(format!("frame{}.gro", count));
    fs::rename(&first, &last).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            EngineError::Layout(format!(
                "no snapshots were extracted into '{}'",
                ti_dir.display()
            ))
        } else {
            EngineError::Io {
                path: first.clone(),
                source,
            }
        }
    })?;
    clean_backup_files(&ti_dir)?;
    Ok(())
}

/// Builds `ti1.tpr` .. `ti<count>.tpr` from the snapshots of `target` in parallel.
///
/// # Return
///
/// The number of run inputs generated.
pub(crate) fn generate_transition_tprs(
    study: &Study,
    target: &RunTarget<'_>,
    runner: &dyn CommandRunner,
) -> Result<usize, EngineError> {
    let gmx = Gromacs::new(runner, &study.config.binaries.gmx);
    let ti_dir = target.sim_dir(study, SimType::Transitions);
    let mdp = target.mdp(study, SimType::Transitions);
    let topology = target.topology(study);
    let count = study.config.transitions.count;

    (1..=count).into_par_iter().try_for_each(|i| {
        let mdout = ti_dir.join(format!("mdout{}.mdp", i));
        gmx.grompp(&GromppRequest {
            mdp: &mdp,
            structure: &ti_dir.join(format!("frame{}.gro", i)),
            topology: &topology,
            output: &ti_dir.join(format!("ti{}.tpr", i)),
            processed_mdp: Some(&mdout),
            max_warnings: MAX_WARNINGS,
        })?;
        remove_file_if_present(&mdout)
    })?;
    clean_backup_files(&ti_dir)?;
    debug!(dir = %ti_dir.display(), count, "Transition inputs generated");
    Ok(count)
}

/// Extracts equilibrium snapshots for every state and replica and, with `generate_tprs`,
/// builds the transition run inputs from them.
#[instrument(skip_all, name = "transitions_workflow")]
pub fn prepare_transitions(
    study: &Study,
    edges: &[&Edge],
    branches: &[Branch],
    generate_tprs: bool,
    runner: &dyn CommandRunner,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Preparing transitions",
    });
    let gmx = Gromacs::new(runner, &study.config.binaries.gmx);
    let targets = run_targets(study, edges, branches);
    reporter.task(targets.iter(), |target| {
        info!(
            edge = %target.edge.name,
            branch = %target.branch,
            state = %target.state,
            run = target.run,
            "Extracting snapshots"
        );
        extract_snapshots(study, target, &gmx)?;
        if generate_tprs {
            generate_transition_tprs(study, target, runner)?;
        }
        Ok::<(), EngineError>(())
    })?;
    reporter.report(Progress::PhaseFinish);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::TransitionConfig;
    use crate::engine::gmx::testing::{RecordingRunner, flag};
    use crate::workflows::setup::{fixtures, prepare_free_energy_dir};
    use std::path::{Path, PathBuf};

    fn small_study(root: &Path) -> Study {
        let config = fixtures::study_config(root)
            .replicas(1)
            .transitions(TransitionConfig {
                count: 5,
                snapshot_start_ps: 2250.0,
            })
            .build()
            .unwrap();
        prepare_free_energy_dir(config, &ProgressReporter::new()).unwrap()
    }

    /// Fakes `trjconv -sep` by writing `frame0.gro` .. `frame<n-1>.gro`.
    fn trjconv_writing_frames(n: usize) -> RecordingRunner {
        RecordingRunner::with_hook(move |inv| {
            if inv.args[0] == "trjconv" {
                let out = PathBuf::from(flag(inv, "-o").unwrap());
                let dir = out.parent().unwrap();
                for i in 0..n {
                    fs::write(dir.join(format!("frame{}.gro", i)), "").unwrap();
                }
            }
            if inv.args[0] == "grompp" {
                fs::write(flag(inv, "-po").unwrap(), "").unwrap();
            }
            Ok(())
        })
    }

    #[test]
    fn snapshots_are_renumbered_and_inputs_generated() {
        let dir = tempfile::tempdir().unwrap();
        let study = small_study(dir.path());
        let edges = study.select_edges(&["a_b".to_string()]).unwrap();
        let runner = trjconv_writing_frames(5);

        prepare_transitions(
            &study,
            &edges,
            &[Branch::Water],
            true,
            &runner,
            &ProgressReporter::new(),
        )
        .unwrap();

        let ti = study.layout.sim_dir(
            "edge_a_b",
            Branch::Water,
            crate::engine::config::State::B,
            1,
            SimType::Transitions,
        );
        assert!(!ti.join("frame0.gro").exists());
        for i in 1..=5 {
            assert!(ti.join(format!("frame{}.gro", i)).exists());
            assert!(!ti.join(format!("mdout{}.mdp", i)).exists());
        }

        let trjconv = runner.calls_to("trjconv");
        assert_eq!(trjconv.len(), 2);
        assert_eq!(flag(&trjconv[0], "-b"), Some("2250"));
        assert_eq!(flag(&trjconv[0], "-pbc"), Some("mol"));
        assert_eq!(trjconv[0].stdin.as_deref(), Some("System\n"));

        let mut outputs: Vec<String> = runner
            .calls_to("grompp")
            .iter()
            .filter(|c| flag(c, "-o").unwrap().contains("stateA"))
            .map(|c| flag(c, "-o").unwrap().rsplit('/').next().unwrap().to_string())
            .collect();
        outputs.sort();
        assert_eq!(outputs, vec!["ti1.tpr", "ti2.tpr", "ti3.tpr", "ti4.tpr", "ti5.tpr"]);
    }

    #[test]
    fn missing_snapshots_are_a_layout_error() {
        let dir = tempfile::tempdir().unwrap();
        let study = small_study(dir.path());
        let edges = study.select_edges(&["a_b".to_string()]).unwrap();
        let runner = RecordingRunner::new();
        let err = prepare_transitions(
            &study,
            &edges,
            &[Branch::Water],
            true,
            &runner,
            &ProgressReporter::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Layout(_)));
        assert!(runner.calls_to("grompp").is_empty());
    }

    #[test]
    fn extraction_only_skips_grompp() {
        let dir = tempfile::tempdir().unwrap();
        let study = small_study(dir.path());
        let edges = study.select_edges(&[]).unwrap();
        let runner = trjconv_writing_frames(5);
        prepare_transitions(
            &study,
            &edges,
            &Branch::ALL,
            false,
            &runner,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(runner.calls_to("trjconv").len(), 2 * 2 * 2);
        assert!(runner.calls_to("grompp").is_empty());
    }
}
