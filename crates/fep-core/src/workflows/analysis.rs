//! Non-equilibrium free-energy analysis of the transitions.
//!
//! [`run_analysis`] hands the work values of every replica to `pmx analyse`, which writes
//! `results.txt` into `<edge>/<branch>/analyse<r>`. [`analysis_summary`] reads those files
//! back and combines them:
//!
//! - `edge_branch_r` rows hold each replica as reported by `pmx`.
//! - `edge_branch` rows combine the replicas of one branch (see [`summarize_branch`]).
//! - `edge` rows hold `ddG = dG(protein) - dG(water)` of the thermodynamic cycle.

use super::setup::Study;
use crate::engine::config::{Branch, SimType, State};
use crate::engine::error::EngineError;
use crate::engine::gmx::{AnalyseRequest, CommandRunner, Pmx};
use crate::engine::inputs::Edge;
use crate::engine::layout::create_dir;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::results::{
    Estimate, NeqResult, ResultRow, ResultsTable, edge_ddg, summarize_branch,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub const RESULTS_FILE: &str = "results.txt";
pub const ALL_RESULTS_CSV: &str = "results_all.csv";
pub const SUMMARY_CSV: &str = "results_summary.csv";

/// Sorted `dhdl*.xvg` work files of one transitions directory.
fn work_files(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(EngineError::io(dir))? {
        let path = entry.map_err(EngineError::io(dir))?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "xvg") {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        return Err(EngineError::Layout(format!(
            "no .xvg work files in '{}'; run the transitions first",
            dir.display()
        )));
    }
    Ok(files)
}

/// The lines of a `pmx analyse` report from its `ANALYSIS` banner on.
fn analysis_section(report: &str) -> String {
    report
        .lines()
        .skip_while(|l| !l.contains("ANALYSIS"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs `pmx analyse` on the forward (state A) and reverse (state B) transitions of every
/// replica and selected branch.
///
/// # Return
///
/// The number of analyses run.
#[instrument(skip_all, name = "analysis_workflow")]
pub fn run_analysis(
    study: &Study,
    edges: &[&Edge],
    branches: &[Branch],
    runner: &dyn CommandRunner,
    reporter: &ProgressReporter,
) -> Result<usize, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Running analysis",
    });
    let pmx = Pmx::new(runner, &study.config.binaries.pmx);
    let settings = &study.config.analysis;
    let branches = study.branches(branches);
    let mut analysed = 0;

    reporter.task(edges.iter(), |edge| {
        for run in study.layout.runs() {
            for &branch in &branches {
                let out_dir = study.layout.analysis_dir(&edge.name, branch, run);
                create_dir(&out_dir)?;
                let transitions = |state| {
                    study
                        .layout
                        .sim_dir(&edge.name, branch, state, run, SimType::Transitions)
                };
                let forward = work_files(&transitions(State::A))?;
                let reverse = work_files(&transitions(State::B))?;
                info!(
                    edge = %edge.name,
                    branch = %branch,
                    run,
                    forward = forward.len(),
                    reverse = reverse.len(),
                    "Analysing transitions"
                );

                let output = out_dir.join(RESULTS_FILE);
                pmx.analyse(&AnalyseRequest {
                    forward: &forward,
                    reverse: &reverse,
                    output: &output,
                    integrals_a: &out_dir.join("integ0.dat"),
                    integrals_b: &out_dir.join("integ1.dat"),
                    work_plot: &out_dir.join("wplot.png"),
                    temperature: settings.temperature,
                    bootstraps: settings.bootstraps,
                })?;
                if let Ok(report) = fs::read_to_string(&output) {
                    debug!(edge = %edge.name, branch = %branch, run, "\n{}", analysis_section(&report));
                }
                analysed += 1;
            }
        }
        Ok::<(), EngineError>(())
    })?;
    reporter.report(Progress::PhaseFinish);
    Ok(analysed)
}

/// Per-replica and per-branch rows (`all`) and per-edge ddG rows (`summary`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisSummary {
    pub all: ResultsTable,
    pub summary: ResultsTable,
}

impl AnalysisSummary {
    /// Writes `results_all.csv` and `results_summary.csv` into `dir`.
    pub fn write_csv(&self, dir: &Path) -> Result<(PathBuf, PathBuf), EngineError> {
        let all = dir.join(ALL_RESULTS_CSV);
        let summary = dir.join(SUMMARY_CSV);
        self.all.write_csv(&all)?;
        self.summary.write_csv(&summary)?;
        Ok((all, summary))
    }
}

/// Collects the `results.txt` of every replica of both branches and derives the branch
/// and edge free energies.
///
/// Replica pooling draws from a [`StdRng`] seeded with the configured seed, or from
/// system entropy when none is set.
#[instrument(skip_all, name = "analysis_summary_workflow")]
pub fn analysis_summary(
    study: &Study,
    edges: &[&Edge],
    reporter: &ProgressReporter,
) -> Result<AnalysisSummary, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Summarizing results",
    });
    let settings = &study.config.analysis;
    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut out = AnalysisSummary::default();

    reporter.task(edges.iter(), |edge| {
        let mut replicas: Vec<(Branch, Vec<Estimate>)> =
            Branch::ALL.iter().map(|&b| (b, Vec::new())).collect();
        for run in study.layout.runs() {
            for (branch, estimates) in replicas.iter_mut() {
                let path = study
                    .layout
                    .analysis_dir(&edge.name, *branch, run)
                    .join(RESULTS_FILE);
                let result = NeqResult::read_from_path(&path)?;
                estimates.push(result.estimate);
                out.all.upsert(ResultRow::from_neq(
                    format!("{}_{}_{}", edge.name, branch, run),
                    &result,
                ));
            }
        }

        let mut combined = Vec::with_capacity(replicas.len());
        for (branch, estimates) in &replicas {
            let estimate = summarize_branch(estimates, settings.summary_samples, &mut rng)?;
            out.all.upsert(ResultRow::from_estimate(
                format!("{}_{}", edge.name, branch),
                &estimate,
            ));
            combined.push(estimate);
        }
        if let [water, protein] = combined.as_slice() {
            let ddg = edge_ddg(water, protein);
            info!(edge = %edge.name, ddg = ddg.dg, err = ddg.err_bootstrap, "Edge summarized");
            out.summary
                .upsert(ResultRow::from_estimate(edge.name.clone(), &ddg));
        }
        Ok::<(), EngineError>(())
    })?;
    reporter.report(Progress::PhaseFinish);
    Ok(out)
}
