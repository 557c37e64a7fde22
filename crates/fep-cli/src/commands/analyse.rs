use super::{open_study, reporter, runner};
use crate::cli::{BranchArgs, SummaryArgs};
use crate::error::Result;
use fepflow::workflows::analysis;
use tracing::info;

pub fn analyse(args: BranchArgs) -> Result<()> {
    let study = open_study(&args.study)?;
    let edges = study.select_edges(&args.study.edges)?;
    let count = analysis::run_analysis(
        &study,
        &edges,
        &args.branch.branches(),
        &runner(),
        &reporter(),
    )?;
    println!("Analysed {} set(s) of transitions.", count);
    Ok(())
}

pub fn summary(args: SummaryArgs) -> Result<()> {
    let study = open_study(&args.study)?;
    let edges = study.select_edges(&args.study.edges)?;
    let summary = analysis::analysis_summary(&study, &edges, &reporter())?;

    let out_dir = args
        .output_dir
        .unwrap_or_else(|| study.layout.work_dir().to_path_buf());
    std::fs::create_dir_all(&out_dir)?;
    let (all, ddg) = summary.write_csv(&out_dir)?;
    info!(all = %all.display(), summary = %ddg.display(), "Results written");

    println!("{}", summary.all);
    println!("{}", summary.summary);
    println!("Results written to {} and {}", all.display(), ddg.display());
    Ok(())
}
