pub mod analyse;
pub mod cyclize;
pub mod prepare;
pub mod setup;
pub mod simulate;
pub mod traj;

use crate::cli::StudyArgs;
use crate::config::load_study_config;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use fepflow::engine::gmx::SystemRunner;
use fepflow::engine::progress::ProgressReporter;
use fepflow::workflows::setup::Study;
use tracing::{Level, info};

/// Loads the study file and resolves the inputs it points to.
pub(crate) fn open_study(args: &StudyArgs) -> Result<Study> {
    info!("Loading study configuration from {:?}", &args.config);
    let config = load_study_config(args)?;
    let study = Study::open(config)?;
    info!(
        edges = study.edges.len(),
        ligands = study.ligands.len(),
        "Study opened"
    );
    Ok(study)
}

pub(crate) fn reporter() -> ProgressReporter<'static> {
    ProgressReporter::with_callback(CliProgressHandler::new().get_callback())
}

/// Echoes the stdout of external programs only when debug logging is on.
pub(crate) fn runner() -> SystemRunner {
    SystemRunner::new(tracing::enabled!(Level::DEBUG))
}
