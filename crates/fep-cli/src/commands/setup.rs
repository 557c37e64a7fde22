use super::reporter;
use crate::cli::StudyArgs;
use crate::config::load_study_config;
use crate::error::Result;
use fepflow::workflows::setup::prepare_free_energy_dir;
use tracing::info;

pub fn run(args: StudyArgs) -> Result<()> {
    let config = load_study_config(&args)?;
    info!("Invoking the setup workflow...");
    let study = prepare_free_energy_dir(config, &reporter())?;

    print!("{}", study.summary());
    println!("Directory tree:");
    print!("{}", study.layout.describe_tree());
    Ok(())
}
