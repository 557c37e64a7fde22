use crate::cli::{TrajArgs, TrajCommands};
use crate::error::{CliError, Result};
use fepflow::core::io::trajectory;
use fepflow::engine::error::EngineError;
use std::path::Path;
use tracing::{debug, info};

pub fn run(args: TrajArgs) -> Result<()> {
    match args.command {
        TrajCommands::Info { input } => show_info(&input),
        TrajCommands::Convert { input, output } => convert(&input, &output),
    }
}

fn read_error(path: &Path, e: trajectory::TrajectoryError) -> CliError {
    CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    }
}

fn show_info(input: &Path) -> Result<()> {
    let summary = trajectory::summarize(input).map_err(|e| read_error(input, e))?;
    println!("File:   {}", input.display());
    println!("Format: {}", summary.format);
    println!("Atoms:  {}", summary.natoms);
    println!("Frames: {}", summary.frames);
    if let (Some(first), Some(last)) = (summary.first_step, summary.last_step) {
        println!("Steps:  {} .. {}", first, last);
    }
    if let (Some(first), Some(last)) = (summary.first_time, summary.last_time) {
        println!("Time:   {} .. {} ps", first, last);
    }
    if let Some(dt) = summary.time_step() {
        println!("dt:     {} ps", dt);
    }
    Ok(())
}

fn convert(input: &Path, output: &Path) -> Result<()> {
    if input == output {
        return Err(CliError::Argument(
            "input and output trajectories must differ".to_string(),
        ));
    }
    info!("Converting {:?} to {:?}", input, output);
    let written = trajectory::convert(input, output, |frame| {
        debug!(step = frame.step, time = frame.time, "Frame copied");
    })
    .map_err(EngineError::from)?;
    println!("Wrote {} frame(s) to {}", written, output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn converting_onto_itself_is_rejected() {
        let path = PathBuf::from("traj.xtc");
        let result = convert(&path, &path);
        assert!(matches!(result, Err(CliError::Argument(_))));
    }

    #[test]
    fn info_on_missing_file_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.trr");
        match show_info(&path) {
            Err(CliError::FileParsing { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn unknown_extension_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.dcd");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(show_info(&path), Err(CliError::FileParsing { .. })));
    }
}
