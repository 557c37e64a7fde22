use super::{reporter, runner};
use crate::cli::CyclizeArgs;
use crate::error::{CliError, Result};
use fepflow::workflows::cyclic::{CyclicOptions, build_cyclic_topology};

pub fn run(args: CyclizeArgs) -> Result<()> {
    if !args.input.is_file() {
        return Err(CliError::Argument(format!(
            "input structure {} does not exist",
            args.input.display()
        )));
    }

    let mut options = CyclicOptions::new(&args.input, &args.work_dir);
    options.input_topology = args.topology;
    if let Some(output) = args.output {
        options.output_structure = output;
    }
    if let Some(output_topology) = args.output_topology {
        options.output_topology = output_topology;
    }
    options.sequence = args.sequence.zip(args.chirality);
    options.forcefield = args.forcefield;
    options.water = args.water;
    options.minimize = args.minimize;
    options.gmx = args.gmx;

    let report = build_cyclic_topology(&options, &runner(), &reporter())?;

    println!(
        "Cyclised {} residue(s): ring bond between atoms {} and {}, {} new pair(s).",
        report.splice.residues,
        report.splice.ring_bond.0,
        report.splice.ring_bond.1,
        report.splice.new_pairs
    );
    println!(
        "Removed {} topology atom(s) and {} structure atom(s) with the dummy termini.",
        report.splice.removed_atoms, report.trimmed_atoms
    );
    println!("Topology written to {}", options.output_topology.display());
    println!("Structure written to {}", options.output_structure.display());
    if let Some(minimized) = report.minimized_structure {
        println!("Minimised structure written to {}", minimized.display());
    }
    Ok(())
}
