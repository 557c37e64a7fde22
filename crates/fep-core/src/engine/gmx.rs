use super::error::EngineError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, trace};

const STDERR_TAIL_LINES: usize = 20;

/// A fully specified external program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Text written to the program's standard input (group selections).
    pub stdin: Option<String>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            stdin: None,
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn flag_value(self, flag: &str, value: impl ToString) -> Self {
        self.arg(flag).arg(value.to_string())
    }

    pub fn flag_path(self, flag: &str, path: &Path) -> Self {
        self.arg(flag).arg(path.display().to_string())
    }

    pub fn stdin(mut self, text: &str) -> Self {
        self.stdin = Some(text.to_string());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes [`Invocation`]s. Workflows only talk to external programs through this trait.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, EngineError>;
}

/// Spawns real processes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    verbose: bool,
}

impl SystemRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, EngineError> {
        let command_line = invocation.command_line();
        debug!(command = %command_line, "Running external command");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        let spawn_err = |source| EngineError::Spawn {
            program: invocation.program.clone(),
            source,
        };
        let mut child = command.spawn().map_err(spawn_err)?;
        if let (Some(text), Some(mut stdin)) = (&invocation.stdin, child.stdin.take()) {
            stdin.write_all(text.as_bytes()).map_err(spawn_err)?;
        }
        let output = child.wait_with_output().map_err(spawn_err)?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if self.verbose {
            for line in stdout.lines() {
                info!(target: "fepflow::external", "{}", line);
            }
        } else {
            trace!(target: "fepflow::external", bytes = stdout.len(), "stdout suppressed");
        }
        for line in stderr.lines() {
            info!(target: "fepflow::external", "{}", line);
        }

        if !output.status.success() {
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(EngineError::Command {
                command: command_line,
                status: output.status.to_string(),
                stderr: tail,
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }
}

/// How `editconf` sizes the box.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxSpec {
    /// Box shape plus minimum solute-to-edge distance (nm).
    Distance { shape: String, distance: f64 },
    /// Box shape plus explicit edge lengths (nm).
    Size { shape: String, lengths: [f64; 3] },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GromppRequest<'p> {
    pub mdp: &'p Path,
    pub structure: &'p Path,
    pub topology: &'p Path,
    pub output: &'p Path,
    pub processed_mdp: Option<&'p Path>,
    pub max_warnings: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenionRequest<'p> {
    pub tpr: &'p Path,
    pub topology: &'p Path,
    pub output: &'p Path,
    pub concentration: f64,
    pub neutral: bool,
    pub positive_ion: &'p str,
    pub negative_ion: &'p str,
    /// Group replaced by ions, answered on stdin.
    pub group: &'p str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrjconvRequest<'p> {
    pub tpr: &'p Path,
    pub trajectory: &'p Path,
    pub output: &'p Path,
    pub separate: bool,
    pub unit_cell: Option<&'p str>,
    pub pbc: Option<&'p str>,
    pub begin_ps: Option<f64>,
    /// Output group, answered on stdin.
    pub group: &'p str,
}

/// Input and output files of one `mdrun` call.
#[derive(Debug, Clone, PartialEq)]
pub struct MdrunFiles {
    pub tpr: PathBuf,
    pub energy: PathBuf,
    pub confout: PathBuf,
    pub trajectory: PathBuf,
    pub log: PathBuf,
    pub dhdl: Option<PathBuf>,
    pub xtc: Option<PathBuf>,
    pub checkpoint: Option<PathBuf>,
}

impl MdrunFiles {
    pub fn minimization(dir: &Path) -> Self {
        Self {
            tpr: dir.join("tpr.tpr"),
            energy: dir.join("ener.edr"),
            confout: dir.join("confout.gro"),
            trajectory: dir.join("traj.trr"),
            log: dir.join("md.log"),
            dhdl: None,
            xtc: None,
            checkpoint: None,
        }
    }

    pub fn free_energy(dir: &Path) -> Self {
        Self {
            dhdl: Some(dir.join("dhdl.xvg")),
            xtc: Some(dir.join("traj.xtc")),
            checkpoint: Some(dir.join("state.cpt")),
            ..Self::minimization(dir)
        }
    }

    /// Files of transition `index`, which reads `ti<index>.tpr` and writes `dhdl<index>.xvg`.
    pub fn transition(dir: &Path, index: usize) -> Self {
        Self {
            tpr: dir.join(format!("ti{}.tpr", index)),
            energy: dir.join(format!("ener{}.edr", index)),
            confout: dir.join(format!("confout{}.gro", index)),
            trajectory: dir.join(format!("traj{}.trr", index)),
            log: dir.join(format!("md{}.log", index)),
            dhdl: Some(dir.join(format!("dhdl{}.xvg", index))),
            xtc: None,
            checkpoint: None,
        }
    }
}

/// Typed front end to the `gmx` tools.
pub struct Gromacs<'a> {
    runner: &'a dyn CommandRunner,
    binary: String,
}

impl<'a> Gromacs<'a> {
    pub fn new(runner: &'a dyn CommandRunner, binary: &str) -> Self {
        Self {
            runner,
            binary: binary.to_string(),
        }
    }

    fn tool(&self, name: &str) -> Invocation {
        Invocation::new(&self.binary).arg(name)
    }

    pub fn pdb2gmx(
        &self,
        input: &Path,
        output: &Path,
        topology: &Path,
        restraints: &Path,
        forcefield: &str,
        water: &str,
    ) -> Result<CommandOutput, EngineError> {
        let inv = self
            .tool("pdb2gmx")
            .flag_path("-f", input)
            .flag_path("-o", output)
            .flag_path("-p", topology)
            .flag_path("-i", restraints)
            .flag_value("-ff", forcefield)
            .flag_value("-water", water);
        self.runner.run(&inv)
    }

    pub fn editconf(
        &self,
        input: &Path,
        output: &Path,
        spec: &BoxSpec,
    ) -> Result<CommandOutput, EngineError> {
        let inv = self.tool("editconf").flag_path("-f", input).flag_path("-o", output);
        let inv = match spec {
            BoxSpec::Distance { shape, distance } => {
                inv.flag_value("-bt", shape).flag_value("-d", distance)
            }
            BoxSpec::Size { shape, lengths } => inv
                .flag_value("-bt", shape)
                .arg("-box")
                .arg(lengths[0].to_string())
                .arg(lengths[1].to_string())
                .arg(lengths[2].to_string()),
        };
        self.runner.run(&inv)
    }

    pub fn solvate(
        &self,
        input: &Path,
        solvent: &str,
        topology: &Path,
        output: &Path,
    ) -> Result<CommandOutput, EngineError> {
        let inv = self
            .tool("solvate")
            .flag_path("-cp", input)
            .flag_value("-cs", solvent)
            .flag_path("-p", topology)
            .flag_path("-o", output);
        self.runner.run(&inv)
    }

    pub fn grompp(&self, req: &GromppRequest<'_>) -> Result<CommandOutput, EngineError> {
        let mut inv = self
            .tool("grompp")
            .flag_path("-f", req.mdp)
            .flag_path("-c", req.structure)
            .flag_path("-p", req.topology)
            .flag_path("-o", req.output)
            .flag_value("-maxwarn", req.max_warnings);
        if let Some(po) = req.processed_mdp {
            inv = inv.flag_path("-po", po);
        }
        self.runner.run(&inv)
    }

    pub fn genion(&self, req: &GenionRequest<'_>) -> Result<CommandOutput, EngineError> {
        let mut inv = self
            .tool("genion")
            .flag_path("-s", req.tpr)
            .flag_path("-p", req.topology)
            .flag_path("-o", req.output)
            .flag_value("-conc", req.concentration);
        if req.neutral {
            inv = inv.arg("-neutral");
        }
        let inv = inv
            .flag_value("-pname", req.positive_ion)
            .flag_value("-nname", req.negative_ion)
            .stdin(&format!("{}\n", req.group));
        self.runner.run(&inv)
    }

    pub fn trjconv(&self, req: &TrjconvRequest<'_>) -> Result<CommandOutput, EngineError> {
        let mut inv = self
            .tool("trjconv")
            .flag_path("-s", req.tpr)
            .flag_path("-f", req.trajectory)
            .flag_path("-o", req.output);
        if req.separate {
            inv = inv.arg("-sep");
        }
        if let Some(ur) = req.unit_cell {
            inv = inv.flag_value("-ur", ur);
        }
        if let Some(pbc) = req.pbc {
            inv = inv.flag_value("-pbc", pbc);
        }
        if let Some(begin) = req.begin_ps {
            inv = inv.flag_value("-b", begin);
        }
        let inv = inv.stdin(&format!("{}\n", req.group));
        self.runner.run(&inv)
    }

    pub fn mdrun(
        &self,
        files: &MdrunFiles,
        extra_args: &[&str],
    ) -> Result<CommandOutput, EngineError> {
        let mut inv = self
            .tool("mdrun")
            .flag_path("-s", &files.tpr)
            .flag_path("-e", &files.energy)
            .flag_path("-c", &files.confout);
        if let Some(dhdl) = &files.dhdl {
            inv = inv.flag_path("-dhdl", dhdl);
        }
        if let Some(xtc) = &files.xtc {
            inv = inv.flag_path("-x", xtc);
        }
        inv = inv.flag_path("-o", &files.trajectory);
        if let Some(cpo) = &files.checkpoint {
            inv = inv.flag_path("-cpo", cpo);
        }
        inv = inv.flag_path("-g", &files.log);
        for arg in extra_args {
            inv = inv.arg(*arg);
        }
        self.runner.run(&inv)
    }
}

/// Output files of `pmx atomMapping` for one edge.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomMappingFiles {
    pub structure_a: PathBuf,
    pub structure_b: PathBuf,
    pub pairs_a: PathBuf,
    pub pairs_b: PathBuf,
    pub pdb_a: PathBuf,
    pub pdb_b: PathBuf,
    pub pdb_mapped_a: PathBuf,
    pub pdb_mapped_b: PathBuf,
    pub score: PathBuf,
    pub log: PathBuf,
}

impl AtomMappingFiles {
    pub fn new(structure_a: PathBuf, structure_b: PathBuf, out_dir: &Path) -> Self {
        Self {
            structure_a,
            structure_b,
            pairs_a: out_dir.join("pairs1.dat"),
            pairs_b: out_dir.join("pairs2.dat"),
            pdb_a: out_dir.join("out_pdb1.pdb"),
            pdb_b: out_dir.join("out_pdb2.pdb"),
            pdb_mapped_a: out_dir.join("out_pdbm1.pdb"),
            pdb_mapped_b: out_dir.join("out_pdbm2.pdb"),
            score: out_dir.join("score.dat"),
            log: out_dir.join("mapping.log"),
        }
    }
}

/// Inputs and outputs of `pmx ligandHybrid` for one edge.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridFiles {
    pub structure_a: PathBuf,
    pub structure_b: PathBuf,
    pub topology_a: PathBuf,
    pub topology_b: PathBuf,
    pub pairs: PathBuf,
    pub merged_a: PathBuf,
    pub merged_b: PathBuf,
    pub merged_topology: PathBuf,
    pub merged_atomtypes: PathBuf,
    pub log: PathBuf,
}

impl HybridFiles {
    pub fn new(
        (structure_a, topology_a): (PathBuf, PathBuf),
        (structure_b, topology_b): (PathBuf, PathBuf),
        out_dir: &Path,
    ) -> Self {
        Self {
            structure_a,
            structure_b,
            topology_a,
            topology_b,
            pairs: out_dir.join("pairs1.dat"),
            merged_a: out_dir.join("mergedA.pdb"),
            merged_b: out_dir.join("mergedB.pdb"),
            merged_topology: out_dir.join("merged.itp"),
            merged_atomtypes: out_dir.join("ffmerged.itp"),
            log: out_dir.join("hybrid.log"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyseRequest<'p> {
    pub forward: &'p [PathBuf],
    pub reverse: &'p [PathBuf],
    pub output: &'p Path,
    pub integrals_a: &'p Path,
    pub integrals_b: &'p Path,
    pub work_plot: &'p Path,
    pub temperature: f64,
    pub bootstraps: usize,
}

/// Typed front end to the `pmx` command-line tools.
pub struct Pmx<'a> {
    runner: &'a dyn CommandRunner,
    binary: String,
}

impl<'a> Pmx<'a> {
    pub fn new(runner: &'a dyn CommandRunner, binary: &str) -> Self {
        Self {
            runner,
            binary: binary.to_string(),
        }
    }

    pub fn atom_mapping(&self, files: &AtomMappingFiles) -> Result<CommandOutput, EngineError> {
        let inv = Invocation::new(&self.binary)
            .arg("atomMapping")
            .flag_path("-i1", &files.structure_a)
            .flag_path("-i2", &files.structure_b)
            .flag_path("-o1", &files.pairs_a)
            .flag_path("-o2", &files.pairs_b)
            .flag_path("-opdb1", &files.pdb_a)
            .flag_path("-opdb2", &files.pdb_b)
            .flag_path("-opdbm1", &files.pdb_mapped_a)
            .flag_path("-opdbm2", &files.pdb_mapped_b)
            .flag_path("-score", &files.score)
            .flag_path("-log", &files.log);
        self.runner.run(&inv)
    }

    pub fn ligand_hybrid(&self, files: &HybridFiles) -> Result<CommandOutput, EngineError> {
        let inv = Invocation::new(&self.binary)
            .arg("ligandHybrid")
            .flag_path("-i1", &files.structure_a)
            .flag_path("-i2", &files.structure_b)
            .flag_path("-itp1", &files.topology_a)
            .flag_path("-itp2", &files.topology_b)
            .flag_path("-pairs", &files.pairs)
            .flag_path("-oA", &files.merged_a)
            .flag_path("-oB", &files.merged_b)
            .flag_path("-oitp", &files.merged_topology)
            .flag_path("-offitp", &files.merged_atomtypes)
            .flag_path("-log", &files.log);
        self.runner.run(&inv)
    }

    pub fn analyse(&self, req: &AnalyseRequest<'_>) -> Result<CommandOutput, EngineError> {
        let mut inv = Invocation::new(&self.binary).arg("analyse").arg("-fA");
        for f in req.forward {
            inv = inv.arg(f.display().to_string());
        }
        inv = inv.arg("-fB");
        for f in req.reverse {
            inv = inv.arg(f.display().to_string());
        }
        let inv = inv
            .flag_path("-o", req.output)
            .flag_path("-oA", req.integrals_a)
            .flag_path("-oB", req.integrals_b)
            .flag_path("-w", req.work_plot)
            .flag_value("-t", req.temperature)
            .flag_value("-b", req.bootstraps);
        self.runner.run(&inv)
    }
}

/// Deletes the `#name.N#` backups GROMACS leaves when it overwrites a file.
///
/// # Return
///
/// The number of files removed.
pub fn clean_backup_files(dir: &Path) -> Result<usize, EngineError> {
    let mut removed = 0;
    for entry in fs::read_dir(dir).map_err(EngineError::io(dir))? {
        let path = entry.map_err(EngineError::io(dir))?.path();
        let is_backup = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with('#'));
        if is_backup && path.is_file() {
            fs::remove_file(&path).map_err(EngineError::io(&path))?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!(dir = %dir.display(), removed, "Removed GROMACS backup files");
    }
    Ok(removed)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    type Hook = Box<dyn Fn(&Invocation) -> Result<(), EngineError> + Send + Sync>;

    /// Records every invocation instead of spawning it. An optional hook can fake the
    /// files a program would produce, or fail.
    #[derive(Default)]
    pub struct RecordingRunner {
        calls: Mutex<Vec<Invocation>>,
        hook: Option<Hook>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_hook(
            hook: impl Fn(&Invocation) -> Result<(), EngineError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                hook: Some(Box::new(hook)),
            }
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        pub fn command_lines(&self) -> Vec<String> {
            self.calls().iter().map(Invocation::command_line).collect()
        }

        /// Calls whose first argument (the tool name) is `tool`.
        pub fn calls_to(&self, tool: &str) -> Vec<Invocation> {
            self.calls()
                .into_iter()
                .filter(|c| c.args.first().is_some_and(|a| a == tool))
                .collect()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, invocation: &Invocation) -> Result<CommandOutput, EngineError> {
            self.calls.lock().unwrap().push(invocation.clone());
            if let Some(hook) = &self.hook {
                hook(invocation)?;
            }
            Ok(CommandOutput::default())
        }
    }

    /// Value following `flag` in `invocation`.
    pub fn flag<'i>(invocation: &'i Invocation, flag: &str) -> Option<&'i str> {
        invocation
            .args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| invocation.args.get(i + 1))
            .map(String::as_str)
    }
}
