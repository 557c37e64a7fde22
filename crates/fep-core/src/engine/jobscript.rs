use super::config::{JobConfig, Queue};
use super::error::EngineError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SUBMISSION_SCRIPT: &str = "submit.sh";

/// A batch script for one simulation directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Jobscript {
    pub name: String,
    pub queue: Queue,
    pub sim_time_hours: u32,
    pub sim_cpu: u32,
    pub gpu: bool,
    pub partition: Option<String>,
    pub modules: Vec<String>,
    pub sources: Vec<String>,
    pub exports: Vec<String>,
    pub mdrun: String,
    pub commands: Vec<String>,
}

impl Jobscript {
    pub fn new(name: &str, config: &JobConfig) -> Self {
        Self {
            name: name.to_string(),
            queue: config.queue,
            sim_time_hours: config.sim_time_hours,
            sim_cpu: config.sim_cpu,
            gpu: config.gpu,
            partition: config.partition.clone(),
            modules: config.modules.clone(),
            sources: config.sources.clone(),
            exports: config.exports.clone(),
            mdrun: config.mdrun.clone(),
            commands: Vec::new(),
        }
    }

    pub fn with_commands(mut self, commands: Vec<String>) -> Self {
        self.commands = commands;
        self
    }

    fn write_header(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.queue {
            Queue::Sge => {
                writeln!(f, "#$ -S /bin/bash")?;
                writeln!(f, "#$ -N {}", self.name)?;
                writeln!(f, "#$ -l h_rt={}:00:00", self.sim_time_hours)?;
                writeln!(f, "#$ -cwd")?;
                writeln!(f, "#$ -pe *_fast {}", self.sim_cpu)?;
                if let Some(partition) = &self.partition {
                    writeln!(f, "#$ -q {}", partition)?;
                }
                if self.gpu {
                    writeln!(f, "#$ -l gpu=1")?;
                }
            }
            Queue::Slurm => {
                writeln!(f, "#!/bin/bash")?;
                writeln!(f, "#SBATCH --job-name={}", self.name)?;
                writeln!(f, "#SBATCH --get-user-env")?;
                writeln!(f, "#SBATCH -N 1")?;
                writeln!(f, "#SBATCH -n {}", self.sim_cpu)?;
                if let Some(partition) = &self.partition {
                    writeln!(f, "#SBATCH -p {}", partition)?;
                }
                writeln!(f, "#SBATCH --time={}:00:00", self.sim_time_hours)?;
                if self.gpu {
                    writeln!(f, "#SBATCH --gres=gpu:1")?;
                }
            }
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        self.to_string()
    }

    pub fn write_to_path(&self, path: &Path) -> Result<(), EngineError> {
        fs::write(path, self.render()).map_err(EngineError::io(path))?;
        debug!(job = %self.name, path = %path.display(), "Wrote jobscript");
        Ok(())
    }
}

impl fmt::Display for Jobscript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_header(f)?;
        writeln!(f)?;
        for module in &self.modules {
            writeln!(f, "module load {}", module)?;
        }
        for source in &self.sources {
            writeln!(f, "source {}", source)?;
        }
        for export in &self.exports {
            writeln!(f, "export {}", export)?;
        }
        writeln!(
            f,
            "export GMXRUN=\"{} -ntomp {} -ntmpi 1\"",
            self.mdrun, self.sim_cpu
        )?;
        writeln!(f)?;
        for command in &self.commands {
            writeln!(f, "{}", command)?;
        }
        Ok(())
    }
}

/// Commands running the single `tpr.tpr` of an em or eq directory.
pub fn simulation_commands(sim_dir: &Path) -> Vec<String> {
    vec![
        format!("cd {}", sim_dir.display()),
        "$GMXRUN -s tpr.tpr".to_string(),
    ]
}

/// Commands running `count` transitions.
///
/// SGE jobs are array tasks working in `$TMPDIR` on `ti$SGE_TASK_ID.tpr`; SLURM jobs loop
/// over all transitions inside the simulation directory.
pub fn transition_commands(queue: Queue, sim_dir: &Path, count: usize) -> Vec<String> {
    match queue {
        Queue::Sge => vec![
            "cd $TMPDIR".to_string(),
            format!("cp {}/ti$SGE_TASK_ID.tpr tpr.tpr", sim_dir.display()),
            "$GMXRUN -s tpr.tpr -dhdl dhdl$SGE_TASK_ID.xvg".to_string(),
            format!("cp dhdl$SGE_TASK_ID.xvg {}/.", sim_dir.display()),
        ],
        Queue::Slurm => vec![
            format!("cd {}", sim_dir.display()),
            format!("for i in {{1..{}}};do", count),
            "$GMXRUN -s ti$i.tpr -dhdl dhdl$i.xvg".to_string(),
            "done".to_string(),
        ],
    }
}

/// The script submitting `jobscript0 .. jobscript<count-1>`.
///
/// `array_tasks` turns SGE submissions into array jobs with that many tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionScript {
    pub queue: Queue,
    pub count: usize,
    pub array_tasks: Option<usize>,
}

impl fmt::Display for SubmissionScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#!/bin/bash")?;
        writeln!(f, "for ((i = 0; i < {}; i++)); do", self.count)?;
        match (self.queue, self.array_tasks) {
            (Queue::Sge, Some(tasks)) => writeln!(f, "    qsub -t 1-{}:1 jobscript$i", tasks)?,
            (Queue::Sge, None) => writeln!(f, "    qsub jobscript$i")?,
            (Queue::Slurm, _) => writeln!(f, "    sbatch jobscript$i")?,
        }
        writeln!(f, "done")
    }
}

pub fn render_submission_script(queue: Queue, count: usize, array_tasks: Option<usize>) -> String {
    SubmissionScript {
        queue,
        count,
        array_tasks,
    }
    .to_string()
}

pub fn write_submission_script(
    dir: &Path,
    queue: Queue,
    count: usize,
    array_tasks: Option<usize>,
) -> Result<PathBuf, EngineError> {
    let path = dir.join(SUBMISSION_SCRIPT);
    fs::write(&path, render_submission_script(queue, count, array_tasks))
        .map_err(EngineError::io(&path))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .map_err(EngineError::io(&path))?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(queue: Queue) -> JobConfig {
        JobConfig {
            queue,
            modules: vec!["gromacs/2021".into()],
            sources: vec!["/opt/env.sh".into()],
            ..JobConfig::default()
        }
    }

    #[test]
    fn sge_script_has_header_environment_and_commands() {
        let job = Jobscript::new("lig_edge_a_b_stateA_1_em", &config(Queue::Sge))
            .with_commands(simulation_commands(Path::new("/w/em")));
        let text = job.render();
        assert_eq!(
            text,
            "#$ -S /bin/bash\n\
             #$ -N lig_edge_a_b_stateA_1_em\n\
             #$ -l h_rt=24:00:00\n\
             #$ -cwd\n\
             #$ -pe *_fast 8\n\
             #$ -l gpu=1\n\
             \n\
             module load gromacs/2021\n\
             source /opt/env.sh\n\
             export GMXRUN=\"gmx mdrun -ntomp 8 -ntmpi 1\"\n\
             \n\
             cd /w/em\n\
             $GMXRUN -s tpr.tpr\n"
        );
    }

    #[test]
    fn slurm_header_uses_partition_and_optional_gpu() {
        let mut cfg = config(Queue::Slurm);
        cfg.gpu = false;
        cfg.partition = Some("short".into());
        let text = Jobscript::new("job", &cfg).render();
        assert!(text.starts_with("#!/bin/bash\n#SBATCH --job-name=job\n"));
        assert!(text.contains("#SBATCH -p short\n"));
        assert!(text.contains("#SBATCH --time=24:00:00\n"));
        assert!(!text.contains("gres"));
    }

    #[test]
    fn transition_commands_per_queue() {
        let dir = Path::new("/w/transitions");
        let sge = transition_commands(Queue::Sge, dir, 80);
        assert_eq!(sge[1], "cp /w/transitions/ti$SGE_TASK_ID.tpr tpr.tpr");
        assert_eq!(sge[3], "cp dhdl$SGE_TASK_ID.xvg /w/transitions/.");
        let slurm = transition_commands(Queue::Slurm, dir, 80);
        assert_eq!(slurm[1], "for i in {1..80};do");
        assert_eq!(slurm[2], "$GMXRUN -s ti$i.tpr -dhdl dhdl$i.xvg");
    }

    #[test]
    fn submission_script_loops_over_all_jobs() {
        let text = render_submission_script(Queue::Sge, 12, Some(80));
        assert!(text.contains("for ((i = 0; i < 12; i++)); do\n"));
        assert!(text.contains("    qsub -t 1-80:1 jobscript$i\n"));
        let text = render_submission_script(Queue::Slurm, 3, Some(80));
        assert!(text.contains("    sbatch jobscript$i\n"));
    }

    #[test]
    fn plain_sge_submission_renders_exactly() {
        let script = SubmissionScript {
            queue: Queue::Sge,
            count: 2,
            array_tasks: None,
        };
        assert_eq!(
            script.to_string(),
            "#!/bin/bash\nfor ((i = 0; i < 2; i++)); do\n    qsub jobscript$i\ndone\n"
        );
    }

    #[test]
    fn submission_script_is_written_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_submission_script(dir.path(), Queue::Sge, 2, None).unwrap();
        assert_eq!(path.file_name().unwrap(), "submit.sh");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }
}
