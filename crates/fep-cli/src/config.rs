use crate::cli::StudyArgs;
use crate::error::{CliError, Result};
use fepflow::engine::config as core_config;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialPathsConfig {
    #[serde(rename = "work-dir")]
    work_dir: Option<PathBuf>,
    #[serde(rename = "mdp-dir")]
    mdp_dir: Option<PathBuf>,
    #[serde(rename = "protein-dir")]
    protein_dir: Option<PathBuf>,
    #[serde(rename = "ligand-dir")]
    ligand_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialSystemConfig {
    forcefield: Option<String>,
    #[serde(rename = "box-shape")]
    box_shape: Option<String>,
    #[serde(rename = "box-distance")]
    box_distance: Option<f64>,
    #[serde(rename = "water-model")]
    water_model: Option<String>,
    #[serde(rename = "salt-concentration")]
    salt_concentration: Option<f64>,
    #[serde(rename = "positive-ion")]
    positive_ion: Option<String>,
    #[serde(rename = "negative-ion")]
    negative_ion: Option<String>,
}

impl PartialSystemConfig {
    fn resolve(self) -> core_config::SystemConfig {
        let d = core_config::SystemConfig::default();
        core_config::SystemConfig {
            forcefield: self.forcefield.unwrap_or(d.forcefield),
            box_shape: self.box_shape.unwrap_or(d.box_shape),
            box_distance: self.box_distance.unwrap_or(d.box_distance),
            water_model: self.water_model.unwrap_or(d.water_model),
            salt_concentration: self.salt_concentration.unwrap_or(d.salt_concentration),
            positive_ion: self.positive_ion.unwrap_or(d.positive_ion),
            negative_ion: self.negative_ion.unwrap_or(d.negative_ion),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialJobConfig {
    queue: Option<String>,
    #[serde(rename = "sim-time-hours")]
    sim_time_hours: Option<u32>,
    #[serde(rename = "sim-cpu")]
    sim_cpu: Option<u32>,
    gpu: Option<bool>,
    partition: Option<String>,
    modules: Option<Vec<String>>,
    sources: Option<Vec<String>>,
    exports: Option<Vec<String>>,
    mdrun: Option<String>,
}

impl PartialJobConfig {
    fn resolve(self) -> Result<core_config::JobConfig> {
        let d = core_config::JobConfig::default();
        let queue = match self.queue {
            Some(q) => q
                .parse::<core_config::Queue>()
                .map_err(|e| CliError::Config(e.to_string()))?,
            None => d.queue,
        };
        Ok(core_config::JobConfig {
            queue,
            sim_time_hours: self.sim_time_hours.unwrap_or(d.sim_time_hours),
            sim_cpu: self.sim_cpu.unwrap_or(d.sim_cpu),
            gpu: self.gpu.unwrap_or(d.gpu),
            partition: self.partition.or(d.partition),
            modules: self.modules.unwrap_or(d.modules),
            sources: self.sources.unwrap_or(d.sources),
            exports: self.exports.unwrap_or(d.exports),
            mdrun: self.mdrun.unwrap_or(d.mdrun),
        })
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialTransitionConfig {
    count: Option<usize>,
    #[serde(rename = "snapshot-start-ps")]
    snapshot_start_ps: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialAnalysisConfig {
    temperature: Option<f64>,
    bootstraps: Option<usize>,
    #[serde(rename = "summary-samples")]
    summary_samples: Option<usize>,
    seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialBinaries {
    gmx: Option<String>,
    pmx: Option<String>,
}

/// The study file as written by the user; every field is optional until merged.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialStudyConfig {
    replicas: Option<usize>,
    branches: Option<Vec<String>>,
    #[serde(rename = "sim-types")]
    sim_types: Option<Vec<String>>,
    edges: Option<Vec<(String, String)>>,
    #[serde(rename = "edges-file")]
    edges_file: Option<PathBuf>,
    paths: Option<PartialPathsConfig>,
    system: Option<PartialSystemConfig>,
    jobs: Option<PartialJobConfig>,
    transitions: Option<PartialTransitionConfig>,
    analysis: Option<PartialAnalysisConfig>,
    binaries: Option<PartialBinaries>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl PartialStudyConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading study configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    pub fn merge_with_cli(mut self, args: &StudyArgs) -> Result<core_config::StudyConfig> {
        self.apply_set_values(&args.set_values)?;

        let paths = self.paths.take().unwrap_or_default();
        let resolve = |value: Option<PathBuf>, default: &str| -> PathBuf {
            let path = value.unwrap_or_else(|| PathBuf::from(default));
            if path.is_absolute() {
                path
            } else {
                self.base_dir.join(path)
            }
        };

        let edges = match (self.edges.take(), self.edges_file.take()) {
            (Some(_), Some(_)) => {
                return Err(CliError::Config(
                    "`edges` and `edges-file` are mutually exclusive.".to_string(),
                ));
            }
            (Some(pairs), None) => core_config::EdgeSource::Pairs(pairs),
            (None, Some(file)) => core_config::EdgeSource::File(resolve(Some(file), "")),
            (None, None) => {
                return Err(CliError::Config(
                    "Either `edges` or `edges-file` is required.".to_string(),
                ));
            }
        };

        let mut builder = core_config::StudyConfigBuilder::new()
            .work_dir(resolve(paths.work_dir, "workpath"))
            .mdp_dir(resolve(paths.mdp_dir, "mdp"))
            .protein_dir(resolve(paths.protein_dir, "inputs/proteins"))
            .ligand_dir(resolve(paths.ligand_dir, "inputs/ligands"))
            .edges(edges)
            .system(self.system.take().unwrap_or_default().resolve())
            .jobs(self.jobs.take().unwrap_or_default().resolve()?);

        if let Some(replicas) = self.replicas {
            builder = builder.replicas(replicas);
        }
        if let Some(names) = self.branches.take() {
            builder = builder.branches(parse_list::<core_config::Branch>(&names, "branches")?);
        }
        if let Some(names) = self.sim_types.take() {
            builder =
                builder.sim_types(parse_list::<core_config::SimType>(&names, "sim-types")?);
        }

        let t = self.transitions.take().unwrap_or_default();
        let td = core_config::TransitionConfig::default();
        builder = builder.transitions(core_config::TransitionConfig {
            count: t.count.unwrap_or(td.count),
            snapshot_start_ps: t.snapshot_start_ps.unwrap_or(td.snapshot_start_ps),
        });

        let a = self.analysis.take().unwrap_or_default();
        let ad = core_config::AnalysisConfig::default();
        builder = builder.analysis(core_config::AnalysisConfig {
            temperature: a.temperature.unwrap_or(ad.temperature),
            bootstraps: a.bootstraps.unwrap_or(ad.bootstraps),
            summary_samples: a.summary_samples.unwrap_or(ad.summary_samples),
            seed: a.seed.or(ad.seed),
        });

        let b = self.binaries.take().unwrap_or_default();
        let bd = core_config::Binaries::default();
        builder = builder.binaries(core_config::Binaries {
            gmx: b.gmx.unwrap_or(bd.gmx),
            pmx: b.pmx.unwrap_or(bd.pmx),
        });

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let parts: Vec<_> = kv_pair.splitn(2, '=').collect();
            if parts.len() != 2 {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            }
            let key = parts[0];
            let value_str = parts[1];

            match key {
                "replicas" => self.replicas = Some(parse_value(key, value_str)?),
                "paths.work-dir" => {
                    // Command-line paths are relative to the working directory.
                    let mut work_dir = PathBuf::from(value_str);
                    if work_dir.is_relative() {
                        work_dir = std::env::current_dir().map_err(CliError::Io)?.join(work_dir);
                    }
                    self.paths.get_or_insert_with(Default::default).work_dir = Some(work_dir);
                }
                "system.forcefield" => {
                    self.system.get_or_insert_with(Default::default).forcefield =
                        Some(value_str.to_string());
                }
                "system.box-distance" => {
                    self.system.get_or_insert_with(Default::default).box_distance =
                        Some(parse_value(key, value_str)?);
                }
                "system.salt-concentration" => {
                    self.system
                        .get_or_insert_with(Default::default)
                        .salt_concentration = Some(parse_value(key, value_str)?);
                }
                "jobs.queue" => {
                    self.jobs.get_or_insert_with(Default::default).queue =
                        Some(value_str.to_string());
                }
                "jobs.sim-time-hours" => {
                    self.jobs.get_or_insert_with(Default::default).sim_time_hours =
                        Some(parse_value(key, value_str)?);
                }
                "jobs.sim-cpu" => {
                    self.jobs.get_or_insert_with(Default::default).sim_cpu =
                        Some(parse_value(key, value_str)?);
                }
                "jobs.gpu" => {
                    self.jobs.get_or_insert_with(Default::default).gpu =
                        Some(parse_value(key, value_str)?);
                }
                "jobs.partition" => {
                    self.jobs.get_or_insert_with(Default::default).partition =
                        Some(value_str.to_string());
                }
                "transitions.count" => {
                    self.transitions.get_or_insert_with(Default::default).count =
                        Some(parse_value(key, value_str)?);
                }
                "transitions.snapshot-start-ps" => {
                    self.transitions
                        .get_or_insert_with(Default::default)
                        .snapshot_start_ps = Some(parse_value(key, value_str)?);
                }
                "analysis.temperature" => {
                    self.analysis.get_or_insert_with(Default::default).temperature =
                        Some(parse_value(key, value_str)?);
                }
                "analysis.bootstraps" => {
                    self.analysis.get_or_insert_with(Default::default).bootstraps =
                        Some(parse_value(key, value_str)?);
                }
                "analysis.seed" => {
                    self.analysis.get_or_insert_with(Default::default).seed =
                        Some(parse_value(key, value_str)?);
                }
                "binaries.gmx" => {
                    self.binaries.get_or_insert_with(Default::default).gmx =
                        Some(value_str.to_string());
                }
                "binaries.pmx" => {
                    self.binaries.get_or_insert_with(Default::default).pmx =
                        Some(value_str.to_string());
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

fn parse_list<T>(names: &[String], key: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    names
        .iter()
        .map(|n| {
            n.parse()
                .map_err(|e: T::Err| CliError::Config(format!("Invalid entry in {}: {}", key, e)))
        })
        .collect()
}

/// Reads the study file named by `args` and applies its overrides.
pub fn load_study_config(args: &StudyArgs) -> Result<core_config::StudyConfig> {
    PartialStudyConfig::from_file(&args.config)?.merge_with_cli(args)
}
