use super::error::EngineError;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// Free-energy estimate with its analytical and bootstrap standard errors (kJ/mol).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub dg: f64,
    pub err_analytical: f64,
    pub err_bootstrap: f64,
}

/// The quantities read from one `pmx analyse` results file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeqResult {
    pub frames_forward: usize,
    pub frames_reverse: usize,
    pub estimate: Estimate,
}

impl NeqResult {
    /// Extracts the BAR estimate and the trajectory counts from `pmx analyse` output.
    ///
    /// Values sit in the second-to-last column of the `BAR:` lines (followed by the unit);
    /// counts are the last column of the `0->1` and `1->0` lines. The first occurrence of
    /// each wins.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ResultParse`] naming `source` if a field is missing or is
    /// not a number.
    pub fn parse(text: &str, source: &str) -> Result<Self, EngineError> {
        let mut dg = None;
        let mut err_analytical = None;
        let mut err_bootstrap = None;
        let mut forward = None;
        let mut reverse = None;

        for line in text.lines() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if line.contains("BAR: dG") {
                set_once(&mut dg, || second_to_last(&tokens, source, "BAR: dG"))?;
            } else if line.contains("BAR: Std Err (bootstrap)") {
                set_once(&mut err_bootstrap, || {
                    second_to_last(&tokens, source, "BAR: Std Err (bootstrap)")
                })?;
            } else if line.contains("BAR: Std Err (analytical)") {
                set_once(&mut err_analytical, || {
                    second_to_last(&tokens, source, "BAR: Std Err (analytical)")
                })?;
            } else if line.contains("0->1") {
                set_once(&mut forward, || last_count(&tokens, source, "0->1"))?;
            } else if line.contains("1->0") {
                set_once(&mut reverse, || last_count(&tokens, source, "1->0"))?;
            }
        }

        let missing = |field: &str| EngineError::ResultParse {
            path: source.to_string(),
            message: format!("no '{}' line", field),
        };
        Ok(Self {
            frames_forward: forward.ok_or_else(|| missing("0->1"))?,
            frames_reverse: reverse.ok_or_else(|| missing("1->0"))?,
            estimate: Estimate {
                dg: dg.ok_or_else(|| missing("BAR: dG"))?,
                err_analytical: err_analytical
                    .ok_or_else(|| missing("BAR: Std Err (analytical)"))?,
                err_bootstrap: err_bootstrap.ok_or_else(|| missing("BAR: Std Err (bootstrap)"))?,
            },
        })
    }

    pub fn read_from_path(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path).map_err(EngineError::io(path))?;
        Self::parse(&text, &path.display().to_string())
    }
}

fn set_once<T>(
    slot: &mut Option<T>,
    value: impl FnOnce() -> Result<T, EngineError>,
) -> Result<(), EngineError> {
    if slot.is_none() {
        *slot = Some(value()?);
    }
    Ok(())
}

fn second_to_last(tokens: &[&str], source: &str, field: &str) -> Result<f64, EngineError> {
    tokens
        .len()
        .checked_sub(2)
        .and_then(|i| tokens[i].parse().ok())
        .ok_or_else(|| EngineError::ResultParse {
            path: source.to_string(),
            message: format!("'{}' line has no numeric value", field),
        })
}

fn last_count(tokens: &[&str], source: &str, field: &str) -> Result<usize, EngineError> {
    tokens
        .last()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| EngineError::ResultParse {
            path: source.to_string(),
            message: format!("'{}' line has no trajectory count", field),
        })
}

/// Combines the replica estimates of one branch.
///
/// A single replica is returned unchanged. Otherwise dG is the replica mean and each error
/// is `sqrt(var(pooled) / n)`, where `pooled` holds `samples` normal draws around every
/// replica's dG with that replica's error as the standard deviation.
pub fn summarize_branch<R: Rng + ?Sized>(
    replicas: &[Estimate],
    samples: usize,
    rng: &mut R,
) -> Result<Estimate, EngineError> {
    match replicas {
        [] => Err(EngineError::Statistics(
            "cannot summarize a branch without replicas".to_string(),
        )),
        [single] => Ok(*single),
        _ => {
            let n = replicas.len() as f64;
            let dg = replicas.iter().map(|r| r.dg).sum::<f64>() / n;
            let err_analytical = pooled_error(replicas, samples, rng, |r| r.err_analytical)?;
            let err_bootstrap = pooled_error(replicas, samples, rng, |r| r.err_bootstrap)?;
            Ok(Estimate {
                dg,
                err_analytical,
                err_bootstrap,
            })
        }
    }
}

fn pooled_error<R: Rng + ?Sized>(
    replicas: &[Estimate],
    samples: usize,
    rng: &mut R,
    error_of: impl Fn(&Estimate) -> f64,
) -> Result<f64, EngineError> {
    if samples == 0 {
        return Err(EngineError::Statistics(
            "at least one sample per replica is required".to_string(),
        ));
    }
    let mut pooled = Vec::with_capacity(replicas.len() * samples);
    for replica in replicas {
        let err = error_of(replica);
        if !err.is_finite() || err < 0.0 {
            return Err(EngineError::Statistics(format!(
                "invalid error {} for dG {}",
                err, replica.dg
            )));
        }
        let normal = Normal::new(replica.dg, err)
            .map_err(|e| EngineError::Statistics(format!("normal distribution: {}", e)))?;
        pooled.extend((0..samples).map(|_| normal.sample(rng)));
    }
    Ok((population_variance(&pooled) / replicas.len() as f64).sqrt())
}

fn population_variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// `ddG = dG(protein) - dG(water)` with the errors added in quadrature.
pub fn edge_ddg(water: &Estimate, protein: &Estimate) -> Estimate {
    Estimate {
        dg: protein.dg - water.dg,
        err_analytical: water.err_analytical.hypot(protein.err_analytical),
        err_bootstrap: water.err_bootstrap.hypot(protein.err_bootstrap),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub name: String,
    #[serde(rename = "val")]
    pub dg: f64,
    #[serde(rename = "err_analyt")]
    pub err_analytical: f64,
    #[serde(rename = "err_boot")]
    pub err_bootstrap: f64,
    #[serde(rename = "framesA")]
    pub frames_a: Option<usize>,
    #[serde(rename = "framesB")]
    pub frames_b: Option<usize>,
}

impl ResultRow {
    pub fn from_estimate(name: String, estimate: &Estimate) -> Self {
        Self {
            name,
            dg: estimate.dg,
            err_analytical: estimate.err_analytical,
            err_bootstrap: estimate.err_bootstrap,
            frames_a: None,
            frames_b: None,
        }
    }

    pub fn from_neq(name: String, result: &NeqResult) -> Self {
        Self {
            frames_a: Some(result.frames_forward),
            frames_b: Some(result.frames_reverse),
            ..Self::from_estimate(name, &result.estimate)
        }
    }

    pub fn estimate(&self) -> Estimate {
        Estimate {
            dg: self.dg,
            err_analytical: self.err_analytical,
            err_bootstrap: self.err_bootstrap,
        }
    }
}

/// Named result rows in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsTable {
    rows: Vec<ResultRow>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `row`, replacing an existing row of the same name in place.
    pub fn upsert(&mut self, row: ResultRow) {
        match self.rows.iter_mut().find(|r| r.name == row.name) {
            Some(existing) => *existing = row,
            None => self.rows.push(row),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResultRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), EngineError> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush().map_err(EngineError::io(path))?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, EngineError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &self.rows {
            writer.serialize(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| EngineError::Statistics(format!("CSV buffer error: {}", e)))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Display for ResultsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(0)
            .max(4);
        writeln!(
            f,
            "{:<width$} {:>10} {:>10} {:>10}",
            "name", "dG", "err_analyt", "err_boot"
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<width$} {:>10.2} {:>10.2} {:>10.2}",
                row.name, row.dg, row.err_analytical, row.err_bootstrap
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const RESULTS: &str = "\
  ========================================================
                       ANALYSIS
  ========================================================
    Number of forward (0->1) trajectories: 80
    Number of reverse (1->0) trajectories: 79
    Temperature : 298.00 K

  --------------------------------------------------------
               Crooks Gaussian Intersection
  --------------------------------------------------------
    CGI: dG =    -11.90 kJ/mol
  --------------------------------------------------------
               Bennett Acceptance Ratio
  --------------------------------------------------------
    BAR: dG =    -12.34 kJ/mol
    BAR: Std Err (analytical) =      0.21 kJ/mol
    BAR: Std Err (bootstrap)  =      0.35 kJ/mol
    BAR: Conv =       0.12
  ========================================================
";

    fn estimate(dg: f64, err: f64) -> Estimate {
        Estimate {
            dg,
            err_analytical: err,
            err_bootstrap: err,
        }
    }

    #[test]
    fn parses_bar_estimate_and_counts() {
        let r = NeqResult::parse(RESULTS, "results.txt").unwrap();
        assert_eq!(r.frames_forward, 80);
        assert_eq!(r.frames_reverse, 79);
        assert_eq!(r.estimate.dg, -12.34);
        assert_eq!(r.estimate.err_analytical, 0.21);
        assert_eq!(r.estimate.err_bootstrap, 0.35);
    }

    #[test]
    fn missing_field_is_reported() {
        let text = RESULTS.replace("BAR: Std Err (bootstrap)", "BAR: something else");
        match NeqResult::parse(&text, "r.txt") {
            Err(EngineError::ResultParse { path, message }) => {
                assert_eq!(path, "r.txt");
                assert!(message.contains("bootstrap"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn non_numeric_value_is_reported() {
        let text = RESULTS.replace("-12.34", "nan?");
        assert!(matches!(
            NeqResult::parse(&text, "r.txt"),
            Err(EngineError::ResultParse { .. })
        ));
    }

    #[test]
    fn single_replica_is_copied() {
        let mut rng = StdRng::seed_from_u64(1);
        let e = estimate(-3.0, 0.4);
        assert_eq!(summarize_branch(&[e], 1000, &mut rng).unwrap(), e);
    }

    #[test]
    fn replicas_are_averaged_and_errors_pooled() {
        let mut rng = StdRng::seed_from_u64(7);
        let replicas = [estimate(-10.0, 0.0), estimate(-12.0, 0.0), estimate(-14.0, 0.0)];
        let s = summarize_branch(&replicas, 500, &mut rng).unwrap();
        assert!((s.dg + 12.0).abs() < 1e-12);
        // Zero-width distributions: pooled variance is the spread of the means, 8/3.
        let expected = (8.0_f64 / 3.0 / 3.0).sqrt();
        assert!((s.err_analytical - expected).abs() < 1e-9);
    }

    #[test]
    fn pooled_error_grows_with_replica_errors() {
        let mut rng = StdRng::seed_from_u64(42);
        let replicas = [estimate(-5.0, 1.0), estimate(-5.0, 1.0)];
        let s = summarize_branch(&replicas, 20_000, &mut rng).unwrap();
        let expected = (1.0_f64 / 2.0).sqrt();
        assert!((s.err_bootstrap - expected).abs() < 0.02);
    }

    #[test]
    fn negative_errors_and_empty_branches_are_statistics_errors() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            summarize_branch(&[], 10, &mut rng),
            Err(EngineError::Statistics(_))
        ));
        let bad = [estimate(1.0, -1.0), estimate(1.0, 1.0)];
        assert!(matches!(
            summarize_branch(&bad, 10, &mut rng),
            Err(EngineError::Statistics(_))
        ));
    }

    #[test]
    fn ddg_subtracts_water_and_adds_errors_in_quadrature() {
        let water = estimate(-2.0, 0.3);
        let protein = estimate(-5.0, 0.4);
        let ddg = edge_ddg(&water, &protein);
        assert!((ddg.dg + 3.0).abs() < 1e-12);
        assert!((ddg.err_analytical - 0.5).abs() < 1e-12);
    }

    #[test]
    fn csv_has_named_columns_and_empty_frame_counts_for_summaries() {
        let mut table = ResultsTable::new();
        let neq = NeqResult::parse(RESULTS, "r").unwrap();
        table.upsert(ResultRow::from_neq("edge_a_b_water_1".into(), &neq));
        table.upsert(ResultRow::from_estimate(
            "edge_a_b_water".into(),
            &neq.estimate,
        ));
        table.upsert(ResultRow::from_estimate(
            "edge_a_b_water".into(),
            &estimate(1.0, 0.5),
        ));
        assert_eq!(table.len(), 2);
        let csv = table.to_csv_string().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "name,val,err_analyt,err_boot,framesA,framesB");
        assert_eq!(lines[1], "edge_a_b_water_1,-12.34,0.21,0.35,80,79");
        assert_eq!(lines[2], "edge_a_b_water,1.0,0.5,0.5,,");
    }

    #[test]
    fn table_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let mut table = ResultsTable::new();
        table.upsert(ResultRow::from_estimate("edge_a_b".into(), &estimate(-1.5, 0.2)));
        table.write_csv(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("name,val,"));
        assert!(table.to_string().contains("edge_a_b"));
    }
}
