use super::config::EdgeSource;
use super::error::EngineError;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The files found in a protein input folder.
#[derive(Debug, Clone, PartialEq)]
pub struct ProteinInputs {
    pub dir: PathBuf,
    pub structure: PathBuf,
    pub topologies: Vec<PathBuf>,
    pub restraints: Vec<PathBuf>,
    /// Molecule names of `topologies`, sorted.
    pub molecules: Vec<String>,
}

impl ProteinInputs {
    /// Classifies the `.itp` and `.pdb` files of `dir`.
    ///
    /// An `.itp` whose name contains `posre` is a restraint file; any other `.itp` is a
    /// molecule topology named after its file stem without a `topol_` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Input`] if the folder holds no `.pdb` structure.
    pub fn discover(dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        let dir = dir.as_ref();
        let mut structure: Option<PathBuf> = None;
        let mut topologies = Vec::new();
        let mut restraints = Vec::new();
        let mut molecules = Vec::new();

        for path in sorted_entries(dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.contains(".itp") {
                if name.contains("posre") {
                    restraints.push(path.clone());
                } else {
                    let stem = name.trim_end_matches(".itp");
                    molecules.push(stem.strip_prefix("topol_").unwrap_or(stem).to_string());
                    topologies.push(path.clone());
                }
            }
            if name.contains(".pdb") {
                if let Some(previous) = &structure {
                    warn!(
                        kept = %path.display(),
                        ignored = %previous.display(),
                        "Protein folder holds several structures"
                    );
                }
                structure = Some(path.clone());
            }
        }
        molecules.sort();

        let structure = structure.ok_or_else(|| {
            EngineError::Input(format!("no .pdb structure in '{}'", dir.display()))
        })?;
        debug!(
            structure = %structure.display(),
            molecules = ?molecules,
            restraints = restraints.len(),
            "Discovered protein inputs"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            structure,
            topologies,
            restraints,
            molecules,
        })
    }
}

/// A parameterised ligand folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ligand {
    pub name: String,
    pub dir: PathBuf,
}

impl Ligand {
    pub fn structure(&self) -> PathBuf {
        self.dir.join("mol_gmx.pdb")
    }

    pub fn topology(&self) -> PathBuf {
        self.dir.join("MOL.itp")
    }

    pub fn atomtypes(&self) -> PathBuf {
        self.dir.join("ffMOL.itp")
    }
}

/// Ligands keyed by name. Folder names lose a `lig_` or `lig` prefix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LigandSet {
    ligands: BTreeMap<String, Ligand>,
}

impl LigandSet {
    pub fn discover(dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        let dir = dir.as_ref();
        let mut ligands = BTreeMap::new();
        for path in sorted_entries(dir)? {
            if !path.is_dir() {
                continue;
            }
            let Some(folder) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let name = ligand_name(folder).to_string();
            if name.is_empty() {
                warn!(folder, "Skipping ligand folder without a name");
                continue;
            }
            if ligands.contains_key(&name) {
                return Err(EngineError::Input(format!(
                    "ligand '{}' is provided by more than one folder in '{}'",
                    name,
                    dir.display()
                )));
            }
            ligands.insert(name.clone(), Ligand { name, dir: path });
        }
        if ligands.is_empty() {
            return Err(EngineError::Input(format!(
                "no ligand folders in '{}'",
                dir.display()
            )));
        }
        debug!(count = ligands.len(), "Discovered ligands");
        Ok(Self { ligands })
    }

    pub fn get(&self, name: &str) -> Option<&Ligand> {
        self.ligands.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ligands.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ligands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ligands.is_empty()
    }
}

fn ligand_name(folder: &str) -> &str {
    folder
        .strip_prefix("lig_")
        .or_else(|| folder.strip_prefix("lig"))
        .unwrap_or(folder)
}

/// A ligand pair transformed into each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub name: String,
    pub ligand_a: String,
    pub ligand_b: String,
}

impl Edge {
    pub fn new(ligand_a: &str, ligand_b: &str) -> Self {
        Self {
            name: format!("edge_{}_{}", ligand_a, ligand_b),
            ligand_a: ligand_a.to_string(),
            ligand_b: ligand_b.to_string(),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for Edge {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// Reads `A B` pairs, one per line. Blank lines and `#` comments are ignored.
pub fn read_edges_file(path: impl AsRef<Path>) -> Result<Vec<(String, String)>, EngineError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(EngineError::io(path))?;
    let mut pairs = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        let data = line.split('#').next().unwrap_or("").trim();
        if data.is_empty() {
            continue;
        }
        let fields: Vec<&str> = data.split_whitespace().collect();
        match fields.as_slice() {
            [a, b] => pairs.push((a.to_string(), b.to_string())),
            _ => {
                return Err(EngineError::Input(format!(
                    "{}:{}: expected two ligand names, found '{}'",
                    path.display(),
                    line_num + 1,
                    data
                )));
            }
        }
    }
    Ok(pairs)
}

/// Turns an edge source into named edges whose ligands all exist in `ligands`.
///
/// Duplicate pairs are dropped with a warning; order of first appearance is kept.
pub fn resolve_edges(source: &EdgeSource, ligands: &LigandSet) -> Result<Vec<Edge>, EngineError> {
    let pairs = match source {
        EdgeSource::Pairs(pairs) => pairs.clone(),
        EdgeSource::File(path) => read_edges_file(path)?,
    };
    if pairs.is_empty() {
        return Err(EngineError::Input("the study defines no edges".to_string()));
    }
    let mut edges: Vec<Edge> = Vec::with_capacity(pairs.len());
    for (a, b) in &pairs {
        let edge = Edge::new(a, b);
        for ligand in [a, b] {
            if ligands.get(ligand).is_none() {
                return Err(EngineError::UnknownLigand {
                    edge: edge.name.clone(),
                    ligand: ligand.clone(),
                });
            }
        }
        if a == b {
            return Err(EngineError::Input(format!(
                "edge '{}' transforms a ligand into itself",
                edge.name
            )));
        }
        if edges.contains(&edge) {
            warn!(edge = %edge.name, "Duplicate edge ignored");
            continue;
        }
        edges.push(edge);
    }
    Ok(edges)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(EngineError::io(dir))? {
        entries.push(entry.map_err(EngineError::io(dir))?.path());
    }
    entries.sort();
    Ok(entries)
}
