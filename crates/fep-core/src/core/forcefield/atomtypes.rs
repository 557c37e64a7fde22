use crate::core::io::traits::ModelFile;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AtomTypeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// One `[ atomtypes ]` entry: the type name and its parameter columns.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomType {
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    Duplicate,
    /// The name exists with different parameters; the first definition is kept.
    Conflict,
}

/// Atom types in order of first definition.
#[derive(Debug, Clone, Default)]
pub struct AtomTypeTable {
    types: Vec<AtomType>,
    index: HashMap<String, usize>,
}

impl AtomTypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, atom_type: AtomType) -> InsertOutcome {
        match self.index.get(&atom_type.name) {
            Some(&idx) if self.types[idx].fields == atom_type.fields => InsertOutcome::Duplicate,
            Some(_) => InsertOutcome::Conflict,
            None => {
                self.index.insert(atom_type.name.clone(), self.types.len());
                self.types.push(atom_type);
                InsertOutcome::Added
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&AtomType> {
        self.index.get(name).map(|&idx| &self.types[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &AtomType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Adds every type of `other`, logging redefinitions that disagree.
    pub fn merge(&mut self, other: AtomTypeTable) {
        for atom_type in other.types {
            let name = atom_type.name.clone();
            if self.insert(atom_type) == InsertOutcome::Conflict {
                warn!(atom_type = %name, "Conflicting atom type definition ignored; keeping the first");
            }
        }
    }
}

pub struct AtomTypeFile;

impl ModelFile for AtomTypeFile {
    type Model = AtomTypeTable;
    type Error = AtomTypeError;

    fn read_from(reader: &mut impl BufRead) -> Result<AtomTypeTable, AtomTypeError> {
        let mut table = AtomTypeTable::new();
        let mut in_atomtypes = false;
        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let data = line.split(';').next().unwrap_or("").trim();
            if data.is_empty() {
                continue;
            }
            if let Some(rest) = data.strip_prefix('[') {
                let name = rest.trim_end_matches(']').trim();
                in_atomtypes = name.eq_ignore_ascii_case("atomtypes");
                if !in_atomtypes {
                    debug!(section = name, "Skipping non-atomtypes section");
                }
                continue;
            }
            if !in_atomtypes || data.starts_with('#') {
                continue;
            }
            let mut fields = data.split_whitespace().map(str::to_string);
            let name = fields.next().ok_or_else(|| AtomTypeError::Parse {
                line: line_num + 1,
                message: "empty atom type entry".to_string(),
            })?;
            let fields: Vec<String> = fields.collect();
            if fields.len() < 5 {
                return Err(AtomTypeError::Parse {
                    line: line_num + 1,
                    message: format!("atom type '{}' has only {} parameter columns", name, fields.len()),
                });
            }
            if table.insert(AtomType { name: name.clone(), fields }) == InsertOutcome::Conflict {
                warn!(atom_type = %name, "Atom type defined twice with different parameters");
            }
        }
        Ok(table)
    }

    fn write_to(table: &AtomTypeTable, writer: &mut impl Write) -> Result<(), AtomTypeError> {
        writeln!(writer, "[ atomtypes ]")?;
        writeln!(
            writer,
            ";name      bond_type        mass      charge  ptype        sigma      epsilon"
        )?;
        for atom_type in table.iter() {
            let mut line = format!("{:<10}", atom_type.name);
            for field in &atom_type.fields {
                line.push_str(&format!(" {:>11}", field));
            }
            writeln!(writer, "{}", line.trim_end())?;
        }
        writeln!(writer)?;
        Ok(())
    }
}

/// Unions the atom types of all `inputs` into `output`.
///
/// Every input is read before the output is written, so `output` may be one of the
/// inputs.
///
/// # Return
///
/// The number of atom types written.
pub fn merge_atomtype_files<P: AsRef<Path>>(
    output: impl AsRef<Path>,
    inputs: &[P],
) -> Result<usize, AtomTypeError> {
    let mut merged = AtomTypeTable::new();
    for input in inputs {
        let table = AtomTypeFile::read_from_path(input)?;
        debug!(path = %input.as_ref().display(), types = table.len(), "Read atom types");
        merged.merge(table);
    }
    AtomTypeFile::write_to_path(&merged, output)?;
    Ok(merged.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIG_A: &str = "\
[ atomtypes ]
;name  bond_type   mass   charge ptype   sigma   epsilon
 c        c        0.00000  0.00000   A     3.39967e-01   3.59824e-01
 ha       ha       0.00000  0.00000   A     2.59964e-01   6.27600e-02 ; aromatic H
";

    const LIG_B: &str = "\
[ atomtypes ]
 ha       ha       0.00000  0.00000   A     2.59964e-01   6.27600e-02
 os       os       0.00000  0.00000   A     3.00001e-01   7.11280e-01
 c        c        0.00000  0.00000   A     9.99999e-01   1.00000e-01
";

    #[test]
    fn parses_names_and_parameter_columns() {
        let table = AtomTypeFile::read_from_str(LIG_A).unwrap();
        assert_eq!(table.len(), 2);
        let ha = table.get("ha").unwrap();
        assert_eq!(ha.fields.len(), 6);
        assert_eq!(ha.fields[5], "6.27600e-02");
    }

    #[test]
    fn merge_keeps_first_definition_and_order() {
        let mut table = AtomTypeFile::read_from_str(LIG_A).unwrap();
        table.merge(AtomTypeFile::read_from_str(LIG_B).unwrap());
        let names: Vec<&str> = table.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["c", "ha", "os"]);
        assert_eq!(table.get("c").unwrap().fields[4], "3.39967e-01");
    }

    #[test]
    fn insert_distinguishes_duplicates_from_conflicts() {
        let mut table = AtomTypeTable::new();
        let t = AtomType {
            name: "n".into(),
            fields: vec!["n".into(), "0.0".into()],
        };
        assert_eq!(table.insert(t.clone()), InsertOutcome::Added);
        assert_eq!(table.insert(t.clone()), InsertOutcome::Duplicate);
        let mut other = t;
        other.fields[1] = "1.0".into();
        assert_eq!(table.insert(other), InsertOutcome::Conflict);
    }

    #[test]
    fn short_entries_are_rejected() {
        let text = "[ atomtypes ]\n c c 0.0\n";
        assert!(matches!(
            AtomTypeFile::read_from_str(text),
            Err(AtomTypeError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn merging_files_may_overwrite_an_input() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("ffMOL_a.itp");
        let b = dir.path().join("ffMOL_b.itp");
        let merged = dir.path().join("ffmerged.itp");
        std::fs::write(&a, LIG_A).unwrap();
        std::fs::write(&b, LIG_B).unwrap();
        std::fs::write(&merged, "[ atomtypes ]\n dummy dummy 0.0 0.0 A 0.0 0.0\n").unwrap();

        let count = merge_atomtype_files(&merged, &[&a, &b, &merged]).unwrap();
        assert_eq!(count, 4);
        let table = AtomTypeFile::read_from_path(&merged).unwrap();
        assert!(table.get("dummy").is_some());
        assert!(table.get("os").is_some());
    }
}
