use crate::core::io::traits::ModelFile;
use crate::core::models::structure::{CellParameters, RecordKind, Structure, StructureAtom};
use nalgebra::Point3;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: PdbParseErrorKind },
    #[error("Missing required record: {0}")]
    MissingRecord(String),
}

#[derive(Debug, Error)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: String, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: String, value: String },
    #[error("Line is too short for an ATOM/HETATM record (must be at least 54 chars)")]
    LineTooShort,
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

fn char_at(line: &str, idx: usize) -> char {
    line.get(idx..idx + 1)
        .and_then(|s| s.chars().next())
        .unwrap_or(' ')
}

fn parse_float(line: &str, line_num: usize, start: usize, end: usize) -> Result<f64, PdbError> {
    let value = slice_and_trim(line, start, end);
    value.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidFloat {
            columns: format!("{}-{}", start + 1, end),
            value: value.into(),
        },
    })
}

fn parse_optional_float(line: &str, start: usize, end: usize, default: f64) -> f64 {
    slice_and_trim(line, start, end).parse().unwrap_or(default)
}

fn parse_int(line: &str, line_num: usize, start: usize, end: usize) -> Result<isize, PdbError> {
    let value = slice_and_trim(line, start, end);
    value.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidInt {
            columns: format!("{}-{}", start + 1, end),
            value: value.into(),
        },
    })
}

fn element_from_name(name: &str) -> String {
    name.chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_string())
        .unwrap_or_default()
}

fn format_atom_name(name: &str) -> String {
    if name.len() >= 4 {
        name.chars().take(4).collect()
    } else {
        format!(" {:<3}", name)
    }
}

pub struct PdbFile;

impl ModelFile for PdbFile {
    type Model = Structure;
    type Error = PdbError;

    fn read_from(reader: &mut impl BufRead) -> Result<Structure, PdbError> {
        let mut structure = Structure::new();
        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;
            let record_type = slice_and_trim(&line, 0, 6);
            match record_type {
                "ATOM" | "HETATM" => {
                    if line.len() < 54 {
                        return Err(PdbError::Parse {
                            line: line_num,
                            kind: PdbParseErrorKind::LineTooShort,
                        });
                    }
                    let serial = parse_int(&line, line_num, 6, 11)?;
                    let name = slice_and_trim(&line, 12, 16).to_string();
                    let x = parse_float(&line, line_num, 30, 38)?;
                    let y = parse_float(&line, line_num, 38, 46)?;
                    let z = parse_float(&line, line_num, 46, 54)?;
                    let element = match slice_and_trim(&line, 76, 78) {
                        "" => element_from_name(&name),
                        e => e.to_string(),
                    };
                    structure.atoms.push(StructureAtom {
                        record: if record_type == "ATOM" {
                            RecordKind::Atom
                        } else {
                            RecordKind::Hetatm
                        },
                        serial: serial.max(0) as usize,
                        name,
                        alt_loc: char_at(&line, 16),
                        res_name: slice_and_trim(&line, 17, 21).to_string(),
                        chain_id: char_at(&line, 21),
                        res_seq: parse_int(&line, line_num, 22, 26)?,
                        i_code: char_at(&line, 26),
                        position: Point3::new(x, y, z),
                        occupancy: parse_optional_float(&line, 54, 60, 1.0),
                        b_factor: parse_optional_float(&line, 60, 66, 0.0),
                        element,
                    });
                }
                "CRYST1" => {
                    let params = CellParameters {
                        a: parse_float(&line, line_num, 6, 15)?,
                        b: parse_float(&line, line_num, 15, 24)?,
                        c: parse_float(&line, line_num, 24, 33)?,
                        alpha: parse_optional_float(&line, 33, 40, 90.0),
                        beta: parse_optional_float(&line, 40, 47, 90.0),
                        gamma: parse_optional_float(&line, 47, 54, 90.0),
                    };
                    structure.cell = Some(params.to_box_vectors());
                }
                "ENDMDL" | "END" => break,
                _ => {}
            }
        }
        if structure.atoms.is_empty() {
            return Err(PdbError::MissingRecord("ATOM/HETATM records".into()));
        }
        Ok(structure)
    }

    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), PdbError> {
        if let Some(cell) = &structure.cell {
            let p = CellParameters::from_box_vectors(cell);
            writeln!(
                writer,
                "CRYST1{:>9.3}{:>9.3}{:>9.3}{:>7.2}{:>7.2}{:>7.2} P 1           1",
                p.a, p.b, p.c, p.alpha, p.beta, p.gamma
            )?;
        }
        for atom in &structure.atoms {
            writeln!(
                writer,
                "{:<6}{:>5} {}{}{:<4}{}{:>4}{}   {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}",
                atom.record.tag(),
                atom.serial % 100_000,
                format_atom_name(&atom.name),
                atom.alt_loc,
                atom.res_name,
                atom.chain_id,
                atom.res_seq % 10_000,
                atom.i_code,
                atom.position.x,
                atom.position.y,
                atom.position.z,
                atom.occupancy,
                atom.b_factor,
                atom.element
            )?;
        }
        writeln!(writer, "TER")?;
        writeln!(writer, "END")?;
        Ok(())
    }
}

/// Copies only the ATOM and HETATM records of `input` into `output`.
///
/// With `append` the records are added to the end of an existing file, which is how a
/// protein and a ligand are concatenated into one complex.
///
/// # Return
///
/// The number of records copied.
pub fn make_clean_pdb(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    append: bool,
) -> Result<usize, PdbError> {
    let reader = BufReader::new(File::open(input)?);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(output)?;
    let mut writer = BufWriter::new(file);
    let mut copied = 0;
    for line in reader.lines() {
        let line = line?;
        if line.starts_with("ATOM") || line.starts_with("HETATM") {
            writeln!(writer, "{}", line)?;
            copied += 1;
        }
    }
    writer.flush()?;
    Ok(copied)
}
