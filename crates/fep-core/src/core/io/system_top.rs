use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// A `topol.top` that assembles a simulation system from include files.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemTopology {
    pub forcefield: String,
    pub includes: Vec<PathBuf>,
    pub water_model: String,
    pub system_name: String,
    pub molecules: Vec<(String, usize)>,
}

impl SystemTopology {
    pub fn new(forcefield: &str, water_model: &str, system_name: &str) -> Self {
        Self {
            forcefield: forcefield.to_string(),
            includes: Vec::new(),
            water_model: water_model.to_string(),
            system_name: system_name.to_string(),
            molecules: Vec::new(),
        }
    }

    pub fn include(mut self, path: impl Into<PathBuf>) -> Self {
        self.includes.push(path.into());
        self
    }

    pub fn molecule(mut self, name: &str, count: usize) -> Self {
        self.molecules.push((name.to_string(), count));
        self
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writeln!(writer, "#include \"{}/forcefield.itp\"", self.forcefield)?;
        for include in &self.includes {
            writeln!(writer, "#include \"{}\"", include.display())?;
        }
        writeln!(
            writer,
            "#include \"{}/{}.itp\"",
            self.forcefield, self.water_model
        )?;
        writeln!(writer, "#include \"{}/ions.itp\"", self.forcefield)?;
        writeln!(writer)?;
        writeln!(writer, "[ system ]")?;
        writeln!(writer, "{}", self.system_name)?;
        writeln!(writer)?;
        writeln!(writer, "[ molecules ]")?;
        for (name, count) in &self.molecules {
            writeln!(writer, "{} {}", name, count)?;
        }
        Ok(())
    }

    pub fn write_to_path(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()
    }
}
