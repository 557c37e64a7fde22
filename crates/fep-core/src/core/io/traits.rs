use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing text model formats.
///
/// Implementors parse a complete model from a buffered reader and serialize it back.
/// Path-based helpers handle opening, buffering and flushing.
pub trait ModelFile {
    /// The in-memory model the format describes.
    type Model;

    /// The error type for I/O and parsing failures.
    type Error: Error + From<io::Error>;

    /// Reads a model from a buffered reader.
    ///
    /// # Arguments
    ///
    /// * `reader` - The buffered reader to read from.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or I/O operations encounter issues.
    fn read_from(reader: &mut impl BufRead) -> Result<Self::Model, Self::Error>;

    /// Writes a model to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_to(model: &Self::Model, writer: &mut impl Write) -> Result<(), Self::Error>;

    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self::Model, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    fn read_from_str(text: &str) -> Result<Self::Model, Self::Error> {
        let mut reader = text.as_bytes();
        Self::read_from(&mut reader)
    }

    fn write_to_path<P: AsRef<Path>>(model: &Self::Model, path: P) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(model, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn write_to_string(model: &Self::Model) -> Result<String, Self::Error> {
        let mut buffer = Vec::new();
        Self::write_to(model, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
