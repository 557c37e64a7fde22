//! External Data Representation (XDR, RFC 4506) primitives.
//!
//! Both GROMACS trajectory formats are plain sequences of XDR items: big-endian 32-bit
//! integers and floats, 64-bit doubles, and opaque byte blocks padded to a multiple of
//! four bytes.

use std::io::{self, Read, Write};
use thiserror::Error;

const XDR_ALIGNMENT: usize = 4;

#[derive(Debug, Error)]
pub enum XdrError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The stream ended exactly at an item boundary.
    #[error("End of file")]
    EndOfFile,
    #[error("Unexpected end of data: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("Invalid length field: {0}")]
    InvalidLength(i64),
    #[error("String is not valid UTF-8")]
    InvalidString,
}

impl XdrError {
    /// Reinterprets a clean end of file as truncation.
    ///
    /// Frame readers accept the end of the stream only before the first item of a frame;
    /// anywhere else it means the file was cut short.
    pub fn mid_record(self) -> Self {
        match self {
            XdrError::EndOfFile => XdrError::Truncated {
                expected: XDR_ALIGNMENT,
                got: 0,
            },
            other => other,
        }
    }

    pub fn is_end_of_file(&self) -> bool {
        matches!(self, XdrError::EndOfFile)
    }
}

fn padding_for(len: usize) -> usize {
    (XDR_ALIGNMENT - len % XDR_ALIGNMENT) % XDR_ALIGNMENT
}

/// Reads XDR items from an underlying byte stream.
pub struct XdrReader<R> {
    inner: R,
}

impl<R: Read> XdrReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), XdrError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Err(XdrError::EndOfFile),
                Ok(0) => {
                    return Err(XdrError::Truncated {
                        expected: buf.len(),
                        got: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn read_word(&mut self) -> Result<[u8; 4], XdrError> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    pub fn read_i32(&mut self) -> Result<i32, XdrError> {
        Ok(i32::from_be_bytes(self.read_word()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, XdrError> {
        Ok(u32::from_be_bytes(self.read_word()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, XdrError> {
        Ok(f32::from_be_bytes(self.read_word()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, XdrError> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(f64::from_be_bytes(buf))
    }

    /// Reads a fixed-length array of floats.
    pub fn read_f32_array(&mut self, len: usize) -> Result<Vec<f32>, XdrError> {
        (0..len).map(|_| self.read_f32()).collect()
    }

    /// Reads `len` opaque bytes followed by their alignment padding.
    pub fn read_opaque(&mut self, len: usize) -> Result<Vec<u8>, XdrError> {
        let mut data = vec![0u8; len];
        if len > 0 {
            self.fill(&mut data)?;
        }
        let pad = padding_for(len);
        if pad > 0 {
            let mut scratch = [0u8; XDR_ALIGNMENT];
            self.fill(&mut scratch[..pad])?;
        }
        Ok(data)
    }

    /// Skips `len` bytes of payload without interpreting them.
    pub fn skip(&mut self, len: usize) -> Result<(), XdrError> {
        let mut scratch = [0u8; 256];
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(scratch.len());
            self.fill(&mut scratch[..chunk])?;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Reads a length-prefixed string.
    pub fn read_string(&mut self) -> Result<String, XdrError> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_opaque(len)?;
        String::from_utf8(bytes).map_err(|_| XdrError::InvalidString)
    }
}

/// Writes XDR items to an underlying byte stream.
pub struct XdrWriter<W> {
    inner: W,
}

impl<W: Write> XdrWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), XdrError> {
        self.inner.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), XdrError> {
        self.inner.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), XdrError> {
        self.inner.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), XdrError> {
        self.inner.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    pub fn write_f32_array(&mut self, values: &[f32]) -> Result<(), XdrError> {
        for &v in values {
            self.write_f32(v)?;
        }
        Ok(())
    }

    /// Writes opaque bytes followed by zero padding to the next word boundary.
    pub fn write_opaque(&mut self, data: &[u8]) -> Result<(), XdrError> {
        self.inner.write_all(data)?;
        let pad = padding_for(data.len());
        if pad > 0 {
            self.inner.write_all(&[0u8; XDR_ALIGNMENT][..pad])?;
        }
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), XdrError> {
        let len = u32::try_from(value.len())
            .map_err(|_| XdrError::InvalidLength(value.len() as i64))?;
        self.write_u32(len)?;
        self.write_opaque(value.as_bytes())
    }

    pub fn flush(&mut self) -> Result<(), XdrError> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn integers_are_written_big_endian() {
        let mut writer = XdrWriter::new(Vec::new());
        writer.write_i32(1995).unwrap();
        assert_eq!(writer.into_inner(), vec![0x00, 0x00, 0x07, 0xCB]);
    }

    #[test]
    fn opaque_data_is_padded_to_word_boundary() {
        let mut writer = XdrWriter::new(Vec::new());
        writer.write_opaque(&[1, 2, 3, 4, 5]).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[5..], &[0, 0, 0]);

        let mut reader = XdrReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_opaque(5).unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(reader.read_i32().unwrap_err().is_end_of_file());
    }

    #[test]
    fn string_layout_matches_trr_version_tag() {
        let mut writer = XdrWriter::new(Vec::new());
        writer.write_string("GMX_trn_file").unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..4], &[0, 0, 0, 12]);

        let mut reader = XdrReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_string().unwrap(), "GMX_trn_file");
    }

    #[test]
    fn empty_stream_reports_end_of_file() {
        let mut reader = XdrReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(reader.read_f32(), Err(XdrError::EndOfFile)));
    }

    #[test]
    fn partial_word_reports_truncation() {
        let mut reader = XdrReader::new(Cursor::new(vec![0u8, 1]));
        assert!(matches!(
            reader.read_i32(),
            Err(XdrError::Truncated {
                expected: 4,
                got: 2
            })
        ));
    }

    #[test]
    fn mid_record_converts_only_end_of_file() {
        assert!(matches!(
            XdrError::EndOfFile.mid_record(),
            XdrError::Truncated { .. }
        ));
        assert!(matches!(
            XdrError::InvalidString.mid_record(),
            XdrError::InvalidString
        ));
    }

    #[test]
    fn doubles_and_skip_round_through_the_stream() {
        let mut writer = XdrWriter::new(Vec::new());
        writer.write_f64(2.5).unwrap();
        writer.write_f32_array(&[1.0, 2.0, 3.0]).unwrap();
        writer.write_i32(-7).unwrap();
        let mut reader = XdrReader::new(Cursor::new(writer.into_inner()));
        assert_eq!(reader.read_f64().unwrap(), 2.5);
        reader.skip(12).unwrap();
        assert_eq!(reader.read_i32().unwrap(), -7);
    }
}
