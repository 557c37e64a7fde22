//! Reader and writer for GROMACS full-precision trajectories (`.trr`).
//!
//! Every frame starts with a header declaring the byte size of each optional block, so a
//! frame may carry any combination of box, positions, velocities and forces. The size
//! block also reveals whether reals are stored in single or double precision.

use super::xdr::{XdrError, XdrReader, XdrWriter};
use crate::core::models::frame::Frame;
use nalgebra::{Point3, Vector3};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

const TRR_MAGIC: i32 = 1993;
const TRR_VERSION: &str = "GMX_trn_file";
/// Length the header declares for the version string (C string length plus terminator).
const TRR_VERSION_DECLARED_LEN: i32 = 13;

const SINGLE: usize = 4;
const DOUBLE: usize = 8;

#[derive(Debug, Error)]
pub enum TrrError {
    #[error("XDR error: {0}")]
    Xdr(#[from] XdrError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bad TRR magic number: expected 1993, found {0}")]
    BadMagic(i32),
    #[error("Unsupported TRR version tag length {0}")]
    BadVersion(i32),
    #[error("Invalid size field '{field}': {value}")]
    InvalidSize { field: &'static str, value: i32 },
    #[error("Cannot determine real precision from the frame header")]
    UnknownPrecision,
    #[error("Atom count mismatch: expected {expected}, found {found}")]
    AtomCountMismatch { expected: usize, found: usize },
    #[error("Trajectory file is empty")]
    EmptyFile,
}

/// Decoded frame header.
#[derive(Debug, Clone, PartialEq)]
pub struct TrrHeader {
    pub ir_size: usize,
    pub e_size: usize,
    pub box_size: usize,
    pub vir_size: usize,
    pub pres_size: usize,
    pub top_size: usize,
    pub sym_size: usize,
    pub x_size: usize,
    pub v_size: usize,
    pub f_size: usize,
    pub natoms: usize,
    pub step: i32,
    pub nre: i32,
    pub time: f64,
    pub lambda: f64,
    pub double: bool,
}

impl TrrHeader {
    fn real_size(&self) -> usize {
        if self.double { DOUBLE } else { SINGLE }
    }
}

fn read_size<R: Read>(xdr: &mut XdrReader<R>, field: &'static str) -> Result<usize, TrrError> {
    let value = xdr.read_i32().map_err(XdrError::mid_record)?;
    usize::try_from(value).map_err(|_| TrrError::InvalidSize { field, value })
}

/// Infers the width of a real from whichever block is present.
fn infer_real_size(
    box_size: usize,
    x_size: usize,
    v_size: usize,
    f_size: usize,
    natoms: usize,
) -> Result<bool, TrrError> {
    let width = if box_size > 0 {
        box_size / 9
    } else if natoms > 0 && x_size > 0 {
        x_size / (natoms * 3)
    } else if natoms > 0 && v_size > 0 {
        v_size / (natoms * 3)
    } else if natoms > 0 && f_size > 0 {
        f_size / (natoms * 3)
    } else {
        return Err(TrrError::UnknownPrecision);
    };
    match width {
        SINGLE => Ok(false),
        DOUBLE => Ok(true),
        _ => Err(TrrError::UnknownPrecision),
    }
}

fn read_header<R: Read>(xdr: &mut XdrReader<R>) -> Result<Option<TrrHeader>, TrrError> {
    let magic = match xdr.read_i32() {
        Ok(m) => m,
        Err(e) if e.is_end_of_file() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if magic != TRR_MAGIC {
        return Err(TrrError::BadMagic(magic));
    }
    let declared = xdr.read_i32().map_err(XdrError::mid_record)?;
    if declared != TRR_VERSION_DECLARED_LEN {
        return Err(TrrError::BadVersion(declared));
    }
    let version = xdr.read_string().map_err(XdrError::mid_record)?;
    if version != TRR_VERSION {
        warn!(version = %version, "Unexpected TRR version tag");
    }

    let ir_size = read_size(xdr, "ir_size")?;
    let e_size = read_size(xdr, "e_size")?;
    let box_size = read_size(xdr, "box_size")?;
    let vir_size = read_size(xdr, "vir_size")?;
    let pres_size = read_size(xdr, "pres_size")?;
    let top_size = read_size(xdr, "top_size")?;
    let sym_size = read_size(xdr, "sym_size")?;
    let x_size = read_size(xdr, "x_size")?;
    let v_size = read_size(xdr, "v_size")?;
    let f_size = read_size(xdr, "f_size")?;
    let natoms = read_size(xdr, "natoms")?;
    let step = xdr.read_i32().map_err(XdrError::mid_record)?;
    let nre = xdr.read_i32().map_err(XdrError::mid_record)?;

    let double = infer_real_size(box_size, x_size, v_size, f_size, natoms)?;
    let (time, lambda) = if double {
        (
            xdr.read_f64().map_err(XdrError::mid_record)?,
            xdr.read_f64().map_err(XdrError::mid_record)?,
        )
    } else {
        (
            f64::from(xdr.read_f32().map_err(XdrError::mid_record)?),
            f64::from(xdr.read_f32().map_err(XdrError::mid_record)?),
        )
    };

    Ok(Some(TrrHeader {
        ir_size,
        e_size,
        box_size,
        vir_size,
        pres_size,
        top_size,
        sym_size,
        x_size,
        v_size,
        f_size,
        natoms,
        step,
        nre,
        time,
        lambda,
        double,
    }))
}

fn read_reals<R: Read>(
    xdr: &mut XdrReader<R>,
    count: usize,
    double: bool,
) -> Result<Vec<f32>, TrrError> {
    let values = if double {
        (0..count)
            .map(|_| xdr.read_f64().map(|v| v as f32))
            .collect::<Result<Vec<_>, _>>()
    } else {
        xdr.read_f32_array(count)
    };
    Ok(values.map_err(XdrError::mid_record)?)
}

fn read_block<R: Read>(
    xdr: &mut XdrReader<R>,
    header: &TrrHeader,
    size: usize,
    field: &'static str,
) -> Result<Option<Vec<f32>>, TrrError> {
    if size == 0 {
        return Ok(None);
    }
    let expected = header.natoms * 3 * header.real_size();
    if size != expected {
        return Err(TrrError::InvalidSize {
            field,
            value: size as i32,
        });
    }
    read_reals(xdr, header.natoms * 3, header.double).map(Some)
}

fn to_vectors(values: Vec<f32>) -> Vec<Vector3<f32>> {
    values
        .chunks_exact(3)
        .map(|c| Vector3::new(c[0], c[1], c[2]))
        .collect()
}

/// Reads the atom count from the first frame header of a TRR file.
pub fn read_natoms(path: impl AsRef<Path>) -> Result<usize, TrrError> {
    let mut xdr = XdrReader::new(BufReader::new(File::open(path)?));
    match read_header(&mut xdr)? {
        Some(header) => Ok(header.natoms),
        None => Err(TrrError::EmptyFile),
    }
}

/// Iterates the frames of a TRR stream.
pub struct TrrReader<R> {
    xdr: XdrReader<R>,
    natoms: Option<usize>,
    finished: bool,
}

impl TrrReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrrError> {
        let path = path.as_ref();
        let natoms = read_natoms(path)?;
        debug!(path = %path.display(), natoms, "Opened TRR trajectory");
        let mut reader = Self::new(BufReader::new(File::open(path)?));
        reader.natoms = Some(natoms);
        Ok(reader)
    }
}

impl<R: Read> TrrReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            xdr: XdrReader::new(reader),
            natoms: None,
            finished: false,
        }
    }

    /// Atom count of the stream, known once the first header has been read.
    pub fn natoms(&self) -> Option<usize> {
        self.natoms
    }

    /// Reads the next frame header and data, or `None` at a clean end of file.
    pub fn read_frame_with_header(&mut self) -> Result<Option<(TrrHeader, Frame)>, TrrError> {
        let Some(header) = read_header(&mut self.xdr)? else {
            return Ok(None);
        };
        match self.natoms {
            Some(expected) if expected != header.natoms => {
                return Err(TrrError::AtomCountMismatch {
                    expected,
                    found: header.natoms,
                });
            }
            None => self.natoms = Some(header.natoms),
            _ => {}
        }

        let mut frame = Frame::without_positions(header.natoms);
        frame.step = header.step;
        frame.time = header.time as f32;
        frame.lambda = header.lambda as f32;

        if header.box_size > 0 {
            let values = read_reals(&mut self.xdr, 9, header.double)?;
            frame.set_box_row_major(&values);
        }
        // Virial and pressure tensors are not part of the frame model.
        for size in [header.vir_size, header.pres_size] {
            if size > 0 {
                read_reals(&mut self.xdr, 9, header.double)?;
            }
        }
        if let Some(x) = read_block(&mut self.xdr, &header, header.x_size, "x_size")? {
            frame.positions = x
                .chunks_exact(3)
                .map(|c| Point3::new(c[0], c[1], c[2]))
                .collect();
        }
        frame.velocities =
            read_block(&mut self.xdr, &header, header.v_size, "v_size")?.map(to_vectors);
        frame.forces = read_block(&mut self.xdr, &header, header.f_size, "f_size")?.map(to_vectors);
        Ok(Some((header, frame)))
    }

    pub fn read_frame(&mut self) -> Result<Option<Frame>, TrrError> {
        Ok(self.read_frame_with_header()?.map(|(_, frame)| frame))
    }
}

impl<R: Read> Iterator for TrrReader<R> {
    type Item = Result<Frame, TrrError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.read_frame().transpose();
        if !matches!(result, Some(Ok(_))) {
            self.finished = true;
        }
        result
    }
}

/// Writes single-precision TRR frames.
pub struct TrrWriter<W: Write> {
    xdr: XdrWriter<W>,
    natoms: usize,
}

impl TrrWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, natoms: usize) -> Result<Self, TrrError> {
        Ok(Self::new(BufWriter::new(File::create(path)?), natoms))
    }
}

impl<W: Write> TrrWriter<W> {
    pub fn new(writer: W, natoms: usize) -> Self {
        Self {
            xdr: XdrWriter::new(writer),
            natoms,
        }
    }

    pub fn natoms(&self) -> usize {
        self.natoms
    }

    fn check_len(&self, len: usize) -> Result<(), TrrError> {
        if len != self.natoms {
            return Err(TrrError::AtomCountMismatch {
                expected: self.natoms,
                found: len,
            });
        }
        Ok(())
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), TrrError> {
        let has_x = !frame.positions.is_empty();
        if has_x {
            self.check_len(frame.positions.len())?;
        }
        if let Some(v) = &frame.velocities {
            self.check_len(v.len())?;
        }
        if let Some(f) = &frame.forces {
            self.check_len(f.len())?;
        }
        let block = (self.natoms * 3 * SINGLE) as i32;
        let size_of = |present: bool| if present { block } else { 0 };

        self.xdr.write_i32(TRR_MAGIC)?;
        self.xdr.write_i32(TRR_VERSION_DECLARED_LEN)?;
        self.xdr.write_string(TRR_VERSION)?;
        for size in [
            0,
            0,
            (9 * SINGLE) as i32,
            0,
            0,
            0,
            0,
            size_of(has_x),
            size_of(frame.velocities.is_some()),
            size_of(frame.forces.is_some()),
        ] {
            self.xdr.write_i32(size)?;
        }
        self.xdr.write_i32(self.natoms as i32)?;
        self.xdr.write_i32(frame.step)?;
        self.xdr.write_i32(0)?;
        self.xdr.write_f32(frame.time)?;
        self.xdr.write_f32(frame.lambda)?;

        self.xdr.write_f32_array(&frame.box_row_major())?;
        for p in &frame.positions {
            self.xdr.write_f32_array(&[p.x, p.y, p.z])?;
        }
        for vectors in [&frame.velocities, &frame.forces].into_iter().flatten() {
            for v in vectors {
                self.xdr.write_f32_array(&[v.x, v.y, v.z])?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), TrrError> {
        self.xdr.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.xdr.into_inner()
    }
}
