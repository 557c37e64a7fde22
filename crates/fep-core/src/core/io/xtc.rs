//! Reader and writer for GROMACS compressed coordinate trajectories (`.xtc`).
//!
//! Coordinates are scaled by the frame precision, rounded to integers and bit-packed
//! relative to the per-frame minimum. Consecutive atoms that lie close together (the atoms
//! of a water molecule, typically) are encoded as small displacements from their
//! predecessor, with run lengths of up to eight atoms.

use super::xdr::{XdrError, XdrReader, XdrWriter};
use crate::core::models::frame::{DEFAULT_XTC_PRECISION, Frame};
use nalgebra::Point3;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

const XTC_MAGIC: i32 = 1995;

/// Frames with this many atoms or fewer are stored uncompressed.
const MAX_UNCOMPRESSED_ATOMS: usize = 9;

const MAGICINTS: [u32; 73] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 8, 10, 12, 16, 20, 25, 32, 40, 50, 64, 80, 101, 128, 161, 203,
    256, 322, 406, 512, 645, 812, 1024, 1290, 1625, 2048, 2580, 3250, 4096, 5060, 6501, 8192,
    10321, 13003, 16384, 20642, 26007, 32768, 41285, 52015, 65536, 82570, 104031, 131072,
    165140, 208063, 262144, 330280, 416127, 524287, 660561, 832255, 1048576, 1321122, 1664510,
    2097152, 2642245, 3329021, 4194304, 5284491, 6658042, 8388607, 10568983, 13316085,
    16777216,
];

const FIRSTIDX: usize = 9;
const LASTIDX: usize = MAGICINTS.len() - 1;

/// Largest coordinate magnitude (in scaled integer units) the format can represent.
const MAX_ABS_INT: f32 = (i32::MAX - 2) as f32;

/// Upper bound on atoms in one small-displacement run (three integers each).
const MAX_RUN_INTS: usize = 24;

#[derive(Debug, Error)]
pub enum XtcError {
    #[error("XDR error: {0}")]
    Xdr(#[from] XdrError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bad XTC magic number: expected 1995, found {0}")]
    BadMagic(i32),
    #[error("Atom count mismatch: expected {expected}, found {found}")]
    AtomCountMismatch { expected: usize, found: usize },
    #[error("Invalid atom count: {0}")]
    InvalidAtomCount(i32),
    #[error("Invalid precision: {0}")]
    InvalidPrecision(f32),
    #[error("Coordinate {value} of atom {atom} is too large for precision {precision}")]
    CoordinateOverflow {
        atom: usize,
        value: f32,
        precision: f32,
    },
    #[error("Corrupt compressed payload: {0}")]
    CorruptPayload(&'static str),
    #[error("Trajectory file is empty")]
    EmptyFile,
}

/// Accumulates bits most-significant first into a byte buffer.
struct BitWriter {
    bytes: Vec<u8>,
    last_bits: u32,
    last_byte: u32,
}

impl BitWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            last_bits: 0,
            last_byte: 0,
        }
    }

    fn send_bits(&mut self, mut nbits: u32, num: u32) {
        while nbits >= 8 {
            self.last_byte = (self.last_byte << 8) | ((num >> (nbits - 8)) & 0xff);
            self.bytes.push((self.last_byte >> self.last_bits) as u8);
            nbits -= 8;
        }
        if nbits > 0 {
            self.last_byte = (self.last_byte << nbits) | (num & ((1u32 << nbits) - 1));
            self.last_bits += nbits;
            if self.last_bits >= 8 {
                self.last_bits -= 8;
                self.bytes.push((self.last_byte >> self.last_bits) as u8);
            }
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.last_bits > 0 {
            self.bytes
                .push((self.last_byte << (8 - self.last_bits)) as u8);
        }
        self.bytes
    }
}

/// Reads bits most-significant first from a byte slice.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    last_bits: u32,
    last_byte: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            last_bits: 0,
            last_byte: 0,
        }
    }

    fn next_byte(&mut self) -> Result<u32, XtcError> {
        let byte = self
            .data
            .get(self.pos)
            .ok_or(XtcError::CorruptPayload("bit stream exhausted"))?;
        self.pos += 1;
        Ok(u32::from(*byte))
    }

    fn receive_bits(&mut self, mut nbits: u32) -> Result<u32, XtcError> {
        let mask = if nbits >= 32 {
            u32::MAX
        } else {
            (1u32 << nbits) - 1
        };
        let mut num: u32 = 0;
        while nbits >= 8 {
            self.last_byte = (self.last_byte << 8) | self.next_byte()?;
            num |= (self.last_byte >> self.last_bits) << (nbits - 8);
            nbits -= 8;
        }
        if nbits > 0 {
            if self.last_bits < nbits {
                self.last_bits += 8;
                self.last_byte = (self.last_byte << 8) | self.next_byte()?;
            }
            self.last_bits -= nbits;
            num |= (self.last_byte >> self.last_bits) & ((1u32 << nbits) - 1);
        }
        Ok(num & mask)
    }
}

/// Number of bits needed to store integers in `0..size`.
fn sizeofint(size: u32) -> u32 {
    let mut num: u64 = 1;
    let mut bits = 0;
    while u64::from(size) >= num && bits < 32 {
        bits += 1;
        num <<= 1;
    }
    bits
}

/// Number of bits needed to store a triple of integers with the given ranges as a single
/// mixed-radix number.
fn sizeofints(sizes: &[u32; 3]) -> u32 {
    let mut bytes = [0u32; 32];
    bytes[0] = 1;
    let mut nbytes = 1usize;
    for &size in sizes {
        let mut tmp: u64 = 0;
        let mut bytecnt = 0;
        while bytecnt < nbytes {
            tmp += u64::from(bytes[bytecnt]) * u64::from(size);
            bytes[bytecnt] = (tmp & 0xff) as u32;
            tmp >>= 8;
            bytecnt += 1;
        }
        while tmp != 0 {
            bytes[bytecnt] = (tmp & 0xff) as u32;
            bytecnt += 1;
            tmp >>= 8;
        }
        nbytes = bytecnt;
    }
    let top = bytes[nbytes - 1];
    let mut num = 1u32;
    let mut bits = 0;
    while top >= num {
        bits += 1;
        num *= 2;
    }
    bits + (nbytes as u32 - 1) * 8
}

fn send_ints(
    out: &mut BitWriter,
    nbits: u32,
    sizes: &[u32; 3],
    nums: &[u32; 3],
) -> Result<(), XtcError> {
    if nums.iter().zip(sizes).any(|(n, s)| n >= s) {
        return Err(XtcError::CorruptPayload("integer exceeds its range"));
    }
    let mut bytes = [0u32; 32];
    let mut nbytes = 0usize;
    let mut tmp = u64::from(nums[0]);
    loop {
        bytes[nbytes] = (tmp & 0xff) as u32;
        nbytes += 1;
        tmp >>= 8;
        if tmp == 0 {
            break;
        }
    }
    for i in 1..3 {
        tmp = u64::from(nums[i]);
        let mut bytecnt = 0;
        while bytecnt < nbytes {
            tmp += u64::from(bytes[bytecnt]) * u64::from(sizes[i]);
            bytes[bytecnt] = (tmp & 0xff) as u32;
            tmp >>= 8;
            bytecnt += 1;
        }
        while tmp != 0 {
            bytes[bytecnt] = (tmp & 0xff) as u32;
            bytecnt += 1;
            tmp >>= 8;
        }
        nbytes = bytecnt;
    }
    let full = nbytes as u32 * 8;
    if nbits >= full {
        for &b in &bytes[..nbytes] {
            out.send_bits(8, b);
        }
        out.send_bits(nbits - full, 0);
    } else {
        for &b in &bytes[..nbytes - 1] {
            out.send_bits(8, b);
        }
        out.send_bits(nbits - (nbytes as u32 - 1) * 8, bytes[nbytes - 1]);
    }
    Ok(())
}

fn receive_ints(input: &mut BitReader, nbits: u32, sizes: &[u32; 3]) -> Result<[u32; 3], XtcError> {
    let mut bytes = [0u32; 32];
    let mut nbytes = 0usize;
    let mut bits = nbits;
    while bits > 8 {
        if nbytes >= bytes.len() {
            return Err(XtcError::CorruptPayload("integer triple too wide"));
        }
        bytes[nbytes] = input.receive_bits(8)?;
        nbytes += 1;
        bits -= 8;
    }
    if bits > 0 {
        bytes[nbytes] = input.receive_bits(bits)?;
        nbytes += 1;
    }
    let mut nums = [0u32; 3];
    for i in (1..3).rev() {
        let size = u64::from(sizes[i]);
        let mut num: u64 = 0;
        for j in (0..nbytes).rev() {
            num = (num << 8) | u64::from(bytes[j]);
            let quotient = num / size;
            bytes[j] = quotient as u32;
            num -= quotient * size;
        }
        nums[i] = num as u32;
    }
    nums[0] = bytes[0] | (bytes[1] << 8) | (bytes[2] << 16) | (bytes[3] << 24);
    Ok(nums)
}

fn half_magic(idx: usize) -> i32 {
    (MAGICINTS[idx] / 2) as i32
}

fn within(a: &[i32; 3], b: &[i32; 3], limit: i32) -> bool {
    (0..3).all(|d| (i64::from(a[d]) - i64::from(b[d])).abs() < i64::from(limit))
}

fn squared_distance(a: &[i32; 3], b: &[i32; 3]) -> i64 {
    (0..3)
        .map(|d| {
            let diff = i64::from(a[d]) - i64::from(b[d]);
            diff * diff
        })
        .sum()
}

/// Ranges of the three coordinates and how many bits encode them.
struct IntRanges {
    sizes: [u32; 3],
    bitsizes: [u32; 3],
    /// Bits for the combined triple, or zero when each coordinate is sent separately.
    bitsize: u32,
}

impl IntRanges {
    fn new(minint: &[i32; 3], maxint: &[i32; 3]) -> Result<Self, XtcError> {
        let mut sizes = [0u32; 3];
        for d in 0..3 {
            let span = i64::from(maxint[d]) - i64::from(minint[d]) + 1;
            sizes[d] = u32::try_from(span)
                .ok()
                .filter(|&s| s > 0)
                .ok_or(XtcError::CorruptPayload("coordinate range out of bounds"))?;
        }
        let (bitsizes, bitsize) = if sizes.iter().any(|&s| s > 0xff_ffff) {
            (sizes.map(sizeofint), 0)
        } else {
            ([0; 3], sizeofints(&sizes))
        };
        Ok(Self {
            sizes,
            bitsizes,
            bitsize,
        })
    }

    fn send(&self, out: &mut BitWriter, nums: &[u32; 3]) -> Result<(), XtcError> {
        if self.bitsize == 0 {
            for d in 0..3 {
                out.send_bits(self.bitsizes[d], nums[d]);
            }
            Ok(())
        } else {
            send_ints(out, self.bitsize, &self.sizes, nums)
        }
    }

    fn receive(&self, input: &mut BitReader) -> Result<[u32; 3], XtcError> {
        if self.bitsize == 0 {
            Ok([
                input.receive_bits(self.bitsizes[0])?,
                input.receive_bits(self.bitsizes[1])?,
                input.receive_bits(self.bitsizes[2])?,
            ])
        } else {
            receive_ints(input, self.bitsize, &self.sizes)
        }
    }
}

fn compress_coordinates<W: Write>(
    xdr: &mut XdrWriter<W>,
    positions: &[Point3<f32>],
    precision: f32,
) -> Result<(), XtcError> {
    let natoms = positions.len();
    xdr.write_i32(natoms as i32)?;
    if natoms <= MAX_UNCOMPRESSED_ATOMS {
        for p in positions {
            xdr.write_f32_array(&[p.x, p.y, p.z])?;
        }
        return Ok(());
    }
    if !(precision > 0.0) || !precision.is_finite() {
        return Err(XtcError::InvalidPrecision(precision));
    }
    xdr.write_f32(precision)?;

    let mut ints: Vec<[i32; 3]> = Vec::with_capacity(natoms);
    let mut minint = [i32::MAX; 3];
    let mut maxint = [i32::MIN; 3];
    let mut mindiff = i64::from(i32::MAX);
    let mut oldlint = [0i32; 3];
    for (atom, p) in positions.iter().enumerate() {
        let mut lint = [0i32; 3];
        for d in 0..3 {
            let scaled = if p[d] >= 0.0 {
                p[d] * precision + 0.5
            } else {
                p[d] * precision - 0.5
            };
            if !scaled.is_finite() || scaled.abs() > MAX_ABS_INT {
                return Err(XtcError::CoordinateOverflow {
                    atom,
                    value: p[d],
                    precision,
                });
            }
            lint[d] = scaled as i32;
            minint[d] = minint[d].min(lint[d]);
            maxint[d] = maxint[d].max(lint[d]);
        }
        let diff: i64 = (0..3)
            .map(|d| (i64::from(oldlint[d]) - i64::from(lint[d])).abs())
            .sum();
        if atom > 0 && diff < mindiff {
            mindiff = diff;
        }
        oldlint = lint;
        ints.push(lint);
    }
    for &v in minint.iter().chain(maxint.iter()) {
        xdr.write_i32(v)?;
    }
    for d in 0..3 {
        if (i64::from(maxint[d]) - i64::from(minint[d])) as f32 >= MAX_ABS_INT {
            return Err(XtcError::CoordinateOverflow {
                atom: 0,
                value: maxint[d] as f32 / precision,
                precision,
            });
        }
    }
    let ranges = IntRanges::new(&minint, &maxint)?;

    let mut smallidx = FIRSTIDX;
    while smallidx < LASTIDX && i64::from(MAGICINTS[smallidx]) < mindiff {
        smallidx += 1;
    }
    xdr.write_i32(smallidx as i32)?;

    let maxidx = LASTIDX.min(smallidx + 8);
    let minidx = maxidx - 8;
    let mut smaller = half_magic(FIRSTIDX.max(smallidx - 1));
    let mut smallnum = half_magic(smallidx);
    let mut sizesmall = [MAGICINTS[smallidx]; 3];
    let larger = half_magic(maxidx);

    let mut out = BitWriter::with_capacity(natoms * 4);
    let mut prevcoord = [0i32; 3];
    let mut prevrun: i32 = -1;
    let mut i = 0usize;
    while i < natoms {
        let mut is_small = false;
        let mut is_smaller: i32 = if smallidx < maxidx && i >= 1 && within(&ints[i], &prevcoord, larger)
        {
            1
        } else if smallidx > minidx {
            -1
        } else {
            0
        };
        if i + 1 < natoms && within(&ints[i], &ints[i + 1], smallnum) {
            ints.swap(i, i + 1);
            is_small = true;
        }
        let this = ints[i];
        let shifted = [0, 1, 2].map(|d| (i64::from(this[d]) - i64::from(minint[d])) as u32);
        ranges.send(&mut out, &shifted)?;
        prevcoord = this;
        i += 1;

        let mut run = 0usize;
        let mut tmpcoord = [0u32; MAX_RUN_INTS];
        if !is_small && is_smaller == -1 {
            is_smaller = 0;
        }
        while is_small && run < MAX_RUN_INTS {
            let this = ints[i];
            if is_smaller == -1
                && squared_distance(&this, &prevcoord) >= i64::from(smaller) * i64::from(smaller)
            {
                is_smaller = 0;
            }
            for d in 0..3 {
                tmpcoord[run] =
                    (i64::from(this[d]) - i64::from(prevcoord[d]) + i64::from(smallnum)) as u32;
                run += 1;
            }
            prevcoord = this;
            i += 1;
            is_small = i < natoms && within(&ints[i], &prevcoord, smallnum);
        }
        if run as i32 != prevrun || is_smaller != 0 {
            prevrun = run as i32;
            out.send_bits(1, 1);
            out.send_bits(5, (run as i32 + is_smaller + 1) as u32);
        } else {
            out.send_bits(1, 0);
        }
        for k in (0..run).step_by(3) {
            send_ints(
                &mut out,
                smallidx as u32,
                &sizesmall,
                &[tmpcoord[k], tmpcoord[k + 1], tmpcoord[k + 2]],
            )?;
        }
        if is_smaller != 0 {
            smallidx = (smallidx as i32 + is_smaller) as usize;
            if is_smaller < 0 {
                smallnum = smaller;
                smaller = half_magic(smallidx - 1);
            } else {
                smaller = smallnum;
                smallnum = half_magic(smallidx);
            }
            sizesmall = [MAGICINTS[smallidx]; 3];
        }
    }

    let bytes = out.finish();
    xdr.write_i32(bytes.len() as i32)?;
    xdr.write_opaque(&bytes)?;
    Ok(())
}

fn checked_small_index(value: i64) -> Result<usize, XtcError> {
    usize::try_from(value)
        .ok()
        .filter(|idx| (FIRSTIDX..=LASTIDX).contains(idx))
        .ok_or(XtcError::CorruptPayload("small index outside the magic table"))
}

fn decompress_coordinates<R: Read>(
    xdr: &mut XdrReader<R>,
    natoms: usize,
) -> Result<(Vec<Point3<f32>>, f32), XtcError> {
    let lsize = xdr.read_i32()?;
    if lsize < 0 || lsize as usize != natoms {
        return Err(XtcError::AtomCountMismatch {
            expected: natoms,
            found: lsize.max(0) as usize,
        });
    }
    if natoms <= MAX_UNCOMPRESSED_ATOMS {
        let raw = xdr.read_f32_array(natoms * 3)?;
        let positions = raw
            .chunks_exact(3)
            .map(|c| Point3::new(c[0], c[1], c[2]))
            .collect();
        return Ok((positions, DEFAULT_XTC_PRECISION));
    }
    let precision = xdr.read_f32()?;
    if !(precision > 0.0) || !precision.is_finite() {
        return Err(XtcError::InvalidPrecision(precision));
    }
    let mut minint = [0i32; 3];
    let mut maxint = [0i32; 3];
    for v in minint.iter_mut().chain(maxint.iter_mut()) {
        *v = xdr.read_i32()?;
    }
    let ranges = IntRanges::new(&minint, &maxint)?;
    let mut smallidx = checked_small_index(i64::from(xdr.read_i32()?))?;
    let mut smaller = half_magic(FIRSTIDX.max(smallidx - 1));
    let mut smallnum = half_magic(smallidx);
    let mut sizesmall = [MAGICINTS[smallidx]; 3];

    let byte_count = xdr.read_i32()?;
    let byte_count = usize::try_from(byte_count)
        .map_err(|_| XtcError::CorruptPayload("negative payload length"))?;
    let payload = xdr.read_opaque(byte_count)?;
    let mut input = BitReader::new(&payload);

    let inv_precision = 1.0 / precision;
    let to_point = |c: &[i32; 3]| {
        Point3::new(
            c[0] as f32 * inv_precision,
            c[1] as f32 * inv_precision,
            c[2] as f32 * inv_precision,
        )
    };
    let mut positions = Vec::with_capacity(natoms);
    let mut run: i32 = 0;
    let mut i = 0usize;
    while i < natoms {
        let raw = ranges.receive(&mut input)?;
        let thiscoord = [0, 1, 2].map(|d| (i64::from(raw[d]) + i64::from(minint[d])) as i32);
        i += 1;
        let mut prevcoord = thiscoord;

        let mut is_smaller: i32 = 0;
        if input.receive_bits(1)? == 1 {
            run = input.receive_bits(5)? as i32;
            is_smaller = run % 3;
            run -= is_smaller;
            is_smaller -= 1;
        }
        if run > 0 {
            if i + (run / 3) as usize > natoms {
                return Err(XtcError::CorruptPayload("run extends past the last atom"));
            }
            for k in (0..run).step_by(3) {
                let small = receive_ints(&mut input, smallidx as u32, &sizesmall)?;
                i += 1;
                let mut coord = [0, 1, 2].map(|d| {
                    (i64::from(small[d]) + i64::from(prevcoord[d]) - i64::from(smallnum)) as i32
                });
                if k == 0 {
                    // Water: the first atom was sent after its neighbour.
                    std::mem::swap(&mut coord, &mut prevcoord);
                    positions.push(to_point(&prevcoord));
                } else {
                    prevcoord = coord;
                }
                positions.push(to_point(&coord));
            }
        } else {
            positions.push(to_point(&thiscoord));
        }

        smallidx = checked_small_index(smallidx as i64 + i64::from(is_smaller))?;
        if is_smaller < 0 {
            smallnum = smaller;
            smaller = if smallidx > FIRSTIDX {
                half_magic(smallidx - 1)
            } else {
                0
            };
        } else if is_smaller > 0 {
            smaller = smallnum;
            smallnum = half_magic(smallidx);
        }
        sizesmall = [MAGICINTS[smallidx]; 3];
    }
    Ok((positions, precision))
}

fn read_header<R: Read>(xdr: &mut XdrReader<R>) -> Result<Option<(usize, i32, f32)>, XtcError> {
    let magic = match xdr.read_i32() {
        Ok(m) => m,
        Err(e) if e.is_end_of_file() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if magic != XTC_MAGIC {
        return Err(XtcError::BadMagic(magic));
    }
    let natoms = xdr.read_i32().map_err(XdrError::mid_record)?;
    let natoms = usize::try_from(natoms).map_err(|_| XtcError::InvalidAtomCount(natoms))?;
    let step = xdr.read_i32().map_err(XdrError::mid_record)?;
    let time = xdr.read_f32().map_err(XdrError::mid_record)?;
    Ok(Some((natoms, step, time)))
}

/// Reads the atom count from the first frame header of an XTC file.
pub fn read_natoms(path: impl AsRef<Path>) -> Result<usize, XtcError> {
    let mut xdr = XdrReader::new(BufReader::new(File::open(path)?));
    match read_header(&mut xdr)? {
        Some((natoms, _, _)) => Ok(natoms),
        None => Err(XtcError::EmptyFile),
    }
}

/// Iterates the frames of an XTC stream.
pub struct XtcReader<R> {
    xdr: XdrReader<R>,
    natoms: usize,
    finished: bool,
}

impl XtcReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, XtcError> {
        let path = path.as_ref();
        let natoms = read_natoms(path)?;
        debug!(path = %path.display(), natoms, "Opened XTC trajectory");
        Ok(Self::new(BufReader::new(File::open(path)?), natoms))
    }
}

impl<R: Read> XtcReader<R> {
    /// Wraps a stream whose frames are expected to hold `natoms` atoms.
    pub fn new(reader: R, natoms: usize) -> Self {
        Self {
            xdr: XdrReader::new(reader),
            natoms,
            finished: false,
        }
    }

    pub fn natoms(&self) -> usize {
        self.natoms
    }

    /// Reads the next frame, or `None` at a clean end of file.
    pub fn read_frame(&mut self) -> Result<Option<Frame>, XtcError> {
        let Some((natoms, step, time)) = read_header(&mut self.xdr)? else {
            return Ok(None);
        };
        if natoms != self.natoms {
            return Err(XtcError::AtomCountMismatch {
                expected: self.natoms,
                found: natoms,
            });
        }
        let box_values = self.xdr.read_f32_array(9).map_err(XdrError::mid_record)?;
        let (positions, precision) =
            decompress_coordinates(&mut self.xdr, natoms).map_err(|e| match e {
                XtcError::Xdr(x) => XtcError::Xdr(x.mid_record()),
                other => other,
            })?;
        let mut frame = Frame::with_positions(positions);
        frame.step = step;
        frame.time = time;
        frame.precision = precision;
        frame.set_box_row_major(&box_values);
        Ok(Some(frame))
    }
}

impl<R: Read> Iterator for XtcReader<R> {
    type Item = Result<Frame, XtcError>;

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

/// Writes frames to an XTC stream.
pub struct XtcWriter<W: Write> {
    xdr: XdrWriter<W>,
    natoms: usize,
}

impl XtcWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, natoms: usize) -> Result<Self, XtcError> {
        Ok(Self::new(BufWriter::new(File::create(path)?), natoms))
    }
}

impl<W: Write> XtcWriter<W> {
    pub fn new(writer: W, natoms: usize) -> Self {
        Self {
            xdr: XdrWriter::new(writer),
            natoms,
        }
    }

    pub fn natoms(&self) -> usize {
        self.natoms
    }

    /// Compresses and writes one frame using its own precision.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), XtcError> {
        if frame.positions.len() != self.natoms {
            return Err(XtcError::AtomCountMismatch {
                expected: self.natoms,
                found: frame.positions.len(),
            });
        }
        // The frame is encoded in memory so a rejected frame leaves no partial record.
        let mut encoded = XdrWriter::new(Vec::new());
        encoded.write_i32(XTC_MAGIC)?;
        encoded.write_i32(self.natoms as i32)?;
        encoded.write_i32(frame.step)?;
        encoded.write_f32(frame.time)?;
        encoded.write_f32_array(&frame.box_row_major())?;
        compress_coordinates(&mut encoded, &frame.positions, frame.precision)?;
        self.xdr.write_opaque(&encoded.into_inner())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), XtcError> {
        self.xdr.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.xdr.into_inner()
    }
}
