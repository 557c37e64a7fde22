use super::trr::{self, TrrError, TrrReader, TrrWriter};
use super::xtc::{self, XtcError, XtcReader, XtcWriter};
use crate::core::models::frame::Frame;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("Unsupported trajectory format '{0}': only xtc and trr are supported")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Xtc(#[from] XtcError),
    #[error(transparent)]
    Trr(#[from] TrrError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryFormat {
    Xtc,
    Trr,
}

impl TrajectoryFormat {
    /// Determines the format from the file extension (case-insensitive).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TrajectoryError> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "xtc" => Ok(Self::Xtc),
            "trr" => Ok(Self::Trr),
            _ => Err(TrajectoryError::UnsupportedFormat(
                path.as_ref().display().to_string(),
            )),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Xtc => "xtc",
            Self::Trr => "trr",
        }
    }
}

impl fmt::Display for TrajectoryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Atom count from the first frame of an XTC or TRR file.
pub fn read_natoms(path: impl AsRef<Path>) -> Result<usize, TrajectoryError> {
    let path = path.as_ref();
    Ok(match TrajectoryFormat::from_path(path)? {
        TrajectoryFormat::Xtc => xtc::read_natoms(path)?,
        TrajectoryFormat::Trr => trr::read_natoms(path)?,
    })
}

pub enum TrajectoryReader {
    Xtc(XtcReader<BufReader<File>>),
    Trr(TrrReader<BufReader<File>>),
}

impl TrajectoryReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrajectoryError> {
        let path = path.as_ref();
        Ok(match TrajectoryFormat::from_path(path)? {
            TrajectoryFormat::Xtc => Self::Xtc(XtcReader::open(path)?),
            TrajectoryFormat::Trr => Self::Trr(TrrReader::open(path)?),
        })
    }

    pub fn format(&self) -> TrajectoryFormat {
        match self {
            Self::Xtc(_) => TrajectoryFormat::Xtc,
            Self::Trr(_) => TrajectoryFormat::Trr,
        }
    }

    pub fn natoms(&self) -> usize {
        match self {
            Self::Xtc(r) => r.natoms(),
            Self::Trr(r) => r.natoms().unwrap_or(0),
        }
    }
}

impl Iterator for TrajectoryReader {
    type Item = Result<Frame, TrajectoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Xtc(r) => r.next().map(|f| f.map_err(Into::into)),
            Self::Trr(r) => r.next().map(|f| f.map_err(Into::into)),
        }
    }
}

pub enum TrajectoryWriter {
    Xtc(XtcWriter<BufWriter<File>>),
    Trr(TrrWriter<BufWriter<File>>),
}

impl TrajectoryWriter {
    pub fn create(path: impl AsRef<Path>, natoms: usize) -> Result<Self, TrajectoryError> {
        let path = path.as_ref();
        Ok(match TrajectoryFormat::from_path(path)? {
            TrajectoryFormat::Xtc => Self::Xtc(XtcWriter::create(path, natoms)?),
            TrajectoryFormat::Trr => Self::Trr(TrrWriter::create(path, natoms)?),
        })
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), TrajectoryError> {
        match self {
            Self::Xtc(w) => w.write_frame(frame)?,
            Self::Trr(w) => w.write_frame(frame)?,
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), TrajectoryError> {
        match self {
            Self::Xtc(w) => w.flush()?,
            Self::Trr(w) => w.flush()?,
        }
        Ok(())
    }
}

/// Overview of a trajectory file gathered by reading every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectorySummary {
    pub format: TrajectoryFormat,
    pub natoms: usize,
    pub frames: usize,
    pub first_step: Option<i32>,
    pub last_step: Option<i32>,
    pub first_time: Option<f32>,
    pub last_time: Option<f32>,
}

impl TrajectorySummary {
    /// Average spacing between frame times, if there are at least two frames.
    pub fn time_step(&self) -> Option<f32> {
        match (self.first_time, self.last_time) {
            (Some(first), Some(last)) if self.frames > 1 => {
                Some((last - first) / (self.frames - 1) as f32)
            }
            _ => None,
        }
    }
}

pub fn summarize(path: impl AsRef<Path>) -> Result<TrajectorySummary, TrajectoryError> {
    let reader = TrajectoryReader::open(path)?;
    let format = reader.format();
    let mut summary = TrajectorySummary {
        format,
        natoms: reader.natoms(),
        frames: 0,
        first_step: None,
        last_step: None,
        first_time: None,
        last_time: None,
    };
    for frame in reader {
        let frame = frame?;
        summary.natoms = frame.natoms();
        if summary.frames == 0 {
            summary.first_step = Some(frame.step);
            summary.first_time = Some(frame.time);
        }
        summary.last_step = Some(frame.step);
        summary.last_time = Some(frame.time);
        summary.frames += 1;
    }
    Ok(summary)
}

/// Copies every frame of `input` into `output`, converting between formats by extension.
///
/// Frames without positions (possible in TRR files) cannot be written as XTC and are
/// skipped. Returns the number of frames written.
pub fn convert(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    mut on_frame: impl FnMut(&Frame),
) -> Result<usize, TrajectoryError> {
    let reader = TrajectoryReader::open(input)?;
    let out_format = TrajectoryFormat::from_path(output.as_ref())?;
    let mut writer = TrajectoryWriter::create(output, reader.natoms())?;
    let mut written = 0;
    for frame in reader {
        let frame = frame?;
        if out_format == TrajectoryFormat::Xtc && !frame.has_positions() {
            continue;
        }
        writer.write_frame(&frame)?;
        on_frame(&frame);
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn frames(natoms: usize, count: usize) -> Vec<Frame> {
        (0..count)
            .map(|k| {
                let mut f = Frame::with_positions(
                    (0..natoms)
                        .map(|i| Point3::new(i as f32 * 0.15, k as f32 * 0.01, 1.0))
                        .collect(),
                );
                f.step = (k * 500) as i32;
                f.time = k as f32 * 1.0;
                f
            })
            .collect()
    }

    fn write_all(path: &Path, frames: &[Frame]) {
        let mut writer = TrajectoryWriter::create(path, frames[0].natoms()).unwrap();
        for f in frames {
            writer.write_frame(f).unwrap();
        }
        writer.flush().unwrap();
    }

    #[test]
    fn format_is_chosen_by_extension() {
        assert_eq!(
            TrajectoryFormat::from_path("a/b/traj.XTC").unwrap(),
            TrajectoryFormat::Xtc
        );
        assert_eq!(
            TrajectoryFormat::from_path("traj.trr").unwrap(),
            TrajectoryFormat::Trr
        );
        let err = TrajectoryFormat::from_path("traj.dcd").unwrap_err();
        assert!(err.to_string().contains("only xtc and trr are supported"));
    }

    #[test]
    fn summary_reports_frames_and_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eq.xtc");
        write_all(&path, &frames(12, 4));
        let summary = summarize(&path).unwrap();
        assert_eq!(summary.format, TrajectoryFormat::Xtc);
        assert_eq!(summary.natoms, 12);
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.first_step, Some(0));
        assert_eq!(summary.last_step, Some(1500));
        assert_eq!(summary.time_step(), Some(1.0));
        assert_eq!(read_natoms(&path).unwrap(), 12);
    }

    #[test]
    fn conversion_between_formats_keeps_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let trr_path = dir.path().join("in.trr");
        let xtc_path = dir.path().join("out.xtc");
        let original = frames(15, 3);
        write_all(&trr_path, &original);

        let mut seen = 0;
        let written = convert(&trr_path, &xtc_path, |_| seen += 1).unwrap();
        assert_eq!(written, 3);
        assert_eq!(seen, 3);

        let back: Vec<Frame> = TrajectoryReader::open(&xtc_path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(back.len(), 3);
        for (a, b) in back.iter().zip(&original) {
            assert_eq!(a.step, b.step);
            for (p, q) in a.positions.iter().zip(&b.positions) {
                assert!((p - q).norm() < 1e-3);
            }
        }
    }

    #[test]
    fn unsupported_output_is_rejected_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.xtc");
        write_all(&path, &frames(3, 1));
        assert!(matches!(
            convert(&path, dir.path().join("out.pdb"), |_| {}),
            Err(TrajectoryError::UnsupportedFormat(_))
        ));
    }
}
