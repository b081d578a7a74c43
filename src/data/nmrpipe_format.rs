//! NMRPipe 1D reader/writer
//!
//! NMRPipe uses a 2048-byte (512 float32) header followed by spectral data.
//! Only one-dimensional frequency-domain data is accepted: the fitting
//! engine works on a single real intensity trace plus the acquisition
//! scalars needed to rebuild its frequency axis.

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Write};
use std::path::Path;
use thiserror::Error;

use super::spectrum::AcquisitionParams;

/// NMRPipe header size: 512 float32 values = 2048 bytes
pub const HEADER_FLOATS: usize = 512;
pub const HEADER_BYTES: usize = HEADER_FLOATS * 4;

/// Byte-order marker stored in FDFLTORDER.
const ORDER_MARKER: f32 = 2.345;

/// Key header indices (0-based, each is a float32 slot)
mod idx {
    pub const FDMAGIC: usize = 0; // Magic number: 0.0
    pub const FDFLTFORMAT: usize = 1; // Float format
    pub const FDFLTORDER: usize = 2; // Byte order
    pub const FDDIMCOUNT: usize = 9; // Number of dimensions
    pub const FDSIZE: usize = 99; // Number of real points in current dim
    pub const FDREALSIZE: usize = 97; // Total real data size
    pub const FDSPECNUM: usize = 219; // Number of spectra (Y size for 2D)
    pub const FDQUADFLAG: usize = 106; // 0=complex, 1=real
    pub const FDF2SW: usize = 100; // Spectral width F2 (Hz)
    pub const FDF2OBS: usize = 119; // Observe freq F2 (MHz)
    pub const FDF2ORIG: usize = 101; // Origin F2 (Hz)
    pub const FDF2FTFLAG: usize = 220; // 1=freq domain, 0=time domain
    pub const FDPIPEFLAG: usize = 57; // Pipe mode flag
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("NMRPipe array is empty")]
    Empty,
    #[error("Unsupported NMRPipe file dimensionality: {0}")]
    UnsupportedDimensionality(usize),
    #[error("Data truncated: expected {expected} values, got {got}")]
    Truncated { expected: usize, got: usize },
}

/// A 1D NMRPipe spectrum with its raw header.
#[derive(Debug, Clone)]
pub struct NmrPipeData {
    pub header: Vec<f32>,
    pub big_endian: bool,
    pub acquisition: AcquisitionParams,
    pub is_frequency_domain: bool,
    /// Real intensities in file order.
    pub values: Vec<f64>,
}

/// Read a 1D NMRPipe file
pub fn read_nmrpipe_file(path: &Path) -> Result<NmrPipeData, ReadError> {
    let data = std::fs::read(path)?;
    let spectrum = parse_nmrpipe(&data)?;
    log::info!(
        "Read NMRPipe file {}: {} points, SW={:.2} Hz, OBS={:.3} MHz, ORIG={:.2} Hz",
        path.display(),
        spectrum.values.len(),
        spectrum.acquisition.spectral_width,
        spectrum.acquisition.observed_frequency,
        spectrum.acquisition.origin,
    );
    Ok(spectrum)
}

/// Parse an in-memory NMRPipe file.
pub fn parse_nmrpipe(data: &[u8]) -> Result<NmrPipeData, ReadError> {
    if data.len() < HEADER_BYTES {
        return Err(ReadError::InvalidHeader(format!(
            "file too small for NMRPipe format ({} bytes)",
            data.len()
        )));
    }

    // FDFLTORDER should read as 2.345 in the file's byte order.
    let order_le = LittleEndian::read_f32(&data[idx::FDFLTORDER * 4..]);
    let big_endian = (order_le - ORDER_MARKER).abs() > 0.01;

    let mut header = vec![0.0f32; HEADER_FLOATS];
    let mut cursor = Cursor::new(&data[..HEADER_BYTES]);
    for h in header.iter_mut() {
        *h = if big_endian {
            cursor.read_f32::<BigEndian>()?
        } else {
            cursor.read_f32::<LittleEndian>()?
        };
    }
    if big_endian && (header[idx::FDFLTORDER] - ORDER_MARKER).abs() > 0.01 {
        return Err(ReadError::InvalidHeader("unrecognised byte order marker".into()));
    }

    let ndim = header[idx::FDDIMCOUNT] as usize;
    let specnum = header[idx::FDSPECNUM] as usize;
    if ndim > 1 && specnum > 1 {
        return Err(ReadError::UnsupportedDimensionality(ndim));
    }

    let npts = header[idx::FDSIZE] as usize;
    let is_complex = header[idx::FDQUADFLAG] as i32 == 0;
    let is_frequency_domain = header[idx::FDF2FTFLAG] as i32 == 1;

    let body = &data[HEADER_BYTES..];
    let mut cursor = Cursor::new(body);
    let mut raw = Vec::with_capacity(body.len() / 4);
    for _ in 0..body.len() / 4 {
        let v = if big_endian {
            cursor.read_f32::<BigEndian>()?
        } else {
            cursor.read_f32::<LittleEndian>()?
        };
        raw.push(v as f64);
    }

    let values: Vec<f64> = if is_complex {
        if header[idx::FDPIPEFLAG] as i32 == 1 {
            // Stream mode: interleaved R, I, R, I, ...
            raw.iter().step_by(2).copied().collect()
        } else {
            // File mode: R...R then I...I
            first_points(raw, npts)?
        }
    } else {
        first_points(raw, npts)?
    };

    if values.is_empty() {
        return Err(ReadError::Empty);
    }

    let acquisition = AcquisitionParams {
        spectral_width: header[idx::FDF2SW] as f64,
        observed_frequency: header[idx::FDF2OBS] as f64,
        origin: header[idx::FDF2ORIG] as f64,
        size: values.len(),
    };

    Ok(NmrPipeData {
        header,
        big_endian,
        acquisition,
        is_frequency_domain,
        values,
    })
}

/// The leading `npts` values, or everything when the header gives no size.
fn first_points(mut raw: Vec<f64>, npts: usize) -> Result<Vec<f64>, ReadError> {
    if npts == 0 {
        return Ok(raw);
    }
    if raw.len() < npts {
        return Err(ReadError::Truncated {
            expected: npts,
            got: raw.len(),
        });
    }
    raw.truncate(npts);
    Ok(raw)
}

/// Build a fresh 1D real frequency-domain header.
pub fn new_header(acq: &AcquisitionParams) -> Vec<f32> {
    let mut header = vec![0.0f32; HEADER_FLOATS];
    header[idx::FDMAGIC] = 0.0;
    header[idx::FDFLTFORMAT] = f32::from_bits(0xEEEE_EEEE);
    header[idx::FDFLTORDER] = ORDER_MARKER;
    header[idx::FDDIMCOUNT] = 1.0;
    header[idx::FDSIZE] = acq.size as f32;
    header[idx::FDREALSIZE] = acq.size as f32;
    header[idx::FDSPECNUM] = 1.0;
    header[idx::FDQUADFLAG] = 1.0;
    header[idx::FDF2FTFLAG] = 1.0;
    header[idx::FDF2SW] = acq.spectral_width as f32;
    header[idx::FDF2OBS] = acq.observed_frequency as f32;
    header[idx::FDF2ORIG] = acq.origin as f32;
    header
}

/// Write `values` as a real 1D spectrum, reusing `template`'s header and
/// byte order (the way a processed spectrum replaces the input data).
pub fn write_like(template: &NmrPipeData, values: &[f64], path: &Path) -> io::Result<()> {
    let mut header = template.header.clone();
    header[idx::FDSIZE] = values.len() as f32;
    header[idx::FDREALSIZE] = values.len() as f32;
    header[idx::FDQUADFLAG] = 1.0;
    header[idx::FDPIPEFLAG] = 0.0;

    let mut file = io::BufWriter::new(std::fs::File::create(path)?);
    if template.big_endian {
        write_body::<BigEndian, _>(&mut file, &header, values)?;
    } else {
        write_body::<LittleEndian, _>(&mut file, &header, values)?;
    }
    file.flush()
}

/// Write a real 1D spectrum with a freshly built little-endian header.
pub fn write_nmrpipe_file(acq: &AcquisitionParams, values: &[f64], path: &Path) -> io::Result<()> {
    let acq = AcquisitionParams {
        size: values.len(),
        ..*acq
    };
    let header = new_header(&acq);
    let mut file = io::BufWriter::new(std::fs::File::create(path)?);
    write_body::<LittleEndian, _>(&mut file, &header, values)?;
    file.flush()
}

fn write_body<B: ByteOrder, W: Write>(out: &mut W, header: &[f32], values: &[f64]) -> io::Result<()> {
    for &h in header {
        out.write_f32::<B>(h)?;
    }
    for &v in values {
        out.write_f32::<B>(v as f32)?;
    }
    Ok(())
}
