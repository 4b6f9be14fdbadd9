//! SIF image format detection
//!
//! Probes a local file for the SIF global header and classifies it as a
//! plain SIF or an OCI-SIF (a SIF carrying an OCI root index). A few other
//! container image formats are recognised from their magic bytes only so that
//! the error message can say what the file actually is.

use crate::error::{OrasError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Offset and magic of the SIF global header
const SIF_MAGIC_OFFSET: usize = 32;
const SIF_MAGIC: &[u8] = b"SIF_MAGIC\0";

/// Size of the little-endian global header
const SIF_HEADER_LEN: usize = 128;
const HDR_DESCRIPTORS_TOTAL: usize = 88;
const HDR_DESCRIPTORS_OFFSET: usize = 96;

/// Size of one descriptor entry and the fields read from it
const SIF_DESCRIPTOR_LEN: u64 = 585;
const DESCR_DATATYPE: usize = 0;
const DESCR_USED: usize = 4;

/// Data object type of the root OCI index in an OCI-SIF
const SIF_DATA_OCI_ROOT_INDEX: i32 = 0x400a;

const SQUASHFS_MAGIC: &[u8] = b"hsqs";
const EXT3_MAGIC_OFFSET: u64 = 1080;
const EXT3_MAGIC: [u8; 2] = [0x53, 0xef];

/// Format of a local container image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Sif,
    OciSif,
    SquashFs,
    Ext3,
    Sandbox,
    Unknown,
}

impl ImageFormat {
    /// Whether this format may be transferred as an ORAS SIF artifact
    pub fn is_sif(&self) -> bool {
        matches!(self, ImageFormat::Sif | ImageFormat::OciSif)
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImageFormat::Sif => "SIF",
            ImageFormat::OciSif => "OCI-SIF",
            ImageFormat::SquashFs => "squashfs",
            ImageFormat::Ext3 => "ext3",
            ImageFormat::Sandbox => "sandbox directory",
            ImageFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Detect the format of the image at `path`
pub fn detect_format(path: &Path) -> Result<ImageFormat> {
    let metadata = std::fs::metadata(path).map_err(|e| OrasError::io(path, e))?;
    if metadata.is_dir() {
        return Ok(ImageFormat::Sandbox);
    }

    let mut file = File::open(path).map_err(|e| OrasError::io(path, e))?;
    let mut header = [0u8; SIF_HEADER_LEN];
    let n = read_up_to(&mut file, &mut header).map_err(|e| OrasError::io(path, e))?;
    let header = &header[..n];

    if is_sif_header(header) {
        let oci = has_oci_root_index(&mut file, header, metadata.len())
            .map_err(|e| OrasError::io(path, e))?;
        return Ok(if oci {
            ImageFormat::OciSif
        } else {
            ImageFormat::Sif
        });
    }

    if header.starts_with(SQUASHFS_MAGIC) {
        return Ok(ImageFormat::SquashFs);
    }

    if metadata.len() >= EXT3_MAGIC_OFFSET + 2 {
        let mut magic = [0u8; 2];
        file.seek(SeekFrom::Start(EXT3_MAGIC_OFFSET))
            .and_then(|_| file.read_exact(&mut magic))
            .map_err(|e| OrasError::io(path, e))?;
        if magic == EXT3_MAGIC {
            return Ok(ImageFormat::Ext3);
        }
    }

    Ok(ImageFormat::Unknown)
}

/// Fail unless `path` holds a SIF or OCI-SIF image
pub fn ensure_sif(path: &Path) -> Result<()> {
    let format = detect_format(path).map_err(|e| {
        OrasError::Format(format!(
            "could not open image {} for verification: {}",
            path.display(),
            e
        ))
    })?;

    if !format.is_sif() {
        return Err(OrasError::Format(format!(
            "{:?} is not a SIF (detected {})",
            path.display().to_string(),
            format
        )));
    }

    Ok(())
}

fn is_sif_header(header: &[u8]) -> bool {
    header.len() == SIF_HEADER_LEN
        && &header[SIF_MAGIC_OFFSET..SIF_MAGIC_OFFSET + SIF_MAGIC.len()] == SIF_MAGIC
}

/// Walk the descriptor table looking for a used OCI root index descriptor
fn has_oci_root_index(file: &mut File, header: &[u8], file_len: u64) -> std::io::Result<bool> {
    let total = read_i64(header, HDR_DESCRIPTORS_TOTAL);
    let offset = read_i64(header, HDR_DESCRIPTORS_OFFSET);
    if total <= 0 || offset <= 0 {
        return Ok(false);
    }

    let (total, offset) = (total as u64, offset as u64);
    let table_end = total
        .checked_mul(SIF_DESCRIPTOR_LEN)
        .and_then(|len| len.checked_add(offset));
    match table_end {
        Some(end) if end <= file_len => {}
        _ => return Ok(false),
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut entry = vec![0u8; SIF_DESCRIPTOR_LEN as usize];
    for _ in 0..total {
        file.read_exact(&mut entry)?;
        let used = entry[DESCR_USED] != 0;
        if used && read_i32(&entry, DESCR_DATATYPE) == SIF_DATA_OCI_ROOT_INDEX {
            return Ok(true);
        }
    }
    Ok(false)
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn read_i64(buf: &[u8], at: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    i64::from_le_bytes(bytes)
}

fn read_i32(buf: &[u8], at: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    i32::from_le_bytes(bytes)
}
