//! IDX file format used by the MNIST corpus.
//!
//! All header fields are big-endian `u32`. Image files (magic 2051) carry
//! `count, rows, cols` followed by `count * rows * cols` pixel bytes; label
//! files (magic 2049) carry `count` followed by `count` label bytes.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

pub const IMAGE_MAGIC: u32 = 2051;
pub const LABEL_MAGIC: u32 = 2049;

/// Raw images from an IDX3 file, row-major, one byte per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxImages {
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
    pub pixels: Vec<u8>,
}

fn read_be_u32(data: &[u8], offset: &mut usize) -> Option<u32> {
    let bytes = data.get(*offset..*offset + 4)?;
    *offset += 4;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Parses an in-memory IDX3 image file.
pub fn parse_idx_images(data: &[u8]) -> std::result::Result<IdxImages, String> {
    let mut offset = 0usize;
    let truncated = || "truncated header".to_string();

    let magic = read_be_u32(data, &mut offset).ok_or_else(truncated)?;
    if magic != IMAGE_MAGIC {
        return Err(format!("bad magic number {magic}, expected {IMAGE_MAGIC}"));
    }
    let count = read_be_u32(data, &mut offset).ok_or_else(truncated)? as usize;
    let rows = read_be_u32(data, &mut offset).ok_or_else(truncated)? as usize;
    let cols = read_be_u32(data, &mut offset).ok_or_else(truncated)? as usize;

    let expected = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .ok_or("header dimensions overflow")?;
    let body = &data[offset..];
    if body.len() != expected {
        return Err(format!(
            "header announces {count} images of {rows}x{cols} ({expected} bytes) \
             but body has {} bytes",
            body.len()
        ));
    }

    Ok(IdxImages {
        count,
        rows,
        cols,
        pixels: body.to_vec(),
    })
}

/// Parses an in-memory IDX1 label file.
pub fn parse_idx_labels(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut offset = 0usize;
    let magic = read_be_u32(data, &mut offset).ok_or("truncated header")?;
    if magic != LABEL_MAGIC {
        return Err(format!("bad magic number {magic}, expected {LABEL_MAGIC}"));
    }
    let count = read_be_u32(data, &mut offset).ok_or("truncated header")? as usize;

    let body = &data[offset..];
    if body.len() != count {
        return Err(format!(
            "header announces {count} labels but body has {} bytes",
            body.len()
        ));
    }
    Ok(body.to_vec())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::corpus(path, format!("cannot read file: {e}")))
}

/// Reads an IDX3 image file; malformed files fail with an error naming the file.
pub fn read_idx_images(path: impl AsRef<Path>) -> Result<IdxImages> {
    let path = path.as_ref();
    let data = read_file(path)?;
    parse_idx_images(&data).map_err(|reason| Error::corpus(path, reason))
}

/// Reads an IDX1 label file.
pub fn read_idx_labels(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let data = read_file(path)?;
    parse_idx_labels(&data).map_err(|reason| Error::corpus(path, reason))
}

/// Serializes images to IDX3 bytes.
pub fn encode_idx_images(images: &IdxImages) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + images.pixels.len());
    out.extend_from_slice(&IMAGE_MAGIC.to_be_bytes());
    out.extend_from_slice(&(images.count as u32).to_be_bytes());
    out.extend_from_slice(&(images.rows as u32).to_be_bytes());
    out.extend_from_slice(&(images.cols as u32).to_be_bytes());
    out.extend_from_slice(&images.pixels);
    out
}

/// Serializes labels to IDX1 bytes.
pub fn encode_idx_labels(labels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + labels.len());
    out.extend_from_slice(&LABEL_MAGIC.to_be_bytes());
    out.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    out.extend_from_slice(labels);
    out
}
