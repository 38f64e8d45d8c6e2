//! Binary PPM (P6) output.
//!
//! The header is `P6\n<width> <height>\n255\n`; the body is every row's texel
//! bytes exactly as they sit in the image, with no channel reordering or
//! format conversion. Non-RGB8 formats therefore produce files whose body
//! length differs from `3 * width * height`; they are meant for byte
//! comparison, not for viewers.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{HarnessError, Result};

pub fn header(width: u32, height: u32) -> String {
    format!("P6\n{} {}\n255\n", width, height)
}

/// Write the header followed by `height` rows of `row_bytes` each.
pub fn encode<'a, W, I>(out: &mut W, width: u32, height: u32, row_bytes: usize, rows: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a [u8]>,
{
    out.write_all(header(width, height).as_bytes())?;
    let mut written = 0u32;
    for row in rows {
        if row.len() != row_bytes {
            return Err(HarnessError::config(format!(
                "row {} is {} bytes, expected {}",
                written,
                row.len(),
                row_bytes
            )));
        }
        out.write_all(row)?;
        written += 1;
    }
    if written != height {
        return Err(HarnessError::config(format!(
            "got {} rows for a {}-row image",
            written, height
        )));
    }
    Ok(())
}

pub fn write_file<'a, I>(path: &Path, width: u32, height: u32, row_bytes: usize, rows: I) -> Result<()>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut out = BufWriter::new(File::create(path)?);
    encode(&mut out, width, height, row_bytes, rows)?;
    out.flush()?;
    debug!("wrote {}x{} image to {}", width, height, path.display());
    Ok(())
}
