use std::path::Path;

use ash::vk;

use crate::error::{HarnessError, Result};
use crate::ppm;

/// Host copy of a linear image's texels, tightly packed row by row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    format: vk::Format,
    width: u32,
    height: u32,
    texel_size: u32,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(format: vk::Format, width: u32, height: u32, texel_size: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 || texel_size == 0 {
            return Err(HarnessError::config("frame dimensions and texel size must be non-zero"));
        }
        let expected = width as usize * height as usize * texel_size as usize;
        if data.len() != expected {
            return Err(HarnessError::config(format!(
                "frame data is {} bytes, {}x{} texels of {} bytes need {}",
                data.len(),
                width,
                height,
                texel_size,
                expected
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            texel_size,
            data,
        })
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texel_size(&self) -> u32 {
        self.texel_size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.texel_size as usize
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.row_bytes())
    }

    /// Bytes of the texel at (x, y). Panics when out of bounds, like slice indexing.
    pub fn texel(&self, x: u32, y: u32) -> &[u8] {
        assert!(x < self.width && y < self.height, "texel ({x}, {y}) outside {}x{}", self.width, self.height);
        let start = y as usize * self.row_bytes() + x as usize * self.texel_size as usize;
        &self.data[start..start + self.texel_size as usize]
    }

    /// The four corner texels: top-left, top-right, bottom-left, bottom-right.
    pub fn corners(&self) -> [&[u8]; 4] {
        let (r, b) = (self.width - 1, self.height - 1);
        [self.texel(0, 0), self.texel(r, 0), self.texel(0, b), self.texel(r, b)]
    }

    /// Number of texels whose bytes equal `value`.
    pub fn count_texels(&self, value: &[u8]) -> usize {
        self.data
            .chunks_exact(self.texel_size as usize)
            .filter(|t| *t == value)
            .count()
    }

    pub fn write_ppm(&self, path: impl AsRef<Path>) -> Result<()> {
        ppm::write_file(path.as_ref(), self.width, self.height, self.row_bytes(), self.rows())
    }
}
