// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Block shapes and the granularity each demux strategy needs.
//!
//! A block is a row-major `plane_len x channels` byte matrix: the byte for
//! (row `r`, channel `c`) lives at `r * channels + c`.

use std::fmt;

use crate::prelude::*;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Shape {
    pub channels: usize,
    pub plane_len: usize,
}

impl Shape {
    pub const fn new(channels: usize, plane_len: usize) -> Self {
        Self {
            channels,
            plane_len,
        }
    }

    /// Derives the shape of a source block of `src_len` bytes.
    pub fn from_block(channels: usize, src_len: usize) -> Result<Self> {
        ensure!(channels > 0, "channel count must be non-zero");
        ensure!(src_len > 0, "source block is empty");
        ensure!(
            src_len.is_multiple_of(channels),
            "source length {src_len} is not a multiple of {channels} channels"
        );
        Ok(Self::new(channels, src_len / channels))
    }

    /// Number of bytes in one interleaved source block.
    pub const fn block_len(&self) -> usize {
        self.channels * self.plane_len
    }

    /// Source offset of (row, channel).
    #[inline(always)]
    pub const fn offset(&self, row: usize, channel: usize) -> usize {
        row * self.channels + channel
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}ch x {}B", self.channels, self.plane_len)
    }
}

/// What a strategy needs from a shape before it may touch any buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Requirements {
    /// The channel count must be a multiple of this.
    pub channel_multiple: usize,
    /// The plane length must be a multiple of this.
    pub row_multiple: usize,
    /// The plane length must be exactly this.
    pub fixed_rows: Option<usize>,
    /// Plane `c` must start exactly `c * plane_len` bytes after plane 0.
    pub contiguous_planes: bool,
}

impl Requirements {
    pub const ANY: Self = Self::tiled(1, 1);

    pub const fn tiled(channel_multiple: usize, row_multiple: usize) -> Self {
        Self {
            channel_multiple,
            row_multiple,
            fixed_rows: None,
            contiguous_planes: false,
        }
    }

    pub const fn with_fixed_rows(self, rows: usize) -> Self {
        Self {
            fixed_rows: Some(rows),
            ..self
        }
    }

    pub const fn with_contiguous_planes(self) -> Self {
        Self {
            contiguous_planes: true,
            ..self
        }
    }

    /// Checks the shape-only part of the requirements.
    pub fn check(&self, shape: Shape) -> Result<()> {
        ensure!(shape.channels > 0, "channel count must be non-zero");
        ensure!(shape.plane_len > 0, "plane length must be non-zero");
        ensure!(
            shape.channels.is_multiple_of(self.channel_multiple),
            "{} channels is not a multiple of {}",
            shape.channels,
            self.channel_multiple
        );
        ensure!(
            shape.plane_len.is_multiple_of(self.row_multiple),
            "plane length {} is not a multiple of {}",
            shape.plane_len,
            self.row_multiple
        );
        if let Some(rows) = self.fixed_rows {
            ensure!(
                shape.plane_len == rows,
                "plane length {} must be exactly {rows}",
                shape.plane_len
            );
        }
        Ok(())
    }
}

/// Validates a source block and destination set against `req`.
///
/// Returns the derived shape. Nothing is read or written; callers that want to
/// avoid the panic in [`crate::demux::Demux::demux`] run this first.
pub fn validate(
    channels: usize,
    req: Requirements,
    src: &[u8],
    dst: &[&mut [u8]],
) -> Result<Shape> {
    let shape = Shape::from_block(channels, src.len())?;
    req.check(shape)?;
    ensure!(
        dst.len() == channels,
        "expected {channels} destination planes, got {}",
        dst.len()
    );
    if let Some((c, plane)) = dst
        .iter()
        .enumerate()
        .find(|(_, plane)| plane.len() < shape.plane_len)
    {
        bail!(
            "destination plane {c} holds {} bytes, need {}",
            plane.len(),
            shape.plane_len
        );
    }
    if req.contiguous_planes {
        let base = dst[0].as_ptr() as usize;
        for (c, plane) in dst.iter().enumerate() {
            ensure!(
                plane.as_ptr() as usize == base + c * shape.plane_len,
                "destination plane {c} is not contiguous with plane 0"
            );
        }
    }
    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planes(buf: &mut [u8], plane_len: usize) -> Vec<&mut [u8]> {
        buf.chunks_exact_mut(plane_len).collect()
    }

    #[test]
    fn test_from_block() {
        assert_eq!(Shape::from_block(32, 2048).unwrap(), Shape::new(32, 64));
        assert!(Shape::from_block(32, 2047).is_err());
        assert!(Shape::from_block(0, 64).is_err());
        assert!(Shape::from_block(4, 0).is_err());
    }

    #[test]
    fn test_offset() {
        let shape = Shape::new(32, 64);
        assert_eq!(shape.offset(0, 0), 0);
        assert_eq!(shape.offset(1, 3), 35);
        assert_eq!(shape.offset(63, 31), 2047);
        assert_eq!(shape.block_len(), 2048);
    }

    #[test]
    fn test_requirements_check() {
        let req = Requirements::tiled(8, 16);
        assert!(req.check(Shape::new(8, 16)).is_ok());
        assert!(req.check(Shape::new(32, 64)).is_ok());
        assert!(req.check(Shape::new(4, 16)).is_err());
        assert!(req.check(Shape::new(8, 8)).is_err());

        let fixed = Requirements::ANY.with_fixed_rows(64);
        assert!(fixed.check(Shape::new(3, 64)).is_ok());
        assert!(fixed.check(Shape::new(3, 32)).is_err());
    }

    #[test]
    fn test_validate_plane_count_and_len() {
        let src = [0u8; 64];
        let mut buf = [0u8; 64];
        let dst = planes(&mut buf, 16);
        assert_eq!(
            validate(4, Requirements::ANY, &src, &dst).unwrap(),
            Shape::new(4, 16)
        );
        assert!(validate(8, Requirements::ANY, &src, &dst).is_err());

        let mut short = [0u8; 60];
        let dst = planes(&mut short, 15);
        let err = validate(4, Requirements::ANY, &src, &dst).unwrap_err();
        assert!(err.to_string().contains("plane 0"), "{err}");
    }

    #[test]
    fn test_validate_contiguous() {
        let src = [0u8; 32];
        let mut buf = [0u8; 64];
        let req = Requirements::ANY.with_contiguous_planes();

        let dst = planes(&mut buf[..32], 8);
        assert!(validate(4, req, &src, &dst).is_ok());

        // Planes with a 16 byte stride are not contiguous for 8 byte planes.
        let mut dst: Vec<&mut [u8]> = buf.chunks_exact_mut(16).collect();
        assert!(validate(4, req, &src, &dst).is_err());
        dst.reverse();
        assert!(validate(4, Requirements::ANY, &src, &dst).is_ok());
    }
}
