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

//! Strategies that read or write whole words instead of single bytes.

use crate::demux::Demux;
use crate::demux::Family;
use crate::shape::Requirements;
use crate::utils::AssertN;
use crate::words;

/// Gathers 4 rows of one channel and writes them as one u32.
#[derive(Debug)]
pub struct Write4 {
    channels: usize,
}

impl Write4 {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for Write4 {
    fn name(&self) -> &'static str {
        "write4"
    }

    fn family(&self) -> Family {
        Family::Coalesced
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(1, 4)
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        let n = self.channels;
        for (c, plane) in dst.iter_mut().enumerate() {
            for (pos, out) in plane[..shape.plane_len].chunks_exact_mut(4).enumerate() {
                let word = words::pack_u32(words::gather(src, 4 * pos * n + c, n));
                out.copy_from_slice(&word.to_le_bytes());
            }
        }
    }
}

/// Gathers 8 rows of one channel and writes them as one u64.
#[derive(Debug)]
pub struct Write8 {
    channels: usize,
}

impl Write8 {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for Write8 {
    fn name(&self) -> &'static str {
        "write8"
    }

    fn family(&self) -> Family {
        Family::Coalesced
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(1, 8)
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        let n = self.channels;
        for (c, plane) in dst.iter_mut().enumerate() {
            for (pos, out) in plane[..shape.plane_len].chunks_exact_mut(8).enumerate() {
                let word = words::pack_u64(words::gather(src, 8 * pos * n + c, n));
                out.copy_from_slice(&word.to_le_bytes());
            }
        }
    }
}

/// Moves the 4x4 block at row `row` of the four channels starting at `c`:
/// four u32 reads, four u32 writes.
#[inline(always)]
fn move_4x4(src: &[u8], n: usize, c: usize, row: usize, quad: &mut [&mut [u8]]) {
    let at = row * n + c;
    let rows = [
        words::load_u32(src, at),
        words::load_u32(src, at + n),
        words::load_u32(src, at + 2 * n),
        words::load_u32(src, at + 3 * n),
    ];
    for (plane, col) in quad.iter_mut().zip(words::transpose_4x4(rows)) {
        plane[row..row + 4].copy_from_slice(&col.to_le_bytes());
    }
}

/// Reads one u32 per row spanning 4 channels and writes one u32 per channel.
#[derive(Debug)]
pub struct Read4Write4 {
    channels: usize,
}

impl Read4Write4 {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for Read4Write4 {
    fn name(&self) -> &'static str {
        "read4_write4"
    }

    fn family(&self) -> Family {
        Family::Coalesced
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(4, 4)
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        for (g, quad) in dst.chunks_exact_mut(4).enumerate() {
            for row in (0..shape.plane_len).step_by(4) {
                move_4x4(src, self.channels, 4 * g, row, quad);
            }
        }
    }
}

/// [`Read4Write4`] with the row loop pinned to `ROWS`.
#[derive(Debug)]
pub struct Read4Write4Unrolled<const ROWS: usize> {
    channels: usize,
}

impl<const ROWS: usize> Read4Write4Unrolled<ROWS> {
    pub fn new(channels: usize) -> Self {
        let _ = AssertN::<ROWS>::NE_0;
        let _ = AssertN::<ROWS>::MULTIPLE_OF_4;
        Self { channels }
    }
}

impl<const ROWS: usize> Demux for Read4Write4Unrolled<ROWS> {
    fn name(&self) -> &'static str {
        "read4_write4_unrolled"
    }

    fn family(&self) -> Family {
        Family::Coalesced
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(4, 4).with_fixed_rows(ROWS)
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        self.checked_shape(src, dst);
        for (g, quad) in dst.chunks_exact_mut(4).enumerate() {
            for step in 0..ROWS / 4 {
                move_4x4(src, self.channels, 4 * g, 4 * step, quad);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::test_utils::*;
    use crate::shape::Shape;

    #[test]
    fn test_write_widths() {
        let shape = Shape::new(3, 16);
        let src: Vec<u8> = (0..shape.block_len()).map(|i| (i * 5) as u8).collect();
        check(&Write4::new(3), shape, &src);
        check(&Write8::new(3), shape, &src);
    }

    #[test]
    fn test_read4_write4() {
        let shape = Shape::new(8, 12);
        let src: Vec<u8> = (0..shape.block_len()).map(|i| (255 - i) as u8).collect();
        check(&Read4Write4::new(8), shape, &src);
        check(&Read4Write4Unrolled::<12>::new(8), shape, &src);
    }

    #[test]
    fn test_requirements() {
        assert!(!Write8::new(4).supports(Shape::new(4, 4)));
        assert!(Write4::new(4).supports(Shape::new(4, 4)));
        assert!(!Read4Write4::new(6).supports(Shape::new(6, 4)));
        assert!(!Read4Write4Unrolled::<64>::new(4).supports(Shape::new(4, 60)));
    }
}
