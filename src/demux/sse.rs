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

//! 128-bit strategies built on the tile transposes.
//!
//! Loads and stores are unaligned; each store covers exactly 16 bytes (or 4
//! for [`Read4Write4Sse`]) inside the plane, so nothing past the plane length
//! is written.

use std::arch::x86_64::__m128i;
use std::arch::x86_64::_mm_extract_epi32;
use std::arch::x86_64::_mm_setzero_si128;

use crate::demux::Demux;
use crate::demux::Family;
use crate::shape::Requirements;
use crate::tile::Tile;
use crate::tile::sse;
use crate::tile::transpose_8x16;
use crate::tile::transpose_16x16;
use crate::utils::AssertN;

fn has_ssse3() -> bool {
    is_x86_feature_detected!("ssse3")
}

// SAFETY:
// * sse4.1 and ssse3 must be available.
// * `quad` must hold 4 planes of at least `row + 4` bytes.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
unsafe fn move_4x4(src: &[u8], n: usize, c: usize, row: usize, quad: &mut [&mut [u8]]) {
    let m = sse::gather_4x4(src, row * n + c, n).transpose_bytes();
    let cols = [
        _mm_extract_epi32::<0>(m),
        _mm_extract_epi32::<1>(m),
        _mm_extract_epi32::<2>(m),
        _mm_extract_epi32::<3>(m),
    ];
    for (plane, col) in quad.iter_mut().zip(cols) {
        plane[row..row + 4].copy_from_slice(&(col as u32).to_le_bytes());
    }
}

// SAFETY:
// * sse4.1 and ssse3 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[target_feature(enable = "ssse3,sse4.1")]
unsafe fn read4_write4(src: &[u8], n: usize, plane_len: usize, dst: &mut [&mut [u8]]) {
    for (g, quad) in dst.chunks_exact_mut(4).enumerate() {
        for row in (0..plane_len).step_by(4) {
            move_4x4(src, n, 4 * g, row, quad);
        }
    }
}

/// One 4x4 tile per register, written back one dword per channel.
#[derive(Debug)]
pub struct Read4Write4Sse {
    channels: usize,
}

impl Read4Write4Sse {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for Read4Write4Sse {
    fn name(&self) -> &'static str {
        "read4_write4_sse"
    }

    fn family(&self) -> Family {
        Family::Sse
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(4, 4)
    }

    fn is_available(&self) -> bool {
        has_ssse3() && is_x86_feature_detected!("sse4.1")
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        // SAFETY: checked for ssse3 and sse4.1 support.
        unsafe { read4_write4(src, self.channels, shape.plane_len, dst) }
    }
}

// SAFETY:
// * ssse3 must be available.
// * `quad` must hold 4 planes of at least `row + 16` bytes.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
unsafe fn move_4x16(src: &[u8], n: usize, c: usize, row: usize, quad: &mut [&mut [u8]]) {
    let mut m = [_mm_setzero_si128(); 4];
    for (i, tile) in m.iter_mut().enumerate() {
        *tile = sse::gather_4x4(src, (row + 4 * i) * n + c, n).transpose_bytes();
    }
    __m128i::transpose_dwords(&mut m);
    for (plane, v) in quad.iter_mut().zip(m) {
        sse::store(&mut plane[row..], v);
    }
}

// SAFETY:
// * ssse3 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[target_feature(enable = "ssse3")]
unsafe fn read4_write16(src: &[u8], n: usize, plane_len: usize, dst: &mut [&mut [u8]]) {
    for (g, quad) in dst.chunks_exact_mut(4).enumerate() {
        for row in (0..plane_len).step_by(16) {
            move_4x16(src, n, 4 * g, row, quad);
        }
    }
}

/// Four 4x4 tiles per channel group, dword-transposed into 16-byte stores.
#[derive(Debug)]
pub struct Read4Write16Sse {
    channels: usize,
}

impl Read4Write16Sse {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for Read4Write16Sse {
    fn name(&self) -> &'static str {
        "read4_write16_sse"
    }

    fn family(&self) -> Family {
        Family::Sse
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(4, 16)
    }

    fn is_available(&self) -> bool {
        has_ssse3()
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        // SAFETY: checked for ssse3 support.
        unsafe { read4_write16(src, self.channels, shape.plane_len, dst) }
    }
}

// SAFETY:
// * ssse3 must be available.
// * `oct` must hold 8 planes of at least `row + 16` bytes.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
unsafe fn move_8x16(src: &[u8], n: usize, c: usize, row: usize, oct: &mut [&mut [u8]]) {
    let mut rows = [_mm_setzero_si128(); 8];
    for (i, pair) in rows.chunks_exact_mut(2).enumerate() {
        (pair[0], pair[1]) = sse::gather_8x4(src, (row + 4 * i) * n + c, n);
    }
    for (plane, v) in oct.iter_mut().zip(transpose_8x16(rows)) {
        sse::store(&mut plane[row..], v);
    }
}

// SAFETY:
// * ssse3 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[target_feature(enable = "ssse3")]
unsafe fn read8_write16(src: &[u8], n: usize, plane_len: usize, dst: &mut [&mut [u8]]) {
    for (g, oct) in dst.chunks_exact_mut(8).enumerate() {
        for row in (0..plane_len).step_by(16) {
            move_8x16(src, n, 8 * g, row, oct);
        }
    }
}

// SAFETY:
// * ssse3 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[target_feature(enable = "ssse3")]
unsafe fn read8_write16_unrolled<const ROWS: usize>(src: &[u8], n: usize, dst: &mut [&mut [u8]]) {
    for (g, oct) in dst.chunks_exact_mut(8).enumerate() {
        for step in 0..ROWS / 16 {
            move_8x16(src, n, 8 * g, 16 * step, oct);
        }
    }
}

/// 8-byte row reads split into two tiles, 16-byte writes.
#[derive(Debug)]
pub struct Read8Write16Sse {
    channels: usize,
}

impl Read8Write16Sse {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for Read8Write16Sse {
    fn name(&self) -> &'static str {
        "read8_write16_sse"
    }

    fn family(&self) -> Family {
        Family::Sse
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(8, 16)
    }

    fn is_available(&self) -> bool {
        has_ssse3()
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        // SAFETY: checked for ssse3 support.
        unsafe { read8_write16(src, self.channels, shape.plane_len, dst) }
    }
}

/// [`Read8Write16Sse`] with the row loop pinned to `ROWS`.
#[derive(Debug)]
pub struct Read8Write16SseUnrolled<const ROWS: usize> {
    channels: usize,
}

impl<const ROWS: usize> Read8Write16SseUnrolled<ROWS> {
    pub fn new(channels: usize) -> Self {
        let _ = AssertN::<ROWS>::NE_0;
        let _ = AssertN::<ROWS>::MULTIPLE_OF_16;
        Self { channels }
    }
}

impl<const ROWS: usize> Demux for Read8Write16SseUnrolled<ROWS> {
    fn name(&self) -> &'static str {
        "read8_write16_sse_unrolled"
    }

    fn family(&self) -> Family {
        Family::Sse
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(8, 16).with_fixed_rows(ROWS)
    }

    fn is_available(&self) -> bool {
        has_ssse3()
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        self.checked_shape(src, dst);
        // SAFETY: checked for ssse3 support.
        unsafe { read8_write16_unrolled::<ROWS>(src, self.channels, dst) }
    }
}

// SAFETY:
// * ssse3 must be available.
// * `group` must hold 16 planes of at least `row + 16` bytes.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
unsafe fn move_16x16(src: &[u8], n: usize, c: usize, row: usize, group: &mut [&mut [u8]]) {
    let mut rows = [_mm_setzero_si128(); 16];
    for (i, v) in rows.iter_mut().enumerate() {
        *v = sse::load(&src[(row + i) * n + c..]);
    }
    transpose_16x16(&mut rows);
    for (plane, v) in group.iter_mut().zip(rows) {
        sse::store(&mut plane[row..], v);
    }
}

// SAFETY:
// * ssse3 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[target_feature(enable = "ssse3")]
unsafe fn read16_write16(src: &[u8], n: usize, plane_len: usize, dst: &mut [&mut [u8]]) {
    for (g, group) in dst.chunks_exact_mut(16).enumerate() {
        for row in (0..plane_len).step_by(16) {
            move_16x16(src, n, 16 * g, row, group);
        }
    }
}

// SAFETY:
// * ssse3 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[target_feature(enable = "ssse3")]
unsafe fn read16_write16_unrolled<const ROWS: usize>(
    src: &[u8],
    n: usize,
    dst: &mut [&mut [u8]],
) {
    for (g, group) in dst.chunks_exact_mut(16).enumerate() {
        for step in 0..ROWS / 16 {
            move_16x16(src, n, 16 * g, 16 * step, group);
        }
    }
}

/// Full 16x16 register transpose: 16-byte reads and 16-byte writes.
#[derive(Debug)]
pub struct Read16Write16Sse {
    channels: usize,
}

impl Read16Write16Sse {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for Read16Write16Sse {
    fn name(&self) -> &'static str {
        "read16_write16_sse"
    }

    fn family(&self) -> Family {
        Family::Sse
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(16, 16)
    }

    fn is_available(&self) -> bool {
        has_ssse3()
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        // SAFETY: checked for ssse3 support.
        unsafe { read16_write16(src, self.channels, shape.plane_len, dst) }
    }
}

/// [`Read16Write16Sse`] with the row loop pinned to `ROWS`.
#[derive(Debug)]
pub struct Read16Write16SseUnrolled<const ROWS: usize> {
    channels: usize,
}

impl<const ROWS: usize> Read16Write16SseUnrolled<ROWS> {
    pub fn new(channels: usize) -> Self {
        let _ = AssertN::<ROWS>::NE_0;
        let _ = AssertN::<ROWS>::MULTIPLE_OF_16;
        Self { channels }
    }
}

impl<const ROWS: usize> Demux for Read16Write16SseUnrolled<ROWS> {
    fn name(&self) -> &'static str {
        "read16_write16_sse_unrolled"
    }

    fn family(&self) -> Family {
        Family::Sse
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(16, 16).with_fixed_rows(ROWS)
    }

    fn is_available(&self) -> bool {
        has_ssse3()
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        self.checked_shape(src, dst);
        // SAFETY: checked for ssse3 support.
        unsafe { read16_write16_unrolled::<ROWS>(src, self.channels, dst) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::test_utils::*;
    use crate::shape::Shape;

    fn ramp(shape: Shape) -> Vec<u8> {
        (0..shape.block_len()).map(|i| (i * 11 + 1) as u8).collect()
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_one_tile_deep() {
        let strategies: Vec<(Box<dyn Demux>, Shape)> = vec![
            (Box::new(Read4Write4Sse::new(4)), Shape::new(4, 4)),
            (Box::new(Read4Write16Sse::new(4)), Shape::new(4, 16)),
            (Box::new(Read8Write16Sse::new(8)), Shape::new(8, 16)),
            (Box::new(Read8Write16SseUnrolled::<16>::new(8)), Shape::new(8, 16)),
            (Box::new(Read16Write16Sse::new(16)), Shape::new(16, 16)),
            (Box::new(Read16Write16SseUnrolled::<16>::new(16)), Shape::new(16, 16)),
        ];
        for (strategy, shape) in strategies {
            if strategy.is_available() {
                check(strategy.as_ref(), shape, &ramp(shape));
            }
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_wide_blocks() {
        let shape = Shape::new(48, 48);
        let src = ramp(shape);
        let strategies: Vec<Box<dyn Demux>> = vec![
            Box::new(Read4Write4Sse::new(48)),
            Box::new(Read4Write16Sse::new(48)),
            Box::new(Read8Write16Sse::new(48)),
            Box::new(Read8Write16SseUnrolled::<48>::new(48)),
            Box::new(Read16Write16Sse::new(48)),
            Box::new(Read16Write16SseUnrolled::<48>::new(48)),
        ];
        for strategy in strategies {
            if strategy.is_available() {
                check(strategy.as_ref(), shape, &src);
            }
        }
    }

    #[test]
    #[should_panic(expected = "read16_write16_sse")]
    fn test_rejects_narrow_channel_groups() {
        let shape = Shape::new(8, 16);
        let src = ramp(shape);
        let mut out = planes(shape, 0, 0);
        run(&Read16Write16Sse::new(8), &src, &mut out);
    }
}
