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

//! 256-bit strategies. Tiles for rows `0..16` and `16..32` of the same channels
//! are built in 128-bit registers, combined into one 256-bit register and
//! dword-transposed together, so each store writes 32 bytes of one plane.

use std::arch::x86_64::__m256i;
use std::arch::x86_64::_mm_setzero_si128;
use std::arch::x86_64::_mm256_setzero_si256;

use crate::demux::Demux;
use crate::demux::Family;
use crate::shape::Requirements;
use crate::tile::Tile;
use crate::tile::avx2;
use crate::tile::sse;
use crate::utils::AssertN;

fn has_avx2() -> bool {
    is_x86_feature_detected!("avx2")
}

// SAFETY:
// * avx2 must be available.
// * `quad` must hold 4 planes of at least `row + 32` bytes.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
unsafe fn move_4x32(src: &[u8], n: usize, c: usize, row: usize, quad: &mut [&mut [u8]]) {
    let mut w = [_mm256_setzero_si256(); 4];
    for (i, v) in w.iter_mut().enumerate() {
        let lo = sse::gather_4x4(src, (row + 4 * i) * n + c, n).transpose_bytes();
        let hi = sse::gather_4x4(src, (row + 16 + 4 * i) * n + c, n).transpose_bytes();
        *v = avx2::combine(lo, hi);
    }
    __m256i::transpose_dwords(&mut w);
    for (plane, v) in quad.iter_mut().zip(w) {
        avx2::store(&mut plane[row..], v);
    }
}

// SAFETY:
// * avx2 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[target_feature(enable = "avx2")]
unsafe fn read4_write32(src: &[u8], n: usize, plane_len: usize, dst: &mut [&mut [u8]]) {
    for (g, quad) in dst.chunks_exact_mut(4).enumerate() {
        for row in (0..plane_len).step_by(32) {
            move_4x32(src, n, 4 * g, row, quad);
        }
    }
}

/// 4-byte row reads, 32-byte writes.
#[derive(Debug)]
pub struct Read4Write32Avx {
    channels: usize,
}

impl Read4Write32Avx {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for Read4Write32Avx {
    fn name(&self) -> &'static str {
        "read4_write32_avx"
    }

    fn family(&self) -> Family {
        Family::Avx
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(4, 32)
    }

    fn is_available(&self) -> bool {
        has_avx2()
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        // SAFETY: checked for avx2 support.
        unsafe { read4_write32(src, self.channels, shape.plane_len, dst) }
    }
}

// SAFETY:
// * avx2 must be available.
// * `oct` must hold 8 planes of at least `row + 32` bytes.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
unsafe fn move_8x32(src: &[u8], n: usize, c: usize, row: usize, oct: &mut [&mut [u8]]) {
    let mut lo = [_mm_setzero_si128(); 8];
    let mut hi = [_mm_setzero_si128(); 8];
    for i in 0..4 {
        let (x0, x1) = sse::gather_8x4(src, (row + 4 * i) * n + c, n);
        (lo[i], lo[4 + i]) = sse::transpose_8x4(x0, x1);
        let (x0, x1) = sse::gather_8x4(src, (row + 16 + 4 * i) * n + c, n);
        (hi[i], hi[4 + i]) = sse::transpose_8x4(x0, x1);
    }

    // Channels 0..4 and 4..8.
    let mut a = [_mm256_setzero_si256(); 4];
    let mut b = [_mm256_setzero_si256(); 4];
    for i in 0..4 {
        a[i] = avx2::combine(lo[i], hi[i]);
        b[i] = avx2::combine(lo[4 + i], hi[4 + i]);
    }
    __m256i::transpose_dwords(&mut a);
    __m256i::transpose_dwords(&mut b);

    for (plane, v) in oct.iter_mut().zip(a.into_iter().chain(b)) {
        avx2::store(&mut plane[row..], v);
    }
}

// SAFETY:
// * avx2 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[target_feature(enable = "avx2")]
unsafe fn read8_write32(src: &[u8], n: usize, plane_len: usize, dst: &mut [&mut [u8]]) {
    for (g, oct) in dst.chunks_exact_mut(8).enumerate() {
        for row in (0..plane_len).step_by(32) {
            move_8x32(src, n, 8 * g, row, oct);
        }
    }
}

// SAFETY:
// * avx2 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[target_feature(enable = "avx2")]
unsafe fn read8_write32_unrolled<const ROWS: usize>(src: &[u8], n: usize, dst: &mut [&mut [u8]]) {
    for (g, oct) in dst.chunks_exact_mut(8).enumerate() {
        for step in 0..ROWS / 32 {
            move_8x32(src, n, 8 * g, 32 * step, oct);
        }
    }
}

/// 8-byte row reads, 32-byte writes.
#[derive(Debug)]
pub struct Read8Write32Avx {
    channels: usize,
}

impl Read8Write32Avx {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for Read8Write32Avx {
    fn name(&self) -> &'static str {
        "read8_write32_avx"
    }

    fn family(&self) -> Family {
        Family::Avx
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(8, 32)
    }

    fn is_available(&self) -> bool {
        has_avx2()
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        // SAFETY: checked for avx2 support.
        unsafe { read8_write32(src, self.channels, shape.plane_len, dst) }
    }
}

/// [`Read8Write32Avx`] with the row loop pinned to `ROWS`.
#[derive(Debug)]
pub struct Read8Write32AvxUnrolled<const ROWS: usize> {
    channels: usize,
}

impl<const ROWS: usize> Read8Write32AvxUnrolled<ROWS> {
    pub fn new(channels: usize) -> Self {
        let _ = AssertN::<ROWS>::NE_0;
        let _ = AssertN::<ROWS>::MULTIPLE_OF_32;
        Self { channels }
    }
}

impl<const ROWS: usize> Demux for Read8Write32AvxUnrolled<ROWS> {
    fn name(&self) -> &'static str {
        "read8_write32_avx_unrolled"
    }

    fn family(&self) -> Family {
        Family::Avx
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(8, 32).with_fixed_rows(ROWS)
    }

    fn is_available(&self) -> bool {
        has_avx2()
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        self.checked_shape(src, dst);
        // SAFETY: checked for avx2 support.
        unsafe { read8_write32_unrolled::<ROWS>(src, self.channels, dst) }
    }
}
