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

use std::arch::x86_64::__m128i;
use std::arch::x86_64::_mm_castps_si128;
use std::arch::x86_64::_mm_castsi128_ps;
use std::arch::x86_64::_mm_loadu_si128;
use std::arch::x86_64::_mm_set_epi64x;
use std::arch::x86_64::_mm_setr_epi8;
use std::arch::x86_64::_mm_setr_epi32;
use std::arch::x86_64::_mm_shuffle_epi8;
use std::arch::x86_64::_mm_shuffle_ps;
use std::arch::x86_64::_mm_storeu_si128;
use std::arch::x86_64::_mm_unpackhi_epi32;
use std::arch::x86_64::_mm_unpackhi_epi64;
use std::arch::x86_64::_mm_unpacklo_epi32;
use std::arch::x86_64::_mm_unpacklo_epi64;

use crate::tile::Tile;
use crate::words;

impl Tile for __m128i {
    // SAFETY:
    // * ssse3 must be available.
    #[allow(unsafe_op_in_unsafe_fn)]
    #[inline(always)]
    unsafe fn transpose_bytes(self) -> Self {
        _mm_shuffle_epi8(
            self,
            _mm_setr_epi8(0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15),
        )
    }

    // SAFETY:
    // * sse2 must be available.
    #[allow(unsafe_op_in_unsafe_fn)]
    #[inline(always)]
    unsafe fn transpose_dwords(rows: &mut [Self; 4]) {
        let [a, b, c, d] = *rows;

        // t0  b1 a1 b0 a0
        // t1  d1 c1 d0 c0
        // t2  b3 a3 b2 a2
        // t3  d3 c3 d2 c2
        let t0 = _mm_unpacklo_epi32(a, b);
        let t1 = _mm_unpacklo_epi32(c, d);
        let t2 = _mm_unpackhi_epi32(a, b);
        let t3 = _mm_unpackhi_epi32(c, d);

        *rows = [
            _mm_unpacklo_epi64(t0, t1),
            _mm_unpackhi_epi64(t0, t1),
            _mm_unpacklo_epi64(t2, t3),
            _mm_unpackhi_epi64(t2, t3),
        ];
    }
}

// SAFETY:
// * sse must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
unsafe fn _mm_shufps_epi32<const MASK: i32>(a: __m128i, b: __m128i) -> __m128i {
    _mm_castps_si128(_mm_shuffle_ps::<MASK>(
        _mm_castsi128_ps(a),
        _mm_castsi128_ps(b),
    ))
}

/// Loads the first 16 bytes of `src`.
///
/// # Safety
/// sse2 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
pub unsafe fn load(src: &[u8]) -> __m128i {
    let src = &src[..16];
    _mm_loadu_si128(src.as_ptr().cast::<__m128i>())
}

/// Stores `v` into the first 16 bytes of `dst`.
///
/// # Safety
/// sse2 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
pub unsafe fn store(dst: &mut [u8], v: __m128i) {
    let dst = &mut dst[..16];
    _mm_storeu_si128(dst.as_mut_ptr().cast::<__m128i>(), v);
}

/// Reads four 4-byte rows starting at `src[at]`, `stride` bytes apart, into
/// one tile (row `i` in dword `i`).
///
/// # Safety
/// sse2 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
pub unsafe fn gather_4x4(src: &[u8], at: usize, stride: usize) -> __m128i {
    _mm_setr_epi32(
        words::load_u32(src, at) as i32,
        words::load_u32(src, at + stride) as i32,
        words::load_u32(src, at + 2 * stride) as i32,
        words::load_u32(src, at + 3 * stride) as i32,
    )
}

/// Reads four 8-byte rows starting at `src[at]`, `stride` bytes apart, two
/// rows per register.
///
/// # Safety
/// sse2 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
pub unsafe fn gather_8x4(src: &[u8], at: usize, stride: usize) -> (__m128i, __m128i) {
    let w0 = words::load_u64(src, at) as i64;
    let w1 = words::load_u64(src, at + stride) as i64;
    let w2 = words::load_u64(src, at + 2 * stride) as i64;
    let w3 = words::load_u64(src, at + 3 * stride) as i64;
    (_mm_set_epi64x(w1, w0), _mm_set_epi64x(w3, w2))
}

/// Splits four 8-byte rows, packed two per register, into the tile of
/// channels 0..4 and the tile of channels 4..8.
///
/// # Safety
/// sse2 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
pub unsafe fn split_8x4(x0: __m128i, x1: __m128i) -> (__m128i, __m128i) {
    // x0  r1[4..8] r1[0..4] r0[4..8] r0[0..4]
    // x1  r3[4..8] r3[0..4] r2[4..8] r2[0..4]
    let lo = _mm_shufps_epi32::<0b10_00_10_00>(x0, x1);
    let hi = _mm_shufps_epi32::<0b11_01_11_01>(x0, x1);
    (lo, hi)
}

/// Transposes four rows of 8 channels into two byte-transposed tiles: dword
/// `j` of the first holds rows `0..4` of channel `j`, the second covers
/// channels 4..8.
///
/// # Safety
/// ssse3 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
pub unsafe fn transpose_8x4(x0: __m128i, x1: __m128i) -> (__m128i, __m128i) {
    let (lo, hi) = split_8x4(x0, x1);
    (lo.transpose_bytes(), hi.transpose_bytes())
}

/// 8x16 byte transpose. `rows[k]` holds rows `2k` and `2k + 1` of 8 channels;
/// the result holds the 16 rows of channel `c` in register `c`.
///
/// # Safety
/// ssse3 must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
pub unsafe fn transpose_8x16(rows: [__m128i; 8]) -> [__m128i; 8] {
    let mut lo = [rows[0]; 4];
    let mut hi = [rows[0]; 4];
    for (g, pair) in rows.chunks_exact(2).enumerate() {
        (lo[g], hi[g]) = transpose_8x4(pair[0], pair[1]);
    }
    __m128i::transpose_dwords(&mut lo);
    __m128i::transpose_dwords(&mut hi);
    [lo[0], lo[1], lo[2], lo[3], hi[0], hi[1], hi[2], hi[3]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::transpose_16x16;
    use crate::tile::test_utils::m128i_bytes;

    fn ramp(n: usize) -> Vec<u8> {
        (0..n).map(|i| i as u8).collect()
    }

    // Plane `c` of a row-major block with `channels` columns.
    fn column(src: &[u8], channels: usize, c: usize) -> Vec<u8> {
        src.iter().skip(c).step_by(channels).copied().collect()
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_transpose_bytes_canonical() {
        if !is_x86_feature_detected!("ssse3") {
            return;
        }
        let src = ramp(16);
        let out = unsafe { m128i_bytes(load(&src).transpose_bytes()) };
        assert_eq!(out, [0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15]);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_transpose_dwords() {
        let src = ramp(64);
        let mut rows: [__m128i; 4] = std::array::from_fn(|i| unsafe { load(&src[16 * i..]) });
        unsafe { __m128i::transpose_dwords(&mut rows) };
        for (j, row) in rows.iter().enumerate() {
            let bytes = unsafe { m128i_bytes(*row) };
            for (i, dword) in bytes.chunks_exact(4).enumerate() {
                let base = (16 * i + 4 * j) as u8;
                assert_eq!(dword, [base, base + 1, base + 2, base + 3], "row {j}");
            }
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_gather_4x4() {
        let src = ramp(64);
        let tile = unsafe { m128i_bytes(gather_4x4(&src, 4, 16)) };
        assert_eq!(tile, [4, 5, 6, 7, 20, 21, 22, 23, 36, 37, 38, 39, 52, 53, 54, 55]);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_split_8x4() {
        let src = ramp(32);
        let (x0, x1) = unsafe { gather_8x4(&src, 0, 8) };
        let (lo, hi) = unsafe { split_8x4(x0, x1) };
        let (lo, hi) = unsafe { (m128i_bytes(lo), m128i_bytes(hi)) };
        assert_eq!(lo, [0, 1, 2, 3, 8, 9, 10, 11, 16, 17, 18, 19, 24, 25, 26, 27]);
        assert_eq!(hi, [4, 5, 6, 7, 12, 13, 14, 15, 20, 21, 22, 23, 28, 29, 30, 31]);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_transpose_8x16() {
        if !is_x86_feature_detected!("ssse3") {
            return;
        }
        let src = ramp(128);
        let rows: [__m128i; 8] = std::array::from_fn(|k| unsafe { load(&src[16 * k..]) });
        let out = unsafe { transpose_8x16(rows) };
        for (c, v) in out.iter().enumerate() {
            assert_eq!(unsafe { m128i_bytes(*v) }.to_vec(), column(&src, 8, c));
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_transpose_16x16() {
        if !is_x86_feature_detected!("ssse3") {
            return;
        }
        let src: Vec<u8> = (0..256).map(|i| (i * 7 + 3) as u8).collect();
        let mut rows: [__m128i; 16] = std::array::from_fn(|r| unsafe { load(&src[16 * r..]) });
        unsafe { transpose_16x16(&mut rows) };
        for (c, v) in rows.iter().enumerate() {
            assert_eq!(unsafe { m128i_bytes(*v) }.to_vec(), column(&src, 16, c));
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_store_leaves_tail() {
        let src = ramp(16);
        let mut dst = [0xaau8; 20];
        unsafe { store(&mut dst, load(&src)) };
        assert_eq!(&dst[..16], &src[..]);
        assert_eq!(&dst[16..], &[0xaa; 4]);
    }
}
