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

//! 256-bit tiles: the low lane and the high lane are transposed independently.

use std::arch::x86_64::__m128i;
use std::arch::x86_64::__m256i;
use std::arch::x86_64::_mm256_loadu_si256;
use std::arch::x86_64::_mm256_set_m128i;
use std::arch::x86_64::_mm256_setr_epi8;
use std::arch::x86_64::_mm256_shuffle_epi8;
use std::arch::x86_64::_mm256_storeu_si256;
use std::arch::x86_64::_mm256_unpackhi_epi32;
use std::arch::x86_64::_mm256_unpackhi_epi64;
use std::arch::x86_64::_mm256_unpacklo_epi32;
use std::arch::x86_64::_mm256_unpacklo_epi64;

use crate::tile::Tile;

impl Tile for __m256i {
    // SAFETY:
    // * avx2 must be available.
    #[allow(unsafe_op_in_unsafe_fn)]
    #[inline(always)]
    unsafe fn transpose_bytes(self) -> Self {
        _mm256_shuffle_epi8(
            self,
            _mm256_setr_epi8(
                0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15, 0, 4, 8, 12, 1, 5, 9, 13, 2,
                6, 10, 14, 3, 7, 11, 15,
            ),
        )
    }

    // SAFETY:
    // * avx2 must be available.
    #[allow(unsafe_op_in_unsafe_fn)]
    #[inline(always)]
    unsafe fn transpose_dwords(rows: &mut [Self; 4]) {
        let [a, b, c, d] = *rows;
        let t0 = _mm256_unpacklo_epi32(a, b);
        let t1 = _mm256_unpacklo_epi32(c, d);
        let t2 = _mm256_unpackhi_epi32(a, b);
        let t3 = _mm256_unpackhi_epi32(c, d);

        *rows = [
            _mm256_unpacklo_epi64(t0, t1),
            _mm256_unpackhi_epi64(t0, t1),
            _mm256_unpacklo_epi64(t2, t3),
            _mm256_unpackhi_epi64(t2, t3),
        ];
    }
}

/// Places `lo` in the low 128-bit lane and `hi` in the high lane.
///
/// # Safety
/// avx must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
pub unsafe fn combine(lo: __m128i, hi: __m128i) -> __m256i {
    _mm256_set_m128i(hi, lo)
}

/// Loads the first 32 bytes of `src`.
///
/// # Safety
/// avx must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
pub unsafe fn load(src: &[u8]) -> __m256i {
    let src = &src[..32];
    _mm256_loadu_si256(src.as_ptr().cast::<__m256i>())
}

/// Stores `v` into the first 32 bytes of `dst`.
///
/// # Safety
/// avx must be available.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
pub unsafe fn store(dst: &mut [u8], v: __m256i) {
    let dst = &mut dst[..32];
    _mm256_storeu_si256(dst.as_mut_ptr().cast::<__m256i>(), v);
}
