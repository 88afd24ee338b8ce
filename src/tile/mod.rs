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

//! In-register byte transposes.
//!
//! Every operation works within 128-bit lanes, so the same code transposes one
//! tile in an `__m128i` or two independent tiles (usually the same channels
//! over consecutive row ranges) in an `__m256i`.
//!
//! Naming: a register holds four dwords; a "tile" is a register read as a 4x4
//! byte matrix whose rows are its dwords.

pub mod avx2;
pub mod sse;

pub use sse::split_8x4;
pub use sse::transpose_8x16;

/// A SIMD register that can be transposed lane-wise.
///
/// The methods carry no `#[target_feature]` of their own; they are always
/// inlined into a caller that enables the feature set of the implementor
/// (ssse3 for `__m128i`, avx2 for `__m256i`).
pub trait Tile: Copy {
    /// Transposes the 4x4 byte matrix in each 128-bit lane: byte `j` of dword
    /// `i` moves to byte `i` of dword `j`.
    ///
    /// # Safety
    /// The CPU must support the implementor's instruction set.
    unsafe fn transpose_bytes(self) -> Self;

    /// Transposes a 4x4 dword matrix held in four registers, per 128-bit lane:
    /// dword `j` of `rows[i]` moves to dword `i` of `rows[j]`.
    ///
    /// # Safety
    /// The CPU must support the implementor's instruction set.
    unsafe fn transpose_dwords(rows: &mut [Self; 4]);
}

/// 16x16 byte transpose: `rows[r]` holds 16 channels of row `r` on the way
/// in and 16 rows of channel `r` on the way out.
///
/// Dword-transpose each group of four rows into a 4x4 grid of tiles,
/// byte-transpose all sixteen tiles, then dword-transpose the grid.
///
/// # Safety
/// The CPU must support `V`'s instruction set.
#[allow(unsafe_op_in_unsafe_fn)]
#[inline(always)]
pub unsafe fn transpose_16x16<V: Tile>(rows: &mut [V; 16]) {
    let mut grid = [[rows[0]; 4]; 4];
    for (group, tiles) in rows.chunks_exact(4).zip(grid.iter_mut()) {
        *tiles = [group[0], group[1], group[2], group[3]];
        V::transpose_dwords(tiles);
        for tile in tiles.iter_mut() {
            *tile = tile.transpose_bytes();
        }
    }

    for (col, out) in rows.chunks_exact_mut(4).enumerate() {
        let mut tiles = [grid[0][col], grid[1][col], grid[2][col], grid[3][col]];
        V::transpose_dwords(&mut tiles);
        out.copy_from_slice(&tiles);
    }
}
