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

//! Little-endian word packing for the word-coalesced strategies.
//!
//! Byte `i` of the input always ends up at bit `8 * i` of the word, so a word
//! built here and written with `to_le_bytes` reproduces the input byte order
//! on any target.

/// Packs 4 bytes into a u32, `bytes[0]` least significant.
#[inline(always)]
pub const fn pack_u32(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// Packs 8 bytes into a u64, `bytes[0]` least significant.
#[inline(always)]
pub const fn pack_u64(bytes: [u8; 8]) -> u64 {
    u64::from_le_bytes(bytes)
}

/// Byte `lane` of a little-endian u32 (lane 0 is the least significant).
#[inline(always)]
pub const fn byte_lane(word: u32, lane: usize) -> u8 {
    (word >> (8 * lane)) as u8
}

/// Loads the little-endian u32 at `src[at..at + 4]`.
#[inline(always)]
pub fn load_u32(src: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&src[at..at + 4]);
    u32::from_le_bytes(bytes)
}

/// Loads the little-endian u64 at `src[at..at + 8]`.
#[inline(always)]
pub fn load_u64(src: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&src[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// Gathers `N` bytes spaced `stride` apart starting at `src[start]`.
#[inline(always)]
pub fn gather<const N: usize>(src: &[u8], start: usize, stride: usize) -> [u8; N] {
    std::array::from_fn(|i| src[start + i * stride])
}

/// Transposes a 4x4 byte matrix held as four little-endian row words.
///
/// Returns the column words: byte `r` of result `c` is byte `c` of `rows[r]`.
#[inline(always)]
pub const fn transpose_4x4(rows: [u32; 4]) -> [u32; 4] {
    let mut cols = [0u32; 4];
    let mut c = 0;
    while c < 4 {
        cols[c] = pack_u32([
            byte_lane(rows[0], c),
            byte_lane(rows[1], c),
            byte_lane(rows[2], c),
            byte_lane(rows[3], c),
        ]);
        c += 1;
    }
    cols
}
