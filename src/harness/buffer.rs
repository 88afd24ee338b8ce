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

use bytemuck::Pod;
use bytemuck::Zeroable;
use static_assertions::assert_eq_size;
use static_assertions::const_assert_eq;

use crate::prelude::*;
use crate::shape::Shape;

/// Source bytes written by [`BlockSet::new`].
pub const SRC_FILL: u8 = 0xEE;
/// Destination bytes written by [`BlockSet::new`].
pub const DST_FILL: u8 = 0xDD;

pub const ALIGN: usize = 32;

#[derive(Copy, Clone)]
#[repr(C, align(32))]
struct Chunk([u8; ALIGN]);

assert_eq_size!(Chunk, [u8; ALIGN]);
const_assert_eq!(std::mem::align_of::<Chunk>(), ALIGN);

// SAFETY:
// * is inhabited
// * all bit patterns, including all-zeroes, are valid
// * has no uninit/padding bytes (size equals alignment)
// * u8 is Pod
// * is repr(C)
// * contains no pointer types or interior mutability
unsafe impl Zeroable for Chunk {}
unsafe impl Pod for Chunk {}

/// Byte buffer whose first byte is 32-byte aligned.
pub struct AlignedBytes {
    chunks: Vec<Chunk>,
    len: usize,
}

impl AlignedBytes {
    pub fn zeroed(len: usize) -> Self {
        Self {
            chunks: bytemuck::allocation::zeroed_vec(len.div_ceil(ALIGN)),
            len,
        }
    }

    pub fn filled(len: usize, byte: u8) -> Self {
        let mut buf = Self::zeroed(len);
        buf.fill(byte);
        buf
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.chunks)[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.chunks)[..self.len]
    }

    pub fn fill(&mut self, byte: u8) {
        self.as_mut_slice().fill(byte);
    }
}

impl std::fmt::Debug for AlignedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("AlignedBytes").field("len", &self.len).finish()
    }
}

/// `count` consecutive source blocks of one shape, plus the destination
/// planes for all of them laid out back to back: the planes of block `b`
/// occupy `dst[b * block_len..(b + 1) * block_len]`, plane `c` of that block
/// starting `c * plane_len` bytes in.
#[derive(Debug)]
pub struct BlockSet {
    shape: Shape,
    count: usize,
    src: AlignedBytes,
    dst: AlignedBytes,
}

impl BlockSet {
    /// Allocates the blocks, filling sources with [`SRC_FILL`] and
    /// destinations with [`DST_FILL`].
    pub fn new(shape: Shape, count: usize) -> Result<Self> {
        ensure!(count > 0, "block count must be non-zero");
        ensure!(
            shape.channels > 0 && shape.plane_len > 0,
            "empty block shape {shape}"
        );
        let len = shape
            .block_len()
            .checked_mul(count)
            .ok_or_else(|| anyhow!("{count} blocks of {shape} overflow usize"))?;
        debug!("allocating {count} blocks of {shape}, {len} bytes per buffer");
        Ok(Self {
            shape,
            count,
            src: AlignedBytes::filled(len, SRC_FILL),
            dst: AlignedBytes::filled(len, DST_FILL),
        })
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn src(&self) -> &[u8] {
        self.src.as_slice()
    }

    pub fn src_mut(&mut self) -> &mut [u8] {
        self.src.as_mut_slice()
    }

    pub fn dst(&self) -> &[u8] {
        self.dst.as_slice()
    }

    /// All `channels * count` destination planes, in block order.
    pub fn planes_mut(&mut self) -> Vec<&mut [u8]> {
        self.dst
            .as_mut_slice()
            .chunks_exact_mut(self.shape.plane_len)
            .collect()
    }

    /// The sources of the first `count` blocks, and the planes of each of
    /// those blocks grouped per block.
    pub fn split(&mut self, count: usize) -> (&[u8], Vec<Vec<&mut [u8]>>) {
        assert!(
            count <= self.count,
            "asked for {count} blocks, only {} allocated",
            self.count
        );
        let block_len = self.shape.block_len();
        let plane_len = self.shape.plane_len;
        let planes = self
            .dst
            .as_mut_slice()
            .chunks_exact_mut(block_len)
            .take(count)
            .map(|block| block.chunks_exact_mut(plane_len).collect())
            .collect();
        (&self.src.as_slice()[..count * block_len], planes)
    }
}
