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

//! Byte-at-a-time strategies. They only differ in loop order and indexing.

#![allow(clippy::needless_range_loop)]

use itertools::izip;

use crate::demux::Demux;
use crate::demux::Family;
use crate::shape::Requirements;
use crate::utils::AssertN;

/// One flat pass over the source with a running (channel, row) cursor.
#[derive(Debug)]
pub struct Reference {
    channels: usize,
}

impl Reference {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for Reference {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn family(&self) -> Family {
        Family::Scalar
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::ANY
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        self.checked_shape(src, dst);
        let mut channel = 0;
        let mut row = 0;
        for b in src {
            dst[channel][row] = *b;
            channel += 1;
            if channel == self.channels {
                channel = 0;
                row += 1;
            }
        }
    }
}

/// Source order: a running source index, channels in the inner loop.
#[derive(Debug)]
pub struct SrcFirstCursor {
    channels: usize,
}

impl SrcFirstCursor {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for SrcFirstCursor {
    fn name(&self) -> &'static str {
        "src_first_cursor"
    }

    fn family(&self) -> Family {
        Family::Scalar
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::ANY
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        self.checked_shape(src, dst);
        let mut src_pos = 0;
        let mut row = 0;
        while src_pos < src.len() {
            for plane in dst.iter_mut() {
                plane[row] = src[src_pos];
                src_pos += 1;
            }
            row += 1;
        }
    }
}

/// Source order with the `r * N + c` index computed per byte.
#[derive(Debug)]
pub struct SrcFirstIndexed {
    channels: usize,
}

impl SrcFirstIndexed {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for SrcFirstIndexed {
    fn name(&self) -> &'static str {
        "src_first_indexed"
    }

    fn family(&self) -> Family {
        Family::Scalar
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::ANY
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        for r in 0..shape.plane_len {
            for c in 0..shape.channels {
                dst[c][r] = src[shape.offset(r, c)];
            }
        }
    }
}

/// Source order in one flat loop; the destination comes from `i % N` and
/// `i / N`.
#[derive(Debug)]
pub struct SrcFirstDivMod {
    channels: usize,
}

impl SrcFirstDivMod {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for SrcFirstDivMod {
    fn name(&self) -> &'static str {
        "src_first_divmod"
    }

    fn family(&self) -> Family {
        Family::Scalar
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::ANY
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        self.checked_shape(src, dst);
        for (i, b) in src.iter().enumerate() {
            dst[i % self.channels][i / self.channels] = *b;
        }
    }
}

/// Destination order: channel outer, row inner, both indexed.
#[derive(Debug)]
pub struct DstFirstIndexed {
    channels: usize,
}

impl DstFirstIndexed {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for DstFirstIndexed {
    fn name(&self) -> &'static str {
        "dst_first_indexed"
    }

    fn family(&self) -> Family {
        Family::Scalar
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::ANY
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        for c in 0..shape.channels {
            for r in 0..shape.plane_len {
                dst[c][r] = src[shape.offset(r, c)];
            }
        }
    }
}

/// Destination order with a running source offset advanced by N.
#[derive(Debug)]
pub struct DstFirstStrided {
    channels: usize,
}

impl DstFirstStrided {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for DstFirstStrided {
    fn name(&self) -> &'static str {
        "dst_first_strided"
    }

    fn family(&self) -> Family {
        Family::Scalar
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::ANY
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        for (c, plane) in dst.iter_mut().enumerate() {
            let column = src[c..].iter().step_by(self.channels);
            for (d, s) in izip!(&mut plane[..shape.plane_len], column) {
                *d = *s;
            }
        }
    }
}

/// Destination order with the plane slice hoisted out of the row loop.
#[derive(Debug)]
pub struct DstFirstPlane {
    channels: usize,
}

impl DstFirstPlane {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for DstFirstPlane {
    fn name(&self) -> &'static str {
        "dst_first_plane"
    }

    fn family(&self) -> Family {
        Family::Scalar
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::ANY
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        for (c, plane) in dst.iter_mut().enumerate() {
            let plane = &mut plane[..shape.plane_len];
            for r in 0..shape.plane_len {
                plane[r] = src[shape.offset(r, c)];
            }
        }
    }
}

/// [`DstFirstIndexed`] with the row count pinned to `ROWS`.
#[derive(Debug)]
pub struct DstFirstFixed<const ROWS: usize> {
    channels: usize,
}

impl<const ROWS: usize> DstFirstFixed<ROWS> {
    pub fn new(channels: usize) -> Self {
        let _ = AssertN::<ROWS>::NE_0;
        Self { channels }
    }
}

impl<const ROWS: usize> Demux for DstFirstFixed<ROWS> {
    fn name(&self) -> &'static str {
        "dst_first_fixed"
    }

    fn family(&self) -> Family {
        Family::Scalar
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::ANY.with_fixed_rows(ROWS)
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        self.checked_shape(src, dst);
        let n = self.channels;
        for c in 0..n {
            for r in 0..ROWS {
                dst[c][r] = src[r * n + c];
            }
        }
    }
}

/// [`DstFirstPlane`] with the row count pinned to `ROWS`.
#[derive(Debug)]
pub struct DstFirstPlaneFixed<const ROWS: usize> {
    channels: usize,
}

impl<const ROWS: usize> DstFirstPlaneFixed<ROWS> {
    pub fn new(channels: usize) -> Self {
        let _ = AssertN::<ROWS>::NE_0;
        Self { channels }
    }
}

impl<const ROWS: usize> Demux for DstFirstPlaneFixed<ROWS> {
    fn name(&self) -> &'static str {
        "dst_first_plane_fixed"
    }

    fn family(&self) -> Family {
        Family::Scalar
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::ANY.with_fixed_rows(ROWS)
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        self.checked_shape(src, dst);
        let n = self.channels;
        for (c, plane) in dst.iter_mut().enumerate() {
            let plane = &mut plane[..ROWS];
            for r in 0..ROWS {
                plane[r] = src[r * n + c];
            }
        }
    }
}

/// Moves whole planes of `ROWS` bytes, `GROUP` channels per outer iteration.
/// `GROUP == 32` covers the reference workload in a single iteration.
#[derive(Debug)]
pub struct Unrolled<const GROUP: usize, const ROWS: usize> {
    channels: usize,
}

impl<const GROUP: usize, const ROWS: usize> Unrolled<GROUP, ROWS> {
    pub fn new(channels: usize) -> Self {
        let _ = AssertN::<GROUP>::NE_0;
        let _ = AssertN::<ROWS>::NE_0;
        Self { channels }
    }
}

#[inline(always)]
fn move_plane<const ROWS: usize>(src: &[u8], channels: usize, c: usize, plane: &mut [u8]) {
    let column: [u8; ROWS] = std::array::from_fn(|r| src[r * channels + c]);
    plane[..ROWS].copy_from_slice(&column);
}

impl<const GROUP: usize, const ROWS: usize> Demux for Unrolled<GROUP, ROWS> {
    fn name(&self) -> &'static str {
        match GROUP {
            1 => "unrolled_1",
            2 => "unrolled_2",
            4 => "unrolled_4",
            8 => "unrolled_8",
            16 => "unrolled_16",
            32 => "unrolled_full",
            _ => "unrolled",
        }
    }

    fn family(&self) -> Family {
        Family::Scalar
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::tiled(GROUP, 1).with_fixed_rows(ROWS)
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        self.checked_shape(src, dst);
        for (g, planes) in dst.chunks_exact_mut(GROUP).enumerate() {
            for (j, plane) in planes.iter_mut().enumerate() {
                move_plane::<ROWS>(src, self.channels, g * GROUP + j, plane);
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
    fn test_ragged_shape_all_loop_orders() {
        let shape = Shape::new(5, 3);
        let src: Vec<u8> = (0..15).collect();
        let strategies: Vec<Box<dyn Demux>> = vec![
            Box::new(Reference::new(5)),
            Box::new(SrcFirstCursor::new(5)),
            Box::new(SrcFirstIndexed::new(5)),
            Box::new(SrcFirstDivMod::new(5)),
            Box::new(DstFirstIndexed::new(5)),
            Box::new(DstFirstStrided::new(5)),
            Box::new(DstFirstPlane::new(5)),
            Box::new(DstFirstFixed::<3>::new(5)),
            Box::new(DstFirstPlaneFixed::<3>::new(5)),
            Box::new(Unrolled::<1, 3>::new(5)),
        ];
        for strategy in &strategies {
            check(strategy.as_ref(), shape, &src);
        }
    }

    #[test]
    fn test_unrolled_groups() {
        let shape = Shape::new(32, 8);
        let src: Vec<u8> = (0..shape.block_len()).map(|i| (i * 3) as u8).collect();
        check(&Unrolled::<2, 8>::new(32), shape, &src);
        check(&Unrolled::<8, 8>::new(32), shape, &src);
        check(&Unrolled::<32, 8>::new(32), shape, &src);
    }

    #[test]
    fn test_unrolled_requirements() {
        assert!(Unrolled::<16, 64>::new(32).supports(Shape::new(32, 64)));
        assert!(Unrolled::<16, 64>::new(16).supports(Shape::new(16, 64)));
        assert!(!Unrolled::<16, 64>::new(8).supports(Shape::new(8, 64)));
        assert!(!Unrolled::<16, 64>::new(32).supports(Shape::new(32, 32)));
        assert!(!Unrolled::<16, 64>::new(32).supports(Shape::new(16, 64)));
    }

    #[test]
    #[should_panic(expected = "dst_first_fixed")]
    fn test_fixed_rows_rejects_other_lengths() {
        let shape = Shape::new(4, 8);
        let src = vec![0u8; shape.block_len()];
        let mut out = planes(shape, 0, 0);
        run(&DstFirstFixed::<4>::new(4), &src, &mut out);
    }
}
