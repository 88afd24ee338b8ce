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

//! Demux strategies.
//!
//! Every strategy turns one row-major source block of `channels` columns into
//! `channels` planes, so that `dst[c][r] == src[r * channels + c]`. They differ
//! only in iteration order, access width and use of SIMD registers; any two
//! transposing strategies that accept a shape produce identical planes.

use std::fmt;

use crate::shape;
use crate::shape::Requirements;
use crate::shape::Shape;

pub mod coalesced;
pub mod copy;
pub mod scalar;

#[cfg(target_arch = "x86_64")]
pub mod avx;
#[cfg(target_arch = "x86_64")]
pub mod sse;

/// Channel count of the reference workload.
pub const DEFAULT_CHANNELS: usize = 32;
/// Plane length of the reference workload, and the row count the fixed-shape
/// strategies in [`registry`] are built for.
pub const DEFAULT_PLANE_LEN: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Family {
    Scalar,
    Coalesced,
    Sse,
    Avx,
    /// Plain block copies; not a transpose.
    Copy,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Scalar => "scalar",
            Self::Coalesced => "coalesced",
            Self::Sse => "sse",
            Self::Avx => "avx",
            Self::Copy => "copy",
        };
        f.write_str(s)
    }
}

pub trait Demux: Send + Sync {
    fn name(&self) -> &'static str;

    fn family(&self) -> Family;

    fn channels(&self) -> usize;

    fn requirements(&self) -> Requirements;

    /// Whether the running CPU has the instructions this strategy needs.
    fn is_available(&self) -> bool {
        true
    }

    fn supports(&self, shape: Shape) -> bool {
        shape.channels == self.channels() && self.requirements().check(shape).is_ok()
    }

    /// Checks `src` and `dst` without touching them.
    fn validate(&self, src: &[u8], dst: &[&mut [u8]]) -> anyhow::Result<Shape> {
        shape::validate(self.channels(), self.requirements(), src, dst)
    }

    /// Panicking form of [`Demux::validate`], run by every strategy before
    /// its first write.
    fn checked_shape(&self, src: &[u8], dst: &[&mut [u8]]) -> Shape {
        assert!(
            self.is_available(),
            "{}: instruction set not available on this CPU",
            self.name()
        );
        match self.validate(src, dst) {
            Ok(shape) => shape,
            Err(e) => panic!("{}: {e:#}", self.name()),
        }
    }

    /// Writes row `r` of column `c` of `src` to `dst[c][r]`.
    ///
    /// Panics before writing anything if the shape does not satisfy
    /// [`Demux::requirements`], `dst` does not hold exactly
    /// [`Demux::channels`] planes of at least `src.len() / channels` bytes, or
    /// the CPU lacks the strategy's instructions. Bytes past the plane length
    /// are never written.
    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]);
}

impl fmt::Debug for dyn Demux {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Demux")
            .field("name", &self.name())
            .field("family", &self.family())
            .field("channels", &self.channels())
            .finish()
    }
}

/// The canonical strategy, used as ground truth.
pub fn reference(channels: usize) -> Box<dyn Demux> {
    Box::new(scalar::Reference::new(channels))
}

/// Every transposing strategy for `channels`, available or not. Fixed-shape
/// variants are built for [`DEFAULT_PLANE_LEN`] rows.
pub fn registry(channels: usize) -> Vec<Box<dyn Demux>> {
    const ROWS: usize = DEFAULT_PLANE_LEN;

    #[allow(unused_mut)]
    let mut all: Vec<Box<dyn Demux>> = vec![
        Box::new(scalar::Reference::new(channels)),
        Box::new(scalar::SrcFirstCursor::new(channels)),
        Box::new(scalar::SrcFirstIndexed::new(channels)),
        Box::new(scalar::SrcFirstDivMod::new(channels)),
        Box::new(scalar::DstFirstIndexed::new(channels)),
        Box::new(scalar::DstFirstStrided::new(channels)),
        Box::new(scalar::DstFirstPlane::new(channels)),
        Box::new(scalar::DstFirstFixed::<ROWS>::new(channels)),
        Box::new(scalar::DstFirstPlaneFixed::<ROWS>::new(channels)),
        Box::new(scalar::Unrolled::<1, ROWS>::new(channels)),
        Box::new(scalar::Unrolled::<2, ROWS>::new(channels)),
        Box::new(scalar::Unrolled::<4, ROWS>::new(channels)),
        Box::new(scalar::Unrolled::<8, ROWS>::new(channels)),
        Box::new(scalar::Unrolled::<16, ROWS>::new(channels)),
        Box::new(scalar::Unrolled::<32, ROWS>::new(channels)),
        Box::new(coalesced::Write4::new(channels)),
        Box::new(coalesced::Write8::new(channels)),
        Box::new(coalesced::Read4Write4::new(channels)),
        Box::new(coalesced::Read4Write4Unrolled::<ROWS>::new(channels)),
    ];

    #[cfg(target_arch = "x86_64")]
    {
        all.push(Box::new(sse::Read4Write4Sse::new(channels)));
        all.push(Box::new(sse::Read4Write16Sse::new(channels)));
        all.push(Box::new(sse::Read8Write16Sse::new(channels)));
        all.push(Box::new(sse::Read8Write16SseUnrolled::<ROWS>::new(channels)));
        all.push(Box::new(sse::Read16Write16Sse::new(channels)));
        all.push(Box::new(sse::Read16Write16SseUnrolled::<ROWS>::new(channels)));
        all.push(Box::new(avx::Read4Write32Avx::new(channels)));
        all.push(Box::new(avx::Read8Write32Avx::new(channels)));
        all.push(Box::new(avx::Read8Write32AvxUnrolled::<ROWS>::new(channels)));
    }

    all
}

/// Bulk-copy speed references. These copy contiguous runs and are not
/// transposes; see [`copy`].
pub fn copy_references(channels: usize) -> Vec<Box<dyn Demux>> {
    #[allow(unused_mut)]
    let mut all: Vec<Box<dyn Demux>> = vec![Box::new(copy::BlockCopy::new(channels))];
    #[cfg(target_arch = "x86_64")]
    all.push(Box::new(copy::BlockCopyAvx::new(channels)));
    all
}


#[cfg(test)]
mod tests {
    use std::panic::AssertUnwindSafe;
    use std::panic::catch_unwind;

    use proptest::prelude::*;
    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::test_utils::*;
    use super::*;

    fn usable(channels: usize, shape: Shape) -> Vec<Box<dyn Demux>> {
        registry(channels)
            .into_iter()
            .filter(|s| s.is_available() && s.supports(shape))
            .collect()
    }

    fn random_block(shape: Shape, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..shape.block_len()).map(|_| rng.random()).collect()
    }

    fn assert_all_match_reference(shape: Shape, src: &[u8]) {
        let reference = reference(shape.channels);
        let mut expected = planes(shape, 0, 0);
        run(reference.as_ref(), src, &mut expected);

        for strategy in usable(shape.channels, shape) {
            let mut out = planes(shape, 0, 0);
            run(strategy.as_ref(), src, &mut out);
            assert_eq!(out, expected, "{} on {shape}", strategy.name());
        }
    }

    #[test]
    fn test_registry_names_unique() {
        let all = registry(DEFAULT_CHANNELS);
        let mut names: Vec<_> = all.iter().map(|s| s.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all.len());
        assert!(all.iter().all(|s| s.family() != Family::Copy));
        assert!(all.iter().all(|s| s.channels() == DEFAULT_CHANNELS));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_reference_workload() {
        // 32 channels x 64 rows, src[i] = i % 256.
        let shape = Shape::new(32, 64);
        let src: Vec<u8> = (0..shape.block_len()).map(|i| (i % 256) as u8).collect();
        let strategies = usable(32, shape);
        assert!(strategies.len() >= 19, "{strategies:?}");
        for strategy in strategies {
            let mut out = planes(shape, 0, 0);
            run(strategy.as_ref(), &src, &mut out);
            for (c, plane) in out.iter().enumerate() {
                for (r, b) in plane.iter().enumerate() {
                    assert_eq!(*b as usize, (r * 32 + c) % 256, "{}", strategy.name());
                }
            }
        }
    }

    #[test]
    fn test_canonical_4x4() {
        let shape = Shape::new(4, 4);
        let src: Vec<u8> = (0..16).collect();
        for strategy in usable(4, shape) {
            let mut out = planes(shape, 0, 0);
            run(strategy.as_ref(), &src, &mut out);
            assert_eq!(
                out,
                vec![
                    vec![0, 4, 8, 12],
                    vec![1, 5, 9, 13],
                    vec![2, 6, 10, 14],
                    vec![3, 7, 11, 15]
                ],
                "{}",
                strategy.name()
            );
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_invariant_and_no_overwrite() {
        for (channels, rows) in [(4, 4), (4, 8), (4, 16), (4, 32), (32, 64), (48, 32), (3, 7)] {
            let shape = Shape::new(channels, rows);
            let src = random_block(shape, (channels * 1000 + rows) as u64);
            for strategy in usable(channels, shape) {
                check(strategy.as_ref(), shape, &src);
            }
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_fill_patterns() {
        let shape = Shape::new(32, 64);
        for fill in [0x00, 0xff] {
            assert_all_match_reference(shape, &vec![fill; shape.block_len()]);
        }
        let ramp: Vec<u8> = (0..shape.block_len()).map(|i| i as u8).collect();
        assert_all_match_reference(shape, &ramp);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_idempotent() {
        let shape = Shape::new(32, 64);
        let src = random_block(shape, 7);
        for strategy in usable(32, shape) {
            let mut first = planes(shape, 0, 0);
            let mut second = planes(shape, 0, 0);
            run(strategy.as_ref(), &src, &mut first);
            run(strategy.as_ref(), &src, &mut second);
            assert_eq!(first, second, "{}", strategy.name());
        }
    }

    #[test]
    fn test_tile_depth_boundaries() {
        // Every strategy accepts N=4 at its own tile depth unless it is pinned
        // to a fixed row count or a wider channel group.
        for rows in [4, 8, 16, 32] {
            let shape = Shape::new(4, rows);
            let src = random_block(shape, rows as u64);
            for strategy in usable(4, shape) {
                check(strategy.as_ref(), shape, &src);
            }
        }
        for strategy in registry(4) {
            let req = strategy.requirements();
            if req.channel_multiple <= 4 && req.fixed_rows.is_none() {
                let depth = req.row_multiple;
                assert!(strategy.supports(Shape::new(4, depth)), "{}", strategy.name());
            }
        }
    }

    fn panics(strategy: &dyn Demux, src: &[u8], planes: &mut [Vec<u8>]) -> bool {
        catch_unwind(AssertUnwindSafe(|| run(strategy, src, planes))).is_err()
    }

    #[test]
    fn test_contract_violations_panic_without_writing() {
        let shape = Shape::new(32, 64);
        let src = vec![1u8; shape.block_len()];
        for strategy in usable(32, shape) {
            let name = strategy.name();

            // Source length not a multiple of N.
            let mut out = planes(shape, 0, 0);
            assert!(panics(strategy.as_ref(), &src[..src.len() - 1], &mut out), "{name}");
            assert!(out.iter().flatten().all(|b| *b == 0), "{name}");

            // Wrong plane count.
            let mut out = planes(Shape::new(31, 64), 0, 0);
            assert!(panics(strategy.as_ref(), &src, &mut out), "{name}");
            assert!(out.iter().flatten().all(|b| *b == 0), "{name}");

            // One short plane.
            let mut out = planes(shape, 0, 0);
            out[17].truncate(63);
            assert!(panics(strategy.as_ref(), &src, &mut out), "{name}");
            assert!(out.iter().flatten().all(|b| *b == 0), "{name}");

            // Empty source.
            let mut out = planes(shape, 0, 0);
            assert!(panics(strategy.as_ref(), &[], &mut out), "{name}");
        }
    }

    #[test]
    fn test_granularity_violations_panic() {
        for strategy in registry(32) {
            let req = strategy.requirements();
            if !strategy.is_available() || (req.row_multiple == 1 && req.fixed_rows.is_none()) {
                continue;
            }
            // 65 rows breaks every row multiple > 1 and every fixed row count.
            let shape = Shape::new(32, 65);
            let src = vec![0u8; shape.block_len()];
            let mut out = planes(shape, 0, 0xcc);
            assert!(panics(strategy.as_ref(), &src, &mut out), "{}", strategy.name());
            assert!(out.iter().flatten().all(|b| *b == 0xcc));
        }
        for strategy in registry(12) {
            if !strategy.is_available() || strategy.requirements().channel_multiple <= 4 {
                continue;
            }
            let shape = Shape::new(12, 64);
            let src = vec![0u8; shape.block_len()];
            let mut out = planes(shape, 0, 0);
            assert!(panics(strategy.as_ref(), &src, &mut out), "{}", strategy.name());
        }
    }

    #[test]
    fn test_validate_reports_instead_of_panicking() {
        let strategy = reference(4);
        let src = [0u8; 15];
        let mut buf = [0u8; 16];
        let dst: Vec<&mut [u8]> = buf.chunks_exact_mut(4).collect();
        let err = strategy.validate(&src, &dst).unwrap_err();
        assert!(err.to_string().contains("multiple of 4"), "{err}");
    }

    proptest! {
        #[test]
        #[cfg_attr(miri, ignore)]
        fn proptest_equivalence(
            channel_groups in 1usize..=4,
            row_groups in 1usize..=4,
            seed in any::<u64>(),
        ) {
            // 32 rows is the deepest tile; strategies needing 16 or 32 channels
            // drop out for the other channel counts.
            let shape = Shape::new(8 * channel_groups, 32 * row_groups);
            let src = random_block(shape, seed);
            assert_all_match_reference(shape, &src);
        }

        #[test]
        #[cfg_attr(miri, ignore)]
        fn proptest_invariant_any_shape(
            channels in 1usize..40,
            rows in 1usize..70,
            seed in any::<u64>(),
        ) {
            let shape = Shape::new(channels, rows);
            let src = random_block(shape, seed);
            for strategy in usable(channels, shape) {
                check(strategy.as_ref(), shape, &src);
            }
        }
    }
}
