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

//! Speed-of-light references: plane `c` receives `src[c * L..(c + 1) * L]`.
//!
//! These move the same number of bytes as a demux but do not transpose, so
//! they are kept out of [`crate::demux::registry`]. They only accept planes
//! laid out back to back in one buffer, which is what the sweep allocates.

use crate::demux::Demux;
use crate::demux::Family;
use crate::shape::Requirements;

#[derive(Debug)]
pub struct BlockCopy {
    channels: usize,
}

impl BlockCopy {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Demux for BlockCopy {
    fn name(&self) -> &'static str {
        "block_copy"
    }

    fn family(&self) -> Family {
        Family::Copy
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn requirements(&self) -> Requirements {
        Requirements::ANY.with_contiguous_planes()
    }

    fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
        let shape = self.checked_shape(src, dst);
        for (plane, run) in dst.iter_mut().zip(src.chunks_exact(shape.plane_len)) {
            plane[..shape.plane_len].copy_from_slice(run);
        }
    }
}

#[cfg(target_arch = "x86_64")]
pub use x86::BlockCopyAvx;

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::*;
    use crate::tile::avx2;

    // SAFETY:
    // * avx must be available.
    #[allow(unsafe_op_in_unsafe_fn)]
    #[target_feature(enable = "avx")]
    unsafe fn copy_32(src: &[u8], plane_len: usize, dst: &mut [&mut [u8]]) {
        for (plane, run) in dst.iter_mut().zip(src.chunks_exact(plane_len)) {
            for pos in (0..plane_len).step_by(32) {
                avx2::store(&mut plane[pos..], avx2::load(&run[pos..]));
            }
        }
    }

    /// [`BlockCopy`] through 32-byte registers.
    #[derive(Debug)]
    pub struct BlockCopyAvx {
        channels: usize,
    }

    impl BlockCopyAvx {
        pub fn new(channels: usize) -> Self {
            Self { channels }
        }
    }

    impl Demux for BlockCopyAvx {
        fn name(&self) -> &'static str {
            "block_copy_avx"
        }

        fn family(&self) -> Family {
            Family::Copy
        }

        fn channels(&self) -> usize {
            self.channels
        }

        fn requirements(&self) -> Requirements {
            Requirements::tiled(1, 32).with_contiguous_planes()
        }

        fn is_available(&self) -> bool {
            is_x86_feature_detected!("avx")
        }

        fn demux(&self, src: &[u8], dst: &mut [&mut [u8]]) {
            let shape = self.checked_shape(src, dst);
            // SAFETY: checked for avx support.
            unsafe { copy_32(src, shape.plane_len, dst) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::copy_references;

    fn copy_into(strategy: &dyn Demux, src: &[u8], buf: &mut [u8], plane_len: usize) {
        let mut dst: Vec<&mut [u8]> = buf.chunks_exact_mut(plane_len).collect();
        strategy.demux(src, &mut dst);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_copy_semantics() {
        let src: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();
        for strategy in copy_references(32) {
            if !strategy.is_available() {
                continue;
            }
            assert_eq!(strategy.family(), Family::Copy);
            let mut buf = vec![0u8; 2048];
            copy_into(strategy.as_ref(), &src, &mut buf, 64);
            assert_eq!(buf, src, "{}", strategy.name());
        }
    }

    #[test]
    fn test_rejects_scattered_planes() {
        let src = vec![7u8; 128];
        let mut a = vec![0u8; 64];
        let mut b = vec![0u8; 64];
        let mut dst = vec![b.as_mut_slice(), a.as_mut_slice()];
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            BlockCopy::new(2).demux(&src, &mut dst)
        }));
        assert!(result.is_err());
        assert!(a.iter().chain(&b).all(|x| *x == 0));
    }

    #[test]
    #[should_panic(expected = "not contiguous")]
    fn test_strided_planes_panic() {
        let src = vec![0u8; 64];
        let mut buf = vec![0u8; 128];
        let mut dst: Vec<&mut [u8]> = buf.chunks_exact_mut(32).step_by(2).collect();
        BlockCopy::new(2).demux(&src, &mut dst);
    }
}
