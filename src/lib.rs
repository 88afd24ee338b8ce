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

//! Demultiplexing of time-division multiplexed byte streams.
//!
//! A source block interleaves `N` channels row by row; demuxing it writes each
//! channel's bytes to its own plane. [`demux`] holds interchangeable
//! strategies for that transpose, from byte loops up to AVX2 tile transposes
//! built on [`tile`], and [`harness`] times them against each other.

pub mod config;
pub mod demux;
pub mod harness;
pub mod prelude;
pub mod shape;
#[cfg(target_arch = "x86_64")]
pub mod tile;
pub mod utils;
pub mod words;
