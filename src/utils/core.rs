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

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

use crate::utils::error::LocationContextExt;
use crate::utils::error::loc;

pub fn configure_tracing<P: AsRef<Path>>(
    stderr_log_level: Level,
    path: Option<P>,
    file_log_level: Level,
) -> Result<()> {
    let mut layers = Vec::new();

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr.with_max_level(stderr_log_level))
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE);

    if let Some(path) = path {
        let log_file = File::create(path).location(loc!())?;
        let log_file_writer = Mutex::new(log_file).with_max_level(file_log_level);
        let layer = layer.map_writer(|w| w.and(log_file_writer));
        layers.push(layer.boxed());
    } else {
        layers.push(layer.boxed());
    };

    #[cfg(feature = "tracy")]
    {
        layers
            .push(tracing_tracy::TracyLayer::new(tracing_tracy::DefaultConfig::default()).boxed());
    }

    tracing_subscriber::registry().with(layers).try_init().location(loc!())?;
    Ok(())
}

// https://github.com/nvzqz/static-assertions/issues/21
// https://stackoverflow.com/questions/72582671/const-generics-how-to-ensure-that-usize-const-is-0
pub struct AssertN<const N: usize>;

impl<const N: usize> AssertN<N> {
    pub const NE_0: () = assert!(N != 0);
    pub const MULTIPLE_OF_4: () = assert!(N.is_multiple_of(4));
    pub const MULTIPLE_OF_16: () = assert!(N.is_multiple_of(16));
    pub const MULTIPLE_OF_32: () = assert!(N.is_multiple_of(32));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_n_accepts_multiples() {
        let _ = AssertN::<64>::NE_0;
        let _ = AssertN::<64>::MULTIPLE_OF_4;
        let _ = AssertN::<64>::MULTIPLE_OF_16;
        let _ = AssertN::<64>::MULTIPLE_OF_32;
    }
}
