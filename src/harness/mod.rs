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

//! Throughput sweep: times every strategy over a growing working set of
//! blocks so the cache-size knees show up as columns of one table.

use std::fmt::Write;
use std::io;
use std::time::Duration;
use std::time::Instant;

use itertools::izip;

use crate::demux;
use crate::demux::Demux;
use crate::prelude::*;

pub mod buffer;
pub mod config;

pub use buffer::AlignedBytes;
pub use buffer::BlockSet;
pub use config::SweepArgs;
pub use config::SweepConfig;

const NAME_WIDTH: usize = 30;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SweepPoint {
    /// Blocks demuxed per pass.
    pub count: usize,
    /// Bytes read plus bytes written per pass.
    pub bytes: usize,
    pub elapsed: Duration,
}

impl SweepPoint {
    /// Bytes moved per second over the whole measurement, or 0 if it was
    /// too short to time.
    pub fn bytes_per_sec(&self, iterations: usize) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        (self.bytes * iterations) as f64 / secs
    }
}

/// Demuxes the first `count` blocks of `blocks`, `iterations` times over.
/// Plane slices are split off before the clock starts.
#[instrument(skip(strategy, blocks), fields(name = strategy.name()), level = "debug")]
pub fn measure(
    strategy: &dyn Demux,
    blocks: &mut BlockSet,
    count: usize,
    iterations: usize,
) -> Duration {
    let block_len = blocks.shape().block_len();
    let (src, mut planes) = blocks.split(count);

    let start = Instant::now();
    for _ in 0..iterations {
        for (block, dst) in izip!(src.chunks_exact(block_len), planes.iter_mut()) {
            strategy.demux(block, dst);
        }
    }
    start.elapsed()
}

/// Runs [`measure`] for every block count of `config`, starting at
/// `config.iterations` passes and halving them each step so every step moves
/// roughly the same number of bytes. `on_point` sees each point as soon as it
/// is measured.
#[instrument(skip_all, fields(name = strategy.name()), level = "debug")]
pub fn sweep(
    strategy: &dyn Demux,
    blocks: &mut BlockSet,
    config: &SweepConfig,
    mut on_point: impl FnMut(&SweepPoint),
) -> Result<Vec<SweepPoint>> {
    config.validate().location(loc!())?;
    let shape = config.shape();
    ensure!(
        blocks.shape() == shape,
        "blocks are {}, sweep wants {shape}",
        blocks.shape()
    );
    ensure!(
        blocks.count() >= config.max_count,
        "{} blocks allocated, sweep needs {}",
        blocks.count(),
        config.max_count
    );
    ensure!(
        strategy.is_available(),
        "{} is not available on this CPU",
        strategy.name()
    );
    strategy
        .requirements()
        .check(shape)
        .with_context(loc!(), || format!("{} cannot run {shape}", strategy.name()))?;
    ensure!(
        strategy.channels() == shape.channels,
        "{} is built for {} channels, sweep wants {}",
        strategy.name(),
        strategy.channels(),
        shape.channels
    );

    let mut iterations = config.iterations;
    let mut points = Vec::new();
    for count in config.counts() {
        let elapsed = measure(strategy, blocks, count, iterations);
        let point = SweepPoint {
            count,
            bytes: count * shape.block_len() * 2,
            elapsed,
        };
        trace!(?point, iterations);

        #[cfg(feature = "tracy")]
        if let Some(tracy_client) = tracy_client::Client::running() {
            tracy_client.plot(
                tracy_client::plot_name!("demux_bytes_per_sec"),
                point.bytes_per_sec(iterations),
            );
        }

        on_point(&point);
        points.push(point);
        iterations = (iterations / 2).max(1);
    }
    Ok(points)
}

/// Sweeps `strategy` and writes its table row to `out`, each cell as soon as
/// its point is measured. The first write error ends the row with an error
/// once the sweep returns.
pub fn write_row<W: io::Write>(
    out: &mut W,
    strategy: &dyn Demux,
    blocks: &mut BlockSet,
    config: &SweepConfig,
) -> Result<Vec<SweepPoint>> {
    write!(out, "{}", row_label(strategy.name())).location(loc!())?;
    out.flush().location(loc!())?;

    let mut write_err: Option<io::Error> = None;
    let points = sweep(strategy, blocks, config, |point| {
        if write_err.is_some() {
            return;
        }
        if let Err(e) = write!(out, "{}", format_cell(point)).and_then(|()| out.flush()) {
            write_err = Some(e);
        }
    })
    .location(loc!())?;
    if let Some(e) = write_err {
        return Err(e).context(loc!(), "writing sweep row");
    }

    writeln!(out).location(loc!())?;
    Ok(points)
}

/// The strategies a sweep over `config` runs, in table order. Names in
/// `config.strategies` must exist among all strategies; copy references are
/// dropped unless `config.include_copy`, and strategies this CPU or shape
/// cannot run are skipped with a log line.
pub fn select(config: &SweepConfig) -> Result<Vec<Box<dyn Demux>>> {
    let mut all = demux::registry(config.channels);
    all.extend(demux::copy_references(config.channels));

    for name in &config.strategies {
        ensure!(
            all.iter().any(|s| s.name() == name),
            "unknown strategy {name:?}"
        );
    }

    let shape = config.shape();
    Ok(all
        .into_iter()
        .filter(|s| config.strategies.is_empty() || config.strategies.iter().any(|n| n == s.name()))
        .filter(|s| {
            if s.family() == demux::Family::Copy && !config.include_copy {
                info!("skipping {}: copy references excluded", s.name());
                false
            } else if !s.is_available() {
                warn!("skipping {}: not available on this CPU", s.name());
                false
            } else if let Err(e) = s.requirements().check(shape) {
                info!("skipping {}: {e:#}", s.name());
                false
            } else {
                true
            }
        })
        .collect())
}

/// Working-set size as a 3-digit number and a k/m/g suffix, truncating.
pub fn format_size(bytes: usize) -> String {
    const K: usize = 1024;
    let (size, suffix) = if bytes >= K * K * K {
        (bytes / (K * K * K), 'g')
    } else if bytes >= K * K {
        (bytes / (K * K), 'm')
    } else if bytes >= K {
        (bytes / K, 'k')
    } else {
        (bytes, ' ')
    };
    format!("{size:3}{suffix}")
}

/// First line of the sweep table: one working-set column per block count.
pub fn header(config: &SweepConfig) -> String {
    let block_len = config.shape().block_len();
    let mut line = format!("{:NAME_WIDTH$}:", "");
    for count in config.counts() {
        let _ = write!(line, " {}", format_size(count * block_len * 2));
    }
    line
}

pub fn row_label(name: &str) -> String {
    format!("{name:<NAME_WIDTH$}:")
}

/// One table cell: elapsed milliseconds, right-aligned to the header columns.
pub fn format_cell(point: &SweepPoint) -> String {
    format!("{:5}", point.elapsed.as_millis())
}
