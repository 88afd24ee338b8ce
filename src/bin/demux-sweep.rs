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

use std::io;
use std::io::Write;

use clap::Parser;
use tdm_demux::demux;
use tdm_demux::harness;
use tdm_demux::harness::BlockSet;
use tdm_demux::harness::SweepArgs;
use tdm_demux::harness::SweepConfig;
use tdm_demux::prelude::*;
use tdm_demux::utils;

fn list_strategies(config: &SweepConfig) {
    let shape = config.shape();
    let all = demux::registry(config.channels)
        .into_iter()
        .chain(demux::copy_references(config.channels));
    for strategy in all {
        println!(
            "{:<30} {:<10} available={:<5} runs {shape}={}",
            strategy.name(),
            strategy.family(),
            strategy.is_available(),
            strategy.supports(shape)
        );
    }
}

pub fn main() -> Result<()> {
    let args = SweepArgs::parse();
    let list = args.list_strategies;
    let config = args.load_config().location(loc!())?;
    utils::configure_tracing(
        config.stderr_log_level.0,
        config.log_file.clone(),
        config.file_log_level.0,
    )
    .location(loc!())?;

    if list {
        list_strategies(&config);
        return Ok(());
    }

    let strategies = harness::select(&config).location(loc!())?;
    ensure!(!strategies.is_empty(), "no strategy can run {}", config.shape());
    info!(
        "sweeping {} strategies over {} blocks of {}",
        strategies.len(),
        config.max_count,
        config.shape()
    );

    let mut blocks = BlockSet::new(config.shape(), config.max_count).location(loc!())?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", harness::header(&config)).location(loc!())?;
    for strategy in &strategies {
        harness::write_row(&mut stdout, strategy.as_ref(), &mut blocks, &config)
            .location(loc!())?;
    }
    Ok(())
}
