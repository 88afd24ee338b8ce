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

use std::path::PathBuf;

use clap::Parser;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use tracing::Level;

use crate::config;
use crate::config::SerializableLevel;
use crate::demux::DEFAULT_CHANNELS;
use crate::demux::DEFAULT_PLANE_LEN;
use crate::prelude::*;
use crate::shape::Shape;

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct SweepConfig {
    pub channels: usize,
    pub plane_len: usize,
    /// Blocks demuxed per pass at the first step; doubled every step.
    pub min_count: usize,
    pub max_count: usize,
    /// Passes at the first step; halved every step.
    pub iterations: usize,
    /// Strategy names to run. Empty runs everything.
    pub strategies: Vec<String>,
    pub include_copy: bool,
    pub log_file: Option<PathBuf>,
    pub stderr_log_level: SerializableLevel,
    pub file_log_level: SerializableLevel,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            channels: DEFAULT_CHANNELS,
            plane_len: DEFAULT_PLANE_LEN,
            min_count: 1,
            max_count: 1024 * 1024,
            iterations: 1024 * 1024,
            strategies: Vec::new(),
            include_copy: true,
            log_file: None,
            stderr_log_level: SerializableLevel(Level::INFO),
            file_log_level: SerializableLevel(Level::TRACE),
        }
    }
}

impl SweepConfig {
    pub fn shape(&self) -> Shape {
        Shape::new(self.channels, self.plane_len)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.channels > 0, "channels must be non-zero");
        ensure!(self.plane_len > 0, "plane_len must be non-zero");
        ensure!(self.min_count > 0, "min_count must be non-zero");
        ensure!(
            self.min_count <= self.max_count,
            "min_count {} exceeds max_count {}",
            self.min_count,
            self.max_count
        );
        ensure!(self.iterations > 0, "iterations must be non-zero");
        Ok(())
    }

    /// Block counts of each sweep step: `min_count` doubling up to
    /// `max_count` inclusive.
    pub fn counts(&self) -> impl Iterator<Item = usize> + use<> {
        let max = self.max_count;
        std::iter::successors(Some(self.min_count), |c| c.checked_mul(2))
            .take_while(move |c| *c <= max)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "demux-sweep")]
pub struct SweepArgs {
    #[arg(long, value_name = "BOOL", default_value_t = false, action = clap::ArgAction::Set)]
    pub print_default_config_and_exit: bool,

    /// Prints every strategy and whether this CPU can run it, then exits.
    #[arg(long, value_name = "BOOL", default_value_t = false, action = clap::ArgAction::Set)]
    pub list_strategies: bool,

    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[arg(long, value_name = "N")]
    pub channels: Option<usize>,

    #[arg(long, value_name = "BYTES")]
    pub plane_len: Option<usize>,

    #[arg(long, value_name = "BLOCKS")]
    pub min_count: Option<usize>,

    #[arg(long, value_name = "BLOCKS")]
    pub max_count: Option<usize>,

    #[arg(long, value_name = "N")]
    pub iterations: Option<usize>,

    #[arg(long, value_name = "NAME", value_delimiter = ',')]
    pub strategies: Vec<String>,

    #[arg(long, value_name = "BOOL")]
    pub include_copy: Option<bool>,

    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[arg(long, value_name = "LEVEL")]
    pub stderr_log_level: Option<SerializableLevel>,

    #[arg(long, value_name = "LEVEL")]
    pub file_log_level: Option<SerializableLevel>,
}

impl SweepArgs {
    pub fn load_config(self) -> Result<SweepConfig> {
        if self.print_default_config_and_exit {
            config::print_default_config_and_exit::<SweepConfig>();
        }

        let config_file = self
            .config_file
            .clone()
            .unwrap_or_else(|| config::default_config_file("demux-sweep"));
        let mut cfg = SweepConfig::default();
        if let Some(from_file) =
            config::maybe_read_ron_file::<SweepConfig>(&config_file).location(loc!())?
        {
            cfg = from_file;
        }

        self.apply(cfg)
    }

    fn apply(self, mut cfg: SweepConfig) -> Result<SweepConfig> {
        if let Some(v) = self.channels {
            cfg.channels = v;
        }
        if let Some(v) = self.plane_len {
            cfg.plane_len = v;
        }
        if let Some(v) = self.min_count {
            cfg.min_count = v;
        }
        if let Some(v) = self.max_count {
            cfg.max_count = v;
        }
        if let Some(v) = self.iterations {
            cfg.iterations = v;
        }
        if !self.strategies.is_empty() {
            cfg.strategies = self.strategies;
        }
        if let Some(v) = self.include_copy {
            cfg.include_copy = v;
        }
        if let Some(v) = self.log_file {
            cfg.log_file = Some(v);
        }
        if let Some(v) = self.stderr_log_level {
            cfg.stderr_log_level = v;
        }
        if let Some(v) = self.file_log_level {
            cfg.file_log_level = v;
        }

        cfg.validate().location(loc!())?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> SweepArgs {
        SweepArgs::parse_from(std::iter::once("demux-sweep").chain(extra.iter().copied()))
    }

    #[test]
    fn test_default_counts() {
        let cfg = SweepConfig::default();
        let counts: Vec<usize> = cfg.counts().collect();
        assert_eq!(counts.len(), 21);
        assert_eq!(counts[0], 1);
        assert_eq!(counts[20], 1024 * 1024);
    }

    #[test]
    fn test_counts_stop_at_max() {
        let cfg = SweepConfig {
            min_count: 3,
            max_count: 20,
            ..Default::default()
        };
        assert_eq!(cfg.counts().collect::<Vec<_>>(), vec![3, 6, 12]);
    }

    #[test]
    fn test_default_config_round_trips() {
        let s = config::default_config_string::<SweepConfig>().unwrap();
        let parsed: SweepConfig = config::parse_ron(&s).unwrap();
        assert_eq!(parsed, SweepConfig::default());
    }

    #[test]
    fn test_parse_ron() {
        let parsed: SweepConfig = config::parse_ron(
            r#"(
                channels: 16,
                plane_len: 32,
                min_count: 2,
                max_count: 64,
                iterations: 1000,
                strategies: ["reference", "read4_write4"],
                include_copy: false,
                log_file: "/tmp/sweep.log",
                stderr_log_level: "DEBUG",
                file_log_level: "TRACE",
            )"#,
        )
        .unwrap();
        assert_eq!(parsed.shape(), Shape::new(16, 32));
        assert_eq!(parsed.strategies, vec!["reference", "read4_write4"]);
        assert_eq!(parsed.log_file, Some("/tmp/sweep.log".into()));
        assert_eq!(parsed.stderr_log_level, SerializableLevel(Level::DEBUG));
    }

    #[test]
    fn test_args_override() {
        let cfg = args(&[
            "--channels",
            "8",
            "--max-count",
            "16",
            "--strategies",
            "reference,write4",
            "--include-copy",
            "false",
            "--stderr-log-level",
            "warn",
        ])
        .apply(SweepConfig::default())
        .unwrap();
        assert_eq!(cfg.channels, 8);
        assert_eq!(cfg.plane_len, DEFAULT_PLANE_LEN);
        assert_eq!(cfg.max_count, 16);
        assert_eq!(cfg.strategies, vec!["reference", "write4"]);
        assert!(!cfg.include_copy);
        assert_eq!(cfg.stderr_log_level, SerializableLevel(Level::WARN));
    }

    #[test]
    fn test_args_rejects_inverted_counts() {
        let err = args(&["--min-count", "8", "--max-count", "4"])
            .apply(SweepConfig::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("exceeds max_count"));
    }
}
