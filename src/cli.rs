// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::path::PathBuf;

use anyhow::{Context, Result};
use structopt::StructOpt;

use crate::classify::ReadClassifier;
use crate::config::PrepConfig;
use crate::prep::PrepRunnerBuilder;
use crate::utils::RegionSet;

#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "svprep",
    about = "Collect structural variant breakpoint evidence from an indexed BAM/CRAM file.",
    setting = structopt::clap::AppSettings::ColoredHelp
)]
pub struct SvPrep {
    #[structopt(
        parse(from_os_str),
        help = "Coordinate sorted and indexed BAM/CRAM file with paired-end reads."
    )]
    pub bam: PathBuf,
    #[structopt(
        parse(from_os_str),
        long,
        short,
        help = "TSV file that shall contain the junctions (if omitted, write to STDOUT)."
    )]
    pub output: Option<PathBuf>,
    #[structopt(
        parse(from_os_str),
        long = "groups-output",
        help = "TSV file that shall contain the reads of all fragments supporting a junction."
    )]
    pub groups_output: Option<PathBuf>,
    #[structopt(
        parse(from_os_str),
        long,
        help = "YAML file with configuration values. Values given on the command line take precedence."
    )]
    pub config: Option<PathBuf>,
    #[structopt(
        parse(from_os_str),
        long,
        help = "BED file with regions whose reads shall be ignored."
    )]
    pub blacklist: Option<PathBuf>,
    #[structopt(
        parse(from_os_str),
        long,
        help = "BED file with known breakpoint hotspots. Junction filters are relaxed inside of them."
    )]
    pub hotspots: Option<PathBuf>,
    #[structopt(long, short, default_value = "1", help = "Number of worker threads.")]
    pub threads: usize,
    #[structopt(long = "partition-size", help = "Size of the genomic partitions.")]
    pub partition_size: Option<u64>,
    #[structopt(long = "bucket-size", help = "Size of the buckets within a partition.")]
    pub bucket_size: Option<u64>,
    #[structopt(
        long = "min-soft-clip-length",
        help = "Minimum soft clip length of a junction read."
    )]
    pub min_soft_clip_length: Option<u32>,
    #[structopt(long = "min-indel-length", help = "Minimum indel length of a junction read.")]
    pub min_indel_length: Option<u32>,
    #[structopt(long = "min-map-qual", help = "Minimum mapping quality of considered reads.")]
    pub min_map_qual: Option<u8>,
    #[structopt(
        long = "max-fragment-length",
        help = "Fragments with a larger insert size are considered discordant."
    )]
    pub max_fragment_length: Option<u64>,
    #[structopt(long, short, help = "Provide verbose output.")]
    pub verbose: bool,
}

impl SvPrep {
    /// Configuration file values, overridden by the values given on the command line.
    pub fn prep_config(&self) -> Result<PrepConfig> {
        let mut config = match &self.config {
            Some(path) => PrepConfig::from_yaml(path)?,
            None => PrepConfig::default(),
        };
        if let Some(value) = self.partition_size {
            config.partition_size = value;
        }
        if let Some(value) = self.bucket_size {
            config.bucket_size = value;
        }
        if let Some(value) = self.min_soft_clip_length {
            config.min_soft_clip_length = value;
        }
        if let Some(value) = self.min_indel_length {
            config.min_indel_length = value;
        }
        if let Some(value) = self.min_map_qual {
            config.min_map_qual = value;
        }
        if let Some(value) = self.max_fragment_length {
            config.max_fragment_length = value;
        }
        config.validate()?;
        Ok(config)
    }
}

fn regions(path: &Option<PathBuf>) -> Result<RegionSet> {
    match path {
        Some(path) => RegionSet::from_bed(path)
            .with_context(|| format!("unable to load regions from {}", path.display())),
        None => Ok(RegionSet::new()),
    }
}

pub fn run(opt: SvPrep) -> Result<()> {
    let config = opt.prep_config()?;
    let classifier = ReadClassifier::new(config, regions(&opt.blacklist)?, regions(&opt.hotspots)?);

    let runner = PrepRunnerBuilder::default()
        .bam(opt.bam)
        .classifier(classifier)
        .threads(opt.threads)
        .junctions_output(opt.output)
        .groups_output(opt.groups_output)
        .build()?;
    runner.run()?;
    Ok(())
}
