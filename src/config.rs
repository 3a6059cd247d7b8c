// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};

use crate::errors::invalid_configuration;

/// Scalars controlling classification, bucketing, clustering and rate limiting.
///
/// Every field has a default, so a YAML file only needs to list the values it changes.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PrepConfig {
    /// Length of the genomic partitions processed as one unit of work.
    pub partition_size: u64,
    /// Length of the windows a partition is subdivided into.
    pub bucket_size: u64,
    pub min_soft_clip_length: u32,
    pub min_indel_length: u32,
    /// Base quality below which a mismatch is not trusted.
    pub low_base_qual: u8,
    /// Minimum percentage of soft clipped bases at or above `low_base_qual`.
    pub min_soft_clip_high_qual_perc: u32,
    pub min_map_qual: u8,
    /// Upper bound on the distance between a breakpoint and a read pair supporting it.
    pub max_fragment_length: u64,
    /// Junction reads within this distance of an existing junction with the same
    /// orientation are merged into it.
    pub junction_merge_distance: u64,
    /// Allowed offset between a candidate's own soft clip and the junction for exact support.
    pub exact_support_tolerance: u64,
    pub min_poly_at_length: usize,
    pub discordant_min_fragments: usize,
    pub discordant_proximity: u64,
    pub rate_limit: RateLimitConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Length of the genomic window reads are counted in.
    pub window_size: u64,
    /// Reads admitted per window while rate limited.
    pub rate_limit: usize,
    /// Number of reads in a window above which the tracker becomes rate limited.
    pub trigger_threshold: usize,
}

impl Default for PrepConfig {
    fn default() -> Self {
        PrepConfig {
            partition_size: 1_000_000,
            bucket_size: 1_000,
            min_soft_clip_length: 30,
            min_indel_length: 32,
            low_base_qual: 26,
            min_soft_clip_high_qual_perc: 75,
            min_map_qual: 20,
            max_fragment_length: 1_000,
            junction_merge_distance: 1,
            exact_support_tolerance: 2,
            min_poly_at_length: 16,
            discordant_min_fragments: 4,
            discordant_proximity: 500,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            window_size: 1_000,
            rate_limit: 500,
            trigger_threshold: 10_000,
        }
    }
}

impl PrepConfig {
    /// Load a configuration from a YAML file. Missing keys fall back to their defaults.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = File::open(path.as_ref())
            .with_context(|| format!("unable to open config {}", path.as_ref().display()))?;
        let config: PrepConfig = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make partition processing meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.partition_size == 0 {
            return Err(invalid_configuration("partition size must be positive").into());
        }
        if self.bucket_size == 0 {
            return Err(invalid_configuration("bucket size must be positive").into());
        }
        if self.bucket_size > self.partition_size {
            return Err(invalid_configuration(format!(
                "bucket size {} exceeds partition size {}",
                self.bucket_size, self.partition_size
            ))
            .into());
        }
        if self.min_soft_clip_length == 0 || self.min_indel_length == 0 {
            return Err(invalid_configuration(
                "minimum soft clip and indel lengths must be positive",
            )
            .into());
        }
        if self.min_soft_clip_high_qual_perc > 100 {
            return Err(invalid_configuration(
                "soft clip high quality percentage must be between 0 and 100",
            )
            .into());
        }
        if self.max_fragment_length == 0 {
            return Err(invalid_configuration("maximum fragment length must be positive").into());
        }
        if self.discordant_min_fragments == 0 {
            return Err(invalid_configuration(
                "discordant groups need at least one fragment to form a junction",
            )
            .into());
        }
        if self.min_poly_at_length < 2 {
            return Err(invalid_configuration("poly-A/T length must be at least 2").into());
        }
        self.rate_limit.validate()
    }
}

impl RateLimitConfig {
    fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(invalid_configuration("rate limit window size must be positive").into());
        }
        if self.rate_limit > self.trigger_threshold {
            return Err(invalid_configuration(format!(
                "rate limit {} exceeds trigger threshold {}",
                self.rate_limit, self.trigger_threshold
            ))
            .into());
        }
        Ok(())
    }
}
