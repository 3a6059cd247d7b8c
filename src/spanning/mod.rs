// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Reconciliation of fragments whose reads fall into different partitions.
//!
//! Each partition publishes the fragments it could not complete on its own. The cache
//! merges the parts of a fragment as partitions come in and resolves it once every
//! partition that could still contribute a read has been published. Every fragment is
//! resolved exactly once, regardless of how many partitions it spans.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::errors::Error;
use crate::partition::Partition;
use crate::reads::ReadGroup;

pub mod combined;

pub use combined::{CacheStats, CombinedReadGroups, Resolution};

/// Number of resolved fragment ids remembered to recognize late arrivals.
pub const RESOLVED_CAPACITY: usize = 100_000;

/// Which partitions have been published so far.
#[derive(Debug, Default)]
pub struct PublishedPartitions {
    last: HashMap<String, u64>,
    completed: HashSet<String>,
}

impl PublishedPartitions {
    pub fn is_processed(&self, chrom: &str, ordinal: u64) -> bool {
        self.completed.contains(chrom) || self.last.get(chrom).map_or(false, |last| ordinal <= *last)
    }

    fn record(&mut self, chrom: &str, ordinal: u64) -> Result<()> {
        if let Some(previous) = self.last.get(chrom) {
            if ordinal <= *previous {
                return Err(Error::UnorderedPartition {
                    chrom: chrom.to_owned(),
                    previous: *previous,
                    current: ordinal,
                }
                .into());
            }
        }
        if self.completed.contains(chrom) {
            warn!("partition {} published after {} was completed", ordinal, chrom);
        }
        self.last.insert(chrom.to_owned(), ordinal);
        Ok(())
    }
}

/// Single-writer cache of partially assembled fragments.
pub struct SpanningReadCache {
    partition_size: u64,
    published: PublishedPartitions,
    groups: CombinedReadGroups,
}

impl SpanningReadCache {
    pub fn new(partition_size: u64) -> Self {
        SpanningReadCache::with_capacity(partition_size, RESOLVED_CAPACITY)
    }

    pub fn with_capacity(partition_size: u64, resolved_capacity: usize) -> Self {
        SpanningReadCache {
            partition_size: partition_size.max(1),
            published: PublishedPartitions::default(),
            groups: CombinedReadGroups::new(partition_size, resolved_capacity),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.groups.stats()
    }

    /// Number of fragments currently waiting for other partitions.
    pub fn cached(&self) -> usize {
        self.groups.len()
    }

    /// Publish the fragments of a finished partition that depend on other partitions.
    /// Partitions of a chromosome have to be published in increasing order. Returns the
    /// fragments resolved with junction evidence.
    pub fn publish(&mut self, partition: &Partition, spanning: Vec<ReadGroup>) -> Result<Vec<ReadGroup>> {
        let ordinal = partition.start().saturating_sub(1) / self.partition_size;
        self.published.record(partition.chromosome(), ordinal)?;

        let mut touched = HashSet::new();
        for group in spanning {
            let id = group.id().clone();
            if self.groups.insert(group, &self.published) {
                touched.insert(id);
            }
        }
        let registered = self
            .groups
            .take_registered(partition.chromosome(), Some(ordinal));

        let mut ids: Vec<&String> = touched.iter().chain(registered.iter()).collect();
        ids.sort();
        ids.dedup();
        Ok(emitted(self.groups.resolve_ready(ids, &self.published)))
    }

    /// No further partition of `chrom` will be published.
    pub fn finish_chromosome(&mut self, chrom: &str) -> Vec<ReadGroup> {
        self.published.completed.insert(chrom.to_owned());
        let registered = self.groups.take_registered(chrom, None);
        emitted(self.groups.resolve_ready(registered.iter(), &self.published))
    }

    /// Resolve everything still cached at the end of the run.
    pub fn flush(&mut self) -> Vec<ReadGroup> {
        let remaining = self.groups.len();
        if remaining > 0 {
            debug!("flushing {} unresolved fragments", remaining);
        }
        emitted(self.groups.resolve_all())
    }
}

fn emitted(resolutions: Vec<Resolution>) -> Vec<ReadGroup> {
    resolutions
        .into_iter()
        .filter_map(|resolution| match resolution {
            Resolution::Emitted(group) => Some(group),
            Resolution::Discarded(id) => {
                debug!("discarding fragment {} without junction evidence", id);
                None
            }
        })
        .collect()
}
