// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use lru::LruCache;

use crate::reads::ReadGroup;
use crate::spanning::PublishedPartitions;

/// A partition of one chromosome, identified by its ordinal.
pub(crate) type PartitionKey = (String, u64);

/// What happened to a fragment once nothing more can be learned about it.
#[derive(Debug)]
pub enum Resolution {
    /// The fragment carries junction evidence.
    Emitted(ReadGroup),
    /// Only candidate evidence; the id is kept for diagnostics.
    Discarded(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub emitted: usize,
    pub discarded: usize,
    pub missed_reads: usize,
    pub late_arrivals: usize,
}

/// Fragments assembled across partitions, indexed by the partitions they still wait for.
pub struct CombinedReadGroups {
    partition_size: u64,
    groups: HashMap<String, ReadGroup>,
    /// Fragments with reads expected from a partition, keyed by that partition.
    by_partition: BTreeMap<PartitionKey, BTreeSet<String>>,
    resolved: LruCache<String, ()>,
    stats: CacheStats,
}

impl CombinedReadGroups {
    pub fn new(partition_size: u64, resolved_capacity: usize) -> Self {
        CombinedReadGroups {
            partition_size: partition_size.max(1),
            groups: HashMap::new(),
            by_partition: BTreeMap::new(),
            resolved: LruCache::new(resolved_capacity.max(1)),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub(crate) fn partition_key(&self, chrom: &str, position: u64) -> PartitionKey {
        (chrom.to_owned(), position.saturating_sub(1) / self.partition_size)
    }

    /// Partitions still to be processed that hold reads the group is missing.
    fn pending_partitions(
        &self,
        group: &ReadGroup,
        published: &PublishedPartitions,
    ) -> BTreeSet<PartitionKey> {
        group
            .missing_reads()
            .map(|expected| self.partition_key(expected.chromosome(), expected.position()))
            .filter(|(chrom, ordinal)| !published.is_processed(chrom, *ordinal))
            .collect()
    }

    /// Merge one partition's part of a fragment into the cache. Returns false for parts of
    /// fragments that have already been resolved.
    pub fn insert(&mut self, group: ReadGroup, published: &PublishedPartitions) -> bool {
        if self.resolved.contains(group.id()) {
            warn!(
                "discarding late part of already resolved fragment {}",
                group.id()
            );
            self.stats.late_arrivals += 1;
            return false;
        }

        let id = group.id().clone();
        let merged = match self.groups.remove(&id) {
            Some(mut cached) => {
                cached.merge(group);
                cached
            }
            None => group,
        };
        let span = merged.partition_span_count(self.partition_size);
        if span > 2 {
            debug!("fragment {} spans {} partitions", id, span);
        }

        for key in self.pending_partitions(&merged, published) {
            self.by_partition
                .entry(key)
                .or_insert_with(BTreeSet::new)
                .insert(id.clone());
        }
        self.groups.insert(id, merged);
        true
    }

    /// Ids registered under processed partitions of `chrom` up to `ordinal`, or all of them.
    pub(crate) fn take_registered(&mut self, chrom: &str, ordinal: Option<u64>) -> BTreeSet<String> {
        let upper = ordinal.unwrap_or(u64::MAX);
        let keys: Vec<PartitionKey> = self
            .by_partition
            .range((chrom.to_owned(), 0)..=(chrom.to_owned(), upper))
            .map(|(key, _)| key.clone())
            .collect();
        let mut ids = BTreeSet::new();
        for key in keys {
            if let Some(registered) = self.by_partition.remove(&key) {
                ids.extend(registered);
            }
        }
        ids
    }

    /// Resolve the given fragments if none of their missing reads can still arrive.
    pub fn resolve_ready<'a, I>(&mut self, ids: I, published: &PublishedPartitions) -> Vec<Resolution>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut resolutions = Vec::new();
        for id in ids {
            let ready = self
                .groups
                .get(id)
                .map_or(false, |group| self.pending_partitions(group, published).is_empty());
            if ready {
                if let Some(resolution) = self.resolve(id) {
                    resolutions.push(resolution);
                }
            }
        }
        resolutions
    }

    /// Resolve every cached fragment, giving up on reads that never arrived.
    pub fn resolve_all(&mut self) -> Vec<Resolution> {
        let mut ids: Vec<String> = self.groups.keys().cloned().collect();
        ids.sort();
        self.by_partition.clear();
        ids.iter().filter_map(|id| self.resolve(id)).collect()
    }

    fn resolve(&mut self, id: &str) -> Option<Resolution> {
        // ids left in `by_partition` are skipped once they are no longer cached
        let mut group = self.groups.remove(id)?;

        let missed = group.resolve_missing();
        if missed > 0 {
            debug!(
                "fragment {} resolved with {} expected read(s) missing",
                id, missed
            );
            self.stats.missed_reads += missed;
        }

        self.resolved.put(id.to_owned(), ());
        if group.has_junction_evidence() {
            self.stats.emitted += 1;
            Some(Resolution::Emitted(group))
        } else {
            self.stats.discarded += 1;
            Some(Resolution::Discarded(id.to_owned()))
        }
    }
}
