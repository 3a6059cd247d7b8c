// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;

use crate::junctions::JunctionTracker;
use crate::partition::Partition;
use crate::reads::{ReadGroup, ReadRecord, ReadRole};

/// A window of the partition holding the groups whose smallest read start falls into it.
#[derive(Debug, Getters, CopyGetters)]
pub struct Bucket {
    #[getset(get_copy = "pub")]
    index: u64,
    #[getset(get_copy = "pub")]
    start: u64,
    #[getset(get_copy = "pub")]
    end: u64,
    #[getset(get = "pub")]
    groups: BTreeMap<String, ReadGroup>,
}

/// Groups leaving a closed bucket, sorted by what happens to them next.
#[derive(Debug, Default)]
pub struct BucketOutcome {
    /// Groups with junction evidence and no reads outside the partition.
    pub groups: Vec<ReadGroup>,
    /// Groups with reads outside the partition.
    pub spanning: Vec<ReadGroup>,
    /// Candidate support fragments no junction accepted yet.
    pub leftovers: Vec<ReadGroup>,
    pub dropped: usize,
}

impl BucketOutcome {
    pub fn extend(&mut self, other: BucketOutcome) {
        self.groups.extend(other.groups);
        self.spanning.extend(other.spanning);
        self.leftovers.extend(other.leftovers);
        self.dropped += other.dropped;
    }
}

/// Fixed-size windows over a partition, closed once the scan has moved far enough past
/// them that no further read of their fragments can show up.
pub struct PartitionBuckets {
    partition: Partition,
    bucket_size: u64,
    max_fragment_length: u64,
    buckets: BTreeMap<u64, Bucket>,
    /// Bucket index each fragment currently lives in.
    fragment_index: HashMap<String, u64>,
}

impl PartitionBuckets {
    pub fn new(partition: Partition, bucket_size: u64, max_fragment_length: u64) -> Self {
        PartitionBuckets {
            partition,
            bucket_size: bucket_size.max(1),
            max_fragment_length,
            buckets: BTreeMap::new(),
            fragment_index: HashMap::new(),
        }
    }

    fn bucket_index(&self, position: u64) -> u64 {
        position.saturating_sub(self.partition.start()) / self.bucket_size
    }

    fn bucket(&mut self, index: u64) -> &mut Bucket {
        let start = self.partition.start() + index * self.bucket_size;
        let end = (start + self.bucket_size - 1).min(self.partition.end());
        self.buckets.entry(index).or_insert_with(|| Bucket {
            index,
            start,
            end,
            groups: BTreeMap::new(),
        })
    }

    pub fn add_read(&mut self, read: ReadRecord, role: ReadRole) {
        match self.fragment_index.get(read.id()).copied() {
            Some(index) => {
                if let Some(group) = self.bucket(index).groups.get_mut(read.id()) {
                    group.add_read(read, role);
                }
            }
            None => {
                let index = self.bucket_index(read.start());
                self.fragment_index.insert(read.id().clone(), index);
                let id = read.id().clone();
                self.bucket(index)
                    .groups
                    .insert(id, ReadGroup::new(read, role));
            }
        }
    }

    pub fn group_count(&self) -> usize {
        self.fragment_index.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Remove the buckets the scan at `position` has left behind for good. Unfinished groups
    /// are carried into the following bucket first.
    pub fn close_passed(&mut self, position: u64) -> Vec<Bucket> {
        let mut closed = Vec::new();
        while let Some(index) = self.buckets.keys().next().copied() {
            let ready = self
                .buckets
                .get(&index)
                .map_or(false, |bucket| bucket.end + self.max_fragment_length < position);
            if !ready {
                break;
            }
            if let Some(bucket) = self.buckets.remove(&index) {
                closed.push(self.transfer_to_next(bucket, position));
            }
        }
        closed
    }

    /// Remove all remaining buckets at the end of the partition.
    pub fn close_all(&mut self) -> Vec<Bucket> {
        let buckets = std::mem::take(&mut self.buckets);
        self.fragment_index.clear();
        buckets.into_iter().map(|(_, bucket)| bucket).collect()
    }

    /// Move groups still waiting for a read of this partition at or after `position` into
    /// the next bucket. Groups only ever move forward.
    fn transfer_to_next(&mut self, mut bucket: Bucket, position: u64) -> Bucket {
        let (chrom, end) = (self.partition.chromosome().clone(), self.partition.end());
        let waiting: Vec<String> = bucket
            .groups
            .iter()
            .filter(|(_, group)| group.expects_read_within(&chrom, position, end))
            .map(|(id, _)| id.clone())
            .collect();

        let next = bucket.index + 1;
        for id in waiting {
            if let Some(group) = bucket.groups.remove(&id) {
                self.fragment_index.insert(id.clone(), next);
                self.bucket(next).groups.insert(id, group);
            }
        }
        for id in bucket.groups.keys() {
            self.fragment_index.remove(id);
        }
        bucket
    }
}

/// Form links for the groups of a closed bucket: junction fragments are linked to their
/// junctions, candidate support is assigned to the best junction.
pub fn create_junctions(
    bucket: Bucket,
    tracker: &mut JunctionTracker<'_>,
    partition: &Partition,
) -> Result<BucketOutcome> {
    let mut outcome = BucketOutcome::default();
    for (id, group) in bucket.groups {
        let remote = group.expects_read_outside(partition.chromosome(), partition.start(), partition.end());

        let group = if tracker.is_junction_fragment(&id) {
            group.into_linked(tracker.junction_links(&id))
        } else if group.has_role(ReadRole::CandidateSupport) {
            match tracker.assign_support(&group)? {
                Some(link) => group.into_linked(vec![link]),
                None => {
                    outcome.leftovers.push(group);
                    continue;
                }
            }
        } else if remote {
            outcome.spanning.push(group.into_conditional());
            continue;
        } else {
            outcome.dropped += 1;
            continue;
        };

        if remote {
            outcome.spanning.push(group);
        } else {
            outcome.groups.push(group);
        }
    }
    Ok(outcome)
}
