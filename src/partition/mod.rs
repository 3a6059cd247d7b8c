// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Single-pass processing of one genomic partition.

use std::ops::AddAssign;

use anyhow::Result;

use crate::classify::ReadClassifier;
use crate::junctions::{DiscordantGroups, JunctionData, JunctionTracker};
use crate::rate::RateTracker;
use crate::reads::{ReadGroup, ReadRecord, ReadRole};

pub mod buckets;

pub use buckets::{create_junctions, Bucket, BucketOutcome, PartitionBuckets};

/// A contiguous, 1-based inclusive range of one chromosome.
#[derive(Debug, Clone, PartialEq, Eq, new, Getters, CopyGetters)]
pub struct Partition {
    /// Position of the partition in the genome-wide processing order.
    #[getset(get_copy = "pub")]
    index: usize,
    #[getset(get = "pub")]
    chromosome: String,
    #[getset(get_copy = "pub")]
    start: u64,
    #[getset(get_copy = "pub")]
    end: u64,
}

impl Partition {
    pub fn contains(&self, chrom: &str, position: u64) -> bool {
        self.chromosome == chrom && position >= self.start && position <= self.end
    }

    /// Split chromosomes of the given lengths into partitions of `partition_size`, numbering
    /// them consecutively in the given chromosome order.
    pub fn tile<'a, I>(chromosomes: I, partition_size: u64) -> Vec<Partition>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let partition_size = partition_size.max(1);
        let mut partitions = Vec::new();
        for (chrom, len) in chromosomes {
            let mut start = 1;
            while start <= len {
                let end = (start + partition_size - 1).min(len);
                partitions.push(Partition::new(partitions.len(), chrom.to_owned(), start, end));
                start = end + 1;
            }
        }
        partitions
    }
}

/// Counters collected while processing partitions. Summed across the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartitionStats {
    pub reads: usize,
    pub junction_reads: usize,
    pub candidate_reads: usize,
    pub blacklisted: usize,
    pub malformed: usize,
    pub rate_limited: usize,
    pub junctions: usize,
    pub discordant_junctions: usize,
    pub emitted_groups: usize,
    pub spanning_groups: usize,
    pub dropped_groups: usize,
}

impl AddAssign for PartitionStats {
    fn add_assign(&mut self, other: Self) {
        self.reads += other.reads;
        self.junction_reads += other.junction_reads;
        self.candidate_reads += other.candidate_reads;
        self.blacklisted += other.blacklisted;
        self.malformed += other.malformed;
        self.rate_limited += other.rate_limited;
        self.junctions += other.junctions;
        self.discordant_junctions += other.discordant_junctions;
        self.emitted_groups += other.emitted_groups;
        self.spanning_groups += other.spanning_groups;
        self.dropped_groups += other.dropped_groups;
    }
}

/// Everything a finished partition hands on: its junctions, the fragments resolved within
/// it and the fragments that depend on other partitions.
#[derive(Debug, Getters, CopyGetters)]
pub struct PartitionResult {
    #[getset(get = "pub")]
    partition: Partition,
    #[getset(get = "pub")]
    junctions: Vec<JunctionData>,
    #[getset(get = "pub")]
    groups: Vec<ReadGroup>,
    #[getset(get = "pub")]
    spanning_groups: Vec<ReadGroup>,
    #[getset(get_copy = "pub")]
    stats: PartitionStats,
}

impl PartitionResult {
    pub fn into_parts(self) -> (Partition, Vec<JunctionData>, Vec<ReadGroup>, Vec<ReadGroup>, PartitionStats) {
        (
            self.partition,
            self.junctions,
            self.groups,
            self.spanning_groups,
            self.stats,
        )
    }
}

/// Drives one sequential scan over the reads of a partition.
pub struct PartitionProcessor<'a> {
    classifier: &'a ReadClassifier,
    partition: Partition,
    tracker: JunctionTracker<'a>,
    buckets: PartitionBuckets,
    rate_tracker: RateTracker,
    outcome: BucketOutcome,
    stats: PartitionStats,
}

impl<'a> PartitionProcessor<'a> {
    pub fn new(classifier: &'a ReadClassifier, partition: Partition) -> Self {
        let config = classifier.config();
        PartitionProcessor {
            classifier,
            tracker: JunctionTracker::new(classifier),
            buckets: PartitionBuckets::new(
                partition.clone(),
                config.bucket_size,
                config.max_fragment_length,
            ),
            rate_tracker: RateTracker::from_config(&config.rate_limit),
            partition,
            outcome: BucketOutcome::default(),
            stats: PartitionStats::default(),
        }
    }

    /// Classify a read and route it into the junction tracker and its bucket. Reads have to
    /// arrive sorted by position; reads starting outside the partition are ignored.
    pub fn process_read(&mut self, read: ReadRecord) -> Result<()> {
        if !self.partition.contains(read.chromosome(), read.start()) {
            return Ok(());
        }
        self.stats.reads += 1;

        let mut role = self.classifier.classify(&read);
        if read.is_malformed() {
            self.stats.malformed += 1;
        }
        if !self.rate_tracker.handle_read(read.start()) && role == ReadRole::Junction {
            role = ReadRole::CandidateSupport;
            self.stats.rate_limited += 1;
        }

        if !self.tracker.process_read(&read, role)? {
            self.stats.blacklisted += 1;
            return Ok(());
        }
        match role {
            ReadRole::Junction => self.stats.junction_reads += 1,
            ReadRole::CandidateSupport => self.stats.candidate_reads += 1,
            _ => (),
        }

        let position = read.start();
        self.close_buckets(position)?;
        self.buckets.add_read(read, role);
        Ok(())
    }

    /// Count a record that could not be converted into a read.
    pub fn skip_malformed(&mut self) {
        self.stats.reads += 1;
        self.stats.malformed += 1;
    }

    fn close_buckets(&mut self, position: u64) -> Result<()> {
        for bucket in self.buckets.close_passed(position) {
            let outcome = create_junctions(bucket, &mut self.tracker, &self.partition)?;
            self.outcome.extend(outcome);
        }
        Ok(())
    }

    /// Close all buckets, finalize the junctions, cluster the remaining discordant fragments
    /// and hand over the fragments that depend on other partitions.
    pub fn finish(mut self) -> Result<PartitionResult> {
        for bucket in self.buckets.close_all() {
            let outcome = create_junctions(bucket, &mut self.tracker, &self.partition)?;
            self.outcome.extend(outcome);
        }
        self.tracker.assign_junction_fragments_and_support()?;
        let mut junctions = self.tracker.into_junctions();

        let BucketOutcome {
            mut groups,
            mut spanning,
            leftovers,
            mut dropped,
        } = self.outcome;

        let discordant = DiscordantGroups::from_config(self.classifier.config())
            .form_discordant_junctions(&self.partition, &leftovers, &junctions);
        let mut links = discordant.links;
        self.stats.discordant_junctions = discordant.junctions.len();
        junctions.extend(discordant.junctions);
        junctions.sort_by_key(|junction| (junction.position(), junction.orientation()));

        let (chrom, start, end) = (
            self.partition.chromosome().clone(),
            self.partition.start(),
            self.partition.end(),
        );
        for group in leftovers {
            let remote = group.expects_read_outside(&chrom, start, end);
            let group = match links.remove(group.id()) {
                Some(links) => group.into_linked(links),
                None if remote => group.into_conditional(),
                None => {
                    dropped += 1;
                    continue;
                }
            };
            if remote {
                spanning.push(group);
            } else {
                groups.push(group);
            }
        }

        groups.sort_by(|a, b| a.min_start().cmp(&b.min_start()).then_with(|| a.id().cmp(b.id())));
        spanning.sort_by(|a, b| a.id().cmp(b.id()));

        self.stats.junctions = junctions.len();
        self.stats.emitted_groups = groups.len();
        self.stats.spanning_groups = spanning.len();
        self.stats.dropped_groups = dropped;

        debug!(
            "partition {}:{}-{}: {} reads, {} junctions, {} fragments, {} spanning",
            chrom,
            start,
            end,
            self.stats.reads,
            junctions.len(),
            groups.len(),
            spanning.len()
        );

        Ok(PartitionResult {
            partition: self.partition,
            junctions,
            groups,
            spanning_groups: spanning,
            stats: self.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrepConfig;

    #[test]
    fn test_tile() {
        let partitions = Partition::tile(vec![("1", 2500), ("2", 1000)], 1000);
        let ranges: Vec<_> = partitions
            .iter()
            .map(|p| (p.index(), p.chromosome().as_str(), p.start(), p.end()))
            .collect();
        assert_eq!(
            ranges,
            vec![
                (0, "1", 1, 1000),
                (1, "1", 1001, 2000),
                (2, "1", 2001, 2500),
                (3, "2", 1, 1000)
            ]
        );
    }

    #[test]
    fn test_stats_add_assign() {
        let mut total = PartitionStats::default();
        let stats = PartitionStats {
            reads: 10,
            junctions: 2,
            ..Default::default()
        };
        total += stats;
        total += stats;
        assert_eq!(total.reads, 20);
        assert_eq!(total.junctions, 4);
    }

    #[test]
    fn test_empty_partition() {
        let classifier = ReadClassifier::with_config(PrepConfig::default());
        let processor = PartitionProcessor::new(&classifier, Partition::new(0, "1".to_owned(), 1, 1000));
        let result = processor.finish().unwrap();
        assert!(result.junctions().is_empty());
        assert!(result.groups().is_empty());
        assert_eq!(result.stats(), PartitionStats::default());
    }

    #[test]
    fn test_skip_malformed() {
        let classifier = ReadClassifier::with_config(PrepConfig::default());
        let mut processor =
            PartitionProcessor::new(&classifier, Partition::new(0, "1".to_owned(), 1, 1000));
        processor.skip_malformed();
        let result = processor.finish().unwrap();
        assert_eq!(result.stats().reads, 1);
        assert_eq!(result.stats().malformed, 1);
        assert!(result.groups().is_empty());
    }
}
