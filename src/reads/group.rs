// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashSet;

use strum_macros::Display;

use crate::junctions::Orientation;
use crate::reads::{ReadRecord, ReadRole};

/// How a fragment relates to a junction it is linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum LinkKind {
    #[strum(serialize = "junction")]
    Junction,
    #[strum(serialize = "exact")]
    ExactSupport,
    #[strum(serialize = "support")]
    Support,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, new, Getters, CopyGetters)]
pub struct JunctionLink {
    #[getset(get = "pub")]
    chromosome: String,
    #[getset(get_copy = "pub")]
    position: u64,
    #[getset(get_copy = "pub")]
    orientation: Orientation,
    #[getset(get_copy = "pub")]
    kind: LinkKind,
}

/// A read of the fragment known to exist from the mate or SA fields of another read.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct ExpectedRead {
    #[getset(get = "pub")]
    chromosome: String,
    #[getset(get_copy = "pub")]
    position: u64,
    #[getset(get_copy = "pub")]
    first_in_pair: bool,
    #[getset(get_copy = "pub")]
    supplementary: bool,
    #[getset(get_copy = "pub")]
    found: bool,
}

impl ExpectedRead {
    fn new(chromosome: &str, position: u64, first_in_pair: bool, supplementary: bool) -> Self {
        ExpectedRead {
            chromosome: chromosome.to_owned(),
            position,
            first_in_pair,
            supplementary,
            found: false,
        }
    }

    pub fn is_described_by(&self, read: &ReadRecord) -> bool {
        self.position == read.start()
            && self.first_in_pair == read.is_first_in_pair()
            && self.supplementary == read.is_supplementary()
            && &self.chromosome == read.chromosome()
    }

    fn same_location(&self, other: &ExpectedRead) -> bool {
        self.position == other.position
            && self.first_in_pair == other.first_in_pair
            && self.supplementary == other.supplementary
            && self.chromosome == other.chromosome
    }

    pub fn lies_within(&self, chrom: &str, start: u64, end: u64) -> bool {
        self.chromosome == chrom && self.position >= start && self.position <= end
    }

    /// Reads of the fragment that `read` itself points to.
    fn from_read(read: &ReadRecord) -> Vec<ExpectedRead> {
        let mut expected = Vec::new();
        let mate = if read.has_mapped_mate() {
            match (read.mate_chromosome(), read.mate_start()) {
                (Some(chrom), Some(pos)) => Some(ExpectedRead::new(
                    chrom,
                    pos,
                    !read.is_first_in_pair() && read.is_paired(),
                    false,
                )),
                _ => None,
            }
        } else {
            None
        };
        if read.is_supplementary() {
            // the first SA entry of a supplementary alignment is its primary
            if let Some(primary) = read.supplementary_alignments().first() {
                expected.push(ExpectedRead::new(
                    primary.chromosome(),
                    primary.position(),
                    read.is_first_in_pair(),
                    false,
                ));
            }
        } else {
            for sa in read.supplementary_alignments() {
                expected.push(ExpectedRead::new(
                    sa.chromosome(),
                    sa.position(),
                    read.is_first_in_pair(),
                    true,
                ));
            }
        }
        expected.extend(mate);
        expected
    }
}

/// All reads sharing a fragment id, with the junctions the fragment has been linked to.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct ReadGroup {
    #[getset(get = "pub")]
    id: String,
    #[getset(get = "pub")]
    reads: Vec<(ReadRecord, ReadRole)>,
    #[getset(get = "pub")]
    links: Vec<JunctionLink>,
    #[getset(get = "pub")]
    expected_reads: Vec<ExpectedRead>,
    /// Set when the group can only be resolved once other partitions have been seen.
    #[getset(get_copy = "pub")]
    conditional_on_remote_reads: bool,
}

impl ReadGroup {
    pub fn new(read: ReadRecord, role: ReadRole) -> Self {
        let mut group = ReadGroup {
            id: read.id().clone(),
            reads: Vec::with_capacity(2),
            links: Vec::new(),
            expected_reads: Vec::new(),
            conditional_on_remote_reads: false,
        };
        group.add_read(read, role);
        group
    }

    pub fn add_read(&mut self, read: ReadRecord, role: ReadRole) {
        for expected in &mut self.expected_reads {
            if expected.is_described_by(&read) {
                expected.found = true;
            }
        }
        for expected in ExpectedRead::from_read(&read) {
            let known = self.expected_reads.iter().any(|e| e.same_location(&expected));
            if !known {
                let mut expected = expected;
                expected.found = self.reads.iter().any(|(r, _)| expected.is_described_by(r))
                    || expected.is_described_by(&read);
                self.expected_reads.push(expected);
            }
        }
        self.reads.push((read, role));
    }

    /// Move another part of the same fragment into this group.
    pub fn merge(&mut self, other: ReadGroup) {
        for (read, role) in other.reads {
            let duplicate = self.reads.iter().any(|(r, _)| {
                r.start() == read.start()
                    && r.is_first_in_pair() == read.is_first_in_pair()
                    && r.is_supplementary() == read.is_supplementary()
                    && r.chromosome() == read.chromosome()
            });
            if !duplicate {
                self.add_read(read, role);
            }
        }
        for link in other.links {
            if !self.links.contains(&link) {
                self.links.push(link);
            }
        }
        self.conditional_on_remote_reads |= other.conditional_on_remote_reads;
    }

    pub fn add_link(&mut self, link: JunctionLink) {
        if !self.links.contains(&link) {
            self.links.push(link);
        }
    }

    /// Promote candidate support to support, recording the junctions that justified it.
    pub fn into_linked(mut self, links: Vec<JunctionLink>) -> Self {
        if !links.is_empty() {
            for (_, role) in &mut self.reads {
                if *role == ReadRole::CandidateSupport {
                    *role = ReadRole::Support;
                }
            }
        }
        for link in links {
            self.add_link(link);
        }
        self
    }

    pub fn into_conditional(mut self) -> Self {
        self.conditional_on_remote_reads = true;
        self
    }

    /// Smallest read start, which decides the bucket the group lives in.
    pub fn min_start(&self) -> u64 {
        self.reads
            .iter()
            .map(|(read, _)| read.start())
            .min()
            .unwrap_or(0)
    }

    pub fn has_role(&self, role: ReadRole) -> bool {
        self.reads.iter().any(|(_, r)| *r == role)
    }

    pub fn has_junction_read(&self) -> bool {
        self.has_role(ReadRole::Junction)
    }

    /// Junction read or junction link: the group is worth emitting.
    pub fn has_junction_evidence(&self) -> bool {
        self.has_junction_read() || !self.links.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.expected_reads.iter().all(|e| e.found)
    }

    pub fn missing_reads(&self) -> impl Iterator<Item = &ExpectedRead> {
        self.expected_reads.iter().filter(|e| !e.found)
    }

    /// Whether a read still missing from the group lies in `chrom:start..=end`, at or after `from`.
    pub fn expects_read_within(&self, chrom: &str, from: u64, end: u64) -> bool {
        self.missing_reads().any(|e| e.lies_within(chrom, from, end))
    }

    /// Whether a read still missing from the group lies outside `chrom:start..=end`.
    pub fn expects_read_outside(&self, chrom: &str, start: u64, end: u64) -> bool {
        self.missing_reads().any(|e| !e.lies_within(chrom, start, end))
    }

    /// Give up on the reads that never arrived. Returns how many were missed.
    pub fn resolve_missing(&mut self) -> usize {
        let mut missed = 0;
        for expected in &mut self.expected_reads {
            if !expected.found {
                expected.found = true;
                missed += 1;
            }
        }
        missed
    }

    /// Number of distinct partitions the fragment's known and expected reads fall into.
    pub fn partition_span_count(&self, partition_size: u64) -> usize {
        let reads = self
            .reads
            .iter()
            .map(|(read, _)| (read.chromosome().as_str(), read.start()));
        let expected = self
            .expected_reads
            .iter()
            .map(|e| (e.chromosome.as_str(), e.position));
        reads
            .chain(expected)
            .map(|(chrom, pos)| (chrom, pos.saturating_sub(1) / partition_size.max(1)))
            .collect::<HashSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::{flags, parse_cigar, ReadRecordBuilder, SupplementaryAlignment};

    fn read(start: u64, flags: u16, mate_start: u64, sa: &str) -> ReadRecord {
        ReadRecordBuilder::default()
            .id("frag")
            .chromosome("1")
            .start(start)
            .cigar(parse_cigar("100M").unwrap())
            .flags(flags)
            .mate_chromosome(Some("1".to_owned()))
            .mate_start(Some(mate_start))
            .supplementary_alignments(SupplementaryAlignment::parse_tag(sa).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_mate_expectation() {
        let first = read(100, flags::PAIRED | flags::FIRST_IN_PAIR, 400, "");
        let mut group = ReadGroup::new(first, ReadRole::CandidateSupport);
        assert!(!group.is_complete());
        assert!(group.expects_read_within("1", 1, 1000));
        assert!(!group.expects_read_outside("1", 1, 1000));
        assert!(group.expects_read_outside("1", 1, 300));

        let second = read(400, flags::PAIRED | flags::SECOND_IN_PAIR, 100, "");
        group.add_read(second, ReadRole::NoSupport);
        assert!(group.is_complete());
        assert_eq!(group.min_start(), 100);
    }

    #[test]
    fn test_supplementary_expectation() {
        let primary = read(100, flags::PAIRED | flags::FIRST_IN_PAIR, 400, "1,5000,+,60S40M,60,0");
        let mut group = ReadGroup::new(primary, ReadRole::Junction);
        assert_eq!(group.missing_reads().count(), 2);
        assert_eq!(group.partition_span_count(1000), 2);

        let supplementary = read(
            5000,
            flags::PAIRED | flags::FIRST_IN_PAIR | flags::SUPPLEMENTARY,
            400,
            "1,100,+,100M,60,0",
        );
        group.add_read(supplementary, ReadRole::CandidateSupport);
        assert_eq!(group.missing_reads().count(), 1);
        assert_eq!(group.resolve_missing(), 1);
        assert!(group.is_complete());
    }

    #[test]
    fn test_promotion() {
        let first = read(100, flags::PAIRED | flags::FIRST_IN_PAIR, 400, "");
        let group = ReadGroup::new(first, ReadRole::CandidateSupport);
        assert!(!group.has_junction_evidence());
        let group = group.into_linked(vec![JunctionLink::new(
            "1".to_owned(),
            250,
            Orientation::Positive,
            LinkKind::Support,
        )]);
        assert!(group.has_role(ReadRole::Support));
        assert!(!group.has_role(ReadRole::CandidateSupport));
        assert!(group.has_junction_evidence());
        assert!(group.into_conditional().conditional_on_remote_reads());
    }

    #[test]
    fn test_merge_skips_duplicates() {
        let first = read(100, flags::PAIRED | flags::FIRST_IN_PAIR, 400, "");
        let second = read(400, flags::PAIRED | flags::SECOND_IN_PAIR, 100, "");
        let mut group = ReadGroup::new(first.clone(), ReadRole::CandidateSupport);
        let mut other = ReadGroup::new(second, ReadRole::NoSupport);
        other.add_read(first, ReadRole::CandidateSupport);
        group.merge(other);
        assert_eq!(group.reads().len(), 2);
        assert!(group.is_complete());
    }
}
