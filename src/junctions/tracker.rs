// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use anyhow::Result;

use crate::classify::{JunctionSite, ReadClassifier};
use crate::errors::Error;
use crate::junctions::{JunctionData, Orientation, RemoteJunction};
use crate::reads::{JunctionLink, LinkKind, ReadGroup, ReadRecord, ReadRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Empty,
    Accumulating,
    Finalized,
}

type JunctionKey = (u64, Orientation);

/// Aggregates junction reads of one partition into candidate breakpoints and assigns
/// support to them.
#[derive(CopyGetters)]
pub struct JunctionTracker<'a> {
    classifier: &'a ReadClassifier,
    #[getset(get_copy = "pub")]
    state: TrackerState,
    junctions: BTreeMap<JunctionKey, JunctionData>,
    /// Junctions each junction fragment contributed to.
    fragment_junctions: HashMap<String, Vec<JunctionKey>>,
    #[getset(get_copy = "pub")]
    blacklisted: usize,
    #[getset(get_copy = "pub")]
    junction_reads: usize,
}

/// Ranking of a junction for a candidate support fragment: read distance, then exact support
/// with more matching bases, then position and orientation. Smaller is better.
type SupportRank = (u64, Reverse<(bool, usize)>, u64, Orientation);

impl<'a> JunctionTracker<'a> {
    pub fn new(classifier: &'a ReadClassifier) -> Self {
        JunctionTracker {
            classifier,
            state: TrackerState::Empty,
            junctions: BTreeMap::new(),
            fragment_junctions: HashMap::new(),
            blacklisted: 0,
            junction_reads: 0,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.state == TrackerState::Finalized {
            Err(Error::JunctionTrackerFinalized.into())
        } else {
            Ok(())
        }
    }

    /// Register a classified read. Junction reads create or extend junctions. Returns false
    /// if the read starts in a blacklisted region and has to be dropped entirely.
    pub fn process_read(&mut self, read: &ReadRecord, role: ReadRole) -> Result<bool> {
        self.check_open()?;
        self.state = TrackerState::Accumulating;

        if self.classifier.is_blacklisted(read) {
            self.blacklisted += 1;
            return Ok(false);
        }

        if role == ReadRole::Junction {
            self.junction_reads += 1;
            let hotspot = self.classifier.in_hotspot(read);
            let remote_junctions: Vec<_> = read
                .supplementary_alignments()
                .iter()
                .map(|sa| {
                    let (position, orientation) = sa.breakend();
                    RemoteJunction::new(sa.chromosome().clone(), position, orientation)
                })
                .collect();

            for site in self.classifier.junction_sites(read) {
                let key = self.merge_or_create(read, &site);
                if let Some(junction) = self.junctions.get_mut(&key) {
                    junction.add_junction_fragment(read, site.length(), site.indel());
                    if hotspot {
                        junction.set_hotspot();
                    }
                    if !site.indel() {
                        for remote in &remote_junctions {
                            junction.add_remote_junction(remote.clone());
                        }
                    }
                }
                let keys = self
                    .fragment_junctions
                    .entry(read.id().clone())
                    .or_insert_with(Vec::new);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        Ok(true)
    }

    /// Key of the closest junction with the same orientation within the merge distance,
    /// or of a newly created one.
    fn merge_or_create(&mut self, read: &ReadRecord, site: &JunctionSite) -> JunctionKey {
        let distance = self.classifier.config().junction_merge_distance;
        let lower = site.position().saturating_sub(distance);
        let upper = site.position() + distance;
        let existing = self
            .junctions
            .range((lower, Orientation::Positive)..=(upper, Orientation::Negative))
            .filter(|((_, orientation), _)| *orientation == site.orientation())
            .min_by_key(|((position, _), _)| {
                ((*position as i64 - site.position() as i64).abs(), *position)
            })
            .map(|(key, _)| *key);

        existing.unwrap_or_else(|| {
            let key = (site.position(), site.orientation());
            self.junctions.insert(
                key,
                JunctionData::new(read.chromosome(), site.position(), site.orientation()),
            );
            key
        })
    }

    /// Links of a junction fragment to the junctions it formed.
    pub fn junction_links(&self, id: &str) -> Vec<JunctionLink> {
        self.fragment_junctions
            .get(id)
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| self.junctions.get(key))
                    .map(|junction| {
                        JunctionLink::new(
                            junction.chromosome().clone(),
                            junction.position(),
                            junction.orientation(),
                            LinkKind::Junction,
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_junction_fragment(&self, id: &str) -> bool {
        self.fragment_junctions.contains_key(id)
    }

    /// Assign a candidate support fragment to its best junction. Returns the resulting link,
    /// if any junction is supported.
    pub fn assign_support(&mut self, group: &ReadGroup) -> Result<Option<JunctionLink>> {
        self.check_open()?;
        if self.is_junction_fragment(group.id()) {
            return Ok(None);
        }

        let max_fragment_length = self.classifier.config().max_fragment_length;
        let tolerance = self.classifier.config().exact_support_tolerance;
        let mut best: Option<(SupportRank, JunctionKey, bool)> = None;

        for (read, role) in group.reads() {
            if *role != ReadRole::CandidateSupport && *role != ReadRole::Support {
                continue;
            }
            let lower = read.start().saturating_sub(max_fragment_length);
            let upper = read.end() + max_fragment_length;
            for (key, junction) in self
                .junctions
                .range((lower, Orientation::Positive)..=(upper, Orientation::Negative))
            {
                if junction.chromosome() != read.chromosome() {
                    continue;
                }
                let quality = match self.classifier.junction_match(read, junction, tolerance) {
                    Some(matches) => (true, matches),
                    None if self.classifier.supports_junction_distant(read, junction) => {
                        (false, 0)
                    }
                    None => continue,
                };
                let exact = quality.0;
                let rank = (
                    read_distance(read, junction.position()),
                    Reverse(quality),
                    junction.position(),
                    junction.orientation(),
                );
                if best.as_ref().map_or(true, |(best_rank, _, _)| rank < *best_rank) {
                    best = Some((rank, *key, exact));
                }
            }
        }

        Ok(best.and_then(|(_, key, exact)| {
            let junction = self.junctions.get_mut(&key)?;
            let kind = if exact {
                junction.add_exact_support(group.id());
                LinkKind::ExactSupport
            } else {
                junction.add_support(group.id());
                LinkKind::Support
            };
            Some(JunctionLink::new(
                junction.chromosome().clone(),
                junction.position(),
                junction.orientation(),
                kind,
            ))
        }))
    }

    /// Finish assignment and derive the final fragment counts of every junction.
    pub fn assign_junction_fragments_and_support(&mut self) -> Result<()> {
        self.check_open()?;
        for junction in self.junctions.values_mut() {
            junction.finalize_counts();
        }
        self.state = TrackerState::Finalized;
        Ok(())
    }

    pub fn junctions(&self) -> impl Iterator<Item = &JunctionData> {
        self.junctions.values()
    }

    pub fn junction_count(&self) -> usize {
        self.junctions.len()
    }

    pub fn into_junctions(self) -> Vec<JunctionData> {
        self.junctions.into_iter().map(|(_, junction)| junction).collect()
    }
}

/// Distance between a read and a position, zero if the read covers it.
fn read_distance(read: &ReadRecord, position: u64) -> u64 {
    if position < read.start() {
        read.start() - position
    } else if position > read.end() {
        position - read.end()
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrepConfig;
    use crate::reads::{flags, parse_cigar, ReadRecordBuilder};
    use crate::utils::RegionSet;

    const SEQ: &[u8] = b"ACGTTGCATGCAGTCCATGAGCTTAGCGGATCCAGTACGATCGTTAGCATCGACTGAGCTACCGATAGGCTAGCATCAGTCAGATCGAGTAGCTAGGCTAGCTAAC";

    fn read(id: &str, start: u64, cigar: &str, offset: usize) -> ReadRecord {
        let cigar = parse_cigar(cigar).unwrap();
        let len = cigar
            .iter()
            .map(|op| match op {
                rust_htslib::bam::record::Cigar::Match(l)
                | rust_htslib::bam::record::Cigar::Ins(l)
                | rust_htslib::bam::record::Cigar::SoftClip(l) => *l as usize,
                _ => 0,
            })
            .sum::<usize>();
        ReadRecordBuilder::default()
            .id(id)
            .chromosome("1")
            .start(start)
            .cigar(cigar)
            .bases(SEQ[offset..offset + len].to_vec())
            .quals(vec![37; len])
            .build()
            .unwrap()
    }

    #[test]
    fn test_merge_nearby_junction_reads() {
        let classifier = ReadClassifier::with_config(PrepConfig::default());
        let mut tracker = JunctionTracker::new(&classifier);
        assert_eq!(tracker.state(), TrackerState::Empty);

        let first = read("a", 100, "60M40S", 0);
        let second = read("b", 101, "60M40S", 1);
        let third = read("c", 110, "60M40S", 5);
        for r in &[&first, &second, &third] {
            assert!(tracker.process_read(r, ReadRole::Junction).unwrap());
        }
        assert_eq!(tracker.state(), TrackerState::Accumulating);
        assert_eq!(tracker.junction_count(), 2);
        assert_eq!(tracker.junction_links("b")[0].position(), 159);
        assert!(tracker.junction_links("x").is_empty());
    }

    #[test]
    fn test_indel_read_forms_two_junctions() {
        let classifier = ReadClassifier::with_config(PrepConfig::default());
        let mut tracker = JunctionTracker::new(&classifier);
        let read = read("a", 100, "20M40D20M", 0);
        tracker.process_read(&read, ReadRole::Junction).unwrap();
        let junctions: Vec<_> = tracker
            .junctions()
            .map(|j| (j.position(), j.orientation(), j.indel()))
            .collect();
        assert_eq!(
            junctions,
            vec![
                (119, Orientation::Positive, true),
                (160, Orientation::Negative, true)
            ]
        );
    }

    #[test]
    fn test_blacklisted_read_is_dropped() {
        let blacklist = RegionSet::from_regions(vec![("1", 50, 150)]);
        let classifier = ReadClassifier::new(PrepConfig::default(), blacklist, RegionSet::new());
        let mut tracker = JunctionTracker::new(&classifier);
        assert!(!tracker
            .process_read(&read("a", 100, "60M40S", 0), ReadRole::Junction)
            .unwrap());
        assert_eq!(tracker.junction_count(), 0);
        assert_eq!(tracker.blacklisted(), 1);
    }

    #[test]
    fn test_support_and_counts() {
        let classifier = ReadClassifier::with_config(PrepConfig::default());
        let mut tracker = JunctionTracker::new(&classifier);
        let junction_read = read("a", 100, "60M40S", 0);
        tracker.process_read(&junction_read, ReadRole::Junction).unwrap();

        // same sequence, shorter clip: exact support
        let exact = ReadGroup::new(read("b", 110, "50M20S", 10), ReadRole::CandidateSupport);
        let link = tracker.assign_support(&exact).unwrap().unwrap();
        assert_eq!(link.kind(), LinkKind::ExactSupport);

        // forward read ending before the junction: distant support
        let mut distant = read("c", 20, "50M10S", 0);
        distant = ReadRecordBuilder::default()
            .id("c")
            .chromosome("1")
            .start(20)
            .cigar(distant.cigar().clone())
            .bases(vec![b'G'; 60])
            .quals(vec![37; 60])
            .flags(flags::PAIRED | flags::MATE_REVERSE)
            .mate_chromosome(Some("1".to_owned()))
            .mate_start(Some(400))
            .build()
            .unwrap();
        let distant = ReadGroup::new(distant, ReadRole::CandidateSupport);
        let link = tracker.assign_support(&distant).unwrap().unwrap();
        assert_eq!(link.kind(), LinkKind::Support);

        // the junction fragment itself is not support
        let own = ReadGroup::new(junction_read.clone(), ReadRole::Junction);
        assert!(tracker.assign_support(&own).unwrap().is_none());

        tracker.assign_junction_fragments_and_support().unwrap();
        let junction = tracker.junctions().next().unwrap();
        assert_eq!(junction.junction_fragment_count(), 1);
        assert_eq!(junction.exact_support_fragment_count(), 2);
        assert_eq!(junction.supporting_fragment_count(), 3);

        let err = tracker
            .process_read(&junction_read, ReadRole::Junction)
            .unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::JunctionTrackerFinalized));
    }

    #[test]
    fn test_equidistant_support_prefers_lower_position() {
        let classifier = ReadClassifier::with_config(PrepConfig::default());
        let mut tracker = JunctionTracker::new(&classifier);
        tracker
            .process_read(&read("a", 100, "20M40D20M", 0), ReadRole::Junction)
            .unwrap();

        // spans the deletion with reference sequence on both flanks
        let mut bases = vec![b'G'; 100];
        bases[..20].copy_from_slice(&SEQ[..20]);
        bases[60..80].copy_from_slice(&SEQ[20..40]);
        let spanning = ReadRecordBuilder::default()
            .id("b")
            .chromosome("1")
            .start(100)
            .cigar(parse_cigar("100M").unwrap())
            .bases(bases)
            .quals(vec![37; 100])
            .build()
            .unwrap();
        let link = tracker
            .assign_support(&ReadGroup::new(spanning, ReadRole::CandidateSupport))
            .unwrap()
            .unwrap();
        assert_eq!(link.position(), 119);
        assert_eq!(link.orientation(), Orientation::Positive);
    }

    /// Pseudo-random reference; `reference()[p]` is the base at position `p`.
    fn reference() -> Vec<u8> {
        let mut state: u32 = 17;
        (0..300)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                b"ACGT"[((state >> 16) & 3) as usize]
            })
            .collect()
    }

    fn reference_read(id: &str, start: u64, cigar: &str, from: usize) -> ReadRecord {
        let bases = reference()[from..from + 100].to_vec();
        ReadRecordBuilder::default()
            .id(id)
            .chromosome("1")
            .start(start)
            .cigar(parse_cigar(cigar).unwrap())
            .bases(bases)
            .quals(vec![37; 100])
            .build()
            .unwrap()
    }

    #[test]
    fn test_equidistant_support_prefers_more_matching_bases() {
        let classifier = ReadClassifier::with_config(PrepConfig::default());
        let mut tracker = JunctionTracker::new(&classifier);
        tracker
            .process_read(&reference_read("a", 71, "60M40S", 71), ReadRole::Junction)
            .unwrap();
        tracker
            .process_read(&reference_read("b", 160, "40S60M", 120), ReadRole::Junction)
            .unwrap();
        let positions: Vec<_> = tracker
            .junctions()
            .map(|j| (j.position(), j.orientation()))
            .collect();
        assert_eq!(
            positions,
            vec![(130, Orientation::Positive), (160, Orientation::Negative)]
        );

        // covers both junctions; overlaps the top read of 130+ by 51 bases, that of 160- by 100
        let candidate = reference_read("c", 120, "100M", 120);
        let junctions: Vec<_> = tracker.junctions().collect();
        assert_eq!(classifier.junction_match(&candidate, junctions[0], 2), Some(51));
        assert_eq!(classifier.junction_match(&candidate, junctions[1], 2), Some(100));

        let link = tracker
            .assign_support(&ReadGroup::new(candidate, ReadRole::CandidateSupport))
            .unwrap()
            .unwrap();
        assert_eq!(link.position(), 160);
        assert_eq!(link.orientation(), Orientation::Negative);
        assert_eq!(link.kind(), LinkKind::ExactSupport);
    }

    #[test]
    fn test_remote_junction_from_supplementary() {
        let classifier = ReadClassifier::with_config(PrepConfig::default());
        let mut tracker = JunctionTracker::new(&classifier);
        let base = read("a", 100, "60M40S", 0);
        let read = ReadRecordBuilder::default()
            .id("a")
            .chromosome("1")
            .start(100)
            .cigar(base.cigar().clone())
            .bases(base.bases().clone())
            .quals(base.quals().clone())
            .supplementary_alignments(
                crate::reads::SupplementaryAlignment::parse_tag("2,5000,+,60H40M,60,0").unwrap(),
            )
            .build()
            .unwrap();
        tracker.process_read(&read, ReadRole::Junction).unwrap();
        let junction = tracker.junctions().next().unwrap();
        assert_eq!(
            junction.remote_junctions()[0],
            RemoteJunction::new("2".to_owned(), 5000, Orientation::Negative)
        );
    }
}
