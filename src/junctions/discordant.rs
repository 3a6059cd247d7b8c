// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;

use crate::config::PrepConfig;
use crate::junctions::{JunctionData, Orientation, RemoteJunction};
use crate::partition::Partition;
use crate::reads::{JunctionLink, LinkKind, ReadGroup, ReadRecord, ReadRole};

/// One discordant fragment reduced to its two sides.
#[derive(Debug, Clone)]
struct DiscordantFragment {
    id: String,
    local_start: u64,
    local_end: u64,
    remote_start: u64,
    remote_end: u64,
}

/// Fragments sharing chromosomes and orientations on both sides.
type ClusterKey = (Orientation, String, Orientation);

/// Junctions formed from discordant fragments, and the links of their member fragments.
#[derive(Debug, Default)]
pub struct DiscordantJunctions {
    pub junctions: Vec<JunctionData>,
    pub links: HashMap<String, Vec<JunctionLink>>,
}

/// Clusters fragments without direct soft clip evidence into junctions.
#[derive(Debug, Clone, new)]
pub struct DiscordantGroups {
    proximity: u64,
    min_fragments: usize,
    max_fragment_length: u64,
}

impl DiscordantGroups {
    pub fn from_config(config: &PrepConfig) -> Self {
        DiscordantGroups::new(
            config.discordant_proximity,
            config.discordant_min_fragments,
            config.max_fragment_length,
        )
    }

    /// Cluster the discordant fragments among `candidates` and form one junction per side of
    /// each cluster with enough fragments. Clusters close to an `existing` junction of the
    /// same orientation are left alone.
    pub fn form_discordant_junctions(
        &self,
        partition: &Partition,
        candidates: &[ReadGroup],
        existing: &[JunctionData],
    ) -> DiscordantJunctions {
        let mut clusters: BTreeMap<ClusterKey, Vec<DiscordantFragment>> = BTreeMap::new();
        for group in candidates {
            if let Some((key, fragment)) = self.discordant_fragment(partition, group) {
                clusters.entry(key).or_insert_with(Vec::new).push(fragment);
            }
        }

        let mut result = DiscordantJunctions::default();
        for ((local_orientation, remote_chrom, remote_orientation), fragments) in clusters {
            let mut remaining: Vec<_> = fragments
                .into_iter()
                .sorted_by_key(|f| (f.local_start, f.remote_start))
                .collect();

            while !remaining.is_empty() {
                let (first_local, first_remote) = (remaining[0].local_start, remaining[0].remote_start);
                let (cluster, rest): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|f| {
                    f.local_start <= first_local + self.proximity
                        && (f.remote_start as i64 - first_remote as i64).unsigned_abs()
                            <= self.proximity
                });
                remaining = rest;

                if cluster.len() < self.min_fragments {
                    continue;
                }

                let local_position = breakend(&cluster, local_orientation, |f| {
                    (f.local_start, f.local_end)
                });
                let remote_position = breakend(&cluster, remote_orientation, |f| {
                    (f.remote_start, f.remote_end)
                });

                let near_existing = existing.iter().any(|junction| {
                    junction.orientation() == local_orientation
                        && junction.chromosome() == partition.chromosome()
                        && junction.distance_to(local_position) <= self.proximity
                });
                if near_existing {
                    debug!(
                        "skipping discordant cluster at {}:{} close to an existing junction",
                        partition.chromosome(),
                        local_position
                    );
                    continue;
                }

                let ids: Vec<String> = cluster.iter().map(|f| f.id.clone()).collect();
                let mut local = JunctionData::discordant(
                    partition.chromosome(),
                    local_position,
                    local_orientation,
                    ids.clone(),
                );
                local.add_remote_junction(
                    RemoteJunction::new(remote_chrom.clone(), remote_position, remote_orientation)
                        .with_fragment_count(ids.len()),
                );

                let mut sides = vec![(partition.chromosome().clone(), local_position, local_orientation)];
                result.junctions.push(local);

                if partition.contains(&remote_chrom, remote_position) {
                    let mut remote = JunctionData::discordant(
                        &remote_chrom,
                        remote_position,
                        remote_orientation,
                        ids.clone(),
                    );
                    remote.add_remote_junction(
                        RemoteJunction::new(
                            partition.chromosome().clone(),
                            local_position,
                            local_orientation,
                        )
                        .with_fragment_count(ids.len()),
                    );
                    result.junctions.push(remote);
                    sides.push((remote_chrom.clone(), remote_position, remote_orientation));
                }

                for id in ids {
                    let links = result.links.entry(id).or_insert_with(Vec::new);
                    for (chrom, position, orientation) in &sides {
                        links.push(JunctionLink::new(
                            chrom.clone(),
                            *position,
                            *orientation,
                            LinkKind::Junction,
                        ));
                    }
                }
            }
        }
        result
    }

    /// The lowest discordant primary read of the group in the partition, with the location
    /// of its mate.
    fn discordant_fragment(
        &self,
        partition: &Partition,
        group: &ReadGroup,
    ) -> Option<(ClusterKey, DiscordantFragment)> {
        let (read, _) = group
            .reads()
            .iter()
            .filter(|(read, role)| {
                *role == ReadRole::CandidateSupport
                    && !read.is_supplementary()
                    && read.is_discordant(self.max_fragment_length)
                    && partition.contains(read.chromosome(), read.start())
            })
            .min_by_key(|(read, _)| read.start())?;

        let mate_chrom = read.mate_chromosome().as_ref()?;
        let mate_start = read.mate_start()?;
        let mate = group
            .reads()
            .iter()
            .map(|(r, _)| r)
            .find(|r| is_mate(read, r));
        let (remote_start, remote_end, remote_reverse) = match mate {
            Some(mate) => (mate.start(), mate.end(), mate.is_reverse()),
            None => (
                mate_start,
                mate_start + read.ref_length().max(1) - 1,
                read.is_mate_reverse(),
            ),
        };

        let key = (
            orientation(read.is_reverse()),
            mate_chrom.clone(),
            orientation(remote_reverse),
        );
        Some((
            key,
            DiscordantFragment {
                id: group.id().clone(),
                local_start: read.start(),
                local_end: read.end(),
                remote_start,
                remote_end,
            },
        ))
    }
}

fn is_mate(read: &ReadRecord, other: &ReadRecord) -> bool {
    !other.is_supplementary()
        && other.is_first_in_pair() != read.is_first_in_pair()
        && Some(other.chromosome()) == read.mate_chromosome().as_ref()
        && Some(other.start()) == read.mate_start()
}

/// A forward read points towards a break after its end, a reverse read to one before its start.
fn orientation(reverse: bool) -> Orientation {
    if reverse {
        Orientation::Negative
    } else {
        Orientation::Positive
    }
}

fn breakend<F>(cluster: &[DiscordantFragment], orientation: Orientation, side: F) -> u64
where
    F: Fn(&DiscordantFragment) -> (u64, u64),
{
    match orientation {
        Orientation::Positive => cluster.iter().map(|f| side(f).1).max().unwrap_or(0),
        Orientation::Negative => cluster.iter().map(|f| side(f).0).min().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::{flags, parse_cigar, ReadRecordBuilder};

    fn group(id: &str, start: u64, mate_start: u64) -> ReadGroup {
        let read = ReadRecordBuilder::default()
            .id(id)
            .chromosome("1")
            .start(start)
            .cigar(parse_cigar("100M").unwrap())
            .flags(flags::PAIRED | flags::FIRST_IN_PAIR | flags::MATE_REVERSE)
            .mate_chromosome(Some("1".to_owned()))
            .mate_start(Some(mate_start))
            .build()
            .unwrap();
        ReadGroup::new(read, ReadRole::CandidateSupport)
    }

    fn partition() -> Partition {
        Partition::new(0, "1".to_owned(), 1, 10_000)
    }

    fn candidates(n: usize) -> Vec<ReadGroup> {
        let positions = [(421, 5050), (428, 5100), (435, 5150), (441, 5200), (430, 5120)];
        positions[..n]
            .iter()
            .enumerate()
            .map(|(i, (start, mate))| group(&format!("frag{}", i), *start, *mate))
            .collect()
    }

    #[test]
    fn test_too_few_fragments() {
        let groups = DiscordantGroups::from_config(&PrepConfig::default());
        let result = groups.form_discordant_junctions(&partition(), &candidates(3), &[]);
        assert!(result.junctions.is_empty());
        assert!(result.links.is_empty());
    }

    #[test]
    fn test_cluster_forms_both_sides() {
        let groups = DiscordantGroups::from_config(&PrepConfig::default());
        let result = groups.form_discordant_junctions(&partition(), &candidates(4), &[]);
        let sides: Vec<_> = result
            .junctions
            .iter()
            .map(|j| (j.position(), j.orientation(), j.discordant(), j.supporting_fragment_count()))
            .collect();
        assert_eq!(
            sides,
            vec![
                (540, Orientation::Positive, true, 4),
                (5050, Orientation::Negative, true, 4)
            ]
        );
        assert_eq!(result.links["frag0"].len(), 2);
    }

    #[test]
    fn test_cluster_near_existing_junction() {
        let groups = DiscordantGroups::from_config(&PrepConfig::default());
        let existing = vec![JunctionData::new("1", 600, Orientation::Positive)];
        let result = groups.form_discordant_junctions(&partition(), &candidates(5), &existing);
        assert!(result.junctions.is_empty());
    }

    #[test]
    fn test_remote_side_outside_partition() {
        let groups = DiscordantGroups::from_config(&PrepConfig::default());
        let partition = Partition::new(0, "1".to_owned(), 1, 1000);
        let result = groups.form_discordant_junctions(&partition, &candidates(4), &[]);
        assert_eq!(result.junctions.len(), 1);
        assert_eq!(
            result.junctions[0].remote_junctions()[0],
            RemoteJunction::new("1".to_owned(), 5050, Orientation::Negative).with_fragment_count(4)
        );
    }
}
