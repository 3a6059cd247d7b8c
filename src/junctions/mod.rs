// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Breakpoint candidates and their aggregation within a partition.

use std::collections::BTreeSet;

use strum_macros::Display;

use crate::reads::ReadRecord;

pub mod discordant;
pub mod tracker;

pub use discordant::DiscordantGroups;
pub use tracker::JunctionTracker;

/// Side of the position on which the reference sequence stops.
///
/// `Positive`: the sequence breaks after the position (clipped on the right).
/// `Negative`: the sequence breaks before the position (clipped on the left).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
pub enum Orientation {
    #[strum(serialize = "+")]
    #[serde(rename = "+")]
    Positive,
    #[strum(serialize = "-")]
    #[serde(rename = "-")]
    Negative,
}

impl Orientation {
    pub fn opposite(self) -> Self {
        match self {
            Orientation::Positive => Orientation::Negative,
            Orientation::Negative => Orientation::Positive,
        }
    }
}

/// The other side of a breakpoint, located outside the current partition or chromosome.
#[derive(Debug, Clone, PartialEq, Eq, new, Getters, CopyGetters)]
pub struct RemoteJunction {
    #[getset(get = "pub")]
    chromosome: String,
    #[getset(get_copy = "pub")]
    position: u64,
    #[getset(get_copy = "pub")]
    orientation: Orientation,
    #[new(value = "1")]
    #[getset(get_copy = "pub")]
    fragment_count: usize,
}

impl RemoteJunction {
    pub fn with_fragment_count(mut self, fragment_count: usize) -> Self {
        self.fragment_count = fragment_count;
        self
    }
}

/// A candidate breakpoint with the fragments supporting it.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct JunctionData {
    #[getset(get = "pub")]
    chromosome: String,
    #[getset(get_copy = "pub")]
    position: u64,
    #[getset(get_copy = "pub")]
    orientation: Orientation,
    #[getset(get = "pub")]
    junction_fragments: BTreeSet<String>,
    #[getset(get = "pub")]
    exact_support_fragments: BTreeSet<String>,
    #[getset(get = "pub")]
    support_fragments: BTreeSet<String>,
    #[getset(get_copy = "pub")]
    junction_fragment_count: usize,
    #[getset(get_copy = "pub")]
    exact_support_fragment_count: usize,
    #[getset(get_copy = "pub")]
    supporting_fragment_count: usize,
    #[getset(get = "pub")]
    remote_junctions: Vec<RemoteJunction>,
    /// Junction read with the longest clip, used as the reference sequence for support.
    #[getset(get = "pub")]
    top_junction_read: Option<ReadRecord>,
    top_clip_length: u32,
    #[getset(get_copy = "pub")]
    hotspot: bool,
    #[getset(get_copy = "pub")]
    indel: bool,
    #[getset(get_copy = "pub")]
    discordant: bool,
}

impl JunctionData {
    pub fn new(chromosome: &str, position: u64, orientation: Orientation) -> Self {
        JunctionData {
            chromosome: chromosome.to_owned(),
            position,
            orientation,
            junction_fragments: BTreeSet::new(),
            exact_support_fragments: BTreeSet::new(),
            support_fragments: BTreeSet::new(),
            junction_fragment_count: 0,
            exact_support_fragment_count: 0,
            supporting_fragment_count: 0,
            remote_junctions: Vec::new(),
            top_junction_read: None,
            top_clip_length: 0,
            hotspot: false,
            indel: false,
            discordant: false,
        }
    }

    /// A junction formed from a cluster of discordant fragments.
    pub fn discordant(
        chromosome: &str,
        position: u64,
        orientation: Orientation,
        fragments: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut junction = JunctionData::new(chromosome, position, orientation);
        junction.discordant = true;
        junction.junction_fragments.extend(fragments);
        junction.finalize_counts();
        junction
    }

    pub fn add_junction_fragment(&mut self, read: &ReadRecord, clip_length: u32, indel: bool) {
        self.junction_fragments.insert(read.id().clone());
        self.indel |= indel;
        if self.top_junction_read.is_none() || clip_length > self.top_clip_length {
            self.top_junction_read = Some(read.clone());
            self.top_clip_length = clip_length;
        }
    }

    pub(crate) fn set_hotspot(&mut self) {
        self.hotspot = true;
    }

    pub(crate) fn add_exact_support(&mut self, id: &str) {
        self.exact_support_fragments.insert(id.to_owned());
    }

    pub(crate) fn add_support(&mut self, id: &str) {
        self.support_fragments.insert(id.to_owned());
    }

    pub(crate) fn add_remote_junction(&mut self, remote: RemoteJunction) {
        match self.remote_junctions.iter_mut().find(|r| {
            r.chromosome == remote.chromosome
                && r.position == remote.position
                && r.orientation == remote.orientation
        }) {
            Some(existing) => existing.fragment_count += remote.fragment_count,
            None => self.remote_junctions.push(remote),
        }
    }

    /// Make fragment categories exclusive and derive the cumulative counts.
    pub(crate) fn finalize_counts(&mut self) {
        let junction_fragments = &self.junction_fragments;
        self.exact_support_fragments
            .retain(|id| !junction_fragments.contains(id));
        let exact_fragments = &self.exact_support_fragments;
        self.support_fragments
            .retain(|id| !junction_fragments.contains(id) && !exact_fragments.contains(id));

        self.junction_fragment_count = self.junction_fragments.len();
        self.exact_support_fragment_count =
            self.junction_fragment_count + self.exact_support_fragments.len();
        self.supporting_fragment_count =
            self.exact_support_fragment_count + self.support_fragments.len();
    }

    pub fn distance_to(&self, position: u64) -> u64 {
        (self.position as i64 - position as i64).unsigned_abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cumulative_counts() {
        let mut junction = JunctionData::new("1", 100, Orientation::Positive);
        junction.junction_fragments.insert("a".to_owned());
        junction.add_exact_support("a");
        junction.add_exact_support("b");
        junction.add_support("b");
        junction.add_support("c");
        junction.add_support("d");
        junction.finalize_counts();

        assert_eq!(junction.junction_fragment_count(), 1);
        assert_eq!(junction.exact_support_fragment_count(), 2);
        assert_eq!(junction.supporting_fragment_count(), 4);
        assert!(!junction.exact_support_fragments().contains("a"));
        assert!(!junction.support_fragments().contains("b"));
    }

    #[test]
    fn test_remote_junctions_merge() {
        let mut junction = JunctionData::new("1", 100, Orientation::Positive);
        junction.add_remote_junction(RemoteJunction::new("2".to_owned(), 500, Orientation::Negative));
        junction.add_remote_junction(RemoteJunction::new("2".to_owned(), 500, Orientation::Negative));
        junction.add_remote_junction(RemoteJunction::new("2".to_owned(), 900, Orientation::Negative));
        assert_eq!(junction.remote_junctions().len(), 2);
        assert_eq!(junction.remote_junctions()[0].fragment_count(), 2);
    }

    #[test]
    fn test_orientation_order() {
        assert!(Orientation::Positive < Orientation::Negative);
        assert_eq!(Orientation::Positive.opposite(), Orientation::Negative);
        assert_eq!(Orientation::Negative.to_string(), "-");
    }
}
