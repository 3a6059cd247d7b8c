// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Stateless read predicates: junction detection, low-information clip rejection and
//! sequence support.

use rust_htslib::bam::record::Cigar;

use crate::config::PrepConfig;
use crate::junctions::{JunctionData, Orientation};
use crate::reads::{ReadRecord, ReadRole};
use crate::utils::repeats::{is_tandem_repeat, longest_run, MAX_REPEAT_UNIT_LEN};
use crate::utils::RegionSet;

/// Bases inspected on each side of a soft clip break when testing for repeats.
const REPEAT_BREAK_WINDOW: usize = 10;

/// A breakpoint implied by a single read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct JunctionSite {
    position: u64,
    orientation: Orientation,
    /// Length of the soft clip or indel that produced the site.
    length: u32,
    indel: bool,
}

#[derive(new, Getters)]
pub struct ReadClassifier {
    #[getset(get = "pub")]
    config: PrepConfig,
    #[getset(get = "pub")]
    blacklist: RegionSet,
    #[getset(get = "pub")]
    hotspots: RegionSet,
}

impl ReadClassifier {
    /// Classifier without blacklist or hotspot regions.
    pub fn with_config(config: PrepConfig) -> Self {
        ReadClassifier::new(config, RegionSet::new(), RegionSet::new())
    }

    /// Whether the CIGAR string alone qualifies the read for junction detection.
    pub fn is_junction_candidate(&self, read: &ReadRecord) -> bool {
        read.left_soft_clip() >= self.config.min_soft_clip_length
            || read.right_soft_clip() >= self.config.min_soft_clip_length
            || read.cigar().iter().any(|op| match op {
                Cigar::Del(l) | Cigar::Ins(l) => *l >= self.config.min_indel_length,
                _ => false,
            })
    }

    /// Breakpoints implied by the CIGAR string. Soft clips yield one site each, internal
    /// indels one site per flank.
    pub fn candidate_sites(&self, read: &ReadRecord) -> Vec<JunctionSite> {
        let mut sites = Vec::new();
        let left_clip = read.left_soft_clip();
        if left_clip >= self.config.min_soft_clip_length {
            sites.push(JunctionSite::new(
                read.start(),
                Orientation::Negative,
                left_clip,
                false,
            ));
        }

        let mut ref_pos = read.start();
        for op in read.cigar().iter() {
            match *op {
                Cigar::Match(l) | Cigar::Equal(l) | Cigar::Diff(l) | Cigar::RefSkip(l) => {
                    ref_pos += l as u64
                }
                Cigar::Del(l) => {
                    if l >= self.config.min_indel_length && ref_pos > read.start() {
                        sites.push(JunctionSite::new(ref_pos - 1, Orientation::Positive, l, true));
                        sites.push(JunctionSite::new(
                            ref_pos + l as u64,
                            Orientation::Negative,
                            l,
                            true,
                        ));
                    }
                    ref_pos += l as u64;
                }
                Cigar::Ins(l) => {
                    if l >= self.config.min_indel_length && ref_pos > read.start() {
                        sites.push(JunctionSite::new(ref_pos - 1, Orientation::Positive, l, true));
                        sites.push(JunctionSite::new(ref_pos, Orientation::Negative, l, true));
                    }
                }
                _ => (),
            }
        }

        let right_clip = read.right_soft_clip();
        if right_clip >= self.config.min_soft_clip_length {
            sites.push(JunctionSite::new(
                read.end(),
                Orientation::Positive,
                right_clip,
                false,
            ));
        }
        sites
    }

    /// Candidate sites that survive the quality and low-information filters.
    pub fn junction_sites(&self, read: &ReadRecord) -> Vec<JunctionSite> {
        let in_hotspot = self.in_hotspot(read);
        self.candidate_sites(read)
            .into_iter()
            .filter(|site| {
                site.indel
                    || (self.has_high_quality_soft_clip(read, site.orientation)
                        && (in_hotspot
                            || !(self.has_poly_at_soft_clip(read, site.orientation)
                                || self.is_repetitive_section_break(read, site.orientation))))
            })
            .collect()
    }

    pub fn in_hotspot(&self, read: &ReadRecord) -> bool {
        self.hotspots
            .overlaps(read.chromosome(), read.start(), read.end())
    }

    /// Reads starting in a blacklisted region are ignored unless a hotspot rescues them.
    pub fn is_blacklisted(&self, read: &ReadRecord) -> bool {
        self.blacklist
            .contains_position(read.chromosome(), read.start())
            && !self.in_hotspot(read)
    }

    fn soft_clip_range(read: &ReadRecord, orientation: Orientation) -> (usize, usize) {
        let len = read.bases().len();
        match orientation {
            Orientation::Negative => (0, (read.left_soft_clip() as usize).min(len)),
            Orientation::Positive => (
                len.saturating_sub(read.right_soft_clip() as usize),
                len,
            ),
        }
    }

    pub fn has_high_quality_soft_clip(&self, read: &ReadRecord, orientation: Orientation) -> bool {
        let (start, end) = ReadClassifier::soft_clip_range(read, orientation);
        if read.quals().len() < end || start == end {
            // without qualities there is nothing to reject on
            return read.quals().is_empty();
        }
        let clip = &read.quals()[start..end];
        let high_qual = clip
            .iter()
            .filter(|q| **q >= self.config.low_base_qual)
            .count();
        high_qual * 100 >= clip.len() * self.config.min_soft_clip_high_qual_perc as usize
    }

    /// A poly-A or poly-T stretch in the clip points to a retrotransposed sequence tail
    /// rather than a breakpoint.
    pub fn has_poly_at_soft_clip(&self, read: &ReadRecord, orientation: Orientation) -> bool {
        let (start, end) = ReadClassifier::soft_clip_range(read, orientation);
        let clip = &read.bases()[start..end];
        longest_run(clip, b'A') >= self.config.min_poly_at_length
            || longest_run(clip, b'T') >= self.config.min_poly_at_length
    }

    /// Whether the bases on both sides of the clip break form a homopolymer or a short
    /// tandem repeat, making the break position unreliable.
    pub fn is_repetitive_section_break(&self, read: &ReadRecord, orientation: Orientation) -> bool {
        let bases = read.bases();
        let break_index = match orientation {
            Orientation::Negative => read.left_soft_clip() as usize,
            Orientation::Positive => bases.len().saturating_sub(read.right_soft_clip() as usize),
        };
        if break_index == 0 || break_index >= bases.len() {
            return false;
        }
        let start = break_index.saturating_sub(REPEAT_BREAK_WINDOW);
        let end = (break_index + REPEAT_BREAK_WINDOW).min(bases.len());
        let window = &bases[start..end];
        window.len() >= 2 * MAX_REPEAT_UNIT_LEN && is_tandem_repeat(window, MAX_REPEAT_UNIT_LEN)
    }

    pub fn classify(&self, read: &ReadRecord) -> ReadRole {
        if read.is_malformed() || read.is_unmapped() || read.is_secondary() || read.is_duplicate()
        {
            return ReadRole::NoSupport;
        }
        if read.mapq() >= self.config.min_map_qual
            && self.is_junction_candidate(read)
            && !self.junction_sites(read).is_empty()
        {
            return ReadRole::Junction;
        }
        let has_indel = read
            .cigar()
            .iter()
            .any(|op| matches!(op, Cigar::Del(_) | Cigar::Ins(_)));
        if read.is_discordant(self.config.max_fragment_length)
            || !read.supplementary_alignments().is_empty()
            || read.left_soft_clip() > 0
            || read.right_soft_clip() > 0
            || has_indel
        {
            ReadRole::CandidateSupport
        } else {
            ReadRole::NoSupport
        }
    }

    /// Number of bases confirming the junction sequence, or None if the read does not
    /// support the junction. Both reads are projected onto the genome with their soft clips.
    pub fn junction_match(
        &self,
        read: &ReadRecord,
        junction: &JunctionData,
        tolerance: u64,
    ) -> Option<usize> {
        let top = junction.top_junction_read().as_ref()?;
        if read.chromosome() != junction.chromosome() || read.bases().is_empty() {
            return None;
        }
        let position = junction.position();
        read.read_index_at(position)?;

        match junction.orientation() {
            Orientation::Positive => {
                if read.unclipped_end() <= position as i64 {
                    return None;
                }
                if read.right_soft_clip() > 0 && junction.distance_to(read.end()) > tolerance {
                    return None;
                }
            }
            Orientation::Negative => {
                if read.unclipped_start() >= position as i64 {
                    return None;
                }
                if read.left_soft_clip() > 0 && junction.distance_to(read.start()) > tolerance {
                    return None;
                }
            }
        }

        let overlap_start = read.unclipped_start().max(top.unclipped_start()).max(1) as u64;
        let overlap_end = read.unclipped_end().min(top.unclipped_end());
        if overlap_end < overlap_start as i64 {
            return None;
        }

        let mut matches = 0;
        for pos in overlap_start..=overlap_end as u64 {
            if let (Some(i), Some(j)) = (read.read_index_at(pos), top.read_index_at(pos)) {
                let (base, top_base) = (read.bases()[i], top.bases()[j]);
                if base.eq_ignore_ascii_case(&top_base) {
                    matches += 1;
                } else if !self.is_low_quality(read, i) && !self.is_low_quality(top, j) {
                    return None;
                }
            }
        }
        Some(matches)
    }

    pub fn supports_junction(&self, read: &ReadRecord, junction: &JunctionData, tolerance: u64) -> bool {
        self.junction_match(read, junction, tolerance).is_some()
    }

    /// Support by position and orientation only: the read faces the junction from the
    /// retained side and lies within a fragment length of it.
    pub fn supports_junction_distant(&self, read: &ReadRecord, junction: &JunctionData) -> bool {
        if read.chromosome() != junction.chromosome() {
            return false;
        }
        let position = junction.position();
        let max_fragment_length = self.config.max_fragment_length;
        match junction.orientation() {
            Orientation::Positive => {
                !read.is_reverse()
                    && read.end() <= position
                    && read.start() + max_fragment_length >= position
            }
            Orientation::Negative => {
                read.is_reverse()
                    && read.start() >= position
                    && read.end() <= position + max_fragment_length
            }
        }
    }

    fn is_low_quality(&self, read: &ReadRecord, index: usize) -> bool {
        read.quals()
            .get(index)
            .map_or(true, |q| *q < self.config.low_base_qual)
    }
}
