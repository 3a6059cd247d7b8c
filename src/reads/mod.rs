// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Normalized read records, decoupled from the container format they were read from.

use std::convert::TryFrom;

use anyhow::Result;
use rust_htslib::bam::record::{Cigar, CigarString};
use strum_macros::Display;

use crate::errors::Error;

pub mod bam;
pub mod group;
pub mod supplementary;

pub use group::{ExpectedRead, JunctionLink, LinkKind, ReadGroup};
pub use supplementary::SupplementaryAlignment;

/// SAM flag bits used by the classification and grouping logic.
pub mod flags {
    pub const PAIRED: u16 = 0x1;
    pub const UNMAPPED: u16 = 0x4;
    pub const MATE_UNMAPPED: u16 = 0x8;
    pub const REVERSE: u16 = 0x10;
    pub const MATE_REVERSE: u16 = 0x20;
    pub const FIRST_IN_PAIR: u16 = 0x40;
    pub const SECOND_IN_PAIR: u16 = 0x80;
    pub const SECONDARY: u16 = 0x100;
    pub const DUPLICATE: u16 = 0x400;
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// Evidence category of a read. Assigned once at classification; a later promotion of
/// candidate support produces a new [`ReadGroup`] instead of mutating the read.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
pub enum ReadRole {
    #[strum(serialize = "NO_SUPPORT")]
    NoSupport,
    #[strum(serialize = "CANDIDATE_SUPPORT")]
    CandidateSupport,
    #[strum(serialize = "SUPPORT")]
    Support,
    #[strum(serialize = "JUNCTION")]
    Junction,
}

pub fn parse_cigar(cigar: &str) -> Result<CigarString> {
    CigarString::try_from(cigar).map_err(|_| {
        Error::InvalidCigar {
            cigar: cigar.to_owned(),
        }
        .into()
    })
}

/// One aligned read. Positions are 1-based and inclusive.
#[derive(Builder, Clone, Debug, Getters, CopyGetters)]
#[builder(pattern = "owned")]
pub struct ReadRecord {
    /// Fragment identifier (query name), shared by all reads of a fragment.
    #[builder(setter(into))]
    #[getset(get = "pub")]
    id: String,
    #[builder(setter(into))]
    #[getset(get = "pub")]
    chromosome: String,
    #[getset(get_copy = "pub")]
    start: u64,
    #[getset(get = "pub")]
    cigar: CigarString,
    #[builder(default)]
    #[getset(get_copy = "pub")]
    flags: u16,
    #[builder(default = "60")]
    #[getset(get_copy = "pub")]
    mapq: u8,
    #[builder(default = "None")]
    #[getset(get = "pub")]
    mate_chromosome: Option<String>,
    #[builder(default = "None")]
    #[getset(get_copy = "pub")]
    mate_start: Option<u64>,
    #[builder(default)]
    #[getset(get_copy = "pub")]
    insert_size: i64,
    #[builder(default = "Vec::new()")]
    #[getset(get = "pub")]
    supplementary_alignments: Vec<SupplementaryAlignment>,
    #[builder(default = "Vec::new()")]
    #[getset(get = "pub")]
    bases: Vec<u8>,
    #[builder(default = "Vec::new()")]
    #[getset(get = "pub")]
    quals: Vec<u8>,
    /// Set when an auxiliary field could not be interpreted.
    #[builder(default)]
    #[getset(get_copy = "pub")]
    malformed: bool,
}

impl ReadRecord {
    fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    pub fn is_reverse(&self) -> bool {
        self.has_flag(flags::REVERSE)
    }

    pub fn is_paired(&self) -> bool {
        self.has_flag(flags::PAIRED)
    }

    pub fn is_first_in_pair(&self) -> bool {
        self.has_flag(flags::FIRST_IN_PAIR)
    }

    pub fn is_supplementary(&self) -> bool {
        self.has_flag(flags::SUPPLEMENTARY)
    }

    pub fn is_secondary(&self) -> bool {
        self.has_flag(flags::SECONDARY)
    }

    pub fn is_duplicate(&self) -> bool {
        self.has_flag(flags::DUPLICATE)
    }

    pub fn is_unmapped(&self) -> bool {
        self.has_flag(flags::UNMAPPED)
    }

    pub fn is_mate_unmapped(&self) -> bool {
        self.has_flag(flags::MATE_UNMAPPED)
    }

    pub fn is_mate_reverse(&self) -> bool {
        self.has_flag(flags::MATE_REVERSE)
    }

    /// Paired read whose mate is aligned somewhere.
    pub fn has_mapped_mate(&self) -> bool {
        self.is_paired() && !self.is_mate_unmapped()
    }

    /// Number of reference bases covered by the alignment.
    pub fn ref_length(&self) -> u64 {
        ref_length(&self.cigar)
    }

    /// Last aligned reference position.
    pub fn end(&self) -> u64 {
        self.start + self.ref_length().max(1) - 1
    }

    pub fn left_soft_clip(&self) -> u32 {
        left_soft_clip(&self.cigar)
    }

    pub fn right_soft_clip(&self) -> u32 {
        right_soft_clip(&self.cigar)
    }

    /// Start including the left soft clip, as if the clipped bases were aligned.
    pub fn unclipped_start(&self) -> i64 {
        self.start as i64 - self.left_soft_clip() as i64
    }

    pub fn unclipped_end(&self) -> i64 {
        self.end() as i64 + self.right_soft_clip() as i64
    }

    /// Number of read bases described by the CIGAR string.
    pub fn cigar_read_length(&self) -> usize {
        self.cigar
            .iter()
            .map(|op| match op {
                Cigar::Match(l)
                | Cigar::Ins(l)
                | Cigar::SoftClip(l)
                | Cigar::Equal(l)
                | Cigar::Diff(l) => *l as usize,
                _ => 0,
            })
            .sum()
    }

    /// Index of the base projected onto reference position `pos`, treating soft clipped
    /// bases as aligned. None if `pos` falls into a deletion or outside the read.
    pub fn read_index_at(&self, pos: u64) -> Option<usize> {
        let pos = pos as i64;
        let mut ref_pos = self.unclipped_start();
        let mut read_index = 0;
        for op in self.cigar.iter() {
            match *op {
                Cigar::SoftClip(l) | Cigar::Match(l) | Cigar::Equal(l) | Cigar::Diff(l) => {
                    let l = l as i64;
                    if pos >= ref_pos && pos < ref_pos + l {
                        return Some(read_index + (pos - ref_pos) as usize);
                    }
                    ref_pos += l;
                    read_index += l as usize;
                }
                Cigar::Del(l) | Cigar::RefSkip(l) => {
                    let l = l as i64;
                    if pos >= ref_pos && pos < ref_pos + l {
                        return None;
                    }
                    ref_pos += l;
                }
                Cigar::Ins(l) => read_index += l as usize,
                Cigar::HardClip(_) | Cigar::Pad(_) => (),
            }
        }
        None
    }

    /// Whether the mate sits at an unexpected place: another chromosome, further away than
    /// a fragment can span, or on the same strand.
    pub fn is_discordant(&self, max_fragment_length: u64) -> bool {
        if !self.has_mapped_mate() {
            return false;
        }
        match (self.mate_chromosome.as_ref(), self.mate_start) {
            (Some(mate_chrom), Some(mate_start)) => {
                mate_chrom != &self.chromosome
                    || (mate_start as i64 - self.start as i64).unsigned_abs() > max_fragment_length
                    || self.is_reverse() == self.is_mate_reverse()
            }
            _ => false,
        }
    }

    /// Inconsistent records are never fatal, they simply do not contribute evidence.
    pub fn is_malformed(&self) -> bool {
        if self.malformed || self.cigar.is_empty() || self.ref_length() == 0 {
            return true;
        }
        if !self.bases.is_empty() && self.cigar_read_length() != self.bases.len() {
            return true;
        }
        if !self.quals.is_empty() && self.quals.len() != self.bases.len() {
            return true;
        }
        self.has_mapped_mate() && (self.mate_chromosome.is_none() || self.mate_start.is_none())
    }
}

pub(crate) fn ref_length(cigar: &CigarString) -> u64 {
    cigar
        .iter()
        .map(|op| match op {
            Cigar::Match(l) | Cigar::Del(l) | Cigar::RefSkip(l) | Cigar::Equal(l) | Cigar::Diff(l) => {
                *l as u64
            }
            _ => 0,
        })
        .sum()
}

pub(crate) fn left_soft_clip(cigar: &CigarString) -> u32 {
    cigar
        .iter()
        .find(|op| !matches!(op, Cigar::HardClip(_)))
        .map_or(0, |op| match op {
            Cigar::SoftClip(l) => *l,
            _ => 0,
        })
}

pub(crate) fn right_soft_clip(cigar: &CigarString) -> u32 {
    cigar
        .iter()
        .rev()
        .find(|op| !matches!(op, Cigar::HardClip(_)))
        .map_or(0, |op| match op {
            Cigar::SoftClip(l) => *l,
            _ => 0,
        })
}

/// Clipped bases at the start of the alignment, soft or hard.
pub(crate) fn left_clip(cigar: &CigarString) -> u32 {
    cigar
        .iter()
        .take_while(|op| matches!(op, Cigar::SoftClip(_) | Cigar::HardClip(_)))
        .map(|op| op.len())
        .sum()
}

pub(crate) fn right_clip(cigar: &CigarString) -> u32 {
    cigar
        .iter()
        .rev()
        .take_while(|op| matches!(op, Cigar::SoftClip(_) | Cigar::HardClip(_)))
        .map(|op| op.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(start: u64, cigar: &str) -> ReadRecord {
        let cigar = parse_cigar(cigar).unwrap();
        let len = cigar
            .iter()
            .map(|op| match op {
                Cigar::Match(l) | Cigar::Ins(l) | Cigar::SoftClip(l) => *l as usize,
                _ => 0,
            })
            .sum();
        ReadRecordBuilder::default()
            .id("frag")
            .chromosome("1")
            .start(start)
            .cigar(cigar)
            .bases(vec![b'A'; len])
            .quals(vec![37; len])
            .build()
            .unwrap()
    }

    #[test]
    fn test_coordinates() {
        let read = read(100, "10S50M5D20M15S");
        assert_eq!(read.ref_length(), 75);
        assert_eq!(read.end(), 174);
        assert_eq!(read.left_soft_clip(), 10);
        assert_eq!(read.right_soft_clip(), 15);
        assert_eq!(read.unclipped_start(), 90);
        assert_eq!(read.unclipped_end(), 189);
        assert_eq!(read.cigar_read_length(), 95);
    }

    #[test]
    fn test_read_index_at() {
        let read = read(100, "10S50M5D20M10I5M");
        assert_eq!(read.read_index_at(90), Some(0));
        assert_eq!(read.read_index_at(100), Some(10));
        assert_eq!(read.read_index_at(149), Some(59));
        assert_eq!(read.read_index_at(150), None);
        assert_eq!(read.read_index_at(155), Some(60));
        assert_eq!(read.read_index_at(175), Some(90));
        assert_eq!(read.read_index_at(89), None);
        assert_eq!(read.read_index_at(180), None);
    }

    #[test]
    fn test_clips_with_hardclip() {
        let cigar = parse_cigar("5H10S50M3S7H").unwrap();
        assert_eq!(left_soft_clip(&cigar), 10);
        assert_eq!(right_soft_clip(&cigar), 3);
        assert_eq!(left_clip(&cigar), 15);
        assert_eq!(right_clip(&cigar), 10);
    }

    #[test]
    fn test_malformed() {
        let good = read(100, "50M");
        assert!(!good.is_malformed());

        let mut truncated = good.clone();
        truncated.bases.pop();
        truncated.quals.pop();
        assert!(truncated.is_malformed());

        let mut no_mate = good;
        no_mate.flags = flags::PAIRED;
        assert!(no_mate.is_malformed());
    }

    #[test]
    fn test_invalid_cigar() {
        assert!(parse_cigar("10Q").is_err());
    }

    #[test]
    fn test_discordant() {
        let mut read = read(100, "50M");
        read.flags = flags::PAIRED | flags::MATE_REVERSE;
        read.mate_chromosome = Some("1".to_owned());
        read.mate_start = Some(400);
        assert!(!read.is_discordant(1000));
        read.mate_start = Some(5000);
        assert!(read.is_discordant(1000));
        read.mate_start = Some(400);
        read.mate_chromosome = Some("2".to_owned());
        assert!(read.is_discordant(1000));
        read.mate_chromosome = Some("1".to_owned());
        read.flags = flags::PAIRED;
        assert!(read.is_discordant(1000));
    }
}
