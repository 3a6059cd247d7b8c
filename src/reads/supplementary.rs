// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use anyhow::Result;
use rust_htslib::bam::record::CigarString;

use crate::errors::Error;
use crate::junctions::Orientation;
use crate::reads::{left_clip, parse_cigar, ref_length, right_clip};

/// One entry of the SA auxiliary tag: another alignment of the same read.
#[derive(Clone, Debug, PartialEq, Getters, CopyGetters)]
pub struct SupplementaryAlignment {
    #[getset(get = "pub")]
    chromosome: String,
    /// 1-based start.
    #[getset(get_copy = "pub")]
    position: u64,
    #[getset(get_copy = "pub")]
    reverse: bool,
    #[getset(get = "pub")]
    cigar: CigarString,
    #[getset(get_copy = "pub")]
    mapq: u8,
    #[getset(get_copy = "pub")]
    mismatches: u32,
}

impl SupplementaryAlignment {
    /// Parse an SA tag value of the form `chrom,pos,strand,CIGAR,mapq,NM;` (repeated).
    pub fn parse_tag(value: &str) -> Result<Vec<Self>> {
        value
            .split(';')
            .filter(|entry| !entry.trim().is_empty())
            .map(SupplementaryAlignment::parse_entry)
            .collect()
    }

    fn parse_entry(entry: &str) -> Result<Self> {
        let invalid = |msg: &str| Error::InvalidSupplementaryAlignment {
            value: entry.to_owned(),
            msg: msg.to_owned(),
        };

        let fields: Vec<&str> = entry.trim().split(',').collect();
        if fields.len() != 6 {
            return Err(invalid("expected 6 comma separated fields").into());
        }
        if fields[0].is_empty() {
            return Err(invalid("empty chromosome").into());
        }
        let position: u64 = fields[1]
            .parse()
            .map_err(|_| invalid("position is not a positive integer"))?;
        if position == 0 {
            return Err(invalid("position is not a positive integer").into());
        }
        let reverse = match fields[2] {
            "+" => false,
            "-" => true,
            _ => return Err(invalid("strand has to be '+' or '-'").into()),
        };
        let cigar = parse_cigar(fields[3]).map_err(|_| invalid("invalid CIGAR string"))?;
        if ref_length(&cigar) == 0 {
            return Err(invalid("alignment does not cover any reference base").into());
        }
        let mapq = fields[4]
            .parse()
            .map_err(|_| invalid("invalid mapping quality"))?;
        let mismatches = fields[5]
            .parse()
            .map_err(|_| invalid("invalid edit distance"))?;

        Ok(SupplementaryAlignment {
            chromosome: fields[0].to_owned(),
            position,
            reverse,
            cigar,
            mapq,
            mismatches,
        })
    }

    /// Last aligned reference position.
    pub fn end(&self) -> u64 {
        self.position + ref_length(&self.cigar) - 1
    }

    /// The breakend implied by this alignment: a clip at its start means the sequence
    /// continues to the left elsewhere.
    pub fn breakend(&self) -> (u64, Orientation) {
        if left_clip(&self.cigar) > right_clip(&self.cigar) {
            (self.position, Orientation::Negative)
        } else {
            (self.end(), Orientation::Positive)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        let alignments =
            SupplementaryAlignment::parse_tag("2,5000,-,40S60M,50,1;X,100,+,70M30H,3,0;").unwrap();
        assert_eq!(alignments.len(), 2);
        assert_eq!(alignments[0].chromosome(), "2");
        assert_eq!(alignments[0].position(), 5000);
        assert!(alignments[0].reverse());
        assert_eq!(alignments[0].mapq(), 50);
        assert_eq!(alignments[0].end(), 5059);
        assert_eq!(alignments[0].breakend(), (5000, Orientation::Negative));
        assert_eq!(alignments[1].breakend(), (169, Orientation::Positive));
    }

    #[test]
    fn test_parse_tag_invalid() {
        for value in &[
            "2,5000,-,40S60M,50",
            "2,abc,-,40S60M,50,1",
            "2,0,-,40S60M,50,1",
            "2,5000,*,40S60M,50,1",
            "2,5000,-,40Q,50,1",
            "2,5000,-,40S60M,500,1",
        ] {
            let err = SupplementaryAlignment::parse_tag(value).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<Error>(),
                Some(Error::InvalidSupplementaryAlignment { .. })
            ));
        }
    }

    #[test]
    fn test_empty_tag() {
        assert!(SupplementaryAlignment::parse_tag("").unwrap().is_empty());
    }
}
