// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Conversion of BAM/CRAM records into [`ReadRecord`]s.

use anyhow::Result;
use rust_htslib::bam;
use rust_htslib::bam::record::Aux;

use crate::errors::Error;
use crate::reads::{ReadRecord, ReadRecordBuilder, SupplementaryAlignment};

/// Target names of a BAM header, indexed by target id.
pub fn target_names(header: &bam::HeaderView) -> Vec<String> {
    header
        .target_names()
        .iter()
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect()
}

fn target(targets: &[String], tid: i32) -> Option<&String> {
    if tid < 0 {
        None
    } else {
        targets.get(tid as usize)
    }
}

impl ReadRecord {
    /// Convert a BAM record. An SA tag that cannot be parsed marks the read as malformed
    /// instead of failing the conversion.
    pub fn from_bam(record: &bam::Record, targets: &[String]) -> Result<Self> {
        let id = String::from_utf8_lossy(record.qname()).into_owned();
        let chromosome = match target(targets, record.tid()) {
            Some(chromosome) => chromosome.clone(),
            None => {
                return Err(Error::UnknownTarget {
                    qname: id,
                    tid: record.tid(),
                }
                .into())
            }
        };

        let (supplementary_alignments, malformed) = match record.aux(b"SA") {
            Ok(Aux::String(value)) => match SupplementaryAlignment::parse_tag(value) {
                Ok(alignments) => (alignments, false),
                Err(e) => {
                    debug!("read {}: {}", id, e);
                    (Vec::new(), true)
                }
            },
            Ok(_) => (Vec::new(), true),
            Err(_) => (Vec::new(), false),
        };

        let quals = record.qual();
        // 0xff marks absent base qualities
        let quals = if quals.iter().all(|q| *q == 255) {
            Vec::new()
        } else {
            quals.to_vec()
        };

        let mate_chromosome = target(targets, record.mtid()).cloned();
        let mate_start = if record.mpos() >= 0 {
            Some(record.mpos() as u64 + 1)
        } else {
            None
        };

        let read = ReadRecordBuilder::default()
            .id(id)
            .chromosome(chromosome)
            .start(record.pos().max(0) as u64 + 1)
            .cigar(record.cigar().take())
            .flags(record.flags())
            .mapq(record.mapq())
            .mate_chromosome(mate_chromosome)
            .mate_start(mate_start)
            .insert_size(record.insert_size())
            .supplementary_alignments(supplementary_alignments)
            .bases(record.seq().as_bytes())
            .quals(quals)
            .malformed(malformed)
            .build()?;
        Ok(read)
    }
}
