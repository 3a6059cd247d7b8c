// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("invalid configuration: {msg}")]
    InvalidConfiguration { msg: String },
    #[error("invalid CIGAR string '{cigar}'")]
    InvalidCigar { cigar: String },
    #[error("invalid supplementary alignment entry '{value}': {msg}")]
    InvalidSupplementaryAlignment { value: String, msg: String },
    #[error("partition {current} of {chrom} published after partition {previous}: partitions have to be published in genomic order")]
    UnorderedPartition {
        chrom: String,
        previous: u64,
        current: u64,
    },
    #[error("junction tracker has already been finalized; no further reads or support can be assigned")]
    JunctionTrackerFinalized,
    #[error("invalid BED record in {path}: {msg}")]
    InvalidBedRecord { path: PathBuf, msg: String },
    #[error("read {qname} refers to unknown target id {tid}")]
    UnknownTarget { qname: String, tid: i32 },
}

pub(crate) fn invalid_configuration(msg: impl Into<String>) -> Error {
    Error::InvalidConfiguration { msg: msg.into() }
}
