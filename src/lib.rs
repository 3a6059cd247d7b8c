// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Extraction of structural variant breakpoint evidence from coordinate-sorted alignments.
//!
//! The genome is cut into fixed-size partitions that are scanned independently. Within a
//! partition, reads are classified, grouped by fragment and aggregated into junctions in
//! bounded windows. Fragments spanning several partitions are reconciled by the
//! [`spanning::SpanningReadCache`], which resolves each of them exactly once.

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate getset;
#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate derive_builder;

pub mod classify;
pub mod cli;
pub mod config;
pub mod errors;
pub mod junctions;
pub mod output;
pub mod partition;
pub mod prep;
pub mod rate;
pub mod reads;
pub mod spanning;
pub mod utils;

pub use crate::classify::ReadClassifier;
pub use crate::config::PrepConfig;
pub use crate::junctions::{JunctionData, Orientation};
pub use crate::partition::{Partition, PartitionProcessor, PartitionResult};
pub use crate::reads::{ReadGroup, ReadRecord, ReadRole};
pub use crate::spanning::SpanningReadCache;
