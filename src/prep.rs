// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Parallel processing of all partitions of an indexed BAM/CRAM file.

use std::fs::File;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use crossbeam::channel::{Receiver, Sender};
use progress_logger::ProgressLogger;
use rust_htslib::bam;
use rust_htslib::bam::Read;

use crate::classify::ReadClassifier;
use crate::errors::Error;
use crate::output::{GroupWriter, JunctionWriter};
use crate::partition::{Partition, PartitionProcessor, PartitionResult, PartitionStats};
use crate::reads::bam::target_names;
use crate::reads::{ReadGroup, ReadRecord};
use crate::spanning::{CacheStats, SpanningReadCache};
use crate::utils::worker_pool::{worker_pool, Orderable};

type BoxedWriter = Box<dyn io::Write + Send>;

impl Orderable for PartitionResult {
    fn index(&self) -> usize {
        self.partition().index()
    }
}

/// Totals of a finished run.
#[derive(Debug, Clone, Copy, Default, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct PrepSummary {
    partitions: usize,
    stats: PartitionStats,
    cache: CacheStats,
}

#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct PrepRunner {
    #[builder(setter(into))]
    bam: PathBuf,
    classifier: ReadClassifier,
    #[builder(default = "1")]
    threads: usize,
    /// Junction table, STDOUT if omitted.
    #[builder(default)]
    junctions_output: Option<PathBuf>,
    #[builder(default)]
    groups_output: Option<PathBuf>,
}

impl PrepRunner {
    fn writer(path: Option<&PathBuf>) -> Result<BoxedWriter> {
        Ok(match path {
            Some(path) => Box::new(
                File::create(path)
                    .with_context(|| format!("unable to create {}", path.display()))?,
            ),
            None => Box::new(io::stdout()),
        })
    }

    fn partitions(&self) -> Result<(Vec<Partition>, Vec<String>)> {
        let reader = bam::IndexedReader::from_path(&self.bam)
            .with_context(|| format!("unable to read BAM/CRAM file {}", self.bam.display()))?;
        let header = reader.header();
        let targets = target_names(header);
        let lengths: Vec<u64> = (0..header.target_count())
            .map(|tid| header.target_len(tid).unwrap_or(0))
            .collect();
        let partitions = Partition::tile(
            targets
                .iter()
                .map(String::as_str)
                .zip(lengths.iter().copied()),
            self.classifier.config().partition_size,
        );
        Ok((partitions, targets))
    }

    pub fn run(&self) -> Result<PrepSummary> {
        let (partitions, targets) = self.partitions()?;
        let partition_count = partitions.len();
        info!(
            "processing {} partitions of {} using {} threads",
            partition_count,
            self.bam.display(),
            self.threads
        );

        let mut junction_writer =
            JunctionWriter::from_writer(PrepRunner::writer(self.junctions_output.as_ref())?);
        let mut group_writer = match self.groups_output.as_ref() {
            Some(path) => Some(GroupWriter::from_writer(PrepRunner::writer(Some(path))?)),
            None => None,
        };
        let mut write_groups = |groups: Vec<ReadGroup>| -> Result<usize> {
            let count = groups.len();
            if let Some(writer) = group_writer.as_mut() {
                for group in &groups {
                    writer.write(group)?;
                }
            }
            Ok(count)
        };

        let mut cache = SpanningReadCache::new(self.classifier.config().partition_size);
        let mut current_chrom: Option<String> = None;
        let mut summary = PrepSummary::default();
        let mut emitted = 0;
        let mut progress_logger = ProgressLogger::builder()
            .with_items_name("partitions")
            .with_frequency(std::time::Duration::from_secs(20))
            .start();

        let threads = self.threads.max(1);
        let runner = self;
        let targets = &targets;
        worker_pool(
            |sender: Sender<Partition>| -> Result<()> {
                for partition in partitions {
                    sender.send(partition)?;
                }
                Ok(())
            },
            (0..threads).map(move |_| {
                move |receiver: Receiver<Partition>, sender: Sender<PartitionResult>| -> Result<()> {
                    let mut reader = bam::IndexedReader::from_path(&runner.bam).with_context(|| {
                        format!("unable to read BAM/CRAM file {}", runner.bam.display())
                    })?;
                    for partition in receiver {
                        let result = runner.process_partition(&mut reader, targets, partition)?;
                        sender.send(result)?;
                    }
                    Ok(())
                }
            }),
            |result: PartitionResult| -> Result<()> {
                let (partition, junctions, groups, spanning, stats) = result.into_parts();
                if current_chrom.as_ref() != Some(partition.chromosome()) {
                    if let Some(previous) = current_chrom.take() {
                        emitted += write_groups(cache.finish_chromosome(&previous))?;
                    }
                    current_chrom = Some(partition.chromosome().clone());
                }
                for junction in &junctions {
                    junction_writer.write(junction)?;
                }
                emitted += write_groups(groups)?;
                emitted += write_groups(cache.publish(&partition, spanning)?)?;

                summary.partitions += 1;
                summary.stats += stats;
                progress_logger.update(1u64);
                Ok(())
            },
            threads * 2,
            threads * 2,
        )?;

        if let Some(chrom) = current_chrom.take() {
            emitted += write_groups(cache.finish_chromosome(&chrom))?;
        }
        emitted += write_groups(cache.flush())?;
        junction_writer.flush()?;
        if let Some(writer) = group_writer.as_mut() {
            writer.flush()?;
        }
        progress_logger.stop();

        summary.cache = cache.stats();
        info!(
            "found {} junctions supported by {} fragments in {} reads ({} blacklisted, {} malformed, {} rate limited)",
            summary.stats.junctions,
            emitted,
            summary.stats.reads,
            summary.stats.blacklisted,
            summary.stats.malformed,
            summary.stats.rate_limited
        );
        if summary.cache.missed_reads > 0 {
            info!(
                "{} expected reads were never seen; their fragments were resolved without them",
                summary.cache.missed_reads
            );
        }
        Ok(summary)
    }

    fn process_partition(
        &self,
        reader: &mut bam::IndexedReader,
        targets: &[String],
        partition: Partition,
    ) -> Result<PartitionResult> {
        let tid = reader
            .header()
            .tid(partition.chromosome().as_bytes())
            .with_context(|| format!("unknown chromosome {}", partition.chromosome()))?;
        reader.fetch((
            tid as i32,
            partition.start() as i64 - 1,
            partition.end() as i64,
        ))?;

        let mut processor = PartitionProcessor::new(&self.classifier, partition);
        let mut record = bam::Record::new();
        while let Some(res) = reader.read(&mut record) {
            res?;
            if record.tid() < 0 {
                continue;
            }
            match ReadRecord::from_bam(&record, targets) {
                Ok(read) => processor.process_read(read)?,
                Err(e) => match e.downcast_ref::<Error>() {
                    Some(Error::UnknownTarget { .. }) => {
                        debug!("skipping record: {}", e);
                        processor.skip_malformed();
                    }
                    _ => return Err(e),
                },
            }
        }
        processor.finish()
    }
}
