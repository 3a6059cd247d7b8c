use std::io::Write;

use tempfile::NamedTempFile;

use svprep::reads::{flags, parse_cigar, ReadRecordBuilder, SupplementaryAlignment};
use svprep::{Partition, PartitionProcessor, PartitionResult, ReadClassifier, ReadRecord};

pub(crate) const SEQ: &[u8] = b"ACGTTGCATGCAGTCCATGAGCTTAGCGGATCCAGTACGATCGTTAGCATCGACTGAGCTACCGATAGGCTAGCATCAGTCAGATCGAGTAGCTAGGCTAGCTAAC";

/// Unpaired read with full base qualities.
pub(crate) fn read(id: &str, chrom: &str, start: u64, cigar: &str, bases: &[u8]) -> ReadRecord {
    ReadRecordBuilder::default()
        .id(id)
        .chromosome(chrom)
        .start(start)
        .cigar(parse_cigar(cigar).unwrap())
        .bases(bases.to_vec())
        .quals(vec![37; bases.len()])
        .build()
        .unwrap()
}

/// Read of a pair without sequence. Forward reads carry a reverse mate and vice versa.
pub(crate) fn paired_read(
    id: &str,
    chrom: &str,
    start: u64,
    mate_chrom: &str,
    mate_start: u64,
    first: bool,
    reverse: bool,
) -> ReadRecord {
    let mut read_flags = flags::PAIRED;
    read_flags |= if first {
        flags::FIRST_IN_PAIR
    } else {
        flags::SECOND_IN_PAIR
    };
    read_flags |= if reverse {
        flags::REVERSE
    } else {
        flags::MATE_REVERSE
    };
    ReadRecordBuilder::default()
        .id(id)
        .chromosome(chrom)
        .start(start)
        .cigar(parse_cigar("100M").unwrap())
        .flags(read_flags)
        .mate_chromosome(Some(mate_chrom.to_owned()))
        .mate_start(Some(mate_start))
        .build()
        .unwrap()
}

/// Read with sequence and explicit flags whose mate lies on chromosome 1.
pub(crate) fn mated_read(
    id: &str,
    start: u64,
    cigar: &str,
    read_flags: u16,
    mate_start: u64,
    sa: &str,
) -> ReadRecord {
    ReadRecordBuilder::default()
        .id(id)
        .chromosome("1")
        .start(start)
        .cigar(parse_cigar(cigar).unwrap())
        .flags(flags::PAIRED | read_flags)
        .mate_chromosome(Some("1".to_owned()))
        .mate_start(Some(mate_start))
        .supplementary_alignments(SupplementaryAlignment::parse_tag(sa).unwrap())
        .bases(SEQ[..100].to_vec())
        .quals(vec![37; 100])
        .build()
        .unwrap()
}

/// Discordant pairs on chromosome 1 whose first reads end near 540 and whose mates start
/// near 5050.
pub(crate) fn discordant_pairs(n: usize) -> Vec<ReadRecord> {
    let positions = [(421, 5050), (428, 5100), (435, 5150), (441, 5200)];
    let mut reads: Vec<ReadRecord> = positions[..n]
        .iter()
        .enumerate()
        .flat_map(|(i, (start, mate))| {
            let id = format!("frag{}", i);
            vec![
                paired_read(&id, "1", *start, "1", *mate, true, false),
                paired_read(&id, "1", *mate, "1", *start, false, true),
            ]
        })
        .collect();
    reads.sort_by_key(|read| read.start());
    reads
}

pub(crate) fn process(
    classifier: &ReadClassifier,
    partition: Partition,
    reads: Vec<ReadRecord>,
) -> PartitionResult {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut processor = PartitionProcessor::new(classifier, partition);
    for read in reads {
        processor.process_read(read).unwrap();
    }
    processor.finish().unwrap()
}

pub(crate) fn bed_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file
}
