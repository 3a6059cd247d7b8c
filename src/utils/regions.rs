// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use bio::data_structures::interval_tree::ArrayBackedIntervalTree;

use crate::errors::Error;

/// Per-chromosome set of 1-based, inclusive regions (blacklists, hotspots).
#[derive(Default)]
pub struct RegionSet {
    trees: HashMap<String, ArrayBackedIntervalTree<u64, ()>>,
}

impl RegionSet {
    pub fn new() -> Self {
        RegionSet::default()
    }

    /// Build a set from 1-based, inclusive regions `(chrom, start, end)`. Each chromosome's
    /// tree is indexed once, after all of its regions are inserted.
    pub fn from_regions<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = (S, u64, u64)>,
        S: AsRef<str>,
    {
        let mut trees: HashMap<String, ArrayBackedIntervalTree<u64, ()>> = HashMap::new();
        for (chrom, start, end) in regions {
            trees
                .entry(chrom.as_ref().to_owned())
                .or_insert_with(ArrayBackedIntervalTree::new)
                .insert(start..end + 1, ());
        }
        for tree in trees.values_mut() {
            tree.index();
        }
        RegionSet { trees }
    }

    /// Load regions from a BED file (0-based, half-open).
    pub fn from_bed<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .from_path(path.as_ref())?;

        let invalid = |msg: String| Error::InvalidBedRecord {
            path: path.as_ref().to_owned(),
            msg,
        };

        let mut regions = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.len() < 3 {
                return Err(invalid(format!("expected at least 3 columns, found {}", record.len())).into());
            }
            let start: u64 = record[1]
                .parse()
                .map_err(|_| invalid(format!("invalid start '{}'", &record[1])))?;
            let end: u64 = record[2]
                .parse()
                .map_err(|_| invalid(format!("invalid end '{}'", &record[2])))?;
            if end <= start {
                return Err(invalid(format!("empty region {}:{}-{}", &record[0], start, end)).into());
            }
            regions.push((record[0].to_owned(), start + 1, end));
        }
        Ok(RegionSet::from_regions(regions))
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// True if any region overlaps `start..=end`.
    pub fn overlaps(&self, chrom: &str, start: u64, end: u64) -> bool {
        self.trees
            .get(chrom)
            .map_or(false, |tree| !tree.find(start..end + 1).is_empty())
    }

    /// True if a single region covers `start..=end` entirely.
    pub fn contains(&self, chrom: &str, start: u64, end: u64) -> bool {
        self.trees.get(chrom).map_or(false, |tree| {
            tree.find(start..end + 1).iter().any(|entry| {
                entry.interval().start <= start && entry.interval().end > end
            })
        })
    }

    pub fn contains_position(&self, chrom: &str, pos: u64) -> bool {
        self.contains(chrom, pos, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn regions() -> RegionSet {
        RegionSet::from_regions(vec![("1", 100, 200), ("1", 500, 600)])
    }

    #[test]
    fn test_contains() {
        let regions = regions();
        assert!(regions.contains("1", 100, 200));
        assert!(regions.contains("1", 150, 160));
        assert!(!regions.contains("1", 150, 250));
        assert!(!regions.contains("2", 150, 160));
        assert!(regions.contains_position("1", 600));
        assert!(!regions.contains_position("1", 601));
    }

    #[test]
    fn test_overlaps() {
        let regions = regions();
        assert!(regions.overlaps("1", 190, 250));
        assert!(regions.overlaps("1", 50, 100));
        assert!(!regions.overlaps("1", 201, 499));
    }

    #[test]
    fn test_from_bed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "#chrom\tstart\tend\n1\t99\t200\n2\t0\t10\tname").unwrap();
        let regions = RegionSet::from_bed(file.path()).unwrap();
        assert!(regions.contains("1", 100, 200));
        assert!(!regions.contains_position("1", 99));
        assert!(regions.contains_position("2", 1));
        assert!(regions.contains_position("2", 10));
    }

    #[test]
    fn test_from_bed_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1\tabc\t200").unwrap();
        assert!(RegionSet::from_bed(file.path()).is_err());
    }

    #[test]
    fn test_from_bed_many_regions() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..5000u64 {
            writeln!(file, "{}\t{}\t{}", 1 + i % 2, i * 100, i * 100 + 50).unwrap();
        }
        let regions = RegionSet::from_bed(file.path()).unwrap();
        assert!(regions.contains_position("1", 1));
        assert!(regions.contains_position("2", 150));
        assert!(regions.contains("1", 499_801, 499_850));
        assert!(!regions.contains_position("1", 51));
        assert!(!regions.contains_position("2", 499_851));
        assert!(!regions.overlaps("1", 99_951, 100_000));
    }
}
