// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Tab separated output of junctions and emitted fragments.

use std::io;

use anyhow::Result;
use itertools::Itertools;

use crate::junctions::JunctionData;
use crate::reads::ReadGroup;

#[derive(Debug, Serialize)]
struct JunctionRow<'a> {
    chromosome: &'a str,
    position: u64,
    orientation: String,
    junction_fragments: usize,
    exact_support_fragments: usize,
    supporting_fragments: usize,
    hotspot: bool,
    indel: bool,
    discordant: bool,
    remote_junctions: String,
}

impl<'a> JunctionRow<'a> {
    fn new(junction: &'a JunctionData) -> Self {
        let remote_junctions = junction
            .remote_junctions()
            .iter()
            .map(|remote| {
                format!(
                    "{}:{}:{}:{}",
                    remote.chromosome(),
                    remote.position(),
                    remote.orientation(),
                    remote.fragment_count()
                )
            })
            .join(";");
        JunctionRow {
            chromosome: junction.chromosome(),
            position: junction.position(),
            orientation: junction.orientation().to_string(),
            junction_fragments: junction.junction_fragment_count(),
            exact_support_fragments: junction.exact_support_fragment_count(),
            supporting_fragments: junction.supporting_fragment_count(),
            hotspot: junction.hotspot(),
            indel: junction.indel(),
            discordant: junction.discordant(),
            remote_junctions,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReadRow<'a> {
    fragment: &'a str,
    chromosome: &'a str,
    position: u64,
    cigar: String,
    flags: u16,
    mapq: u8,
    role: String,
    conditional: bool,
    links: String,
}

/// Writes one row per junction.
pub struct JunctionWriter<W: io::Write> {
    inner: csv::Writer<W>,
}

impl<W: io::Write> JunctionWriter<W> {
    pub fn from_writer(writer: W) -> Self {
        JunctionWriter {
            inner: csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer),
        }
    }

    pub fn write(&mut self, junction: &JunctionData) -> Result<()> {
        self.inner.serialize(JunctionRow::new(junction))?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Writes one row per read of each emitted fragment.
pub struct GroupWriter<W: io::Write> {
    inner: csv::Writer<W>,
}

impl<W: io::Write> GroupWriter<W> {
    pub fn from_writer(writer: W) -> Self {
        GroupWriter {
            inner: csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer),
        }
    }

    pub fn write(&mut self, group: &ReadGroup) -> Result<()> {
        let links = group
            .links()
            .iter()
            .map(|link| {
                format!(
                    "{}:{}:{}:{}",
                    link.chromosome(),
                    link.position(),
                    link.orientation(),
                    link.kind()
                )
            })
            .join(";");
        for (read, role) in group.reads() {
            self.inner.serialize(ReadRow {
                fragment: group.id(),
                chromosome: read.chromosome(),
                position: read.start(),
                cigar: read.cigar().to_string(),
                flags: read.flags(),
                mapq: read.mapq(),
                role: role.to_string(),
                conditional: group.conditional_on_remote_reads(),
                links: links.clone(),
            })?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::junctions::{Orientation, RemoteJunction};
    use crate::reads::{parse_cigar, JunctionLink, LinkKind, ReadRecordBuilder, ReadRole};

    #[test]
    fn test_write_junctions() {
        let mut junction =
            JunctionData::discordant("1", 540, Orientation::Positive, vec!["a".to_owned()]);
        junction.add_remote_junction(RemoteJunction::new("1".to_owned(), 5050, Orientation::Negative));
        let mut buffer = Vec::new();
        {
            let mut writer = JunctionWriter::from_writer(&mut buffer);
            writer.write(&junction).unwrap();
            writer.flush().unwrap();
        }
        let content = String::from_utf8(buffer).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("chromosome\tposition\torientation"));
        assert_eq!(lines[1], "1\t540\t+\t1\t1\t1\tfalse\tfalse\ttrue\t1:5050:-:1");
    }

    #[test]
    fn test_write_groups() {
        let read = ReadRecordBuilder::default()
            .id("frag")
            .chromosome("1")
            .start(100)
            .cigar(parse_cigar("60M40S").unwrap())
            .mapq(60)
            .build()
            .unwrap();
        let group = ReadGroup::new(read, ReadRole::Junction).into_linked(vec![JunctionLink::new(
            "1".to_owned(),
            159,
            Orientation::Positive,
            LinkKind::Junction,
        )]);
        let mut buffer = Vec::new();
        {
            let mut writer = GroupWriter::from_writer(&mut buffer);
            writer.write(&group).unwrap();
            writer.flush().unwrap();
        }
        let content = String::from_utf8(buffer).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("fragment\tchromosome\tposition\tcigar"));
        assert!(lines[1].starts_with("frag\t1\t100\t60M40S\t0\t60\t"));
        assert!(lines[1].ends_with("\tfalse\t1:159:+:junction"));
    }
}
