// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use itertools::Itertools;

/// Longest unit length considered when testing for short tandem repeats.
pub(crate) const MAX_REPEAT_UNIT_LEN: usize = 4;

pub(crate) fn is_homopolymer_seq(seq: &[u8]) -> bool {
    if seq.is_empty() {
        return false;
    }
    let base = seq[0].to_ascii_uppercase();
    seq[1..].iter().all(|c| c.to_ascii_uppercase() == base)
}

/// Length of the longest run of `base` in `seq`.
pub(crate) fn longest_run(seq: &[u8], base: u8) -> usize {
    let base = base.to_ascii_uppercase();
    let runs = seq.iter().group_by(|c| c.to_ascii_uppercase() == base);
    let longest = runs
        .into_iter()
        .filter_map(|(is_base, run)| if is_base { Some(run.count()) } else { None })
        .max()
        .unwrap_or(0);
    longest
}

/// Whether `seq` is a perfect tandem repeat of a unit of at most `max_unit_len` bases,
/// with at least two copies of the unit.
pub(crate) fn is_tandem_repeat(seq: &[u8], max_unit_len: usize) -> bool {
    if seq.len() < 2 {
        return false;
    }
    if is_homopolymer_seq(seq) {
        return true;
    }
    (2..=max_unit_len.min(seq.len() / 2)).any(|unit_len| {
        let unit = &seq[..unit_len];
        // a unit that is itself a homopolymer was covered above
        !is_homopolymer_seq(unit)
            && seq
                .iter()
                .enumerate()
                .all(|(i, c)| c.eq_ignore_ascii_case(&unit[i % unit_len]))
    })
}
