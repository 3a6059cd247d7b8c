// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Admission control for junction formation in degenerate high-depth regions.

use crate::config::RateLimitConfig;

/// Counts reads per fixed genomic window. Once a window holds more than
/// `trigger_threshold` reads, the tracker becomes rate limited and admits at most
/// `rate_limit` reads for the rest of that window. Every new window starts unlimited and
/// is only limited again once its own count exceeds the threshold.
#[derive(Debug, Clone, CopyGetters)]
pub struct RateTracker {
    window_size: u64,
    rate_limit: usize,
    trigger_threshold: usize,
    window_start: Option<u64>,
    window_count: usize,
    window_admitted: usize,
    #[getset(get_copy = "pub")]
    rate_limited: bool,
    #[getset(get_copy = "pub")]
    rejected: usize,
    #[getset(get_copy = "pub")]
    limited_windows: usize,
}

impl RateTracker {
    pub fn new(window_size: u64, rate_limit: usize, trigger_threshold: usize) -> Self {
        RateTracker {
            window_size: window_size.max(1),
            rate_limit,
            trigger_threshold,
            window_start: None,
            window_count: 0,
            window_admitted: 0,
            rate_limited: false,
            rejected: 0,
            limited_windows: 0,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        RateTracker::new(config.window_size, config.rate_limit, config.trigger_threshold)
    }

    /// Register a read at `position`, returning whether it may form junctions.
    pub fn handle_read(&mut self, position: u64) -> bool {
        let window_start = position - position % self.window_size;
        match self.window_start {
            Some(current) if current == window_start => (),
            Some(_) => self.roll(window_start),
            None => self.window_start = Some(window_start),
        }

        self.window_count += 1;
        if !self.rate_limited && self.window_count > self.trigger_threshold {
            debug!(
                "rate limiting reads from position {} ({} reads in window)",
                window_start, self.window_count
            );
            self.rate_limited = true;
            self.limited_windows += 1;
        }

        if self.rate_limited && self.window_admitted >= self.rate_limit {
            self.rejected += 1;
            false
        } else {
            self.window_admitted += 1;
            true
        }
    }

    fn roll(&mut self, window_start: u64) {
        if self.rate_limited {
            debug!("rate limit lifted at position {}", window_start);
        }
        self.rate_limited = false;
        self.window_start = Some(window_start);
        self.window_count = 0;
        self.window_admitted = 0;
    }
}
