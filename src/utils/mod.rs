// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

pub mod regions;
pub(crate) mod repeats;
pub(crate) mod worker_pool;

pub use regions::RegionSet;
