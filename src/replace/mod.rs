pub mod belady;
pub mod fifo;
pub mod lifo;
pub mod lru;
pub mod mru;
pub mod random;

use std::{ops::Range, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{addr::AddressCodec, cache::Line, error::ConfigError, trace::TraceOracle};

use self::{belady::Belady, fifo::Fifo, lifo::Lifo, lru::Lru, mru::Mru, random::RandomRepl};

/// Bookkeeping and victim selection for one cache. Indices are cache-wide
/// slot numbers; `set` is the slot range of the set being accessed.
pub trait Replace {
    /// A valid line in `set` was hit.
    fn on_access(&mut self, lines: &mut [Line], set: Range<usize>, idx: usize);
    /// An empty slot in `set` was filled.
    fn on_insert(&mut self, lines: &mut [Line], set: Range<usize>, idx: usize);
    /// Picks the slot to evict from a full set.
    fn select_victim(&mut self, lines: &[Line], set: Range<usize>) -> usize;
    /// The victim chosen by `select_victim` was refilled in place.
    fn on_evict(&mut self, lines: &mut [Line], set: Range<usize>, idx: usize);
}

/// Policies that need to know where the core is in its trace.
pub trait Clairvoyant {
    fn seek(&mut self, pos: usize);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    #[default]
    Lru,
    Mru,
    Fifo,
    Lifo,
    Belady,
    Random,
}

impl Policy {
    pub fn describe(&self) -> &'static str {
        match self {
            Policy::Lru => "Least recently used (LRU)",
            Policy::Mru => "Most recently used (MRU)",
            Policy::Fifo => "First in first out (FIFO)",
            Policy::Lifo => "Last in first out (LIFO)",
            Policy::Belady => "Belady's algorithm",
            Policy::Random => "Random replacement (RR)",
        }
    }
}

#[derive(Debug)]
pub enum Replacement {
    Lru(Lru),
    Mru(Mru),
    Fifo(Fifo),
    Lifo(Lifo),
    Random(RandomRepl),
    Belady(Belady),
}

impl Replacement {
    pub fn new(
        policy: Policy,
        codec: &AddressCodec,
        seed: Option<u64>,
        oracle: Option<Arc<TraceOracle>>,
    ) -> Result<Self, ConfigError> {
        Ok(match policy {
            Policy::Lru => Replacement::Lru(Lru::new()),
            Policy::Mru => Replacement::Mru(Mru::new()),
            Policy::Fifo => Replacement::Fifo(Fifo::new(codec.n_sets)),
            Policy::Lifo => Replacement::Lifo(Lifo::new(codec.n_sets)),
            Policy::Random => Replacement::Random(RandomRepl::new(seed)),
            Policy::Belady => {
                Replacement::Belady(Belady::new(oracle.ok_or(ConfigError::MissingOracle)?))
            }
        })
    }

    fn policy(&mut self) -> &mut dyn Replace {
        match self {
            Replacement::Lru(p) => p,
            Replacement::Mru(p) => p,
            Replacement::Fifo(p) => p,
            Replacement::Lifo(p) => p,
            Replacement::Random(p) => p,
            Replacement::Belady(p) => p,
        }
    }

    /// Forwards the trace position to oracle policies; online ones ignore it.
    pub fn seek(&mut self, pos: usize) {
        if let Replacement::Belady(p) = self {
            p.seek(pos);
        }
    }
}

impl Replace for Replacement {
    fn on_access(&mut self, lines: &mut [Line], set: Range<usize>, idx: usize) {
        self.policy().on_access(lines, set, idx)
    }

    fn on_insert(&mut self, lines: &mut [Line], set: Range<usize>, idx: usize) {
        self.policy().on_insert(lines, set, idx)
    }

    fn select_victim(&mut self, lines: &[Line], set: Range<usize>) -> usize {
        self.policy().select_victim(lines, set)
    }

    fn on_evict(&mut self, lines: &mut [Line], set: Range<usize>, idx: usize) {
        self.policy().on_evict(lines, set, idx)
    }
}

/// Set number of a slot range, given every set has the same width.
fn set_number(set: &Range<usize>) -> usize {
    set.start / set.len()
}

#[cfg(test)]
pub(crate) fn full_set(tags: &[u64]) -> Vec<Line> {
    tags.iter()
        .map(|&tag| {
            let mut line = Line::new(4);
            line.valid = true;
            line.tag = tag;
            line
        })
        .collect()
}
