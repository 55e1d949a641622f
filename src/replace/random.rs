use std::{
    ops::Range,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::cache::Line;

use super::Replace;

#[derive(Debug)]
pub struct RandomRepl {
    rng: fastrand::Rng,
}

impl RandomRepl {
    /// Without an explicit seed the generator is seeded from the wall clock,
    /// once per cache.
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default()
        });
        RandomRepl {
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl Replace for RandomRepl {
    fn on_access(&mut self, _lines: &mut [Line], _set: Range<usize>, _idx: usize) {}

    fn on_insert(&mut self, _lines: &mut [Line], _set: Range<usize>, _idx: usize) {}

    fn select_victim(&mut self, _lines: &[Line], set: Range<usize>) -> usize {
        self.rng.usize(set)
    }

    fn on_evict(&mut self, _lines: &mut [Line], _set: Range<usize>, _idx: usize) {}
}
