use std::ops::Range;

use crate::cache::Line;

use super::{
    lru::{age_set, pick_by_age},
    Replace,
};

/// Same aging as LRU but evicts the youngest line. Useful for cyclic scans
/// larger than the cache, where the most recent block is the least likely reused.
#[derive(Debug, Default)]
pub struct Mru {}

impl Mru {
    pub fn new() -> Self {
        Mru {}
    }
}

impl Replace for Mru {
    fn on_access(&mut self, lines: &mut [Line], set: Range<usize>, idx: usize) {
        age_set(lines, set, idx);
    }

    fn on_insert(&mut self, lines: &mut [Line], set: Range<usize>, idx: usize) {
        age_set(lines, set, idx);
    }

    fn select_victim(&mut self, lines: &[Line], set: Range<usize>) -> usize {
        pick_by_age(lines, set, |age, youngest| age < youngest)
    }

    fn on_evict(&mut self, lines: &mut [Line], set: Range<usize>, idx: usize) {
        age_set(lines, set, idx);
    }
}
