use std::ops::Range;

use crate::cache::Line;

use super::Replace;

/// Every line in the set grows one older; the touched line becomes the youngest.
pub(super) fn age_set(lines: &mut [Line], set: Range<usize>, idx: usize) {
    for line in &mut lines[set] {
        line.age = line.age.saturating_add(1);
    }
    lines[idx].age = 0;
}

/// First slot whose age wins `better` against every earlier slot.
pub(super) fn pick_by_age(
    lines: &[Line],
    set: Range<usize>,
    better: impl Fn(u64, u64) -> bool,
) -> usize {
    let mut victim = set.start;
    for idx in set {
        if better(lines[idx].age, lines[victim].age) {
            victim = idx;
        }
    }
    victim
}

#[derive(Debug, Default)]
pub struct Lru {}

impl Lru {
    pub fn new() -> Self {
        Lru {}
    }
}

impl Replace for Lru {
    fn on_access(&mut self, lines: &mut [Line], set: Range<usize>, idx: usize) {
        age_set(lines, set, idx);
    }

    fn on_insert(&mut self, lines: &mut [Line], set: Range<usize>, idx: usize) {
        age_set(lines, set, idx);
    }

    fn select_victim(&mut self, lines: &[Line], set: Range<usize>) -> usize {
        pick_by_age(lines, set, |age, oldest| age > oldest)
    }

    fn on_evict(&mut self, lines: &mut [Line], set: Range<usize>, idx: usize) {
        age_set(lines, set, idx);
    }
}
