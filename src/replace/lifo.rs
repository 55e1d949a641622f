use std::ops::Range;

use crate::cache::Line;

use super::{set_number, Replace};

#[derive(Debug)]
pub struct Lifo {
    newest: Vec<Option<usize>>,
}

impl Lifo {
    pub fn new(n_sets: usize) -> Self {
        Lifo {
            newest: vec![None; n_sets],
        }
    }
}

impl Replace for Lifo {
    fn on_access(&mut self, _lines: &mut [Line], _set: Range<usize>, _idx: usize) {}

    fn on_insert(&mut self, _lines: &mut [Line], set: Range<usize>, idx: usize) {
        self.newest[set_number(&set)] = Some(idx);
    }

    fn select_victim(&mut self, _lines: &[Line], set: Range<usize>) -> usize {
        self.newest[set_number(&set)].unwrap_or(set.start)
    }

    fn on_evict(&mut self, _lines: &mut [Line], set: Range<usize>, idx: usize) {
        self.newest[set_number(&set)] = Some(idx);
    }
}
