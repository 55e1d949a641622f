use std::{collections::VecDeque, ops::Range};

use crate::cache::Line;

use super::{set_number, Replace};

/// Insertion-order queue per set, next victim at the front.
#[derive(Debug)]
pub struct Fifo {
    queues: Vec<VecDeque<usize>>,
}

impl Fifo {
    pub fn new(n_sets: usize) -> Self {
        Fifo {
            queues: vec![VecDeque::new(); n_sets],
        }
    }
}

impl Replace for Fifo {
    fn on_access(&mut self, _lines: &mut [Line], _set: Range<usize>, _idx: usize) {}

    fn on_insert(&mut self, _lines: &mut [Line], set: Range<usize>, idx: usize) {
        self.queues[set_number(&set)].push_back(idx);
    }

    fn select_victim(&mut self, _lines: &[Line], set: Range<usize>) -> usize {
        let queue = &mut self.queues[set_number(&set)];
        // The refilled victim becomes the newest entry.
        match queue.pop_front() {
            Some(victim) => {
                queue.push_back(victim);
                victim
            }
            None => set.start,
        }
    }

    fn on_evict(&mut self, _lines: &mut [Line], _set: Range<usize>, _idx: usize) {}
}
