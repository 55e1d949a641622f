use std::{ops::Range, sync::Arc};

use crate::{cache::Line, trace::TraceOracle};

use super::{Clairvoyant, Replace};

/// Bélády's optimal replacement. It reads the core's future accesses, which
/// no real cache can do, so it only serves as a lower bound on misses for
/// comparing the online policies.
#[derive(Debug)]
pub struct Belady {
    oracle: Arc<TraceOracle>,
    pos: usize,
}

impl Belady {
    pub fn new(oracle: Arc<TraceOracle>) -> Self {
        Belady { oracle, pos: 0 }
    }
}

impl Clairvoyant for Belady {
    fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }
}

impl Replace for Belady {
    fn on_access(&mut self, _lines: &mut [Line], _set: Range<usize>, _idx: usize) {}

    fn on_insert(&mut self, _lines: &mut [Line], _set: Range<usize>, _idx: usize) {}

    fn select_victim(&mut self, lines: &[Line], set: Range<usize>) -> usize {
        let mut victim = set.start;
        let mut farthest = 0;
        for idx in set {
            let line = &lines[idx];
            if !line.valid {
                continue;
            }
            match self.oracle.next_use(line.tag, self.pos) {
                None => return idx,
                Some(next) if next >= farthest => {
                    farthest = next;
                    victim = idx;
                }
                Some(_) => {}
            }
        }
        victim
    }

    fn on_evict(&mut self, _lines: &mut [Line], _set: Range<usize>, _idx: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replace::full_set;

    #[test]
    fn evicts_the_line_reused_farthest_away() {
        // pos 0 is the current access; 1 is reused at 3, 2 at 1, 3 at 5.
        let oracle = Arc::new(TraceOracle::new([9, 2, 9, 1, 9, 3]));
        let lines = full_set(&[1, 2, 3]);
        let mut belady = Belady::new(oracle);
        belady.seek(0);
        assert_eq!(belady.select_victim(&lines, 0..3), 2);

        belady.seek(3);
        // 1 and 2 are never used again; the first one found goes.
        assert_eq!(belady.select_victim(&lines, 0..3), 0);
    }

    #[test]
    fn never_reused_line_wins_immediately() {
        let oracle = Arc::new(TraceOracle::new([0, 5, 6]));
        let lines = full_set(&[5, 7, 6]);
        let mut belady = Belady::new(oracle);
        assert_eq!(belady.select_victim(&lines, 0..3), 1);
    }
}
