use std::fmt;

use serde::Serialize;

use crate::{
    replace::Policy,
    write::{WriteHit, WriteMiss},
};

/// Per-core counters. Everything only ever grows, except through `clear`
/// at the end of a warmup phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Lines filled, write-around stores excluded.
    pub allocations: u64,
    pub memory_reads: u64,
    pub memory_writes: u64,
    pub memory_errors: u64,
}

impl Stats {
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        match self.accesses() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }

    pub fn miss_rate(&self) -> f64 {
        match self.accesses() {
            0 => 0.0,
            total => self.misses as f64 / total as f64,
        }
    }

    /// Accesses per allocated line.
    pub fn reuse(&self) -> f64 {
        match self.allocations {
            0 => 0.0,
            allocs => self.accesses() as f64 / allocs as f64,
        }
    }

    pub fn clear(&mut self) {
        *self = Stats::default();
    }
}

/// Cache settings plus counters for one core, as printed in the report and
/// dumped with `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub size: usize,
    pub block_size: usize,
    pub ways: usize,
    pub sets: usize,
    pub write_hit: WriteHit,
    pub write_miss: WriteMiss,
    pub replacement: Policy,
    pub accesses: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub reuse: f64,
    #[serde(flatten)]
    pub counters: Stats,
}

impl CacheStats {
    fn associativity(&self) -> String {
        if self.ways == 1 {
            "Directly mapped".to_string()
        } else if self.sets == 1 {
            "Fully associative".to_string()
        } else {
            format!("{}-way set associative", self.ways)
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counters;
        writeln!(f, "{}", self.name)?;
        writeln!(f, "CACHE SETTINGS:")?;
        writeln!(f, "Only D-cache")?;
        writeln!(f, "D-cache size: {}", self.size)?;
        writeln!(f, "Associativity: {}", self.associativity())?;
        writeln!(f, "Block size: {}", self.block_size)?;
        writeln!(
            f,
            "Write-hit policy: {}",
            match self.write_hit {
                WriteHit::WriteBack => "Write-back",
                WriteHit::WriteThrough => "Write-through",
            }
        )?;
        writeln!(
            f,
            "Write-miss policy: {}",
            match self.write_miss {
                WriteMiss::WriteAllocate => "Write allocate",
                WriteMiss::WriteAround => "No-write allocate",
            }
        )?;
        writeln!(f, "Replacement policy: {}", self.replacement.describe())?;
        writeln!(f)?;
        writeln!(f, "CACHE STATISTICS:")?;
        writeln!(f, "Total accesses: {}", self.accesses)?;
        writeln!(f, "Hits: {} ({:.2}%)", c.hits, self.hit_rate * 100.0)?;
        writeln!(f, "Misses: {} ({:.2}%)", c.misses, self.miss_rate * 100.0)?;
        writeln!(f, "Evictions: {}", c.evictions)?;
        writeln!(f, "Average reuse: {:.2}", self.reuse)?;
        writeln!(f, "Backing store writes: {}", c.memory_writes)?;
        writeln!(f, "Backing store reads: {}", c.memory_reads)?;
        writeln!(f, "Backing store errors: {}", c.memory_errors)
    }
}
