use std::time::Instant;

use crossbeam::channel::Sender;
use log::info;

use crate::{
    cache::Cache,
    sim::{CancelToken, RunOptions},
    stats::CacheStats,
    trace::{Instr, Trace},
};

/// What one core did by the time it stopped.
#[derive(Debug, Clone)]
pub struct CoreReport {
    pub core: usize,
    pub executed: u64,
    pub cancelled: bool,
    pub stats: CacheStats,
}

/// One simulated core: a private L1 data cache replaying its own trace.
#[derive(Debug)]
pub struct Cpu {
    pub id: usize,
    pub instr_idx: u64,
    pub cache: Cache,
}

impl Cpu {
    pub fn new(id: usize, cache: Cache) -> Self {
        Cpu {
            id,
            instr_idx: 0,
            cache,
        }
    }

    /// Runs one instruction and renders its log lines. Zero-sized
    /// accesses do nothing and produce no output.
    pub fn execute(&mut self, pos: usize, instr: &Instr, start: Instant) -> Option<String> {
        if instr.size == 0 {
            return None;
        }
        let access = self.cache.access(pos, instr);
        self.instr_idx += 1;

        let stamp = format!(
            "[{:.6}] core={}",
            start.elapsed().as_secs_f64(),
            self.id
        );
        let mut out = format!(
            "{stamp} operation={} data_size={}B",
            instr.op.name(),
            instr.size
        );
        if let Some(data) = &instr.data {
            out.push_str(&format!(" data=0x{}", data.hex));
        }
        out.push_str(&format!(" status={}", access.result.status()));
        for event in &access.events {
            out.push_str(&format!("\n{stamp} {event}"));
        }
        Some(out)
    }

    /// Replays `trace` until it ends, the instruction limit is reached, or
    /// `cancel` fires. Cancellation is only observed between instructions.
    pub fn run(
        mut self,
        trace: &Trace,
        opts: &RunOptions,
        cancel: &CancelToken,
        log: &Sender<String>,
        start: Instant,
    ) -> CoreReport {
        info!("core {} starting, {} instructions", self.id, trace.len());
        let mut warmup = opts.warmup > 0;
        let mut next_heartbeat = opts.heartbeat;
        let mut cancelled = false;
        let budget = opts.limit.map(|limit| opts.warmup + limit);

        for (pos, instr) in trace.instrs.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if budget.is_some_and(|budget| self.instr_idx >= budget) {
                break;
            }

            if let Some(line) = self.execute(pos, instr, start) {
                // The receiver only disappears once the driver is gone.
                let _ = log.send(line);
            }

            if warmup && self.instr_idx >= opts.warmup {
                self.cache.clear_stats();
                warmup = false;
                info!("core {} finished warmup", self.id);
            }
            if opts.heartbeat != 0 && self.instr_idx >= next_heartbeat {
                info!("core {} instr: {}", self.id, self.instr_idx);
                while next_heartbeat <= self.instr_idx {
                    next_heartbeat += opts.heartbeat;
                }
            }
        }

        info!(
            "core {} {} after {} instructions",
            self.id,
            if cancelled { "cancelled" } else { "finished" },
            self.instr_idx
        );
        CoreReport {
            core: self.id,
            executed: self.instr_idx,
            cancelled,
            stats: self.cache.make_stats(),
        }
    }
}
