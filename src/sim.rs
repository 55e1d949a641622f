use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use crossbeam::channel;
use log::info;

use crate::{
    cache::Cache,
    config::CacheConfig,
    cpu::{CoreReport, Cpu},
    error::{ConfigError, SimError},
    memory::BackingStore,
    replace::Policy,
    trace::Trace,
};

/// Upper bound on simulated cores, one OS thread each.
pub const MAX_CORES: usize = 16;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Instructions per core before the counters are reset.
    pub warmup: u64,
    /// Instructions per core to run after warmup.
    pub limit: Option<u64>,
    /// Log progress every this many instructions; 0 disables it.
    pub heartbeat: u64,
    /// Capacity of the log line channel. Cores block once it is full.
    pub log_queue: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            warmup: 0,
            limit: None,
            heartbeat: 0,
            log_queue: 1024,
        }
    }
}

/// Cooperative stop signal shared by every core of a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// N cores, each with a private cache built from one config, all sharing a
/// single backing store.
pub struct Simulation {
    cache: CacheConfig,
    store: Arc<BackingStore>,
    opts: RunOptions,
    cancel: CancelToken,
}

impl Simulation {
    pub fn new(cache: CacheConfig, store: Arc<BackingStore>) -> Result<Self, ConfigError> {
        cache.validate()?;
        Ok(Simulation {
            cache,
            store,
            opts: RunOptions::default(),
            cancel: CancelToken::default(),
        })
    }

    pub fn with_options(mut self, opts: RunOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Handle for stopping the run from another thread or from the sink.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &Arc<BackingStore> {
        &self.store
    }

    /// Runs one core per trace to completion (or cancellation). Per-access
    /// log lines are handed to `sink` on the calling thread in arrival order.
    pub fn run(
        &self,
        traces: &[Trace],
        mut sink: impl FnMut(&str),
    ) -> Result<Vec<CoreReport>, SimError> {
        if traces.is_empty() || traces.len() > MAX_CORES {
            return Err(ConfigError::CoreCount {
                requested: traces.len(),
                max: MAX_CORES,
            }
            .into());
        }

        let cpus = traces
            .iter()
            .enumerate()
            .map(|(id, trace)| {
                let oracle = match self.cache.replacement {
                    Policy::Belady => Some(Arc::new(trace.oracle())),
                    _ => None,
                };
                let cache = Cache::new(
                    format!("Core {id}"),
                    &self.cache,
                    Arc::clone(&self.store),
                    oracle,
                )?;
                Ok(Cpu::new(id, cache))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        info!("starting {} cores", cpus.len());
        let start = Instant::now();
        let (tx, rx) = channel::bounded::<String>(self.opts.log_queue.max(1));

        let results = crossbeam::scope(|s| {
            let handles: Vec<_> = cpus
                .into_iter()
                .zip(traces)
                .map(|(cpu, trace)| {
                    let tx = tx.clone();
                    let opts = &self.opts;
                    let cancel = &self.cancel;
                    s.spawn(move |_| cpu.run(trace, opts, cancel, &tx, start))
                })
                .collect();
            // Once every core has dropped its sender the loop below ends.
            drop(tx);
            for line in rx.iter() {
                sink(&line);
            }
            handles
                .into_iter()
                .enumerate()
                .map(|(id, handle)| handle.join().map_err(|_| SimError::CorePanicked(id)))
                .collect::<Vec<_>>()
        })
        .map_err(|_| SimError::Panicked)?;

        let reports = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        info!("simulation finished in {:.3}s", start.elapsed().as_secs_f64());
        Ok(reports)
    }
}
