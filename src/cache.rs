use std::{fmt, ops::Range, sync::Arc};

use log::{debug, warn};

use crate::{
    addr::{Address, AddressCodec},
    config::CacheConfig,
    error::{BackingStoreError, ConfigError},
    memory::BackingStore,
    replace::{Replace, Replacement},
    stats::{CacheStats, Stats},
    trace::{Instr, TraceOracle},
    write::{WriteAction, WriteHit, WritePolicy},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    Hit,
    Miss,
}

impl AccessResult {
    pub fn status(&self) -> &'static str {
        match self {
            AccessResult::Hit => "hit",
            AccessResult::Miss => "miss",
        }
    }
}

/// Something worth reporting besides hit or miss.
#[derive(Debug)]
pub enum Event {
    Evicted {
        set: usize,
        victim: u64,
        written_back: bool,
    },
    ReadFailed {
        offset: u64,
        error: BackingStoreError,
    },
    WriteFailed {
        offset: u64,
        error: BackingStoreError,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Evicted {
                set,
                victim,
                written_back,
            } => write!(
                f,
                "eviction set={set} victim={victim:#x} writeback={}",
                if *written_back { "yes" } else { "no" }
            ),
            Event::ReadFailed { offset, error } => {
                write!(f, "error=\"read at {offset:#x} failed: {error}\"")
            }
            Event::WriteFailed { offset, error } => {
                write!(f, "error=\"write at {offset:#x} failed: {error}\"")
            }
        }
    }
}

#[derive(Debug)]
pub struct Access {
    pub result: AccessResult,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default)]
pub struct Line {
    pub valid: bool,
    pub dirty: bool,
    /// The full address the block was filled from.
    pub tag: u64,
    pub data: Vec<u8>,
    /// Accesses since the last fill, the fill included.
    pub frequency: u64,
    // Replace Data
    pub age: u64,
}

impl Line {
    pub fn new(block_size: usize) -> Self {
        Line {
            data: vec![0; block_size],
            ..Line::default()
        }
    }

    fn write(&mut self, payload: &[u8]) {
        self.data[..payload.len()].copy_from_slice(payload);
    }
}

/// Store data cut or zero-padded to the access size.
fn store_payload(instr: &Instr, size: usize) -> Option<Vec<u8>> {
    instr.data.as_ref().map(|data| {
        let mut bytes = data.bytes.clone();
        bytes.resize(size, 0);
        bytes
    })
}

#[derive(Debug)]
pub struct Cache {
    name: String,
    pub lines: Vec<Line>,
    codec: AddressCodec,
    config: CacheConfig,
    write: WritePolicy,
    repl: Replacement,
    store: Arc<BackingStore>,
    pub stats: Stats,
}

impl Cache {
    /// Builds a cold cache. `oracle` is only needed (and required) for Bélády.
    pub fn new(
        name: String,
        config: &CacheConfig,
        store: Arc<BackingStore>,
        oracle: Option<Arc<TraceOracle>>,
    ) -> Result<Self, ConfigError> {
        let codec = config.codec()?;
        let write = config.write_policy()?;
        let repl = Replacement::new(config.replacement, &codec, config.seed, oracle)?;

        Ok(Cache {
            name,
            lines: vec![Line::new(codec.block_size); codec.n_lines],
            codec,
            config: config.clone(),
            write,
            repl,
            store,
            stats: Stats::default(),
        })
    }

    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    pub fn set_range(&self, set: usize) -> Range<usize> {
        set * self.codec.n_ways..(set + 1) * self.codec.n_ways
    }

    /// Slot currently holding `addr`, if any.
    pub fn probe(&self, addr: &Address) -> Option<usize> {
        let set = self.set_range(self.codec.set_index(addr));
        let start = set.start;
        self.lines[set]
            .iter()
            .position(|l| l.valid && l.tag == addr.value())
            .map(|way| start + way)
    }

    /// Runs one load or store. `pos` is the instruction's index in the
    /// core's trace, which only the look-ahead policy cares about.
    pub fn access(&mut self, pos: usize, instr: &Instr) -> Access {
        let addr = instr.addr;
        let set_idx = self.codec.set_index(&addr);
        let set = self.set_range(set_idx);
        let payload = store_payload(instr, instr.size.min(self.codec.block_size));
        let mut events = Vec::new();

        if let Some(idx) = self.probe(&addr) {
            self.stats.hits += 1;
            self.lines[idx].frequency += 1;
            match (self.write.decide(instr.op, true), &payload) {
                (Some(WriteAction::CacheAndMarkDirty), Some(bytes)) => {
                    let line = &mut self.lines[idx];
                    line.write(bytes);
                    line.dirty = true;
                }
                (Some(WriteAction::WriteThrough), Some(bytes)) => {
                    self.lines[idx].write(bytes);
                    let block = self.lines[idx].data.clone();
                    self.store_write(addr.offset(), &block, &mut events);
                }
                _ => {}
            }
            self.repl.on_access(&mut self.lines, set, idx);
            return Access {
                result: AccessResult::Hit,
                events,
            };
        }

        self.stats.misses += 1;
        let action = self.write.decide(instr.op, false);
        if let (Some(WriteAction::BypassCache), Some(bytes)) = (action, &payload) {
            self.store_write(addr.offset(), bytes, &mut events);
            return Access {
                result: AccessResult::Miss,
                events,
            };
        }

        let dirty = action == Some(WriteAction::CacheAndMarkDirty);
        let empty = self.lines[set.clone()].iter().position(|l| !l.valid);
        match empty {
            Some(way) => {
                let idx = set.start + way;
                self.fill(idx, &addr, payload.as_deref(), dirty, &mut events);
                self.repl.on_insert(&mut self.lines, set, idx);
            }
            None => {
                self.repl.seek(pos);
                let victim = self.repl.select_victim(&self.lines, set.clone());
                self.evict(victim, set_idx, &mut events);
                self.fill(victim, &addr, payload.as_deref(), dirty, &mut events);
                self.repl.on_evict(&mut self.lines, set, victim);
            }
        }

        Access {
            result: AccessResult::Miss,
            events,
        }
    }

    /// Loads the block at `addr` into slot `idx`, or for a store writes the
    /// payload over the slot's first bytes without reading the store. A
    /// failed read keeps whatever bytes the slot already held.
    fn fill(
        &mut self,
        idx: usize,
        addr: &Address,
        payload: Option<&[u8]>,
        dirty: bool,
        events: &mut Vec<Event>,
    ) {
        if payload.is_none() {
            match self.store.read_at(addr.offset(), self.codec.block_size) {
                Ok(block) => {
                    self.stats.memory_reads += 1;
                    self.lines[idx].data = block;
                }
                Err(error) => {
                    warn!("{}: fill of {addr} failed: {error}", self.name);
                    self.stats.memory_errors += 1;
                    events.push(Event::ReadFailed {
                        offset: addr.offset(),
                        error,
                    });
                }
            }
        }

        self.stats.allocations += 1;
        let line = &mut self.lines[idx];
        line.valid = true;
        line.tag = addr.value();
        line.dirty = false;
        line.frequency = 1;
        if let Some(bytes) = payload {
            line.write(bytes);
            line.dirty = dirty;
        }
    }

    fn evict(&mut self, victim: usize, set: usize, events: &mut Vec<Event>) {
        self.stats.evictions += 1;
        let line = &self.lines[victim];
        let tag = line.tag;
        let written_back = line.dirty && self.write.hit() == WriteHit::WriteBack;
        debug!(
            "{}: evicting {tag:#x} from set {set} (dirty: {})",
            self.name, line.dirty
        );
        events.push(Event::Evicted {
            set,
            victim: tag,
            written_back,
        });
        if written_back {
            let block = line.data.clone();
            self.store_write(tag, &block, events);
        }
        self.lines[victim].dirty = false;
    }

    fn store_write(&mut self, offset: u64, bytes: &[u8], events: &mut Vec<Event>) {
        match self.store.write_at(offset, bytes) {
            Ok(()) => self.stats.memory_writes += 1,
            Err(error) => {
                warn!("{}: write of {offset:#x} failed: {error}", self.name);
                self.stats.memory_errors += 1;
                events.push(Event::WriteFailed { offset, error });
            }
        }
    }

    /// Resets counters without touching cache contents. Resident lines
    /// count as one allocation each.
    pub fn clear_stats(&mut self) {
        self.stats.clear();
        self.stats.allocations = self.lines.iter().filter(|l| l.valid).count() as u64;
        for line in &mut self.lines {
            line.frequency = 0;
        }
    }

    pub fn make_stats(&self) -> CacheStats {
        CacheStats {
            name: self.name.clone(),
            size: self.codec.size,
            block_size: self.codec.block_size,
            ways: self.codec.n_ways,
            sets: self.codec.n_sets,
            write_hit: self.write.hit(),
            write_miss: self.write.miss(),
            replacement: self.config.replacement,
            accesses: self.stats.accesses(),
            hit_rate: self.stats.hit_rate(),
            miss_rate: self.stats.miss_rate(),
            reuse: self.stats.reuse(),
            counters: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Associativity,
        replace::Policy,
        trace::{Data, Instr},
        write::WriteMiss,
    };

    fn config(associativity: Associativity, replacement: Policy) -> CacheConfig {
        CacheConfig {
            size: 1024,
            block_size: 64,
            associativity,
            write_hit: WriteHit::WriteBack,
            write_miss: WriteMiss::WriteAllocate,
            replacement,
            seed: Some(1),
        }
    }

    fn ram() -> Arc<BackingStore> {
        Arc::new(BackingStore::in_memory((0..8192).map(|i| i as u8).collect()))
    }

    fn load(addr: &str) -> Instr {
        Instr::load(Address::parse(addr).unwrap(), 4)
    }

    fn store(addr: &str, size: usize, data: &str) -> Instr {
        Instr::store(Address::parse(addr).unwrap(), size, Data::parse(data).unwrap())
    }

    #[test]
    fn cold_cache_has_every_line_invalid() {
        let cache = Cache::new(
            "c".into(),
            &config(Associativity::Ways(2), Policy::Lru),
            ram(),
            None,
        )
        .unwrap();
        assert_eq!(cache.lines.len(), 16);
        assert!(cache.lines.iter().all(|l| !l.valid && l.data.len() == 64));
    }

    #[test]
    fn direct_mapped_load_then_hit() {
        let mut cache = Cache::new(
            "c".into(),
            &config(Associativity::DirectMapped, Policy::Lru),
            ram(),
            None,
        )
        .unwrap();
        assert_eq!(cache.access(0, &load("0x0000")).result, AccessResult::Miss);
        assert_eq!(cache.access(1, &load("0x0000")).result, AccessResult::Hit);
        assert_eq!(cache.stats.hits, 1);
        assert_eq!(cache.stats.misses, 1);
        assert_eq!(cache.stats.memory_reads, 1);
    }

    #[test]
    fn hits_raise_line_frequency_and_reuse() {
        let mut cache = Cache::new(
            "c".into(),
            &config(Associativity::Ways(2), Policy::Lru),
            ram(),
            None,
        )
        .unwrap();
        for pos in 0..4 {
            cache.access(pos, &load("0x0040"));
        }
        cache.access(4, &load("0x0080"));
        let idx = cache.probe(&Address::parse("0x40").unwrap()).unwrap();
        assert_eq!(cache.lines[idx].frequency, 4);
        assert_eq!(cache.stats.allocations, 2);
        assert_eq!(cache.make_stats().reuse, 2.5);

        cache.clear_stats();
        assert_eq!(cache.stats.allocations, 2);
        assert_eq!(cache.lines[idx].frequency, 0);
    }

    #[test]
    fn fill_reads_the_block_at_the_address() {
        let mut cache = Cache::new(
            "c".into(),
            &config(Associativity::DirectMapped, Policy::Lru),
            ram(),
            None,
        )
        .unwrap();
        cache.access(0, &load("0x0100"));
        let idx = cache.probe(&Address::parse("0x100").unwrap()).unwrap();
        let expected: Vec<u8> = (0x100..0x140).map(|i| i as u8).collect();
        assert_eq!(cache.lines[idx].data, expected);
    }

    #[test]
    fn short_store_keeps_the_rest_of_the_block() {
        let mut cache = Cache::new(
            "c".into(),
            &config(Associativity::DirectMapped, Policy::Lru),
            ram(),
            None,
        )
        .unwrap();
        cache.access(0, &load("0x0040"));
        let idx = cache.probe(&Address::parse("0x40").unwrap()).unwrap();
        let before = cache.lines[idx].data.clone();

        let access = cache.access(1, &store("0x0040", 4, "0xdeadbeef"));
        assert_eq!(access.result, AccessResult::Hit);
        let line = &cache.lines[idx];
        assert_eq!(&line.data[..4], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(&line.data[4..], &before[4..]);
        assert!(line.dirty);
    }

    #[test]
    fn store_data_is_padded_or_truncated_to_size() {
        let mut cache = Cache::new(
            "c".into(),
            &config(Associativity::DirectMapped, Policy::Lru),
            ram(),
            None,
        )
        .unwrap();
        cache.access(0, &store("0x0", 4, "0xabcd"));
        let idx = cache.probe(&Address::parse("0x0").unwrap()).unwrap();
        assert_eq!(&cache.lines[idx].data[..5], &[0xab, 0xcd, 0, 0, 0]);

        cache.access(1, &store("0x0", 1, "0x1122"));
        assert_eq!(&cache.lines[idx].data[..3], &[0x11, 0xcd, 0]);
    }

    #[test]
    fn dirty_victim_is_written_back_to_its_own_address() {
        let store_ram = ram();
        let mut cache = Cache::new(
            "c".into(),
            &config(Associativity::DirectMapped, Policy::Lru),
            Arc::clone(&store_ram),
            None,
        )
        .unwrap();
        // 16 sets of 64B: 0x000 and 0x400 share set 0.
        cache.access(0, &store("0x000", 2, "0xffee"));
        assert_eq!(store_ram.read_at(0, 2).unwrap(), vec![0, 1]);

        let access = cache.access(1, &load("0x400"));
        assert_eq!(access.result, AccessResult::Miss);
        assert!(matches!(
            access.events.as_slice(),
            [Event::Evicted {
                set: 0,
                victim: 0,
                written_back: true
            }]
        ));
        assert_eq!(store_ram.read_at(0, 3).unwrap(), vec![0xff, 0xee, 0]);
        assert_eq!(cache.stats.evictions, 1);
        assert_eq!(cache.stats.memory_writes, 1);
    }

    #[test]
    fn clean_victim_is_dropped_silently() {
        let mut cache = Cache::new(
            "c".into(),
            &config(Associativity::DirectMapped, Policy::Lru),
            ram(),
            None,
        )
        .unwrap();
        cache.access(0, &load("0x000"));
        cache.access(1, &load("0x400"));
        assert_eq!(cache.stats.evictions, 1);
        assert_eq!(cache.stats.memory_writes, 0);
    }

    #[test]
    fn write_through_hit_updates_the_store() {
        let store_ram = ram();
        let mut cfg = config(Associativity::DirectMapped, Policy::Lru);
        cfg.write_hit = WriteHit::WriteThrough;
        cfg.write_miss = WriteMiss::WriteAround;
        let mut cache = Cache::new("c".into(), &cfg, Arc::clone(&store_ram), None).unwrap();

        cache.access(0, &load("0x80"));
        cache.access(1, &store("0x80", 2, "0x0102"));
        let idx = cache.probe(&Address::parse("0x80").unwrap()).unwrap();
        assert!(!cache.lines[idx].dirty);
        assert_eq!(store_ram.read_at(0x80, 3).unwrap(), vec![1, 2, 0x82]);
        assert_eq!(cache.stats.memory_writes, 1);
    }

    #[test]
    fn write_around_miss_bypasses_the_cache() {
        let store_ram = ram();
        let mut cfg = config(Associativity::Ways(2), Policy::Lru);
        cfg.write_miss = WriteMiss::WriteAround;
        let mut cache = Cache::new("c".into(), &cfg, Arc::clone(&store_ram), None).unwrap();

        let access = cache.access(0, &store("0x200", 2, "0xaabb"));
        assert_eq!(access.result, AccessResult::Miss);
        assert!(cache.lines.iter().all(|l| !l.valid));
        assert_eq!(store_ram.read_at(0x200, 2).unwrap(), vec![0xaa, 0xbb]);
        assert_eq!(cache.stats.misses, 1);
        assert_eq!(cache.stats.memory_reads, 0);
    }

    #[test]
    fn failed_fill_still_counts_the_miss() {
        let small = Arc::new(BackingStore::in_memory(vec![0; 32]));
        let mut cache = Cache::new(
            "c".into(),
            &config(Associativity::DirectMapped, Policy::Lru),
            small,
            None,
        )
        .unwrap();
        let access = cache.access(0, &load("0x0"));
        assert_eq!(access.result, AccessResult::Miss);
        assert!(matches!(access.events.as_slice(), [Event::ReadFailed { .. }]));
        assert_eq!(cache.stats.memory_errors, 1);
        assert!(cache.lines[0].valid);
        assert_eq!(cache.lines[0].data, vec![0; 64]);
    }

    #[test]
    fn store_miss_allocates_without_reading() {
        // Below 0x400 the image holds 0x11, above it 0x22.
        let image = (0..2048).map(|i| if i < 0x400 { 0x11 } else { 0x22 }).collect();
        let mut cache = Cache::new(
            "c".into(),
            &config(Associativity::DirectMapped, Policy::Lru),
            Arc::new(BackingStore::in_memory(image)),
            None,
        )
        .unwrap();
        cache.access(0, &load("0x000"));
        assert_eq!(cache.stats.memory_reads, 1);

        // Same set as 0x000; the clean line is replaced in place.
        let access = cache.access(1, &store("0x400", 4, "0x01020304"));
        assert_eq!(access.result, AccessResult::Miss);
        assert_eq!(cache.stats.memory_reads, 1);
        assert_eq!(cache.stats.evictions, 1);

        let line = &cache.lines[cache.probe(&Address::new(0x400)).unwrap()];
        assert!(line.dirty);
        assert_eq!(&line.data[..4], &[1, 2, 3, 4]);
        assert!(line.data[4..].iter().all(|&b| b == 0x11));
    }

    #[test]
    fn failed_write_through_still_counts_the_hit() {
        let mut cfg = config(Associativity::DirectMapped, Policy::Lru);
        cfg.write_hit = WriteHit::WriteThrough;
        cfg.write_miss = WriteMiss::WriteAround;
        let small = Arc::new(BackingStore::in_memory(vec![0; 32]));
        let mut cache = Cache::new("c".into(), &cfg, small, None).unwrap();

        // The fill fails too, but the line still becomes valid.
        cache.access(0, &load("0x0"));
        let access = cache.access(1, &store("0x0", 2, "0xaabb"));
        assert_eq!(access.result, AccessResult::Hit);
        assert!(matches!(
            access.events.as_slice(),
            [Event::WriteFailed { offset: 0, .. }]
        ));
        assert!(access.events[0].to_string().starts_with("error=\"write at 0x0 failed: "));
        assert_eq!(cache.stats.hits, 1);
        assert_eq!(cache.stats.memory_writes, 0);
        assert_eq!(cache.stats.memory_errors, 2);
        let idx = cache.probe(&Address::new(0)).unwrap();
        assert_eq!(&cache.lines[idx].data[..2], &[0xaa, 0xbb]);
    }

    #[test]
    fn failed_write_around_still_counts_the_miss() {
        let mut cfg = config(Associativity::Ways(2), Policy::Lru);
        cfg.write_miss = WriteMiss::WriteAround;
        let small = Arc::new(BackingStore::in_memory(vec![0; 32]));
        let mut cache = Cache::new("c".into(), &cfg, small, None).unwrap();

        let access = cache.access(0, &store("0x100", 2, "0xaabb"));
        assert_eq!(access.result, AccessResult::Miss);
        assert!(matches!(
            access.events.as_slice(),
            [Event::WriteFailed { offset: 0x100, .. }]
        ));
        assert!(access.events[0].to_string().starts_with("error=\"write at 0x100 failed: "));
        assert_eq!(cache.stats.misses, 1);
        assert_eq!(cache.stats.memory_writes, 0);
        assert_eq!(cache.stats.memory_errors, 1);
        assert!(cache.lines.iter().all(|l| !l.valid));
    }

    #[test]
    fn failed_writeback_still_evicts() {
        let small = Arc::new(BackingStore::in_memory(vec![0; 32]));
        let mut cache = Cache::new(
            "c".into(),
            &config(Associativity::DirectMapped, Policy::Lru),
            small,
            None,
        )
        .unwrap();
        cache.access(0, &store("0x000", 2, "0xffee"));
        assert_eq!(cache.stats.memory_errors, 0);

        let access = cache.access(1, &load("0x400"));
        assert_eq!(access.result, AccessResult::Miss);
        assert!(matches!(
            access.events.as_slice(),
            [
                Event::Evicted {
                    written_back: true,
                    ..
                },
                Event::WriteFailed { offset: 0, .. },
                Event::ReadFailed { offset: 0x400, .. },
            ]
        ));
        assert_eq!(cache.stats.evictions, 1);
        assert_eq!(cache.stats.memory_writes, 0);
        assert_eq!(cache.stats.memory_errors, 2);
        assert!(cache.probe(&Address::new(0x400)).is_some());
    }

    #[test]
    fn fifo_evicts_first_inserted() {
        let mut cache = Cache::new(
            "c".into(),
            &config(Associativity::Ways(2), Policy::Fifo),
            ram(),
            None,
        )
        .unwrap();
        // 8 sets of 2: 0x000, 0x200, 0x400 all map to set 0.
        for (pos, addr) in ["0x000", "0x200", "0x400"].iter().enumerate() {
            assert_eq!(cache.access(pos, &load(addr)).result, AccessResult::Miss);
        }
        assert!(cache.probe(&Address::parse("0x000").unwrap()).is_none());
        assert_eq!(cache.access(3, &load("0x000")).result, AccessResult::Miss);
        assert!(cache.probe(&Address::parse("0x200").unwrap()).is_none());
    }

    #[test]
    fn belady_requires_an_oracle() {
        assert!(matches!(
            Cache::new(
                "c".into(),
                &config(Associativity::Ways(2), Policy::Belady),
                ram(),
                None
            ),
            Err(ConfigError::MissingOracle)
        ));
    }
}
