//! Set-associative weight-cache latency model
//!
//! Purely a cost model: no weight bytes move through it. Each demand access
//! maps a 128-byte weight line to a set, charges hit or miss cycles, and may
//! trigger sequential prefetches along the input-channel axis. Eviction is
//! either LRU or scoreboard-biased toward input channels that have spiked
//! least recently.

use std::collections::HashMap;

/// Eviction policy for the weight cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Bias eviction toward the coldest input channel
    Scoreboard,
    /// Plain least-recently-used
    Lru,
}

/// Configuration for the weight-cache latency model
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Total cache size in bytes
    pub capacity_bytes: usize,
    /// One cache line (one DRAM weight line) in bytes
    pub line_bytes: usize,
    /// Set associativity
    pub ways: usize,
    /// Cycles to serve a hit
    pub l1_hit_cycles: u32,
    /// Fixed per-line miss penalty in cycles
    pub miss_overhead: u32,
    /// Demand for channel `cin` prefetches `cin+1 ..= cin+depth`
    pub prefetch_depth: u32,
    /// Eviction policy
    pub eviction_policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 576 * 1024,
            line_bytes: 128,
            ways: 8,
            l1_hit_cycles: 1,
            miss_overhead: 40,
            prefetch_depth: 0,
            eviction_policy: EvictionPolicy::Scoreboard,
        }
    }
}

/// Address of one weight line, keyed by `(tile, cin, kh, kw)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineAddr {
    /// Output tile id
    pub tile: u32,
    /// Input channel
    pub cin: u32,
    /// Kernel row
    pub kh: u32,
    /// Kernel column
    pub kw: u32,
}

impl LineAddr {
    /// Create a line address
    pub const fn new(tile: u32, cin: u32, kh: u32, kw: u32) -> Self {
        Self { tile, cin, kh, kw }
    }

    /// Pack into a stable 64-bit key: `[tile:24][cin:16][kh:12][kw:12]`
    pub fn key(&self) -> u64 {
        ((self.tile as u64 & 0xFF_FFFF) << 40)
            | ((self.cin as u64 & 0xFFFF) << 24)
            | ((self.kh as u64 & 0xFFF) << 12)
            | (self.kw as u64 & 0xFFF)
    }
}

/// Metrics of one demand access plus any prefetch work it triggered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessResult {
    /// Cycles charged for the demand line
    pub demand_cycles: u32,
    /// Whether the demand line missed
    pub demand_miss: bool,
    /// Prefetch lines requested
    pub prefetch_requests: u32,
    /// Prefetch lines that missed (and were filled)
    pub prefetch_miss_lines: u32,
}

/// Accumulated cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Demand accesses served
    pub demand_accesses: u64,
    /// Demand accesses that missed
    pub demand_misses: u64,
    /// Cycles spent on demand hits
    pub demand_hit_cycles: u64,
    /// Cycles spent on demand misses
    pub demand_miss_cycles: u64,
    /// Prefetch lines requested
    pub prefetch_requests: u64,
    /// Prefetch lines that missed
    pub prefetch_misses: u64,
    /// Distinct demand lines seen
    pub unique_demand_lines: u64,
    /// Sum of reuse distances over re-accessed lines
    pub reuse_distance_total: u64,
    /// Number of re-accesses contributing to the reuse distance sum
    pub reuse_events: u64,
}

impl CacheStats {
    /// Demand miss rate in `[0, 1]`
    pub fn miss_rate(&self) -> f64 {
        if self.demand_accesses == 0 {
            0.0
        } else {
            self.demand_misses as f64 / self.demand_accesses as f64
        }
    }

    /// Mean reuse distance over re-accessed lines
    pub fn mean_reuse_distance(&self) -> f64 {
        if self.reuse_events == 0 {
            0.0
        } else {
            self.reuse_distance_total as f64 / self.reuse_events as f64
        }
    }
}

/// Per-input-channel spike scoreboard biasing eviction toward cold channels
#[derive(Debug, Default)]
pub struct Scoreboard {
    scores: HashMap<u32, u64>,
}

impl Scoreboard {
    /// Record a spike on an input channel
    pub fn bump(&mut self, cin: u32) {
        *self.scores.entry(cin).or_insert(0) += 1;
    }

    /// Current score of an input channel
    pub fn get(&self, cin: u32) -> u64 {
        self.scores.get(&cin).copied().unwrap_or(0)
    }

    /// Drop all scores
    pub fn clear(&mut self) {
        self.scores.clear();
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WayEntry {
    tag: u64,
    valid: bool,
    lru_age: u64,
    cin: u32,
}

/// Set-associative cache simulator for weight-line latency accounting
pub struct CacheSim {
    cfg: CacheConfig,
    num_sets: usize,
    sets: Vec<Vec<WayEntry>>,
    scoreboard: Scoreboard,
    stats: CacheStats,
    seen_lines: HashMap<u64, u64>,
    access_seq: u64,
    age_seq: u64,
}

impl CacheSim {
    /// Create a cache from a configuration.
    ///
    /// The set count is derived as `capacity / (line_bytes * ways)`, clamped
    /// to at least one set.
    pub fn new(cfg: CacheConfig) -> Self {
        let num_sets = (cfg.capacity_bytes / (cfg.line_bytes * cfg.ways.max(1))).max(1);
        Self {
            sets: vec![vec![WayEntry::default(); cfg.ways.max(1)]; num_sets],
            num_sets,
            cfg,
            scoreboard: Scoreboard::default(),
            stats: CacheStats::default(),
            seen_lines: HashMap::new(),
            access_seq: 0,
            age_seq: 0,
        }
    }

    /// Number of sets
    pub fn num_sets(&self) -> usize {
        self.num_sets
    }

    /// Configuration in use
    pub fn config(&self) -> &CacheConfig {
        &self.cfg
    }

    /// Accumulated statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Forget all contents and statistics
    pub fn reset(&mut self) {
        for set in &mut self.sets {
            set.fill(WayEntry::default());
        }
        self.scoreboard.clear();
        self.stats = CacheStats::default();
        self.seen_lines.clear();
        self.access_seq = 0;
        self.age_seq = 0;
    }

    /// Record that input channel `cin` spiked, heating it in the scoreboard
    pub fn notify_spike(&mut self, cin: u32) {
        self.scoreboard.bump(cin);
    }

    /// One demand access, plus any sequential prefetches it triggers
    pub fn access(&mut self, la: LineAddr) -> AccessResult {
        let mut result = AccessResult::default();

        // reuse distance bookkeeping on the demand line
        let key = la.key();
        self.access_seq += 1;
        match self.seen_lines.insert(key, self.access_seq) {
            None => self.stats.unique_demand_lines += 1,
            Some(last_seq) => {
                self.stats.reuse_distance_total += self.access_seq - last_seq;
                self.stats.reuse_events += 1;
            }
        }

        let (cycles, miss) = self.serve_one(la);
        result.demand_cycles = cycles;
        result.demand_miss = miss;
        self.stats.demand_accesses += 1;
        if miss {
            self.stats.demand_misses += 1;
            self.stats.demand_miss_cycles += cycles as u64;
        } else {
            self.stats.demand_hit_cycles += cycles as u64;
        }

        for step in 1..=self.cfg.prefetch_depth {
            let pf = LineAddr::new(la.tile, la.cin + step, la.kh, la.kw);
            result.prefetch_requests += 1;
            self.stats.prefetch_requests += 1;
            let (_, pf_miss) = self.serve_one(pf);
            if pf_miss {
                result.prefetch_miss_lines += 1;
                self.stats.prefetch_misses += 1;
            }
        }

        result
    }

    fn serve_one(&mut self, la: LineAddr) -> (u32, bool) {
        let key = la.key();
        let set_idx = (key % self.num_sets as u64) as usize;
        let tag = key / self.num_sets as u64;
        self.age_seq += 1;
        let age = self.age_seq;

        let set = &mut self.sets[set_idx];
        if let Some(way) = set.iter_mut().find(|w| w.valid && w.tag == tag) {
            way.lru_age = age;
            return (self.cfg.l1_hit_cycles, false);
        }

        // miss: fill a victim way
        let victim = match self.cfg.eviction_policy {
            EvictionPolicy::Lru => Self::pick_victim_lru(set),
            EvictionPolicy::Scoreboard => Self::pick_victim_scoreboard(set, &self.scoreboard),
        };
        set[victim] = WayEntry { tag, valid: true, lru_age: age, cin: la.cin };
        (self.cfg.miss_overhead + self.cfg.l1_hit_cycles, true)
    }

    fn pick_victim_lru(set: &[WayEntry]) -> usize {
        if let Some(idx) = set.iter().position(|w| !w.valid) {
            return idx;
        }
        set.iter()
            .enumerate()
            .min_by_key(|(_, w)| w.lru_age)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn pick_victim_scoreboard(set: &[WayEntry], scoreboard: &Scoreboard) -> usize {
        if let Some(idx) = set.iter().position(|w| !w.valid) {
            return idx;
        }
        // coldest channel first; ties fall back to the older line
        set.iter()
            .enumerate()
            .min_by_key(|(_, w)| (scoreboard.get(w.cin), w.lru_age))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache(policy: EvictionPolicy) -> CacheSim {
        CacheSim::new(CacheConfig {
            capacity_bytes: 2 * 128, // one set, two ways
            line_bytes: 128,
            ways: 2,
            l1_hit_cycles: 1,
            miss_overhead: 10,
            prefetch_depth: 0,
            eviction_policy: policy,
        })
    }

    #[test]
    fn test_hit_after_miss() {
        let mut cache = small_cache(EvictionPolicy::Lru);
        let la = LineAddr::new(0, 0, 0, 0);
        let first = cache.access(la);
        assert!(first.demand_miss);
        assert_eq!(first.demand_cycles, 11);
        let second = cache.access(la);
        assert!(!second.demand_miss);
        assert_eq!(second.demand_cycles, 1);
        assert_eq!(cache.stats().demand_accesses, 2);
        assert_eq!(cache.stats().demand_misses, 1);
        assert_eq!(cache.stats().unique_demand_lines, 1);
        assert_eq!(cache.stats().reuse_events, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = small_cache(EvictionPolicy::Lru);
        let a = LineAddr::new(0, 0, 0, 0);
        let b = LineAddr::new(0, 1, 0, 0);
        let c = LineAddr::new(0, 2, 0, 0);
        cache.access(a);
        cache.access(b);
        cache.access(a); // refresh a; b is now LRU
        cache.access(c); // evicts b
        assert!(!cache.access(a).demand_miss);
        assert!(cache.access(b).demand_miss);
    }

    #[test]
    fn test_scoreboard_biases_eviction() {
        let mut cache = small_cache(EvictionPolicy::Scoreboard);
        let hot = LineAddr::new(0, 5, 0, 0);
        let cold = LineAddr::new(0, 6, 0, 0);
        cache.access(hot);
        cache.access(cold);
        // heat channel 5; the cold channel's line is evicted on conflict
        cache.notify_spike(5);
        cache.notify_spike(5);
        cache.access(LineAddr::new(0, 7, 0, 0));
        assert!(!cache.access(hot).demand_miss);
        assert!(cache.access(cold).demand_miss);
    }

    #[test]
    fn test_prefetch_counts() {
        let mut cache = CacheSim::new(CacheConfig {
            prefetch_depth: 2,
            ..CacheConfig::default()
        });
        let res = cache.access(LineAddr::new(0, 0, 1, 1));
        assert_eq!(res.prefetch_requests, 2);
        assert_eq!(res.prefetch_miss_lines, 2);
        // the prefetched neighbors now hit on demand
        assert!(!cache.access(LineAddr::new(0, 1, 1, 1)).demand_miss);
        assert!(!cache.access(LineAddr::new(0, 2, 1, 1)).demand_miss);
    }

    #[test]
    fn test_key_packing_distinct() {
        let a = LineAddr::new(1, 2, 3, 4).key();
        let b = LineAddr::new(1, 2, 4, 3).key();
        let c = LineAddr::new(2, 1, 3, 4).key();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_reset() {
        let mut cache = small_cache(EvictionPolicy::Lru);
        cache.access(LineAddr::new(0, 0, 0, 0));
        cache.reset();
        assert_eq!(cache.stats().demand_accesses, 0);
        assert!(cache.access(LineAddr::new(0, 0, 0, 0)).demand_miss);
    }
}
