use std::{fmt, iter, ops::Range};

use serde::Serialize;

use crate::config::Config;

/// A raw address decoded against the configured geometry.
#[derive(Debug, Clone, Copy)]
pub struct Addr {
    pub set: usize,
    pub tag: u64,
}

#[derive(Debug)]
struct BitSection {
    shift: u32,
    mask: u64,
}

impl BitSection {
    fn apply(&self, num: u64) -> u64 {
        (num >> self.shift) & self.mask
    }
}

#[derive(Debug, Default, Clone)]
pub struct Line {
    pub valid: bool,
    pub tag: u64,
    // 0 = most recently used in its set, meaningful only while valid
    pub age: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    Hit,
    MissInsert,
    MissEvict,
}

impl fmt::Display for AccessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessResult::Hit => write!(f, "hit"),
            AccessResult::MissInsert => write!(f, "miss"),
            AccessResult::MissEvict => write!(f, "miss eviction"),
        }
    }
}

#[derive(Debug)]
pub struct Cache {
    pub lines: Vec<Line>,
    pub n_sets: usize,
    pub n_ways: usize,
    set_sec: BitSection,
    tag_sec: BitSection,
}

impl Cache {
    pub fn new(config: Config) -> Self {
        let n_sets = 1usize << config.set_bits;
        let n_ways = config.ways;

        let set_sec = BitSection {
            shift: config.block_bits,
            mask: (n_sets - 1) as u64,
        };
        let tag_sec = BitSection {
            shift: config.set_bits + config.block_bits,
            mask: u64::MAX,
        };

        Cache {
            lines: iter::repeat_with(Line::default)
                .take(n_sets * n_ways)
                .collect(),
            n_sets,
            n_ways,
            set_sec,
            tag_sec,
        }
    }

    pub fn split_addr(&self, addr: u64) -> Addr {
        Addr {
            set: self.set_sec.apply(addr) as usize,
            tag: self.tag_sec.apply(addr),
        }
    }

    fn set_range(&self, set: usize) -> Range<usize> {
        set * self.n_ways..(set + 1) * self.n_ways
    }

    /// Resolves one access against the addressed set and returns its
    /// classification. Counters are the caller's business.
    pub fn access(&mut self, addr: Addr) -> AccessResult {
        let range = self.set_range(addr.set);
        let set = &mut self.lines[range];

        // First, look for a hit
        if let Some(way) = set.iter().position(|l| l.valid && l.tag == addr.tag) {
            touch(set, way, addr.tag);
            return AccessResult::Hit;
        }

        // Its a miss, take the first vacant way if there is one
        if let Some(way) = set.iter().position(|l| !l.valid) {
            touch(set, way, addr.tag);
            return AccessResult::MissInsert;
        }

        // Zero-way sets never hold anything worth evicting
        if set.is_empty() {
            return AccessResult::MissInsert;
        }

        // No vacant ways, evict the LRU victim
        let way = find_lru(set);
        touch(set, way, addr.tag);
        AccessResult::MissEvict
    }
}

/// Installs `tag` in `way` and makes it the most recently used line of the
/// set: every other valid line ages by one, the touched line drops to zero.
fn touch(set: &mut [Line], way: usize, tag: u64) {
    for line in set.iter_mut().filter(|l| l.valid) {
        line.age += 1;
    }
    let line = &mut set[way];
    line.valid = true;
    line.tag = tag;
    line.age = 0;
}

/// Way index of the line with the strictly greatest age. Ties keep the
/// first-seen maximum, so an all-equal set always yields way 0. Kept exactly
/// so eviction counts match the reference simulator.
fn find_lru(set: &[Line]) -> usize {
    let mut victim = 0;
    let mut max_age = 0;
    for (way, line) in set.iter().enumerate() {
        if line.age > max_age {
            max_age = line.age;
            victim = way;
        }
    }
    victim
}

/// Running totals, owned by the driver and fed one result at a time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl Counts {
    pub fn record(&mut self, result: AccessResult) {
        match result {
            AccessResult::Hit => self.hits += 1,
            AccessResult::MissInsert => self.misses += 1,
            AccessResult::MissEvict => {
                self.misses += 1;
                self.evictions += 1;
            }
        }
    }

    pub fn summarize(&self) -> Summary {
        let accesses = self.hits + self.misses;
        let miss_rate = if accesses == 0 {
            0.0
        } else {
            self.misses as f64 / accesses as f64
        };
        Summary {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            accesses,
            miss_rate,
        }
    }
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits:{} misses:{} evictions:{}",
            self.hits, self.misses, self.evictions
        )
    }
}

#[derive(Debug, Serialize)]
pub struct Summary {
    hits: u64,
    misses: u64,
    evictions: u64,
    accesses: u64,
    miss_rate: f64,
}
