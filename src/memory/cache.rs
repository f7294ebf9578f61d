//! Direct-mapped cache implementation

use super::AccessStatus;
use super::Memory;

/// Default number of cache lines
pub const DEFAULT_LINES: usize = 16;

/// One cache line
#[derive(Clone, Copy, Debug, Default)]
pub struct Line {
    pub valid: bool,
    pub tag: u16,
    pub data: u16,
}

/// Hit/miss counters accumulated over the run
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheHistory {
    pub num_hit: u64,
    pub num_miss: u64,
}

/// Direct-mapped cache sitting between the CPU and main memory.
///
/// Line selection: index = address % lines, tag = address / lines.
/// Writes are write-through and write-allocate: every write updates
/// memory immediately and installs the line, so a subsequent read of the
/// same address is guaranteed to hit. With one line per index there is
/// no victim choice to make.
#[derive(Clone, Debug)]
pub struct Cache {
    pub memory: Memory,

    pub history: CacheHistory,

    /// Outcome of the most recent access, for display only
    pub last_access: AccessStatus,

    lines: Vec<Line>,
}

impl Cache {
    pub fn make(memory: Memory) -> Self {
        Self::with_lines(memory, DEFAULT_LINES)
    }

    /// Create a cache with a custom line count (used by the evaluation
    /// binaries; the machine itself always uses the default)
    pub fn with_lines(memory: Memory, lines: usize) -> Self {
        assert!(lines > 0);
        Self {
            memory,
            history: CacheHistory::default(),
            last_access: AccessStatus::None,
            lines: vec![Line::default(); lines],
        }
    }

    fn get_index(&self, address: u16) -> usize {
        address as usize % self.lines.len()
    }

    fn get_tag(&self, address: u16) -> u16 {
        address / self.lines.len() as u16
    }

    /// Serve a read: cached data on a hit, otherwise fetch from memory
    /// and install the line
    pub fn read(&mut self, address: u16) -> u16 {
        let index = self.get_index(address);
        let tag = self.get_tag(address);
        let line = self.lines[index];

        if line.valid && line.tag == tag {
            self.last_access = AccessStatus::Hit;
            self.record_hit();
            line.data
        } else {
            self.last_access = AccessStatus::Miss;
            self.record_miss();
            let data = self.memory.read(address);
            self.lines[index] = Line { valid: true, tag, data };
            data
        }
    }

    /// Apply a write: write-through to memory, then install the line
    /// regardless of the prior hit/miss state. The recorded status only
    /// reflects whether the line already held this tag.
    pub fn write(&mut self, address: u16, value: u16) {
        let index = self.get_index(address);
        let tag = self.get_tag(address);

        self.memory.write(address, value);

        let line = self.lines[index];
        if line.valid && line.tag == tag {
            self.last_access = AccessStatus::Hit;
            self.record_hit();
        } else {
            self.last_access = AccessStatus::Miss;
            self.record_miss();
        }
        self.lines[index] = Line { valid: true, tag, data: value };
    }

    /// Invalidate all lines and clear the counters
    pub fn reset(&mut self) {
        self.lines.fill(Line::default());
        self.last_access = AccessStatus::None;
        self.history = CacheHistory::default();
    }

    pub fn record_hit(&mut self) {
        self.history.num_hit += 1;
    }

    pub fn record_miss(&mut self) {
        self.history.num_miss += 1;
    }

    /// Computes the current hit rate of the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.history.num_hit + self.history.num_miss;
        if total == 0 {
            return 0.0;
        }
        self.history.num_hit as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_miss_then_hit() {
        let mut mem = Memory::make();
        mem.write(100, 42);
        let mut cache = Cache::make(mem);

        assert_eq!(cache.read(100), 42);
        assert_eq!(cache.last_access, AccessStatus::Miss);
        assert_eq!(cache.read(100), 42);
        assert_eq!(cache.last_access, AccessStatus::Hit);
        assert_eq!(cache.history.num_hit, 1);
        assert_eq!(cache.history.num_miss, 1);
    }

    #[test]
    fn test_write_through_invariant() {
        let mut cache = Cache::make(Memory::make());
        for address in [0u16, 15, 16, 100, 4095] {
            let value = address.wrapping_mul(3) ^ 0x5A5A;
            cache.write(address, value);
            assert_eq!(cache.read(address), value);
            assert_eq!(cache.last_access, AccessStatus::Hit);
            assert_eq!(cache.memory.read(address), value);
        }
    }

    #[test]
    fn test_direct_map_collision() {
        let mut cache = Cache::make(Memory::make());
        // Addresses 100 and 116 share index 4 but differ in tag
        cache.write(100, 1);
        cache.write(116, 2);
        assert_eq!(cache.read(100), 1);
        assert_eq!(cache.last_access, AccessStatus::Miss);
        // 116 was evicted in turn
        assert_eq!(cache.read(116), 2);
        assert_eq!(cache.last_access, AccessStatus::Miss);
    }

    #[test]
    fn test_write_status_reflects_prior_line() {
        let mut cache = Cache::make(Memory::make());
        cache.write(5, 10);
        assert_eq!(cache.last_access, AccessStatus::Miss);
        // Same tag already installed
        cache.write(5, 11);
        assert_eq!(cache.last_access, AccessStatus::Hit);
        // Same index, different tag: still stored, reported miss
        cache.write(21, 12);
        assert_eq!(cache.last_access, AccessStatus::Miss);
        assert_eq!(cache.memory.read(21), 12);
    }

    #[test]
    fn test_reset_invalidates() {
        let mut cache = Cache::make(Memory::make());
        cache.write(7, 9);
        cache.reset();
        assert_eq!(cache.last_access, AccessStatus::None);
        assert_eq!(cache.history.num_hit, 0);
        // Memory keeps its contents; only the lines are invalid
        assert_eq!(cache.read(7), 9);
        assert_eq!(cache.last_access, AccessStatus::Miss);
    }
}
