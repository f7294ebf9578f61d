//! Memory structure

pub mod cache;

/// Number of addressable 16-bit words
pub const MEMORY_WORDS: usize = 4096;

/// Flat word-addressed main memory.
/// Out-of-range reads return 0 and out-of-range writes are ignored; the
/// core never faults mid-simulation.
#[derive(Clone, Debug)]
pub struct Memory {
    data: Vec<u16>,
}

impl Memory {
    pub fn make() -> Self {
        Self { data: vec![0; MEMORY_WORDS] }
    }

    pub fn read(&self, address: u16) -> u16 {
        self.data.get(address as usize).copied().unwrap_or(0)
    }

    pub fn write(&mut self, address: u16, value: u16) {
        if let Some(word) = self.data.get_mut(address as usize) {
            *word = value;
        }
    }

    /// Zeroes all words
    pub fn reset(&mut self) {
        self.data.fill(0);
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::make()
    }
}

/// Outcome of the most recent cache access
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AccessStatus {
    Hit,
    Miss,
    #[default]
    None,
}
