//! Worker-exclusive key generation.
//!
//! Each worker addresses keys through ordinals that only it advances. Ordinal
//! `n` of worker `t` maps to key `t * BLOCK_SIZE + n` while `n < BLOCK_SIZE`.
//! Once a worker has used up its block it continues in block
//! `t + workers`, then `t + 2 * workers`, and so on, so two workers never
//! produce the same key no matter how long the run lasts.

/// Number of keys in one worker block.
pub const BLOCK_SIZE: u64 = 100_000;

/// Prefix of every generated record name.
pub const NAME_PREFIX: &str = "Robot-";

/// Record name for a key.
pub fn record_name(key: u64) -> String {
    format!("{NAME_PREFIX}{key}")
}

/// The key space owned by a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpace {
    worker: u64,
    workers: u64,
}

impl KeySpace {
    /// Key space for worker `worker` out of `workers` concurrent workers.
    pub fn new(worker: usize, workers: usize) -> Self {
        Self {
            worker: worker as u64,
            workers: workers.max(1) as u64,
        }
    }

    /// Key addressed by the worker's `ordinal`-th generated record.
    pub fn key(&self, ordinal: u64) -> u64 {
        let block = ordinal / BLOCK_SIZE;
        let within = ordinal % BLOCK_SIZE;
        (block * self.workers + self.worker) * BLOCK_SIZE + within
    }

    /// First range of `len` keys for this worker.
    pub fn first_range(&self, len: usize) -> KeyRange {
        KeyRange {
            space: *self,
            offset: 0,
            len: len as u64,
        }
    }
}

/// A batch worth of keys: ordinals `[offset, offset + len)` of one key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    space: KeySpace,
    offset: u64,
    len: u64,
}

impl KeyRange {
    /// Number of keys in the range.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First key of the range.
    pub fn start(&self) -> u64 {
        self.space.key(self.offset)
    }

    /// Representative key at the middle of the batch, used by the lookup phases.
    pub fn midpoint(&self) -> u64 {
        self.space.key(self.offset + self.len / 2)
    }

    /// Keys of the range in generation order.
    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        (self.offset..self.offset + self.len).map(|ordinal| self.space.key(ordinal))
    }

    /// The range that follows this one.
    pub fn next(&self) -> KeyRange {
        KeyRange {
            space: self.space,
            offset: self.offset + self.len,
            len: self.len,
        }
    }
}
