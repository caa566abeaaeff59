//! Hit/miss counters

/// Hit and miss counts for one scope (global or a single function)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
}

impl CallCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one lookup outcome
    pub fn record(&mut self, was_hit: bool) {
        if was_hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    /// Get total lookups (hits + misses)
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }

    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// `(hits, misses)`
    pub fn as_tuple(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

impl std::ops::Add for CallCounts {
    type Output = CallCounts;

    fn add(self, other: CallCounts) -> CallCounts {
        CallCounts {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
        }
    }
}
