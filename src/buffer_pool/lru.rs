//! Recency list over buffer-pool frame slots, used to pick an eviction
//! victim among unpinned frames. `touch`/`remove` are O(n) in the number of
//! resident frames.

pub struct Lru {
    order: Vec<usize>,
}

impl Lru {
    pub fn new() -> Self {
        Self { order: Vec::new() }
    }

    /// Mark `frame` as most recently used.
    pub fn touch(&mut self, frame: usize) {
        self.order.retain(|&f| f != frame);
        self.order.push(frame);
    }

    pub fn remove(&mut self, frame: usize) {
        self.order.retain(|&f| f != frame);
    }

    /// Iterate from least to most recently used.
    pub fn iter_lru_first(&self) -> impl Iterator<Item = usize> + '_ {
        self.order.iter().copied()
    }
}
