//! Centralized configuration and builder for the store.
//!
//! Single place to collect tunables instead of scattering env lookups.
//! `StoreConfig::from_env()` allows overriding defaults via environment
//! variables; `StoreConfig::default()` alone is a complete, sane config.
//!
//! Usage:
//!   let cfg = StoreConfig::from_env()
//!       .with_memtable_byte_budget(2 << 20)
//!       .with_buffer_pool_max_pages(4096);
//!   let store = Store::open(path, cfg)?;

use std::fmt;

#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Flush the memtable once its accounted byte size reaches this budget.
    /// Env: RIDGEDB_MEMTABLE_BYTE_BUDGET (default 1 MiB)
    pub memtable_byte_budget: usize,

    /// Maximum number of pages resident in the buffer pool.
    /// Env: RIDGEDB_BUFFER_POOL_MAX_PAGES (default 2560)
    pub buffer_pool_max_pages: usize,

    /// Level-0 run count that triggers compaction.
    /// Env: RIDGEDB_LEVEL0_MAX_RUNS (default 4)
    pub level0_max_runs: usize,

    /// Geometric growth factor of per-level capacity for levels >= 1.
    /// Env: RIDGEDB_SIZE_RATIO (default 2)
    pub size_ratio: usize,

    /// Highest level index the level manager will create.
    /// Env: RIDGEDB_MAX_LEVELS (default 5)
    pub max_levels: usize,

    /// Maximum pages held by one buffer-pool bucket before it must split.
    /// Env: RIDGEDB_BUCKET_CAPACITY (default 4)
    pub bucket_capacity: usize,

    /// Initial global depth of the buffer-pool directory.
    /// Env: RIDGEDB_INITIAL_GLOBAL_DEPTH (default 2)
    pub initial_global_depth: u32,

    /// Ceiling on the buffer-pool directory's global depth.
    /// Env: RIDGEDB_MAX_GLOBAL_DEPTH (default 10)
    pub max_global_depth: u32,

    /// Attempt aligned/unbuffered I/O, falling back to buffered I/O when the
    /// platform rejects the alignment.
    /// Env: RIDGEDB_USE_ALIGNED_IO (default true; "0|false|off|no" => false)
    pub use_aligned_io: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            memtable_byte_budget: 1 << 20,
            buffer_pool_max_pages: 2560,
            level0_max_runs: 4,
            size_ratio: 2,
            max_levels: 5,
            bucket_capacity: 4,
            initial_global_depth: 2,
            max_global_depth: 10,
            use_aligned_io: true,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("RIDGEDB_MEMTABLE_BYTE_BUDGET") {
            if let Ok(n) = v.trim().parse() {
                cfg.memtable_byte_budget = n;
            }
        }
        if let Ok(v) = std::env::var("RIDGEDB_BUFFER_POOL_MAX_PAGES") {
            if let Ok(n) = v.trim().parse() {
                cfg.buffer_pool_max_pages = n;
            }
        }
        if let Ok(v) = std::env::var("RIDGEDB_LEVEL0_MAX_RUNS") {
            if let Ok(n) = v.trim().parse() {
                cfg.level0_max_runs = n;
            }
        }
        if let Ok(v) = std::env::var("RIDGEDB_SIZE_RATIO") {
            if let Ok(n) = v.trim().parse() {
                cfg.size_ratio = n;
            }
        }
        if let Ok(v) = std::env::var("RIDGEDB_MAX_LEVELS") {
            if let Ok(n) = v.trim().parse() {
                cfg.max_levels = n;
            }
        }
        if let Ok(v) = std::env::var("RIDGEDB_BUCKET_CAPACITY") {
            if let Ok(n) = v.trim().parse() {
                cfg.bucket_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("RIDGEDB_INITIAL_GLOBAL_DEPTH") {
            if let Ok(n) = v.trim().parse() {
                cfg.initial_global_depth = n;
            }
        }
        if let Ok(v) = std::env::var("RIDGEDB_MAX_GLOBAL_DEPTH") {
            if let Ok(n) = v.trim().parse() {
                cfg.max_global_depth = n;
            }
        }
        if let Ok(v) = std::env::var("RIDGEDB_USE_ALIGNED_IO") {
            let s = v.trim().to_ascii_lowercase();
            cfg.use_aligned_io = !(s == "0" || s == "false" || s == "off" || s == "no");
        }

        cfg
    }

    pub fn with_memtable_byte_budget(mut self, n: usize) -> Self {
        self.memtable_byte_budget = n;
        self
    }

    pub fn with_buffer_pool_max_pages(mut self, n: usize) -> Self {
        self.buffer_pool_max_pages = n;
        self
    }

    pub fn with_level0_max_runs(mut self, n: usize) -> Self {
        self.level0_max_runs = n;
        self
    }

    pub fn with_size_ratio(mut self, n: usize) -> Self {
        self.size_ratio = n;
        self
    }

    pub fn with_max_levels(mut self, n: usize) -> Self {
        self.max_levels = n;
        self
    }

    pub fn with_bucket_capacity(mut self, n: usize) -> Self {
        self.bucket_capacity = n;
        self
    }

    pub fn with_initial_global_depth(mut self, n: u32) -> Self {
        self.initial_global_depth = n;
        self
    }

    pub fn with_max_global_depth(mut self, n: u32) -> Self {
        self.max_global_depth = n;
        self
    }

    pub fn with_use_aligned_io(mut self, on: bool) -> Self {
        self.use_aligned_io = on;
        self
    }
}

impl fmt::Display for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreConfig {{ memtable_byte_budget: {}, buffer_pool_max_pages: {}, level0_max_runs: {}, size_ratio: {}, max_levels: {}, bucket_capacity: {}, initial_global_depth: {}, max_global_depth: {}, use_aligned_io: {} }}",
            self.memtable_byte_budget,
            self.buffer_pool_max_pages,
            self.level0_max_runs,
            self.size_ratio,
            self.max_levels,
            self.bucket_capacity,
            self.initial_global_depth,
            self.max_global_depth,
            self.use_aligned_io,
        )
    }
}
