#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Human readable name used to identify this worker stats when it is reported.
    tag: &'static str,
    /// Number of `LoaderOp::Load` that were received by the worker.
    load_requests: u32,
    /// The total number of keys that were requested for loading (not necessarily unique).
    items_requested: u32,
    /// The number of keys that were immediately found in the loader cache.
    cache_hits: u32,
    /// Number of times that this worker invoked its `BatchFunction`.
    loads: u32,
    /// The average number of unique keys handed to the `BatchFunction` per invocation.
    average_batch_size: f32,
    /// The max number of unique keys fetched during a single load.
    max_batch_size: u32,
    /// The min number of unique keys fetched during a single load.
    min_batch_size: u32,
    /// Number of loads whose `BatchFunction` failed as a whole.
    failed_loads: u32,
    /// The total number of keys that resolved to a per-key error.
    items_failed: u32,
}

impl WorkerStats {
    pub fn new(tag: &'static str) -> Self {
        Self { tag, min_batch_size: u32::MAX, ..Default::default() }
    }

    pub fn record_load_request(&mut self, items_requested: usize, cache_hits: usize) {
        self.load_requests += 1;
        self.items_requested += items_requested as u32;
        self.cache_hits += cache_hits as u32;
    }

    pub fn record_load_exec(&mut self, batch_size: usize) {
        let batch_size = batch_size as u32;
        let new_total_load = self.loads + 1;
        self.average_batch_size = (((self.average_batch_size as f64 * self.loads as f64)
            + batch_size as f64)
            / new_total_load as f64) as f32;
        self.loads = new_total_load;
        self.max_batch_size = self.max_batch_size.max(batch_size);
        self.min_batch_size = self.min_batch_size.min(batch_size);
    }

    pub fn record_load_exec_completed(&mut self, failed: bool, items_failed: usize) {
        if failed {
            self.failed_loads += 1;
        }
        self.items_failed += items_failed as u32;
    }
}

impl Drop for WorkerStats {
    fn drop(&mut self) {
        tracing::debug!(worker_stats = ?self);
    }
}
