use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    batch_function::BatchFunction,
    cache::Cache,
    config::LoaderConfig,
    loader_op::{LoadRequest, LoaderOp},
};

#[cfg(feature = "stats")]
use crate::worker_stats::WorkerStats;

/// A `LoaderWorker` is the "single-thread" worker task that actually does the loading work. It is
/// the only owner of the cache, the batch window and the pending requests, so none of them need a
/// lock.
///
/// Once started, it runs in a loop until the parent Loader aborts its `JoinHandle`, drops the
/// request queue tx channel, or cancels the worker's `CancellationToken`.
///
/// The worker can be in one of three states during its lifetime:
///
/// 1. Waiting for requests
/// 2. Collecting requests into an open batch window.
/// 3. Executing its load batch function.
///
/// One cycle through this loop may be called an "execution frame".
///
/// In state (1), the worker awaits any messages on the request queue channel, idling until work
/// arrives. Requests that are fully answered by the cache are responded to right away and the
/// worker stays in (1).
///
/// In state (2), a window is open because some request needs a key that is not cached. The worker
/// keeps pulling requests off the queue until the queue has been quiet for `LoaderConfig::wait`,
/// `LoaderConfig::max_wait` has passed since the window opened, or the window holds
/// `LoaderConfig::max_batch_size` keys. Prime requests are applied to the cache immediately. Each
/// uncached key enters the window once, in the order it was first requested.
///
/// In state (3), the worker invokes its `BatchFunction` with the window's keys. The results are
/// inserted into the cache (errors included, so a failed key is not fetched again) and then
/// outstanding Load requests are resolved from the cache. The worker keeps reading the queue while
/// the batch runs: cache hits are answered immediately, requests that only wait on in-flight keys
/// join the running batch, and any other uncached key opens the next window.
pub struct LoaderWorker<K, V, E, F, CacheT, ContextT>
where
    K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
    V: 'static + Send + Debug + Clone,
    E: 'static + Send + Debug + Clone,
    F: 'static + BatchFunction<K, V, Context = ContextT, Error = E> + Send,
    CacheT: Cache,
    ContextT: Send + Sync + 'static,
{
    cache: CacheT,
    request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V, E>>,
    /// Keys of the open batch window in first-requested order.
    window: Vec<K>,
    window_keys: HashSet<K>,
    pending_requests: Vec<LoadRequest<K, V, E>>,
    /// Keys handed to the running `BatchFunction`, and the requests waiting only on them.
    in_flight_keys: HashSet<K>,
    in_flight_requests: Vec<LoadRequest<K, V, E>>,
    context: Arc<ContextT>,
    config: LoaderConfig,
    cancel: CancellationToken,
    phantom_batch_function: PhantomData<F>,
    #[cfg(feature = "stats")]
    stats: WorkerStats,
}

/// One `BatchFunction` invocation and its raw output.
struct LoadedBatch<K, V, E> {
    keys: Vec<K>,
    results: Result<Vec<Result<V, E>>, E>,
}

enum WindowEvent<T> {
    Op(Option<T>),
    Quiet,
    Deadline,
}

enum InFlightEvent<T, B> {
    Op(Option<T>),
    Loaded(B),
}

impl<K, V, E, F, CacheT, ContextT> LoaderWorker<K, V, E, F, CacheT, ContextT>
where
    K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
    V: 'static + Send + Debug + Clone,
    E: 'static + Send + Debug + Clone,
    F: 'static + BatchFunction<K, V, Context = ContextT, Error = E> + Send,
    CacheT: Cache<K = K, V = Result<V, E>>,
    ContextT: Send + Sync + 'static,
{
    pub fn new(
        cache: CacheT,
        request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V, E>>,
        context: ContextT,
        config: LoaderConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cache,
            request_rx,
            window: Vec::new(),
            window_keys: HashSet::new(),
            pending_requests: Vec::new(),
            in_flight_keys: HashSet::new(),
            in_flight_requests: Vec::new(),
            context: Arc::new(context),
            config,
            cancel,
            phantom_batch_function: PhantomData,
            #[cfg(feature = "stats")]
            stats: WorkerStats::new(std::any::type_name::<(K, V)>()),
        }
    }

    /// Runs the worker until it is cancelled or its loader goes away. Dropping the worker drops
    /// every pending response channel, which waiters observe as cancellation.
    pub async fn start(mut self) {
        let cancel = self.cancel.clone();
        let cancelled = tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            _ = self.run() => false,
        };
        if cancelled {
            tracing::debug!(
                pending = self.pending_requests.len() + self.in_flight_requests.len(),
                "Loader cancelled. Terminating LoaderWorker."
            );
        } else {
            tracing::info!("Tx channel closed. Terminating LoaderWorker.");
        }
    }

    async fn run(&mut self) {
        loop {
            if self.pending_requests.is_empty() {
                // Async await until we receive an op that needs loading.
                match self.request_rx.recv().await {
                    None => return,
                    Some(op) => self.mux_op(op),
                }
                continue;
            }
            // A window may already be open from requests that arrived during the previous batch.
            if !self.collect_window().await || !self.execute_load().await {
                return;
            }
        }
    }

    /// Keeps the batch window open until the scheduler decides to flush it. Returns false once the
    /// request channel has closed.
    async fn collect_window(&mut self) -> bool {
        let deadline = time::sleep_until(Instant::now() + self.config.effective_max_wait());
        tokio::pin!(deadline);

        loop {
            if self.window_full() {
                tracing::debug!(size = self.window.len(), "batch window full");
                return true;
            }
            let event = tokio::select! {
                op = self.request_rx.recv() => WindowEvent::Op(op),
                _ = time::sleep(self.config.wait) => WindowEvent::Quiet,
                _ = &mut deadline => WindowEvent::Deadline,
            };
            match event {
                WindowEvent::Op(Some(op)) => self.mux_op(op),
                WindowEvent::Op(None) => return false,
                WindowEvent::Quiet => return true,
                WindowEvent::Deadline => {
                    tracing::debug!(size = self.window.len(), "batch window hit max wait");
                    return true;
                }
            }
        }
    }

    fn window_full(&self) -> bool {
        self.config.max_batch_size.map_or(false, |max| self.window.len() >= max)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    fn mux_op(&mut self, op: LoaderOp<K, V, E>) {
        match op {
            LoaderOp::Load(request) => {
                let keys_to_load = request
                    .keys()
                    .iter()
                    .filter(|k| !self.cache.contains(k))
                    .cloned()
                    .collect::<Vec<_>>();
                tracing::trace!(requested_keys = ?request.keys(), ?keys_to_load);
                #[cfg(feature = "stats")]
                self.stats.record_load_request(
                    request.keys().len(),
                    request.keys().len() - keys_to_load.len(),
                );
                if keys_to_load.is_empty() {
                    let values = self.cache.get(request.keys());
                    request.send_response(values);
                    return;
                }
                let mut needs_window = false;
                for key in keys_to_load {
                    if !self.in_flight_keys.contains(&key) {
                        needs_window = true;
                        self.enqueue(key);
                    }
                }
                if needs_window {
                    self.pending_requests.push(request);
                } else {
                    self.in_flight_requests.push(request);
                }
            }
            LoaderOp::Prime(key, value) => self.prime(key, value),
            LoaderOp::PrimeMany(key_vals) => {
                for (key, value) in key_vals {
                    self.prime(key, value);
                }
            }
        }
    }

    fn enqueue(&mut self, key: K) {
        if self.window_keys.insert(key.clone()) {
            self.window.push(key);
        }
    }

    /// A primed key that is waiting in the open window no longer needs fetching.
    fn prime(&mut self, key: K, value: V) {
        if self.cache.insert(key.clone(), Ok(value)) && self.window_keys.remove(&key) {
            self.window.retain(|k| k != &key);
        }
    }

    /// Hands the window to the `BatchFunction` and serves the queue until it returns. Returns
    /// false once the request channel has closed.
    async fn execute_load(&mut self) -> bool {
        let keys = mem::take(&mut self.window);
        self.window_keys.clear();
        self.in_flight_requests = mem::take(&mut self.pending_requests);

        let mut open = true;
        if !keys.is_empty() {
            self.in_flight_keys.extend(keys.iter().cloned());
            let batch_size = self.config.max_batch_size.unwrap_or(keys.len()).max(1);
            let load = Self::load_batches(keys, batch_size, self.context.clone());
            tokio::pin!(load);

            let batches = loop {
                let event = tokio::select! {
                    batches = &mut load => InFlightEvent::Loaded(batches),
                    op = self.request_rx.recv(), if open => InFlightEvent::Op(op),
                };
                match event {
                    InFlightEvent::Loaded(batches) => break batches,
                    InFlightEvent::Op(Some(op)) => self.mux_op(op),
                    InFlightEvent::Op(None) => open = false,
                }
            };

            self.in_flight_keys.clear();
            for batch in batches {
                self.store_batch(batch);
            }
        }

        for request in self.in_flight_requests.drain(..) {
            let values = self.cache.get(request.keys());
            request.send_response(values);
        }
        open
    }

    /// Invokes the `BatchFunction` once per chunk of at most `batch_size` keys. Owns everything it
    /// touches so the worker can keep serving its queue meanwhile.
    async fn load_batches(
        keys: Vec<K>,
        batch_size: usize,
        context: Arc<ContextT>,
    ) -> Vec<LoadedBatch<K, V, E>> {
        let mut batches = Vec::new();
        for chunk in keys.chunks(batch_size) {
            tracing::debug!(keys = ?chunk, "dispatching batch");
            let results = F::load(chunk, &context).await;
            batches.push(LoadedBatch { keys: chunk.to_vec(), results });
        }
        batches
    }

    fn store_batch(&mut self, batch: LoadedBatch<K, V, E>) {
        let LoadedBatch { keys, results } = batch;
        #[cfg(feature = "stats")]
        self.stats.record_load_exec(keys.len());

        match results {
            Ok(results) => {
                if results.len() != keys.len() {
                    tracing::error!(
                        expected = keys.len(),
                        received = results.len(),
                        "BatchFunction returned a result list that does not match its keys"
                    );
                    panic!(
                        "BatchFunction returned {} results for {} keys",
                        results.len(),
                        keys.len()
                    );
                }
                let failed = results.iter().filter(|r| r.is_err()).count();
                tracing::debug!(loaded = results.len(), failed);
                #[cfg(feature = "stats")]
                self.stats.record_load_exec_completed(false, failed);
                self.cache.insert_many(keys.into_iter().zip(results));
            }
            Err(e) => {
                tracing::warn!(error = ?e, "BatchFunction failed for the whole batch");
                #[cfg(feature = "stats")]
                self.stats.record_load_exec_completed(true, keys.len());
                self.cache.insert_many(keys.into_iter().map(|k| (k, Err(e.clone()))));
            }
        }
    }
}
