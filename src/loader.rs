use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Drop;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing_futures::Instrument;

use crate::{
    batch_function::BatchFunction,
    config::LoaderConfig,
    error::LoadError,
    loader_op::{LoadRequest, LoadResult, LoaderOp},
    loader_worker::LoaderWorker,
};

/// Batch loads values from some expensive resource, primarily intended for mitigating GraphQL's
/// N+1 problem.
///
/// Users can call [`Loader::load`] and [`Loader::load_many`] to fetch values from the underlying
/// resource or cache. Values can be added to the cache out-of-band through the use of
/// [`Loader::prime`] and [`Loader::prime_many`]. Once a key has a result, success or failure, that
/// result is what every later load of the key observes; a loader is meant to live for one request
/// and be dropped with it.
///
/// The `Loader` struct acts as an intermediary between the async domain in which `load` calls are
/// invoked and the pseudo-single-threaded domain of the `LoaderWorker`. Callers can invoke the
/// `Loader` from multiple parallel tasks, and the loader will enqueue the requested operations on
/// the request queue for processing by its `LoaderWorker`. The worker processes the requests
/// sequentially and provides results via response oneshot channels back to the Loader.
///
/// Cancelling the loader's token (directly, through [`Loader::cancel`], or through a parent token)
/// stops the worker. Every outstanding and future load then resolves to
/// [`LoadError::Cancelled`]. If the worker dies any other way (its `BatchFunction` broke the
/// one-result-per-key contract), loads resolve to [`LoadError::WorkerFailed`] instead.
pub struct Loader<K, V, E>
where
    K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
    V: 'static + Send + Debug + Clone,
    E: 'static + Send + Debug + Clone,
{
    request_tx: mpsc::UnboundedSender<LoaderOp<K, V, E>>,
    cancel: CancellationToken,
    load_task_handle: tokio::task::JoinHandle<()>,
}

impl<K, V, E> Drop for Loader<K, V, E>
where
    K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
    V: 'static + Send + Debug + Clone,
    E: 'static + Send + Debug + Clone,
{
    fn drop(&mut self) {
        self.load_task_handle.abort();
    }
}

impl<K, V, E> Loader<K, V, E>
where
    K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
    V: 'static + Send + Debug + Clone,
    E: 'static + Send + Debug + Clone,
{
    /// Creates a new Loader for the provided BatchFunction and Context type, with the default
    /// [`LoaderConfig`].
    ///
    /// Note: the batch function is passed in as a marker for type inference.
    pub fn new<F, ContextT>(batch_fn: F, context: ContextT) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT, Error = E> + Send,
    {
        Self::with_config(batch_fn, context, LoaderConfig::default())
    }

    pub fn with_config<F, ContextT>(batch_fn: F, context: ContextT, config: LoaderConfig) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT, Error = E> + Send,
    {
        Self::with_cancellation(batch_fn, context, config, CancellationToken::new())
    }

    /// Creates a Loader whose worker stops as soon as `cancel` is cancelled. Must be called from
    /// within a tokio runtime.
    pub fn with_cancellation<F, ContextT>(
        _: F,
        context: ContextT,
        config: LoaderConfig,
        cancel: CancellationToken,
    ) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT, Error = E> + Send,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let span = tracing::trace_span!("LoaderWorker", kv = std::any::type_name::<(K, V)>());
        let worker = LoaderWorker::<K, V, E, F, HashMap<K, Result<V, E>>, ContextT>::new(
            HashMap::new(),
            rx,
            context,
            config,
            cancel.clone(),
        );
        Self {
            request_tx: tx,
            cancel,
            load_task_handle: tokio::task::spawn(worker.start().instrument(span)),
        }
    }

    /// Loads a value from the underlying resource.
    ///
    /// Returns [`LoadError::Fetch`] if the BatchFunction failed for this key (or for the whole
    /// batch the key was part of), and [`LoadError::Cancelled`] if the loader was cancelled.
    ///
    /// If the value is already in the loader cache, it is returned as soon as the worker reads the
    /// request, even while a batch for other keys is still loading.
    /// Otherwise, the requested key is enqueued for batch loading in the next loader execution
    /// frame.
    pub async fn load(&self, key: K) -> LoadResult<V, E> {
        if self.cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }
        let (response_tx, response_rx) = oneshot::channel();
        if self.request_tx.send(LoaderOp::Load(LoadRequest::One(key, response_tx))).is_err() {
            return Err(self.stopped());
        }
        response_rx.await.unwrap_or_else(|_| Err(self.stopped()))
    }

    /// Loads many values at once, answering in the order of `keys`. Duplicate keys are fetched
    /// once and answered at each of their positions.
    ///
    /// If all the values are already present in the loader cache, they are returned as soon as
    /// the request is processed by the worker. Otherwise, the missing keys are enqueued for batch
    /// loading in the next loader execution frame.
    pub async fn load_many(&self, keys: Vec<K>) -> Vec<LoadResult<V, E>> {
        if keys.is_empty() {
            return Vec::new();
        }
        let count = keys.len();
        if self.cancel.is_cancelled() {
            return self.stopped_results(count);
        }
        let (response_tx, response_rx) = oneshot::channel();
        if self.request_tx.send(LoaderOp::Load(LoadRequest::Many(keys, response_tx))).is_err() {
            return self.stopped_results(count);
        }
        response_rx.await.unwrap_or_else(|_| self.stopped_results(count))
    }

    /// Adds a value to the cache unless the key already has a result.
    pub fn prime(&self, key: K, value: V) {
        if self.request_tx.send(LoaderOp::Prime(key, value)).is_err() {
            tracing::debug!("prime dropped, loader worker has stopped");
        }
    }

    /// Adds many values to the cache at once. Keys that already have a result are skipped.
    pub fn prime_many(&self, key_vals: Vec<(K, V)>) {
        if self.request_tx.send(LoaderOp::PrimeMany(key_vals)).is_err() {
            tracing::debug!("prime dropped, loader worker has stopped");
        }
    }

    /// Stops the worker. Outstanding loads resolve to [`LoadError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Why the worker is no longer answering.
    fn stopped(&self) -> LoadError<E> {
        if self.cancel.is_cancelled() {
            LoadError::Cancelled
        } else {
            tracing::error!("loader worker is gone");
            LoadError::WorkerFailed
        }
    }

    fn stopped_results(&self, count: usize) -> Vec<LoadResult<V, E>> {
        let error = self.stopped();
        (0..count).map(|_| Err(error.clone())).collect()
    }
}
