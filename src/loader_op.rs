use std::slice;

use tokio::sync::oneshot;

use crate::error::LoadError;

pub type LoadResult<V, E> = Result<V, LoadError<E>>;

/// Set of possible requests that can be sent to the
/// [`LoaderWorker`](crate::loader_worker::LoaderWorker)
///
/// Load and Prime each have a single and many variant for convenience. There is no Clear: cached
/// results stay fixed for the lifetime of the loader.
#[derive(Debug)]
pub enum LoaderOp<K, V, E> {
    /// Fetch data from the resource wrapped by this data loader (or the cache).
    Load(LoadRequest<K, V, E>),
    /// Add values to the cache that were fetched from elsewhere.
    Prime(K, V),
    PrimeMany(Vec<(K, V)>),
}

#[derive(Debug)]
pub enum LoadRequest<K, V, E> {
    One(K, oneshot::Sender<LoadResult<V, E>>),
    Many(Vec<K>, oneshot::Sender<Vec<LoadResult<V, E>>>),
}

impl<K, V, E> LoadRequest<K, V, E>
where
    V: Clone,
    E: Clone,
{
    pub fn keys(&self) -> &[K] {
        match self {
            LoadRequest::One(ref key, _) => slice::from_ref(key),
            LoadRequest::Many(ref keys, _) => keys,
        }
    }

    /// Answers the request from cached entries, one per key in `keys()` order. A missing entry
    /// means the worker lost track of the key and is reported as a worker failure.
    pub fn send_response<'a, I>(self, values: I)
    where
        I: IntoIterator<Item = Option<&'a Result<V, E>>>,
        V: 'a,
        E: 'a,
    {
        match self {
            LoadRequest::One(_, response_tx) => {
                let response = to_load_result(values.into_iter().next().flatten());
                if response_tx.send(response).is_err() {
                    tracing::debug!("receiver dropped before response");
                }
            }
            LoadRequest::Many(_, response_tx) => {
                let response = values.into_iter().map(to_load_result).collect::<Vec<_>>();
                if response_tx.send(response).is_err() {
                    tracing::debug!("receiver dropped before response");
                }
            }
        }
    }
}

fn to_load_result<V: Clone, E: Clone>(cached: Option<&Result<V, E>>) -> LoadResult<V, E> {
    match cached {
        Some(Ok(value)) => Ok(value.clone()),
        Some(Err(e)) => Err(LoadError::Fetch(e.clone())),
        None => Err(LoadError::WorkerFailed),
    }
}
