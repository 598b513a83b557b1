use async_trait::async_trait;

/// A `BatchFunction` defines the method through which some `Loader` may fetch batched data from
/// some resource. The `BatchFunction` receives the distinct keys that were requested during the
/// `Loader`'s most recent batch window, in the order they were first requested, and some user
/// defined context struct.
///
/// Like the reference facebook dataloader implementation, the returned list must contain exactly
/// one result per key, positionally aligned with `keys`. Keys with no backing row are expected to
/// resolve to an "absent" value (an empty `Vec`, a `None`), not to be omitted. A loader that
/// receives a list of the wrong length treats it as a fatal integration fault.
///
/// Returning `Err` signals a systemic failure of the whole batch (the store is unreachable, the
/// query is malformed). The loader hands that same error to every key of the batch. Per-key
/// failures are reported through the inner `Result`s and only reach the waiters of that key.
///
/// The loader never retries. Retrying, if wanted, belongs inside `load`.
///
/// Multiple `BatchFunctions` (and therefore loaders) can share the same context (likely through an
/// `Arc`).
#[async_trait]
pub trait BatchFunction<K, V> {
    type Context;
    type Error;

    async fn load(
        keys: &[K],
        context: &Self::Context,
    ) -> Result<Vec<Result<V, Self::Error>>, Self::Error>;
}
